use clap::Parser;
use log::{error, info};
use server::console::{render_event, Console};
use server::{Hub, HubConfig};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about = "Relay hub between chat front ends and game servers")]
    struct Args {
        /// Address to accept game servers on
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Port to accept game servers on
        #[clap(short, long, default_value = "5005")]
        port: u16,
        /// Seconds a new connection has to send its registration
        #[clap(long, default_value = "5")]
        registration_timeout_secs: u64,
        /// Largest frame payload accepted, in bytes
        #[clap(long, default_value_t = shared::MAX_FRAME_LEN)]
        max_frame_len: usize,
        /// Events buffered per subscriber before dropping
        #[clap(long, default_value = "256")]
        event_buffer: usize,
        /// Frames queued per game server before dispatch is refused
        #[clap(long, default_value = "1024")]
        outbound_buffer: usize,
        /// Log events instead of reading console commands from stdin
        #[clap(long)]
        headless: bool,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_address: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let config = HubConfig {
        bind_address,
        registration_timeout: Duration::from_secs(args.registration_timeout_secs),
        max_frame_len: args.max_frame_len,
        event_buffer: args.event_buffer,
        outbound_buffer: args.outbound_buffer,
    };

    let hub = Hub::bind(config).await?;
    let handle = hub.handle();
    let mut hub_task = tokio::spawn(hub.run());

    let front_end = if args.headless {
        let mut events = handle.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                info!("{}", render_event(&event));
            }
        })
    } else {
        tokio::spawn(Console::new(handle.clone()).run())
    };

    tokio::select! {
        result = &mut hub_task => {
            front_end.abort();
            return match result {
                Ok(result) => result.map_err(Into::into),
                Err(e) => {
                    error!("Hub task failed: {}", e);
                    Err(e.into())
                }
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = handle.shutdown_requested() => {}
    }

    handle.shutdown();
    front_end.abort();
    hub_task.await??;
    Ok(())
}
