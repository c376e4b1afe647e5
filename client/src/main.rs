use clap::Parser;
use client::network::{PeerClient, PeerError, PeerRequest};
use client::simulation::SimulatedServer;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::ServerId;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated game server for a Polychat hub", long_about = None)]
struct Args {
    /// Hub address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5005")]
    server: String,

    /// Id to register under
    #[arg(short = 'i', long, default_value = "alpha")]
    id: String,

    /// Display name reported in status updates
    #[arg(short = 'n', long, default_value = "Alpha")]
    name: String,

    /// Address players would use to join
    #[arg(short = 'a', long, default_value = "127.0.0.1:25565")]
    address: String,

    /// Player capacity
    #[arg(short = 'm', long, default_value = "20")]
    max_players: u32,

    /// Seconds between status broadcasts
    #[arg(long, default_value = "5")]
    status_interval_secs: u64,

    /// Seconds to wait before re-registering after a restart request
    #[arg(long, default_value = "3")]
    restart_delay_secs: u64,
}

/// Why a session with the hub ended.
enum SessionEnd {
    Restart,
    Closed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_id = ServerId::new(args.id.clone());
    let mut simulation = SimulatedServer::new(&args.name, &args.address, args.max_players);
    let mut rng = StdRng::from_entropy();

    info!("Starting simulated server {} ({})", server_id, args.name);

    loop {
        match run_session(&args, &server_id, &mut simulation, &mut rng).await? {
            SessionEnd::Restart => {
                info!("Restart requested, reconnecting in {}s", args.restart_delay_secs);
                sleep(Duration::from_secs(args.restart_delay_secs)).await;
            }
            SessionEnd::Closed => {
                info!("Hub closed the connection");
                return Ok(());
            }
        }
    }
}

async fn run_session(
    args: &Args,
    server_id: &ServerId,
    simulation: &mut SimulatedServer,
    rng: &mut StdRng,
) -> Result<SessionEnd, PeerError> {
    let peer = PeerClient::connect(&args.server, server_id.clone(), simulation.status().clone()).await?;
    let (mut sender, mut receiver) = peer.split();

    // next_request is not cancel-safe, so it gets its own task
    let (request_tx, mut request_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        loop {
            let request = receiver.next_request().await;
            let done = !matches!(request, Ok(Some(_)));
            if request_tx.send(request).is_err() || done {
                break;
            }
        }
    });

    let mut status_timer = interval(Duration::from_secs(args.status_interval_secs.max(1)));
    status_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    status_timer.tick().await;

    let end = loop {
        tokio::select! {
            _ = status_timer.tick() => {
                simulation.tick(rng);
                sender.send_status(simulation.status().clone()).await?;
            }
            request = request_rx.recv() => match request {
                Some(Ok(Some(PeerRequest::Execute { command, args }))) => {
                    info!("Executing '{}' {:?}", command, args);
                    let output = simulation.execute(&command, &args);
                    sender.send_result(command, output).await?;
                }
                Some(Ok(Some(PeerRequest::Restart))) => break SessionEnd::Restart,
                Some(Ok(None)) => break SessionEnd::Closed,
                None => return Err(PeerError::Disconnected),
                Some(Err(e)) => {
                    reader.abort();
                    return Err(e);
                }
            },
        }
    };

    if let Err(e) = sender.shutdown().await {
        warn!("Error closing connection: {}", e);
    }
    reader.abort();
    Ok(end)
}
