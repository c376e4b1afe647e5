//! Line-oriented operator console for the hub binary.
//!
//! Reads commands from stdin, forwards them through a [`HubHandle`] and
//! prints hub events as they arrive.

use crate::error::HubError;
use crate::events::HubEvent;
use crate::handle::HubHandle;
use crate::ledger::{CommandRequest, RequestToken};
use crate::state::OnlineSummary;
use log::{error, info};
use shared::ServerId;
use std::io::BufRead;
use tokio::sync::mpsc;

pub const HELP: &str = "\
Commands:
  online | o                      show online servers and players
  list | ls                       list registered server ids
  tps <id>                        ask a server for its TPS
  exec | e <id> <command> [args]  run a command on a server
  restart | r <id>                restart a server
  help | ?                        show this message
  quit | exit                     stop the hub";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Online,
    List,
    Tps(ServerId),
    Exec {
        server_id: ServerId,
        command: String,
        args: Vec<String>,
    },
    Restart(ServerId),
    Help,
    Quit,
}

/// Parses one console line. Blank lines yield `Ok(None)`; the error is a
/// usage message meant for the operator.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let name = match words.next() {
        Some(name) => name.to_ascii_lowercase(),
        None => return Ok(None),
    };
    let rest: Vec<&str> = words.collect();

    let command = match name.as_str() {
        "online" | "o" => ConsoleCommand::Online,
        "list" | "ls" => ConsoleCommand::List,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "tps" => match rest.as_slice() {
            [id] => ConsoleCommand::Tps(ServerId::new(*id)),
            _ => return Err("usage: tps <id>".to_string()),
        },
        "restart" | "r" => match rest.as_slice() {
            [id] => ConsoleCommand::Restart(ServerId::new(*id)),
            _ => return Err("usage: restart <id>".to_string()),
        },
        "exec" | "e" | "execute" => match rest.as_slice() {
            [id, command, args @ ..] => ConsoleCommand::Exec {
                server_id: ServerId::new(*id),
                command: command.to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            },
            _ => return Err("usage: exec <id> <command> [args...]".to_string()),
        },
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

pub fn render_online(summary: &OnlineSummary) -> String {
    let mut out = format!(
        "Servers online: {}\nTotal players online: {}\n",
        summary.servers_online, summary.total_players
    );
    for (server_id, status) in &summary.servers {
        out.push_str(&format!(
            "[{}] {} [{}/{}]\n  {}\n",
            server_id,
            status.server_name,
            status.players_online,
            status.max_players,
            status.server_address
        ));
        if !status.online_player_names.is_empty() {
            out.push_str(&format!("  {}\n", status.online_player_names.join(", ")));
        }
    }
    out
}

pub fn render_event(event: &HubEvent) -> String {
    match event {
        HubEvent::Connected { server_id, status } => format!(
            "[{}] {} connected ({}/{})",
            server_id, status.server_name, status.players_online, status.max_players
        ),
        HubEvent::StatusUpdated { server_id, status } => format!(
            "[{}] {}/{} players online",
            server_id, status.players_online, status.max_players
        ),
        HubEvent::CommandResult(result) => format!(
            "[{}] {}:\n{}",
            result.server_id, result.command, result.output
        ),
        HubEvent::Disconnected { server_id } => format!("[{}] disconnected", server_id),
    }
}

pub struct Console {
    handle: HubHandle,
    next_token: u64,
}

impl Console {
    pub fn new(handle: HubHandle) -> Self {
        Self {
            handle,
            next_token: 1,
        }
    }

    /// Runs one command and returns the text to show the operator.
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<String, HubError> {
        match command {
            ConsoleCommand::Online => Ok(render_online(&self.handle.online_summary().await)),
            ConsoleCommand::List => {
                let ids = self.handle.list_active().await;
                if ids.is_empty() {
                    return Ok("No servers connected".to_string());
                }
                Ok(ids
                    .iter()
                    .map(ServerId::as_str)
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            ConsoleCommand::Tps(server_id) => self.submit(server_id, "tps".to_string(), vec![]).await,
            ConsoleCommand::Exec {
                server_id,
                command,
                args,
            } => self.submit(server_id, command, args).await,
            ConsoleCommand::Restart(server_id) => {
                self.handle.restart(server_id.as_str()).await?;
                Ok(format!("Restart requested for {}", server_id))
            }
            ConsoleCommand::Help => Ok(HELP.to_string()),
            ConsoleCommand::Quit => {
                self.handle.shutdown();
                Ok("Shutting down".to_string())
            }
        }
    }

    async fn submit(
        &mut self,
        server_id: ServerId,
        command: String,
        args: Vec<String>,
    ) -> Result<String, HubError> {
        let token = RequestToken(self.next_token);
        self.next_token += 1;
        let reply = format!("Sent '{}' to {} (#{})", command, server_id, token.0);
        self.handle
            .submit(CommandRequest::new(server_id, command, args, token))
            .await?;
        Ok(reply)
    }

    /// Labels a command result with the request it answers, if any.
    fn describe(&self, event: &HubEvent) -> String {
        let rendered = render_event(event);
        match event {
            HubEvent::CommandResult(result) => match self.handle.resolve(result) {
                Some(request) => format!("(#{}) {}", request.token.0, rendered),
                None => rendered,
            },
            _ => rendered,
        }
    }

    /// Interactive loop; returns on `quit`, end of input, or hub shutdown.
    pub async fn run(mut self) {
        let mut lines = spawn_stdin_reader();
        let mut events = self.handle.subscribe();
        let handle = self.handle.clone();
        println!("{}", HELP);

        loop {
            tokio::select! {
                _ = handle.shutdown_requested() => break,
                line = lines.recv() => {
                    let line = match line {
                        Some(line) => line,
                        None => {
                            info!("Console input closed");
                            break;
                        }
                    };
                    let command = match parse(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(usage) => {
                            println!("{}", usage);
                            continue;
                        }
                    };
                    let quit = command == ConsoleCommand::Quit;
                    match self.execute(command).await {
                        Ok(output) => println!("{}", output),
                        Err(e) => println!("Error: {}", e),
                    }
                    if quit {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => println!("{}", self.describe(&event)),
                    None => break,
                },
            }
        }
    }
}

// Blocking stdin lives on its own thread so it never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        error!("Failed to start console input thread: {}", e);
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CommandResult;
    use shared::ServerStatus;
    use std::sync::Arc;

    #[test]
    fn test_parse_commands_and_aliases() {
        assert_eq!(parse("online").unwrap(), Some(ConsoleCommand::Online));
        assert_eq!(parse("  O ").unwrap(), Some(ConsoleCommand::Online));
        assert_eq!(parse("ls").unwrap(), Some(ConsoleCommand::List));
        assert_eq!(
            parse("tps alpha").unwrap(),
            Some(ConsoleCommand::Tps(ServerId::new("alpha")))
        );
        assert_eq!(
            parse("r alpha").unwrap(),
            Some(ConsoleCommand::Restart(ServerId::new("alpha")))
        );
        assert_eq!(
            parse("e alpha say hello world").unwrap(),
            Some(ConsoleCommand::Exec {
                server_id: ServerId::new("alpha"),
                command: "say".to_string(),
                args: vec!["hello".to_string(), "world".to_string()],
            })
        );
        assert_eq!(
            parse("execute alpha list").unwrap(),
            Some(ConsoleCommand::Exec {
                server_id: ServerId::new("alpha"),
                command: "list".to_string(),
                args: vec![],
            })
        );
        assert_eq!(parse("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse("?").unwrap(), Some(ConsoleCommand::Help));
    }

    #[test]
    fn test_parse_blank_and_usage_errors() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert!(parse("tps").unwrap_err().starts_with("usage: tps"));
        assert!(parse("tps a b").is_err());
        assert!(parse("exec alpha").unwrap_err().starts_with("usage: exec"));
        assert!(parse("restart").is_err());
        assert!(parse("fly alpha").unwrap_err().contains("unknown command 'fly'"));
    }

    #[test]
    fn test_render_online_layout() {
        let summary = OnlineSummary {
            servers_online: 2,
            total_players: 3,
            servers: vec![
                (
                    ServerId::new("alpha"),
                    Arc::new(
                        ServerStatus::new("Alpha", "1.2.3.4:25565", 20)
                            .with_players(["a", "b", "c"]),
                    ),
                ),
                (
                    ServerId::new("beta"),
                    Arc::new(ServerStatus::new("Beta", "5.6.7.8:25565", 10)),
                ),
            ],
        };

        let expected = "Servers online: 2\n\
                        Total players online: 3\n\
                        [alpha] Alpha [3/20]\n  1.2.3.4:25565\n  a, b, c\n\
                        [beta] Beta [0/10]\n  5.6.7.8:25565\n";
        assert_eq!(render_online(&summary), expected);
    }

    #[test]
    fn test_render_online_empty() {
        let summary = OnlineSummary {
            servers_online: 0,
            total_players: 0,
            servers: vec![],
        };
        assert_eq!(
            render_online(&summary),
            "Servers online: 0\nTotal players online: 0\n"
        );
    }

    #[test]
    fn test_render_events() {
        let result = HubEvent::CommandResult(CommandResult {
            server_id: ServerId::new("alpha"),
            command: "list".to_string(),
            output: "a\nb".to_string(),
        });
        assert_eq!(render_event(&result), "[alpha] list:\na\nb");

        let gone = HubEvent::Disconnected {
            server_id: ServerId::new("alpha"),
        };
        assert_eq!(render_event(&gone), "[alpha] disconnected");
    }
}
