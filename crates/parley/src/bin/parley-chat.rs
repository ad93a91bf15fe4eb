//! Parley line-oriented chat client.
//!
//! ```text
//! parley-chat --user ana [--create ROOM | --join ROOM]
//! ```
//!
//! Outside a room the prompt accepts `/list`, `/create ROOM`, `/join ROOM`
//! and `/exit`. Inside a room every line is sent as a message, except
//! `/leave` (back to the prompt) and `/exit`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use parley::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "parley-chat", version)]
struct Cli {
    /// Display name shown to the other members.
    #[arg(long, env = "PARLEY_USER")]
    user: String,

    /// Directory Service address.
    #[arg(long, default_value = parley::DEFAULT_DIRECTORY_ADDR, env = "PARLEY_DIRECTORY")]
    directory: SocketAddr,

    /// Local datagram address; port 0 picks one.
    #[arg(long, default_value = "127.0.0.1:0", env = "PARLEY_BIND")]
    bind: SocketAddr,

    /// Milliseconds to wait for a directory answer.
    #[arg(long, default_value_t = 5000, env = "PARLEY_REQUEST_TIMEOUT_MS")]
    request_timeout: u64,

    /// Create this room on startup.
    #[arg(long, conflicts_with = "join")]
    create: Option<String>,

    /// Join this room on startup.
    #[arg(long)]
    join: Option<String>,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_directory(self.directory)
            .with_bind_addr(self.bind)
            .with_request_timeout(Duration::from_millis(self.request_timeout))
    }

    fn first_step(&self) -> Option<Step> {
        match (&self.create, &self.join) {
            (Some(room), _) => Some(Step::Create(room.clone())),
            (None, Some(room)) => Some(Step::Join(room.clone())),
            (None, None) => None,
        }
    }
}

/// What a prompt line asks for while outside a room.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    List,
    Create(String),
    Join(String),
    Exit,
}

fn parse_step(line: &str) -> Option<Step> {
    let mut words = line.split_whitespace();
    let step = match (words.next()?, words.next()) {
        ("/list", None) => Step::List,
        ("/create", Some(room)) => Step::Create(room.to_string()),
        ("/join", Some(room)) => Step::Join(room.to_string()),
        ("/exit", None) => Step::Exit,
        _ => return None,
    };
    words.next().is_none().then_some(step)
}

fn parse_command(line: &str) -> UserCommand {
    match line.trim() {
        "/leave" => UserCommand::Leave,
        "/exit" => UserCommand::Exit,
        _ => UserCommand::Say(line.to_string()),
    }
}

fn render(output: &SessionOutput) -> String {
    match output {
        SessionOutput::Chat(delivery) if delivery.recovered => {
            format!("{}: {} (recovered)", delivery.user, delivery.body)
        }
        SessionOutput::Chat(delivery) => format!("{}: {}", delivery.user, delivery.body),
        SessionOutput::Event(SessionEvent::MemberJoined { user, member }) => {
            format!("* {user} joined from {member}")
        }
        SessionOutput::Event(SessionEvent::MemberLeft { user, .. }) => format!("* {user} left"),
        SessionOutput::Event(SessionEvent::UnrecoverableGap { peer, missing }) => {
            format!("* {} message(s) from port {peer} could not be recovered", missing.len())
        }
        SessionOutput::Notice(text) => format!("! {text}"),
    }
}

/// Forwards stdin lines to a running session until it ends. A closed stdin
/// counts as `/exit`.
async fn chat(
    session: ChatSession,
    lines: &mut mpsc::Receiver<String>,
) -> anyhow::Result<SessionEnd> {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let mut running = tokio::spawn(session.run(cmd_rx));

    loop {
        tokio::select! {
            ended = &mut running => return Ok(ended?),
            line = lines.recv() => {
                let command = line.map_or(UserCommand::Exit, |line| parse_command(&line));
                if cmd_tx.send(command).await.is_err() {
                    return Ok((&mut running).await?);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    let directory = DirectoryClient::from_config(&config);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(output) = out_rx.recv().await {
            println!("{}", render(&output));
        }
    });

    let (line_tx, mut lines) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut next = cli.first_step();
    loop {
        let step = match next.take() {
            Some(step) => step,
            None => {
                println!("/list | /create ROOM | /join ROOM | /exit");
                let Some(line) = lines.recv().await else {
                    return Ok(());
                };
                match parse_step(&line) {
                    Some(step) => step,
                    None => continue,
                }
            }
        };

        let session = match step {
            Step::Exit => return Ok(()),
            Step::List => {
                match directory.list().await {
                    Ok(rooms) if rooms.is_empty() => println!("no rooms"),
                    Ok(rooms) => {
                        for (room, count) in rooms {
                            println!("{room} ({count})");
                        }
                    }
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            Step::Create(room) => ChatSession::create(&config, &room, &cli.user, out_tx.clone()).await,
            Step::Join(room) => ChatSession::join(&config, &room, &cli.user, out_tx.clone()).await,
        };

        let session = match session {
            Ok(session) => session,
            Err(ParleyError::Rejected { message, .. }) => {
                println!("{message}");
                continue;
            }
            Err(e) => {
                println!("directory unreachable: {e}");
                continue;
            }
        };
        println!("in '{}' as {}", session.engine().room(), session.me());

        match chat(session, &mut lines).await? {
            SessionEnd::Left => println!("left the room"),
            SessionEnd::Exited => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step() {
        assert_eq!(parse_step("/list"), Some(Step::List));
        assert_eq!(parse_step("/create r1"), Some(Step::Create("r1".into())));
        assert_eq!(parse_step("  /join r1 "), Some(Step::Join("r1".into())));
        assert_eq!(parse_step("/join"), None);
        assert_eq!(parse_step("/join a b"), None);
        assert_eq!(parse_step("hello"), None);
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/leave"), UserCommand::Leave);
        assert_eq!(parse_command("/exit "), UserCommand::Exit);
        assert_eq!(parse_command("hi all"), UserCommand::Say("hi all".into()));
    }

    #[test]
    fn test_render_notice() {
        let notice = SessionOutput::Notice("directory unreachable".into());
        assert_eq!(render(&notice), "! directory unreachable");
    }

    #[test]
    fn test_cli_create_and_join_conflict() {
        let both = Cli::try_parse_from([
            "parley-chat", "--user", "ana", "--create", "a", "--join", "b",
        ]);
        assert!(both.is_err());

        let cli = Cli::parse_from(["parley-chat", "--user", "ana", "--join", "b"]);
        assert_eq!(cli.first_step(), Some(Step::Join("b".into())));
        assert_eq!(cli.config().directory_addr.to_string(), parley::DEFAULT_DIRECTORY_ADDR);
    }
}
