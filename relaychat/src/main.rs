//! `relaychat`: line-oriented console chat over the relay.
//!
//! Opens one chat with one peer: loads the stored history over REST, opens
//! the relay session, then reads lines from stdin and prints the transcript
//! as it changes. Configuration via CLI flags, environment variables, or
//! config file (`~/.config/relaychat/config.toml`).
//!
//! ```bash
//! cargo run --bin relaychat -- --username alice --peer bob
//!
//! # Same server variables the chat server deployment uses
//! WEBSOCKET_SERVER=ws://127.0.0.1:8000 SERVER=http://127.0.0.1:8080 \
//!     cargo run --bin relaychat -- -u alice -p bob
//! ```
//!
//! Type `/quit` (or close stdin) to leave.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use relaychat::api::{ApiError, Credentials, RestClient};
use relaychat::chat::transcript::{Delivery, StatusIndicator};
use relaychat::chat::{ChatSession, SubmitError};
use relaychat::config::{CliArgs, ClientConfig};

/// Startup failures that end the program.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("no {0} given (use --{0} or the config file)")]
    Missing(&'static str),

    #[error("user {0} not found")]
    PeerNotFound(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Unlike a missing file, a bad file or server address ends startup.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file; stdout belongs to the chat.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("relaychat starting");
    let result = run(&cli, &config).await;
    tracing::info!("relaychat exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("relaychat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(cli: &CliArgs, config: &ClientConfig) -> Result<(), StartupError> {
    let mut username = config
        .username
        .clone()
        .ok_or(StartupError::Missing("username"))?;
    let api = RestClient::new(&config.api_url, config.request_timeout)?;

    if let Some(password) = &cli.password {
        let credentials = Credentials::new(&username, password);
        if cli.register {
            api.register(&credentials).await?;
            println!("Registered {username}");
        }
        api.login(&credentials).await?;
        println!("Logged in as {username}");

        if let Some(new_password) = &cli.new_password {
            api.update_password(&username, password, new_password).await?;
            println!("Password updated");
        }
    }

    if let Some(new_username) = &cli.rename {
        username = api.update_username(&username, new_username).await?;
        println!("Username changed to {username}");
    }

    if cli.list_chats {
        let chats = api.chats(&username).await?;
        if chats.is_empty() {
            println!("No conversations yet. Start a new chat to begin!");
        }
        for chat in &chats {
            println!(
                "{:<16} {}  ({})",
                chat.peer_for(&username),
                chat.text,
                relaychat::format::format_time(&chat.time)
            );
        }
        return Ok(());
    }

    let peer = config.peer.clone().ok_or(StartupError::Missing("peer"))?;
    match api.user_exists(&peer).await {
        Ok(true) => {}
        Ok(false) => return Err(StartupError::PeerNotFound(peer)),
        Err(e) => tracing::warn!(%peer, err = %e, "could not verify peer, continuing"),
    }

    let mut session = ChatSession::new(config.connection_settings(), &username, &peer);
    match api.messages(&username, &peer).await {
        Ok(history) => session.seed_history(&history),
        Err(e) => session.push_notice(e.to_string()),
    }

    println!("Chatting with {peer}. Type /quit to leave.");
    let mut console = Console::default();
    console.render(&session);

    session.open().await;
    session.drain_events();
    console.render(&session);

    chat_loop(&mut session, &mut console).await?;
    session.close();
    Ok(())
}

/// Interleave stdin lines and relay notifications until the user quits.
async fn chat_loop(session: &mut ChatSession, console: &mut Console) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if line.trim() == "/quit" {
                    return Ok(());
                }
                match session.send_message(&line).await {
                    Ok(_) | Err(SubmitError::EmptyMessage) => {}
                    Err(e @ SubmitError::NotLoggedIn) => eprintln!("{e}"),
                }
            }
            event = session.next_event() => {
                let Some(event) = event else {
                    return Ok(());
                };
                session.apply(event);
            }
        }
        console.render(session);
    }
}

/// Prints what changed in the session since the last render.
#[derive(Default)]
struct Console {
    /// Delivery state of every entry already printed.
    printed: Vec<Delivery>,
    indicator: Option<StatusIndicator>,
}

impl Console {
    fn render(&mut self, session: &ChatSession) {
        let entries = session.transcript().entries();

        for (index, was) in self.printed.iter_mut().enumerate() {
            let Some(entry) = entries.get(index) else {
                break;
            };
            if *was == Delivery::Pending && entry.delivery == Delivery::Delivered {
                println!("  {} {:?} at {}", entry.delivery.symbol(), entry.text, entry.time_label);
            }
            *was = entry.delivery;
        }

        for entry in entries.iter().skip(self.printed.len()) {
            println!(
                "[{}] {}: {} {}",
                entry.time_label,
                entry.author.label(),
                entry.text,
                entry.delivery.symbol()
            );
            self.printed.push(entry.delivery);
        }

        let indicator = session.indicator();
        if self.indicator.as_ref() != Some(indicator) {
            println!("  ({}) {}", indicator.level.color(), indicator.tooltip);
            self.indicator = Some(indicator.clone());
        }
    }
}
