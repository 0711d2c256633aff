//! Sync-Song participant (syncsong-client) - Main entry point
//!
//! Headless room participant driven from the terminal. Playback runs on a
//! simulated player, so the process shows exactly what a real embedded
//! player would be told to do.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use syncsong_client::lobby::{normalize_room_code, LobbyClient};
use syncsong_client::session::{session_endpoint, SessionConfig, SessionDriver, UserCommand};
use syncsong_client::sim_player::{SimClock, SimulatedPlayerProvider};
use syncsong_client::EngineFeatures;
use syncsong_common::config::load_config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for syncsong-client
#[derive(Parser, Debug)]
#[command(name = "syncsong-client")]
#[command(about = "Sync-Song room participant")]
#[command(version)]
struct Args {
    /// Authority base URL (overrides the config file)
    #[arg(short, long, env = "SYNCSONG_SERVER_URL")]
    server: Option<String>,

    /// Path to config file
    #[arg(short, long, env = "SYNCSONG_CONFIG")]
    config: Option<PathBuf>,

    /// Only synchronize playback: no roster, no search
    #[arg(long)]
    minimal: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new room and join it
    Create,
    /// Join an existing room
    Join {
        /// Room code
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("syncsong_client={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut client_config = config.client.clone();
    if let Some(server) = args.server {
        client_config.server_url = server;
    }

    let lobby = LobbyClient::new(&client_config.server_url)
        .context("Failed to build HTTP client")?;
    let code = match args.command {
        Command::Create => lobby
            .create_new_room()
            .await
            .context("Failed to create room")?,
        Command::Join { code } => {
            let code = normalize_room_code(&code).context("Room codes are letters and digits")?;
            if !lobby
                .room_exists(&code)
                .await
                .context("Failed to look up room")?
            {
                anyhow::bail!("Room {} does not exist", code);
            }
            code
        }
    };

    let mut session_config = SessionConfig::from_client_config(&client_config, &code);
    if args.minimal {
        session_config.features = EngineFeatures::minimal();
    }
    info!(
        "Room {} ({})",
        code,
        session_endpoint(&session_config).context("Invalid server URL")?
    );

    let provider = SimulatedPlayerProvider::new(SimClock::System);
    let (driver, handle) = SessionDriver::new(session_config, provider);
    let session = tokio::spawn(driver.run());

    let mut status = handle.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!(
                "{:?} | media: {} | role: {} | participants: {}",
                current.state,
                current.media.as_deref().unwrap_or("-"),
                current.role.map(|r| r.as_str()).unwrap_or("-"),
                current.participants
            );
            for (index, result) in current.search_results.iter().enumerate() {
                info!("  [{}] {} ({})", index, result.title, result.url);
            }
        }
    });

    println!("Commands: play | pause | seek <secs> | url <locator> | search <text> | pick <n> | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                warn!("Unrecognized command: {}", line.trim());
            }
            continue;
        };
        let leaving = command == UserCommand::Leave;
        if handle.send(command).is_err() || leaving {
            break;
        }
    }
    let _ = handle.send(UserCommand::Leave);

    session
        .await
        .context("Session task panicked")?
        .context("Session ended")?;
    info!("Left room {}", code);
    Ok(())
}

fn parse_command(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match verb {
        "play" => Some(UserCommand::Play),
        "pause" => Some(UserCommand::Pause),
        "seek" => rest.parse().ok().map(UserCommand::Seek),
        "url" if !rest.is_empty() => Some(UserCommand::ChangeMedia(rest.to_string())),
        "search" if !rest.is_empty() => Some(UserCommand::Search(rest.to_string())),
        "pick" => rest.parse().ok().map(UserCommand::SelectResult),
        "quit" | "exit" | "leave" => Some(UserCommand::Leave),
        _ => None,
    }
}
