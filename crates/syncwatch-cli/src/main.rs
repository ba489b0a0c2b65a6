//! SyncWatch CLI - host or join a watch party from the terminal
//!
//! Playback is simulated: the clock advances in real time and is driven by
//! commands typed on stdin, so two terminals are enough to watch a party
//! stay in sync.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use syncwatch_core::DEFAULT_WS_PORT;
use syncwatch_party::{
    PartyConfig, PartyEvent, PartyHandle, PartyRuntime, PartyState, PartyStatus, SimulatedClock,
};
use syncwatch_transport::{WebSocketConfig, WebSocketNetwork};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod console;

use console::ConsoleCommand;

/// SyncWatch - host-driven watch parties
#[derive(Parser)]
#[command(name = "syncwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML with [party] and [websocket] sections)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Length of the simulated media in seconds
    #[arg(short, long, global = true, default_value = "5400")]
    duration: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a party; the printed id or link lets others join
    Host {
        /// Address to listen on
        #[arg(long, default_value_t = default_listen())]
        listen: String,

        /// Host name to put in the party id instead of the bound address
        #[arg(long, env = "SYNCWATCH_ADVERTISE")]
        advertise: Option<String>,

        /// Base URL of share links
        #[arg(long)]
        share_base: Option<String>,
    },

    /// Join a party by id or share link
    Join {
        /// Party id (ws://host:port) or share link
        target: String,
    },
}

fn default_listen() -> String {
    format!("0.0.0.0:{}", DEFAULT_WS_PORT)
}

/// Settings file layout
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    party: PartyConfig,
    websocket: WebSocketConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let file = load_config(cli.config.as_deref())?;
    let mut party_config = file.party;
    let mut ws_config = file.websocket;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    let clock = Box::new(SimulatedClock::new(Some(cli.duration)));

    let handle = match cli.command {
        Commands::Host {
            listen,
            advertise,
            share_base,
        } => {
            if advertise.is_some() {
                ws_config.advertise_host = advertise;
            }
            if let Some(base) = share_base {
                party_config.share_base_url = base;
            }
            let network = Arc::new(WebSocketNetwork::with_config(ws_config));
            let (handle, _task) = PartyRuntime::spawn(party_config, network, Some(clock));
            handle.on_event(print_event);

            println!(
                "{} Starting party on {}",
                "SYNCWATCH".cyan().bold(),
                listen
            );
            let state = handle.start_party(Some(&listen)).await?;
            if state.status != PartyStatus::Hosting {
                bail!("could not host on {}", listen);
            }
            if let Some(id) = &state.peer_id {
                println!("{} Party id:   {}", "OK".green().bold(), id.yellow());
            }
            if let Some(link) = &state.share_link {
                println!("{} Share link: {}", "OK".green().bold(), link);
            }
            handle
        }

        Commands::Join { target } => {
            // Guests only dial
            ws_config.listen = None;
            let network = Arc::new(WebSocketNetwork::with_config(ws_config));
            let (handle, _task) = PartyRuntime::spawn(party_config, network, Some(clock));
            handle.on_event(print_event);

            println!(
                "{} Joining {}",
                "SYNCWATCH".cyan().bold(),
                target.yellow()
            );
            handle.join_party(&target).await?;
            handle
        }
    };

    println!("Type 'help' for commands.");
    run_console(&handle, &mut shutdown_rx).await?;

    handle.shutdown().await?;
    println!("{}", "Bye".yellow());
    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    debug!("loaded config from {}", path.display());
    Ok(config)
}

async fn run_console(handle: &PartyHandle, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line.context("Failed to read stdin")? {
                    Some(line) => line,
                    None => return Ok(()),
                };
                let command = match console::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{}", e.to_string().red());
                        continue;
                    }
                };
                if !execute(handle, command).await? {
                    return Ok(());
                }
            }
            _ = shutdown_rx.recv() => return Ok(()),
        }
    }
}

/// Returns false when the console should exit
async fn execute(handle: &PartyHandle, command: ConsoleCommand) -> Result<bool> {
    let done = match command {
        ConsoleCommand::Play => handle.play().await?,
        ConsoleCommand::Pause => handle.pause().await?,
        ConsoleCommand::Toggle => handle.toggle_play_pause().await?,
        ConsoleCommand::Seek(delta) => handle.seek_by(delta).await?,
        ConsoleCommand::Goto(time) => handle.seek_to(time).await?,
        ConsoleCommand::Scrub(fraction) => handle.scrub_to(fraction).await?,
        ConsoleCommand::Status => {
            print_state(&handle.state().await?);
            return Ok(true);
        }
        ConsoleCommand::Leave => {
            handle.end_party().await?;
            return Ok(true);
        }
        ConsoleCommand::Help => {
            println!("{}", console::HELP);
            return Ok(true);
        }
        ConsoleCommand::Quit => return Ok(false),
    };

    if done {
        if let Some(playback) = handle.state().await?.playback {
            println!(
                "{} {} {}",
                "OK".green().bold(),
                if playback.is_playing { "playing" } else { "paused" },
                console::format_time(playback.time)
            );
        }
    } else {
        println!("{}", "ignored (casting, syncing, or nothing to do)".dimmed());
    }
    Ok(true)
}

fn print_event(event: &PartyEvent) {
    match event {
        PartyEvent::StatusChanged(status) => {
            let text = status.to_string();
            let text = match status {
                PartyStatus::Hosting | PartyStatus::Connected => text.green(),
                PartyStatus::Connecting => text.yellow(),
                PartyStatus::Error => text.red(),
                PartyStatus::Disconnected => text.normal(),
            };
            println!("{} {}", "STATUS".cyan().bold(), text);
        }
        PartyEvent::Notice(text) => println!("{} {}", "NOTICE".yellow().bold(), text),
        PartyEvent::PeerJoined(peer) => println!("{} {} joined", "PEER".cyan(), peer),
        PartyEvent::PeerLeft(peer) => println!("{} {} left", "PEER".cyan(), peer),
    }
}

fn print_state(state: &PartyState) {
    println!("Status:   {} ({})", state.status, state.role);
    if let Some(id) = &state.peer_id {
        println!("Peer id:  {}", id);
    }
    if let Some(link) = &state.share_link {
        println!("Link:     {}", link);
    }
    if state.guest_count > 0 {
        println!("Guests:   {}", state.guest_count);
    }
    if let Some(playback) = &state.playback {
        println!(
            "Playback: {} at {}",
            if playback.is_playing { "playing" } else { "paused" },
            console::format_time(playback.time)
        );
    }
}
