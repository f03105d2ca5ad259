use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Input, Select};

use crate::client::websocket_client::ViewerClient;
use crate::config::{Bounds, EngineConfig};
use crate::core::websocket_host::Host;
use crate::logging::init_logging;

#[derive(Parser)]
#[command(name = "lanmafia")]
#[command(about = "A host-authoritative social-deduction party game for the local network")]
#[command(version)]
pub struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host a session
    Host {
        /// Address to bind the server to
        #[arg(short, long, default_value = "0.0.0.0:4000")]
        addr: String,

        /// Also take a seat at the table (as its host) under this name
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Join a session
    Join {
        /// Host address, e.g. "192.168.1.20:4000"
        addr: String,

        /// Player name
        #[arg(short, long, default_value = "Player")]
        name: String,
    },
}

/// Engine settings: a JSON file, then individual overrides.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// JSON config file; missing fields use defaults
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "N")]
    pub min_players: Option<usize>,

    #[arg(long, value_name = "N")]
    pub max_players: Option<usize>,

    #[arg(long, value_name = "SECS")]
    pub reveal_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub night_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub discussion_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub voting_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub results_secs: Option<u64>,

    #[arg(long, value_name = "SECS")]
    pub game_over_secs: Option<u64>,
}

impl ConfigArgs {
    /// Builds the engine config: defaults, then the file, then flags.
    pub fn resolve(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_path(path)?,
            None => EngineConfig::default(),
        };

        let players = config.players;
        config.players = Bounds::new(
            self.min_players.unwrap_or(players.min),
            self.max_players.unwrap_or(players.max),
        );
        let d = &mut config.durations;
        for (flag, slot) in [
            (self.reveal_secs, &mut d.role_reveal),
            (self.night_secs, &mut d.night),
            (self.discussion_secs, &mut d.discussion),
            (self.voting_secs, &mut d.voting),
            (self.results_secs, &mut d.results),
            (self.game_over_secs, &mut d.game_over),
        ] {
            if let Some(secs) = flag {
                *slot = Duration::from_secs(secs);
            }
        }

        config.validate().context("invalid engine configuration")?;
        Ok(config)
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Host { addr, name, config }) => host_session(&addr, name, config.resolve()?).await,
        Some(Commands::Join { addr, name }) => join_session(&addr, name).await,
        None => show_main_menu().await,
    }
}

async fn host_session(addr: &str, name: Option<String>, config: EngineConfig) -> Result<()> {
    let host = Host::bind(addr, config).await?;
    let local = host.local_addr();
    println!("Hosting on ws://{local}. Others join with: lanmafia join <this-machine-ip>:{}", local.port());

    let Some(name) = name else {
        return host.run().await;
    };
    // The first viewer to join becomes the session host, so seat ourselves first.
    let mut viewer = ViewerClient::new(name);
    let own_addr = format!("127.0.0.1:{}", local.port());
    tokio::select! {
        hosted = host.run() => hosted,
        played = viewer.connect_and_play(&own_addr) => played,
    }
}

async fn join_session(addr: &str, name: String) -> Result<()> {
    println!("Connecting to {addr} as '{name}'...");
    ViewerClient::new(name).connect_and_play(addr).await
}

async fn show_main_menu() -> Result<()> {
    println!("lanmafia: a party game of killers, healers and suspicion");
    println!();

    let options = ["Host a game", "Join a game", "Exit"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do?")
        .items(&options)
        .default(0)
        .interact()?;

    match selection {
        0 => {
            let addr: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Bind address")
                .default("0.0.0.0:4000".to_string())
                .interact_text()?;
            let name: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Your name")
                .default("Host".to_string())
                .interact_text()?;
            host_session(&addr, Some(name), EngineConfig::default()).await
        }
        1 => {
            let addr: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Host address")
                .default("127.0.0.1:4000".to_string())
                .interact_text()?;
            let name: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Your name")
                .default("Player".to_string())
                .interact_text()?;
            join_session(&addr, name).await
        }
        _ => {
            println!("Goodbye!");
            Ok(())
        }
    }
}
