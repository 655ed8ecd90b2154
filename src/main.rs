//! starhaven - host-authoritative chunk sync for a wrap-around tile sandbox
//!
//! Headless executable: host or join a session over QUIC, or run a host and
//! clients in-process over the loopback transport.

mod config;
mod run;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use starhaven_net::QuicTransport;
use starhaven_session::NetworkHandler;
use starhaven_testkit::{Harness, HeadlessGame, ReportSink};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Host-authoritative chunk sync for a wrap-around tile sandbox", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured player name
    #[arg(long)]
    name: Option<String>,

    /// Stop after this many frames (runs until the session ends otherwise)
    #[arg(long)]
    frames: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host a session and accept clients over QUIC
    Host {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:4433")]
        bind: SocketAddr,
        /// World seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Join a hosted session over QUIC
    Join {
        /// Address of the host
        #[arg(long)]
        host: SocketAddr,
    },
    /// Run a host and clients in-process and log a summary
    Loopback {
        /// Number of clients
        #[arg(long, default_value_t = 2)]
        clients: usize,
        /// Frames to run
        #[arg(long, default_value_t = 200)]
        ticks: u64,
        /// World seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
        /// Write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_problem) = AppConfig::load_from_path(&args.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();
    if let Some(problem) = config_problem {
        warn!("{problem}");
    }
    let mut config = config.sanitized();
    if let Some(name) = args.name {
        config.player_name = name;
    }

    info!("Starting starhaven v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Host { bind, seed } => {
            let seed = seed.or(config.seed).unwrap_or_else(rand::random);
            let session = &config.session;
            let transport = QuicTransport::host(bind).context("Failed to start host transport")?;
            info!(addr = %transport.local_addr(), seed, "hosting");
            let mut handler = NetworkHandler::host(transport, session.clone());
            let mut game = HeadlessGame::host(
                &config.player_name,
                seed,
                session.world_size,
                session.starting_planet,
                session.spawn_water_search_radius,
            );
            run::run_session(&mut handler, &mut game, args.frames);
        }
        Command::Join { host } => {
            let transport = QuicTransport::join(host).with_context(|| format!("Failed to connect to {host}"))?;
            let mut handler = NetworkHandler::client(transport, config.session.clone());
            let mut game = HeadlessGame::new(&config.player_name, 0, config.session.world_size);
            run::run_session(&mut handler, &mut game, args.frames);
        }
        Command::Loopback {
            clients,
            ticks,
            seed,
            report,
        } => {
            let seed = seed.or(config.seed).unwrap_or(0);
            let mut harness = Harness::new(config.session.clone(), seed);
            for i in 0..clients {
                harness.add_client(&format!("{}-{i}", config.player_name));
            }
            harness.run(args.frames.unwrap_or(ticks));
            let summary = harness.report("loopback");
            run::log_report(&summary);
            if let Some(path) = report {
                ReportSink::create(&path)?.write(&summary)?;
                info!(path = %path.display(), "report written");
            }
        }
    }
    Ok(())
}
