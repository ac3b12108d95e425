#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! tor-dam daemon entrypoint.
//!
//! Reference workflow of the peer discovery: generate or load the signing
//! key, spawn and configure Tor, serve the announce RPCs, then fan out to
//! the configured seeds.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use tordam::{
    config::{Config, FileConfig, Overrides},
    core::{
        identity::Identity,
        peers::{PeerRegistry, DB_FILE},
    },
    monitoring::metrics::Metrics,
    networking::{fanout, rpc, tor::TorProcess},
    node::Node,
};

const HOSTNAME_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "tor-dam", version, about = "Peer discovery daemon for Tor hidden services")]
struct Cli {
    /// Data directory
    #[arg(short = 'd', long, env = "TORDAM_DATADIR")]
    datadir: Option<PathBuf>,

    /// Local JSON-RPC listen address
    #[arg(short = 'l', long, env = "TORDAM_LISTEN")]
    listen: Option<String>,

    /// Map of ports forwarded to/from Tor (comma-separated src:dst)
    #[arg(short = 'm', long, env = "TORDAM_PORTMAP")]
    portmap: Option<String>,

    /// List of initial peers (comma-separated onion:port)
    #[arg(short = 's', long, env = "TORDAM_SEEDS")]
    seeds: Option<String>,

    /// (Re)generate keys and exit
    #[arg(short = 'g', long)]
    generate: bool,

    /// Do not announce to peers
    #[arg(short = 'n', long)]
    no_announce: bool,

    /// Re-announce every N seconds (omit or 0 to announce once)
    #[arg(short = 'i', long, env = "TORDAM_ANNOUNCE_INTERVAL")]
    announce_interval: Option<u64>,
}

fn default_datadir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".dam"),
        None => PathBuf::from(".dam"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let datadir = cli.datadir.clone().unwrap_or_else(default_datadir);

    if cli.generate {
        Identity::generate(&datadir).context("key generation failed")?;
        return Ok(());
    }

    let file_cfg = FileConfig::load(&datadir).context("config file")?;
    let cfg = Config::resolve(
        datadir,
        file_cfg,
        Overrides {
            listen: cli.listen,
            portmap: cli.portmap,
            seeds: cli.seeds,
            no_announce: cli.no_announce,
            announce_interval: cli.announce_interval,
        },
    )?;

    fanout::validate_seeds(&cfg.seeds).context("invalid seed")?;

    let identity = Identity::load(&cfg.datadir)
        .context("loading signing key (run with -g to generate one)")?;
    info!(
        pubkey = %identity.fingerprint(),
        git = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "tor-dam starting"
    );

    let peers = Arc::new(PeerRegistry::load_or_default(cfg.datadir.join(DB_FILE)));
    let metrics = Arc::new(Metrics::new().context("metrics init")?);

    let mut tor = TorProcess::spawn(&cfg.datadir, cfg.listen, &cfg.portmap)
        .await
        .context("spawning tor")?;
    info!(socks = %tor.socks_addr(), "started tor daemon");

    let hostname = tor
        .hostname(HOSTNAME_WAIT)
        .await
        .context("reading hidden service hostname")?;
    let onion = format!("{}:{}", hostname, cfg.listen.port());
    info!(onion = %onion, "our onion address");

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("binding listener on {}", cfg.listen))?;
    info!(addr = %cfg.listen, "started JSON-RPC server");

    let node = Arc::new(Node {
        socks_addr: tor.socks_addr(),
        cfg,
        identity,
        peers,
        onion,
        metrics,
    });

    let server = tokio::spawn(rpc::serve(listener, Arc::clone(&node)));

    if !node.cfg.announce {
        // Serve the responder and sit here until interrupted.
        tokio::signal::ctrl_c().await.context("signal handler")?;
        info!("interrupted, shutting down");
        server.abort();
        tor.kill().await;
        return Ok(());
    }

    fanout::run(Arc::clone(&node))
        .await
        .context("bootstrap loop")?;

    server.abort();
    tor.kill().await;
    Ok(())
}
