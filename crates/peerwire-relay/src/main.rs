//! peerwire Relay Server
//!
//! Pairs two participants' WebSocket connections over a pub/sub bus.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use peerwire_core::config::{self, BusBackend, Config};
use peerwire_core::tracing_init::init_tracing;

use peerwire_relay::Relay;
use peerwire_relay::bus::{BusClient, MemoryBus};
use peerwire_relay::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "peerwire-relay")]
#[command(version, about = "peerwire relay server - pairs peers over a pub/sub bus")]
struct Args {
    /// Path to a JSON config file (default: ~/.config/peerwire/relay.json if present).
    #[arg(long, env = "PEERWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Bus backend: `nats` or `memory`.
    #[arg(long)]
    bus: Option<BusBackend>,

    /// NATS server URL.
    #[arg(long)]
    nats_url: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.addr {
            config.server.listen = addr;
        }
        if let Some(bus) = self.bus {
            config.bus.backend = bus;
        }
        if let Some(url) = &self.nats_url {
            config.bus.nats_url.clone_from(url);
        }
        if self.log_json {
            config.log.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config::validate(&config)?;

    init_tracing(&config.log)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen,
        bus = ?config.bus.backend,
        "Starting peerwire-relay"
    );

    let bus = connect_bus(&config).await?;
    let relay = Arc::new(Relay::new(bus, config.session.clone()));

    let router = server::build_router(
        AppState {
            relay: Arc::clone(&relay),
            max_frame_bytes: config.server.max_frame_bytes,
        },
        &config.server.ws_path,
    );
    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;

    server::serve(listener, router, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
    })
    .await?;

    relay.shutdown().await;
    info!("Relay stopped");
    Ok(())
}

async fn connect_bus(config: &Config) -> anyhow::Result<Arc<dyn BusClient>> {
    match config.bus.backend {
        BusBackend::Memory => {
            info!("Using in-memory bus; only sessions on this node can pair");
            Ok(Arc::new(MemoryBus::new()))
        }
        #[cfg(feature = "nats")]
        BusBackend::Nats => {
            let bus = peerwire_relay::bus::NatsBus::connect(&config.bus.nats_url).await?;
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "nats"))]
        BusBackend::Nats => Err(anyhow::anyhow!(
            "NATS bus requested but peerwire-relay was built without the `nats` feature"
        )),
    }
}
