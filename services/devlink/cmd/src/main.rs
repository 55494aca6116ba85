//! Device-link protocol adapter binary.
//!
//! Binds the TCP and UDP listeners, wires them to the binary envelope
//! codecs with a shared correlation cache, and logs every message that
//! makes it through a handshake. The inbound channel is the seam where a
//! real deployment hands messages to the platform.

use clap::Parser;
use devlink_session::{
    listen_tcp, run_tcp_channel, run_udp, ChannelConfig, CorrelationCache, StaticSecretStore,
};
use devlink_wire::registry::MessageKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::AdapterConfig;

/// Device-link binary protocol adapter
#[derive(Parser, Debug)]
#[command(name = "devlink", version, about = "Device-link binary protocol adapter")]
struct Args {
    /// Path to the adapter config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP listen address, e.g. 0.0.0.0:8802
    #[arg(long)]
    tcp_bind: Option<SocketAddr>,

    /// UDP listen address, e.g. 0.0.0.0:8803
    #[arg(long)]
    udp_bind: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => AdapterConfig::load(path)?,
        None => AdapterConfig::default(),
    };
    if let Some(addr) = args.tcp_bind {
        config.tcp_bind = addr;
    }
    if let Some(addr) = args.udp_bind {
        config.udp_bind = addr;
    }
    if config.devices.is_empty() {
        warn!("no device secrets configured; every login will be rejected");
    }

    let mut secrets = StaticSecretStore::new();
    for (device_id, secret) in &config.devices {
        secrets.insert(device_id.clone(), secret.clone());
    }
    let secrets = Arc::new(secrets);
    let cache = Arc::new(CorrelationCache::with_ttls(
        config.correlation_ttl(),
        config.device_idle_ttl(),
    ));

    // drop partitions for devices that went quiet
    {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                cache.purge_idle();
            }
        });
    }

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<devlink_wire::message::DeviceMessage>(1024);

    // platform hand-off seam
    tokio::spawn(async move {
        while let Some(message) = inbound_rx.recv().await {
            info!(
                device = %message.device_id(),
                kind = ?MessageKind::of(&message),
                message_id = message.message_id().unwrap_or("-"),
                "inbound message"
            );
        }
    });

    {
        let socket = UdpSocket::bind(config.udp_bind).await?;
        info!(addr = %config.udp_bind, "udp listener ready");
        let secrets = Arc::clone(&secrets);
        let cache = Arc::clone(&cache);
        let tx = inbound_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = run_udp(socket, secrets, cache, tx).await {
                warn!(%err, "udp loop terminated");
            }
        });
    }

    let listener = listen_tcp(config.tcp_bind).await?;
    info!(addr = %config.tcp_bind, "tcp listener ready");
    let channel_config = ChannelConfig {
        max_frame_size: config.max_frame_size,
        login_timeout: config.login_timeout(),
    };

    loop {
        let (stream, peer) = listener.accept().await?;
        let secrets = Arc::clone(&secrets);
        let cache = Arc::clone(&cache);
        let tx = inbound_tx.clone();
        let config = channel_config.clone();
        tokio::spawn(async move {
            if let Err(err) = run_tcp_channel(stream, secrets, cache, config, tx).await {
                warn!(%peer, %err, "channel terminated");
            }
        });
    }
}
