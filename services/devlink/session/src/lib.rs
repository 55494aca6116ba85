//! Correlation cache, login handshake and channel plumbing for the
//! device-link binary protocol.
//!
//! This crate owns the stateful half of the adapter: the shared
//! [`CorrelationCache`], the per-channel [`HandshakeState`] machine, and
//! the TCP/UDP loops that feed bytes through the `devlink-wire` codecs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use devlink_session::{
//!     listen_tcp, run_tcp_channel, ChannelConfig, CorrelationCache, StaticSecretStore,
//! };
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut secrets = StaticSecretStore::new();
//! secrets.insert("dev-1", "s3cr3t");
//! let secrets = Arc::new(secrets);
//! let cache = Arc::new(CorrelationCache::new());
//! let (tx, mut rx) = mpsc::channel(1024);
//!
//! let listener = listen_tcp("0.0.0.0:8802".parse()?).await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let secrets = Arc::clone(&secrets);
//!     let cache = Arc::clone(&cache);
//!     let tx = tx.clone();
//!     tokio::spawn(async move {
//!         let _ = run_tcp_channel(stream, secrets, cache, ChannelConfig::default(), tx).await;
//!     });
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod correlation;
pub mod error;
pub mod handshake;
pub mod secret;
pub mod transport;
pub mod udp;

// Re-export main types
pub use channel::{encode_outbound, keepalive_frame, ChannelEvent, DeviceChannel};
pub use correlation::{CorrelationCache, NO_CORRELATION};
pub use error::SessionError;
pub use handshake::{ack_for, authenticate, HandshakeState, HandshakeVerdict};
pub use secret::{SecretStore, StaticSecretStore};
pub use transport::{connect_tcp, listen_tcp, run_tcp_channel, run_udp, ChannelConfig};
pub use udp::{encode_outbound_datagram, handle_datagram, DatagramEvent};
