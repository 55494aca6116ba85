//! TCP listener/dialer helpers and the channel read loops.
//!
//! The codecs themselves never block; this module is where the adapter
//! actually waits — for bytes from a socket and for the secret lookup
//! during login. Frames from one connection are processed strictly in the
//! order received.

use crate::channel::{ChannelEvent, DeviceChannel};
use crate::correlation::CorrelationCache;
use crate::error::SessionError;
use crate::handshake::HandshakeState;
use crate::secret::SecretStore;
use crate::udp::{handle_datagram, DatagramEvent};
use bytes::{Bytes, BytesMut};
use devlink_wire::frame::FrameDecoder;
use devlink_wire::message::DeviceMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Create a TCP listener bound to the given address
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Connect to a TCP address
pub async fn connect_tcp(addr: SocketAddr) -> tokio::io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

/// Transport knobs for a device channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upper bound applied to inbound frame bodies
    pub max_frame_size: usize,
    /// How long a channel may sit unauthenticated before being dropped;
    /// `None` tolerates a silent peer forever
    pub login_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 1024 * 1024,
            login_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Drive one accepted TCP connection until EOF, rejection or error.
/// Decoded messages are surfaced on `inbound_tx`.
pub async fn run_tcp_channel<S>(
    mut stream: TcpStream,
    secrets: Arc<S>,
    cache: Arc<CorrelationCache>,
    config: ChannelConfig,
    inbound_tx: mpsc::Sender<DeviceMessage>,
) -> anyhow::Result<()>
where
    S: SecretStore + ?Sized,
{
    let peer = stream.peer_addr()?;
    let mut channel = DeviceChannel::new(FrameDecoder::with_max_frame_size(config.max_frame_size));
    let mut read_buf = BytesMut::with_capacity(8 * 1024);
    let opened = Instant::now();

    loop {
        let read = if channel.state() == HandshakeState::AwaitingLogin {
            match read_with_deadline(&mut stream, &mut read_buf, config.login_timeout, opened).await
            {
                Some(read) => read?,
                None => {
                    warn!(%peer, "closing channel: no login within deadline");
                    return Ok(());
                }
            }
        } else {
            stream.read_buf(&mut read_buf).await?
        };

        if read == 0 {
            debug!(%peer, "connection closed by peer");
            return Ok(());
        }

        for body in channel.push_bytes(&mut read_buf)? {
            match channel
                .handle_frame(body, secrets.as_ref(), cache.as_ref())
                .await
            {
                Ok(ChannelEvent::Accepted { message, reply }) => {
                    stream.write_all(&reply).await?;
                    let _ = inbound_tx.send(message).await;
                }
                Ok(ChannelEvent::Rejected { reply }) => {
                    stream.write_all(&reply).await?;
                    stream.flush().await?;
                    stream.shutdown().await?;
                    info!(%peer, "channel rejected during login");
                    return Ok(());
                }
                Ok(ChannelEvent::Inbound { message }) => {
                    let _ = inbound_tx.send(message).await;
                }
                Ok(ChannelEvent::Ignored) => {}
                // a bad envelope spoils only its own frame
                Err(SessionError::Wire(err)) => {
                    warn!(%peer, %err, "dropping undecodable frame");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

async fn read_with_deadline(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    limit: Option<Duration>,
    opened: Instant,
) -> Option<std::io::Result<usize>> {
    match limit {
        Some(limit) => {
            let remaining = limit.checked_sub(opened.elapsed())?;
            tokio::time::timeout(remaining, stream.read_buf(buf))
                .await
                .ok()
        }
        None => Some(stream.read_buf(buf).await),
    }
}

/// Serve datagrams on `socket`: each one is authenticated and acknowledged
/// on its own. Malformed datagrams are dropped without a reply.
pub async fn run_udp<S>(
    socket: UdpSocket,
    secrets: Arc<S>,
    cache: Arc<CorrelationCache>,
    inbound_tx: mpsc::Sender<DeviceMessage>,
) -> anyhow::Result<()>
where
    S: SecretStore + ?Sized,
{
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let payload = Bytes::copy_from_slice(&buf[..len]);
        match handle_datagram(payload, secrets.as_ref(), cache.as_ref()).await {
            Ok(DatagramEvent::Accepted { message, reply }) => {
                socket.send_to(&reply, peer).await?;
                let _ = inbound_tx.send(message).await;
            }
            Ok(DatagramEvent::Rejected { reply }) => {
                socket.send_to(&reply, peer).await?;
            }
            Ok(DatagramEvent::Ignored) => {}
            Err(err) => {
                debug!(%peer, %err, "dropping malformed datagram");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecretStore;
    use devlink_wire::envelope;
    use devlink_wire::frame::encode_frame;
    use devlink_wire::message::{AckCode, OnlineMessage, ReportPropertyMessage};
    use devlink_wire::value::Value;

    fn fixtures() -> (Arc<StaticSecretStore>, Arc<CorrelationCache>) {
        let mut secrets = StaticSecretStore::new();
        secrets.insert("dev-1", "s3cr3t");
        (Arc::new(secrets), Arc::new(CorrelationCache::new()))
    }

    fn framed(message: &DeviceMessage, sequence: u16) -> Bytes {
        let mut buf = BytesMut::new();
        envelope::write_message(message, sequence, &mut buf).unwrap();
        encode_frame(&buf)
    }

    async fn read_frame(stream: &mut TcpStream) -> Option<Bytes> {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        loop {
            if let Some(body) = decoder.decode(&mut buf).unwrap() {
                return Some(body);
            }
            if stream.read_buf(&mut buf).await.unwrap() == 0 {
                return None;
            }
        }
    }

    #[tokio::test]
    async fn test_login_then_report_over_tcp() {
        let (secrets, cache) = fixtures();
        let listener = listen_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_tcp_channel(stream, secrets, cache, ChannelConfig::default(), tx)
                .await
                .unwrap();
        });

        let mut client = connect_tcp(addr).await.unwrap();
        let online = DeviceMessage::Online(OnlineMessage::new("dev-1", "s3cr3t"));
        client.write_all(&framed(&online, 1)).await.unwrap();

        let mut ack_body = read_frame(&mut client).await.unwrap();
        let (ack, seq) = envelope::read_message(&mut ack_body, None).unwrap().unwrap();
        match ack {
            DeviceMessage::Acknowledge(ack) => assert_eq!(ack.code, AckCode::Ok),
            other => panic!("expected ack, got {other:?}"),
        }
        assert_eq!(seq, 1);
        assert!(matches!(rx.recv().await.unwrap(), DeviceMessage::Online(_)));

        let report = DeviceMessage::ReportProperty(ReportPropertyMessage::new(
            "dev-1",
            vec![("temp".to_string(), Value::Float64(32.88))],
        ));
        client.write_all(&framed(&report, 2)).await.unwrap();

        match rx.recv().await.unwrap() {
            DeviceMessage::ReportProperty(m) => {
                assert_eq!(m.device_id, "dev-1");
                assert_eq!(m.properties, vec![("temp".to_string(), Value::Float64(32.88))]);
            }
            other => panic!("expected report, got {other:?}"),
        }

        drop(client);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_login_closes_connection() {
        let (secrets, cache) = fixtures();
        let listener = listen_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_tcp_channel(stream, secrets, cache, ChannelConfig::default(), tx)
                .await
                .unwrap();
        });

        let mut client = connect_tcp(addr).await.unwrap();
        let online = DeviceMessage::Online(OnlineMessage::new("dev-1", "wrong"));
        client.write_all(&framed(&online, 1)).await.unwrap();

        let mut ack_body = read_frame(&mut client).await.unwrap();
        let (ack, _) = envelope::read_message(&mut ack_body, None).unwrap().unwrap();
        match ack {
            DeviceMessage::Acknowledge(ack) => assert_eq!(ack.code, AckCode::NoAuth),
            other => panic!("expected ack, got {other:?}"),
        }

        // server closes after the reply; EOF follows
        assert!(read_frame(&mut client).await.is_none());
        server.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_login_deadline_drops_silent_peer() {
        let (secrets, cache) = fixtures();
        let listener = listen_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let config = ChannelConfig {
            login_timeout: Some(Duration::from_millis(50)),
            ..ChannelConfig::default()
        };

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_tcp_channel(stream, secrets, cache, config, tx).await.unwrap();
        });

        let mut client = connect_tcp(addr).await.unwrap();
        // never log in; the server should give up on its own
        server.await.unwrap();
        let mut probe = [0u8; 1];
        let read = client.read(&mut probe).await.unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_udp_report_roundtrip() {
        let (secrets, cache) = fixtures();
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let _ = run_udp(server_socket, secrets, cache, tx).await;
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let report = DeviceMessage::ReportProperty(ReportPropertyMessage::new(
            "dev-1",
            vec![("temp".to_string(), Value::Float64(32.88))],
        ));
        let payload =
            devlink_wire::datagram::encode_datagram("s3cr3t", &report, 9).unwrap();
        client.send_to(&payload, server_addr).await.unwrap();

        let mut buf = vec![0u8; 64 * 1024];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        let reply = devlink_wire::datagram::decode_datagram(Bytes::copy_from_slice(&buf[..len]))
            .unwrap()
            .unwrap();
        match reply.message {
            DeviceMessage::Acknowledge(ack) => assert_eq!(ack.code, AckCode::Ok),
            other => panic!("expected ack, got {other:?}"),
        }

        assert!(matches!(
            rx.recv().await.unwrap(),
            DeviceMessage::ReportProperty(_)
        ));
    }
}
