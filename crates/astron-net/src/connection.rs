//! TCP connection to a message director or client agent.
//!
//! The stream is split into a reader task that reassembles frames and a writer
//! task that drains an outbound queue. The owner polls complete datagrams
//! without blocking, so a repository can drain whatever has arrived once per
//! tick. Either task clears the shared open flag when the stream ends.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::datagram::Datagram;
use crate::framing::{FrameBuffer, FrameConfig, FrameError, encode_frame};

/// Transport failures.
///
/// [`ConnectionError::Refused`] and [`ConnectionError::Closed`] mean the
/// cluster is gone and a poll loop should stop; the others are faults.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection to {addr} refused")]
    Refused { addr: String },

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether the error is an orderly end of the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Refused { .. }
                | ConnectionError::Closed
                | ConnectionError::Frame(FrameError::ConnectionClosed)
        )
    }
}

enum TransportEvent {
    Datagram(Vec<u8>),
    Closed,
    Failed(ConnectionError),
}

/// Cloneable handle that queues framed datagrams on a connection.
#[derive(Clone)]
pub struct DatagramSender {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    config: FrameConfig,
}

impl DatagramSender {
    /// Frame and queue a datagram. Fails if it is too large or the writer has
    /// stopped.
    pub fn send(&self, dg: &Datagram) -> Result<(), ConnectionError> {
        let frame = encode_frame(dg.as_bytes(), &self.config)?;
        self.outbound
            .send(frame)
            .map_err(|_| ConnectionError::Closed)
    }
}

impl fmt::Debug for DatagramSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramSender")
            .field("closed", &self.outbound.is_closed())
            .finish()
    }
}

/// A framed, split transport.
pub struct Connection {
    sender: DatagramSender,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    open: Arc<AtomicBool>,
    /// Sending `true` causes reader and writer tasks to exit.
    shutdown_tx: watch::Sender<bool>,
    peer: String,
}

impl Connection {
    /// Connect over TCP.
    ///
    /// A refused connection is reported as [`ConnectionError::Refused`].
    pub async fn connect<A>(addr: A, config: FrameConfig) -> Result<Self, ConnectionError>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let peer = addr.to_string();
        debug!(%peer, "connecting");
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                warn!(%peer, "connection refused");
                return Err(ConnectionError::Refused { addr: peer });
            }
            Err(e) => return Err(ConnectionError::Io(e)),
        };
        stream.set_nodelay(true)?;
        info!(%peer, "connected");
        Ok(Self::from_stream(stream, peer, config))
    }

    /// Wrap an already-open stream, such as an in-memory duplex in tests.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>, config: FrameConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let open = Arc::new(AtomicBool::new(true));

        let (reader, writer) = tokio::io::split(stream);
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_open = Arc::clone(&open);
        let reader_tx = inbound_tx.clone();
        let reader_config = config.clone();
        let mut reader_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            Self::read_loop(reader, reader_config, &reader_tx, &reader_open, &mut reader_shutdown)
                .await;
        });

        let writer_open = Arc::clone(&open);
        let mut writer_shutdown = shutdown_rx;
        tokio::spawn(async move {
            Self::write_loop(writer, outbound_rx, &inbound_tx, &writer_open, &mut writer_shutdown)
                .await;
        });

        Self {
            sender: DatagramSender { outbound, config },
            inbound,
            open,
            shutdown_tx,
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// False once the peer closed the stream, a read or write failed, or
    /// [`Connection::disconnect`] was called.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// A handle for queueing datagrams from elsewhere.
    pub fn sender(&self) -> DatagramSender {
        self.sender.clone()
    }

    /// Frame and queue a datagram for sending.
    pub fn send_datagram(&self, dg: &Datagram) -> Result<(), ConnectionError> {
        self.sender.send(dg)
    }

    /// Take the next complete inbound datagram without waiting.
    ///
    /// `Ok(None)` means nothing is buffered yet.
    pub fn poll_datagram(&mut self) -> Result<Option<Datagram>, ConnectionError> {
        match self.inbound.try_recv() {
            Ok(event) => Self::datagram_from_event(event).map(Some),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(ConnectionError::Closed),
        }
    }

    /// Wait for the next complete inbound datagram.
    pub async fn recv_datagram(&mut self) -> Result<Datagram, ConnectionError> {
        match self.inbound.recv().await {
            Some(event) => Self::datagram_from_event(event),
            None => Err(ConnectionError::Closed),
        }
    }

    fn datagram_from_event(event: TransportEvent) -> Result<Datagram, ConnectionError> {
        match event {
            TransportEvent::Datagram(bytes) => Ok(Datagram::from_bytes(bytes)),
            TransportEvent::Closed => Err(ConnectionError::Closed),
            TransportEvent::Failed(e) => Err(e),
        }
    }

    /// Close the connection.
    ///
    /// Datagrams already queued are still written before the writer exits.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        self.open.store(false, Ordering::Release);
        info!(peer = %self.peer, "disconnected");
    }

    async fn read_loop<S: AsyncRead>(
        mut reader: ReadHalf<S>,
        config: FrameConfig,
        events: &mpsc::UnboundedSender<TransportEvent>,
        open: &AtomicBool,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut frames = FrameBuffer::new(config);
        let mut buf = [0u8; 4096];
        loop {
            tokio::select! {
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            debug!("peer closed the stream");
                            open.store(false, Ordering::Release);
                            let _ = events.send(TransportEvent::Closed);
                            break;
                        }
                        Ok(n) => {
                            frames.extend(&buf[..n]);
                            loop {
                                match frames.next_frame() {
                                    Ok(Some(payload)) => {
                                        if events.send(TransportEvent::Datagram(payload)).is_err() {
                                            return;
                                        }
                                    }
                                    Ok(None) => break,
                                    Err(e) => {
                                        warn!(error = %e, "unrecoverable framing error");
                                        open.store(false, Ordering::Release);
                                        let _ = events.send(TransportEvent::Failed(e.into()));
                                        return;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            open.store(false, Ordering::Release);
                            let event = if e.kind() == std::io::ErrorKind::ConnectionReset {
                                TransportEvent::Closed
                            } else {
                                TransportEvent::Failed(e.into())
                            };
                            let _ = events.send(event);
                            break;
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A dropped connection counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn write_loop<S: AsyncWrite>(
        mut writer: WriteHalf<S>,
        mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        events: &mpsc::UnboundedSender<TransportEvent>,
        open: &AtomicBool,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let result = async {
                        writer.write_all(&frame).await?;
                        writer.flush().await
                    }
                    .await;
                    if let Err(e) = result {
                        warn!(error = %e, "write failed");
                        open.store(false, Ordering::Release);
                        let _ = events.send(TransportEvent::Failed(e.into()));
                        return;
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A dropped connection counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        let _ = writer.shutdown().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{read_frame, write_frame};
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    fn datagram(bytes: &[u8]) -> Datagram {
        Datagram::from_bytes(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_send_writes_length_prefixed_frame() {
        let (local, mut remote) = duplex(1024);
        let connection = Connection::from_stream(local, "duplex", FrameConfig::default());

        connection.send_datagram(&datagram(b"hello")).unwrap();
        let mut raw = [0u8; 7];
        remote.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw, b"\x05\x00hello");
    }

    #[tokio::test]
    async fn test_poll_datagram_empty_then_ready() {
        let (local, mut remote) = duplex(1024);
        let config = FrameConfig::default();
        let mut connection = Connection::from_stream(local, "duplex", config.clone());
        assert!(connection.poll_datagram().unwrap().is_none());

        write_frame(&mut remote, b"abc", &config).await.unwrap();
        let received = connection.recv_datagram().await.unwrap();
        assert_eq!(received.as_bytes(), b"abc");
        assert!(connection.poll_datagram().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_split_across_writes() {
        let (local, mut remote) = duplex(1024);
        let mut connection = Connection::from_stream(local, "duplex", FrameConfig::default());
        let frame = encode_frame(b"reassembled", &FrameConfig::default()).unwrap();

        remote.write_all(&frame[..3]).await.unwrap();
        remote.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(connection.poll_datagram().unwrap().is_none());

        remote.write_all(&frame[3..]).await.unwrap();
        remote.flush().await.unwrap();
        let received = connection.recv_datagram().await.unwrap();
        assert_eq!(received.as_bytes(), b"reassembled");
    }

    #[tokio::test]
    async fn test_coalesced_frames_arrive_in_order() {
        let (local, mut remote) = duplex(1024);
        let config = FrameConfig::default();
        let mut connection = Connection::from_stream(local, "duplex", config.clone());

        let mut bytes = encode_frame(b"first", &config).unwrap();
        bytes.extend(encode_frame(b"second", &config).unwrap());
        remote.write_all(&bytes).await.unwrap();

        assert_eq!(connection.recv_datagram().await.unwrap().as_bytes(), b"first");
        assert_eq!(connection.recv_datagram().await.unwrap().as_bytes(), b"second");
    }

    #[tokio::test]
    async fn test_peer_close_is_terminal() {
        let (local, remote) = duplex(1024);
        let mut connection = Connection::from_stream(local, "duplex", FrameConfig::default());
        drop(remote);

        let err = connection.recv_datagram().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));
        assert!(err.is_terminal());
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_oversized_inbound_frame_fails() {
        let (local, mut remote) = duplex(1024);
        let mut connection = Connection::from_stream(
            local,
            "duplex",
            FrameConfig {
                max_payload_size: 4,
            },
        );
        remote.write_all(&[9, 0]).await.unwrap();

        let err = connection.recv_datagram().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Frame(FrameError::PayloadTooLarge { .. })));
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn test_oversized_outbound_rejected_before_queueing() {
        let (local, _remote) = duplex(1024);
        let connection = Connection::from_stream(
            local,
            "duplex",
            FrameConfig {
                max_payload_size: 4,
            },
        );
        assert!(matches!(
            connection.send_datagram(&datagram(b"too long")),
            Err(ConnectionError::Frame(FrameError::PayloadTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_flushes_queued_datagrams() {
        let (local, mut remote) = duplex(1024);
        let config = FrameConfig::default();
        let connection = Connection::from_stream(local, "duplex", config.clone());

        connection.send_datagram(&datagram(b"bye")).unwrap();
        connection.disconnect();
        assert!(!connection.is_open());

        assert_eq!(read_frame(&mut remote, &config).await.unwrap(), b"bye");
        assert!(matches!(
            read_frame(&mut remote, &config).await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_tcp_connect_and_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let config = FrameConfig::default();
            while let Ok(payload) = read_frame(&mut stream, &config).await {
                write_frame(&mut stream, &payload, &config).await.unwrap();
            }
        });

        let mut connection = Connection::connect(addr, FrameConfig::default()).await.unwrap();
        assert!(connection.is_open());
        connection.send_datagram(&datagram(b"ping")).unwrap();
        assert_eq!(connection.recv_datagram().await.unwrap().as_bytes(), b"ping");
    }

    #[tokio::test]
    async fn test_refused_connection_is_distinct() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Connection::connect(addr, FrameConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Refused { .. }), "got {err:?}");
        assert!(err.is_terminal());
    }
}
