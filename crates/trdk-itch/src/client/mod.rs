//! One ITCH TCP connection.
//!
//! [`Client::connect`] connects, logs in and only then returns the client.
//! The connection then runs as two tokio tasks:
//!
//! 1. **Reader** — owns the read half and the [`FrameBuffer`]; decodes every
//!    complete record and calls the [`DataHandler`], then `flush` once per
//!    read pass.
//! 2. **Writer** — owns the write half and drains an unbounded channel of
//!    encoded frames (heartbeat replies, subscribe and snapshot requests).
//!
//! The end of the connection, whatever its cause, is reported once through
//! [`DataHandler::on_connection_closed`]. Dropping the client aborts both
//! tasks.

pub mod buffer;
mod reader;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use self::buffer::FrameBuffer;
use self::reader::Reader;
use crate::codec::session::{LOGIN_RESPONSE_MAX, LOGIN_RESPONSE_MIN, SessionMessage, SessionType};
use crate::codec::{CodecError, DELIMITER, request};
use crate::handler::DataHandler;

/// Default receive buffer size (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{context}: \"{source}\"")]
    Network {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Login request rejected: \"{0}\"")]
    LoginRejected(String),

    #[error("Unknown response at login request")]
    UnexpectedLoginResponse,

    #[error("connection is closed")]
    Disconnected,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

fn network(context: &'static str) -> impl FnOnce(io::Error) -> ClientError {
    move |source| ClientError::Network { context, source }
}

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Log prefix.
    pub label: String,
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub initial_buffer_size: usize,
    /// Interval of read-pass latency reports; `None` disables them.
    pub latency_print_interval: Option<Duration>,
}

/// Reports the end of a connection at most once.
pub(crate) struct Notifier {
    handler: Arc<dyn DataHandler>,
    closed: AtomicBool,
}

impl Notifier {
    fn new(handler: Arc<dyn DataHandler>) -> Self {
        Self { handler, closed: AtomicBool::new(false) }
    }

    fn handler(&self) -> &dyn DataHandler {
        &*self.handler
    }

    fn close(&self, reason: &str, is_error: bool) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.handler.on_connection_closed(reason, is_error);
        }
    }

    /// Suppress any later close report.
    fn silence(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A logged-in connection.
pub struct Client {
    label: String,
    notifier: Arc<Notifier>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Client {
    /// Connect, log in and start the reader and writer tasks.
    ///
    /// Bytes that arrived together with the login response are processed by
    /// the reader before its first socket read.
    pub async fn connect(
        config: &ClientConfig,
        handler: Arc<dyn DataHandler>,
    ) -> Result<Self, ClientError> {
        let label = config.label.clone();
        info!("[{label}] connecting to {}:{}...", config.host, config.port);

        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(network("Failed to connect"))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("[{label}] failed to set TCP_NODELAY: {e}");
        }
        let (mut read, mut write) = stream.into_split();

        let leftover = login(&mut read, &mut write, &config.login, &config.password).await?;
        info!("[{label}] logged in as \"{}\"", config.login);

        let mut buffer = FrameBuffer::with_capacity(config.initial_buffer_size);
        let pending = buffer.load(&leftover);

        let notifier = Arc::new(Notifier::new(handler));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(write, outbound_rx, notifier.clone()));
        let reader = Reader::new(
            label.clone(),
            read,
            buffer,
            notifier.clone(),
            outbound.clone(),
            config.latency_print_interval,
        );
        let reader = tokio::spawn(reader.run(pending));

        Ok(Self { label, notifier, outbound, reader: Some(reader), writer: Some(writer) })
    }

    /// `false` once the connection end has been reported.
    pub fn is_connected(&self) -> bool {
        !self.notifier.is_closed()
    }

    pub fn send_market_data_subscribe_request(&self, pair: &str) -> Result<(), ClientError> {
        self.send(request::market_data_subscribe_request(pair)?)
    }

    pub fn send_market_snapshot_request(&self, pair: &str) -> Result<(), ClientError> {
        self.send(request::market_snapshot_request(pair)?)
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), ClientError> {
        if self.notifier.is_closed() {
            return Err(ClientError::Disconnected);
        }
        self.outbound.send(frame).map_err(|_| ClientError::Disconnected)
    }

    /// Stop both tasks and wait for them. No close report follows.
    pub async fn shutdown(mut self) {
        self.notifier.silence();
        for task in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }
        info!("[{}] connection closed", self.label);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for task in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

/// Send the login request and read the answer. Returns the bytes received
/// past the end of the answer.
async fn login(
    read: &mut OwnedReadHalf,
    write: &mut OwnedWriteHalf,
    login: &str,
    password: &str,
) -> Result<Vec<u8>, ClientError> {
    let request = request::login_request(login, password)?;
    write.write_all(&request).await.map_err(network("Failed to send login request"))?;

    let mut buf = [0u8; LOGIN_RESPONSE_MAX];
    let mut size = 0;
    // A rejection is the longer response; keep reading until its reason
    // text is complete.
    let incomplete = |received: &[u8]| {
        received.len() < LOGIN_RESPONSE_MIN
            || (received[0] == SessionType::LoginRejected as u8
                && received.len() < LOGIN_RESPONSE_MAX
                && !received.contains(&DELIMITER))
    };
    while incomplete(&buf[..size]) {
        let n = read
            .read(&mut buf[size..])
            .await
            .map_err(network("Failed to read login request response"))?;
        if n == 0 {
            return Err(ClientError::Network {
                context: "Failed to read login request response",
                source: io::ErrorKind::UnexpectedEof.into(),
            });
        }
        size += n;
    }

    let received = &buf[..size];
    let end = received.iter().position(|&b| b == DELIMITER).map_or(size, |p| p + 1);
    let response =
        SessionMessage::parse(&received[..end]).map_err(|_| ClientError::UnexpectedLoginResponse)?;
    match response.kind() {
        SessionType::LoginAccepted => Ok(received[end..].to_vec()),
        SessionType::LoginRejected => {
            Err(ClientError::LoginRejected(response.reject_reason()?.to_string()))
        }
        _ => Err(ClientError::UnexpectedLoginResponse),
    }
}

async fn write_loop(
    mut write: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    notifier: Arc<Notifier>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write.write_all(&frame).await {
            notifier.close(&format!("Connection to server closed by error: \"{e}\""), true);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Message;
    use crate::codec::sequenced::tests::{cancel_bytes, modify_bytes, new_order_bytes};
    use tokio::net::TcpListener;
    use trdk_core::OrderId;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        New { is_buy: bool, pair: String, id: OrderId, price: f64, qty: f64 },
        Modify { pair: String, id: OrderId, qty: f64 },
        Cancel { pair: String, id: OrderId },
        Flush,
        Debug(String),
        ServerError(String),
        Closed { reason: String, is_error: bool },
    }

    struct Recorder(mpsc::UnboundedSender<Event>);

    impl DataHandler for Recorder {
        fn on_new_order(&self, _: u64, is_buy: bool, pair: &str, id: OrderId, price: f64, qty: f64) {
            let _ = self.0.send(Event::New { is_buy, pair: pair.into(), id, price, qty });
        }
        fn on_order_modify(&self, _: u64, pair: &str, id: OrderId, qty: f64) {
            let _ = self.0.send(Event::Modify { pair: pair.into(), id, qty });
        }
        fn on_order_cancel(&self, _: u64, pair: &str, id: OrderId) {
            let _ = self.0.send(Event::Cancel { pair: pair.into(), id });
        }
        fn flush(&self, _: u64) {
            let _ = self.0.send(Event::Flush);
        }
        fn on_debug(&self, message: &str) {
            let _ = self.0.send(Event::Debug(message.into()));
        }
        fn on_error_from_server(&self, text: &str) {
            let _ = self.0.send(Event::ServerError(text.into()));
        }
        fn on_connection_closed(&self, reason: &str, is_error: bool) {
            let _ = self.0.send(Event::Closed { reason: reason.into(), is_error });
        }
    }

    const ACCEPTED: &[u8] = b"A          \n";

    fn config(port: u16) -> ClientConfig {
        ClientConfig {
            label: "itch-test".into(),
            host: "127.0.0.1".into(),
            port,
            login: "user".into(),
            password: "secret".into(),
            initial_buffer_size: 64,
            latency_print_interval: None,
        }
    }

    fn sequenced(inner: &[u8]) -> Vec<u8> {
        let mut bytes = b"S000000001".to_vec();
        bytes.extend_from_slice(inner);
        bytes
    }

    /// Accept one connection and consume its login request.
    async fn accept_login(listener: &TcpListener) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 92];
        socket.read_exact(&mut request).await.unwrap();
        let msg = Message::new(&request).unwrap();
        assert_eq!(msg.abstract_type(), b'L');
        assert_eq!(msg.parse_str(1, 40).unwrap(), "user");
        assert_eq!(msg.parse_str(41, 40).unwrap(), "secret");
        socket
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("handler dropped");
            if !matches!(event, Event::Debug(_)) {
                return event;
            }
        }
    }

    async fn setup() -> (TcpListener, u16, Arc<dyn DataHandler>, mpsc::UnboundedReceiver<Event>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        (listener, port, Arc::new(Recorder(tx)), rx)
    }

    #[tokio::test]
    async fn login_accepted_and_heartbeat_reply() {
        let (listener, port, handler, _rx) = setup().await;
        let server = tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(ACCEPTED).await.unwrap();
            socket.write_all(b"H\n").await.unwrap();
            let mut ping = [0u8; 2];
            socket.read_exact(&mut ping).await.unwrap();
            ping
        });

        let client = Client::connect(&config(port), handler).await.unwrap();
        assert!(client.is_connected());
        assert_eq!(&server.await.unwrap(), b"R\n");
    }

    #[tokio::test]
    async fn login_rejected_carries_reason() {
        let (listener, port, handler, _rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(b"Jbad credentials     \n").await.unwrap();
        });

        let err = Client::connect(&config(port), handler).await.err().unwrap();
        match err {
            ClientError::LoginRejected(reason) => assert_eq!(reason, "bad credentials"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn login_rejection_split_across_reads() {
        let (listener, port, handler, _rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            let (head, tail) = b"Jbad credentials     \n".split_at(LOGIN_RESPONSE_MIN);
            socket.write_all(head).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(tail).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let err = Client::connect(&config(port), handler).await.err().unwrap();
        match err {
            ClientError::LoginRejected(reason) => assert_eq!(reason, "bad credentials"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unexpected_login_response() {
        let (listener, port, handler, _rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(b"H\nH\nH\nH\nH\nH\n").await.unwrap();
        });

        let err = Client::connect(&config(port), handler).await.err().unwrap();
        assert!(matches!(err, ClientError::UnexpectedLoginResponse));
    }

    #[tokio::test]
    async fn heartbeats_after_login_in_one_chunk() {
        const N: usize = 7;
        let (listener, port, handler, _rx) = setup().await;
        let server = tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            let mut chunk = ACCEPTED.to_vec();
            chunk.extend(b"H\n".repeat(N));
            socket.write_all(&chunk).await.unwrap();
            let mut pings = vec![0u8; 2 * N];
            socket.read_exact(&mut pings).await.unwrap();
            pings
        });

        let _client = Client::connect(&config(port), handler).await.unwrap();
        assert_eq!(server.await.unwrap(), b"R\n".repeat(N));
    }

    #[tokio::test]
    async fn order_events_then_end_of_session() {
        let (listener, port, handler, mut rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(ACCEPTED).await.unwrap();
            let mut stream = sequenced(&new_order_bytes(b'B', "EUR/USD", 42, 1.105, 1_000_000.0));
            stream.extend(sequenced(&cancel_bytes("EUR/USD", 42)));
            // Split inside the second record.
            let (first, second) = stream.split_at(100);
            socket.write_all(first).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(second).await.unwrap();
            socket.write_all(b"S\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let _client = Client::connect(&config(port), handler).await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            Event::New { is_buy: true, pair: "EUR/USD".into(), id: 42, price: 1.105, qty: 1_000_000.0 }
        );
        let mut rest = Vec::new();
        loop {
            let event = next(&mut rx).await;
            let closed = matches!(event, Event::Closed { .. });
            rest.push(event);
            if closed {
                break;
            }
        }
        rest.retain(|e| *e != Event::Flush);
        assert_eq!(
            rest,
            vec![
                Event::Cancel { pair: "EUR/USD".into(), id: 42 },
                Event::Closed { reason: "End of Session".into(), is_error: false },
            ]
        );
    }

    /// Every split point of a mixed stream yields the same decoded events,
    /// with the receive buffer starting smaller than the first record.
    #[tokio::test]
    async fn mixed_stream_split_at_every_offset() {
        let mut error = format!("E{:<100}", "Unknown pair").into_bytes();
        error.push(DELIMITER);
        let mut stream = sequenced(&new_order_bytes(b'S', "EUR/USD", 7, 1.2345, 500_000.0));
        stream.extend_from_slice(b"H\n");
        stream.extend(sequenced(&modify_bytes("EUR/USD", 7, 250_000.0)));
        stream.extend(error);
        stream.extend(sequenced(&cancel_bytes("EUR/USD", 7)));
        stream.extend_from_slice(b"S\n");

        let expected = vec![
            Event::New { is_buy: false, pair: "EUR/USD".into(), id: 7, price: 1.2345, qty: 500_000.0 },
            Event::Modify { pair: "EUR/USD".into(), id: 7, qty: 250_000.0 },
            Event::ServerError("Unknown pair".into()),
            Event::Cancel { pair: "EUR/USD".into(), id: 7 },
            Event::Closed { reason: "End of Session".into(), is_error: false },
        ];

        for split in 0..=stream.len() {
            let (listener, port, handler, mut rx) = setup().await;
            let (head, tail) = (stream[..split].to_vec(), stream[split..].to_vec());
            let server = tokio::spawn(async move {
                let mut socket = accept_login(&listener).await;
                socket.write_all(ACCEPTED).await.unwrap();
                socket.write_all(&head).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                socket.write_all(&tail).await.unwrap();
                let mut replies = Vec::new();
                let _ = socket.read_to_end(&mut replies).await;
            });

            let client = Client::connect(&config(port), handler).await.unwrap();
            let mut decoded = Vec::new();
            let mut debug = Vec::new();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                match event {
                    Event::Flush => {}
                    Event::Debug(message) => debug.push(message),
                    Event::Closed { .. } => {
                        decoded.push(event);
                        break;
                    }
                    other => decoded.push(other),
                }
            }
            assert_eq!(decoded, expected, "split at {split}");
            assert!(
                debug[0].starts_with(
                    "Received a large message (0.06 kilobytes). Increasing buffer: 0.06 -> "
                ),
                "split at {split}: {debug:?}"
            );

            client.shutdown().await;
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn error_notification_is_forwarded() {
        let (listener, port, handler, mut rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(ACCEPTED).await.unwrap();
            let mut record = format!("E{:<100}", "Unknown pair").into_bytes();
            record.push(DELIMITER);
            socket.write_all(&record).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let _client = Client::connect(&config(port), handler).await.unwrap();
        assert_eq!(next(&mut rx).await, Event::ServerError("Unknown pair".into()));
        assert_eq!(next(&mut rx).await, Event::Flush);
    }

    #[tokio::test]
    async fn unknown_type_closes_with_error() {
        let (listener, port, handler, mut rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(ACCEPTED).await.unwrap();
            socket.write_all(b"Q\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let client = Client::connect(&config(port), handler).await.unwrap();
        match next(&mut rx).await {
            Event::Closed { reason, is_error } => {
                assert!(is_error);
                assert!(reason.contains("unknown"), "{reason}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!client.is_connected());
        assert!(matches!(
            client.send_market_data_subscribe_request("EUR/USD"),
            Err(ClientError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn graceful_close_is_not_an_error() {
        let (listener, port, handler, mut rx) = setup().await;
        tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(ACCEPTED).await.unwrap();
        });

        let _client = Client::connect(&config(port), handler).await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            Event::Closed { reason: "Connection was gracefully closed".into(), is_error: false }
        );
    }

    #[tokio::test]
    async fn subscribe_request_reaches_server() {
        let (listener, port, handler, _rx) = setup().await;
        let server = tokio::spawn(async move {
            let mut socket = accept_login(&listener).await;
            socket.write_all(ACCEPTED).await.unwrap();
            let mut requests = [0u8; 18];
            socket.read_exact(&mut requests).await.unwrap();
            requests
        });

        let client = Client::connect(&config(port), handler).await.unwrap();
        client.send_market_data_subscribe_request("EUR/USD").unwrap();
        client.send_market_snapshot_request("EUR/USD").unwrap();
        assert_eq!(&server.await.unwrap(), b"AEUR/USD\nMEUR/USD\n");
        client.shutdown().await;
    }
}
