/*
[INPUT]:  Endpoint URL
[OUTPUT]: Split frame writer/reader pair over a duplex socket
[POS]:    WebSocket layer - injectable transport (tungstenite in production, in-memory for tests)
[UPDATE]: When adding transports or frame kinds
*/

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{Result, StreamError};

/// Transport-neutral WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;
}

#[async_trait]
pub trait FrameReader: Send {
    /// `None` once the peer stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// Opens duplex connections. Injected into the engine at construction.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// tokio-tungstenite transport (rustls)
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

struct TungsteniteWriter {
    sink: SplitSink<WsStream, WsMessage>,
}

struct TungsteniteReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)> {
        let (ws_stream, _response) = connect_async(url).await?;
        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(TungsteniteWriter { sink }),
            Box::new(TungsteniteReader { stream }),
        ))
    }
}

#[async_trait]
impl FrameWriter for TungsteniteWriter {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Ping(payload) => WsMessage::Ping(payload.into()),
            Frame::Pong(payload) => WsMessage::Pong(payload.into()),
            Frame::Close => WsMessage::Close(None),
        };
        self.sink.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameReader for TungsteniteReader {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(err.into())),
            };
            // Pong replies to inbound pings are queued by tungstenite itself.
            let frame = match message {
                WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
                WsMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                WsMessage::Ping(payload) => Frame::Ping(payload.to_vec()),
                WsMessage::Pong(payload) => Frame::Pong(payload.to_vec()),
                WsMessage::Close(_) => Frame::Close,
                WsMessage::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}

enum Inbound {
    Frame(Frame),
    Error(String),
    End,
}

/// In-memory transport for tests and offline demos.
///
/// Every successful `connect` yields a [`MockPeer`] through [`MockTransport::next_peer`].
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    pending_failures: AtomicUsize,
    attempts: AtomicUsize,
    urls: Mutex<Vec<String>>,
    accepted: Mutex<VecDeque<MockPeer>>,
    notify: tokio::sync::Notify,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("attempts", &self.connect_attempts())
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.inner.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// URLs of every connect attempt, in order
    pub fn urls(&self) -> Vec<String> {
        self.inner
            .urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the next accepted connection.
    pub async fn next_peer(&self) -> MockPeer {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(peer) = self.try_next_peer() {
                return peer;
            }
            notified.await;
        }
    }

    pub fn try_next_peer(&self) -> Option<MockPeer> {
        self.inner
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner
            .urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let failing = self
            .inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StreamError::Transport(format!("mock connect to {url} refused")));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let write_fails = Arc::new(AtomicBool::new(false));

        let peer = MockPeer {
            inbound: inbound_tx,
            outbound: tokio::sync::Mutex::new(outbound_rx),
            write_fails: write_fails.clone(),
        };
        self.inner
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(peer);
        self.inner.notify.notify_waiters();

        Ok((
            Box::new(MockWriter {
                outbound: outbound_tx,
                write_fails,
            }),
            Box::new(MockReader { inbound: inbound_rx }),
        ))
    }
}

/// Server side of one mock connection
pub struct MockPeer {
    inbound: mpsc::UnboundedSender<Inbound>,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    write_fails: Arc<AtomicBool>,
}

impl fmt::Debug for MockPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPeer")
            .field("open", &!self.inbound.is_closed())
            .finish()
    }
}

impl MockPeer {
    pub fn push(&self, frame: Frame) {
        let _ = self.inbound.send(Inbound::Frame(frame));
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Frame::Text(text.into()));
    }

    /// End the inbound stream without a close frame.
    pub fn drop_connection(&self) {
        let _ = self.inbound.send(Inbound::End);
    }

    /// Fail the client's next read with a transport error.
    pub fn fail_read(&self, reason: impl Into<String>) {
        let _ = self.inbound.send(Inbound::Error(reason.into()));
    }

    /// Make every subsequent client write fail.
    pub fn fail_writes(&self) {
        self.write_fails.store(true, Ordering::SeqCst);
    }

    /// Wait for the next frame the client sends.
    pub async fn next_sent(&self) -> Option<Frame> {
        self.outbound.lock().await.recv().await
    }

    /// Drain every frame the client has sent so far.
    pub fn drain_sent(&self) -> Vec<Frame> {
        let Ok(mut outbound) = self.outbound.try_lock() else {
            return Vec::new();
        };
        let mut frames = Vec::new();
        while let Ok(frame) = outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drain sent text frames, skipping pings and close frames.
    pub fn drain_sent_text(&self) -> Vec<String> {
        self.drain_sent()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

struct MockWriter {
    outbound: mpsc::UnboundedSender<Frame>,
    write_fails: Arc<AtomicBool>,
}

struct MockReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.write_fails.load(Ordering::SeqCst) {
            return Err(StreamError::Transport("mock write failed".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| StreamError::Transport("mock peer gone".to_string()))
    }
}

#[async_trait]
impl FrameReader for MockReader {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        match self.inbound.recv().await? {
            Inbound::Frame(frame) => Some(Ok(frame)),
            Inbound::Error(reason) => Some(Err(StreamError::Transport(reason))),
            Inbound::End => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_round_trip() {
        let transport = MockTransport::new();
        let (mut writer, mut reader) = transport.connect("wss://mock/ws").await.unwrap();
        let peer = transport.next_peer().await;

        peer.push_text("hello");
        assert_eq!(
            reader.next_frame().await.unwrap().unwrap(),
            Frame::Text("hello".to_string())
        );

        writer.send(Frame::Text("world".to_string())).await.unwrap();
        assert_eq!(peer.next_sent().await, Some(Frame::Text("world".to_string())));

        peer.drop_connection();
        assert!(reader.next_frame().await.is_none());
        assert_eq!(transport.urls(), vec!["wss://mock/ws".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_transport_fails_requested_connects() {
        let transport = MockTransport::new();
        transport.fail_connects(2);

        assert!(transport.connect("wss://mock").await.is_err());
        assert!(transport.connect("wss://mock").await.is_err());
        assert!(transport.connect("wss://mock").await.is_ok());
        assert_eq!(transport.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_mock_writer_failure() {
        let transport = MockTransport::new();
        let (mut writer, _reader) = transport.connect("wss://mock").await.unwrap();
        let peer = transport.next_peer().await;
        peer.fail_writes();

        let err = writer.send(Frame::Ping(Vec::new())).await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
    }
}
