//! Test utilities: scripted in-memory feed server
//!
//! `MockConnector` hands out connection outcomes in the order they were
//! queued; once the queue is empty every attempt is refused. Each accepted
//! connection comes with a `MockServer` handle that pushes frames to the
//! client and reads what the client sent.

use crate::ws::{Connector, Transport, WebSocketError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

type Result<T> = std::result::Result<T, WebSocketError>;

/// Server-side event delivered to the client transport
enum ServerEvent {
    Frame(String),
    Close,
    Error(String),
}

enum Outcome {
    Refuse,
    Hang,
    Accept(MockTransport),
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<Instant>>,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

/// Server half of an accepted mock connection
pub struct MockServer {
    inbound: mpsc::UnboundedSender<ServerEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    /// Queue a text frame for the client
    pub fn push(&self, frame: &str) {
        let _ = self.inbound.send(ServerEvent::Frame(frame.to_string()));
    }

    /// Close the connection cleanly
    pub fn close(&self) {
        let _ = self.inbound.send(ServerEvent::Close);
    }

    /// Fail the connection with a transport error
    pub fn fail(&self, reason: &str) {
        let _ = self.inbound.send(ServerEvent::Error(reason.to_string()));
    }

    /// Next frame the client sent
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound.recv().await
    }
}

/// Client half of an accepted mock connection
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
    outbound: mpsc::UnboundedSender<String>,
    closed: bool,
    state: Option<Arc<MockState>>,
}

impl MockTransport {
    fn register(&mut self, state: Arc<MockState>) {
        let open = state.open.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_open.fetch_max(open, Ordering::SeqCst);
        self.state = Some(state);
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Transport for MockTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(WebSocketError::NotConnected);
        }
        self.outbound
            .send(text.to_string())
            .map_err(|_| WebSocketError::SendFailed("server gone".to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        match self.inbound.recv().await {
            Some(ServerEvent::Frame(text)) => Ok(Some(text)),
            Some(ServerEvent::Close) | None => {
                self.closed = true;
                Ok(None)
            }
            Some(ServerEvent::Error(reason)) => {
                self.closed = true;
                Err(WebSocketError::ReceiveFailed(reason))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.inbound.close();
        Ok(())
    }
}

/// Scripted connector shared between the test and the client
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a refused handshake
    pub fn refuse(&self) {
        self.state.script.lock().push_back(Outcome::Refuse);
    }

    /// Queue a handshake that never completes
    pub fn hang(&self) {
        self.state.script.lock().push_back(Outcome::Hang);
    }

    /// Queue an accepted connection and return its server half
    pub fn accept(&self) -> MockServer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            inbound: inbound_rx,
            outbound: outbound_tx,
            closed: false,
            state: None,
        };
        self.state.script.lock().push_back(Outcome::Accept(transport));
        MockServer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        }
    }

    /// Instants of every connect attempt so far
    pub fn attempts(&self) -> Vec<Instant> {
        self.state.attempts.lock().clone()
    }

    /// Transports currently alive
    pub fn open_now(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Most transports alive at once
    pub fn max_open(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _url: &str) -> Result<MockTransport> {
        self.state.attempts.lock().push(Instant::now());
        let outcome = self.state.script.lock().pop_front();

        match outcome {
            Some(Outcome::Accept(mut transport)) => {
                transport.register(self.state.clone());
                Ok(transport)
            }
            Some(Outcome::Hang) => std::future::pending().await,
            Some(Outcome::Refuse) | None => {
                Err(WebSocketError::ConnectionFailed("connection refused".to_string()))
            }
        }
    }
}
