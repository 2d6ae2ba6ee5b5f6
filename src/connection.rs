//! Connection manager for the station channel
//!
//! Owns the one logical WebSocket to the station and the whole reconnect
//! lifecycle: Disconnected -> Connecting -> Connected -> (close/error) ->
//! Disconnected -> ... with a fixed retry delay, forever. The retry loop is
//! the single owner of reconnection, so a close and an error racing each
//! other can never schedule two attempts. A connect timeout keeps a hung
//! attempt from wedging the loop (the liveness guard for unattended kiosks).
//!
//! Decoded frames go out on the inbound channel in arrival order; malformed
//! frames are dropped and logged without touching the connection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::session::types::{ConnectionState, StatusEvent};
use crate::wire::{self, InboundMessage};

#[derive(Debug)]
pub enum ConnectError {
    Transport(String),
    Timeout,
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::Transport(msg) => write!(f, "transport error: {}", msg),
            ConnectError::Timeout => write!(f, "connect attempt timed out"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// One established channel to the station.
#[async_trait]
pub trait ChannelLink: Send {
    /// Next text frame. `None` means the peer closed; an error is terminal
    /// for this link and hands control back to the reconnect loop.
    async fn next_frame(&mut self) -> Option<Result<String, ConnectError>>;

    async fn send_text(&mut self, text: String) -> Result<(), ConnectError>;
}

/// Dials the station. Abstracted so tests can script connect/close
/// sequences without a network.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChannelLink>, ConnectError>;
}

/// Production transport: a WebSocket client connection.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn ChannelLink>, ConnectError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        Ok(Box::new(WsLink { inner: stream }))
    }
}

struct WsLink {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChannelLink for WsLink {
    async fn next_frame(&mut self) -> Option<Result<String, ConnectError>> {
        while let Some(item) = self.inner.next().await {
            match item {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Control and binary frames are not part of the protocol
                Ok(_) => continue,
                Err(e) => return Some(Err(ConnectError::Transport(e.to_string()))),
            }
        }
        None
    }

    async fn send_text(&mut self, text: String) -> Result<(), ConnectError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))
    }
}

/// Cloneable sender side of the channel, held by the command dispatcher.
#[derive(Clone)]
pub struct ConnectionHandle {
    outbound_tx: mpsc::Sender<String>,
    state: Arc<Mutex<ConnectionState>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        outbound_tx: mpsc::Sender<String>,
        state: Arc<Mutex<ConnectionState>>,
    ) -> Self {
        Self { outbound_tx, state }
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.current_state() == ConnectionState::Connected
    }

    /// Fire-and-forget send. A full queue drops the frame with a log line;
    /// commands are never retried here.
    pub fn send(&self, text: String) {
        if let Err(e) = self.outbound_tx.try_send(text) {
            log::warn!("outbound command dropped: {}", e);
        }
    }
}

enum LinkExit {
    /// Channel closed or errored; reconnect after the fixed delay
    Lost,
    /// Session side shut down; stop the loop entirely
    Shutdown,
}

pub struct ConnectionManager {
    transport: Arc<dyn ChannelTransport>,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    state: Arc<Mutex<ConnectionState>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    outbound_rx: mpsc::Receiver<String>,
    status_tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ConnectionManager {
    /// Build the manager plus the pieces its collaborators hold: the
    /// cloneable handle (dispatcher) and the inbound receiver (runtime).
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        reconnect_delay: Duration,
        connect_timeout: Duration,
        status_tx: mpsc::UnboundedSender<StatusEvent>,
    ) -> (Self, ConnectionHandle, mpsc::Receiver<InboundMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let state = Arc::new(Mutex::new(ConnectionState::Disconnected));
        let handle = ConnectionHandle::new(outbound_tx, state.clone());
        let manager = Self {
            transport,
            reconnect_delay,
            connect_timeout,
            state,
            inbound_tx,
            outbound_rx,
            status_tx,
        };
        (manager, handle, inbound_rx)
    }

    /// Spawn the connect/reconnect loop.
    pub fn open(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = timeout(self.connect_timeout, self.transport.connect()).await;
            match attempt {
                Ok(Ok(link)) => {
                    log::info!("station channel connected");
                    self.set_state(ConnectionState::Connected);
                    if let LinkExit::Shutdown = self.drive_link(link).await {
                        return;
                    }
                }
                Ok(Err(e)) => log::warn!("connect failed: {}", e),
                Err(_) => log::warn!("{}", ConnectError::Timeout),
            }
            self.set_state(ConnectionState::Disconnected);
            // The single scheduled reconnect attempt for this loss
            sleep(self.reconnect_delay).await;
        }
    }

    async fn drive_link(&mut self, mut link: Box<dyn ChannelLink>) -> LinkExit {
        loop {
            tokio::select! {
                frame = link.next_frame() => match frame {
                    Some(Ok(text)) => match wire::decode(&text) {
                        Ok(msg) => {
                            if self.inbound_tx.send(msg).await.is_err() {
                                return LinkExit::Shutdown;
                            }
                        }
                        // Malformed payload: drop and log, connection stays up
                        Err(e) => log::warn!("dropping malformed frame: {}", e),
                    },
                    Some(Err(e)) => {
                        log::warn!("station channel error: {}", e);
                        return LinkExit::Lost;
                    }
                    None => {
                        log::info!("station channel closed by peer");
                        return LinkExit::Lost;
                    }
                },
                cmd = self.outbound_rx.recv() => match cmd {
                    Some(text) => {
                        if let Err(e) = link.send_text(text).await {
                            log::warn!("send failed, recycling channel: {}", e);
                            return LinkExit::Lost;
                        }
                    }
                    None => return LinkExit::Shutdown,
                },
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            if *state != next {
                *state = next;
                true
            } else {
                false
            }
        };
        if changed {
            log::debug!("connection state -> {}", next);
            let _ = self
                .status_tx
                .send(StatusEvent::ConnectionChanged(next));
        }
    }
}
