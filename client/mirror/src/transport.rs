//! # Transport
//!
//! One WebSocket per shop on `/ws/queue/{shop_id}`, carrying deltas only.
//!
//! ## Reconnect
//!
//! - Unclean close (no close handshake, stream error, failed connect): one retry after a fixed delay, forever
//! - Clean close (server close frame, local [`Transport::disconnect`]): no retry
//! - Errors only mark the connection closed, the close that follows schedules the retry
//! - Timing lives in [`ReconnectMachine`], the driver task only sleeps until its deadline
//!
//! ## Messages
//!
//! - Text frames decode to [`ServerMessage`]
//! - Malformed frames are logged and dropped, the socket stays up
//! - Unknown `type` values are dropped silently
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::StreamExt;
use queue::{ServerMessage, decode_message};
use tokio::{
    net::TcpStream,
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::SyncError;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

#[async_trait]
pub trait Socket: Send {
    /// `None` once the connection is gone without a close handshake.
    async fn next_frame(&mut self) -> Option<Result<Frame, SyncError>>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, SyncError>;
}

pub struct WsConnector;

struct WsSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, SyncError> {
        let (inner, response) = connect_async(url).await?;
        debug!("WebSocket handshake: {}", response.status());

        Ok(Box::new(WsSocket { inner }))
    }
}

#[async_trait]
impl Socket for WsSocket {
    async fn next_frame(&mut self) -> Option<Result<Frame, SyncError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Close(_)) => return Some(Ok(Frame::Close)),
                // pings are answered by tungstenite on the next read
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.inner.close(None).await {
            debug!("Close handshake failed: {err}");
        }
    }
}

/// Connection lifecycle as a plain state machine. Deadlines come from the
/// `now` callers pass in, nothing here reads a clock.
#[derive(Debug)]
pub struct ReconnectMachine {
    state: ConnectionState,
    retry_at: Option<Instant>,
    delay: Duration,
}

impl ReconnectMachine {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: ConnectionState::Closed,
            retry_at: None,
            delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.retry_at = None;
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        self.retry_at = None;
    }

    /// Marks the connection closed without scheduling anything.
    pub fn on_error(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Returns the retry deadline, if any. A second unclean close before the
    /// retry fires keeps the first deadline.
    pub fn on_close(&mut self, clean: bool, now: Instant) -> Option<Instant> {
        self.state = ConnectionState::Closed;

        if clean {
            self.retry_at = None;
        } else if self.retry_at.is_none() {
            self.retry_at = Some(now + self.delay);
        }

        self.retry_at
    }
}

enum SessionEnd {
    Clean,
    Unclean,
    Shutdown,
}

struct Link {
    connector: Arc<dyn Connector>,
    url: String,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<ServerMessage>,
}

struct Session {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Transport {
    connector: Arc<dyn Connector>,
    ws_url: String,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<ServerMessage>,
    session: Option<Session>,
}

impl Transport {
    pub fn new(
        connector: Arc<dyn Connector>,
        ws_url: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            connector,
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            reconnect_delay,
            state: Arc::new(state),
            events,
            session: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn url_for(&self, shop_id: &str) -> String {
        format!("{}/ws/queue/{shop_id}", self.ws_url)
    }

    /// Opens the shop's socket, replacing any previous one.
    pub async fn connect(&mut self, shop_id: &str) {
        self.disconnect().await;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let link = Link {
            connector: self.connector.clone(),
            url: self.url_for(shop_id),
            reconnect_delay: self.reconnect_delay,
            state: self.state.clone(),
            events: self.events.clone(),
        };

        let task = tokio::spawn(link.run(shutdown_rx));
        self.session = Some(Session { shutdown, task });
    }

    /// Clean close, no reconnect. No-op when not connected.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let _ = session.shutdown.send(true);
        if let Err(err) = session.task.await {
            warn!("Transport task ended abnormally: {err}");
        }

        self.state.send_replace(ConnectionState::Closed);
    }
}

impl Link {
    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut machine = ReconnectMachine::new(self.reconnect_delay);

        loop {
            machine.on_connecting();
            self.publish(machine.state());
            debug!("Connecting to {}", self.url);

            let connected = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.connector.connect(&self.url) => result,
            };

            let clean = match connected {
                Ok(mut socket) => {
                    machine.on_open();
                    self.publish(machine.state());
                    info!("Queue socket open: {}", self.url);

                    match self
                        .pump(socket.as_mut(), &mut machine, &mut shutdown)
                        .await
                    {
                        SessionEnd::Clean => true,
                        SessionEnd::Unclean => false,
                        SessionEnd::Shutdown => break,
                    }
                }
                Err(err) => {
                    warn!("Queue socket connect failed: {err}");
                    machine.on_error();
                    false
                }
            };

            let retry_at = machine.on_close(clean, Instant::now());
            self.publish(machine.state());

            let Some(retry_at) = retry_at else {
                info!("Queue socket closed by server");
                return;
            };

            info!(
                "Queue socket dropped, reconnecting in {:?}",
                self.reconnect_delay
            );
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep_until(retry_at) => {}
            }
        }

        debug!("Transport for {} stopped", self.url);
        self.publish(ConnectionState::Closed);
    }

    async fn pump(
        &self,
        socket: &mut dyn Socket,
        machine: &mut ReconnectMachine,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => {
                    socket.close().await;
                    return SessionEnd::Shutdown;
                }
                frame = socket.next_frame() => frame,
            };

            match frame {
                Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                Some(Ok(Frame::Close)) => return SessionEnd::Clean,
                Some(Err(err)) => {
                    warn!("Queue socket error: {err}");
                    machine.on_error();
                    self.publish(machine.state());
                    return SessionEnd::Unclean;
                }
                None => return SessionEnd::Unclean,
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match decode_message(text) {
            Ok(ServerMessage::Unknown) => debug!("Ignoring unknown queue message"),
            Ok(message) => {
                // No subscribers yet is fine, the next snapshot catches up.
                let _ = self.events.send(message);
            }
            Err(err) => warn!("Dropping malformed queue message: {err}"),
        }
    }
}
