//! Connection manager: one WebSocket to the command server at a time.
//!
//! Socket activity is surfaced as [`ConnectionEvent`]s from
//! [`Connection::next_event`], which is cancel-safe so it can sit in a
//! `tokio::select!` next to keyboard input and timers.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};
use tokio_tungstenite::tungstenite::{self, Message, protocol::CloseFrame};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code used when the peer sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code used when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Lifecycle of the single socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Start a connection attempt. Returns `false` (and changes nothing) when
    /// one is already in flight or open.
    pub fn begin_connect(&mut self) -> bool {
        match self {
            Self::Connecting | Self::Open => false,
            Self::Idle | Self::Closing | Self::Closed => {
                *self = Self::Connecting;
                true
            }
        }
    }

    pub fn opened(&mut self) -> bool {
        if *self == Self::Connecting {
            *self = Self::Open;
            true
        } else {
            false
        }
    }

    pub fn begin_close(&mut self) -> bool {
        match self {
            Self::Connecting | Self::Open => {
                *self = Self::Closing;
                true
            }
            _ => false,
        }
    }

    /// Record that the socket is gone. Returns `false` for a duplicate close.
    pub fn closed(&mut self) -> bool {
        match self {
            Self::Connecting | Self::Open | Self::Closing => {
                *self = Self::Closed;
                true
            }
            Self::Idle | Self::Closed => false,
        }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// Close code and reason as reported to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn abnormal() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        }
    }

    pub fn from_frame(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_string(),
            },
            None => Self {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
        }
    }

    pub fn describe(&self) -> String {
        let reason = if self.reason.is_empty() {
            "Unknown"
        } else {
            self.reason.as_str()
        };
        format!("Close code: {}, Reason: {}", self.code, reason)
    }
}

/// Why a connection attempt did not produce a socket.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server could not be reached or refused the handshake; behaves
    /// like an abnormal close and is retried.
    #[error("server is unavailable: {0}")]
    Unavailable(#[source] tungstenite::Error),

    /// The attempt could not even start (malformed URL, unsupported scheme).
    #[error("cannot connect to {url}: {source}")]
    Invalid {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
}

impl ConnectError {
    pub fn from_tungstenite(url: &str, err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_) => Self::Invalid {
                url: url.to_string(),
                source: err,
            },
            other => Self::Unavailable(other),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Open a WebSocket to `url`.
pub async fn connect(url: String) -> Result<WsStream, ConnectError> {
    let (stream, response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| ConnectError::from_tungstenite(&url, e))?;
    debug!(status = %response.status(), "websocket handshake complete");
    Ok(stream)
}

/// Something that happened on the socket.
#[derive(Debug)]
pub enum ConnectionEvent {
    Opened,
    Frame(String),
    /// Transport error; a `Closed` event always follows.
    Error(String),
    Closed(CloseInfo),
    /// The attempt could not start; no close follows and nothing is retried.
    Failed(ConnectError),
}

/// Owns the socket (or the attempt to open one) and its state machine.
pub struct Connection {
    url: String,
    state: ConnectionState,
    stream: Option<WsStream>,
    connecting: Option<BoxFuture<'static, Result<WsStream, ConnectError>>>,
    pending: VecDeque<ConnectionEvent>,
}

impl Connection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: ConnectionState::Idle,
            stream: None,
            connecting: None,
            pending: VecDeque::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Begin connecting. No-op if a socket is already open or being opened.
    pub fn connect(&mut self) -> bool {
        if !self.state.begin_connect() {
            debug!(state = ?self.state, "connect ignored");
            return false;
        }
        info!(url = %self.url, "connecting");
        self.connecting = Some(Box::pin(connect(self.url.clone())));
        true
    }

    /// Close the active socket (or abandon the attempt) and release it.
    pub async fn disconnect(&mut self) {
        if !self.state.begin_close() {
            return;
        }
        self.connecting = None;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "error while closing socket");
            }
        }
        self.state.closed();
        self.pending.clear();
    }

    /// Send one text frame. Frames sent while not open are dropped.
    pub async fn send(&mut self, text: String) {
        let Some(stream) = self.stream.as_mut() else {
            debug!("dropping outbound frame; not connected");
            return;
        };
        if let Err(e) = stream.send(Message::Text(text.into())).await {
            warn!(error = %e, "failed to send frame");
        }
    }

    /// Wait for the next socket event. Pends forever while idle.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            if let Some(attempt) = self.connecting.as_mut() {
                let result = attempt.await;
                self.connecting = None;
                match result {
                    Ok(stream) => {
                        self.stream = Some(stream);
                        self.state.opened();
                        return ConnectionEvent::Opened;
                    }
                    Err(e) if e.is_retryable() => {
                        self.state.closed();
                        self.pending.push_back(ConnectionEvent::Error(e.to_string()));
                        self.pending
                            .push_back(ConnectionEvent::Closed(CloseInfo::abnormal()));
                    }
                    Err(e) => {
                        self.state.closed();
                        return ConnectionEvent::Failed(e);
                    }
                }
                continue;
            }

            let Some(stream) = self.stream.as_mut() else {
                return std::future::pending().await;
            };

            match stream.next().await {
                Some(Ok(Message::Text(text))) => return ConnectionEvent::Frame(text.to_string()),
                Some(Ok(Message::Binary(data))) => {
                    return ConnectionEvent::Frame(String::from_utf8_lossy(&data).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    self.release();
                    return ConnectionEvent::Closed(CloseInfo::from_frame(frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.release();
                    self.pending
                        .push_back(ConnectionEvent::Closed(CloseInfo::abnormal()));
                    return ConnectionEvent::Error(e.to_string());
                }
                None => {
                    self.release();
                    return ConnectionEvent::Closed(CloseInfo::abnormal());
                }
            }
        }
    }

    fn release(&mut self) {
        self.stream = None;
        self.state.closed();
    }
}

/// A single, resettable reconnect timer.
///
/// Scheduling while already armed moves the deadline instead of stacking a
/// second timer, so a burst of closes yields exactly one attempt.
pub struct ReconnectTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
    delay: Duration,
}

impl ReconnectTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(Duration::ZERO)),
            armed: false,
            delay,
        }
    }

    pub fn schedule(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.delay);
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Resolve when the armed deadline passes. Only poll while armed.
    pub async fn wait(&mut self) {
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
