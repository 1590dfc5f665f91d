//! Connection lifecycle: handshake, session state, and inbound routing.
//!
//! A fresh [`Lifecycle`] (and correlator, and channels) is created for
//! every physical connection. The handshake must finish before any GraphQL
//! traffic: [`establish`] sends `connection_init`, awaits `connection_ack`
//! under the configured timeout, and only then spawns the routing task that
//! feeds the correlator.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{GraphQLError, Result};

use super::codec;
use super::correlator::{RequestCorrelator, Routed};
use super::message::{SUB_PROTOCOL, WsMessage, close_code};
use super::transport::{Frame, WsConn, WsConnector};

/// Session states. `Closed` is absorbing: once a connection is lost, a
/// fresh session must be established before the next request can proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection has been opened yet.
    Uninitialized,
    /// `connection_init` sent, awaiting `connection_ack`.
    Initializing,
    /// Handshake complete; requests may flow.
    Ready,
    /// Explicitly stopped; requests fail fast until restarted.
    Stopped,
    /// Connection lost; the next request reconnects.
    Closed,
}

/// Shared per-connection state.
pub(crate) struct Lifecycle {
    state: Mutex<SessionState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Closed | SessionState::Stopped
        )
    }

    fn begin_init(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Uninitialized {
            *state = SessionState::Initializing;
        }
    }

    fn mark_ready(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Initializing {
            *state = SessionState::Ready;
        }
    }

    pub fn mark_stopped(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Ready | SessionState::Initializing) {
            *state = SessionState::Stopped;
        }
    }

    fn mark_closed(&self) {
        let mut state = self.state.lock();
        // An explicit stop is sticky; the close that follows it is expected.
        if *state != SessionState::Stopped {
            *state = SessionState::Closed;
        }
    }
}

/// Handler invoked with the `connection_ack` payload.
pub(crate) type AckHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Connection parameters for one session.
pub(crate) struct WsOptions {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub init_payload: Option<Value>,
    pub init_timeout: Duration,
    pub connect_timeout: Duration,
    pub subscription_buffer: usize,
}

/// Everything a live connection exposes to the session façade.
#[derive(Clone)]
pub(crate) struct ActiveSession {
    pub outgoing: mpsc::Sender<Frame>,
    pub correlator: Arc<RequestCorrelator>,
    pub lifecycle: Arc<Lifecycle>,
    pub ack_payload: Option<Value>,
}

impl ActiveSession {
    /// Encode and enqueue one protocol message on the single-writer queue.
    pub async fn send(&self, message: &WsMessage) -> Result<()> {
        let frame = codec::encode(message)?;
        self.outgoing
            .send(Frame::Text(frame))
            .await
            .map_err(|_| disconnected(None, "connection closed"))
    }
}

fn disconnected(code: Option<u16>, reason: impl Into<String>) -> GraphQLError {
    GraphQLError::Disconnected {
        code,
        reason: reason.into(),
    }
}

/// Open a connection and run the handshake; on success the inbound routing
/// task is spawned and the session is ready for traffic.
pub(crate) async fn establish(
    connector: &dyn WsConnector,
    options: &WsOptions,
    on_ack: Option<&AckHandler>,
) -> Result<ActiveSession> {
    let lifecycle = Arc::new(Lifecycle::new());
    let correlator = Arc::new(RequestCorrelator::new(options.subscription_buffer));

    debug!(url = %options.url, "Opening GraphQL WebSocket session");
    let mut conn = connector
        .connect(
            &options.url,
            SUB_PROTOCOL,
            &options.headers,
            options.connect_timeout,
        )
        .await?;
    lifecycle.begin_init();

    let init = codec::encode(&WsMessage::ConnectionInit {
        payload: options.init_payload.clone(),
    })?;
    if conn.outgoing.send(Frame::Text(init)).await.is_err() {
        return Err(disconnected(None, "connection closed during handshake"));
    }

    let ack_payload = match tokio::time::timeout(options.init_timeout, await_ack(&mut conn)).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(err)) => return Err(err),
        Err(_elapsed) => {
            close(&conn, close_code::INIT_TIMEOUT, "connection_ack timed out").await;
            return Err(GraphQLError::InitTimeout);
        }
    };

    debug!("GraphQL WebSocket connection acknowledged");
    if let Some(handler) = on_ack {
        handler(ack_payload.clone());
    }
    lifecycle.mark_ready();

    let session = ActiveSession {
        outgoing: conn.outgoing,
        correlator: correlator.clone(),
        lifecycle: lifecycle.clone(),
        ack_payload,
    };
    tokio::spawn(receive_loop(
        conn.incoming,
        session.outgoing.clone(),
        correlator,
        lifecycle,
    ));

    Ok(session)
}

/// Wait for the handshake to be acknowledged. Keep-alive frames are ignored
/// (never answered) before the handshake completes; anything else is a
/// protocol violation.
async fn await_ack(conn: &mut WsConn) -> Result<Option<Value>> {
    loop {
        let Some(frame) = conn.incoming.recv().await else {
            return Err(disconnected(None, "connection closed during handshake"));
        };
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Close(status) => return Err(close_to_error(status)),
        };
        let message = match codec::decode(&text) {
            Ok(message) => message,
            Err(err) => {
                close(conn, close_code::INVALID_MESSAGE, "invalid message").await;
                return Err(err);
            }
        };
        match message {
            WsMessage::ConnectionAck { payload } => return Ok(payload),
            WsMessage::Ping { .. } | WsMessage::Pong { .. } => continue,
            other => {
                close(conn, close_code::UNAUTHORIZED, "expected connection_ack").await;
                return Err(GraphQLError::Protocol(format!(
                    "expected connection_ack, received {}",
                    other.type_name()
                )));
            }
        }
    }
}

async fn close(conn: &WsConn, code: u16, reason: &str) {
    let _ = conn
        .outgoing
        .send(Frame::Close(Some((code, reason.to_string()))))
        .await;
}

fn close_to_error(status: Option<(u16, String)>) -> GraphQLError {
    match status {
        Some((code, reason)) if !reason.is_empty() => disconnected(Some(code), reason),
        Some((code, _)) => disconnected(Some(code), format!("connection closed ({code})")),
        None => disconnected(None, "connection closed"),
    }
}

/// The single inbound processing path for one connection: frames are
/// handled strictly in arrival order, one at a time.
async fn receive_loop(
    mut incoming: mpsc::Receiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
    correlator: Arc<RequestCorrelator>,
    lifecycle: Arc<Lifecycle>,
) {
    let cause = loop {
        let Some(frame) = incoming.recv().await else {
            break disconnected(None, "connection closed");
        };
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Close(status) => break close_to_error(status),
        };
        let message = match codec::decode(&text) {
            Ok(message) => message,
            Err(err) => {
                warn!("Closing session: undecodable frame");
                let _ = outgoing
                    .send(Frame::Close(Some((
                        close_code::INVALID_MESSAGE,
                        "invalid message".to_string(),
                    ))))
                    .await;
                break err;
            }
        };
        match message {
            WsMessage::Next { id, payload } => {
                if correlator.resolve_next(&id, payload) == Routed::Overflowed {
                    // Tell the server to stop a subscription we dropped.
                    if let Ok(complete) = codec::encode(&WsMessage::Complete { id })
                        && outgoing.send(Frame::Text(complete)).await.is_err()
                    {
                        break disconnected(None, "connection closed");
                    }
                }
            }
            WsMessage::Error { id, payload } => correlator.resolve_error(&id, payload),
            WsMessage::Complete { id } => correlator.resolve_complete(&id),
            WsMessage::Ping { .. } => {
                if let Ok(pong) = codec::encode(&WsMessage::Pong { payload: None })
                    && outgoing.send(Frame::Text(pong)).await.is_err()
                {
                    break disconnected(None, "connection closed");
                }
            }
            WsMessage::Pong { .. } => {}
            WsMessage::ConnectionAck { .. } => {
                debug!("Dropping duplicate connection_ack");
            }
            other @ (WsMessage::ConnectionInit { .. } | WsMessage::Subscribe { .. }) => {
                warn!(frame = other.type_name(), "Closing session: client-only frame from server");
                let _ = outgoing
                    .send(Frame::Close(Some((
                        close_code::INVALID_MESSAGE,
                        "invalid message".to_string(),
                    ))))
                    .await;
                break GraphQLError::Protocol(format!(
                    "unexpected {} from server",
                    other.type_name()
                ));
            }
        }
    };

    lifecycle.mark_closed();
    correlator.terminate_all(&cause);
}
