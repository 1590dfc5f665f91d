//! GraphQL WebSocket session façade.
//!
//! [`WsClient`] multiplexes any number of concurrent single-response and
//! streaming requests over one shared connection. The connection is opened
//! lazily, cached while healthy, and invalidated exactly when it closes,
//! so the request after a disconnect reconnects transparently.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{GraphQLError, Result};
use crate::request::GraphQLRequest;
use crate::response::GraphQLResponse;

use super::correlator::{FailSlot, RequestCorrelator};
use super::lifecycle::{self, AckHandler, ActiveSession, SessionState, WsOptions};
use super::message::{WsMessage, close_code};
use super::transport::{Frame, TungsteniteConnector, WsConnector};

/// The cached session slot. `Stopped` is sticky until an explicit
/// [`WsClient::start`].
enum Slot {
    Idle,
    Active(ActiveSession),
    Stopped,
}

/// A GraphQL-over-WebSocket client.
///
/// Cloneless by design: share it behind an `Arc` (the [`crate::GraphQLClient`]
/// façade does exactly that).
pub struct WsClient {
    connector: Arc<dyn WsConnector>,
    options: WsOptions,
    on_ack: Option<AckHandler>,
    slot: tokio::sync::Mutex<Slot>,
}

impl WsClient {
    /// Create a new client builder.
    pub fn builder() -> WsClientBuilder {
        WsClientBuilder::new()
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        match &*self.slot.lock().await {
            Slot::Idle => SessionState::Uninitialized,
            Slot::Stopped => SessionState::Stopped,
            Slot::Active(session) => session.lifecycle.state(),
        }
    }

    /// Start the session explicitly, returning the `connection_ack`
    /// payload. Also the way out of the stopped state.
    ///
    /// Safe to call concurrently: callers racing into an in-flight
    /// handshake share its outcome instead of opening a second connection.
    pub async fn start(&self) -> Result<Option<Value>> {
        let mut slot = self.slot.lock().await;
        if let Slot::Active(session) = &*slot
            && !session.lifecycle.is_closed()
        {
            return Ok(session.ack_payload.clone());
        }
        let session =
            lifecycle::establish(self.connector.as_ref(), &self.options, self.on_ack.as_ref())
                .await?;
        let ack_payload = session.ack_payload.clone();
        *slot = Slot::Active(session);
        Ok(ack_payload)
    }

    /// Stop the session: every outstanding request fails with a stopped
    /// error, the connection closes normally, and subsequent requests fail
    /// fast until [`start`](Self::start) is called again.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Slot::Active(session) = &*slot {
            debug!("Stopping GraphQL WebSocket session");
            session.lifecycle.mark_stopped();
            session.correlator.terminate_all(&GraphQLError::SessionStopped);
            let _ = session
                .outgoing
                .send(Frame::Close(Some((
                    close_code::NORMAL,
                    "client stopped".to_string(),
                ))))
                .await;
        }
        *slot = Slot::Stopped;
    }

    /// Execute a query or mutation over the session.
    ///
    /// Request-level GraphQL errors are returned inside the response;
    /// convert with [`GraphQLResponse::into_result`]. Dropping the returned
    /// future cancels the request and best-effort notifies the server.
    pub async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse<Value>> {
        let session = self.session().await?;
        let (id, rx) = session.correlator.register_single()?;
        debug!(id = %id, query = %request.query, "Executing GraphQL request over WebSocket");

        let guard = CancelGuard::new(&session, id.clone());
        session
            .send(&WsMessage::Subscribe {
                id,
                payload: request.into(),
            })
            .await?;

        let result = rx
            .await
            .unwrap_or_else(|_| Err(disconnected("connection closed")));
        drop(guard);
        result
    }

    /// Execute a subscription over the session.
    ///
    /// The stream ends on the server's `complete`, fails on its `error`
    /// frame or a disconnect, and is cancelled by
    /// [`SubscriptionStream::stop`] or by dropping it.
    pub async fn execute_subscription(&self, request: GraphQLRequest) -> Result<SubscriptionStream> {
        let session = self.session().await?;
        let (id, receiver, fail) = session.correlator.register_streaming()?;
        debug!(id = %id, query = %request.query, "Starting GraphQL subscription");

        let guard = CancelGuard::new(&session, id.clone());
        session
            .send(&WsMessage::Subscribe {
                id: id.clone(),
                payload: request.into(),
            })
            .await?;
        guard.disarm();

        Ok(SubscriptionStream {
            id,
            receiver,
            fail,
            correlator: session.correlator.clone(),
            outgoing: session.outgoing.clone(),
            done: false,
        })
    }

    /// Get the healthy cached session or establish a fresh one. Concurrent
    /// callers serialize on the slot lock, so only one handshake runs.
    async fn session(&self) -> Result<ActiveSession> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Stopped => Err(GraphQLError::SessionStopped),
            Slot::Active(session) if !session.lifecycle.is_closed() => Ok(session.clone()),
            _ => {
                let session = lifecycle::establish(
                    self.connector.as_ref(),
                    &self.options,
                    self.on_ack.as_ref(),
                )
                .await?;
                *slot = Slot::Active(session.clone());
                Ok(session)
            }
        }
    }
}

fn disconnected(reason: &str) -> GraphQLError {
    GraphQLError::Disconnected {
        code: None,
        reason: reason.to_string(),
    }
}

/// Best-effort `complete` for a request cancelled locally. Never blocks the
/// cancelling caller; a failed send means the connection is already gone.
fn send_complete(outgoing: &mpsc::Sender<Frame>, id: &str) {
    let Ok(frame) = super::codec::encode(&WsMessage::Complete { id: id.to_string() }) else {
        return;
    };
    if let Err(mpsc::error::TrySendError::Full(frame)) = outgoing.try_send(Frame::Text(frame)) {
        let outgoing = outgoing.clone();
        tokio::spawn(async move {
            let _ = outgoing.send(frame).await;
        });
    }
}

/// Cancels a pending request if it is still registered when dropped. After
/// a terminal frame resolved (and removed) the entry, dropping is a no-op.
struct CancelGuard {
    correlator: Arc<RequestCorrelator>,
    outgoing: mpsc::Sender<Frame>,
    id: String,
    armed: bool,
}

impl CancelGuard {
    fn new(session: &ActiveSession, id: String) -> Self {
        Self {
            correlator: session.correlator.clone(),
            outgoing: session.outgoing.clone(),
            id,
            armed: true,
        }
    }

    /// Hand responsibility for cancellation elsewhere.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed && self.correlator.remove(&self.id) {
            debug!(id = %self.id, "Cancelling in-flight request");
            send_complete(&self.outgoing, &self.id);
        }
    }
}

/// A stream of subscription results.
///
/// Yields one item per `next` frame. Terminates with an error on a
/// server-sent `error` frame, a disconnect, or buffer overflow; ends
/// normally on `complete`.
pub struct SubscriptionStream {
    id: String,
    receiver: mpsc::Receiver<GraphQLResponse<Value>>,
    fail: FailSlot,
    correlator: Arc<RequestCorrelator>,
    outgoing: mpsc::Sender<Frame>,
    done: bool,
}

impl SubscriptionStream {
    /// The request id of this subscription.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancel the subscription. The stream immediately stops emitting and
    /// the server is told to stop, without waiting for acknowledgement.
    pub fn stop(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.receiver.close();
        if self.correlator.remove(&self.id) {
            send_complete(&self.outgoing, &self.id);
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<GraphQLResponse<Value>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(response)) => Poll::Ready(Some(Ok(response))),
            Poll::Ready(None) => {
                this.done = true;
                match this.fail.lock().take() {
                    Some(err) => Poll::Ready(Some(Err(err))),
                    None => Poll::Ready(None),
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if !self.done && self.correlator.remove(&self.id) {
            send_complete(&self.outgoing, &self.id);
        }
    }
}

/// Builder for [`WsClient`].
pub struct WsClientBuilder {
    url: Option<String>,
    headers: Vec<(String, String)>,
    init_payload: Option<Value>,
    init_timeout: Duration,
    connect_timeout: Duration,
    subscription_buffer: usize,
    connector: Option<Arc<dyn WsConnector>>,
    on_ack: Option<AckHandler>,
}

impl Default for WsClientBuilder {
    fn default() -> Self {
        Self {
            url: None,
            headers: Vec::new(),
            init_payload: None,
            init_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            subscription_buffer: 64,
            connector: None,
            on_ack: None,
        }
    }
}

impl WsClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WebSocket endpoint URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add a handshake header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the `connection_init` payload (e.g. auth tokens).
    pub fn init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// Set the handshake (`connection_init`/`connection_ack`) timeout.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the physical connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-subscription buffer size. A consumer that falls this far
    /// behind is cancelled rather than buffered without bound.
    pub fn subscription_buffer(mut self, size: usize) -> Self {
        self.subscription_buffer = size;
        self
    }

    /// Invoke `handler` with the `connection_ack` payload on every
    /// successful handshake.
    pub fn on_connection_ack(
        mut self,
        handler: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> Self {
        self.on_ack = Some(Arc::new(handler));
        self
    }

    /// Override the transport (tests, alternative socket stacks).
    pub fn connector(mut self, connector: Arc<dyn WsConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<WsClient> {
        let url = self
            .url
            .ok_or_else(|| GraphQLError::Config("WebSocket endpoint not configured".to_string()))?;
        Ok(WsClient {
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(TungsteniteConnector)),
            options: WsOptions {
                url,
                headers: self.headers,
                init_payload: self.init_payload,
                init_timeout: self.init_timeout,
                connect_timeout: self.connect_timeout,
                subscription_buffer: self.subscription_buffer,
            },
            on_ack: self.on_ack,
            slot: tokio::sync::Mutex::new(Slot::Idle),
        })
    }
}
