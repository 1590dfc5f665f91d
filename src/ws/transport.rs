//! WebSocket transport adapter.
//!
//! The session core needs three capabilities from a connection: send a
//! frame, receive frames in order, and learn when the peer goes away. A
//! [`WsConn`] models them as a pair of channels serviced by dedicated
//! reader and writer tasks: producers enqueue frames instead of writing to
//! the socket directly, so frame writes are never interleaved, and the
//! close notification arrives in-band at the end of the incoming channel.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderName, HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::{GraphQLError, Result};

/// Queue depth between the session and the socket tasks.
const FRAME_BUFFER: usize = 32;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One transport frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A text data frame.
    Text(String),
    /// A close frame, with close code and reason when the peer sent them.
    Close(Option<(u16, String)>),
}

/// An open WebSocket connection, reduced to the capabilities the session
/// core uses.
pub struct WsConn {
    /// Single-writer queue; exactly one writer task drains it into the
    /// socket. Sending [`Frame::Close`] emits a close frame and stops it.
    pub outgoing: mpsc::Sender<Frame>,
    /// In-order inbound frames; yields [`Frame::Close`] and/or ends when
    /// the connection is gone.
    pub incoming: mpsc::Receiver<Frame>,
}

/// Opens physical WebSocket connections.
///
/// The default implementation is [`TungsteniteConnector`]; tests substitute
/// an in-memory fake.
#[async_trait]
pub trait WsConnector: Send + Sync + 'static {
    /// Connect to `url`, negotiating `protocol` via `Sec-WebSocket-Protocol`.
    async fn connect(
        &self,
        url: &str,
        protocol: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<WsConn>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
        protocol: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<WsConn> {
        let url = Url::parse(url).map_err(|e| GraphQLError::InvalidUrl(e.to_string()))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| GraphQLError::WebSocket(e.to_string()))?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(protocol).map_err(|e| GraphQLError::WebSocket(e.to_string()))?,
        );
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GraphQLError::WebSocket(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| GraphQLError::WebSocket(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| GraphQLError::WebSocket("connection attempt timed out".to_string()))?
            .map_err(|e| GraphQLError::WebSocket(e.to_string()))?;

        let (write, read) = ws_stream.split();

        let (outgoing_tx, outgoing_rx) = mpsc::channel(FRAME_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::channel(FRAME_BUFFER);

        tokio::spawn(writer_task(write, outgoing_rx));
        tokio::spawn(reader_task(read, incoming_tx));

        Ok(WsConn {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}

/// Writer task: the only code that touches the socket sink.
async fn writer_task(
    mut write: SplitSink<WsStream, TungsteniteMessage>,
    mut rx: mpsc::Receiver<Frame>,
) {
    while let Some(frame) = rx.recv().await {
        match frame {
            Frame::Text(text) => {
                if write
                    .send(TungsteniteMessage::Text(text.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Frame::Close(status) => {
                let close_frame = status.map(|(code, reason)| CloseFrame {
                    code: code.into(),
                    reason: reason.into(),
                });
                let _ = write.send(TungsteniteMessage::Close(close_frame)).await;
                break;
            }
        }
    }

    let _ = write.close().await;
}

/// Reader task: forwards text frames and the close notification.
async fn reader_task(mut read: SplitStream<WsStream>, tx: mpsc::Sender<Frame>) {
    while let Some(result) = read.next().await {
        match result {
            Ok(TungsteniteMessage::Text(text)) => {
                if tx.send(Frame::Text(text.to_string())).await.is_err() {
                    break;
                }
            }
            Ok(TungsteniteMessage::Close(close_frame)) => {
                let status = close_frame.map(|f| (f.code.into(), f.reason.to_string()));
                let _ = tx.send(Frame::Close(status)).await;
                break;
            }
            // Socket-level ping/pong and binary frames are not protocol
            // frames; tungstenite answers pings itself.
            Ok(_) => {}
            Err(_) => break,
        }
    }
}
