//! graphql-transport-ws protocol frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::GraphQLRequest;
use crate::response::{GraphQLResponse, GraphQLResponseError};

/// WebSocket sub-protocol negotiated during the handshake.
pub const SUB_PROTOCOL: &str = "graphql-transport-ws";

/// Application-level close codes defined by the protocol.
pub mod close_code {
    /// Malformed or unexpected message.
    pub const INVALID_MESSAGE: u16 = 4400;
    /// Handshake rejected, or a non-handshake frame arrived first.
    pub const UNAUTHORIZED: u16 = 4401;
    /// `connection_ack` did not arrive in time.
    pub const INIT_TIMEOUT: u16 = 4408;
    /// A `subscribe` reused an id that is still active.
    pub const SUBSCRIBER_EXISTS: u16 = 4409;
    /// More than one `connection_init` on a single connection.
    pub const TOO_MANY_INIT_REQUESTS: u16 = 4429;
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
}

/// One graphql-transport-ws frame.
///
/// Both directions share the same frame space; a client only ever sends
/// `connection_init`, `subscribe`, `complete`, `ping` and `pong`. Frames
/// carrying an `id` are totally ordered per id on the single connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Start the session handshake.
    ConnectionInit {
        /// Arbitrary handshake payload (e.g. auth tokens).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Handshake accepted; GraphQL traffic may begin.
    ConnectionAck {
        /// Arbitrary payload supplied by the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keep-alive probe; answered with `pong`.
    Ping {
        /// Optional probe payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keep-alive answer.
    Pong {
        /// Optional probe payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Start one GraphQL operation (query, mutation, or subscription).
    Subscribe {
        /// Request id, unique among the sender's outstanding requests.
        id: String,
        /// The operation to execute.
        payload: SubscribePayload,
    },
    /// One execution result for the request `id`.
    Next {
        /// Id of the request this result belongs to.
        id: String,
        /// The execution result map.
        payload: GraphQLResponse<Value>,
    },
    /// Terminal request-level errors for the request `id`.
    Error {
        /// Id of the failed request.
        id: String,
        /// The GraphQL errors that ended the request.
        payload: Vec<GraphQLResponseError>,
    },
    /// Normal end of results for the request `id`.
    Complete {
        /// Id of the completed request.
        id: String,
    },
}

impl WsMessage {
    /// The request id this frame is correlated to, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Subscribe { id, .. }
            | Self::Next { id, .. }
            | Self::Error { id, .. }
            | Self::Complete { id } => Some(id),
            _ => None,
        }
    }

    /// Protocol name of this frame's type, as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ConnectionInit { .. } => "connection_init",
            Self::ConnectionAck { .. } => "connection_ack",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Subscribe { .. } => "subscribe",
            Self::Next { .. } => "next",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }
}

/// Payload of a `subscribe` frame: one GraphQL operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribePayload {
    /// The GraphQL document.
    pub query: String,
    /// Operation name (for documents with multiple operations).
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
    /// Variables for the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    /// Extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl From<GraphQLRequest> for SubscribePayload {
    fn from(request: GraphQLRequest) -> Self {
        Self {
            query: request.query,
            operation_name: request.operation_name,
            variables: request.variables,
            extensions: request.extensions,
        }
    }
}
