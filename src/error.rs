//! GraphQL client error types.

use thiserror::Error;

/// Result type for GraphQL client operations.
pub type Result<T> = std::result::Result<T, GraphQLError>;

/// GraphQL client errors.
#[derive(Debug, Error)]
pub enum GraphQLError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// GraphQL errors returned by the server.
    #[error("GraphQL errors: {0:?}")]
    GraphQL(Vec<crate::GraphQLResponseError>),

    /// A subscription was terminated by a server-sent `error` message.
    #[error("Subscription failed: {0:?}")]
    Subscription(Vec<crate::GraphQLResponseError>),

    /// The peer violated the graphql-transport-ws protocol.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The connection was lost while the request was outstanding.
    #[error("Disconnected: {reason}")]
    Disconnected {
        /// WebSocket close code, if the peer sent one.
        code: Option<u16>,
        /// Human-readable cause.
        reason: String,
    },

    /// The connection init handshake did not complete in time.
    #[error("Connection initialization timed out")]
    InitTimeout,

    /// The session was stopped and has not been restarted.
    #[error("Session is stopped")]
    SessionStopped,

    /// A slow consumer overflowed its subscription buffer.
    #[error("Subscription {id}: consumer fell behind, buffer overflowed")]
    Overflow {
        /// Id of the cancelled subscription.
        id: String,
    },

    /// WebSocket error (for subscriptions).
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl GraphQLError {
    /// Check if this is a network error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Disconnected { .. }
        )
    }

    /// Check if this is a GraphQL error (server-side).
    pub fn is_graphql_error(&self) -> bool {
        matches!(self, Self::GraphQL(_) | Self::Subscription(_))
    }

    /// Check if this is a disconnection error.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Check if this is the handshake timeout error.
    pub fn is_init_timeout(&self) -> bool {
        matches!(self, Self::InitTimeout)
    }

    /// Get GraphQL errors if this is a GraphQL error.
    pub fn graphql_errors(&self) -> Option<&[crate::GraphQLResponseError]> {
        match self {
            Self::GraphQL(errors) | Self::Subscription(errors) => Some(errors),
            _ => None,
        }
    }

    /// Terminal errors are fanned out to every pending request; source errors
    /// that cannot be cloned degrade to their display form.
    pub(crate) fn replicate(&self) -> GraphQLError {
        match self {
            Self::Disconnected { code, reason } => Self::Disconnected {
                code: *code,
                reason: reason.clone(),
            },
            Self::InitTimeout => Self::InitTimeout,
            Self::SessionStopped => Self::SessionStopped,
            Self::Protocol(message) => Self::Protocol(message.clone()),
            Self::Overflow { id } => Self::Overflow { id: id.clone() },
            Self::Subscription(errors) => Self::Subscription(errors.clone()),
            Self::GraphQL(errors) => Self::GraphQL(errors.clone()),
            Self::WebSocket(message) => Self::WebSocket(message.clone()),
            Self::Config(message) => Self::Config(message.clone()),
            Self::Parse(message) => Self::Parse(message.clone()),
            Self::InvalidUrl(message) => Self::InvalidUrl(message.clone()),
            other => Self::WebSocket(other.to_string()),
        }
    }
}
