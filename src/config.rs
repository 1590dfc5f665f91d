//! GraphQL client configuration.

use serde_json::Value;
use std::time::Duration;

/// GraphQL client configuration.
#[derive(Debug, Clone)]
pub struct GraphQLClientConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// WebSocket endpoint URL (for subscriptions).
    pub ws_endpoint: Option<String>,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Default headers for all requests (HTTP and WebSocket handshake).
    pub default_headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Payload for the `connection_init` handshake message (e.g. auth).
    pub init_payload: Option<Value>,
    /// Timeout for the `connection_init`/`connection_ack` handshake.
    pub init_timeout: Duration,
    /// Per-subscription buffer size before a slow consumer is cancelled.
    pub subscription_buffer: usize,
}

impl Default for GraphQLClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4000/graphql".to_string(),
            ws_endpoint: None,
            timeout: Duration::from_secs(30),
            default_headers: Vec::new(),
            user_agent: format!("gantry-graphql-client/{}", env!("CARGO_PKG_VERSION")),
            init_payload: None,
            init_timeout: Duration::from_secs(30),
            subscription_buffer: 64,
        }
    }
}

impl GraphQLClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GraphQLClientConfigBuilder {
        GraphQLClientConfigBuilder::default()
    }

    /// Create configuration for a specific endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Builder for GraphQL client configuration.
#[derive(Debug, Default)]
pub struct GraphQLClientConfigBuilder {
    config: GraphQLClientConfig,
}

impl GraphQLClientConfigBuilder {
    /// Set the GraphQL endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the WebSocket endpoint for subscriptions.
    pub fn ws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.ws_endpoint = Some(endpoint.into());
        self
    }

    /// Set the HTTP request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Add a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.config.default_headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", token.into()),
        ));
        self
    }

    /// Set user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the `connection_init` payload sent during the WebSocket handshake.
    pub fn init_payload(mut self, payload: Value) -> Self {
        self.config.init_payload = Some(payload);
        self
    }

    /// Set the handshake timeout for the WebSocket session.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Set the per-subscription buffer size.
    pub fn subscription_buffer(mut self, size: usize) -> Self {
        self.config.subscription_buffer = size;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GraphQLClientConfig {
        self.config
    }
}
