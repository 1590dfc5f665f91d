//! GraphQL client implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::request::GraphQLRequest;
use crate::ws::{WsClient, WsClientBuilder};
use crate::{
    BatchRequest, BatchResponse, GraphQLClientConfig, GraphQLError, GraphQLResponse,
    MutationBuilder, QueryBuilder, Result, SubscriptionBuilder, SubscriptionStream,
};

/// GraphQL client.
///
/// Queries and mutations go over HTTP; subscriptions go over a shared
/// GraphQL WebSocket session that is opened on first use and re-opened on
/// demand after a disconnect.
#[derive(Clone)]
pub struct GraphQLClient {
    http_client: Client,
    config: Arc<GraphQLClientConfig>,
    ws: Arc<Mutex<Option<Arc<WsClient>>>>,
}

impl GraphQLClient {
    /// Create a new GraphQL client with the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let config = GraphQLClientConfig::new(endpoint);
        Self::with_config(config)
    }

    /// Create a new GraphQL client with custom configuration.
    pub fn with_config(config: GraphQLClientConfig) -> Self {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            config: Arc::new(config),
            ws: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &GraphQLClientConfig {
        &self.config
    }

    /// Create a query builder.
    pub fn query(&self, query: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, query)
    }

    /// Create a mutation builder.
    pub fn mutation(&self, mutation: impl Into<String>) -> MutationBuilder<'_> {
        MutationBuilder::new(self, mutation)
    }

    /// Create a subscription builder.
    pub fn subscribe(&self, subscription: impl Into<String>) -> SubscriptionBuilder<'_> {
        SubscriptionBuilder::new(self, subscription)
    }

    /// The shared WebSocket session, for explicit lifecycle control
    /// (`start`/`stop`) or for executing queries over WebSocket.
    ///
    /// Fails if no WebSocket endpoint is configured.
    pub fn websocket(&self) -> Result<Arc<WsClient>> {
        let mut slot = self.ws.lock();
        if let Some(ws) = &*slot {
            return Ok(ws.clone());
        }
        let endpoint = self.config.ws_endpoint.as_ref().ok_or_else(|| {
            GraphQLError::Config("WebSocket endpoint not configured".to_string())
        })?;

        let mut builder = WsClientBuilder::new()
            .url(endpoint)
            .init_timeout(self.config.init_timeout)
            .subscription_buffer(self.config.subscription_buffer);
        if let Some(payload) = &self.config.init_payload {
            builder = builder.init_payload(payload.clone());
        }
        for (name, value) in &self.config.default_headers {
            builder = builder.header(name, value);
        }

        let ws = Arc::new(builder.build()?);
        *slot = Some(ws.clone());
        Ok(ws)
    }

    /// Execute a batch of requests.
    pub async fn batch(&self, batch: BatchRequest) -> Result<BatchResponse> {
        if batch.is_empty() {
            return Ok(BatchResponse::new(Vec::new()));
        }

        debug!(count = batch.len(), "Executing batch request");

        let mut request = self.http_client.post(&self.config.endpoint);

        for (name, value) in &self.config.default_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request = request.header("Content-Type", "application/json");

        let response = request.json(&batch.into_requests()).send().await?;

        if !response.status().is_success() {
            return Err(GraphQLError::Http(response.error_for_status().unwrap_err()));
        }

        let responses: Vec<GraphQLResponse<Value>> = response.json().await?;
        Ok(BatchResponse::new(responses))
    }

    /// Execute a single request over HTTP.
    pub(crate) async fn execute_request(
        &self,
        request: GraphQLRequest,
        extra_headers: Vec<(String, String)>,
        timeout: Option<Duration>,
    ) -> Result<GraphQLResponse<Value>> {
        debug!(query = %request.query, "Executing GraphQL request");

        let mut http_request = self.http_client.post(&self.config.endpoint);

        for (name, value) in &self.config.default_headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        for (name, value) in extra_headers {
            http_request = http_request.header(name.as_str(), value.as_str());
        }

        http_request = http_request.header("Content-Type", "application/json");

        if let Some(timeout) = timeout {
            http_request = http_request.timeout(timeout);
        }

        let response = http_request.json(&request).send().await?;

        if !response.status().is_success() {
            return Err(GraphQLError::Http(response.error_for_status().unwrap_err()));
        }

        let graphql_response: GraphQLResponse<Value> = response.json().await?;
        Ok(graphql_response)
    }

    /// Execute a subscription over the shared WebSocket session.
    pub(crate) async fn execute_subscription(
        &self,
        request: GraphQLRequest,
    ) -> Result<SubscriptionStream> {
        self.websocket()?.execute_subscription(request).await
    }
}

impl Default for GraphQLClient {
    fn default() -> Self {
        Self::with_config(GraphQLClientConfig::default())
    }
}
