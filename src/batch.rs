//! GraphQL request batching over HTTP.

use serde::Serialize;
use serde_json::Value;

use crate::GraphQLResponse;
use crate::request::GraphQLRequest;

/// A batch of GraphQL requests, posted to the server as one JSON array.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRequest {
    requests: Vec<GraphQLRequest>,
}

impl BatchRequest {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prepared request to the batch.
    pub fn with_request(mut self, request: GraphQLRequest) -> Self {
        self.requests.push(request);
        self
    }

    /// Add a bare query to the batch.
    pub fn query(self, query: impl Into<String>) -> Self {
        self.with_request(GraphQLRequest::new(query))
    }

    /// Number of requests in the batch.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Consume and return the requests.
    pub fn into_requests(self) -> Vec<GraphQLRequest> {
        self.requests
    }
}

/// Responses for a batch, in request order.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    responses: Vec<GraphQLResponse<Value>>,
}

impl BatchResponse {
    /// Wrap a list of responses.
    pub fn new(responses: Vec<GraphQLResponse<Value>>) -> Self {
        Self { responses }
    }

    /// Number of responses.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Get the response at `index`.
    pub fn get(&self, index: usize) -> Option<&GraphQLResponse<Value>> {
        self.responses.get(index)
    }

    /// Check if any response carries errors.
    pub fn has_errors(&self) -> bool {
        self.responses.iter().any(|r| r.has_errors())
    }

    /// Consume and return the responses.
    pub fn into_responses(self) -> Vec<GraphQLResponse<Value>> {
        self.responses
    }
}

impl IntoIterator for BatchResponse {
    type Item = GraphQLResponse<Value>;
    type IntoIter = std::vec::IntoIter<GraphQLResponse<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.responses.into_iter()
    }
}
