//! # Gantry GraphQL Client
//!
//! A type-safe GraphQL client with support for queries, mutations, and
//! multiplexed WebSocket subscriptions.
//!
//! ## Features
//!
//! - **Queries and mutations** over HTTP, with builder-style requests
//! - **Subscriptions**: graphql-transport-ws over a single shared
//!   WebSocket connection, multiplexing any number of concurrent
//!   operations with per-request ids
//! - **Transparent reconnection**: the session is cached while healthy and
//!   re-established on the next request after a disconnect
//! - **Batching**: post multiple queries as one HTTP request
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gantry_graphql_client::GraphQLClient;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: String,
//!     name: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct GetUserResponse {
//!     user: User,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GraphQLClient::new("https://api.example.com/graphql");
//!
//!     let response: GetUserResponse = client
//!         .query("query GetUser($id: ID!) { user(id: $id) { id name } }")
//!         .variable("id", "123")
//!         .send()
//!         .await?;
//!
//!     println!("User: {}", response.user.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Subscriptions
//!
//! ```rust,ignore
//! use gantry_graphql_client::{GraphQLClient, GraphQLClientConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GraphQLClientConfig::builder()
//!         .endpoint("https://api.example.com/graphql")
//!         .ws_endpoint("wss://api.example.com/graphql")
//!         .build();
//!     let client = GraphQLClient::with_config(config);
//!
//!     let mut subscription = client
//!         .subscribe("subscription { messageAdded { id content } }")
//!         .send()
//!         .await?;
//!
//!     while let Some(result) = subscription.next().await {
//!         match result {
//!             Ok(response) => println!("Received: {:?}", response.data),
//!             Err(e) => eprintln!("Subscription ended: {}", e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod batch;
mod client;
mod config;
mod error;
mod request;
mod response;
pub mod ws;

pub use batch::{BatchRequest, BatchResponse};
pub use client::GraphQLClient;
pub use config::{GraphQLClientConfig, GraphQLClientConfigBuilder};
pub use error::{GraphQLError, Result};
pub use request::{GraphQLRequest, MutationBuilder, QueryBuilder, SubscriptionBuilder};
pub use response::{ErrorLocation, GraphQLResponse, GraphQLResponseError, PathSegment, format_path};
pub use ws::{SessionState, SubscriptionStream, WsClient, WsClientBuilder};

// Re-export common types
pub use serde_json::Value as JsonValue;
