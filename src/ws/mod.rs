//! GraphQL over WebSocket: the graphql-transport-ws session core.
//!
//! One physical connection carries a strict `connection_init` /
//! `connection_ack` handshake followed by any number of concurrent
//! id-correlated requests, each started with `subscribe` and finished by a
//! terminal `error`/`complete` (queries and mutations see exactly one
//! `next` first; subscriptions any number). [`WsClient`] owns the cached
//! session, reconnects on demand after a disconnect, and hands frames to a
//! single-writer queue so concurrent callers never interleave writes.

mod codec;
mod correlator;
mod lifecycle;
mod message;
mod session;
mod transport;

pub use lifecycle::SessionState;
pub use message::{SUB_PROTOCOL, SubscribePayload, WsMessage, close_code};
pub use session::{SubscriptionStream, WsClient, WsClientBuilder};
pub use transport::{Frame, TungsteniteConnector, WsConn, WsConnector};
