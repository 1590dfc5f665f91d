//! Integration tests for the GraphQL WebSocket session.
//!
//! A fake in-memory connector stands in for the socket: each connection
//! hands the test a [`FakeLink`] for scripting the server side of the
//! graphql-transport-ws conversation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use gantry_graphql_client::ws::{Frame, WsClient, WsConn, WsConnector, WsMessage, close_code};
use gantry_graphql_client::{
    GraphQLError, GraphQLRequest, GraphQLResponse, Result, SessionState,
};

/// In-memory transport. Every `connect` yields a fresh link on the channel
/// returned by [`FakeConnector::new`].
#[derive(Clone)]
struct FakeConnector {
    links: mpsc::UnboundedSender<FakeLink>,
    connects: Arc<AtomicUsize>,
}

/// The server end of one fake connection. Dropping it closes the
/// connection abruptly.
struct FakeLink {
    to_client: mpsc::Sender<Frame>,
    from_client: mpsc::Receiver<Frame>,
}

impl FakeConnector {
    fn new() -> (Self, mpsc::UnboundedReceiver<FakeLink>) {
        let (links, accepted) = mpsc::unbounded_channel();
        (
            Self {
                links,
                connects: Arc::new(AtomicUsize::new(0)),
            },
            accepted,
        )
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WsConnector for FakeConnector {
    async fn connect(
        &self,
        _url: &str,
        protocol: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<WsConn> {
        assert_eq!(protocol, "graphql-transport-ws");
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (out_tx, out_rx) = mpsc::channel(32);
        let (in_tx, in_rx) = mpsc::channel(32);
        let _ = self.links.send(FakeLink {
            to_client: in_tx,
            from_client: out_rx,
        });
        Ok(WsConn {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

impl FakeLink {
    /// Next protocol message sent by the client.
    async fn recv(&mut self) -> WsMessage {
        match self.from_client.recv().await.expect("client hung up") {
            Frame::Text(text) => serde_json::from_str(&text).expect("client sent invalid frame"),
            Frame::Close(status) => panic!("expected a message, client closed: {status:?}"),
        }
    }

    /// Next raw frame sent by the client.
    async fn recv_frame(&mut self) -> Frame {
        self.from_client.recv().await.expect("client hung up")
    }

    async fn send(&self, message: WsMessage) {
        let text = serde_json::to_string(&message).unwrap();
        self.to_client.send(Frame::Text(text)).await.unwrap();
    }

    /// Run the server side of the handshake.
    async fn accept(&mut self) {
        let init = self.recv().await;
        assert!(matches!(init, WsMessage::ConnectionInit { .. }));
        self.send(WsMessage::ConnectionAck { payload: None }).await;
    }

    /// Expect a `subscribe` and return its id.
    async fn expect_subscribe(&mut self) -> String {
        let WsMessage::Subscribe { id, .. } = self.recv().await else {
            panic!("expected subscribe");
        };
        id
    }
}

fn ws_client(connector: FakeConnector) -> WsClient {
    WsClient::builder()
        .url("ws://server/graphql")
        .connector(Arc::new(connector))
        .build()
        .unwrap()
}

fn next_frame(id: &str, data: Value) -> WsMessage {
    WsMessage::Next {
        id: id.to_string(),
        payload: GraphQLResponse {
            data: Some(data),
            errors: None,
            extensions: None,
        },
    }
}

fn error_frame(id: &str, message: &str) -> WsMessage {
    serde_json::from_value(json!({
        "type": "error",
        "id": id,
        "payload": [{"message": message}]
    }))
    .unwrap()
}

#[tokio::test]
async fn execute_resolves_a_single_response() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let WsMessage::Subscribe { id, payload } = link.recv().await else {
            panic!("expected subscribe");
        };
        assert_eq!(payload.query, "{ greeting }");
        link.send(next_frame(&id, json!({"greeting": "hi"}))).await;
        link.send(WsMessage::Complete { id }).await;
        link
    });

    let response = client
        .execute(GraphQLRequest::new("{ greeting }"))
        .await
        .unwrap();
    assert_eq!(response.data.unwrap()["greeting"], "hi");
    drop(server.await.unwrap());
}

#[tokio::test]
async fn subscription_yields_values_until_complete() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let id = link.expect_subscribe().await;
        link.send(next_frame(&id, json!({"n": 1}))).await;
        link.send(next_frame(&id, json!({"n": 2}))).await;
        link.send(WsMessage::Complete { id }).await;
        link
    });

    let mut stream = client
        .execute_subscription(GraphQLRequest::new("subscription { n }"))
        .await
        .unwrap();
    assert_eq!(
        stream.next().await.unwrap().unwrap().data.unwrap()["n"],
        1
    );
    assert_eq!(
        stream.next().await.unwrap().unwrap().data.unwrap()["n"],
        2
    );
    assert!(stream.next().await.is_none());
    drop(server.await.unwrap());
}

#[tokio::test]
async fn subscription_error_terminates_the_stream() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let id = link.expect_subscribe().await;
        link.send(error_frame(&id, "boom")).await;
        link
    });

    let mut stream = client
        .execute_subscription(GraphQLRequest::new("subscription { tick }"))
        .await
        .unwrap();

    let err = stream.next().await.unwrap().unwrap_err();
    let GraphQLError::Subscription(errors) = err else {
        panic!("expected a subscription error, got {err}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "boom");
    assert!(stream.next().await.is_none());
    drop(server.await.unwrap());
}

#[tokio::test]
async fn no_subscribe_before_ack_and_early_ping_unanswered() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        let init = link.recv().await;
        assert!(matches!(init, WsMessage::ConnectionInit { .. }));
        // A keep-alive interleaved before the ack must not be answered.
        link.send(WsMessage::Ping { payload: None }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        link.send(WsMessage::ConnectionAck { payload: None }).await;
        // The first frame after the handshake is the subscribe, not a pong.
        let id = link.expect_subscribe().await;
        link.send(next_frame(&id, json!({"ok": true}))).await;
        link
    });

    let response = client.execute(GraphQLRequest::new("{ ok }")).await.unwrap();
    assert_eq!(response.data.unwrap()["ok"], true);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn ping_is_answered_with_a_payloadless_pong_when_ready() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        link.send(WsMessage::Ping {
            payload: Some(json!({"probe": 1})),
        })
        .await;
        let WsMessage::Pong { payload } = link.recv().await else {
            panic!("expected pong");
        };
        assert!(payload.is_none());
        link
    });

    client.start().await.unwrap();
    drop(server.await.unwrap());
}

#[tokio::test]
async fn concurrent_starts_share_one_handshake() {
    let (connector, mut links) = FakeConnector::new();
    let client = Arc::new(ws_client(connector.clone()));

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        let init = link.recv().await;
        assert!(matches!(init, WsMessage::ConnectionInit { .. }));
        // Let the other callers pile up behind the in-flight handshake.
        tokio::time::sleep(Duration::from_millis(30)).await;
        link.send(WsMessage::ConnectionAck { payload: None }).await;
        // No second connection_init may arrive.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(link.from_client.try_recv().is_err());
        link
    });

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.start().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(connector.connects(), 1);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn concurrent_requests_get_distinct_ids_and_matching_responses() {
    let (connector, mut links) = FakeConnector::new();
    let client = Arc::new(ws_client(connector));

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let mut operations = Vec::new();
        for _ in 0..2 {
            let WsMessage::Subscribe { id, payload } = link.recv().await else {
                panic!("expected subscribe");
            };
            operations.push((id, payload.query));
        }
        assert_ne!(operations[0].0, operations[1].0);
        // Answer in reverse arrival order; correlation is by id, not order.
        for (id, query) in operations.iter().rev() {
            link.send(next_frame(id, json!({"echo": query}))).await;
        }
        link
    });

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(GraphQLRequest::new("{ a }")).await })
    };
    let second = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(GraphQLRequest::new("{ b }")).await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.data.unwrap()["echo"], "{ a }");
    assert_eq!(second.data.unwrap()["echo"], "{ b }");
    drop(server.await.unwrap());
}

#[tokio::test]
async fn cancelling_a_subscription_sends_one_complete() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let id = link.expect_subscribe().await;
        link.send(next_frame(&id, json!({"n": 1}))).await;
        (link, id)
    });

    let mut stream = client
        .execute_subscription(GraphQLRequest::new("subscription { n }"))
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.data.unwrap()["n"], 1);

    let (mut link, id) = server.await.unwrap();
    stream.stop();

    // Exactly one complete, with the matching id.
    let WsMessage::Complete { id: completed } = link.recv().await else {
        panic!("expected complete");
    };
    assert_eq!(completed, id);

    // The server keeps sending for that id; the local stream stays ended
    // and the client stays quiet.
    link.send(next_frame(&id, json!({"n": 2}))).await;
    link.send(next_frame(&id, json!({"n": 3}))).await;
    assert!(stream.next().await.is_none());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(link.from_client.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_fails_all_outstanding_then_reconnects_on_demand() {
    let (connector, mut links) = FakeConnector::new();
    let client = Arc::new(ws_client(connector.clone()));

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        // One single and one streaming request outstanding.
        assert!(matches!(link.recv().await, WsMessage::Subscribe { .. }));
        assert!(matches!(link.recv().await, WsMessage::Subscribe { .. }));
        drop(link);

        // The next request reconnects.
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let id = link.expect_subscribe().await;
        link.send(next_frame(&id, json!({"ok": true}))).await;
        link
    });

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(GraphQLRequest::new("{ slow }")).await })
    };
    let mut stream = client
        .execute_subscription(GraphQLRequest::new("subscription { tick }"))
        .await
        .unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_disconnected());
    let stream_err = stream.next().await.unwrap().unwrap_err();
    assert!(stream_err.is_disconnected());
    assert!(stream.next().await.is_none());

    // The cached session was invalidated, so this reconnects transparently.
    let response = client.execute(GraphQLRequest::new("{ ok }")).await.unwrap();
    assert_eq!(response.data.unwrap()["ok"], true);
    assert_eq!(connector.connects(), 2);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn init_timeout_fails_start_and_closes_with_4408() {
    let (connector, mut links) = FakeConnector::new();
    let client = WsClient::builder()
        .url("ws://server/graphql")
        .init_timeout(Duration::from_millis(50))
        .connector(Arc::new(connector))
        .build()
        .unwrap();

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        let init = link.recv().await;
        assert!(matches!(init, WsMessage::ConnectionInit { .. }));
        // Never acknowledge; the client must give up and close.
        let Frame::Close(Some((code, _))) = link.recv_frame().await else {
            panic!("expected a close frame");
        };
        assert_eq!(code, close_code::INIT_TIMEOUT);
        link
    });

    let err = client.start().await.unwrap_err();
    assert!(err.is_init_timeout());
    drop(server.await.unwrap());
}

#[tokio::test]
async fn non_ack_first_frame_is_a_protocol_violation() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector);

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        let init = link.recv().await;
        assert!(matches!(init, WsMessage::ConnectionInit { .. }));
        link.send(next_frame("1", json!({"x": 1}))).await;
        let Frame::Close(Some((code, _))) = link.recv_frame().await else {
            panic!("expected a close frame");
        };
        assert_eq!(code, close_code::UNAUTHORIZED);
        link
    });

    let err = client.start().await.unwrap_err();
    assert!(matches!(err, GraphQLError::Protocol(_)));
    drop(server.await.unwrap());
}

#[tokio::test]
async fn stop_fails_fast_until_restarted() {
    let (connector, mut links) = FakeConnector::new();
    let client = ws_client(connector.clone());

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        link.accept().await;
        let Frame::Close(Some((code, _))) = link.recv_frame().await else {
            panic!("expected a close frame");
        };
        assert_eq!(code, close_code::NORMAL);

        // start() after stop() opens a fresh connection.
        let mut restarted = links.recv().await.unwrap();
        restarted.accept().await;
        (link, restarted)
    });

    client.start().await.unwrap();
    client.stop().await;
    assert_eq!(client.state().await, SessionState::Stopped);

    let err = client
        .execute(GraphQLRequest::new("{ x }"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphQLError::SessionStopped));

    client.start().await.unwrap();
    assert_eq!(client.state().await, SessionState::Ready);
    assert_eq!(connector.connects(), 2);
    drop(server.await.unwrap());
}

#[tokio::test]
async fn start_forwards_init_payload_and_returns_ack_payload() {
    let (connector, mut links) = FakeConnector::new();
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let client = WsClient::builder()
        .url("ws://server/graphql")
        .init_payload(json!({"token": "secret"}))
        .on_connection_ack({
            let seen = seen.clone();
            move |payload| *seen.lock() = payload
        })
        .connector(Arc::new(connector))
        .build()
        .unwrap();

    let server = tokio::spawn(async move {
        let mut link = links.recv().await.unwrap();
        let WsMessage::ConnectionInit { payload } = link.recv().await else {
            panic!("expected connection_init");
        };
        assert_eq!(payload, Some(json!({"token": "secret"})));
        link.send(WsMessage::ConnectionAck {
            payload: Some(json!({"connectionId": "abc"})),
        })
        .await;
        link
    });

    let ack = client.start().await.unwrap();
    assert_eq!(ack, Some(json!({"connectionId": "abc"})));
    assert_eq!(*seen.lock(), Some(json!({"connectionId": "abc"})));
    drop(server.await.unwrap());
}
