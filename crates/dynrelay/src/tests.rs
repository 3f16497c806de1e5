//! Relay tests: raw endpoints for the routing rules, routers for the full stack.

use std::sync::Arc;
use std::time::Duration;

use dynbus::ConnectionState;
use dynbus::DuplexChannel;
use dynbus::ObjectHost;
use dynbus::Record;
use dynbus::Router;
use dynbus::RouterConfig;
use dynbus::Transport;
use dynbus::Value;
use dynwire::Body;
use dynwire::ControlRequest;
use dynwire::Envelope;
use dynwire::Message;
use serde_json::json;

use crate::*;

/// Attaches a new connection and returns the endpoint's half.
fn attach(relay: &Relay) -> (ConnectionId, Arc<dyn Transport>) {
    let (endpoint, hub) = DuplexChannel::shared_pair();
    let (id, _task) = relay.attach(hub);
    (id, endpoint)
}

async fn until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("Condition never became true");
}

async fn control(endpoint: &Arc<dyn Transport>, request: ControlRequest) {
    let envelope = Envelope::control(None, request.to_message());
    endpoint.send(&dynwire::encode_envelope(&envelope).unwrap()).await.unwrap();
}

async fn listen(relay: &Relay, endpoint: &Arc<dyn Transport>, id: ConnectionId, name: &str) {
    control(endpoint, ControlRequest::Listen(name.into())).await;
    until(|| relay.connection_for(name) == Some(id)).await;
}

async fn send(endpoint: &Arc<dyn Transport>, to: &str, from: Option<&str>, body: Body) {
    let envelope = Envelope::new(Some(to.into()), from.map(String::from), body);
    endpoint.send(&dynwire::encode_envelope(&envelope).unwrap()).await.unwrap();
}

async fn recv(endpoint: &Arc<dyn Transport>) -> Envelope {
    let bytes = tokio::time::timeout(Duration::from_secs(5), endpoint.recv())
        .await
        .expect("Timed out waiting for an envelope")
        .unwrap()
        .expect("Transport closed");
    dynwire::decode_envelope(&bytes).unwrap()
}

fn note(text: &str) -> Body {
    Message::notification("note", vec![json!(text)]).into()
}

// ============================================================================
//  1. ROUTING
// ============================================================================

#[tokio::test]
async fn test_routes_by_to_and_stamps_from() {
    let relay = Relay::default();
    let (a_id, a) = attach(&relay);
    let (b_id, b) = attach(&relay);
    listen(&relay, &a, a_id, "server_a").await;
    listen(&relay, &b, b_id, "server_b").await;

    send(&a, "server_b", Some("forged"), note("hi")).await;

    let received = recv(&b).await;
    assert_eq!(received.to.as_deref(), Some("server_b"));
    assert_eq!(received.from.as_deref(), Some("server_a"));
    assert_eq!(received.body, note("hi"));
    assert_eq!(relay.endpoints(), vec!["server_a", "server_b"]);
}

#[tokio::test]
async fn test_newest_registration_wins() {
    let relay = Relay::default();
    let (sender_id, sender) = attach(&relay);
    let (old_id, old) = attach(&relay);
    let (new_id, new) = attach(&relay);
    listen(&relay, &sender, sender_id, "a").await;
    listen(&relay, &old, old_id, "b").await;
    listen(&relay, &new, new_id, "b").await;

    send(&sender, "b", None, note("for the newest")).await;
    assert_eq!(recv(&new).await.body, note("for the newest"));

    // the superseded connection going away must not release the name
    old.close().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(relay.connection_for("b"), Some(new_id));
}

#[tokio::test]
async fn test_unroutable_envelopes_are_dropped() {
    let relay = Relay::default();
    let (a_id, a) = attach(&relay);
    let (b_id, b) = attach(&relay);
    let (_, stranger) = attach(&relay);
    listen(&relay, &a, a_id, "a").await;
    listen(&relay, &b, b_id, "b").await;

    send(&a, "nobody", None, note("lost")).await;
    send(&stranger, "b", None, note("unregistered")).await;
    a.send(b"{not json").await.unwrap();
    let bad_control = Envelope::control(None, Message::request(1, "__listen__", vec![json!("x")]));
    a.send(&dynwire::encode_envelope(&bad_control).unwrap()).await.unwrap();

    send(&a, "b", None, note("delivered")).await;

    let received = recv(&b).await;
    assert_eq!(received.body, note("delivered"));
    assert!(!relay.is_bound("x"));
}

#[tokio::test]
async fn test_disconnect_releases_name() {
    let relay = Relay::default();
    let (a_id, a) = attach(&relay);
    listen(&relay, &a, a_id, "a").await;

    a.close().await.unwrap();
    until(|| !relay.is_bound("a")).await;
}

#[tokio::test]
async fn test_relisten_moves_name() {
    let relay = Relay::default();
    let (a_id, a) = attach(&relay);
    listen(&relay, &a, a_id, "first").await;
    listen(&relay, &a, a_id, "second").await;

    assert!(!relay.is_bound("first"));
    assert_eq!(relay.endpoints(), vec!["second"]);
}

// ============================================================================
//  2. ANONYMOUS CONNECTIONS
// ============================================================================

#[tokio::test]
async fn test_connect_assigns_name_and_pins_destination() {
    let relay = Relay::default();
    let (server_id, server) = attach(&relay);
    let (_, other) = attach(&relay);
    let (client_id, client) = attach(&relay);
    listen(&relay, &server, server_id, "server").await;

    control(&client, ControlRequest::Connect("server".into())).await;
    until(|| relay.endpoints().len() == 2).await;
    let generated = relay
        .endpoints()
        .into_iter()
        .find(|name| name != "server")
        .unwrap();
    assert_eq!(relay.connection_for(&generated), Some(client_id));

    // pinned: only the server is reachable
    send(&client, "other", None, note("nope")).await;
    send(&client, "server", None, note("hello")).await;

    let received = recv(&server).await;
    assert_eq!(received.from.as_deref(), Some(generated.as_str()));
    assert_eq!(received.body, note("hello"));

    send(&server, &generated, None, note("welcome")).await;
    assert_eq!(recv(&client).await.body, note("welcome"));
    drop(other);
}

#[tokio::test]
async fn test_listen_after_connect_lifts_pin() {
    let relay = Relay::default();
    let (server_id, server) = attach(&relay);
    let (other_id, other) = attach(&relay);
    let (client_id, client) = attach(&relay);
    listen(&relay, &server, server_id, "server").await;
    listen(&relay, &other, other_id, "other").await;

    control(&client, ControlRequest::Connect("server".into())).await;
    until(|| relay.endpoints().len() == 3).await;
    listen(&relay, &client, client_id, "client").await;
    assert_eq!(relay.endpoints(), vec!["client", "other", "server"]);

    send(&client, "other", None, note("unpinned")).await;
    let received = recv(&other).await;
    assert_eq!(received.from.as_deref(), Some("client"));
    assert_eq!(received.body, note("unpinned"));
}

#[tokio::test]
async fn test_anonymous_can_be_refused() {
    let relay = Relay::new(RelayConfig::builder().allow_anonymous(false).build());
    let (_, client) = attach(&relay);

    control(&client, ControlRequest::Connect("server".into())).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(relay.endpoints().is_empty());
}

// ============================================================================
//  3. FULL STACK
// ============================================================================

async fn endpoint(relay: &Relay, name: &str, config: RouterConfig) -> Router {
    let (endpoint, hub) = DuplexChannel::shared_pair();
    let _ = relay.attach(hub);
    let router = Router::new(Arc::new(ObjectHost::new(name)), endpoint, config);
    router.register().await.unwrap();
    router
}

#[tokio::test]
async fn test_routers_through_relay() {
    let relay = Relay::default();
    let server = endpoint(&relay, "server_b", RouterConfig::default()).await;
    let client = endpoint(&relay, "server_a", RouterConfig::default()).await;
    until(|| relay.is_bound("server_a") && relay.is_bound("server_b")).await;

    let document = Record::with_class("Document").field("title", "dynbus").into_live();
    server.host().set_root(Record::with_class("Window").field("document", document).into_live());

    let root = client.stub("server_b").root();
    let document = root.get("document").await.unwrap().into_proxy().unwrap();
    assert_eq!(document.class_name(), Some("Document"));
    assert_eq!(document.get("title").await.unwrap(), Value::from("dynbus"));
    assert_eq!(client.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_anonymous_router_through_relay() {
    let relay = Relay::default();
    let server = endpoint(&relay, "server", RouterConfig::default()).await;
    until(|| relay.is_bound("server")).await;
    server.host().set_root(Record::new().field("x", 5i64).into_live());

    let config = RouterConfig::builder().connect_to("server").build();
    let client = endpoint(&relay, "ignored", config).await;

    let x = client.stub("server").root().get("x").await.unwrap();
    assert_eq!(x, Value::from(5i64));
    assert!(!relay.is_bound("ignored"));
}
