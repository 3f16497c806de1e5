//! End-to-end invocation between two routers.
//!
//! The two endpoints are wired back to back over an in-memory channel. Each
//! router stamps its own name into `from`, so no relay is needed for
//! point-to-point traffic.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use dynbus::object;
use dynbus::ClassDef;
use dynbus::ConnectionState;
use dynbus::DuplexChannel;
use dynbus::ErrorKind;
use dynbus::Exposed;
use dynbus::LiveObject;
use dynbus::Member;
use dynbus::ObjectHost;
use dynbus::ObjectProxy;
use dynbus::Record;
use dynbus::Reference;
use dynbus::Router;
use dynbus::RouterConfig;
use dynbus::Value;
use serde_json::json;

struct Pair {
    client: Router,
    server: Router,
}

async fn pair() -> Pair {
    let (a, b) = DuplexChannel::shared_pair();
    let client = Router::new(Arc::new(ObjectHost::new("client")), a, RouterConfig::default());
    let server = Router::new(Arc::new(ObjectHost::new("server")), b, RouterConfig::default());
    client.register().await.unwrap();
    server.register().await.unwrap();
    Pair { client, server }
}

/// A counter exposing one property and two operations.
struct Counter {
    count: AtomicI64,
}

impl Counter {
    fn live(start: i64) -> LiveObject {
        LiveObject::new(Counter { count: AtomicI64::new(start) })
    }
}

#[async_trait::async_trait]
impl Exposed for Counter {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "count" => Some(Value::from(self.count.load(Ordering::SeqCst))),
            _ => None,
        }
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> object::Result<Value> {
        match method {
            "increment" => {
                let by = args.first().and_then(Value::as_i64).unwrap_or(1);
                Ok(Value::from(self.count.fetch_add(by, Ordering::SeqCst) + by))
            }
            "fail" => Err(object::Error::failed("counter refused")),
            other => Err(object::Error::MethodNotFound(other.to_string())),
        }
    }
}

// ============================================================================
//  1. SCENARIO
// ============================================================================

#[tokio::test]
async fn test_getter_and_unknown_method_on_plain_object() {
    let Pair { client, server } = pair().await;

    let wire = server.host().marshal(Record::new().field("x", 5i64).into_live().into()).unwrap();
    assert_eq!(wire, json!({"class": "Object", "id": 0}));

    let proxy = ObjectProxy::new(client.stub("server"), Reference::new("Object", 0));
    assert_eq!(proxy.get("x").await.unwrap(), Value::from(5i64));

    let err = proxy.invoke("frobnicate", vec![]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    let dynbus::stub::Error::Remote(error) = err else { unreachable!() };
    assert_eq!(error.code, -32603);
}

#[tokio::test]
async fn test_stale_reference_is_an_error() {
    let Pair { client, server: _server } = pair().await;

    let proxy = ObjectProxy::new(client.stub("server"), Reference::new("Object", 41));
    let err = proxy.get("x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(err.to_string().contains("Unknown reference"));
    assert_eq!(client.state(), ConnectionState::Active);
}

// ============================================================================
//  2. IDENTITY
// ============================================================================

#[tokio::test]
async fn test_same_object_yields_equal_proxies() {
    let Pair { client, server } = pair().await;

    let shared = Counter::live(0);
    server
        .host()
        .register_method("counter", move |_| {
            let shared = shared.clone();
            async move { Ok(Value::Object(shared)) }
        })
        .unwrap();

    let stub = client.stub("server");
    let first = stub.request("counter", vec![]).await.unwrap().into_proxy().unwrap();
    let second = stub.request("counter", vec![]).await.unwrap().into_proxy().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.reference(), Some(&Reference::new("Counter", 0)));
    assert_eq!(server.host().registered_objects(), 1);
}

#[tokio::test]
async fn test_returned_object_resolves_to_same_instance() {
    let Pair { client, server } = pair().await;

    let shared = Counter::live(0);
    let handed_out = shared.clone();
    server
        .host()
        .register_method("counter", move |_| {
            let handed_out = handed_out.clone();
            async move { Ok(Value::Object(handed_out)) }
        })
        .unwrap();
    server
        .host()
        .register_method("is_counter", move |args: Vec<Value>| {
            let same = args.first().and_then(Value::as_object).is_some_and(|o| o.ptr_eq(&shared));
            async move { Ok(Value::from(same)) }
        })
        .unwrap();

    let stub = client.stub("server");
    let proxy = stub.request("counter", vec![]).await.unwrap();
    assert_eq!(stub.request("is_counter", vec![proxy.clone()]).await.unwrap(), Value::from(true));

    // state lives on the server's instance
    let proxy = proxy.into_proxy().unwrap();
    assert_eq!(proxy.invoke("increment", vec![Value::from(3i64)]).await.unwrap(), Value::from(3i64));
    assert_eq!(proxy.get("count").await.unwrap(), Value::from(3i64));
}

#[tokio::test]
async fn test_target_failure_is_reported() {
    let Pair { client, server } = pair().await;
    server.host().set_root(Counter::live(0));

    let err = client.stub("server").root().invoke("fail", vec![]).await.unwrap_err();
    assert!(err.to_string().contains("counter refused"));
}

// ============================================================================
//  3. ROOT & CLASSES
// ============================================================================

#[tokio::test]
async fn test_root_proxy_addresses_root_object() {
    let Pair { client, server } = pair().await;
    server.host().set_root(Counter::live(10));

    let root = client.stub("server").root();
    assert!(root.is_root());
    assert_eq!(root.invoke("increment", vec![]).await.unwrap(), Value::from(11i64));

    let by_reference = client.stub("server").root_object().await.unwrap().into_proxy().unwrap();
    assert_eq!(by_reference.class_name(), Some("Counter"));
    assert_eq!(by_reference.get("count").await.unwrap(), Value::from(11i64));
}

#[tokio::test]
async fn test_construct_and_member_lookup() {
    let Pair { client, server } = pair().await;
    server.host().register_class(ClassDef::new("Object").method("toString"));
    server.host().register_class(
        ClassDef::new("Counter")
            .parent("Object")
            .property("count")
            .method("increment")
            .constructor(|args| Ok(Counter::live(args.first().and_then(Value::as_i64).unwrap_or(0)))),
    );

    let stub = client.stub("server");
    let counter = stub.construct("Counter", vec![Value::from(4i64)]).await.unwrap().into_proxy().unwrap();
    assert_eq!(counter.get("count").await.unwrap(), Value::from(4i64));

    assert_eq!(counter.member("count").await.unwrap(), Some(Member::Property));
    assert_eq!(counter.member("increment").await.unwrap(), Some(Member::Method));
    assert_eq!(counter.member("toString").await.unwrap(), Some(Member::Method));
    assert_eq!(counter.member("nothing").await.unwrap(), None);

    let info = stub.inspect("Counter").await.unwrap().unwrap();
    assert_eq!(info.parent.as_deref(), Some("Object"));
    assert!(stub.inspect("Unknown").await.unwrap().is_none());
}

// ============================================================================
//  4. REENTRANCY & BATCHING
// ============================================================================

#[tokio::test]
async fn test_handler_may_call_back_into_caller() {
    let Pair { client, server } = pair().await;

    client.host().set_root(Record::new().field("greeting", "hello").into_live());

    let back = server.stub("client");
    server
        .host()
        .register_method("greet", move |args: Vec<Value>| {
            let back = back.clone();
            async move {
                let greeting = back
                    .root()
                    .get("greeting")
                    .await
                    .map_err(|e| object::Error::failed(e.to_string()))?;
                let name = args.first().and_then(Value::as_str).unwrap_or("nobody").to_string();
                Ok::<_, object::Error>(Value::from(format!(
                    "{}, {}",
                    greeting.as_str().unwrap_or_default(),
                    name
                )))
            }
        })
        .unwrap();

    let reply = client.stub("server").request("greet", vec![Value::from("world")]).await.unwrap();
    assert_eq!(reply, Value::from("hello, world"));
}

#[tokio::test]
async fn test_nested_callbacks_complete() {
    let Pair { client, server } = pair().await;

    // client -> server.outer -> client.middle -> server.inner
    server
        .host()
        .register_method("inner", |_| async { Ok(Value::from("inner")) })
        .unwrap();

    let to_server = client.stub("server");
    client
        .host()
        .register_method("middle", move |_| {
            let to_server = to_server.clone();
            async move {
                let inner = to_server
                    .request("inner", vec![])
                    .await
                    .map_err(|e| object::Error::failed(e.to_string()))?;
                Ok::<_, object::Error>(Value::from(format!("middle({})", inner.as_str().unwrap_or_default())))
            }
        })
        .unwrap();

    let to_client = server.stub("client");
    server
        .host()
        .register_method("outer", move |_| {
            let to_client = to_client.clone();
            async move {
                let middle = to_client
                    .request("middle", vec![])
                    .await
                    .map_err(|e| object::Error::failed(e.to_string()))?;
                Ok::<_, object::Error>(Value::from(format!("outer({})", middle.as_str().unwrap_or_default())))
            }
        })
        .unwrap();

    let reply = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        client.stub("server").request("outer", vec![]),
    )
    .await
    .expect("Nested calls deadlocked")
    .unwrap();
    assert_eq!(reply, Value::from("outer(middle(inner))"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_flushed_notifications_precede_later_request() {
    let Pair { client, server } = pair().await;
    server.host().set_root(Counter::live(0));

    let stub = client.stub("server");
    let root = stub.root();
    for round in 1..=200i64 {
        root.notify("increment", vec![Value::from(1i64)]).unwrap();
        stub.flush().await.unwrap();
        assert_eq!(root.get("count").await.unwrap(), Value::from(round), "stale read in round {}", round);
    }
}

#[tokio::test]
async fn test_notifications_are_batched_ahead_of_request() {
    let Pair { client, server } = pair().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    server
        .host()
        .register_method("log", move |args: Vec<Value>| {
            let log = log.clone();
            async move {
                let line = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
                log.lock().unwrap().push(line);
                Ok(Value::null())
            }
        })
        .unwrap();
    server
        .host()
        .register_method("count", {
            let seen = seen.clone();
            move |_| {
                let n = seen.lock().unwrap().len() as i64;
                async move { Ok(Value::from(n)) }
            }
        })
        .unwrap();

    let stub = client.stub("server");
    stub.notify("log", vec![Value::from("one")]).unwrap();
    stub.notify("log", vec![Value::from("two")]).unwrap();

    // the batch is handled in order, so both lines precede the count
    assert_eq!(stub.request("count", vec![]).await.unwrap(), Value::from(2i64));
    assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
}

#[tokio::test]
async fn test_local_objects_cannot_be_sent() {
    let Pair { client, server: _server } = pair().await;

    let err = client
        .stub("server")
        .request("anything", vec![Record::new().into_live().into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DispatchFailure);
}

#[tokio::test]
async fn test_close_fails_requests_on_both_sides() {
    let Pair { client, server } = pair().await;

    server
        .host()
        .register_method("hang", |_| futures::future::pending::<object::Result<Value>>())
        .unwrap();

    let stub = client.stub("server");
    let call = tokio::spawn(async move { stub.request("hang", vec![]).await });
    tokio::task::yield_now().await;

    server.close().await.unwrap();

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(client.wait_closed().await, ConnectionState::Closed);
}
