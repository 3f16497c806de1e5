//! dyndemo - a relay, a "browser" endpoint and an anonymous "script" endpoint
//! in one process.
//!
//! The script drives the browser's document through proxies: reading
//! properties, creating and appending elements, batching fire-and-forget
//! calls and inspecting remote classes.
//!
//! Set `RUST_LOG=debug` to see every envelope on the wire.

mod dom;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use dynbus::DuplexChannel;
use dynbus::ObjectHost;
use dynbus::ObjectProxy;
use dynbus::Router;
use dynbus::RouterConfig;
use dynbus::Value;
use dynrelay::Relay;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const BROWSER: &str = "browser";

async fn endpoint(relay: &Relay, name: &str, config: RouterConfig) -> Result<Router> {
    let (endpoint, hub) = DuplexChannel::shared_pair();
    let (connection, _) = relay.attach(hub);
    info!(%connection, name, "endpoint attached");

    let router = Router::new(Arc::new(ObjectHost::new(name)), endpoint, config);
    router.register().await?;
    Ok(router)
}

async fn wait_bound(relay: &Relay, name: &str) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !relay.is_bound(name) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .with_context(|| format!("'{}' never registered with the relay", name))
}

fn proxy(value: Value, what: &str) -> Result<ObjectProxy> {
    value
        .into_proxy()
        .with_context(|| format!("{} is not a remote object", what))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let relay = Relay::default();

    let browser = endpoint(&relay, BROWSER, RouterConfig::default()).await?;
    dom::install(browser.host());
    wait_bound(&relay, BROWSER).await?;

    let config = RouterConfig::builder()
        .connect_to(BROWSER)
        .request_timeout(Duration::from_secs(5))
        .build();
    let script = endpoint(&relay, "script", config).await?;
    let stub = script.stub(BROWSER);

    // properties and object graphs
    let window = stub.root();
    let width = window.get("innerWidth").await?;
    let document = proxy(window.get("document").await?, "window.document")?;
    let body = proxy(document.get("body").await?, "document.body")?;
    info!(width = ?width, %document, %body, "resolved window.document.body");

    // creating and appending elements
    let heading = proxy(document.invoke("createElement", vec![Value::from("h1")]).await?, "h1")?;
    heading.invoke("setText", vec![Value::from("Hello from dynbus")]).await?;
    let appended = proxy(body.invoke("appendChild", vec![heading.clone().into()]).await?, "appended")?;
    let same = appended == heading;
    info!(same, "appendChild returned the element it was given");

    // fire-and-forget calls travel in one batch
    for tick in 0..3 {
        heading.notify("setText", vec![Value::from(format!("tick {}", tick))])?;
    }
    stub.flush().await?;
    let text = heading.get("textContent").await?;
    info!(text = ?text, "after batched updates");

    // constructors and class inspection
    let paragraph = proxy(stub.construct("HTMLElement", vec![Value::from("p")]).await?, "p")?;
    body.invoke("appendChild", vec![paragraph.clone().into()]).await?;
    let tag = paragraph.get("tagName").await?;
    let children = body.get("childElementCount").await?;
    info!(tag = ?tag, children = ?children, "constructed and appended");
    for name in ["appendChild", "textContent", "innerHTML"] {
        let kind = paragraph.member(name).await?;
        info!(member = name, kind = ?kind, "member lookup");
    }

    // failures come back as error responses
    match window.invoke("frobnicate", vec![]).await {
        Ok(value) => warn!(?value, "frobnicate unexpectedly succeeded"),
        Err(e) => info!(kind = %e.kind(), "frobnicate failed as expected: {}", e),
    }

    script.close().await?;
    browser.close().await?;
    let state = browser.wait_closed().await;
    info!(%state, "done");
    Ok(())
}
