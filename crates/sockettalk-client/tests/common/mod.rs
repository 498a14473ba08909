//! Shared harness: real brokers on ephemeral ports and connected clients.

#![allow(dead_code)]

use std::time::Duration;

use sockettalk_broker::{Broker, BrokerOptions};
use sockettalk_client::{Client, ClientOptions};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const QUIET: Duration = Duration::from_millis(300);

/// Start a broker and return it with its `http://` base URL.
pub async fn start_broker(options: BrokerOptions) -> (Broker, String) {
    let broker = Broker::new(options).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = broker.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (broker, format!("http://{addr}"))
}

/// Build a client for `url`, run its connection loop in the background and
/// wait until it is connected.
pub async fn connect(
    url: &str,
    options: ClientOptions,
) -> (Client, JoinHandle<sockettalk_client::Result<()>>) {
    let client = Client::new(ClientOptions {
        server_url: Some(url.to_owned()),
        no_proxy: true,
        ..options
    })
    .unwrap();
    let runner = client.clone();
    let task = tokio::spawn(async move { runner.connect().await });
    tokio::time::timeout(Duration::from_secs(5), client.wait_connected())
        .await
        .expect("client did not connect")
        .unwrap();
    (client, task)
}

pub async fn wait_for_sessions(broker: &Broker, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.session_count().await < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("sessions never registered");
}

/// Subscribe `client` to `topic`, forwarding each decoded payload to a channel.
pub fn collect(client: &Client, topic: &str) -> mpsc::UnboundedReceiver<serde_json::Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.subscribe(topic, move |msg| {
        let tx = tx.clone();
        async move {
            if let Ok(value) = msg.bind_json() {
                let _ = tx.send(value);
            }
        }
    });
    rx
}

pub async fn recv(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("nothing delivered")
        .expect("channel closed")
}

/// Assert nothing arrives within [`QUIET`].
pub async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) {
    tokio::time::sleep(QUIET).await;
    assert!(rx.try_recv().is_err(), "unexpected delivery");
}
