//! SPEC_FULL.md §8 scenario 4: a server-advertised peer (`INFO
//! connect_urls`) becomes a reconnect candidate without ever being passed to
//! `Options::servers` directly.

mod support;

use std::time::Duration;

use support::MockServer;
use wirebus::{Connection, Endpoint, Event, Options, Scheme};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discovered_endpoint_is_used_for_reconnect() {
    support::init_tracing();
    let primary = MockServer::bind().await;
    let primary_port = primary.port();
    let discovered = MockServer::bind().await;
    let discovered_port = discovered.port();

    let first = tokio::spawn(async move {
        let mut client = primary.accept().await;
        client.send_info(&format!(r#""connect_urls":["127.0.0.1:{discovered_port}"]"#)).await;
        client.expect_handshake().await;
        client
    });

    let mut options = Options::new(vec![Endpoint::new(Scheme::Plain, "127.0.0.1", primary_port)]);
    options.reconnect_wait = Duration::from_millis(30);
    options.reconnect_jitter = Duration::from_millis(0);
    options.connection_timeout = Duration::from_secs(1);
    options.ping_interval = Duration::from_secs(3600);

    let conn = Connection::connect(options).await.expect("connects to the configured server");
    let mut events = conn.events();

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        if matches!(event, Event::DiscoveredServers) {
            break;
        }
    }

    let client = first.await.unwrap();
    drop(client);

    let accept_discovered = tokio::spawn(async move {
        let mut client = discovered.accept().await;
        client.send_info("").await;
        client.expect_handshake().await;
        client
    });

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        if matches!(event, Event::Reconnected) {
            break;
        }
    }

    let _client = tokio::time::timeout(Duration::from_secs(2), accept_discovered)
        .await
        .expect("discovered endpoint was dialed")
        .unwrap();

    conn.close().await.unwrap();
}
