//! SSE poke delivery: per-stream fan-out, category partitioning, and the
//! shared client hub on top of it.

use evento_client::{HubConfig, SubscriptionHub};
use evento_protocol::{MessageInput, WriteOptions};
use evento_test_utils::{SseCapture, TestServer};
use serde_json::json;
use std::time::Duration;

const POKE_WAIT: Duration = Duration::from_secs(5);

fn message() -> MessageInput {
    MessageInput {
        message_type: "E".to_owned(),
        data: json!({}),
        metadata: None,
    }
}

#[tokio::test]
async fn two_subscribers_both_receive_then_survivor_continues() {
    let server = TestServer::start().await;
    let (client, token) = server.namespace("test").await;

    let mut first = SseCapture::open(&server.stream_subscribe_url("x", &token)).await;
    let mut second = SseCapture::open(&server.stream_subscribe_url("x", &token)).await;

    let written = client
        .write_message("x", &message(), &WriteOptions::default())
        .await
        .unwrap();

    for capture in [&mut first, &mut second] {
        let poke = capture.next_poke(POKE_WAIT).await.expect("poke");
        assert_eq!(poke.stream, "x");
        assert_eq!(poke.position, written.position);
        assert_eq!(poke.global_position, written.global_position);
    }

    // Close the first subscriber; the second keeps receiving.
    first.close();
    let written = client
        .write_message("x", &message(), &WriteOptions::default())
        .await
        .unwrap();
    let poke = second.next_poke(POKE_WAIT).await.expect("second poke");
    assert_eq!(poke.position, written.position);
    second.close();
}

#[tokio::test]
async fn stream_subscription_ignores_other_streams() {
    let server = TestServer::start().await;
    let (client, token) = server.namespace("test").await;

    let mut capture = SseCapture::open(&server.stream_subscribe_url("wanted-1", &token)).await;

    client
        .write_message("other-1", &message(), &WriteOptions::default())
        .await
        .unwrap();
    capture.expect_silence(Duration::from_millis(500)).await;

    client
        .write_message("wanted-1", &message(), &WriteOptions::default())
        .await
        .unwrap();
    let poke = capture.next_poke(POKE_WAIT).await.expect("poke");
    assert_eq!(poke.stream, "wanted-1");
    capture.close();
}

#[tokio::test]
async fn category_subscription_with_partitioning() {
    let server = TestServer::start().await;
    let (client, token) = server.namespace("test").await;

    let mut member0 =
        SseCapture::open(&server.category_subscribe_url("c", Some((0, 2)), &token)).await;
    let mut member1 =
        SseCapture::open(&server.category_subscribe_url("c", Some((1, 2)), &token)).await;

    for i in 0..6 {
        client
            .write_message(&format!("c-{i}"), &message(), &WriteOptions::default())
            .await
            .unwrap();
    }

    let mut got0 = Vec::new();
    while let Some(poke) = member0.next_poke(Duration::from_millis(800)).await {
        got0.push(poke.stream);
    }
    let mut got1 = Vec::new();
    while let Some(poke) = member1.next_poke(Duration::from_millis(800)).await {
        got1.push(poke.stream);
    }

    assert_eq!(got0.len() + got1.len(), 6, "every poke went to one member");
    for stream in &got0 {
        assert!(!got1.contains(stream));
        assert_eq!(evento_protocol::stream_name::group_member(stream, 2), 0);
    }
    member0.close();
    member1.close();
}

#[tokio::test]
async fn subscribe_validates_params_and_token() {
    let server = TestServer::start().await;
    let (_, token) = server.namespace("test").await;
    let http = reqwest::Client::new();

    // Missing token.
    let response = http
        .get(format!("{}/subscribe?stream=x", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Bad token.
    let response = http
        .get(format!("{}/subscribe?stream=x&token=garbage", server.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Stream and category together.
    let response = http
        .get(format!(
            "{}/subscribe?stream=x&category=c&token={token}",
            server.base_url()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Consumer without size.
    let response = http
        .get(format!(
            "{}/subscribe?category=c&consumer=0&token={token}",
            server.base_url()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

// ---------------------------------------------------------------------------
// Shared hub on a live server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hub_routes_pokes_to_registered_categories() {
    let server = TestServer::start().await;
    let (client, token) = server.namespace("test").await;

    let hub = SubscriptionHub::start(HubConfig::new(server.base_url(), token));
    let mut accounts = hub.register("account").await;
    let mut billing = hub.register("billing").await;

    // Give the hub a moment to establish its connection.
    let mut state = hub.state_watch();
    tokio::time::timeout(POKE_WAIT, async {
        while *state.borrow() != evento_client::HubState::Connected {
            state.changed().await.unwrap();
        }
    })
    .await
    .expect("hub connects");

    client
        .write_message("account-1", &message(), &WriteOptions::default())
        .await
        .unwrap();
    client
        .write_message("billing-9", &message(), &WriteOptions::default())
        .await
        .unwrap();

    let poke = tokio::time::timeout(POKE_WAIT, accounts.rx.recv())
        .await
        .expect("account poke in time")
        .expect("account poke");
    assert_eq!(poke.stream, "account-1");

    let poke = tokio::time::timeout(POKE_WAIT, billing.rx.recv())
        .await
        .expect("billing poke in time")
        .expect("billing poke");
    assert_eq!(poke.stream, "billing-9");

    // Unregistered categories receive nothing: account consumer must not
    // have seen billing traffic.
    assert!(accounts.rx.try_recv().is_err());
    hub.shutdown();
}

#[tokio::test]
async fn hub_falls_back_to_synthetic_pokes_when_the_server_is_gone() {
    // Nothing listens on this port.
    let config = HubConfig {
        reconnect_base: Duration::from_millis(50),
        reconnect_max: Duration::from_secs(60),
        fallback_poll_interval: Duration::from_millis(100),
        ..HubConfig::new("http://127.0.0.1:9", "ns_token_unused")
    };
    let hub = SubscriptionHub::start(config);
    let mut sub = hub.register("jobs").await;

    let poke = tokio::time::timeout(Duration::from_secs(10), sub.rx.recv())
        .await
        .expect("fallback poke in time")
        .expect("fallback poke");
    assert_eq!(
        poke.global_position,
        evento_protocol::FALLBACK_GLOBAL_POSITION
    );
    assert_eq!(hub.state(), evento_client::HubState::Disconnected);

    // After unregistering, the hub drops its sender and the mailbox closes.
    hub.unregister("jobs", sub.id()).await;
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while sub.rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "mailbox should close after unregister");
    hub.shutdown();
}
