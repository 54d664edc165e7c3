//! Sequential position assignment over the real HTTP surface.
//!
//! - Per-stream positions are dense from 0.
//! - Global positions are strictly increasing and dense per namespace.
//! - `stream.version` tracks the last write.
//! - Written fields read back unchanged; timestamps never decrease.

use evento_protocol::{GetStreamOptions, MessageInput, WriteOptions};
use evento_test_utils::TestServer;
use serde_json::json;

fn message(n: i64) -> MessageInput {
    MessageInput {
        message_type: "E".to_owned(),
        data: json!({"n": n}),
        metadata: Some(json!({"correlationStreamName": "workflow-1"})),
    }
}

#[tokio::test]
async fn five_writes_yield_dense_positions_and_version_four() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    let mut last_gp = -1;
    for n in 0..5 {
        let result = client
            .write_message("account-1", &message(n), &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.position, n);
        assert_eq!(result.global_position, last_gp + 1, "dense global positions");
        last_gp = result.global_position;
    }

    assert_eq!(client.stream_version("account-1").await.unwrap(), Some(4));
    assert_eq!(client.stream_version("untouched-1").await.unwrap(), None);
}

#[tokio::test]
async fn stream_get_round_trips_every_field_in_order() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    for n in 0..5 {
        client
            .write_message("account-1", &message(n), &WriteOptions::default())
            .await
            .unwrap();
    }

    let records = client
        .get_stream("account-1", &GetStreamOptions::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(
        records.iter().map(|r| r.position()).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    for (n, record) in records.iter().enumerate() {
        assert_eq!(record.message_type(), "E");
        assert_eq!(record.data(), &json!({"n": n}));
        assert_eq!(
            record.metadata(),
            Some(&json!({"correlationStreamName": "workflow-1"}))
        );
    }
    for pair in records.windows(2) {
        assert!(pair[0].global_position() < pair[1].global_position());
        assert!(pair[0].time() <= pair[1].time(), "time monotone per stream");
    }
}

#[tokio::test]
async fn client_supplied_ids_are_preserved() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    let id = uuid::Uuid::new_v4().to_string();
    client
        .write_message(
            "account-1",
            &message(0),
            &WriteOptions {
                id: Some(id.clone()),
                expected_version: None,
            },
        )
        .await
        .unwrap();

    let last = client
        .get_last_message("account-1", None)
        .await
        .unwrap()
        .expect("message present");
    assert_eq!(last.id(), id);

    // Non-UUID ids are rejected up front.
    let err = client
        .write_message(
            "account-1",
            &message(1),
            &WriteOptions {
                id: Some("not-a-uuid".to_owned()),
                expected_version: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn stream_cursors_and_global_position_precedence() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    // Interleave two streams so stream and global positions diverge.
    for n in 0..3 {
        client
            .write_message("account-1", &message(n), &WriteOptions::default())
            .await
            .unwrap();
        client
            .write_message("other-1", &message(n), &WriteOptions::default())
            .await
            .unwrap();
    }

    let tail = client
        .get_stream(
            "account-1",
            &GetStreamOptions {
                position: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        tail.iter().map(|r| r.position()).collect::<Vec<_>>(),
        vec![1, 2]
    );

    // globalPosition wins over position when both are supplied.
    let by_gp = client
        .get_stream(
            "account-1",
            &GetStreamOptions {
                position: Some(0),
                global_position: Some(4),
                batch_size: None,
            },
        )
        .await
        .unwrap();
    assert!(by_gp.iter().all(|r| r.global_position() >= 4));
    assert_eq!(by_gp.len(), 1);
}

#[tokio::test]
async fn system_methods_answer_without_auth() {
    let server = TestServer::start().await;
    let client = server.anonymous_client();
    assert_eq!(client.health().await.unwrap().status, "ok");
    assert!(!client.server_version().await.unwrap().is_empty());
}
