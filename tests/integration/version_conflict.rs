//! Optimistic concurrency: `expectedVersion` semantics end to end.

use evento_protocol::{MessageInput, WriteOptions};
use evento_test_utils::TestServer;
use serde_json::json;

fn message() -> MessageInput {
    MessageInput {
        message_type: "E".to_owned(),
        data: json!({}),
        metadata: None,
    }
}

fn expecting(version: i64) -> WriteOptions {
    WriteOptions {
        id: None,
        expected_version: Some(version),
    }
}

#[tokio::test]
async fn stale_expectation_conflicts_then_correct_one_succeeds() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    for _ in 0..2 {
        client
            .write_message("account-1", &message(), &WriteOptions::default())
            .await
            .unwrap();
    }

    let err = client
        .write_message("account-1", &message(), &expecting(5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STREAM_VERSION_CONFLICT");
    assert!(err.is_version_conflict());

    let ok = client
        .write_message("account-1", &message(), &expecting(1))
        .await
        .unwrap();
    assert_eq!(ok.position, 2);
}

#[tokio::test]
async fn conflicts_consume_no_positions() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    let first = client
        .write_message("s-1", &message(), &WriteOptions::default())
        .await
        .unwrap();
    for _ in 0..3 {
        client
            .write_message("s-1", &message(), &expecting(9))
            .await
            .unwrap_err();
    }
    let second = client
        .write_message("s-1", &message(), &WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(second.position, first.position + 1);
    assert_eq!(second.global_position, first.global_position + 1);
}

#[tokio::test]
async fn minus_one_means_the_stream_must_not_exist() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    let created = client
        .write_message("fresh-1", &message(), &expecting(-1))
        .await
        .unwrap();
    assert_eq!(created.position, 0);

    let err = client
        .write_message("fresh-1", &message(), &expecting(-1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STREAM_VERSION_CONFLICT");

    // Below -1 is not a version at all.
    let err = client
        .write_message("fresh-1", &message(), &expecting(-2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn concurrent_writers_with_expectations_serialize_cleanly() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    client
        .write_message("counter-1", &message(), &WriteOptions::default())
        .await
        .unwrap();

    // Ten tasks race to append at version 0; exactly one wins.
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .write_message("counter-1", &message(), &expecting(0))
                .await
        }));
    }
    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(result) => {
                assert_eq!(result.position, 1);
                wins += 1;
            }
            Err(e) => {
                assert_eq!(e.code(), "STREAM_VERSION_CONFLICT");
                conflicts += 1;
            }
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 9);
    assert_eq!(client.stream_version("counter-1").await.unwrap(), Some(1));
}
