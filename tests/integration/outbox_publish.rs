//! Outbox staging and background publication against a live server.

use evento_client::{outbox, ClientDb, OutboxWorker, StagedEvent};
use evento_protocol::{GetStreamOptions, WriteOptions};
use evento_test_utils::TestServer;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn staged(stream: &str, n: i64, key: Option<&str>) -> StagedEvent {
    StagedEvent {
        namespace: "test".to_owned(),
        stream: stream.to_owned(),
        message_type: "Queued".to_owned(),
        data: json!({"n": n}),
        metadata: None,
        write_options: WriteOptions::default(),
        idempotency_key: key.map(str::to_owned),
    }
}

#[tokio::test]
async fn repeated_staging_with_one_idempotency_key_yields_one_row() {
    let db = ClientDb::open_in_memory().unwrap();

    let first = db.stage(&staged("orders-1", 1, Some("order-42"))).unwrap();
    let second = db.stage(&staged("orders-1", 1, Some("order-42"))).unwrap();

    assert_eq!(first, second, "both calls return the original row id");
    assert_eq!(db.unsent_count().unwrap(), 1);
}

#[tokio::test]
async fn drain_publishes_in_staged_order_and_marks_sent() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;
    let db = Mutex::new(ClientDb::open_in_memory().unwrap());

    for n in 0..3 {
        db.lock().await.stage(&staged("orders-1", n, None)).unwrap();
    }
    db.lock().await.stage(&staged("billing-1", 9, None)).unwrap();

    let published = outbox::drain_once(&client, &db).await.unwrap();
    assert_eq!(published, 4);
    assert_eq!(db.lock().await.unsent_count().unwrap(), 0);

    let records = client
        .get_stream("orders-1", &GetStreamOptions::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    // Staged order became stream order.
    for (n, record) in records.iter().enumerate() {
        assert_eq!(record.data(), &json!({"n": n as i64}));
        assert_eq!(record.message_type(), "Queued");
    }

    // Draining again publishes nothing new.
    assert_eq!(outbox::drain_once(&client, &db).await.unwrap(), 0);
    assert_eq!(
        client
            .get_stream("orders-1", &GetStreamOptions::default())
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn failed_publish_leaves_rows_for_the_next_tick() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;
    let db = Mutex::new(ClientDb::open_in_memory().unwrap());

    db.lock().await.stage(&staged("orders-1", 0, None)).unwrap();
    db.lock().await.stage(&staged("orders-1", 1, None)).unwrap();

    // An unauthenticated client cannot publish; rows must stay unsent.
    let broken = server.anonymous_client();
    assert_eq!(outbox::drain_once(&broken, &db).await.unwrap(), 0);
    assert_eq!(db.lock().await.unsent_count().unwrap(), 2);

    // Recovery: the real client drains the backlog in order.
    assert_eq!(outbox::drain_once(&client, &db).await.unwrap(), 2);
    let records = client
        .get_stream("orders-1", &GetStreamOptions::default())
        .await
        .unwrap();
    assert_eq!(records[0].data(), &json!({"n": 0}));
    assert_eq!(records[1].data(), &json!({"n": 1}));
}

#[tokio::test]
async fn staged_write_options_are_honored() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;
    let db = Mutex::new(ClientDb::open_in_memory().unwrap());

    let mut event = staged("ledger-1", 0, None);
    event.write_options = WriteOptions {
        id: None,
        expected_version: Some(-1),
    };
    db.lock().await.stage(&event).unwrap();
    assert_eq!(outbox::drain_once(&client, &db).await.unwrap(), 1);

    // The same expectation now conflicts, and the conflicting row blocks
    // (publication halts at the first failure to preserve stream order).
    let mut event = staged("ledger-1", 1, None);
    event.write_options = WriteOptions {
        id: None,
        expected_version: Some(-1),
    };
    db.lock().await.stage(&event).unwrap();
    db.lock().await.stage(&staged("ledger-1", 2, None)).unwrap();

    assert_eq!(outbox::drain_once(&client, &db).await.unwrap(), 0);
    assert_eq!(db.lock().await.unsent_count().unwrap(), 2);
}

#[tokio::test]
async fn background_worker_drains_on_its_interval() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;
    let db = Arc::new(Mutex::new(ClientDb::open_in_memory().unwrap()));

    for n in 0..3 {
        db.lock().await.stage(&staged("jobs-1", n, None)).unwrap();
    }

    let worker = OutboxWorker::spawn(client.clone(), db.clone(), Duration::from_millis(50));

    // Wait for the backlog to drain.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if db.lock().await.unsent_count().unwrap() == 0 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "worker did not drain in time"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    worker.stop();

    let records = client
        .get_stream("jobs-1", &GetStreamOptions::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
}
