//! Category fan-in, correlation filtering, and the frozen wire tuple shape.

use evento_protocol::{GetCategoryOptions, MessageInput, WriteOptions};
use evento_test_utils::TestServer;
use serde_json::{json, Value};

async fn write(client: &evento_client::EventoClient, stream: &str, data: Value) {
    client
        .write_message(
            stream,
            &MessageInput {
                message_type: "E".to_owned(),
                data,
                metadata: None,
            },
            &WriteOptions::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn category_read_fans_in_ordered_by_global_position() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    write(&client, "acc-1", json!({"n": 1})).await;
    write(&client, "acc-2", json!({"n": 2})).await;
    write(&client, "billing-1", json!({})).await;
    write(&client, "acc-3", json!({"n": 3})).await;

    let records = client
        .get_category("acc", &GetCategoryOptions::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.stream_name()).collect::<Vec<_>>(),
        vec!["acc-1", "acc-2", "acc-3"]
    );
    for pair in records.windows(2) {
        assert!(pair[0].global_position() < pair[1].global_position());
    }

    // Cursor: start past the first record's global position.
    let rest = client
        .get_category(
            "acc",
            &GetCategoryOptions {
                position: Some(records[0].global_position() + 1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        rest.iter().map(|r| r.stream_name()).collect::<Vec<_>>(),
        vec!["acc-2", "acc-3"]
    );
}

#[tokio::test]
async fn correlation_filter_selects_matching_workflows_only() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    client
        .write_message(
            "o-1",
            &MessageInput {
                message_type: "E".to_owned(),
                data: json!({}),
                metadata: Some(json!({"correlationStreamName": "workflow-123"})),
            },
            &WriteOptions::default(),
        )
        .await
        .unwrap();
    client
        .write_message(
            "o-2",
            &MessageInput {
                message_type: "E".to_owned(),
                data: json!({}),
                metadata: Some(json!({"correlationStreamName": "other-456"})),
            },
            &WriteOptions::default(),
        )
        .await
        .unwrap();
    write(&client, "o-3", json!({})).await;

    let records = client
        .get_category(
            "o",
            &GetCategoryOptions {
                correlation: Some("workflow".to_owned()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stream_name(), "o-1");
}

#[tokio::test]
async fn batch_size_limits_category_pages() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    for i in 0..10 {
        write(&client, &format!("page-{i}"), json!({"i": i})).await;
    }

    let mut cursor = 0;
    let mut collected = Vec::new();
    loop {
        let page = client
            .get_category(
                "page",
                &GetCategoryOptions {
                    position: Some(cursor),
                    batch_size: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 3);
        cursor = page.last().unwrap().global_position() + 1;
        collected.extend(page);
    }
    assert_eq!(collected.len(), 10);
}

#[tokio::test]
async fn category_get_rejects_stream_names() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;
    let err = client
        .get_category("acc-1", &GetCategoryOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

// The tuple ordering of record arrays is a frozen contract; assert it on the
// raw wire, not through our own deserializer.
#[tokio::test]
async fn wire_tuples_keep_their_slot_order() {
    let server = TestServer::start().await;
    let (client, token) = server.namespace("test").await;
    write(&client, "acc-9", json!({"k": "v"})).await;

    let http = reqwest::Client::new();
    let body: Value = http
        .post(format!("{}/rpc", server.base_url()))
        .bearer_auth(&token)
        .json(&json!(["category.get", "acc"]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let records = body.as_array().expect("array of records");
    assert_eq!(records.len(), 1);
    let record = records[0].as_array().expect("record tuple");
    assert_eq!(record.len(), 8);
    // [id, streamName, type, position, globalPosition, data, metadata, time]
    assert!(record[0].as_str().unwrap().len() >= 32);
    assert_eq!(record[1], "acc-9");
    assert_eq!(record[2], "E");
    assert_eq!(record[3], 0);
    assert_eq!(record[4], 0);
    assert_eq!(record[5], json!({"k": "v"}));
    assert_eq!(record[6], Value::Null);
    assert!(record[7].as_str().unwrap().contains('T'));

    let body: Value = http
        .post(format!("{}/rpc", server.base_url()))
        .bearer_auth(&token)
        .json(&json!(["stream.get", "acc-9"]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let record = body.as_array().unwrap()[0].as_array().expect("record tuple");
    // [id, type, position, globalPosition, data, metadata, time]
    assert_eq!(record.len(), 7);
    assert_eq!(record[1], "E");
    assert_eq!(record[2], 0);
}

#[tokio::test]
async fn stream_last_and_type_filters() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    for t in ["Opened", "Deposited", "Closed"] {
        client
            .write_message(
                "acct-5",
                &MessageInput {
                    message_type: t.to_owned(),
                    data: json!({}),
                    metadata: None,
                },
                &WriteOptions::default(),
            )
            .await
            .unwrap();
    }

    let last = client
        .get_last_message("acct-5", None)
        .await
        .unwrap()
        .expect("present");
    assert_eq!(last.message_type(), "Closed");

    let deposited = client
        .get_last_message("acct-5", Some("Deposited"))
        .await
        .unwrap()
        .expect("present");
    assert_eq!(deposited.position(), 1);

    assert!(client
        .get_last_message("acct-5", Some("Missing"))
        .await
        .unwrap()
        .is_none());
    assert!(client
        .get_last_message("ghost-1", None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn namespace_introspection_lists_streams_and_categories() {
    let server = TestServer::start().await;
    let (client, _token) = server.namespace("test").await;

    write(&client, "acc-1", json!({})).await;
    write(&client, "acc-2", json!({})).await;
    write(&client, "acc-2", json!({})).await;
    write(&client, "billing-1", json!({})).await;

    let streams = client
        .list_streams(&Default::default())
        .await
        .unwrap();
    assert_eq!(
        streams.iter().map(|s| s.stream.as_str()).collect::<Vec<_>>(),
        vec!["acc-1", "acc-2", "billing-1"]
    );
    assert_eq!(streams[1].version, 1);

    let categories = client.list_categories().await.unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].category, "acc");
    assert_eq!(categories[0].stream_count, 2);
    assert_eq!(categories[0].message_count, 3);
}
