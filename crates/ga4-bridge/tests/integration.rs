//! Integration tests for the GA4 bridge.

use ga4_bridge::{
    codec, Envelope, Event, KeyValueStore, MemoryQueue, MemoryStore, MessageKind, Producer,
    ReceivedFile, Relay, RelayConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn ga4_server() -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mp/collect"))
        .and(query_param("measurement_id", "mid"))
        .and(query_param("api_secret", "secret"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    mock_server
}

fn relay_with_client_id(queue: Arc<MemoryQueue>) -> Relay {
    let storage = Arc::new(MemoryStore::new());
    storage.set("ga4_client_id", "cid").unwrap();
    Relay::new(queue, storage).unwrap()
}

/// Poll until the server has seen `count` requests or a second has passed.
async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    server.received_requests().await.unwrap_or_default()
}

fn bodies(requests: &[Request]) -> Vec<Value> {
    let mut bodies: Vec<Value> = requests
        .iter()
        .map(|r| r.body_json::<Value>().unwrap())
        .collect();
    bodies.sort_by_key(|b| b["timestamp_micros"].as_i64());
    bodies
}

fn envelope_file(envelope: &Envelope) -> ReceivedFile {
    ReceivedFile::new(MessageKind::Event.file_name(), codec::encode(envelope).unwrap())
}

#[tokio::test]
async fn test_send_posts_single_event() {
    let mock_server = ga4_server().await;
    let relay = relay_with_client_id(Arc::new(MemoryQueue::new()));
    assert!(relay.configure(RelayConfig::builder("mid", "secret").api_host(mock_server.uri())));

    let before = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    relay.send(Event::new("eventname")).unwrap().await.unwrap();

    let requests = wait_for_requests(&mock_server, 1).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url.query(),
        Some("measurement_id=mid&api_secret=secret")
    );

    let body = requests[0].body_json::<Value>().unwrap();
    assert_eq!(body["client_id"], "cid");
    assert_eq!(body["events"], json!([{"name": "eventname"}]));
    let micros = body["timestamp_micros"].as_i64().unwrap();
    assert_eq!(micros % 1000, 0);
    assert!(micros / 1000 >= before);
    assert!(body.get("user_properties").is_none());
}

#[tokio::test]
async fn test_configure_drains_queued_envelopes() {
    let mock_server = ga4_server().await;
    let queue = Arc::new(MemoryQueue::new());
    queue.push(envelope_file(&Envelope::at(Event::new("eventname123456"), 123456)));
    queue.push(envelope_file(&Envelope::at(Event::new("eventname1234567"), 1234567)));

    let relay = relay_with_client_id(queue.clone());
    relay.configure(RelayConfig::builder("mid", "secret").api_host(mock_server.uri()));

    let requests = wait_for_requests(&mock_server, 2).await;
    assert_eq!(
        bodies(&requests),
        vec![
            json!({"client_id": "cid", "events": [{"name": "eventname123456"}], "timestamp_micros": 123456000i64}),
            json!({"client_id": "cid", "events": [{"name": "eventname1234567"}], "timestamp_micros": 1234567000i64}),
        ]
    );
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_new_files_processed_after_configure() {
    let mock_server = ga4_server().await;
    let queue = Arc::new(MemoryQueue::new());
    let relay = relay_with_client_id(queue.clone());
    relay.configure(RelayConfig::builder("mid", "secret").api_host(mock_server.uri()));

    queue.push(envelope_file(&Envelope::at(Event::new("late"), 42)));

    let requests = wait_for_requests(&mock_server, 1).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(bodies(&requests)[0]["events"][0]["name"], "late");
}

#[tokio::test]
async fn test_user_properties_included_and_cleared() {
    let mock_server = ga4_server().await;
    let relay = relay_with_client_id(Arc::new(MemoryQueue::new()));
    relay.configure(
        RelayConfig::builder("mid", "secret")
            .auto_file_transfer_processing(false)
            .api_host(mock_server.uri()),
    );

    let props = ReceivedFile::new(
        MessageKind::SetUserProperties.file_name(),
        codec::encode(&json!({"a": 1, "b": "x"})).unwrap(),
    );
    assert!(relay.process_file_transfer(&props));
    assert!(relay.process_file_transfer(&envelope_file(&Envelope::at("first", 1))));

    let clear = ReceivedFile::new(MessageKind::ClearUserProperties.file_name(), vec![]);
    assert!(relay.process_file_transfer(&clear));
    assert!(relay.process_file_transfer(&envelope_file(&Envelope::at("second", 2))));

    let bodies = bodies(&wait_for_requests(&mock_server, 2).await);
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0]["user_properties"],
        json!({"a": {"value": "1"}, "b": {"value": "x"}})
    );
    assert!(bodies[1].get("user_properties").is_none());
}

#[tokio::test]
async fn test_unconfigured_relay_never_posts() {
    let mock_server = ga4_server().await;
    let queue = Arc::new(MemoryQueue::new());
    queue.push(envelope_file(&Envelope::at("eventname", 1)));

    let relay = relay_with_client_id(queue.clone());
    assert!(!relay.configure(RelayConfig::builder("mid", "").api_host(mock_server.uri())));
    assert!(relay.send("eventname").is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(queue.listener_count(), 0);
    assert_eq!(queue.len(), 1);
    assert!(mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn test_unrecognized_file_left_alone() {
    let mock_server = ga4_server().await;
    let relay = relay_with_client_id(Arc::new(MemoryQueue::new()));
    relay.configure(
        RelayConfig::builder("mid", "secret")
            .auto_file_transfer_processing(false)
            .api_host(mock_server.uri()),
    );

    let foreign = ReceivedFile::new(
        "settings.cbor",
        codec::encode(&Envelope::at("eventname", 1)).unwrap(),
    );
    assert!(!relay.process_file_transfer(&foreign));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
    assert!(relay.store().user_properties().is_empty());
}

#[tokio::test]
async fn test_producer_to_relay_loopback() {
    let mock_server = ga4_server().await;
    let mailbox = Arc::new(MemoryQueue::new());

    let relay = relay_with_client_id(mailbox.clone());
    relay.configure(
        RelayConfig::builder("mid", "secret")
            .debug(true)
            .api_host(mock_server.uri()),
    );

    let producer = Producer::new(mailbox.clone()).unwrap();
    producer
        .set_user_properties(json!({"plan": "pro"}))
        .unwrap()
        .await
        .unwrap();
    producer
        .send(vec![
            Event::new("eventname").param("param1", "value1"),
            Event::new("eventname2"),
        ])
        .unwrap()
        .await
        .unwrap();

    let requests = wait_for_requests(&mock_server, 1).await;
    assert_eq!(requests.len(), 1);

    let body = requests[0].body_json::<Value>().unwrap();
    assert_eq!(
        body["events"],
        json!([{"name": "eventname", "params": {"param1": "value1"}}, {"name": "eventname2"}])
    );
    assert_eq!(body["user_properties"], json!({"plan": {"value": "pro"}}));
    assert!(mailbox.is_empty());
}

#[tokio::test]
async fn test_old_events_sent_without_timestamp() {
    let mock_server = ga4_server().await;
    let relay = relay_with_client_id(Arc::new(MemoryQueue::new()));
    relay.configure(
        RelayConfig::builder("mid", "secret")
            .auto_file_transfer_processing(false)
            .max_event_age(Duration::from_secs(4 * 60 * 60))
            .api_host(mock_server.uri()),
    );

    relay.process_file_transfer(&envelope_file(&Envelope::at("stale", 123456)));

    let requests = wait_for_requests(&mock_server, 1).await;
    let body = requests[0].body_json::<Value>().unwrap();
    assert_eq!(body["events"][0]["name"], "stale");
    assert!(body.get("timestamp_micros").is_none());
}

#[tokio::test]
async fn test_unbounded_age_cap_keeps_timestamp() {
    let mock_server = ga4_server().await;
    let relay = relay_with_client_id(Arc::new(MemoryQueue::new()));
    relay.configure(
        RelayConfig::builder("mid", "secret")
            .auto_file_transfer_processing(false)
            .max_event_age(Duration::MAX)
            .api_host(mock_server.uri()),
    );

    relay.send("fresh").unwrap().await.unwrap();

    let requests = wait_for_requests(&mock_server, 1).await;
    let body = requests[0].body_json::<Value>().unwrap();
    assert_eq!(body["events"][0]["name"], "fresh");
    assert!(body["timestamp_micros"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_delivery_failure_reported_to_observer() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let relay = relay_with_client_id(Arc::new(MemoryQueue::new()));
    relay.configure(RelayConfig::builder("mid", "secret").api_host(mock_server.uri()));

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    relay.on_delivery(move |report| sink.lock().push(report.clone()));

    relay.send("eventname").unwrap().await.unwrap();

    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_success());
    assert_eq!(reports[0].event_count, 1);
    assert_eq!(reports[0].status, Some(500));
}
