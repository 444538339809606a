//! Tests that request bodies match the Measurement Protocol format byte for byte.
//!
//! The expected strings are what GA4's `/mp/collect` accepts for the same
//! events, with keys in the order the protocol documents.

use ga4_bridge::{Envelope, Event, MeasurementPayload, UserProperties};

const TIMESTAMP: i64 = 1650223688019;

fn body(envelope: Envelope, properties: &UserProperties) -> String {
    serde_json::to_string(&MeasurementPayload::from_envelope("cid", envelope, properties)).unwrap()
}

#[test]
fn test_single_event_body() {
    assert_eq!(
        body(Envelope::at(Event::new("eventname"), TIMESTAMP), &UserProperties::new()),
        r#"{"client_id":"cid","events":[{"name":"eventname"}],"timestamp_micros":1650223688019000}"#
    );
}

#[test]
fn test_event_with_params_body() {
    let event = Event::new("eventname")
        .param("param1", "value1")
        .param("param2", "value2");

    assert_eq!(
        body(Envelope::at(event, TIMESTAMP), &UserProperties::new()),
        r#"{"client_id":"cid","events":[{"name":"eventname","params":{"param1":"value1","param2":"value2"}}],"timestamp_micros":1650223688019000}"#
    );
}

#[test]
fn test_multiple_events_with_mixed_params_body() {
    let events = vec![
        Event::new("eventname")
            .param("param1", "value1")
            .param("param2", "value2"),
        Event::new("eventname2"),
    ];

    assert_eq!(
        body(Envelope::at(events, TIMESTAMP), &UserProperties::new()),
        r#"{"client_id":"cid","events":[{"name":"eventname","params":{"param1":"value1","param2":"value2"}},{"name":"eventname2"}],"timestamp_micros":1650223688019000}"#
    );
}

#[test]
fn test_user_properties_body() {
    let properties = UserProperties::from([
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "x".to_string()),
    ]);

    assert_eq!(
        body(Envelope::at("eventname", 123456), &properties),
        r#"{"client_id":"cid","events":[{"name":"eventname"}],"timestamp_micros":123456000,"user_properties":{"a":{"value":"1"},"b":{"value":"x"}}}"#
    );
}

#[test]
fn test_numeric_params_keep_their_type() {
    let event = Event::new("level_up").param("level", 3).param("score", 12.5);

    assert_eq!(
        body(Envelope::at(event, 1), &UserProperties::new()),
        r#"{"client_id":"cid","events":[{"name":"level_up","params":{"level":3,"score":12.5}}],"timestamp_micros":1000}"#
    );
}
