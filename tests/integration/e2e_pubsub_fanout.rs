//! End-to-end: pub/sub fan-out with topic isolation.
//!
//! The proxy re-emits everything to every subscriber connection; topic
//! isolation is the work of each subscriber's own prefix filters.

use benchlink::{FullName, MessageType, Publisher, Subscriber};
use benchlink_test_utils::start_proxy;
use std::time::Duration;

#[tokio::test]
async fn fan_out_delivers_identical_copies_and_respects_topics() {
    let proxy = start_proxy().await;

    let mut sub_a = Subscriber::connect("127.0.0.1", proxy.egress.port())
        .await
        .unwrap();
    sub_a.subscribe(b"N1.p");
    let mut sub_b = Subscriber::connect("127.0.0.1", proxy.egress.port())
        .await
        .unwrap();
    sub_b.subscribe(b"N1.p");
    let mut sub_other = Subscriber::connect("127.0.0.1", proxy.egress.port())
        .await
        .unwrap();
    sub_other.subscribe(b"N1.q");

    // Let the proxy accept all three connections before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut publisher = Publisher::connect(
        "127.0.0.1",
        proxy.ingress.port(),
        FullName::new("N1", "p").unwrap(),
    )
    .await
    .unwrap();
    // Topic + header + one data frame: a three-frame message.
    publisher
        .publish_frames(MessageType::JSON, vec![br#"{"value": 7}"#.to_vec()])
        .await
        .unwrap();

    let got_a = sub_a
        .recv(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("first subscriber receives the message");
    let got_b = sub_b
        .recv(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("second subscriber receives the message");

    assert_eq!(got_a, got_b, "fan-out copies must be identical");
    assert_eq!(got_a.topic, b"N1.p".to_vec());
    assert_eq!(got_a.to_frames().len(), 3);
    assert_eq!(got_a.frames, vec![br#"{"value": 7}"#.to_vec()]);

    // The bundle reached this connection too; the subscriber's own filter
    // drops it.
    let nothing = sub_other.recv(Duration::from_millis(200)).await.unwrap();
    assert!(nothing.is_none(), "N1.q subscriber must stay silent");
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let proxy = start_proxy().await;

    let mut subscriber = Subscriber::connect("127.0.0.1", proxy.egress.port())
        .await
        .unwrap();
    subscriber.subscribe(b"N1.p");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut publisher = Publisher::connect(
        "127.0.0.1",
        proxy.ingress.port(),
        FullName::new("N1", "p").unwrap(),
    )
    .await
    .unwrap();
    publisher
        .publish_frames(MessageType::JSON, vec![b"1".to_vec()])
        .await
        .unwrap();
    assert!(subscriber
        .recv(Duration::from_secs(1))
        .await
        .unwrap()
        .is_some());

    subscriber.unsubscribe(b"N1.p");

    publisher
        .publish_frames(MessageType::JSON, vec![b"2".to_vec()])
        .await
        .unwrap();
    let nothing = subscriber.recv(Duration::from_millis(200)).await.unwrap();
    assert!(nothing.is_none(), "unsubscribed topic must stay silent");
}

#[tokio::test]
async fn log_records_ride_the_data_plane() {
    use benchlink::LogRecord;

    let proxy = start_proxy().await;

    let mut subscriber = Subscriber::connect("127.0.0.1", proxy.egress.port())
        .await
        .unwrap();
    subscriber.subscribe(b"N1.logger");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut publisher = Publisher::connect(
        "127.0.0.1",
        proxy.ingress.port(),
        FullName::new("N1", "logger").unwrap(),
    )
    .await
    .unwrap();
    let record = LogRecord::now("WARNING", "motor_x", "limit switch hit");
    publisher.publish_log(&record).await.unwrap();

    let message = subscriber
        .recv(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("log record should arrive");
    let decoded: LogRecord = serde_json::from_slice(&message.frames[0]).unwrap();
    assert_eq!(decoded, record);
}
