//! Coverage of the entry engine (§4.6): write, read-n, and read-since
//! ordering against a real Redis container.

use atom::entry::ReadLoopHandler;
use atom::{Element, ElementConfig, SerializationMethod, Transport};
use std::sync::{Arc, Mutex};
use test_utils::TestRedis;

fn config_for(redis: &TestRedis, name: &str) -> ElementConfig {
    let endpoint = redis.connection_string().trim_start_matches("redis://").to_string();
    ElementConfig::new(name).with_transport(Transport::Tcp, endpoint)
}

#[tokio::test]
async fn entry_read_n_returns_newest_first() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let publisher = Element::new(config_for(&redis, "waveform")).await.unwrap();

    for i in 0..3u32 {
        let value = i.to_string();
        publisher
            .entry_write("samples", &[("value", value.as_bytes())], SerializationMethod::None, None)
            .await
            .unwrap();
    }

    let entries = publisher.entry_read_n("waveform", "samples", 3, None).await.unwrap();
    assert_eq!(entries.len(), 3);
    let values: Vec<String> = entries
        .iter()
        .map(|e| String::from_utf8(e.field("value").unwrap().to_vec()).unwrap())
        .collect();
    assert_eq!(values, vec!["2".to_string(), "1".to_string(), "0".to_string()]);

    assert_eq!(publisher.published_streams().await, vec!["samples".to_string()]);
    publisher.teardown().await.unwrap();
}

#[tokio::test]
async fn entry_read_since_advances_the_cursor_in_order() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let publisher = Element::new(config_for(&redis, "ticker")).await.unwrap();

    publisher
        .entry_write("ticks", &[("n", b"1")], SerializationMethod::None, None)
        .await
        .unwrap();
    publisher
        .entry_write("ticks", &[("n", b"2")], SerializationMethod::None, None)
        .await
        .unwrap();

    let (entries, last_id) = publisher
        .entry_read_since("ticker", "ticks", 10, "0", 100, None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].field("n"), Some(b"1".as_slice()));
    assert_eq!(entries[1].field("n"), Some(b"2".as_slice()));

    let (more, advanced_id) = publisher
        .entry_read_since("ticker", "ticks", 10, &last_id, 100, None)
        .await
        .unwrap();
    assert!(more.is_empty());
    assert_eq!(advanced_id, last_id);

    publisher.teardown().await.unwrap();
}

#[tokio::test]
async fn msgpack_entries_round_trip_through_the_wire() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let publisher = Element::new(config_for(&redis, "packer")).await.unwrap();

    publisher
        .entry_write("packed", &[("payload", b"raw-bytes")], SerializationMethod::MsgPack, None)
        .await
        .unwrap();

    let entries = publisher.entry_read_n("packer", "packed", 1, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].method, SerializationMethod::MsgPack);

    let raw = entries[0].field("payload").unwrap();
    let decoded = SerializationMethod::MsgPack.decode_dynamic(raw).unwrap();
    let rmpv::Value::Binary(bytes) = decoded else {
        panic!("expected a msgpack binary value");
    };
    assert_eq!(bytes, b"raw-bytes");

    publisher.teardown().await.unwrap();
}

#[tokio::test]
async fn entry_read_loop_dispatches_each_entry_to_its_handler() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let publisher = Element::new(config_for(&redis, "gauge")).await.unwrap();
    let subscriber = Element::new(config_for(&redis, "watcher")).await.unwrap();

    publisher
        .entry_write("readings", &[("n", b"1")], SerializationMethod::None, None)
        .await
        .unwrap();
    publisher
        .entry_write("readings", &[("n", b"2")], SerializationMethod::None, None)
        .await
        .unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_for_handler = seen.clone();
    let mut handlers = vec![ReadLoopHandler {
        element: "gauge".to_string(),
        stream: "readings".to_string(),
        handler: Box::new(move |entry| {
            let value = String::from_utf8(entry.field("n").unwrap().to_vec()).unwrap();
            seen_for_handler.lock().unwrap().push(value);
            Ok(())
        }),
    }];

    // "$" as the initial cursor only catches entries written after the loop
    // starts blocking, so write the second batch from another task while the
    // loop is already waiting on it.
    let publisher_for_task = Arc::new(publisher);
    let publisher_clone = publisher_for_task.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        publisher_clone
            .entry_write("readings", &[("n", b"3")], SerializationMethod::None, None)
            .await
            .unwrap();
    });

    subscriber.entry_read_loop(&mut handlers, 1, 2000).await.unwrap();
    writer.await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["3".to_string()]);

    subscriber.teardown().await.unwrap();
    publisher_for_task.teardown().await.unwrap();
}

#[tokio::test]
async fn entry_read_loop_does_not_starve_a_second_handler_while_blocking_indefinitely() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let slow = Element::new(config_for(&redis, "slow_source")).await.unwrap();
    let fast = Element::new(config_for(&redis, "fast_source")).await.unwrap();
    let subscriber = Element::new(config_for(&redis, "dual_watcher")).await.unwrap();

    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_slow = seen.clone();
    let seen_fast = seen.clone();
    let mut handlers = vec![
        ReadLoopHandler {
            element: "slow_source".to_string(),
            stream: "ticks".to_string(),
            handler: Box::new(move |entry| {
                let value = String::from_utf8(entry.field("n").unwrap().to_vec()).unwrap();
                seen_slow.lock().unwrap().push(("slow".to_string(), value));
                Ok(())
            }),
        },
        ReadLoopHandler {
            element: "fast_source".to_string(),
            stream: "ticks".to_string(),
            handler: Box::new(move |entry| {
                let value = String::from_utf8(entry.field("n").unwrap().to_vec()).unwrap();
                seen_fast.lock().unwrap().push(("fast".to_string(), value));
                Ok(())
            }),
        },
    ];

    // `slow_source` never writes during this test. With a single-stream
    // XREAD issued per handler (rather than one combined XREAD across both),
    // the first handler's indefinite block (`block_ms == 0`) would never
    // return, and `fast_source`'s entry would never be observed.
    let fast_for_task = Arc::new(fast);
    let fast_clone = fast_for_task.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        fast_clone
            .entry_write("ticks", &[("n", b"1")], SerializationMethod::None, None)
            .await
            .unwrap();
    });

    subscriber.entry_read_loop(&mut handlers, 1, 0).await.unwrap();
    writer.await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("fast".to_string(), "1".to_string())]);

    subscriber.teardown().await.unwrap();
    slow.teardown().await.unwrap();
    fast_for_task.teardown().await.unwrap();
}
