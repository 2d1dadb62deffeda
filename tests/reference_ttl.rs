//! Coverage of reference objects (§4.10): creation from a stream entry,
//! bulk retrieval, and TTL inspection/renewal, delegated entirely to Redis.

use atom::{Element, ElementConfig, SerializationMethod, Transport};
use test_utils::TestRedis;

fn config_for(redis: &TestRedis, name: &str) -> ElementConfig {
    let endpoint = redis.connection_string().trim_start_matches("redis://").to_string();
    ElementConfig::new(name).with_transport(Transport::Tcp, endpoint)
}

#[tokio::test]
async fn create_reference_from_newest_entry_and_fetch_it_back() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let publisher = Element::new(config_for(&redis, "camera")).await.unwrap();

    publisher
        .entry_write("frames", &[("width", b"640"), ("height", b"480")], SerializationMethod::None, None)
        .await
        .unwrap();

    let mut conn = redis::Client::open(redis.connection_string())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();

    let refs = atom::reference::create_reference_from_stream(&mut conn, "camera", "frames", None, Some(5_000))
        .await
        .unwrap();
    assert_eq!(refs.len(), 2);

    let width_key = refs.get("width").unwrap();
    let height_key = refs.get("height").unwrap();

    let values = atom::reference::get_reference(&mut conn, &[width_key.as_str(), height_key.as_str()])
        .await
        .unwrap();
    assert_eq!(values[0], Some(b"640".to_vec()));
    assert_eq!(values[1], Some(b"480".to_vec()));

    let ttl = atom::reference::get_reference_timeout(&mut conn, width_key).await.unwrap();
    assert!(ttl > 0 && ttl <= 5_000);

    let renewed = atom::reference::update_reference_timeout(&mut conn, width_key, 60_000).await.unwrap();
    assert!(renewed);
    let ttl_after = atom::reference::get_reference_timeout(&mut conn, width_key).await.unwrap();
    assert!(ttl_after > 5_000);

    publisher.teardown().await.unwrap();
}

#[tokio::test]
async fn create_reference_from_an_explicit_id_excludes_the_reserved_ser_key() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let publisher = Element::new(config_for(&redis, "sensor")).await.unwrap();

    let id = publisher
        .entry_write("samples", &[("value", b"42")], SerializationMethod::None, None)
        .await
        .unwrap();

    let mut conn = redis::Client::open(redis.connection_string())
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();

    // Both the explicit-id and newest-entry branches read through
    // `Entry::from_wire`, so neither should leak the framework-internal
    // `ser` tag into the returned reference key map.
    let refs = atom::reference::create_reference_from_stream(&mut conn, "sensor", "samples", Some(&id), None)
        .await
        .unwrap();
    assert_eq!(refs.len(), 1);
    assert!(refs.contains_key("value"));
    assert!(!refs.contains_key("ser"));

    publisher.teardown().await.unwrap();
}
