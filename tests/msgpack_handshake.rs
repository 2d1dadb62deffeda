//! Coverage of the built-in `version`/`command_list` handshake (§4.9) and
//! its msgpack-encoded response, plus `wait_for_elements_healthy` (§4.9).

use atom::{Element, ElementConfig, SendCommandOptions, SerializationMethod, Transport};
use test_utils::TestRedis;

fn config_for(redis: &TestRedis, name: &str) -> ElementConfig {
    let endpoint = redis.connection_string().trim_start_matches("redis://").to_string();
    ElementConfig::new(name).with_transport(Transport::Tcp, endpoint)
}

#[tokio::test]
async fn version_handshake_returns_msgpack_language_and_version() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;

    let server = Element::new(config_for(&redis, "versioned")).await.unwrap();
    let loop_task = tokio::spawn(async move { server.run_command_loop(1).await });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let caller = Element::new(config_for(&redis, "version_caller")).await.unwrap();
    let response = caller
        .send_command("versioned", "version", b"", SendCommandOptions::default())
        .await
        .unwrap();

    assert!(response.is_ok());
    assert_eq!(response.method, SerializationMethod::MsgPack);

    let decoded = response.method.decode_dynamic(&response.data).unwrap();
    let rmpv::Value::Map(entries) = decoded else {
        panic!("expected a msgpack map");
    };
    let language = entries
        .iter()
        .find(|(k, _)| k.as_str() == Some("language"))
        .map(|(_, v)| v.as_str().unwrap().to_string());
    assert_eq!(language, Some("rust".to_string()));

    loop_task.await.unwrap().unwrap();
    caller.teardown().await.unwrap();
}

#[tokio::test]
async fn wait_for_elements_healthy_unblocks_once_the_target_answers() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;

    let server = Element::new(config_for(&redis, "healthy_thing")).await.unwrap();
    let loop_task = tokio::spawn(async move { server.run_command_loop(1).await });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let caller = Element::new(config_for(&redis, "health_waiter")).await.unwrap();
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        caller.wait_for_elements_healthy(&["healthy_thing"], 50),
    )
    .await;

    assert!(result.is_ok(), "wait_for_elements_healthy should not hang once the target responds");
    assert!(result.unwrap().is_ok());

    loop_task.await.unwrap().unwrap();
    caller.teardown().await.unwrap();
}
