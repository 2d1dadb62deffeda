//! End-to-end coverage of the request/ACK/response command protocol (§4.7)
//! against a real, disposable Redis container.

use atom::{AtomError, CommandDescriptor, Element, ElementConfig, SendCommandOptions, Transport};
use test_utils::TestRedis;

fn config_for(redis: &TestRedis, name: &str) -> ElementConfig {
    let endpoint = redis.connection_string().trim_start_matches("redis://").to_string();
    ElementConfig::new(name).with_transport(Transport::Tcp, endpoint)
}

#[tokio::test]
async fn echo_command_round_trips_through_ack_and_response() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;

    let server = Element::new(config_for(&redis, "echoer")).await.unwrap();
    server.add_command(CommandDescriptor::raw("echo", 1000, |data| Ok(data.to_vec())));
    let loop_task = tokio::spawn(async move { server.run_command_loop(0).await });

    // give the loop a moment to start blocking on XREAD
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let caller = Element::new(config_for(&redis, "caller")).await.unwrap();
    let response = caller
        .send_command("echoer", "echo", b"hello", SendCommandOptions::default())
        .await
        .unwrap();

    assert!(response.is_ok());
    assert_eq!(response.data, b"hello");

    loop_task.abort();
    let _ = loop_task.await;
    caller.teardown().await.unwrap();
}

#[tokio::test]
async fn unsupported_command_reports_framework_error_not_a_hang() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;

    let server = Element::new(config_for(&redis, "limited")).await.unwrap();
    let loop_task = tokio::spawn(async move { server.run_command_loop(1).await });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let caller = Element::new(config_for(&redis, "caller2")).await.unwrap();
    let response = caller
        .send_command("limited", "does_not_exist", b"", SendCommandOptions::default())
        .await
        .unwrap();

    assert!(!response.is_ok());
    assert_eq!(
        response.err_code,
        AtomError::UnsupportedCommand {
            element: "limited".to_string(),
            cmd: "does_not_exist".to_string()
        }
        .wire_code()
    );

    loop_task.await.unwrap().unwrap();
    caller.teardown().await.unwrap();
}

#[tokio::test]
async fn send_command_to_an_absent_element_times_out_on_ack() {
    test_utils::init_test_tracing();
    let redis = TestRedis::new().await;
    let caller = Element::new(config_for(&redis, "lonely_caller")).await.unwrap();

    let result = caller
        .send_command("nobody_home", "ping", b"", SendCommandOptions::default())
        .await;

    assert!(matches!(result, Err(AtomError::NoAck { .. })));
    caller.teardown().await.unwrap();
}
