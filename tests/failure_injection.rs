//! Reset injection tests for the control listener and the debug service.

use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_control_reset_false_closes_gracefully() {
    let harness = common::start_harness(common::test_config()).await;

    let ending = common::raw_request(harness.addrs.control, "GET", "/reset?do=false").await;

    assert!(!ending.is_reset(), "expected FIN, got {ending:?}");
    let text = ending.text();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.ends_with("\r\n\r\nOK"), "{text}");
}

#[tokio::test]
async fn test_control_reset_true_sends_rst_without_body() {
    let harness = common::start_harness(common::test_config()).await;

    let ending = common::raw_request(harness.addrs.control, "GET", "/reset?do=true").await;

    assert!(ending.is_reset(), "expected RST, got {ending:?}");
    assert!(ending.bytes().is_empty());
}

#[tokio::test]
async fn test_control_unrecognized_flag_is_false() {
    let harness = common::start_harness(common::test_config()).await;

    for target in ["/reset?do=maybe", "/reset", "/reset?do="] {
        let ending = common::raw_request(harness.addrs.control, "GET", target).await;
        assert!(!ending.is_reset(), "{target}: {ending:?}");
        assert!(ending.text().starts_with("HTTP/1.1 200 OK"), "{target}");
    }
}

#[tokio::test]
async fn test_control_other_routes_and_methods() {
    let harness = common::start_harness(common::test_config()).await;

    let ending = common::raw_request(harness.addrs.control, "GET", "/elsewhere").await;
    assert!(ending.text().starts_with("HTTP/1.1 404 Not Found"));

    let ending = common::raw_request(harness.addrs.control, "POST", "/reset?do=true").await;
    assert!(!ending.is_reset());
    assert!(ending.text().starts_with("HTTP/1.1 405 Method Not Allowed"));
}

#[tokio::test]
async fn test_debug_reset_delivers_response_before_rst() {
    let harness = common::start_harness(common::test_config()).await;

    let ending = common::raw_request(harness.addrs.debug, "GET", "/reset?do=true").await;

    assert!(ending.is_reset(), "expected RST, got {ending:?}");
    let text = ending.text();
    assert!(text.starts_with("HTTP/1.1 200 OK"), "{text}");
    assert!(text.to_ascii_lowercase().contains("connection: close"), "{text}");
    assert!(text.ends_with("Connection will be reset"), "{text}");
}

#[tokio::test]
async fn test_debug_reset_response_is_readable_by_http_client() {
    let harness = common::start_harness(common::test_config()).await;
    let client = common::fresh_client();

    let res = client
        .get(harness.debug_url("/reset?do=true"))
        .send()
        .await
        .expect("response should arrive before the reset");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Connection will be reset");
}

#[tokio::test]
async fn test_debug_reset_false_keeps_connection_alive() {
    let harness = common::start_harness(common::test_config()).await;

    let mut stream = TcpStream::connect(harness.addrs.debug).await.unwrap();
    let head = format!("GET /reset?do=false HTTP/1.1\r\nHost: {}\r\n\r\n", harness.addrs.debug);

    // Two requests on the same connection: the first must not have closed it.
    for _ in 0..2 {
        stream.write_all(head.as_bytes()).await.unwrap();
        let response = common::read_one_response(&mut stream).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.contains("Reset not performed"), "{response}");
    }
}

#[tokio::test]
async fn test_debug_reset_is_scoped_to_one_connection() {
    let harness = common::start_harness(common::test_config()).await;
    let addr = harness.addrs.debug;

    let mut bystander = TcpStream::connect(addr).await.unwrap();
    let healthz = format!("GET /healthz HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    bystander.write_all(healthz.as_bytes()).await.unwrap();
    assert!(common::read_one_response(&mut bystander).await.starts_with("HTTP/1.1 200 OK"));

    let ending = common::raw_request(addr, "GET", "/reset?do=true").await;
    assert!(ending.is_reset());

    bystander.write_all(healthz.as_bytes()).await.unwrap();
    assert!(common::read_one_response(&mut bystander).await.starts_with("HTTP/1.1 200 OK"));
}
