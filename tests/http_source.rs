use std::net::SocketAddr;
use std::time::Duration;

use etl_monitor::adapters::HttpStatusClient;
use etl_monitor::core::StatusSource;
use etl_monitor::error::FetchError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a single canned HTTP response and return the address plus the
/// request line that was received.
async fn serve_once(status: &str, body: &str) -> (SocketAddr, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = socket.read(&mut buf).await.unwrap();
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf[..n])
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    });

    (addr, handle)
}

fn client(addr: SocketAddr) -> HttpStatusClient {
    HttpStatusClient::new(&format!("http://{}/api/etl", addr), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_fetches_status_payload() {
    let (addr, server) = serve_once("200 OK", r#"{"jobId":"7","status":"RUNNING","steps":[]}"#).await;

    let payload = client(addr).fetch_status("7").await.unwrap();

    assert_eq!(payload["status"], "RUNNING");
    assert_eq!(server.await.unwrap(), "GET /api/etl/status/7 HTTP/1.1");
}

#[tokio::test]
async fn test_job_id_is_percent_encoded_in_request() {
    let (addr, server) = serve_once("200 OK", r#"{"status":"RUNNING"}"#).await;

    client(addr).fetch_status("batch/7?x#y").await.unwrap();

    assert_eq!(
        server.await.unwrap(),
        "GET /api/etl/status/batch%2F7%3Fx%23y HTTP/1.1"
    );
}

#[tokio::test]
async fn test_non_success_status_is_fetch_error() {
    let (addr, _server) = serve_once("500 Internal Server Error", "{}").await;

    match client(addr).fetch_status("7").await {
        Err(FetchError::Status { status, job_id }) => {
            assert_eq!(status, 500);
            assert_eq!(job_id, "7");
        }
        other => panic!("expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_fetch_error() {
    let (addr, _server) = serve_once("200 OK", "<html>oops</html>").await;

    assert!(matches!(
        client(addr).fetch_status("7").await,
        Err(FetchError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_non_object_json_is_fetch_error() {
    let (addr, _server) = serve_once("200 OK", "[1,2,3]").await;

    assert!(matches!(
        client(addr).fetch_status("7").await,
        Err(FetchError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_backend_is_fetch_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert!(matches!(
        client(addr).fetch_status("7").await,
        Err(FetchError::Request { .. })
    ));
}
