//! Blueprint catalog tests against a one-shot HTTP stub

use edge_replay_core::prelude::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a single response and return the stub's URL
async fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 4096];
        let _ = socket.read(&mut request).await.unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}/events", addr)
}

#[tokio::test]
async fn test_blueprint_lists_distinct_sorted_tables() {
    let url = serve_once(
        "200 OK",
        r#"[{"EventName":"impression"},{"EventName":"click"},{"EventName":"impression"}]"#,
    )
    .await;

    let catalog = BlueprintCatalog::new(&url, Duration::from_secs(5)).unwrap();
    assert_eq!(catalog.tables().await.unwrap(), vec!["click", "impression"]);
}

#[tokio::test]
async fn test_blueprint_error_status_is_catalog_error() {
    let url = serve_once("503 Service Unavailable", "maintenance").await;

    let catalog = BlueprintCatalog::new(&url, Duration::from_secs(5)).unwrap();
    let err = catalog.tables().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Catalog);
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_blueprint_malformed_payload() {
    let url = serve_once("200 OK", r#"{"events":[]}"#).await;

    let catalog = BlueprintCatalog::new(&url, Duration::from_secs(5)).unwrap();
    let err = catalog.tables().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Catalog);
}
