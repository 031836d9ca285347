#![cfg(feature = "client")]

use chrono::NaiveDate;
use sales_report_builder::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Accepts one connection, answers it with `status` and `body`, and hands back the raw request.
async fn serve_once(status: &str, body: &[u8]) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(&response).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (format!("http://{}", addr), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn criteria() -> FilterCriteria {
    FilterCriteria::new(
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
    )
    .with_division("CEM")
}

fn client(base_url: &str, session: Arc<dyn SessionStore>) -> ReportClient {
    let config = ClientConfig::new(base_url).with_timeout(Duration::from_secs(2));
    ReportClient::new(config, session).unwrap()
}

fn endpoint() -> ReportEndpoint {
    ReportEndpoint::new("location-wise-dispatch")
}

#[tokio::test]
async fn test_fetch_report_with_array_body() {
    let (base, server) = serve_once(
        "200 OK",
        br#"[{"region":"North","location":"A","qty":"4"},{"region":"North","location":"B","qty":6}]"#,
    )
    .await;
    let session = Arc::new(MemorySessionStore::with_token("tok-123"));

    let rows = client(&base, session)
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let request = server.await.unwrap();
    let lowered = request.to_lowercase();
    assert!(request.starts_with("POST /sales/location-wise-dispatch/get-report-data "));
    assert!(lowered.contains("authorization: bearer tok-123"));
    assert!(lowered.contains("content-type: application/json"));
    assert!(request.contains(r#""dateFrom":"2024-03-01""#));
    assert!(request.contains(r#""division":"CEM""#));
    assert!(request.contains(r#""loginHlevel":"H12""#));
}

#[tokio::test]
async fn test_fetch_report_with_wrapped_body_and_div_key() {
    let (base, server) = serve_once(
        "200 OK",
        br#"{"status":"ok","data":[{"category":"Cement","descr":"OPC 53"}]}"#,
    )
    .await;

    let rows = client(&base, Arc::new(MemorySessionStore::new()))
        .fetch_report(
            &ReportEndpoint::new("sales-statement").with_division_key(DivisionKey::Div),
            &criteria(),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["descr"], "OPC 53");

    let request = server.await.unwrap();
    assert!(request.contains(r#""div":"CEM""#));
    assert!(!request.to_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn test_unauthorized_clears_session() {
    let (base, server) = serve_once("401 Unauthorized", br#"{"message":"invalid token"}"#).await;
    let session = Arc::new(MemorySessionStore::with_token("stale"));

    let err = client(&base, session.clone())
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(session.token(), None);
    server.await.unwrap();
}

#[tokio::test]
async fn test_session_expired_body_clears_session() {
    let (base, server) =
        serve_once("200 OK", br#"{"message":"Session expired. Please login again"}"#).await;
    let session = Arc::new(MemorySessionStore::with_token("old"));

    let err = client(&base, session.clone())
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(session.token(), None);
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_network_failure() {
    let (base, server) = serve_once("500 Internal Server Error", b"database unavailable").await;

    let err = client(&base, Arc::new(MemorySessionStore::new()))
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::ServerError { status: 500, .. }));
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    server.await.unwrap();
}

#[tokio::test]
async fn test_timeout_is_distinct_from_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let config = ClientConfig::new(&base).with_timeout(Duration::from_secs(1));
    let err = ReportClient::new(config, Arc::new(MemorySessionStore::new()))
        .unwrap()
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, ReportError::Timeout(d) if d == Duration::from_secs(1)));
    server.abort();
}

#[tokio::test]
async fn test_connection_refused_is_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base, Arc::new(MemorySessionStore::new()))
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
}

#[tokio::test]
async fn test_invalid_criteria_fail_before_any_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let bad = FilterCriteria {
        date_from: "2024-03-31".to_string(),
        date_to: "2024-03-01".to_string(),
        ..FilterCriteria::default()
    };
    let err = client(&base, Arc::new(MemorySessionStore::new()))
        .fetch_report(&endpoint(), &bad)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "no connection should have been made");
}

#[tokio::test]
async fn test_malformed_body_fails_fast_by_default() {
    let (base, server) = serve_once("200 OK", br#"{data: [{"region": "North", qty: 1},]}"#).await;

    let err = client(&base, Arc::new(MemorySessionStore::new()))
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_body_repaired_when_enabled() {
    let (base, server) = serve_once("200 OK", br#"{data: [{"region": "North", qty: 1},]}"#).await;

    let config = ClientConfig::new(&base).with_repair(true);
    let rows = ReportClient::new(config, Arc::new(MemorySessionStore::new()))
        .unwrap()
        .fetch_report(&endpoint(), &criteria())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["qty"], 1);
    server.await.unwrap();
}

#[tokio::test]
async fn test_fetch_lookup() {
    let (base, server) = serve_once(
        "200 OK",
        br#"[{"code":"SG1","name":"North Trade"},{"code":"SG2","name":"South Trade"}]"#,
    )
    .await;

    let entries = client(&base, Arc::new(MemorySessionStore::new()))
        .fetch_lookup(MetaLookup::SalesGroups, &criteria())
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /sales/report-meta/get-sales-groups "));
}

#[tokio::test]
async fn test_export_bytes_and_streamed_download() {
    let blob: &[u8] = b"%PDF-1.7 fake report body";

    let (base, server) = serve_once("200 OK", blob).await;
    let bytes = client(&base, Arc::new(MemorySessionStore::new()))
        .export(&endpoint(), &criteria(), ExportFormat::Pdf)
        .await
        .unwrap();
    assert_eq!(bytes, blob);
    assert!(server
        .await
        .unwrap()
        .starts_with("POST /sales/location-wise-dispatch/generate-pdf "));

    let dir = tempfile::tempdir().unwrap();
    let (base, server) = serve_once("200 OK", blob).await;
    let config = ClientConfig::new(&base).with_download_dir(dir.path());
    let filename = export_filename("location-wise-dispatch", ExportFormat::Pdf, "2024-03-01", "2024-03-31");
    let path = ReportClient::new(config, Arc::new(MemorySessionStore::new()))
        .unwrap()
        .export_to(&endpoint(), &criteria(), ExportFormat::Pdf, &filename)
        .await
        .unwrap();

    assert_eq!(path, dir.path().join(&filename));
    assert_eq!(std::fs::read(&path).unwrap(), blob);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn test_failed_export_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let (base, server) = serve_once("500 Internal Server Error", b"render failed").await;
    let config = ClientConfig::new(&base).with_download_dir(dir.path());

    let err = ReportClient::new(config, Arc::new(MemorySessionStore::new()))
        .unwrap()
        .export_to(&endpoint(), &criteria(), ExportFormat::Excel, "report.xlsx")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    server.await.unwrap();
}
