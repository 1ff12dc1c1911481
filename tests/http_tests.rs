use axum::{routing::get, Router};
use reachscan::http::fetch_root;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const CERT_PEM: &[u8] = include_bytes!("fixtures/selfsigned.pem");
const KEY_PEM: &[u8] = include_bytes!("fixtures/selfsigned.key");

async fn spawn_fixture() -> u16 {
    let app = Router::new().route(
        "/",
        get(|| async { ([("x-fixture", "yes")], "hello from fixture") }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

#[tokio::test]
async fn dumps_status_headers_and_body() {
    let port = spawn_fixture().await;
    let dump = fetch_root("127.0.0.1", port, false, Duration::from_secs(5))
        .await
        .expect("fetch ok");

    assert_eq!(dump.status, 200);
    assert_eq!(dump.reason, "OK");
    assert_eq!(dump.header("x-fixture"), Some("yes"));
    assert_eq!(dump.body, "hello from fixture");
    assert!(dump.certificate.is_none());
    assert!(dump.to_string().contains("Body:\nhello from fixture"));
}

#[tokio::test]
async fn silent_server_times_out() {
    // Accepts at the kernel level but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let err = fetch_root("127.0.0.1", port, false, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"));
    drop(listener);
}

#[tokio::test]
async fn closed_port_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = fetch_root("127.0.0.1", port, false, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("failed to connect"));
}

/// One-shot TLS server with the self-signed fixture identity.
async fn spawn_tls_fixture() -> u16 {
    let identity = native_tls::Identity::from_pkcs8(CERT_PEM, KEY_PEM).unwrap();
    let acceptor = tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut tls = acceptor.accept(tcp).await.unwrap();
        let mut req = Vec::new();
        let mut buf = [0u8; 1024];
        while !req.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = tls.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            req.extend_from_slice(&buf[..n]);
        }
        tls.write_all(b"HTTP/1.0 200 OK\r\nServer: tls-fixture\r\n\r\nsecure hello")
            .await
            .unwrap();
        let _ = tls.shutdown().await;
    });
    port
}

#[tokio::test]
async fn tls_dump_carries_certificate_summary() {
    let port = spawn_tls_fixture().await;
    let dump = fetch_root("127.0.0.1", port, true, Duration::from_secs(5))
        .await
        .expect("tls fetch ok");

    assert_eq!(dump.status, 200);
    assert_eq!(dump.header("server"), Some("tls-fixture"));
    assert_eq!(dump.body, "secure hello");
    let cert = dump.certificate.expect("peer certificate");
    assert_eq!(cert.subject, "CN=reachscan-test");
    assert_eq!(cert.issuer, "CN=reachscan-test");
    assert_eq!(cert.not_after, "2126-09-24T04:57:30Z");
}
