use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use stratum_core::{AccessGrant, EncryptionKey};
use stratum_edge::{AuthServiceClient, EdgeError, RegisterAccessOptions};

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn grant() -> AccessGrant {
    AccessGrant::issue("127.0.0.1:7777", b"edge-secret", EncryptionKey::from_bytes([3; 32]))
        .unwrap()
}

#[tokio::test]
async fn register_sends_grant_and_decodes_credentials() {
    if !can_bind_localhost() {
        eprintln!("skipping: cannot bind localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let grant = grant();
    let serialized = grant.serialize().unwrap();

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/access")
                .json_body(json!({ "access_grant": serialized, "public": true }));
            then.status(200).json_body(json!({
                "access_key_id": "AKIDEXAMPLE",
                "secret_key": "wJalrXUtnFEMI",
                "endpoint": "https://gateway.example.test"
            }));
        })
        .await;

    let client = AuthServiceClient::new(&server.base_url()).unwrap();
    let credentials = client
        .register(&grant, RegisterAccessOptions { public: true })
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(credentials.access_key_id, "AKIDEXAMPLE");
    assert_eq!(credentials.secret_key, "wJalrXUtnFEMI");
    assert_eq!(credentials.endpoint, "https://gateway.example.test");
}

#[tokio::test]
async fn register_reports_rejection_without_retrying() {
    if !can_bind_localhost() {
        eprintln!("skipping: cannot bind localhost");
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/access");
            then.status(503).body("maintenance");
        })
        .await;

    let client = AuthServiceClient::new(&server.base_url()).unwrap();
    let err = client
        .register(&grant(), RegisterAccessOptions::default())
        .await
        .unwrap_err();

    mock.assert_hits_async(1).await;
    match err {
        EdgeError::Rejected { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn register_rejects_incomplete_response() {
    if !can_bind_localhost() {
        eprintln!("skipping: cannot bind localhost");
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/access");
            then.status(200).json_body(json!({
                "access_key_id": "AKIDEXAMPLE",
                "secret_key": "",
                "endpoint": "https://gateway.example.test"
            }));
        })
        .await;

    let client = AuthServiceClient::new(&server.base_url()).unwrap();
    let err = client
        .register(&grant(), RegisterAccessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EdgeError::InvalidResponse(_)), "{err}");
}

#[tokio::test]
async fn register_rejects_non_json_response() {
    if !can_bind_localhost() {
        eprintln!("skipping: cannot bind localhost");
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/access");
            then.status(200).body("<html>hello</html>");
        })
        .await;

    let client = AuthServiceClient::new(&server.base_url()).unwrap();
    let err = client
        .register(&grant(), RegisterAccessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EdgeError::InvalidResponse(_)), "{err}");
}

#[tokio::test]
async fn register_against_unreachable_endpoint_is_transport_error() {
    // Port 1 is reserved and refuses connections.
    let client = AuthServiceClient::new("http://127.0.0.1:1").unwrap();
    let err = client
        .register(&grant(), RegisterAccessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EdgeError::Transport(_)), "{err}");
}
