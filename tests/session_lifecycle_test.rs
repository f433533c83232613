
use regex::Regex;
use rstest::*;
use telegram_gateway::{GatewayError, SessionBlob};
use test_utils::TestGateway;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_session_round_trip_is_byte_identical() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let exported = gateway.login().await;

    let transported = SessionBlob::from_base64(&exported.to_base64()).expect("decode");
    let handle = gateway
        .state
        .factory
        .create_client_from_blob(&transported)
        .await
        .expect("import");
    let reexported = handle.export_session().await.expect("re-export");

    assert_eq!(reexported.as_bytes(), exported.as_bytes());
}

#[tokio::test]
async fn test_handle_owns_its_session_file() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let session = gateway.login().await;

    let handle = gateway
        .state
        .factory
        .create_client_from_blob(&session)
        .await
        .expect("import");
    let path = handle.session_path().to_path_buf();
    assert!(path.exists());
    assert_eq!(gateway.session_files(), 1);

    let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
    let pattern = Regex::new(r"^session_\d+_[0-9a-f]{32}\.json$").expect("valid regex");
    assert!(pattern.is_match(name), "unexpected session file name {}", name);

    drop(handle);
    assert!(!path.exists());
    assert_eq!(gateway.session_files(), 0);
}

#[tokio::test]
async fn test_fresh_client_has_no_session() {
    let gateway = TestGateway::new().await;
    let handle = gateway.state.factory.create_client().await.expect("create");
    assert!(matches!(
        handle.export_session().await,
        Err(GatewayError::SessionUnavailable)
    ));
}

#[rstest]
#[case::not_json(b"definitely not a session".to_vec())]
#[case::unknown_key(br#"{"dc_id":2,"auth_key":"abcd","phone":"+15550100"}"#.to_vec())]
#[tokio::test]
async fn test_unusable_session_is_invalid(#[case] data: Vec<u8>) {
    let gateway = TestGateway::new().await;
    let result = gateway
        .state
        .factory
        .create_client_from_blob(&SessionBlob::new(data))
        .await;
    assert!(matches!(result, Err(GatewayError::InvalidSession(_))));
    assert_eq!(gateway.session_files(), 0);
}

#[tokio::test]
async fn test_empty_session_is_invalid() {
    let gateway = TestGateway::new().await;
    let result = gateway
        .state
        .factory
        .create_client_from_blob(&SessionBlob::new(Vec::new()))
        .await;
    assert!(matches!(result, Err(GatewayError::InvalidSession(_))));
}

#[tokio::test]
async fn test_concurrent_imports_use_distinct_files() {
    let gateway = TestGateway::new().await;
    gateway.add_default_account().await;
    let session = gateway.login().await;

    let factory = &gateway.state.factory;
    let (a, b) = tokio::join!(
        factory.create_client_from_blob(&session),
        factory.create_client_from_blob(&session)
    );
    let (a, b) = (a.expect("first import"), b.expect("second import"));
    assert_ne!(a.session_path(), b.session_path());
    assert_ok!(a.dialogs(5).await);
    assert_ok!(b.dialogs(5).await);
    assert_eq!(gateway.session_files(), 2);
}
