//! Login, proactive token refresh, and forced logout against a mock backend.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;
use studyhub::channel::memory::{MemoryListener, MemoryTransport};
use studyhub::state::MemoryPreferenceStore;
use studyhub::{ChannelState, ClientConfig, Error, SessionEvent, StudyHub};

fn jwt(expires_in_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = json!({ "sub": "1", "exp": now + expires_in_secs });
    format!(
        "eyJhbGciOiJIUzI1NiJ9.{}.signature",
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

fn hub(server: &mockito::ServerGuard) -> (StudyHub, MemoryListener) {
    let (transport, listener) = MemoryTransport::pair();
    let hub = StudyHub::new(ClientConfig::new(server.url()), Arc::new(transport)).unwrap();
    (hub, listener)
}

async fn login(server: &mut mockito::ServerGuard, hub: &StudyHub, access: &str, refresh: &str) {
    let mock = server
        .mock("POST", "/v1/login")
        .match_body(mockito::Matcher::Json(
            json!({ "username": "admin", "password": "secret" }),
        ))
        .with_status(200)
        .with_body(
            json!({ "user": 1, "access_token": access, "refresh_token": refresh }).to_string(),
        )
        .create_async()
        .await;
    hub.login("admin", "secret").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn login_opens_the_channel_with_the_access_token() {
    let mut server = mockito::Server::new_async().await;
    let (hub, mut listener) = hub(&server);
    let access = jwt(3600);
    login(&mut server, &hub, &access, &jwt(86_400)).await;

    assert!(hub.session().is_authenticated());
    assert_eq!(hub.session().user(), Some(1));
    let conn = listener.accept().await.unwrap();
    assert_eq!(conn.token(), Some(access.as_str()));
}

#[tokio::test]
async fn rejected_login_is_an_authentication_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/login")
        .with_status(401)
        .with_body("bad credentials")
        .create_async()
        .await;
    let (hub, _listener) = hub(&server);

    let err = hub.login("admin", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    assert!(!hub.session().is_authenticated());
    assert_eq!(hub.channel().state(), ChannelState::Closed);
}

#[tokio::test]
async fn expiring_token_is_refreshed_before_the_request() {
    let mut server = mockito::Server::new_async().await;
    let (hub, _listener) = hub(&server);
    let refresh = jwt(86_400);
    login(&mut server, &hub, &jwt(10), &refresh).await;

    let fresh = jwt(3600);
    let refresh_mock = server
        .mock("POST", "/v1/refresh")
        .match_header("authorization", format!("Bearer {refresh}").as_str())
        .with_status(200)
        .with_body(
            json!({ "user": 1, "access_token": fresh, "refresh_token": refresh }).to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let study_mock = server
        .mock("GET", "/v1/studies/s1")
        .match_header("authorization", format!("Bearer {fresh}").as_str())
        .with_status(200)
        .with_body(r#"{"id":"s1","name":"Base case"}"#)
        .expect(2)
        .create_async()
        .await;

    let mut events = hub.session().subscribe();
    let api = hub.api().clone();
    let (first, second) = tokio::join!(api.get_study("s1"), api.get_study("s1"));
    assert_eq!(first.unwrap().id, "s1");
    assert_eq!(second.unwrap().id, "s1");

    refresh_mock.assert_async().await;
    study_mock.assert_async().await;
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
    assert_eq!(
        hub.session().tokens().unwrap().access_token,
        fresh
    );
}

#[tokio::test]
async fn failed_refresh_logs_out_and_closes_the_channel() {
    let mut server = mockito::Server::new_async().await;
    let (hub, mut listener) = hub(&server);
    login(&mut server, &hub, &jwt(10), &jwt(86_400)).await;
    let _conn = listener.accept().await.unwrap();
    let _sub = hub.channel().subscribe(["TASK/t1"]);

    let _mock = server
        .mock("POST", "/v1/refresh")
        .with_status(401)
        .with_body("refresh token revoked")
        .create_async()
        .await;
    let untouched = server
        .mock("GET", "/v1/studies/s1")
        .expect(0)
        .create_async()
        .await;

    let mut events = hub.session().subscribe();
    let err = hub.api().get_study("s1").await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));

    assert!(!hub.session().is_authenticated());
    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
    assert_eq!(hub.channel().state(), ChannelState::Closed);
    assert!(hub.channel().subscribed_keys().is_empty());
    untouched.assert_async().await;
}

#[tokio::test]
async fn unauthorized_response_refreshes_and_retries_once() {
    let mut server = mockito::Server::new_async().await;
    let (hub, _listener) = hub(&server);
    let revoked = jwt(3600);
    let refresh = jwt(86_400);
    login(&mut server, &hub, &revoked, &refresh).await;

    let fresh = jwt(7200);
    let rejected_mock = server
        .mock("GET", "/v1/studies/s1")
        .match_header("authorization", format!("Bearer {revoked}").as_str())
        .with_status(401)
        .with_body("token revoked")
        .expect(1)
        .create_async()
        .await;
    let refresh_mock = server
        .mock("POST", "/v1/refresh")
        .match_header("authorization", format!("Bearer {refresh}").as_str())
        .with_status(200)
        .with_body(
            json!({ "user": 1, "access_token": fresh, "refresh_token": refresh }).to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let accepted_mock = server
        .mock("GET", "/v1/studies/s1")
        .match_header("authorization", format!("Bearer {fresh}").as_str())
        .with_status(200)
        .with_body(r#"{"id":"s1","name":"Base case"}"#)
        .expect(1)
        .create_async()
        .await;

    let study = hub.api().get_study("s1").await.unwrap();
    assert_eq!(study.id, "s1");
    rejected_mock.assert_async().await;
    refresh_mock.assert_async().await;
    accepted_mock.assert_async().await;
    assert_eq!(hub.session().tokens().unwrap().access_token, fresh);
}

#[tokio::test]
async fn unauthorized_response_with_failed_refresh_logs_out() {
    let mut server = mockito::Server::new_async().await;
    let (hub, mut listener) = hub(&server);
    let revoked = jwt(3600);
    login(&mut server, &hub, &revoked, &jwt(86_400)).await;
    let _conn = listener.accept().await.unwrap();

    let _mock = server
        .mock("GET", "/v1/studies/s1")
        .with_status(401)
        .with_body("token revoked")
        .create_async()
        .await;
    let refresh_mock = server
        .mock("POST", "/v1/refresh")
        .with_status(401)
        .with_body("refresh token revoked")
        .expect(1)
        .create_async()
        .await;

    let err = hub.api().get_study("s1").await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    refresh_mock.assert_async().await;
    assert!(!hub.session().is_authenticated());
    assert_eq!(hub.channel().state(), ChannelState::Closed);
}

#[tokio::test]
async fn stored_session_is_restored() {
    let mut server = mockito::Server::new_async().await;
    let store = Arc::new(MemoryPreferenceStore::new());
    let access = jwt(3600);
    {
        let (transport, _listener) = MemoryTransport::pair();
        let hub = StudyHub::with_store(
            ClientConfig::new(server.url()),
            Arc::new(transport),
            store.clone(),
        )
        .unwrap();
        login(&mut server, &hub, &access, &jwt(86_400)).await;
        hub.channel().close(true);
    }

    let (transport, mut listener) = MemoryTransport::pair();
    let hub = StudyHub::with_store(
        ClientConfig::new(server.url()),
        Arc::new(transport),
        store.clone(),
    )
    .unwrap();
    assert!(hub.restore());
    assert_eq!(hub.session().tokens().unwrap().access_token, access);
    let conn = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conn.token(), Some(access.as_str()));

    hub.logout();
    assert!(store.keys().is_empty());
}
