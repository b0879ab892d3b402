//! Push channel lifecycle over the in-process transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use studyhub::channel::memory::{MemoryListener, MemoryTransport, ServerEnd};
use studyhub::{BearerToken, ChannelState, CredentialSource, Error, PushChannel, Result};
use url::Url;

const DELAY: Duration = Duration::from_millis(3000);

fn channel() -> (PushChannel, MemoryListener) {
    let (transport, listener) = MemoryTransport::pair();
    let channel = PushChannel::new(
        Url::parse("ws://localhost:8080/v1/ws").unwrap(),
        Arc::new(transport),
        DELAY,
    );
    (channel, listener)
}

async fn wait_for(channel: &PushChannel, state: ChannelState) {
    for _ in 0..1000 {
        if channel.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("channel never reached {state:?}, still {:?}", channel.state());
}

async fn next_control(server: &mut ServerEnd) -> (String, String) {
    let text = server.recv().await.expect("client hung up");
    let frame: Value = serde_json::from_str(&text).unwrap();
    (
        frame["action"].as_str().unwrap().to_string(),
        frame["payload"].as_str().unwrap().to_string(),
    )
}

fn control(action: &str, key: &str) -> (String, String) {
    (action.to_string(), key.to_string())
}

#[tokio::test(start_paused = true)]
async fn queued_subscriptions_flush_on_open() {
    let (channel, mut listener) = channel();
    let _sub = channel.subscribe(["TASK/t1", "JOB_STATUS/j1"]);
    assert_eq!(channel.state(), ChannelState::Closed);

    assert!(channel.connect(Some(BearerToken::new("tok"))));
    let mut server = listener.accept().await.unwrap();
    assert_eq!(server.token(), Some("tok"));

    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "TASK/t1"));
    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "JOB_STATUS/j1"));
    assert_eq!(channel.state(), ChannelState::Open);
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let (channel, mut listener) = channel();
    assert!(channel.connect(None));
    assert!(!channel.connect(None));
    let _server = listener.accept().await.unwrap();
    wait_for(&channel, ChannelState::Open).await;
    assert!(!channel.connect(None));

    let second = tokio::time::timeout(Duration::from_secs(30), listener.accept()).await;
    assert!(second.is_err(), "a second connection was opened");
}

#[tokio::test(start_paused = true)]
async fn shared_key_is_unsubscribed_by_last_holder() {
    let (channel, mut listener) = channel();
    channel.connect(None);
    let mut server = listener.accept().await.unwrap();
    wait_for(&channel, ChannelState::Open).await;

    let job_view = channel.subscribe(["STUDY_GENERATION/v1"]);
    let commands_view = channel.subscribe(["STUDY_GENERATION/v1"]);
    assert_eq!(
        next_control(&mut server).await,
        control("SUBSCRIBE", "STUDY_GENERATION/v1")
    );

    drop(job_view);
    assert_eq!(channel.subscribed_keys().len(), 1);
    drop(commands_view);
    assert_eq!(
        next_control(&mut server).await,
        control("UNSUBSCRIBE", "STUDY_GENERATION/v1")
    );
    assert!(channel.subscribed_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn events_arrive_in_order_and_bad_frames_are_dropped() {
    let (channel, mut listener) = channel();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _guard = channel.add_listener(move |event| sink.lock().push(event.kind()));

    channel.connect(None);
    let mut server = listener.accept().await.unwrap();
    server
        .send(json!({"type": "TASK_ADDED", "payload": {"id": "t1", "message": ""}}).to_string())
        .await
        .unwrap();
    server.send("{broken").await.unwrap();
    server
        .send(json!({"type": "SOMETHING_NEW", "payload": {}}).to_string())
        .await
        .unwrap();
    server
        .send(json!({"type": "TASK_RUNNING", "payload": {"id": "t1", "message": ""}}).to_string())
        .await
        .unwrap();
    server
        .send(json!({"type": "MAINTENANCE_MODE", "payload": false}).to_string())
        .await
        .unwrap();

    for _ in 0..1000 {
        if seen.lock().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(
        *seen.lock(),
        vec!["TASK_ADDED", "TASK_RUNNING", "MAINTENANCE_MODE"]
    );
    assert_eq!(channel.state(), ChannelState::Open);
}

#[tokio::test(start_paused = true)]
async fn removed_listener_sees_nothing() {
    let (channel, mut listener) = channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let guard = channel.add_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let other = Arc::new(AtomicUsize::new(0));
    let other_counter = other.clone();
    let _other = channel.add_listener(move |_| {
        other_counter.fetch_add(1, Ordering::SeqCst);
    });
    guard.remove();

    channel.connect(None);
    let mut server = listener.accept().await.unwrap();
    server
        .send(json!({"type": "MESSAGE_INFO", "payload": "hello"}).to_string())
        .await
        .unwrap();
    for _ in 0..1000 {
        if other.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(other.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_reconnects_after_delay_and_resubscribes() {
    let (channel, mut listener) = channel();
    let _sub = channel.subscribe(["TASK/t1"]);
    channel.connect(None);
    let mut server = listener.accept().await.unwrap();
    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "TASK/t1"));

    let dropped_at = tokio::time::Instant::now();
    drop(server);
    wait_for(&channel, ChannelState::Connecting).await;

    let mut server = listener.accept().await.unwrap();
    assert!(dropped_at.elapsed() >= DELAY);
    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "TASK/t1"));
    wait_for(&channel, ChannelState::Open).await;
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_retried() {
    let (transport, mut listener) = MemoryTransport::pair();
    transport.refuse_next(2);
    let channel = PushChannel::new(
        Url::parse("ws://localhost:8080/v1/ws").unwrap(),
        Arc::new(transport),
        DELAY,
    );
    let started = tokio::time::Instant::now();
    channel.connect(None);
    let _server = listener.accept().await.unwrap();
    assert!(started.elapsed() >= DELAY * 2);
    wait_for(&channel, ChannelState::Open).await;
}

struct Credentials {
    token: Mutex<Option<BearerToken>>,
    refreshes: AtomicUsize,
    fail: bool,
}

impl Credentials {
    fn expired(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some(BearerToken {
                token: "stale".to_string(),
                expires_at: Some(UNIX_EPOCH),
            })),
            refreshes: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl CredentialSource for Credentials {
    fn current(&self) -> Option<BearerToken> {
        self.token.lock().clone()
    }

    async fn refresh(&self) -> Result<BearerToken> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            *self.token.lock() = None;
            return Err(Error::transport(401, "refresh token expired"));
        }
        let fresh = BearerToken::with_expiry("fresh", Duration::from_secs(3600));
        *self.token.lock() = Some(fresh.clone());
        Ok(fresh)
    }
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_refreshed_before_reconnect() {
    let (channel, mut listener) = channel();
    let credentials = Credentials::expired(false);
    channel.set_credentials(credentials.clone());

    channel.connect(None);
    let server = listener.accept().await.unwrap();
    assert_eq!(server.token(), Some("stale"));
    drop(server);

    let server = listener.accept().await.unwrap();
    assert_eq!(server.token(), Some("fresh"));
    assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_closes_the_channel() {
    let (channel, mut listener) = channel();
    channel.set_credentials(Credentials::expired(true));
    let _sub = channel.subscribe(["TASK/t1"]);

    channel.connect(None);
    let server = listener.accept().await.unwrap();
    drop(server);

    tokio::time::sleep(DELAY * 2).await;
    wait_for(&channel, ChannelState::Closed).await;
    assert!(channel.subscribed_keys().is_empty());
    let again = tokio::time::timeout(Duration::from_secs(30), listener.accept()).await;
    assert!(again.is_err());
}

#[tokio::test(start_paused = true)]
async fn clean_close_tears_everything_down() {
    let (channel, mut listener) = channel();
    let _sub = channel.subscribe(["TASK/t1"]);
    let _guard = channel.add_listener(|_| {});
    channel.connect(None);
    let mut server = listener.accept().await.unwrap();
    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "TASK/t1"));

    channel.close(true);
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(server.recv().await.is_none());
    assert!(channel.subscribed_keys().is_empty());
    assert_eq!(channel.listener_count(), 0);

    let again = tokio::time::timeout(Duration::from_secs(30), listener.accept()).await;
    assert!(again.is_err(), "closed channel reconnected");
}

#[tokio::test(start_paused = true)]
async fn reconnect_in_place_keeps_subscriptions() {
    let (channel, mut listener) = channel();
    let _sub = channel.subscribe(["JOB_LOGS/j1"]);
    channel.connect(Some(BearerToken::new("first")));
    let mut server = listener.accept().await.unwrap();
    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "JOB_LOGS/j1"));

    assert!(channel.reconnect(Some(BearerToken::new("second"))));
    let mut server = listener.accept().await.unwrap();
    assert_eq!(server.token(), Some("second"));
    assert_eq!(next_control(&mut server).await, control("SUBSCRIBE", "JOB_LOGS/j1"));
    assert_eq!(channel.subscribed_keys().len(), 1);
}
