//! Application owner wiring the session, REST API, and push channel.
//!
//! [`StudyHub`] holds the single push channel for the life of the
//! application and hands it to features explicitly. Login connects it;
//! logout closes it cleanly.
//!
//! ```rust,ignore
//! use studyhub::{ClientConfig, StudyHub};
//!
//! let hub = StudyHub::with_websocket(ClientConfig::from_env())?;
//! hub.login("admin", "secret").await?;
//!
//! let follow = hub.follow_task(&task_id, |record| println!("{}", record.status));
//! // ... dropping `follow` unsubscribes and stops the poll
//! ```

use std::sync::Arc;

use crate::channel::{ChannelTransport, ListenerGuard, PushChannel, Subscription};
use crate::client::api::StudyApi;
use crate::client::auth::{AuthMiddleware, CredentialSource};
use crate::client::remote::RemoteClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::reconcile::poller::{PollHandle, StatusPoller};
use crate::session::Session;
use crate::state::PreferenceStore;
use crate::types::event::ChannelKey;
use crate::types::job::JobRecord;

/// Session, REST API, and push channel for one backend.
#[derive(Debug, Clone)]
pub struct StudyHub {
    config: ClientConfig,
    session: Arc<Session>,
    api: Arc<StudyApi>,
    channel: PushChannel,
}

impl StudyHub {
    /// Wires the components over `transport`.
    pub fn new(config: ClientConfig, transport: Arc<dyn ChannelTransport>) -> Result<Self> {
        Self::build(config, transport, None)
    }

    /// Like [`new`](Self::new), persisting credentials in `store`.
    pub fn with_store(
        config: ClientConfig,
        transport: Arc<dyn ChannelTransport>,
        store: Arc<dyn PreferenceStore>,
    ) -> Result<Self> {
        Self::build(config, transport, Some(store))
    }

    /// Wires the components over a WebSocket transport.
    #[cfg(feature = "websocket")]
    pub fn with_websocket(config: ClientConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(crate::channel::websocket::WebSocketTransport::new()),
        )
    }

    fn build(
        config: ClientConfig,
        transport: Arc<dyn ChannelTransport>,
        store: Option<Arc<dyn PreferenceStore>>,
    ) -> Result<Self> {
        let base = RemoteClient::new(config.clone())?;

        let mut session = Session::new(base.clone());
        if let Some(store) = store {
            session = session.with_store(store);
        }
        let session = Arc::new(session);
        let credentials: Arc<dyn CredentialSource> = session.clone();

        let auth = AuthMiddleware::new(credentials.clone())
            .with_refresh_threshold(config.refresh_threshold());
        let api = Arc::new(StudyApi::new(base.with_middleware(Arc::new(auth))));

        let channel = PushChannel::from_config(&config, transport)?;
        channel.set_credentials(credentials);
        session.attach_channel(&channel);

        Ok(Self {
            config,
            session,
            api,
            channel,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Authenticated REST endpoints.
    pub fn api(&self) -> &Arc<StudyApi> {
        &self.api
    }

    /// The shared push channel.
    pub fn channel(&self) -> &PushChannel {
        &self.channel
    }

    /// Logs in and opens the push channel.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.session.login(username, password).await?;
        self.channel.connect(None);
        Ok(())
    }

    /// Restores stored credentials and opens the push channel.
    ///
    /// Returns `true` if a session was restored.
    pub fn restore(&self) -> bool {
        let restored = self.session.restore();
        if restored {
            self.channel.connect(None);
        }
        restored
    }

    /// Logs out, closing the push channel.
    pub fn logout(&self) {
        self.session.logout();
    }

    /// Follows one task through push events and the polling fallback.
    ///
    /// `on_update` sees every status observation for `task_id`, from either
    /// source. The poll stops on the first final status. Dropping the
    /// returned value unsubscribes and stops polling.
    pub fn follow_task<F>(&self, task_id: &str, on_update: F) -> TaskFollow
    where
        F: Fn(JobRecord) + Send + Sync + 'static,
    {
        let on_update = Arc::new(on_update);

        let poll = {
            let on_update = on_update.clone();
            Arc::new(
                StatusPoller::new(self.config.poll_interval()).spawn(
                    task_id,
                    self.api.clone(),
                    move |record| on_update(record),
                ),
            )
        };

        let subscription = self.channel.subscribe([ChannelKey::task(task_id)]);
        let listener = {
            let task_id = task_id.to_string();
            let poll = poll.clone();
            self.channel.add_listener(move |event| {
                let Some(record) = event.record() else {
                    return;
                };
                if record.id != task_id {
                    return;
                }
                let is_final = record.is_final();
                on_update(record);
                if is_final {
                    poll.observe_final();
                }
            })
        };

        TaskFollow {
            poll,
            _listener: listener,
            _subscription: subscription,
        }
    }
}

/// Live view of one task. Dropping it stops following.
#[must_use = "dropping a TaskFollow stops following the task"]
#[derive(Debug)]
pub struct TaskFollow {
    poll: Arc<PollHandle>,
    _listener: ListenerGuard,
    _subscription: Subscription,
}

impl TaskFollow {
    /// The followed task.
    pub fn task_id(&self) -> &str {
        self.poll.task_id()
    }

    /// Returns `true` once polling has stopped.
    pub fn is_settled(&self) -> bool {
        self.poll.is_finished()
    }
}
