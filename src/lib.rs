//! # studyhub
//!
//! Async client for study management servers: the REST API, the push
//! channel, and the reconciliation logic that keeps job, task, and variant
//! command lists consistent while events arrive from both.
//!
//! ## Overview
//!
//! - [`client`] talks to the REST API and injects bearer tokens, refreshing
//!   them shortly before they expire.
//! - [`channel`] keeps one long-lived push connection, multiplexes named
//!   channels over it with reference-counted subscriptions, and reconnects
//!   after a fixed delay.
//! - [`reconcile`] merges fetched lists, push events, and poll results into
//!   one list per feature with a single record per id and forward-only
//!   status transitions. A fixed-period poll covers missed push events.
//! - [`state`] holds UI state containers and persisted preferences.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use studyhub::{ClientConfig, StudyHub};
//! use studyhub::reconcile::JobTracker;
//!
//! #[tokio::main]
//! async fn main() -> studyhub::Result<()> {
//!     studyhub::logging::init_from_env();
//!     let hub = StudyHub::with_websocket(ClientConfig::from_env())?;
//!     hub.login("admin", "secret").await?;
//!
//!     let mut jobs = JobTracker::new("study-1");
//!     jobs.load_result(hub.api().list_jobs("study-1").await)?;
//!     let _sub = hub.channel().subscribe(["STUDY_GENERATION/study-1"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): `tracing-subscriber` initialisation helpers
//! - `http-client` (default): the `reqwest` REST client, session, and hub
//! - `websocket` (default): the `tokio-tungstenite` push transport

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod reconcile;
pub mod state;
pub mod types;

#[cfg(feature = "http-client")]
pub mod hub;
#[cfg(feature = "http-client")]
pub mod session;

pub use channel::{ChannelState, ChannelTransport, ListenerGuard, PushChannel, Subscription};
pub use client::{AuthMiddleware, BearerToken, CredentialSource, TokenPair};
pub use config::ClientConfig;
pub use error::{Error, Result, TransportError};
pub use reconcile::{
    compute_active_index, merge, CommandTracker, JobTracker, Placement, PollHandle, StatusPoller,
    StatusSource, TaskNotifications,
};
pub use state::{UiAction, UiState};
pub use types::{
    ChannelEvent, ChannelKey, CommandRecord, CommandResult, ControlFrame, JobRecord, JobStatus,
    TaskEventPayload,
};

#[cfg(feature = "http-client")]
pub use client::{RemoteClient, StudyApi};
#[cfg(feature = "http-client")]
pub use hub::{StudyHub, TaskFollow};
#[cfg(feature = "http-client")]
pub use session::{Session, SessionEvent};
