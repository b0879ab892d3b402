//! Logging setup.
//!
//! The library only emits `tracing` events. With the `logging` feature,
//! applications that want them on stderr can call `init_from_env` once at
//! startup.

#[cfg(feature = "logging")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable read by `init_from_env` before `RUST_LOG`.
pub const LOG_ENV: &str = "STUDYHUB_LOG";

#[cfg(feature = "logging")]
/// Installs a `fmt` subscriber filtered by `directives` (e.g. `"studyhub=debug"`).
///
/// Returns `false` if a global subscriber is already installed.
pub fn init(directives: &str) -> bool {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(feature = "logging")]
/// Installs a `fmt` subscriber filtered by `STUDYHUB_LOG`, then `RUST_LOG`,
/// then `info`.
pub fn init_from_env() -> bool {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|_| "info".to_string());
    init(&directives)
}

/// Renders an `Authorization` value with the credential hidden.
///
/// ```
/// use studyhub::logging::redact_authorization;
///
/// assert_eq!(redact_authorization("Bearer abc.def"), "Bearer [REDACTED]");
/// assert_eq!(redact_authorization("opaque"), "[REDACTED]");
/// ```
pub fn redact_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} [REDACTED]"),
        None => "[REDACTED]".to_string(),
    }
}
