//! Client configuration.
//!
//! # Example Configuration File
//!
//! ```toml
//! base_url = "https://studies.example.org"
//! api_prefix = "/v1"
//! reconnect_delay_ms = 3000
//! poll_interval_ms = 3000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Settings shared by the REST client, the push channel, and the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST origin.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Versioned prefix prepended to every endpoint path.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Push channel endpoint. Derived from `base_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Fixed delay before reconnecting a dropped push channel.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Period of the status polling fallback.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Refresh the access token when it expires within this window.
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,

    /// Namespace for persisted preferences.
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_api_prefix() -> String {
    "/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_reconnect_delay() -> u64 {
    3_000
}

fn default_poll_interval() -> u64 {
    3_000
}

fn default_refresh_threshold() -> u64 {
    60
}

fn default_storage_prefix() -> String {
    "studyhub".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            ws_url: None,
            request_timeout_ms: default_request_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            poll_interval_ms: default_poll_interval(),
            refresh_threshold_secs: default_refresh_threshold(),
            storage_prefix: default_storage_prefix(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `base_url`, defaults elsewhere.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Loads configuration from `STUDYHUB_*` environment variables.
    ///
    /// Unset or unparsable numeric variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("STUDYHUB_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = lookup("STUDYHUB_API_PREFIX") {
            config.api_prefix = v;
        }
        if let Some(v) = lookup("STUDYHUB_WS_URL") {
            config.ws_url = Some(v);
        }
        let number = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        if let Some(ms) = number("STUDYHUB_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = number("STUDYHUB_RECONNECT_DELAY_MS") {
            config.reconnect_delay_ms = ms;
        }
        if let Some(ms) = number("STUDYHUB_POLL_INTERVAL_MS") {
            config.poll_interval_ms = ms;
        }
        config
    }

    /// Checks that the URLs parse.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.base_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "base_url is not a base URL: {}",
                self.base_url
            )));
        }
        if let Some(ws) = &self.ws_url {
            Url::parse(ws)?;
        }
        Ok(())
    }

    /// Full URL for an endpoint path under the API prefix.
    ///
    /// ```
    /// use studyhub::ClientConfig;
    ///
    /// let config = ClientConfig::new("https://host.example/app/");
    /// assert_eq!(
    ///     config.api_url("/studies/s1").unwrap().as_str(),
    ///     "https://host.example/app/v1/studies/s1"
    /// );
    /// ```
    pub fn api_url(&self, path: &str) -> Result<Url> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let mut url = Url::parse(&self.base_url)?;
        let joined = format!(
            "{}/{}/{}",
            url.path().trim_end_matches('/'),
            self.api_prefix.trim_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined.replace("//", "/"));
        url.set_query(query);
        Ok(url)
    }

    /// Push channel endpoint.
    ///
    /// ```
    /// use studyhub::ClientConfig;
    ///
    /// let config = ClientConfig::new("https://host.example");
    /// assert_eq!(config.ws_endpoint().unwrap().as_str(), "wss://host.example/v1/ws");
    /// ```
    pub fn ws_endpoint(&self) -> Result<Url> {
        if let Some(ws) = &self.ws_url {
            return Ok(Url::parse(ws)?);
        }
        let mut url = self.api_url("ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::configuration(format!("cannot derive ws URL from {}", self.base_url)))?;
        Ok(url)
    }

    /// Request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Push channel reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Polling fallback period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Token refresh window.
    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }
}
