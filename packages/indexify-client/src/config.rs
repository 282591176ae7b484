use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IndexifyError, Result};
use crate::query::LabelEncoding;
use crate::transport::TlsConfig;

/// Service URL used when none is configured.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8900";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub service_url: String,
    pub namespace: String,
    pub tls: Option<TlsConfig>,

    /// Pause between completion polls
    pub poll_interval_ms: u64,

    /// Deadline for a whole `wait_for_completion` call; `None` waits forever
    pub wait_timeout_secs: Option<u64>,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    pub label_encoding: LabelEncoding,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            tls: None,
            poll_interval_ms: 1000,
            wait_timeout_secs: None,
            request_timeout_secs: 120,
            label_encoding: LabelEncoding::Strict,
        }
    }
}

impl ClientConfig {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from `INDEXIFY_*` environment variables.
    ///
    /// Unset variables keep their defaults. The TLS section is only built
    /// when both the certificate and key paths are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("INDEXIFY_URL") {
            config.service_url = url;
        }
        if let Ok(namespace) = env::var("INDEXIFY_NAMESPACE") {
            config.namespace = namespace;
        }
        if let (Ok(cert), Ok(key)) = (env::var("INDEXIFY_CERT_PATH"), env::var("INDEXIFY_KEY_PATH")) {
            let mut tls = TlsConfig::new(cert, key);
            tls.ca_path = env::var("INDEXIFY_CA_PATH").ok();
            config.tls = Some(tls);
        }
        if let Some(ms) = parse_var("INDEXIFY_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = ms;
        }
        config.wait_timeout_secs = parse_var("INDEXIFY_WAIT_TIMEOUT_SECS")?;

        Ok(config)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_label_encoding(mut self, encoding: LabelEncoding) -> Self {
        self.label_encoding = encoding;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IndexifyError::Config(format!("{name} must be a valid number, got `{raw}`"))),
        Err(_) => Ok(None),
    }
}
