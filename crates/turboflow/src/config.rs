//! Configuration for the workflow service client

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use turboflow_core::retry::{RetryPolicy, RetryPolicyBuilder, RetryPolicyConfig};
use turboflow_protocol::default_do_not_retry;

use crate::error::{ClientError, Result};

/// Default service address.
pub const DEFAULT_TARGET: &str = "127.0.0.1:7233";

/// Default namespace.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Configuration for the workflow service client.
///
/// Every field has a default, so a TOML file only needs the values it changes:
///
/// ```rust
/// # use turboflow::ServiceClientConfig;
/// let config = ServiceClientConfig::from_toml_str(
///     r#"
///     target = "orchestrator.internal:7233"
///     rpc_timeout_ms = 5000
///
///     [rpc_retry]
///     maximum_attempts = 8
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.namespace, "default");
/// assert_eq!(config.rpc_retry.maximum_attempts, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceClientConfig {
    /// Address of the orchestration service.
    pub target: String,

    /// Namespace every request is issued in.
    pub namespace: String,

    /// Identity reported to the service.
    pub identity: String,

    /// Per-attempt timeout for regular RPCs.
    #[serde(rename = "rpc_timeout_ms", with = "duration_ms")]
    pub rpc_timeout: Duration,

    /// Per-attempt timeout for long-poll RPCs.
    ///
    /// Must exceed the service's own long-poll expiration, otherwise empty
    /// polls surface as deadline errors.
    #[serde(rename = "long_poll_timeout_ms", with = "duration_ms")]
    pub long_poll_timeout: Duration,

    /// Retry policy applied to every RPC.
    ///
    /// The protocol's default do-not-retry codes are always added.
    pub rpc_retry: RetryPolicyConfig,
}

impl Default for ServiceClientConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            identity: format!("{}@turboflow", std::process::id()),
            rpc_timeout: Duration::from_secs(10),
            long_poll_timeout: Duration::from_secs(70),
            rpc_retry: RetryPolicyConfig::default(),
        }
    }
}

impl ServiceClientConfig {
    /// Create a configuration for `target` with default settings.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the identity reported to the service.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Set the per-attempt timeout for regular RPCs.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Set the per-attempt timeout for long-poll RPCs.
    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Set the RPC retry policy.
    pub fn with_rpc_retry(mut self, retry: impl Into<RetryPolicyConfig>) -> Self {
        self.rpc_retry = retry.into();
        self
    }

    /// Load configuration from environment variables.
    ///
    /// This will look for:
    /// - `TURBOFLOW_TARGET` for the service address
    /// - `TURBOFLOW_NAMESPACE` for the namespace
    /// - `TURBOFLOW_IDENTITY` for the client identity
    /// - `TURBOFLOW_RPC_TIMEOUT_MS` for the per-attempt timeout (must be a valid u64)
    /// - `TURBOFLOW_RPC_MAX_ATTEMPTS` for the attempt limit (must be a valid u32)
    /// - `TURBOFLOW_RPC_EXPIRATION_MS` for the total retry time (must be a valid u64)
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but cannot be parsed, or
    /// if the resulting configuration is invalid.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        use std::env;

        let mut config = Self::default();

        if let Ok(target) = env::var("TURBOFLOW_TARGET") {
            config.target = target;
        }
        if let Ok(namespace) = env::var("TURBOFLOW_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Ok(identity) = env::var("TURBOFLOW_IDENTITY") {
            config.identity = identity;
        }
        if let Some(ms) = parse_env::<u64>("TURBOFLOW_RPC_TIMEOUT_MS")? {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_env::<u32>("TURBOFLOW_RPC_MAX_ATTEMPTS")? {
            config.rpc_retry.maximum_attempts = attempts;
        }
        if let Some(ms) = parse_env::<u64>("TURBOFLOW_RPC_EXPIRATION_MS")? {
            config.rpc_retry.expiration_ms = Some(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the text is not valid TOML for this
    /// structure or the resulting configuration is invalid.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ClientError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks the configuration for values the client cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for empty addresses, zero timeouts, and
    /// [`ClientError::RetryPolicy`] for an invalid retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(ClientError::Config("target must not be empty".into()));
        }
        if self.namespace.trim().is_empty() {
            return Err(ClientError::Config("namespace must not be empty".into()));
        }
        if self.rpc_timeout.is_zero() {
            return Err(ClientError::Config("rpc timeout must be greater than zero".into()));
        }
        if self.long_poll_timeout.is_zero() {
            return Err(ClientError::Config(
                "long poll timeout must be greater than zero".into(),
            ));
        }
        self.retry_policy()?;
        Ok(())
    }

    /// The validated RPC retry policy, including the default do-not-retry codes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RetryPolicy`] if the configured policy is invalid.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let configured = RetryPolicy::try_from(self.rpc_retry.clone())?;
        let policy = RetryPolicyBuilder::from(configured)
            .do_not_retry_all(default_do_not_retry())
            .build()?;
        Ok(policy)
    }
}

#[cfg(feature = "env")]
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            ClientError::Config(format!("{name} must be a valid number, got: '{value}'"))
        }),
        Err(_) => Ok(None),
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
