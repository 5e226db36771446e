//! Client builder
//!
//! The `ClientBuilder` provides a fluent API for configuring a client before
//! connecting. It allows you to:
//! - Pick the transport (websocket URL, IPC socket path, or your own)
//! - Bound how long a call may wait and how many notifications are queued
//! - Retry the initial connection while a node is starting up
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use async_web3_client::{ClientBuilder, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # async fn example() -> async_web3_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .websocket("ws://localhost:8546")
//!     .request_timeout(Duration::from_secs(10))
//!     .with_connect_retry(Box::new(ExponentialBackoff::default()))
//!     .connect()
//!     .await?;
//!
//! let traced = ClientBuilder::new()
//!     .ipc("/var/run/geth.ipc")
//!     .with_default_observability()
//!     .service_name("indexer")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::retry::{ExponentialBackoff, NoRetry, RetryStrategy};
use crate::subscription::DEFAULT_SUBSCRIPTION_CAPACITY;
use crate::transport::{Transport, WebSocketTransport};
use crate::{ClientMetrics, Web3Client};
use async_web3_core::{Error, ObservabilityConfig, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Resolved client settings
#[derive(Clone)]
pub struct ClientConfig {
    /// Upper bound on waiting for one response; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
    /// Notifications queued per subscription before the oldest are dropped
    pub subscription_capacity: usize,
    /// Retry policy for the attempts inside one `connect()` call
    pub connect_retry: Arc<dyn RetryStrategy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            connect_retry: Arc::new(NoRetry),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("request_timeout", &self.request_timeout)
            .field("subscription_capacity", &self.subscription_capacity)
            .finish_non_exhaustive()
    }
}

enum Endpoint {
    WebSocket(String),
    #[cfg(unix)]
    Ipc(std::path::PathBuf),
    Custom(Arc<dyn Transport>),
}

/// Builder for configuring and creating a `Web3Client`
pub struct ClientBuilder {
    endpoint: Option<Endpoint>,
    config: ClientConfig,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            config: ClientConfig::default(),
            observability_config: None,
            service_name: None,
        }
    }

    /// Connect over a websocket (`ws://` or `wss://`)
    pub fn websocket(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(Endpoint::WebSocket(url.into()));
        self
    }

    /// Connect over the node's IPC socket
    #[cfg(unix)]
    pub fn ipc(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.endpoint = Some(Endpoint::Ipc(path.into()));
        self
    }

    /// Use a caller-provided transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.endpoint = Some(Endpoint::Custom(transport));
        self
    }

    /// Fail calls with `Error::Timeout` after `timeout`
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Queue capacity per subscription
    pub fn subscription_capacity(mut self, capacity: usize) -> Self {
        self.config.subscription_capacity = capacity;
        self
    }

    /// Retry failed connection attempts with the given strategy
    pub fn with_connect_retry(mut self, strategy: Box<dyn RetryStrategy>) -> Self {
        self.config.connect_retry = Arc::from(strategy);
        self
    }

    /// Retry failed connection attempts with default exponential backoff
    pub fn with_default_connect_retry(mut self) -> Self {
        self.config.connect_retry = Arc::new(ExponentialBackoff::default());
        self
    }

    /// Make a single connection attempt (default)
    pub fn without_connect_retry(mut self) -> Self {
        self.config.connect_retry = Arc::new(NoRetry);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Current settings
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create the client without connecting
    pub fn build(self) -> Result<Web3Client> {
        let transport: Arc<dyn Transport> = match self.endpoint {
            Some(Endpoint::WebSocket(url)) => {
                if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                    return Err(Error::Config(format!(
                        "websocket URL must start with ws:// or wss://, got {}",
                        url
                    )));
                }
                Arc::new(WebSocketTransport::new(url))
            }
            #[cfg(unix)]
            Some(Endpoint::Ipc(path)) => Arc::new(crate::transport::IpcTransport::new(path)),
            Some(Endpoint::Custom(transport)) => transport,
            None => return Err(Error::Config("no endpoint configured".to_string())),
        };

        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }
                if let Err(e) = async_web3_core::init_observability(config.clone()) {
                    tracing::warn!(error = %e, "Observability already initialised or unavailable");
                }
                Some(Arc::new(ClientMetrics::new(config.service_name)))
            }
            None => None,
        };

        Ok(Web3Client::new(transport, self.config, metrics))
    }

    /// Create the client and connect it
    pub async fn connect(self) -> Result<Web3Client> {
        let client = self.build()?;
        client.connect().await?;
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
