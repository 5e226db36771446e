//! The `Web3Client` handle
//!
//! # Client Lifecycle
//!
//! 1. **Connect**: open the transport and start a session
//! 2. **Use**: `invoke`/`request` calls and `subscribe` streams, from any
//!    number of tasks at once
//! 3. **Close**: `close()`, or the node goes away; either way every pending
//!    call fails and every subscription ends
//!
//! A session is one connected period. Each session has its own request ids
//! (starting at 1) and its own subscriptions; nothing carries over when
//! `connect()` is called again.
//!
//! # Cloning
//!
//! `Web3Client` is cheap to clone. All clones share the same transport and
//! session.

use crate::client_builder::{ClientBuilder, ClientConfig};
use crate::connection_state::{ConnectionManager, ConnectionState};
use crate::dispatcher::Dispatcher;
use crate::methods::{SubscriptionKind, WEB3_CLIENT_VERSION};
use crate::metrics::ClientMetrics;
use crate::request::RequestRegistry;
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::transport::Transport;
use async_web3_core::{codec, Error, JsonRpcRequest, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Registries of one connected period
pub(crate) struct Session {
    pub(crate) requests: RequestRegistry,
    pub(crate) subscriptions: SubscriptionRegistry,
}

impl Session {
    pub(crate) fn new(subscription_capacity: usize) -> Self {
        Self {
            requests: RequestRegistry::new(),
            subscriptions: SubscriptionRegistry::new(subscription_capacity),
        }
    }
}

/// JSON-RPC client for a blockchain node
#[derive(Clone)]
pub struct Web3Client {
    transport: Arc<dyn Transport>,
    connection: Arc<ConnectionManager>,
    session: Arc<RwLock<Option<Arc<Session>>>>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Serialises connect and close
    lifecycle: Arc<Mutex<()>>,
    config: Arc<ClientConfig>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Web3Client {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        Self {
            transport,
            connection: Arc::new(ConnectionManager::new()),
            session: Arc::new(RwLock::new(None)),
            dispatcher: Arc::new(Mutex::new(None)),
            lifecycle: Arc::new(Mutex::new(())),
            config: Arc::new(config),
            metrics,
        }
    }

    /// Start configuring a client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect to a websocket endpoint with default settings
    pub async fn connect_websocket(url: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().websocket(url).connect().await
    }

    /// Connect to an IPC socket with default settings
    #[cfg(unix)]
    pub async fn connect_ipc(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        ClientBuilder::new().ipc(path).connect().await
    }

    /// Open the transport and start a new session
    ///
    /// Fails with `Error::AlreadyConnected` unless the client is
    /// disconnected. The configured retry strategy decides how many
    /// attempts are made before the last transport error is returned.
    #[tracing::instrument(skip(self), fields(transport = self.transport.kind()))]
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        self.connection.begin_connect()?;
        self.record_state();

        if let Err(e) = self.open_transport().await {
            self.connection.disconnected();
            self.record_state();
            return Err(e);
        }

        let frames = match self.transport.receive().await {
            Ok(frames) => frames,
            Err(e) => {
                let _ = self.transport.close().await;
                self.connection.disconnected();
                self.record_state();
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(self.config.subscription_capacity));
        *self.session.write().await = Some(Arc::clone(&session));

        let dispatcher = Dispatcher::new(
            session,
            Arc::clone(&self.transport),
            Arc::clone(&self.connection),
            self.metrics.clone(),
        );

        self.connection.opened();
        self.record_state();

        let span = tracing::info_span!("dispatcher", transport = self.transport.kind());
        let handle = tokio::spawn(dispatcher.run(frames).instrument(span));
        *self.dispatcher.lock().await = Some(handle);

        tracing::info!("Connected");
        Ok(())
    }

    async fn open_transport(&self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.transport.connect().await {
                Ok(()) => {
                    if let Some(ref m) = self.metrics {
                        m.record_connect_attempt(self.transport.kind(), true);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if let Some(ref m) = self.metrics {
                        m.record_connect_attempt(self.transport.kind(), false);
                    }
                    match self.config.connect_retry.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Connect failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            tracing::error!(attempts = attempt + 1, error = %e, "Connect failed");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Close the connection
    ///
    /// Waits until every pending call has failed with
    /// `Error::ConnectionClosed` and every subscription has ended. Does
    /// nothing when the client is not open.
    pub async fn close(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.connection.begin_close() {
            return Ok(());
        }
        self.record_state();

        let result = self.transport.close().await;

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatcher task failed");
            }
        }

        self.connection.disconnected();
        self.record_state();
        tracing::info!("Closed");
        result
    }

    /// Call `method` and wait for its result
    ///
    /// Node errors come back as `Error::JsonRpc` with the node's code,
    /// message and data. Connection problems come back as one of the
    /// connection variants (`Error::is_connection_error()`).
    #[tracing::instrument(skip(self, params))]
    pub async fn invoke(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let session = self.current_session().await?;
        self.call_in(&session, method, params, None).await
    }

    /// Typed `invoke`
    ///
    /// `params` must serialise to an array; `()` or `None` sends `[]` and any
    /// other single value is wrapped in a one-element array.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = match serde_json::to_value(params)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => vec![other],
        };
        let value = self.invoke(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Open a push subscription
    ///
    /// Sends `eth_subscribe` with `[kind, ...params]`. Notifications that
    /// arrive right after the node's answer are already queued on the
    /// returned stream.
    #[tracing::instrument(skip(self, params))]
    pub async fn subscribe(&self, kind: SubscriptionKind, params: Vec<Value>) -> Result<Subscription> {
        let session = self.current_session().await?;

        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(Value::String(kind.name().to_string()));
        args.extend(params);

        let id = match self
            .call_in(&session, kind.subscribe_method(), args, Some(kind))
            .await?
        {
            Value::String(id) => id,
            other => {
                return Err(Error::Protocol(format!(
                    "subscription id must be a string, got {}",
                    other
                )))
            }
        };

        let rx = match session.subscriptions.take_receiver(&id) {
            Some(rx) => rx,
            None if session.requests.is_closed() => return Err(Error::ConnectionClosed),
            None => {
                return Err(Error::Protocol(format!(
                    "node returned subscription id {} twice",
                    id
                )))
            }
        };

        tracing::info!(subscription_id = %id, "Subscribed");
        Ok(Subscription::new(id, kind, rx, session, self.clone()))
    }

    /// Cancel a subscription
    ///
    /// Returns the node's answer. The subscription is closed locally even if
    /// the call fails; a subscription that is already closed returns
    /// `Ok(false)` without contacting the node.
    pub fn unsubscribe<'a>(
        &'a self,
        subscription: &'a Subscription,
    ) -> impl std::future::Future<Output = Result<bool>> + Send + 'a {
        self.unsubscribe_in(subscription.session(), subscription.kind(), subscription.id())
    }

    pub(crate) async fn unsubscribe_in(
        &self,
        session: &Arc<Session>,
        kind: SubscriptionKind,
        id: &str,
    ) -> Result<bool> {
        if !session.subscriptions.is_open(id) {
            return Ok(false);
        }

        let outcome = self
            .call_in(
                session,
                kind.unsubscribe_method(),
                vec![Value::String(id.to_string())],
                None,
            )
            .await;

        if session.subscriptions.close(id) {
            if let Some(ref m) = self.metrics {
                m.subscriptions_closed(1);
            }
        }

        Ok(outcome?.as_bool().unwrap_or(false))
    }

    /// Node client version (`web3_clientVersion`)
    pub async fn client_version(&self) -> Result<String> {
        self.request(WEB3_CLIENT_VERSION, ()).await
    }

    /// Whether the node answers a `web3_clientVersion` call
    pub async fn is_alive(&self) -> bool {
        match self.client_version().await {
            Ok(version) => {
                tracing::debug!(version = %version, "Node is alive");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Node liveness check failed");
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Receiver that observes every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Calls of the current session still awaiting a response
    pub async fn pending_requests(&self) -> usize {
        match self.session.read().await.as_ref() {
            Some(session) => session.requests.pending_count(),
            None => 0,
        }
    }

    /// Open subscriptions of the current session
    pub async fn active_subscriptions(&self) -> usize {
        match self.session.read().await.as_ref() {
            Some(session) => session.subscriptions.len(),
            None => 0,
        }
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<ClientMetrics>> {
        self.metrics.as_ref()
    }

    fn record_state(&self) {
        if let Some(ref m) = self.metrics {
            m.update_connection_state(self.connection.state());
        }
    }

    async fn current_session(&self) -> Result<Arc<Session>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.session.read().await.clone().ok_or(Error::NotConnected)
    }

    async fn call_in(
        &self,
        session: &Session,
        method: &str,
        params: Vec<Value>,
        kind: Option<SubscriptionKind>,
    ) -> Result<Value> {
        let start = Instant::now();
        let outcome = self.send_and_wait(session, method, params, kind).await;

        if let Some(ref m) = self.metrics {
            let status = if outcome.is_ok() { "success" } else { "error" };
            m.record_request(method, status, start.elapsed().as_secs_f64());
            if let Err(ref e) = outcome {
                m.record_error(error_type(e));
            }
        }
        outcome
    }

    async fn send_and_wait(
        &self,
        session: &Session,
        method: &str,
        params: Vec<Value>,
        kind: Option<SubscriptionKind>,
    ) -> Result<Value> {
        let (id, call) = session.requests.register(kind)?;

        let frame = match codec::encode_request(&JsonRpcRequest::new(id, method, params)) {
            Ok(frame) => frame,
            Err(e) => {
                session.requests.take(id);
                return Err(e);
            }
        };

        // One deadline covers both the write and the wait for the answer.
        let deadline = self
            .config
            .request_timeout
            .map(|limit| tokio::time::Instant::now() + limit);

        tracing::debug!(id, "Sending request");
        let sent = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.transport.send(frame))
                .await
                .unwrap_or(Err(Error::Timeout)),
            None => self.transport.send(frame).await,
        };
        if let Err(e) = sent {
            session.requests.take(id);
            if matches!(e, Error::Timeout) {
                self.log_timeout(id, "send");
            }
            return Err(e);
        }

        match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.log_timeout(id, "response");
                    Err(Error::Timeout)
                }
            },
            None => call.await,
        }
    }

    fn log_timeout(&self, id: u64, phase: &'static str) {
        let timeout_ms = self
            .config
            .request_timeout
            .map(|limit| limit.as_millis() as u64)
            .unwrap_or_default();
        tracing::warn!(id, phase, timeout_ms, "Request timed out");
    }
}

fn error_type(error: &Error) -> &'static str {
    match error {
        Error::JsonRpc(_) => "rpc",
        Error::Timeout => "timeout",
        Error::Protocol(_) => "protocol",
        Error::Serialization(_) => "serialization",
        e if e.is_connection_error() => "connection",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn client() -> (Web3Client, crate::transport::MemoryPeer) {
        let (transport, peer) = MemoryTransport::pair();
        let client = ClientBuilder::new().with_transport(Arc::new(transport)).build().unwrap();
        (client, peer)
    }

    #[tokio::test]
    async fn test_invoke_before_connect() {
        let (client, _peer) = client();
        assert!(matches!(
            client.invoke("eth_blockNumber", vec![]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_request_params_normalised_to_array() {
        let (client, mut peer) = client();
        client.connect().await.unwrap();

        let caller = client.clone();
        let call = tokio::spawn(async move {
            let _: Value = caller.request("a", ()).await.unwrap();
            let _: Value = caller.request("b", json!({"to": "0x0"})).await.unwrap();
            let _: Value = caller.request("c", ("0x1", true)).await.unwrap();
        });

        for expected in [json!([]), json!([{"to": "0x0"}]), json!(["0x1", true])] {
            let request = peer.recv_request().await.unwrap();
            assert_eq!(Value::Array(request.params), expected);
            peer.send(json!({"jsonrpc": "2.0", "id": request.id, "result": null}).to_string());
        }
        call.await.unwrap();
    }

    #[tokio::test]
    async fn test_null_result_is_a_value() {
        let (client, mut peer) = client();
        client.connect().await.unwrap();

        let caller = client.clone();
        let call = tokio::spawn(async move { caller.invoke("eth_getBlockByHash", vec![]).await });

        let request = peer.recv_request().await.unwrap();
        peer.send(json!({"jsonrpc": "2.0", "id": request.id, "result": null}).to_string());

        assert_eq!(call.await.unwrap().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_type_labels() {
        assert_eq!(error_type(&Error::Timeout), "timeout");
        assert_eq!(error_type(&Error::ConnectionClosed), "connection");
        assert_eq!(error_type(&Error::Protocol("x".into())), "protocol");
    }
}
