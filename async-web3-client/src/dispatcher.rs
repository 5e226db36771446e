//! Inbound frame routing
//!
//! One dispatcher task runs per session. It reads every frame the transport
//! yields, classifies it and routes it:
//!
//! - responses resolve the waiter registered under their id
//! - subscription notifications go to the matching subscription queue
//! - batches are routed element by element
//!
//! Anything unroutable is logged and dropped; the loop keeps going. When the
//! frame stream ends the dispatcher is the single place that fails every
//! pending call and ends every subscription.

use crate::client::Session;
use crate::connection_state::{ConnectionManager, ConnectionState};
use crate::methods::SubscriptionKind;
use crate::metrics::ClientMetrics;
use crate::transport::{FrameStream, Transport};
use async_web3_core::{
    codec, Error, InboundMessage, JsonRpcRequest, JsonRpcResponse, SubscriptionNotification,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

pub(crate) struct Dispatcher {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    connection: Arc<ConnectionManager>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Dispatcher {
    pub(crate) fn new(
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        connection: Arc<ConnectionManager>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        Self {
            session,
            transport,
            connection,
            metrics,
        }
    }

    /// Route frames until the stream ends, then tear the session down
    pub(crate) async fn run(self, mut frames: FrameStream) {
        let loss = loop {
            match frames.next().await {
                Some(Ok(frame)) => self.handle_frame(&frame),
                Some(Err(e)) => break Some(e),
                None => break None,
            }
        };
        drop(frames);

        // Release the socket before anyone can connect again.
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "Transport close after session end failed");
        }
        self.shutdown(loss);
    }

    fn handle_frame(&self, frame: &str) {
        match codec::decode(frame) {
            Ok(message) => self.route(message),
            Err(e) => {
                tracing::warn!(error = %e, frame = %frame, "Dropping unroutable frame");
                if let Some(ref m) = self.metrics {
                    m.record_error("protocol");
                }
            }
        }
    }

    fn route(&self, message: InboundMessage) {
        match message {
            InboundMessage::Response(response) => self.handle_response(response),
            InboundMessage::Notification(notification) => self.handle_notification(notification),
            InboundMessage::Batch(messages) => {
                for message in messages {
                    self.route(message);
                }
            }
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_request_id() else {
            tracing::warn!(id = %response.id, "Dropping response with an id this client never issues");
            return;
        };
        let Some(waiter) = self.session.requests.take(id) else {
            tracing::debug!(id, "Dropping response for unknown request id");
            return;
        };

        let outcome = response.into_outcome();
        tracing::debug!(
            id,
            elapsed_ms = waiter.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Response received"
        );

        let subscription = match (waiter.kind(), &outcome) {
            (Some(kind), Ok(Value::String(sub_id))) => Some((kind, sub_id.clone())),
            _ => None,
        };

        let Some((kind, sub_id)) = subscription else {
            if !waiter.complete(outcome) {
                tracing::debug!(id, "Caller gone, response discarded");
            }
            return;
        };

        // Open before handing the id out so a notification right behind
        // this response already has somewhere to go.
        let opened = self.session.subscriptions.open(&sub_id, kind);
        if opened {
            if let Some(ref m) = self.metrics {
                m.subscription_opened();
            }
        }

        if !waiter.complete(outcome) && opened {
            tracing::debug!(subscription_id = %sub_id, "Subscriber gone, cancelling subscription");
            self.session.subscriptions.close(&sub_id);
            if let Some(ref m) = self.metrics {
                m.subscriptions_closed(1);
            }
            self.unsubscribe_detached(kind, sub_id);
        }
    }

    fn handle_notification(&self, notification: SubscriptionNotification) {
        let params = notification.params;
        if self.session.subscriptions.deliver(&params.subscription, params.result) {
            if let Some(ref m) = self.metrics {
                m.record_notification();
            }
        } else {
            tracing::debug!(
                subscription_id = %params.subscription,
                method = %notification.method,
                "Dropping notification for closed subscription"
            );
            if let Some(ref m) = self.metrics {
                m.record_notifications_dropped(1, "closed");
            }
        }
    }

    /// Send an unsubscribe without waiting for the answer
    fn unsubscribe_detached(&self, kind: SubscriptionKind, sub_id: String) {
        // Dropping the call deregisters it, so the node's answer is
        // discarded as unknown.
        let id = match self.session.requests.register(None) {
            Ok((id, _call)) => id,
            Err(_) => return,
        };
        let request = JsonRpcRequest::new(id, kind.unsubscribe_method(), vec![Value::String(sub_id)]);
        let frame = match codec::encode_request(&request) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode unsubscribe");
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(frame).await {
                tracing::debug!(error = %e, "Detached unsubscribe not sent");
            }
        });
    }

    fn shutdown(&self, loss: Option<Error>) {
        match &loss {
            Some(e) => {
                tracing::error!(error = %e, "Connection lost");
                if let Some(ref m) = self.metrics {
                    m.record_error("connection");
                }
            }
            None => tracing::info!("Connection closed"),
        }

        self.connection.disconnected();
        if let Some(ref m) = self.metrics {
            m.update_connection_state(ConnectionState::Disconnected);
        }

        let pending_error = loss.clone().unwrap_or(Error::ConnectionClosed);
        self.session.requests.fail_all(pending_error);

        let closed = self.session.subscriptions.close_all(loss);
        if let Some(ref m) = self.metrics {
            m.subscriptions_closed(closed);
        }
    }
}
