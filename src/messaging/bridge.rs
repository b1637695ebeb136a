use super::patterns::MessageEnvelope;
use super::topology;
use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::error::{GatewayError, Result};
use dashmap::DashMap;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reconnect attempts per outage before the bridge gives up and stays
/// disconnected until restart.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Fixed delay between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Messaging slice of the gateway configuration
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub url: String,
    /// Queue RPC commands are published to
    pub command_queue: String,
    pub prefetch: u16,
    pub rpc_timeout: Duration,
}

impl From<&GatewayConfig> for MessagingConfig {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            url: cfg.rabbitmq_url.clone(),
            command_queue: cfg.rabbitmq_queue.clone(),
            prefetch: cfg.rabbitmq_prefetch,
            rpc_timeout: Duration::from_millis(cfg.rpc_timeout_ms),
        }
    }
}

/// Connection snapshot exposed by the health endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub pending_rpcs: usize,
    pub reply_queue: Option<String>,
}

/// RabbitMQ bridge: RPC with correlated replies, fire-and-forget event
/// and job publishing, topology declaration and bounded reconnection.
///
/// RPC replies are demultiplexed by correlation id through an exclusive
/// auto-named reply queue; each in-flight RPC parks on a oneshot channel
/// in `pending` until its reply arrives or the deadline passes.
pub struct MessagingBridge {
    config: MessagingConfig,
    channel: RwLock<Option<Channel>>,
    connection: RwLock<Option<Connection>>,
    reply_queue: RwLock<Option<String>>,
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    shutdown: AtomicBool,
    conn_lost: Notify,
    pending: DashMap<String, oneshot::Sender<Result<Value>>>,
}

impl MessagingBridge {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            config,
            channel: RwLock::new(None),
            connection: RwLock::new(None),
            reply_queue: RwLock::new(None),
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
            conn_lost: Notify::new(),
            pending: DashMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::SeqCst),
            pending_rpcs: self.pending.len(),
            reply_queue: self.reply_queue.read().await.clone(),
        }
    }

    /// Connection supervisor. Runs for the lifetime of the process:
    /// connects, waits for the connection to drop, reconnects with a
    /// fixed delay up to the attempt cap, then stays disconnected.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self.connect().await {
                Ok(()) => {
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    info!(url = %self.config.url, "Connected to message broker");

                    self.conn_lost.notified().await;
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }

                    self.connected.store(false, Ordering::SeqCst);
                    self.fail_pending();
                    warn!("Broker connection lost");
                }
                Err(e) => {
                    let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        error!(
                            attempts = attempt,
                            "Broker unreachable, giving up until restart"
                        );
                        self.fail_pending();
                        break;
                    }
                    warn!(
                        attempt,
                        max_attempts = MAX_RECONNECT_ATTEMPTS,
                        error = %e,
                        "Broker connection failed, retrying"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
        debug!("Messaging supervisor stopped");
    }

    /// One connection attempt: connect, declare topology, set up the
    /// reply queue and its consumer.
    async fn connect(self: &Arc<Self>) -> Result<()> {
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let connection = Connection::connect(&self.config.url, options).await?;

        let bridge = Arc::downgrade(self);
        connection.on_error(move |err| {
            warn!(error = %err, "Broker connection error");
            if let Some(bridge) = bridge.upgrade() {
                bridge.connected.store(false, Ordering::SeqCst);
                bridge.conn_lost.notify_one();
            }
        });

        let channel = connection.create_channel().await?;
        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;

        topology::declare(&channel).await?;
        let reply_queue = topology::declare_reply_queue(&channel).await?;

        let consumer = channel
            .basic_consume(
                &reply_queue,
                "gateway-reply-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        self.spawn_reply_consumer(consumer);

        *self.channel.write().await = Some(channel);
        *self.connection.write().await = Some(connection);
        *self.reply_queue.write().await = Some(reply_queue);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn spawn_reply_consumer(self: &Arc<Self>, mut consumer: Consumer) {
        let bridge = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let Some(bridge) = bridge.upgrade() else { break };
                match delivery {
                    Ok(delivery) => bridge.handle_reply(delivery).await,
                    Err(e) => {
                        warn!(error = %e, "Reply consumer error");
                        break;
                    }
                }
            }
            debug!("Reply consumer stopped");
        });
    }

    async fn handle_reply(&self, delivery: Delivery) {
        let correlation_id = delivery
            .properties
            .correlation_id()
            .as_ref()
            .map(|id| id.as_str().to_string());

        // The error header marks an application-level rejection
        let is_error = delivery
            .properties
            .headers()
            .as_ref()
            .map(|headers| headers.inner().keys().any(|k| k.as_str() == "error"))
            .unwrap_or(false);

        match correlation_id {
            Some(id) => self.resolve_reply(&id, &delivery.data, is_error),
            None => warn!("Discarding reply without correlation id"),
        }

        // Replies are acked unconditionally; an unparseable reply is
        // resolved as an error, not redelivered.
        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            warn!(error = %e, "Failed to ack RPC reply");
        }
    }

    /// Match a reply to its pending RPC and wake the caller.
    ///
    /// A reply for an unknown correlation id (the caller already timed
    /// out) is dropped.
    pub fn resolve_reply(&self, correlation_id: &str, payload: &[u8], is_error: bool) {
        let Some((_, tx)) = self.pending.remove(correlation_id) else {
            debug!(correlation_id, "Late reply for unknown correlation id");
            return;
        };

        let result = match serde_json::from_slice::<Value>(payload) {
            Ok(content) if is_error => {
                let message = content
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown error")
                    .to_string();
                Err(GatewayError::RpcRejected(message))
            }
            Ok(content) => Ok(content),
            Err(e) => Err(GatewayError::RpcMalformedReply(e.to_string())),
        };

        if tx.send(result).is_err() {
            debug!(correlation_id, "RPC caller stopped waiting");
        }
    }

    /// Send an RPC command and wait for the correlated reply.
    pub async fn send_rpc(
        &self,
        pattern: &str,
        data: Value,
        ctx: &RequestContext,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        let channel = self
            .channel
            .read()
            .await
            .clone()
            .ok_or(GatewayError::NotConnected)?;
        let reply_to = self
            .reply_queue
            .read()
            .await
            .clone()
            .ok_or(GatewayError::NotConnected)?;

        let correlation_id = Uuid::new_v4().to_string();
        let envelope = MessageEnvelope::rpc(pattern, data, &correlation_id, Some(ctx));
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| GatewayError::Internal(format!("Failed to encode RPC: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        let properties = BasicProperties::default()
            .with_correlation_id(correlation_id.clone().into())
            .with_reply_to(reply_to.into())
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        let published = channel
            .basic_publish(
                "",
                &self.config.command_queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await;

        if let Err(e) = published {
            self.pending.remove(&correlation_id);
            return Err(e.into());
        }
        debug!(pattern, correlation_id = %correlation_id, "RPC sent");

        match tokio::time::timeout(self.config.rpc_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::Internal(
                "RPC reply channel closed".to_string(),
            )),
            Err(_) => {
                self.pending.remove(&correlation_id);
                warn!(pattern, correlation_id = %correlation_id, "RPC timed out");
                Err(GatewayError::RpcTimeout(pattern.to_string()))
            }
        }
    }

    /// Publish a fire-and-forget domain event. Failures are logged,
    /// never surfaced to the caller.
    pub async fn publish_event(&self, pattern: &str, data: Value, ctx: Option<&RequestContext>) {
        let envelope = MessageEnvelope::event(pattern, data, ctx);
        self.publish_to_events(pattern, &envelope, "event").await;
    }

    /// Publish a background job; retry and delay hints travel in the
    /// envelope metadata for the consuming worker.
    pub async fn publish_job(
        &self,
        pattern: &str,
        data: Value,
        retry_count: u32,
        delay_ms: Option<u64>,
        ctx: Option<&RequestContext>,
    ) {
        let envelope = MessageEnvelope::job(pattern, data, retry_count, delay_ms, ctx);
        self.publish_to_events(pattern, &envelope, "job").await;
    }

    async fn publish_to_events(&self, pattern: &str, envelope: &MessageEnvelope, kind: &str) {
        if !self.is_connected() {
            warn!(pattern, kind, "Broker not connected, dropping message");
            return;
        }
        let Some(channel) = self.channel.read().await.clone() else {
            warn!(pattern, kind, "No channel available, dropping message");
            return;
        };

        let payload = match serde_json::to_vec(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(pattern, kind, error = %e, "Failed to encode message");
                return;
            }
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        match channel
            .basic_publish(
                topology::EVENTS_EXCHANGE,
                pattern,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
        {
            Ok(_) => debug!(pattern, kind, "Message published"),
            Err(e) => error!(pattern, kind, error = %e, "Failed to publish message"),
        }
    }

    /// Graceful shutdown: stop the supervisor, fail in-flight RPCs and
    /// close the channel and connection.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.conn_lost.notify_one();
        self.fail_pending();

        if let Some(channel) = self.channel.write().await.take() {
            let _ = channel.close(200, "shutdown").await;
        }
        if let Some(connection) = self.connection.write().await.take() {
            let _ = connection.close(200, "shutdown").await;
        }
        info!("Disconnected from message broker");
    }

    fn fail_pending(&self) {
        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, tx)) = self.pending.remove(&key) {
                let _ = tx.send(Err(GatewayError::NotConnected));
            }
        }
    }
}
