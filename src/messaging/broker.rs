use crate::config::MessageBrokerConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use deadpool_lapin::{Config, Manager, Pool};
use futures_util::stream::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ConnectionProperties, Consumer, ExchangeKind,
};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Buffered deliveries per subscription before the consumer waits on the handler
const SUBSCRIPTION_BUFFER: usize = 256;

/// A raw message delivered on a subscribed topic
#[derive(Debug, Clone)]
pub struct TopicMessage {
    /// Topic or routing key the message was published under
    pub topic: String,
    /// Undecoded message body
    pub payload: Vec<u8>,
}

/// Source of published topic messages
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Subscribe to a topic pattern; deliveries arrive on the returned receiver
    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<TopicMessage>>;
}

/// RabbitMQ message broker implementation
pub struct MessageBroker {
    /// Connection pool
    pool: Pool,
    /// Configuration
    config: MessageBrokerConfig,
    /// Consumer tasks by subscription id
    subscriptions: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    /// Default channel
    channel: Arc<Mutex<Option<Channel>>>,
}

impl MessageBroker {
    /// Create a new message broker
    pub async fn new(config: MessageBrokerConfig) -> Result<Self> {
        let pool_config = Config {
            url: Some(config.uri.clone()),
            pool: Some(deadpool_lapin::PoolConfig {
                max_size: config.pool_size as usize,
                queue_mode: deadpool::managed::QueueMode::Fifo,
                timeouts: deadpool::managed::Timeouts {
                    wait: Some(Duration::from_millis(config.timeout_ms)),
                    create: Some(Duration::from_millis(config.timeout_ms)),
                    recycle: Some(Duration::from_millis(config.timeout_ms)),
                },
            }),
            connection_properties: ConnectionProperties::default(),
        };
        let pool = pool_config.create_pool(Some(deadpool_lapin::Runtime::Tokio1))?;

        let broker = Self {
            pool,
            config,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            channel: Arc::new(Mutex::new(None)),
        };

        broker.init().await?;

        Ok(broker)
    }

    /// Open the default channel and make sure the exchange exists
    async fn init(&self) -> Result<()> {
        let channel = self.get_channel().await?;

        // Reserved exchanges can only be checked, not declared
        let passive = self.config.exchange.starts_with("amq.");
        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive,
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to declare exchange: {}", e)))?;

        info!(
            "RabbitMQ message broker initialized on exchange {}",
            self.config.exchange
        );

        Ok(())
    }

    /// Get a connection from the pool with retry
    async fn get_connection(&self) -> Result<deadpool::managed::Object<Manager>> {
        let mut attempts = 0;
        let max_attempts = self.config.retry_attempts.max(1);

        loop {
            attempts += 1;
            match self.pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    if attempts >= max_attempts {
                        return Err(Error::Service(format!(
                            "Failed to get RabbitMQ connection after {} attempts: {}",
                            attempts, err
                        ))
                        .into());
                    }

                    warn!(
                        "Failed to get RabbitMQ connection (attempt {}/{}): {}",
                        attempts, max_attempts, err
                    );

                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    /// Get the default channel or create a new one
    async fn get_channel(&self) -> Result<Channel> {
        let mut channel_guard = self.channel.lock().await;

        if let Some(channel) = &*channel_guard {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        let conn = self.get_connection().await?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| Error::Service(format!("Failed to create RabbitMQ channel: {}", e)))?;

        *channel_guard = Some(channel.clone());

        Ok(channel)
    }

    /// Create an exclusive consumer queue bound to the given routing pattern
    async fn create_consumer_queue(&self, pattern: &str) -> Result<(Channel, String, Consumer)> {
        let channel = self.get_channel().await?;

        let queue_name = format!(
            "frigate-notify.{}.{}",
            pattern.replace(['.', '#', '*'], "_"),
            Uuid::new_v4()
        );

        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to declare queue: {}", e)))?;

        debug!("Created queue: {} for pattern: {}", queue_name, pattern);

        channel
            .queue_bind(
                &queue_name,
                &self.config.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to bind queue: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &queue_name,
                &format!("consumer-{}", Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to create consumer: {}", e)))?;

        Ok((channel, queue_name, consumer))
    }

    /// Publish a raw payload under a routing key
    pub async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        let channel = self.get_channel().await?;

        channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to publish message: {}", e)))?;

        debug!("Published {} bytes with routing key: {}", payload.len(), routing_key);

        Ok(())
    }

    /// Stop every consumer task
    pub async fn shutdown(&self) {
        let mut subscriptions = self.subscriptions.write().await;
        for (subscription_id, handle) in subscriptions.drain() {
            handle.abort();
            info!("Unsubscribed: {}", subscription_id);
        }
    }
}

#[async_trait]
impl EventSource for MessageBroker {
    async fn subscribe(&self, pattern: &str) -> Result<mpsc::Receiver<TopicMessage>> {
        let (_channel, queue_name, mut consumer) = self.create_consumer_queue(pattern).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let subscription_id = Uuid::new_v4().to_string();
        let subscription_id_clone = subscription_id.clone();
        let pattern_owned = pattern.to_string();

        let handle = tokio::spawn(async move {
            info!(
                "Started consumer on {} for pattern: {} (subscription: {})",
                queue_name, pattern_owned, subscription_id_clone
            );

            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let message = TopicMessage {
                            topic: delivery.routing_key.as_str().to_string(),
                            payload: delivery.data.clone(),
                        };

                        let forwarded = tx.send(message).await;

                        // Acknowledge regardless of the outcome to avoid redelivery loops
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!("Failed to acknowledge message: {}", e);
                        }

                        if forwarded.is_err() {
                            warn!("Subscriber for {} went away", pattern_owned);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving message: {}", e);
                        // Short delay to avoid tight loop on errors
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            info!(
                "Consumer stopped for pattern: {} (subscription: {})",
                pattern_owned, subscription_id_clone
            );
        });

        self.subscriptions
            .write()
            .await
            .insert(subscription_id, handle);

        Ok(rx)
    }
}

/// Create a message broker service
pub async fn create_message_broker(config: MessageBrokerConfig) -> Result<Arc<MessageBroker>> {
    let broker = MessageBroker::new(config).await?;

    Ok(Arc::new(broker))
}
