use super::{FanoutBus, FanoutSubscription, SUBSCRIPTION_BUFFER, SubscriptionGuard};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::mpsc;

/// Redis pub/sub bus shared by every gateway replica.
///
/// Publishing goes through one multiplexed connection. Each subscription owns
/// a dedicated pub/sub connection that lives as long as its guard.
pub struct RedisFanout {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisFanout {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid redis url: '{}'", url))?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("Failed to connect to redis: {}", url))?;
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl FanoutBus for RedisFanout {
    async fn publish_raw(&self, channel: &str, payload: String) -> anyhow::Result<usize> {
        let mut publisher = self.publisher.clone();
        let receivers: usize = publisher
            .publish(channel, payload)
            .await
            .with_context(|| format!("Failed to publish on {}", channel))?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<FanoutSubscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("Failed to open redis pub/sub connection")?;
        pubsub
            .subscribe(channel)
            .await
            .with_context(|| format!("Failed to subscribe to {}", channel))?;
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = channel.to_string();
        let forward = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(channel = %channel, "unreadable fanout payload: {}", err);
                        continue;
                    }
                };
                if sender.send(payload).await.is_err() {
                    break;
                }
            }
            tracing::debug!(channel = %channel, "redis subscription closed");
        });
        let abort = forward.abort_handle();
        Ok(FanoutSubscription {
            receiver,
            guard: SubscriptionGuard::new(move || abort.abort()),
        })
    }
}
