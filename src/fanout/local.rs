use super::{FanoutBus, FanoutSubscription, SUBSCRIPTION_BUFFER, SubscriptionGuard};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

type Subscribers = DashMap<String, HashMap<Uuid, mpsc::Sender<String>>>;

/// In-process bus for single replica deployments.
#[derive(Default, Clone)]
pub struct LocalFanout {
    channels: Arc<Subscribers>,
}

impl LocalFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl FanoutBus for LocalFanout {
    async fn publish_raw(&self, channel: &str, payload: String) -> anyhow::Result<usize> {
        let senders: Vec<mpsc::Sender<String>> = match self.channels.get(channel) {
            Some(subscribers) => subscribers.values().cloned().collect(),
            None => return Ok(0),
        };
        let mut delivered = 0;
        for sender in senders {
            match sender.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(channel, "fanout subscriber is lagging, message dropped")
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> anyhow::Result<FanoutSubscription> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = Uuid::new_v4();
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, sender);
        let channels = self.channels.clone();
        let channel = channel.to_string();
        let guard = SubscriptionGuard::new(move || {
            channels.remove_if_mut(&channel, |_, subscribers| {
                subscribers.remove(&id);
                subscribers.is_empty()
            });
        });
        Ok(FanoutSubscription { receiver, guard })
    }
}
