//! Cross replica delivery of device commands.
//!
//! A publisher does not know which process holds a device's socket; it
//! publishes on `device:{id}` and whichever replica subscribed for that device
//! forwards the payload to its session. Delivery is fire and forget.

use crate::models::FanoutMessage;
use crate::models::fanout::{DEFAULT_RESET_REASON, channel};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

mod local;
mod redis_bus;

pub use local::LocalFanout;
pub use redis_bus::RedisFanout;

/// Buffered payloads per subscription before new ones are dropped.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 32;

#[async_trait]
pub trait FanoutBus: Send + Sync {
    /// Publishes a raw payload and returns how many subscribers received it.
    async fn publish_raw(&self, channel: &str, payload: String) -> anyhow::Result<usize>;

    async fn subscribe(&self, channel: &str) -> anyhow::Result<FanoutSubscription>;

    async fn publish(&self, device_id: &str, message: &FanoutMessage) -> anyhow::Result<usize> {
        let receivers = self
            .publish_raw(&channel(device_id), message.to_json())
            .await?;
        tracing::debug!(
            device_id,
            kind = message.kind(),
            receivers,
            "published fanout message"
        );
        Ok(receivers)
    }
}

/// Unsubscribes when dropped.
pub struct SubscriptionGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl SubscriptionGuard {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

pub struct FanoutSubscription {
    pub receiver: mpsc::Receiver<String>,
    pub guard: SubscriptionGuard,
}

impl FanoutSubscription {
    pub fn into_parts(self) -> (mpsc::Receiver<String>, SubscriptionGuard) {
        (self.receiver, self.guard)
    }
}

/// Picks Redis when an address is configured, the in-process bus otherwise.
pub async fn connect(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn FanoutBus>> {
    match redis_url {
        Some(url) if !url.is_empty() => {
            let bus = RedisFanout::connect(url).await?;
            tracing::info!("fanout bus: redis");
            Ok(Arc::new(bus))
        }
        _ => {
            tracing::info!("fanout bus: in-process");
            Ok(Arc::new(LocalFanout::new()))
        }
    }
}

pub async fn notify_schedule_update(bus: &dyn FanoutBus, device_id: &str) -> anyhow::Result<usize> {
    bus.publish(device_id, &FanoutMessage::ScheduleUpdate {})
        .await
}

pub async fn notify_factory_reset(
    bus: &dyn FanoutBus,
    device_id: &str,
    reason: Option<&str>,
) -> anyhow::Result<usize> {
    let reason = reason.unwrap_or(DEFAULT_RESET_REASON).to_string();
    bus.publish(device_id, &FanoutMessage::FactoryReset { reason })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn helpers_publish_typed_payloads() {
        let bus = LocalFanout::new();
        let (mut receiver, _guard) = bus.subscribe(&channel("MATRX-1")).await.unwrap().into_parts();

        assert_eq!(notify_schedule_update(&bus, "MATRX-1").await.unwrap(), 1);
        let settings = FanoutMessage::SettingsUpdate {};
        assert_eq!(bus.publish("MATRX-1", &settings).await.unwrap(), 1);
        assert_eq!(notify_factory_reset(&bus, "MATRX-1", None).await.unwrap(), 1);
        assert_eq!(notify_factory_reset(&bus, "MATRX-2", None).await.unwrap(), 0);

        let kinds: Vec<String> = [
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
        ]
        .iter()
        .map(|payload| FanoutMessage::parse(payload).unwrap().kind().to_string())
        .collect();
        assert_eq!(kinds, ["schedule_update", "settings_update", "factory_reset"]);
    }

    #[tokio::test]
    async fn default_reset_reason_is_applied() {
        let bus = LocalFanout::new();
        let (mut receiver, _guard) = bus.subscribe(&channel("LANTERN-1")).await.unwrap().into_parts();
        notify_factory_reset(&bus, "LANTERN-1", None).await.unwrap();
        let message = FanoutMessage::parse(&receiver.recv().await.unwrap()).unwrap();
        assert_eq!(
            message,
            FanoutMessage::FactoryReset {
                reason: DEFAULT_RESET_REASON.to_string()
            }
        );
    }

    #[test]
    fn guard_releases_once() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = released.clone();
        let guard = SubscriptionGuard::new(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        drop(guard);
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
