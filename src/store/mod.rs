use crate::models::{
    ClaimOutcome, Device, DeviceClaim, DeviceFamily, DeviceInfo, DeviceSettings, Installation,
    InstallationFlags,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

mod sqlite;

pub use sqlite::SqliteDeviceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed stored value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed stored value: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence used by the gateway.
///
/// Single row writes are atomic on their own; claim reset and pin exclusivity
/// run in one transaction each.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Creates the device on first sight (with default settings) or refreshes
    /// `last_seen_at` otherwise.
    async fn upsert_device(&self, device_id: &str, family: DeviceFamily) -> StoreResult<Device>;

    async fn get_device(&self, device_id: &str) -> StoreResult<Option<Device>>;

    async fn touch_device(&self, device_id: &str) -> StoreResult<()>;

    async fn update_device_info(&self, device_id: &str, info: DeviceInfo) -> StoreResult<()>;

    async fn set_currently_displaying(
        &self,
        device_id: &str,
        installation_id: Uuid,
    ) -> StoreResult<()>;

    async fn find_owner_claim(&self, device_id: &str) -> StoreResult<Option<DeviceClaim>>;

    /// Makes `user_id` the sole owner of the device.
    ///
    /// A device already owned by the same user is left untouched. Otherwise every
    /// claim, installation and the settings row are removed before the owner
    /// claim is written.
    async fn claim_owner(&self, device_id: &str, user_id: &str) -> StoreResult<ClaimOutcome>;

    async fn get_settings(&self, device_id: &str) -> StoreResult<Option<DeviceSettings>>;

    /// Creates or replaces the family specific settings blob.
    async fn save_type_settings(
        &self,
        device_id: &str,
        type_settings: &serde_json::Value,
    ) -> StoreResult<()>;

    /// Installations ordered by `sort_order` ascending.
    async fn list_installations(&self, device_id: &str) -> StoreResult<Vec<Installation>>;

    async fn find_installation(
        &self,
        device_id: &str,
        installation_id: Uuid,
    ) -> StoreResult<Option<Installation>>;

    /// Clears every pin of the device and pins the target, atomically.
    async fn pin_installation(&self, device_id: &str, installation_id: Uuid) -> StoreResult<()>;

    async fn update_installation_flags(
        &self,
        device_id: &str,
        installation_id: Uuid,
        flags: InstallationFlags,
    ) -> StoreResult<()>;
}
