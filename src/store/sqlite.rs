use super::{DeviceStore, StoreError, StoreResult};
use crate::models::settings::default_type_settings;
use crate::models::{
    ClaimOutcome, ClaimType, Device, DeviceClaim, DeviceFamily, DeviceInfo, DeviceSettings,
    Installation, InstallationConfig, InstallationFlags,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub static MIGRATOR: Migrator = sqlx::migrate!();

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteDeviceStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct DeviceRow {
    id: String,
    family: String,
    last_seen_at: i64,
    width: Option<i64>,
    height: Option<i64>,
    has_light_sensor: bool,
    currently_displaying_installation_id: Option<String>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = StoreError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let family = DeviceFamily::from_str(&row.family)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let info = match (row.width, row.height) {
            (Some(width), Some(height)) => Some(DeviceInfo {
                width: width as u32,
                height: height as u32,
                has_light_sensor: row.has_light_sensor,
            }),
            _ => None,
        };
        let currently_displaying_installation_id = row
            .currently_displaying_installation_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        Ok(Device {
            id: row.id,
            family,
            last_seen_at: from_millis(row.last_seen_at),
            info,
            currently_displaying_installation_id,
        })
    }
}

#[derive(FromRow)]
struct SettingsRow {
    device_id: String,
    display_name: String,
    type_settings: String,
}

impl TryFrom<SettingsRow> for DeviceSettings {
    type Error = StoreError;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        Ok(DeviceSettings {
            device_id: row.device_id,
            display_name: row.display_name,
            type_settings: serde_json::from_str(&row.type_settings)?,
        })
    }
}

#[derive(FromRow)]
struct ClaimRow {
    device_id: String,
    user_id: String,
    claim_type: String,
}

impl TryFrom<ClaimRow> for DeviceClaim {
    type Error = StoreError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(DeviceClaim {
            device_id: row.device_id,
            user_id: row.user_id,
            claim_type: ClaimType::from_str(&row.claim_type)
                .map_err(|err| StoreError::Corrupt(err.to_string()))?,
        })
    }
}

#[derive(FromRow)]
struct InstallationRow {
    id: String,
    device_id: String,
    config: String,
    enabled: bool,
    skipped_by_user: bool,
    skipped_by_server: bool,
    pinned_by_user: bool,
    display_time: i64,
    sort_order: i64,
}

impl TryFrom<InstallationRow> for Installation {
    type Error = StoreError;

    fn try_from(row: InstallationRow) -> Result<Self, Self::Error> {
        let config: InstallationConfig = serde_json::from_str(&row.config)?;
        Ok(Installation {
            id: parse_uuid(&row.id)?,
            device_id: row.device_id,
            config,
            enabled: row.enabled,
            skipped_by_user: row.skipped_by_user,
            skipped_by_server: row.skipped_by_server,
            pinned_by_user: row.pinned_by_user,
            display_time: row.display_time.max(0) as u32,
            sort_order: row.sort_order,
        })
    }
}

const DEVICE_COLUMNS: &str = "id, family, last_seen_at, width, height, has_light_sensor, \
     currently_displaying_installation_id";

const INSTALLATION_COLUMNS: &str = "id, device_id, config, enabled, skipped_by_user, \
     skipped_by_server, pinned_by_user, display_time, sort_order";

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| StoreError::Corrupt(format!("uuid '{value}': {err}")))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl SqliteDeviceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database at `url` and applies pending migrations.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Failed to parse SQLite url: '{}'", url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;
        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to apply database migrations")?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DeviceStore for SqliteDeviceStore {
    async fn upsert_device(&self, device_id: &str, family: DeviceFamily) -> StoreResult<Device> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;
        // writing first takes the write lock up front, so concurrent upserts
        // queue on the busy timeout instead of failing as a lock upgrade
        let created = sqlx::query(
            "INSERT OR IGNORE INTO devices (id, family, last_seen_at, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(family.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if created {
            sqlx::query(
                "INSERT OR IGNORE INTO device_settings \
                 (device_id, display_name, type_settings, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(device_id)
            .bind(device_id)
            .bind(default_type_settings(family).to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("UPDATE devices SET family = ?, last_seen_at = ? WHERE id = ?")
                .bind(family.as_str())
                .bind(now)
                .bind(device_id)
                .execute(&mut *tx)
                .await?;
        }
        let row: DeviceRow =
            sqlx::query_as(&format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?"))
                .bind(device_id)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn get_device(&self, device_id: &str) -> StoreResult<Option<Device>> {
        let row: Option<DeviceRow> =
            sqlx::query_as(&format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?"))
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Device::try_from).transpose()
    }

    async fn touch_device(&self, device_id: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE devices SET last_seen_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected())
    }

    async fn update_device_info(&self, device_id: &str, info: DeviceInfo) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE devices SET width = ?, height = ?, has_light_sensor = ? WHERE id = ?",
        )
        .bind(info.width as i64)
        .bind(info.height as i64)
        .bind(info.has_light_sensor)
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected())
    }

    async fn set_currently_displaying(
        &self,
        device_id: &str,
        installation_id: Uuid,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE devices SET currently_displaying_installation_id = ? WHERE id = ?",
        )
        .bind(installation_id.to_string())
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected())
    }

    async fn find_owner_claim(&self, device_id: &str) -> StoreResult<Option<DeviceClaim>> {
        let row: Option<ClaimRow> = sqlx::query_as(
            "SELECT device_id, user_id, claim_type FROM device_claims \
             WHERE device_id = ? AND claim_type = 'OWNER'",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DeviceClaim::try_from).transpose()
    }

    async fn claim_owner(&self, device_id: &str, user_id: &str) -> StoreResult<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;
        // no-op write so the transaction holds the write lock before reading
        sqlx::query("UPDATE devices SET last_seen_at = last_seen_at WHERE id = ?")
            .bind(device_id)
            .execute(&mut *tx)
            .await?;
        let owner: Option<(String,)> = sqlx::query_as(
            "SELECT user_id FROM device_claims WHERE device_id = ? AND claim_type = 'OWNER'",
        )
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await?;
        if owner.is_some_and(|(owner,)| owner == user_id) {
            return Ok(ClaimOutcome::AlreadyOwned);
        }
        for table in ["device_claims", "installations", "device_settings"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE device_id = ?"))
                .bind(device_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "INSERT INTO device_claims (device_id, user_id, claim_type, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(user_id)
        .bind(ClaimType::Owner.as_str())
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(ClaimOutcome::Transferred)
    }

    async fn get_settings(&self, device_id: &str) -> StoreResult<Option<DeviceSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT device_id, display_name, type_settings FROM device_settings WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DeviceSettings::try_from).transpose()
    }

    async fn save_type_settings(
        &self,
        device_id: &str,
        type_settings: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO device_settings (device_id, display_name, type_settings, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (device_id) DO UPDATE SET \
             type_settings = excluded.type_settings, updated_at = excluded.updated_at",
        )
        .bind(device_id)
        .bind(device_id)
        .bind(serde_json::to_string(type_settings)?)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_installations(&self, device_id: &str) -> StoreResult<Vec<Installation>> {
        let rows: Vec<InstallationRow> = sqlx::query_as(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM installations \
             WHERE device_id = ? ORDER BY sort_order ASC"
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Installation::try_from).collect()
    }

    async fn find_installation(
        &self,
        device_id: &str,
        installation_id: Uuid,
    ) -> StoreResult<Option<Installation>> {
        let row: Option<InstallationRow> = sqlx::query_as(&format!(
            "SELECT {INSTALLATION_COLUMNS} FROM installations WHERE id = ? AND device_id = ?"
        ))
        .bind(installation_id.to_string())
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Installation::try_from).transpose()
    }

    async fn pin_installation(&self, device_id: &str, installation_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE installations SET pinned_by_user = 0 WHERE device_id = ?")
            .bind(device_id)
            .execute(&mut *tx)
            .await?;
        let result =
            sqlx::query("UPDATE installations SET pinned_by_user = 1 WHERE id = ? AND device_id = ?")
                .bind(installation_id.to_string())
                .bind(device_id)
                .execute(&mut *tx)
                .await?;
        // dropping the transaction rolls the cleared pins back
        expect_one(result.rows_affected())?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_installation_flags(
        &self,
        device_id: &str,
        installation_id: Uuid,
        flags: InstallationFlags,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE installations SET \
             pinned_by_user = COALESCE(?, pinned_by_user), \
             skipped_by_user = COALESCE(?, skipped_by_user) \
             WHERE id = ? AND device_id = ?",
        )
        .bind(flags.pinned_by_user)
        .bind(flags.skipped_by_user)
        .bind(installation_id.to_string())
        .bind(device_id)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected())
    }
}

fn expect_one(rows_affected: u64) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
impl SqliteDeviceStore {
    pub(crate) async fn connect_in_memory() -> Self {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        MIGRATOR.run(&pool).await.unwrap();
        Self::new(pool)
    }

    pub(crate) async fn insert_installation(
        &self,
        device_id: &str,
        app_id: &str,
        sort_order: i64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let config = InstallationConfig {
            app_id: app_id.to_string(),
            params: serde_json::json!({ "color": "red" }),
        };
        sqlx::query(
            "INSERT INTO installations (id, device_id, config, sort_order) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(device_id)
        .bind(serde_json::to_string(&config).unwrap())
        .bind(sort_order)
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub(crate) async fn list_claims(&self, device_id: &str) -> Vec<DeviceClaim> {
        let rows: Vec<ClaimRow> = sqlx::query_as(
            "SELECT device_id, user_id, claim_type FROM device_claims WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .unwrap();
        rows.into_iter().map(|row| row.try_into().unwrap()).collect()
    }

    pub(crate) async fn insert_shared_claim(&self, device_id: &str, user_id: &str) {
        sqlx::query(
            "INSERT INTO device_claims (device_id, user_id, claim_type, created_at) \
             VALUES (?, ?, 'SHARED', 0)",
        )
        .bind(device_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .unwrap();
    }
}
