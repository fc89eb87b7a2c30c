use super::common;
use crate::fanout;
use crate::models::{FanoutMessage, InstallationFlags, MatrxSettings};
use crate::protocol::matrx::{
    DeviceConfig, DeviceConfigRequest, Schedule, ScheduleItem, ScheduleItemSetPinState,
    ScheduleItemSetSkipState,
};
use crate::protocol::matrx_message::Message;
use crate::protocol::{self, CommandResult, FactoryReset, MatrxMessage};
use crate::services::connection::Session;
use crate::services::render;
use crate::state::AppState;
use crate::store::StoreError;
use anyhow::Context;
use prost::Message as _;
use uuid::Uuid;

pub async fn handle_frame(state: &AppState, session: &Session, frame: &[u8]) -> anyhow::Result<()> {
    let device_id = session.device_id.as_str();
    let envelope = MatrxMessage::decode(frame).context("Undecodable Matrx frame")?;
    let Some(message) = envelope.message else {
        tracing::warn!(device_id, bytes = frame.len(), "ignoring Matrx frame with unknown case");
        return Ok(());
    };
    let reply = match message {
        Message::ScheduleRequest(_) => Some(Message::Schedule(schedule(state, device_id).await?)),
        Message::AppRenderRequest(request) => render::handle_app_render_request(
            state.store.as_ref(),
            state.renderer.as_ref(),
            device_id,
            &request,
        )
        .await
        .map(Message::AppRenderResponse),
        Message::ScheduleItemSetPinState(request) => Some(Message::CommandResult(
            set_pin_state(state, device_id, &request).await,
        )),
        Message::ScheduleItemSetSkipState(request) => Some(Message::CommandResult(
            set_skip_state(state, device_id, &request).await,
        )),
        Message::DeviceConfigRequest(_) => Some(device_config_message(state, device_id).await?),
        Message::DeviceConfig(config) => Some(save_device_config(state, device_id, config).await),
        Message::UploadCoreDump(dump) => {
            common::upload_core_dump(device_id, &dump);
            None
        }
        Message::ClaimDevice(request) => {
            Some(common::claim_device(state, device_id, request).await.into())
        }
        Message::CurrentlyDisplayingApp(app) => {
            currently_displaying(state, device_id, &app.uuid).await;
            None
        }
        Message::DeviceInfo(info) => Some(common::device_info(state, device_id, info).await.into()),
        Message::CertReport(report) => common::cert_report(device_id, &report).map(Into::into),
        Message::CertRenewRequest(request) => {
            Some(common::cert_renew(state, device_id, &request).await.into())
        }
        Message::CommandResult(result) => {
            tracing::debug!(device_id, success = result.success, error = %result.error, "device command result");
            None
        }
        Message::JoinResponse(_)
        | Message::Schedule(_)
        | Message::AppRenderResponse(_)
        | Message::CertRenewRequired(_)
        | Message::CertRenewResponse(_)
        | Message::FactoryReset(_) => {
            tracing::warn!(device_id, "ignoring server-only message sent by device");
            None
        }
    };
    if let Some(reply) = reply {
        session.send_matrx(reply).await;
    }
    Ok(())
}

pub async fn handle_fanout(
    state: &AppState,
    session: &Session,
    message: FanoutMessage,
) -> anyhow::Result<()> {
    let device_id = session.device_id.as_str();
    let reply = match message {
        FanoutMessage::ScheduleUpdate {} => Message::Schedule(schedule(state, device_id).await?),
        FanoutMessage::SettingsUpdate {} => {
            let settings = state
                .store
                .get_settings(device_id)
                .await
                .context("Failed to load device settings")?;
            match settings.as_ref().and_then(|it| it.matrx()) {
                Some(settings) => Message::DeviceConfig(to_device_config(settings)),
                None => {
                    tracing::warn!(device_id, "settings update without stored Matrx settings");
                    return Ok(());
                }
            }
        }
        FanoutMessage::FactoryReset { reason } => {
            tracing::info!(device_id, reason = %reason, "sending factory reset");
            Message::FactoryReset(FactoryReset { reason })
        }
        FanoutMessage::RenderResult {
            uuid,
            render_output,
        } => Message::AppRenderResponse(render::legacy_render_response(
            &uuid,
            render_output.as_deref(),
        )),
    };
    session.send_matrx(reply).await;
    Ok(())
}

async fn schedule(state: &AppState, device_id: &str) -> anyhow::Result<Schedule> {
    let installations = state
        .store
        .list_installations(device_id)
        .await
        .context("Failed to load schedule")?;
    let schedule_items = installations
        .iter()
        .map(|installation| ScheduleItem {
            uuid: protocol::uuid_to_bytes(&installation.id),
            display_time: installation.display_time,
            pinned: installation.pinned_by_user,
            skipped: installation.skipped_by_user,
        })
        .collect();
    Ok(Schedule { schedule_items })
}

/// Stored settings as a `device_config`, or a `device_config_request` when the
/// server holds none.
pub async fn device_config_message(state: &AppState, device_id: &str) -> anyhow::Result<Message> {
    let settings = state
        .store
        .get_settings(device_id)
        .await
        .context("Failed to load device settings")?;
    Ok(match settings.as_ref().and_then(|it| it.matrx()) {
        Some(settings) => Message::DeviceConfig(to_device_config(settings)),
        None => Message::DeviceConfigRequest(DeviceConfigRequest {}),
    })
}

fn to_device_config(settings: MatrxSettings) -> DeviceConfig {
    DeviceConfig {
        screen_enabled: settings.screen_enabled,
        screen_brightness: settings.screen_brightness,
        auto_brightness_enabled: settings.auto_brightness_enabled,
        screen_off_lux: settings.screen_off_lux,
    }
}

async fn save_device_config(state: &AppState, device_id: &str, config: DeviceConfig) -> Message {
    let settings = MatrxSettings {
        screen_enabled: config.screen_enabled,
        screen_brightness: config.screen_brightness,
        auto_brightness_enabled: config.auto_brightness_enabled,
        screen_off_lux: config.screen_off_lux,
    };
    let saved = match serde_json::to_value(settings) {
        Ok(value) => state
            .store
            .save_type_settings(device_id, &value)
            .await
            .map_err(anyhow::Error::from),
        Err(err) => Err(err.into()),
    };
    match saved {
        Ok(()) => {
            tracing::info!(device_id, "device config stored");
            Message::DeviceConfig(config)
        }
        Err(err) => {
            tracing::error!(device_id, "failed to store device config: {:?}", err);
            Message::CommandResult(CommandResult::failed("Failed to save device config"))
        }
    }
}

async fn set_pin_state(
    state: &AppState,
    device_id: &str,
    request: &ScheduleItemSetPinState,
) -> CommandResult {
    let Ok(installation_id) = protocol::uuid_from_bytes(&request.uuid) else {
        return CommandResult::failed("Invalid installation id");
    };
    let result = if request.pinned {
        state
            .store
            .pin_installation(device_id, installation_id)
            .await
    } else {
        let flags = InstallationFlags {
            pinned_by_user: Some(false),
            ..Default::default()
        };
        state
            .store
            .update_installation_flags(device_id, installation_id, flags)
            .await
    };
    schedule_write_result(state, device_id, installation_id, "pin", result).await
}

async fn set_skip_state(
    state: &AppState,
    device_id: &str,
    request: &ScheduleItemSetSkipState,
) -> CommandResult {
    let Ok(installation_id) = protocol::uuid_from_bytes(&request.uuid) else {
        return CommandResult::failed("Invalid installation id");
    };
    let flags = InstallationFlags {
        skipped_by_user: Some(request.skipped),
        ..Default::default()
    };
    let result = state
        .store
        .update_installation_flags(device_id, installation_id, flags)
        .await;
    schedule_write_result(state, device_id, installation_id, "skip", result).await
}

async fn schedule_write_result(
    state: &AppState,
    device_id: &str,
    installation_id: Uuid,
    operation: &str,
    result: Result<(), StoreError>,
) -> CommandResult {
    match result {
        Ok(()) => {
            tracing::info!(device_id, %installation_id, operation, "schedule item updated");
            if let Err(err) = fanout::notify_schedule_update(state.fanout.as_ref(), device_id).await
            {
                tracing::warn!(device_id, "failed to publish schedule update: {:?}", err);
            }
            CommandResult::ok()
        }
        Err(StoreError::NotFound) => CommandResult::failed("Installation not found"),
        Err(err) => {
            tracing::error!(device_id, %installation_id, operation, "schedule update failed: {}", err);
            CommandResult::failed(format!("Failed to update {operation} state"))
        }
    }
}

async fn currently_displaying(state: &AppState, device_id: &str, uuid: &[u8]) {
    let installation_id = match protocol::uuid_from_bytes(uuid) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(device_id, "bad currently displaying id: {}", err);
            return;
        }
    };
    if let Err(err) = state
        .store
        .set_currently_displaying(device_id, installation_id)
        .await
    {
        tracing::warn!(device_id, %installation_id, "failed to store currently displaying app: {}", err);
    }
}
