//! Handlers shared by Matrx and Lantern.

use crate::models::DeviceInfo;
use crate::protocol::{
    CertRenewRequest, CertReport, ClaimDevice, CommandResult, CommonReply, UploadCoreDump,
};
use crate::services::{claim, pki};
use crate::state::AppState;

pub async fn claim_device(state: &AppState, device_id: &str, request: ClaimDevice) -> CommonReply {
    let join =
        claim::claim_device(state.store.as_ref(), &state.claims, device_id, &request.claim_token)
            .await;
    CommonReply::JoinResponse(join)
}

pub async fn device_info(
    state: &AppState,
    device_id: &str,
    info: crate::protocol::DeviceInfo,
) -> CommonReply {
    let info = DeviceInfo {
        width: info.width,
        height: info.height,
        has_light_sensor: info.has_light_sensor,
    };
    let result = match state.store.update_device_info(device_id, info).await {
        Ok(()) => {
            tracing::info!(
                device_id,
                width = info.width,
                height = info.height,
                has_light_sensor = info.has_light_sensor,
                "device info updated"
            );
            CommandResult::ok()
        }
        Err(err) => {
            tracing::error!(device_id, "failed to store device info: {}", err);
            CommandResult::failed("Failed to save device info")
        }
    };
    CommonReply::CommandResult(result)
}

pub fn upload_core_dump(device_id: &str, dump: &UploadCoreDump) {
    tracing::warn!(
        device_id,
        firmware_project = %dump.firmware_project,
        firmware_version = %dump.firmware_version,
        firmware_variant = %dump.firmware_variant,
        core_dump_bytes = dump.core_dump.len(),
        "device uploaded a core dump"
    );
}

pub fn cert_report(device_id: &str, report: &CertReport) -> Option<CommonReply> {
    pki::handle_cert_report(device_id, &report.current_cert).map(CommonReply::CertRenewRequired)
}

pub async fn cert_renew(state: &AppState, device_id: &str, request: &CertRenewRequest) -> CommonReply {
    CommonReply::CertRenewResponse(
        pki::handle_cert_renew(state.signer.as_ref(), device_id, &request.csr).await,
    )
}
