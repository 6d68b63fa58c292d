use reqwest::Method;

use super::models::{Device, DeviceInfo, DeviceStatus, DeviceTask, DotApiResponse};
use super::*;

impl DotClient {
    /// Fetch every device with its current status and refresh the cache.
    ///
    /// Always goes to the network. A device whose status call fails with an
    /// API error is still listed, with unknown status.
    pub async fn list_devices(&self) -> Result<Vec<Device>, DotError> {
        let body = self.authorized(Method::GET, &["devices"], None).await?;
        let infos: Vec<DeviceInfo> = serde_json::from_str(&body)?;

        let mut devices = Vec::with_capacity(infos.len());
        for info in infos {
            let status = match self.device_status(&info.id).await {
                Ok(status) => Some(status),
                Err(e @ (DotError::Api { .. } | DotError::DeviceNotFound(_))) => {
                    tracing::warn!(device_id = %info.id, error = %e, "Status unavailable");
                    None
                }
                Err(e) => return Err(e),
            };
            devices.push(Device::from_parts(info, status));
        }

        self.cache.store(devices.clone(), self.clock.now());
        tracing::info!(count = devices.len(), "Device list refreshed");
        Ok(devices)
    }

    pub async fn device_status(&self, device_id: &str) -> Result<DeviceStatus, DotError> {
        let body = self
            .authorized(Method::GET, &["device", device_id, "status"], None)
            .await
            .map_err(|e| not_found_as(e, device_id))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Advance the device to its next content page.
    pub async fn switch_next(&self, device_id: &str) -> Result<DotApiResponse, DotError> {
        let body = self
            .authorized(Method::POST, &["device", device_id, "next"], None)
            .await
            .map_err(|e| not_found_as(e, device_id))?;
        Ok(DotApiResponse::from_body(&body))
    }

    /// Tasks of one type (e.g. `loop`) configured on a device.
    pub async fn list_tasks(
        &self,
        device_id: &str,
        task_type: &str,
    ) -> Result<Vec<DeviceTask>, DotError> {
        let body = self
            .authorized(Method::GET, &["device", device_id, task_type, "list"], None)
            .await
            .map_err(|e| not_found_as(e, device_id))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Succeed when `device_id` is in a fresh device list.
    ///
    /// A missing, stale, or non-matching cache triggers one refresh before
    /// the device is declared unknown.
    pub(super) async fn ensure_known_device(&self, device_id: &str) -> Result<(), DotError> {
        if let Some(cached) = self.cache.fresh(self.clock.now()) {
            if cached.contains(device_id) {
                return Ok(());
            }
        }

        tracing::debug!(device_id, "Device not in a fresh cache, refreshing list");
        let devices = self.list_devices().await?;
        if devices.iter().any(|d| d.id == device_id) {
            Ok(())
        } else {
            Err(DotError::DeviceNotFound(device_id.to_string()))
        }
    }
}

fn not_found_as(e: DotError, device_id: &str) -> DotError {
    match e {
        DotError::Api { status: 404, .. } => DotError::DeviceNotFound(device_id.to_string()),
        other => other,
    }
}
