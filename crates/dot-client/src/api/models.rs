//! Dot API request and response models.

use serde::{Deserialize, Serialize};

/// Standard acknowledgement body of the Dot cloud API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DotApiResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl DotApiResponse {
    /// Parse an acknowledgement, keeping a non-JSON body as the message.
    pub(crate) fn from_body(body: &str) -> Self {
        if body.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            message: body.to_string(),
            ..Self::default()
        })
    }
}

/// Entry of `GET /devices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub edition: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusInfo {
    pub version: Option<String>,
    pub current: Option<String>,
    pub description: Option<String>,
    pub battery: Option<String>,
    pub wifi: Option<String>,
}

/// Response of `GET /device/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_id: String,
    pub alias: Option<String>,
    pub location: Option<String>,
    pub status: Option<DeviceStatusInfo>,
    /// Passed through untouched; its shape varies by firmware.
    pub render_info: Option<serde_json::Value>,
}

/// Entry of `GET /device/{id}/{taskType}/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTask {
    #[serde(rename = "type")]
    pub task_type: String,
    pub key: Option<String>,
    pub refresh_now: Option<bool>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub signature: Option<String>,
    pub icon: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub border: Option<i64>,
    pub dither_type: Option<String>,
    pub dither_kernel: Option<String>,
}

/// Snapshot of one device: identity plus last reported status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub alias: Option<String>,
    pub series: String,
    pub model: String,
    /// `None` when the device did not report a recognizable state.
    pub online: Option<bool>,
    pub battery: Option<String>,
    pub wifi: Option<String>,
    pub firmware: Option<String>,
}

impl Device {
    pub(crate) fn from_parts(info: DeviceInfo, status: Option<DeviceStatus>) -> Self {
        let (alias, details) = match status {
            Some(s) => (s.alias, s.status.unwrap_or_default()),
            None => (None, DeviceStatusInfo::default()),
        };
        let online = details
            .current
            .as_deref()
            .and_then(|state| match state.trim().to_ascii_lowercase().as_str() {
                "online" => Some(true),
                "offline" => Some(false),
                _ => None,
            });

        Self {
            id: info.id,
            alias,
            series: info.series,
            model: info.model,
            online,
            battery: details.battery,
            wifi: details.wifi,
            firmware: details.version,
        }
    }
}

/// Body of `POST /device/{id}/text`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TextPayload<'a> {
    pub refresh_now: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_key: Option<&'a str>,
}

/// Body of `POST /device/{id}/image`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImagePayload<'a> {
    pub refresh_now: bool,
    /// Base64 PNG.
    pub image: String,
    pub border: u8,
    pub dither_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_key: Option<&'a str>,
}
