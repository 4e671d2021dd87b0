use crate::{NautobotClient, NautobotError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OffboardMode {
    Remove,
    SetOffboarding,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OffboardRequest {
    pub nautobot_integration_mode: OffboardMode,
    #[serde(default)]
    pub remove_primary_ip: bool,
    #[serde(default)]
    pub remove_interface_ips: bool,
    #[serde(default)]
    pub remove_from_checkmk: bool,
    /// Status applied in set-offboarding mode.
    #[serde(default)]
    pub offboarding_status: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct OffboardResult {
    pub removed_items: Vec<String>,
    pub skipped_items: Vec<String>,
    pub errors: Vec<String>,
    pub summary: String,
    /// Hostname for the caller to clean up in CheckMK when requested.
    pub checkmk_host: Option<String>,
}

impl NautobotClient {
    /// Offboard a device: collect its IPs, delete or re-status the device,
    /// and report every step. Per-item failures are collected, not fatal.
    pub async fn offboard_device(
        &self,
        device_id: &str,
        request: &OffboardRequest,
    ) -> Result<OffboardResult, NautobotError> {
        let mut result = OffboardResult::default();

        let Some(device) = self.get_device(device_id).await? else {
            result.errors.push(format!("device {device_id} not found"));
            result.summary = "device not found".into();
            return Ok(result);
        };
        let device_name = device
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(device_id)
            .to_string();

        if request.remove_primary_ip {
            match device.get("primary_ip4").and_then(|ip| ip.get("id")).and_then(Value::as_str) {
                Some(ip_id) => match self.delete_ip_address(ip_id).await {
                    Ok(()) => result.removed_items.push(format!("primary_ip4 {ip_id}")),
                    Err(err) => result.errors.push(format!("primary ip: {err}")),
                },
                None => result.skipped_items.push("primary_ip4 (none set)".into()),
            }
        }

        if request.remove_interface_ips {
            match self.interface_ip_ids(device_id).await {
                Ok(ids) if ids.is_empty() => {
                    result.skipped_items.push("interface ips (none found)".into())
                }
                Ok(ids) => {
                    for ip_id in ids {
                        match self.delete_ip_address(&ip_id).await {
                            Ok(()) => result.removed_items.push(format!("interface ip {ip_id}")),
                            Err(err) => result.errors.push(format!("interface ip {ip_id}: {err}")),
                        }
                    }
                }
                Err(err) => result.errors.push(format!("interface ip lookup: {err}")),
            }
        }

        match request.nautobot_integration_mode {
            OffboardMode::Remove => match self.delete_device(device_id).await {
                Ok(()) => result.removed_items.push(format!("device {device_name}")),
                Err(err) => result.errors.push(format!("device delete: {err}")),
            },
            OffboardMode::SetOffboarding => {
                let status = request
                    .offboarding_status
                    .as_deref()
                    .unwrap_or("Offboarding");
                match self.resolve_status(status, "dcim.device").await {
                    Some(status_id) => {
                        match self
                            .rest_patch(
                                &format!("/api/dcim/devices/{device_id}/"),
                                &json!({"status": status_id}),
                            )
                            .await
                        {
                            Ok(_) => result
                                .removed_items
                                .push(format!("device {device_name} -> status {status}")),
                            Err(err) => result.errors.push(format!("status update: {err}")),
                        }
                    }
                    None => result
                        .errors
                        .push(format!("status '{status}' does not resolve")),
                }
            }
        }

        if request.remove_from_checkmk {
            result.checkmk_host = Some(device_name.clone());
        }

        result.summary = format!(
            "{}: {} removed, {} skipped, {} errors",
            device_name,
            result.removed_items.len(),
            result.skipped_items.len(),
            result.errors.len()
        );
        info!(device = %device_name, "{}", result.summary);
        Ok(result)
    }

    async fn interface_ip_ids(&self, device_id: &str) -> Result<Vec<String>, NautobotError> {
        let body = self
            .rest_get(&format!(
                "/api/ipam/ip-addresses/?device_id={device_id}&depth=0"
            ))
            .await?;
        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|ip| ip.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cockpit_model::NautobotSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn remove_mode_deletes_device_and_primary_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dcim/devices/dev-1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "dev-1",
                "name": "edge-r1",
                "primary_ip4": {"id": "ip-9"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/ipam/ip-addresses/ip-9/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/dcim/devices/dev-1/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = NautobotClient::new(&NautobotSettings {
            url: server.uri(),
            token: "t".into(),
            verify_ssl: true,
            timeout_secs: Some(5),
        })
        .unwrap();

        let result = client
            .offboard_device(
                "dev-1",
                &OffboardRequest {
                    nautobot_integration_mode: OffboardMode::Remove,
                    remove_primary_ip: true,
                    remove_interface_ips: false,
                    remove_from_checkmk: true,
                    offboarding_status: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.removed_items.len(), 2);
        assert!(result.errors.is_empty());
        assert_eq!(result.checkmk_host.as_deref(), Some("edge-r1"));
        assert!(result.summary.contains("2 removed"));
    }
}
