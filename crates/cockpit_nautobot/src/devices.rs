use crate::{NautobotClient, NautobotError};
use serde_json::{json, Value};

/// Device projection used by inventory evaluation, executors and the
/// reconciliation engine. Fetched once per run.
pub const DEVICE_LIST_QUERY: &str = "\
query {
  devices {
    id
    name
    primary_ip4 { address }
    platform { id name network_driver }
    location { id name parent { name } }
    role { id name }
    status { id name }
    device_type { model }
    tags { name }
    _custom_field_data
  }
}";

impl NautobotClient {
    /// Every device Nautobot knows about, as raw JSON objects.
    pub async fn list_devices(&self) -> Result<Vec<Value>, NautobotError> {
        let data = self.graphql(DEVICE_LIST_QUERY, Value::Null).await?;
        Ok(data
            .get("devices")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn get_device(&self, id: &str) -> Result<Option<Value>, NautobotError> {
        match self.rest_get(&format!("/api/dcim/devices/{id}/")).await {
            Ok(device) => Ok(Some(device)),
            Err(NautobotError::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Write one custom field on a device, e.g. the last-backup timestamp.
    pub async fn set_device_custom_field(
        &self,
        device_id: &str,
        field: &str,
        value: &Value,
    ) -> Result<(), NautobotError> {
        self.rest_patch(
            &format!("/api/dcim/devices/{device_id}/"),
            &json!({"custom_fields": {field: value}}),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_device(&self, device_id: &str) -> Result<(), NautobotError> {
        self.rest_delete(&format!("/api/dcim/devices/{device_id}/"))
            .await
    }
}

/// Dotted-path field access over a device JSON object, with
/// `_custom_field_data.<key>` handled like any other path segment. A dict
/// step that holds an object with a `name` falls through to it, matching
/// how folder templates address nested entities.
pub fn device_field<'a>(device: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = device;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Value {
        json!({
            "name": "edge-r1",
            "location": {"name": "Berlin", "parent": {"name": "site"}},
            "_custom_field_data": {"net": "prod", "last_backup": null}
        })
    }

    #[test]
    fn dotted_paths_resolve() {
        let device = device();
        assert_eq!(device_field(&device, "name"), Some(&json!("edge-r1")));
        assert_eq!(
            device_field(&device, "location.parent.name"),
            Some(&json!("site"))
        );
        assert_eq!(
            device_field(&device, "_custom_field_data.net"),
            Some(&json!("prod"))
        );
    }

    #[test]
    fn missing_paths_are_none() {
        let device = device();
        assert_eq!(device_field(&device, "platform.name"), None);
        assert_eq!(device_field(&device, "location.missing"), None);
    }
}
