//! Nautobot device -> CheckMK host-config normalisation and the structural
//! comparison behind the reconciliation engine.

use crate::{normalize_folder_path, CheckMkError};
use cockpit_model::{CheckMkSettings, ComparisonOutcome, NormalizedHost, SnmpCommunity};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// SNMP mapping file: custom-field value -> community definition.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SnmpMapping {
    #[serde(flatten)]
    entries: std::collections::HashMap<String, SnmpCommunity>,
}

impl SnmpMapping {
    pub fn load(path: &Path) -> Result<Self, CheckMkError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| CheckMkError::Normalize(format!("snmp mapping: {err}")))?;
        serde_yaml::from_str(&raw)
            .map_err(|err| CheckMkError::Normalize(format!("snmp mapping: {err}")))
    }

    pub fn lookup(&self, key: &str) -> Option<&SnmpCommunity> {
        self.entries.get(key)
    }
}

/// `{field}` / `{field.subfield}` / `{_custom_field_data.key}` rendering
/// against a device JSON object. Unresolvable variables render empty; a
/// dict value with a `name` collapses to it.
pub fn render_device_template(template: &str, device: &Value) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        match rest[start..].find('}') {
            Some(end_offset) => {
                let var = &rest[start + 1..start + end_offset];
                output.push_str(&lookup_as_string(device, var));
                rest = &rest[start + end_offset + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

fn lookup_as_string(device: &Value, path: &str) -> String {
    let mut current = device;
    for part in path.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Build the desired CheckMK host state for one device.
pub fn normalize_device(
    device: &Value,
    settings: &CheckMkSettings,
    snmp_mapping: Option<&SnmpMapping>,
) -> Result<NormalizedHost, CheckMkError> {
    let hostname = device
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CheckMkError::Normalize("device has no name".into()))?
        .to_string();

    let folder_template = if settings.folder_template.is_empty() {
        "/"
    } else {
        &settings.folder_template
    };
    let folder = normalize_folder_path(&render_device_template(folder_template, device));

    let mut attributes = Map::new();
    attributes.insert("site".into(), Value::String(settings.site.clone()));

    let ip = device
        .get("primary_ip4")
        .and_then(|ip| ip.get("address"))
        .and_then(Value::as_str)
        .map(|address| address.split('/').next().unwrap_or(address).to_string())
        .ok_or_else(|| CheckMkError::Normalize(format!("{hostname}: no primary IPv4")))?;
    attributes.insert("ipaddress".into(), Value::String(ip));
    attributes.insert("alias".into(), Value::String(hostname.clone()));

    if let Some(location) = device
        .get("location")
        .and_then(|l| l.get("name"))
        .and_then(Value::as_str)
    {
        attributes.insert("tag_location".into(), Value::String(location.to_string()));
    }

    if let (Some(mapping), Some(field)) = (snmp_mapping, settings.snmp_custom_field.as_deref()) {
        let key = device
            .get("_custom_field_data")
            .and_then(|cf| cf.get(field))
            .and_then(Value::as_str);
        if let Some(community) = key.and_then(|key| mapping.lookup(key)) {
            attributes.insert(
                "snmp_community".into(),
                serde_json::to_value(community).map_err(CheckMkError::Decode)?,
            );
        }
    }

    Ok(NormalizedHost {
        hostname,
        folder,
        attributes,
    })
}

/// Structural comparison of desired vs observed host state. Folders compare
/// exactly; attributes compare by deep equality over the union of keys,
/// excluding `meta_data` and the configured ignore list. SNMP community
/// objects compare as whole values.
pub fn compare_host(
    desired: &NormalizedHost,
    actual_folder: &str,
    actual_attributes: &Map<String, Value>,
    ignore_attributes: &[String],
) -> (ComparisonOutcome, Vec<String>) {
    let mut differences = Vec::new();

    if normalize_folder_path(&desired.folder) != normalize_folder_path(actual_folder) {
        differences.push(format!(
            "folder: '{}' != '{}'",
            desired.folder, actual_folder
        ));
    }

    let ignored = |key: &str| key == "meta_data" || ignore_attributes.iter().any(|i| i == key);
    let keys: BTreeSet<&String> = desired
        .attributes
        .keys()
        .chain(actual_attributes.keys())
        .collect();

    for key in keys {
        if ignored(key) {
            continue;
        }
        match (desired.attributes.get(key), actual_attributes.get(key)) {
            (Some(want), Some(have)) if want == have => {}
            (Some(want), Some(have)) => {
                differences.push(format!("{key}: {want} != {have}"));
            }
            (Some(want), None) => differences.push(format!("{key}: {want} missing on host")),
            (None, Some(have)) => differences.push(format!("{key}: {have} only on host")),
            (None, None) => {}
        }
    }

    if differences.is_empty() {
        (ComparisonOutcome::Equal, differences)
    } else {
        (ComparisonOutcome::Diff, differences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device() -> Value {
        json!({
            "name": "LAB",
            "primary_ip4": {"address": "192.0.2.10/24"},
            "location": {"name": "Berlin", "parent": {"name": "network"}},
            "_custom_field_data": {"net": "prod", "snmp_profile": "campus"}
        })
    }

    fn settings() -> CheckMkSettings {
        CheckMkSettings {
            url: "https://cmk.example.net".into(),
            site: "main".into(),
            folder_template: "/{location.parent.name}/{location.name}".into(),
            ..Default::default()
        }
    }

    #[test]
    fn template_rendering_handles_nesting_and_custom_fields() {
        let device = device();
        assert_eq!(
            render_device_template("/{location.parent.name}/{location.name}", &device),
            "/network/Berlin"
        );
        assert_eq!(
            render_device_template("configs/{_custom_field_data.net}/{name}.cfg", &device),
            "configs/prod/LAB.cfg"
        );
        assert_eq!(render_device_template("{missing.var}", &device), "");
        // A dict without the requested subfield collapses to its name.
        assert_eq!(render_device_template("{location}", &device), "Berlin");
    }

    #[test]
    fn normalisation_builds_folder_and_attributes() {
        let host = normalize_device(&device(), &settings(), None).unwrap();
        assert_eq!(host.hostname, "LAB");
        assert_eq!(host.folder, "/network/Berlin");
        assert_eq!(host.attributes["ipaddress"], "192.0.2.10");
        assert_eq!(host.attributes["site"], "main");
        assert_eq!(host.attributes["alias"], "LAB");
        assert_eq!(host.attributes["tag_location"], "Berlin");
    }

    #[test]
    fn device_without_primary_ip_fails_normalisation() {
        let device = json!({"name": "LAB"});
        assert!(matches!(
            normalize_device(&device, &settings(), None),
            Err(CheckMkError::Normalize(_))
        ));
    }

    #[test]
    fn snmp_mapping_attaches_tagged_union() {
        let yaml = "campus:\n  type: v1_v2_community\n  community: campus-ro\n";
        let mapping: SnmpMapping = serde_yaml::from_str(yaml).unwrap();
        let mut settings = settings();
        settings.snmp_custom_field = Some("snmp_profile".into());

        let host = normalize_device(&device(), &settings, Some(&mapping)).unwrap();
        assert_eq!(host.attributes["snmp_community"]["type"], "v1_v2_community");
        assert_eq!(host.attributes["snmp_community"]["community"], "campus-ro");
    }

    #[test]
    fn equal_hosts_compare_equal_ignoring_meta_data() {
        let desired = normalize_device(&device(), &settings(), None).unwrap();
        let mut actual = desired.attributes.clone();
        actual.insert("meta_data".into(), json!({"created_by": "checkmk"}));

        let (outcome, differences) =
            compare_host(&desired, "/network/Berlin", &actual, &[]);
        assert_eq!(outcome, ComparisonOutcome::Equal);
        assert!(differences.is_empty());
    }

    #[test]
    fn attribute_and_folder_differences_are_reported() {
        let desired = normalize_device(&device(), &settings(), None).unwrap();
        let mut actual = desired.attributes.clone();
        actual.insert("ipaddress".into(), json!("192.0.2.99"));

        let (outcome, differences) = compare_host(&desired, "/network/Hamburg", &actual, &[]);
        assert_eq!(outcome, ComparisonOutcome::Diff);
        assert_eq!(differences.len(), 2);

        // Ignored attribute suppresses its difference.
        let (outcome, _) = compare_host(
            &desired,
            "/network/Berlin",
            &actual,
            &["ipaddress".to_string()],
        );
        assert_eq!(outcome, ComparisonOutcome::Equal);
    }

    #[test]
    fn snmp_union_compares_as_whole_value() {
        let mut desired = normalize_device(&device(), &settings(), None).unwrap();
        desired.attributes.insert(
            "snmp_community".into(),
            json!({"type": "v1_v2_community", "community": "public"}),
        );
        let mut actual = desired.attributes.clone();
        actual.insert(
            "snmp_community".into(),
            json!({"type": "v1_v2_community", "community": "private"}),
        );

        let (outcome, differences) = compare_host(&desired, "/network/Berlin", &actual, &[]);
        assert_eq!(outcome, ComparisonOutcome::Diff);
        assert!(differences[0].contains("snmp_community"));
    }
}
