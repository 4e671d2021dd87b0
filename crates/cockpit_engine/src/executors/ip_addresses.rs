//! Maintain IP-Addresses: list, mark, or remove Nautobot IPs selected by a
//! field filter with date templates resolved at execution time.

use crate::templating::resolve_date_templates;
use crate::{EngineContext, EngineError};
use chrono::Utc;
use cockpit_model::{JobRun, JobTemplate};
use cockpit_nautobot::{IpFilter, IpFilterOp};
use serde_json::{json, Value};
use tracing::info;

pub async fn execute(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    let action = template.config_str("ip_action").unwrap_or("list");
    let filter = build_filter(template)?;
    info!(run_id = %run.id, action, filter = filter.query_param().as_str(), "ip maintenance");

    let ip_addresses = ctx.nautobot.list_ip_addresses(&filter).await?;

    match action {
        "list" => Ok(json!({
            "action": "list",
            "filter": filter.query_param(),
            "include_null": filter.include_null,
            "ip_addresses": ip_addresses,
            "total": ip_addresses.len(),
        })),
        "mark" => mark(ctx, run, template, &filter, &ip_addresses).await,
        "remove" => remove(ctx, run, template, &filter, &ip_addresses).await,
        other => Err(EngineError::Validation(format!(
            "unknown ip_action '{other}'"
        ))),
    }
}

fn build_filter(template: &JobTemplate) -> Result<IpFilter, EngineError> {
    let field = template
        .config_str("ip_filter_field")
        .filter(|f| !f.is_empty())
        .ok_or_else(|| EngineError::Validation("ip_filter_field not configured".into()))?;
    let raw_value = template
        .config_str("ip_filter_value")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EngineError::Validation("ip_filter_value not configured".into()))?;
    let op = IpFilterOp::parse(template.config_str("ip_filter_type")).ok_or_else(|| {
        EngineError::Validation(format!(
            "unknown ip_filter_type '{}'",
            template.config_str("ip_filter_type").unwrap_or_default()
        ))
    })?;

    // {today-N} resolves now, at task execution, not when the schedule was
    // authored.
    let value = resolve_date_templates(raw_value, Utc::now().date_naive());

    Ok(IpFilter {
        field: field.to_string(),
        op,
        value,
        include_null: template.config_bool("ip_include_null").unwrap_or(false),
    })
}

async fn mark(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
    filter: &IpFilter,
    ip_addresses: &[Value],
) -> Result<Value, EngineError> {
    let status_id = match template.config_str("ip_mark_status") {
        Some(name) => ctx.nautobot.resolve_status(name, "ipam.ipaddress").await,
        None => None,
    };
    let tag_id = match template.config_str("ip_mark_tag") {
        Some(name) => ctx.nautobot.resolve_tag(name, "ipam.ipaddress").await,
        None => None,
    };
    let description = template.config_str("ip_mark_description");

    let mut body = serde_json::Map::new();
    if let Some(status_id) = &status_id {
        body.insert("status".into(), json!(status_id));
    }
    if let Some(tag_id) = &tag_id {
        body.insert("tags".into(), json!([tag_id]));
    }
    if let Some(description) = description {
        body.insert(
            "description".into(),
            json!(resolve_date_templates(description, Utc::now().date_naive())),
        );
    }
    if body.is_empty() {
        return Err(EngineError::Validation(
            "mark action needs at least one of status, tag, description".into(),
        ));
    }
    let body = Value::Object(body);

    let mut marked = 0u32;
    let mut failed_ips: Vec<Value> = Vec::new();
    for ip in ip_addresses {
        if ctx.results.is_cancelled(run.id).await? {
            break;
        }
        let Some(id) = ip.get("id").and_then(Value::as_str) else {
            failed_ips.push(json!({"address": ip.get("address"), "reason": "missing id"}));
            continue;
        };
        match ctx.nautobot.update_ip_address(id, &body).await {
            Ok(()) => marked += 1,
            Err(err) => failed_ips.push(json!({"address": ip.get("address"), "reason": err.to_string()})),
        }
    }

    Ok(json!({
        "action": "mark",
        "filter": filter.query_param(),
        "total": ip_addresses.len(),
        "marked": marked,
        "failed": failed_ips.len(),
        "failed_ips": failed_ips,
    }))
}

async fn remove(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
    filter: &IpFilter,
    ip_addresses: &[Value],
) -> Result<Value, EngineError> {
    let skip_assigned = template
        .config_bool("ip_remove_skip_assigned")
        .unwrap_or(true);

    let mut deleted = 0u32;
    let mut failed = 0u32;
    let mut deleted_ips: Vec<Value> = Vec::new();
    let mut skipped_ips: Vec<Value> = Vec::new();
    let mut failed_ips: Vec<Value> = Vec::new();

    for ip in ip_addresses {
        if ctx.results.is_cancelled(run.id).await? {
            break;
        }
        let address = ip.get("address").cloned().unwrap_or(Value::Null);
        let Some(id) = ip.get("id").and_then(Value::as_str) else {
            failed += 1;
            failed_ips.push(json!({"address": address, "reason": "missing id"}));
            continue;
        };

        if skip_assigned {
            let assignments = ip
                .get("interface_assignments")
                .and_then(Value::as_array)
                .map(|a| a.len())
                .unwrap_or(0);
            if assignments > 0 {
                skipped_ips.push(json!({
                    "address": address,
                    "id": id,
                    "interface_assignments": assignments,
                }));
                continue;
            }
        }

        match ctx.nautobot.delete_ip_address(id).await {
            Ok(()) => {
                deleted += 1;
                deleted_ips.push(json!({"address": address, "id": id}));
            }
            Err(err) => {
                failed += 1;
                failed_ips.push(json!({"address": address, "id": id, "reason": err.to_string()}));
            }
        }
    }

    Ok(json!({
        "action": "remove",
        "filter": filter.query_param(),
        "total": ip_addresses.len(),
        "deleted": deleted,
        "failed": failed,
        "skipped": skipped_ips.len(),
        "deleted_ips": deleted_ips,
        "skipped_ips": skipped_ips,
        "failed_ips": failed_ips,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cockpit_model::{InventorySource, JobType};

    fn template(config: Value) -> JobTemplate {
        JobTemplate {
            id: 1,
            name: "maintain".into(),
            job_type: JobType::IpAddresses,
            inventory_source: InventorySource::All,
            inventory_name: None,
            credential_id: None,
            is_global: true,
            no_overlap: false,
            config,
            created_by: "admin".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn filter_resolves_date_template_and_operator() {
        let template = template(json!({
            "ip_filter_field": "cf_last_scan",
            "ip_filter_type": "lte",
            "ip_filter_value": "{today-14}",
            "ip_include_null": false,
        }));
        let filter = build_filter(&template).unwrap();
        let expected = (Utc::now().date_naive() - chrono::Duration::days(14))
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(filter.query_param(), format!("cf_last_scan__lte={expected}"));
        assert!(!filter.include_null);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let template = template(json!({
            "ip_filter_field": "status",
            "ip_filter_type": "between",
            "ip_filter_value": "x",
        }));
        assert!(matches!(
            build_filter(&template),
            Err(EngineError::Validation(_))
        ));
    }
}
