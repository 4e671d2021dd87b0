//! Prefix scan: enumerate the addresses of each selected prefix, probe
//! reachability, and write the outcome back to Nautobot.

use super::ping::{ping_address, resolve_hostname, PingOptions};
use crate::conditions;
use crate::{EngineContext, EngineError};
use cockpit_model::{InventorySource, JobRun, JobTemplate};
use serde_json::{json, Value};
use std::net::Ipv4Addr;
use tracing::{info, warn};

/// Prefixes larger than this host count are skipped rather than scanned.
const MAX_HOSTS_PER_PREFIX: u32 = 1024;

pub async fn execute(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Value, EngineError> {
    // Dispatch validated presence; read the policy flag here.
    let set_reachable_active = template
        .config_bool("set_reachable_active")
        .ok_or_else(|| EngineError::Validation("set_reachable_active unset".into()))?;
    let ping_options: PingOptions = template
        .config
        .get("ping")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| EngineError::Validation(format!("ping options: {err}")))?
        .unwrap_or_default();
    let resolve_dns = template.config_bool("resolve_dns").unwrap_or(false);
    let reachable_custom_field = template.config_str("reachable_custom_field");
    let summary_custom_field = template.config_str("summary_custom_field");

    let prefixes = selected_prefixes(ctx, run, template).await?;
    let active_status = if set_reachable_active {
        ctx.nautobot.resolve_status("Active", "ipam.ipaddress").await
    } else {
        None
    };

    let mut scanned = 0u32;
    let mut reachable = 0u32;
    let mut updated = 0u32;
    let mut skipped_prefixes: Vec<String> = Vec::new();

    for prefix in &prefixes {
        if ctx.results.is_cancelled(run.id).await? {
            info!(run_id = %run.id, "scan cancelled between prefixes");
            break;
        }
        let Some(cidr) = prefix.get("prefix").and_then(Value::as_str) else {
            continue;
        };
        let Some(addresses) = enumerate_hosts(cidr) else {
            warn!(prefix = cidr, "prefix skipped (unparseable or too large)");
            skipped_prefixes.push(cidr.to_string());
            continue;
        };

        // Existing IP records in this prefix, keyed by bare address.
        let known = ctx
            .nautobot
            .list_ip_addresses(&cockpit_nautobot::IpFilter {
                field: "parent".into(),
                op: cockpit_nautobot::IpFilterOp::Eq,
                value: cidr.to_string(),
                include_null: false,
            })
            .await?;

        let mut prefix_reachable = 0u32;
        for address in addresses {
            scanned += 1;
            let address = address.to_string();
            if !ping_address(&address, &ping_options).await {
                continue;
            }
            reachable += 1;
            prefix_reachable += 1;

            let hostname = if resolve_dns {
                resolve_hostname(&address).await
            } else {
                None
            };

            let Some(record) = known.iter().find(|ip| {
                ip.get("address")
                    .and_then(Value::as_str)
                    .map(|a| a.split('/').next().unwrap_or(a) == address)
                    .unwrap_or(false)
            }) else {
                continue;
            };
            let Some(ip_id) = record.get("id").and_then(Value::as_str) else {
                continue;
            };

            let mut body = serde_json::Map::new();
            if let Some(status_id) = active_status.as_deref() {
                body.insert("status".into(), json!(status_id));
            }
            if let Some(field) = reachable_custom_field {
                let value = hostname
                    .clone()
                    .map(Value::String)
                    .unwrap_or_else(|| json!(true));
                body.insert("custom_fields".into(), json!({field: value}));
            }
            if !body.is_empty() {
                match ctx
                    .nautobot
                    .update_ip_address(ip_id, &Value::Object(body))
                    .await
                {
                    Ok(()) => updated += 1,
                    Err(err) => warn!(address = address.as_str(), "ip update failed: {err}"),
                }
            }
        }

        if let (Some(field), Some(prefix_id)) =
            (summary_custom_field, prefix.get("id").and_then(Value::as_str))
        {
            let summary = json!(format!("{prefix_reachable} reachable"));
            if let Err(err) = ctx
                .nautobot
                .set_prefix_custom_field(prefix_id, field, &summary)
                .await
            {
                warn!(prefix = cidr, "summary custom field update failed: {err}");
            }
        }
    }

    Ok(json!({
        "prefixes": prefixes.len(),
        "scanned": scanned,
        "reachable": reachable,
        "updated": updated,
        "skipped_prefixes": skipped_prefixes,
    }))
}

async fn selected_prefixes(
    ctx: &EngineContext,
    run: &JobRun,
    template: &JobTemplate,
) -> Result<Vec<Value>, EngineError> {
    let all = ctx.nautobot.list_prefixes().await?;
    match template.inventory_source {
        InventorySource::All => Ok(all),
        InventorySource::Inventory => {
            let name = template
                .inventory_name
                .as_deref()
                .ok_or_else(|| EngineError::Validation("inventory name not set".into()))?;
            let inventory = ctx
                .store
                .inventories()
                .resolve(name, &run.started_by)
                .await?
                .ok_or(EngineError::NotFound("inventory"))?;
            Ok(conditions::filter_devices(&inventory.conditions, &all)
                .into_iter()
                .cloned()
                .collect())
        }
    }
}

/// Host addresses of an IPv4 CIDR, excluding network and broadcast for
/// prefixes shorter than /31. None for unparseable input or prefixes whose
/// host count exceeds the scan cap.
fn enumerate_hosts(cidr: &str) -> Option<Vec<Ipv4Addr>> {
    let (base, len) = cidr.split_once('/')?;
    let base: Ipv4Addr = base.parse().ok()?;
    let len: u32 = len.parse().ok()?;
    if len > 32 {
        return None;
    }
    let host_bits = 32 - len;
    let total: u64 = 1u64 << host_bits;
    if total > MAX_HOSTS_PER_PREFIX as u64 {
        return None;
    }

    let network = u32::from(base) & (u32::MAX.checked_shl(host_bits).unwrap_or(0));
    let range: Vec<u32> = match host_bits {
        0 => vec![network],
        1 => vec![network, network + 1],
        _ => ((network + 1)..(network + total as u32 - 1)).collect(),
    };
    Some(range.into_iter().map(Ipv4Addr::from).collect())
}
