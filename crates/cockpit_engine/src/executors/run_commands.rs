//! Run a command batch per device, optionally parsing the output into rows
//! with a named-capture line parser.

use super::{device_host, resolve_ssh_auth, DeviceOutcome};
use crate::templating::resolve_date_templates;
use crate::{EngineContext, EngineError};
use chrono::Utc;
use cockpit_checkmk::render_device_template;
use cockpit_model::JobTemplate;
use regex::Regex;
use serde_json::{json, Map, Value};

pub async fn run_commands_device(
    ctx: &EngineContext,
    template: &JobTemplate,
    device: &Value,
) -> Result<DeviceOutcome, EngineError> {
    let Some(host) = device_host(device) else {
        return Ok(DeviceOutcome::skipped("no primary IPv4 address"));
    };
    let commands = command_list(template)?;
    if commands.is_empty() {
        return Err(EngineError::Validation("no commands configured".into()));
    }

    let parser = template
        .config_str("parser_regex")
        .map(Regex::new)
        .transpose()
        .map_err(|err| EngineError::Validation(format!("parser_regex: {err}")))?;

    let auth = resolve_ssh_auth(ctx, template).await?;
    let connector = ctx.connectors.connect(auth);
    let today = Utc::now().date_naive();

    let mut outputs = Vec::with_capacity(commands.len());
    for command in &commands {
        let rendered = render_device_template(&resolve_date_templates(command, today), device);
        let output = connector.run_command(&host, &rendered).await?;
        let mut entry = json!({"command": rendered, "output": output});
        if let Some(parser) = &parser {
            entry["parsed"] = Value::Array(parse_rows(parser, &output));
        }
        outputs.push(entry);
    }

    Ok(DeviceOutcome::ok(json!({"outputs": outputs})))
}

fn command_list(template: &JobTemplate) -> Result<Vec<String>, EngineError> {
    match template.config.get("commands") {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()),
        Some(Value::String(block)) => Ok(block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        None => Ok(Vec::new()),
        Some(_) => Err(EngineError::Validation(
            "commands must be a list or newline-separated string".into(),
        )),
    }
}

/// Apply the parser line by line; each matching line becomes one row of
/// named captures.
fn parse_rows(parser: &Regex, output: &str) -> Vec<Value> {
    let names: Vec<&str> = parser.capture_names().flatten().collect();
    output
        .lines()
        .filter_map(|line| {
            parser.captures(line).map(|caps| {
                let mut row = Map::new();
                for name in &names {
                    if let Some(m) = caps.name(name) {
                        row.insert((*name).to_string(), Value::String(m.as_str().to_string()));
                    }
                }
                Value::Object(row)
            })
        })
        .collect()
}
