//! Inventory condition evaluation: a pure function from a condition tree
//! and a device record to a boolean.

use cockpit_model::{ConditionNode, ConditionOperator, GroupLogic};
use cockpit_nautobot::device_field;
use serde_json::Value;
use tracing::warn;

/// Short-circuited evaluation. AND over an empty item list is true, OR over
/// an empty list is false, NOT inverts its single child.
pub fn evaluate(node: &ConditionNode, device: &Value) -> bool {
    match node {
        ConditionNode::Group { logic, items } => match logic {
            GroupLogic::And => items.iter().all(|item| evaluate(item, device)),
            GroupLogic::Or => items.iter().any(|item| evaluate(item, device)),
        },
        ConditionNode::Not { item } => !evaluate(item, device),
        ConditionNode::Leaf {
            field,
            operator,
            value,
        } => evaluate_leaf(field, *operator, value, device),
    }
}

pub fn filter_devices<'a>(tree: &ConditionNode, devices: &'a [Value]) -> Vec<&'a Value> {
    devices
        .iter()
        .filter(|device| evaluate(tree, device))
        .collect()
}

fn evaluate_leaf(field: &str, operator: ConditionOperator, value: &Value, device: &Value) -> bool {
    let actual = device_field(device, field);
    match operator {
        ConditionOperator::Equals => actual.map(|a| loose_eq(a, value)).unwrap_or(false),
        ConditionOperator::NotEquals => !actual.map(|a| loose_eq(a, value)).unwrap_or(false),
        ConditionOperator::Contains => match (actual, value.as_str()) {
            (Some(Value::String(haystack)), Some(needle)) => haystack.contains(needle),
            (Some(Value::Array(items)), _) => items.iter().any(|item| loose_eq(item, value)),
            _ => false,
        },
        ConditionOperator::StartsWith => match (actual.and_then(Value::as_str), value.as_str()) {
            (Some(haystack), Some(prefix)) => haystack.starts_with(prefix),
            _ => false,
        },
        ConditionOperator::Regex => match (actual.and_then(Value::as_str), value.as_str()) {
            (Some(haystack), Some(pattern)) => match regex::Regex::new(pattern) {
                Ok(re) => re.is_match(haystack),
                Err(err) => {
                    warn!(field, pattern, "invalid condition regex: {err}");
                    false
                }
            },
            _ => false,
        },
        ConditionOperator::InList => match value.as_array() {
            Some(list) => actual
                .map(|a| list.iter().any(|item| loose_eq(a, item)))
                .unwrap_or(false),
            None => false,
        },
    }
}

/// Scalars compare by string form so "5" matches 5; everything else is
/// strict JSON equality.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cockpit_model::ConditionNode as N;
    use serde_json::json;

    fn device() -> Value {
        json!({
            "name": "edge-r1",
            "role": {"name": "edge"},
            "location": {"name": "Berlin"},
            "tags": [{"name": "prod"}],
            "_custom_field_data": {"net": "prod"},
            "interface_count": 48
        })
    }

    fn leaf(field: &str, operator: ConditionOperator, value: Value) -> N {
        N::Leaf {
            field: field.into(),
            operator,
            value,
        }
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        let device = device();
        assert!(evaluate(
            &N::Group {
                logic: GroupLogic::And,
                items: vec![]
            },
            &device
        ));
        assert!(!evaluate(
            &N::Group {
                logic: GroupLogic::Or,
                items: vec![]
            },
            &device
        ));
    }

    #[test]
    fn not_inverts() {
        let device = device();
        let inner = leaf("name", ConditionOperator::Equals, json!("edge-r1"));
        assert!(evaluate(&inner, &device));
        assert!(!evaluate(
            &N::Not {
                item: Box::new(inner)
            },
            &device
        ));
    }

    #[test]
    fn operators_over_device_fields() {
        let device = device();
        assert!(evaluate(
            &leaf("role.name", ConditionOperator::Equals, json!("edge")),
            &device
        ));
        assert!(evaluate(
            &leaf("name", ConditionOperator::StartsWith, json!("edge-")),
            &device
        ));
        assert!(evaluate(
            &leaf("name", ConditionOperator::Contains, json!("dge-r")),
            &device
        ));
        assert!(evaluate(
            &leaf("name", ConditionOperator::Regex, json!("^edge-r[0-9]+$")),
            &device
        ));
        assert!(evaluate(
            &leaf(
                "location.name",
                ConditionOperator::InList,
                json!(["Berlin", "Hamburg"])
            ),
            &device
        ));
        assert!(evaluate(
            &leaf("_custom_field_data.net", ConditionOperator::Equals, json!("prod")),
            &device
        ));
        // Number compared against its string form.
        assert!(evaluate(
            &leaf("interface_count", ConditionOperator::Equals, json!("48")),
            &device
        ));
    }

    #[test]
    fn missing_field_semantics() {
        let device = device();
        assert!(!evaluate(
            &leaf("platform.name", ConditionOperator::Equals, json!("ios")),
            &device
        ));
        // not-equals over a missing field holds.
        assert!(evaluate(
            &leaf("platform.name", ConditionOperator::NotEquals, json!("ios")),
            &device
        ));
    }

    #[test]
    fn nested_groups_short_circuit_to_the_right_answer() {
        let device = device();
        let tree = N::Group {
            logic: GroupLogic::And,
            items: vec![
                leaf("role.name", ConditionOperator::Equals, json!("edge")),
                N::Group {
                    logic: GroupLogic::Or,
                    items: vec![
                        leaf("location.name", ConditionOperator::Equals, json!("Oslo")),
                        leaf("location.name", ConditionOperator::Equals, json!("Berlin")),
                    ],
                },
                N::Not {
                    item: Box::new(leaf(
                        "_custom_field_data.net",
                        ConditionOperator::Equals,
                        json!("lab"),
                    )),
                },
            ],
        };
        assert!(evaluate(&tree, &device));
    }

    #[test]
    fn filter_devices_keeps_matches() {
        let devices = vec![
            json!({"name": "edge-r1", "role": {"name": "edge"}}),
            json!({"name": "core-c1", "role": {"name": "core"}}),
        ];
        let tree = leaf("role.name", ConditionOperator::Equals, json!("edge"));
        let matched = filter_devices(&tree, &devices);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["name"], "edge-r1");
    }

    #[test]
    fn invalid_regex_is_false_not_a_panic() {
        let device = device();
        assert!(!evaluate(
            &leaf("name", ConditionOperator::Regex, json!("([")),
            &device
        ));
    }
}
