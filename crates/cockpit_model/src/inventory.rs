use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InventoryScope {
    #[default]
    Global,
    Private,
}

/// Named, stored boolean expression over device attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub id: i64,
    pub name: String,
    pub scope: InventoryScope,
    pub created_by: String,
    pub conditions: ConditionNode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupLogic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    Regex,
    InList,
}

/// Condition tree. Leaves compare a device field against a value; groups
/// combine children with AND/OR; NOT wraps a single child.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    Leaf {
        field: String,
        operator: ConditionOperator,
        value: serde_json::Value,
    },
    Group {
        logic: GroupLogic,
        items: Vec<ConditionNode>,
    },
    Not {
        item: Box<ConditionNode>,
    },
}

impl ConditionNode {
    /// Empty AND group: matches everything. Used as the default for
    /// inventories created without conditions.
    pub fn match_all() -> Self {
        ConditionNode::Group {
            logic: GroupLogic::And,
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condition_tree_round_trips() {
        let tree = ConditionNode::Group {
            logic: GroupLogic::And,
            items: vec![
                ConditionNode::Leaf {
                    field: "location.name".into(),
                    operator: ConditionOperator::Equals,
                    value: json!("Berlin"),
                },
                ConditionNode::Not {
                    item: Box::new(ConditionNode::Leaf {
                        field: "role.name".into(),
                        operator: ConditionOperator::InList,
                        value: json!(["spare", "decommissioned"]),
                    }),
                },
            ],
        };
        let encoded = serde_json::to_string(&tree).unwrap();
        let decoded: ConditionNode = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, tree);
        assert!(encoded.contains("\"type\":\"group\""));
        assert!(encoded.contains("\"logic\":\"AND\""));
    }
}
