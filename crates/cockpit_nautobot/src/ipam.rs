use crate::{NautobotClient, NautobotError};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFilterOp {
    Eq,
    Lte,
    Gte,
    Lt,
    Gt,
    Contains,
}

impl IpFilterOp {
    /// REST query-parameter suffix; equality has none.
    pub fn suffix(&self) -> &'static str {
        match self {
            IpFilterOp::Eq => "",
            IpFilterOp::Lte => "__lte",
            IpFilterOp::Gte => "__gte",
            IpFilterOp::Lt => "__lt",
            IpFilterOp::Gt => "__gt",
            IpFilterOp::Contains => "__contains",
        }
    }

    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            None | Some("") => Some(IpFilterOp::Eq),
            Some("lte") => Some(IpFilterOp::Lte),
            Some("gte") => Some(IpFilterOp::Gte),
            Some("lt") => Some(IpFilterOp::Lt),
            Some("gt") => Some(IpFilterOp::Gt),
            Some("contains") => Some(IpFilterOp::Contains),
            Some(_) => None,
        }
    }
}

/// Filter over IP addresses by one field with an optional operator suffix.
#[derive(Debug, Clone)]
pub struct IpFilter {
    pub field: String,
    pub op: IpFilterOp,
    pub value: String,
    pub include_null: bool,
}

impl IpFilter {
    pub fn query_param(&self) -> String {
        format!("{}{}={}", self.field, self.op.suffix(), self.value)
    }
}

impl NautobotClient {
    /// IPs matching the filter. With `include_null` the set also contains
    /// addresses whose filter field is unset.
    pub async fn list_ip_addresses(&self, filter: &IpFilter) -> Result<Vec<Value>, NautobotError> {
        let mut results = self
            .fetch_all_pages(&format!(
                "/api/ipam/ip-addresses/?{}&depth=1",
                filter.query_param()
            ))
            .await?;

        if filter.include_null {
            let nulls = self
                .fetch_all_pages(&format!(
                    "/api/ipam/ip-addresses/?{}__isnull=true&depth=1",
                    filter.field
                ))
                .await?;
            results.extend(nulls);
        }
        Ok(results)
    }

    pub async fn delete_ip_address(&self, id: &str) -> Result<(), NautobotError> {
        self.rest_delete(&format!("/api/ipam/ip-addresses/{id}/"))
            .await
    }

    pub async fn update_ip_address(&self, id: &str, body: &Value) -> Result<(), NautobotError> {
        self.rest_patch(&format!("/api/ipam/ip-addresses/{id}/"), body)
            .await?;
        Ok(())
    }

    pub async fn set_ip_custom_field(
        &self,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<(), NautobotError> {
        self.update_ip_address(id, &json!({"custom_fields": {field: value}}))
            .await
    }

    pub async fn list_prefixes(&self) -> Result<Vec<Value>, NautobotError> {
        self.fetch_all_pages("/api/ipam/prefixes/?depth=1").await
    }

    pub async fn set_prefix_custom_field(
        &self,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<(), NautobotError> {
        self.rest_patch(
            &format!("/api/ipam/prefixes/{id}/"),
            &json!({"custom_fields": {field: value}}),
        )
        .await?;
        Ok(())
    }

    /// Follow REST pagination until `next` runs out.
    async fn fetch_all_pages(&self, first_path: &str) -> Result<Vec<Value>, NautobotError> {
        let mut items = Vec::new();
        let mut path = Some(first_path.to_string());
        while let Some(current) = path.take() {
            let page = self.rest_get(&current).await?;
            if let Some(results) = page.get("results").and_then(Value::as_array) {
                items.extend(results.iter().cloned());
            }
            path = page
                .get("next")
                .and_then(Value::as_str)
                .and_then(|next| next.split_once("/api/").map(|(_, rest)| format!("/api/{rest}")));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_renders_operator_suffix() {
        let filter = IpFilter {
            field: "cf_last_scan".into(),
            op: IpFilterOp::Lte,
            value: "2025-05-01".into(),
            include_null: false,
        };
        assert_eq!(filter.query_param(), "cf_last_scan__lte=2025-05-01");

        let eq = IpFilter {
            field: "status".into(),
            op: IpFilterOp::Eq,
            value: "Active".into(),
            include_null: false,
        };
        assert_eq!(eq.query_param(), "status=Active");
    }

    #[test]
    fn operator_parsing() {
        assert_eq!(IpFilterOp::parse(None), Some(IpFilterOp::Eq));
        assert_eq!(IpFilterOp::parse(Some("lte")), Some(IpFilterOp::Lte));
        assert_eq!(IpFilterOp::parse(Some("contains")), Some(IpFilterOp::Contains));
        assert_eq!(IpFilterOp::parse(Some("regex")), None);
    }
}
