use crate::{NautobotClient, NautobotError};
use serde_json::Value;
use tracing::debug;

/// Name-to-UUID resolvers. A name that does not resolve yields `None`, never
/// an error — the executor decides what a missing entity means.
impl NautobotClient {
    pub async fn resolve_role(&self, name: &str, content_type: &str) -> Option<String> {
        self.resolve(
            &format!("/api/extras/roles/?name={name}&content_types={content_type}"),
        )
        .await
    }

    pub async fn resolve_platform(&self, name: &str) -> Option<String> {
        self.resolve(&format!("/api/dcim/platforms/?name={name}")).await
    }

    pub async fn resolve_status(&self, name: &str, content_type: &str) -> Option<String> {
        self.resolve(
            &format!("/api/extras/statuses/?name={name}&content_types={content_type}"),
        )
        .await
    }

    pub async fn resolve_namespace(&self, name: &str) -> Option<String> {
        self.resolve(&format!("/api/ipam/namespaces/?name={name}")).await
    }

    pub async fn resolve_location(&self, name: &str) -> Option<String> {
        self.resolve(&format!("/api/dcim/locations/?name={name}")).await
    }

    pub async fn resolve_tag(&self, name: &str, content_type: &str) -> Option<String> {
        self.resolve(
            &format!("/api/extras/tags/?name={name}&content_types={content_type}"),
        )
        .await
    }

    async fn resolve(&self, path: &str) -> Option<String> {
        match self.rest_get(path).await {
            Ok(body) => first_result_id(&body),
            Err(err) => {
                debug!("resolver lookup failed ({err})");
                None
            }
        }
    }
}

fn first_result_id(body: &Value) -> Option<String> {
    body.get("results")?
        .as_array()?
        .first()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}
