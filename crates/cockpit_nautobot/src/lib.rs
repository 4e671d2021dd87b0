mod cache;
mod devices;
mod ipam;
mod offboard;
mod resolvers;

pub use cache::EntityCache;
pub use devices::{device_field, DEVICE_LIST_QUERY};
pub use ipam::{IpFilter, IpFilterOp};
pub use offboard::{OffboardMode, OffboardRequest, OffboardResult};

use cockpit_model::NautobotSettings;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const RETRY_LIMIT: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Error, Debug)]
pub enum NautobotError {
    #[error("nautobot request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("nautobot returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("nautobot response failed to decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("graphql errors: {0}")]
    GraphQl(String),
}

impl NautobotError {
    /// 5xx and transport failures are retried by the gateway; everything
    /// else surfaces immediately.
    fn is_retryable(&self) -> bool {
        match self {
            NautobotError::Http(err) => err.is_timeout() || err.is_connect(),
            NautobotError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Nautobot gateway: GraphQL for bulk reads, REST for writes, with bounded
/// retry on upstream failures.
#[derive(Clone)]
pub struct NautobotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl NautobotClient {
    pub fn new(settings: &NautobotSettings) -> Result<Self, NautobotError> {
        let timeout = Duration::from_secs(settings.timeout_secs.unwrap_or(30));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()?;
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, NautobotError> {
        let body = self
            .request_with_retry(|| {
                self.http
                    .post(format!("{}/api/graphql/", self.base_url))
                    .header("Authorization", format!("Token {}", self.token))
                    .json(&json!({"query": query, "variables": variables}))
            })
            .await?;
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(NautobotError::GraphQl(errors.to_string()));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    pub async fn rest_get(&self, path: &str) -> Result<Value, NautobotError> {
        self.request_with_retry(|| {
            self.http
                .get(format!("{}{}", self.base_url, path))
                .header("Authorization", format!("Token {}", self.token))
        })
        .await
    }

    pub async fn rest_post(&self, path: &str, body: &Value) -> Result<Value, NautobotError> {
        self.request_with_retry(|| {
            self.http
                .post(format!("{}{}", self.base_url, path))
                .header("Authorization", format!("Token {}", self.token))
                .json(body)
        })
        .await
    }

    pub async fn rest_patch(&self, path: &str, body: &Value) -> Result<Value, NautobotError> {
        self.request_with_retry(|| {
            self.http
                .patch(format!("{}{}", self.base_url, path))
                .header("Authorization", format!("Token {}", self.token))
                .json(body)
        })
        .await
    }

    pub async fn rest_delete(&self, path: &str) -> Result<(), NautobotError> {
        let response = self
            .http
            .delete(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(NautobotError::Status {
            status,
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn request_with_retry<F>(&self, build: F) -> Result<Value, NautobotError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let outcome = self.execute(build()).await;
            match outcome {
                Err(err) if err.is_retryable() && attempt < RETRY_LIMIT => {
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!("nautobot request failed ({err}), retry {attempt} in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, NautobotError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NautobotError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        debug!(bytes = text.len(), "nautobot response");
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: &str) -> NautobotSettings {
        NautobotSettings {
            url: url.to_string(),
            token: "token123".into(),
            verify_ssl: true,
            timeout_secs: Some(5),
        }
    }

    #[tokio::test]
    async fn graphql_unwraps_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graphql/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"devices": [{"name": "r1"}]}
            })))
            .mount(&server)
            .await;

        let client = NautobotClient::new(&settings(&server.uri())).unwrap();
        let data = client
            .graphql("query { devices { name } }", Value::Null)
            .await
            .unwrap();
        assert_eq!(data["devices"][0]["name"], "r1");
    }

    #[tokio::test]
    async fn graphql_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/graphql/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{"message": "bad query"}]
            })))
            .mount(&server)
            .await;

        let client = NautobotClient::new(&settings(&server.uri())).unwrap();
        let err = client.graphql("query {}", Value::Null).await.unwrap_err();
        assert!(matches!(err, NautobotError::GraphQl(_)));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dcim/devices/"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dcim/devices/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 0, "results": []
            })))
            .mount(&server)
            .await;

        let client = NautobotClient::new(&settings(&server.uri())).unwrap();
        let body = client.rest_get("/api/dcim/devices/").await.unwrap();
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dcim/devices/"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = NautobotClient::new(&settings(&server.uri())).unwrap();
        let err = client.rest_get("/api/dcim/devices/").await.unwrap_err();
        assert!(matches!(
            err,
            NautobotError::Status { status, .. } if status == reqwest::StatusCode::FORBIDDEN
        ));
    }
}
