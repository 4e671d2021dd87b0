mod folders;
mod normalize;

pub use folders::{folder_to_wire, normalize_folder_path, split_folder_path, to_wire_path};
pub use normalize::{compare_host, normalize_device, render_device_template, SnmpMapping};

use cockpit_model::CheckMkSettings;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CheckMkError {
    #[error("checkmk request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("checkmk returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("host '{0}' not found")]
    HostNotFound(String),

    #[error("stale etag on '{0}'")]
    StaleEtag(String),

    #[error("checkmk response failed to decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("device cannot be normalised: {0}")]
    Normalize(String),
}

/// A host as CheckMK reports it: folder, attribute set, and the ETag needed
/// for conditional writes.
#[derive(Debug, Clone)]
pub struct CmkHost {
    pub hostname: String,
    pub folder: String,
    pub attributes: Map<String, Value>,
    pub etag: Option<String>,
}

/// CheckMK REST gateway. Writes are ETag-guarded; the remote enforces
/// conditional requests.
#[derive(Clone)]
pub struct CheckMkClient {
    http: reqwest::Client,
    base_url: String,
    site: String,
    auth_header: String,
}

impl CheckMkClient {
    pub fn new(settings: &CheckMkSettings) -> Result<Self, CheckMkError> {
        // Redirects are handled explicitly: activation answers 303 when the
        // run already started elsewhere.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            base_url: format!(
                "{}/{}/check_mk/api/1.0",
                settings.url.trim_end_matches('/'),
                settings.site
            ),
            site: settings.site.clone(),
            auth_header: format!("Bearer {} {}", settings.username, settings.password),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub async fn get_host(&self, hostname: &str) -> Result<CmkHost, CheckMkError> {
        let response = self
            .http
            .get(format!("{}/objects/host_config/{hostname}", self.base_url))
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CheckMkError::HostNotFound(hostname.to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            return Err(CheckMkError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: Value = response.json().await?;
        let extensions = body.get("extensions").cloned().unwrap_or(Value::Null);
        Ok(CmkHost {
            hostname: hostname.to_string(),
            folder: extensions
                .get("folder")
                .and_then(Value::as_str)
                .unwrap_or("/")
                .to_string(),
            attributes: extensions
                .get("attributes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            etag,
        })
    }

    pub async fn create_host(
        &self,
        hostname: &str,
        folder: &str,
        attributes: &Map<String, Value>,
    ) -> Result<(), CheckMkError> {
        self.ensure_folder_path(folder).await?;
        let body = json!({
            "host_name": hostname,
            "folder": folder_to_wire(folder),
            "attributes": attributes,
        });
        let response = self
            .http
            .post(format!(
                "{}/domain-types/host_config/collections/all",
                self.base_url
            ))
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await?;
        self.expect_success(response, hostname).await?;
        info!(host = hostname, folder, "checkmk host created");
        Ok(())
    }

    /// PATCH the attribute set under the caller's ETag. 412 surfaces as
    /// StaleEtag so the caller can re-fetch once and retry.
    pub async fn update_host(
        &self,
        hostname: &str,
        etag: &str,
        attributes: &Map<String, Value>,
    ) -> Result<(), CheckMkError> {
        let response = self
            .http
            .patch(format!("{}/objects/host_config/{hostname}", self.base_url))
            .header("Authorization", &self.auth_header)
            .header("If-Match", etag)
            .json(&json!({"attributes": attributes}))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            return Err(CheckMkError::StaleEtag(hostname.to_string()));
        }
        self.expect_success(response, hostname).await
    }

    pub async fn move_host(
        &self,
        hostname: &str,
        etag: &str,
        target_folder: &str,
    ) -> Result<(), CheckMkError> {
        self.ensure_folder_path(target_folder).await?;
        let response = self
            .http
            .post(format!(
                "{}/objects/host_config/{hostname}/actions/move/invoke",
                self.base_url
            ))
            .header("Authorization", &self.auth_header)
            .header("If-Match", etag)
            .json(&json!({"target_folder": folder_to_wire(target_folder)}))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            return Err(CheckMkError::StaleEtag(hostname.to_string()));
        }
        self.expect_success(response, hostname).await
    }

    pub async fn delete_host(&self, hostname: &str) -> Result<(), CheckMkError> {
        let response = self
            .http
            .delete(format!("{}/objects/host_config/{hostname}", self.base_url))
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CheckMkError::HostNotFound(hostname.to_string()));
        }
        self.expect_success(response, hostname).await
    }

    /// Create every folder along the path, parent first. An "already
    /// exists" rejection is success: the goal state holds.
    pub async fn ensure_folder_path(&self, folder: &str) -> Result<(), CheckMkError> {
        let parts = split_folder_path(folder);
        for depth in 0..parts.len() {
            let parent = to_wire_path(&parts[..depth]);
            let name = &parts[depth];
            let response = self
                .http
                .post(format!(
                    "{}/domain-types/folder_config/collections/all",
                    self.base_url
                ))
                .header("Authorization", &self.auth_header)
                .json(&json!({"name": name, "title": name, "parent": parent}))
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                debug!(folder = name.as_str(), parent, "folder created");
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST && body.contains("already exists") {
                continue;
            }
            return Err(CheckMkError::Status { status, body });
        }
        Ok(())
    }

    /// Activate pending changes for the configured site. 303 means the
    /// activation was started elsewhere and redirected; both count as done.
    pub async fn activate_changes(&self) -> Result<(), CheckMkError> {
        let response = self
            .http
            .post(format!(
                "{}/domain-types/activation_run/actions/activate-changes/invoke",
                self.base_url
            ))
            .header("Authorization", &self.auth_header)
            .header("If-Match", "*")
            .json(&json!({
                "redirect": false,
                "sites": [self.site],
                "force_foreign_changes": false,
            }))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::SEE_OTHER {
            info!(site = %self.site, "checkmk changes activated");
            return Ok(());
        }
        Err(CheckMkError::Status {
            status,
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn expect_success(
        &self,
        response: reqwest::Response,
        hostname: &str,
    ) -> Result<(), CheckMkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        debug!(host = hostname, %status, "checkmk error body: {body}");
        Err(CheckMkError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: &str) -> CheckMkSettings {
        CheckMkSettings {
            url: url.to_string(),
            site: "main".into(),
            username: "automation".into(),
            password: "secret".into(),
            verify_ssl: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn get_host_returns_etag_folder_and_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/main/check_mk/api/1.0/objects/host_config/LAB"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"abc123\"")
                    .set_body_json(json!({
                        "extensions": {
                            "folder": "/network/Berlin",
                            "attributes": {"ipaddress": "192.0.2.10", "site": "main"}
                        }
                    })),
            )
            .mount(&server)
            .await;

        let client = CheckMkClient::new(&settings(&server.uri())).unwrap();
        let host = client.get_host("LAB").await.unwrap();
        assert_eq!(host.etag.as_deref(), Some("\"abc123\""));
        assert_eq!(host.folder, "/network/Berlin");
        assert_eq!(host.attributes["ipaddress"], "192.0.2.10");
    }

    #[tokio::test]
    async fn missing_host_is_host_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/main/check_mk/api/1.0/objects/host_config/GHOST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = CheckMkClient::new(&settings(&server.uri())).unwrap();
        assert!(matches!(
            client.get_host("GHOST").await,
            Err(CheckMkError::HostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stale_etag_surfaces_as_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/main/check_mk/api/1.0/objects/host_config/LAB"))
            .and(header("If-Match", "\"old\""))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;

        let client = CheckMkClient::new(&settings(&server.uri())).unwrap();
        let err = client
            .update_host("LAB", "\"old\"", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckMkError::StaleEtag(_)));
    }

    #[tokio::test]
    async fn ensure_folder_path_is_idempotent_on_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/main/check_mk/api/1.0/domain-types/folder_config/collections/all"))
            .and(body_partial_json(json!({"name": "network"})))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("folder already exists"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/main/check_mk/api/1.0/domain-types/folder_config/collections/all"))
            .and(body_partial_json(json!({"name": "Berlin", "parent": "~network"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = CheckMkClient::new(&settings(&server.uri())).unwrap();
        client.ensure_folder_path("/network/Berlin").await.unwrap();
    }

    #[tokio::test]
    async fn activate_changes_accepts_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/main/check_mk/api/1.0/domain-types/activation_run/actions/activate-changes/invoke",
            ))
            .and(header("If-Match", "*"))
            .respond_with(ResponseTemplate::new(303))
            .mount(&server)
            .await;

        let client = CheckMkClient::new(&settings(&server.uri())).unwrap();
        client.activate_changes().await.unwrap();
    }
}
