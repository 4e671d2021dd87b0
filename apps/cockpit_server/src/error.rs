use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cockpit_engine::EngineError;
use cockpit_store::StoreError;
use serde_json::json;

/// Every error crossing the API boundary is normalised to
/// `{detail, code?}` with a conventional status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    pub code: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.code {
            Some(code) => json!({"detail": self.detail, "code": code}),
            None => json!({"detail": self.detail}),
        };
        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, "Bearer".parse().expect("header"));
        }
        response
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::NotFound(what) => Self::not_found(format!("{what} not found")),
            EngineError::Validation(detail) => Self::bad_request(detail.clone()),
            EngineError::OverlapRefused(_) => {
                Self::new(StatusCode::CONFLICT, err.to_string()).with_code("overlap_refused")
            }
            EngineError::AgentOffline(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            EngineError::Store(store_err) => store_error(store_err),
            EngineError::Nautobot(_) | EngineError::CheckMk(_) | EngineError::Broker(_) => {
                Self::new(StatusCode::BAD_GATEWAY, err.to_string()).with_code("upstream")
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        store_error(&err)
    }
}

fn store_error(err: &StoreError) -> ApiError {
    match err {
        StoreError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
        StoreError::Conflict(detail) => ApiError::new(StatusCode::CONFLICT, detail.clone()),
        StoreError::TerminalRun(run) => {
            ApiError::new(StatusCode::CONFLICT, format!("job run {run} is already finished"))
                .with_code("terminal_run")
        }
        other => ApiError::internal(other.to_string()),
    }
}
