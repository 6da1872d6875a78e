// Gateway Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

/// Terminal failure for a single inbound request.
///
/// None of these are retried by the gateway. Each maps to exactly one HTTP
/// status and a stable machine-readable code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    // 401 Unauthorized
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // 403 Forbidden
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    // 404 Not Found
    #[error("Route not found: {method} {path}")]
    RouteNotFound {
        method: String,
        path: String,
        available: Vec<String>,
    },

    // 400 Bad Request (dot segments in the inbound path)
    #[error("Path '{0}' contains dot segments")]
    InvalidPath(String),

    // 400 Bad Request (route table wiring bug)
    #[error("Path '{path}' does not start with route prefix '{prefix}'")]
    RouteMismatch { prefix: String, path: String },

    // 503 Service Unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    // 504 Gateway Timeout
    #[error("Gateway timeout: {0}")]
    Timeout(String),

    // 413 Payload Too Large
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    // 500 Internal Server Error
    #[error("Proxy error: {0}")]
    ProxyError(String),
}

impl GatewayError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidCredential(_) => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::InvalidPath(_) | GatewayError::RouteMismatch { .. } => StatusCode::BAD_REQUEST,
            GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ProxyError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::MissingCredential(_) => "MISSING_CREDENTIAL",
            GatewayError::InvalidCredential(_) => "INVALID_CREDENTIAL",
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::InvalidPath(_) => "INVALID_PATH",
            GatewayError::RouteMismatch { .. } => "ROUTE_MISMATCH",
            GatewayError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            GatewayError::Timeout(_) => "GATEWAY_TIMEOUT",
            GatewayError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            GatewayError::ProxyError(_) => "PROXY_ERROR",
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &'static str {
        match self {
            GatewayError::MissingCredential(_) => "Access denied: no token provided",
            GatewayError::InvalidCredential(_) => "Invalid token",
            GatewayError::RouteNotFound { .. } => "Route not found",
            GatewayError::InvalidPath(_) => "Invalid request path",
            GatewayError::RouteMismatch { .. } => "Route configuration mismatch",
            GatewayError::ServiceUnavailable(_) => "Service unavailable",
            GatewayError::Timeout(_) => "Service took too long to respond",
            GatewayError::PayloadTooLarge(_) => "Request body too large",
            GatewayError::ProxyError(_) => "Something went wrong",
        }
    }

    /// Internal detail that may leak infrastructure, shown only in verbose mode
    fn sensitive_detail(&self) -> Option<&str> {
        match self {
            GatewayError::ServiceUnavailable(detail)
            | GatewayError::Timeout(detail)
            | GatewayError::ProxyError(detail) => Some(detail),
            _ => None,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self, verbose: bool) -> Value {
        let mut body = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        match self {
            GatewayError::MissingCredential(reason) | GatewayError::InvalidCredential(reason) => {
                body["reason"] = json!(reason);
            }
            GatewayError::RouteNotFound { method, path, available } => {
                body["method"] = json!(method);
                body["path"] = json!(path);
                body["available_routes"] = json!(available);
            }
            GatewayError::RouteMismatch { prefix, path } => {
                body["prefix"] = json!(prefix);
                body["path"] = json!(path);
            }
            GatewayError::InvalidPath(path) => {
                body["path"] = json!(path);
            }
            GatewayError::PayloadTooLarge(limit) => {
                body["limit_bytes"] = json!(limit);
            }
            _ => {}
        }

        if verbose {
            if let Some(detail) = self.sensitive_detail() {
                body["detail"] = json!(detail);
            }
        }

        body
    }

    /// Build the HTTP response, including internal detail only when `verbose`
    pub fn into_response_with(self, verbose: bool) -> axum::response::Response {
        (self.status_code(), Json(self.to_json(verbose))).into_response()
    }
}

// Automatic HTTP response conversion for Axum (production-safe body)
impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.into_response_with(false)
    }
}

/// Startup configuration errors. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid URL for service '{service}': {url}")]
    InvalidServiceUrl { service: String, url: String },

    #[error("Route '{prefix}' references unknown service '{service}'")]
    UnknownService { prefix: String, service: String },

    #[error("Invalid route prefix '{0}': prefixes must start with '/'")]
    InvalidPrefix(String),

    #[error("Duplicate route prefix '{0}'")]
    DuplicatePrefix(String),

    #[error("Failed to read routes file {path}: {source}")]
    RoutesFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse routes file: {0}")]
    RoutesParse(#[from] serde_yaml::Error),
}
