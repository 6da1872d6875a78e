use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{header::CONTENT_LENGTH, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;

use crate::error::GatewayError;
use crate::middleware::identity::strip_hop_by_hop;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Outbound request derived 1:1 from the inbound one
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    /// Path with the query string re-attached verbatim
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Whether this method carries a request body downstream
    pub fn carries_body(&self) -> bool {
        !matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::CONNECT
        )
    }
}

/// Outcome of a single forwarding attempt
#[derive(Debug)]
pub enum ForwardResult {
    /// Downstream answered; status and body pass through untouched
    Success {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Failure(GatewayError),
}

impl ForwardResult {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardResult::Success { status, .. } => *status,
            ForwardResult::Failure(err) => err.status_code(),
        }
    }

    /// Client response. `verbose` exposes internal failure detail.
    pub fn into_response_with(self, verbose: bool) -> Response {
        match self {
            ForwardResult::Success { status, headers, body } => {
                let mut response = (status, body).into_response();
                // Replace the defaults axum set for a Bytes body with the downstream's own
                *response.headers_mut() = headers;
                response
            }
            ForwardResult::Failure(err) => err.into_response_with(verbose),
        }
    }
}

impl From<GatewayError> for ForwardResult {
    fn from(err: GatewayError) -> Self {
        ForwardResult::Failure(err)
    }
}

/// Performs exactly one outbound call per inbound request
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, target_url: &str, request: ForwardRequest, timeout: Duration) -> ForwardResult;
}

/// `reqwest`-backed forwarder. Redirects and retries are disabled so the
/// downstream response reaches the client exactly as sent.
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, target_url: &str, request: ForwardRequest, timeout: Duration) -> ForwardResult {
        let carries_body = request.carries_body();
        let ForwardRequest {
            method, headers, body, ..
        } = request;

        let mut outbound = self
            .client
            .request(method.clone(), target_url)
            .headers(headers)
            .timeout(timeout);

        if carries_body && !body.is_empty() {
            outbound = outbound.body(body);
        }

        let response = match outbound.send().await {
            Ok(response) => response,
            Err(e) => return ForwardResult::Failure(classify_error(target_url, &e)),
        };

        let status = response.status();
        let mut headers = response.headers().clone();
        let declared_length = headers.get(CONTENT_LENGTH).cloned();
        strip_hop_by_hop(&mut headers);

        // A HEAD response has no body to derive the length from
        if method == Method::HEAD {
            if let Some(length) = declared_length {
                headers.insert(CONTENT_LENGTH, length);
            }
        }

        // The timeout covers the body read as well
        match response.bytes().await {
            Ok(body) => {
                tracing::info!(%method, upstream = %target_url, status = status.as_u16(), "Downstream responded");
                ForwardResult::Success { status, headers, body }
            }
            Err(e) => ForwardResult::Failure(classify_error(target_url, &e)),
        }
    }
}

/// Map a transport failure to the gateway taxonomy
pub fn classify_error(target_url: &str, err: &reqwest::Error) -> GatewayError {
    let target = target_host(target_url);

    if err.is_timeout() {
        tracing::warn!(upstream = %target, error = %err, "Downstream timed out");
        GatewayError::Timeout(target)
    } else if err.is_connect() {
        tracing::warn!(upstream = %target, error = %err, "Downstream unreachable");
        GatewayError::ServiceUnavailable(target)
    } else {
        let mut message = err.to_string();
        if let Some(source) = err.source() {
            message = format!("{}: {}", message, source);
        }
        tracing::error!(upstream = %target, error = %message, "Forwarding failed");
        GatewayError::ProxyError(message)
    }
}

// "host:port" of the target, for diagnostics
fn target_host(target_url: &str) -> String {
    match url::Url::parse(target_url) {
        Ok(url) => match (url.host_str(), url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => target_url.to_string(),
        },
        Err(_) => target_url.to_string(),
    }
}

/// Read an inbound axum request into a `ForwardRequest`
pub async fn read_request(
    request: axum::extract::Request,
    body_limit: usize,
) -> Result<ForwardRequest, GatewayError> {
    let (parts, body) = request.into_parts();

    let declared_length = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if matches!(declared_length, Some(len) if len > body_limit) {
        return Err(GatewayError::PayloadTooLarge(body_limit));
    }

    // Chunked bodies carry no declared length and only trip the limit while buffering
    let body = axum::body::to_bytes(body, body_limit).await.map_err(|e| {
        if e.source().is_some_and(|source| source.is::<LengthLimitError>()) {
            GatewayError::PayloadTooLarge(body_limit)
        } else {
            GatewayError::ProxyError(format!("failed to read request body: {}", e))
        }
    })?;

    Ok(ForwardRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    })
}
