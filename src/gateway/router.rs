use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    response::Response,
};

use crate::auth::TokenVerifier;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::gateway::forward::{self, ForwardRequest, ForwardResult, Forwarder, HttpForwarder, DEFAULT_TIMEOUT};
use crate::gateway::route::{self, RouteTable};
use crate::middleware::attach as attach_identity;
use crate::server::AppState;

/// Composes route matching, authentication, identity propagation,
/// path translation and forwarding for one inbound request.
///
/// Everything here is read-only after construction; a single instance is
/// shared by all concurrent requests.
pub struct Gateway {
    routes: RouteTable,
    verifier: TokenVerifier,
    forwarder: Arc<dyn Forwarder>,
    default_timeout: Duration,
    propagate_identity: bool,
}

impl Gateway {
    pub fn new(routes: RouteTable, verifier: TokenVerifier, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            routes,
            verifier,
            forwarder,
            default_timeout: DEFAULT_TIMEOUT,
            propagate_identity: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let routes = RouteTable::from_config(config)?;
        let verifier = TokenVerifier::new(config.jwt_secret(), config.security.jwt_algorithm);
        let forwarder = HttpForwarder::new()?;

        Ok(Self::new(routes, verifier, Arc::new(forwarder))
            .with_timeout(Duration::from_millis(config.proxy.timeout_ms))
            .with_identity_propagation(config.proxy.propagate_identity))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// `false` selects passthrough mode: tokens are still verified on
    /// protected routes, but no `X-User-*` headers are asserted downstream.
    pub fn with_identity_propagation(mut self, enabled: bool) -> Self {
        self.propagate_identity = enabled;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Route one request. Unmatched paths and auth failures never reach the forwarder.
    pub async fn route(&self, request: ForwardRequest) -> ForwardResult {
        if route::has_dot_segments(&request.path) {
            tracing::warn!(method = %request.method, path = %request.path, "Rejected path with dot segments");
            return GatewayError::InvalidPath(request.path).into();
        }

        let Some(rule) = self.routes.find(&request.path) else {
            tracing::warn!(method = %request.method, path = %request.path, "No route matched");
            return GatewayError::RouteNotFound {
                method: request.method.to_string(),
                path: request.path_and_query(),
                available: self.routes.prefixes(),
            }
            .into();
        };

        let identity = if rule.requires_auth {
            let raw_header = request.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
            match self.verifier.verify(raw_header) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::warn!(method = %request.method, path = %request.path, "Rejected: {}", e);
                    return e.into();
                }
            }
        } else {
            None
        };

        let target_url = match rule.target_url(&request.path_and_query()) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(prefix = %rule.inbound_prefix, "Route table mismatch: {}", e);
                return e.into();
            }
        };

        let asserted = if self.propagate_identity { identity.as_ref() } else { None };
        let headers = attach_identity(asserted, request.headers);

        tracing::info!(
            method = %request.method,
            from = %request.path,
            to = %target_url,
            "Forwarding request"
        );

        let timeout = rule.timeout.unwrap_or(self.default_timeout);
        let outbound = ForwardRequest { headers, ..request };
        self.forwarder.forward(&target_url, outbound, timeout).await
    }
}

/// Fallback handler: every path not owned by the gateway itself lands here
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let verbose = state.config.proxy.verbose_errors;

    let request = match forward::read_request(request, state.config.server.max_request_size_bytes).await {
        Ok(request) => request,
        Err(e) => return e.into_response_with(verbose),
    };

    state.gateway.route(request).await.into_response_with(verbose)
}
