use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    http::{HeaderName, HeaderValue},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::gateway::{proxy_handler, Gateway};
use crate::handlers;

/// Shared, read-only process state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<Gateway>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: Gateway) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let gateway = Gateway::from_config(&config).context("failed to build gateway")?;
        Ok(Self::new(config, gateway))
    }
}

/// Baseline hardening headers added to every response
const SECURITY_HEADERS: [(&str, &str); 7] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("x-xss-protection", "0"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-permitted-cross-domain-policies", "none"),
];

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .fallback(proxy_handler);

    if state.config.security.enable_cors {
        router = router.layer(cors_layer(&state.config));
    }
    if state.config.server.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    // Downstream services may set their own values; these only fill the gaps
    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.security.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind_addr = format!("0.0.0.0:{}", state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("API gateway listening on http://{}", bind_addr);
    for rule in state.gateway.routes().rules() {
        tracing::info!(
            "  {} -> {}{} ({})",
            rule.inbound_prefix,
            rule.target_base_url,
            rule.outbound_prefix,
            if rule.requires_auth { "protected" } else { "public" }
        );
    }

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
