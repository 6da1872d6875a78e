#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use planner_gateway::{app, AppConfig, AppState};

pub const TEST_SECRET: &str = "integration-test-secret";

/// One request as seen by a mock downstream service
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: String,
}

/// In-process stand-in for the auth or todo service.
/// Answers every path with a fixed status and JSON body after `delay`.
#[derive(Clone)]
pub struct Downstream {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Downstream {
    pub async fn spawn(status: StatusCode, body: Value) -> Result<Self> {
        Self::spawn_with_delay(status, body, Duration::ZERO).await
    }

    pub async fn spawn_with_delay(status: StatusCode, body: Value, delay: Duration) -> Result<Self> {
        let calls: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();
        let recorder = calls.clone();

        let router = Router::new().fallback(move |request: Request| {
            let recorder = recorder.clone();
            let body = body.clone();
            async move {
                let (parts, raw) = request.into_parts();
                let bytes = axum::body::to_bytes(raw, usize::MAX).await.unwrap_or_default();
                recorder.lock().unwrap().push(RecordedRequest {
                    method: parts.method.to_string(),
                    uri: parts.uri.to_string(),
                    headers: parts.headers,
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                });

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                (status, Json(body)).into_response()
            }
        });

        let base_url = serve(router).await?;
        Ok(Self { base_url, calls })
    }

    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.lock().unwrap().clone()
    }
}

/// A running gateway bound to a free local port
pub struct TestGateway {
    pub base_url: String,
}

impl TestGateway {
    /// Start a gateway configured from `vars` (on top of a test secret)
    pub async fn spawn(vars: &[(&str, &str)]) -> Result<Self> {
        let mut all: Vec<(String, String)> = vec![("JWT_SECRET".into(), TEST_SECRET.into())];
        all.extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let config = AppConfig::from_lookup(move |key| {
            all.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .context("invalid test configuration")?;

        let state = AppState::from_config(config)?;
        let base_url = serve(app(state)).await?;
        Ok(Self { base_url })
    }

    /// Gateway whose auth and todo routes both point at `downstream`
    pub async fn in_front_of(downstream: &Downstream, extra: &[(&str, &str)]) -> Result<Self> {
        let mut vars = vec![
            ("AUTH_SERVICE_URL", downstream.base_url.as_str()),
            ("TODO_SERVICE_URL", downstream.base_url.as_str()),
        ];
        vars.extend_from_slice(extra);
        Self::spawn(&vars).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn serve(router: Router) -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind test listener")?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(format!("http://127.0.0.1:{}", port))
}

/// Upstream that accepts TCP connections and drops them without answering
pub struct DroppingUpstream {
    pub base_url: String,
    accepted: Arc<AtomicUsize>,
}

impl DroppingUpstream {
    pub async fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test listener")?;

        let accepted: Arc<AtomicUsize> = Arc::default();
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            accepted,
        })
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Send `raw` verbatim over a fresh connection and return the full response text.
/// Bypasses client-side path normalisation and framing.
pub async fn raw_request(base_url: &str, raw: &str) -> Result<String> {
    let addr = base_url.trim_start_matches("http://");
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .context("failed to connect to gateway")?;
    stream.write_all(raw.as_bytes()).await?;

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .context("gateway did not close the connection")?;
        match read {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            // A reset after the response arrived still leaves a complete answer
            Err(_) if !response.is_empty() => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(String::from_utf8_lossy(&response).into_owned())
}

/// A free port with nothing listening on it
pub fn closed_port_url() -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    Ok(format!("http://127.0.0.1:{}", port))
}

pub fn sign(claims: Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes()))
        .expect("failed to sign test token")
}

/// Valid token for `user_id`, expiring in one hour
pub fn token_for(user_id: &str, email: &str) -> String {
    let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
    sign(json!({ "userId": user_id, "email": email, "exp": exp }))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
