mod common;

use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn unknown_path_is_404_without_outbound_call() -> Result<()> {
    let downstream = common::Downstream::spawn(StatusCode::OK, json!({})).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[]).await?;

    let res = reqwest::Client::new()
        .delete(gateway.url("/api/todos/1"))
        .header("Authorization", common::bearer(&common::token_for("u-1", "a@b.test")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "ROUTE_NOT_FOUND");
    assert_eq!(body["method"], "DELETE");
    assert_eq!(body["path"], "/api/todos/1");
    assert!(downstream.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn prefix_is_rewritten_and_query_preserved() -> Result<()> {
    let downstream = common::Downstream::spawn(StatusCode::OK, json!({ "token": "abc" })).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[]).await?;

    let res = reqwest::Client::new()
        .post(gateway.url("/api/auth/login?x=1"))
        .json(&json!({ "email": "a@b.test", "password": "pw" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let calls = downstream.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].uri, "/auth/login?x=1");
    assert_eq!(calls[0].headers["content-type"], "application/json");

    let forwarded: serde_json::Value = serde_json::from_str(&calls[0].body)?;
    assert_eq!(forwarded, json!({ "email": "a@b.test", "password": "pw" }));
    Ok(())
}

#[tokio::test]
async fn created_response_passes_through_unchanged() -> Result<()> {
    let created = json!({ "_id": "p1", "name": "Launch", "status": "active" });
    let downstream = common::Downstream::spawn(StatusCode::CREATED, created.clone()).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[]).await?;

    let res = reqwest::Client::new()
        .post(gateway.url("/api/plans"))
        .header("Authorization", common::bearer(&common::token_for("u-1", "a@b.test")))
        .json(&json!({ "name": "Launch" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.json::<serde_json::Value>().await?, created);

    let calls = downstream.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].uri, "/plans");
    Ok(())
}

#[tokio::test]
async fn downstream_client_errors_are_not_rewrapped() -> Result<()> {
    let error = json!({ "message": "User already exists" });
    let downstream = common::Downstream::spawn(StatusCode::BAD_REQUEST, error.clone()).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[]).await?;

    let res = reqwest::Client::new()
        .post(gateway.url("/api/auth/register"))
        .json(&json!({ "email": "a@b.test", "password": "pw" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<serde_json::Value>().await?, error);
    Ok(())
}

#[tokio::test]
async fn downstream_server_errors_are_not_retried() -> Result<()> {
    let downstream =
        common::Downstream::spawn(StatusCode::SERVICE_UNAVAILABLE, json!({ "message": "busy" })).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[]).await?;

    let res = reqwest::Client::new()
        .get(gateway.url("/api/tasks?planId=p1"))
        .header("Authorization", common::bearer(&common::token_for("u-1", "a@b.test")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(downstream.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn slow_downstream_yields_504_within_timeout() -> Result<()> {
    let downstream =
        common::Downstream::spawn_with_delay(StatusCode::OK, json!({}), Duration::from_secs(5)).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[("GATEWAY_TIMEOUT_MS", "300")]).await?;

    let started = Instant::now();
    let res = reqwest::Client::new()
        .get(gateway.url("/api/plans"))
        .header("Authorization", common::bearer(&common::token_for("u-1", "a@b.test")))
        .send()
        .await?;
    let elapsed = started.elapsed();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(elapsed < Duration::from_millis(300 + 1500), "took {:?}", elapsed);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "GATEWAY_TIMEOUT");
    Ok(())
}

#[tokio::test]
async fn unreachable_downstream_yields_503() -> Result<()> {
    let dead = common::closed_port_url()?;
    let gateway =
        common::TestGateway::spawn(&[("AUTH_SERVICE_URL", dead.as_str()), ("TODO_SERVICE_URL", dead.as_str())]).await?;

    let res = reqwest::Client::new()
        .post(gateway.url("/api/auth/login"))
        .json(&json!({ "email": "a@b.test", "password": "pw" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Development mode exposes the target for debugging
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    assert!(body["detail"].as_str().unwrap_or_default().starts_with("127.0.0.1:"));
    Ok(())
}

#[tokio::test]
async fn production_mode_hides_failure_detail() -> Result<()> {
    let dead = common::closed_port_url()?;
    let gateway = common::TestGateway::spawn(&[
        ("APP_ENV", "production"),
        ("AUTH_SERVICE_URL", dead.as_str()),
        ("TODO_SERVICE_URL", dead.as_str()),
    ])
    .await?;

    let res = reqwest::Client::new()
        .post(gateway.url("/api/auth/register"))
        .json(&json!({}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = res.json::<serde_json::Value>().await?;
    assert!(body.get("detail").is_none(), "detail leaked: {}", body);
    assert!(!body.to_string().contains("127.0.0.1"));
    Ok(())
}

#[tokio::test]
async fn oversized_body_is_rejected_before_forwarding() -> Result<()> {
    let downstream = common::Downstream::spawn(StatusCode::OK, json!({})).await?;
    let gateway =
        common::TestGateway::in_front_of(&downstream, &[("API_MAX_REQUEST_SIZE_BYTES", "64")]).await?;

    let res = reqwest::Client::new()
        .post(gateway.url("/api/auth/register"))
        .json(&json!({ "padding": "x".repeat(256) }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(downstream.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn chunked_oversized_body_is_413() -> Result<()> {
    let downstream = common::Downstream::spawn(StatusCode::OK, json!({})).await?;
    let gateway =
        common::TestGateway::in_front_of(&downstream, &[("API_MAX_REQUEST_SIZE_BYTES", "64")]).await?;

    // 200 bytes in two chunks, no content-length
    let chunk = "x".repeat(100);
    let raw = format!(
        "POST /api/auth/register HTTP/1.1\r\nHost: gateway\r\nContent-Type: text/plain\r\n\
         Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n64\r\n{chunk}\r\n64\r\n{chunk}\r\n0\r\n\r\n"
    );
    let response = common::raw_request(&gateway.base_url, &raw).await?;

    assert!(response.starts_with("HTTP/1.1 413"), "unexpected response: {}", response);
    assert!(response.contains("PAYLOAD_TOO_LARGE"));
    assert!(downstream.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_transport_attempt_is_not_retried() -> Result<()> {
    let upstream = common::DroppingUpstream::spawn().await?;
    let gateway = common::TestGateway::spawn(&[
        ("AUTH_SERVICE_URL", upstream.base_url.as_str()),
        ("TODO_SERVICE_URL", upstream.base_url.as_str()),
    ])
    .await?;

    let res = reqwest::Client::new()
        .get(gateway.url("/api/plans"))
        .header("Authorization", common::bearer(&common::token_for("u-1", "a@b.test")))
        .send()
        .await?;

    assert!(res.status().is_server_error(), "unexpected status {}", res.status());
    assert_eq!(upstream.accepted(), 1);
    Ok(())
}

#[tokio::test]
async fn head_response_keeps_content_length() -> Result<()> {
    let downstream = common::Downstream::spawn(StatusCode::OK, json!({ "token": "abc" })).await?;
    let gateway = common::TestGateway::in_front_of(&downstream, &[]).await?;
    let client = reqwest::Client::new();

    let direct = client.head(format!("{}/auth/login", downstream.base_url)).send().await?;
    let expected = direct
        .headers()
        .get("content-length")
        .cloned()
        .expect("downstream sent no content-length");

    let res = client.head(gateway.url("/api/auth/login")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("content-length"), Some(&expected));
    Ok(())
}
