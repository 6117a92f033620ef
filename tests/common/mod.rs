// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared helpers for the integration suite: an app wired to in-memory
//! ports and a small HTTP driver over `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use clap::Parser;
use tower::ServiceExt;

use sublet::config::Settings;
use sublet::context::AppContext;
use sublet::lifecycle::Lifecycle;
use sublet::provider::MemoryProvider;
use sublet::store::MemoryKeeper;

pub const ZONE: &str = "rancher.example";

/// A fully wired application over in-memory ports.
pub struct TestApp {
    pub router: axum::Router,
    pub keeper: Arc<MemoryKeeper>,
    pub provider: Arc<MemoryProvider>,
    pub ctx: AppContext,
}

/// Build an app; `expire`/`rotate` take Go-style durations so tests can
/// force immediate expiry.
pub fn app_with_lifetimes(expire: &str, rotate: &str) -> TestApp {
    let settings = Settings::parse_from([
        "sublet",
        "--domain",
        ZONE,
        "--aws-hosted-zone-id",
        "Z-test",
        "--db-dsn",
        "mysql://root@127.0.0.1:3306/sublet",
        "--expire",
        expire,
        "--rotate",
        rotate,
    ]);

    let keeper = Arc::new(MemoryKeeper::new());
    let provider = Arc::new(MemoryProvider::new(ZONE));
    let lifecycle = Arc::new(Lifecycle::new(keeper.clone(), provider.clone(), &settings));
    let ctx = AppContext::new(settings, keeper.clone(), lifecycle);

    TestApp {
        router: sublet::http::build_router(ctx.clone()),
        keeper,
        provider,
        ctx,
    }
}

pub fn app() -> TestApp {
    app_with_lifetimes("240h", "2160h")
}

/// Fire one request and return status plus parsed JSON body.
pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    body: Option<&str>,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", format!("Bearer {bearer}"));
    }
    let request = builder
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

/// POST a payload and return `(fqdn, wrapped bearer)`.
pub async fn post_domain(app: &TestApp, body: &str) -> (String, String) {
    let (status, value) = send(app, Method::POST, "/v1/domain", Some(body), None).await;
    assert_eq!(status, StatusCode::OK, "POST failed: {value}");
    (
        value["data"]["fqdn"].as_str().unwrap().to_string(),
        value["token"].as_str().unwrap().to_string(),
    )
}
