// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP boundary.
//!
//! Thin by design: the router, the bearer middleware, and the response
//! envelopes live here; handlers marshal payloads and call the
//! lifecycle manager. `/ping`, `/healthz`, and `/metrics` are open;
//! everything under `/v1` that names an FQDN requires the owning
//! token's bearer, except POST of a new name (POSTs that supply an
//! FQDN are re-checked against the owner inside the lifecycle).

pub mod handlers;

use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::context::AppContext;
use crate::errors::ApiError;
use crate::metrics;
use crate::records::{Domain, Response};

/// Build the full application router.
pub fn build_router(ctx: AppContext) -> Router {
    metrics::init();

    let secure = Router::new()
        .route("/domains", get(handlers::list))
        .route("/domain", post(handlers::post_domain))
        .route("/domain/txt", post(handlers::post_txt_mint))
        .route("/domain/cname", post(handlers::post_cname_mint))
        .route(
            "/domain/:fqdn",
            get(handlers::get_domain)
                .put(handlers::put_domain)
                .delete(handlers::delete_domain),
        )
        .route("/domain/:fqdn/renew", put(handlers::renew_domain))
        .route(
            "/domain/:fqdn/txt",
            get(handlers::get_txt)
                .post(handlers::post_txt)
                .put(handlers::put_txt)
                .delete(handlers::delete_txt),
        )
        .route(
            "/domain/:fqdn/cname",
            get(handlers::get_cname)
                .post(handlers::post_cname)
                .put(handlers::put_cname)
                .delete(handlers::delete_cname),
        )
        .layer(middleware::from_fn_with_state(ctx.clone(), bearer_middleware));

    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics_text))
        .nest("/v1", secure)
        .layer(middleware::from_fn(track_requests))
        .with_state(ctx)
}

/// Pull the bearer out of the Authorization header.
pub(crate) fn bearer_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Verify the bearer on every non-POST request that names an FQDN.
///
/// POST is exempt here because a new name has no token yet; POSTs that
/// supply an FQDN are authorised against the owning token inside the
/// lifecycle manager.
async fn bearer_middleware(
    State(ctx): State<AppContext>,
    params: Option<Path<std::collections::HashMap<String, String>>>,
    request: Request,
    next: Next,
) -> AxumResponse {
    let fqdn = params
        .as_ref()
        .and_then(|Path(map)| map.get("fqdn").cloned());

    if request.method() != axum::http::Method::POST {
        if let Some(fqdn) = fqdn {
            let bearer = bearer_from(request.headers()).unwrap_or_default();
            if let Err(err) = ctx.lifecycle.authorize(&fqdn, &bearer).await {
                return err.into_response();
            }
        }
    }

    next.run(request).await
}

/// Count every request by matched route and response status.
async fn track_requests(request: Request, next: Next) -> AxumResponse {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16());
    response
}

/// Success envelope around a single domain; `token` carries the wrapped
/// bearer on creation.
pub(crate) fn respond_with_data(domain: Domain, token: Option<String>) -> Json<Response> {
    Json(Response {
        status: 200,
        msg: String::new(),
        data: Some(domain),
        token,
    })
}

/// Success envelope with no record attached.
pub(crate) fn respond_no_datum() -> Json<Response> {
    Json(Response {
        status: 200,
        msg: String::new(),
        data: None,
        token: None,
    })
}

/// Parse a request body the way the handlers expect: empty bodies are
/// an explicit error, bad JSON maps to `invalid`.
pub(crate) fn parse_payload(body: &[u8]) -> Result<crate::records::Payload, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Invalid(format!("malformed payload: {e}")))
}
