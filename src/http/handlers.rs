// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Route handlers: payload marshalling in, lifecycle calls, envelopes
//! out.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::context::AppContext;
use crate::errors::ApiError;
use crate::records::{Payload, RecordKind, Response, ResponseList};
use crate::token;

use super::{bearer_from, parse_payload, respond_no_datum, respond_with_data};

/// The `?type=` selector on domain routes; AAAA opts in, everything
/// else reads as A.
#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl KindQuery {
    fn address_kind(&self) -> RecordKind {
        match self.kind.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("AAAA") => RecordKind::Aaaa,
            _ => RecordKind::A,
        }
    }
}

/// `GET /ping`
pub async fn ping() -> Json<Response> {
    respond_no_datum()
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "OK"
}

/// `GET /metrics`
pub async fn metrics_text() -> Result<String, ApiError> {
    crate::metrics::gather_metrics().map_err(|e| ApiError::Internal(e.to_string()))
}

/// `GET /v1/domains`
pub async fn list(State(ctx): State<AppContext>) -> Result<Json<ResponseList>, ApiError> {
    let domains = ctx.lifecycle.list().await?;
    Ok(Json(ResponseList {
        status: 200,
        msg: String::new(),
        datum: domains,
        kind: "A/AAAA/TXT/CNAME".to_string(),
    }))
}

/// `POST /v1/domain` - create an A/AAAA record set, minting a name when
/// the body does not supply one.
pub async fn post_domain(
    State(ctx): State<AppContext>,
    Query(query): Query<KindQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.complete(None, true)?;
    // Host values that parse as CNAME targets do not belong here.
    if !payload.hosts.is_empty() && !payload.kind.has_sub_domain() {
        return Err(ApiError::Invalid("hosts must be IP addresses".to_string()));
    }
    if query.kind.is_some() && payload.kind.has_sub_domain() && payload.kind != query.address_kind()
    {
        return Err(ApiError::Invalid(
            "hosts do not match the requested type".to_string(),
        ));
    }
    create_with_bearer(&ctx, payload, &headers).await
}

/// `GET /v1/domain/:fqdn`
pub async fn get_domain(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    Query(query): Query<KindQuery>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(query.address_kind()), false)?;

    let domain = ctx.lifecycle.read(&payload).await?;
    Ok(respond_with_data(domain, None))
}

/// `PUT /v1/domain/:fqdn`
pub async fn put_domain(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    Query(query): Query<KindQuery>,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.fqdn = fqdn;
    payload.complete(None, true)?;
    if !payload.kind.has_sub_domain() {
        return Err(ApiError::Invalid("hosts must be IP addresses".to_string()));
    }
    if query.kind.is_some() && payload.kind != query.address_kind() {
        return Err(ApiError::Invalid(
            "hosts do not match the requested type".to_string(),
        ));
    }
    let domain = ctx.lifecycle.update(&payload).await?;
    Ok(respond_with_data(domain, None))
}

/// `DELETE /v1/domain/:fqdn`
pub async fn delete_domain(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    Query(query): Query<KindQuery>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(query.address_kind()), false)?;

    ctx.lifecycle.delete(&payload).await?;
    Ok(respond_no_datum())
}

/// `PUT /v1/domain/:fqdn/renew`
pub async fn renew_domain(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    Query(query): Query<KindQuery>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(query.address_kind()), false)?;

    let domain = ctx.lifecycle.renew(&payload).await?;
    Ok(respond_with_data(domain, None))
}

// ===== TXT =====

/// `POST /v1/domain/txt` - mint a fresh name carrying a TXT record.
pub async fn post_txt_mint(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.complete(Some(RecordKind::Txt), true)?;
    create_with_bearer(&ctx, payload, &headers).await
}

/// `GET /v1/domain/:fqdn/txt`
pub async fn get_txt(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(RecordKind::Txt), false)?;

    let domain = ctx.lifecycle.read(&payload).await?;
    Ok(respond_with_data(domain, None))
}

/// `POST /v1/domain/:fqdn/txt` - attach a TXT record to an issued name,
/// or mint it fresh when the name is unowned.
pub async fn post_txt(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.fqdn = fqdn;
    payload.complete(Some(RecordKind::Txt), true)?;
    create_with_bearer(&ctx, payload, &headers).await
}

/// `PUT /v1/domain/:fqdn/txt`
pub async fn put_txt(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.fqdn = fqdn;
    payload.complete(Some(RecordKind::Txt), true)?;

    let domain = ctx.lifecycle.update(&payload).await?;
    Ok(respond_with_data(domain, None))
}

/// `DELETE /v1/domain/:fqdn/txt`
pub async fn delete_txt(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(RecordKind::Txt), false)?;

    ctx.lifecycle.delete(&payload).await?;
    Ok(respond_no_datum())
}

// ===== CNAME =====

/// `POST /v1/domain/cname` - mint a fresh name carrying a CNAME record.
pub async fn post_cname_mint(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.complete(Some(RecordKind::Cname), true)?;
    require_cname(&payload)?;
    create_with_bearer(&ctx, payload, &headers).await
}

/// `GET /v1/domain/:fqdn/cname`
pub async fn get_cname(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(RecordKind::Cname), false)?;

    let domain = ctx.lifecycle.read(&payload).await?;
    Ok(respond_with_data(domain, None))
}

/// `POST /v1/domain/:fqdn/cname`
pub async fn post_cname(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.fqdn = fqdn;
    payload.complete(Some(RecordKind::Cname), true)?;
    require_cname(&payload)?;
    create_with_bearer(&ctx, payload, &headers).await
}

/// `PUT /v1/domain/:fqdn/cname`
pub async fn put_cname(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
    body: Bytes,
) -> Result<Json<Response>, ApiError> {
    let mut payload = parse_payload(&body)?;
    payload.fqdn = fqdn;
    payload.complete(Some(RecordKind::Cname), true)?;
    require_cname(&payload)?;

    let domain = ctx.lifecycle.update(&payload).await?;
    Ok(respond_with_data(domain, None))
}

/// `DELETE /v1/domain/:fqdn/cname`
pub async fn delete_cname(
    State(ctx): State<AppContext>,
    Path(fqdn): Path<String>,
) -> Result<Json<Response>, ApiError> {
    let mut payload = Payload {
        fqdn,
        ..Payload::default()
    };
    payload.complete(Some(RecordKind::Cname), false)?;

    ctx.lifecycle.delete(&payload).await?;
    Ok(respond_no_datum())
}

// ===== Shared =====

/// Drive a create through the lifecycle and wrap the issued secret
/// before it leaves the process.
async fn create_with_bearer(
    ctx: &AppContext,
    payload: Payload,
    headers: &HeaderMap,
) -> Result<Json<Response>, ApiError> {
    let bearer = bearer_from(headers);
    let mut domain = ctx.lifecycle.create(payload, bearer.as_deref()).await?;

    let wrapped = if domain.token.is_empty() {
        None
    } else {
        let secret = std::mem::take(&mut domain.token);
        let wrapped = tokio::task::spawn_blocking(move || token::wrap(&secret))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        domain.token = wrapped.clone();
        Some(wrapped)
    };

    Ok(respond_with_data(domain, wrapped))
}

fn require_cname(payload: &Payload) -> Result<(), ApiError> {
    if payload.cname.is_empty() {
        return Err(ApiError::Invalid("cname target is required".to_string()));
    }
    Ok(())
}
