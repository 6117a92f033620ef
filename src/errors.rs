// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! API error taxonomy and its HTTP mapping.
//!
//! Every failure surfaced to a caller is one of the variants below, and
//! every variant maps to exactly one HTTP status:
//!
//! | Variant | HTTP | Trigger |
//! |---------|------|---------|
//! | `Invalid` | 400 | Malformed JSON, forbidden field combination, wildcard mismatch |
//! | `Unauthenticated` | 401 | Missing bearer |
//! | `Forbidden` | 403 | Bearer does not match the FQDN's token |
//! | `NotFound` | 404 | No record for the targeted FQDN |
//! | `Conflict` | 409 | FQDN already taken, record already exists |
//! | `NameExhausted` | 503 | All slug draws failed |
//! | `Provider` | 502 | The authoritative DNS rejected the batch |
//! | `Internal` | 500 | Unexpected store or marshalling failure |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Error envelope returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub msg: String,
}

/// Errors surfaced to API callers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request: bad JSON, forbidden field combination, or a
    /// wildcard flag inconsistent with the FQDN.
    #[error("{0}")]
    Invalid(String),

    /// No bearer token on a request that requires one.
    #[error("missing authorization bearer")]
    Unauthenticated,

    /// The presented bearer does not verify against the FQDN's token.
    #[error("forbidden to use")]
    Forbidden,

    /// No record exists for the targeted FQDN.
    #[error("no record(s) found: {0}")]
    NotFound(String),

    /// The FQDN is already taken or the record already exists.
    #[error("record(s) already exist: {0}")]
    Conflict(String),

    /// Every slug draw collided with a frozen prefix or a live record.
    #[error("failed to generate a free domain name")]
    NameExhausted,

    /// The authoritative DNS provider rejected the change batch.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Unexpected store or marshalling failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NameExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Publish(provider) => Self::Provider(provider),
            StoreError::Connection(msg) | StoreError::Migration(msg) | StoreError::Query(msg) => {
                Self::Internal(msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status: status.as_u16(),
            msg: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

