// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Token wrapping and verification.
//!
//! The raw 32-character secret is what the metadata store keeps; clients
//! are handed `base64(bcrypt(secret))` and present that wrapped form as
//! their bearer. Verification decodes the bearer and lets bcrypt compare
//! against the stored secret.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

// The secret already carries ~190 bits of entropy; the minimum bcrypt
// cost keeps wrap latency off the POST hot path.
const WRAP_COST: u32 = 4;

/// Wrap a stored secret into the bearer form handed to clients.
///
/// # Errors
///
/// Returns an error if bcrypt rejects the cost or input.
pub fn wrap(secret: &str) -> Result<String, bcrypt::BcryptError> {
    let hash = bcrypt::hash(secret, WRAP_COST)?;
    Ok(BASE64.encode(hash))
}

/// Verify a presented bearer against the stored secret.
///
/// Any decode or comparison failure is a verification failure; this
/// function never errors out to the caller.
#[must_use]
pub fn verify(bearer: &str, stored_secret: &str) -> bool {
    let Ok(decoded) = BASE64.decode(bearer) else {
        debug!("bearer is not valid base64");
        return false;
    };

    let Ok(hash) = String::from_utf8(decoded) else {
        debug!("bearer does not decode to a bcrypt hash");
        return false;
    };

    bcrypt::verify(stored_secret, &hash).unwrap_or(false)
}
