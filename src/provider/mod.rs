// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed port over the authoritative DNS provider.
//!
//! The lifecycle manager plans mutations against the metadata store and
//! publishes them here as ordered change batches. A batch is atomic on
//! the provider side: either every UPSERT/DELETE lands or none do.
//!
//! Names and values cross this boundary pre-escaped: wildcard labels in
//! the `\052` storage form, TXT values double-quoted. The port neither
//! escapes nor quotes.
//!
//! Two implementations ship: [`route53::Route53Provider`] over the AWS
//! SDK and [`memory::MemoryProvider`] for tests.

pub mod memory;
pub mod route53;


use async_trait::async_trait;
use thiserror::Error;

use crate::records::RecordKind;

pub use memory::MemoryProvider;
pub use route53::Route53Provider;

/// The hosted zone the provider serves, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    /// Zone name without the trailing dot.
    pub name: String,
    /// Provider-side zone id.
    pub id: String,
}

/// Direction of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Upsert,
    Delete,
}

/// One resource-record-set mutation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub action: ChangeAction,
    pub kind: RecordKind,
    /// Record name, wildcard-escaped, without the trailing dot.
    pub name: String,
    pub ttl: i64,
    pub values: Vec<String>,
}

impl Change {
    /// Convenience constructor for an UPSERT.
    #[must_use]
    pub fn upsert(kind: RecordKind, name: impl Into<String>, ttl: i64, values: Vec<String>) -> Self {
        Self {
            action: ChangeAction::Upsert,
            kind,
            name: name.into(),
            ttl,
            values,
        }
    }

    /// Convenience constructor for a DELETE.
    #[must_use]
    pub fn delete(kind: RecordKind, name: impl Into<String>, ttl: i64, values: Vec<String>) -> Self {
        Self {
            action: ChangeAction::Delete,
            kind,
            name: name.into(),
            ttl,
            values,
        }
    }
}

/// A resource-record-set as the provider reports it.
///
/// `name` keeps the provider's absolute form: trailing dot, wildcard
/// labels escaped. Callers canonicalize with [`crate::names::canon`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    pub name: String,
    pub kind: RecordKind,
    pub ttl: i64,
    pub values: Vec<String>,
}

/// Provider failures, mapped from the vendor SDK.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider rejected our credentials.
    #[error("provider credential error: {0}")]
    Credentials(String),

    /// Throttled or transport-level failure; safe to retry.
    #[error("provider throttled: {0}")]
    Throttled(String),

    /// The change batch was malformed.
    #[error("invalid change batch: {0}")]
    InvalidChange(String),

    /// DELETE of a record that does not exist. Callers treat this as
    /// success; the desired state already holds.
    #[error("record already gone: {0}")]
    Gone(String),

    /// Anything else.
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// True if the operation may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Other(_))
    }
}

/// Capability set of the authoritative DNS provider.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// The hosted zone, resolved at startup.
    fn zone(&self) -> &ZoneInfo;

    /// List resource-record-sets in ASCII order, starting at the given
    /// name/kind when supplied. Pagination is followed to exhaustion;
    /// record kinds outside {A, AAAA, CNAME, TXT} are skipped.
    async fn list_record_sets(
        &self,
        start_name: Option<&str>,
        start_kind: Option<RecordKind>,
    ) -> Result<Vec<RecordSet>, ProviderError>;

    /// Apply an ordered change batch atomically.
    async fn apply_changes(&self, changes: Vec<Change>) -> Result<(), ProviderError>;
}
