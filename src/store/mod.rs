// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Transactional metadata store.
//!
//! The store is the planning ledger for every mutation: tokens, frozen
//! prefixes, and record rows live here, and the [`Keeper`] trait is the
//! capability the lifecycle manager consumes. Two implementations ship:
//! [`rds::RdsKeeper`] over MySQL for production and
//! [`memory::MemoryKeeper`] for tests and local development.
//!
//! Every state-changing operation runs inside a single transaction; on
//! any error the transaction rolls back and no partial rows remain.

pub mod memory;
pub mod migrate;
pub mod models;
pub mod rds;


use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::records::Payload;

pub use memory::MemoryKeeper;
pub use models::{FrozenPrefix, RecordRow, SubRecordRow, Token};
pub use rds::RdsKeeper;

/// Current time as Unix seconds.
///
/// All persisted timestamps use this precision; cutoff arithmetic in the
/// expiry daemon depends on it staying consistent.
#[must_use]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The provider-publish step of a mutation.
///
/// Built by the lifecycle manager and awaited by the keeper inside the
/// transaction window: rows are planned first, the publish future then
/// applies the change batch to the provider, and only its success lets
/// the transaction commit. A publish failure rolls everything back so no
/// partial rows remain.
pub type Publish<'a> = Pin<Box<dyn Future<Output = Result<(), ProviderError>> + Send + 'a>>;

/// A publish step that touches no provider state; used where a mutation
/// is metadata-only.
#[must_use]
pub fn no_publish() -> Publish<'static> {
    Box::pin(async { Ok(()) })
}

/// Store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness or serialization conflict; callers may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The provider rejected the publish step; the transaction rolled
    /// back.
    #[error(transparent)]
    Publish(ProviderError),

    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Could not reach or open the database.
    #[error("connection error: {0}")]
    Connection(String),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Any other query failure.
    #[error("query error: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(err.to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Connection(err.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}

/// Capability set of the metadata store.
///
/// Mirrors the record lifecycle: mint-time bookkeeping (`create`),
/// content mutation (`update`), record retirement (`delete`), lease
/// extension (`renew`), and the token/prefix queries the auth layer and
/// the expiry daemon run.
#[async_trait]
pub trait Keeper: Send + Sync {
    /// True iff no frozen-prefix row exists for `prefix`.
    async fn prefix_is_free(&self, prefix: &str) -> Result<bool, StoreError>;

    /// True iff `fqdn` is a known sub-domain record.
    async fn is_sub_domain(&self, fqdn: &str) -> bool;

    /// Mint-time bookkeeping in one transaction: frozen prefix, token,
    /// root row, empty sentinel, and sub rows, in that order. Sub rows
    /// are inserted sorted by their lower-cased prefix label. `publish`
    /// runs after the rows are planned and gates the commit.
    ///
    /// Fails with [`StoreError::Conflict`] if a token for the FQDN
    /// already exists.
    async fn create(&self, payload: &Payload, publish: Publish<'_>) -> Result<Token, StoreError>;

    /// Insert a TXT row owned by an existing token: the side-channel
    /// that lets a challenge record attach beneath an issued name
    /// without minting a new token. `publish` gates the commit.
    ///
    /// Fails with [`StoreError::Conflict`] if the row already exists.
    async fn attach(
        &self,
        payload: &Payload,
        owner_id: i64,
        publish: Publish<'_>,
    ) -> Result<(), StoreError>;

    /// Update root content and diff the sub-record set against the
    /// payload: add missing, update changed, delete orphans. `publish`
    /// gates the commit.
    ///
    /// Ownership is carried by the record row (`tid`), not re-derived
    /// from the FQDN: a TXT row attached to an issued name updates under
    /// its parent's token.
    async fn update(&self, payload: &Payload, publish: Publish<'_>) -> Result<(), StoreError>;

    /// Delete the record rows for the payload's FQDN in
    /// reverse-dependency order (subs, sentinel, root). The token row is
    /// left behind; the expiry daemon owns token deletion. `publish`
    /// gates the commit.
    async fn delete(&self, payload: &Payload, publish: Publish<'_>) -> Result<(), StoreError>;

    /// Bump the token and frozen-prefix timestamps to now.
    async fn renew(&self, payload: &Payload) -> Result<Token, StoreError>;

    /// Look up the token owning `fqdn` (canonical form).
    async fn get_token(&self, fqdn: &str) -> Result<Option<Token>, StoreError>;

    /// Look up a token by its surrogate id.
    async fn get_token_by_id(&self, id: i64) -> Result<Option<Token>, StoreError>;

    /// Total number of live tokens; sampled by the metrics gauge.
    async fn count_tokens(&self) -> Result<i64, StoreError>;

    /// Tokens whose `created_on` is at or before `cutoff`.
    async fn expired_tokens(&self, cutoff: i64) -> Result<Vec<Token>, StoreError>;

    /// Cascade-delete one token; record rows follow through the FKs.
    async fn delete_token(&self, id: i64) -> Result<(), StoreError>;

    /// Release frozen prefixes whose `created_on` is at or before `cutoff`.
    async fn purge_frozen_before(&self, cutoff: i64) -> Result<u64, StoreError>;

    /// The root record row for `fqdn` of the given kind, if any.
    async fn record_for(
        &self,
        fqdn: &str,
        kind: crate::records::RecordKind,
    ) -> Result<Option<RecordRow>, StoreError>;

    /// Sub-record rows parented by the given sentinel row.
    async fn sub_records(&self, parent_id: i64) -> Result<Vec<SubRecordRow>, StoreError>;

    /// Every record row (across all record tables) owned by a token.
    /// Drives the cascaded delete in the expiry daemon.
    async fn token_record_rows(&self, token_id: i64) -> Result<Vec<RecordRow>, StoreError>;
}
