// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The record lifecycle manager.
//!
//! One state machine per FQDN, driven by the API verbs and the expiry
//! daemon: `Free -> Minted -> Live <-> Renewed -> Expiring -> Free`.
//! Every mutation follows the same shape: plan the rows in a metadata
//! store transaction, publish the change batch to the authoritative
//! provider, and commit only on publish success. A failed publish rolls
//! the transaction back so neither store carries residue; divergence
//! left by a crash between publish and commit is repaired by the next
//! expiry sweep.
//!
//! Name fan-out rules:
//! - A/AAAA roots always carry a wildcard sibling (`\052.fqdn`) with the
//!   same values, so any label under an issued name resolves.
//! - Sub-names are absolute children of the root and share its token.
//! - Wildcard-issued names (`*.x.zone`) are stored escaped and fan out
//!   to nothing else.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Settings;
use crate::constants::{EMPTY_SENTINEL_LABEL, MAX_SLUG_HASH_TIMES, WILDCARD_ESCAPED};
use crate::errors::ApiError;
use crate::names::{
    canon, escape_wildcard, host_kind, quote_txt, random_slug, root_of, strip_first_label,
    unquote_txt,
};
use crate::provider::{Change, DnsProvider, ProviderError};
use crate::records::{Domain, Payload, RecordKind};
use crate::store::{Keeper, Publish, RecordRow, Token};
use crate::token;

/// The core lifecycle manager.
pub struct Lifecycle {
    keeper: Arc<dyn Keeper>,
    provider: Arc<dyn DnsProvider>,
    zone: String,
    ttl: i64,
    expire: i64,
}

/// The stored row name a payload targets: escaped form for wildcard
/// records, canonical root otherwise.
fn row_name(payload: &Payload) -> String {
    if payload.wildcard {
        escape_wildcard(&canon(&payload.fqdn))
    } else {
        root_of(&payload.fqdn, false)
    }
}

/// The provider-side values a stored row deletes with.
///
/// TXT and CNAME content is a single value (TXT keeps its quotes and may
/// contain commas); address content splits on commas.
fn row_values(row: &RecordRow) -> Vec<String> {
    match row.kind {
        0 | 3 => vec![row.content.clone()],
        _ => row.values(),
    }
}

impl Lifecycle {
    /// Build the manager. The zone comes from the provider, which has
    /// already verified it against the configured domain.
    #[must_use]
    pub fn new(
        keeper: Arc<dyn Keeper>,
        provider: Arc<dyn DnsProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            zone: provider.zone().name.clone(),
            keeper,
            provider,
            ttl: settings.ttl_secs(),
            expire: settings.expire_secs(),
        }
    }

    /// The hosted zone this manager issues names under.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    // ===== Create =====

    /// Create a record set for the payload, minting a fresh FQDN when
    /// none is supplied. Returns the domain view with the raw token
    /// secret; the HTTP boundary wraps it before it leaves the process.
    ///
    /// A supplied FQDN whose root is already issued requires the owning
    /// token's bearer; a TXT payload under an issued name then attaches
    /// to the owner instead of minting (`_acme-challenge.` and friends).
    ///
    /// # Errors
    ///
    /// `NameExhausted` when every slug draw collides, `Conflict` when
    /// the FQDN is already owned, `Forbidden` when a supplied name under
    /// an issued root lacks its bearer, `Provider` when the batch is
    /// rejected.
    pub async fn create(
        &self,
        mut payload: Payload,
        bearer: Option<&str>,
    ) -> Result<Domain, ApiError> {
        if !payload.fqdn.is_empty() {
            let canonical = canon(&payload.fqdn);
            if let Some(owner) = self.find_owner(&canonical).await? {
                let bearer = bearer.ok_or(ApiError::Unauthenticated)?;
                self.verify_bearer(&owner, bearer).await?;

                if owner.fqdn != canonical {
                    return self.attach(&payload, &owner).await;
                }
                // POST on the issued name itself falls through and
                // surfaces as a conflict from the keeper.
            }
        }

        self.mint(&mut payload).await?;

        let changes = self.upsert_changes(&payload);
        let provider = self.provider.clone();
        let publish: Publish<'_> = Box::pin(async move { provider.apply_changes(changes).await });

        let token = self.keeper.create(&payload, publish).await?;
        debug!(fqdn = %token.fqdn, kind = %payload.kind, "record created");

        Ok(self.domain_from_payload(&payload, &token, true))
    }

    /// Attach a TXT record beneath an issued name, bound to the owner's
    /// token.
    async fn attach(&self, payload: &Payload, owner: &Token) -> Result<Domain, ApiError> {
        if payload.kind != RecordKind::Txt {
            return Err(ApiError::Invalid(
                "only TXT records can be attached beneath an issued name".to_string(),
            ));
        }

        let changes = self.upsert_changes(payload);
        let provider = self.provider.clone();
        let publish: Publish<'_> = Box::pin(async move { provider.apply_changes(changes).await });

        self.keeper.attach(payload, owner.id, publish).await?;
        debug!(fqdn = %canon(&payload.fqdn), owner = %owner.fqdn, "txt record attached");

        Ok(self.domain_from_payload(payload, owner, false))
    }

    /// Fill in a freshly minted FQDN when the payload does not carry one.
    async fn mint(&self, payload: &mut Payload) -> Result<(), ApiError> {
        if !payload.fqdn.is_empty() {
            return Ok(());
        }

        for _ in 0..MAX_SLUG_HASH_TIMES {
            let slug = random_slug();

            if !self.keeper.prefix_is_free(&slug).await? {
                continue;
            }

            // A free prefix can still shadow a record created outside
            // this service; probe the provider before accepting.
            let candidate = format!("{slug}.{}", self.zone);
            match self.provider_has_records(&candidate, RecordKind::A).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    debug!(candidate = %candidate, error = %err, "provider probe failed, accepting slug");
                }
            }

            payload.fqdn = if payload.wildcard {
                format!("*.{candidate}")
            } else {
                candidate
            };
            debug!(fqdn = %payload.fqdn, "minted name");
            return Ok(());
        }

        Err(ApiError::NameExhausted)
    }

    async fn provider_has_records(
        &self,
        name: &str,
        kind: RecordKind,
    ) -> Result<bool, ProviderError> {
        let sets = self.provider.list_record_sets(Some(name), Some(kind)).await?;
        Ok(sets
            .iter()
            .any(|set| canon(&set.name) == name && set.kind == kind))
    }

    // ===== Read =====

    /// Read the record set for the payload's FQDN and kind.
    ///
    /// # Errors
    ///
    /// `NotFound` when no row exists or the stored address family does
    /// not match the requested kind.
    pub async fn read(&self, payload: &Payload) -> Result<Domain, ApiError> {
        let name = row_name(payload);
        let row = self
            .keeper
            .record_for(&name, payload.kind)
            .await?
            .ok_or_else(|| ApiError::NotFound(canon(&payload.fqdn)))?;

        if payload.kind.has_sub_domain() {
            let family = row.values().first().map(|v| host_kind(v));
            if family != Some(payload.kind) {
                return Err(ApiError::NotFound(canon(&payload.fqdn)));
            }
        }

        let token = self.keeper.get_token_by_id(row.tid).await?;

        let mut domain = Domain {
            fqdn: canon(&payload.fqdn),
            kind: payload.kind,
            expiration: token.as_ref().map(|t| t.expiration(self.expire)),
            ..Domain::default()
        };

        match payload.kind {
            RecordKind::A | RecordKind::Aaaa => {
                domain.hosts = row.values();
                if !payload.wildcard {
                    for sub in self.current_subs(payload).await? {
                        domain.subdomain.insert(sub.prefix(), sub.values());
                    }
                }
            }
            RecordKind::Txt => domain.text = unquote_txt(&row.content).to_string(),
            RecordKind::Cname => domain.cname = row.content.clone(),
        }

        Ok(domain)
    }

    async fn current_subs(
        &self,
        payload: &Payload,
    ) -> Result<Vec<crate::store::SubRecordRow>, ApiError> {
        let root = root_of(&payload.fqdn, payload.wildcard);
        let sentinel_name = format!("{EMPTY_SENTINEL_LABEL}.{root}");
        let Some(sentinel) = self.keeper.record_for(&sentinel_name, payload.kind).await? else {
            return Ok(Vec::new());
        };
        Ok(self.keeper.sub_records(sentinel.id).await?)
    }

    // ===== Update =====

    /// Update the record set, preserving the token. Sub-domain diffing
    /// for A/AAAA: desired entries are UPSERTed, stored entries missing
    /// from the payload are DELETEd, and the root plus its wildcard
    /// sibling are always re-UPSERTed.
    ///
    /// # Errors
    ///
    /// `Conflict` when the wildcard flag does not match the stored
    /// record, `NotFound` when nothing exists to update.
    pub async fn update(&self, payload: &Payload) -> Result<Domain, ApiError> {
        let name = row_name(payload);
        let Some(existing) = self.keeper.record_for(&name, payload.kind).await? else {
            return Err(self.wildcard_mismatch_or_not_found(payload).await);
        };

        let mut changes = self.upsert_changes(payload);

        if payload.kind.has_sub_domain() && !payload.wildcard {
            for sub in self.current_subs(payload).await? {
                if !payload.subdomain.contains_key(&sub.prefix()) {
                    changes.push(Change::delete(
                        payload.kind,
                        sub.fqdn.clone(),
                        self.ttl,
                        sub.values(),
                    ));
                }
            }
        }

        let provider = self.provider.clone();
        let publish: Publish<'_> = Box::pin(async move { provider.apply_changes(changes).await });
        self.keeper.update(payload, publish).await?;

        let token = self.keeper.get_token_by_id(existing.tid).await?;
        Ok(self.domain_from_payload(payload, token.as_ref(), false))
    }

    /// Distinguish a wildcard-flag mismatch (conflict) from a genuinely
    /// absent record (not-found).
    async fn wildcard_mismatch_or_not_found(&self, payload: &Payload) -> ApiError {
        let other_form = if payload.wildcard {
            root_of(&payload.fqdn, true)
        } else {
            format!("{WILDCARD_ESCAPED}.{}", canon(&payload.fqdn))
        };
        match self.keeper.record_for(&other_form, payload.kind).await {
            Ok(Some(_)) => {
                ApiError::Conflict("wildcard flag does not match the stored record".to_string())
            }
            _ => ApiError::NotFound(canon(&payload.fqdn)),
        }
    }

    // ===== Delete =====

    /// Delete the record set: one provider batch covering the root, its
    /// wildcard sibling, and every sub-name, then the metadata rows.
    /// The token row stays behind for the expiry daemon.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing exists to delete.
    pub async fn delete(&self, payload: &Payload) -> Result<(), ApiError> {
        let name = row_name(payload);
        let row = self
            .keeper
            .record_for(&name, payload.kind)
            .await?
            .ok_or_else(|| ApiError::NotFound(canon(&payload.fqdn)))?;

        let mut changes = Vec::new();
        if !row_values(&row).is_empty() {
            changes.push(Change::delete(
                payload.kind,
                row.fqdn.clone(),
                self.ttl,
                row_values(&row),
            ));
        }

        if payload.kind.has_sub_domain() && !payload.wildcard {
            let root = root_of(&payload.fqdn, false);
            if !row_values(&row).is_empty() {
                changes.push(Change::delete(
                    payload.kind,
                    format!("{WILDCARD_ESCAPED}.{root}"),
                    self.ttl,
                    row_values(&row),
                ));
            }
            for sub in self.current_subs(payload).await? {
                changes.push(Change::delete(
                    payload.kind,
                    sub.fqdn.clone(),
                    self.ttl,
                    sub.values(),
                ));
            }
        }

        let provider = self.provider.clone();
        let fqdn = canon(&payload.fqdn);
        let publish: Publish<'_> = Box::pin(async move {
            match provider.apply_changes(changes).await {
                // Already absent on the provider side; the desired state
                // holds and the metadata delete may proceed.
                Err(ProviderError::Gone(msg)) => {
                    debug!(fqdn = %fqdn, msg = %msg, "provider records already gone");
                    Ok(())
                }
                other => other,
            }
        });

        self.keeper.delete(payload, publish).await?;
        Ok(())
    }

    // ===== Renew =====

    /// Extend the lease: bump the token and frozen-prefix timestamps.
    /// No provider traffic; record TTLs are independent of the lease.
    ///
    /// # Errors
    ///
    /// `NotFound` when the token is gone or its records were deleted
    /// (renew-after-delete).
    pub async fn renew(&self, payload: &Payload) -> Result<Domain, ApiError> {
        let fqdn = canon(&payload.fqdn);
        let token = self
            .keeper
            .get_token(&fqdn)
            .await?
            .ok_or_else(|| ApiError::NotFound(fqdn.clone()))?;

        let rows = self.keeper.token_record_rows(token.id).await?;
        if rows.is_empty() {
            return Err(ApiError::NotFound(fqdn));
        }

        let token = self.keeper.renew(payload).await?;

        Ok(Domain {
            fqdn: token.fqdn.clone(),
            kind: payload.kind,
            expiration: Some(token.expiration(self.expire)),
            ..Domain::default()
        })
    }

    // ===== List =====

    /// Every record set in the zone, one domain view per set. Paginated
    /// sweep; slow on very large zones.
    ///
    /// # Errors
    ///
    /// `Provider` when the list call fails.
    pub async fn list(&self) -> Result<Vec<Domain>, ApiError> {
        let sets = self
            .provider
            .list_record_sets(None, None)
            .await
            .map_err(ApiError::Provider)?;

        Ok(sets
            .into_iter()
            .map(|set| {
                let mut domain = Domain {
                    fqdn: canon(&set.name),
                    kind: set.kind,
                    ..Domain::default()
                };
                match set.kind {
                    RecordKind::Txt => {
                        domain.text = set
                            .values
                            .first()
                            .map(|v| unquote_txt(v).to_string())
                            .unwrap_or_default();
                    }
                    RecordKind::Cname => {
                        domain.cname = set.values.first().cloned().unwrap_or_default();
                    }
                    RecordKind::A | RecordKind::Aaaa => domain.hosts = set.values,
                }
                domain
            })
            .collect())
    }

    // ===== Authorisation =====

    /// Check a bearer against the token owning `fqdn`.
    ///
    /// Leading labels are trimmed until the remaining suffix matches an
    /// issued token, so a TXT name attached under an issued A/AAAA name
    /// authorises against the parent's token.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` when the bearer is empty, `Forbidden` when no
    /// matching token verifies.
    pub async fn authorize(&self, fqdn: &str, bearer: &str) -> Result<(), ApiError> {
        if bearer.is_empty() {
            return Err(ApiError::Unauthenticated);
        }

        let owner = self
            .find_owner(fqdn)
            .await?
            .ok_or(ApiError::Forbidden)?;
        self.verify_bearer(&owner, bearer).await
    }

    /// The token owning `fqdn`, found by trimming leading labels until
    /// the remaining suffix matches an issued name. Once a label has
    /// been trimmed the wildcard form of the suffix is probed too, so
    /// names under a wildcard-issued `*.x.zone` resolve to its token.
    pub async fn find_owner(&self, fqdn: &str) -> Result<Option<Token>, ApiError> {
        let zone_depth = self.zone.split('.').count();
        let mut name = canon(fqdn);
        let mut trimmed = false;

        loop {
            if let Some(owner) = self.keeper.get_token(&name).await? {
                return Ok(Some(owner));
            }
            if trimmed {
                if let Some(owner) = self.keeper.get_token(&format!("*.{name}")).await? {
                    return Ok(Some(owner));
                }
            }
            if name.split('.').count() <= zone_depth + 1 {
                return Ok(None);
            }
            name = strip_first_label(&name);
            trimmed = true;
        }
    }

    async fn verify_bearer(&self, owner: &Token, bearer: &str) -> Result<(), ApiError> {
        if bearer.is_empty() {
            return Err(ApiError::Unauthenticated);
        }
        let bearer = bearer.to_string();
        let secret = owner.token.clone();
        let verified = tokio::task::spawn_blocking(move || token::verify(&bearer, &secret))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if verified {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    // ===== Expiry (system mode) =====

    /// Delete everything an expired token owns, with no auth check: one
    /// cascaded pass over the token's record rows instead of blind
    /// per-type probing. Errors are reported to the caller, which treats
    /// them as transient and retries on the next sweep.
    ///
    /// # Errors
    ///
    /// Propagates the first store or provider failure.
    pub async fn retire(&self, token: &Token) -> Result<(), ApiError> {
        let rows = self.keeper.token_record_rows(token.id).await?;

        for row in rows {
            if row.fqdn.starts_with(&format!("{EMPTY_SENTINEL_LABEL}.")) {
                continue;
            }

            let kind = match row.kind {
                0 => RecordKind::Txt,
                3 => RecordKind::Cname,
                _ => row.values().first().map_or(RecordKind::A, |v| host_kind(v)),
            };

            let mut payload = Payload {
                fqdn: canon(&row.fqdn),
                kind,
                ..Payload::default()
            };
            payload.wildcard = payload.fqdn.starts_with('*');

            if let Err(err) = self.delete(&payload).await {
                warn!(fqdn = %payload.fqdn, error = %err, "failed to retire record, will retry next sweep");
                return Err(err);
            }
        }

        Ok(())
    }

    // ===== Internals =====

    /// The UPSERT batch for a payload: root record, wildcard sibling for
    /// non-wildcard A/AAAA, and one change per sub-name. Names leave
    /// here wildcard-escaped; TXT values leave quoted.
    fn upsert_changes(&self, payload: &Payload) -> Vec<Change> {
        let mut changes = Vec::new();
        let name = escape_wildcard(&canon(&payload.fqdn));

        match payload.kind {
            RecordKind::A | RecordKind::Aaaa => {
                // A payload may carry sub-domains only; empty value sets
                // never reach the provider.
                if !payload.hosts.is_empty() {
                    changes.push(Change::upsert(
                        payload.kind,
                        name,
                        self.ttl,
                        payload.hosts.clone(),
                    ));
                }

                if !payload.wildcard {
                    let root = root_of(&payload.fqdn, false);
                    if !payload.hosts.is_empty() {
                        changes.push(Change::upsert(
                            payload.kind,
                            format!("{WILDCARD_ESCAPED}.{root}"),
                            self.ttl,
                            payload.hosts.clone(),
                        ));
                    }

                    let mut subs: Vec<_> = payload.subdomain.iter().collect();
                    subs.sort_by_key(|(label, _)| label.to_lowercase());
                    for (label, values) in subs {
                        if values.is_empty() {
                            continue;
                        }
                        changes.push(Change::upsert(
                            payload.kind,
                            format!("{}.{root}", label.to_lowercase()),
                            self.ttl,
                            values.clone(),
                        ));
                    }
                }
            }
            RecordKind::Txt => changes.push(Change::upsert(
                RecordKind::Txt,
                name,
                self.ttl,
                vec![quote_txt(&payload.text)],
            )),
            RecordKind::Cname => changes.push(Change::upsert(
                RecordKind::Cname,
                name,
                self.ttl,
                vec![payload.cname.clone()],
            )),
        }

        changes
    }

    fn domain_from_payload<'a>(
        &self,
        payload: &Payload,
        token: impl Into<Option<&'a Token>>,
        include_secret: bool,
    ) -> Domain {
        let token = token.into();
        Domain {
            fqdn: canon(&payload.fqdn),
            hosts: payload.hosts.clone(),
            subdomain: payload.subdomain.clone(),
            text: payload.text.clone(),
            cname: payload.cname.clone(),
            kind: payload.kind,
            token: if include_secret {
                token.map(|t| t.token.clone()).unwrap_or_default()
            } else {
                String::new()
            },
            expiration: token.map(|t| t.expiration(self.expire)),
        }
    }
}

