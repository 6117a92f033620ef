// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory implementation of the DNS provider port.
//!
//! Keeps resource-record-sets in a `BTreeMap` so list order matches the
//! provider's ASCII ordering, applies change batches atomically, and
//! offers a [`MemoryProvider::resolve`] helper that answers the way a
//! resolver would, wildcard fallback included. Used by the test suite.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::names::{canon, ensure_trailing_dot, escape_wildcard, strip_first_label};
use crate::records::RecordKind;

use super::{Change, ChangeAction, DnsProvider, ProviderError, RecordSet, ZoneInfo};

type SetKey = (String, &'static str);

/// In-memory DNS provider.
pub struct MemoryProvider {
    zone: ZoneInfo,
    sets: Mutex<BTreeMap<SetKey, RecordSet>>,
}

impl MemoryProvider {
    /// A provider serving the given zone.
    #[must_use]
    pub fn new(zone_name: &str) -> Self {
        Self {
            zone: ZoneInfo {
                name: canon(zone_name),
                id: "Z-MEMORY".to_string(),
            },
            sets: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(name: &str, kind: RecordKind) -> SetKey {
        (
            ensure_trailing_dot(&escape_wildcard(&canon(name))),
            kind.as_str(),
        )
    }

    /// Answer a query the way a resolver would: exact match first, then
    /// the wildcard covering the name. Returns the stored values
    /// (TXT values keep their quotes).
    #[must_use]
    pub fn resolve(&self, name: &str, kind: RecordKind) -> Vec<String> {
        let sets = self.sets.lock().unwrap();
        if let Some(set) = sets.get(&Self::key(name, kind)) {
            return set.values.clone();
        }
        let wildcard = format!("*.{}", strip_first_label(name));
        sets.get(&Self::key(&wildcard, kind))
            .map(|set| set.values.clone())
            .unwrap_or_default()
    }

    /// Number of stored record sets; test bookkeeping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.lock().unwrap().len()
    }

    /// True when the zone holds no record sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DnsProvider for MemoryProvider {
    fn zone(&self) -> &ZoneInfo {
        &self.zone
    }

    async fn list_record_sets(
        &self,
        start_name: Option<&str>,
        start_kind: Option<RecordKind>,
    ) -> Result<Vec<RecordSet>, ProviderError> {
        let sets = self.sets.lock().unwrap();
        let start = start_name.map(|name| {
            (
                ensure_trailing_dot(&escape_wildcard(&canon(name))),
                start_kind.map_or("", RecordKind::as_str),
            )
        });

        Ok(sets
            .iter()
            .filter(|((name, kind), _)| {
                start.as_ref().map_or(true, |(s_name, s_kind)| {
                    (name.as_str(), *kind) >= (s_name.as_str(), *s_kind)
                })
            })
            .map(|(_, set)| set.clone())
            .collect())
    }

    async fn apply_changes(&self, changes: Vec<Change>) -> Result<(), ProviderError> {
        let mut sets = self.sets.lock().unwrap();

        // Validate and stage the whole batch before touching the zone, so
        // a bad change leaves no partial state behind.
        let mut staged = sets.clone();
        for change in &changes {
            let key = Self::key(&change.name, change.kind);
            match change.action {
                ChangeAction::Upsert => {
                    if change.values.is_empty() {
                        return Err(ProviderError::InvalidChange(format!(
                            "upsert of {} carries no values",
                            change.name
                        )));
                    }
                    staged.insert(
                        key.clone(),
                        RecordSet {
                            name: key.0,
                            kind: change.kind,
                            ttl: change.ttl,
                            values: change.values.clone(),
                        },
                    );
                }
                // Deleting an absent record leaves the desired state
                // already true; nothing to stage.
                ChangeAction::Delete => {
                    staged.remove(&key);
                }
            }
        }

        *sets = staged;
        Ok(())
    }
}

