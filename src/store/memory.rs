// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory implementation of the metadata store.
//!
//! Observably equivalent to the MySQL keeper, including cascade deletes,
//! conflict detection, and the publish-gated commit: each mutation
//! validates, awaits the publish step, then commits under the lock,
//! re-checking for writers that won the race during the publish window.
//! Used by the test suite and for local development without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::constants::EMPTY_SENTINEL_LABEL;
use crate::names::{canon, escape_wildcard, prefix_of, quote_txt, random_secret, root_of};
use crate::records::{Payload, RecordKind};

use super::models::{FrozenPrefix, RecordRow, SubRecordRow, Token};
use super::{unix_timestamp, Keeper, Publish, StoreError};

#[derive(Default)]
struct Inner {
    next_id: i64,
    frozen: HashMap<String, FrozenPrefix>,
    tokens: HashMap<String, Token>,
    records_a: HashMap<String, RecordRow>,
    records_txt: HashMap<String, RecordRow>,
    records_cname: HashMap<String, RecordRow>,
    sub_records: HashMap<String, SubRecordRow>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn table_mut(&mut self, kind: RecordKind) -> &mut HashMap<String, RecordRow> {
        match kind {
            RecordKind::A | RecordKind::Aaaa => &mut self.records_a,
            RecordKind::Txt => &mut self.records_txt,
            RecordKind::Cname => &mut self.records_cname,
        }
    }

    fn table(&self, kind: RecordKind) -> &HashMap<String, RecordRow> {
        match kind {
            RecordKind::A | RecordKind::Aaaa => &self.records_a,
            RecordKind::Txt => &self.records_txt,
            RecordKind::Cname => &self.records_cname,
        }
    }
}

/// In-memory metadata store.
#[derive(Default)]
pub struct MemoryKeeper {
    inner: Mutex<Inner>,
}

impl MemoryKeeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn root_row_name(payload: &Payload) -> String {
    if payload.wildcard {
        escape_wildcard(&canon(&payload.fqdn))
    } else {
        root_of(&payload.fqdn, false)
    }
}

fn row_content(payload: &Payload) -> String {
    match payload.kind {
        RecordKind::A | RecordKind::Aaaa => payload.hosts.join(","),
        RecordKind::Txt => quote_txt(&payload.text),
        RecordKind::Cname => payload.cname.clone(),
    }
}

#[async_trait]
impl Keeper for MemoryKeeper {
    async fn prefix_is_free(&self, prefix: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(!inner.frozen.contains_key(prefix))
    }

    async fn is_sub_domain(&self, fqdn: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.sub_records.contains_key(&canon(fqdn))
    }

    async fn create(&self, payload: &Payload, publish: Publish<'_>) -> Result<Token, StoreError> {
        let fqdn = canon(&payload.fqdn);
        let prefix = prefix_of(&payload.fqdn, payload.wildcard);

        {
            let inner = self.inner.lock().unwrap();
            if inner.tokens.contains_key(&fqdn) {
                return Err(StoreError::Conflict(format!(
                    "token already exists for {fqdn}"
                )));
            }
        }

        publish.await.map_err(StoreError::Publish)?;

        let now = unix_timestamp();
        let mut inner = self.inner.lock().unwrap();

        // A concurrent create may have won while we were publishing.
        if inner.tokens.contains_key(&fqdn) {
            return Err(StoreError::Conflict(format!(
                "token already exists for {fqdn}"
            )));
        }

        if !inner.frozen.contains_key(&prefix) {
            let id = inner.next_id();
            inner.frozen.insert(
                prefix.clone(),
                FrozenPrefix {
                    id,
                    prefix: prefix.clone(),
                    created_on: now,
                },
            );
        }

        let token_id = inner.next_id();
        let token = Token {
            id: token_id,
            token: random_secret(),
            fqdn: fqdn.clone(),
            created_on: now,
        };
        inner.tokens.insert(fqdn.clone(), token.clone());

        let root_name = root_row_name(payload);
        let root_id = inner.next_id();
        let content = row_content(payload);
        let tag = payload.kind.tag(false);
        inner.table_mut(payload.kind).insert(
            root_name.clone(),
            RecordRow {
                id: root_id,
                fqdn: root_name,
                kind: tag,
                content,
                created_on: now,
                updated_on: None,
                tid: token_id,
            },
        );

        if payload.kind.has_sub_domain() {
            let root = root_of(&payload.fqdn, payload.wildcard);
            let sentinel_name = format!("{EMPTY_SENTINEL_LABEL}.{root}");
            let sentinel_id = inner.next_id();
            inner.records_a.insert(
                sentinel_name.clone(),
                RecordRow {
                    id: sentinel_id,
                    fqdn: sentinel_name,
                    kind: tag,
                    content: String::new(),
                    created_on: now,
                    updated_on: None,
                    tid: token_id,
                },
            );

            if !payload.wildcard {
                let mut subs: Vec<_> = payload.subdomain.iter().collect();
                subs.sort_by_key(|(label, _)| label.to_lowercase());
                let sub_tag = payload.kind.tag(true);
                let rows: Vec<SubRecordRow> = subs
                    .into_iter()
                    .map(|(label, values)| SubRecordRow {
                        id: 0,
                        fqdn: format!("{}.{root}", label.to_lowercase()),
                        kind: sub_tag,
                        content: values.join(","),
                        created_on: now,
                        updated_on: None,
                        pid: sentinel_id,
                    })
                    .collect();
                for mut row in rows {
                    row.id = inner.next_id();
                    inner.sub_records.insert(row.fqdn.clone(), row);
                }
            }
        }

        Ok(token)
    }

    async fn attach(
        &self,
        payload: &Payload,
        owner_id: i64,
        publish: Publish<'_>,
    ) -> Result<(), StoreError> {
        let fqdn = canon(&payload.fqdn);

        {
            let inner = self.inner.lock().unwrap();
            if inner.records_txt.contains_key(&fqdn) {
                return Err(StoreError::Conflict(format!(
                    "record already exists for {fqdn}"
                )));
            }
        }

        publish.await.map_err(StoreError::Publish)?;

        let now = unix_timestamp();
        let mut inner = self.inner.lock().unwrap();

        if inner.records_txt.contains_key(&fqdn) {
            return Err(StoreError::Conflict(format!(
                "record already exists for {fqdn}"
            )));
        }

        let id = inner.next_id();
        inner.records_txt.insert(
            fqdn.clone(),
            RecordRow {
                id,
                fqdn,
                kind: payload.kind.tag(false),
                content: quote_txt(&payload.text),
                created_on: now,
                updated_on: None,
                tid: owner_id,
            },
        );

        Ok(())
    }

    async fn update(&self, payload: &Payload, publish: Publish<'_>) -> Result<(), StoreError> {
        let fqdn = canon(&payload.fqdn);
        let root_name = root_row_name(payload);

        {
            let inner = self.inner.lock().unwrap();
            if !inner.table(payload.kind).contains_key(&root_name) {
                return Err(StoreError::NotFound(format!("record for {fqdn}")));
            }
        }

        publish.await.map_err(StoreError::Publish)?;

        let now = unix_timestamp();
        let mut inner = self.inner.lock().unwrap();

        let content = row_content(payload);
        {
            let row = inner
                .table_mut(payload.kind)
                .get_mut(&root_name)
                .ok_or_else(|| StoreError::NotFound(format!("record for {fqdn}")))?;
            row.content = content;
            row.updated_on = Some(now);
        }

        if payload.kind.has_sub_domain() && !payload.wildcard {
            let root = root_of(&payload.fqdn, payload.wildcard);
            let sentinel_name = format!("{EMPTY_SENTINEL_LABEL}.{root}");
            let sentinel_id = inner
                .records_a
                .get(&sentinel_name)
                .map(|row| row.id)
                .ok_or_else(|| StoreError::NotFound(format!("sentinel row for {fqdn}")))?;

            let existing: Vec<String> = inner
                .sub_records
                .values()
                .filter(|sub| sub.pid == sentinel_id)
                .map(|sub| sub.fqdn.clone())
                .collect();

            for sub_fqdn in &existing {
                let prefix = sub_fqdn.split('.').next().unwrap_or_default();
                if !payload.subdomain.contains_key(prefix) {
                    inner.sub_records.remove(sub_fqdn);
                }
            }

            let sub_tag = payload.kind.tag(true);
            let mut desired: Vec<_> = payload.subdomain.iter().collect();
            desired.sort_by_key(|(label, _)| label.to_lowercase());
            for (label, values) in desired {
                let sub_name = format!("{}.{root}", label.to_lowercase());
                if let Some(row) = inner.sub_records.get_mut(&sub_name) {
                    row.content = values.join(",");
                    row.updated_on = Some(now);
                } else {
                    let id = inner.next_id();
                    inner.sub_records.insert(
                        sub_name.clone(),
                        SubRecordRow {
                            id,
                            fqdn: sub_name,
                            kind: sub_tag,
                            content: values.join(","),
                            created_on: now,
                            updated_on: None,
                            pid: sentinel_id,
                        },
                    );
                }
            }
        }

        Ok(())
    }

    async fn delete(&self, payload: &Payload, publish: Publish<'_>) -> Result<(), StoreError> {
        let fqdn = canon(&payload.fqdn);
        let root_name = root_row_name(payload);

        {
            let inner = self.inner.lock().unwrap();
            if !inner.table(payload.kind).contains_key(&root_name) {
                return Err(StoreError::NotFound(format!("record for {fqdn}")));
            }
        }

        publish.await.map_err(StoreError::Publish)?;

        let mut inner = self.inner.lock().unwrap();

        if payload.kind.has_sub_domain() {
            let root = root_of(&payload.fqdn, payload.wildcard);
            let sentinel_name = format!("{EMPTY_SENTINEL_LABEL}.{root}");
            if let Some(sentinel) = inner.records_a.remove(&sentinel_name) {
                inner.sub_records.retain(|_, sub| sub.pid != sentinel.id);
            }
        }

        if inner.table_mut(payload.kind).remove(&root_name).is_none() {
            return Err(StoreError::NotFound(format!("record for {fqdn}")));
        }

        Ok(())
    }

    async fn renew(&self, payload: &Payload) -> Result<Token, StoreError> {
        let fqdn = canon(&payload.fqdn);
        let prefix = prefix_of(&payload.fqdn, payload.wildcard);
        let now = unix_timestamp();

        let mut inner = self.inner.lock().unwrap();

        let token = inner
            .tokens
            .get_mut(&fqdn)
            .ok_or_else(|| StoreError::NotFound(format!("token for {fqdn}")))?;
        token.created_on = now;
        let token = token.clone();

        if let Some(frozen) = inner.frozen.get_mut(&prefix) {
            frozen.created_on = now;
        }

        Ok(token)
    }

    async fn get_token(&self, fqdn: &str) -> Result<Option<Token>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.get(&canon(fqdn)).cloned())
    }

    async fn get_token_by_id(&self, id: i64) -> Result<Option<Token>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.values().find(|t| t.id == id).cloned())
    }

    async fn count_tokens(&self) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.len() as i64)
    }

    async fn expired_tokens(&self, cutoff: i64) -> Result<Vec<Token>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut tokens: Vec<Token> = inner
            .tokens
            .values()
            .filter(|t| t.created_on <= cutoff)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.id);
        Ok(tokens)
    }

    async fn delete_token(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        inner.tokens.retain(|_, t| t.id != id);

        // Cascade exactly like the SQL FKs: record rows through the token,
        // sub rows through their record_a parent.
        let mut parent_ids = Vec::new();
        inner.records_a.retain(|_, row| {
            if row.tid == id {
                parent_ids.push(row.id);
                false
            } else {
                true
            }
        });
        inner.records_txt.retain(|_, row| {
            if row.tid == id {
                parent_ids.push(row.id);
                false
            } else {
                true
            }
        });
        inner.records_cname.retain(|_, row| {
            if row.tid == id {
                parent_ids.push(row.id);
                false
            } else {
                true
            }
        });
        inner
            .sub_records
            .retain(|_, sub| !parent_ids.contains(&sub.pid));

        Ok(())
    }

    async fn purge_frozen_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.frozen.len();
        inner.frozen.retain(|_, f| f.created_on > cutoff);
        Ok((before - inner.frozen.len()) as u64)
    }

    async fn record_for(
        &self,
        fqdn: &str,
        kind: RecordKind,
    ) -> Result<Option<RecordRow>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.table(kind).get(fqdn).cloned())
    }

    async fn sub_records(&self, parent_id: i64) -> Result<Vec<SubRecordRow>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<SubRecordRow> = inner
            .sub_records
            .values()
            .filter(|sub| sub.pid == parent_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        Ok(rows)
    }

    async fn token_record_rows(&self, token_id: i64) -> Result<Vec<RecordRow>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows = Vec::new();
        for table in [&inner.records_a, &inner.records_txt, &inner.records_cname] {
            rows.extend(table.values().filter(|row| row.tid == token_id).cloned());
        }
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

