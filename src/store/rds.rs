// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! MySQL implementation of the metadata store.
//!
//! Every mutation runs in a single transaction pinned to one pool
//! connection; commit happens only after every row lands. The pool is
//! sized for burst absorption and a 10 s acquire timeout bounds waits so
//! a saturated pool surfaces as an error instead of a hang.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPoolOptions, MySqlQueryResult};
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, info};

use crate::config::{MigrateMode, Settings};
use crate::constants::{
    DB_ACQUIRE_TIMEOUT_SECS, DB_MAX_IDLE_CONNECTIONS, DB_MAX_OPEN_CONNECTIONS,
    EMPTY_SENTINEL_LABEL,
};
use crate::names::{canon, escape_wildcard, prefix_of, quote_txt, random_secret, root_of};
use crate::records::{Payload, RecordKind};

use super::models::{RecordRow, SubRecordRow, Token};
use super::{migrate, unix_timestamp, Keeper, Publish, StoreError};

/// Metadata store over MySQL.
#[derive(Clone)]
pub struct RdsKeeper {
    pool: MySqlPool,
}

/// The record table a kind lives in.
const fn table_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::A | RecordKind::Aaaa => "record_a",
        RecordKind::Txt => "record_txt",
        RecordKind::Cname => "record_cname",
    }
}

/// The stored row name for a payload's root record.
///
/// Wildcard rows keep the escaped storage form (`\052.x.zone`); everything
/// else uses the canonical root.
fn root_row_name(payload: &Payload) -> String {
    if payload.wildcard {
        escape_wildcard(&canon(&payload.fqdn))
    } else {
        root_of(&payload.fqdn, false)
    }
}

/// The comma-joined content column value for a payload.
fn row_content(payload: &Payload) -> String {
    match payload.kind {
        RecordKind::A | RecordKind::Aaaa => payload.hosts.join(","),
        RecordKind::Txt => quote_txt(&payload.text),
        RecordKind::Cname => payload.cname.clone(),
    }
}

impl RdsKeeper {
    /// Open the pool and run the requested schema migration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the DSN is unreachable and
    /// [`StoreError::Migration`] when `DB_MIGRATE` fails.
    pub async fn connect(settings: &Settings) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(DB_MAX_OPEN_CONNECTIONS)
            .min_connections(DB_MAX_IDLE_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
            .connect(&settings.db_dsn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        match settings.db_migrate {
            MigrateMode::Up => migrate::up(&pool).await?,
            MigrateMode::Down => migrate::down(&pool).await?,
            MigrateMode::None => {}
        }

        info!("metadata store connected");
        Ok(Self { pool })
    }

    /// Close the pool; used during shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_record(
        tx: &mut Transaction<'_, MySql>,
        table: &str,
        fqdn: &str,
        tag: i8,
        content: &str,
        created_on: i64,
        owner_id: i64,
    ) -> Result<i64, StoreError> {
        let owner_column = if table == "sub_record_a" { "pid" } else { "tid" };
        let sql = format!(
            "INSERT INTO {table} (fqdn, type, content, created_on, {owner_column}) VALUES (?, ?, ?, ?, ?)"
        );
        let result: MySqlQueryResult = sqlx::query(&sql)
            .bind(fqdn)
            .bind(tag)
            .bind(content)
            .bind(created_on)
            .bind(owner_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.last_insert_id() as i64)
    }

    async fn sentinel_id(
        tx: &mut Transaction<'_, MySql>,
        root: &str,
    ) -> Result<Option<i64>, StoreError> {
        let name = format!("{EMPTY_SENTINEL_LABEL}.{root}");
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM record_a WHERE fqdn = ?")
            .bind(&name)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|(id,)| id))
    }
}

#[async_trait]
impl Keeper for RdsKeeper {
    async fn prefix_is_free(&self, prefix: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM frozen_prefix WHERE prefix = ?")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_none())
    }

    async fn is_sub_domain(&self, fqdn: &str) -> bool {
        sqlx::query_as::<_, (String,)>("SELECT fqdn FROM sub_record_a WHERE fqdn = ?")
            .bind(canon(fqdn))
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .is_some()
    }

    async fn create(&self, payload: &Payload, publish: Publish<'_>) -> Result<Token, StoreError> {
        let fqdn = canon(&payload.fqdn);
        let prefix = prefix_of(&payload.fqdn, payload.wildcard);
        let secret = random_secret();
        let now = unix_timestamp();

        let mut tx = self.pool.begin().await?;

        let frozen: Option<(i64,)> = sqlx::query_as("SELECT id FROM frozen_prefix WHERE prefix = ?")
            .bind(&prefix)
            .fetch_optional(&mut *tx)
            .await?;
        if frozen.is_none() {
            sqlx::query("INSERT INTO frozen_prefix (prefix, created_on) VALUES (?, ?)")
                .bind(&prefix)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM token WHERE fqdn = ?")
            .bind(&fqdn)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(StoreError::Conflict(format!(
                "token already exists for {fqdn}"
            )));
        }

        let token_id = sqlx::query("INSERT INTO token (token, fqdn, created_on) VALUES (?, ?, ?)")
            .bind(&secret)
            .bind(&fqdn)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_id() as i64;

        let table = table_for(payload.kind);
        let root_name = root_row_name(payload);
        Self::insert_record(
            &mut tx,
            table,
            &root_name,
            payload.kind.tag(false),
            &row_content(payload),
            now,
            token_id,
        )
        .await?;

        if payload.kind.has_sub_domain() {
            let root = root_of(&payload.fqdn, payload.wildcard);
            let sentinel_name = format!("{EMPTY_SENTINEL_LABEL}.{root}");
            let sentinel_id = Self::insert_record(
                &mut tx,
                "record_a",
                &sentinel_name,
                payload.kind.tag(false),
                "",
                now,
                token_id,
            )
            .await?;

            if !payload.wildcard {
                let mut subs: Vec<_> = payload.subdomain.iter().collect();
                subs.sort_by_key(|(label, _)| label.to_lowercase());
                for (label, values) in subs {
                    let sub_name = format!("{}.{root}", label.to_lowercase());
                    Self::insert_record(
                        &mut tx,
                        "sub_record_a",
                        &sub_name,
                        payload.kind.tag(true),
                        &values.join(","),
                        now,
                        sentinel_id,
                    )
                    .await?;
                }
            }
        }

        if let Err(e) = publish.await {
            tx.rollback().await.ok();
            return Err(StoreError::Publish(e));
        }

        tx.commit().await?;
        debug!(fqdn = %fqdn, "created metadata rows");

        Ok(Token {
            id: token_id,
            token: secret,
            fqdn,
            created_on: now,
        })
    }

    async fn attach(
        &self,
        payload: &Payload,
        owner_id: i64,
        publish: Publish<'_>,
    ) -> Result<(), StoreError> {
        let fqdn = canon(&payload.fqdn);
        let now = unix_timestamp();

        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM record_txt WHERE fqdn = ?")
            .bind(&fqdn)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(StoreError::Conflict(format!("record already exists for {fqdn}")));
        }

        Self::insert_record(
            &mut tx,
            "record_txt",
            &fqdn,
            payload.kind.tag(false),
            &quote_txt(&payload.text),
            now,
            owner_id,
        )
        .await?;

        if let Err(e) = publish.await {
            tx.rollback().await.ok();
            return Err(StoreError::Publish(e));
        }

        tx.commit().await?;
        debug!(fqdn = %fqdn, owner = owner_id, "attached txt row");
        Ok(())
    }

    async fn update(&self, payload: &Payload, publish: Publish<'_>) -> Result<(), StoreError> {
        let fqdn = canon(&payload.fqdn);
        let now = unix_timestamp();

        let mut tx = self.pool.begin().await?;

        let table = table_for(payload.kind);
        let root_name = root_row_name(payload);
        let sql = format!("UPDATE {table} SET content = ?, updated_on = ? WHERE fqdn = ?");
        let updated = sqlx::query(&sql)
            .bind(row_content(payload))
            .bind(now)
            .bind(&root_name)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("record for {fqdn}")));
        }

        if payload.kind.has_sub_domain() && !payload.wildcard {
            let root = root_of(&payload.fqdn, payload.wildcard);
            let sentinel_id = Self::sentinel_id(&mut tx, &root)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("sentinel row for {fqdn}")))?;

            let existing: Vec<SubRecordRow> =
                sqlx::query_as("SELECT * FROM sub_record_a WHERE pid = ?")
                    .bind(sentinel_id)
                    .fetch_all(&mut *tx)
                    .await?;

            for sub in &existing {
                if !payload.subdomain.contains_key(&sub.prefix()) {
                    sqlx::query("DELETE FROM sub_record_a WHERE fqdn = ?")
                        .bind(&sub.fqdn)
                        .execute(&mut *tx)
                        .await?;
                }
            }

            let mut desired: Vec<_> = payload.subdomain.iter().collect();
            desired.sort_by_key(|(label, _)| label.to_lowercase());
            for (label, values) in desired {
                let label = label.to_lowercase();
                let sub_name = format!("{label}.{root}");
                if existing.iter().any(|sub| sub.prefix() == label) {
                    sqlx::query(
                        "UPDATE sub_record_a SET content = ?, updated_on = ? WHERE fqdn = ?",
                    )
                    .bind(values.join(","))
                    .bind(now)
                    .bind(&sub_name)
                    .execute(&mut *tx)
                    .await?;
                } else {
                    Self::insert_record(
                        &mut tx,
                        "sub_record_a",
                        &sub_name,
                        payload.kind.tag(true),
                        &values.join(","),
                        now,
                        sentinel_id,
                    )
                    .await?;
                }
            }
        }

        if let Err(e) = publish.await {
            tx.rollback().await.ok();
            return Err(StoreError::Publish(e));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, payload: &Payload, publish: Publish<'_>) -> Result<(), StoreError> {
        let fqdn = canon(&payload.fqdn);

        let mut tx = self.pool.begin().await?;

        let table = table_for(payload.kind);
        let root_name = root_row_name(payload);

        if payload.kind.has_sub_domain() {
            let root = root_of(&payload.fqdn, payload.wildcard);
            if let Some(sentinel_id) = Self::sentinel_id(&mut tx, &root).await? {
                sqlx::query("DELETE FROM sub_record_a WHERE pid = ?")
                    .bind(sentinel_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM record_a WHERE id = ?")
                    .bind(sentinel_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let sql = format!("DELETE FROM {table} WHERE fqdn = ?");
        let deleted = sqlx::query(&sql)
            .bind(&root_name)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("record for {fqdn}")));
        }

        if let Err(e) = publish.await {
            tx.rollback().await.ok();
            return Err(StoreError::Publish(e));
        }

        tx.commit().await?;
        debug!(fqdn = %fqdn, "deleted metadata rows");
        Ok(())
    }

    async fn renew(&self, payload: &Payload) -> Result<Token, StoreError> {
        let fqdn = canon(&payload.fqdn);
        let prefix = prefix_of(&payload.fqdn, payload.wildcard);
        let now = unix_timestamp();

        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query("UPDATE token SET created_on = ? WHERE fqdn = ?")
            .bind(now)
            .bind(&fqdn)
            .execute(&mut *tx)
            .await?;
        if bumped.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("token for {fqdn}")));
        }

        sqlx::query("UPDATE frozen_prefix SET created_on = ? WHERE prefix = ?")
            .bind(now)
            .bind(&prefix)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_token(&fqdn)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("token for {fqdn}")))
    }

    async fn get_token(&self, fqdn: &str) -> Result<Option<Token>, StoreError> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM token WHERE fqdn = ?")
            .bind(canon(fqdn))
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    async fn get_token_by_id(&self, id: i64) -> Result<Option<Token>, StoreError> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM token WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    async fn count_tokens(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM token")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn expired_tokens(&self, cutoff: i64) -> Result<Vec<Token>, StoreError> {
        let tokens = sqlx::query_as::<_, Token>("SELECT * FROM token WHERE created_on <= ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens)
    }

    async fn delete_token(&self, id: i64) -> Result<(), StoreError> {
        // Record rows cascade through the token FK; sub rows cascade
        // through their record_a parent.
        sqlx::query("DELETE FROM token WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_frozen_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM frozen_prefix WHERE created_on <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn record_for(
        &self,
        fqdn: &str,
        kind: RecordKind,
    ) -> Result<Option<RecordRow>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE fqdn = ?", table_for(kind));
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(fqdn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn sub_records(&self, parent_id: i64) -> Result<Vec<SubRecordRow>, StoreError> {
        let rows = sqlx::query_as::<_, SubRecordRow>("SELECT * FROM sub_record_a WHERE pid = ?")
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn token_record_rows(&self, token_id: i64) -> Result<Vec<RecordRow>, StoreError> {
        let mut rows = Vec::new();
        for table in ["record_a", "record_txt", "record_cname"] {
            let sql = format!("SELECT * FROM {table} WHERE tid = ?");
            let mut table_rows = sqlx::query_as::<_, RecordRow>(&sql)
                .bind(token_id)
                .fetch_all(&self.pool)
                .await?;
            rows.append(&mut table_rows);
        }
        Ok(rows)
    }
}

