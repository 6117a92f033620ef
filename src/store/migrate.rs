// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Embedded schema migration.
//!
//! The schema is small enough to live in the binary: six tables with
//! `ON DELETE CASCADE` foreign keys from each record table to `token`
//! and from `sub_record_a` to `record_a`, plus `created_on` indices for
//! every scan-by-time query. `DB_MIGRATE=up` creates, `DB_MIGRATE=down`
//! drops.

use sqlx::MySqlPool;
use tracing::info;

use super::StoreError;

const UP: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS frozen_prefix (
        id BIGINT AUTO_INCREMENT,
        prefix VARCHAR(255) NOT NULL UNIQUE,
        created_on BIGINT NOT NULL,
        PRIMARY KEY (id),
        INDEX index_created_on_frozen (created_on)
    ) ENGINE=INNODB DEFAULT CHARSET=utf8;",
    r"CREATE TABLE IF NOT EXISTS token (
        id BIGINT AUTO_INCREMENT,
        token VARCHAR(255) NOT NULL UNIQUE,
        fqdn VARCHAR(255) NOT NULL UNIQUE,
        created_on BIGINT NOT NULL,
        PRIMARY KEY (id),
        INDEX index_created_on_token (created_on)
    ) ENGINE=INNODB DEFAULT CHARSET=utf8;",
    r"CREATE TABLE IF NOT EXISTS record_a (
        id BIGINT AUTO_INCREMENT,
        fqdn VARCHAR(255) NOT NULL UNIQUE,
        type TINYINT NOT NULL,
        content VARCHAR(255) NOT NULL,
        created_on BIGINT NOT NULL,
        updated_on BIGINT,
        tid BIGINT NOT NULL,
        CONSTRAINT fk_token_a FOREIGN KEY(tid) REFERENCES token(id) ON DELETE CASCADE,
        PRIMARY KEY (id),
        INDEX index_created_on_a (created_on)
    ) ENGINE=INNODB DEFAULT CHARSET=utf8;",
    r"CREATE TABLE IF NOT EXISTS sub_record_a (
        id BIGINT AUTO_INCREMENT,
        fqdn VARCHAR(255) NOT NULL UNIQUE,
        type TINYINT NOT NULL,
        content VARCHAR(255) NOT NULL,
        created_on BIGINT NOT NULL,
        updated_on BIGINT,
        pid BIGINT NOT NULL,
        CONSTRAINT fk_record_a FOREIGN KEY(pid) REFERENCES record_a(id) ON DELETE CASCADE,
        PRIMARY KEY (id),
        INDEX index_created_on_sub_a (created_on)
    ) ENGINE=INNODB DEFAULT CHARSET=utf8;",
    r"CREATE TABLE IF NOT EXISTS record_cname (
        id BIGINT AUTO_INCREMENT,
        fqdn VARCHAR(255) NOT NULL UNIQUE,
        type TINYINT NOT NULL,
        content VARCHAR(255) NOT NULL,
        created_on BIGINT NOT NULL,
        updated_on BIGINT,
        tid BIGINT NOT NULL,
        CONSTRAINT fk_token_cname FOREIGN KEY(tid) REFERENCES token(id) ON DELETE CASCADE,
        PRIMARY KEY (id),
        INDEX index_created_on_cname (created_on)
    ) ENGINE=INNODB DEFAULT CHARSET=utf8;",
    r"CREATE TABLE IF NOT EXISTS record_txt (
        id BIGINT AUTO_INCREMENT,
        fqdn VARCHAR(255) NOT NULL UNIQUE,
        type TINYINT NOT NULL,
        content VARCHAR(255) NOT NULL,
        created_on BIGINT NOT NULL,
        updated_on BIGINT,
        tid BIGINT NOT NULL,
        CONSTRAINT fk_token_txt FOREIGN KEY(tid) REFERENCES token(id) ON DELETE CASCADE,
        PRIMARY KEY (id),
        INDEX index_created_on_txt (created_on)
    ) ENGINE=INNODB DEFAULT CHARSET=utf8;",
];

const DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS frozen_prefix",
    "DROP TABLE IF EXISTS record_txt",
    "DROP TABLE IF EXISTS record_cname",
    "DROP TABLE IF EXISTS sub_record_a",
    "DROP TABLE IF EXISTS record_a",
    "DROP TABLE IF EXISTS token",
];

/// Create the schema.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] when any DDL statement fails.
pub async fn up(pool: &MySqlPool) -> Result<(), StoreError> {
    for statement in UP {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
    }
    info!("database migrated up");
    Ok(())
}

/// Drop the schema.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] when any DDL statement fails.
pub async fn down(pool: &MySqlPool) -> Result<(), StoreError> {
    for statement in DOWN {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
    }
    info!("database migrated down");
    Ok(())
}
