// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Row models for the metadata store.

use serde::Serialize;

/// A token row: the ownership record for one issued FQDN.
///
/// `fqdn` is the canonical, wildcard-unescaped form (`*.x.zone` for
/// wildcard names). `token` is the raw secret; the wrapped bearer handed
/// to clients is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Token {
    pub id: i64,
    pub token: String,
    pub fqdn: String,
    pub created_on: i64,
}

impl Token {
    /// Unix seconds at which this token expires.
    #[must_use]
    pub fn expiration(&self, expire_secs: i64) -> i64 {
        self.created_on + expire_secs
    }
}

/// A frozen prefix: the leftmost label of an issued FQDN, reserved from
/// reuse while in rotation cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FrozenPrefix {
    pub id: i64,
    pub prefix: String,
    pub created_on: i64,
}

/// A root record row.
///
/// `fqdn` is wildcard-escaped for wildcard rows (`\052.x.zone`). `kind`
/// is the small-integer type tag ({0: TXT, 1: root A/AAAA, 2: sub A,
/// 3: CNAME}); `content` joins multiple values with commas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RecordRow {
    pub id: i64,
    pub fqdn: String,
    #[sqlx(rename = "type")]
    pub kind: i8,
    pub content: String,
    pub created_on: i64,
    pub updated_on: Option<i64>,
    pub tid: i64,
}

impl RecordRow {
    /// Split the comma-joined content back into values.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        if self.content.is_empty() {
            return Vec::new();
        }
        self.content.split(',').map(str::to_string).collect()
    }
}

/// A sub-domain record row under an A/AAAA root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SubRecordRow {
    pub id: i64,
    pub fqdn: String,
    #[sqlx(rename = "type")]
    pub kind: i8,
    pub content: String,
    pub created_on: i64,
    pub updated_on: Option<i64>,
    pub pid: i64,
}

impl SubRecordRow {
    /// Split the comma-joined content back into values.
    #[must_use]
    pub fn values(&self) -> Vec<String> {
        if self.content.is_empty() {
            return Vec::new();
        }
        self.content.split(',').map(str::to_string).collect()
    }

    /// The leftmost label, the key clients use in the sub-domain map.
    #[must_use]
    pub fn prefix(&self) -> String {
        self.fqdn.split('.').next().unwrap_or_default().to_string()
    }
}
