// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record kinds, API payloads, and response envelopes.
//!
//! The record kind carries the small-integer on-disk encoding used by the
//! metadata store ({0: TXT, 1: root A/AAAA, 2: sub A, 3: CNAME}). Tags 1
//! and 2 cover both address families; [`crate::names::host_kind`] on the
//! stored content disambiguates A from AAAA when a row is read back.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::names::host_kind;

/// Supported record kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    #[default]
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "TXT")]
    Txt,
}

impl RecordKind {
    /// The on-disk type tag.
    ///
    /// `sub` selects the sub-record tag for address records; TXT and CNAME
    /// rows never parent sub-records.
    #[must_use]
    pub const fn tag(self, sub: bool) -> i8 {
        match self {
            Self::A | Self::Aaaa => {
                if sub {
                    2
                } else {
                    1
                }
            }
            Self::Txt => 0,
            Self::Cname => 3,
        }
    }

    /// Whether this kind may own sub-domain records.
    #[must_use]
    pub const fn has_sub_domain(self) -> bool {
        matches!(self, Self::A | Self::Aaaa)
    }

    /// The provider-facing type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
        }
    }

    /// Parse a provider-facing type string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "AAAA" => Some(Self::Aaaa),
            "CNAME" => Some(Self::Cname),
            "TXT" => Some(Self::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation request as received from the HTTP boundary.
///
/// `kind` and `wildcard` are never deserialized from the body; they are
/// filled in by [`Payload::complete`] before the payload reaches the
/// lifecycle manager.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub subdomain: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub cname: String,
    #[serde(skip)]
    pub kind: RecordKind,
    #[serde(skip)]
    pub wildcard: bool,
}

impl Payload {
    /// Validate and complete a payload.
    ///
    /// `kind_hint` carries the kind selected by the route (TXT/CNAME
    /// routes, or the `?type=AAAA` selector); the kind is otherwise
    /// inferred from the first host value. `has_body` is true for POST and
    /// PUT, where field combinations must be validated.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Invalid` when text is combined with hosts or
    /// sub-domains, or when a body carries none of them.
    pub fn complete(&mut self, kind_hint: Option<RecordKind>, has_body: bool) -> Result<(), ApiError> {
        if has_body && kind_hint != Some(RecordKind::Cname) {
            if !self.text.is_empty() && (!self.hosts.is_empty() || !self.subdomain.is_empty()) {
                return Err(ApiError::Invalid(
                    "text can not be combined with hosts or subdomains".to_string(),
                ));
            }
            if self.text.is_empty() && self.hosts.is_empty() && self.subdomain.is_empty() {
                return Err(ApiError::Invalid("request not valid".to_string()));
            }
        }

        if !self.fqdn.is_empty() && self.fqdn.contains('*') {
            self.wildcard = true;
        }

        if let Some(kind) = kind_hint {
            self.kind = kind;
        } else if !self.text.is_empty() {
            self.kind = RecordKind::Txt;
        } else if !self.hosts.is_empty() {
            self.kind = host_kind(&self.hosts[0]);
        } else if let Some(values) = self.subdomain.values().next() {
            if let Some(first) = values.first() {
                self.kind = host_kind(first);
            }
        }

        Ok(())
    }
}

/// An owned record as presented by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Domain {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fqdn: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub subdomain: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cname: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token: String,
    /// Unix seconds at which the owning token expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
}

/// Success envelope for single-record responses.
#[derive(Debug, Serialize)]
pub struct Response {
    pub status: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Domain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Success envelope for the list route.
#[derive(Debug, Serialize)]
pub struct ResponseList {
    pub status: u16,
    pub msg: String,
    pub datum: Vec<Domain>,
    #[serde(rename = "type")]
    pub kind: String,
}

