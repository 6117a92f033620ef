// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pure DNS name utilities.
//!
//! Canonicalization, wildcard escaping, prefix/root extraction, TXT value
//! quoting, and the random draws used for slugs and token secrets. No I/O
//! happens here; everything is a pure function over strings.
//!
//! Route 53 stores wildcard labels escaped (`\052`) and TXT values wrapped
//! in double quotes; the API boundary always speaks the unescaped,
//! unquoted form. These helpers are the single place where the two forms
//! meet.

use std::net::IpAddr;

use rand::Rng;

use crate::constants::{SLUG_LENGTH, TOKEN_LENGTH, WILDCARD_ESCAPED};
use crate::records::RecordKind;

const SMALL_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ALL_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Canonicalize a DNS name: lowercase, unescape the wildcard label,
/// trim the trailing dot. Idempotent.
///
/// ```
/// use sublet::names::canon;
///
/// assert_eq!(canon("LF2BL9.RANCHER.EXAMPLE."), "lf2bl9.rancher.example");
/// assert_eq!(canon("\\052.lf2bl9.rancher.example"), "*.lf2bl9.rancher.example");
/// ```
#[must_use]
pub fn canon(name: &str) -> String {
    trim_trailing_dot(&unescape_wildcard(&name.to_lowercase())).to_string()
}

/// Replace the first `*` with the Route 53 escaped form `\052`.
#[must_use]
pub fn escape_wildcard(name: &str) -> String {
    name.replacen('*', WILDCARD_ESCAPED, 1)
}

/// Replace the first `\052` with `*`.
#[must_use]
pub fn unescape_wildcard(name: &str) -> String {
    name.replacen(WILDCARD_ESCAPED, "*", 1)
}

/// Ensure a single trailing dot, the absolute form the provider expects.
#[must_use]
pub fn ensure_trailing_dot(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

/// Trim the trailing dot, the relative form the API speaks.
#[must_use]
pub fn trim_trailing_dot(name: &str) -> &str {
    name.trim_end_matches('.')
}

/// Strip the leftmost label.
///
/// `*.example.zone` becomes `example.zone`, `a.example.zone` becomes
/// `example.zone`.
#[must_use]
pub fn strip_first_label(name: &str) -> String {
    let canonical = canon(name);
    match canonical.split_once('.') {
        Some((_, rest)) => rest.to_string(),
        None => String::new(),
    }
}

/// The root form of a name: the canonical name itself, or the name with
/// its wildcard label stripped.
///
/// ```
/// use sublet::names::root_of;
///
/// assert_eq!(root_of("*.example.rancher.example", true), "example.rancher.example");
/// assert_eq!(root_of("a.example.rancher.example", false), "a.example.rancher.example");
/// ```
#[must_use]
pub fn root_of(name: &str, wildcard: bool) -> String {
    let canonical = canon(name);
    if wildcard {
        strip_first_label(&canonical)
    } else {
        canonical
    }
}

/// The first label of the root form, e.g. the frozen-prefix key.
///
/// ```
/// use sublet::names::prefix_of;
///
/// assert_eq!(prefix_of("*.example.rancher.example", true), "example");
/// assert_eq!(prefix_of("a.example.rancher.example", false), "a");
/// ```
#[must_use]
pub fn prefix_of(name: &str, wildcard: bool) -> String {
    root_of(name, wildcard)
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Wrap a TXT value in double quotes, the form Route 53 stores.
///
/// See: <https://docs.aws.amazon.com/Route53/latest/DeveloperGuide/ResourceRecordTypes.html#TXTFormat>
#[must_use]
pub fn quote_txt(text: &str) -> String {
    format!("\"{text}\"")
}

/// Trim one outer pair of double quotes from a TXT value.
#[must_use]
pub fn unquote_txt(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// Classify a host value into a record kind.
///
/// IPv4 literals are A, IPv6 literals are AAAA, anything that does not
/// parse as an IP address is treated as a CNAME target.
#[must_use]
pub fn host_kind(host: &str) -> RecordKind {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => RecordKind::A,
        Ok(IpAddr::V6(_)) => RecordKind::Aaaa,
        Err(_) => RecordKind::Cname,
    }
}

/// Draw a random slug: lowercase letters and digits, fixed length.
#[must_use]
pub fn random_slug() -> String {
    random_string(SMALL_CHARSET, SLUG_LENGTH)
}

/// Draw a random token secret: mixed-case letters and digits.
#[must_use]
pub fn random_secret() -> String {
    random_string(ALL_CHARSET, TOKEN_LENGTH)
}

fn random_string(charset: &[u8], length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

