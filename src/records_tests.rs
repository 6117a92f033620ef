// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for record kinds and payload completion.

use crate::records::*;

#[test]
fn tags_match_on_disk_encoding() {
    assert_eq!(RecordKind::Txt.tag(false), 0);
    assert_eq!(RecordKind::A.tag(false), 1);
    assert_eq!(RecordKind::Aaaa.tag(false), 1);
    assert_eq!(RecordKind::A.tag(true), 2);
    assert_eq!(RecordKind::Aaaa.tag(true), 2);
    assert_eq!(RecordKind::Cname.tag(false), 3);
}

#[test]
fn only_address_kinds_parent_sub_domains() {
    assert!(RecordKind::A.has_sub_domain());
    assert!(RecordKind::Aaaa.has_sub_domain());
    assert!(!RecordKind::Cname.has_sub_domain());
    assert!(!RecordKind::Txt.has_sub_domain());
}

#[test]
fn kind_strings_round_trip() {
    for kind in [
        RecordKind::A,
        RecordKind::Aaaa,
        RecordKind::Cname,
        RecordKind::Txt,
    ] {
        assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(RecordKind::parse("aaaa"), Some(RecordKind::Aaaa));
    assert_eq!(RecordKind::parse("SRV"), None);
}

#[test]
fn complete_rejects_text_with_hosts() {
    let mut payload = Payload {
        text: "challenge".to_string(),
        hosts: vec!["192.168.1.1".to_string()],
        ..Payload::default()
    };
    assert!(payload.complete(None, true).is_err());
}

#[test]
fn complete_rejects_empty_body() {
    let mut payload = Payload::default();
    assert!(payload.complete(None, true).is_err());
}

#[test]
fn complete_infers_kind_from_first_host() {
    let mut payload = Payload {
        hosts: vec!["192.168.1.1".to_string()],
        ..Payload::default()
    };
    payload.complete(None, true).unwrap();
    assert_eq!(payload.kind, RecordKind::A);

    let mut payload = Payload {
        hosts: vec!["0:0:0:0:0:ffff:c0a8:101".to_string()],
        ..Payload::default()
    };
    payload.complete(None, true).unwrap();
    assert_eq!(payload.kind, RecordKind::Aaaa);
}

#[test]
fn complete_infers_kind_from_subdomain_values() {
    let mut payload = Payload::default();
    payload
        .subdomain
        .insert("test1".to_string(), vec!["192.168.1.3".to_string()]);
    payload.complete(None, true).unwrap();
    assert_eq!(payload.kind, RecordKind::A);
}

#[test]
fn complete_flags_wildcard_fqdn() {
    let mut payload = Payload {
        fqdn: "*.test23456.rancher.example".to_string(),
        hosts: vec!["192.168.1.1".to_string()],
        ..Payload::default()
    };
    payload.complete(None, true).unwrap();
    assert!(payload.wildcard);
}

#[test]
fn complete_honors_route_kind_hint() {
    let mut payload = Payload {
        text: "token-value".to_string(),
        ..Payload::default()
    };
    payload.complete(Some(RecordKind::Txt), true).unwrap();
    assert_eq!(payload.kind, RecordKind::Txt);
}

#[test]
fn domain_serializes_sparse_fields() {
    let domain = Domain {
        fqdn: "lf2bl9.rancher.example".to_string(),
        hosts: vec!["192.168.1.1".to_string()],
        kind: RecordKind::A,
        expiration: Some(1_700_000_000),
        ..Domain::default()
    };
    let value = serde_json::to_value(&domain).unwrap();
    assert_eq!(value["type"], "A");
    assert_eq!(value["expiration"], 1_700_000_000);
    assert!(value.get("text").is_none());
    assert!(value.get("cname").is_none());
    assert!(value.get("token").is_none());
}
