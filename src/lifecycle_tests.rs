// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the record lifecycle manager, driving the in-memory keeper
//! and provider together so both stores can be asserted after every
//! operation.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;

use crate::config::Settings;
use crate::provider::MemoryProvider;
use crate::store::{Keeper, MemoryKeeper};
use crate::token::wrap;

use crate::errors::ApiError;
use crate::lifecycle::Lifecycle;
use crate::records::{Payload, RecordKind};

const ZONE: &str = "rancher.example";

fn settings() -> Settings {
    Settings::parse_from([
        "sublet",
        "--domain",
        ZONE,
        "--aws-hosted-zone-id",
        "Z-test",
        "--db-dsn",
        "mysql://root@127.0.0.1:3306/sublet",
    ])
}

struct Harness {
    keeper: Arc<MemoryKeeper>,
    provider: Arc<MemoryProvider>,
    lifecycle: Lifecycle,
}

fn harness() -> Harness {
    let keeper = Arc::new(MemoryKeeper::new());
    let provider = Arc::new(MemoryProvider::new(ZONE));
    let lifecycle = Lifecycle::new(keeper.clone(), provider.clone(), &settings());
    Harness {
        keeper,
        provider,
        lifecycle,
    }
}

fn a_payload(hosts: &[&str]) -> Payload {
    Payload {
        hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
        kind: RecordKind::A,
        ..Payload::default()
    }
}

fn sub_map(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
        .collect()
}

#[tokio::test]
async fn create_mints_slug_and_fans_out() {
    let h = harness();

    let domain = h
        .lifecycle
        .create(a_payload(&["192.168.1.1"]), None)
        .await
        .unwrap();

    let (prefix, rest) = domain.fqdn.split_once('.').unwrap();
    assert_eq!(rest, ZONE);
    assert_eq!(prefix.len(), 6);
    assert!(prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    assert_eq!(domain.token.len(), 32);
    assert!(domain.expiration.is_some());

    // Root resolves, and so does any label under it via the wildcard
    // sibling.
    assert_eq!(
        h.provider.resolve(&domain.fqdn, RecordKind::A),
        vec!["192.168.1.1".to_string()]
    );
    assert_eq!(
        h.provider
            .resolve(&format!("x.{}", domain.fqdn), RecordKind::A),
        vec!["192.168.1.1".to_string()]
    );
}

#[tokio::test]
async fn create_with_subdomains_publishes_each_child() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1", "192.168.1.2"]);
    payload.subdomain = sub_map(&[("test1", &["192.168.1.3", "192.168.1.4"])]);

    let domain = h.lifecycle.create(payload, None).await.unwrap();

    assert_eq!(
        h.provider
            .resolve(&format!("test1.{}", domain.fqdn), RecordKind::A),
        vec!["192.168.1.3".to_string(), "192.168.1.4".to_string()]
    );
}

#[tokio::test]
async fn create_wildcard_answers_any_label() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1"]);
    payload.fqdn = format!("*.test23456.{ZONE}");
    payload.wildcard = true;

    let domain = h.lifecycle.create(payload, None).await.unwrap();
    assert!(domain.fqdn.contains('*'));

    assert_eq!(
        h.provider
            .resolve(&format!("anything.test23456.{ZONE}"), RecordKind::A),
        vec!["192.168.1.1".to_string()]
    );
}

#[tokio::test]
async fn create_minted_names_do_not_collide() {
    let h = harness();
    let mut seen = std::collections::HashSet::new();

    for _ in 0..100 {
        let domain = h
            .lifecycle
            .create(a_payload(&["192.168.1.1"]), None)
            .await
            .unwrap();
        assert!(seen.insert(domain.fqdn.clone()), "minted {} twice", domain.fqdn);
    }
}

#[tokio::test]
async fn create_on_issued_fqdn_requires_bearer_and_conflicts() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1"]);
    payload.fqdn = format!("dup.{ZONE}");
    let domain = h.lifecycle.create(payload.clone(), None).await.unwrap();

    // Without the owner's bearer the retry is rejected outright.
    let err = h.lifecycle.create(payload.clone(), None).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthenticated));

    // With it, the keeper still refuses the duplicate.
    let bearer = wrap(&domain.token).unwrap();
    let err = h
        .lifecycle
        .create(payload, Some(&bearer))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn read_returns_what_create_wrote() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1", "192.168.1.2"]);
    payload.subdomain = sub_map(&[("test1", &["192.168.1.3"])]);
    let created = h.lifecycle.create(payload, None).await.unwrap();

    let read_payload = Payload {
        fqdn: created.fqdn.clone(),
        kind: RecordKind::A,
        ..Payload::default()
    };
    let read = h.lifecycle.read(&read_payload).await.unwrap();

    assert_eq!(read.fqdn, created.fqdn);
    assert_eq!(read.hosts, created.hosts);
    assert_eq!(read.subdomain, created.subdomain);
    assert!(read.token.is_empty(), "read must not leak the secret");
    assert_eq!(read.expiration, created.expiration);
}

#[tokio::test]
async fn read_unknown_fqdn_is_not_found() {
    let h = harness();
    let payload = Payload {
        fqdn: format!("ghost.{ZONE}"),
        kind: RecordKind::A,
        ..Payload::default()
    };
    let err = h.lifecycle.read(&payload).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn update_rewrites_root_and_diffs_subs() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1"]);
    payload.subdomain = sub_map(&[("keep", &["192.168.1.3"]), ("drop", &["192.168.1.4"])]);
    let created = h.lifecycle.create(payload, None).await.unwrap();

    let mut update = a_payload(&["192.168.1.9"]);
    update.fqdn = created.fqdn.clone();
    update.subdomain = sub_map(&[("keep", &["192.168.1.30"]), ("add", &["192.168.1.5"])]);
    let updated = h.lifecycle.update(&update).await.unwrap();

    assert!(updated.token.is_empty(), "update must not mint a token");

    assert_eq!(
        h.provider.resolve(&created.fqdn, RecordKind::A),
        vec!["192.168.1.9".to_string()]
    );
    // The wildcard sibling tracks the new root values.
    assert_eq!(
        h.provider
            .resolve(&format!("whatever.{}", created.fqdn), RecordKind::A),
        vec!["192.168.1.9".to_string()]
    );
    assert_eq!(
        h.provider
            .resolve(&format!("keep.{}", created.fqdn), RecordKind::A),
        vec!["192.168.1.30".to_string()]
    );
    assert_eq!(
        h.provider
            .resolve(&format!("add.{}", created.fqdn), RecordKind::A),
        vec!["192.168.1.5".to_string()]
    );
    // "drop" now only answers through the wildcard.
    assert_eq!(
        h.provider
            .resolve(&format!("drop.{}", created.fqdn), RecordKind::A),
        vec!["192.168.1.9".to_string()]
    );
}

#[tokio::test]
async fn update_is_idempotent() {
    let h = harness();

    let created = h
        .lifecycle
        .create(a_payload(&["192.168.1.1"]), None)
        .await
        .unwrap();

    let mut update = a_payload(&["192.168.1.9"]);
    update.fqdn = created.fqdn.clone();
    update.subdomain = sub_map(&[("test1", &["192.168.1.3"])]);

    h.lifecycle.update(&update).await.unwrap();
    let sets_after_first = h.provider.len();
    let first = h
        .lifecycle
        .read(&Payload {
            fqdn: created.fqdn.clone(),
            kind: RecordKind::A,
            ..Payload::default()
        })
        .await
        .unwrap();

    h.lifecycle.update(&update).await.unwrap();
    let second = h
        .lifecycle
        .read(&Payload {
            fqdn: created.fqdn.clone(),
            kind: RecordKind::A,
            ..Payload::default()
        })
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.provider.len(), sets_after_first);
}

#[tokio::test]
async fn update_wildcard_flag_mismatch_is_conflict() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1"]);
    payload.fqdn = format!("plain1.{ZONE}");
    h.lifecycle.create(payload, None).await.unwrap();

    let mut update = a_payload(&["192.168.1.2"]);
    update.fqdn = format!("*.plain1.{ZONE}");
    update.wildcard = true;
    let err = h.lifecycle.update(&update).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn update_unknown_fqdn_is_not_found() {
    let h = harness();
    let mut update = a_payload(&["192.168.1.2"]);
    update.fqdn = format!("ghost.{ZONE}");
    let err = h.lifecycle.update(&update).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn delete_clears_provider_and_leaves_token() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1"]);
    payload.subdomain = sub_map(&[("test1", &["192.168.1.3"])]);
    let created = h.lifecycle.create(payload, None).await.unwrap();

    let target = Payload {
        fqdn: created.fqdn.clone(),
        kind: RecordKind::A,
        ..Payload::default()
    };
    h.lifecycle.delete(&target).await.unwrap();

    assert!(h.provider.is_empty(), "all provider records removed");
    assert!(matches!(
        h.lifecycle.read(&target).await.unwrap_err(),
        ApiError::NotFound(_)
    ));

    // The token outlives the record until the expiry sweep.
    assert!(h.keeper.get_token(&created.fqdn).await.unwrap().is_some());

    // Renew after delete is unambiguous: the record is gone.
    let err = h.lifecycle.renew(&target).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn renew_extends_the_lease() {
    let h = harness();

    let created = h
        .lifecycle
        .create(a_payload(&["192.168.1.1"]), None)
        .await
        .unwrap();

    let target = Payload {
        fqdn: created.fqdn.clone(),
        kind: RecordKind::A,
        ..Payload::default()
    };
    let renewed = h.lifecycle.renew(&target).await.unwrap();
    assert!(renewed.expiration >= created.expiration);
    // No provider traffic for renew; the record set count is unchanged.
    assert_eq!(h.provider.len(), 2);
}

#[tokio::test]
async fn cname_and_txt_records_round_trip() {
    let h = harness();

    let cname = Payload {
        cname: format!("test1.{ZONE}"),
        kind: RecordKind::Cname,
        ..Payload::default()
    };
    let created = h.lifecycle.create(cname, None).await.unwrap();
    assert_eq!(
        h.provider.resolve(&created.fqdn, RecordKind::Cname),
        vec![format!("test1.{ZONE}")]
    );

    let txt = Payload {
        text: "hello world".to_string(),
        kind: RecordKind::Txt,
        ..Payload::default()
    };
    let created = h.lifecycle.create(txt, None).await.unwrap();
    // TXT values live quoted at the provider.
    assert_eq!(
        h.provider.resolve(&created.fqdn, RecordKind::Txt),
        vec!["\"hello world\"".to_string()]
    );

    let read = h
        .lifecycle
        .read(&Payload {
            fqdn: created.fqdn.clone(),
            kind: RecordKind::Txt,
            ..Payload::default()
        })
        .await
        .unwrap();
    assert_eq!(read.text, "hello world");
}

#[tokio::test]
async fn acme_txt_attaches_to_the_parent_token() {
    let h = harness();

    let parent = h
        .lifecycle
        .create(a_payload(&["192.168.1.1"]), None)
        .await
        .unwrap();
    let bearer = wrap(&parent.token).unwrap();

    let challenge = Payload {
        fqdn: format!("_acme-challenge.{}", parent.fqdn),
        text: "t".to_string(),
        kind: RecordKind::Txt,
        ..Payload::default()
    };

    // Wrong bearer is rejected before anything lands.
    let bad = wrap("not-the-secret").unwrap();
    let err = h
        .lifecycle
        .create(challenge.clone(), Some(&bad))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    let attached = h
        .lifecycle
        .create(challenge.clone(), Some(&bearer))
        .await
        .unwrap();
    assert!(attached.token.is_empty(), "attach must not mint a token");

    assert_eq!(
        h.provider.resolve(&challenge.fqdn, RecordKind::Txt),
        vec!["\"t\"".to_string()]
    );
    // No token row exists for the challenge name; it belongs to the
    // parent.
    assert!(h.keeper.get_token(&challenge.fqdn).await.unwrap().is_none());

    // The parent's bearer authorises operations on the challenge name.
    h.lifecycle
        .authorize(&challenge.fqdn, &bearer)
        .await
        .unwrap();
}

#[tokio::test]
async fn authorize_verifies_the_owning_token() {
    let h = harness();

    let created = h
        .lifecycle
        .create(a_payload(&["192.168.1.1"]), None)
        .await
        .unwrap();
    let bearer = wrap(&created.token).unwrap();

    h.lifecycle.authorize(&created.fqdn, &bearer).await.unwrap();

    let wrong = wrap("some-other-secret").unwrap();
    assert!(matches!(
        h.lifecycle.authorize(&created.fqdn, &wrong).await.unwrap_err(),
        ApiError::Forbidden
    ));
    assert!(matches!(
        h.lifecycle.authorize(&created.fqdn, "").await.unwrap_err(),
        ApiError::Unauthenticated
    ));
    assert!(matches!(
        h.lifecycle
            .authorize(&format!("ghost.{ZONE}"), &bearer)
            .await
            .unwrap_err(),
        ApiError::Forbidden
    ));
}

#[tokio::test]
async fn retire_cascades_everything_a_token_owns() {
    let h = harness();

    let mut payload = a_payload(&["192.168.1.1"]);
    payload.subdomain = sub_map(&[("test1", &["192.168.1.3"])]);
    let created = h.lifecycle.create(payload, None).await.unwrap();
    let bearer = wrap(&created.token).unwrap();

    // Attach a challenge record so the token owns rows in two tables.
    let challenge = Payload {
        fqdn: format!("_acme-challenge.{}", created.fqdn),
        text: "t".to_string(),
        kind: RecordKind::Txt,
        ..Payload::default()
    };
    h.lifecycle.create(challenge, Some(&bearer)).await.unwrap();

    let token = h
        .keeper
        .get_token(&created.fqdn)
        .await
        .unwrap()
        .expect("token");
    h.lifecycle.retire(&token).await.unwrap();

    assert!(h.provider.is_empty(), "root, wildcard, subs, and txt gone");
    assert!(h
        .keeper
        .token_record_rows(token.id)
        .await
        .unwrap()
        .is_empty());

    // Retire is idempotent against a clean state.
    h.lifecycle.retire(&token).await.unwrap();
}

#[tokio::test]
async fn list_reports_every_record_set() {
    let h = harness();

    let created = h
        .lifecycle
        .create(a_payload(&["192.168.1.1"]), None)
        .await
        .unwrap();

    let domains = h.lifecycle.list().await.unwrap();
    // Root plus the wildcard sibling.
    assert_eq!(domains.len(), 2);
    assert!(domains.iter().any(|d| d.fqdn == created.fqdn));
    assert!(domains
        .iter()
        .any(|d| d.fqdn == format!("*.{}", created.fqdn)));
}
