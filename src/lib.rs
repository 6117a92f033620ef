// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Sublet - managed DNS control-plane
//!
//! Sublet issues and maintains randomly-generated subdomains beneath a
//! single Route 53 hosted zone on behalf of anonymous clients. A client
//! POSTs a record payload, receives a freshly minted FQDN plus a bearer
//! token, and uses that token to read, update, delete, or renew the
//! record later. Route 53 serves the records; sublet owns the
//! lifecycle: naming, ownership, expiration, rotation cooldown, and
//! wildcard fan-out.
//!
//! ## Modules
//!
//! - [`lifecycle`] - the core state machine over both stores
//! - [`store`] - transactional metadata persistence (tokens, frozen
//!   prefixes, record rows)
//! - [`provider`] - typed port over the authoritative DNS API
//! - [`expiry`] - background reclamation of expired names
//! - [`http`] - routes, payload validation, bearer middleware
//! - [`names`] - pure name utilities (canonicalization, wildcard
//!   escaping, TXT quoting)
//! - [`token`] - bcrypt wrap/verify for issued secrets
//! - [`metrics`] - Prometheus surface
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sublet::context::AppContext;
//! use sublet::lifecycle::Lifecycle;
//! use sublet::provider::MemoryProvider;
//! use sublet::store::MemoryKeeper;
//!
//! # fn example(settings: sublet::config::Settings) {
//! let keeper = Arc::new(MemoryKeeper::new());
//! let provider = Arc::new(MemoryProvider::new("rancher.example"));
//! let lifecycle = Arc::new(Lifecycle::new(keeper.clone(), provider, &settings));
//! let ctx = AppContext::new(settings, keeper, lifecycle);
//! let app = sublet::http::build_router(ctx);
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod expiry;
pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod names;
pub mod provider;
pub mod records;
pub mod store;
pub mod token;

#[cfg(test)]
mod lifecycle_tests;
#[cfg(test)]
mod records_tests;
