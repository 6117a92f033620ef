// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared application context.
//!
//! One value constructed at startup and threaded through the HTTP
//! handlers, the expiry daemon, and the metrics sampler. There is no
//! process-wide "current keeper" or "current provider"; everything that
//! needs a collaborator receives this context.

use std::sync::Arc;

use crate::config::Settings;
use crate::lifecycle::Lifecycle;
use crate::store::Keeper;

/// Shared context passed to handlers and background tasks.
#[derive(Clone)]
pub struct AppContext {
    /// Parsed runtime settings.
    pub settings: Settings,

    /// Metadata store, used directly for auth lookups and the token gauge.
    pub keeper: Arc<dyn Keeper>,

    /// The record lifecycle manager.
    pub lifecycle: Arc<Lifecycle>,
}

impl AppContext {
    /// Build a context from its parts.
    #[must_use]
    pub fn new(settings: Settings, keeper: Arc<dyn Keeper>, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            settings,
            keeper,
            lifecycle,
        }
    }
}
