// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Periodic reclamation of expired names.
//!
//! Runs on a jittered timer. Each tick releases frozen prefixes past
//! the rotate cutoff, then retires every token past the expire cutoff:
//! one cascaded delete over the rows the token owns, through the
//! lifecycle manager in system mode (no auth check), followed by the
//! token row itself. A token whose retire fails is left in place and
//! retried on the next tick, so divergence between the two stores
//! always converges. A sweep against a clean state is a no-op.

use rand::Rng;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::constants::{EXPIRE_INTERVAL_SECS, EXPIRE_JITTER_FACTOR};
use crate::context::AppContext;
use crate::store::unix_timestamp;

/// Run the expiry daemon until the shutdown signal flips.
pub async fn run(ctx: AppContext, mut shutdown: watch::Receiver<bool>) {
    info!(
        period_secs = EXPIRE_INTERVAL_SECS,
        "expiry daemon started"
    );

    loop {
        sweep(&ctx).await;

        let jitter = rand::thread_rng().gen_range(0.0..EXPIRE_JITTER_FACTOR);
        let period = Duration::from_secs_f64(EXPIRE_INTERVAL_SECS as f64 * (1.0 + jitter));

        tokio::select! {
            () = sleep(period) => {}
            _ = shutdown.changed() => {
                info!("expiry daemon stopping");
                return;
            }
        }
    }
}

/// One sweep: purge rotated prefixes, retire expired tokens.
pub async fn sweep(ctx: &AppContext) {
    let now = unix_timestamp();
    let rotate_cutoff = now - ctx.settings.rotate_secs();
    let expire_cutoff = now - ctx.settings.expire_secs();

    match ctx.keeper.purge_frozen_before(rotate_cutoff).await {
        Ok(0) => {}
        Ok(released) => info!(released, "released frozen prefixes"),
        Err(err) => error!(error = %err, "failed to purge expired frozen prefixes"),
    }

    let tokens = match ctx.keeper.expired_tokens(expire_cutoff).await {
        Ok(tokens) => tokens,
        Err(err) => {
            error!(error = %err, "failed to query expired tokens");
            return;
        }
    };

    if tokens.is_empty() {
        debug!("no expired tokens");
        return;
    }

    info!(count = tokens.len(), "retiring expired tokens");

    for token in &tokens {
        if let Err(err) = ctx.lifecycle.retire(token).await {
            // Leave the token for the next tick; retire is idempotent.
            error!(fqdn = %token.fqdn, error = %err, "failed to retire expired token");
            continue;
        }

        if let Err(err) = ctx.keeper.delete_token(token.id).await {
            error!(fqdn = %token.fqdn, error = %err, "failed to delete expired token");
        }
    }
}

