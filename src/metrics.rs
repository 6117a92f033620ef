// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the sublet control-plane.
//!
//! The load-bearing metric is `sublet_tokens_total`, a gauge sampled
//! from the metadata store by a background task; request and provider
//! counters ride along for operational visibility. Everything registers
//! in one registry rendered by the `/metrics` route.

use prometheus::{CounterVec, Encoder, IntGauge, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use crate::constants::METRICS_SAMPLE_INTERVAL_SECS;
use crate::context::AppContext;

/// Global Prometheus metrics registry.
///
/// All metrics are registered here and exposed via the `/metrics` route.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Number of live tokens, sampled from the metadata store.
pub static TOKENS_TOTAL: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new("sublet_tokens_total", "The number of live sublet tokens").unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of API requests by route and status.
pub static REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "sublet_requests_total",
        "Total number of API requests by route and status",
    );
    let counter = CounterVec::new(opts, &["route", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of provider batch failures by error kind.
pub static PROVIDER_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "sublet_provider_errors_total",
        "Total number of provider failures by error kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Force registration of every metric so the first `/metrics` scrape
/// already carries them.
pub fn init() {
    LazyLock::force(&TOKENS_TOTAL);
    LazyLock::force(&REQUESTS_TOTAL);
    LazyLock::force(&PROVIDER_ERRORS_TOTAL);
}

/// Record one API request.
pub fn record_request(route: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[route, &status.to_string()])
        .inc();
}

/// Record one provider failure.
pub fn record_provider_error(kind: &str) {
    PROVIDER_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Gather and encode all metrics in Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

/// Sample the token gauge until the shutdown signal flips.
pub async fn run_sampler(ctx: AppContext, mut shutdown: watch::Receiver<bool>) {
    info!(
        interval_secs = METRICS_SAMPLE_INTERVAL_SECS,
        "metrics sampler started"
    );

    loop {
        match ctx.keeper.count_tokens().await {
            Ok(count) => TOKENS_TOTAL.set(count),
            Err(err) => error!(error = %err, "failed to count tokens"),
        }

        tokio::select! {
            () = sleep(Duration::from_secs(METRICS_SAMPLE_INTERVAL_SECS)) => {}
            _ = shutdown.changed() => {
                info!("metrics sampler stopping");
                return;
            }
        }
    }
}
