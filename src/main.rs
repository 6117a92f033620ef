// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use sublet::config::{MigrateMode, Settings};
use sublet::constants::{HTTP_BIND_ADDRESS, TOKIO_WORKER_THREADS};
use sublet::context::AppContext;
use sublet::expiry;
use sublet::http;
use sublet::lifecycle::Lifecycle;
use sublet::metrics;
use sublet::provider::Route53Provider;
use sublet::store::RdsKeeper;

fn main() -> Result<()> {
    // Build the Tokio runtime with named worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("sublet-server")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging.
///
/// `LEVEL` seeds the default filter; `RUST_LOG` overrides it when set.
/// `RUST_LOG_FORMAT` selects `json` or text output.
fn initialize_logging(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.level.clone()));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("starting sublet DNS control-plane");
    debug!("logging initialized");
}

async fn async_main() -> Result<()> {
    let settings = Settings::parse();
    initialize_logging(&settings);

    if settings.rotate < settings.expire {
        bail!("rotate must not be shorter than expire");
    }

    // The provider refuses to resolve a zone that does not match DOMAIN.
    let provider = Arc::new(
        Route53Provider::connect(&settings)
            .await
            .context("failed to connect to route53")?,
    );
    info!(zone = %provider_zone(&provider), "hosted zone resolved");

    let keeper = Arc::new(
        RdsKeeper::connect(&settings)
            .await
            .context("failed to connect to the metadata store")?,
    );

    if settings.db_migrate == MigrateMode::Down {
        info!("schema dropped, exiting");
        return Ok(());
    }

    let lifecycle = Arc::new(Lifecycle::new(keeper.clone(), provider, &settings));
    let ctx = AppContext::new(settings.clone(), keeper.clone(), lifecycle);

    // Shutdown fan-out: flipping the sender stops every long-lived task.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let expiry_handle = tokio::spawn(expiry::run(ctx.clone(), shutdown_rx.clone()));
    let sampler_handle = tokio::spawn(metrics::run_sampler(ctx.clone(), shutdown_rx.clone()));

    let app = http::build_router(ctx);
    let bind_addr = format!("{HTTP_BIND_ADDRESS}:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "http server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!(error = %err, "http server error");
    }

    info!("shutting down background tasks");
    shutdown_tx.send(true).ok();
    let _ = tokio::join!(expiry_handle, sampler_handle);

    keeper.close().await;
    info!("graceful shutdown complete");

    Ok(())
}

fn provider_zone(provider: &Route53Provider) -> String {
    use sublet::provider::DnsProvider;
    provider.zone().name.clone()
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "failed to listen for ctrl-c");
            }
            info!("received SIGINT, terminating");
        }
        () = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => { sigterm.recv().await; }
                    Err(err) => {
                        error!(error = %err, "failed to listen for SIGTERM");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("received SIGTERM, terminating");
        }
    }
}
