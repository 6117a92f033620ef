// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the sublet control-plane.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Name Minting Constants
// ============================================================================

/// Length of a randomly drawn slug (leftmost label of a minted FQDN)
pub const SLUG_LENGTH: usize = 6;

/// Length of the random token secret bound to an issued FQDN
pub const TOKEN_LENGTH: usize = 32;

/// Maximum number of slug draws before a mint attempt gives up
pub const MAX_SLUG_HASH_TIMES: usize = 100;

/// Escaped wildcard label as stored by Route 53
///
/// See: <https://docs.aws.amazon.com/Route53/latest/DeveloperGuide/DomainNameFormat.html#domain-name-format-asterisk>
pub const WILDCARD_ESCAPED: &str = "\\052";

/// Label of the hidden sentinel row that parents sub-records
pub const EMPTY_SENTINEL_LABEL: &str = "empty";

// ============================================================================
// Database Constants
// ============================================================================

/// Maximum open connections in the SQL pool
pub const DB_MAX_OPEN_CONNECTIONS: u32 = 2000;

/// Minimum idle connections kept in the SQL pool
pub const DB_MAX_IDLE_CONNECTIONS: u32 = 1000;

/// Upper bound on waiting for a pool connection
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Expiry Daemon Constants
// ============================================================================

/// Seconds between expiry sweeps
pub const EXPIRE_INTERVAL_SECS: u64 = 600;

/// Jitter factor applied to the sweep period
pub const EXPIRE_JITTER_FACTOR: f64 = 0.1;

// ============================================================================
// Metrics Constants
// ============================================================================

/// Seconds between token-gauge samples
pub const METRICS_SAMPLE_INTERVAL_SECS: u64 = 5;

// ============================================================================
// HTTP Constants
// ============================================================================

/// Default listen port
pub const DEFAULT_PORT: u16 = 9333;

/// Address the HTTP server binds to
pub const HTTP_BIND_ADDRESS: &str = "0.0.0.0";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Worker threads for the tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
