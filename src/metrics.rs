// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for tree-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tree_sync_` prefix for all metrics
//! - `_total` suffix for counters
//!
//! # Labels
//! - `kind`: handshake, state_update
//! - `reason`: decode, no_handshake, stale_transaction, non_binary

use metrics::{counter, gauge};

/// Record a successfully decoded and dispatched frame
pub fn record_frame(kind: &'static str) {
    counter!("tree_sync_frames_total", "kind" => kind).increment(1);
}

/// Record a dropped frame
pub fn record_dropped_frame(reason: &'static str) {
    counter!("tree_sync_dropped_frames_total", "reason" => reason).increment(1);
}

/// Record merged key/value pairs
pub fn record_pairs_merged(count: usize) {
    counter!("tree_sync_pairs_merged_total").increment(count as u64);
}

/// Record key/value pairs rejected by the merge engine
pub fn record_pairs_rejected(count: usize) {
    counter!("tree_sync_pairs_rejected_total").increment(count as u64);
}

/// Record an outgoing pattern subscription request
pub fn record_subscription() {
    counter!("tree_sync_subscriptions_total").increment(1);
}

/// Set the number of leaves in the current working tree
pub fn set_tree_leaves(count: usize) {
    gauge!("tree_sync_tree_leaves").set(count as f64);
}

/// Record a connection lifecycle event (connect, open, close)
pub fn record_connection_event(event: &'static str) {
    counter!("tree_sync_connection_events_total", "event" => event).increment(1);
}
