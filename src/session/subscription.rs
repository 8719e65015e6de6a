// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscription lifecycle.
//!
//! One pattern subscription is active at a time. Every pattern change gets
//! a fresh, monotonically increasing transaction id so that state updates
//! still in flight for a superseded subscription can be recognized and
//! dropped instead of polluting the new tree.

use crate::protocol::{PSubscribe, TransactionId};

#[derive(Debug)]
pub(crate) struct SubscriptionController {
    next_transaction_id: TransactionId,
    active: Option<ActiveSubscription>,
}

#[derive(Debug)]
struct ActiveSubscription {
    transaction_id: TransactionId,
    pattern: String,
}

impl SubscriptionController {
    pub(crate) fn new() -> Self {
        Self {
            next_transaction_id: 1,
            active: None,
        }
    }

    /// Build the subscription request for a new watched pattern, replacing
    /// any previously active subscription.
    pub(crate) fn subscribe(&mut self, pattern: String, unique: bool) -> PSubscribe {
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id += 1;
        self.active = Some(ActiveSubscription {
            transaction_id,
            pattern: pattern.clone(),
        });
        PSubscribe {
            transaction_id,
            request_pattern: pattern,
            unique,
        }
    }

    /// Whether a transaction id belongs to the currently active
    /// subscription (as opposed to a superseded one).
    pub(crate) fn is_current(&self, transaction_id: TransactionId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.transaction_id == transaction_id)
    }

    /// The currently watched pattern, if any.
    pub(crate) fn pattern(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.pattern.as_str())
    }

    /// Drop the active subscription. The transaction counter keeps
    /// increasing so ids are never reused within a session.
    pub(crate) fn clear(&mut self) {
        self.active = None;
    }
}
