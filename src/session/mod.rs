// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The transport session and its connection state machine.
//!
//! A session owns exactly one WebSocket connection and drives the
//! lifecycle
//!
//! ```text
//! Disconnected → Connecting → Open → Disconnected
//! ```
//!
//! (with `Connecting → Disconnected` on connect failure). All state
//! transitions and merges run as reactions to four events — connection
//! open, inbound frame, connection close, watched-pattern change — on a
//! single task, so frames are processed strictly in delivery order and no
//! locking is needed.
//!
//! Consumers never see the live tree. On every successful merge the
//! session publishes an immutable [`TreeSnapshot`] through a watch
//! channel; the connection state and the server-announced multi-level
//! wildcard are published the same way.

mod subscription;
mod transport;

pub use transport::connect;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::metrics;
use crate::protocol::codec::{self, DecodeError};
use crate::protocol::{ClientMessage, Handshake, PState, ServerMessage};
use crate::tree::Tree;

use subscription::SubscriptionController;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// An immutable copy of the tree published for consumption, decoupled from
/// the mutable working copy.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    /// The tree as of the last merge. Empty while disconnected or before
    /// the first state update.
    pub tree: Tree,
    /// The separator announced at handshake, if one was received.
    pub separator: Option<char>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("session is closed")]
    Closed,
}

/// Commands accepted by the session task.
#[derive(Debug)]
pub(crate) enum Command {
    SetPattern(String),
    Close,
}

/// Handle to a running session.
///
/// Dropping the last handle closes the connection, same as calling
/// [`SessionHandle::close`]. Cloned watch receivers stay valid until the
/// session task ends.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    snapshots: watch::Receiver<TreeSnapshot>,
    wildcard: watch::Receiver<Option<String>>,
}

impl SessionHandle {
    /// Change the watched pattern. While the session is open this clears
    /// the current tree and issues a fresh subscription; while
    /// disconnected it is ignored by the session.
    pub fn set_pattern(&self, pattern: String) -> Result<(), SessionError> {
        self.commands
            .send(Command::SetPattern(pattern))
            .map_err(|_| SessionError::Closed)
    }

    /// Close the connection. Idempotent: closing an already-closed session
    /// is a no-op.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> TreeSnapshot {
        self.snapshots.borrow().clone()
    }

    /// The multi-level wildcard announced by the server, once the
    /// handshake has been received.
    pub fn wildcard(&self) -> Option<String> {
        self.wildcard.borrow().clone()
    }

    /// Subscribe to connection state changes.
    pub fn states(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Subscribe to published tree snapshots.
    pub fn snapshots(&self) -> watch::Receiver<TreeSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to multi-level wildcard announcements.
    pub fn wildcards(&self) -> watch::Receiver<Option<String>> {
        self.wildcard.clone()
    }
}

/// All session state in one place, owned by the session task.
///
/// The tree, separator, watched pattern and transaction counter live here
/// and nowhere else; everything observable leaves through the watch
/// channels as immutable values.
pub(crate) struct SessionCore {
    unique: bool,
    state: watch::Sender<SessionState>,
    snapshots: watch::Sender<TreeSnapshot>,
    wildcard: watch::Sender<Option<String>>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    tree: Tree,
    separator: Option<char>,
    subscription: SubscriptionController,
}

impl SessionCore {
    pub(crate) fn new(
        unique: bool,
        state: watch::Sender<SessionState>,
        snapshots: watch::Sender<TreeSnapshot>,
        wildcard: watch::Sender<Option<String>>,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) -> Self {
        Self {
            unique,
            state,
            snapshots,
            wildcard,
            outbound,
            tree: Tree::new(),
            separator: None,
            subscription: SubscriptionController::new(),
        }
    }

    fn is_open(&self) -> bool {
        *self.state.borrow() == SessionState::Open
    }

    /// The connection became ready: start accepting pattern changes and
    /// wait for the server's handshake.
    pub(crate) fn on_open(&mut self) {
        metrics::record_connection_event("open");
        info!("session open");
        let _ = self.state.send(SessionState::Open);
    }

    /// One inbound binary frame. Malformed frames are dropped and reported;
    /// the session stays open.
    pub(crate) fn on_frame(&mut self, frame: &[u8]) {
        match codec::decode_server_message(frame) {
            Ok(ServerMessage::Handshake(handshake)) => {
                metrics::record_frame("handshake");
                self.handle_handshake(handshake);
            }
            Ok(ServerMessage::PState(pstate)) => {
                metrics::record_frame("state_update");
                self.handle_state_update(pstate);
            }
            Err(error) => self.drop_frame(error),
        }
    }

    fn drop_frame(&self, error: DecodeError) {
        warn!(%error, "dropping undecodable frame");
        metrics::record_dropped_frame("decode");
    }

    fn handle_handshake(&mut self, handshake: Handshake) {
        info!(%handshake, "received server handshake");
        self.separator = Some(handshake.separator);
        let pattern = handshake.multi_wildcard.to_string();
        let _ = self.wildcard.send(Some(pattern.clone()));
        self.set_pattern(pattern);
    }

    fn handle_state_update(&mut self, pstate: PState) {
        let Some(separator) = self.separator else {
            warn!(
                transaction_id = pstate.transaction_id,
                "state update before handshake, dropping"
            );
            metrics::record_dropped_frame("no_handshake");
            return;
        };
        if !self.subscription.is_current(pstate.transaction_id) {
            debug!(
                transaction_id = pstate.transaction_id,
                "state update for superseded subscription, dropping"
            );
            metrics::record_dropped_frame("stale_transaction");
            return;
        }

        let stats = self.tree.merge_batch(pstate.key_value_pairs, separator);
        debug!(
            applied = stats.applied,
            rejected = stats.rejected,
            "merged state update"
        );
        metrics::record_pairs_merged(stats.applied);
        if stats.rejected > 0 {
            metrics::record_pairs_rejected(stats.rejected);
        }
        metrics::set_tree_leaves(self.tree.leaf_count());
        self.publish_snapshot();
    }

    /// Change the watched pattern. The previous working tree is discarded
    /// before the new subscription is issued so data from the old pattern
    /// never mixes with the new one.
    pub(crate) fn set_pattern(&mut self, pattern: String) {
        if !self.is_open() {
            debug!(%pattern, "ignoring pattern change while disconnected");
            return;
        }
        if pattern.is_empty() {
            warn!("ignoring empty watched pattern");
            return;
        }

        self.tree.clear();
        metrics::set_tree_leaves(0);
        self.publish_snapshot();

        let request = self.subscription.subscribe(pattern, self.unique);
        info!(
            pattern = %request.request_pattern,
            transaction_id = request.transaction_id,
            "subscribing to pattern"
        );
        metrics::record_subscription();
        let _ = self.outbound.send(ClientMessage::PSubscribe(request));
    }

    /// The connection is gone, regardless of who closed it. Idempotent.
    ///
    /// Clears the watched pattern and the tree and publishes the empty
    /// snapshot: the view degrades to "no data" instead of silently
    /// showing stale data.
    pub(crate) fn on_close(&mut self) {
        if *self.state.borrow() == SessionState::Disconnected {
            return;
        }
        info!(
            pattern = ?self.subscription.pattern(),
            "session closed"
        );
        metrics::record_connection_event("close");
        self.subscription.clear();
        self.separator = None;
        self.tree.clear();
        metrics::set_tree_leaves(0);
        let _ = self.wildcard.send(None);
        self.publish_snapshot();
        let _ = self.state.send(SessionState::Disconnected);
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshots.send(TreeSnapshot {
            tree: self.tree.clone(),
            separator: self.separator,
        });
    }
}

pub(crate) struct SessionChannels {
    pub(crate) state: watch::Receiver<SessionState>,
    pub(crate) snapshots: watch::Receiver<TreeSnapshot>,
    pub(crate) wildcard: watch::Receiver<Option<String>>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, channels: SessionChannels) -> Self {
        Self {
            commands,
            state: channels.state,
            snapshots: channels.snapshots,
            wildcard: channels.wildcard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{encode_server_message, PSUB};
    use crate::protocol::{KeyValuePair, ProtocolVersion, PSubscribe};

    struct Harness {
        core: SessionCore,
        state: watch::Receiver<SessionState>,
        snapshots: watch::Receiver<TreeSnapshot>,
        wildcard: watch::Receiver<Option<String>>,
        outbound: mpsc::UnboundedReceiver<ClientMessage>,
    }

    fn harness() -> Harness {
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (snapshot_tx, snapshot_rx) = watch::channel(TreeSnapshot::default());
        let (wildcard_tx, wildcard_rx) = watch::channel(None);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Harness {
            core: SessionCore::new(true, state_tx, snapshot_tx, wildcard_tx, outbound_tx),
            state: state_rx,
            snapshots: snapshot_rx,
            wildcard: wildcard_rx,
            outbound: outbound_rx,
        }
    }

    fn handshake_frame(separator: char, multi_wildcard: char) -> Vec<u8> {
        encode_server_message(&ServerMessage::Handshake(Handshake {
            supported_protocol_versions: vec![ProtocolVersion { major: 1, minor: 0 }],
            separator,
            wildcard: '?',
            multi_wildcard,
        }))
        .unwrap()
    }

    fn pstate_frame(transaction_id: u64, pattern: &str, pairs: &[(&str, &str)]) -> Vec<u8> {
        encode_server_message(&ServerMessage::PState(PState {
            transaction_id,
            request_pattern: pattern.to_owned(),
            key_value_pairs: pairs.iter().map(|&p| KeyValuePair::from(p)).collect(),
        }))
        .unwrap()
    }

    fn sent_subscription(h: &mut Harness) -> PSubscribe {
        match h.outbound.try_recv().expect("a message should have been sent") {
            ClientMessage::PSubscribe(request) => request,
        }
    }

    #[test]
    fn test_handshake_sets_separator_and_subscribes_to_wildcard() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));

        let request = sent_subscription(&mut h);
        assert_eq!(request.request_pattern, "#");
        assert!(request.unique);

        assert_eq!(*h.wildcard.borrow(), Some("#".to_string()));
        assert_eq!(h.snapshots.borrow().separator, Some('/'));
    }

    #[test]
    fn test_state_update_is_merged_and_published() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));
        let tid = sent_subscription(&mut h).transaction_id;

        h.core.on_frame(&pstate_frame(tid, "#", &[("a/b", "1"), ("a/c", "2")]));

        let snapshot = h.snapshots.borrow().clone();
        let a = snapshot.tree.get("a", '/').expect("root entry 'a'");
        assert!(a.value.is_none());
        assert_eq!(a.children.as_ref().unwrap().len(), 2);
        assert_eq!(
            snapshot.tree.get("a/b", '/').unwrap().value.as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_stale_state_update_is_dropped() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));
        let old_tid = sent_subscription(&mut h).transaction_id;

        h.core.set_pattern("a/#".into());
        let new_tid = sent_subscription(&mut h).transaction_id;
        assert_ne!(old_tid, new_tid);

        // An update from the superseded subscription arrives late.
        h.core.on_frame(&pstate_frame(old_tid, "#", &[("z", "stale")]));
        assert!(h.snapshots.borrow().tree.is_empty());

        h.core.on_frame(&pstate_frame(new_tid, "a/#", &[("a/x", "fresh")]));
        assert!(h.snapshots.borrow().tree.get("a/x", '/').is_some());
        assert!(h.snapshots.borrow().tree.get("z", '/').is_none());
    }

    #[test]
    fn test_resubscription_clears_tree_before_first_new_update() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));
        let tid = sent_subscription(&mut h).transaction_id;
        h.core.on_frame(&pstate_frame(tid, "#", &[("old/key", "1")]));
        assert!(!h.snapshots.borrow().tree.is_empty());

        h.core.set_pattern("a/#".into());

        // The cleared tree is published before any new data arrives.
        assert!(h.snapshots.borrow().tree.is_empty());

        let new_tid = sent_subscription(&mut h).transaction_id;
        h.core.on_frame(&pstate_frame(new_tid, "a/#", &[("a/b", "2")]));

        let snapshot = h.snapshots.borrow().clone();
        assert!(snapshot.tree.get("old/key", '/').is_none());
        assert!(snapshot.tree.get("a/b", '/').is_some());
    }

    #[test]
    fn test_close_clears_pattern_and_publishes_empty_snapshot() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));
        let tid = sent_subscription(&mut h).transaction_id;
        h.core.on_frame(&pstate_frame(tid, "#", &[("a/b", "1")]));

        h.core.on_close();

        assert_eq!(*h.state.borrow(), SessionState::Disconnected);
        assert_eq!(*h.wildcard.borrow(), None);
        let snapshot = h.snapshots.borrow().clone();
        assert!(snapshot.tree.is_empty());
        assert_eq!(snapshot.separator, None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_close();
        let _ = h.state.borrow_and_update();
        let _ = h.snapshots.borrow_and_update();

        // Second close must not republish anything.
        h.core.on_close();
        assert!(!h.state.has_changed().unwrap());
        assert!(!h.snapshots.has_changed().unwrap());
    }

    #[test]
    fn test_pattern_change_while_disconnected_sends_nothing() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_close();

        h.core.set_pattern("a/#".into());
        assert!(h.outbound.try_recv().is_err());
    }

    #[test]
    fn test_empty_pattern_is_ignored() {
        let mut h = harness();
        h.core.on_open();
        h.core.set_pattern(String::new());
        assert!(h.outbound.try_recv().is_err());
    }

    #[test]
    fn test_malformed_frame_is_dropped_and_session_stays_open() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));
        let tid = sent_subscription(&mut h).transaction_id;

        h.core.on_frame(&[0xde, 0xad, 0xbe, 0xef]);
        h.core.on_frame(&[]);
        // An unexpected client-side frame kind is equally malformed here.
        h.core.on_frame(&[PSUB, 0, 0]);

        assert_eq!(*h.state.borrow(), SessionState::Open);

        // The session keeps working afterwards.
        h.core.on_frame(&pstate_frame(tid, "#", &[("still/alive", "yes")]));
        assert!(h.snapshots.borrow().tree.get("still/alive", '/').is_some());
    }

    #[test]
    fn test_state_update_before_handshake_is_dropped() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&pstate_frame(1, "#", &[("a", "1")]));
        assert!(h.snapshots.borrow().tree.is_empty());
    }

    #[test]
    fn test_invalid_pairs_are_skipped_but_batch_applies() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('/', '#'));
        let tid = sent_subscription(&mut h).transaction_id;

        h.core.on_frame(&pstate_frame(tid, "#", &[("", "bad"), ("good/key", "1")]));

        let snapshot = h.snapshots.borrow().clone();
        assert_eq!(snapshot.tree.leaf_count(), 1);
        assert!(snapshot.tree.get("good/key", '/').is_some());
    }

    #[test]
    fn test_handshake_with_alternate_separator() {
        let mut h = harness();
        h.core.on_open();
        h.core.on_frame(&handshake_frame('.', '>'));
        let request = sent_subscription(&mut h);
        assert_eq!(request.request_pattern, ">");

        h.core.on_frame(&pstate_frame(request.transaction_id, ">", &[("a.b", "1")]));
        let snapshot = h.snapshots.borrow().clone();
        assert_eq!(snapshot.separator, Some('.'));
        assert!(snapshot.tree.get("a.b", '.').is_some());
    }
}
