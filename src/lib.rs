// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tree Sync
//!
//! A client-side live tree-synchronization engine for a flat,
//! delimiter-structured key space replicated from a server over a
//! persistent WebSocket connection using a pattern-subscription protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Transport Session                       │
//! │  • One WebSocket connection per session                     │
//! │  • Disconnected → Connecting → Open → Disconnected          │
//! │  • Single event loop: strict frame ordering, no locking     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      (decoded frames)
//!                              ▼
//! ┌──────────────────────────┐  ┌───────────────────────────────┐
//! │  Subscription Controller │  │         Merge Engine          │
//! │  • fresh transaction id  │  │  • splits keys on separator   │
//! │    per pattern change    │  │  • inserts/overwrites paths   │
//! │  • resets the tree       │  │  • sorted sibling order       │
//! └──────────────────────────┘  └───────────────────────────────┘
//!                              │
//!                    (immutable snapshots)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       watch channels                        │
//! │  • tree snapshot + separator (republished on every merge)   │
//! │  • session state                                            │
//! │  • server-announced multi-level wildcard                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tree_sync::{connect, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig {
//!         host: "localhost".into(),
//!         port: 8080,
//!         ..Default::default()
//!     };
//!
//!     let session = connect(config).await.expect("connect failed");
//!
//!     // The server announces its multi-level wildcard at handshake and the
//!     // session subscribes to it automatically; narrow the view later with
//!     // session.set_pattern("sensors/#".into()).
//!
//!     let mut snapshots = session.snapshots();
//!     while snapshots.changed().await.is_ok() {
//!         let snapshot = snapshots.borrow().clone();
//!         println!("{} leaves known", snapshot.tree.leaf_count());
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`session`]: the [`SessionHandle`] and the connection state machine
//! - [`tree`]: the sorted tree and the merge engine
//! - [`protocol`]: message types and the binary frame codec
//! - [`config`]: client configuration

pub mod config;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod tree;

pub use config::{ClientConfig, ConfigError};
pub use protocol::{ClientMessage, Handshake, KeyValuePair, PState, PSubscribe, ServerMessage};
pub use session::{connect, SessionError, SessionHandle, SessionState, TreeSnapshot};
pub use tree::{MergeStats, Tree, TreeNode};
