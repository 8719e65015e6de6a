// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connect to a local server, subscribe to everything and print the tree
//! each time it changes.
//!
//! Run with: `cargo run --example watch_tree`

use tree_sync::tree::Children;
use tree_sync::{connect, ClientConfig, SessionState, TreeSnapshot};

fn render(snapshot: &TreeSnapshot) {
    fn walk(children: &Children, depth: usize) {
        for (segment, node) in children {
            match &node.value {
                Some(value) => println!("{:indent$}{segment} = {value}", "", indent = depth * 2),
                None => println!("{:indent$}{segment}", "", indent = depth * 2),
            }
            if let Some(grandchildren) = &node.children {
                walk(grandchildren, depth + 1);
            }
        }
    }

    println!("--- {} leaves ---", snapshot.tree.leaf_count());
    walk(snapshot.tree.roots(), 0);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let session = connect(ClientConfig::default()).await?;

    let mut states = session.states();
    let mut snapshots = session.snapshots();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow().clone();
                render(&snapshot);
            }
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() == SessionState::Disconnected {
                    println!("disconnected");
                    break;
                }
            }
        }
    }

    Ok(())
}
