// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for the merge engine and the frame codec.
//!
//! Uses proptest to generate random keys, batches and malformed frames and
//! verify the engine never panics, only returns clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::collection::vec;
use proptest::prelude::*;

use tree_sync::protocol::codec::{decode_server_message, encode_pstate_message};
use tree_sync::protocol::{KeyValuePair, PState, ServerMessage};
use tree_sync::tree::Children;
use tree_sync::Tree;

/// Multi-level keys sharing a small alphabet, so generated batches collide
/// on prefixes and whole keys often.
fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-d]{1,4}(/[a-d]{1,4}){0,3}").unwrap()
}

fn pairs_strategy() -> impl Strategy<Value = Vec<KeyValuePair>> {
    vec(
        (key_strategy(), "[ -~]{0,16}").prop_map(KeyValuePair::from),
        0..32,
    )
}

proptest! {
    /// Merging the same batch twice yields the same tree as merging it once.
    #[test]
    fn prop_merge_is_idempotent(pairs in pairs_strategy()) {
        let mut once = Tree::new();
        once.merge_batch(pairs.clone(), '/');

        let mut twice = Tree::new();
        twice.merge_batch(pairs.clone(), '/');
        twice.merge_batch(pairs, '/');

        prop_assert_eq!(once, twice);
    }

    /// One batch of N pairs and N batches of one pair produce the same tree.
    #[test]
    fn prop_batch_merge_equals_sequential_merge(pairs in pairs_strategy()) {
        let mut batched = Tree::new();
        batched.merge_batch(pairs.clone(), '/');

        let mut sequential = Tree::new();
        for pair in pairs {
            sequential.merge_batch([pair], '/');
        }

        prop_assert_eq!(batched, sequential);
    }

    /// After a merge, every key resolves to the last value written for it.
    #[test]
    fn prop_every_merged_key_is_retrievable(pairs in pairs_strategy()) {
        let mut tree = Tree::new();
        tree.merge_batch(pairs.clone(), '/');

        let mut seen = std::collections::HashSet::new();
        for pair in pairs.iter().rev() {
            if seen.insert(&pair.key) {
                let value = tree.get(&pair.key, '/').and_then(|n| n.value.as_deref());
                prop_assert_eq!(value, Some(pair.value.as_str()));
            }
        }
    }

    /// Sibling iteration is ascending lexicographic at every level, no
    /// matter the insertion order.
    #[test]
    fn prop_sibling_iteration_is_sorted_at_every_level(pairs in pairs_strategy()) {
        let mut tree = Tree::new();
        tree.merge_batch(pairs, '/');

        fn assert_sorted(children: &Children) -> Result<(), TestCaseError> {
            let keys: Vec<&String> = children.keys().collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);
            for node in children.values() {
                if let Some(grandchildren) = &node.children {
                    assert_sorted(grandchildren)?;
                }
            }
            Ok(())
        }
        assert_sorted(tree.roots())?;
    }
}

proptest! {
    /// Decoding arbitrary bytes never panics, only returns Err.
    #[test]
    fn fuzz_decode_from_random_bytes(frame in vec(any::<u8>(), 0..512)) {
        let _ = decode_server_message(&frame);
    }

    /// A well-formed state update survives the wire unchanged.
    #[test]
    fn prop_state_update_roundtrip(
        transaction_id in any::<u64>(),
        pattern in "[a-z/#]{1,16}",
        pairs in pairs_strategy(),
    ) {
        let original = PState {
            transaction_id,
            request_pattern: pattern,
            key_value_pairs: pairs,
        };
        let frame = encode_pstate_message(&original).unwrap();
        let decoded = decode_server_message(&frame).unwrap();
        prop_assert_eq!(decoded, ServerMessage::PState(original));
    }

    /// Every strict prefix of a valid frame fails cleanly instead of
    /// producing a partial message.
    #[test]
    fn fuzz_truncated_valid_frame_fails_cleanly(
        pairs in pairs_strategy().prop_filter("need at least one pair", |p| !p.is_empty()),
        cut in any::<prop::sample::Index>(),
    ) {
        let frame = encode_pstate_message(&PState {
            transaction_id: 1,
            request_pattern: "#".into(),
            key_value_pairs: pairs,
        })
        .unwrap();

        let len = cut.index(frame.len());
        prop_assert!(decode_server_message(&frame[..len]).is_err());
    }

    /// Flipping bytes inside a valid frame never panics the decoder.
    #[test]
    fn fuzz_corrupted_frame_never_panics(
        pairs in pairs_strategy(),
        corruption in vec(any::<u8>(), 1..16),
        position in 0usize..10000,
    ) {
        let mut frame = encode_pstate_message(&PState {
            transaction_id: 1,
            request_pattern: "#".into(),
            key_value_pairs: pairs,
        })
        .unwrap();

        let pos = position % frame.len();
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % frame.len();
            frame[idx] ^= b;
        }

        let _ = decode_server_message(&frame);
    }
}
