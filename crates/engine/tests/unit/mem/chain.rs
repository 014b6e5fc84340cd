//! # Chain Tests
//!
//! Verifies that chains are single cycles over every chunk, that pointers sit
//! where the placement hash says, and that the walk visits every node.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use synthload_core::mem::chain::slot_placement;
use synthload_core::mem::{Chain, ChainParams};

fn params(footprint: usize, dispersion: usize) -> ChainParams {
    ChainParams {
        footprint,
        line: 64,
        dispersion,
        alignment: 8,
        span: 16,
        streaming: false,
        huge_pages: false,
        seed: 1,
        verify: true,
    }
}

#[test]
fn test_chain_one_mebibyte() {
    let chain = Chain::build(&params(1 << 20, 1)).unwrap();
    assert_eq!(chain.nodes(), 16384);
    assert_eq!(chain.chunk(), 64);
    assert_eq!(chain.size(), 1 << 20);
    let walk = chain.walk();
    assert_eq!(walk.length, 16384);
    assert_eq!(walk.lowest, chain.base());
    assert!(walk.highest < chain.base() + chain.size());
}

#[test]
fn test_chain_dispersion_multiplies_region() {
    let chain = Chain::build(&params(64 * 64, 4)).unwrap();
    assert_eq!(chain.chunk(), 256);
    assert_eq!(chain.nodes(), 64);
    assert_eq!(chain.size(), 64 * 64 * 4);
}

#[test]
fn test_chain_footprint_rounds_up_to_chunk() {
    let chain = Chain::build(&params(100, 1)).unwrap();
    assert_eq!(chain.nodes(), 2);
    assert_eq!(chain.walk().length, 2);
}

#[test]
fn test_chain_single_node_points_to_itself() {
    let chain = Chain::build(&params(64, 1)).unwrap();
    assert_eq!(chain.nodes(), 1);
    assert_eq!(chain.successor(0), 0);
    assert_eq!(chain.entry() as usize, chain.base());
}

#[test]
fn test_chain_streaming_is_sequential() {
    let chain = Chain::build(&ChainParams {
        streaming: true,
        ..params(64 * 16, 1)
    })
    .unwrap();
    for i in 0..chain.nodes() {
        assert_eq!(chain.successor(i), (i + 1) % chain.nodes());
    }
}

#[test]
fn test_chain_seed_is_deterministic() {
    let a = Chain::build(&params(64 * 128, 1)).unwrap();
    let b = Chain::build(&params(64 * 128, 1)).unwrap();
    let order = |c: &Chain| (0..c.nodes()).map(|i| c.successor(i)).collect::<Vec<_>>();
    assert_eq!(order(&a), order(&b));
}

// ──────────────────────────────────────────────────────────
// Corrupted Chains
// ──────────────────────────────────────────────────────────

/// Overwrites the pointer stored at the chain entry.
fn overwrite_entry(chain: &Chain, value: usize) {
    // SAFETY: the entry is the 8-byte aligned start of the live mapping.
    unsafe { chain.entry().cast::<u64>().write(value as u64) };
}

fn entry_pointer(chain: &Chain) -> usize {
    // SAFETY: as above.
    unsafe { chain.entry().cast::<u64>().read() as usize }
}

#[test]
#[should_panic(expected = "chain is a sub-cycle")]
fn test_walk_rejects_entry_pointing_to_itself() {
    let chain = Chain::build(&params(64 * 16, 1)).unwrap();
    overwrite_entry(&chain, chain.base());
    let _ = chain.walk();
}

#[test]
#[should_panic(expected = "escapes region")]
fn test_walk_rejects_pointer_past_region_end() {
    let chain = Chain::build(&params(64 * 16, 1)).unwrap();
    overwrite_entry(&chain, chain.base() + chain.size() + 64);
    let _ = chain.walk();
}

#[test]
#[should_panic(expected = "is not a slot address")]
fn test_walk_rejects_pointer_off_its_slot() {
    let chain = Chain::build(&params(64 * 16, 2)).unwrap();
    // Another aligned word of the same chunk.
    overwrite_entry(&chain, entry_pointer(&chain) ^ 8);
    let _ = chain.walk();
}

#[test]
fn test_walk_steps_land_on_slots() {
    let chain = Chain::build(&params(64 * 64, 4)).unwrap();
    let mut at = 0;
    for _ in 0..chain.nodes() {
        let next = chain.successor(at);
        let offset = chain.slot_offset(next);
        assert_eq!(offset / chain.chunk(), next);
        assert!(offset % chain.chunk() + 16 <= chain.chunk());
        at = next;
    }
    assert_eq!(at, 0);
}

#[test]
fn test_slot_placement_chunk_zero_at_base() {
    assert_eq!(slot_placement(0, 256, 16, 8), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every chain is one cycle through every chunk.
    #[test]
    fn prop_chain_is_single_cycle(
        nodes in 1usize..200,
        dispersion in 1usize..4,
        seed in any::<u64>(),
        streaming in any::<bool>(),
    ) {
        let chain = Chain::build(&ChainParams {
            seed,
            streaming,
            verify: false,
            ..params(nodes * 64, dispersion)
        })
        .unwrap();
        prop_assert_eq!(chain.nodes(), nodes);

        let mut seen = HashSet::new();
        let mut at = 0;
        for _ in 0..nodes {
            prop_assert!(seen.insert(at), "node {} visited twice", at);
            at = chain.successor(at);
        }
        prop_assert_eq!(at, 0);
        prop_assert_eq!(chain.walk().length, nodes);
    }

    /// Pointers are aligned and leave `span` bytes inside their chunk.
    #[test]
    fn prop_slot_placement_stays_in_chunk(
        index in 0usize..10_000,
        dispersion in 1usize..8,
        align_shift in 3u32..7,
        span in 16usize..64,
    ) {
        let chunk = 64 * dispersion;
        let alignment = 1usize << align_shift;
        prop_assume!(alignment <= chunk && span <= chunk);
        let offset = slot_placement(index, chunk, span, alignment);
        prop_assert_eq!(offset % alignment, 0);
        prop_assert!(offset + span <= chunk);
    }
}
