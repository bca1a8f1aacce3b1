//! Ring-level tests: real join and lookup code over the in-process network.
//!
//! # Test Strategy
//!
//! 1. **Reference ring**: the classic ten-member M=6 ring, joined one by one
//! 2. **Lookups**: every key from every member agrees with the expected owner
//! 3. **Edge cases**: solitary ring, two members, wraparound keys
//! 4. **Properties**: random memberships and join orders always converge

use corelib::sim::LocalNetwork;
use corelib::{Identifier, IdentifierSpace, NodeRef, RingRpc, Topology};
use proptest::prelude::*;

const MEMBERS: [u64; 10] = [1, 8, 14, 21, 32, 38, 42, 48, 51, 56];

async fn build_ring(space: IdentifierSpace, order: &[u64]) -> (LocalNetwork, NodeRef) {
    let network = LocalNetwork::new(space);
    let coordinator = network.bootstrap(Identifier(order[0]));
    for id in &order[1..] {
        network.join(Identifier(*id), &coordinator).await.unwrap();
    }
    (network, coordinator)
}

fn ids(raw: &[u64]) -> Vec<Identifier> {
    raw.iter().copied().map(Identifier).collect()
}

// ============================================================================
// Reference Ring Tests
// ============================================================================

#[tokio::test]
async fn test_reference_ring_converges() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &MEMBERS).await;

    assert_eq!(network.members(), ids(&MEMBERS));
    let topology = Topology::new(space, ids(&MEMBERS));
    let violations = topology.verify(&network.snapshots().await.unwrap());
    assert!(violations.is_empty(), "unexpected violations: {:?}", violations);
}

#[tokio::test]
async fn test_reference_ring_finger_table_of_eight() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &MEMBERS).await;

    let snapshot = network.snapshot(Identifier(8)).await.unwrap();
    let starts: Vec<u64> = snapshot.fingers.iter().map(|f| f.start.0).collect();
    let nodes: Vec<u64> = snapshot.fingers.iter().map(|f| f.node.id.0).collect();
    assert_eq!(starts, vec![9, 10, 12, 16, 24, 40]);
    assert_eq!(nodes, vec![14, 14, 14, 21, 32, 42]);
    assert_eq!(snapshot.predecessor.id, Identifier(1));
    assert_eq!(snapshot.successor.id, Identifier(14));
}

#[tokio::test]
async fn test_join_order_does_not_matter() {
    let space = IdentifierSpace::new(6).unwrap();
    let shuffled = [1, 51, 8, 42, 14, 56, 21, 38, 32, 48];
    let (network, _) = build_ring(space, &shuffled).await;

    let topology = Topology::new(space, ids(&MEMBERS));
    assert!(topology.verify(&network.snapshots().await.unwrap()).is_empty());
}

// ============================================================================
// Lookup Tests
// ============================================================================

#[tokio::test]
async fn test_every_member_agrees_on_every_owner() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &MEMBERS).await;
    let topology = Topology::new(space, ids(&MEMBERS));

    for origin in MEMBERS {
        for key in 0..space.size() {
            let (owner, _) = network
                .find_successor_from(Identifier(origin), Identifier(key))
                .await
                .unwrap();
            assert_eq!(
                Some(owner.id),
                topology.owner_of(Identifier(key)),
                "key {} looked up from {}",
                key,
                origin
            );
        }
    }
}

#[tokio::test]
async fn test_lookup_trace_starts_at_origin() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &MEMBERS).await;

    let (owner, trace) = network
        .find_successor_from(Identifier(8), Identifier(54))
        .await
        .unwrap();
    assert_eq!(owner.id, Identifier(56));
    assert_eq!(trace.hops().first(), Some(&Identifier(8)));
    // 8 -> 42 -> 51, whose successor 56 owns 54.
    assert_eq!(trace.hops(), &ids(&[8, 42, 51])[..]);
    assert!(trace.len() <= space.bits() as usize + 1);
}

#[tokio::test]
async fn test_find_predecessor_through_rpc() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, coordinator) = build_ring(space, &MEMBERS).await;

    let predecessor = network
        .find_predecessor(&coordinator, Identifier(33))
        .await
        .unwrap();
    assert_eq!(predecessor.id, Identifier(32));
    let predecessor = network
        .find_predecessor(&coordinator, Identifier(0))
        .await
        .unwrap();
    assert_eq!(predecessor.id, Identifier(56));
}

// ============================================================================
// Edge Cases
// ============================================================================

#[tokio::test]
async fn test_solitary_ring() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &[1]).await;

    let snapshot = network.snapshot(Identifier(1)).await.unwrap();
    assert_eq!(snapshot.successor.id, Identifier(1));
    assert_eq!(snapshot.predecessor.id, Identifier(1));
    for key in [0, 1, 2, 63] {
        let (owner, _) = network
            .find_successor_from(Identifier(1), Identifier(key))
            .await
            .unwrap();
        assert_eq!(owner.id, Identifier(1));
    }
}

#[tokio::test]
async fn test_two_members_split_the_ring() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &[1, 40]).await;

    let first = network.snapshot(Identifier(1)).await.unwrap();
    let second = network.snapshot(Identifier(40)).await.unwrap();
    assert_eq!(first.successor.id, Identifier(40));
    assert_eq!(first.predecessor.id, Identifier(40));
    assert_eq!(second.successor.id, Identifier(1));
    assert_eq!(second.predecessor.id, Identifier(1));

    let (owner, _) = network
        .find_successor_from(Identifier(1), Identifier(41))
        .await
        .unwrap();
    assert_eq!(owner.id, Identifier(1));
}

#[tokio::test]
async fn test_unknown_member_is_an_error() {
    let space = IdentifierSpace::new(6).unwrap();
    let (network, _) = build_ring(space, &[1]).await;
    assert!(network.snapshot(Identifier(2)).await.is_err());
}

// ============================================================================
// Property Tests
// ============================================================================

/// A ring size and a join order of distinct members, coordinator first.
fn ring_strategy() -> impl Strategy<Value = (u32, Vec<u64>)> {
    (1u32..=8).prop_flat_map(|bits| {
        let size = 1u64 << bits;
        let max = size.min(12) as usize;
        (
            Just(bits),
            prop::collection::vec(0..size, 1..=max).prop_map(|raw| {
                let mut seen = std::collections::HashSet::new();
                raw.into_iter().filter(|id| seen.insert(*id)).collect()
            }),
        )
    })
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_sequential_joins_converge((bits, order) in ring_strategy()) {
        let space = IdentifierSpace::new(bits).unwrap();
        let (violations, members) = run(async {
            let (network, _) = build_ring(space, &order).await;
            let topology = Topology::new(space, ids(&order));
            (topology.verify(&network.snapshots().await.unwrap()), network.members())
        });
        prop_assert!(violations.is_empty(), "violations: {:?}", violations);
        prop_assert_eq!(members.len(), order.len());
    }

    #[test]
    fn prop_lookups_agree_with_topology((bits, order) in ring_strategy()) {
        let space = IdentifierSpace::new(bits).unwrap();
        let topology = Topology::new(space, ids(&order));
        let mismatches = run(async {
            let (network, _) = build_ring(space, &order).await;
            let mut mismatches = Vec::new();
            for origin in &order {
                for key in 0..space.size() {
                    let (owner, trace) = network
                        .find_successor_from(Identifier(*origin), Identifier(key))
                        .await
                        .unwrap();
                    if Some(owner.id) != topology.owner_of(Identifier(key))
                        || trace.len() > space.bits() as usize + 1
                    {
                        mismatches.push((*origin, key, owner.id));
                    }
                }
            }
            mismatches
        });
        prop_assert!(mismatches.is_empty(), "mismatches: {:?}", mismatches);
    }

    #[test]
    fn prop_each_key_has_exactly_one_owner((bits, order) in ring_strategy()) {
        let space = IdentifierSpace::new(bits).unwrap();
        let snapshots = run(async {
            let (network, _) = build_ring(space, &order).await;
            network.snapshots().await.unwrap()
        });
        for key in 0..space.size() {
            let owners = snapshots
                .iter()
                .filter(|s| space.in_half_open(Identifier(key), s.predecessor.id, s.node.id))
                .count();
            prop_assert_eq!(owners, 1, "key {}", key);
        }
    }
}
