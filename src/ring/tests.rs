//! Ring Module Tests
//!
//! Validates placement, lookup and topology changes of the consistent-hash ring.
//!
//! ## Test Scopes
//! - **Identity**: virtual node naming and text encoding.
//! - **Lookup**: responsibility, wrap-around, successors and predecessors.
//! - **Topology**: adding and removing servers, replica sets.
//! - **Sharing**: snapshot isolation of `SharedRing`.

#[cfg(test)]
mod tests {
    use crate::ring::{HashRing, RingError, SharedRing, VirtualNode, VirtualNodeId, ring_hash};

    const MODULUS: u64 = 1000;

    fn four_by_three() -> HashRing {
        HashRing::build(1..=4, 3, MODULUS)
    }

    // ============================================================
    // IDENTITY TESTS
    // ============================================================

    #[test]
    fn test_virtual_node_id_display_and_parse() {
        let id = VirtualNodeId::new(12, 3);
        assert_eq!(id.to_string(), "S12V3");
        assert_eq!("S12V3".parse::<VirtualNodeId>().unwrap(), id);
    }

    #[test]
    fn test_virtual_node_id_rejects_garbage() {
        assert!(matches!(
            "12V3".parse::<VirtualNodeId>(),
            Err(RingError::InvalidVirtualNode(_))
        ));
        assert!("S1X3".parse::<VirtualNodeId>().is_err());
        assert!("SaV1".parse::<VirtualNodeId>().is_err());
    }

    #[test]
    fn test_virtual_node_id_serializes_as_text() {
        let json = serde_json::to_string(&VirtualNodeId::new(2, 1)).unwrap();
        assert_eq!(json, "\"S2V1\"");
        let back: VirtualNodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, VirtualNodeId::new(2, 1));
    }

    #[test]
    fn test_ring_hash_is_deterministic_and_bounded() {
        for i in 0..500 {
            let key = format!("list-{}", i);
            let h = ring_hash(&key, MODULUS);
            assert_eq!(h, ring_hash(&key, MODULUS));
            assert!(h < MODULUS);
        }
    }

    #[test]
    fn test_ring_hash_spreads_keys() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..2000 {
            seen.insert(ring_hash(&format!("key-{}", i), MODULUS));
        }
        assert!(seen.len() > 500, "only {} distinct hashes", seen.len());
    }

    // ============================================================
    // BUILD & LOOKUP TESTS
    // ============================================================

    #[test]
    fn test_build_four_servers_three_vnodes() {
        let ring = four_by_three();
        assert_eq!(ring.len(), 12);
        assert_eq!(ring.servers(), vec![1, 2, 3, 4]);

        let hashes: Vec<u64> = ring.entries().iter().map(|node| node.hash).collect();
        let mut sorted = hashes.clone();
        sorted.sort_unstable();
        assert_eq!(hashes, sorted);

        for node in ring.entries() {
            assert_eq!(node.hash, ring_hash(&node.id.to_string(), MODULUS));
        }
    }

    #[test]
    fn test_responsible_for_existing_hash_returns_that_entry() {
        let ring = four_by_three();
        for node in ring.entries() {
            let owner = ring.responsible_for_hash(node.hash).unwrap();
            // Equal hashes resolve to the first of the tied entries.
            assert_eq!(ring.get(owner).unwrap().hash, node.hash);
        }
    }

    #[test]
    fn test_responsible_wraps_past_last_entry() {
        let ring = four_by_three();
        let last = ring.entries().last().unwrap().hash;
        let first = ring.entries()[0].id;

        assert_eq!(ring.responsible_for_hash(last + 1), Some(first));
        assert_eq!(ring.responsible_for_hash(u64::MAX), Some(first));
        assert_eq!(ring.responsible_for_hash(0), Some(first));
    }

    #[test]
    fn test_responsible_picks_first_entry_at_or_above_hash() {
        let ring = four_by_three();
        for probe in 0..MODULUS {
            let owner = ring.responsible_for_hash(probe).unwrap();
            let expected = ring
                .entries()
                .iter()
                .find(|node| node.hash >= probe)
                .unwrap_or(&ring.entries()[0]);
            assert_eq!(owner, expected.id);
        }
    }

    #[test]
    fn test_responsible_node_is_stable() {
        let ring = four_by_three();
        let key = "7f9c1d2e-0000-4000-8000-000000000001";
        let first = ring.responsible_node(key);
        for _ in 0..100 {
            assert_eq!(ring.responsible_node(key), first);
        }
        assert_eq!(four_by_three().responsible_node(key), first);
    }

    #[test]
    fn test_empty_ring_has_no_owner() {
        let ring = HashRing::new(MODULUS);
        assert!(ring.is_empty());
        assert_eq!(ring.responsible_node("anything"), None);
        assert!(ring.preference_list("anything", 2).is_empty());
    }

    #[test]
    fn test_successor_and_predecessor_wrap() {
        let ring = four_by_three();
        let entries = ring.entries();
        let first = entries[0].id;
        let last = entries[entries.len() - 1].id;

        assert_eq!(ring.successor(last), Some(first));
        assert_eq!(ring.predecessor(first), Some(last));
        assert_eq!(ring.successor(first), Some(entries[1].id));
        assert_eq!(ring.predecessor(entries[1].id), Some(first));
        assert_eq!(ring.successor(VirtualNodeId::new(9, 1)), None);
    }

    #[test]
    fn test_nodes_for_replication_follow_ring_order() {
        let ring = four_by_three();
        let entries = ring.entries();
        let primary = entries[10].id;

        let replicas = ring.nodes_for_replication(primary, 2);
        assert_eq!(replicas, vec![entries[11].id, entries[0].id]);

        let all = ring.nodes_for_replication(primary, 50);
        assert_eq!(all.len(), 11);
        assert!(!all.contains(&primary));
    }

    #[test]
    fn test_preference_list_starts_with_responsible() {
        let ring = four_by_three();
        let key = "shopping";
        let list = ring.preference_list(key, 2);
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], ring.responsible_node(key).unwrap());
        assert_eq!(list[1], ring.successor(list[0]).unwrap());
        assert_eq!(list[2], ring.successor(list[1]).unwrap());
    }

    // ============================================================
    // TOPOLOGY TESTS
    // ============================================================

    #[test]
    fn test_add_server_inserts_sorted_positions() {
        let mut ring = four_by_three();
        assert!(ring.add_server(5, 3));
        assert_eq!(ring.len(), 15);
        assert_eq!(ring.virtual_nodes_of(5).len(), 3);
        assert!(ring.entries().windows(2).all(|w| w[0].hash <= w[1].hash));

        assert!(!ring.add_server(5, 3), "adding twice is a no-op");
        assert_eq!(ring.len(), 15);
    }

    #[test]
    fn test_add_then_remove_restores_ring() {
        let original = four_by_three();
        let mut ring = original.clone();
        ring.add_server(5, 3);
        assert!(ring.remove_server(5));
        assert_eq!(ring, original);
        assert!(!ring.remove_server(5));
    }

    #[test]
    fn test_add_server_moves_only_keys_landing_on_new_server() {
        let before = four_by_three();
        let mut after = before.clone();
        after.add_server(5, 3);

        for i in 0..1000 {
            let key = format!("key-{}", i);
            let old_owner = before.responsible_node(&key).unwrap();
            let new_owner = after.responsible_node(&key).unwrap();
            if new_owner.server_id != 5 {
                assert_eq!(old_owner, new_owner, "key {} moved between old servers", key);
            }
        }
    }

    #[test]
    fn test_remove_server_hands_keys_to_successor() {
        let before = four_by_three();
        let mut after = before.clone();
        after.remove_server(2);

        for i in 0..1000 {
            let key = format!("key-{}", i);
            let old_owner = before.responsible_node(&key).unwrap();
            let new_owner = after.responsible_node(&key).unwrap();
            if old_owner.server_id != 2 {
                assert_eq!(old_owner, new_owner);
            } else {
                assert_ne!(new_owner.server_id, 2);
            }
        }
    }

    // ============================================================
    // ENCODING TESTS
    // ============================================================

    #[test]
    fn test_ring_text_round_trip() {
        let ring = four_by_three();
        let text = ring.encode();
        assert_eq!(text.split(':').count(), 12);
        assert_eq!(HashRing::decode(&text, MODULUS).unwrap(), ring);
    }

    #[test]
    fn test_ring_decode_tolerates_trailing_separator() {
        let ring = HashRing::decode("S1V1,10:S2V1,5:", MODULUS).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.entries()[0].id, VirtualNodeId::new(2, 1));
    }

    #[test]
    fn test_ring_decode_rejects_bad_entries() {
        assert!(matches!(
            HashRing::decode("S1V1;10", MODULUS),
            Err(RingError::InvalidEntry(_))
        ));
        assert!(HashRing::decode("S1V1,ten", MODULUS).is_err());
        assert!(HashRing::decode("X,10", MODULUS).is_err());
    }

    #[test]
    fn test_virtual_node_entry_text() {
        let node: VirtualNode = "S3V2,417".parse().unwrap();
        assert_eq!(node.id, VirtualNodeId::new(3, 2));
        assert_eq!(node.hash, 417);
        assert_eq!(node.to_string(), "S3V2,417");
    }

    // ============================================================
    // SHARED RING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_shared_ring_snapshot_survives_update() {
        let shared = SharedRing::new(four_by_three());
        let snapshot = shared.snapshot().await;

        let (next, added) = shared.update(|ring| ring.add_server(5, 3)).await;
        assert!(added);
        assert_eq!(next.len(), 15);
        assert_eq!(snapshot.len(), 12, "old snapshot is untouched");
        assert_eq!(shared.snapshot().await.len(), 15);
    }

    #[tokio::test]
    async fn test_shared_ring_replace_returns_previous() {
        let shared = SharedRing::new(HashRing::new(MODULUS));
        let previous = shared.replace(four_by_three()).await;
        assert!(previous.is_empty());
        assert_eq!(shared.snapshot().await.len(), 12);
    }
}
