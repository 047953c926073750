//! CRDT Module Tests
//!
//! Validates the convergence guarantees the replication layer relies on.
//!
//! ## Test Scopes
//! - **PnCounter**: increment/decrement arithmetic and the lattice laws of merge.
//! - **MapCrdt**: item lifecycle, remove-to-zero semantics and per-item merging.
//! - **Encoding**: JSON round trips, including the legacy `P`/`N` field names.

#[cfg(test)]
mod tests {
    use crate::crdt::{MapCrdt, Merge, PnCounter};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    // ============================================================
    // STRATEGIES
    // ============================================================

    fn counter_strategy() -> impl Strategy<Value = PnCounter> {
        prop::collection::vec(("[a-d]", any::<bool>(), 1u64..20), 0..12).prop_map(|ops| {
            let mut counter = PnCounter::new();
            for (actor, up, amount) in ops {
                if up {
                    counter.increment(&actor, amount);
                } else {
                    counter.decrement(&actor, amount);
                }
            }
            counter
        })
    }

    fn map_strategy() -> impl Strategy<Value = MapCrdt> {
        prop::collection::vec(
            ("(Milk|Eggs|Bread|Tea)", "[a-c]", 0u8..3, 1u64..10),
            0..16,
        )
        .prop_map(|ops| {
            let mut map = MapCrdt::new();
            for (item, actor, op, amount) in ops {
                match op {
                    0 => map.increment(&item, &actor, amount),
                    1 => map.decrement(&item, &actor, amount),
                    _ => map.remove(&item, &actor),
                }
            }
            map
        })
    }

    /// Value of a merged counter computed directly from per-actor maxima.
    fn conflict_free_value(a: &PnCounter, b: &PnCounter) -> i64 {
        let max_of = |x: &BTreeMap<String, u64>, y: &BTreeMap<String, u64>| -> i64 {
            let mut actors: Vec<&String> = x.keys().chain(y.keys()).collect();
            actors.sort();
            actors.dedup();
            actors
                .into_iter()
                .map(|actor| {
                    let left = x.get(actor).copied().unwrap_or(0);
                    let right = y.get(actor).copied().unwrap_or(0);
                    left.max(right) as i64
                })
                .sum()
        };
        max_of(a.increments(), b.increments()) - max_of(a.decrements(), b.decrements())
    }

    // ============================================================
    // PN-COUNTER TESTS
    // ============================================================

    #[test]
    fn test_new_counter_is_zero() {
        assert_eq!(PnCounter::new().value(), 0);
    }

    #[test]
    fn test_counter_increment_and_decrement() {
        let mut counter = PnCounter::new();
        counter.increment("alice", 5);
        counter.increment("bob", 2);
        counter.decrement("alice", 3);

        assert_eq!(counter.value(), 4);
        assert_eq!(counter.increments().get("alice"), Some(&5));
        assert_eq!(counter.decrements().get("alice"), Some(&3));
    }

    #[test]
    fn test_counter_zero_amount_is_ignored() {
        let mut counter = PnCounter::new();
        counter.increment("alice", 0);
        counter.decrement("alice", 0);

        assert_eq!(counter, PnCounter::new());
        assert_eq!(counter.actors().count(), 0);
    }

    #[test]
    fn test_counter_merge_takes_per_actor_max() {
        let mut a = PnCounter::new();
        a.increment("alice", 3);
        a.decrement("bob", 1);

        let mut b = PnCounter::new();
        b.increment("alice", 1);
        b.increment("alice", 4);
        b.decrement("bob", 2);

        let merged = a.merge(&b);
        assert_eq!(merged.increments().get("alice"), Some(&5));
        assert_eq!(merged.decrements().get("bob"), Some(&2));
        assert_eq!(merged.value(), 3);
    }

    #[test]
    fn test_counter_value_can_go_negative() {
        let mut counter = PnCounter::new();
        counter.increment("alice", 1);
        counter.decrement("bob", 4);
        assert_eq!(counter.value(), -3);
    }

    #[test]
    fn test_counter_value_saturates_on_huge_tallies() {
        let json = format!(r#"{{"increments":{{"a":{max},"b":{max},"c":10}}}}"#, max = i64::MAX);
        let counter: PnCounter = serde_json::from_str(&json).unwrap();
        assert_eq!(counter.value(), i64::MAX);

        let json = format!(r#"{{"decrements":{{"a":{max},"b":{max}}}}}"#, max = u64::MAX);
        let counter: PnCounter = serde_json::from_str(&json).unwrap();
        assert_eq!(counter.value(), i64::MIN);

        let json = format!(
            r#"{{"Milk":{{"increments":{{"a":{max},"b":{max}}},"decrements":{{"c":{max}}}}}}}"#,
            max = u64::MAX
        );
        assert_eq!(MapCrdt::from_json(&json).unwrap().item_value("Milk"), i64::MAX);
    }

    proptest! {
        #[test]
        fn prop_counter_merge_is_commutative(a in counter_strategy(), b in counter_strategy()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn prop_counter_merge_is_associative(
            a in counter_strategy(),
            b in counter_strategy(),
            c in counter_strategy()
        ) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }

        #[test]
        fn prop_counter_merge_is_idempotent(a in counter_strategy()) {
            prop_assert_eq!(a.merge(&a), a);
        }

        #[test]
        fn prop_counter_merge_matches_conflict_free_value(
            a in counter_strategy(),
            b in counter_strategy()
        ) {
            prop_assert_eq!(a.merge(&b).value(), conflict_free_value(&a, &b));
        }
    }

    // ============================================================
    // MAP CRDT TESTS
    // ============================================================

    #[test]
    fn test_map_insert_creates_zero_item() {
        let mut list = MapCrdt::new();
        list.insert("Milk");

        assert!(list.contains("Milk"));
        assert_eq!(list.item_value("Milk"), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_map_insert_keeps_existing_counter() {
        let mut list = MapCrdt::new();
        list.increment("Milk", "alice", 2);
        list.insert("Milk");

        assert_eq!(list.item_value("Milk"), 2);
    }

    #[test]
    fn test_map_missing_item_reads_zero() {
        let list = MapCrdt::new();
        assert!(!list.contains("Milk"));
        assert_eq!(list.item_value("Milk"), 0);
        assert!(list.is_empty());
    }

    #[test]
    fn test_map_remove_drives_value_to_zero_and_keeps_key() {
        let mut list = MapCrdt::new();
        list.increment("Eggs", "alice", 6);
        list.increment("Eggs", "bob", 2);

        list.remove("Eggs", "bob");

        assert!(list.contains("Eggs"));
        assert_eq!(list.item_value("Eggs"), 0);
        assert_eq!(list.counter("Eggs").unwrap().decrements().get("bob"), Some(&8));
    }

    #[test]
    fn test_map_removed_item_resurrects_on_stale_increment() {
        let mut replica_a = MapCrdt::new();
        replica_a.increment("Bread", "alice", 1);
        let mut replica_b = replica_a.clone();

        replica_a.remove("Bread", "alice");
        replica_b.increment("Bread", "bob", 2);

        let merged = replica_a.merge(&replica_b);
        assert!(merged.contains("Bread"));
        assert_eq!(merged.item_value("Bread"), 2);
    }

    #[test]
    fn test_map_set_quantity_records_delta() {
        let mut list = MapCrdt::new();
        list.set_quantity("Tea", "alice", 4);
        assert_eq!(list.item_value("Tea"), 4);

        list.set_quantity("Tea", "alice", 1);
        assert_eq!(list.item_value("Tea"), 1);

        let counter = list.counter("Tea").unwrap();
        assert_eq!(counter.increments().get("alice"), Some(&4));
        assert_eq!(counter.decrements().get("alice"), Some(&3));
    }

    #[test]
    fn test_concurrent_adds_from_two_actors_sum_on_merge() {
        let mut replica_a = MapCrdt::new();
        replica_a.increment("Milk", "alice", 2);

        let mut replica_b = MapCrdt::new();
        replica_b.increment("Milk", "bob", 3);

        let merged = replica_a.merge(&replica_b);
        assert_eq!(merged.item_value("Milk"), 5);
        assert_eq!(replica_b.merge(&replica_a), merged);
    }

    #[test]
    fn test_map_merge_unions_items() {
        let mut a = MapCrdt::new();
        a.increment("Milk", "alice", 1);
        let mut b = MapCrdt::new();
        b.insert("Eggs");

        let merged = a.merge(&b);
        assert!(merged.contains("Milk"));
        assert!(merged.contains("Eggs"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_visible_items_hide_zero_and_negative() {
        let mut list = MapCrdt::new();
        list.increment("Milk", "alice", 2);
        list.insert("Eggs");
        list.decrement("Tea", "bob", 1);

        assert_eq!(list.visible_items(), vec![("Milk".to_string(), 2)]);
    }

    proptest! {
        #[test]
        fn prop_map_merge_is_commutative(a in map_strategy(), b in map_strategy()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn prop_map_merge_is_associative(
            a in map_strategy(),
            b in map_strategy(),
            c in map_strategy()
        ) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }

        #[test]
        fn prop_map_merge_is_idempotent(a in map_strategy()) {
            prop_assert_eq!(a.merge(&a), a);
        }

        #[test]
        fn prop_map_merge_unions_items_and_merges_counters(a in map_strategy(), b in map_strategy()) {
            let merged = a.merge(&b);
            for (item, _) in a.items().chain(b.items()) {
                prop_assert!(merged.contains(item));
                let empty = PnCounter::new();
                let left = a.counter(item).unwrap_or(&empty);
                let right = b.counter(item).unwrap_or(&empty);
                prop_assert_eq!(merged.item_value(item), conflict_free_value(left, right));
            }
            prop_assert!(merged.len() <= a.len() + b.len());
        }

        #[test]
        fn prop_map_json_round_trip_preserves_values(a in map_strategy()) {
            let json = a.to_json().unwrap();
            let restored = MapCrdt::from_json(&json).unwrap();
            for (item, counter) in a.items() {
                prop_assert_eq!(restored.item_value(item), counter.value());
            }
            prop_assert_eq!(restored, a);
        }
    }

    // ============================================================
    // ENCODING TESTS
    // ============================================================

    #[test]
    fn test_map_json_shape() {
        let mut list = MapCrdt::new();
        list.increment("Milk", "alice", 2);

        let value: serde_json::Value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["Milk"]["increments"]["alice"], 2);
        assert!(value["Milk"]["decrements"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_map_accepts_legacy_field_names() {
        let json = r#"{"Aletria":{"P":{"Tiago":7,"Andre":5},"N":{"Guilherme":4}}}"#;
        let list = MapCrdt::from_json(json).unwrap();

        assert_eq!(list.item_value("Aletria"), 8);
    }

    #[test]
    fn test_empty_map_serializes_to_empty_object() {
        assert_eq!(MapCrdt::new().to_json().unwrap(), "{}");
        assert!(MapCrdt::from_json("{}").unwrap().is_empty());
    }
}
