//! Merge laws of the grow-only counter, checked on arbitrary states.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rga_sync::{CounterError, GCounter, GCounterState, ReplicaId};

fn replica_strategy() -> impl Strategy<Value = ReplicaId> {
    prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(ReplicaId::from)
}

fn counter_strategy() -> impl Strategy<Value = GCounter> {
    (
        replica_strategy(),
        prop::collection::btree_map(replica_strategy(), 0u64..1_000_000, 0..4),
    )
        .prop_map(|(replica_id, counts)| {
            GCounter::from_state(GCounterState {
                replica_id,
                counts: counts.into_iter().collect(),
            })
        })
}

fn merged(x: &GCounter, y: &GCounter) -> GCounter {
    let mut result = x.clone();
    result.merge(y);
    result
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn merge_is_commutative(x in counter_strategy(), y in counter_strategy()) {
        prop_assert_eq!(merged(&x, &y), merged(&y, &x));
    }

    #[test]
    fn merge_is_associative(
        x in counter_strategy(),
        y in counter_strategy(),
        z in counter_strategy(),
    ) {
        prop_assert_eq!(merged(&merged(&x, &y), &z), merged(&x, &merged(&y, &z)));
    }

    #[test]
    fn merge_is_idempotent(x in counter_strategy()) {
        prop_assert_eq!(merged(&x, &x), x);
    }

    #[test]
    fn merged_value_is_sum_of_pointwise_max(x in counter_strategy(), y in counter_strategy()) {
        let replicas: BTreeSet<&ReplicaId> = x.counts().keys().chain(y.counts().keys()).collect();
        let expected: u64 = replicas
            .into_iter()
            .map(|replica| x.count_for(replica).max(y.count_for(replica)))
            .sum();
        prop_assert_eq!(merged(&x, &y).value(), expected);
    }

    #[test]
    fn state_exchange_preserves_counter(x in counter_strategy()) {
        let restored = GCounter::from_state(x.state());
        prop_assert_eq!(restored.replica_id(), x.replica_id());
        prop_assert_eq!(restored, x);
    }
}

#[test]
fn test_replicas_converge_after_exchanging_states() {
    let mut counters: Vec<GCounter> = ["a", "b", "c"].into_iter().map(GCounter::new).collect();
    for (i, counter) in counters.iter_mut().enumerate() {
        counter.increment(i as i64 + 1).unwrap();
    }

    let states: Vec<GCounterState> = counters.iter().map(GCounter::state).collect();
    for counter in counters.iter_mut() {
        for state in states.iter().rev() {
            counter.merge(&GCounter::from_state(state.clone()));
        }
    }

    for counter in &counters {
        assert_eq!(counter.value(), 6);
        assert_eq!(counter, &counters[0]);
    }
    let expected: BTreeMap<ReplicaId, u64> = [("a", 1), ("b", 2), ("c", 3)]
        .into_iter()
        .map(|(replica, count)| (ReplicaId::from(replica), count))
        .collect();
    assert_eq!(counters[0].counts(), &expected);
}

#[test]
fn test_decrement_is_rejected() {
    let mut counter = GCounter::new("a");
    counter.increment(2).unwrap();
    assert_eq!(counter.increment(-1), Err(CounterError::NegativeIncrement(-1)));
    assert_eq!(counter.value(), 2);
}
