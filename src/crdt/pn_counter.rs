use super::Merge;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counter that supports both increments and decrements across replicas.
///
/// Each actor (a client user id) only ever grows its own entries in `increments`
/// and `decrements`, so merging two copies is a per-actor `max`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnCounter {
    #[serde(default, alias = "P")]
    increments: BTreeMap<String, u64>,
    #[serde(default, alias = "N")]
    decrements: BTreeMap<String, u64>,
}

impl PnCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the actor's increment tally.
    ///
    /// Amounts are validated by the caller; a zero amount leaves the state untouched.
    pub fn increment(&mut self, actor: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.increments.entry(actor.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn decrement(&mut self, actor: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.decrements.entry(actor.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Sum of all increments minus sum of all decrements, saturated to the `i64` range.
    pub fn value(&self) -> i64 {
        let positive: i128 = self.increments.values().map(|&n| i128::from(n)).sum();
        let negative: i128 = self.decrements.values().map(|&n| i128::from(n)).sum();
        (positive - negative).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    pub fn increments(&self) -> &BTreeMap<String, u64> {
        &self.increments
    }

    pub fn decrements(&self) -> &BTreeMap<String, u64> {
        &self.decrements
    }

    /// Actors that contributed to this counter in either direction.
    pub fn actors(&self) -> impl Iterator<Item = &str> {
        let mut actors: Vec<&str> = self
            .increments
            .keys()
            .chain(self.decrements.keys())
            .map(String::as_str)
            .collect();
        actors.sort_unstable();
        actors.dedup();
        actors.into_iter()
    }
}

fn max_merge(left: &BTreeMap<String, u64>, right: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    let mut merged = left.clone();
    for (actor, &count) in right {
        let entry = merged.entry(actor.clone()).or_insert(0);
        *entry = (*entry).max(count);
    }
    merged
}

impl Merge for PnCounter {
    fn merge(&self, other: &Self) -> Self {
        Self {
            increments: max_merge(&self.increments, &other.increments),
            decrements: max_merge(&self.decrements, &other.decrements),
        }
    }
}
