use super::{Merge, PnCounter};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replicated content of a single shopping list: item name -> quantity counter.
///
/// An item exists as soon as its key is present, even when the counter reads 0.
/// Removing an item drives its counter to zero and keeps the key, so a later
/// increment from a stale replica brings it back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapCrdt {
    items: BTreeMap<String, PnCounter>,
}

impl MapCrdt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty counter for `item`. An existing counter is left untouched.
    pub fn insert(&mut self, item: &str) {
        self.counter_mut(item);
    }

    pub fn increment(&mut self, item: &str, actor: &str, amount: u64) {
        self.counter_mut(item).increment(actor, amount);
    }

    pub fn decrement(&mut self, item: &str, actor: &str, amount: u64) {
        self.counter_mut(item).decrement(actor, amount);
    }

    /// Decrements the item by its current value on behalf of `actor`.
    pub fn remove(&mut self, item: &str, actor: &str) {
        let counter = self.counter_mut(item);
        let current = counter.value();
        if current > 0 {
            counter.decrement(actor, current as u64);
        }
    }

    /// Moves the item to `target` by recording the difference as an increment
    /// or a decrement attributed to `actor`.
    pub fn set_quantity(&mut self, item: &str, actor: &str, target: u64) {
        let current = self.item_value(item);
        let target = target as i64;
        let counter = self.counter_mut(item);
        if target > current {
            counter.increment(actor, (target - current) as u64);
        } else if target < current {
            counter.decrement(actor, (current - target) as u64);
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.contains_key(item)
    }

    /// Quantity of `item`; 0 when the item was never added.
    pub fn item_value(&self, item: &str) -> i64 {
        self.items.get(item).map(PnCounter::value).unwrap_or(0)
    }

    pub fn counter(&self, item: &str) -> Option<&PnCounter> {
        self.items.get(item)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &PnCounter)> {
        self.items.iter().map(|(name, counter)| (name.as_str(), counter))
    }

    /// Items a client would display: those with a positive quantity.
    pub fn visible_items(&self) -> Vec<(String, i64)> {
        self.items
            .iter()
            .map(|(name, counter)| (name.clone(), counter.value()))
            .filter(|(_, value)| *value > 0)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn counter_mut(&mut self, item: &str) -> &mut PnCounter {
        self.items.entry(item.to_string()).or_default()
    }
}

impl Merge for MapCrdt {
    fn merge(&self, other: &Self) -> Self {
        let mut items = self.items.clone();
        for (name, remote) in &other.items {
            let merged = match items.get(name) {
                Some(local) => local.merge(remote),
                None => PnCounter::new().merge(remote),
            };
            items.insert(name.clone(), merged);
        }
        Self { items }
    }
}
