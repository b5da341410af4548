//! Named counters for tracking storage events

use std::collections::HashMap;

/// A set of named monotonic counters.
///
/// Names are expected to be `'static` dotted paths like `"pool.grow"` so the
/// map never allocates for keys.
#[derive(Default)]
pub struct Counter {
    counters: HashMap<&'static str, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    /// Add `value` to the counter `name`, creating it at zero if absent.
    pub fn increment(&mut self, name: &'static str, value: u64) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    /// Current value of `name`, zero if it was never incremented.
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Drop all counters back to zero.
    pub fn reset(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().map(|(&name, &value)| (name, value))
    }
}
