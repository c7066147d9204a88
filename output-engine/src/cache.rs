//! Per-request attribute cache.
//!
//! One `ObjectCache` lives inside exactly one generation request. It maps
//! (object, attribute name) to the value computed the first time the pair was
//! asked for, so a template that names `labelOrName` three times, or an
//! ancestor walk that revisits the same parent, reads the tree once.

use std::collections::HashMap;

use crate::types::{ObjectId, Value};

/// Memoized attribute values for one generation request.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: HashMap<ObjectId, HashMap<String, Value>>,
    hits: u64,
    misses: u64,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `(object, attribute)`, computing and
    /// storing it on first use.
    ///
    /// # Examples
    ///
    /// ```
    /// use output_engine::{ObjectCache, ObjectId, Value};
    ///
    /// let mut cache = ObjectCache::new();
    /// let mut calls = 0;
    /// for _ in 0..3 {
    ///     cache.get_or_compute(ObjectId(1), "name", || {
    ///         calls += 1;
    ///         Value::Text("OK".into())
    ///     });
    /// }
    /// assert_eq!(calls, 1);
    /// assert_eq!(cache.hits(), 2);
    /// ```
    pub fn get_or_compute<F>(&mut self, object: ObjectId, attribute: &str, compute: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        if let Some(value) = self.get(object, attribute) {
            let value = value.clone();
            self.hits += 1;
            return value;
        }
        self.misses += 1;
        let value = compute();
        self.insert(object, attribute, value.clone());
        value
    }

    /// Looks up a value without computing it.
    pub fn get(&self, object: ObjectId, attribute: &str) -> Option<&Value> {
        self.entries.get(&object)?.get(attribute)
    }

    /// Stores a value, replacing any previous one.
    pub fn insert(&mut self, object: ObjectId, attribute: &str, value: Value) {
        self.entries
            .entry(object)
            .or_default()
            .insert(attribute.to_string(), value);
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of lookups that had to compute.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of cached (object, attribute) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    // ============================================================================
    // Unit Tests for get_or_compute
    // ============================================================================

    #[test]
    fn test_compute_runs_once_per_pair() {
        let calls = Cell::new(0);
        let mut cache = ObjectCache::new();
        let compute = || {
            calls.set(calls.get() + 1);
            Value::Bool(true)
        };
        cache.get_or_compute(ObjectId(1), "isFocused", compute);
        cache.get_or_compute(ObjectId(1), "isFocused", compute);
        cache.get_or_compute(ObjectId(2), "isFocused", compute);
        cache.get_or_compute(ObjectId(1), "isShowing", compute);
        assert_eq!(calls.get(), 3);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_not_applicable_is_cached_too() {
        let mut cache = ObjectCache::new();
        cache.get_or_compute(ObjectId(9), "level", || Value::NotApplicable);
        assert_eq!(cache.get(ObjectId(9), "level"), Some(&Value::NotApplicable));
    }

    #[test]
    fn test_fresh_cache_does_not_see_previous_values() {
        let mut first = ObjectCache::new();
        first.get_or_compute(ObjectId(1), "name", || Value::Text("old".into()));
        drop(first);

        let mut second = ObjectCache::new();
        assert!(second.is_empty());
        let value = second.get_or_compute(ObjectId(1), "name", || Value::Text("new".into()));
        assert_eq!(value, Value::Text("new".into()));
    }

    // ============================================================================
    // Property Tests
    // ============================================================================

    proptest! {
        /// Misses equal the number of distinct (object, attribute) pairs requested.
        #[test]
        fn prop_misses_count_distinct_pairs(
            requests in proptest::collection::vec((0u64..5, "[a-c]"), 0..40)
        ) {
            let mut cache = ObjectCache::new();
            for (object, attribute) in &requests {
                cache.get_or_compute(ObjectId(*object), attribute, || Value::Int(*object as i64));
            }
            let distinct: std::collections::HashSet<_> = requests.iter().collect();
            prop_assert_eq!(cache.misses() as usize, distinct.len());
            prop_assert_eq!(cache.hits() as usize, requests.len() - distinct.len());
            prop_assert_eq!(cache.len(), distinct.len());
        }
    }
}
