//! Client-side cache of query results with explicit snapshot and restore.

use std::{collections::HashMap, hash::Hash};

#[derive(Debug, Clone, PartialEq)]
struct CachedView<V> {
    value: V,
    stale: bool,
}

/// Verbatim copy of every cached view, taken before an optimistic update.
#[derive(Debug, Clone)]
pub struct ViewSnapshot<K, V> {
    views: HashMap<K, CachedView<V>>,
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for ViewSnapshot<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.views == other.views
    }
}

impl<K, V> ViewSnapshot<K, V> {
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ViewStore<K, V> {
    views: HashMap<K, CachedView<V>>,
}

impl<K, V> Default for ViewStore<K, V> {
    fn default() -> Self {
        Self {
            views: HashMap::new(),
        }
    }
}

impl<K, V> ViewStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.views.get(key).map(|view| &view.value)
    }

    /// Stores a fresh value for `key`, clearing its stale flag.
    pub fn set(&mut self, key: K, value: V) {
        self.views.insert(key, CachedView {
            value,
            stale: false,
        });
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.views.remove(key).map(|view| view.value)
    }

    pub fn is_stale(&self, key: &K) -> bool {
        self.views.get(key).is_some_and(|view| view.stale)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.views.keys()
    }

    pub fn snapshot(&self) -> ViewSnapshot<K, V> {
        ViewSnapshot {
            views: self.views.clone(),
        }
    }

    /// Puts the store back exactly as it was when `snapshot` was taken.
    /// Views cached after the snapshot are dropped.
    pub fn restore(&mut self, snapshot: ViewSnapshot<K, V>) {
        self.views = snapshot.views;
    }

    /// Runs `update` over every cached value. Returns how many reported a
    /// change.
    pub fn update_all(&mut self, mut update: impl FnMut(&mut V) -> bool) -> usize {
        self.views
            .values_mut()
            .map(|view| update(&mut view.value))
            .filter(|changed| *changed)
            .count()
    }

    /// Marks every view stale; values stay readable until refreshed.
    pub fn invalidate_all(&mut self) {
        for view in self.views.values_mut() {
            view.stale = true;
        }
    }
}

#[cfg(test)]
#[path = "tests/view_store_tests.rs"]
mod tests;
