//! Registration sets that stay stable while they are being iterated.
//!
//! The scheduler's tree and timer registries and the blackboard's listener
//! registry all follow the same discipline: outside of a pass, additions and
//! removals apply immediately; during a pass they are buffered and merged by
//! [`DeferredSet::end_pass`]. A pending removal cancels a pending addition of
//! the same key and vice versa.

use crate::error::RegistryError;

/// An insertion-ordered keyed set with buffered mutation.
#[derive(Debug)]
pub struct DeferredSet<K, V> {
    live: Vec<(K, V)>,
    pending_add: Vec<(K, V)>,
    pending_remove: Vec<K>,
    iterating: bool,
}

impl<K, V> Default for DeferredSet<K, V> {
    fn default() -> Self {
        Self {
            live: Vec::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            iterating: false,
        }
    }
}

impl<K: PartialEq + Clone, V> DeferredSet<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` between [`begin_pass`](Self::begin_pass) and
    /// [`end_pass`](Self::end_pass).
    pub fn is_iterating(&self) -> bool {
        self.iterating
    }

    /// Starts buffering mutations.
    pub fn begin_pass(&mut self) {
        self.iterating = true;
    }

    /// Stops buffering and merges pending changes into the live set.
    ///
    /// Returns the values whose removal was applied by the merge.
    pub fn end_pass(&mut self) -> Vec<V> {
        self.iterating = false;
        self.live.append(&mut self.pending_add);

        let mut released = Vec::with_capacity(self.pending_remove.len());
        for key in std::mem::take(&mut self.pending_remove) {
            if let Some(pos) = self.live_position(&key) {
                released.push(self.live.remove(pos).1);
            }
        }
        released
    }

    /// Registers `value` under `key`.
    ///
    /// During a pass, re-registering a key that is pending removal only
    /// cancels the removal; the live value is kept and `value` is dropped.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), RegistryError> {
        if !self.iterating {
            if self.live_position(&key).is_some() {
                return Err(RegistryError::AlreadyRegistered);
            }
            self.live.push((key, value));
            return Ok(());
        }

        if let Some(pos) = self.pending_remove.iter().position(|k| *k == key) {
            self.pending_remove.remove(pos);
            return Ok(());
        }
        if self.live_position(&key).is_some() || self.pending_position(&key).is_some() {
            return Err(RegistryError::AlreadyRegistered);
        }
        self.pending_add.push((key, value));
        Ok(())
    }

    /// Unregisters `key`.
    ///
    /// Returns `Some(value)` when the value was detached right away and
    /// `None` when the removal was deferred to the end of the pass.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>, RegistryError> {
        if !self.iterating {
            return match self.live_position(key) {
                Some(pos) => Ok(Some(self.live.remove(pos).1)),
                None => Err(RegistryError::NotRegistered),
            };
        }

        if let Some(pos) = self.pending_position(key) {
            return Ok(Some(self.pending_add.remove(pos).1));
        }
        if self.live_position(key).is_some() && !self.is_pending_removal(key) {
            self.pending_remove.push(key.clone());
            return Ok(None);
        }
        Err(RegistryError::NotRegistered)
    }

    /// Whether `key` is registered once pending changes are applied.
    pub fn contains(&self, key: &K) -> bool {
        (self.live_position(key).is_some() && !self.is_pending_removal(key))
            || self.pending_position(key).is_some()
    }

    /// Whether `key` is live but scheduled to leave at the end of the pass.
    pub fn is_pending_removal(&self, key: &K) -> bool {
        self.pending_remove.iter().any(|k| k == key)
    }

    /// Looks up a live or pending value, including one pending removal.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.live_position(key)
            .map(|pos| &self.live[pos].1)
            .or_else(|| self.pending_position(key).map(|pos| &self.pending_add[pos].1))
    }

    /// Iterates the live entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.live.iter().map(|(k, v)| (k, v))
    }

    /// Keys registered once pending changes are applied.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.live
            .iter()
            .map(|(k, _)| k)
            .filter(|k| !self.is_pending_removal(k))
            .chain(self.pending_add.iter().map(|(k, _)| k))
    }

    /// Number of entries once pending changes are applied.
    pub fn len(&self) -> usize {
        self.live.len() + self.pending_add.len() - self.pending_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_position(&self, key: &K) -> Option<usize> {
        self.live.iter().position(|(k, _)| k == key)
    }

    fn pending_position(&self, key: &K) -> Option<usize> {
        self.pending_add.iter().position(|(k, _)| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_mode_reports_duplicates() {
        let mut set = DeferredSet::new();
        assert_eq!(set.insert(1, "a"), Ok(()));
        assert_eq!(set.insert(1, "b"), Err(RegistryError::AlreadyRegistered));
        assert_eq!(set.remove(&1), Ok(Some("a")));
        assert_eq!(set.remove(&1), Err(RegistryError::NotRegistered));
        assert!(set.is_empty());
    }

    #[test]
    fn pass_defers_additions_and_removals() {
        let mut set = DeferredSet::new();
        set.insert(1, "a").unwrap();
        set.begin_pass();

        set.insert(2, "b").unwrap();
        assert_eq!(set.remove(&1), Ok(None));

        // Live view is untouched during the pass
        let live: Vec<_> = set.iter().map(|(k, _)| *k).collect();
        assert_eq!(live, vec![1]);
        assert!(set.is_pending_removal(&1));
        assert!(!set.contains(&1));
        assert!(set.contains(&2));

        let released = set.end_pass();
        assert_eq!(released, vec!["a"]);
        let live: Vec<_> = set.iter().map(|(k, _)| *k).collect();
        assert_eq!(live, vec![2]);
    }

    #[test]
    fn pending_removal_and_addition_cancel_each_other() {
        let mut set = DeferredSet::new();
        set.insert(1, "a").unwrap();
        set.begin_pass();

        // Removal then re-add keeps the original entry
        assert_eq!(set.remove(&1), Ok(None));
        assert_eq!(set.insert(1, "again"), Ok(()));
        assert!(!set.is_pending_removal(&1));

        // Add then remove never reaches the live set
        set.insert(2, "b").unwrap();
        assert_eq!(set.remove(&2), Ok(Some("b")));

        assert!(set.end_pass().is_empty());
        assert_eq!(set.get(&1), Some(&"a"));
        assert_eq!(set.get(&2), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn pass_reports_duplicate_pending_entries() {
        let mut set = DeferredSet::new();
        set.begin_pass();
        set.insert(3, "c").unwrap();
        assert_eq!(set.insert(3, "c"), Err(RegistryError::AlreadyRegistered));
        assert_eq!(set.remove(&4), Err(RegistryError::NotRegistered));
        set.end_pass();
        assert_eq!(set.len(), 1);
    }
}
