//! The tick loop: registered trees, pooled timers and deferred registration.
//!
//! The host calls [`Scheduler::tick`] once per frame. A pass advances the
//! elapsed time, ticks every registered tree, fires due timers and finally
//! merges registration changes that arrived during the pass. Tree callbacks,
//! timer callbacks and blackboard listeners may all register or unregister
//! trees and timers mid-pass; those changes only become visible to the next
//! pass.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rand::Rng;
use rand::rngs::StdRng;

use crate::config::SchedulerConfig;
use crate::error::{RegistryError, check_duration};
use crate::registry::DeferredSet;
use crate::timer::{Repeat, TimerCallback, TimerKey, TimerPool};
use crate::tree::{TreeHandle, TreeId};

struct SchedulerState {
    elapsed: f64,
    passes: u64,
    trees: DeferredSet<TreeId, TreeHandle>,
    timers: DeferredSet<TimerKey, usize>,
    pool: TimerPool,
    rng: StdRng,
}

/// Shared handle to a scheduler.
///
/// Clones refer to the same scheduler. Trees and blackboards keep a
/// [`WeakScheduler`] so that dropping the last host handle tears everything
/// down.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerState>>,
}

/// Non-owning reference to a [`Scheduler`].
#[derive(Clone, Default)]
pub struct WeakScheduler {
    inner: Weak<RefCell<SchedulerState>>,
}

impl WeakScheduler {
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.inner.upgrade().map(|inner| Scheduler { inner })
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let state = SchedulerState {
            elapsed: 0.0,
            passes: 0,
            trees: DeferredSet::new(),
            timers: DeferredSet::new(),
            pool: TimerPool::default(),
            rng: config.rng(),
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Seconds accumulated over every [`tick`](Self::tick).
    pub fn elapsed(&self) -> f64 {
        self.inner.borrow().elapsed
    }

    /// Number of completed or in-progress passes.
    pub fn passes(&self) -> u64 {
        self.inner.borrow().passes
    }

    /// Whether a pass is in progress.
    pub fn is_ticking(&self) -> bool {
        self.inner.borrow().trees.is_iterating()
    }

    /// Runs one pass. Call exactly once per host frame.
    ///
    /// Negative deltas are ignored so elapsed time never goes backwards.
    pub fn tick(&self, delta: f64) {
        if self.is_ticking() {
            tracing::error!("Scheduler::tick called from inside a pass; ignoring");
            return;
        }

        let trees: Vec<(TreeId, TreeHandle)> = {
            let mut state = self.inner.borrow_mut();
            if delta.is_finite() && delta > 0.0 {
                state.elapsed += delta;
            }
            state.passes += 1;
            state.trees.begin_pass();
            state.timers.begin_pass();
            state
                .trees
                .iter()
                .map(|(id, tree)| (*id, tree.clone()))
                .collect()
        };

        for (id, tree) in trees {
            if self.inner.borrow().trees.is_pending_removal(&id) {
                tracing::trace!(tree = ?id, "skipping tree pending removal");
                continue;
            }
            match tree.try_borrow_mut() {
                Ok(mut tree) => {
                    tree.tick();
                }
                Err(_) => tracing::warn!(tree = ?id, "tree is borrowed elsewhere; skipped this pass"),
            }
        }

        self.fire_timers();

        let mut guard = self.inner.borrow_mut();
        let state = &mut *guard;
        state.trees.end_pass();
        for slot in state.timers.end_pass() {
            state.pool.release(slot);
        }
    }

    fn fire_timers(&self) {
        let due: Vec<(TimerKey, TimerCallback, bool)> = {
            let mut guard = self.inner.borrow_mut();
            let state = &mut *guard;
            let now = state.elapsed;

            let mut due = Vec::new();
            for (key, &slot) in state.timers.iter() {
                if state.timers.is_pending_removal(key) {
                    continue;
                }
                let timer = state.pool.get_mut(slot);
                if !timer.is_due(now) {
                    continue;
                }
                let (callback, exhausted) = timer.fire(&mut state.rng);
                if let Some(callback) = callback {
                    due.push((*key, callback, exhausted));
                }
            }

            for (key, _, exhausted) in &due {
                if *exhausted {
                    let _ = state.timers.remove(key);
                }
            }
            due
        };

        for (key, callback, exhausted) in due {
            // An earlier callback in this pass may have unregistered it
            if !exhausted && self.inner.borrow().timers.is_pending_removal(&key) {
                continue;
            }
            callback();
        }
    }

    /// Starts ticking `tree` on every pass.
    ///
    /// Registering an already registered tree changes nothing and is reported.
    pub fn register_tree(&self, tree: &TreeHandle) -> Result<(), RegistryError> {
        let result = self.inner.borrow_mut().trees.insert(tree.id(), tree.clone());
        if let Err(err) = result {
            tracing::warn!(tree = ?tree.id(), %err, "register_tree ignored");
        }
        result
    }

    /// Stops ticking the tree with `id`.
    ///
    /// Inside a pass the tree keeps its slot until the pass ends; a tree
    /// unregistered by an earlier tree in the same pass is skipped.
    pub fn unregister_tree(&self, id: TreeId) -> Result<(), RegistryError> {
        let result = self.inner.borrow_mut().trees.remove(&id).map(|_| ());
        if let Err(err) = result {
            tracing::warn!(tree = ?id, %err, "unregister_tree ignored");
        }
        result
    }

    pub fn has_tree(&self, id: TreeId) -> bool {
        self.inner.borrow().trees.contains(&id)
    }

    pub fn tree_count(&self) -> usize {
        self.inner.borrow().trees.len()
    }

    /// Registers `callback` to fire every `interval` (± `jitter`) seconds.
    ///
    /// If `key` is already registered the existing timer is re-armed in place
    /// with the new parameters; no second timer is created.
    ///
    /// Negative or non-finite `interval`/`jitter` values and `Repeat::Times(0)`
    /// are logged and the registration is dropped.
    pub fn register_timer(
        &self,
        key: TimerKey,
        interval: f64,
        jitter: f64,
        repeat: Repeat,
        callback: impl Fn() + 'static,
    ) {
        if let Err(err) = check_duration("timer interval", interval)
            .and_then(|()| check_duration("timer jitter", jitter))
        {
            tracing::error!(timer = key.get(), %err, "timer not registered");
            return;
        }
        if repeat.is_exhausted() {
            tracing::error!(timer = key.get(), "timer with zero repeats not registered");
            return;
        }
        let callback: TimerCallback = Rc::new(callback);
        let mut guard = self.inner.borrow_mut();
        let state = &mut *guard;
        let now = state.elapsed;

        if let Some(&slot) = state.timers.get(&key) {
            state
                .pool
                .get_mut(slot)
                .arm(interval, jitter, repeat, callback, now, &mut state.rng);
            if state.timers.is_pending_removal(&key) {
                let _ = state.timers.insert(key, slot);
            }
            tracing::trace!(timer = key.get(), interval, "timer re-armed in place");
            return;
        }

        let slot = state.pool.acquire();
        state
            .pool
            .get_mut(slot)
            .arm(interval, jitter, repeat, callback, now, &mut state.rng);
        if state.timers.insert(key, slot).is_err() {
            state.pool.release(slot);
        }
        tracing::trace!(timer = key.get(), interval, slot, "timer registered");
    }

    /// Removes the timer registered under `key`.
    pub fn unregister_timer(&self, key: TimerKey) -> Result<(), RegistryError> {
        let mut guard = self.inner.borrow_mut();
        let state = &mut *guard;
        match state.timers.remove(&key) {
            Ok(Some(slot)) => {
                state.pool.release(slot);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                tracing::debug!(timer = key.get(), %err, "unregister_timer ignored");
                Err(err)
            }
        }
    }

    pub fn has_timer(&self, key: TimerKey) -> bool {
        self.inner.borrow().timers.contains(&key)
    }

    pub fn timer_count(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Number of timer slots the pool has ever allocated.
    pub fn pooled_timers(&self) -> usize {
        self.inner.borrow().pool.capacity()
    }

    /// Number of pooled timer slots waiting for reuse.
    pub fn idle_timers(&self) -> usize {
        self.inner.borrow().pool.idle()
    }

    /// Draws a seed for a tree-local RNG from the scheduler's RNG.
    pub(crate) fn derive_seed(&self) -> u64 {
        self.inner.borrow_mut().rng.r#gen()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("elapsed", &state.elapsed)
            .field("passes", &state.passes)
            .field("trees", &state.trees.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let hits = Rc::new(Cell::new(0));
        let inner = Rc::clone(&hits);
        (hits, move || inner.set(inner.get() + 1))
    }

    #[test]
    fn elapsed_time_accumulates() {
        let scheduler = Scheduler::new();
        scheduler.tick(0.5);
        scheduler.tick(0.25);
        scheduler.tick(-1.0);
        assert_eq!(scheduler.elapsed(), 0.75);
        assert_eq!(scheduler.passes(), 3);
    }

    #[test]
    fn repeating_timer_fires_on_interval_thresholds() {
        let scheduler = Scheduler::new();
        let (hits, callback) = counter();
        scheduler.register_timer(TimerKey::next(), 1.0, 0.0, Repeat::Times(3), callback);

        let mut fired_at = Vec::new();
        for frame in 1..=16 {
            let before = hits.get();
            scheduler.tick(0.25);
            if hits.get() > before {
                fired_at.push(frame);
            }
        }

        assert_eq!(fired_at, vec![4, 8, 12]);
        assert_eq!(scheduler.timer_count(), 0);
        assert_eq!(scheduler.idle_timers(), 1);
    }

    #[test]
    fn infinite_timer_keeps_firing() {
        let scheduler = Scheduler::new();
        let (hits, callback) = counter();
        scheduler.register_timer(TimerKey::next(), 0.5, 0.0, Repeat::Forever, callback);
        for _ in 0..10 {
            scheduler.tick(0.5);
        }
        assert_eq!(hits.get(), 10);
        assert_eq!(scheduler.timer_count(), 1);
    }

    #[test]
    fn unusable_timer_parameters_are_refused() {
        let scheduler = Scheduler::with_config(SchedulerConfig::with_seed(2));
        let (hits, callback) = counter();
        let callback = Rc::new(callback);
        let fire = || {
            let callback = Rc::clone(&callback);
            move || callback()
        };

        scheduler.register_timer(TimerKey::next(), 1.0, f64::INFINITY, Repeat::ONCE, fire());
        scheduler.register_timer(TimerKey::next(), f64::NAN, 0.0, Repeat::ONCE, fire());
        scheduler.register_timer(TimerKey::next(), -1.0, 0.0, Repeat::ONCE, fire());
        scheduler.register_timer(TimerKey::next(), 1.0, 0.0, Repeat::from(0), fire());
        assert_eq!(scheduler.timer_count(), 0);

        // Finite but enormous jitter is accepted and ticks without panicking
        scheduler.register_timer(TimerKey::next(), 1.0, f64::MAX, Repeat::ONCE, fire());
        assert_eq!(scheduler.timer_count(), 1);
        for _ in 0..3 {
            scheduler.tick(1.0);
        }
        assert!(hits.get() <= 1);
    }

    #[test]
    fn registering_same_key_updates_in_place() {
        let scheduler = Scheduler::new();
        let key = TimerKey::next();
        let (first, callback) = counter();
        scheduler.register_timer(key, 10.0, 0.0, Repeat::ONCE, callback);
        let (second, callback) = counter();
        scheduler.register_timer(key, 1.0, 0.0, Repeat::ONCE, callback);

        assert_eq!(scheduler.timer_count(), 1);
        assert_eq!(scheduler.pooled_timers(), 1);

        scheduler.tick(1.0);
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn pool_bounds_allocation_under_rearming() {
        let scheduler = Scheduler::new();
        for _ in 0..50 {
            let (_, callback) = counter();
            scheduler.register_timer(TimerKey::next(), 0.0, 0.0, Repeat::ONCE, callback);
            scheduler.tick(0.1);
        }
        assert_eq!(scheduler.pooled_timers(), 1);
        assert_eq!(scheduler.timer_count(), 0);
    }

    #[test]
    fn timer_registered_from_callback_waits_for_next_pass() {
        let scheduler = Scheduler::new();
        let (hits, callback) = counter();
        let callback = Rc::new(callback);

        let handle = scheduler.clone();
        let late = Rc::clone(&callback);
        scheduler.register_timer(TimerKey::next(), 0.0, 0.0, Repeat::ONCE, move || {
            let late = Rc::clone(&late);
            handle.register_timer(TimerKey::next(), 0.0, 0.0, Repeat::ONCE, move || late());
        });

        scheduler.tick(0.1);
        assert_eq!(hits.get(), 0);
        assert_eq!(scheduler.timer_count(), 1);

        scheduler.tick(0.1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unregister_unknown_timer_is_reported() {
        let scheduler = Scheduler::new();
        assert_eq!(
            scheduler.unregister_timer(TimerKey::next()),
            Err(RegistryError::NotRegistered)
        );
    }
}
