//! Pooled, repeatable timers.
//!
//! A timer is identified by the [`TimerKey`] its owner allocated, not by its
//! callback. Timer storage lives in a [`TimerPool`]: slots are reset and
//! reused when a timer is released, so frequent re-arming (a cooldown closing
//! its gate every activation) does not allocate.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

static NEXT_TIMER_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey(u64);

impl TimerKey {
    /// Allocates a key that no other timer owner holds.
    pub fn next() -> Self {
        Self(NEXT_TIMER_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// How many more times a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Repeat {
    Forever,
    Times(u32),
}

impl Repeat {
    pub const ONCE: Repeat = Repeat::Times(1);

    /// `Times(0)` would never fire.
    pub fn is_exhausted(self) -> bool {
        self == Repeat::Times(0)
    }

    /// Consumes one firing. Returns `true` when nothing is left.
    fn consume(&mut self) -> bool {
        match self {
            Repeat::Forever => false,
            Repeat::Times(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        }
    }
}

impl From<i32> for Repeat {
    /// Negative counts repeat forever.
    fn from(count: i32) -> Self {
        u32::try_from(count).map_or(Repeat::Forever, Repeat::Times)
    }
}

/// Callback invoked when a timer fires.
pub type TimerCallback = Rc<dyn Fn()>;

pub(crate) struct Timer {
    interval: f64,
    jitter: f64,
    repeat: Repeat,
    next_fire: f64,
    callback: Option<TimerCallback>,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            interval: 0.0,
            jitter: 0.0,
            repeat: Repeat::ONCE,
            next_fire: f64::INFINITY,
            callback: None,
        }
    }
}

impl Timer {
    /// (Re)configures the timer and sets its first threshold from `now`.
    pub(crate) fn arm<R: Rng>(
        &mut self,
        interval: f64,
        jitter: f64,
        repeat: Repeat,
        callback: TimerCallback,
        now: f64,
        rng: &mut R,
    ) {
        self.interval = interval.max(0.0);
        self.jitter = jitter.max(0.0);
        self.repeat = repeat;
        self.callback = Some(callback);
        self.next_fire = now + self.period(rng);
    }

    pub(crate) fn is_due(&self, now: f64) -> bool {
        self.callback.is_some() && now >= self.next_fire
    }

    /// Advances the threshold by one period and consumes a repeat.
    ///
    /// Returns the callback to invoke and whether the timer is exhausted.
    pub(crate) fn fire<R: Rng>(&mut self, rng: &mut R) -> (Option<TimerCallback>, bool) {
        self.next_fire += self.period(rng);
        let exhausted = self.repeat.consume();
        (self.callback.clone(), exhausted)
    }

    // Scaling a unit sample keeps huge jitters from overflowing the range width
    fn period<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.jitter > 0.0 {
            let offset = self.jitter * rng.gen_range(-1.0..=1.0);
            (self.interval + offset).max(0.0)
        } else {
            self.interval
        }
    }
}

/// Slot arena of timers with a free list.
#[derive(Default)]
pub(crate) struct TimerPool {
    slots: Vec<Timer>,
    free: Vec<usize>,
}

impl TimerPool {
    /// Hands out an idle slot, growing the pool only when none is free.
    pub(crate) fn acquire(&mut self) -> usize {
        self.free.pop().unwrap_or_else(|| {
            self.slots.push(Timer::default());
            self.slots.len() - 1
        })
    }

    /// Resets a slot and makes it available again.
    pub(crate) fn release(&mut self, slot: usize) {
        self.slots[slot] = Timer::default();
        self.free.push(slot);
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut Timer {
        &mut self.slots[slot]
    }

    /// Total number of timer slots ever allocated.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn idle(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn repeat_from_sentinel() {
        assert_eq!(Repeat::from(-1), Repeat::Forever);
        assert_eq!(Repeat::from(3), Repeat::Times(3));
    }

    #[test]
    fn threshold_advances_by_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut timer = Timer::default();
        timer.arm(2.0, 0.0, Repeat::Times(2), Rc::new(|| {}), 1.0, &mut rng);

        assert!(!timer.is_due(2.9));
        assert!(timer.is_due(3.5));

        let (callback, exhausted) = timer.fire(&mut rng);
        assert!(callback.is_some());
        assert!(!exhausted);
        // Next threshold is 5.0, independent of when the check happened
        assert!(!timer.is_due(4.9));
        assert!(timer.is_due(5.0));

        let (_, exhausted) = timer.fire(&mut rng);
        assert!(exhausted);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut timer = Timer::default();
        for _ in 0..100 {
            timer.arm(1.0, 0.25, Repeat::ONCE, Rc::new(|| {}), 0.0, &mut rng);
            assert!(timer.next_fire >= 0.75 && timer.next_fire <= 1.25);
        }
    }

    #[test]
    fn huge_jitter_does_not_overflow_sampling() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut timer = Timer::default();
        timer.arm(1.0, f64::MAX, Repeat::ONCE, Rc::new(|| {}), 0.0, &mut rng);
        assert!(timer.next_fire >= 0.0);
        let _ = timer.fire(&mut rng);
    }

    #[test]
    fn pool_reuses_released_slots() {
        let hits = Rc::new(Cell::new(0));
        let mut rng = StdRng::seed_from_u64(3);
        let mut pool = TimerPool::default();

        let first = pool.acquire();
        let counter = Rc::clone(&hits);
        pool.get_mut(first).arm(
            0.0,
            0.0,
            Repeat::ONCE,
            Rc::new(move || counter.set(counter.get() + 1)),
            0.0,
            &mut rng,
        );
        pool.release(first);
        assert!(!pool.get_mut(first).is_due(10.0));

        let second = pool.acquire();
        assert_eq!(first, second);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.idle(), 0);
        assert_eq!(hits.get(), 0);
    }
}
