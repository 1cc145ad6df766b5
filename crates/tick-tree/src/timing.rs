//! Time-gated decorators.
//!
//! [`Cooldown`] and [`Limiter`] let their child run at most once per period.
//! While the gate is closed they do not touch the child and report a
//! synthesized result instead. The gate is reopened by a one-shot timer on
//! the tree's [`Scheduler`](crate::Scheduler).
//!
//! The gate is checked before anything else. A child left `Running` when the
//! gate closed is not polled until the gate reopens, and is resumed then.

use std::cell::Cell;
use std::rc::Rc;

use crate::Status;
use crate::behavior::{Behavior, Step};
use crate::error::{BuildError, Result, check_duration};
use crate::timer::{Repeat, TimerKey};
use crate::tree::NodeContext;

/// What a gate reports while it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GateResult {
    /// Always report this status. Must be `Success`, `Failure` or `Running`.
    Fixed(Status),
    /// Report whatever the child last settled with.
    PreviousChildState,
}

impl Default for GateResult {
    fn default() -> Self {
        GateResult::Fixed(Status::Success)
    }
}

impl GateResult {
    fn validate(self) -> Result<()> {
        match self {
            GateResult::Fixed(Status::Success | Status::Failure | Status::Running)
            | GateResult::PreviousChildState => Ok(()),
            GateResult::Fixed(status) => Err(BuildError::InvalidReturnState { status }),
        }
    }

    fn step(self, cx: &NodeContext<'_>) -> Step {
        let status = match self {
            GateResult::Fixed(status) => status,
            GateResult::PreviousChildState => cx.child_status(0),
        };
        match status {
            Status::Failure => Step::Fail,
            Status::Running => Step::Running,
            // A child that never settled reads as success
            _ => Step::Succeed,
        }
    }
}

/// Open/closed flag shared with the reopening timer.
#[derive(Debug)]
struct Gate {
    open: Rc<Cell<bool>>,
    key: TimerKey,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Rc::new(Cell::new(true)),
            key: TimerKey::next(),
        }
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Closes the gate and arms the timer that reopens it.
    fn close(&self, cx: &NodeContext<'_>, duration: f64, jitter: f64) {
        let Some(scheduler) = cx.scheduler() else {
            tracing::warn!(node = %cx.path(), "no scheduler to time the gate; leaving it open");
            return;
        };
        self.open.set(false);
        let open = Rc::clone(&self.open);
        scheduler.register_timer(self.key, duration, jitter, Repeat::ONCE, move || {
            open.set(true)
        });
    }

    /// Reopens the gate and drops any pending reopening timer.
    fn reopen(&self, cx: &NodeContext<'_>) {
        self.open.set(true);
        if let Some(scheduler) = cx.scheduler()
            && scheduler.has_timer(self.key)
        {
            let _ = scheduler.unregister_timer(self.key);
        }
    }
}

/// Parameters of a [`Cooldown`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CooldownConfig {
    /// Seconds the gate stays closed.
    pub duration: f64,
    /// Random variation added to each period, in seconds.
    pub jitter: f64,
    pub result: GateResult,
    /// Close the gate when the child settles instead of when it starts.
    pub start_after_child: bool,
    /// A child failure reopens the gate immediately.
    pub cancel_on_failure: bool,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            duration: 1.0,
            jitter: 0.0,
            result: GateResult::default(),
            start_after_child: false,
            cancel_on_failure: false,
        }
    }
}

impl CooldownConfig {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_result(mut self, result: GateResult) -> Self {
        self.result = result;
        self
    }

    pub fn start_after_child(mut self, enabled: bool) -> Self {
        self.start_after_child = enabled;
        self
    }

    pub fn cancel_on_failure(mut self, enabled: bool) -> Self {
        self.cancel_on_failure = enabled;
        self
    }

    /// Rejects unusable durations and the combination of a `Failure` result
    /// with `cancel_on_failure` disabled.
    pub fn validate(&self) -> Result<()> {
        check_duration("cooldown duration", self.duration)?;
        check_duration("cooldown jitter", self.jitter)?;
        self.result.validate()?;
        if self.result == GateResult::Fixed(Status::Failure) && !self.cancel_on_failure {
            return Err(BuildError::FailureWithoutCancel);
        }
        Ok(())
    }
}

/// Runs its child at most once per `duration` (± `jitter`) seconds.
///
/// # Semantics
///
/// - Gate open: the child runs. Unless `start_after_child` is set, the gate
///   closes as the child starts.
/// - Gate closed: the child is left alone and the configured [`GateResult`]
///   is reported.
/// - With `start_after_child`, the gate closes when the child settles.
/// - With `cancel_on_failure`, a child failure reopens the gate at once.
#[derive(Debug)]
pub struct Cooldown {
    config: CooldownConfig,
    gate: Gate,
}

impl Cooldown {
    pub fn new(config: CooldownConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            gate: Gate::new(),
        })
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    /// Whether the child may run on the next activation.
    pub fn is_ready(&self) -> bool {
        self.gate.is_open()
    }

    fn close(&self, cx: &NodeContext<'_>) {
        self.gate.close(cx, self.config.duration, self.config.jitter);
    }
}

impl Behavior for Cooldown {
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        if cx.child_count() == 0 {
            return cx.misconfigured("cooldown has no child");
        }
        if !self.gate.is_open() {
            return self.config.result.step(cx);
        }
        if !self.config.start_after_child {
            self.close(cx);
        }
        cx.enter_child(0)
    }

    fn child_success(&mut self, cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        if self.config.start_after_child {
            self.close(cx);
        }
        Step::Succeed
    }

    fn child_failure(&mut self, cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        if self.config.cancel_on_failure {
            self.gate.reopen(cx);
        } else if self.config.start_after_child {
            self.close(cx);
        }
        Step::Fail
    }
}

/// Parameters of a [`Limiter`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LimiterConfig {
    /// Seconds between runs of the child.
    pub duration: f64,
    pub result: GateResult,
    /// A child failure reopens the gate immediately.
    pub reset_on_failure: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            duration: 1.0,
            result: GateResult::default(),
            reset_on_failure: false,
        }
    }
}

impl LimiterConfig {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: GateResult) -> Self {
        self.result = result;
        self
    }

    pub fn reset_on_failure(mut self, enabled: bool) -> Self {
        self.reset_on_failure = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_duration("limiter duration", self.duration)?;
        self.result.validate()
    }
}

/// A fixed-period [`Cooldown`]: no jitter, the gate always closes when the
/// child starts.
#[derive(Debug)]
pub struct Limiter {
    config: LimiterConfig,
    gate: Gate,
}

impl Limiter {
    pub fn new(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            gate: Gate::new(),
        })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_open()
    }
}

impl Behavior for Limiter {
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        if cx.child_count() == 0 {
            return cx.misconfigured("limiter has no child");
        }
        if !self.gate.is_open() {
            return self.config.result.step(cx);
        }
        self.gate.close(cx, self.config.duration, 0.0);
        cx.enter_child(0)
    }

    fn child_failure(&mut self, cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        if self.config.reset_on_failure {
            self.gate.reopen(cx);
        }
        Step::Fail
    }
}
