//! Decorator behavior nodes.
//!
//! Decorators wrap exactly one child. [`Inverter`], [`Succeeder`] and
//! [`Failer`] transform the child's outcome; [`Service`] runs a periodic side
//! effect while its branch is active. The time gates live in
//! [`timing`](crate::timing).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Status;
use crate::behavior::{Behavior, Step};
use crate::error::{Result, check_duration};
use crate::timer::{Repeat, TimerKey};
use crate::tree::NodeContext;

/// Starts or resumes the only child, failing a decorator that has none.
fn enter_only_child(cx: &mut NodeContext<'_>, kind: &str) -> Step {
    if cx.child_count() == 0 {
        return cx.misconfigured(&format!("{kind} has no child"));
    }
    cx.enter_child(0)
}

/// Inverts the result of its child.
///
/// # Semantics
///
/// - If the child returns `Success`, the inverter returns `Failure`
/// - If the child returns `Failure`, the inverter returns `Success`
/// - `Running` passes through unchanged
///
/// This is analogous to a logical NOT (!) operation.
#[derive(Debug, Default)]
pub struct Inverter;

impl Inverter {
    pub fn new() -> Self {
        Self
    }
}

impl Behavior for Inverter {
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        enter_only_child(cx, "inverter")
    }

    fn child_success(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::settle(Status::Success.invert())
    }

    fn child_failure(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::settle(Status::Failure.invert())
    }
}

/// Returns `Success` whatever its child settles with.
///
/// With `success_on_running`, a running child is cancelled and the
/// succeeder succeeds right away instead of waiting.
#[derive(Debug, Default)]
pub struct Succeeder {
    success_on_running: bool,
}

impl Succeeder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_on_running(mut self, enabled: bool) -> Self {
        self.success_on_running = enabled;
        self
    }
}

impl Behavior for Succeeder {
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        enter_only_child(cx, "succeeder")
    }

    fn child_failure(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::Succeed
    }

    fn child_running(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        if !self.success_on_running {
            return Step::Running;
        }
        cx.cancel_child(slot);
        Step::Succeed
    }
}

/// Returns `Failure` whatever its child settles with.
///
/// With `fail_on_running`, a running child is cancelled and the failer fails
/// right away.
#[derive(Debug, Default)]
pub struct Failer {
    fail_on_running: bool,
}

impl Failer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_running(mut self, enabled: bool) -> Self {
        self.fail_on_running = enabled;
        self
    }
}

impl Behavior for Failer {
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        enter_only_child(cx, "failer")
    }

    fn child_success(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::Fail
    }

    fn child_running(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        if !self.fail_on_running {
            return Step::Running;
        }
        cx.cancel_child(slot);
        Step::Fail
    }
}

/// Parameters of a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ServiceConfig {
    /// Seconds between runs of the service callback.
    pub interval: f64,
    /// Random variation added to each interval, in seconds.
    pub jitter: f64,
    /// Run the callback on every fresh start, not only the first one.
    pub execute_on_each_start: bool,
    /// Keep the timer registered after the branch finishes.
    pub execute_continuously: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            interval: 0.0,
            jitter: 0.0,
            execute_on_each_start: true,
            execute_continuously: false,
        }
    }
}

impl ServiceConfig {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn execute_on_each_start(mut self, enabled: bool) -> Self {
        self.execute_on_each_start = enabled;
        self
    }

    pub fn execute_continuously(mut self, enabled: bool) -> Self {
        self.execute_continuously = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_duration("service interval", self.interval)?;
        check_duration("service jitter", self.jitter)
    }
}

type ServiceFn = Rc<RefCell<dyn FnMut()>>;

/// Runs a callback every `interval` seconds while its branch is active.
///
/// # Semantics
///
/// - On start, a repeating scheduler timer is registered unless one is
///   already running for this service.
/// - The callback also runs directly on start: on every start, or only the
///   first one when `execute_on_each_start` is off.
/// - On finish, the timer is unregistered unless `execute_continuously` is set.
/// - The child's outcome passes through unchanged.
pub struct Service {
    config: ServiceConfig,
    callback: ServiceFn,
    key: TimerKey,
    started_once: bool,
}

impl Service {
    pub fn new(config: ServiceConfig, callback: impl FnMut() + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            callback: Rc::new(RefCell::new(callback)),
            key: TimerKey::next(),
            started_once: false,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Key of the timer this service registers.
    pub fn timer_key(&self) -> TimerKey {
        self.key
    }

    fn invoke(callback: &ServiceFn) {
        match callback.try_borrow_mut() {
            Ok(mut run) => (&mut *run)(),
            Err(_) => tracing::warn!("service callback re-entered; skipped"),
        }
    }
}

impl Behavior for Service {
    fn start(&mut self, cx: &mut NodeContext<'_>) {
        match cx.scheduler() {
            Some(scheduler) if !scheduler.has_timer(self.key) => {
                let callback = Rc::clone(&self.callback);
                scheduler.register_timer(
                    self.key,
                    self.config.interval,
                    self.config.jitter,
                    Repeat::Forever,
                    move || Service::invoke(&callback),
                );
            }
            Some(_) => {}
            None => tracing::warn!(node = %cx.path(), "service has no scheduler; timer not registered"),
        }

        if self.config.execute_on_each_start || !self.started_once {
            self.started_once = true;
            Service::invoke(&self.callback);
        }
    }

    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        enter_only_child(cx, "service")
    }

    fn finish(&mut self, cx: &mut NodeContext<'_>) {
        if self.config.execute_continuously {
            return;
        }
        if let Some(scheduler) = cx.scheduler()
            && scheduler.has_timer(self.key)
        {
            let _ = scheduler.unregister_timer(self.key);
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .field("key", &self.key)
            .field("started_once", &self.started_once)
            .finish()
    }
}
