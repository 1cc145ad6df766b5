//! Leaf tasks wrapping host callbacks.

use std::fmt::{self, Display};

use crate::Status;
use crate::behavior::{Behavior, Step};
use crate::tree::NodeContext;

/// A leaf node that runs a host callback on every execution.
///
/// The callback reports `Success`, `Failure` or `Running`. Any other status
/// is treated as `Failure`.
pub struct Task {
    run: Box<dyn FnMut() -> Status>,
}

impl Task {
    pub fn new(run: impl FnMut() -> Status + 'static) -> Self {
        Self { run: Box::new(run) }
    }

    /// A task that performs `act` and always succeeds.
    pub fn action(mut act: impl FnMut() + 'static) -> Self {
        Self::new(move || {
            act();
            Status::Success
        })
    }

    /// A task whose callback can fail with an error.
    ///
    /// `Err` becomes `Failure` of this leaf and is logged; it never reaches
    /// the scheduler.
    pub fn fallible<E: Display>(
        mut run: impl FnMut() -> std::result::Result<Status, E> + 'static,
    ) -> Self {
        Self::new(move || match run() {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(error = %err, "task callback failed");
                Status::Failure
            }
        })
    }
}

impl Behavior for Task {
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        match (self.run)() {
            Status::Success => Step::Succeed,
            Status::Running => Step::Running,
            Status::Failure => Step::Fail,
            other => {
                tracing::warn!(node = %cx.path(), status = ?other, "task returned an unsettled status");
                Step::Fail
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
