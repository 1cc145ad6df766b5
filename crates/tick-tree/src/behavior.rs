//! Core behavior trait.
//!
//! This module defines the [`Behavior`] trait implemented by every node kind,
//! and [`Step`], the continuation a behavior hands back to the tree driver.
//!
//! Behaviors never call into other nodes directly. `execute` and the
//! `child_*` notifications return a [`Step`]: either "run this child next"
//! or "this node settles with this status". The driver in [`Tree`] applies
//! the step, and when a node settles it reports the result to the parent's
//! `child_*` hook within the same tick. A parent may therefore move on to a
//! sibling synchronously; only `Running` suspends the branch until the next
//! tick.
//!
//! [`Tree`]: crate::Tree

use crate::Status;
use crate::tree::NodeContext;

/// What the tree driver should do after a behavior hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Start the child at this slot, then execute it.
    Start(usize),
    /// Execute the child at this slot without restarting it.
    Resume(usize),
    /// Settle this node with `Success`, finish it and notify the parent.
    Succeed,
    /// Settle this node with `Failure`, finish it and notify the parent.
    Fail,
    /// Mark this node `Running` and notify the parent; no finish.
    Running,
}

impl Step {
    /// The step that settles a node with `status`.
    ///
    /// Anything other than `Success` or `Running` is treated as failure.
    pub fn settle(status: Status) -> Self {
        match status {
            Status::Success => Step::Succeed,
            Status::Running => Step::Running,
            _ => Step::Fail,
        }
    }

    /// The status a settling step assigns, if any.
    pub fn status(self) -> Option<Status> {
        match self {
            Step::Succeed => Some(Status::Success),
            Step::Fail => Some(Status::Failure),
            Step::Running => Some(Status::Running),
            Step::Start(_) | Step::Resume(_) => None,
        }
    }
}

/// Per-kind behavior of a tree node.
///
/// Every call to [`execute`](Behavior::execute) must lead, directly or
/// through the children it starts, to exactly one settling step for this
/// node. The default notifications pass the child's outcome through
/// unchanged, which is what most decorators want.
pub trait Behavior {
    /// Called once per fresh activation, before the first `execute`.
    fn start(&mut self, _cx: &mut NodeContext<'_>) {}

    /// One step of work for the current tick.
    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step;

    /// Called once the node has settled (or was cancelled), before the
    /// parent hears about it.
    fn finish(&mut self, _cx: &mut NodeContext<'_>) {}

    /// The child at `slot` succeeded.
    fn child_success(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::Succeed
    }

    /// The child at `slot` failed.
    fn child_failure(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::Fail
    }

    /// The child at `slot` needs another tick.
    fn child_running(&mut self, _cx: &mut NodeContext<'_>, _slot: usize) -> Step {
        Step::Running
    }
}
