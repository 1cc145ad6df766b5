//! Composite behavior nodes.
//!
//! Composite nodes control the execution flow of multiple children:
//! [`Sequence`] (AND logic), [`Selector`] (OR logic), their shuffled
//! variants, and [`Parallel`], which evaluates every child within one tick and
//! combines their outcomes according to a [`Policy`].

use crate::Status;
use crate::behavior::{Behavior, Step};
use crate::tree::NodeContext;

/// Executes children in order until one fails.
///
/// # Semantics
///
/// - If a child returns `Failure`, the sequence **stops immediately** and fails
/// - If a child returns `Success`, the next child runs within the same tick
/// - If a child returns `Running`, the sequence is `Running` and resumes that
///   child directly on the next tick
/// - If all children succeed, the sequence succeeds
///
/// A random sequence shuffles its children on every fresh start; resuming a
/// running branch keeps the order.
#[derive(Debug, Default)]
pub struct Sequence {
    cursor: usize,
    shuffle: bool,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence whose child order is reshuffled on every fresh start.
    pub fn random() -> Self {
        Self {
            cursor: 0,
            shuffle: true,
        }
    }

    pub fn is_random(&self) -> bool {
        self.shuffle
    }
}

impl Behavior for Sequence {
    fn start(&mut self, cx: &mut NodeContext<'_>) {
        self.cursor = 0;
        if self.shuffle {
            cx.shuffle_children();
        }
    }

    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        if cx.child_count() == 0 {
            return cx.misconfigured("sequence has no children");
        }
        cx.enter_child(self.cursor)
    }

    fn finish(&mut self, _cx: &mut NodeContext<'_>) {
        self.cursor = 0;
    }

    fn child_success(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        self.cursor = slot + 1;
        if self.cursor < cx.child_count() {
            cx.enter_child(self.cursor)
        } else {
            Step::Succeed
        }
    }
}

/// Executes children in order until one succeeds.
///
/// # Semantics
///
/// - If a child returns `Success`, the selector **stops immediately** and succeeds
/// - If a child returns `Failure`, the next child runs within the same tick
/// - If a child returns `Running`, the selector is `Running` and resumes that
///   child directly on the next tick
/// - If all children fail, the selector fails
#[derive(Debug, Default)]
pub struct Selector {
    cursor: usize,
    shuffle: bool,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selector whose child order is reshuffled on every fresh start.
    pub fn random() -> Self {
        Self {
            cursor: 0,
            shuffle: true,
        }
    }

    pub fn is_random(&self) -> bool {
        self.shuffle
    }
}

impl Behavior for Selector {
    fn start(&mut self, cx: &mut NodeContext<'_>) {
        self.cursor = 0;
        if self.shuffle {
            cx.shuffle_children();
        }
    }

    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        if cx.child_count() == 0 {
            return cx.misconfigured("selector has no children");
        }
        cx.enter_child(self.cursor)
    }

    fn finish(&mut self, _cx: &mut NodeContext<'_>) {
        self.cursor = 0;
    }

    fn child_failure(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        self.cursor = slot + 1;
        if self.cursor < cx.child_count() {
            cx.enter_child(self.cursor)
        } else {
            Step::Fail
        }
    }
}

/// How a [`Parallel`] combines its children's outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Policy {
    /// Succeeds when every child succeeds; the first failure cancels the
    /// running children and fails immediately.
    #[default]
    Sequence,
    /// Succeeds on the first success, cancelling the running children; fails
    /// when every child fails.
    Selector,
    /// Like `Sequence`, but waits for every child to stop running. A failure
    /// seen during the activation decides the result.
    SequenceContinue,
    /// Like `Selector`, but waits for every child to stop running. A success
    /// seen during the activation decides the result.
    SelectorContinue,
}

/// Which children a [`Parallel`] examines on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Executor {
    /// Every child is started or resumed on every tick.
    #[default]
    Entire,
    /// Children that already settled during this activation are skipped.
    Remaining,
}

/// Evaluates all of its children within one tick.
///
/// This is a policy, not concurrency: children run one after another on the
/// calling thread. The combined result is decided by the [`Policy`] once the
/// scan over the children selected by the [`Executor`] completes.
#[derive(Debug, Default)]
pub struct Parallel {
    policy: Policy,
    executor: Executor,
    cursor: usize,
    // First deciding outcome seen by a CONTINUE policy this activation
    committed: Option<Status>,
}

impl Parallel {
    pub fn new(policy: Policy, executor: Executor) -> Self {
        Self {
            policy,
            executor,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn executor(&self) -> Executor {
        self.executor
    }

    /// Enters the next child this pass still has to visit, or resolves.
    fn advance(&mut self, cx: &mut NodeContext<'_>) -> Step {
        while self.cursor < cx.child_count() {
            if self.executor == Executor::Remaining && cx.child_status(self.cursor).is_terminal() {
                self.cursor += 1;
                continue;
            }
            return cx.enter_child(self.cursor);
        }
        self.resolve(cx)
    }

    fn resolve(&mut self, cx: &mut NodeContext<'_>) -> Step {
        let step = self.outcome(cx);
        if step != Step::Running {
            self.conclude(cx);
        }
        step
    }

    fn outcome(&self, cx: &NodeContext<'_>) -> Step {
        let count = cx.child_count();
        let statuses = (0..count).map(|slot| cx.child_status(slot));
        let (mut running, mut succeeded, mut failed) = (0, 0, 0);
        for status in statuses {
            match status {
                Status::Running => running += 1,
                Status::Success => succeeded += 1,
                Status::Failure => failed += 1,
                _ => {}
            }
        }

        if running > 0 {
            return Step::Running;
        }
        match self.policy {
            Policy::Sequence if succeeded == count => Step::Succeed,
            Policy::Sequence => Step::Fail,
            Policy::Selector if succeeded > 0 => Step::Succeed,
            Policy::Selector => Step::Fail,
            Policy::SequenceContinue => {
                if self.committed == Some(Status::Failure) || failed > 0 {
                    Step::Fail
                } else {
                    Step::Succeed
                }
            }
            Policy::SelectorContinue => {
                if self.committed == Some(Status::Success) || succeeded > 0 {
                    Step::Succeed
                } else {
                    Step::Fail
                }
            }
        }
    }

    /// Cancels the children that are still running and settles with `outcome`.
    ///
    /// Children before `slot` only need cancelling if some child is running;
    /// children after it were not started this pass.
    fn exit_early(&mut self, cx: &mut NodeContext<'_>, slot: usize, outcome: Status) -> Step {
        let any_running = (0..cx.child_count()).any(|s| cx.child_status(s).is_running());
        let from = if any_running { 0 } else { slot + 1 };
        cx.cancel_running_children(from);
        tracing::trace!(node = %cx.path(), ?outcome, "parallel exited early");
        self.conclude(cx);
        Step::settle(outcome)
    }

    /// Forgets the activation. `Remaining` also returns the children to
    /// `Fresh` so the next activation runs all of them again.
    fn conclude(&mut self, cx: &mut NodeContext<'_>) {
        self.clear();
        if self.executor == Executor::Remaining {
            cx.reset_children();
        }
    }

    fn clear(&mut self) {
        self.cursor = 0;
        self.committed = None;
    }
}

impl Behavior for Parallel {
    fn start(&mut self, cx: &mut NodeContext<'_>) {
        self.conclude(cx);
    }

    fn execute(&mut self, cx: &mut NodeContext<'_>) -> Step {
        if cx.child_count() == 0 {
            return cx.misconfigured("parallel has no children");
        }
        self.cursor = 0;
        self.advance(cx)
    }

    // Cancellation also lands here; the cancelled children keep their status
    fn finish(&mut self, _cx: &mut NodeContext<'_>) {
        self.clear();
    }

    fn child_success(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        match self.policy {
            Policy::Selector => return self.exit_early(cx, slot, Status::Success),
            Policy::SelectorContinue => {
                self.committed.get_or_insert(Status::Success);
            }
            Policy::Sequence | Policy::SequenceContinue => {}
        }
        self.cursor = slot + 1;
        self.advance(cx)
    }

    fn child_failure(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        match self.policy {
            Policy::Sequence => return self.exit_early(cx, slot, Status::Failure),
            Policy::SequenceContinue => {
                self.committed.get_or_insert(Status::Failure);
            }
            Policy::Selector | Policy::SelectorContinue => {}
        }
        self.cursor = slot + 1;
        self.advance(cx)
    }

    fn child_running(&mut self, cx: &mut NodeContext<'_>, slot: usize) -> Step {
        self.cursor = slot + 1;
        self.advance(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::builder::{parallel, selector, sequence, task};
    use crate::{Node, Scheduler, Tree};

    fn counted(hits: &Rc<Cell<u32>>, status: Status) -> impl FnMut() -> Status + 'static {
        let hits = Rc::clone(hits);
        move || {
            hits.set(hits.get() + 1);
            status
        }
    }

    fn run(root: Node) -> (Tree, Status) {
        let scheduler = Scheduler::new();
        let mut tree = Tree::new("Test", &scheduler).with_root(root).unwrap();
        let status = tree.tick();
        (tree, status)
    }

    #[test]
    fn sequence_all_success() {
        let (_, status) = run(sequence(
            "Seq",
            [
                task("a", || Status::Success),
                task("b", || Status::Success),
            ],
        ));
        assert_eq!(status, Status::Success);
    }

    #[test]
    fn sequence_short_circuits_on_failure() {
        let hits = Rc::new(Cell::new(0));
        let (_, status) = run(sequence(
            "Seq",
            [
                task("a", || Status::Failure),
                task("b", counted(&hits, Status::Success)),
            ],
        ));
        assert_eq!(status, Status::Failure);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn selector_first_success() {
        let hits = Rc::new(Cell::new(0));
        let (_, status) = run(selector(
            "Sel",
            [
                task("a", || Status::Success),
                task("b", counted(&hits, Status::Success)),
            ],
        ));
        assert_eq!(status, Status::Success);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn selector_all_failure() {
        let (_, status) = run(selector(
            "Sel",
            [
                task("a", || Status::Failure),
                task("b", || Status::Failure),
            ],
        ));
        assert_eq!(status, Status::Failure);
    }

    #[test]
    fn sequence_restarts_after_settling() {
        let hits = Rc::new(Cell::new(0));
        let (mut tree, _) = run(sequence(
            "Seq",
            [task("a", counted(&hits, Status::Success))],
        ));
        assert_eq!(tree.tick(), Status::Success);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn parallel_selector_succeeds_on_first_success() {
        let (tree, status) = run(parallel(
            "Par",
            Policy::Selector,
            Executor::Entire,
            [
                task("wait", || Status::Running),
                task("ok", || Status::Success),
            ],
        ));
        assert_eq!(status, Status::Success);
        let wait = tree.find("wait").unwrap();
        assert_eq!(tree.status_of(wait), Status::Cancelled);
    }

    #[test]
    fn parallel_selector_fails_when_all_fail() {
        let (_, status) = run(parallel(
            "Par",
            Policy::Selector,
            Executor::Entire,
            [
                task("a", || Status::Failure),
                task("b", || Status::Failure),
            ],
        ));
        assert_eq!(status, Status::Failure);
    }

    #[test]
    fn parallel_remaining_skips_settled_children() {
        let first = Rc::new(Cell::new(0));
        let polls = Rc::new(Cell::new(0));
        let flag = Rc::clone(&polls);
        let (mut tree, status) = run(parallel(
            "Par",
            Policy::Sequence,
            Executor::Remaining,
            [
                task("once", counted(&first, Status::Success)),
                task("slow", move || {
                    flag.set(flag.get() + 1);
                    if flag.get() < 3 {
                        Status::Running
                    } else {
                        Status::Success
                    }
                }),
            ],
        ));
        assert_eq!(status, Status::Running);
        assert_eq!(tree.tick(), Status::Running);
        assert_eq!(tree.tick(), Status::Success);
        assert_eq!(first.get(), 1);
        assert_eq!(polls.get(), 3);

        // Resolution reset the children for the next activation
        let once = tree.find("once").unwrap();
        assert_eq!(tree.status_of(once), Status::Fresh);
    }

    #[test]
    fn parallel_entire_reruns_settled_children() {
        let first = Rc::new(Cell::new(0));
        let polls = Rc::new(Cell::new(0));
        let flag = Rc::clone(&polls);
        let (mut tree, _) = run(parallel(
            "Par",
            Policy::Sequence,
            Executor::Entire,
            [
                task("each", counted(&first, Status::Success)),
                task("slow", move || {
                    flag.set(flag.get() + 1);
                    if flag.get() < 2 {
                        Status::Running
                    } else {
                        Status::Success
                    }
                }),
            ],
        ));
        assert_eq!(tree.tick(), Status::Success);
        assert_eq!(first.get(), 2);
    }

    #[test]
    fn parallel_selector_continue_keeps_first_success() {
        let polls = Rc::new(Cell::new(0));
        let flag = Rc::clone(&polls);
        let (mut tree, status) = run(parallel(
            "Par",
            Policy::SelectorContinue,
            Executor::Entire,
            [
                task("ok_then_fail", move || {
                    flag.set(flag.get() + 1);
                    if flag.get() == 1 {
                        Status::Success
                    } else {
                        Status::Failure
                    }
                }),
                task("slow", {
                    let mut ticks = 0;
                    move || {
                        ticks += 1;
                        if ticks < 2 {
                            Status::Running
                        } else {
                            Status::Failure
                        }
                    }
                }),
            ],
        ));
        assert_eq!(status, Status::Running);
        assert_eq!(tree.tick(), Status::Success);
    }
}
