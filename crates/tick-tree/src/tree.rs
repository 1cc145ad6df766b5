//! Behavior trees: the node arena, the tick driver and node contexts.
//!
//! A [`Tree`] owns every node of one behavior tree in a flat arena. Parent and
//! child links are [`NodeId`]s, so notifying a parent is an index lookup and
//! nodes never hold references to each other.
//!
//! # Tick
//!
//! [`Tree::tick`] resumes a `Running` root, or starts and executes it. From
//! there the driver loop follows the [`Step`]s returned by behavior hooks:
//! starting or resuming children, settling nodes, and delivering each result
//! to the parent's `child_*` hook, until the root settles for this tick.

use std::cell::{BorrowError, BorrowMutError, Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::Status;
use crate::behavior::{Behavior, Step};
use crate::blackboard::Blackboard;
use crate::error::{BuildError, Result};
use crate::node::{Node, NodeId, NodeKind};
use crate::scheduler::{Scheduler, WeakScheduler};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a tree, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    fn next() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

struct NodeEntry {
    name: String,
    status: Status,
    previous: Status,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    // Taken out while one of its hooks runs
    kind: Option<NodeKind>,
    composite: bool,
}

/// One behavior tree and its optional blackboard.
pub struct Tree {
    id: TreeId,
    name: String,
    nodes: Vec<NodeEntry>,
    root: Option<NodeId>,
    scheduler: WeakScheduler,
    blackboard: Option<Blackboard>,
    rng: StdRng,
}

impl Tree {
    /// Creates an empty tree whose timers live on `scheduler`.
    ///
    /// The tree's shuffle RNG is seeded from the scheduler's RNG, so a seeded
    /// scheduler yields reproducible random composites.
    pub fn new(name: impl Into<String>, scheduler: &Scheduler) -> Self {
        Self {
            id: TreeId::next(),
            name: name.into(),
            nodes: Vec::new(),
            root: None,
            scheduler: scheduler.downgrade(),
            blackboard: None,
            rng: StdRng::seed_from_u64(scheduler.derive_seed()),
        }
    }

    /// Reseeds the RNG used by random composites.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_blackboard(mut self, blackboard: Blackboard) -> Self {
        self.blackboard = Some(blackboard);
        self
    }

    /// Builder form of [`set_root`](Self::set_root).
    pub fn with_root(mut self, root: Node) -> Result<Self> {
        self.set_root(root)?;
        Ok(self)
    }

    /// Installs the root subtree. A tree has exactly one root, set once.
    pub fn set_root(&mut self, root: Node) -> Result<NodeId> {
        if self.root.is_some() {
            tracing::error!(tree = %self.name, "tree can only have one root");
            return Err(BuildError::RootAlreadySet {
                tree: self.name.clone(),
            });
        }
        let id = self.flatten(root, None);
        self.root = Some(id);
        Ok(id)
    }

    fn flatten(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        let Node {
            name,
            kind,
            children,
        } = node;
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeEntry {
            name,
            status: Status::Fresh,
            previous: Status::Fresh,
            parent,
            children: Vec::with_capacity(children.len()),
            composite: kind.is_composite() || kind.is_custom(),
            kind: Some(kind),
        });
        for child in children {
            let child = self.flatten(child, Some(id));
            self.nodes[id.0].children.push(child);
        }
        id
    }

    /// Wraps the tree in a shared handle for scheduler registration.
    pub fn into_handle(self) -> TreeHandle {
        TreeHandle {
            id: self.id,
            tree: Rc::new(RefCell::new(self)),
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn blackboard(&self) -> Option<&Blackboard> {
        self.blackboard.as_ref()
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.scheduler.upgrade()
    }

    /// The tree's status: its root's status.
    pub fn status(&self) -> Status {
        self.root.map_or(Status::Fresh, |root| self.nodes[root.0].status)
    }

    /// Runs one tick and returns the root's status afterwards.
    pub fn tick(&mut self) -> Status {
        let Some(root) = self.root else {
            tracing::error!(tree = %self.name, "tree ticked without a root");
            return Status::Failure;
        };
        if !self.nodes[root.0].status.is_running() {
            self.start_node(root);
        }
        let step = self.execute_node(root);
        self.drive(root, step);
        self.status()
    }

    /// Cancels a running root and everything running below it.
    pub fn cancel(&mut self) {
        if let Some(root) = self.root
            && self.nodes[root.0].status.is_running()
        {
            self.cancel_node(root);
        }
    }

    /// Returns the root (and every composite's children) to `Fresh`.
    pub fn reset(&mut self) {
        if let Some(root) = self.root {
            self.reset_node(root);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node (in depth-first declaration order) named `name`.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(NodeId)
    }

    pub fn status_of(&self, id: NodeId) -> Status {
        self.nodes[id.0].status
    }

    pub fn previous_status_of(&self, id: NodeId) -> Status {
        self.nodes[id.0].previous
    }

    pub fn name_of(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Children of `id` in their current order.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Slash separated path from the tree name down to `id`.
    pub fn path(&self, id: NodeId) -> String {
        let mut names = vec![self.nodes[id.0].name.as_str()];
        let mut cursor = self.nodes[id.0].parent;
        while let Some(parent) = cursor {
            names.push(&self.nodes[parent.0].name);
            cursor = self.nodes[parent.0].parent;
        }
        names.push(&self.name);
        names.reverse();
        names.join("/")
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    fn drive(&mut self, mut id: NodeId, mut step: Step) {
        loop {
            step = match step {
                Step::Start(slot) | Step::Resume(slot) => {
                    match self.nodes[id.0].children.get(slot).copied() {
                        Some(child) => {
                            if matches!(step, Step::Start(_)) {
                                self.start_node(child);
                            }
                            id = child;
                            self.execute_node(child)
                        }
                        None => {
                            tracing::error!(node = %self.path(id), slot, "no child at slot");
                            Step::Fail
                        }
                    }
                }
                settled => {
                    let status = settled.status().unwrap_or(Status::Failure);
                    self.transition(id, status);
                    if status.is_terminal() {
                        self.finish_node(id);
                    }

                    let Some(parent) = self.nodes[id.0].parent else {
                        return;
                    };
                    let slot = self.slot_of(parent, id);
                    let next = self.with_behavior(parent, |behavior, cx| match status {
                        Status::Success => behavior.child_success(cx, slot),
                        Status::Running => behavior.child_running(cx, slot),
                        _ => behavior.child_failure(cx, slot),
                    });
                    id = parent;
                    next.unwrap_or(Step::Fail)
                }
            };
        }
    }

    fn slot_of(&self, parent: NodeId, child: NodeId) -> usize {
        self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == child)
            .unwrap_or(usize::MAX)
    }

    fn transition(&mut self, id: NodeId, status: Status) {
        let node = &mut self.nodes[id.0];
        node.previous = node.status;
        node.status = status;
    }

    fn with_behavior<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn Behavior, &mut NodeContext<'_>) -> R,
    ) -> Option<R> {
        let Some(mut kind) = self.nodes[id.0].kind.take() else {
            tracing::error!(node = %self.path(id), "node re-entered while its hook is running");
            return None;
        };
        let result = {
            let mut cx = NodeContext { tree: self, id };
            f(kind.behavior(), &mut cx)
        };
        self.nodes[id.0].kind = Some(kind);
        Some(result)
    }

    fn start_node(&mut self, id: NodeId) {
        self.with_behavior(id, |behavior, cx| behavior.start(cx));
    }

    fn execute_node(&mut self, id: NodeId) -> Step {
        self.with_behavior(id, |behavior, cx| behavior.execute(cx))
            .unwrap_or(Step::Fail)
    }

    fn finish_node(&mut self, id: NodeId) {
        self.with_behavior(id, |behavior, cx| behavior.finish(cx));
    }

    fn cancel_node(&mut self, id: NodeId) {
        for slot in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[slot];
            if self.nodes[child.0].status.is_running() {
                self.cancel_node(child);
            }
        }
        self.transition(id, Status::Cancelled);
        self.finish_node(id);
        tracing::trace!(node = %self.path(id), "cancelled");
    }

    fn reset_node(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        node.status = Status::Fresh;
        node.previous = Status::Fresh;
        if node.composite {
            for slot in 0..self.nodes[id.0].children.len() {
                let child = self.nodes[id.0].children[slot];
                self.reset_node(child);
            }
        }
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("status", &self.status())
            .finish()
    }
}

/// View of the tree handed to a node's behavior hooks.
///
/// Hooks use it to inspect and control their own children and to reach the
/// scheduler and blackboard.
pub struct NodeContext<'a> {
    tree: &'a mut Tree,
    id: NodeId,
}

impl NodeContext<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.tree.nodes[self.id.0].name
    }

    pub fn path(&self) -> String {
        self.tree.path(self.id)
    }

    pub fn child_count(&self) -> usize {
        self.tree.nodes[self.id.0].children.len()
    }

    pub fn child(&self, slot: usize) -> Option<NodeId> {
        self.tree.nodes[self.id.0].children.get(slot).copied()
    }

    /// Status of the child at `slot`; `Fresh` if there is none.
    pub fn child_status(&self, slot: usize) -> Status {
        self.child(slot)
            .map_or(Status::Fresh, |child| self.tree.nodes[child.0].status)
    }

    /// Resumes the child at `slot` if it is running, otherwise starts it.
    ///
    /// A missing child is a configuration error and fails this node.
    pub fn enter_child(&self, slot: usize) -> Step {
        match self.child(slot) {
            Some(child) if self.tree.nodes[child.0].status.is_running() => Step::Resume(slot),
            Some(_) => Step::Start(slot),
            None => self.misconfigured("no child to execute"),
        }
    }

    /// Cancels the child at `slot` and everything running below it.
    pub fn cancel_child(&mut self, slot: usize) {
        if let Some(child) = self.child(slot) {
            self.tree.cancel_node(child);
        }
    }

    /// Cancels every running child from `from` onwards.
    pub fn cancel_running_children(&mut self, from: usize) {
        for slot in from..self.child_count() {
            if self.child_status(slot).is_running() {
                self.cancel_child(slot);
            }
        }
    }

    /// Returns every child subtree to `Fresh`.
    pub fn reset_children(&mut self) {
        for slot in 0..self.child_count() {
            if let Some(child) = self.child(slot) {
                self.tree.reset_node(child);
            }
        }
    }

    /// Reorders the children with a uniform Fisher-Yates shuffle.
    pub fn shuffle_children(&mut self) {
        let Tree { nodes, rng, .. } = &mut *self.tree;
        nodes[self.id.0].children.shuffle(rng);
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.tree.scheduler.upgrade()
    }

    pub fn blackboard(&self) -> Option<&Blackboard> {
        self.tree.blackboard.as_ref()
    }

    /// Reports a configuration error at this node and fails it.
    pub fn misconfigured(&self, reason: &str) -> Step {
        tracing::error!(node = %self.path(), reason, "misconfigured node failed");
        Step::Fail
    }
}

/// Shared handle to a tree, as registered with a [`Scheduler`].
///
/// The id is readable without borrowing the tree, so a tree's own callbacks
/// can unregister it mid-tick.
#[derive(Clone)]
pub struct TreeHandle {
    id: TreeId,
    tree: Rc<RefCell<Tree>>,
}

impl TreeHandle {
    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn borrow(&self) -> Ref<'_, Tree> {
        self.tree.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Tree> {
        self.tree.borrow_mut()
    }

    pub fn try_borrow(&self) -> std::result::Result<Ref<'_, Tree>, BorrowError> {
        self.tree.try_borrow()
    }

    pub fn try_borrow_mut(&self) -> std::result::Result<RefMut<'_, Tree>, BorrowMutError> {
        self.tree.try_borrow_mut()
    }
}

impl std::fmt::Debug for TreeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TreeHandle").field(&self.id).finish()
    }
}
