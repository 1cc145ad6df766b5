//! Node kinds and tree blueprints.
//!
//! A [`Node`] is a blueprint: a name, a [`NodeKind`] and child blueprints.
//! [`Tree::set_root`](crate::Tree::set_root) flattens it into the tree's
//! arena, where each node is addressed by a [`NodeId`].

use crate::behavior::Behavior;
use crate::composite::{Parallel, Selector, Sequence};
use crate::decorator::{Failer, Inverter, Service, Succeeder};
use crate::error::{BuildError, Result};
use crate::task::Task;
use crate::timing::{Cooldown, Limiter};

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Every built-in node kind, plus [`NodeKind::Custom`] for user behaviors.
pub enum NodeKind {
    Sequence(Sequence),
    Selector(Selector),
    Parallel(Parallel),
    Inverter(Inverter),
    Succeeder(Succeeder),
    Failer(Failer),
    Cooldown(Cooldown),
    Limiter(Limiter),
    Service(Service),
    Task(Task),
    /// A user supplied behavior. It accepts any number of children and
    /// drives them through its [`NodeContext`](crate::NodeContext).
    Custom(Box<dyn Behavior>),
}

impl NodeKind {
    pub fn custom(behavior: impl Behavior + 'static) -> Self {
        NodeKind::Custom(Box::new(behavior))
    }

    /// Human readable kind name, used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Sequence(s) if s.is_random() => "RandomSequence",
            NodeKind::Sequence(_) => "Sequence",
            NodeKind::Selector(s) if s.is_random() => "RandomSelector",
            NodeKind::Selector(_) => "Selector",
            NodeKind::Parallel(_) => "Parallel",
            NodeKind::Inverter(_) => "Inverter",
            NodeKind::Succeeder(_) => "Succeeder",
            NodeKind::Failer(_) => "Failer",
            NodeKind::Cooldown(_) => "Cooldown",
            NodeKind::Limiter(_) => "Limiter",
            NodeKind::Service(_) => "Service",
            NodeKind::Task(_) => "Task",
            NodeKind::Custom(_) => "Custom",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            NodeKind::Sequence(_) | NodeKind::Selector(_) | NodeKind::Parallel(_)
        )
    }

    pub fn is_decorator(&self) -> bool {
        !self.is_composite() && !self.is_task() && !self.is_custom()
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, NodeKind::Custom(_))
    }

    pub fn is_task(&self) -> bool {
        matches!(self, NodeKind::Task(_))
    }

    pub(crate) fn behavior(&mut self) -> &mut dyn Behavior {
        match self {
            NodeKind::Sequence(b) => b,
            NodeKind::Selector(b) => b,
            NodeKind::Parallel(b) => b,
            NodeKind::Inverter(b) => b,
            NodeKind::Succeeder(b) => b,
            NodeKind::Failer(b) => b,
            NodeKind::Cooldown(b) => b,
            NodeKind::Limiter(b) => b,
            NodeKind::Service(b) => b,
            NodeKind::Task(b) => b,
            NodeKind::Custom(b) => b.as_mut(),
        }
    }
}

macro_rules! impl_from_kind {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for NodeKind {
                fn from(behavior: $variant) -> Self {
                    NodeKind::$variant(behavior)
                }
            }
        )*
    };
}

impl_from_kind!(
    Sequence, Selector, Parallel, Inverter, Succeeder, Failer, Cooldown, Limiter, Service, Task,
);

/// Blueprint of a node and its subtree.
pub struct Node {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            children: Vec::new(),
        }
    }

    /// Blueprint of a node driven by a user behavior.
    pub fn custom(name: impl Into<String>, behavior: impl Behavior + 'static) -> Self {
        Self::new(name, NodeKind::custom(behavior))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Attaches `child` below this node.
    ///
    /// Composites and custom nodes accept any number of children, decorators
    /// exactly one and tasks none.
    pub fn add_child(&mut self, child: Node) -> Result<()> {
        if self.kind.is_task() {
            return Err(BuildError::TaskHasChildren {
                name: self.name.clone(),
            });
        }
        if self.kind.is_decorator() && !self.children.is_empty() {
            tracing::error!(decorator = %self.name, "decorator nodes can have only one child");
            return Err(BuildError::DecoratorOccupied {
                name: self.name.clone(),
            });
        }
        self.children.push(child);
        Ok(())
    }

    /// Builder form of [`add_child`](Self::add_child).
    pub fn with_child(mut self, child: Node) -> Result<Self> {
        self.add_child(child)?;
        Ok(self)
    }

    /// Checks the subtree for composites without children and decorators
    /// without a child.
    ///
    /// Trees accept unvalidated blueprints; such nodes fail when executed.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(&self.name)
    }

    fn validate_at(&self, path: &str) -> Result<()> {
        if self.kind.is_composite() && self.children.is_empty() {
            return Err(BuildError::EmptyComposite {
                path: path.to_string(),
            });
        }
        if self.kind.is_decorator() && self.children.is_empty() {
            return Err(BuildError::MissingChild {
                path: path.to_string(),
            });
        }
        for child in &self.children {
            child.validate_at(&format!("{path}/{}", child.name))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("children", &self.children)
            .finish()
    }
}
