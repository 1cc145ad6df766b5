//! Builder utilities for ergonomic behavior tree construction.
//!
//! These helpers reduce the boilerplate of assembling [`Node`] blueprints.
//! Instead of `Node::new(name, Sequence::new())` followed by one
//! `add_child` per child, write `sequence(name, [a, b, c])`.
//!
//! Decorator helpers take their only child directly, so they cannot fail on
//! child count. The timing helpers return [`Result`] because their
//! configuration is validated.

use crate::Status;
use crate::composite::{Executor, Parallel, Policy, Selector, Sequence};
use crate::decorator::{Failer, Inverter, Service, ServiceConfig, Succeeder};
use crate::error::Result;
use crate::node::{Node, NodeKind};
use crate::task::Task;
use crate::timing::{Cooldown, CooldownConfig, Limiter, LimiterConfig};

fn composite(
    name: impl Into<String>,
    kind: impl Into<NodeKind>,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    let mut node = Node::new(name, kind);
    node.children.extend(children);
    node
}

fn decorate(name: impl Into<String>, kind: impl Into<NodeKind>, child: Node) -> Node {
    let mut node = Node::new(name, kind);
    node.children.push(child);
    node
}

/// Creates a sequence node.
///
/// Shorthand for `Node::new(name, Sequence::new())` plus its children.
#[inline]
pub fn sequence(name: impl Into<String>, children: impl IntoIterator<Item = Node>) -> Node {
    composite(name, Sequence::new(), children)
}

/// Creates a selector node.
///
/// Shorthand for `Node::new(name, Selector::new())` plus its children.
#[inline]
pub fn selector(name: impl Into<String>, children: impl IntoIterator<Item = Node>) -> Node {
    composite(name, Selector::new(), children)
}

/// Creates a sequence that shuffles its children on every fresh start.
#[inline]
pub fn random_sequence(
    name: impl Into<String>,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    composite(name, Sequence::random(), children)
}

/// Creates a selector that shuffles its children on every fresh start.
#[inline]
pub fn random_selector(
    name: impl Into<String>,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    composite(name, Selector::random(), children)
}

/// Creates a parallel node.
#[inline]
pub fn parallel(
    name: impl Into<String>,
    policy: Policy,
    executor: Executor,
    children: impl IntoIterator<Item = Node>,
) -> Node {
    composite(name, Parallel::new(policy, executor), children)
}

/// Creates an inverter node.
///
/// Shorthand for `Node::new(name, Inverter::new())` with `child` attached.
#[inline]
pub fn inverter(name: impl Into<String>, child: Node) -> Node {
    decorate(name, Inverter::new(), child)
}

/// Creates a succeeder that waits for a running child.
#[inline]
pub fn succeeder(name: impl Into<String>, child: Node) -> Node {
    decorate(name, Succeeder::new(), child)
}

/// Creates a failer that waits for a running child.
#[inline]
pub fn failer(name: impl Into<String>, child: Node) -> Node {
    decorate(name, Failer::new(), child)
}

pub fn cooldown(name: impl Into<String>, config: CooldownConfig, child: Node) -> Result<Node> {
    Ok(decorate(name, Cooldown::new(config)?, child))
}

pub fn limiter(name: impl Into<String>, config: LimiterConfig, child: Node) -> Result<Node> {
    Ok(decorate(name, Limiter::new(config)?, child))
}

pub fn service(
    name: impl Into<String>,
    config: ServiceConfig,
    callback: impl FnMut() + 'static,
    child: Node,
) -> Result<Node> {
    Ok(decorate(name, Service::new(config, callback)?, child))
}

/// Creates a task leaf.
///
/// Shorthand for `Node::new(name, Task::new(run))`.
#[inline]
pub fn task(name: impl Into<String>, run: impl FnMut() -> Status + 'static) -> Node {
    Node::new(name, Task::new(run))
}

/// Creates a task leaf that always succeeds.
#[inline]
pub fn action(name: impl Into<String>, act: impl FnMut() + 'static) -> Node {
    Node::new(name, Task::action(act))
}
