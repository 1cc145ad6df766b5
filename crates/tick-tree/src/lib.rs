//! Tick-driven behavior trees with a cooperative scheduler.
//!
//! This library evaluates behavior trees once per host frame. A single
//! [`Scheduler`] ticks every registered [`Tree`], fires pooled timers (used by
//! cooldowns, services and blackboard notifications) and applies registration
//! changes that arrive mid-pass once the pass is over.
//!
//! - **Single-threaded**: `Parallel` is a combination policy, not threads
//! - **Running persists**: a `Running` branch is resumed on the next tick
//!   instead of being restarted
//! - **Arena trees**: nodes live in a per-tree arena and refer to each other
//!   by [`NodeId`]
//!
//! # Architecture
//!
//! - [`Behavior`]: per-kind hooks returning a [`Step`] for the tree driver
//! - [`Status`]: Fresh, Running, Success, Failure or Cancelled
//! - Composite nodes: [`Sequence`], [`Selector`], [`Parallel`]
//! - Decorator nodes: [`Inverter`], [`Succeeder`], [`Failer`], [`Service`],
//!   [`Cooldown`], [`Limiter`]
//! - Leaf nodes: [`Task`]
//! - Shared memory: [`Blackboard`]
//!
//! # Example
//!
//! ```rust
//! use tick_tree::builder::{selector, sequence, task};
//! use tick_tree::{Scheduler, Status, Tree};
//!
//! let scheduler = Scheduler::new();
//! let tree = Tree::new("Guard", &scheduler)
//!     .with_root(selector(
//!         "Root",
//!         [
//!             sequence("Attack", [task("enemy_near", || Status::Failure)]),
//!             task("patrol", || Status::Running),
//!         ],
//!     ))
//!     .unwrap()
//!     .into_handle();
//!
//! scheduler.register_tree(&tree).unwrap();
//! scheduler.tick(1.0 / 60.0);
//! assert_eq!(tree.borrow().status(), Status::Running);
//! ```

pub mod behavior;
pub mod blackboard;
pub mod builder;
pub mod composite;
pub mod config;
pub mod decorator;
pub mod error;
pub mod node;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod task;
pub mod timer;
pub mod timing;
pub mod tree;

// Re-export core types for ergonomic API
pub use behavior::{Behavior, Step};
pub use blackboard::{Blackboard, ChangeKind, Listener, ListenerId, Value};
pub use composite::{Executor, Parallel, Policy, Selector, Sequence};
pub use config::SchedulerConfig;
pub use decorator::{Failer, Inverter, Service, ServiceConfig, Succeeder};
pub use error::{BuildError, RegistryError, Result};
pub use node::{Node, NodeId, NodeKind};
pub use scheduler::{Scheduler, WeakScheduler};
pub use status::Status;
pub use task::Task;
pub use timer::{Repeat, TimerCallback, TimerKey};
pub use timing::{Cooldown, CooldownConfig, GateResult, Limiter, LimiterConfig};
pub use tree::{NodeContext, Tree, TreeHandle, TreeId};
