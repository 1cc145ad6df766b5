//! Error types for tree construction and registration bookkeeping.
//!
//! Runtime failures of leaf callbacks never show up here: they are turned into
//! [`Status::Failure`](crate::Status::Failure) of the leaf and travel up the
//! tree like any other failure.

use crate::Status;

/// Misuse detected while assembling or configuring a tree.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("tree `{tree}` can only have one root")]
    RootAlreadySet { tree: String },

    #[error("decorator `{name}` can only have one child")]
    DecoratorOccupied { name: String },

    #[error("task `{name}` cannot have children")]
    TaskHasChildren { name: String },

    #[error("composite `{path}` has no children")]
    EmptyComposite { path: String },

    #[error("decorator `{path}` has no child")]
    MissingChild { path: String },

    #[error("{what} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDuration { what: &'static str, value: f64 },

    #[error("{status:?} cannot be reported while a gate is closed")]
    InvalidReturnState { status: Status },

    /// A cooldown that reports Failure while cooling down must let a child
    /// Failure cancel the cooldown.
    #[error("cooldown returning Failure requires cancel_on_failure")]
    FailureWithoutCancel,
}

/// Double registration or unregistration against a [`DeferredSet`].
///
/// These are diagnostics: the operation that produced them changed nothing.
///
/// [`DeferredSet`]: crate::registry::DeferredSet
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("already registered")]
    AlreadyRegistered,

    #[error("not registered")]
    NotRegistered,
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Checks that a duration is usable as a timer interval.
pub(crate) fn check_duration(what: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(BuildError::InvalidDuration { what, value })
    }
}
