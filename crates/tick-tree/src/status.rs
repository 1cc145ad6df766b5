//! Status carried by every behavior node.

/// The lifecycle state of a behavior node.
///
/// # Tick Semantics
///
/// A node is `Fresh` until its first activation (or after a full reset).
/// `Running` is the only status that survives from one tick to the next:
/// the node is resumed on the following tick instead of being restarted.
/// `Success` and `Failure` are terminal for the current activation, and
/// `Cancelled` marks a node that its parent stopped while it was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// The node has not been activated since it was created or reset.
    #[default]
    Fresh,

    /// The node has more work to do and must be resumed next tick.
    Running,

    /// The node completed successfully.
    ///
    /// For conditions: The condition was met.
    /// For actions: The action executed without errors.
    Success,

    /// The node failed.
    ///
    /// For conditions: The condition was not met.
    /// For actions: The action could not be executed.
    Failure,

    /// The node was stopped by its parent before it settled.
    Cancelled,
}

impl Status {
    /// Returns `true` if this status is `Success`.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Returns `true` if this status is `Failure`.
    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failure)
    }

    /// Returns `true` if this status is `Running`.
    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, Status::Running)
    }

    /// Returns `true` for `Success` and `Failure`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failure)
    }

    /// Inverts the status: Success becomes Failure and vice versa.
    ///
    /// Every other status is returned unchanged.
    #[inline]
    pub fn invert(self) -> Self {
        match self {
            Status::Success => Status::Failure,
            Status::Failure => Status::Success,
            other => other,
        }
    }
}
