//! States and outcomes of the server lifecycle.
use thiserror::Error;

/// `Stopped → Starting → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    /// Binding the listening socket.
    Starting,
    /// Accepting and serving connections.
    Running,
    /// Listener closed; in-flight connections get the grace period to finish.
    Draining,
}

impl LifecycleState {
    /// Whether moving from `self` to `next` is a legal transition. A failed bind goes straight
    /// from `Starting` back to `Stopped`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Draining)
                | (Draining, Stopped)
        )
    }
}

/// How draining ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight connection finished within the grace period.
    Completed,
    /// The grace period ran out; this many connections were closed forcibly.
    ForcedClose { abandoned: usize },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LifecycleError {
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}
