//! Publish state machine types.

/// Remote branch the package repository is published to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Remote URL (authenticated transport)
    pub remote: String,
    pub branch: String,
}

impl PublishTarget {
    pub fn new(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            branch: branch.into(),
        }
    }
}

impl std::fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.remote, self.branch)
    }
}

/// Result of a single push attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Remote refused the update (non-fast-forward, protected ref, ...)
    Rejected(String),
    /// Any other failure (network, authentication, ...)
    Failed(String),
}

/// Publisher states.
///
/// `Idle → Committed → Pushing → {Succeeded, Conflicted, Exhausted}`, with
/// `Conflicted → Pushing` after a resync. Attempts are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Idle,
    Committed,
    Pushing { attempt: u32 },
    Conflicted { attempt: u32 },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Exhausted { .. })
    }

    /// Push attempts made so far
    pub fn attempts(&self) -> u32 {
        match *self {
            Self::Idle | Self::Committed => 0,
            Self::Pushing { attempt } => attempt.saturating_sub(1),
            Self::Conflicted { attempt } => attempt,
            Self::Succeeded { attempts } | Self::Exhausted { attempts } => attempts,
        }
    }
}

impl std::fmt::Display for PublishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Committed => write!(f, "committed"),
            Self::Pushing { attempt } => write!(f, "pushing (attempt {})", attempt),
            Self::Conflicted { attempt } => write!(f, "conflicted (attempt {})", attempt),
            Self::Succeeded { attempts } => write!(f, "succeeded after {} attempt(s)", attempts),
            Self::Exhausted { attempts } => write!(f, "exhausted after {} attempt(s)", attempts),
        }
    }
}

/// Summary of a successful publication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Push attempts, including the accepted one
    pub attempts: u32,
    /// Resync cycles run between attempts
    pub resyncs: u32,
}
