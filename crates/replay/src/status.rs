use serde::{Deserialize, Serialize};

/// Replay lifecycle state.
///
/// ```text
/// NotStarted ──► Running ──► Completed
///                  │  ▲ ├──► Cancelled
///                  └──┘ └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    NotStarted,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ReplayStatus {
    /// Transition table. Every legal move of the state machine is listed here
    /// and nowhere else.
    pub const fn allowed_next(self) -> &'static [ReplayStatus] {
        match self {
            ReplayStatus::NotStarted => &[ReplayStatus::Running],
            ReplayStatus::Running => &[
                ReplayStatus::Running,
                ReplayStatus::Completed,
                ReplayStatus::Cancelled,
                ReplayStatus::Failed,
            ],
            ReplayStatus::Completed | ReplayStatus::Cancelled | ReplayStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: ReplayStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReplayStatus::NotStarted => "not_started",
            ReplayStatus::Running => "running",
            ReplayStatus::Completed => "completed",
            ReplayStatus::Cancelled => "cancelled",
            ReplayStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
