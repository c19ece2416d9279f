use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestration run states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    /// Not yet triggered
    Idle,
    /// Trying to take the run lock
    AcquiringLock,
    /// Submitting core-stage jobs
    Stage1Enqueue,
    /// Polling the core-stage barrier
    Stage1Wait,
    /// Submitting order-stage jobs
    Stage2Enqueue,
    /// Polling the order-stage barrier
    Stage2Wait,
    /// Every stage finished and the lock was released
    Completed,
    /// Another run holds the lock; nothing was done
    SkippedLocked,
    /// The run aborted; the lock was released
    Failed,
}

impl OrchestrationState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::SkippedLocked | Self::Failed)
    }

    /// Check if the run lock is held while in this state
    pub fn holds_lock(&self) -> bool {
        matches!(
            self,
            Self::Stage1Enqueue | Self::Stage1Wait | Self::Stage2Enqueue | Self::Stage2Wait
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: OrchestrationState) -> bool {
        use OrchestrationState::*;
        matches!(
            (self, next),
            (Idle, AcquiringLock)
                | (AcquiringLock, SkippedLocked)
                | (AcquiringLock, Stage1Enqueue)
                | (AcquiringLock, Failed)
                | (Stage1Enqueue, Stage1Wait)
                | (Stage1Enqueue, Failed)
                | (Stage1Wait, Stage2Enqueue)
                | (Stage1Wait, Failed)
                | (Stage2Enqueue, Stage2Wait)
                | (Stage2Enqueue, Completed)
                | (Stage2Enqueue, Failed)
                | (Stage2Wait, Completed)
                | (Stage2Wait, Failed)
        )
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AcquiringLock => write!(f, "acquiring_lock"),
            Self::Stage1Enqueue => write!(f, "stage1_enqueue"),
            Self::Stage1Wait => write!(f, "stage1_wait"),
            Self::Stage2Enqueue => write!(f, "stage2_enqueue"),
            Self::Stage2Wait => write!(f, "stage2_wait"),
            Self::Completed => write!(f, "completed"),
            Self::SkippedLocked => write!(f, "skipped_locked"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for OrchestrationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "acquiring_lock" => Ok(Self::AcquiringLock),
            "stage1_enqueue" => Ok(Self::Stage1Enqueue),
            "stage1_wait" => Ok(Self::Stage1Wait),
            "stage2_enqueue" => Ok(Self::Stage2Enqueue),
            "stage2_wait" => Ok(Self::Stage2Wait),
            "completed" => Ok(Self::Completed),
            "skipped_locked" => Ok(Self::SkippedLocked),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid orchestration state: {s}")),
        }
    }
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::Idle
    }
}
