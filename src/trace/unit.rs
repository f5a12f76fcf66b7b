use crate::state::Status;

/// Lifecycle of one (target, kind) test unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Running { attempt: u32 },
    Succeeded,
    Degraded,
    Failed,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Degraded | Self::Failed)
    }

    /// Begin the first attempt
    pub fn start(self) -> Self {
        match self {
            Self::Pending => Self::Running { attempt: 1 },
            other => other,
        }
    }

    /// Settle the running attempt with its parsed status.
    ///
    /// A failed attempt moves on to the next one while attempts remain.
    pub fn settle(self, status: &Status, max_attempts: u32) -> Self {
        let Self::Running { attempt } = self else {
            return self;
        };
        match status {
            Status::Ok => Self::Succeeded,
            Status::Degraded(_) => Self::Degraded,
            Status::Failed(_) if attempt < max_attempts => Self::Running {
                attempt: attempt + 1,
            },
            Status::Failed(_) => Self::Failed,
        }
    }

    /// Stop retrying; only a pending retry is affected
    pub fn abandon(self) -> Self {
        match self {
            Self::Running { .. } => Self::Failed,
            other => other,
        }
    }
}
