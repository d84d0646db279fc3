use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Poll, PollKind, PollStatus};

/// Behavioral phase derived from stored status and wall-clock time.
///
/// A poll can be `active` in storage yet `expired` here; expiry is never
/// written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Draft,
    Scheduled,
    Open,
    Expired,
    Closed,
    Archived,
}

impl PollPhase {
    pub fn of(poll: &Poll, now: DateTime<Utc>) -> Self {
        match poll.status {
            PollStatus::Draft => PollPhase::Draft,
            PollStatus::Closed => PollPhase::Closed,
            PollStatus::Archived => PollPhase::Archived,
            PollStatus::Active if now < poll.start_date => PollPhase::Scheduled,
            PollStatus::Active if now >= poll.end_date => PollPhase::Expired,
            PollStatus::Active => PollPhase::Open,
        }
    }

    /// Whether aggregate results are shown alongside the poll.
    pub fn shows_results(self) -> bool {
        matches!(
            self,
            PollPhase::Open | PollPhase::Expired | PollPhase::Closed | PollPhase::Archived
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            PollPhase::Draft => "draft",
            PollPhase::Scheduled => "scheduled",
            PollPhase::Open => "open",
            PollPhase::Expired => "expired",
            PollPhase::Closed => "closed",
            PollPhase::Archived => "archived",
        }
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reasons a resident may not participate right now.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IneligibleReason {
    #[error("you are not eligible to participate in this poll")]
    NotPermitted,
    #[error("poll is {0} and not accepting responses")]
    NotActive(PollStatus),
    #[error("poll opens at {0}")]
    NotYetOpen(DateTime<Utc>),
    #[error("poll ended at {0}")]
    Expired(DateTime<Utc>),
    #[error("you have already participated in this poll")]
    AlreadyCompleted,
    #[error("this operation requires a {0}")]
    WrongKind(PollKind),
}

/// Window and status check: voteable iff active and `start_date <= now < end_date`.
pub fn ensure_voteable(poll: &Poll, now: DateTime<Utc>) -> Result<(), IneligibleReason> {
    match PollPhase::of(poll, now) {
        PollPhase::Open => Ok(()),
        PollPhase::Scheduled => Err(IneligibleReason::NotYetOpen(poll.start_date)),
        PollPhase::Expired => Err(IneligibleReason::Expired(poll.end_date)),
        PollPhase::Draft | PollPhase::Closed | PollPhase::Archived => {
            Err(IneligibleReason::NotActive(poll.status))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move poll from {from} to {to}")]
pub struct TransitionError {
    pub from: PollStatus,
    pub to: PollStatus,
}

/// Validate a stored-status change. Returns `false` for a same-status no-op.
pub fn check_transition(from: PollStatus, to: PollStatus) -> Result<bool, TransitionError> {
    if from == to {
        return Ok(false);
    }
    if to.rank() > from.rank() {
        Ok(true)
    } else {
        Err(TransitionError { from, to })
    }
}
