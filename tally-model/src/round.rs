//! The elimination round entity and its lifecycle.
//!
//! A round is created open with a fixed voting window and is closed exactly
//! once by [`Round::finish`]. Closed is terminal; nothing reopens a round.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, RoundId};

/// Length of the voting window applied at creation when no override is
/// configured.
pub const DEFAULT_ROUND_DURATION_HOURS: i64 = 24;

/// The default voting window as a duration.
pub fn default_round_duration() -> TimeDelta {
    TimeDelta::hours(DEFAULT_ROUND_DURATION_HOURS)
}

/// One elimination round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Round {
    pub id: RoundId,
    pub open: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Round {
    /// Creates a new open round whose window starts now and ends after
    /// `duration`. There is no error path.
    pub fn create(duration: TimeDelta) -> Self {
        let now = Utc::now();
        Self {
            id: RoundId::new(),
            open: true,
            start_date: now,
            end_date: now + duration,
            created: now,
            updated: now,
        }
    }

    /// Closes the round. Idempotent at the entity level: finishing an
    /// already-closed round leaves `open` false and only bumps `updated`.
    pub fn finish(&mut self) {
        self.open = false;
        self.updated = Utc::now();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// A participant as seen by this pipeline: an id and a display name. The
/// roster itself (creation, deletion, naming) is owned by the participant
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
}

/// A round joined with its currently assigned participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundWithParticipants {
    #[serde(flatten)]
    pub round: Round,
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_opens_with_fixed_window() {
        let round = Round::create(default_round_duration());
        assert!(round.is_open());
        assert_eq!(
            round.end_date - round.start_date,
            TimeDelta::hours(DEFAULT_ROUND_DURATION_HOURS)
        );
        assert_eq!(round.created, round.start_date);
    }

    #[test]
    fn finish_closes_and_is_idempotent() {
        let mut round = Round::create(default_round_duration());
        round.finish();
        assert!(!round.is_open());

        let closed_at = round.updated;
        round.finish();
        assert!(!round.is_open());
        assert!(round.updated >= closed_at);
    }
}
