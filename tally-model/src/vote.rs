//! The immutable vote fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, RoundId, UserId, VoteId};

/// One cast vote: a user voted against a participant within a round.
///
/// This is both the queue wire format (JSON, ISO-8601 timestamp, field names
/// fixed by the transport contract) and the persisted row. A vote is never
/// mutated or deleted after the consumer inserts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: VoteId,
    pub user_id: UserId,
    #[serde(rename = "elimination_id")]
    #[sqlx(rename = "elimination_id")]
    pub round_id: RoundId,
    pub participant_id: ParticipantId,
    pub created: DateTime<Utc>,
}

impl Vote {
    /// Builds a fresh vote fact with a generated id and the current server
    /// time. Identity and targets are taken as already validated upstream.
    pub fn cast(round_id: RoundId, user_id: UserId, participant_id: ParticipantId) -> Self {
        Self {
            id: VoteId::new(),
            user_id,
            round_id,
            participant_id,
            created: Utc::now(),
        }
    }
}
