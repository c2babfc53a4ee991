//! Durable-storage collaborator traits.
//!
//! The pipeline consumes storage through these seams; the Postgres
//! implementations live in [`postgres`]. Service and consumer tests run
//! against in-memory fakes instead of a live database.

use async_trait::async_trait;
use tally_model::{
    Participant, ParticipantId, ParticipantStanding, Round, RoundId, RoundWithParticipants, Vote,
};

use crate::error::Result;

pub mod postgres;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod memory;

pub use postgres::{PostgresParticipantDirectory, PostgresRoundStore};

/// Durable storage for rounds, votes and derived aggregates.
#[async_trait]
pub trait RoundStore: Send + Sync {
    async fn insert_round(&self, round: &Round) -> Result<()>;

    async fn round(&self, id: RoundId) -> Result<Option<Round>>;

    /// All rounds, newest first, each joined with its assigned participants.
    async fn all_rounds(&self) -> Result<Vec<RoundWithParticipants>>;

    /// Open rounds only, newest first.
    async fn open_rounds(&self) -> Result<Vec<RoundWithParticipants>>;

    /// The single currently open round. `None` when no round is open; a
    /// conflict error when more than one is (the invariant is broken).
    async fn unique_open_round(&self) -> Result<Option<Round>>;

    async fn round_with_participants(&self, id: RoundId)
        -> Result<Option<RoundWithParticipants>>;

    /// Records one vote row. Votes are insert-only; nothing updates or
    /// deletes them.
    async fn insert_vote(&self, vote: &Vote) -> Result<()>;

    async fn votes_for_round(&self, id: RoundId) -> Result<Vec<Vote>>;

    /// Per-participant vote counts for one round, ordered by count
    /// descending with participant id as the tie-break.
    async fn result_rows(&self, id: RoundId) -> Result<Vec<ParticipantStanding>>;

    /// Total votes cast in the currently open round.
    async fn total_votes(&self) -> Result<u64>;

    /// Distinct voters in the currently open round.
    async fn total_distinct_voters(&self) -> Result<u64>;

    /// Atomically closes the round (a no-op if it is already closed) and
    /// clears the round assignment on the given participants. Returns
    /// whether the round transitioned to closed in this call.
    async fn finish_round_and_detach_participants(
        &self,
        id: RoundId,
        participants: &[ParticipantId],
    ) -> Result<bool>;
}

/// The slice of the participant-roster collaborator this pipeline needs:
/// assigning a participant to a round and reading the assignment back.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn assign_round(&self, participant: ParticipantId, round: RoundId) -> Result<()>;

    async fn assigned_round(&self, participant: ParticipantId) -> Result<Option<RoundId>>;

    /// The participant record, if the roster knows the id.
    async fn participant(&self, id: ParticipantId) -> Result<Option<Participant>>;
}
