//! The round orchestrator: lifecycle transitions, vote acceptance and the
//! aggregation queries.

use std::sync::Arc;

use chrono::{TimeDelta, Timelike};
use tally_model::{
    dashboard::votes_per_hour, default_round_duration, Dashboard, ParticipantId,
    ParticipantStanding, Round, RoundId, RoundWithParticipants, UserId, Vote,
};
use tracing::{error, info};

use crate::error::{Result, VotingError};
use crate::publish::VotePublisher;
use crate::store::{ParticipantDirectory, RoundStore};

/// System-wide cap on simultaneously open rounds.
pub const MAX_OPEN_ROUNDS: usize = 1;

/// A vote request as it arrives from the HTTP layer, identity already
/// verified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteInput {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub participant_id: ParticipantId,
}

/// Coordinates round creation and closing with roster assignment, guards
/// the single-open-round invariant, and answers the read queries.
///
/// The open-round check in [`RoundService::create_round`] is read-then-write
/// and therefore best-effort under concurrent calls; the database enforces
/// the invariant hard via a partial unique index on `eliminations(open)`.
pub struct RoundService {
    store: Arc<dyn RoundStore>,
    participants: Arc<dyn ParticipantDirectory>,
    publisher: VotePublisher,
    round_duration: TimeDelta,
}

impl std::fmt::Debug for RoundService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundService")
            .field("round_duration", &self.round_duration)
            .finish()
    }
}

impl RoundService {
    pub fn new(
        store: Arc<dyn RoundStore>,
        participants: Arc<dyn ParticipantDirectory>,
        publisher: VotePublisher,
    ) -> Self {
        Self {
            store,
            participants,
            publisher,
            round_duration: default_round_duration(),
        }
    }

    /// Overrides the fixed voting window applied at round creation.
    pub fn with_round_duration(mut self, duration: TimeDelta) -> Self {
        self.round_duration = duration;
        self
    }

    /// Opens a new round and assigns the given participants to it.
    ///
    /// Fails with a resource-limit error when a round is already open. A
    /// failed roster assignment aborts with a validation error but does not
    /// roll back the already-created round; the round stays open with the
    /// assignments made so far.
    pub async fn create_round(&self, participant_ids: &[ParticipantId]) -> Result<Round> {
        let rounds = self.store.all_rounds().await?;
        let open = rounds.iter().filter(|r| r.round.open).count();
        if open >= MAX_OPEN_ROUNDS {
            return Err(VotingError::ResourceLimit(format!(
                "only {MAX_OPEN_ROUNDS} open round is allowed"
            )));
        }

        let round = Round::create(self.round_duration);
        self.store.insert_round(&round).await?;

        for participant in participant_ids {
            self.participants
                .assign_round(*participant, round.id)
                .await
                .map_err(|error| {
                    error!(%error, participant = %participant, "failed to assign round");
                    VotingError::Validation(format!(
                        "failed to assign round to participant {participant}: {error}"
                    ))
                })?;
        }

        info!(round_id = %round.id, participants = participant_ids.len(), "round created");
        Ok(round)
    }

    /// Accepts a vote: checks the target round exists and is still open,
    /// then hands the vote fact to the publisher. The HTTP response may
    /// return before the vote is durably stored.
    pub async fn vote(&self, input: VoteInput) -> Result<Vote> {
        let round = self
            .store
            .round(input.round_id)
            .await?
            .ok_or_else(|| VotingError::NotFound(format!("round {}", input.round_id)))?;

        if !round.is_open() {
            return Err(VotingError::Validation(format!(
                "round {} is closed",
                input.round_id
            )));
        }

        self.publisher
            .publish(input.round_id, input.user_id, input.participant_id)
            .await
    }

    /// Closes the round and detaches its participants in one transaction.
    /// Finishing an already-closed round succeeds and changes nothing.
    pub async fn finish_round(&self, id: RoundId) -> Result<()> {
        let round = self
            .store
            .round_with_participants(id)
            .await?
            .ok_or_else(|| VotingError::NotFound(format!("round {id}")))?;

        let participant_ids: Vec<ParticipantId> =
            round.participants.iter().map(|p| p.id).collect();

        let newly_closed = self
            .store
            .finish_round_and_detach_participants(id, &participant_ids)
            .await?;

        info!(round_id = %id, newly_closed, "round finished");
        Ok(())
    }

    /// Standings for one round, ordered by vote count descending.
    pub async fn result(&self, id: RoundId) -> Result<Vec<ParticipantStanding>> {
        self.store.result_rows(id).await
    }

    /// Aggregate statistics for the single open round. Fails with not-found
    /// when no round is open; no partial result is returned.
    pub async fn dashboard(&self) -> Result<Dashboard> {
        let round = self
            .store
            .unique_open_round()
            .await?
            .ok_or_else(|| VotingError::NotFound("no open round".into()))?;

        let votes = self.store.votes_for_round(round.id).await?;
        let mut spread_votes = [0u64; 24];
        for vote in &votes {
            spread_votes[vote.created.hour() as usize] += 1;
        }

        let total_votes = self.store.total_votes().await?;
        let total_users = self.store.total_distinct_voters().await?;

        Ok(Dashboard {
            total_votes,
            total_users,
            votes_per_hour: votes_per_hour(total_votes),
            spread_votes,
            has_round: true,
        })
    }

    /// Every round, newest first, with assigned participants.
    pub async fn all_rounds(&self) -> Result<Vec<RoundWithParticipants>> {
        self.store.all_rounds().await
    }

    /// Open rounds only; this backs the public listing endpoint.
    pub async fn open_rounds(&self) -> Result<Vec<RoundWithParticipants>> {
        self.store.open_rounds().await
    }
}
