//! In-memory fakes of the storage collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tally_model::{
    Participant, ParticipantId, ParticipantStanding, Round, RoundId, RoundWithParticipants, Vote,
};

use crate::error::{Result, VotingError};
use crate::store::{ParticipantDirectory, RoundStore};

#[derive(Default)]
struct Inner {
    rounds: HashMap<RoundId, Round>,
    participants: HashMap<ParticipantId, (String, Option<RoundId>)>,
    votes: Vec<Vote>,
}

/// A single in-memory store playing both collaborator roles.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    fail_vote_inserts: AtomicBool,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_participant(&self, id: ParticipantId, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.participants.insert(id, (name.to_string(), None));
    }

    /// Makes every subsequent `insert_vote` fail, for consumer error-path
    /// tests.
    pub fn fail_vote_inserts(&self, fail: bool) {
        self.fail_vote_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn vote_count(&self) -> usize {
        self.inner.lock().unwrap().votes.len()
    }

    pub fn votes(&self) -> Vec<Vote> {
        self.inner.lock().unwrap().votes.clone()
    }

    fn with_participants(inner: &Inner, round: &Round) -> RoundWithParticipants {
        let mut participants: Vec<Participant> = inner
            .participants
            .iter()
            .filter(|(_, (_, assigned))| *assigned == Some(round.id))
            .map(|(id, (name, _))| Participant {
                id: *id,
                name: name.clone(),
            })
            .collect();
        participants.sort_by_key(|p| p.id);
        RoundWithParticipants {
            round: round.clone(),
            participants,
        }
    }
}

#[async_trait]
impl RoundStore for InMemoryStore {
    async fn insert_round(&self, round: &Round) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.rounds.insert(round.id, round.clone());
        Ok(())
    }

    async fn round(&self, id: RoundId) -> Result<Option<Round>> {
        Ok(self.inner.lock().unwrap().rounds.get(&id).cloned())
    }

    async fn all_rounds(&self) -> Result<Vec<RoundWithParticipants>> {
        let inner = self.inner.lock().unwrap();
        let mut rounds: Vec<_> = inner
            .rounds
            .values()
            .map(|round| Self::with_participants(&inner, round))
            .collect();
        rounds.sort_by(|a, b| b.round.created.cmp(&a.round.created));
        Ok(rounds)
    }

    async fn open_rounds(&self) -> Result<Vec<RoundWithParticipants>> {
        Ok(self
            .all_rounds()
            .await?
            .into_iter()
            .filter(|r| r.round.open)
            .collect())
    }

    async fn unique_open_round(&self) -> Result<Option<Round>> {
        let inner = self.inner.lock().unwrap();
        let open: Vec<_> = inner.rounds.values().filter(|r| r.open).cloned().collect();
        match open.len() {
            0 | 1 => Ok(open.into_iter().next()),
            n => Err(VotingError::Conflict(format!(
                "{n} rounds are open, expected at most one"
            ))),
        }
    }

    async fn round_with_participants(
        &self,
        id: RoundId,
    ) -> Result<Option<RoundWithParticipants>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rounds
            .get(&id)
            .map(|round| Self::with_participants(&inner, round)))
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        if self.fail_vote_inserts.load(Ordering::SeqCst) {
            return Err(VotingError::Persistence(sqlx::Error::PoolClosed));
        }
        self.inner.lock().unwrap().votes.push(vote.clone());
        Ok(())
    }

    async fn votes_for_round(&self, id: RoundId) -> Result<Vec<Vote>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .votes
            .iter()
            .filter(|v| v.round_id == id)
            .cloned()
            .collect())
    }

    async fn result_rows(&self, id: RoundId) -> Result<Vec<ParticipantStanding>> {
        let inner = self.inner.lock().unwrap();
        let mut standings: Vec<ParticipantStanding> = inner
            .participants
            .iter()
            .filter(|(_, (_, assigned))| *assigned == Some(id))
            .map(|(participant_id, (name, _))| {
                let count = inner
                    .votes
                    .iter()
                    .filter(|v| v.round_id == id && v.participant_id == *participant_id)
                    .count() as i64;
                ParticipantStanding {
                    id: *participant_id,
                    name: name.clone(),
                    count,
                }
            })
            .collect();
        standings.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
        Ok(standings)
    }

    async fn total_votes(&self) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let total = inner
            .votes
            .iter()
            .filter(|v| inner.rounds.get(&v.round_id).is_some_and(|r| r.open))
            .count() as u64;
        Ok(total)
    }

    async fn total_distinct_voters(&self) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let mut voters: Vec<_> = inner
            .votes
            .iter()
            .filter(|v| inner.rounds.get(&v.round_id).is_some_and(|r| r.open))
            .map(|v| v.user_id)
            .collect();
        voters.sort();
        voters.dedup();
        Ok(voters.len() as u64)
    }

    async fn finish_round_and_detach_participants(
        &self,
        id: RoundId,
        participants: &[ParticipantId],
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let closed = match inner.rounds.get_mut(&id) {
            Some(round) if round.open => {
                round.finish();
                true
            }
            _ => false,
        };
        for participant in participants {
            if let Some((_, assigned)) = inner.participants.get_mut(participant) {
                *assigned = None;
            }
        }
        Ok(closed)
    }
}

#[async_trait]
impl ParticipantDirectory for InMemoryStore {
    async fn assign_round(&self, participant: ParticipantId, round: RoundId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.participants.get_mut(&participant) {
            Some((_, assigned)) => {
                *assigned = Some(round);
                Ok(())
            }
            None => Err(VotingError::NotFound(format!(
                "participant {participant} does not exist"
            ))),
        }
    }

    async fn assigned_round(&self, participant: ParticipantId) -> Result<Option<RoundId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .participants
            .get(&participant)
            .and_then(|(_, assigned)| *assigned))
    }

    async fn participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.participants.get(&id).map(|(name, _)| Participant {
            id,
            name: name.clone(),
        }))
    }
}
