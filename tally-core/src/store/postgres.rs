//! Postgres implementations of the storage collaborators.
//!
//! Every call runs as its own bounded unit of work with a fixed short
//! timeout; `finish_round_and_detach_participants` is the one
//! multi-statement mutation and runs in a single transaction.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tally_model::{
    Participant, ParticipantId, ParticipantStanding, Round, RoundId, RoundWithParticipants, Vote,
};

use crate::error::{Result, VotingError};
use crate::store::{ParticipantDirectory, RoundStore};

const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(2);

async fn bounded<T, F>(op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(STORE_CALL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(VotingError::StoreTimeout(op)),
    }
}

/// A round row joined with a JSON aggregate of its participants.
#[derive(sqlx::FromRow)]
struct RoundParticipantsRow {
    #[sqlx(flatten)]
    round: Round,
    participants: Json<Vec<Participant>>,
}

impl From<RoundParticipantsRow> for RoundWithParticipants {
    fn from(row: RoundParticipantsRow) -> Self {
        Self {
            round: row.round,
            participants: row.participants.0,
        }
    }
}

const ROUND_WITH_PARTICIPANTS_SELECT: &str = r#"
    SELECT
        e.id,
        e.open,
        e.start_date,
        e.end_date,
        e.created,
        e.updated,
        COALESCE(
            json_agg(
                json_build_object('id', p.id, 'name', p.name)
            ) FILTER (WHERE p.id IS NOT NULL),
            '[]'::json
        ) AS participants
    FROM
        eliminations e
        LEFT JOIN participants p ON p.elimination_id = e.id
"#;

#[derive(Debug, Clone)]
pub struct PostgresRoundStore {
    pool: PgPool,
}

impl PostgresRoundStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoundStore for PostgresRoundStore {
    async fn insert_round(&self, round: &Round) -> Result<()> {
        bounded("insert_round", async {
            sqlx::query(
                r#"
                INSERT INTO eliminations (id, open, start_date, end_date, created, updated)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(round.id)
            .bind(round.open)
            .bind(round.start_date)
            .bind(round.end_date)
            .bind(round.created)
            .bind(round.updated)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn round(&self, id: RoundId) -> Result<Option<Round>> {
        bounded("round", async {
            let round = sqlx::query_as::<_, Round>("SELECT * FROM eliminations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(round)
        })
        .await
    }

    async fn all_rounds(&self) -> Result<Vec<RoundWithParticipants>> {
        bounded("all_rounds", async {
            let query = format!(
                "{ROUND_WITH_PARTICIPANTS_SELECT} GROUP BY e.id ORDER BY e.created DESC"
            );
            let rows = sqlx::query_as::<_, RoundParticipantsRow>(&query)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn open_rounds(&self) -> Result<Vec<RoundWithParticipants>> {
        bounded("open_rounds", async {
            let query = format!(
                "{ROUND_WITH_PARTICIPANTS_SELECT} WHERE e.open = true GROUP BY e.id ORDER BY e.created DESC"
            );
            let rows = sqlx::query_as::<_, RoundParticipantsRow>(&query)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn unique_open_round(&self) -> Result<Option<Round>> {
        bounded("unique_open_round", async {
            let open = sqlx::query_as::<_, Round>("SELECT * FROM eliminations WHERE open = true")
                .fetch_all(&self.pool)
                .await?;
            match open.len() {
                0 | 1 => Ok(open.into_iter().next()),
                n => Err(VotingError::Conflict(format!(
                    "{n} rounds are open, expected at most one"
                ))),
            }
        })
        .await
    }

    async fn round_with_participants(
        &self,
        id: RoundId,
    ) -> Result<Option<RoundWithParticipants>> {
        bounded("round_with_participants", async {
            let query = format!("{ROUND_WITH_PARTICIPANTS_SELECT} WHERE e.id = $1 GROUP BY e.id");
            let row = sqlx::query_as::<_, RoundParticipantsRow>(&query)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(Into::into))
        })
        .await
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        bounded("insert_vote", async {
            sqlx::query(
                r#"
                INSERT INTO votes (id, user_id, participant_id, elimination_id, created)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(vote.id)
            .bind(vote.user_id)
            .bind(vote.participant_id)
            .bind(vote.round_id)
            .bind(vote.created)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn votes_for_round(&self, id: RoundId) -> Result<Vec<Vote>> {
        bounded("votes_for_round", async {
            let votes =
                sqlx::query_as::<_, Vote>("SELECT * FROM votes WHERE elimination_id = $1")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(votes)
        })
        .await
    }

    async fn result_rows(&self, id: RoundId) -> Result<Vec<ParticipantStanding>> {
        bounded("result_rows", async {
            let standings = sqlx::query_as::<_, ParticipantStanding>(
                r#"
                SELECT
                    p.id AS id,
                    p.name AS name,
                    COUNT(v.id) AS count
                FROM participants p
                LEFT JOIN votes v ON p.id = v.participant_id AND v.elimination_id = $1
                WHERE p.elimination_id = $1
                GROUP BY p.id, p.name
                ORDER BY COUNT(v.id) DESC, p.id ASC
                "#,
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
            Ok(standings)
        })
        .await
    }

    async fn total_votes(&self) -> Result<u64> {
        bounded("total_votes", async {
            let total = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(v.id)
                FROM votes v
                LEFT JOIN eliminations e ON e.id = v.elimination_id
                WHERE e.open = true
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(total as u64)
        })
        .await
    }

    async fn total_distinct_voters(&self) -> Result<u64> {
        bounded("total_distinct_voters", async {
            let total = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(DISTINCT v.user_id)
                FROM votes v
                LEFT JOIN eliminations e ON e.id = v.elimination_id
                WHERE e.open = true
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(total as u64)
        })
        .await
    }

    async fn finish_round_and_detach_participants(
        &self,
        id: RoundId,
        participants: &[ParticipantId],
    ) -> Result<bool> {
        bounded("finish_round_and_detach_participants", async {
            let mut tx = self.pool.begin().await?;

            let closed = sqlx::query(
                r#"
                UPDATE eliminations SET
                    open = false,
                    updated = now()
                WHERE id = $1 AND open = true
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;

            for participant in participants {
                sqlx::query(
                    r#"
                    UPDATE participants SET
                        elimination_id = NULL,
                        updated = now()
                    WHERE id = $1
                    "#,
                )
                .bind(*participant)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(closed.rows_affected() > 0)
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub struct PostgresParticipantDirectory {
    pool: PgPool,
}

impl PostgresParticipantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantDirectory for PostgresParticipantDirectory {
    async fn assign_round(&self, participant: ParticipantId, round: RoundId) -> Result<()> {
        bounded("assign_round", async {
            let updated = sqlx::query(
                r#"
                UPDATE participants SET
                    elimination_id = $2,
                    updated = now()
                WHERE id = $1
                "#,
            )
            .bind(participant)
            .bind(round)
            .execute(&self.pool)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(VotingError::NotFound(format!(
                    "participant {participant} does not exist"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn assigned_round(&self, participant: ParticipantId) -> Result<Option<RoundId>> {
        bounded("assigned_round", async {
            let round = sqlx::query_scalar::<_, Option<RoundId>>(
                "SELECT elimination_id FROM participants WHERE id = $1",
            )
            .bind(participant)
            .fetch_optional(&self.pool)
            .await?;
            Ok(round.flatten())
        })
        .await
    }

    async fn participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        bounded("participant", async {
            let participant = sqlx::query_as::<_, Participant>(
                "SELECT id, name FROM participants WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(participant)
        })
        .await
    }
}
