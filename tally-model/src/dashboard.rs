//! Derived read models: per-participant standings and the dashboard
//! snapshot for the currently open round. Neither is stored; both are
//! recomputed on read from the raw vote rows.

use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;

/// A participant paired with their vote count for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParticipantStanding {
    pub id: ParticipantId,
    pub name: String,
    pub count: i64,
}

/// Aggregate statistics for the single currently open round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_votes: u64,
    pub total_users: u64,
    pub votes_per_hour: f64,
    /// Histogram of vote timestamps by hour of day (index 0 = 00:00-00:59).
    pub spread_votes: [u64; 24],
    pub has_round: bool,
}

/// Global-round average, one decimal place: `round(total / 24 * 10) / 10`.
/// This is deliberately not a time-windowed rate.
pub fn votes_per_hour(total_votes: u64) -> f64 {
    (total_votes as f64 / 24.0 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_per_hour_rounds_to_one_decimal() {
        assert_eq!(votes_per_hour(100), 4.2);
        assert_eq!(votes_per_hour(0), 0.0);
        assert_eq!(votes_per_hour(24), 1.0);
        assert_eq!(votes_per_hour(25), 1.0);
        assert_eq!(votes_per_hour(36), 1.5);
    }
}
