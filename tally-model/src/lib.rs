//! Shared data models for the tally elimination-voting platform.
//!
//! Everything in this crate is plain data: strongly typed ids, the
//! [`Round`] entity with its open/closed lifecycle, the immutable [`Vote`]
//! fact and its JSON wire format, and the derived read models served by the
//! aggregation queries.

pub mod dashboard;
pub mod ids;
pub mod round;
pub mod vote;

pub use dashboard::{Dashboard, ParticipantStanding};
pub use ids::{ParticipantId, RoundId, UserId, VoteId};
pub use round::{
    default_round_duration, Participant, Round, RoundWithParticipants,
    DEFAULT_ROUND_DURATION_HOURS,
};
pub use vote::Vote;
