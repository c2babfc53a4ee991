//! Strongly typed ids for rounds, votes, participants and voters.
//!
//! Each id wraps a UUID (v7, so ids sort roughly by creation time) and is
//! transparent on the wire and in the database.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, sqlx::Type,
        )]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id! {
    /// Identity of one elimination round.
    RoundId
}

entity_id! {
    /// Identity of one cast vote.
    VoteId
}

entity_id! {
    /// Identity of a nominated participant, owned by the roster collaborator.
    ParticipantId
}

entity_id! {
    /// Identity of an authenticated voter, owned by the identity collaborator.
    UserId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_display_and_parse() {
        let id = RoundId::new();
        let parsed: RoundId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn v7_ids_are_time_ordered() {
        let a = VoteId::new();
        let b = VoteId::new();
        assert!(a <= b);
    }
}
