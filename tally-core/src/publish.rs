//! Request-path side of the vote pipeline.

use std::sync::Arc;

use tally_model::{ParticipantId, RoundId, UserId, Vote};
use tracing::debug;

use crate::error::Result;
use crate::metrics::MetricsSink;
use crate::queue::{VoteTransport, VOTES_CREATED_KEY};

/// Serializes vote facts and hands them to the queue transport.
///
/// The publisher applies no business rules. Success means the transport
/// accepted the publish; the vote is durably stored only after the consumer
/// gets to it, and no ordering is promised between the two.
pub struct VotePublisher {
    transport: Arc<dyn VoteTransport>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for VotePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotePublisher").finish()
    }
}

impl VotePublisher {
    pub fn new(transport: Arc<dyn VoteTransport>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { transport, metrics }
    }

    /// Builds a vote fact with a fresh id and the current server time and
    /// enqueues it. A rejected publish is surfaced as a retryable transport
    /// error; in that case no vote is recorded anywhere.
    pub async fn publish(
        &self,
        round_id: RoundId,
        user_id: UserId,
        participant_id: ParticipantId,
    ) -> Result<Vote> {
        let vote = Vote::cast(round_id, user_id, participant_id);
        let payload = serde_json::to_vec(&vote)?;

        if let Err(error) = self.transport.publish(VOTES_CREATED_KEY, payload).await {
            self.metrics.record_error(error.metric_label());
            return Err(error);
        }

        debug!(vote_id = %vote.id, round_id = %round_id, "vote enqueued");
        Ok(vote)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_util::StreamExt;

    use super::*;
    use crate::error::VotingError;
    use crate::metrics::VotingMetrics;
    use crate::queue::memory::InMemoryTransport;
    use crate::queue::DeliveryStream;

    struct RejectingTransport;

    #[async_trait]
    impl VoteTransport for RejectingTransport {
        async fn publish(&self, _routing_key: &str, _payload: Vec<u8>) -> Result<()> {
            Err(VotingError::Transport(lapin::Error::ChannelsLimitReached))
        }

        async fn subscribe(&self) -> Result<DeliveryStream> {
            unimplemented!("publish-only fake")
        }
    }

    #[tokio::test]
    async fn published_vote_reaches_the_queue_intact() {
        let transport = Arc::new(InMemoryTransport::new());
        let metrics = Arc::new(VotingMetrics::new());
        let publisher = VotePublisher::new(transport.clone(), metrics);

        let round = RoundId::new();
        let user = UserId::new();
        let participant = ParticipantId::new();
        let vote = publisher.publish(round, user, participant).await.unwrap();

        let mut deliveries = transport.subscribe().await.unwrap();
        let body = deliveries.next().await.unwrap();
        let delivered: Vote = serde_json::from_slice(&body).unwrap();
        assert_eq!(delivered, vote);
        assert_eq!(delivered.round_id, round);
        assert_eq!(delivered.participant_id, participant);
    }

    #[tokio::test]
    async fn rejected_publish_surfaces_error_and_counts_it() {
        let metrics = Arc::new(VotingMetrics::new());
        let publisher = VotePublisher::new(Arc::new(RejectingTransport), metrics.clone());

        let result = publisher
            .publish(RoundId::new(), UserId::new(), ParticipantId::new())
            .await;
        assert!(matches!(result, Err(VotingError::Transport(_))));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.voting_errors_total["queue_publish_error"], 1);
    }
}
