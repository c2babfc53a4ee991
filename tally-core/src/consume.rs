//! The single background worker that drains the votes queue.

use std::sync::Arc;

use futures_util::StreamExt;
use tally_model::Vote;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metrics::{LatencyTimer, MetricsSink};
use crate::queue::VoteTransport;
use crate::store::RoundStore;

/// Dequeues vote facts and persists them. Exactly one consumer runs for the
/// lifetime of the process; it is the only writer of vote rows.
///
/// Deliveries are acknowledged by the transport at receipt, so a vote whose
/// insert fails is logged and counted but lost from the store's point of
/// view. On cancellation the worker stops taking messages without waiting
/// for in-flight persistence.
pub struct VoteConsumer {
    transport: Arc<dyn VoteTransport>,
    store: Arc<dyn RoundStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for VoteConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteConsumer").finish()
    }
}

impl VoteConsumer {
    pub fn new(
        transport: Arc<dyn VoteTransport>,
        store: Arc<dyn RoundStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            transport,
            store,
            metrics,
        }
    }

    /// Runs until `shutdown` fires or the delivery stream ends.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut deliveries = match self.transport.subscribe().await {
            Ok(stream) => stream,
            Err(error) => {
                self.metrics.record_error("queue_consume_error");
                return Err(error);
            }
        };
        info!("votes consumer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("stopping votes consumer");
                    break;
                }
                delivery = deliveries.next() => {
                    match delivery {
                        Some(body) => self.process(&body).await,
                        None => {
                            warn!("votes delivery stream closed");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn process(&self, body: &[u8]) {
        let timer = LatencyTimer::start(self.metrics.as_ref(), "vote_processing");

        let vote: Vote = match serde_json::from_slice(body) {
            Ok(vote) => vote,
            Err(error) => {
                // The delivery is already acknowledged; a malformed payload
                // is dropped, not requeued.
                warn!(%error, "discarding malformed vote payload");
                timer.observe();
                return;
            }
        };

        if let Err(error) = self.store.insert_vote(&vote).await {
            self.metrics.record_error("database_insert_error");
            error!(%error, vote_id = %vote.id, "failed to insert vote");
            timer.observe();
            return;
        }

        self.metrics
            .record_vote(&vote.participant_id.to_string(), "processed");
        timer.observe();
        info!(vote_id = %vote.id, "vote inserted");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tally_model::{ParticipantId, RoundId, UserId};

    use super::*;
    use crate::metrics::VotingMetrics;
    use crate::publish::VotePublisher;
    use crate::queue::memory::InMemoryTransport;
    use crate::store::memory::InMemoryStore;

    struct Pipeline {
        transport: Arc<InMemoryTransport>,
        store: Arc<InMemoryStore>,
        metrics: Arc<VotingMetrics>,
        publisher: VotePublisher,
        shutdown: CancellationToken,
        worker: tokio::task::JoinHandle<Result<()>>,
    }

    fn start_pipeline() -> Pipeline {
        let transport = Arc::new(InMemoryTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(VotingMetrics::new());
        let publisher = VotePublisher::new(transport.clone(), metrics.clone());
        let consumer = VoteConsumer::new(transport.clone(), store.clone(), metrics.clone());
        let shutdown = CancellationToken::new();
        let worker = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { consumer.run(shutdown).await })
        };
        Pipeline {
            transport,
            store,
            metrics,
            publisher,
            shutdown,
            worker,
        }
    }

    async fn wait_for_votes(store: &InMemoryStore, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.vote_count() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consumer did not persist the expected votes in time");
    }

    #[tokio::test]
    async fn published_vote_is_persisted_exactly_once_with_identity_intact() {
        let pipeline = start_pipeline();

        let round = RoundId::new();
        let user = UserId::new();
        let participant = ParticipantId::new();
        let published = pipeline
            .publisher
            .publish(round, user, participant)
            .await
            .unwrap();

        wait_for_votes(&pipeline.store, 1).await;
        let stored = pipeline.store.votes();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], published);

        let snapshot = pipeline.metrics.snapshot();
        assert_eq!(snapshot.votes_total[&participant.to_string()], 1);
        assert_eq!(snapshot.voting_duration_seconds["vote_processing"].count, 1);

        pipeline.shutdown.cancel();
        pipeline.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn insert_failure_is_counted_and_the_worker_keeps_draining() {
        let pipeline = start_pipeline();

        pipeline.store.fail_vote_inserts(true);
        pipeline
            .publisher
            .publish(RoundId::new(), UserId::new(), ParticipantId::new())
            .await
            .unwrap();

        // The failed vote is dropped, not retried; the next message must
        // still be processed.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let errors = pipeline.metrics.snapshot().voting_errors_total;
                if errors.get("database_insert_error").copied().unwrap_or(0) >= 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("insert failure was not recorded in time");
        pipeline.store.fail_vote_inserts(false);
        pipeline
            .publisher
            .publish(RoundId::new(), UserId::new(), ParticipantId::new())
            .await
            .unwrap();

        wait_for_votes(&pipeline.store, 1).await;
        assert_eq!(pipeline.store.vote_count(), 1);
        let snapshot = pipeline.metrics.snapshot();
        assert_eq!(snapshot.voting_errors_total["database_insert_error"], 1);

        pipeline.shutdown.cancel();
        pipeline.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_is_swallowed() {
        let pipeline = start_pipeline();

        pipeline
            .transport
            .publish("votes.submission.created", b"not json".to_vec())
            .await
            .unwrap();
        pipeline
            .publisher
            .publish(RoundId::new(), UserId::new(), ParticipantId::new())
            .await
            .unwrap();

        wait_for_votes(&pipeline.store, 1).await;
        assert_eq!(pipeline.store.vote_count(), 1);

        pipeline.shutdown.cancel();
        pipeline.worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let pipeline = start_pipeline();
        pipeline.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), pipeline.worker)
            .await
            .expect("worker did not stop on cancellation")
            .unwrap()
            .unwrap();
    }
}
