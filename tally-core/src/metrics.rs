//! Counters and latency observations emitted by the pipeline.
//!
//! The pipeline only reports into a [`MetricsSink`]; it does not own the
//! export surface. [`VotingMetrics`] is the provided recorder: sharded maps
//! of plain counters plus fixed-bucket latency histograms, snapshotted on
//! demand by whatever serves the metrics endpoint.

use std::collections::BTreeMap;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

/// Upper bounds, in seconds, of the `voting_duration_seconds` buckets.
pub const LATENCY_BUCKETS: [f64; 6] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Where the pipeline reports counters and timings.
pub trait MetricsSink: Send + Sync {
    /// Counts one processed vote: bumps `votes_total{participant}` and
    /// `participant_votes_total{participant,origin}`.
    fn record_vote(&self, participant: &str, origin: &str);

    /// Bumps `voting_errors_total{error_type}`.
    fn record_error(&self, error_type: &str);

    /// Feeds one observation into `voting_duration_seconds{status}`.
    fn observe_duration(&self, status: &str, seconds: f64);
}

/// A running latency observation; call [`LatencyTimer::observe`] to record
/// the elapsed time.
pub struct LatencyTimer<'a> {
    sink: &'a dyn MetricsSink,
    status: &'static str,
    started: Instant,
}

impl std::fmt::Debug for LatencyTimer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyTimer")
            .field("status", &self.status)
            .field("started", &self.started)
            .finish()
    }
}

impl<'a> LatencyTimer<'a> {
    pub fn start(sink: &'a dyn MetricsSink, status: &'static str) -> Self {
        Self {
            sink,
            status,
            started: Instant::now(),
        }
    }

    pub fn observe(self) {
        self.sink
            .observe_duration(self.status, self.started.elapsed().as_secs_f64());
    }
}

#[derive(Debug, Default, Clone)]
struct HistogramCell {
    // Cumulative; the extra trailing slot is the unbounded bucket, so it
    // always equals `count`.
    bucket_counts: [u64; LATENCY_BUCKETS.len() + 1],
    count: u64,
    sum: f64,
}

impl HistogramCell {
    fn observe(&mut self, seconds: f64) {
        for (slot, bound) in self.bucket_counts.iter_mut().zip(LATENCY_BUCKETS) {
            if seconds <= bound {
                *slot += 1;
            }
        }
        self.bucket_counts[LATENCY_BUCKETS.len()] += 1;
        self.count += 1;
        self.sum += seconds;
    }
}

/// In-process metrics recorder.
#[derive(Debug, Default)]
pub struct VotingMetrics {
    votes_total: DashMap<String, u64>,
    participant_votes: DashMap<(String, String), u64>,
    voting_errors: DashMap<String, u64>,
    voting_duration: DashMap<String, HistogramCell>,
}

impl VotingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            votes_total: self
                .votes_total
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            participant_votes_total: {
                let mut rows: Vec<_> = self
                    .participant_votes
                    .iter()
                    .map(|e| ParticipantVotesRow {
                        participant: e.key().0.clone(),
                        origin: e.key().1.clone(),
                        total: *e.value(),
                    })
                    .collect();
                rows.sort_by(|a, b| {
                    (&a.participant, &a.origin).cmp(&(&b.participant, &b.origin))
                });
                rows
            },
            voting_errors_total: self
                .voting_errors
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            voting_duration_seconds: self
                .voting_duration
                .iter()
                .map(|e| {
                    let cell = e.value();
                    (
                        e.key().clone(),
                        HistogramSnapshot {
                            buckets: cell
                                .bucket_counts
                                .iter()
                                .enumerate()
                                .map(|(index, count)| BucketCount {
                                    le: LATENCY_BUCKETS
                                        .get(index)
                                        .map_or_else(|| "+Inf".to_string(), f64::to_string),
                                    count: *count,
                                })
                                .collect(),
                            count: cell.count,
                            sum: cell.sum,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl MetricsSink for VotingMetrics {
    fn record_vote(&self, participant: &str, origin: &str) {
        *self.votes_total.entry(participant.to_string()).or_insert(0) += 1;
        *self
            .participant_votes
            .entry((participant.to_string(), origin.to_string()))
            .or_insert(0) += 1;
    }

    fn record_error(&self, error_type: &str) {
        *self
            .voting_errors
            .entry(error_type.to_string())
            .or_insert(0) += 1;
    }

    fn observe_duration(&self, status: &str, seconds: f64) {
        self.voting_duration
            .entry(status.to_string())
            .or_default()
            .observe(seconds);
    }
}

/// Point-in-time view of the recorder, serialized by the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub votes_total: BTreeMap<String, u64>,
    pub participant_votes_total: Vec<ParticipantVotesRow>,
    pub voting_errors_total: BTreeMap<String, u64>,
    pub voting_duration_seconds: BTreeMap<String, HistogramSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantVotesRow {
    pub participant: String,
    pub origin: String,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<BucketCount>,
    pub count: u64,
    pub sum: f64,
}

/// One cumulative bucket; `le` is the upper bound, `"+Inf"` for the
/// unbounded bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub le: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_counters_accumulate_per_label() {
        let metrics = VotingMetrics::new();
        metrics.record_vote("alice", "processed");
        metrics.record_vote("alice", "processed");
        metrics.record_vote("bob", "processed");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.votes_total["alice"], 2);
        assert_eq!(snapshot.votes_total["bob"], 1);
        assert_eq!(snapshot.participant_votes_total.len(), 2);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let metrics = VotingMetrics::new();
        metrics.observe_duration("vote_processing", 0.05);
        metrics.observe_duration("vote_processing", 0.3);
        metrics.observe_duration("vote_processing", 10.0);

        let snapshot = metrics.snapshot();
        let histogram = &snapshot.voting_duration_seconds["vote_processing"];
        assert_eq!(histogram.count, 3);
        // 0.05 lands in every bucket, 0.3 from 0.5 upward, 10.0 only in the
        // unbounded bucket.
        assert_eq!(histogram.buckets[0].count, 1); // <= 0.1
        assert_eq!(histogram.buckets[2].count, 2); // <= 0.5
        assert_eq!(histogram.buckets[5].count, 2); // <= 5.0
        assert_eq!(histogram.buckets[6].count, 3); // +Inf
    }

    #[test]
    fn unbounded_bucket_reconciles_with_the_observation_count() {
        let metrics = VotingMetrics::new();
        metrics.observe_duration("vote_processing", 60.0);
        metrics.observe_duration("vote_processing", 0.2);

        let snapshot = metrics.snapshot();
        let histogram = &snapshot.voting_duration_seconds["vote_processing"];
        let last = histogram.buckets.last().unwrap();
        assert_eq!(last.le, "+Inf");
        assert_eq!(last.count, histogram.count);
        assert_eq!(histogram.buckets.len(), LATENCY_BUCKETS.len() + 1);
    }

    #[test]
    fn timer_records_into_the_status_series() {
        let metrics = VotingMetrics::new();
        LatencyTimer::start(&metrics, "vote_processing").observe();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.voting_duration_seconds["vote_processing"].count, 1);
    }

    #[test]
    fn errors_count_by_type() {
        let metrics = VotingMetrics::new();
        metrics.record_error("queue_publish_error");
        metrics.record_error("queue_publish_error");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.voting_errors_total["queue_publish_error"], 2);
    }
}
