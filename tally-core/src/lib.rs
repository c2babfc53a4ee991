//! Core of the tally elimination-voting platform.
//!
//! This crate owns the round lifecycle and the vote-ingestion pipeline:
//!
//! - [`service::RoundService`] enforces the single-open-round invariant and
//!   answers the aggregation queries (standings, dashboard).
//! - [`publish::VotePublisher`] serializes a vote fact and hands it to the
//!   queue transport from inside the request path.
//! - [`consume::VoteConsumer`] is the single background worker that drains
//!   the queue and persists votes; it is the only writer of vote rows.
//! - [`store`] holds the durable-storage collaborator traits and their
//!   Postgres implementations.
//! - [`queue`] holds the AMQP transport behind the [`queue::VoteTransport`]
//!   seam.
//! - [`metrics`] is the counters/latency sink the pipeline reports into.

pub mod consume;
pub mod error;
pub mod metrics;
pub mod publish;
pub mod queue;
pub mod service;
pub mod store;

pub use error::{Result, VotingError};
pub use metrics::{MetricsSink, VotingMetrics};
pub use service::RoundService;
