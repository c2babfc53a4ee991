//! HTTP surface for the tally elimination-voting platform.
//!
//! The server is built on Axum and wires together:
//! - PostgreSQL for rounds, participants and votes (sqlx)
//! - RabbitMQ for the vote-ingestion queue (lapin)
//! - the single background vote consumer
//!
//! Caller identity is consumed as already verified: token issuance and
//! verification live in an upstream collaborator, and the voter id reaches
//! this layer as a trusted header.

pub mod config;
pub mod errors;
pub mod routes;
pub mod state;
