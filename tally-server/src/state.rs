use std::sync::Arc;

use tally_core::{RoundService, VotingMetrics};

/// Shared handles for request handlers. Stateless service objects injected
/// once at startup; no global mutable instances.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RoundService>,
    pub metrics: Arc<VotingMetrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish()
    }
}
