//! [`LocalOptimizer`]: turns observed request latencies into forwarding-table
//! weight updates via exponentially-weighted smoothing with staleness
//! eviction.
//!
//! Grounded on `original_source/Edge/localoptimizerasync.h`
//! (`LocalOptimizerAsync`): an *asynchronous* optimizer applies each
//! observation immediately rather than batching until an admin trigger.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::forwarding_table::ForwardingTable;
use crate::request::LambdaRequest;
use crate::DispatchResult;

/// `ŵ(t)` for one (lambda, destination) pair: the last smoothed weight and
/// when it was last updated.
#[derive(Debug, Clone, Copy)]
struct Smoothed {
    weight: f64,
    timestamp: f64,
}

/// Exponentially-weighted latency smoother that writes updated weights
/// through to a [`ForwardingTable`].
///
/// `ŵ' = α·latency + (1−α)·ŵ`, or `ŵ' = latency` if there is no prior state
/// or the prior state is older than `stale_period` seconds.
pub struct LocalOptimizer {
    alpha: f64,
    stale_period: f64,
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<String, HashMap<String, Smoothed>>>,
}

impl LocalOptimizer {
    /// Default staleness horizon per `spec.md` §4.3 / the original's
    /// `stalePeriod() = 5` seconds.
    pub const DEFAULT_STALE_PERIOD: f64 = 5.0;

    pub fn new(alpha: f64) -> Self {
        Self::with_clock(alpha, Self::DEFAULT_STALE_PERIOD, Arc::new(SystemClock))
    }

    pub fn with_clock(alpha: f64, stale_period: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            alpha,
            stale_period,
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Update the smoothed weight for `(req.lambda_name, destination)` and
    /// write it through to `table`. A stale-observation drop (the referenced
    /// lambda/destination no longer present in `table`) is not an error.
    pub fn observe(
        &self,
        table: &ForwardingTable,
        req: &LambdaRequest,
        destination: &str,
        latency_seconds: f64,
    ) -> DispatchResult<()> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let per_lambda = state
            .entry(req.lambda_name.clone())
            .or_insert_with(HashMap::new);

        let prior = per_lambda.get(destination).copied();
        let is_stale = prior.map_or(true, |p| now - p.timestamp > self.stale_period);

        let old_weight = if is_stale { latency_seconds } else { prior.unwrap().weight };
        let new_weight = if is_stale {
            latency_seconds
        } else {
            self.alpha * latency_seconds + (1.0 - self.alpha) * prior.unwrap().weight
        };

        per_lambda.insert(
            destination.to_string(),
            Smoothed {
                weight: new_weight,
                timestamp: now,
            },
        );
        drop(state);

        debug!(
            lambda = %req.lambda_name,
            destination,
            latency_seconds,
            new_weight,
            "optimizer observation applied"
        );
        table.update_weight(&req.lambda_name, destination, old_weight, new_weight)
    }

    /// Current smoothed weight, for tests/introspection.
    #[cfg(test)]
    fn current_weight(&self, lambda: &str, destination: &str) -> Option<f64> {
        self.state
            .lock()
            .get(lambda)
            .and_then(|m| m.get(destination))
            .map(|s| s.weight)
    }
}
