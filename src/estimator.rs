//! [`RttEstimator`] and [`PtimeEstimatorRtt`]: a windowed estimate of
//! per-destination processing time, answering "which destination is fastest
//! for this lambda?".
//!
//! Grounded on `original_source/Edge/ptimeestimatorrtt.h` /
//! `original_source/Edge/rttestimator.h` (named but not retrieved in full;
//! its contract is restated in `spec.md` §4.4 and followed here).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::request::{LambdaRequest, LambdaResponse};
use crate::{DispatchError, DispatchResult};

/// Bounded per-destination FIFO of `(value, insertion-timestamp)` samples.
///
/// Samples older than `stale_period` seconds are evicted before any read;
/// if fewer than `window_size` samples remain, the estimate is the
/// arithmetic mean of what remains; if none remain, the destination is
/// "unknown" (`estimate` returns `None`).
pub struct RttEstimator {
    window_size: usize,
    stale_period: f64,
    clock: Arc<dyn Clock>,
    samples: Mutex<HashMap<String, VecDeque<(f64, f64)>>>,
}

impl RttEstimator {
    pub const DEFAULT_WINDOW_SIZE: usize = 50;
    pub const DEFAULT_STALE_PERIOD: f64 = 10.0;

    pub fn new(window_size: usize, stale_period: f64) -> Self {
        Self::with_clock(window_size, stale_period, Arc::new(SystemClock))
    }

    pub fn with_clock(window_size: usize, stale_period: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            window_size,
            stale_period,
            clock,
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Push a sample for `destination`, evicting the oldest if the window
    /// would exceed `window_size`.
    pub fn add(&self, destination: &str, value: f64) {
        let now = self.clock.now();
        let mut samples = self.samples.lock();
        let deque = samples.entry(destination.to_string()).or_default();
        deque.push_back((value, now));
        while deque.len() > self.window_size {
            deque.pop_front();
        }
    }

    /// The current arithmetic mean for `destination`, or `None` if no
    /// fresh sample remains.
    pub fn estimate(&self, destination: &str) -> Option<f64> {
        let now = self.clock.now();
        let mut samples = self.samples.lock();
        let deque = samples.get_mut(destination)?;
        deque.retain(|(_, ts)| now - *ts <= self.stale_period);
        if deque.is_empty() {
            None
        } else {
            Some(deque.iter().map(|(v, _)| v).sum::<f64>() / deque.len() as f64)
        }
    }
}

/// Wraps an [`RttEstimator`] to answer "fastest destination for this
/// lambda?", tracking which destinations are registered per lambda
/// separately from the RTT samples themselves (the RTT window is keyed
/// purely by destination, since the same edge computer can serve more than
/// one lambda).
pub struct PtimeEstimatorRtt {
    rtt: RttEstimator,
    destinations: Mutex<HashMap<String, Vec<String>>>,
}

impl PtimeEstimatorRtt {
    pub fn new(window_size: usize, stale_period: f64) -> Self {
        Self {
            rtt: RttEstimator::new(window_size, stale_period),
            destinations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(window_size: usize, stale_period: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            rtt: RttEstimator::with_clock(window_size, stale_period, clock),
            destinations: Mutex::new(HashMap::new()),
        }
    }

    /// Track that `destination` can serve `lambda`. Mirrors the original's
    /// `privateAdd` hook, called whenever the forwarding table gains a
    /// destination for a least-queue-policy lambda.
    pub fn register_destination(&self, lambda: &str, destination: &str) {
        let mut destinations = self.destinations.lock();
        let dests = destinations.entry(lambda.to_string()).or_default();
        if !dests.iter().any(|d| d == destination) {
            dests.push(destination.to_string());
        }
    }

    /// Mirrors the original's `privateRemove` hook.
    pub fn remove_destination(&self, lambda: &str, destination: &str) {
        let mut destinations = self.destinations.lock();
        if let Some(dests) = destinations.get_mut(lambda) {
            dests.retain(|d| d != destination);
            if dests.is_empty() {
                destinations.remove(lambda);
            }
        }
    }

    /// The destination with the smallest current estimate for
    /// `req.lambda_name`. Fails with `NoDestinations` if the lambda has no
    /// registered destinations, or none currently have samples.
    pub fn select(&self, req: &LambdaRequest) -> DispatchResult<String> {
        let destinations = self.destinations.lock();
        let dests = destinations
            .get(&req.lambda_name)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| DispatchError::NoDestinations(req.lambda_name.clone()))?;

        let mut best: Option<(String, f64)> = None;
        for dest in dests {
            if let Some(estimate) = self.rtt.estimate(dest) {
                if best.as_ref().map_or(true, |(_, b)| estimate < *b) {
                    best = Some((dest.clone(), estimate));
                }
            }
        }
        best.map(|(dest, _)| dest)
            .ok_or_else(|| DispatchError::NoDestinations(req.lambda_name.clone()))
    }

    /// Compute the RTT as the overall execution time minus the processing
    /// time the destination reported in `response`, clamp to `>= 0`, and
    /// feed it to the RTT estimator.
    pub fn process_success(
        &self,
        _req: &LambdaRequest,
        destination: &str,
        response: &LambdaResponse,
        elapsed_seconds: f64,
    ) {
        let rtt = (elapsed_seconds - response.processing_time_seconds).max(0.0);
        self.rtt.add(destination, rtt);
    }
}
