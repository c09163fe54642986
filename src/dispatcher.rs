//! [`Dispatcher`]: glues the forwarding table, optimizer and estimator to a
//! fixed-size worker pool that forwards requests through a [`Transport`].
//!
//! Grounded on `original_source/Edge/edgeserver.h`'s `EdgeServer`: a gRPC
//! `ServerCompletionQueue` drained by a fixed `std::thread` pool. This crate
//! has no gRPC binding, so `crossbeam_channel` stands in for the completion
//! queue and `std::thread::spawn` for the pool. The core stays synchronous
//! end to end, with no cooperative suspension points, matching `spec.md` §5.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::estimator::PtimeEstimatorRtt;
use crate::forwarding_table::ForwardingTable;
use crate::optimizer::LocalOptimizer;
use crate::request::{LambdaRequest, LambdaResponse};
use crate::{DispatchError, DispatchResult};

/// How a [`Dispatcher`] actually reaches a destination. Transport binding
/// (gRPC/QUIC/HTTP) is out of scope; callers supply a test double or their
/// own implementation.
pub trait Transport: Send + Sync {
    fn send(&self, destination: &str, request: &LambdaRequest) -> DispatchResult<LambdaResponse>;
}

struct Job {
    request: LambdaRequest,
    reply_tx: Sender<DispatchResult<LambdaResponse>>,
}

/// Routes a [`LambdaRequest`] to a destination, forwards it, and feeds the
/// observed latency back into the optimizer (and, if active, the estimator).
pub struct Dispatcher {
    table: Arc<ForwardingTable>,
    estimator: Option<Arc<PtimeEstimatorRtt>>,
    job_tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

/// Worker-local state shared (read-only, `Arc`-wrapped) across the pool.
struct Worker {
    table: Arc<ForwardingTable>,
    optimizer: Arc<LocalOptimizer>,
    estimator: Option<Arc<PtimeEstimatorRtt>>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Default worker-pool size when the caller has no particular reason to
    /// pick another, matching the original's default completion-queue thread
    /// count of `4`.
    pub const DEFAULT_POOL_SIZE: usize = 4;

    pub fn new(
        pool_size: usize,
        table: Arc<ForwardingTable>,
        optimizer: Arc<LocalOptimizer>,
        estimator: Option<Arc<PtimeEstimatorRtt>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_clock(pool_size, table, optimizer, estimator, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool_size: usize,
        table: Arc<ForwardingTable>,
        optimizer: Arc<LocalOptimizer>,
        estimator: Option<Arc<PtimeEstimatorRtt>>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pool_size = pool_size.max(1);
        let (job_tx, job_rx) = bounded::<Job>(pool_size * 16);

        let workers = (0..pool_size)
            .map(|id| {
                let job_rx = job_rx.clone();
                let worker = Worker {
                    table: table.clone(),
                    optimizer: optimizer.clone(),
                    estimator: estimator.clone(),
                    transport: transport.clone(),
                    clock: clock.clone(),
                };
                std::thread::Builder::new()
                    .name(format!("edge-dispatch-worker-{id}"))
                    .spawn(move || worker.run(job_rx))
                    .expect("failed to spawn dispatcher worker thread")
            })
            .collect();

        info!(pool_size, "dispatcher worker pool started");
        Self { table, estimator, job_tx, workers }
    }

    /// Add or update a forwarding destination, keeping the estimator's
    /// per-lambda destination registry (if active) in sync. Only final
    /// destinations are registered with the estimator, matching
    /// `DESIGN.md`'s Open Question (b) decision that a dispatcher routes
    /// only to final destinations.
    pub fn change(&self, lambda: &str, destination: &str, weight: f64, is_final: bool) -> DispatchResult<()> {
        self.table.change(lambda, destination, weight, is_final)?;
        if is_final {
            if let Some(estimator) = &self.estimator {
                estimator.register_destination(lambda, destination);
            }
        }
        Ok(())
    }

    /// Remove a forwarding destination. Hard error if absent, per
    /// [`ForwardingTable::remove`]. Also drops the destination from the
    /// estimator's registry (if active).
    pub fn remove(&self, lambda: &str, destination: &str) -> DispatchResult<()> {
        self.table.remove(lambda, destination)?;
        if let Some(estimator) = &self.estimator {
            estimator.remove_destination(lambda, destination);
        }
        Ok(())
    }

    pub fn table(&self) -> &ForwardingTable {
        &self.table
    }

    /// Submit `request` to the worker pool and block until it completes.
    /// Mirrors the original completion-queue model: the caller's thread
    /// blocks on the reply channel exactly as a gRPC call handler blocked on
    /// `cq.Next()`.
    pub fn process(&self, request: LambdaRequest) -> DispatchResult<LambdaResponse> {
        let (reply_tx, reply_rx) = bounded(1);
        self.job_tx
            .send(Job { request, reply_tx })
            .expect("dispatcher worker pool has shut down");
        reply_rx
            .recv()
            .expect("dispatcher worker dropped the reply channel without replying")
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Dropping the last `Sender` closes the channel; each worker's
        // `recv()` then returns `Err` and the loop exits.
        let (closed_tx, _) = bounded::<Job>(0);
        self.job_tx = closed_tx;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Worker {
    fn run(self, job_rx: Receiver<Job>) {
        while let Ok(job) = job_rx.recv() {
            let result = self.process_one(&job.request);
            let _ = job.reply_tx.send(result);
        }
    }

    fn process_one(&self, request: &LambdaRequest) -> DispatchResult<LambdaResponse> {
        let destination = self.select_destination(request)?;

        let start = self.clock.now();
        let response = self.transport.send(&destination, request);
        let elapsed = self.clock.now() - start;

        match response {
            Ok(response) => {
                if let Err(e) = self.optimizer.observe(&self.table, request, &destination, elapsed) {
                    warn!(lambda = %request.lambda_name, destination, error = %e, "optimizer observation failed");
                }
                if let Some(estimator) = &self.estimator {
                    estimator.process_success(request, &destination, &response, elapsed);
                }
                Ok(response)
            }
            Err(e) => {
                error!(lambda = %request.lambda_name, destination, error = %e, "transport send failed");
                Err(DispatchError::DestinationUnreachable(destination))
            }
        }
    }

    fn select_destination(&self, request: &LambdaRequest) -> DispatchResult<String> {
        match &self.estimator {
            Some(estimator) => estimator.select(request),
            None => self.table.lookup(&request.lambda_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entry::SelectionPolicyKind;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// An in-memory transport test double: fixed per-destination processing
    /// times, with an optional set of destinations that always fail.
    struct FakeTransport {
        processing_times: HashMap<&'static str, f64>,
        unreachable: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(processing_times: HashMap<&'static str, f64>) -> Self {
            Self { processing_times, unreachable: Vec::new(), calls: Mutex::new(Vec::new()) }
        }

        fn with_unreachable(mut self, destination: &'static str) -> Self {
            self.unreachable.push(destination);
            self
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, destination: &str, _request: &LambdaRequest) -> DispatchResult<LambdaResponse> {
            self.calls.lock().push(destination.to_string());
            if self.unreachable.iter().any(|d| *d == destination) {
                return Err(DispatchError::DestinationUnreachable(destination.to_string()));
            }
            let processing_time = *self.processing_times.get(destination).unwrap_or(&0.0);
            Ok(LambdaResponse::ok(destination, processing_time))
        }
    }

    #[test]
    fn process_routes_and_returns_the_transport_response() {
        let table = Arc::new(ForwardingTable::new(SelectionPolicyKind::RoundRobin));
        table.change("f", "A", 1.0, true).unwrap();
        let optimizer = Arc::new(LocalOptimizer::new(0.5));
        let transport = Arc::new(FakeTransport::new(HashMap::from([("A", 0.01)])));

        let dispatcher = Dispatcher::new(2, table, optimizer, None, transport);
        let response = dispatcher.process(LambdaRequest::new("f", vec![], vec![])).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.responder_endpoint, "A");
    }

    #[test]
    fn unreachable_destination_surfaces_as_an_error_and_does_not_feed_the_optimizer() {
        let clock = Arc::new(ManualClock::new(0.0));
        let table = Arc::new(ForwardingTable::new(SelectionPolicyKind::RoundRobin));
        table.change("f", "A", 1.0, true).unwrap();
        let optimizer = Arc::new(LocalOptimizer::with_clock(0.5, 5.0, clock.clone()));
        let transport = Arc::new(FakeTransport::new(HashMap::new()).with_unreachable("A"));

        let dispatcher =
            Dispatcher::with_clock(1, table.clone(), optimizer, None, transport, clock);
        let err = dispatcher.process(LambdaRequest::new("f", vec![], vec![])).unwrap_err();
        assert_eq!(err, DispatchError::DestinationUnreachable("A".to_string()));
        // Weight is unchanged: the only destination still has its original weight.
        assert_eq!(table.snapshot()["f"]["A"].0, 1.0);
    }

    #[test]
    fn estimator_backed_selection_requires_a_prior_sample() {
        let clock = Arc::new(ManualClock::new(0.0));
        let table = Arc::new(ForwardingTable::new(SelectionPolicyKind::LeastQueue));
        let optimizer = Arc::new(LocalOptimizer::with_clock(0.5, 5.0, clock.clone()));
        let estimator = Arc::new(PtimeEstimatorRtt::with_clock(3, 10.0, clock.clone()));
        let transport = Arc::new(FakeTransport::new(HashMap::from([("X", 0.0)])));

        let dispatcher =
            Dispatcher::with_clock(1, table, optimizer, Some(estimator.clone()), transport, clock);
        // Goes through the public API so both the table and the estimator's
        // destination registry end up in sync, the same way an admin `Change`
        // does via `AdminHandler`.
        dispatcher.change("f", "X", 1.0, true).unwrap();

        // Registered but never sampled: the estimator has no estimate yet.
        let err = dispatcher.process(LambdaRequest::new("f", vec![], vec![])).unwrap_err();
        assert_eq!(err, DispatchError::NoDestinations("f".to_string()));

        // Seed a sample directly, then dispatch picks it up.
        estimator.process_success(
            &LambdaRequest::new("f", vec![], vec![]),
            "X",
            &LambdaResponse::ok("X", 0.0),
            0.01,
        );
        let response = dispatcher.process(LambdaRequest::new("f", vec![], vec![])).unwrap();
        assert_eq!(response.responder_endpoint, "X");
    }

    #[test]
    fn remove_deregisters_the_destination_from_an_active_estimator() {
        let clock = Arc::new(ManualClock::new(0.0));
        let table = Arc::new(ForwardingTable::new(SelectionPolicyKind::LeastQueue));
        let optimizer = Arc::new(LocalOptimizer::with_clock(0.5, 5.0, clock.clone()));
        let estimator = Arc::new(PtimeEstimatorRtt::with_clock(3, 10.0, clock.clone()));
        let transport = Arc::new(FakeTransport::new(HashMap::from([("X", 0.0)])));
        let dispatcher =
            Dispatcher::with_clock(1, table, optimizer, Some(estimator), transport, clock);

        dispatcher.change("f", "X", 1.0, true).unwrap();
        dispatcher.remove("f", "X").unwrap();

        let err = dispatcher.process(LambdaRequest::new("f", vec![], vec![])).unwrap_err();
        assert_eq!(err, DispatchError::NoDestinations("f".to_string()));
    }

    #[test]
    fn pool_processes_many_requests_concurrently() {
        let table = Arc::new(ForwardingTable::new(SelectionPolicyKind::RoundRobin));
        table.change("f", "A", 1.0, true).unwrap();
        let optimizer = Arc::new(LocalOptimizer::new(0.5));
        let transport = Arc::new(FakeTransport::new(HashMap::from([("A", 0.0)])));
        let dispatcher = Dispatcher::new(4, table, optimizer, None, transport);

        for _ in 0..50 {
            assert!(dispatcher.process(LambdaRequest::new("f", vec![], vec![])).is_ok());
        }
    }
}
