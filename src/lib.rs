//! Edge dispatch core.
//!
//! A serverless edge-computing dispatcher routes short-lived lambda
//! invocations to one of several edge computers. This crate implements the
//! dispatch core: the forwarding table, the per-lambda selection policies,
//! the local optimizer that turns observed latencies into weight updates,
//! and the processing-time estimator that can answer "which destination is
//! fastest for this lambda?".
//!
//! Transport, authentication, persistence and cross-dispatcher consistency
//! are explicitly out of scope; the core only needs a `Transport`
//! implementation to bind to (see [`dispatcher::Transport`]).

pub mod admin;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod element;
pub mod entry;
pub mod estimator;
pub mod forwarding_table;
pub mod optimizer;
pub mod request;

pub use admin::{AdminHandler, AdminReply, AdminRequest};
pub use clock::{Clock, SystemClock};
pub use config::{EstimatorConfig, OptimizerConfig, RouterConfig};
pub use dispatcher::{Dispatcher, Transport};
pub use element::Element;
pub use entry::{Entry, SelectionPolicyKind};
pub use estimator::{PtimeEstimatorRtt, RttEstimator};
pub use forwarding_table::ForwardingTable;
pub use optimizer::LocalOptimizer;
pub use request::{LambdaRequest, LambdaResponse};

/// Errors surfaced by the dispatch core.
///
/// `StaleObservation` is never returned to a caller: a stale or
/// no-longer-present observation is dropped silently per the optimizer's
/// contract. The variant is kept so a caller instrumenting the core
/// (e.g. in tests) can name the outcome it saw in a trace.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("no destinations available for lambda '{0}'")]
    NoDestinations(String),

    #[error("destination '{destination}' not found for lambda '{lambda}'")]
    DestinationNotFound { lambda: String, destination: String },

    #[error("destination '{destination}' already exists for lambda '{lambda}'")]
    DestinationAlreadyExists { lambda: String, destination: String },

    #[error("invalid weight {weight} for destination '{destination}': weight must be finite and >= 0")]
    InvalidWeight { destination: String, weight: f64 },

    #[error("destination '{0}' unreachable")]
    DestinationUnreachable(String),

    #[error("stale observation for lambda '{lambda}', destination '{destination}' dropped")]
    StaleObservation { lambda: String, destination: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for dispatch-core operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
