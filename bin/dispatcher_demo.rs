//! Demonstration binary: wires a [`Dispatcher`] together from configuration
//! strings and forwards a handful of requests through a loopback transport
//! that just sleeps for a destination-specific duration.
//!
//! Usage:
//! ```bash
//! cargo run --bin dispatcher_demo -- --router type=least-impedance --requests 20
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use edge_dispatch::config::{OptimizerConfig, RouterConfig};
use edge_dispatch::{
    DispatchError, DispatchResult, Dispatcher, ForwardingTable, LambdaRequest, LambdaResponse,
    LocalOptimizer, Transport,
};

#[derive(Parser, Debug)]
#[command(about = "Run a handful of requests through an edge dispatch core")]
struct Args {
    /// Router configuration string, e.g. `type=least-impedance`.
    #[arg(long, default_value = "type=random-proportional")]
    router: String,

    /// Optimizer configuration string, e.g. `type=async,alpha=0.3`.
    #[arg(long, default_value = "type=async,alpha=0.3")]
    optimizer: String,

    /// Number of requests to simulate.
    #[arg(long, default_value_t = 20)]
    requests: usize,

    /// Worker pool size.
    #[arg(long, default_value_t = Dispatcher::DEFAULT_POOL_SIZE)]
    pool_size: usize,
}

/// Sleeps for a fixed per-destination duration, simulating heterogeneous
/// edge computer speeds. Never fails.
struct SleepingTransport {
    latencies_ms: Vec<(&'static str, u64)>,
}

impl Transport for SleepingTransport {
    fn send(&self, destination: &str, _request: &LambdaRequest) -> DispatchResult<LambdaResponse> {
        let latency_ms = self
            .latencies_ms
            .iter()
            .find(|(d, _)| *d == destination)
            .map(|(_, ms)| *ms)
            .ok_or_else(|| DispatchError::DestinationUnreachable(destination.to_string()))?;
        std::thread::sleep(Duration::from_millis(latency_ms));
        Ok(LambdaResponse::ok(destination, latency_ms as f64 / 1000.0))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let router_config = RouterConfig::parse(&args.router)?;
    let optimizer_config = OptimizerConfig::parse(&args.optimizer)?;

    info!(?router_config, ?optimizer_config, "starting dispatcher demo");

    let table = Arc::new(ForwardingTable::new(router_config.policy));
    table.change("resize-image", "edge-1", 1.0, true)?;
    table.change("resize-image", "edge-2", 1.0, true)?;
    table.change("resize-image", "edge-3", 1.0, true)?;

    let optimizer = Arc::new(LocalOptimizer::with_clock(
        optimizer_config.alpha,
        optimizer_config.stale_period,
        Arc::new(edge_dispatch::SystemClock),
    ));

    let transport = Arc::new(SleepingTransport {
        latencies_ms: vec![("edge-1", 5), ("edge-2", 15), ("edge-3", 30)],
    });

    let dispatcher = Dispatcher::new(args.pool_size, table, optimizer, None, transport);

    for i in 0..args.requests {
        let request = LambdaRequest::new("resize-image", vec![], vec![]);
        match dispatcher.process(request) {
            Ok(response) => info!(i, responder = %response.responder_endpoint, "request served"),
            Err(e) => info!(i, error = %e, "request failed"),
        }
    }

    Ok(())
}
