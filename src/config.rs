//! Comma-separated `key=value` configuration strings for the router,
//! optimizer, and processing-time estimator.
//!
//! Grounded on `original_source/Executables/edgedispatchermain.cpp`'s
//! `Support::Conf`-style invocation (`type=rtt,window-size=50,stale-period=10`).
//! It is not a TOML/YAML file, just a single inline string per component, as
//! the original command line passes them. Parse errors are all
//! `DispatchError::InvalidConfiguration`, mirroring the teacher's
//! `RelayConfig::validate` returning a single descriptive error variant.

use std::collections::HashMap;

use crate::entry::SelectionPolicyKind;
use crate::estimator::RttEstimator;
use crate::optimizer::LocalOptimizer;
use crate::{DispatchError, DispatchResult};

fn parse_kv_pairs(spec: &str) -> HashMap<&str, &str> {
    spec.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

fn invalid(message: impl Into<String>) -> DispatchError {
    DispatchError::InvalidConfiguration(message.into())
}

/// Selects the forwarding table's selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    pub policy: SelectionPolicyKind,
}

impl RouterConfig {
    /// `type=random-proportional|round-robin|least-impedance|least-queue`.
    /// Defaults to `random-proportional` if `type` is absent, matching
    /// [`SelectionPolicyKind`]'s `Default`.
    pub fn parse(spec: &str) -> DispatchResult<Self> {
        let pairs = parse_kv_pairs(spec);
        let policy = match pairs.get("type").copied() {
            None => SelectionPolicyKind::default(),
            Some("random-proportional") => SelectionPolicyKind::RandomProportional,
            Some("round-robin") => SelectionPolicyKind::RoundRobin,
            Some("least-impedance") => SelectionPolicyKind::LeastImpedance,
            Some("least-queue") => SelectionPolicyKind::LeastQueue,
            Some(other) => return Err(invalid(format!("unknown router type '{other}'"))),
        };
        Ok(Self { policy })
    }
}

/// Configures a [`LocalOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerConfig {
    pub alpha: f64,
    pub stale_period: f64,
}

impl OptimizerConfig {
    /// `type=async,alpha=0.3[,stale-period=5]`. `type` must be `async` (the
    /// only optimizer kind this crate implements, matching
    /// `original_source/Edge/localoptimizerasync.h`); `alpha` is required and
    /// must lie in `[0, 1]`.
    pub fn parse(spec: &str) -> DispatchResult<Self> {
        let pairs = parse_kv_pairs(spec);
        match pairs.get("type").copied() {
            Some("async") | None => {}
            Some(other) => return Err(invalid(format!("unknown optimizer type '{other}'"))),
        }

        let alpha: f64 = pairs
            .get("alpha")
            .ok_or_else(|| invalid("optimizer config missing required key 'alpha'"))?
            .parse()
            .map_err(|_| invalid("optimizer config 'alpha' is not a number"))?;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(invalid(format!("optimizer 'alpha' must be in [0, 1], got {alpha}")));
        }

        let stale_period = match pairs.get("stale-period") {
            Some(s) => s
                .parse()
                .map_err(|_| invalid("optimizer config 'stale-period' is not a number"))?,
            None => LocalOptimizer::DEFAULT_STALE_PERIOD,
        };

        Ok(Self { alpha, stale_period })
    }
}

/// Configures a [`crate::estimator::PtimeEstimatorRtt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorConfig {
    pub window_size: usize,
    pub stale_period_secs: u64,
}

impl EstimatorConfig {
    /// `type=rtt[,window-size=50][,stale-period=10]`. `type` must be `rtt`,
    /// the only supported value per `spec.md` §6 and the original's
    /// `EdgeLambdaProcessorOptions` default.
    pub fn parse(spec: &str) -> DispatchResult<Self> {
        let pairs = parse_kv_pairs(spec);
        match pairs.get("type").copied() {
            Some("rtt") | None => {}
            Some(other) => return Err(invalid(format!("unknown estimator type '{other}'"))),
        }

        let window_size = match pairs.get("window-size") {
            Some(s) => s
                .parse()
                .map_err(|_| invalid("estimator config 'window-size' is not an integer"))?,
            None => RttEstimator::DEFAULT_WINDOW_SIZE,
        };
        if window_size == 0 {
            return Err(invalid("estimator 'window-size' must be >= 1"));
        }

        let stale_period_secs = match pairs.get("stale-period") {
            Some(s) => s
                .parse()
                .map_err(|_| invalid("estimator config 'stale-period' is not an integer"))?,
            None => RttEstimator::DEFAULT_STALE_PERIOD as u64,
        };

        Ok(Self { window_size, stale_period_secs })
    }

    pub fn stale_period_seconds(&self) -> f64 {
        self.stale_period_secs as f64
    }
}
