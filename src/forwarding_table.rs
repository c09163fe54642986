//! [`ForwardingTable`]: the lambda → [`Entry`] map and the backing store for
//! the admin protocol.
//!
//! All mutating and reading operations are mutually exclusive, guarded by a
//! single `parking_lot::Mutex`. Per `spec.md` §5, policies may assume
//! single-threaded access to their internal state, and a lock is never held
//! across a transport call (callers lock only for the duration of a lookup
//! or a mutation).

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::entry::{Entry, SelectionPolicyKind};
use crate::{DispatchError, DispatchResult};

/// Thread-safe mapping from lambda name to [`Entry`].
pub struct ForwardingTable {
    policy: SelectionPolicyKind,
    tables: Mutex<BTreeMap<String, Entry>>,
}

impl ForwardingTable {
    pub fn new(policy: SelectionPolicyKind) -> Self {
        Self {
            policy,
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    /// Pick a destination for `lambda`. Fails with `NoDestinations` if the
    /// lambda is unknown or its entry is empty.
    pub fn lookup(&self, lambda: &str) -> DispatchResult<String> {
        let mut tables = self.tables.lock();
        let entry = tables
            .get_mut(lambda)
            .ok_or_else(|| DispatchError::NoDestinations(lambda.to_string()))?;
        entry.select(lambda)
    }

    /// Insert or update a destination. An `Entry` is created on first
    /// insertion for a lambda.
    pub fn change(
        &self,
        lambda: &str,
        destination: &str,
        weight: f64,
        is_final: bool,
    ) -> DispatchResult<()> {
        let mut tables = self.tables.lock();
        let entry = tables
            .entry(lambda.to_string())
            .or_insert_with(|| Entry::new(self.policy));
        entry.change(lambda, destination, weight, is_final, false)?;
        debug!(lambda, destination, weight, is_final, "forwarding entry changed");
        Ok(())
    }

    /// Optimized weight update: same effect as `change`'s weight field, but
    /// lets index-caching policies avoid a full rescan. Dropped silently
    /// (not an error) if the lambda or destination is no longer present;
    /// this is the path the [`crate::optimizer::LocalOptimizer`] uses, and
    /// per `spec.md` §4.3 a stale reference must not surface as an error.
    pub fn update_weight(
        &self,
        lambda: &str,
        destination: &str,
        old_weight: f64,
        new_weight: f64,
    ) -> DispatchResult<()> {
        let mut tables = self.tables.lock();
        match tables.get_mut(lambda) {
            Some(entry) => match entry.update_weight(lambda, destination, old_weight, new_weight) {
                Ok(()) => Ok(()),
                Err(DispatchError::DestinationNotFound { .. }) => {
                    debug!(lambda, destination, "stale observation dropped: destination not found");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            None => {
                debug!(lambda, "stale observation dropped: lambda not found");
                Ok(())
            }
        }
    }

    /// Remove a destination from a lambda's entry. The entry itself is
    /// dropped once its last destination is removed. Fails with
    /// `DestinationNotFound` if the lambda or destination is absent. Unlike
    /// `update_weight`, admin removal of an absent entry is a hard error so
    /// the caller learns its model is stale.
    pub fn remove(&self, lambda: &str, destination: &str) -> DispatchResult<()> {
        let mut tables = self.tables.lock();
        let entry = tables.get_mut(lambda).ok_or_else(|| DispatchError::DestinationNotFound {
            lambda: lambda.to_string(),
            destination: destination.to_string(),
        })?;
        entry.remove(lambda, destination)?;
        if entry.is_empty() {
            tables.remove(lambda);
        }
        Ok(())
    }

    /// Remove all forwarding entries.
    pub fn flush(&self) {
        self.tables.lock().clear();
    }

    /// Deep-copy snapshot of all entries, keyed by lambda then destination,
    /// as `(weight, is_final)`. Used for the admin `DUMP`/`TABLE` replies;
    /// external components never receive references into live state.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, (f64, bool)>> {
        self.tables
            .lock()
            .iter()
            .map(|(lambda, entry)| {
                let dests = entry
                    .elements()
                    .iter()
                    .map(|e| (e.destination.clone(), (e.weight, e.is_final)))
                    .collect();
                (lambda.clone(), dests)
            })
            .collect()
    }

    /// Always `1`: the field is reserved for future multi-table routing,
    /// which is unused in every known caller (see `DESIGN.md`'s Open
    /// Question (a)).
    pub fn num_tables(&self) -> usize {
        1
    }
}
