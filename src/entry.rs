//! [`Entry`]: a single lambda's weighted destination set plus its selection
//! policy.
//!
//! Modeled as a tagged variant rather than a trait/inheritance hierarchy
//! (see `original_source/Edge/Entries/entryleastimpedance.h` for the C++
//! `Entry` base class this replaces), since there is no need for open
//! extensibility here, just a fixed operation set.

use crate::element::Element;
use crate::{DispatchError, DispatchResult};
use rand::Rng;

/// Which selection policy a [`crate::config::RouterConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicyKind {
    #[default]
    RandomProportional,
    RoundRobin,
    LeastImpedance,
    LeastQueue,
}

/// Per-policy cached state. `cached_min` holds an index into the owning
/// `Entry`'s element `Vec` (a stable handle recomputed on mutation),
/// replacing the pointer-aliased iterator of the original C++
/// `EntryLeastImpedance`. `round_robin_cursor` holds a destination
/// identifier rather than an index so insertions at the end never cause a
/// skip.
#[derive(Debug, Clone, Default)]
struct PolicyState {
    cached_min: Option<usize>,
    round_robin_cursor: Option<String>,
}

/// One lambda's destination set, in insertion order (the tie-break
/// reference), plus the policy-local state needed to select among them.
#[derive(Debug, Clone)]
pub struct Entry {
    elements: Vec<Element>,
    policy: SelectionPolicyKind,
    state: PolicyState,
}

impl Entry {
    pub fn new(policy: SelectionPolicyKind) -> Self {
        Self {
            elements: Vec::new(),
            policy,
            state: PolicyState::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Insert or update a destination. `strict` rejects an update to an
    /// already-present destination with `DestinationAlreadyExists` (used by
    /// the admin protocol's strict-add path); a non-strict call always
    /// updates in place.
    pub fn change(
        &mut self,
        lambda: &str,
        destination: &str,
        weight: f64,
        is_final: bool,
        strict: bool,
    ) -> DispatchResult<()> {
        if !Element::is_valid_weight(weight) {
            return Err(DispatchError::InvalidWeight {
                destination: destination.to_string(),
                weight,
            });
        }

        match self.elements.iter().position(|e| e.destination == destination) {
            Some(idx) => {
                if strict {
                    return Err(DispatchError::DestinationAlreadyExists {
                        lambda: lambda.to_string(),
                        destination: destination.to_string(),
                    });
                }
                let old_weight = self.elements[idx].weight;
                self.elements[idx].weight = weight;
                self.elements[idx].is_final = is_final;
                self.on_weight_changed(idx, old_weight, weight);
            }
            None => {
                let idx = self.elements.len();
                self.elements.push(Element::new(destination, weight, is_final));
                self.on_inserted(idx, weight);
            }
        }
        Ok(())
    }

    /// Optimized weight update: the caller asserts `old_weight` matches the
    /// currently stored weight, which lets index-caching policies fix up
    /// their cache without a full rescan when possible.
    pub fn update_weight(
        &mut self,
        lambda: &str,
        destination: &str,
        old_weight: f64,
        new_weight: f64,
    ) -> DispatchResult<()> {
        if !Element::is_valid_weight(new_weight) {
            return Err(DispatchError::InvalidWeight {
                destination: destination.to_string(),
                weight: new_weight,
            });
        }
        let idx = self
            .elements
            .iter()
            .position(|e| e.destination == destination)
            .ok_or_else(|| DispatchError::DestinationNotFound {
                lambda: lambda.to_string(),
                destination: destination.to_string(),
            })?;
        let actual_old = self.elements[idx].weight;
        let _ = old_weight; // asserted by the caller; we trust the stored value either way
        self.elements[idx].weight = new_weight;
        self.on_weight_changed(idx, actual_old, new_weight);
        Ok(())
    }

    pub fn remove(&mut self, lambda: &str, destination: &str) -> DispatchResult<()> {
        let idx = self
            .elements
            .iter()
            .position(|e| e.destination == destination)
            .ok_or_else(|| DispatchError::DestinationNotFound {
                lambda: lambda.to_string(),
                destination: destination.to_string(),
            })?;
        self.elements.remove(idx);
        self.on_removed(idx);
        if self.state.round_robin_cursor.as_deref() == Some(destination) {
            self.state.round_robin_cursor = None;
        }
        Ok(())
    }

    /// Pick one destination under the configured policy.
    ///
    /// Per `DESIGN.md`'s Open Question (b), hop-limited forwarding to a
    /// non-final destination is not implemented: selecting one is a hard
    /// `InvalidConfiguration` error rather than a silent forward.
    pub fn select(&mut self, lambda: &str) -> DispatchResult<String> {
        if self.elements.is_empty() {
            return Err(DispatchError::NoDestinations(lambda.to_string()));
        }
        let destination = match self.policy {
            SelectionPolicyKind::RandomProportional => self.select_random_proportional(),
            SelectionPolicyKind::RoundRobin => self.select_round_robin(),
            SelectionPolicyKind::LeastImpedance | SelectionPolicyKind::LeastQueue => {
                self.select_least_impedance()
            }
        };
        let is_final = self
            .elements
            .iter()
            .find(|e| e.destination == destination)
            .map(|e| e.is_final)
            .unwrap_or(false);
        if !is_final {
            return Err(DispatchError::InvalidConfiguration(format!(
                "hop-limited forwarding is not implemented: '{destination}' is not a final destination for lambda '{lambda}'"
            )));
        }
        Ok(destination)
    }

    fn select_random_proportional(&self) -> String {
        let zero_weight: Vec<&Element> =
            self.elements.iter().filter(|e| e.weight == 0.0).collect();
        let mut rng = rand::thread_rng();
        if !zero_weight.is_empty() {
            let idx = rng.gen_range(0..zero_weight.len());
            return zero_weight[idx].destination.clone();
        }

        let total: f64 = self.elements.iter().map(|e| 1.0 / e.weight).sum();
        let mut r = rng.gen::<f64>() * total;
        for e in &self.elements {
            let score = 1.0 / e.weight;
            if r < score {
                return e.destination.clone();
            }
            r -= score;
        }
        // Floating point rounding can leave a residual; fall back to the last.
        self.elements.last().unwrap().destination.clone()
    }

    fn select_round_robin(&mut self) -> String {
        let start_idx = match &self.state.round_robin_cursor {
            Some(dest) => self
                .elements
                .iter()
                .position(|e| &e.destination == dest)
                .map(|i| (i + 1) % self.elements.len())
                .unwrap_or(0),
            None => 0,
        };
        let dest = self.elements[start_idx].destination.clone();
        self.state.round_robin_cursor = Some(dest.clone());
        dest
    }

    fn select_least_impedance(&mut self) -> String {
        let idx = match self.state.cached_min {
            Some(idx) if idx < self.elements.len() => idx,
            _ => {
                let idx = self.recompute_min();
                self.state.cached_min = Some(idx);
                idx
            }
        };
        self.elements[idx].destination.clone()
    }

    fn recompute_min(&self) -> usize {
        let mut best = 0;
        for (i, e) in self.elements.iter().enumerate().skip(1) {
            if e.weight < self.elements[best].weight {
                best = i;
            }
        }
        best
    }

    /// Fix up the cached-min index after `idx`'s weight changed from
    /// `old_weight` to `new_weight`, in O(1) when possible, else force a
    /// rescan on the next select.
    fn on_weight_changed(&mut self, idx: usize, old_weight: f64, new_weight: f64) {
        match self.state.cached_min {
            None => self.state.cached_min = Some(idx),
            Some(min_idx) => {
                if new_weight < self.elements[min_idx].weight {
                    self.state.cached_min = Some(idx);
                } else if min_idx == idx && new_weight > old_weight {
                    // the previous minimum got strictly worse: must rescan
                    self.state.cached_min = None;
                }
                // otherwise the cached minimum is still valid
            }
        }
    }

    fn on_inserted(&mut self, idx: usize, weight: f64) {
        match self.state.cached_min {
            None => self.state.cached_min = Some(idx),
            Some(min_idx) => {
                if weight < self.elements[min_idx].weight {
                    self.state.cached_min = Some(idx);
                }
            }
        }
    }

    fn on_removed(&mut self, removed_idx: usize) {
        self.state.cached_min = match self.state.cached_min {
            None => None,
            Some(min_idx) if min_idx == removed_idx => None,
            Some(min_idx) if min_idx > removed_idx => Some(min_idx - 1),
            Some(min_idx) => Some(min_idx),
        };
    }
}
