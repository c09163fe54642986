//! `EdgeRouter`-shaped admin protocol: an in-process request/reply pair over
//! a [`ForwardingTable`], with no socket framing of its own.
//!
//! Grounded on `original_source/Edge/forwardingtableclient.h`'s method names
//! (`numTables`, `table`, `dump`, `flush`, `change`, `remove`), restated here
//! as a closed enum pair per the tagged-variant redesign note rather than an
//! RPC service trait, since binding a real transport is out of scope.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::{info, warn};

use crate::estimator::PtimeEstimatorRtt;
use crate::forwarding_table::ForwardingTable;

/// An admin operation against a [`ForwardingTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdminRequest {
    NumTables,
    Dump,
    Flush,
    Change {
        lambda: String,
        destination: String,
        weight: f64,
        is_final: bool,
    },
    Remove {
        lambda: String,
        destination: String,
    },
    /// `id` is accepted but ignored beyond validating it is `0`, the only
    /// table that exists (see `num_tables`'s doc comment).
    Table { id: usize },
}

/// The reply to an [`AdminRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdminReply {
    NumTables(usize),
    /// A deterministic, human-readable rendering of the whole table, sorted
    /// by lambda then destination.
    Dump(String),
    Ok,
    Table(BTreeMap<String, BTreeMap<String, (f64, bool)>>),
    Err(String),
}

/// Dispatches [`AdminRequest`]s against a [`ForwardingTable`]. Stateless
/// beyond the table reference it is handed per call; there is exactly one
/// handler per dispatcher, mirroring the original's single
/// `ForwardingTableClient` per `EdgeServer`.
#[derive(Debug, Default)]
pub struct AdminHandler;

impl AdminHandler {
    pub fn new() -> Self {
        Self
    }

    /// `estimator` is `Some` only when the dispatcher is configured with an
    /// active [`PtimeEstimatorRtt`] (the `least-queue` router); `Change` and
    /// `Remove` keep its per-lambda destination registry in sync with the
    /// table the same way [`crate::dispatcher::Dispatcher::change`] and
    /// [`crate::dispatcher::Dispatcher::remove`] do.
    pub fn handle(
        &self,
        table: &ForwardingTable,
        estimator: Option<&PtimeEstimatorRtt>,
        request: AdminRequest,
    ) -> AdminReply {
        match request {
            AdminRequest::NumTables => AdminReply::NumTables(table.num_tables()),
            AdminRequest::Dump => AdminReply::Dump(render_dump(&table.snapshot())),
            AdminRequest::Flush => {
                table.flush();
                info!("admin flush applied");
                AdminReply::Ok
            }
            AdminRequest::Change { lambda, destination, weight, is_final } => {
                match table.change(&lambda, &destination, weight, is_final) {
                    Ok(()) => {
                        if is_final {
                            if let Some(estimator) = estimator {
                                estimator.register_destination(&lambda, &destination);
                            }
                        }
                        info!(lambda, destination, weight, is_final, "admin change applied");
                        AdminReply::Ok
                    }
                    Err(e) => {
                        warn!(lambda, destination, error = %e, "admin change rejected");
                        AdminReply::Err(e.to_string())
                    }
                }
            }
            AdminRequest::Remove { lambda, destination } => {
                match table.remove(&lambda, &destination) {
                    Ok(()) => {
                        if let Some(estimator) = estimator {
                            estimator.remove_destination(&lambda, &destination);
                        }
                        info!(lambda, destination, "admin remove applied");
                        AdminReply::Ok
                    }
                    Err(e) => {
                        warn!(lambda, destination, error = %e, "admin remove rejected");
                        AdminReply::Err(e.to_string())
                    }
                }
            }
            AdminRequest::Table { id } => {
                if id == 0 {
                    AdminReply::Table(table.snapshot())
                } else {
                    AdminReply::Err(format!("no such table: {id}"))
                }
            }
        }
    }
}

fn render_dump(snapshot: &BTreeMap<String, BTreeMap<String, (f64, bool)>>) -> String {
    let mut out = String::new();
    for (lambda, destinations) in snapshot {
        let _ = writeln!(out, "{lambda}:");
        for (destination, (weight, is_final)) in destinations {
            let _ = writeln!(out, "  {destination} weight={weight} final={is_final}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SelectionPolicyKind;
    use crate::DispatchError;

    #[test]
    fn num_tables_reports_one() {
        let table = ForwardingTable::new(SelectionPolicyKind::RoundRobin);
        let handler = AdminHandler::new();
        assert_eq!(handler.handle(&table, None, AdminRequest::NumTables), AdminReply::NumTables(1));
    }

    #[test]
    fn change_then_table_zero_reflects_it() {
        let table = ForwardingTable::new(SelectionPolicyKind::LeastImpedance);
        let handler = AdminHandler::new();
        assert_eq!(
            handler.handle(
                &table,
                None,
                AdminRequest::Change {
                    lambda: "f".to_string(),
                    destination: "A".to_string(),
                    weight: 1.0,
                    is_final: true,
                }
            ),
            AdminReply::Ok
        );
        let reply = handler.handle(&table, None, AdminRequest::Table { id: 0 });
        match reply {
            AdminReply::Table(snapshot) => assert_eq!(snapshot["f"]["A"], (1.0, true)),
            other => panic!("expected Table reply, got {other:?}"),
        }
    }

    #[test]
    fn table_with_nonzero_id_errors() {
        let table = ForwardingTable::new(SelectionPolicyKind::RoundRobin);
        let handler = AdminHandler::new();
        assert_eq!(
            handler.handle(&table, None, AdminRequest::Table { id: 1 }),
            AdminReply::Err("no such table: 1".to_string())
        );
    }

    #[test]
    fn remove_of_unknown_destination_is_an_err_reply_not_a_panic() {
        let table = ForwardingTable::new(SelectionPolicyKind::RoundRobin);
        let handler = AdminHandler::new();
        let reply = handler.handle(
            &table,
            None,
            AdminRequest::Remove { lambda: "f".to_string(), destination: "A".to_string() },
        );
        assert!(matches!(reply, AdminReply::Err(_)));
    }

    #[test]
    fn flush_then_dump_is_empty() {
        let table = ForwardingTable::new(SelectionPolicyKind::RoundRobin);
        table.change("f", "A", 1.0, true).unwrap();
        let handler = AdminHandler::new();
        assert_eq!(handler.handle(&table, None, AdminRequest::Flush), AdminReply::Ok);
        assert_eq!(
            handler.handle(&table, None, AdminRequest::Dump),
            AdminReply::Dump(String::new())
        );
    }

    #[test]
    fn dump_is_sorted_by_lambda_then_destination() {
        let table = ForwardingTable::new(SelectionPolicyKind::RoundRobin);
        table.change("z-lambda", "B", 2.0, true).unwrap();
        table.change("a-lambda", "A", 1.0, true).unwrap();
        let handler = AdminHandler::new();
        let reply = handler.handle(&table, None, AdminRequest::Dump);
        match reply {
            AdminReply::Dump(s) => {
                let a_pos = s.find("a-lambda").unwrap();
                let z_pos = s.find("z-lambda").unwrap();
                assert!(a_pos < z_pos);
            }
            other => panic!("expected Dump reply, got {other:?}"),
        }
    }

    #[test]
    fn change_registers_the_destination_with_an_active_estimator() {
        use crate::request::{LambdaRequest, LambdaResponse};

        let table = ForwardingTable::new(SelectionPolicyKind::LeastQueue);
        let estimator = PtimeEstimatorRtt::new(3, 10.0);
        let handler = AdminHandler::new();
        let req = LambdaRequest::new("f", vec![], vec![]);

        handler.handle(
            &table,
            Some(&estimator),
            AdminRequest::Change {
                lambda: "f".to_string(),
                destination: "A".to_string(),
                weight: 1.0,
                is_final: true,
            },
        );
        // Registered but unsampled: the estimator still reports unknown.
        assert_eq!(estimator.select(&req).unwrap_err(), DispatchError::NoDestinations("f".to_string()));

        estimator.process_success(&req, "A", &LambdaResponse::ok("A", 0.0), 0.1);
        assert_eq!(estimator.select(&req).unwrap(), "A");

        handler.handle(
            &table,
            Some(&estimator),
            AdminRequest::Remove { lambda: "f".to_string(), destination: "A".to_string() },
        );
        assert_eq!(estimator.select(&req).unwrap_err(), DispatchError::NoDestinations("f".to_string()));
    }
}
