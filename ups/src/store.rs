//! The workitem store: a pluggable persistence seam
//! with an in-memory implementation.
//!
//! State-changing operations are atomic; the commit callback of
//! [`WorkitemStore::change_state`] runs inside the store's critical
//! section so that emitted events observe the commit order.

use crate::error::*;
use crate::model::{ProcedureStepState, Workitem};
use parking_lot::RwLock;
use snafu::ensure;
use std::collections::BTreeMap;

/// A query over the workitem store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkitemQuery {
    /// Match on the procedure step state.
    pub state: Option<ProcedureStepState>,
    /// Match on the referenced patient ID.
    pub patient_id: Option<String>,
    /// Match on the worklist label.
    pub worklist_label: Option<String>,
}

impl WorkitemQuery {
    fn matches(&self, item: &Workitem) -> bool {
        if let Some(state) = self.state {
            if item.state != state {
                return false;
            }
        }
        if let Some(patient_id) = &self.patient_id {
            if item.patient_id.as_deref() != Some(patient_id.as_str()) {
                return false;
            }
        }
        if let Some(label) = &self.worklist_label {
            if item.worklist_label.as_deref() != Some(label.as_str()) {
                return false;
            }
        }
        true
    }
}

/// The mutable subset of workitem attributes accepted by
/// [`WorkitemStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkitemPatch {
    pub procedure_step_label: Option<String>,
    pub scheduled_start: Option<String>,
    pub expected_completion: Option<String>,
    pub performer: Option<String>,
    pub progress: Option<u32>,
    pub progress_description: Option<String>,
}

/// Type trait for a store of workitems.
///
/// Implementations are internally synchronized;
/// all methods take `&self`.
pub trait WorkitemStore: Send + Sync {
    /// Add a new workitem. The UID must not be in use.
    fn create(&self, item: Workitem) -> Result<()>;

    /// Fetch a workitem by its UID.
    fn get(&self, uid: &str) -> Result<Workitem>;

    /// Find the workitems matching the query.
    ///
    /// Results come in ascending SOP instance UID order,
    /// which is also the pagination order of the HTTP surface.
    fn search(&self, query: &WorkitemQuery) -> Vec<Workitem>;

    /// Apply a patch to the mutable attributes of a workitem.
    /// Workitems in a terminal state cannot be updated.
    fn update(&self, uid: &str, patch: &WorkitemPatch) -> Result<Workitem>;

    /// Atomically change the state of a workitem.
    ///
    /// Preconditions checked under the store lock:
    /// the target must be reachable per the transition table;
    /// claiming (moving to IN PROGRESS) requires and records a
    /// transaction UID; leaving IN PROGRESS requires the same
    /// transaction UID; identical terminal transitions are idempotent.
    ///
    /// `on_commit` runs inside the same critical section,
    /// right after the state change is applied.
    fn change_state(
        &self,
        uid: &str,
        target: ProcedureStepState,
        transaction_uid: Option<&str>,
        on_commit: &mut dyn FnMut(&Workitem),
    ) -> Result<Workitem>;

    /// Record a cancellation reason on an in-progress workitem.
    fn record_cancellation_reason(&self, uid: &str, reason: Option<&str>) -> Result<Workitem>;

    /// Remove a workitem. The engine checks deletion locks first.
    fn delete(&self, uid: &str) -> Result<()>;
}

/// A workitem store kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryWorkitemStore {
    items: RwLock<BTreeMap<String, Workitem>>,
}

impl InMemoryWorkitemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkitemStore for InMemoryWorkitemStore {
    fn create(&self, item: Workitem) -> Result<()> {
        let mut items = self.items.write();
        ensure!(
            !items.contains_key(&item.uid),
            AlreadyExistsSnafu { uid: item.uid.clone() }
        );
        items.insert(item.uid.clone(), item);
        Ok(())
    }

    fn get(&self, uid: &str) -> Result<Workitem> {
        self.items
            .read()
            .get(uid)
            .cloned()
            .ok_or_else(|| WorkitemNotFoundSnafu { uid }.build())
    }

    fn search(&self, query: &WorkitemQuery) -> Vec<Workitem> {
        // BTreeMap iteration provides the ascending UID order
        self.items
            .read()
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect()
    }

    fn update(&self, uid: &str, patch: &WorkitemPatch) -> Result<Workitem> {
        let mut items = self.items.write();
        let item = items
            .get_mut(uid)
            .ok_or_else(|| WorkitemNotFoundSnafu { uid }.build())?;
        ensure!(
            !item.state.is_terminal(),
            TerminalStateSnafu {
                uid,
                state: item.state
            }
        );
        if let Some(v) = &patch.procedure_step_label {
            item.procedure_step_label = Some(v.clone());
        }
        if let Some(v) = &patch.scheduled_start {
            item.scheduled_start = Some(v.clone());
        }
        if let Some(v) = &patch.expected_completion {
            item.expected_completion = Some(v.clone());
        }
        if let Some(v) = &patch.performer {
            item.performer = Some(v.clone());
        }
        if let Some(v) = patch.progress {
            item.progress = Some(v);
        }
        if let Some(v) = &patch.progress_description {
            item.progress_description = Some(v.clone());
        }
        Ok(item.clone())
    }

    fn change_state(
        &self,
        uid: &str,
        target: ProcedureStepState,
        transaction_uid: Option<&str>,
        on_commit: &mut dyn FnMut(&Workitem),
    ) -> Result<Workitem> {
        let mut items = self.items.write();
        let item = items
            .get_mut(uid)
            .ok_or_else(|| WorkitemNotFoundSnafu { uid }.build())?;

        // repeating an identical terminal transition is a no-op
        if item.state.is_terminal() && item.state == target {
            ensure!(
                item.transaction_uid.as_deref() == transaction_uid,
                TransactionUidMismatchSnafu { uid }
            );
            return Ok(item.clone());
        }

        ensure!(
            item.state.can_transition(target),
            InvalidStateTransitionSnafu {
                uid,
                from: item.state,
                to: target
            }
        );

        match (item.state, target) {
            (ProcedureStepState::Scheduled, ProcedureStepState::InProgress) => {
                let transaction_uid =
                    transaction_uid.ok_or_else(|| TransactionUidRequiredSnafu { uid }.build())?;
                item.transaction_uid = Some(transaction_uid.to_string());
            }
            (ProcedureStepState::InProgress, _) => {
                ensure!(
                    transaction_uid.is_some()
                        && item.transaction_uid.as_deref() == transaction_uid,
                    TransactionUidMismatchSnafu { uid }
                );
            }
            _ => {}
        }

        item.state = target;
        // the commit callback observes the store in commit order
        on_commit(item);
        Ok(item.clone())
    }

    fn record_cancellation_reason(&self, uid: &str, reason: Option<&str>) -> Result<Workitem> {
        let mut items = self.items.write();
        let item = items
            .get_mut(uid)
            .ok_or_else(|| WorkitemNotFoundSnafu { uid }.build())?;
        item.cancellation_reason = reason.map(|r| r.to_string());
        Ok(item.clone())
    }

    fn delete(&self, uid: &str) -> Result<()> {
        let mut items = self.items.write();
        items
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| WorkitemNotFoundSnafu { uid }.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UpsPriority;

    fn store_with(uids: &[&str]) -> InMemoryWorkitemStore {
        let store = InMemoryWorkitemStore::new();
        for uid in uids {
            store
                .create(Workitem::new(*uid, UpsPriority::Medium))
                .unwrap();
        }
        store
    }

    #[test]
    fn create_rejects_duplicates() {
        let store = store_with(&["1.2.3"]);
        let e = store.create(Workitem::new("1.2.3", UpsPriority::Low));
        assert!(matches!(e, Err(Error::AlreadyExists { .. })));
    }

    #[test]
    fn search_returns_ascending_uid_order() {
        let store = store_with(&["1.2.9", "1.2.1", "1.2.5"]);
        let results = store.search(&WorkitemQuery::default());
        let uids: Vec<&str> = results.iter().map(|w| w.uid.as_str()).collect();
        assert_eq!(uids, vec!["1.2.1", "1.2.5", "1.2.9"]);
    }

    #[test]
    fn claiming_records_the_transaction_uid() {
        let store = store_with(&["1.2.3"]);
        let item = store
            .change_state("1.2.3", ProcedureStepState::InProgress, Some("tx-1"), &mut |_| {})
            .unwrap();
        assert_eq!(item.state, ProcedureStepState::InProgress);
        assert_eq!(item.transaction_uid.as_deref(), Some("tx-1"));

        // claiming without a transaction UID is refused
        let store = store_with(&["1.2.4"]);
        let e = store.change_state("1.2.4", ProcedureStepState::InProgress, None, &mut |_| {});
        assert!(matches!(e, Err(Error::TransactionUidRequired { .. })));
    }

    #[test]
    fn transaction_uid_binding_is_enforced() {
        let store = store_with(&["1.2.3"]);
        store
            .change_state("1.2.3", ProcedureStepState::InProgress, Some("tx-1"), &mut |_| {})
            .unwrap();

        let mut committed = false;
        let e = store.change_state(
            "1.2.3",
            ProcedureStepState::Completed,
            Some("tx-2"),
            &mut |_| committed = true,
        );
        assert!(matches!(e, Err(Error::TransactionUidMismatch { .. })));
        assert!(!committed, "no commit may be observed on a rejected change");
        // state is unchanged
        assert_eq!(
            store.get("1.2.3").unwrap().state,
            ProcedureStepState::InProgress
        );
    }

    #[test]
    fn terminal_transitions_are_idempotent() {
        let store = store_with(&["1.2.3"]);
        store
            .change_state("1.2.3", ProcedureStepState::InProgress, Some("tx-1"), &mut |_| {})
            .unwrap();
        store
            .change_state("1.2.3", ProcedureStepState::Completed, Some("tx-1"), &mut |_| {})
            .unwrap();

        // the identical request again succeeds without effect
        let mut commits = 0;
        store
            .change_state(
                "1.2.3",
                ProcedureStepState::Completed,
                Some("tx-1"),
                &mut |_| commits += 1,
            )
            .unwrap();
        assert_eq!(commits, 0);

        // but a mismatched transaction UID is rejected
        let e = store.change_state(
            "1.2.3",
            ProcedureStepState::Completed,
            Some("tx-9"),
            &mut |_| {},
        );
        assert!(matches!(e, Err(Error::TransactionUidMismatch { .. })));
    }

    #[test]
    fn terminal_workitems_reject_updates() {
        let store = store_with(&["1.2.3"]);
        store
            .change_state("1.2.3", ProcedureStepState::Canceled, None, &mut |_| {})
            .unwrap();
        let e = store.update(
            "1.2.3",
            &WorkitemPatch {
                progress: Some(50),
                ..Default::default()
            },
        );
        assert!(matches!(e, Err(Error::TerminalState { .. })));
    }
}
