//! The workitem engine: ties the store, the subscription registry
//! and the event dispatcher together, so that every committed
//! change is observed by the interested subscribers
//! in commit order.

use crate::dispatch::EventDispatcher;
use crate::error::*;
use crate::events::{EventType, UpsEvent};
use crate::model::{ProcedureStepState, Workitem};
use crate::store::{WorkitemPatch, WorkitemQuery, WorkitemStore};
use crate::subscription::SubscriptionStore;
use snafu::ensure;
use std::sync::Arc;
use tracing::info;

/// The unified procedure step engine.
pub struct UpsEngine {
    store: Arc<dyn WorkitemStore>,
    subscriptions: Arc<SubscriptionStore>,
    dispatcher: Arc<EventDispatcher>,
}

impl UpsEngine {
    /// Create an engine over the given store and dispatcher.
    pub fn new(
        store: Arc<dyn WorkitemStore>,
        subscriptions: Arc<SubscriptionStore>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        UpsEngine {
            store,
            subscriptions,
            dispatcher,
        }
    }

    /// The subscription registry of this engine.
    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    /// Add a new workitem in the SCHEDULED state.
    pub fn create(&self, item: Workitem) -> Result<()> {
        ensure!(
            item.state == ProcedureStepState::Scheduled,
            InvalidStateTransitionSnafu {
                uid: item.uid.clone(),
                from: item.state,
                to: item.state,
            }
        );
        let uid = item.uid.clone();
        self.store.create(item)?;
        info!("workitem {} created", uid);
        Ok(())
    }

    /// Fetch a workitem by its UID.
    pub fn get(&self, uid: &str) -> Result<Workitem> {
        self.store.get(uid)
    }

    /// Find workitems, in ascending SOP instance UID order.
    pub fn search(&self, query: &WorkitemQuery) -> Vec<Workitem> {
        self.store.search(query)
    }

    /// Apply a patch to the mutable attributes of a workitem,
    /// emitting progress and assignment events as appropriate.
    pub fn update(&self, uid: &str, patch: &WorkitemPatch) -> Result<Workitem> {
        let item = self.store.update(uid, patch)?;

        if patch.progress.is_some() || patch.progress_description.is_some() {
            self.emit(UpsEvent::with_payload(
                EventType::ProgressReport,
                uid,
                item.transaction_uid.clone(),
                serde_json::json!({
                    "progress": item.progress,
                    "description": item.progress_description,
                }),
            ));
        }
        if patch.performer.is_some() {
            self.emit(UpsEvent::with_payload(
                EventType::Assigned,
                uid,
                item.transaction_uid.clone(),
                serde_json::json!({ "performer": item.performer }),
            ));
        }
        Ok(item)
    }

    /// Atomically change the state of a workitem.
    ///
    /// The state report (and the terminal event, if any) is put
    /// together inside the store's critical section, so events
    /// across concurrent changes match the commit order.
    pub fn change_state(
        &self,
        uid: &str,
        target: ProcedureStepState,
        transaction_uid: Option<&str>,
    ) -> Result<Workitem> {
        let item = self.store.change_state(
            uid,
            target,
            transaction_uid,
            // emission happens inside the store's critical section,
            // so subscribers observe events in commit order
            &mut |committed: &Workitem| {
                self.emit(UpsEvent::state_report(
                    &committed.uid,
                    committed.state,
                    committed.transaction_uid.clone(),
                ));
                match committed.state {
                    ProcedureStepState::Completed => {
                        self.emit(UpsEvent::with_payload(
                            EventType::Completed,
                            &committed.uid,
                            committed.transaction_uid.clone(),
                            serde_json::json!({}),
                        ));
                    }
                    ProcedureStepState::Canceled => {
                        self.emit(UpsEvent::with_payload(
                            EventType::Canceled,
                            &committed.uid,
                            committed.transaction_uid.clone(),
                            serde_json::json!({
                                "reason": committed.cancellation_reason,
                            }),
                        ));
                    }
                    _ => {}
                }
            },
        )?;
        info!("workitem {} moved to {}", uid, target);
        Ok(item)
    }

    /// Request the cancellation of a workitem.
    ///
    /// A SCHEDULED workitem is canceled directly;
    /// an IN PROGRESS one keeps its state and the performer is
    /// notified through a CancelRequested event.
    pub fn request_cancel(&self, uid: &str, reason: Option<&str>) -> Result<()> {
        let item = self.store.get(uid)?;
        match item.state {
            ProcedureStepState::Scheduled => {
                self.store.record_cancellation_reason(uid, reason)?;
                self.change_state(uid, ProcedureStepState::Canceled, None)?;
                Ok(())
            }
            ProcedureStepState::InProgress => {
                let item = self.store.record_cancellation_reason(uid, reason)?;
                self.emit(UpsEvent::with_payload(
                    EventType::CancelRequested,
                    uid,
                    item.transaction_uid.clone(),
                    serde_json::json!({ "reason": reason }),
                ));
                Ok(())
            }
            state => TerminalStateSnafu { uid, state }.fail(),
        }
    }

    /// Remove a workitem,
    /// unless a live deletion-lock subscription protects it.
    pub fn delete(&self, uid: &str) -> Result<()> {
        ensure!(
            !self.subscriptions.has_deletion_lock(uid),
            DeletionLockedSnafu { uid }
        );
        self.store.delete(uid)
    }

    /// Remove a subscription and purge its queued events.
    pub fn unsubscribe(&self, ae_title: &str, workitem_uid: Option<&str>) {
        self.subscriptions.unsubscribe(ae_title, workitem_uid);
        self.dispatcher.purge_subscriber(ae_title);
    }

    fn emit(&self, event: UpsEvent) {
        let interested = self.subscriptions.interested(&event);
        self.dispatcher.enqueue(&event, interested);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DeliveryError, DeliveryService, DispatchConfig};
    use crate::model::UpsPriority;
    use crate::store::InMemoryWorkitemStore;
    use crate::subscription::Subscription;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, UpsEvent)>>,
    }

    impl DeliveryService for Recorder {
        fn deliver(
            &self,
            event: &UpsEvent,
            subscription: &Subscription,
        ) -> Result<(), DeliveryError> {
            self.events
                .lock()
                .push((subscription.ae_title.clone(), event.clone()));
            Ok(())
        }
    }

    fn engine() -> (UpsEngine, Arc<Recorder>, Arc<EventDispatcher>) {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Arc::new(EventDispatcher::start(
            DispatchConfig::default(),
            recorder.clone(),
        ));
        let engine = UpsEngine::new(
            Arc::new(InMemoryWorkitemStore::new()),
            Arc::new(SubscriptionStore::new()),
            dispatcher.clone(),
        );
        (engine, recorder, dispatcher)
    }

    #[test]
    fn state_change_happy_path_notifies_subscriber() {
        let (engine, recorder, dispatcher) = engine();
        engine
            .create(Workitem::new("1.2.3.9.1", UpsPriority::Medium))
            .unwrap();

        let item = engine
            .change_state("1.2.3.9.1", ProcedureStepState::InProgress, Some("tx-1"))
            .unwrap();
        assert_eq!(item.state, ProcedureStepState::InProgress);
        assert_eq!(item.transaction_uid.as_deref(), Some("tx-1"));

        engine
            .subscriptions()
            .subscribe("VIEWER", Some("1.2.3.9.1".to_string()), false, None);

        let item = engine
            .change_state("1.2.3.9.1", ProcedureStepState::Completed, Some("tx-1"))
            .unwrap();
        assert_eq!(item.state, ProcedureStepState::Completed);

        dispatcher.drain();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let events = recorder.events.lock();
        let state_report = events
            .iter()
            .find(|(ae, e)| ae == "VIEWER" && e.event_type == EventType::StateReport)
            .expect("a state report must reach the subscriber");
        assert_eq!(state_report.1.workitem_uid, "1.2.3.9.1");
        assert_eq!(state_report.1.transaction_uid.as_deref(), Some("tx-1"));
        assert_eq!(state_report.1.payload["newState"], "COMPLETED");
        assert!(events
            .iter()
            .any(|(_, e)| e.event_type == EventType::Completed));
    }

    #[test]
    fn transaction_uid_mismatch_emits_nothing() {
        let (engine, recorder, dispatcher) = engine();
        engine
            .create(Workitem::new("1.2.3.9.2", UpsPriority::Medium))
            .unwrap();
        engine
            .change_state("1.2.3.9.2", ProcedureStepState::InProgress, Some("tx-1"))
            .unwrap();
        engine.subscriptions().subscribe("VIEWER", None, false, None);

        let e = engine.change_state("1.2.3.9.2", ProcedureStepState::Completed, Some("tx-2"));
        assert!(matches!(e, Err(Error::TransactionUidMismatch { .. })));
        // state unchanged, no event emitted
        assert_eq!(
            engine.get("1.2.3.9.2").unwrap().state,
            ProcedureStepState::InProgress
        );
        dispatcher.drain();
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn cancel_request_on_in_progress_keeps_state() {
        let (engine, recorder, dispatcher) = engine();
        engine
            .create(Workitem::new("1.2.3.9.3", UpsPriority::Medium))
            .unwrap();
        engine
            .change_state("1.2.3.9.3", ProcedureStepState::InProgress, Some("tx-1"))
            .unwrap();
        engine.subscriptions().subscribe("PERFORMER", None, false, None);

        engine
            .request_cancel("1.2.3.9.3", Some("patient unavailable"))
            .unwrap();
        assert_eq!(
            engine.get("1.2.3.9.3").unwrap().state,
            ProcedureStepState::InProgress
        );

        dispatcher.drain();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let events = recorder.events.lock();
        assert!(events
            .iter()
            .any(|(_, e)| e.event_type == EventType::CancelRequested));
    }

    #[test]
    fn scheduled_cancel_request_cancels_directly() {
        let (engine, _recorder, _dispatcher) = engine();
        engine
            .create(Workitem::new("1.2.3.9.4", UpsPriority::Medium))
            .unwrap();
        engine.request_cancel("1.2.3.9.4", None).unwrap();
        let item = engine.get("1.2.3.9.4").unwrap();
        assert_eq!(item.state, ProcedureStepState::Canceled);
    }

    #[test]
    fn deletion_lock_blocks_delete() {
        let (engine, _recorder, _dispatcher) = engine();
        engine
            .create(Workitem::new("1.2.3.9.5", UpsPriority::Medium))
            .unwrap();
        engine
            .subscriptions()
            .subscribe("VIEWER", Some("1.2.3.9.5".to_string()), true, None);

        let e = engine.delete("1.2.3.9.5");
        assert!(matches!(e, Err(Error::DeletionLocked { .. })));

        // unsubscribing releases the lock
        engine.unsubscribe("VIEWER", Some("1.2.3.9.5"));
        engine.delete("1.2.3.9.5").unwrap();
    }
}
