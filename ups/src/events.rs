//! The UPS event model.

use crate::model::ProcedureStepState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of events the workitem engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// The workitem changed state.
    StateReport,
    /// The workitem reported progress.
    ProgressReport,
    /// Cancellation of an in-progress workitem was requested.
    CancelRequested,
    /// The workitem was assigned to a performer.
    Assigned,
    /// The workitem reached the COMPLETED state.
    Completed,
    /// The workitem reached the CANCELED state.
    Canceled,
}

/// An event emitted by the workitem engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsEvent {
    /// The kind of event.
    pub event_type: EventType,
    /// The workitem the event refers to.
    pub workitem_uid: String,
    /// The transaction UID active at the time of the event, if any.
    pub transaction_uid: Option<String>,
    /// When the event was committed.
    pub timestamp: DateTime<Utc>,
    /// Event-specific payload.
    pub payload: serde_json::Value,
}

impl UpsEvent {
    /// Build a state report event for the given state change.
    pub fn state_report(
        workitem_uid: impl Into<String>,
        new_state: ProcedureStepState,
        transaction_uid: Option<String>,
    ) -> Self {
        UpsEvent {
            event_type: EventType::StateReport,
            workitem_uid: workitem_uid.into(),
            transaction_uid,
            timestamp: Utc::now(),
            payload: serde_json::json!({ "newState": new_state.as_str() }),
        }
    }

    /// Build an event of the given type with a custom payload.
    pub fn with_payload(
        event_type: EventType,
        workitem_uid: impl Into<String>,
        transaction_uid: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        UpsEvent {
            event_type,
            workitem_uid: workitem_uid.into(),
            transaction_uid,
            timestamp: Utc::now(),
            payload,
        }
    }
}
