//! The unified procedure step workitem model:
//! states, priorities and the state transition table.

use chrono::{DateTime, Utc};
use radlink_core::tags;
use radlink_object::InMemObject;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a procedure step, as carried in
/// ProcedureStepState (0074,1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureStepState {
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELED")]
    Canceled,
}

/// The state transition table of the procedure step state machine.
/// Terminal states have no outgoing transitions.
const TRANSITIONS: &[(ProcedureStepState, ProcedureStepState)] = &[
    (ProcedureStepState::Scheduled, ProcedureStepState::InProgress),
    (ProcedureStepState::Scheduled, ProcedureStepState::Canceled),
    (ProcedureStepState::InProgress, ProcedureStepState::Completed),
    (ProcedureStepState::InProgress, ProcedureStepState::Canceled),
];

impl ProcedureStepState {
    /// The defined term of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcedureStepState::Scheduled => "SCHEDULED",
            ProcedureStepState::InProgress => "IN PROGRESS",
            ProcedureStepState::Completed => "COMPLETED",
            ProcedureStepState::Canceled => "CANCELED",
        }
    }

    /// Parse a defined term into a state.
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value.trim() {
            "SCHEDULED" => Some(ProcedureStepState::Scheduled),
            "IN PROGRESS" => Some(ProcedureStepState::InProgress),
            "COMPLETED" => Some(ProcedureStepState::Completed),
            "CANCELED" => Some(ProcedureStepState::Canceled),
            _ => None,
        }
    }

    /// Whether no further state change is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcedureStepState::Completed | ProcedureStepState::Canceled
        )
    }

    /// Whether the transition from this state to the target
    /// appears in the state table.
    pub fn can_transition(self, target: ProcedureStepState) -> bool {
        TRANSITIONS.contains(&(self, target))
    }
}

impl fmt::Display for ProcedureStepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The scheduled priority of a workitem,
/// as carried in ScheduledProcedureStepPriority (0074,1200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpsPriority {
    #[serde(rename = "STAT")]
    Stat,
    #[serde(rename = "HIGH")]
    High,
    #[default]
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
}

impl UpsPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            UpsPriority::Stat => "STAT",
            UpsPriority::High => "HIGH",
            UpsPriority::Medium => "MEDIUM",
            UpsPriority::Low => "LOW",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value.trim() {
            "STAT" => Some(UpsPriority::Stat),
            "HIGH" => Some(UpsPriority::High),
            "MEDIUM" => Some(UpsPriority::Medium),
            "LOW" => Some(UpsPriority::Low),
            _ => None,
        }
    }
}

/// A unified procedure step workitem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workitem {
    /// The SOP instance UID of the workitem.
    pub uid: String,
    /// The current procedure step state.
    pub state: ProcedureStepState,
    /// The scheduled priority.
    pub priority: UpsPriority,
    /// The transaction UID recorded when the workitem
    /// was claimed (moved to IN PROGRESS).
    pub transaction_uid: Option<String>,
    /// The worklist this item belongs to.
    pub worklist_label: Option<String>,
    /// A human-readable label of the step.
    pub procedure_step_label: Option<String>,
    /// When the step is scheduled to start (DICOM DT form).
    pub scheduled_start: Option<String>,
    /// When the step is expected to complete (DICOM DT form).
    pub expected_completion: Option<String>,
    /// The name of the referenced patient.
    pub patient_name: Option<String>,
    /// The ID of the referenced patient.
    pub patient_id: Option<String>,
    /// The study this step refers to.
    pub study_instance_uid: Option<String>,
    /// The AE title or name of the assigned performer.
    pub performer: Option<String>,
    /// Progress, in percent.
    pub progress: Option<u32>,
    /// A description of the current progress.
    pub progress_description: Option<String>,
    /// The reason given for a cancellation request.
    pub cancellation_reason: Option<String>,
    /// When the workitem was created.
    pub created_at: DateTime<Utc>,
}

impl Workitem {
    /// Create a scheduled workitem with the given UID.
    pub fn new(uid: impl Into<String>, priority: UpsPriority) -> Self {
        Workitem {
            uid: uid.into(),
            state: ProcedureStepState::Scheduled,
            priority,
            transaction_uid: None,
            worklist_label: None,
            procedure_step_label: None,
            scheduled_start: None,
            expected_completion: None,
            patient_name: None,
            patient_id: None,
            study_instance_uid: None,
            performer: None,
            progress: None,
            progress_description: None,
            cancellation_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Render the workitem as a DICOM data set over the UPS attributes.
    pub fn to_object(&self) -> InMemObject {
        let mut obj = InMemObject::new();
        let _ = obj.set_string(tags::SOP_INSTANCE_UID, self.uid.clone());
        let _ = obj.set_string(tags::PROCEDURE_STEP_STATE, self.state.as_str());
        let _ = obj.set_string(
            tags::SCHEDULED_PROCEDURE_STEP_PRIORITY,
            self.priority.as_str(),
        );
        if let Some(v) = &self.transaction_uid {
            let _ = obj.set_string(tags::TRANSACTION_UID, v.clone());
        }
        if let Some(v) = &self.worklist_label {
            let _ = obj.set_string(tags::WORKLIST_LABEL, v.clone());
        }
        if let Some(v) = &self.procedure_step_label {
            let _ = obj.set_string(tags::PROCEDURE_STEP_LABEL, v.clone());
        }
        if let Some(v) = &self.scheduled_start {
            let _ = obj.set_string(tags::SCHEDULED_PROCEDURE_STEP_START_DATE_TIME, v.clone());
        }
        if let Some(v) = &self.expected_completion {
            let _ = obj.set_string(tags::EXPECTED_COMPLETION_DATE_TIME, v.clone());
        }
        if let Some(v) = &self.patient_name {
            let _ = obj.set_string(tags::PATIENT_NAME, v.clone());
        }
        if let Some(v) = &self.patient_id {
            let _ = obj.set_string(tags::PATIENT_ID, v.clone());
        }
        if let Some(v) = &self.study_instance_uid {
            let _ = obj.set_string(tags::STUDY_INSTANCE_UID, v.clone());
        }
        if let Some(v) = &self.performer {
            let _ = obj.set_string(tags::PERFORMING_PHYSICIAN_NAME, v.clone());
        }
        if let Some(v) = self.progress {
            let _ = obj.set_int(tags::PROCEDURE_STEP_PROGRESS, i64::from(v));
        }
        if let Some(v) = &self.progress_description {
            let _ = obj.set_string(tags::PROCEDURE_STEP_PROGRESS_DESCRIPTION, v.clone());
        }
        if let Some(v) = &self.cancellation_reason {
            let _ = obj.set_string(tags::REASON_FOR_CANCELLATION, v.clone());
        }
        obj
    }

    /// Reconstruct a workitem from a DICOM data set.
    /// Unknown or missing attributes fall back to defaults.
    pub fn from_object(obj: &InMemObject) -> Option<Self> {
        let get = |tag| {
            obj.get(tag)
                .and_then(|e| e.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let uid = get(tags::SOP_INSTANCE_UID)?;
        let state = get(tags::PROCEDURE_STEP_STATE)
            .and_then(|s| ProcedureStepState::from_str_opt(&s))
            .unwrap_or(ProcedureStepState::Scheduled);
        let priority = get(tags::SCHEDULED_PROCEDURE_STEP_PRIORITY)
            .and_then(|s| UpsPriority::from_str_opt(&s))
            .unwrap_or_default();
        Some(Workitem {
            state,
            priority,
            transaction_uid: get(tags::TRANSACTION_UID),
            worklist_label: get(tags::WORKLIST_LABEL),
            procedure_step_label: get(tags::PROCEDURE_STEP_LABEL),
            scheduled_start: get(tags::SCHEDULED_PROCEDURE_STEP_START_DATE_TIME),
            expected_completion: get(tags::EXPECTED_COMPLETION_DATE_TIME),
            patient_name: get(tags::PATIENT_NAME),
            patient_id: get(tags::PATIENT_ID),
            study_instance_uid: get(tags::STUDY_INSTANCE_UID),
            performer: get(tags::PERFORMING_PHYSICIAN_NAME),
            progress: obj
                .get(tags::PROCEDURE_STEP_PROGRESS)
                .and_then(|e| e.to_int().ok()),
            progress_description: get(tags::PROCEDURE_STEP_PROGRESS_DESCRIPTION),
            cancellation_reason: get(tags::REASON_FOR_CANCELLATION),
            created_at: Utc::now(),
            uid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use ProcedureStepState::*;
        assert!(Scheduled.can_transition(InProgress));
        assert!(Scheduled.can_transition(Canceled));
        assert!(InProgress.can_transition(Completed));
        assert!(InProgress.can_transition(Canceled));

        assert!(!Scheduled.can_transition(Completed));
        assert!(!InProgress.can_transition(Scheduled));
        // terminal states have empty outgoing sets
        for target in [Scheduled, InProgress, Completed, Canceled] {
            assert!(!Completed.can_transition(target));
            assert!(!Canceled.can_transition(target));
        }
    }

    #[test]
    fn workitem_object_round_trip() {
        let mut item = Workitem::new("1.2.3.9.1", UpsPriority::High);
        item.patient_name = Some("TEST^PATIENT".to_string());
        item.patient_id = Some("12345".to_string());
        item.procedure_step_label = Some("CT CHEST".to_string());
        item.scheduled_start = Some("20260801120000".to_string());

        let object = item.to_object();
        let back = Workitem::from_object(&object).unwrap();
        assert_eq!(back.uid, item.uid);
        assert_eq!(back.state, item.state);
        assert_eq!(back.priority, item.priority);
        assert_eq!(back.patient_name, item.patient_name);
        assert_eq!(back.procedure_step_label, item.procedure_step_label);
    }
}
