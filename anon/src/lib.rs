//! Profile-driven anonymization of DICOM objects.
//!
//! The anonymizer applies a per-tag action table to each object of a
//! batch, keeping a session-scoped map of regenerated UIDs so that
//! references between objects stay consistent, and a stable hash for
//! patient pseudonymization.

pub mod audit;
pub mod profile;

pub use crate::audit::{AuditEvent, AuditLog, AuditOutcome};
pub use crate::profile::{Action, ActionTable, Profile};

use chrono::{Duration, NaiveDate};
use radlink_core::value::PrimitiveValue;
use radlink_core::{DataElement, Tag, VR};
use radlink_object::InMemObject;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;
use uuid::Uuid;

/// An anonymization session over one batch of objects.
///
/// The session owns the old → new UID map;
/// anonymizing every object of a batch through the same session
/// keeps their cross references intact.
#[derive(Debug)]
pub struct Anonymizer {
    table: ActionTable,
    /// dotted-decimal root under which new UIDs are generated
    uid_root: String,
    uid_map: HashMap<String, String>,
    warned_private_groups: BTreeSet<u16>,
}

impl Anonymizer {
    /// Create a session for the given profile.
    pub fn new(profile: Profile) -> Self {
        Self::with_table(ActionTable::for_profile(profile))
    }

    /// Create a session with a custom action table.
    pub fn with_table(table: ActionTable) -> Self {
        Anonymizer {
            table,
            uid_root: "2.25".to_string(),
            uid_map: HashMap::new(),
            warned_private_groups: BTreeSet::new(),
        }
    }

    /// Override the root under which regenerated UIDs are formed.
    pub fn uid_root(mut self, root: impl Into<String>) -> Self {
        self.uid_root = root.into();
        self
    }

    /// The replacement for the given UID,
    /// generated on first sight and stable afterwards.
    pub fn mapped_uid(&mut self, original: &str) -> String {
        if let Some(mapped) = self.uid_map.get(original) {
            return mapped.clone();
        }
        let mapped = format!("{}.{}", self.uid_root, Uuid::new_v4().as_u128());
        self.uid_map
            .insert(original.to_string(), mapped.clone());
        mapped
    }

    /// Anonymize one object in place.
    pub fn anonymize(&mut self, obj: &mut InMemObject) {
        // private groups are not transformed, only reported:
        // the operator may wish to strip them
        for group in obj
            .tags()
            .filter(|t| t.is_private())
            .map(|t| t.group())
            .collect::<BTreeSet<u16>>()
        {
            if self.warned_private_groups.insert(group) {
                warn!(
                    "object carries private group {:#06X}, consider stripping it",
                    group
                );
            }
        }

        let targets: Vec<Tag> = obj
            .tags()
            .filter(|tag| self.table.action_for(*tag).is_some())
            .collect();

        for tag in targets {
            let action = self
                .table
                .action_for(tag)
                .cloned()
                .unwrap_or(Action::Remove);
            self.apply(obj, tag, &action);
        }
    }

    fn apply(&mut self, obj: &mut InMemObject, tag: Tag, action: &Action) {
        let element = match obj.get(tag) {
            Some(e) => e.clone(),
            None => return,
        };
        let vr = element.vr();

        match action {
            Action::Remove => {
                obj.remove(tag);
            }
            Action::Empty => {
                obj.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
            }
            Action::ReplaceWithDummy(dummy) => {
                obj.put(DataElement::new(
                    tag,
                    vr,
                    PrimitiveValue::strs([dummy.as_str()]),
                ));
            }
            Action::Hash => {
                if let Ok(original) = element.to_str() {
                    let pseudonym = hash_pseudonym(&original);
                    obj.put(DataElement::new(
                        tag,
                        vr,
                        PrimitiveValue::strs([pseudonym]),
                    ));
                }
            }
            Action::ShiftDate(days) => {
                if let Ok(original) = element.to_str() {
                    if let Some(shifted) = shift_date(original.trim(), *days) {
                        obj.put(DataElement::new(
                            tag,
                            VR::DA,
                            PrimitiveValue::strs([shifted]),
                        ));
                    }
                }
            }
            Action::RegenerateUid => {
                if let Ok(original) = element.to_str() {
                    let original = original.trim_end_matches(['\0', ' ']).to_string();
                    if original.is_empty() {
                        return;
                    }
                    let mapped = self.mapped_uid(&original);
                    obj.put(DataElement::new(
                        tag,
                        VR::UI,
                        PrimitiveValue::strs([mapped]),
                    ));
                }
            }
        }
    }
}

/// A stable pseudonym for an identifier:
/// the first 16 hex digits of its SHA-256.
fn hash_pseudonym(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Shift a DICOM DA value (`YYYYMMDD`) by the given number of days.
fn shift_date(value: &str, days: i64) -> Option<String> {
    let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
    let shifted = date.checked_add_signed(Duration::days(days))?;
    Some(shifted.format("%Y%m%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::tags;

    fn sample(sop_uid: &str, study_uid: &str) -> InMemObject {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_NAME, "DOE^JANE").unwrap();
        obj.set_string(tags::PATIENT_ID, "PID-42").unwrap();
        obj.set_string(tags::SOP_INSTANCE_UID, sop_uid).unwrap();
        obj.set_string(tags::STUDY_INSTANCE_UID, study_uid).unwrap();
        obj.set_string(tags::STUDY_DATE, "20260314").unwrap();
        obj.set_string(tags::ACCESSION_NUMBER, "ACC123").unwrap();
        obj
    }

    #[test]
    fn basic_profile_removes_and_replaces() {
        let mut anonymizer = Anonymizer::new(Profile::Basic);
        let mut obj = sample("1.2.3.1", "1.2.3");
        anonymizer.anonymize(&mut obj);

        assert_eq!(
            obj.get(tags::PATIENT_NAME).unwrap().to_str().unwrap(),
            "ANONYMOUS"
        );
        assert!(obj.get(tags::ACCESSION_NUMBER).is_none());
        // the patient ID becomes a stable pseudonym, not the original
        let pseudonym = obj.get(tags::PATIENT_ID).unwrap().to_str().unwrap().to_string();
        assert_ne!(pseudonym, "PID-42");
        assert_eq!(pseudonym.len(), 16);
    }

    #[test]
    fn pseudonym_is_stable_across_a_batch() {
        let mut anonymizer = Anonymizer::new(Profile::Basic);
        let mut a = sample("1.2.3.1", "1.2.3");
        let mut b = sample("1.2.3.2", "1.2.3");
        anonymizer.anonymize(&mut a);
        anonymizer.anonymize(&mut b);
        assert_eq!(
            a.get(tags::PATIENT_ID).unwrap().to_str().unwrap(),
            b.get(tags::PATIENT_ID).unwrap().to_str().unwrap()
        );
    }

    #[test]
    fn uid_remap_is_consistent_within_the_session() {
        let mut anonymizer = Anonymizer::new(Profile::Basic);
        let mut a = sample("1.2.3.1", "1.2.3");
        let mut b = sample("1.2.3.2", "1.2.3");
        anonymizer.anonymize(&mut a);
        anonymizer.anonymize(&mut b);

        let study_a = a.get(tags::STUDY_INSTANCE_UID).unwrap().to_str().unwrap().to_string();
        let study_b = b.get(tags::STUDY_INSTANCE_UID).unwrap().to_str().unwrap().to_string();
        // same original study UID, same replacement
        assert_eq!(study_a, study_b);
        assert_ne!(study_a, "1.2.3");

        // different original SOP UIDs, different replacements
        let sop_a = a.get(tags::SOP_INSTANCE_UID).unwrap().to_str().unwrap().to_string();
        let sop_b = b.get(tags::SOP_INSTANCE_UID).unwrap().to_str().unwrap().to_string();
        assert_ne!(sop_a, sop_b);
    }

    #[test]
    fn clinical_trial_shifts_dates_preserving_intervals() {
        let mut anonymizer = Anonymizer::new(Profile::ClinicalTrial { day_offset: -30 });
        let mut a = sample("1.2.3.1", "1.2.3");
        a.set_string(tags::SERIES_DATE, "20260316").unwrap();
        anonymizer.anonymize(&mut a);

        assert_eq!(
            a.get(tags::STUDY_DATE).unwrap().to_str().unwrap(),
            "20260212"
        );
        assert_eq!(
            a.get(tags::SERIES_DATE).unwrap().to_str().unwrap(),
            "20260214"
        );
    }

    #[test]
    fn custom_table_is_honored() {
        let table = ActionTable::custom([(
            tags::PATIENT_NAME,
            Action::ReplaceWithDummy("SUBJECT^001".to_string()),
        )]);
        let mut anonymizer = Anonymizer::with_table(table);
        let mut obj = sample("1.2.3.1", "1.2.3");
        anonymizer.anonymize(&mut obj);
        assert_eq!(
            obj.get(tags::PATIENT_NAME).unwrap().to_str().unwrap(),
            "SUBJECT^001"
        );
        // attributes outside the custom table stay put
        assert!(obj.get(tags::ACCESSION_NUMBER).is_some());
    }
}
