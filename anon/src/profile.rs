//! Anonymization profiles: per-tag action tables.

use radlink_core::{tags, Tag};
use std::collections::BTreeMap;

/// The action applied to one attribute during anonymization.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Remove the attribute altogether.
    Remove,
    /// Keep the attribute with an empty value.
    Empty,
    /// Replace the value with the given dummy.
    ReplaceWithDummy(String),
    /// Replace the value with a stable hash of itself.
    Hash,
    /// Shift date values by a fixed number of days.
    ShiftDate(i64),
    /// Replace the UID, consistently across the batch.
    RegenerateUid,
}

/// The built-in anonymization profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Remove protected identifiers;
    /// the patient ID becomes a stable pseudonym.
    Basic,
    /// Basic, plus all dates shifted by a fixed day offset
    /// (preserving intervals) and times of day blanked.
    ClinicalTrial {
        /// the day offset applied to every date attribute
        day_offset: i64,
    },
    /// Minimal: direct identifiers removed,
    /// clinical metadata retained.
    Research,
}

/// The UID-valued attributes which are regenerated consistently
/// in every profile.
const UID_TAGS: &[Tag] = &[
    tags::SOP_INSTANCE_UID,
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_INSTANCE_UID,
    tags::FRAME_OF_REFERENCE_UID,
    tags::REFERENCED_SOP_INSTANCE_UID,
];

/// The date-valued attributes affected by date shifting.
const DATE_TAGS: &[Tag] = &[
    tags::STUDY_DATE,
    tags::SERIES_DATE,
    tags::ACQUISITION_DATE,
    tags::CONTENT_DATE,
    tags::INSTANCE_CREATION_DATE,
    tags::PATIENT_BIRTH_DATE,
];

/// The time-of-day attributes blanked by the clinical trial profile.
const TIME_TAGS: &[Tag] = &[
    tags::STUDY_TIME,
    tags::SERIES_TIME,
    tags::INSTANCE_CREATION_TIME,
    tags::PATIENT_BIRTH_TIME,
];

/// The direct identifiers removed by every profile.
const DIRECT_IDENTIFIER_TAGS: &[Tag] = &[
    tags::PATIENT_ADDRESS,
    tags::OTHER_PATIENT_IDS,
    tags::PATIENT_COMMENTS,
    tags::REFERRING_PHYSICIAN_NAME,
    tags::PERFORMING_PHYSICIAN_NAME,
    tags::OPERATORS_NAME,
    tags::INSTITUTION_NAME,
    tags::STATION_NAME,
    tags::ACCESSION_NUMBER,
];

/// An anonymization plan: the effective tag → action table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionTable {
    actions: BTreeMap<Tag, Action>,
}

impl ActionTable {
    /// The action table of a built-in profile.
    pub fn for_profile(profile: Profile) -> Self {
        let mut actions = BTreeMap::new();

        for &tag in UID_TAGS {
            actions.insert(tag, Action::RegenerateUid);
        }
        for &tag in DIRECT_IDENTIFIER_TAGS {
            actions.insert(tag, Action::Remove);
        }

        match profile {
            Profile::Basic => {
                actions.insert(
                    tags::PATIENT_NAME,
                    Action::ReplaceWithDummy("ANONYMOUS".to_string()),
                );
                actions.insert(tags::PATIENT_ID, Action::Hash);
                actions.insert(tags::PATIENT_BIRTH_DATE, Action::Empty);
            }
            Profile::ClinicalTrial { day_offset } => {
                actions.insert(
                    tags::PATIENT_NAME,
                    Action::ReplaceWithDummy("ANONYMOUS".to_string()),
                );
                actions.insert(tags::PATIENT_ID, Action::Hash);
                for &tag in DATE_TAGS {
                    actions.insert(tag, Action::ShiftDate(day_offset));
                }
                for &tag in TIME_TAGS {
                    actions.insert(tag, Action::Empty);
                }
            }
            Profile::Research => {
                actions.insert(tags::PATIENT_NAME, Action::Remove);
                actions.insert(tags::PATIENT_ID, Action::Hash);
            }
        }
        ActionTable { actions }
    }

    /// Build a custom table from an explicit tag → action map.
    pub fn custom(map: impl IntoIterator<Item = (Tag, Action)>) -> Self {
        ActionTable {
            actions: map.into_iter().collect(),
        }
    }

    /// Override the action for one attribute.
    pub fn set(&mut self, tag: Tag, action: Action) {
        self.actions.insert(tag, action);
    }

    /// The action for the given attribute, if any.
    pub fn action_for(&self, tag: Tag) -> Option<&Action> {
        self.actions.get(&tag)
    }

    /// Iterate over the table entries.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Action)> {
        self.actions.iter()
    }
}
