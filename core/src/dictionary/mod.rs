//! This module contains the concept of a DICOM data dictionary,
//! plus a built-in dictionary of the standard attributes
//! handled by this tool kit.
//!
//! Unknown attributes, including private ones, are not an error:
//! their value representation falls back to UN.

pub mod entries;
pub mod tags;
pub mod uids;

use crate::header::{Tag, VR};
use std::fmt::Debug;

/// Type trait for a dictionary of DICOM attributes,
/// mapping a tag to an alias and a value representation.
///
/// The methods herein have no generic parameters,
/// so as to enable being used as a trait object.
pub trait DataDictionary: Debug {
    /// Fetch an entry by its tag.
    fn by_tag(&self, tag: Tag) -> Option<&DictionaryEntry>;

    /// Fetch an entry by its usual alias
    /// (e.g. "PatientName" or "SOPInstanceUID").
    /// Aliases are case sensitive and not separated by spaces.
    fn by_name(&self, name: &str) -> Option<&DictionaryEntry>;

    /// Retrieve the typical value representation of the given tag,
    /// falling back to UN for attributes not in the dictionary.
    fn vr_of(&self, tag: Tag) -> VR {
        self.by_tag(tag).map(|e| e.vr).unwrap_or(VR::UN)
    }
}

/// A dictionary entry for a standard DICOM attribute.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DictionaryEntry {
    /// The attribute tag
    pub tag: Tag,
    /// The alias of the attribute, with no spaces, in UpperCamelCase
    pub alias: &'static str,
    /// The typical value representation of the attribute
    pub vr: VR,
}

/// A view of the standard data dictionary.
///
/// This is a unit type: all state is in a compiled-in table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDataDictionary;

impl DataDictionary for StandardDataDictionary {
    fn by_tag(&self, tag: Tag) -> Option<&DictionaryEntry> {
        entries::ENTRIES
            .binary_search_by_key(&tag, |e| e.tag)
            .ok()
            .map(|i| &entries::ENTRIES[i])
    }

    fn by_name(&self, name: &str) -> Option<&DictionaryEntry> {
        entries::ENTRIES.iter().find(|e| e.alias == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_lookup() {
        let dict = StandardDataDictionary;
        assert_eq!(dict.vr_of(tags::PATIENT_NAME), VR::PN);
        assert_eq!(dict.vr_of(tags::PIXEL_DATA), VR::OW);
        assert_eq!(dict.vr_of(tags::STATUS), VR::US);
        // private tags fall back to UN
        assert_eq!(dict.vr_of(Tag(0x0009, 0x0010)), VR::UN);
    }

    #[test]
    fn lookup_by_alias() {
        let dict = StandardDataDictionary;
        let entry = dict.by_name("ProcedureStepState").unwrap();
        assert_eq!(entry.tag, tags::PROCEDURE_STEP_STATE);
        assert_eq!(entry.vr, VR::CS);
    }

    #[test]
    fn entries_are_sorted_by_tag() {
        let mut prev = None;
        for e in entries::ENTRIES {
            if let Some(p) = prev {
                assert!(p < e.tag, "entry {} out of order", e.tag);
            }
            prev = Some(e.tag);
        }
    }
}
