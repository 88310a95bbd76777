//! This module contains the in-memory DICOM object implementation:
//! an ordered dictionary of elements, in which sequence elements
//! own their items as nested objects.

use radlink_core::dictionary::{DataDictionary, StandardDataDictionary};
use radlink_core::value::{PrimitiveValue, Value, C};
use radlink_core::{DataElement, Length, Tag, VR};
use snafu::{ensure, Snafu};
use std::collections::btree_map::{self, BTreeMap};

/// The data element type of an in-memory object:
/// sequence items are in-memory objects themselves.
pub type InMemElement = DataElement<InMemObject>;

/// An error which occurs when a setter would create an element
/// whose value violates the rules of its value representation.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum ValueError {
    #[snafu(display("attribute {} does not take a string value (VR {})", tag, vr))]
    NotAStringVr { tag: Tag, vr: VR },

    #[snafu(display("attribute {} does not take an integer value (VR {})", tag, vr))]
    NotAnIntegerVr { tag: Tag, vr: VR },

    #[snafu(display("attribute {} does not take binary data (VR {})", tag, vr))]
    NotABinaryVr { tag: Tag, vr: VR },

    #[snafu(display("attribute {} is not a sequence (VR {})", tag, vr))]
    NotASequenceVr { tag: Tag, vr: VR },

    #[snafu(display(
        "value of attribute {} is {} bytes long, over the {}-byte limit of VR {}",
        tag,
        len,
        max,
        vr
    ))]
    ValueTooLong { tag: Tag, vr: VR, len: usize, max: u32 },

    #[snafu(display("value of attribute {} holds characters illegal in VR {}", tag, vr))]
    InvalidCharacters { tag: Tag, vr: VR },

    #[snafu(display("value {} is out of range for attribute {} (VR {})", value, tag, vr))]
    IntegerOutOfRange { tag: Tag, vr: VR, value: i64 },

    #[snafu(display(
        "value of attribute {} is {} bytes long, VR {} requires an even count",
        tag,
        len,
        vr
    ))]
    OddLength { tag: Tag, vr: VR, len: usize },
}

type Result<T, E = ValueError> = std::result::Result<T, E>;

/// An error raised when an attribute is not present in the object.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("no such attribute {}", tag))]
pub struct NoSuchAttributeError {
    /// the missing tag
    pub tag: Tag,
}

/// A DICOM object kept entirely in memory:
/// an ordered mapping from attribute tag to data element.
///
/// Elements iterate in ascending tag order
/// and there are never two elements with the same tag.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InMemObject {
    entries: BTreeMap<Tag, InMemElement>,
}

impl InMemObject {
    /// Create a new empty object.
    pub fn new() -> Self {
        InMemObject::default()
    }

    /// Construct an object from an iterator of structured elements.
    pub fn from_element_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = InMemElement>,
    {
        let mut obj = InMemObject::new();
        for elt in iter {
            obj.put(elt);
        }
        obj
    }

    /// The number of elements in the object.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the object holds no elements.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retrieve the element with the given tag, if present.
    pub fn get(&self, tag: Tag) -> Option<&InMemElement> {
        self.entries.get(&tag)
    }

    /// Retrieve the element with the given tag,
    /// raising an error when it is not present.
    pub fn element(&self, tag: Tag) -> Result<&InMemElement, NoSuchAttributeError> {
        self.entries.get(&tag).ok_or(NoSuchAttributeError { tag })
    }

    /// Insert a data element into the object,
    /// replacing and returning the previous element with the same tag.
    pub fn put(&mut self, elt: InMemElement) -> Option<InMemElement> {
        self.entries.insert(elt.header().tag, elt)
    }

    /// Remove the element with the given tag,
    /// reporting whether it was present.
    pub fn remove(&mut self, tag: Tag) -> bool {
        self.entries.remove(&tag).is_some()
    }

    /// Remove and return the element with the given tag.
    pub fn take(&mut self, tag: Tag) -> Option<InMemElement> {
        self.entries.remove(&tag)
    }

    /// Retain only the elements for which the predicate holds.
    pub fn retain(&mut self, mut f: impl FnMut(&InMemElement) -> bool) {
        self.entries.retain(|_, elt| f(elt));
    }

    /// Iterate over the elements in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = &InMemElement> + '_ {
        self.entries.values()
    }

    /// Iterate over the tags in ascending order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.keys().copied()
    }

    /// Set a string value on the given attribute,
    /// with the value representation inferred from the data dictionary.
    ///
    /// The value is validated against the VR's character repertoire
    /// and maximum length before the element is created.
    pub fn set_string(&mut self, tag: Tag, value: impl Into<String>) -> Result<()> {
        let vr = StandardDataDictionary.vr_of(tag);
        let value = value.into();
        ensure!(vr.is_string(), NotAStringVrSnafu { tag, vr });
        validate_string(tag, vr, &value)?;
        // store the same form the decoder produces,
        // so that a written and re-read element compares equal
        let prim = if vr.is_multi_valued() {
            PrimitiveValue::strs([value])
        } else {
            PrimitiveValue::from(value)
        };
        self.put(DataElement::new(tag, vr, prim));
        Ok(())
    }

    /// Set a multi-valued string on the given attribute,
    /// with the value representation inferred from the data dictionary.
    pub fn set_strings<I, T>(&mut self, tag: Tag, values: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let vr = StandardDataDictionary.vr_of(tag);
        ensure!(vr.is_multi_valued(), NotAStringVrSnafu { tag, vr });
        let values: C<String> = values.into_iter().map(Into::into).collect();
        for v in &values {
            validate_string(tag, vr, v)?;
        }
        self.put(DataElement::new(tag, vr, PrimitiveValue::Strs(values)));
        Ok(())
    }

    /// Set an integer value on the given attribute,
    /// with the value representation inferred from the data dictionary
    /// and the value checked against the VR's range.
    pub fn set_int(&mut self, tag: Tag, value: i64) -> Result<()> {
        let vr = StandardDataDictionary.vr_of(tag);
        let prim = match vr {
            VR::US => PrimitiveValue::from(in_range::<u16>(tag, vr, value)?),
            VR::UL => PrimitiveValue::from(in_range::<u32>(tag, vr, value)?),
            VR::SS => PrimitiveValue::from(in_range::<i16>(tag, vr, value)?),
            VR::SL => PrimitiveValue::from(in_range::<i32>(tag, vr, value)?),
            VR::UV => PrimitiveValue::from(in_range::<u64>(tag, vr, value)?),
            VR::SV => PrimitiveValue::from(value),
            // integer strings take the canonical decimal form
            VR::IS => PrimitiveValue::from(in_range::<i32>(tag, vr, value)?),
            VR::DS => PrimitiveValue::from(value as f64),
            _ => return NotAnIntegerVrSnafu { tag, vr }.fail(),
        };
        self.put(DataElement::new(tag, vr, prim));
        Ok(())
    }

    /// Set a binary data value on the given attribute.
    /// Only attributes of a binary VR (OB, OW, UN) accept raw bytes.
    ///
    /// Bytes for an OW attribute are stored as 16-bit words
    /// (interpreting the input in little endian),
    /// so they must come in an even count.
    pub fn set_bytes(&mut self, tag: Tag, bytes: Vec<u8>) -> Result<()> {
        let vr = StandardDataDictionary.vr_of(tag);
        let prim = match vr {
            VR::OB | VR::UN => PrimitiveValue::from(bytes),
            VR::OW => {
                ensure!(
                    bytes.len() % 2 == 0,
                    OddLengthSnafu {
                        tag,
                        vr,
                        len: bytes.len()
                    }
                );
                PrimitiveValue::U16(
                    bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect(),
                )
            }
            _ => return NotABinaryVrSnafu { tag, vr }.fail(),
        };
        self.put(DataElement::new(tag, vr, prim));
        Ok(())
    }

    /// Append an item to the sequence attribute with the given tag,
    /// creating the sequence if it does not exist yet.
    ///
    /// Raises an error when the attribute exists and is not a sequence.
    pub fn append_item(&mut self, tag: Tag, item: InMemObject) -> Result<()> {
        let dict_vr = StandardDataDictionary.vr_of(tag);
        ensure!(
            dict_vr == VR::SQ || dict_vr == VR::UN,
            NotASequenceVrSnafu { tag, vr: dict_vr }
        );
        match self.entries.entry(tag) {
            btree_map::Entry::Vacant(e) => {
                let items: C<InMemObject> = smallvec::smallvec![item];
                e.insert(DataElement::new(
                    tag,
                    VR::SQ,
                    Value::new_sequence(items, Length::UNDEFINED),
                ));
                Ok(())
            }
            btree_map::Entry::Occupied(mut e) => {
                let vr = e.get().vr();
                ensure!(vr == VR::SQ, NotASequenceVrSnafu { tag, vr });
                let mut elt = e.get().clone();
                // rebuild the element to keep ownership simple
                let mut items: C<InMemObject> = elt
                    .value()
                    .items()
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                items.push(item);
                elt = DataElement::new(tag, VR::SQ, Value::new_sequence(items, Length::UNDEFINED));
                e.insert(elt);
                Ok(())
            }
        }
    }
}

impl IntoIterator for InMemObject {
    type Item = InMemElement;
    type IntoIter = btree_map::IntoValues<Tag, InMemElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl Extend<InMemElement> for InMemObject {
    fn extend<I: IntoIterator<Item = InMemElement>>(&mut self, iter: I) {
        for elt in iter {
            self.put(elt);
        }
    }
}

fn in_range<T>(tag: Tag, vr: VR, value: i64) -> Result<T>
where
    T: num_traits::NumCast,
{
    num_traits::cast(value).ok_or(ValueError::IntegerOutOfRange { tag, vr, value })
}

fn validate_string(tag: Tag, vr: VR, value: &str) -> Result<()> {
    if let Some(max) = vr.max_value_len() {
        ensure!(
            value.len() <= max as usize,
            ValueTooLongSnafu {
                tag,
                vr,
                len: value.len(),
                max
            }
        );
    }
    let legal = match vr {
        VR::CS => value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == ' ' || c == '_'),
        VR::AE => value.chars().all(|c| c.is_ascii_graphic() || c == ' ') && !value.contains('\\'),
        VR::UI => value.chars().all(|c| c.is_ascii_digit() || c == '.'),
        VR::DA => value.chars().all(|c| c.is_ascii_digit()),
        VR::TM => value.chars().all(|c| c.is_ascii_digit() || c == '.'),
        VR::AS => {
            value.len() == 4
                && value[..3].chars().all(|c| c.is_ascii_digit())
                && matches!(value.as_bytes()[3], b'D' | b'W' | b'M' | b'Y')
        }
        _ => true,
    };
    ensure!(legal, InvalidCharactersSnafu { tag, vr });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::tags;

    #[test]
    fn elements_iterate_in_tag_order() {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_ID, "12345").unwrap();
        obj.set_string(tags::SOP_INSTANCE_UID, "1.2.3.4").unwrap();
        obj.set_string(tags::PATIENT_NAME, "TEST^PATIENT").unwrap();

        let order: Vec<Tag> = obj.tags().collect();
        assert_eq!(
            order,
            vec![tags::SOP_INSTANCE_UID, tags::PATIENT_NAME, tags::PATIENT_ID]
        );
    }

    #[test]
    fn put_replaces_same_tag() {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_ID, "A").unwrap();
        obj.set_string(tags::PATIENT_ID, "B").unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get(tags::PATIENT_ID).unwrap().to_str().unwrap(), "B");
    }

    #[test]
    fn setters_validate_vr_rules() {
        let mut obj = InMemObject::new();
        // UI does not admit letters
        let e = obj.set_string(tags::SOP_INSTANCE_UID, "not-a-uid");
        assert!(matches!(e, Err(ValueError::InvalidCharacters { .. })));
        // AE titles are bounded at 16 bytes
        let e = obj.set_string(tags::RETRIEVE_AE_TITLE, "A_VERY_LONG_AE_TITLE");
        assert!(matches!(e, Err(ValueError::ValueTooLong { .. })));
        // US values must fit in 16 bits
        let e = obj.set_int(tags::ROWS, 100_000);
        assert!(matches!(e, Err(ValueError::IntegerOutOfRange { .. })));
        // binary data cannot go into a string attribute
        let e = obj.set_bytes(tags::PATIENT_NAME, vec![1, 2]);
        assert!(matches!(e, Err(ValueError::NotABinaryVr { .. })));
    }

    #[test]
    fn append_item_builds_a_sequence() {
        let mut obj = InMemObject::new();
        let mut item = InMemObject::new();
        item.set_string(tags::REFERENCED_SOP_INSTANCE_UID, "1.2.3").unwrap();
        obj.append_item(tags::REFERENCED_STUDY_SEQUENCE, item.clone())
            .unwrap();
        obj.append_item(tags::REFERENCED_STUDY_SEQUENCE, item).unwrap();

        let elt = obj.get(tags::REFERENCED_STUDY_SEQUENCE).unwrap();
        assert_eq!(elt.vr(), VR::SQ);
        assert_eq!(elt.value().items().unwrap().len(), 2);

        let e = obj.append_item(tags::PATIENT_NAME, InMemObject::new());
        assert!(matches!(e, Err(ValueError::NotASequenceVr { .. })));
    }
}
