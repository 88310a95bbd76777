//! This crate contains the base data types for handling DICOM information:
//! attribute tags, value representations, element headers, primitive values
//! and the data dictionary.
//!
//! The types here make no assumption about the encoding of the data set,
//! which is the responsibility of the `radlink-encoding` crate.
pub mod dictionary;
pub mod header;
pub mod value;

pub use crate::dictionary::{DataDictionary, DictionaryEntry, StandardDataDictionary};
pub use crate::dictionary::{tags, uids};
pub use crate::header::{
    DataElement, DataElementHeader, HasLength, Header, Length, SequenceItemHeader, Tag, VR,
};
pub use crate::value::{CastValueError, ConvertValueError, PrimitiveValue, Value, ValueType, C};
