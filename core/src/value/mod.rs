//! A high level abstraction over a DICOM data element's value.

use crate::header::{Length, VR};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::str::FromStr;

mod primitive;

pub use self::primitive::{
    CastValueError, ConvertValueError, PrimitiveValue, ValueType,
};

/// An aggregation of one or more elements in a value.
pub type C<T> = SmallVec<[T; 2]>;

/// Representation of a full DICOM value, which may be primitive,
/// a sequence of items, or an encapsulated pixel data sequence.
///
/// `I` is the complex type for nested data set items.
#[derive(Debug, Clone)]
pub enum Value<I> {
    /// Primitive value.
    Primitive(PrimitiveValue),
    /// A complex sequence of items.
    Sequence {
        /// Item collection.
        items: C<I>,
        /// The size in bytes (may be undefined).
        size: Length,
    },
    /// An encapsulated pixel data sequence.
    /// The offset table is the value of the first item of the sequence.
    PixelSequence {
        /// The value contents of the basic offset table.
        offset_table: C<u8>,
        /// The sequence of compressed fragments.
        fragments: C<Vec<u8>>,
    },
}

impl<I: PartialEq> PartialEq for Value<I> {
    /// Compares value content. The recorded sequence size does not
    /// participate: an undefined length never compares equal to itself.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Sequence { items: a, .. }, Value::Sequence { items: b, .. }) => a == b,
            (
                Value::PixelSequence {
                    offset_table: ot_a,
                    fragments: fr_a,
                },
                Value::PixelSequence {
                    offset_table: ot_b,
                    fragments: fr_b,
                },
            ) => ot_a == ot_b && fr_a == fr_b,
            _ => false,
        }
    }
}

impl<I> From<PrimitiveValue> for Value<I> {
    fn from(value: PrimitiveValue) -> Self {
        Value::Primitive(value)
    }
}

impl<I> Value<I> {
    /// Construct a full DICOM data set sequence value
    /// from a list of items.
    #[inline]
    pub fn new_sequence<T>(items: T, size: Length) -> Self
    where
        T: Into<C<I>>,
    {
        Value::Sequence {
            items: items.into(),
            size,
        }
    }

    /// Construct an encapsulated pixel data sequence value
    /// from an offset table and a list of fragments.
    pub fn new_pixel_sequence<T>(offset_table: C<u8>, fragments: T) -> Self
    where
        T: Into<C<Vec<u8>>>,
    {
        Value::PixelSequence {
            offset_table,
            fragments: fragments.into(),
        }
    }

    /// Obtain the number of individual values.
    /// In a primitive, this is the number of individual elements in the value.
    /// In a sequence, this is the number of items.
    /// In a pixel sequence, this is always 1.
    pub fn multiplicity(&self) -> u32 {
        match self {
            Value::Primitive(v) => v.multiplicity(),
            Value::Sequence { items, .. } => items.len() as u32,
            Value::PixelSequence { .. } => 1,
        }
    }

    /// Retrieve the specific type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Primitive(v) => v.value_type(),
            Value::Sequence { .. } => ValueType::Item,
            Value::PixelSequence { .. } => ValueType::PixelSequence,
        }
    }

    /// Gets a reference to the primitive value.
    pub fn primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Gets a reference to the sequence items.
    pub fn items(&self) -> Option<&[I]> {
        match self {
            Value::Sequence { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Gets a mutable reference to the sequence items.
    pub fn items_mut(&mut self) -> Option<&mut C<I>> {
        match self {
            Value::Sequence { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Retrieves the primitive value, discarding anything else.
    pub fn into_primitive(self) -> Option<PrimitiveValue> {
        match self {
            Value::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Gets a reference to the encapsulated pixel data's offset table.
    pub fn offset_table(&self) -> Option<&[u8]> {
        match self {
            Value::PixelSequence { offset_table, .. } => Some(offset_table),
            _ => None,
        }
    }

    /// Gets a reference to the encapsulated pixel data's fragments.
    pub fn fragments(&self) -> Option<&[Vec<u8>]> {
        match self {
            Value::PixelSequence { fragments, .. } => Some(fragments),
            _ => None,
        }
    }

    /// Compute the number of bytes that the value occupies on the wire
    /// under the given value representation, including the padding byte
    /// required to make the length even.
    ///
    /// Sequences and pixel sequences report an undefined length,
    /// as they are written in delimited form.
    pub fn byte_len(&self, vr: VR) -> Length {
        match self {
            Value::Primitive(v) => v.byte_len(vr),
            Value::Sequence { .. } | Value::PixelSequence { .. } => Length::UNDEFINED,
        }
    }

    /// Convert the full primitive value into a single string,
    /// with multiple values joined by a backslash.
    ///
    /// Returns an error if the value is not primitive.
    pub fn to_str(&self) -> Result<Cow<'_, str>, CastValueError> {
        match self {
            Value::Primitive(prim) => Ok(prim.to_str()),
            _ => Err(CastValueError {
                requested: "string",
                got: self.value_type(),
            }),
        }
    }

    /// Convert the full primitive value into a sequence of strings.
    ///
    /// Returns an error if the value is not primitive.
    pub fn to_multi_str(&self) -> Result<Cow<'_, [String]>, CastValueError> {
        match self {
            Value::Primitive(prim) => Ok(prim.to_multi_str()),
            _ => Err(CastValueError {
                requested: "string",
                got: self.value_type(),
            }),
        }
    }

    /// Convert the full primitive value into raw bytes.
    ///
    /// Returns an error if the value is not primitive.
    pub fn to_bytes(&self) -> Result<Cow<'_, [u8]>, CastValueError> {
        match self {
            Value::Primitive(prim) => Ok(prim.to_bytes()),
            _ => Err(CastValueError {
                requested: "bytes",
                got: self.value_type(),
            }),
        }
    }

    /// Retrieve and convert the first value to an integer.
    ///
    /// Returns an error if the value is not primitive
    /// or cannot be converted.
    pub fn to_int<T>(&self) -> Result<T, ConvertValueError>
    where
        T: num_traits::NumCast + FromStr<Err = std::num::ParseIntError>,
    {
        match self {
            Value::Primitive(prim) => prim.to_int(),
            _ => Err(ConvertValueError {
                requested: "integer",
                original: self.value_type(),
            }),
        }
    }

    /// Retrieve and convert the first value to a 64-bit float.
    ///
    /// Returns an error if the value is not primitive
    /// or cannot be converted.
    pub fn to_float64(&self) -> Result<f64, ConvertValueError> {
        match self {
            Value::Primitive(prim) => prim.to_float64(),
            _ => Err(ConvertValueError {
                requested: "float64",
                original: self.value_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_equality_ignores_recorded_size() {
        let a: Value<()> = Value::new_sequence(C::new(), Length::UNDEFINED);
        let b: Value<()> = Value::new_sequence(C::new(), Length(0));
        assert_eq!(a, b);
    }

    #[test]
    fn primitive_byte_len_is_even() {
        let v: Value<()> = PrimitiveValue::from("ISO_IR 100").into();
        assert_eq!(v.byte_len(VR::CS), Length(10));
        let v: Value<()> = PrimitiveValue::from("MONOCHROME2").into();
        assert_eq!(v.byte_len(VR::CS), Length(12));
        let v: Value<()> = PrimitiveValue::U8(smallvec::smallvec![0x80]).into();
        assert_eq!(v.byte_len(VR::OB), Length(2));
    }
}
