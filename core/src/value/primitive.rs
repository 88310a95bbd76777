//! Declaration and implementation of a DICOM primitive value.

use crate::header::{Length, Tag, VR};
use itertools::Itertools;
use smallvec::SmallVec;
use snafu::Snafu;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// An aggregation of one or more elements in a value.
pub type C<T> = SmallVec<[T; 2]>;

/// An enum representing a primitive value from a DICOM element.
/// The result of decoding an element's data value
/// may be one of the enumerated types
/// depending on its content and value representation.
///
/// Multiple elements are contained in a [`smallvec`] vector,
/// conveniently aliased to the type [`C`].
#[derive(Debug, PartialEq, Clone)]
pub enum PrimitiveValue {
    /// No data. Usually employed for zero-lengthed values.
    Empty,

    /// A sequence of strings.
    /// Used for AE, AS, PN, SH, CS, LO, UI and UC,
    /// as well as DA, DT, TM, DS and IS when read from a data set
    /// with format preservation.
    Strs(C<String>),

    /// A single string.
    /// Used for ST, LT, UT and UR, which are never multi-valued.
    Str(String),

    /// A sequence of attribute tags.
    /// Used specifically for AT.
    Tags(C<Tag>),

    /// A sequence of unsigned 8-bit integers.
    /// Used for OB and UN.
    U8(C<u8>),

    /// A sequence of signed 16-bit integers.
    /// Used for SS.
    I16(C<i16>),

    /// A sequence of unsigned 16-bit integers.
    /// Used for US and OW.
    U16(C<u16>),

    /// A sequence of signed 32-bit integers.
    /// Used for SL.
    I32(C<i32>),

    /// A sequence of unsigned 32-bit integers.
    /// Used for UL and OL.
    U32(C<u32>),

    /// A sequence of signed 64-bit integers.
    /// Used for SV.
    I64(C<i64>),

    /// A sequence of unsigned 64-bit integers.
    /// Used for UV and OV.
    U64(C<u64>),

    /// A sequence of 32-bit floating point numbers.
    /// Used for OF and FL.
    F32(C<f32>),

    /// A sequence of 64-bit floating point numbers.
    /// Used for OD and FD.
    F64(C<f64>),
}

/// The type of a DICOM value, used in conversion error reports.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ValueType {
    /// No data
    Empty,
    /// A sequence of strings
    Strs,
    /// A single string
    Str,
    /// A sequence of attribute tags
    Tags,
    /// A sequence of unsigned 8-bit integers
    U8,
    /// A sequence of signed 16-bit integers
    I16,
    /// A sequence of unsigned 16-bit integers
    U16,
    /// A sequence of signed 32-bit integers
    I32,
    /// A sequence of unsigned 32-bit integers
    U32,
    /// A sequence of signed 64-bit integers
    I64,
    /// A sequence of unsigned 64-bit integers
    U64,
    /// A sequence of 32-bit floats
    F32,
    /// A sequence of 64-bit floats
    F64,
    /// A sequence of data set items
    Item,
    /// An encapsulated pixel data sequence
    PixelSequence,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error raised when requesting a value in a representation
/// which does not match the one effectively stored.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("bad value cast: requested {} but value is {}", requested, got))]
pub struct CastValueError {
    /// The value format requested
    pub requested: &'static str,
    /// The value type effectively stored
    pub got: ValueType,
}

/// An error raised when a value could not be converted
/// into the requested representation.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("could not convert {} value into {}", original, requested))]
pub struct ConvertValueError {
    /// The value format requested
    pub requested: &'static str,
    /// The original value type
    pub original: ValueType,
}

macro_rules! impl_from_for_primitive {
    ($typ: ty, $variant: ident) => {
        impl From<$typ> for PrimitiveValue {
            fn from(value: $typ) -> Self {
                PrimitiveValue::$variant(C::from_elem(value, 1))
            }
        }
    };
}

impl_from_for_primitive!(u8, U8);
impl_from_for_primitive!(u16, U16);
impl_from_for_primitive!(i16, I16);
impl_from_for_primitive!(u32, U32);
impl_from_for_primitive!(i32, I32);
impl_from_for_primitive!(u64, U64);
impl_from_for_primitive!(i64, I64);
impl_from_for_primitive!(f32, F32);
impl_from_for_primitive!(f64, F64);
impl_from_for_primitive!(Tag, Tags);

impl From<String> for PrimitiveValue {
    fn from(value: String) -> Self {
        PrimitiveValue::Str(value)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(value: &str) -> Self {
        PrimitiveValue::Str(value.to_owned())
    }
}

impl From<Vec<u8>> for PrimitiveValue {
    fn from(value: Vec<u8>) -> Self {
        PrimitiveValue::U8(C::from(value))
    }
}

impl From<&[u8]> for PrimitiveValue {
    fn from(value: &[u8]) -> Self {
        PrimitiveValue::U8(C::from(value))
    }
}

impl From<Vec<String>> for PrimitiveValue {
    fn from(value: Vec<String>) -> Self {
        PrimitiveValue::Strs(C::from(value))
    }
}

impl PrimitiveValue {
    /// Create a value holding multiple strings.
    pub fn strs<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        PrimitiveValue::Strs(values.into_iter().map(Into::into).collect())
    }

    /// Obtain the number of individual elements.
    pub fn multiplicity(&self) -> u32 {
        use self::PrimitiveValue::*;
        match self {
            Empty => 0,
            Str(_) => 1,
            Strs(c) => c.len() as u32,
            Tags(c) => c.len() as u32,
            U8(c) => c.len() as u32,
            I16(c) => c.len() as u32,
            U16(c) => c.len() as u32,
            I32(c) => c.len() as u32,
            U32(c) => c.len() as u32,
            I64(c) => c.len() as u32,
            U64(c) => c.len() as u32,
            F32(c) => c.len() as u32,
            F64(c) => c.len() as u32,
        }
    }

    /// Retrieve the specific type of this value.
    pub fn value_type(&self) -> ValueType {
        use self::PrimitiveValue::*;
        match self {
            Empty => ValueType::Empty,
            Strs(_) => ValueType::Strs,
            Str(_) => ValueType::Str,
            Tags(_) => ValueType::Tags,
            U8(_) => ValueType::U8,
            I16(_) => ValueType::I16,
            U16(_) => ValueType::U16,
            I32(_) => ValueType::I32,
            U32(_) => ValueType::U32,
            I64(_) => ValueType::I64,
            U64(_) => ValueType::U64,
            F32(_) => ValueType::F32,
            F64(_) => ValueType::F64,
        }
    }

    /// Convert the primitive value into a string representation.
    ///
    /// String values encoded with the `Str` and `Strs` variants
    /// are provided as is; in the case of `Strs`, the strings are
    /// joined together with a backslash (`'\\'`).
    /// All other variants are formatted into a string,
    /// then joined together with a backslash.
    pub fn to_str(&self) -> Cow<'_, str> {
        use self::PrimitiveValue::*;
        match self {
            Empty => Cow::from(""),
            Str(v) => Cow::from(v.as_str()),
            Strs(v) if v.len() == 1 => Cow::from(v[0].as_str()),
            Strs(v) => Cow::from(v.iter().join("\\")),
            Tags(v) => Cow::from(v.iter().map(|t| t.to_string()).join("\\")),
            U8(v) => Cow::from(v.iter().join("\\")),
            I16(v) => Cow::from(v.iter().join("\\")),
            U16(v) => Cow::from(v.iter().join("\\")),
            I32(v) => Cow::from(v.iter().join("\\")),
            U32(v) => Cow::from(v.iter().join("\\")),
            I64(v) => Cow::from(v.iter().join("\\")),
            U64(v) => Cow::from(v.iter().join("\\")),
            F32(v) => Cow::from(v.iter().join("\\")),
            F64(v) => Cow::from(v.iter().join("\\")),
        }
    }

    /// Convert the primitive value into a sequence of strings.
    pub fn to_multi_str(&self) -> Cow<'_, [String]> {
        use self::PrimitiveValue::*;

        fn owned<T: ToString>(values: &C<T>) -> Cow<'_, [String]> {
            Cow::Owned(values.iter().map(|v| v.to_string()).collect())
        }

        match self {
            Empty => Cow::Owned(vec![]),
            Str(v) => Cow::Owned(vec![v.clone()]),
            Strs(v) => Cow::Borrowed(v),
            Tags(v) => owned(v),
            U8(v) => owned(v),
            I16(v) => owned(v),
            U16(v) => owned(v),
            I32(v) => owned(v),
            U32(v) => owned(v),
            I64(v) => owned(v),
            U64(v) => owned(v),
            F32(v) => owned(v),
            F64(v) => owned(v),
        }
    }

    /// Convert the primitive value into raw bytes.
    ///
    /// String values are provided in UTF-8;
    /// numeric values are provided in their little-endian representation.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        use self::PrimitiveValue::*;

        fn le_bytes<T: Copy, const N: usize>(
            values: &C<T>,
            f: impl Fn(T) -> [u8; N],
        ) -> Cow<'_, [u8]> {
            Cow::Owned(values.iter().flat_map(|v| f(*v)).collect())
        }

        match self {
            Empty => Cow::Borrowed(&[]),
            U8(v) => Cow::Borrowed(v),
            Str(v) => Cow::Borrowed(v.as_bytes()),
            Strs(v) if v.len() == 1 => Cow::Borrowed(v[0].as_bytes()),
            Strs(v) => Cow::Owned(v.iter().join("\\").into_bytes()),
            Tags(v) => Cow::Owned(
                v.iter()
                    .flat_map(|t| {
                        let mut b = [0u8; 4];
                        b[..2].copy_from_slice(&t.group().to_le_bytes());
                        b[2..].copy_from_slice(&t.element().to_le_bytes());
                        b
                    })
                    .collect(),
            ),
            I16(v) => le_bytes(v, i16::to_le_bytes),
            U16(v) => le_bytes(v, u16::to_le_bytes),
            I32(v) => le_bytes(v, i32::to_le_bytes),
            U32(v) => le_bytes(v, u32::to_le_bytes),
            I64(v) => le_bytes(v, i64::to_le_bytes),
            U64(v) => le_bytes(v, u64::to_le_bytes),
            F32(v) => le_bytes(v, f32::to_le_bytes),
            F64(v) => le_bytes(v, f64::to_le_bytes),
        }
    }

    /// Retrieve and convert the first value into an integer.
    ///
    /// String values are parsed after trimming whitespace and
    /// trailing NUL characters; numeric values are cast.
    pub fn to_int<T>(&self) -> Result<T, ConvertValueError>
    where
        T: num_traits::NumCast + FromStr<Err = std::num::ParseIntError>,
    {
        use self::PrimitiveValue::*;

        let err = || ConvertValueError {
            requested: "integer",
            original: self.value_type(),
        };

        match self {
            Str(s) => s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .parse()
                .map_err(|_| err()),
            Strs(s) if !s.is_empty() => s[0]
                .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .parse()
                .map_err(|_| err()),
            U8(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            I16(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            U16(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            I32(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            U32(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            I64(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            U64(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            F32(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            F64(v) if !v.is_empty() => num_traits::cast(v[0]).ok_or_else(err),
            _ => Err(err()),
        }
    }

    /// Retrieve and convert the first value into a 64-bit float.
    ///
    /// Decimal strings are parsed after trimming whitespace;
    /// numeric values are cast.
    pub fn to_float64(&self) -> Result<f64, ConvertValueError> {
        use self::PrimitiveValue::*;

        let err = || ConvertValueError {
            requested: "float64",
            original: self.value_type(),
        };

        match self {
            Str(s) => s.trim().parse().map_err(|_| err()),
            Strs(s) if !s.is_empty() => s[0].trim().parse().map_err(|_| err()),
            U8(v) if !v.is_empty() => Ok(f64::from(v[0])),
            I16(v) if !v.is_empty() => Ok(f64::from(v[0])),
            U16(v) if !v.is_empty() => Ok(f64::from(v[0])),
            I32(v) if !v.is_empty() => Ok(f64::from(v[0])),
            U32(v) if !v.is_empty() => Ok(f64::from(v[0])),
            I64(v) if !v.is_empty() => Ok(v[0] as f64),
            U64(v) if !v.is_empty() => Ok(v[0] as f64),
            F32(v) if !v.is_empty() => Ok(f64::from(v[0])),
            F64(v) if !v.is_empty() => Ok(v[0]),
            _ => Err(err()),
        }
    }

    /// Compute the number of bytes which the value occupies on the wire
    /// under the given value representation, after padding to an even
    /// length with the VR's padding byte.
    pub fn byte_len(&self, vr: VR) -> Length {
        use self::PrimitiveValue::*;

        fn even(len: usize) -> Length {
            Length((len as u32) + (len as u32 & 1))
        }

        if vr.is_string() {
            return even(self.to_str().len());
        }

        match self {
            Empty => Length(0),
            Str(s) => even(s.len()),
            Strs(_) => even(self.to_str().len()),
            Tags(v) => Length(v.len() as u32 * 4),
            U8(v) => even(v.len()),
            I16(v) => Length(v.len() as u32 * 2),
            U16(v) => Length(v.len() as u32 * 2),
            I32(v) => Length(v.len() as u32 * 4),
            U32(v) => Length(v.len() as u32 * 4),
            I64(v) => Length(v.len() as u32 * 8),
            U64(v) => Length(v.len() as u32 * 8),
            F32(v) => Length(v.len() as u32 * 4),
            F64(v) => Length(v.len() as u32 * 8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn primitive_from_single_values() {
        let value = PrimitiveValue::from("Smith^John");
        assert_eq!(value, PrimitiveValue::Str("Smith^John".to_string()));
        assert_eq!(value.multiplicity(), 1);

        let value = PrimitiveValue::from(512_u16);
        assert_eq!(value, PrimitiveValue::U16(smallvec![512]));
    }

    #[test]
    fn to_str_joins_with_backslash() {
        let value = PrimitiveValue::strs(["DERIVED", "PRIMARY"]);
        assert_eq!(value.to_str(), "DERIVED\\PRIMARY");
    }

    #[test]
    fn to_int_parses_and_casts() {
        let value = PrimitiveValue::from("42 ");
        assert_eq!(value.to_int::<u16>().unwrap(), 42);
        let value = PrimitiveValue::from(7_u32);
        assert_eq!(value.to_int::<i64>().unwrap(), 7);
        let value = PrimitiveValue::from("MONOCHROME2");
        assert!(value.to_int::<u16>().is_err());
    }

    #[test]
    fn byte_len_respects_vr_and_parity() {
        assert_eq!(PrimitiveValue::from("1.2.840.10008.1.1").byte_len(VR::UI), Length(18));
        assert_eq!(PrimitiveValue::from(1_u16).byte_len(VR::US), Length(2));
        assert_eq!(
            PrimitiveValue::U8(smallvec![1, 2, 3]).byte_len(VR::OB),
            Length(4)
        );
    }
}
