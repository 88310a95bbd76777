//! Element header and value encoding for the supported transfer syntaxes.

pub mod basic;
pub mod explicit_be;
pub mod explicit_le;
pub mod implicit_le;

use crate::text::{DefaultCharacterSetCodec, TextCodec};
use crate::transfer_syntax::{TransferSyntax, VrEncoding};
use byteordered::Endianness;
use radlink_core::header::DataElementHeader;
use radlink_core::value::PrimitiveValue;
use radlink_core::{Tag, VR};
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

pub use self::basic::{BasicEncode, BasicEncoder};
pub use self::explicit_be::ExplicitVRBigEndianEncoder;
pub use self::explicit_le::ExplicitVRLittleEndianEncoder;
pub use self::implicit_le::ImplicitVRLittleEndianEncoder;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to write the header of element {}", tag))]
    WriteHeader {
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to write an item header"))]
    WriteItemHeader {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to write a value"))]
    WriteValue {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to encode text value"))]
    EncodeText {
        #[snafu(backtrace)]
        source: crate::text::EncodeTextError,
    },

    #[snafu(display(
        "value of element {} is {} bytes long, too large for the short explicit form",
        tag,
        len
    ))]
    OversizedValue { tag: Tag, len: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Type trait for encoding data element headers
/// under a specific transfer syntax.
pub trait Encode {
    /// The byte order of the values under this encoder.
    fn endianness(&self) -> Endianness;

    /// Encode and write a data element tag.
    fn encode_tag<W>(&self, to: &mut W, tag: Tag) -> Result<()>
    where
        W: ?Sized + Write;

    /// Encode and write a data element header,
    /// returning the number of bytes written.
    ///
    /// The element value is not written;
    /// use [`encode_primitive`] afterwards.
    fn encode_element_header<W>(&self, to: &mut W, de: DataElementHeader) -> Result<usize>
    where
        W: ?Sized + Write;

    /// Encode and write an item header with the given length.
    fn encode_item_header<W>(&self, to: &mut W, len: u32) -> Result<()>
    where
        W: ?Sized + Write;

    /// Encode and write an item delimiter.
    fn encode_item_delimiter<W>(&self, to: &mut W) -> Result<()>
    where
        W: ?Sized + Write,
    {
        self.encode_tag(to, Tag(0xFFFE, 0xE00D))?;
        to.write_all(&[0u8; 4]).context(WriteItemHeaderSnafu)?;
        Ok(())
    }

    /// Encode and write a sequence delimiter.
    fn encode_sequence_delimiter<W>(&self, to: &mut W) -> Result<()>
    where
        W: ?Sized + Write,
    {
        self.encode_tag(to, Tag(0xFFFE, 0xE0DD))?;
        to.write_all(&[0u8; 4]).context(WriteItemHeaderSnafu)?;
        Ok(())
    }
}

/// Encode and write a primitive value under the given byte order
/// and value representation, without padding.
/// Returns the number of bytes written.
pub fn encode_primitive<W>(
    to: &mut W,
    endianness: Endianness,
    vr: VR,
    value: &PrimitiveValue,
) -> Result<usize>
where
    W: ?Sized + Write,
{
    use radlink_core::value::PrimitiveValue::*;

    let basic = BasicEncoder::from(endianness);

    // values carried by string VRs are written in their
    // canonical text form, joined by backslashes
    if vr.is_string() {
        let text = value.to_str();
        let codec = DefaultCharacterSetCodec;
        let bytes = codec.encode(&text).context(EncodeTextSnafu)?;
        to.write_all(&bytes).context(WriteValueSnafu)?;
        return Ok(bytes.len());
    }

    match value {
        Empty => Ok(0),
        Str(_) | Strs(_) => {
            let text = value.to_str();
            let codec = DefaultCharacterSetCodec;
            let bytes = codec.encode(&text).context(EncodeTextSnafu)?;
            to.write_all(&bytes).context(WriteValueSnafu)?;
            Ok(bytes.len())
        }
        Tags(tags) => {
            for tag in tags {
                basic.encode_us(&mut *to, tag.group())?;
                basic.encode_us(&mut *to, tag.element())?;
            }
            Ok(tags.len() * 4)
        }
        U8(values) => {
            to.write_all(values).context(WriteValueSnafu)?;
            Ok(values.len())
        }
        I16(values) => {
            for v in values {
                basic.encode_ss(&mut *to, *v)?;
            }
            Ok(values.len() * 2)
        }
        U16(values) => {
            for v in values {
                basic.encode_us(&mut *to, *v)?;
            }
            Ok(values.len() * 2)
        }
        I32(values) => {
            for v in values {
                basic.encode_sl(&mut *to, *v)?;
            }
            Ok(values.len() * 4)
        }
        U32(values) => {
            for v in values {
                basic.encode_ul(&mut *to, *v)?;
            }
            Ok(values.len() * 4)
        }
        I64(values) => {
            for v in values {
                basic.encode_sv(&mut *to, *v)?;
            }
            Ok(values.len() * 8)
        }
        U64(values) => {
            for v in values {
                basic.encode_uv(&mut *to, *v)?;
            }
            Ok(values.len() * 8)
        }
        F32(values) => {
            for v in values {
                basic.encode_fl(&mut *to, *v)?;
            }
            Ok(values.len() * 4)
        }
        F64(values) => {
            for v in values {
                basic.encode_fd(&mut *to, *v)?;
            }
            Ok(values.len() * 8)
        }
    }
}

/// Encode and write a primitive value,
/// padding it with the VR's padding byte to an even length.
/// Returns the number of bytes written, including padding.
pub fn encode_primitive_padded<W>(
    to: &mut W,
    endianness: Endianness,
    vr: VR,
    value: &PrimitiveValue,
) -> Result<usize>
where
    W: ?Sized + Write,
{
    let written = encode_primitive(to, endianness, vr, value)?;
    if written % 2 == 1 {
        to.write_all(&[vr.padding_byte()]).context(WriteValueSnafu)?;
        return Ok(written + 1);
    }
    Ok(written)
}

/// A data element encoder dispatching over the supported
/// transfer syntax conventions.
#[derive(Debug, Clone)]
pub enum DatasetEncoder {
    ImplicitVrLittleEndian(ImplicitVRLittleEndianEncoder),
    ExplicitVrLittleEndian(ExplicitVRLittleEndianEncoder),
    ExplicitVrBigEndian(ExplicitVRBigEndianEncoder),
}

impl DatasetEncoder {
    /// Obtain the encoder for the given transfer syntax.
    pub fn for_transfer_syntax(ts: &TransferSyntax) -> Self {
        match (ts.vr_encoding, ts.endianness) {
            (VrEncoding::Implicit, _) => {
                DatasetEncoder::ImplicitVrLittleEndian(ImplicitVRLittleEndianEncoder::default())
            }
            (VrEncoding::Explicit, Endianness::Little) => {
                DatasetEncoder::ExplicitVrLittleEndian(ExplicitVRLittleEndianEncoder::default())
            }
            (VrEncoding::Explicit, Endianness::Big) => {
                DatasetEncoder::ExplicitVrBigEndian(ExplicitVRBigEndianEncoder::default())
            }
        }
    }
}

impl Encode for DatasetEncoder {
    fn endianness(&self) -> Endianness {
        match self {
            DatasetEncoder::ExplicitVrBigEndian(_) => Endianness::Big,
            _ => Endianness::Little,
        }
    }

    fn encode_tag<W>(&self, to: &mut W, tag: Tag) -> Result<()>
    where
        W: ?Sized + Write,
    {
        match self {
            DatasetEncoder::ImplicitVrLittleEndian(enc) => enc.encode_tag(to, tag),
            DatasetEncoder::ExplicitVrLittleEndian(enc) => enc.encode_tag(to, tag),
            DatasetEncoder::ExplicitVrBigEndian(enc) => enc.encode_tag(to, tag),
        }
    }

    fn encode_element_header<W>(&self, to: &mut W, de: DataElementHeader) -> Result<usize>
    where
        W: ?Sized + Write,
    {
        match self {
            DatasetEncoder::ImplicitVrLittleEndian(enc) => enc.encode_element_header(to, de),
            DatasetEncoder::ExplicitVrLittleEndian(enc) => enc.encode_element_header(to, de),
            DatasetEncoder::ExplicitVrBigEndian(enc) => enc.encode_element_header(to, de),
        }
    }

    fn encode_item_header<W>(&self, to: &mut W, len: u32) -> Result<()>
    where
        W: ?Sized + Write,
    {
        match self {
            DatasetEncoder::ImplicitVrLittleEndian(enc) => enc.encode_item_header(to, len),
            DatasetEncoder::ExplicitVrLittleEndian(enc) => enc.encode_item_header(to, len),
            DatasetEncoder::ExplicitVrBigEndian(enc) => enc.encode_item_header(to, len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::value::PrimitiveValue;

    #[test]
    fn primitive_values_are_padded_to_even_length() {
        let mut out = Vec::new();
        let n = encode_primitive_padded(
            &mut out,
            Endianness::Little,
            VR::UI,
            &PrimitiveValue::from("1.2.840.10008.1.1"),
        )
        .unwrap();
        assert_eq!(n, 18);
        assert_eq!(&out[..17], b"1.2.840.10008.1.1");
        assert_eq!(out[17], 0x00);

        let mut out = Vec::new();
        let n = encode_primitive_padded(
            &mut out,
            Endianness::Little,
            VR::CS,
            &PrimitiveValue::from("MONOCHROME2"),
        )
        .unwrap();
        assert_eq!(n, 12);
        assert_eq!(out[11], b' ');
    }

    #[test]
    fn integer_values_follow_byte_order() {
        let mut out = Vec::new();
        encode_primitive(
            &mut out,
            Endianness::Big,
            VR::US,
            &PrimitiveValue::from(256u16),
        )
        .unwrap();
        assert_eq!(out, vec![0x01, 0x00]);

        let mut out = Vec::new();
        encode_primitive(
            &mut out,
            Endianness::Little,
            VR::US,
            &PrimitiveValue::from(256u16),
        )
        .unwrap();
        assert_eq!(out, vec![0x00, 0x01]);
    }
}
