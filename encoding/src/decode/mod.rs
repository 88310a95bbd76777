//! Element header and value decoding for the supported transfer syntaxes.

pub mod basic;
pub mod explicit_be;
pub mod explicit_le;
pub mod implicit_le;
pub mod primitive_value;

use crate::transfer_syntax::{TransferSyntax, VrEncoding};
use byteordered::Endianness;
use radlink_core::header::{DataElementHeader, SequenceItemHeader, Tag, UnexpectedTagError};
use snafu::{Backtrace, Snafu};
use std::io::Read;

pub use self::explicit_be::ExplicitVRBigEndianDecoder;
pub use self::explicit_le::ExplicitVRLittleEndianDecoder;
pub use self::implicit_le::ImplicitVRLittleEndianDecoder;
pub use self::primitive_value::read_value;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to read the tag of an element header"))]
    ReadHeaderTag {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to read the explicit VR of element {}", tag))]
    ReadVr {
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to read the reserved bytes of element {}", tag))]
    ReadReserved {
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to read the length of element {}", tag))]
    ReadLength {
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to read an item header"))]
    ReadItemHeader {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("bad sequence item header"))]
    BadSequenceHeader {
        source: UnexpectedTagError,
        backtrace: Backtrace,
    },

    #[snafu(display("element {} has an undefined length where a defined one was required", tag))]
    UndefinedValueLength { tag: Tag, backtrace: Backtrace },

    #[snafu(display("value of element {} is truncated", tag))]
    TruncatedValue {
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "bad length {} for element {} of VR {} (must be a multiple of {})",
        len,
        tag,
        vr,
        width
    ))]
    BadLength {
        tag: Tag,
        vr: radlink_core::VR,
        len: u32,
        width: u32,
    },

    #[snafu(display("failed to decode text value of element {}", tag))]
    DecodeText {
        tag: Tag,
        #[snafu(backtrace)]
        source: crate::text::DecodeTextError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Type trait for decoding data element headers
/// under a specific transfer syntax.
pub trait Decode {
    /// The byte order of the values under this decoder.
    fn endianness(&self) -> Endianness;

    /// Fetch and decode the next data element header from the given source,
    /// also returning the number of bytes read.
    ///
    /// The value is not decoded; it is up to the caller to read it
    /// (or skip it) according to the returned header.
    fn decode_header<S>(&self, source: &mut S) -> Result<(DataElementHeader, usize)>
    where
        S: ?Sized + Read;

    /// Fetch and decode the next sequence item head from the given source.
    fn decode_item_header<S>(&self, source: &mut S) -> Result<SequenceItemHeader>
    where
        S: ?Sized + Read;

    /// Fetch and decode the next tag from the given source.
    fn decode_tag<S>(&self, source: &mut S) -> Result<Tag>
    where
        S: ?Sized + Read;
}

/// A data element decoder dispatching over the supported
/// transfer syntax conventions.
#[derive(Debug, Clone)]
pub enum DatasetDecoder {
    ImplicitVrLittleEndian(ImplicitVRLittleEndianDecoder),
    ExplicitVrLittleEndian(ExplicitVRLittleEndianDecoder),
    ExplicitVrBigEndian(ExplicitVRBigEndianDecoder),
}

impl DatasetDecoder {
    /// Obtain the decoder for the given transfer syntax.
    ///
    /// Deflated data sets use the Explicit VR Little Endian convention
    /// once inflated, so they are decoded by the same decoder.
    pub fn for_transfer_syntax(ts: &TransferSyntax) -> Self {
        match (ts.vr_encoding, ts.endianness) {
            (VrEncoding::Implicit, _) => {
                DatasetDecoder::ImplicitVrLittleEndian(ImplicitVRLittleEndianDecoder::default())
            }
            (VrEncoding::Explicit, Endianness::Little) => {
                DatasetDecoder::ExplicitVrLittleEndian(ExplicitVRLittleEndianDecoder::default())
            }
            (VrEncoding::Explicit, Endianness::Big) => {
                DatasetDecoder::ExplicitVrBigEndian(ExplicitVRBigEndianDecoder::default())
            }
        }
    }
}

impl Decode for DatasetDecoder {
    fn endianness(&self) -> Endianness {
        match self {
            DatasetDecoder::ExplicitVrBigEndian(_) => Endianness::Big,
            _ => Endianness::Little,
        }
    }

    fn decode_header<S>(&self, source: &mut S) -> Result<(DataElementHeader, usize)>
    where
        S: ?Sized + Read,
    {
        match self {
            DatasetDecoder::ImplicitVrLittleEndian(dec) => dec.decode_header(source),
            DatasetDecoder::ExplicitVrLittleEndian(dec) => dec.decode_header(source),
            DatasetDecoder::ExplicitVrBigEndian(dec) => dec.decode_header(source),
        }
    }

    fn decode_item_header<S>(&self, source: &mut S) -> Result<SequenceItemHeader>
    where
        S: ?Sized + Read,
    {
        match self {
            DatasetDecoder::ImplicitVrLittleEndian(dec) => dec.decode_item_header(source),
            DatasetDecoder::ExplicitVrLittleEndian(dec) => dec.decode_item_header(source),
            DatasetDecoder::ExplicitVrBigEndian(dec) => dec.decode_item_header(source),
        }
    }

    fn decode_tag<S>(&self, source: &mut S) -> Result<Tag>
    where
        S: ?Sized + Read,
    {
        match self {
            DatasetDecoder::ImplicitVrLittleEndian(dec) => dec.decode_tag(source),
            DatasetDecoder::ExplicitVrLittleEndian(dec) => dec.decode_tag(source),
            DatasetDecoder::ExplicitVrBigEndian(dec) => dec.decode_tag(source),
        }
    }
}
