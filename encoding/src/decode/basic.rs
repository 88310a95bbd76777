//! This module provides implementations for primitive decoding of data
//! in a given byte order.

use byteordered::byteorder::{BigEndian, ByteOrder, LittleEndian};
use byteordered::Endianness;
use radlink_core::Tag;

/// Type trait for reading binary primitives from a byte slice
/// in a predefined byte order.
pub trait BasicDecode {
    /// The byte order of this decoder.
    fn endianness(&self) -> Endianness;

    /// Decode an unsigned short value from the beginning of the slice.
    fn decode_us(&self, source: &[u8]) -> u16;

    /// Decode an unsigned long value from the beginning of the slice.
    fn decode_ul(&self, source: &[u8]) -> u32;

    /// Decode an unsigned very long value from the beginning of the slice.
    fn decode_uv(&self, source: &[u8]) -> u64;

    /// Decode a signed short value from the beginning of the slice.
    fn decode_ss(&self, source: &[u8]) -> i16;

    /// Decode a signed long value from the beginning of the slice.
    fn decode_sl(&self, source: &[u8]) -> i32;

    /// Decode a signed very long value from the beginning of the slice.
    fn decode_sv(&self, source: &[u8]) -> i64;

    /// Decode a single precision float value from the beginning of the slice.
    fn decode_fl(&self, source: &[u8]) -> f32;

    /// Decode a double precision float value from the beginning of the slice.
    fn decode_fd(&self, source: &[u8]) -> f64;

    /// Decode a DICOM attribute tag from the beginning of the slice.
    fn decode_tag(&self, source: &[u8]) -> Tag {
        Tag(self.decode_us(source), self.decode_us(&source[2..]))
    }
}

/// A basic decoder of DICOM primitive elements in little endian.
#[derive(Debug, Default, Clone)]
pub struct LittleEndianBasicDecoder;

impl BasicDecode for LittleEndianBasicDecoder {
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn decode_us(&self, source: &[u8]) -> u16 {
        LittleEndian::read_u16(source)
    }

    fn decode_ul(&self, source: &[u8]) -> u32 {
        LittleEndian::read_u32(source)
    }

    fn decode_uv(&self, source: &[u8]) -> u64 {
        LittleEndian::read_u64(source)
    }

    fn decode_ss(&self, source: &[u8]) -> i16 {
        LittleEndian::read_i16(source)
    }

    fn decode_sl(&self, source: &[u8]) -> i32 {
        LittleEndian::read_i32(source)
    }

    fn decode_sv(&self, source: &[u8]) -> i64 {
        LittleEndian::read_i64(source)
    }

    fn decode_fl(&self, source: &[u8]) -> f32 {
        LittleEndian::read_f32(source)
    }

    fn decode_fd(&self, source: &[u8]) -> f64 {
        LittleEndian::read_f64(source)
    }
}

/// A basic decoder of DICOM primitive elements in big endian.
#[derive(Debug, Default, Clone)]
pub struct BigEndianBasicDecoder;

impl BasicDecode for BigEndianBasicDecoder {
    fn endianness(&self) -> Endianness {
        Endianness::Big
    }

    fn decode_us(&self, source: &[u8]) -> u16 {
        BigEndian::read_u16(source)
    }

    fn decode_ul(&self, source: &[u8]) -> u32 {
        BigEndian::read_u32(source)
    }

    fn decode_uv(&self, source: &[u8]) -> u64 {
        BigEndian::read_u64(source)
    }

    fn decode_ss(&self, source: &[u8]) -> i16 {
        BigEndian::read_i16(source)
    }

    fn decode_sl(&self, source: &[u8]) -> i32 {
        BigEndian::read_i32(source)
    }

    fn decode_sv(&self, source: &[u8]) -> i64 {
        BigEndian::read_i64(source)
    }

    fn decode_fl(&self, source: &[u8]) -> f32 {
        BigEndian::read_f32(source)
    }

    fn decode_fd(&self, source: &[u8]) -> f64 {
        BigEndian::read_f64(source)
    }
}

/// A basic decoder with support for both byte orders,
/// decided at run time.
#[derive(Debug, Clone)]
pub enum BasicDecoder {
    /// little endian decoding
    LE(LittleEndianBasicDecoder),
    /// big endian decoding
    BE(BigEndianBasicDecoder),
}

impl From<Endianness> for BasicDecoder {
    fn from(endianness: Endianness) -> Self {
        match endianness {
            Endianness::Little => BasicDecoder::LE(LittleEndianBasicDecoder),
            Endianness::Big => BasicDecoder::BE(BigEndianBasicDecoder),
        }
    }
}

macro_rules! for_both {
    ($s: expr, |$e: ident| $f: expr) => {
        match $s {
            BasicDecoder::LE($e) => $f,
            BasicDecoder::BE($e) => $f,
        }
    };
}

impl BasicDecode for BasicDecoder {
    fn endianness(&self) -> Endianness {
        for_both!(self, |d| d.endianness())
    }

    fn decode_us(&self, source: &[u8]) -> u16 {
        for_both!(self, |d| d.decode_us(source))
    }

    fn decode_ul(&self, source: &[u8]) -> u32 {
        for_both!(self, |d| d.decode_ul(source))
    }

    fn decode_uv(&self, source: &[u8]) -> u64 {
        for_both!(self, |d| d.decode_uv(source))
    }

    fn decode_ss(&self, source: &[u8]) -> i16 {
        for_both!(self, |d| d.decode_ss(source))
    }

    fn decode_sl(&self, source: &[u8]) -> i32 {
        for_both!(self, |d| d.decode_sl(source))
    }

    fn decode_sv(&self, source: &[u8]) -> i64 {
        for_both!(self, |d| d.decode_sv(source))
    }

    fn decode_fl(&self, source: &[u8]) -> f32 {
        for_both!(self, |d| d.decode_fl(source))
    }

    fn decode_fd(&self, source: &[u8]) -> f64 {
        for_both!(self, |d| d.decode_fd(source))
    }
}
