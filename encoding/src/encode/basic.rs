//! This module provides implementations for basic encoders:
//! little endian and big endian.

use super::{Result, WriteValueSnafu};
use byteordered::byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use byteordered::Endianness;
use snafu::ResultExt;
use std::io::Write;

/// Type trait for writing binary primitives to a writer
/// in a predefined byte order.
pub trait BasicEncode {
    /// The byte order of this encoder.
    fn endianness(&self) -> Endianness;

    /// Encode an unsigned short value to the given writer.
    fn encode_us<W: Write>(&self, to: W, value: u16) -> Result<()>;

    /// Encode an unsigned long value to the given writer.
    fn encode_ul<W: Write>(&self, to: W, value: u32) -> Result<()>;

    /// Encode an unsigned very long value to the given writer.
    fn encode_uv<W: Write>(&self, to: W, value: u64) -> Result<()>;

    /// Encode a signed short value to the given writer.
    fn encode_ss<W: Write>(&self, to: W, value: i16) -> Result<()>;

    /// Encode a signed long value to the given writer.
    fn encode_sl<W: Write>(&self, to: W, value: i32) -> Result<()>;

    /// Encode a signed very long value to the given writer.
    fn encode_sv<W: Write>(&self, to: W, value: i64) -> Result<()>;

    /// Encode a single precision float value to the given writer.
    fn encode_fl<W: Write>(&self, to: W, value: f32) -> Result<()>;

    /// Encode a double precision float value to the given writer.
    fn encode_fd<W: Write>(&self, to: W, value: f64) -> Result<()>;
}

/// A basic encoder of DICOM primitive elements in little endian.
#[derive(Debug, Default, Clone)]
pub struct LittleEndianBasicEncoder;

impl BasicEncode for LittleEndianBasicEncoder {
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn encode_us<W: Write>(&self, mut to: W, value: u16) -> Result<()> {
        to.write_u16::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_ul<W: Write>(&self, mut to: W, value: u32) -> Result<()> {
        to.write_u32::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_uv<W: Write>(&self, mut to: W, value: u64) -> Result<()> {
        to.write_u64::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_ss<W: Write>(&self, mut to: W, value: i16) -> Result<()> {
        to.write_i16::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_sl<W: Write>(&self, mut to: W, value: i32) -> Result<()> {
        to.write_i32::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_sv<W: Write>(&self, mut to: W, value: i64) -> Result<()> {
        to.write_i64::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_fl<W: Write>(&self, mut to: W, value: f32) -> Result<()> {
        to.write_f32::<LittleEndian>(value).context(WriteValueSnafu)
    }

    fn encode_fd<W: Write>(&self, mut to: W, value: f64) -> Result<()> {
        to.write_f64::<LittleEndian>(value).context(WriteValueSnafu)
    }
}

/// A basic encoder of DICOM primitive elements in big endian.
#[derive(Debug, Default, Clone)]
pub struct BigEndianBasicEncoder;

impl BasicEncode for BigEndianBasicEncoder {
    fn endianness(&self) -> Endianness {
        Endianness::Big
    }

    fn encode_us<W: Write>(&self, mut to: W, value: u16) -> Result<()> {
        to.write_u16::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_ul<W: Write>(&self, mut to: W, value: u32) -> Result<()> {
        to.write_u32::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_uv<W: Write>(&self, mut to: W, value: u64) -> Result<()> {
        to.write_u64::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_ss<W: Write>(&self, mut to: W, value: i16) -> Result<()> {
        to.write_i16::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_sl<W: Write>(&self, mut to: W, value: i32) -> Result<()> {
        to.write_i32::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_sv<W: Write>(&self, mut to: W, value: i64) -> Result<()> {
        to.write_i64::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_fl<W: Write>(&self, mut to: W, value: f32) -> Result<()> {
        to.write_f32::<BigEndian>(value).context(WriteValueSnafu)
    }

    fn encode_fd<W: Write>(&self, mut to: W, value: f64) -> Result<()> {
        to.write_f64::<BigEndian>(value).context(WriteValueSnafu)
    }
}

/// A basic encoder with support for both byte orders,
/// decided at run time.
#[derive(Debug, Clone)]
pub enum BasicEncoder {
    /// little endian encoding
    LE(LittleEndianBasicEncoder),
    /// big endian encoding
    BE(BigEndianBasicEncoder),
}

impl From<Endianness> for BasicEncoder {
    fn from(endianness: Endianness) -> Self {
        match endianness {
            Endianness::Little => BasicEncoder::LE(LittleEndianBasicEncoder),
            Endianness::Big => BasicEncoder::BE(BigEndianBasicEncoder),
        }
    }
}

macro_rules! for_both {
    ($s: expr, |$e: ident| $f: expr) => {
        match $s {
            BasicEncoder::LE($e) => $f,
            BasicEncoder::BE($e) => $f,
        }
    };
}

impl BasicEncode for BasicEncoder {
    fn endianness(&self) -> Endianness {
        for_both!(self, |e| e.endianness())
    }

    fn encode_us<W: Write>(&self, to: W, value: u16) -> Result<()> {
        for_both!(self, |e| e.encode_us(to, value))
    }

    fn encode_ul<W: Write>(&self, to: W, value: u32) -> Result<()> {
        for_both!(self, |e| e.encode_ul(to, value))
    }

    fn encode_uv<W: Write>(&self, to: W, value: u64) -> Result<()> {
        for_both!(self, |e| e.encode_uv(to, value))
    }

    fn encode_ss<W: Write>(&self, to: W, value: i16) -> Result<()> {
        for_both!(self, |e| e.encode_ss(to, value))
    }

    fn encode_sl<W: Write>(&self, to: W, value: i32) -> Result<()> {
        for_both!(self, |e| e.encode_sl(to, value))
    }

    fn encode_sv<W: Write>(&self, to: W, value: i64) -> Result<()> {
        for_both!(self, |e| e.encode_sv(to, value))
    }

    fn encode_fl<W: Write>(&self, to: W, value: f32) -> Result<()> {
        for_both!(self, |e| e.encode_fl(to, value))
    }

    fn encode_fd<W: Write>(&self, to: W, value: f64) -> Result<()> {
        for_both!(self, |e| e.encode_fd(to, value))
    }
}
