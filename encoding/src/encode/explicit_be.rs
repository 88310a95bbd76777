//! Explicit VR Big Endian transfer syntax encoder.

use crate::encode::basic::{BasicEncode, BigEndianBasicEncoder};
use crate::encode::*;
use byteordered::Endianness;
use radlink_core::header::DataElementHeader;
use radlink_core::Tag;
use snafu::{ensure, ResultExt};
use std::io::Write;

/// A data element encoder for the Explicit VR Big Endian transfer syntax.
#[derive(Debug, Default, Clone)]
pub struct ExplicitVRBigEndianEncoder {
    basic: BigEndianBasicEncoder,
}

impl Encode for ExplicitVRBigEndianEncoder {
    fn endianness(&self) -> Endianness {
        Endianness::Big
    }

    fn encode_tag<W>(&self, to: &mut W, tag: Tag) -> Result<()>
    where
        W: ?Sized + Write,
    {
        self.basic.encode_us(&mut *to, tag.group())?;
        self.basic.encode_us(&mut *to, tag.element())?;
        Ok(())
    }

    fn encode_element_header<W>(&self, to: &mut W, de: DataElementHeader) -> Result<usize>
    where
        W: ?Sized + Write,
    {
        self.encode_tag(to, de.tag)?;
        to.write_all(&de.vr.to_bytes())
            .context(WriteHeaderSnafu { tag: de.tag })?;

        if de.vr.is_long_form() {
            to.write_all(&[0u8; 2])
                .context(WriteHeaderSnafu { tag: de.tag })?;
            self.basic.encode_ul(&mut *to, de.len.0)?;
            Ok(12)
        } else {
            ensure!(
                de.len.0 <= u32::from(u16::MAX),
                OversizedValueSnafu {
                    tag: de.tag,
                    len: de.len.0
                }
            );
            self.basic.encode_us(&mut *to, de.len.0 as u16)?;
            Ok(8)
        }
    }

    fn encode_item_header<W>(&self, to: &mut W, len: u32) -> Result<()>
    where
        W: ?Sized + Write,
    {
        self.encode_tag(to, Tag(0xFFFE, 0xE000))?;
        self.basic.encode_ul(&mut *to, len)?;
        Ok(())
    }
}
