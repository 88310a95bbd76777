//! Implicit VR Little Endian transfer syntax encoder.

use crate::encode::basic::{BasicEncode, LittleEndianBasicEncoder};
use crate::encode::*;
use byteordered::Endianness;
use radlink_core::header::DataElementHeader;
use radlink_core::Tag;
use std::io::Write;

/// A data element encoder for the Implicit VR Little Endian transfer syntax.
#[derive(Debug, Default, Clone)]
pub struct ImplicitVRLittleEndianEncoder {
    basic: LittleEndianBasicEncoder,
}

impl Encode for ImplicitVRLittleEndianEncoder {
    fn endianness(&self) -> Endianness {
        Endianness::Little
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
        self.basic.encode_ul(&mut *to, de.len.0)?;
        Ok(8)
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

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::header::Length;
    use radlink_core::VR;

    #[test]
    fn element_header_has_no_vr() {
        let enc = ImplicitVRLittleEndianEncoder::default();
        let mut out = Vec::new();
        let n = enc
            .encode_element_header(
                &mut out,
                DataElementHeader::new(Tag(0x0010, 0x0010), VR::PN, Length(8)),
            )
            .unwrap();
        assert_eq!(n, 8);
        assert_eq!(out, vec![0x10, 0x00, 0x10, 0x00, 0x08, 0x00, 0x00, 0x00]);
    }
}
