//! Explicit VR Little Endian transfer syntax encoder.

use crate::encode::basic::{BasicEncode, LittleEndianBasicEncoder};
use crate::encode::*;
use byteordered::Endianness;
use radlink_core::header::DataElementHeader;
use radlink_core::Tag;
use snafu::{ensure, ResultExt};
use std::io::Write;

/// A data element encoder for the Explicit VR Little Endian transfer syntax.
#[derive(Debug, Default, Clone)]
pub struct ExplicitVRLittleEndianEncoder {
    basic: LittleEndianBasicEncoder,
}

impl Encode for ExplicitVRLittleEndianEncoder {
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
        to.write_all(&de.vr.to_bytes())
            .context(WriteHeaderSnafu { tag: de.tag })?;

        if de.vr.is_long_form() {
            // 2 reserved bytes, then 4 bytes for the data length
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

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::header::Length;
    use radlink_core::VR;

    #[test]
    fn short_form_header() {
        let enc = ExplicitVRLittleEndianEncoder::default();
        let mut out = Vec::new();
        let n = enc
            .encode_element_header(
                &mut out,
                DataElementHeader::new(Tag(0x0002, 0x0010), VR::UI, Length(20)),
            )
            .unwrap();
        assert_eq!(n, 8);
        assert_eq!(
            out,
            vec![0x02, 0x00, 0x10, 0x00, b'U', b'I', 0x14, 0x00]
        );
    }

    #[test]
    fn long_form_header() {
        let enc = ExplicitVRLittleEndianEncoder::default();
        let mut out = Vec::new();
        let n = enc
            .encode_element_header(
                &mut out,
                DataElementHeader::new(Tag(0x7FE0, 0x0010), VR::OB, Length::UNDEFINED),
            )
            .unwrap();
        assert_eq!(n, 12);
        assert_eq!(
            out,
            vec![0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn oversized_short_form_value_is_rejected() {
        let enc = ExplicitVRLittleEndianEncoder::default();
        let mut out = Vec::new();
        let e = enc.encode_element_header(
            &mut out,
            DataElementHeader::new(Tag(0x0010, 0x0010), VR::PN, Length(0x1_0000)),
        );
        assert!(matches!(e, Err(Error::OversizedValue { .. })));
    }
}
