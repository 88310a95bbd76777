//! Explicit VR Big Endian transfer syntax decoder.
//!
//! This transfer syntax is retired, but data sets encoded with it
//! still exist in archives and must remain readable.

use crate::decode::*;
use byteordered::byteorder::{BigEndian, ByteOrder};
use byteordered::Endianness;
use radlink_core::header::{DataElementHeader, Length, SequenceItemHeader};
use radlink_core::{Tag, VR};
use snafu::ResultExt;
use std::io::Read;

/// A data element decoder for the Explicit VR Big Endian transfer syntax.
#[derive(Debug, Default, Clone)]
pub struct ExplicitVRBigEndianDecoder;

impl Decode for ExplicitVRBigEndianDecoder {
    fn endianness(&self) -> Endianness {
        Endianness::Big
    }

    fn decode_header<S>(&self, source: &mut S) -> Result<(DataElementHeader, usize)>
    where
        S: ?Sized + Read,
    {
        let tag = self.decode_tag(source)?;

        let mut buf = [0u8; 4];
        if tag.group() == 0xFFFE {
            source.read_exact(&mut buf).context(ReadLengthSnafu { tag })?;
            let len = BigEndian::read_u32(&buf);
            return Ok((DataElementHeader::new(tag, VR::UN, Length(len)), 8));
        }

        source
            .read_exact(&mut buf[0..2])
            .context(ReadVrSnafu { tag })?;
        let vr = VR::from_binary([buf[0], buf[1]]).unwrap_or(VR::UN);
        let bytes_read;

        let len = if vr.is_long_form() {
            source
                .read_exact(&mut buf[0..2])
                .context(ReadReservedSnafu { tag })?;
            source.read_exact(&mut buf).context(ReadLengthSnafu { tag })?;
            bytes_read = 12;
            BigEndian::read_u32(&buf)
        } else {
            source
                .read_exact(&mut buf[0..2])
                .context(ReadLengthSnafu { tag })?;
            bytes_read = 8;
            u32::from(BigEndian::read_u16(&buf[0..2]))
        };

        Ok((DataElementHeader::new(tag, vr, Length(len)), bytes_read))
    }

    fn decode_item_header<S>(&self, source: &mut S) -> Result<SequenceItemHeader>
    where
        S: ?Sized + Read,
    {
        let mut buf = [0u8; 8];
        source.read_exact(&mut buf).context(ReadItemHeaderSnafu)?;
        let group = BigEndian::read_u16(&buf[0..2]);
        let element = BigEndian::read_u16(&buf[2..4]);
        let len = BigEndian::read_u32(&buf[4..8]);

        SequenceItemHeader::new((group, element), Length(len)).context(BadSequenceHeaderSnafu)
    }

    fn decode_tag<S>(&self, source: &mut S) -> Result<Tag>
    where
        S: ?Sized + Read,
    {
        let mut buf = [0u8; 4];
        source.read_exact(&mut buf).context(ReadHeaderTagSnafu)?;
        Ok(Tag(
            BigEndian::read_u16(&buf[0..2]),
            BigEndian::read_u16(&buf[2..4]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::ExplicitVRBigEndianDecoder;
    use crate::decode::Decode;
    use radlink_core::header::{HasLength, Header, Length};
    use radlink_core::{Tag, VR};
    use std::io::Cursor;

    //  Tag: (0028,0010) Rows
    //  VR: US
    //  Length: 2
    //  Value: 256 (big endian)
    const RAW: &[u8] = &[0x00, 0x28, 0x00, 0x10, b'U', b'S', 0x00, 0x02, 0x01, 0x00];

    #[test]
    fn decode_big_endian_element() {
        let dec = ExplicitVRBigEndianDecoder::default();
        let mut cursor = Cursor::new(RAW);
        let (elem, bytes_read) = dec
            .decode_header(&mut cursor)
            .expect("should find an element");
        assert_eq!(elem.tag(), Tag(0x0028, 0x0010));
        assert_eq!(elem.vr(), VR::US);
        assert_eq!(elem.length(), Length(2));
        assert_eq!(bytes_read, 8);
    }
}
