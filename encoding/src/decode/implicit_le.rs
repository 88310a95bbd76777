//! Implicit VR Little Endian transfer syntax decoder.

use crate::decode::*;
use byteordered::byteorder::{ByteOrder, LittleEndian};
use byteordered::Endianness;
use radlink_core::dictionary::{DataDictionary, StandardDataDictionary};
use radlink_core::header::{DataElementHeader, Length, SequenceItemHeader};
use radlink_core::{Tag, VR};
use snafu::ResultExt;
use std::io::Read;

/// A data element decoder for the Implicit VR Little Endian transfer syntax.
///
/// The value representation of each element is looked up
/// in the data dictionary; unknown attributes fall back to UN.
#[derive(Debug, Default, Clone)]
pub struct ImplicitVRLittleEndianDecoder {
    dict: StandardDataDictionary,
}

impl Decode for ImplicitVRLittleEndianDecoder {
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn decode_header<S>(&self, source: &mut S) -> Result<(DataElementHeader, usize)>
    where
        S: ?Sized + Read,
    {
        let tag = self.decode_tag(source)?;

        let mut buf = [0u8; 4];
        source.read_exact(&mut buf).context(ReadLengthSnafu { tag })?;
        let len = LittleEndian::read_u32(&buf);

        let vr = if tag.group() == 0xFFFE {
            VR::UN
        } else if tag == radlink_core::tags::PIXEL_DATA && len == 0xFFFF_FFFF {
            // encapsulated pixel data is always OB
            VR::OB
        } else {
            self.dict.vr_of(tag)
        };

        Ok((DataElementHeader::new(tag, vr, Length(len)), 8))
    }

    fn decode_item_header<S>(&self, source: &mut S) -> Result<SequenceItemHeader>
    where
        S: ?Sized + Read,
    {
        let mut buf = [0u8; 8];
        source.read_exact(&mut buf).context(ReadItemHeaderSnafu)?;
        let group = LittleEndian::read_u16(&buf[0..2]);
        let element = LittleEndian::read_u16(&buf[2..4]);
        let len = LittleEndian::read_u32(&buf[4..8]);

        SequenceItemHeader::new((group, element), Length(len)).context(BadSequenceHeaderSnafu)
    }

    fn decode_tag<S>(&self, source: &mut S) -> Result<Tag>
    where
        S: ?Sized + Read,
    {
        let mut buf = [0u8; 4];
        source.read_exact(&mut buf).context(ReadHeaderTagSnafu)?;
        Ok(Tag(
            LittleEndian::read_u16(&buf[0..2]),
            LittleEndian::read_u16(&buf[2..4]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::ImplicitVRLittleEndianDecoder;
    use crate::decode::Decode;
    use radlink_core::header::{HasLength, Header, Length};
    use radlink_core::{Tag, VR};
    use std::io::{Cursor, Read};

    //  Tag: (0010,0010) PatientName
    //  Length: 8
    //  Value: "Doe^John"
    const RAW: &[u8; 16] = &[
        0x10, 0x00, 0x10, 0x00, 0x08, 0x00, 0x00, 0x00, b'D', b'o', b'e', b'^', b'J', b'o', b'h',
        b'n',
    ];

    #[test]
    fn decode_element_with_dictionary_vr() {
        let dec = ImplicitVRLittleEndianDecoder::default();
        let mut cursor = Cursor::new(RAW.as_ref());
        let (elem, bytes_read) = dec
            .decode_header(&mut cursor)
            .expect("should find an element");
        assert_eq!(elem.tag(), Tag(0x0010, 0x0010));
        assert_eq!(elem.vr(), VR::PN);
        assert_eq!(elem.length(), Length(8));
        assert_eq!(bytes_read, 8);
        let mut buffer = [0; 8];
        cursor.read_exact(&mut buffer).expect("should read it fine");
        assert_eq!(&buffer, b"Doe^John".as_ref());
    }

    #[test]
    fn unknown_tag_falls_back_to_un() {
        let raw: &[u8] = &[0x09, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0xCA, 0xFE];
        let dec = ImplicitVRLittleEndianDecoder::default();
        let mut cursor = Cursor::new(raw);
        let (elem, _) = dec
            .decode_header(&mut cursor)
            .expect("should find an element");
        assert_eq!(elem.tag(), Tag(0x0009, 0x0001));
        assert_eq!(elem.vr(), VR::UN);
    }
}
