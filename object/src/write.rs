//! Data set serialization: writing an in-memory object
//! in its encoded form under a given transfer syntax.
//!
//! Sequences are always written in the undefined-length (delimited) form.

use crate::mem::InMemObject;
use radlink_core::value::Value;
use radlink_core::{DataElementHeader, Length, Tag};
use radlink_encoding::encode::{
    self, encode_primitive_padded, DatasetEncoder, Encode,
};
use radlink_encoding::transfer_syntax::TransferSyntax;
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to encode element {}", tag))]
    EncodeElement {
        tag: Tag,
        #[snafu(backtrace)]
        source: encode::Error,
    },

    #[snafu(display("failed to write a pixel data fragment"))]
    WriteFragment {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "pixel data fragment #{} has odd length {}, must be even on the wire",
        index,
        len
    ))]
    OddFragmentLength { index: usize, len: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Serialize a complete data set to the given writer.
pub fn write_dataset<W>(obj: &InMemObject, to: &mut W, ts: &TransferSyntax) -> Result<()>
where
    W: ?Sized + Write,
{
    let encoder = DatasetEncoder::for_transfer_syntax(ts);
    write_object(obj, to, &encoder)
}

fn write_object<W>(obj: &InMemObject, to: &mut W, encoder: &DatasetEncoder) -> Result<()>
where
    W: ?Sized + Write,
{
    for elt in obj.iter() {
        let header = *elt.header();
        let tag = header.tag;
        match elt.value() {
            Value::Primitive(value) => {
                let len = value.byte_len(header.vr);
                encoder
                    .encode_element_header(to, DataElementHeader::new(tag, header.vr, len))
                    .context(EncodeElementSnafu { tag })?;
                encode_primitive_padded(to, encoder.endianness(), header.vr, value)
                    .context(EncodeElementSnafu { tag })?;
            }
            Value::Sequence { items, .. } => {
                encoder
                    .encode_element_header(
                        to,
                        DataElementHeader::new(tag, header.vr, Length::UNDEFINED),
                    )
                    .context(EncodeElementSnafu { tag })?;
                for item in items {
                    encoder
                        .encode_item_header(to, Length::UNDEFINED.0)
                        .context(EncodeElementSnafu { tag })?;
                    write_object(item, to, encoder)?;
                    encoder
                        .encode_item_delimiter(to)
                        .context(EncodeElementSnafu { tag })?;
                }
                encoder
                    .encode_sequence_delimiter(to)
                    .context(EncodeElementSnafu { tag })?;
            }
            Value::PixelSequence {
                offset_table,
                fragments,
            } => {
                encoder
                    .encode_element_header(
                        to,
                        DataElementHeader::new(tag, header.vr, Length::UNDEFINED),
                    )
                    .context(EncodeElementSnafu { tag })?;
                // basic offset table comes first, possibly empty
                encoder
                    .encode_item_header(to, offset_table.len() as u32)
                    .context(EncodeElementSnafu { tag })?;
                to.write_all(offset_table).context(WriteFragmentSnafu)?;
                for (index, fragment) in fragments.iter().enumerate() {
                    snafu::ensure!(
                        fragment.len() % 2 == 0,
                        OddFragmentLengthSnafu {
                            index,
                            len: fragment.len()
                        }
                    );
                    encoder
                        .encode_item_header(to, fragment.len() as u32)
                        .context(EncodeElementSnafu { tag })?;
                    to.write_all(fragment).context(WriteFragmentSnafu)?;
                }
                encoder
                    .encode_sequence_delimiter(to)
                    .context(EncodeElementSnafu { tag })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::read_dataset;
    use radlink_core::value::{PrimitiveValue, Value, C};
    use radlink_core::{tags, DataElement, VR};
    use radlink_encoding::transfer_syntax::entries;

    fn sample_object() -> InMemObject {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_NAME, "TEST^PATIENT").unwrap();
        obj.set_string(tags::PATIENT_ID, "12345").unwrap();
        obj.set_string(tags::SOP_CLASS_UID, "1.2.840.10008.5.1.4.1.1.7")
            .unwrap();
        obj.set_int(tags::ROWS, 1).unwrap();
        obj.set_int(tags::COLUMNS, 1).unwrap();
        obj.set_strings(tags::IMAGE_TYPE, ["DERIVED", "PRIMARY"])
            .unwrap();
        let mut item = InMemObject::new();
        item.set_string(tags::REFERENCED_SOP_INSTANCE_UID, "1.2.3.4")
            .unwrap();
        obj.append_item(tags::REFERENCED_STUDY_SEQUENCE, item).unwrap();
        obj
    }

    #[test]
    fn round_trip_explicit_vr_little_endian() {
        let obj = sample_object();
        let mut encoded = Vec::new();
        write_dataset(&obj, &mut encoded, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        let mut cursor = &encoded[..];
        let decoded = read_dataset(&mut cursor, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        assert_eq!(obj, decoded);
    }

    #[test]
    fn round_trip_implicit_vr_little_endian() {
        let obj = sample_object();
        let mut encoded = Vec::new();
        write_dataset(&obj, &mut encoded, &entries::IMPLICIT_VR_LITTLE_ENDIAN).unwrap();
        let mut cursor = &encoded[..];
        let decoded = read_dataset(&mut cursor, &entries::IMPLICIT_VR_LITTLE_ENDIAN).unwrap();
        assert_eq!(obj, decoded);
    }

    #[test]
    fn round_trip_explicit_vr_big_endian() {
        let obj = sample_object();
        let mut encoded = Vec::new();
        write_dataset(&obj, &mut encoded, &entries::EXPLICIT_VR_BIG_ENDIAN).unwrap();
        let mut cursor = &encoded[..];
        let decoded = read_dataset(&mut cursor, &entries::EXPLICIT_VR_BIG_ENDIAN).unwrap();
        assert_eq!(obj, decoded);
    }

    #[test]
    fn round_trip_encapsulated_pixel_data() {
        let mut obj = InMemObject::new();
        let fragments: C<Vec<u8>> = C::from(vec![vec![0xAA, 0xBB], vec![0xCC, 0xDD]]);
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            Value::new_pixel_sequence(C::new(), fragments),
        ));
        let mut encoded = Vec::new();
        write_dataset(&obj, &mut encoded, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        let mut cursor = &encoded[..];
        let decoded = read_dataset(&mut cursor, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        assert_eq!(obj, decoded);
    }

    #[test]
    fn serialized_size_matches_declared_length() {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_ID, "123").unwrap();
        let mut encoded = Vec::new();
        write_dataset(&obj, &mut encoded, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        // tag (4) + VR (2) + length (2) + "123 " padded to 4
        assert_eq!(encoded.len(), 12);
        assert_eq!(&encoded[8..], b"123 ");
        // declared length matches the padded value
        assert_eq!(encoded[6], 4);

        let value = PrimitiveValue::from("123");
        assert_eq!(value.byte_len(VR::LO).0, 4);
    }
}
