//! Data set deserialization: building an in-memory object
//! from its encoded form under a given transfer syntax.

use crate::mem::{InMemElement, InMemObject};
use radlink_core::value::{Value, C};
use radlink_core::{DataElement, Header, Length, Tag, VR};
use radlink_encoding::decode::{self, read_value, DatasetDecoder, Decode};
use radlink_encoding::transfer_syntax::TransferSyntax;
use radlink_core::tags;
use radlink_core::SequenceItemHeader;
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Read;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to decode an element header"))]
    DecodeHeader {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    #[snafu(display("failed to decode the value of element {}", tag))]
    DecodeValue {
        tag: Tag,
        #[snafu(backtrace)]
        source: decode::Error,
    },

    #[snafu(display("unexpected delimiter {} outside of a sequence", tag))]
    UnexpectedDelimiter { tag: Tag, backtrace: Backtrace },

    #[snafu(display("sequence {} was not terminated before the end of input", tag))]
    UnterminatedSequence { tag: Tag, backtrace: Backtrace },

    #[snafu(display("fragment of pixel data element has undefined length"))]
    UndefinedFragmentLength { backtrace: Backtrace },

    #[snafu(display("failed to read a pixel data fragment"))]
    ReadFragment {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A reader which keeps track of how many bytes were consumed,
/// so that the position of deferred content (pixel data)
/// can be reported to the caller.
#[derive(Debug)]
pub struct CountingRead<R> {
    inner: R,
    position: u64,
}

impl<R: Read> CountingRead<R> {
    /// Wrap a reader, counting from the given base position.
    pub fn new(inner: R, base: u64) -> Self {
        CountingRead {
            inner,
            position: base,
        }
    }

    /// The number of bytes consumed so far, plus the base position.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Read for CountingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// Whether the decode error means that the input source is exhausted
/// right at an element boundary.
fn is_eof(e: &decode::Error) -> bool {
    matches!(
        e,
        decode::Error::ReadHeaderTag { source, .. }
            if source.kind() == std::io::ErrorKind::UnexpectedEof
    )
}

/// Read a complete data set from the given source.
///
/// Reading stops at the end of the input;
/// delimiters at this level are an error.
pub fn read_dataset<S>(source: &mut S, ts: &TransferSyntax) -> Result<InMemObject>
where
    S: Read,
{
    let decoder = DatasetDecoder::for_transfer_syntax(ts);
    let source: &mut dyn Read = source;
    read_object(source, &decoder, None).map(|(obj, _)| obj)
}

/// Read a data set from the given source,
/// stopping before the element with the given tag
/// and reporting the header of that element when found.
pub fn read_dataset_until<S>(
    source: &mut S,
    ts: &TransferSyntax,
    until: Tag,
) -> Result<(InMemObject, Option<radlink_core::DataElementHeader>)>
where
    S: Read,
{
    let decoder = DatasetDecoder::for_transfer_syntax(ts);
    let source: &mut dyn Read = source;
    read_object(source, &decoder, Some(until))
}

/// Read data set elements until the input is exhausted
/// or the `until` tag is reached (whose header is then returned unread).
fn read_object(
    source: &mut dyn Read,
    decoder: &DatasetDecoder,
    until: Option<Tag>,
) -> Result<(InMemObject, Option<radlink_core::DataElementHeader>)> {
    let mut obj = InMemObject::new();
    loop {
        let (header, _) = match decoder.decode_header(source) {
            Ok(h) => h,
            Err(e) if is_eof(&e) => break,
            Err(e) => return Err(e).context(DecodeHeaderSnafu),
        };

        if header.tag.group() == 0xFFFE {
            return UnexpectedDelimiterSnafu { tag: header.tag }.fail();
        }
        if Some(header.tag) == until {
            return Ok((obj, Some(header)));
        }

        obj.put(read_element(source, decoder, header)?);
    }
    Ok((obj, None))
}

/// Read the value of a single element whose header was already decoded.
fn read_element(
    source: &mut dyn Read,
    decoder: &DatasetDecoder,
    header: radlink_core::DataElementHeader,
) -> Result<InMemElement> {
    let tag = header.tag;

    // encapsulated pixel data: item-framed fragments
    if tag == tags::PIXEL_DATA && header.len.is_undefined() {
        let (offset_table, fragments) = read_fragments(source, decoder)?;
        return Ok(DataElement::new(
            tag,
            header.vr,
            Value::new_pixel_sequence(offset_table, fragments),
        ));
    }

    // sequences, and unknown-VR elements of undefined length,
    // hold a list of items
    if header.vr == VR::SQ || (header.len.is_undefined() && header.vr == VR::UN) {
        let items = read_items(source, decoder, header)?;
        return Ok(DataElement::new(
            tag,
            VR::SQ,
            Value::new_sequence(items, Length::UNDEFINED),
        ));
    }

    let value = read_value(source, &header, decoder.endianness())
        .context(DecodeValueSnafu { tag })?;
    Ok(DataElement::new(tag, header.vr, value))
}

/// Read the items of a sequence element.
fn read_items(
    source: &mut dyn Read,
    decoder: &DatasetDecoder,
    header: radlink_core::DataElementHeader,
) -> Result<C<InMemObject>> {
    let tag = header.tag;
    let mut items = C::new();

    if let Some(len) = header.len.get() {
        // defined length: the items span exactly `len` bytes
        let mut region = source.take(u64::from(len));
        loop {
            let item_header = match decoder.decode_item_header(&mut region) {
                Ok(h) => h,
                Err(e) if is_item_eof(&e) => break,
                Err(e) => return Err(e).context(DecodeHeaderSnafu),
            };
            match item_header {
                SequenceItemHeader::Item { len } => {
                    items.push(read_item(&mut region, decoder, tag, len)?);
                }
                SequenceItemHeader::SequenceDelimiter => break,
                SequenceItemHeader::ItemDelimiter => {
                    return UnexpectedDelimiterSnafu {
                        tag: Tag(0xFFFE, 0xE00D),
                    }
                    .fail()
                }
            }
        }
        // skip whatever slack the declared length may leave
        std::io::copy(&mut region, &mut std::io::sink()).context(ReadFragmentSnafu)?;
    } else {
        // undefined length: items run until the sequence delimiter
        loop {
            let item_header = match decoder.decode_item_header(source) {
                Ok(h) => h,
                Err(e) if is_item_eof(&e) => return UnterminatedSequenceSnafu { tag }.fail(),
                Err(e) => return Err(e).context(DecodeHeaderSnafu),
            };
            match item_header {
                SequenceItemHeader::Item { len } => {
                    items.push(read_item(source, decoder, tag, len)?);
                }
                SequenceItemHeader::SequenceDelimiter => break,
                SequenceItemHeader::ItemDelimiter => {
                    return UnexpectedDelimiterSnafu {
                        tag: Tag(0xFFFE, 0xE00D),
                    }
                    .fail()
                }
            }
        }
    }
    Ok(items)
}

fn is_item_eof(e: &decode::Error) -> bool {
    matches!(
        e,
        decode::Error::ReadItemHeader { source, .. }
            if source.kind() == std::io::ErrorKind::UnexpectedEof
    )
}

/// Read one sequence item as a nested object.
fn read_item(
    source: &mut dyn Read,
    decoder: &DatasetDecoder,
    seq_tag: Tag,
    len: Length,
) -> Result<InMemObject> {
    if let Some(len) = len.get() {
        let mut region = source.take(u64::from(len));
        let (obj, _) = read_object(&mut region, decoder, None)?;
        Ok(obj)
    } else {
        // undefined length: elements run until the item delimiter
        let mut obj = InMemObject::new();
        loop {
            let (header, _) = match decoder.decode_header(source) {
                Ok(h) => h,
                Err(e) if is_eof(&e) => {
                    return UnterminatedSequenceSnafu { tag: seq_tag }.fail()
                }
                Err(e) => return Err(e).context(DecodeHeaderSnafu),
            };
            if header.is_item_delimiter() {
                break;
            }
            if header.tag.group() == 0xFFFE {
                return UnexpectedDelimiterSnafu { tag: header.tag }.fail();
            }
            obj.put(read_element(source, decoder, header)?);
        }
        Ok(obj)
    }
}

/// Read the fragments of an encapsulated pixel data element.
/// The first item is the basic offset table.
fn read_fragments(
    source: &mut dyn Read,
    decoder: &DatasetDecoder,
) -> Result<(C<u8>, C<Vec<u8>>)> {
    let mut offset_table = C::new();
    let mut fragments: C<Vec<u8>> = C::new();
    let mut first = true;
    loop {
        let item_header = match decoder.decode_item_header(source) {
            Ok(h) => h,
            Err(e) if is_item_eof(&e) => {
                return UnterminatedSequenceSnafu {
                    tag: tags::PIXEL_DATA,
                }
                .fail()
            }
            Err(e) => return Err(e).context(DecodeHeaderSnafu),
        };
        match item_header {
            SequenceItemHeader::Item { len } => {
                let len = len.get().map(Ok).unwrap_or_else(|| {
                    UndefinedFragmentLengthSnafu.fail()
                })?;
                let mut data = vec![0u8; len as usize];
                source.read_exact(&mut data).context(ReadFragmentSnafu)?;
                if first {
                    offset_table = C::from(data);
                } else {
                    fragments.push(data);
                }
                first = false;
            }
            SequenceItemHeader::SequenceDelimiter => break,
            SequenceItemHeader::ItemDelimiter => {
                return UnexpectedDelimiterSnafu {
                    tag: Tag(0xFFFE, 0xE00D),
                }
                .fail()
            }
        }
    }
    Ok((offset_table, fragments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_encoding::transfer_syntax::entries;

    //  (0010,0010) PN, "Doe^John"
    //  (0028,0010) US, 256
    const RAW_EXPLICIT: &[u8] = &[
        0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x08, 0x00, b'D', b'o', b'e', b'^', b'J', b'o', b'h',
        b'n', 0x28, 0x00, 0x10, 0x00, b'U', b'S', 0x02, 0x00, 0x00, 0x01,
    ];

    #[test]
    fn read_flat_dataset() {
        let mut cursor = RAW_EXPLICIT;
        let obj = read_dataset(&mut cursor, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(
            obj.get(tags::PATIENT_NAME).unwrap().to_str().unwrap(),
            "Doe^John"
        );
        assert_eq!(
            obj.get(tags::ROWS).unwrap().to_int::<u16>().unwrap(),
            256
        );
    }

    // a sequence of one item with one element, all with undefined lengths
    const RAW_SEQ: &[u8] = &[
        // (0008,1110) SQ, undefined length
        0x08, 0x00, 0x10, 0x11, b'S', b'Q', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF,
        // item, undefined length
        0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF,
        // (0008,1155) UI, "1.2.3.4" + pad
        0x08, 0x00, 0x55, 0x11, b'U', b'I', 0x08, 0x00, b'1', b'.', b'2', b'.', b'3', b'.', b'4',
        0x00,
        // item delimiter
        0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00,
        // sequence delimiter
        0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn read_nested_sequence() {
        let mut cursor = RAW_SEQ;
        let obj = read_dataset(&mut cursor, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        let seq = obj.get(tags::REFERENCED_STUDY_SEQUENCE).unwrap();
        let items = seq.value().items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0]
                .get(tags::REFERENCED_SOP_INSTANCE_UID)
                .unwrap()
                .to_str()
                .unwrap(),
            "1.2.3.4"
        );
    }

    #[test]
    fn unterminated_sequence_is_an_error() {
        // drop the sequence delimiter from the vector above
        let mut cursor = &RAW_SEQ[..RAW_SEQ.len() - 8];
        let e = read_dataset(&mut cursor, &entries::EXPLICIT_VR_LITTLE_ENDIAN);
        assert!(matches!(e, Err(Error::UnterminatedSequence { .. })));
    }

    // encapsulated pixel data: empty offset table and two fragments
    const RAW_PIXEL_SEQ: &[u8] = &[
        // (7FE0,0010) OB, undefined length
        0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF,
        // offset table item, empty
        0xFE, 0xFF, 0x00, 0xE0, 0x00, 0x00, 0x00, 0x00,
        // fragment 1
        0xFE, 0xFF, 0x00, 0xE0, 0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB,
        // fragment 2
        0xFE, 0xFF, 0x00, 0xE0, 0x02, 0x00, 0x00, 0x00, 0xCC, 0xDD,
        // sequence delimiter
        0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn read_encapsulated_pixel_data() {
        let mut cursor = RAW_PIXEL_SEQ;
        let obj = read_dataset(&mut cursor, &entries::EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        let px = obj.get(tags::PIXEL_DATA).unwrap();
        let fragments = px.value().fragments().unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], vec![0xAA, 0xBB]);
        assert_eq!(fragments[1], vec![0xCC, 0xDD]);
        assert!(px.value().offset_table().unwrap().is_empty());
    }
}
