//! Decoding of primitive values from their raw byte representation,
//! according to the element's value representation and byte order.

use crate::decode::basic::{BasicDecode, BasicDecoder};
use crate::decode::{
    BadLengthSnafu, DecodeTextSnafu, Result, TruncatedValueSnafu, UndefinedValueLengthSnafu,
};
use crate::text::{DefaultCharacterSetCodec, TextCodec};
use byteordered::Endianness;
use radlink_core::header::DataElementHeader;
use radlink_core::value::{PrimitiveValue, C};
use radlink_core::{Tag, VR};
use snafu::{ensure, OptionExt, ResultExt};
use std::io::Read;

/// Strip the padding characters which may trail a stored string value.
fn strip_padding(s: &str) -> &str {
    s.trim_end_matches(['\0', ' '])
}

fn require_width(tag: Tag, vr: VR, len: u32, width: u32) -> Result<usize> {
    ensure!(len % width == 0, BadLengthSnafu { tag, vr, len, width });
    Ok((len / width) as usize)
}

/// Read the value of the given element from the source,
/// decoding it into a primitive value.
///
/// The header must carry a defined length;
/// delimited values (sequences, encapsulated pixel data)
/// are handled at the data set level.
pub fn read_value<S>(
    source: &mut S,
    header: &DataElementHeader,
    endianness: Endianness,
) -> Result<PrimitiveValue>
where
    S: ?Sized + Read,
{
    let tag = header.tag;
    let vr = header.vr;
    let len = header
        .len
        .get()
        .context(UndefinedValueLengthSnafu { tag })?;

    if len == 0 {
        return Ok(PrimitiveValue::Empty);
    }

    let mut data = vec![0u8; len as usize];
    source
        .read_exact(&mut data)
        .context(TruncatedValueSnafu { tag })?;

    if vr.is_string() {
        let codec = DefaultCharacterSetCodec;
        let text = codec.decode(&data).context(DecodeTextSnafu { tag })?;
        // numeric strings decode to their numeric form,
        // tolerating surrounding whitespace; values which do not parse
        // are preserved verbatim
        match vr {
            VR::IS => {
                if let Ok(values) = text
                    .split('\\')
                    .map(|v| v.trim_matches([' ', '\0']).parse::<i32>())
                    .collect::<std::result::Result<C<i32>, _>>()
                {
                    return Ok(PrimitiveValue::I32(values));
                }
            }
            VR::DS => {
                if let Ok(values) = text
                    .split('\\')
                    .map(|v| v.trim_matches([' ', '\0']).parse::<f64>())
                    .collect::<std::result::Result<C<f64>, _>>()
                {
                    return Ok(PrimitiveValue::F64(values));
                }
            }
            _ => {}
        }
        if vr.is_multi_valued() {
            let values: C<String> = text
                .split('\\')
                .map(|v| strip_padding(v).to_string())
                .collect();
            return Ok(PrimitiveValue::Strs(values));
        }
        return Ok(PrimitiveValue::Str(strip_padding(&text).to_string()));
    }

    let basic = BasicDecoder::from(endianness);
    let value = match vr {
        VR::AT => {
            let n = require_width(tag, vr, len, 4)?;
            PrimitiveValue::Tags(
                (0..n)
                    .map(|i| basic.decode_tag(&data[i * 4..]))
                    .collect(),
            )
        }
        VR::US | VR::OW => {
            let n = require_width(tag, vr, len, 2)?;
            PrimitiveValue::U16((0..n).map(|i| basic.decode_us(&data[i * 2..])).collect())
        }
        VR::SS => {
            let n = require_width(tag, vr, len, 2)?;
            PrimitiveValue::I16((0..n).map(|i| basic.decode_ss(&data[i * 2..])).collect())
        }
        VR::UL | VR::OL => {
            let n = require_width(tag, vr, len, 4)?;
            PrimitiveValue::U32((0..n).map(|i| basic.decode_ul(&data[i * 4..])).collect())
        }
        VR::SL => {
            let n = require_width(tag, vr, len, 4)?;
            PrimitiveValue::I32((0..n).map(|i| basic.decode_sl(&data[i * 4..])).collect())
        }
        VR::UV | VR::OV => {
            let n = require_width(tag, vr, len, 8)?;
            PrimitiveValue::U64((0..n).map(|i| basic.decode_uv(&data[i * 8..])).collect())
        }
        VR::SV => {
            let n = require_width(tag, vr, len, 8)?;
            PrimitiveValue::I64((0..n).map(|i| basic.decode_sv(&data[i * 8..])).collect())
        }
        VR::FL | VR::OF => {
            let n = require_width(tag, vr, len, 4)?;
            PrimitiveValue::F32((0..n).map(|i| basic.decode_fl(&data[i * 4..])).collect())
        }
        VR::FD | VR::OD => {
            let n = require_width(tag, vr, len, 8)?;
            PrimitiveValue::F64((0..n).map(|i| basic.decode_fd(&data[i * 8..])).collect())
        }
        // OB, UN, SQ read as raw bytes
        // (a defined-length SQ reaches here only through value skipping)
        _ => PrimitiveValue::U8(C::from(data)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Error;
    use radlink_core::header::Length;
    use radlink_core::Tag;
    use smallvec::smallvec;
    use std::io::Cursor;

    fn header(tag: Tag, vr: VR, len: u32) -> DataElementHeader {
        DataElementHeader::new(tag, vr, Length(len))
    }

    #[test]
    fn read_multi_valued_string() {
        let mut src = Cursor::new(b"DERIVED\\PRIMARY ".to_vec());
        let v = read_value(
            &mut src,
            &header(Tag(0x0008, 0x0008), VR::CS, 16),
            Endianness::Little,
        )
        .unwrap();
        assert_eq!(v, PrimitiveValue::strs(["DERIVED", "PRIMARY"]));
    }

    #[test]
    fn read_ui_strips_trailing_nul() {
        let mut src = Cursor::new(b"1.2.840.10008.1.1\0".to_vec());
        let v = read_value(
            &mut src,
            &header(Tag(0x0008, 0x0016), VR::UI, 18),
            Endianness::Little,
        )
        .unwrap();
        assert_eq!(v, PrimitiveValue::strs(["1.2.840.10008.1.1"]));
    }

    #[test]
    fn read_numeric_values_in_both_byte_orders() {
        let mut src = Cursor::new(vec![0x00, 0x01, 0x00, 0x02]);
        let v = read_value(
            &mut src,
            &header(Tag(0x0028, 0x0010), VR::US, 4),
            Endianness::Little,
        )
        .unwrap();
        assert_eq!(v, PrimitiveValue::U16(smallvec![256, 512]));

        let mut src = Cursor::new(vec![0x00, 0x01, 0x00, 0x02]);
        let v = read_value(
            &mut src,
            &header(Tag(0x0028, 0x0010), VR::US, 4),
            Endianness::Big,
        )
        .unwrap();
        assert_eq!(v, PrimitiveValue::U16(smallvec![1, 2]));
    }

    #[test]
    fn bad_length_is_detected() {
        let mut src = Cursor::new(vec![0x00, 0x01, 0x00]);
        let e = read_value(
            &mut src,
            &header(Tag(0x0028, 0x0010), VR::US, 3),
            Endianness::Little,
        );
        assert!(matches!(e, Err(Error::BadLength { .. })));
    }

    #[test]
    fn truncated_value_is_detected() {
        let mut src = Cursor::new(vec![0x00, 0x01]);
        let e = read_value(
            &mut src,
            &header(Tag(0x0028, 0x0010), VR::US, 4),
            Endianness::Little,
        );
        assert!(matches!(e, Err(Error::TruncatedValue { .. })));
    }
}
