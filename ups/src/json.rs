//! The DICOM-JSON codec (PS3.18 Annex F):
//! each element keyed by its 8-digit hexadecimal tag,
//! with a `vr` field and a `Value` or `InlineBinary` member.

use base64::Engine;
use radlink_core::value::{PrimitiveValue, Value as DicomValue, C};
use radlink_core::{DataElement, Length, Tag, VR};
use radlink_object::InMemObject;
use serde_json::{json, Map, Value};
use snafu::{OptionExt, Snafu};
use std::str::FromStr;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("`{}` is not an 8-digit hexadecimal tag", key))]
    BadTagKey { key: String },

    #[snafu(display("element {} has no `vr` member", tag))]
    MissingVr { tag: Tag },

    #[snafu(display("element {} has an unrecognized VR `{}`", tag, vr))]
    BadVr { tag: Tag, vr: String },

    #[snafu(display("element {} has a malformed value", tag))]
    BadValue { tag: Tag },

    #[snafu(display("the root of a DICOM-JSON document must be an object"))]
    NotAnObject,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn tag_key(tag: Tag) -> String {
    format!("{:04X}{:04X}", tag.group(), tag.element())
}

fn parse_tag_key(key: &str) -> Result<Tag> {
    if key.len() != 8 {
        return BadTagKeySnafu { key }.fail();
    }
    let group = u16::from_str_radix(&key[..4], 16).ok();
    let element = u16::from_str_radix(&key[4..], 16).ok();
    match (group, element) {
        (Some(g), Some(e)) => Ok(Tag(g, e)),
        _ => BadTagKeySnafu { key }.fail(),
    }
}

/// Whether values of this VR serialize as JSON numbers.
fn is_json_number(vr: VR) -> bool {
    use VR::*;
    matches!(vr, US | UL | UV | SS | SL | SV | FL | FD | IS | DS)
}

/// Serialize a data set into its DICOM-JSON model.
pub fn to_json(obj: &InMemObject) -> Value {
    let mut map = Map::new();
    for element in obj.iter() {
        let vr = element.vr();
        let mut body = Map::new();
        body.insert("vr".to_string(), json!(vr.to_string()));

        match element.value() {
            DicomValue::Sequence { items, .. } => {
                let values: Vec<Value> = items.iter().map(to_json).collect();
                if !values.is_empty() {
                    body.insert("Value".to_string(), Value::Array(values));
                }
            }
            DicomValue::PixelSequence { fragments, .. } => {
                // fragments are concatenated for the JSON model
                let all: Vec<u8> = fragments.iter().flatten().copied().collect();
                body.insert(
                    "InlineBinary".to_string(),
                    json!(base64::engine::general_purpose::STANDARD.encode(all)),
                );
            }
            DicomValue::Primitive(PrimitiveValue::Empty) => {}
            DicomValue::Primitive(value) => match vr {
                VR::OB | VR::OW | VR::OD | VR::OF | VR::OL | VR::OV | VR::UN => {
                    body.insert(
                        "InlineBinary".to_string(),
                        json!(base64::engine::general_purpose::STANDARD
                            .encode(value.to_bytes().as_ref())),
                    );
                }
                VR::PN => {
                    let values: Vec<Value> = value
                        .to_multi_str()
                        .iter()
                        .map(|name| json!({ "Alphabetic": name }))
                        .collect();
                    body.insert("Value".to_string(), Value::Array(values));
                }
                VR::AT => {
                    let values: Vec<Value> = value
                        .to_multi_str()
                        .iter()
                        .map(|t| json!(t.replace(['(', ')', ','], "")))
                        .collect();
                    body.insert("Value".to_string(), Value::Array(values));
                }
                vr if is_json_number(vr) => {
                    let values: Vec<Value> = match value {
                        PrimitiveValue::U8(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::U16(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::U32(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::U64(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::I16(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::I32(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::I64(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::F32(v) => v.iter().map(|x| json!(x)).collect(),
                        PrimitiveValue::F64(v) => v.iter().map(|x| json!(x)).collect(),
                        other => other
                            .to_multi_str()
                            .iter()
                            .filter_map(|s| serde_json::Number::from_str(s.trim()).ok())
                            .map(Value::Number)
                            .collect(),
                    };
                    if !values.is_empty() {
                        body.insert("Value".to_string(), Value::Array(values));
                    }
                }
                _ => {
                    let values: Vec<Value> =
                        value.to_multi_str().iter().map(|s| json!(s)).collect();
                    if !values.is_empty() {
                        body.insert("Value".to_string(), Value::Array(values));
                    }
                }
            },
        }
        map.insert(tag_key(element.header().tag), Value::Object(body));
    }
    Value::Object(map)
}

/// Reconstruct a data set from its DICOM-JSON model.
pub fn from_json(value: &Value) -> Result<InMemObject> {
    let map = value.as_object().context(NotAnObjectSnafu)?;
    let mut obj = InMemObject::new();

    for (key, body) in map {
        let tag = parse_tag_key(key)?;
        let body = body.as_object().context(BadValueSnafu { tag })?;
        let vr_name = body
            .get("vr")
            .and_then(|v| v.as_str())
            .context(MissingVrSnafu { tag })?;
        let vr = VR::from_str(vr_name)
            .ok()
            .context(BadVrSnafu { tag, vr: vr_name })?;

        if let Some(inline) = body.get("InlineBinary").and_then(|v| v.as_str()) {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(inline)
                .ok()
                .context(BadValueSnafu { tag })?;
            // word-based VRs are stored as 16-bit words (little endian)
            let prim = if vr == VR::OW {
                if bytes.len() % 2 != 0 {
                    return BadValueSnafu { tag }.fail();
                }
                PrimitiveValue::U16(
                    bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect(),
                )
            } else {
                PrimitiveValue::from(bytes)
            };
            obj.put(DataElement::new(tag, vr, prim));
            continue;
        }

        let values = match body.get("Value") {
            Some(Value::Array(values)) => values.as_slice(),
            Some(_) => return BadValueSnafu { tag }.fail(),
            None => {
                obj.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
                continue;
            }
        };

        if vr == VR::SQ {
            let mut items: C<InMemObject> = C::new();
            for item in values {
                items.push(from_json(item)?);
            }
            obj.put(DataElement::new(
                tag,
                vr,
                DicomValue::new_sequence(items, Length::UNDEFINED),
            ));
            continue;
        }

        let prim = if vr == VR::PN {
            let names: Option<C<String>> = values
                .iter()
                .map(|v| {
                    v.get("Alphabetic")
                        .and_then(|a| a.as_str())
                        .map(str::to_string)
                        .or_else(|| v.as_str().map(str::to_string))
                })
                .collect();
            PrimitiveValue::Strs(names.context(BadValueSnafu { tag })?)
        } else if is_json_number(vr) {
            match vr {
                VR::US => PrimitiveValue::U16(collect_numbers(values, tag, |n| {
                    n.as_u64().and_then(|x| u16::try_from(x).ok())
                })?),
                VR::UL => PrimitiveValue::U32(collect_numbers(values, tag, |n| {
                    n.as_u64().and_then(|x| u32::try_from(x).ok())
                })?),
                VR::UV => PrimitiveValue::U64(collect_numbers(values, tag, |n| n.as_u64())?),
                VR::SS => PrimitiveValue::I16(collect_numbers(values, tag, |n| {
                    n.as_i64().and_then(|x| i16::try_from(x).ok())
                })?),
                VR::SL | VR::IS => PrimitiveValue::I32(collect_numbers(values, tag, |n| {
                    n.as_i64().and_then(|x| i32::try_from(x).ok())
                })?),
                VR::SV => PrimitiveValue::I64(collect_numbers(values, tag, |n| n.as_i64())?),
                VR::FL => PrimitiveValue::F32(collect_numbers(values, tag, |n| {
                    n.as_f64().map(|x| x as f32)
                })?),
                _ => PrimitiveValue::F64(collect_numbers(values, tag, |n| n.as_f64())?),
            }
        } else {
            let strings: Option<C<String>> = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            let strings = strings.context(BadValueSnafu { tag })?;
            if vr.is_multi_valued() {
                PrimitiveValue::Strs(strings)
            } else {
                PrimitiveValue::Str(strings.join("\\"))
            }
        };
        obj.put(DataElement::new(tag, vr, prim));
    }
    Ok(obj)
}

fn collect_numbers<T>(
    values: &[Value],
    tag: Tag,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<C<T>> {
    values
        .iter()
        .map(|v| convert(v))
        .collect::<Option<C<T>>>()
        .context(BadValueSnafu { tag })
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::tags;

    fn sample() -> InMemObject {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_NAME, "TEST^PATIENT").unwrap();
        obj.set_string(tags::PATIENT_ID, "12345").unwrap();
        obj.set_string(tags::PROCEDURE_STEP_STATE, "SCHEDULED").unwrap();
        obj.set_int(tags::ROWS, 512).unwrap();
        obj.set_int(tags::SERIES_NUMBER, 3).unwrap();
        let mut item = InMemObject::new();
        item.set_string(tags::REFERENCED_SOP_INSTANCE_UID, "1.2.3").unwrap();
        obj.append_item(tags::REFERENCED_STUDY_SEQUENCE, item).unwrap();
        obj
    }

    #[test]
    fn keys_and_vrs_follow_the_model() {
        let value = to_json(&sample());
        assert_eq!(value["00100010"]["vr"], "PN");
        assert_eq!(value["00100010"]["Value"][0]["Alphabetic"], "TEST^PATIENT");
        assert_eq!(value["00100020"]["vr"], "LO");
        assert_eq!(value["00100020"]["Value"][0], "12345");
        // numeric VRs serialize as numbers
        assert_eq!(value["00280010"]["Value"][0], 512);
        assert_eq!(value["00200011"]["Value"][0], 3);
        // UPS state attribute
        assert_eq!(value["00741000"]["Value"][0], "SCHEDULED");
        // nested sequence
        assert_eq!(
            value["00081110"]["Value"][0]["00081155"]["Value"][0],
            "1.2.3"
        );
    }

    #[test]
    fn json_round_trip() {
        let obj = sample();
        let value = to_json(&obj);
        let back = from_json(&value).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn inline_binary_round_trip() {
        let mut obj = InMemObject::new();
        obj.set_bytes(radlink_core::Tag(0x7FE0, 0x0010), vec![1, 2, 3, 4])
            .unwrap();
        // OW data serializes through InlineBinary
        let value = to_json(&obj);
        assert!(value["7FE00010"]["InlineBinary"].is_string());
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(from_json(&json!([1, 2, 3])).is_err());
        assert!(from_json(&json!({ "NOTATAG": {"vr": "LO"} })).is_err());
        assert!(from_json(&json!({ "00100020": {} })).is_err());
    }
}
