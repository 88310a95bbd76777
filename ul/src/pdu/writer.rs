//! PDU writer module
use crate::pdu::*;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use radlink_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("could not write PDU field `{}`", field))]
    WriteField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not encode text field `{}`", field))]
    EncodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: radlink_encoding::text::EncodeTextError,
    },

    #[snafu(display("AE title `{}` is longer than 16 characters", ae_title))]
    AeTitleTooLong {
        ae_title: String,
        backtrace: Backtrace,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Serialize a PDU to the given writer,
/// emitting the `type | reserved | length(u32 BE) | body` frame.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    let codec = DefaultCharacterSetCodec;
    let (pdu_type, body): (u8, Vec<u8>) = match pdu {
        Pdu::AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => {
            let mut body = Vec::new();
            write_association_head(
                &mut body,
                &codec,
                *protocol_version,
                called_ae_title,
                calling_ae_title,
            )?;
            write_item(&mut body, 0x10, application_context_name.as_bytes())?;
            for pc in presentation_contexts {
                let mut pc_body = Vec::new();
                pc_body.push(pc.id);
                pc_body.extend_from_slice(&[0, 0, 0]);
                write_sub_item(&mut pc_body, 0x30, pc.abstract_syntax.as_bytes())?;
                for ts in &pc.transfer_syntaxes {
                    write_sub_item(&mut pc_body, 0x40, ts.as_bytes())?;
                }
                write_item(&mut body, 0x20, &pc_body)?;
            }
            write_user_information(&mut body, user_variables)?;
            (0x01, body)
        }
        Pdu::AssociationAC {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => {
            let mut body = Vec::new();
            write_association_head(
                &mut body,
                &codec,
                *protocol_version,
                called_ae_title,
                calling_ae_title,
            )?;
            write_item(&mut body, 0x10, application_context_name.as_bytes())?;
            for pc in presentation_contexts {
                let mut pc_body = Vec::new();
                pc_body.push(pc.id);
                pc_body.push(0);
                pc_body.push(pc.reason as u8);
                pc_body.push(0);
                write_sub_item(&mut pc_body, 0x40, pc.transfer_syntax.as_bytes())?;
                write_item(&mut body, 0x21, &pc_body)?;
            }
            write_user_information(&mut body, user_variables)?;
            (0x02, body)
        }
        Pdu::AssociationRJ { result, source } => {
            let (source_byte, reason_byte) = source.to_bytes();
            (0x03, vec![0, *result as u8, source_byte, reason_byte])
        }
        Pdu::PData { data } => {
            let mut body = Vec::new();
            for value in data {
                body.write_u32::<BigEndian>(value.data.len() as u32 + 2)
                    .context(WriteFieldSnafu {
                        field: "Item-length",
                    })?;
                body.push(value.presentation_context_id);
                let mut message_header = 0x00;
                if value.value_type == PDataValueType::Command {
                    message_header |= 0x01;
                }
                if value.is_last {
                    message_header |= 0x02;
                }
                body.push(message_header);
                body.extend_from_slice(&value.data);
            }
            (0x04, body)
        }
        Pdu::ReleaseRQ => (0x05, vec![0; 4]),
        Pdu::ReleaseRP => (0x06, vec![0; 4]),
        Pdu::AbortRQ { source } => {
            let (source_byte, reason_byte) = source.to_bytes();
            (0x07, vec![0, 0, source_byte, reason_byte])
        }
        Pdu::Unknown { pdu_type, data } => (*pdu_type, data.clone()),
    };

    writer
        .write_all(&[pdu_type, 0])
        .context(WriteFieldSnafu { field: "type" })?;
    writer
        .write_u32::<BigEndian>(body.len() as u32)
        .context(WriteFieldSnafu { field: "length" })?;
    writer
        .write_all(&body)
        .context(WriteFieldSnafu { field: "body" })?;
    Ok(())
}

/// Write the fixed head of an association PDU:
/// protocol version, reserved bytes and the space-padded AE titles.
fn write_association_head(
    body: &mut Vec<u8>,
    codec: &DefaultCharacterSetCodec,
    protocol_version: u16,
    called_ae_title: &str,
    calling_ae_title: &str,
) -> Result<()> {
    body.write_u16::<BigEndian>(protocol_version)
        .context(WriteFieldSnafu {
            field: "Protocol-version",
        })?;
    body.extend_from_slice(&[0, 0]);
    write_ae_title(body, codec, called_ae_title, "Called-AE-title")?;
    write_ae_title(body, codec, calling_ae_title, "Calling-AE-title")?;
    body.extend_from_slice(&[0u8; 32]);
    Ok(())
}

/// Write an AE title as 16 bytes, space-padded on the right.
fn write_ae_title(
    body: &mut Vec<u8>,
    codec: &DefaultCharacterSetCodec,
    ae_title: &str,
    field: &'static str,
) -> Result<()> {
    let bytes = codec.encode(ae_title).context(EncodeTextSnafu { field })?;
    snafu::ensure!(
        bytes.len() <= 16,
        AeTitleTooLongSnafu {
            ae_title: ae_title.to_string()
        }
    );
    let mut padded = [b' '; 16];
    padded[..bytes.len()].copy_from_slice(&bytes);
    body.extend_from_slice(&padded);
    Ok(())
}

/// Write one `type | reserved | length(u16) | body` variable item.
fn write_item(to: &mut Vec<u8>, item_type: u8, body: &[u8]) -> Result<()> {
    to.push(item_type);
    to.push(0);
    to.write_u16::<BigEndian>(body.len() as u16)
        .context(WriteFieldSnafu {
            field: "Item-length",
        })?;
    to.extend_from_slice(body);
    Ok(())
}

/// Sub-items share the frame of variable items.
fn write_sub_item(to: &mut Vec<u8>, sub_type: u8, body: &[u8]) -> Result<()> {
    write_item(to, sub_type, body)
}

/// Write the user information item (type 0x50) with its sub-items.
fn write_user_information(body: &mut Vec<u8>, variables: &[UserVariableItem]) -> Result<()> {
    let mut user_body = Vec::new();
    for variable in variables {
        match variable {
            UserVariableItem::MaxLength(max_length) => {
                let mut b = Vec::with_capacity(4);
                b.write_u32::<BigEndian>(*max_length)
                    .context(WriteFieldSnafu {
                        field: "Maximum-length-received",
                    })?;
                write_sub_item(&mut user_body, 0x51, &b)?;
            }
            UserVariableItem::ImplementationClassUid(uid) => {
                write_sub_item(&mut user_body, 0x52, uid.as_bytes())?;
            }
            UserVariableItem::AsyncOperations(invoked, performed) => {
                let mut b = Vec::with_capacity(4);
                b.write_u16::<BigEndian>(*invoked).context(WriteFieldSnafu {
                    field: "Maximum-number-operations-invoked",
                })?;
                b.write_u16::<BigEndian>(*performed)
                    .context(WriteFieldSnafu {
                        field: "Maximum-number-operations-performed",
                    })?;
                write_sub_item(&mut user_body, 0x53, &b)?;
            }
            UserVariableItem::ImplementationVersionName(name) => {
                write_sub_item(&mut user_body, 0x55, name.as_bytes())?;
            }
            UserVariableItem::UserIdentity(identity) => {
                let mut b = Vec::new();
                b.push(identity.identity_type);
                b.push(u8::from(identity.positive_response_requested));
                b.write_u16::<BigEndian>(identity.primary_field.len() as u16)
                    .context(WriteFieldSnafu {
                        field: "Primary-field-length",
                    })?;
                b.extend_from_slice(&identity.primary_field);
                b.write_u16::<BigEndian>(identity.secondary_field.len() as u16)
                    .context(WriteFieldSnafu {
                        field: "Secondary-field-length",
                    })?;
                b.extend_from_slice(&identity.secondary_field);
                write_sub_item(&mut user_body, 0x58, &b)?;
            }
            UserVariableItem::Unknown(sub_type, data) => {
                write_sub_item(&mut user_body, *sub_type, data)?;
            }
        }
    }
    write_item(body, 0x50, &user_body)
}
