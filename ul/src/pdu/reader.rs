//! PDU reader module
use crate::pdu::*;
use crate::{MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE};
use byteordered::byteorder::{BigEndian, ReadBytesExt};
use radlink_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("invalid max PDU length {}", max_pdu_length))]
    InvalidMaxPdu {
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("no PDU available"))]
    NoPduAvailable { backtrace: Backtrace },

    #[snafu(display("could not read PDU"))]
    ReadPdu {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read PDU field `{}`", field))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read {} reserved bytes", bytes))]
    ReadReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "incoming pdu was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge {
        pdu_length: u32,
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("PDU contained an invalid value {:?}", var_item))]
    InvalidPduVariable {
        var_item: PduVariableItem,
        backtrace: Backtrace,
    },
    #[snafu(display("invalid reject source or reason"))]
    InvalidRejectSourceOrReason { backtrace: Backtrace },
    #[snafu(display("invalid abort source or reason"))]
    InvalidAbortSourceOrReason { backtrace: Backtrace },
    #[snafu(display("invalid presentation context result reason"))]
    InvalidPresentationContextResultReason { backtrace: Backtrace },
    #[snafu(display("unknown presentation context sub-item type {:#04x}", item_type))]
    UnknownPresentationContextSubItem { item_type: u8, backtrace: Backtrace },
    #[snafu(display("could not decode text field `{}`", field))]
    DecodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: radlink_encoding::text::DecodeTextError,
    },
    #[snafu(display("missing application context name"))]
    MissingApplicationContextName { backtrace: Backtrace },
    #[snafu(display("missing abstract syntax"))]
    MissingAbstractSyntax { backtrace: Backtrace },
    #[snafu(display("missing transfer syntax"))]
    MissingTransferSyntax { backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read a PDU from the given source.
///
/// In strict mode, PDUs longer than `max_pdu_length` are rejected;
/// otherwise they are tolerated up to the absolute maximum
/// with a warning.
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32, strict: bool) -> Result<Pdu>
where
    R: Read,
{
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    // If we can't read 2 bytes here, that means that there is no PDU
    // available. Normally, we want to just return the UnexpectedEof error.
    // However, this method can block and wake up when the stream is closed,
    // so in this case we want to know if we had trouble even beginning
    // to read a PDU.
    let mut bytes = [0; 2];
    if let Err(e) = reader.read_exact(&mut bytes) {
        ensure!(e.kind() != ErrorKind::UnexpectedEof, NoPduAvailableSnafu);
        return Err(e).context(ReadPduFieldSnafu { field: "type" });
    }

    let pdu_type = bytes[0];
    let pdu_length = reader
        .read_u32::<BigEndian>()
        .context(ReadPduFieldSnafu { field: "length" })?;

    if strict {
        ensure!(
            pdu_length <= max_pdu_length,
            PduTooLargeSnafu {
                pdu_length,
                max_pdu_length
            }
        );
    } else {
        ensure!(
            pdu_length <= MAXIMUM_PDU_SIZE,
            PduTooLargeSnafu {
                pdu_length,
                max_pdu_length: MAXIMUM_PDU_SIZE
            }
        );
        if pdu_length > max_pdu_length {
            tracing::warn!(
                "incoming pdu was too large: length {}, maximum is {}",
                pdu_length,
                max_pdu_length
            );
        }
    }

    let mut body = vec![0u8; pdu_length as usize];
    reader.read_exact(&mut body).context(ReadPduSnafu)?;
    let mut cursor = Cursor::new(body);
    let codec = DefaultCharacterSetCodec;

    match pdu_type {
        0x01 | 0x02 => {
            // A-ASSOCIATE-RQ / A-ASSOCIATE-AC

            let mut application_context_name: Option<String> = None;
            let mut presentation_contexts_rq = vec![];
            let mut presentation_contexts_ac = vec![];
            let mut user_variables = vec![];

            let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Protocol-version",
            })?;

            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            // Called-AE-title: 16 characters with non-significant
            // leading and trailing spaces
            let mut ae_bytes = [0; 16];
            cursor
                .read_exact(&mut ae_bytes)
                .context(ReadPduFieldSnafu {
                    field: "Called-AE-title",
                })?;
            let called_ae_title = codec
                .decode(&ae_bytes)
                .context(DecodeTextSnafu {
                    field: "Called-AE-title",
                })?
                .trim()
                .to_string();

            let mut ae_bytes = [0; 16];
            cursor
                .read_exact(&mut ae_bytes)
                .context(ReadPduFieldSnafu {
                    field: "Calling-AE-title",
                })?;
            let calling_ae_title = codec
                .decode(&ae_bytes)
                .context(DecodeTextSnafu {
                    field: "Calling-AE-title",
                })?
                .trim()
                .to_string();

            cursor
                .seek(SeekFrom::Current(32))
                .context(ReadReservedSnafu { bytes: 32_u32 })?;

            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextProposed(val) => {
                        presentation_contexts_rq.push(val);
                    }
                    PduVariableItem::PresentationContextResult(val) => {
                        presentation_contexts_ac.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    var_item => {
                        return InvalidPduVariableSnafu { var_item }.fail();
                    }
                }
            }

            let application_context_name =
                application_context_name.context(MissingApplicationContextNameSnafu)?;

            if pdu_type == 0x01 {
                ensure!(
                    presentation_contexts_ac.is_empty(),
                    InvalidPduVariableSnafu {
                        var_item: PduVariableItem::Unknown(0x21)
                    }
                );
                Ok(Pdu::AssociationRQ {
                    protocol_version,
                    calling_ae_title,
                    called_ae_title,
                    application_context_name,
                    presentation_contexts: presentation_contexts_rq,
                    user_variables,
                })
            } else {
                ensure!(
                    presentation_contexts_rq.is_empty(),
                    InvalidPduVariableSnafu {
                        var_item: PduVariableItem::Unknown(0x20)
                    }
                );
                Ok(Pdu::AssociationAC {
                    protocol_version,
                    calling_ae_title,
                    called_ae_title,
                    application_context_name,
                    presentation_contexts: presentation_contexts_ac,
                    user_variables,
                })
            }
        }
        0x03 => {
            // A-ASSOCIATE-RJ
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            let result = AssociationRJResult::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Result" })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;
            let source_byte = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Source" })?;
            let reason_byte = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Reason" })?;
            let source = AssociationRJSource::from(source_byte, reason_byte)
                .context(InvalidRejectSourceOrReasonSnafu)?;
            Ok(Pdu::AssociationRJ { result, source })
        }
        0x04 => {
            // P-DATA-TF
            let mut values = Vec::new();
            while cursor.position() < cursor.get_ref().len() as u64 {
                let value_length = cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;
                let presentation_context_id =
                    cursor.read_u8().context(ReadPduFieldSnafu {
                        field: "Presentation-context-ID",
                    })?;
                let message_header = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Message-control-header",
                })?;
                let value_type = if message_header & 0x01 != 0 {
                    PDataValueType::Command
                } else {
                    PDataValueType::Data
                };
                let is_last = message_header & 0x02 != 0;
                let mut data = vec![0u8; value_length as usize - 2];
                cursor.read_exact(&mut data).context(ReadPduFieldSnafu {
                    field: "Presentation-data-value",
                })?;
                values.push(PDataValue {
                    presentation_context_id,
                    value_type,
                    is_last,
                    data,
                });
            }
            Ok(Pdu::PData { data: values })
        }
        0x05 => {
            // A-RELEASE-RQ: 4 reserved bytes
            Ok(Pdu::ReleaseRQ)
        }
        0x06 => {
            // A-RELEASE-RP: 4 reserved bytes
            Ok(Pdu::ReleaseRP)
        }
        0x07 => {
            // A-ABORT
            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;
            let source_byte = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Source" })?;
            let reason_byte = cursor
                .read_u8()
                .context(ReadPduFieldSnafu { field: "Reason" })?;
            let source = AbortRQSource::from(source_byte, reason_byte)
                .context(InvalidAbortSourceOrReasonSnafu)?;
            Ok(Pdu::AbortRQ { source })
        }
        _ => Ok(Pdu::Unknown {
            pdu_type,
            data: cursor.into_inner(),
        }),
    }
}

/// Read one variable item (application context, presentation context
/// or user information) from the PDU body.
fn read_pdu_variable<R>(reader: &mut R, codec: &DefaultCharacterSetCodec) -> Result<PduVariableItem>
where
    R: Read,
{
    let item_type = reader.read_u8().context(ReadPduFieldSnafu {
        field: "Item-type",
    })?;
    reader
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;
    let item_length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;
    let mut body = vec![0u8; usize::from(item_length)];
    reader.read_exact(&mut body).context(ReadPduFieldSnafu {
        field: "Item-body",
    })?;
    let mut cursor = Cursor::new(&body[..]);

    match item_type {
        0x10 => {
            // Application Context Item
            let name = codec.decode(&body).context(DecodeTextSnafu {
                field: "Application-context-name",
            })?;
            Ok(PduVariableItem::ApplicationContext(name))
        }
        0x20 => {
            // Presentation Context Item (proposed)
            let id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .seek(SeekFrom::Current(3))
                .context(ReadReservedSnafu { bytes: 3_u32 })?;

            let mut abstract_syntax: Option<String> = None;
            let mut transfer_syntaxes = vec![];
            while cursor.position() < body.len() as u64 {
                let (sub_type, sub_body) = read_sub_item(&mut cursor)?;
                match sub_type {
                    0x30 => {
                        abstract_syntax = Some(
                            codec
                                .decode(&sub_body)
                                .context(DecodeTextSnafu {
                                    field: "Abstract-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    0x40 => {
                        transfer_syntaxes.push(
                            codec
                                .decode(&sub_body)
                                .context(DecodeTextSnafu {
                                    field: "Transfer-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    item_type => {
                        return UnknownPresentationContextSubItemSnafu { item_type }.fail()
                    }
                }
            }
            ensure!(!transfer_syntaxes.is_empty(), MissingTransferSyntaxSnafu);
            Ok(PduVariableItem::PresentationContextProposed(
                PresentationContextProposed {
                    id,
                    abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu)?,
                    transfer_syntaxes,
                },
            ))
        }
        0x21 => {
            // Presentation Context Item (result)
            let id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            let reason = PresentationContextResultReason::from(
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Result/Reason",
                })?,
            )
            .context(InvalidPresentationContextResultReasonSnafu)?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            let mut transfer_syntax: Option<String> = None;
            while cursor.position() < body.len() as u64 {
                let (sub_type, sub_body) = read_sub_item(&mut cursor)?;
                if sub_type == 0x40 {
                    transfer_syntax = Some(
                        codec
                            .decode(&sub_body)
                            .context(DecodeTextSnafu {
                                field: "Transfer-syntax-name",
                            })?
                            .trim()
                            .to_string(),
                    );
                } else {
                    return UnknownPresentationContextSubItemSnafu {
                        item_type: sub_type,
                    }
                    .fail();
                }
            }
            Ok(PduVariableItem::PresentationContextResult(
                PresentationContextResult {
                    id,
                    reason,
                    transfer_syntax: transfer_syntax.context(MissingTransferSyntaxSnafu)?,
                },
            ))
        }
        0x50 => {
            // User Information Item
            let mut variables = vec![];
            while cursor.position() < body.len() as u64 {
                let (sub_type, sub_body) = read_sub_item(&mut cursor)?;
                match sub_type {
                    0x51 => {
                        let mut c = Cursor::new(&sub_body);
                        variables.push(UserVariableItem::MaxLength(
                            c.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Maximum-length-received",
                            })?,
                        ));
                    }
                    0x52 => {
                        variables.push(UserVariableItem::ImplementationClassUid(
                            codec
                                .decode(&sub_body)
                                .context(DecodeTextSnafu {
                                    field: "Implementation-class-UID",
                                })?
                                .trim()
                                .to_string(),
                        ));
                    }
                    0x53 => {
                        let mut c = Cursor::new(&sub_body);
                        let invoked = c.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                            field: "Maximum-number-operations-invoked",
                        })?;
                        let performed = c.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                            field: "Maximum-number-operations-performed",
                        })?;
                        variables.push(UserVariableItem::AsyncOperations(invoked, performed));
                    }
                    0x55 => {
                        variables.push(UserVariableItem::ImplementationVersionName(
                            codec
                                .decode(&sub_body)
                                .context(DecodeTextSnafu {
                                    field: "Implementation-version-name",
                                })?
                                .trim()
                                .to_string(),
                        ));
                    }
                    0x58 => {
                        let mut c = Cursor::new(&sub_body);
                        let identity_type = c.read_u8().context(ReadPduFieldSnafu {
                            field: "User-identity-type",
                        })?;
                        let positive_response_requested =
                            c.read_u8().context(ReadPduFieldSnafu {
                                field: "Positive-response-requested",
                            })? == 1;
                        let primary_length =
                            c.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Primary-field-length",
                            })?;
                        let mut primary_field = vec![0u8; usize::from(primary_length)];
                        c.read_exact(&mut primary_field).context(ReadPduFieldSnafu {
                            field: "Primary-field",
                        })?;
                        let secondary_length =
                            c.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Secondary-field-length",
                            })?;
                        let mut secondary_field = vec![0u8; usize::from(secondary_length)];
                        c.read_exact(&mut secondary_field)
                            .context(ReadPduFieldSnafu {
                                field: "Secondary-field",
                            })?;
                        variables.push(UserVariableItem::UserIdentity(UserIdentity {
                            identity_type,
                            positive_response_requested,
                            primary_field,
                            secondary_field,
                        }));
                    }
                    sub_type => {
                        variables.push(UserVariableItem::Unknown(sub_type, sub_body));
                    }
                }
            }
            Ok(PduVariableItem::UserVariables(variables))
        }
        _ => Ok(PduVariableItem::Unknown(item_type)),
    }
}

/// Read one `type | reserved | length(u16) | body` sub-item.
fn read_sub_item<R>(reader: &mut R) -> Result<(u8, Vec<u8>)>
where
    R: Read,
{
    let sub_type = reader.read_u8().context(ReadPduFieldSnafu {
        field: "Sub-item-type",
    })?;
    reader
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;
    let length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Sub-item-length",
    })?;
    let mut body = vec![0u8; usize::from(length)];
    reader.read_exact(&mut body).context(ReadPduFieldSnafu {
        field: "Sub-item-body",
    })?;
    Ok((sub_type, body))
}
