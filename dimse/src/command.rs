//! The DIMSE command set codec.
//!
//! A command set is a small data set of group 0000 elements,
//! always encoded in Implicit VR Little Endian regardless of the
//! transfer syntax negotiated for the presentation context.
//! Messages are modeled as one tagged union with the shared header
//! fields inside each variant.

use crate::status::Status;
use radlink_core::value::PrimitiveValue;
use radlink_core::{tags, DataElement, Tag, VR};
use radlink_encoding::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN;
use radlink_object::{read::read_dataset, write::write_dataset, InMemObject};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};

/// The value of CommandDataSetType which signals
/// that no data set follows the command set.
pub const NO_DATA_SET: u16 = 0x0101;

/// The value of CommandDataSetType used when a data set follows.
pub const DATA_SET_FOLLOWS: u16 = 0x0000;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to decode command set"))]
    DecodeCommand {
        #[snafu(backtrace)]
        source: radlink_object::read::Error,
    },

    #[snafu(display("failed to encode command set"))]
    EncodeCommand {
        #[snafu(backtrace)]
        source: radlink_object::write::Error,
    },

    #[snafu(display("command set is missing element {}", tag))]
    MissingCommandElement { tag: Tag, backtrace: Backtrace },

    #[snafu(display("unsupported command field {:#06X}", field))]
    UnsupportedCommandField { field: u16, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The priority of a request, as carried in Priority (0000,0700).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    fn to_u16(self) -> u16 {
        match self {
            Priority::Medium => 0x0000,
            Priority::High => 0x0001,
            Priority::Low => 0x0002,
        }
    }

    fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => Priority::High,
            0x0002 => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// The sub-operation progress counters of C-MOVE and C-GET responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubOperationCounts {
    pub remaining: Option<u16>,
    pub completed: Option<u16>,
    pub failed: Option<u16>,
    pub warning: Option<u16>,
}

/// A DIMSE message, one variant per command type.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CEchoRq {
        message_id: u16,
        affected_sop_class_uid: String,
    },
    CEchoRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        status: Status,
    },
    CStoreRq {
        message_id: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        priority: Priority,
        move_originator_ae_title: Option<String>,
        move_originator_message_id: Option<u16>,
    },
    CStoreRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        status: Status,
    },
    CFindRq {
        message_id: u16,
        affected_sop_class_uid: String,
        priority: Priority,
    },
    CFindRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        status: Status,
    },
    CMoveRq {
        message_id: u16,
        affected_sop_class_uid: String,
        priority: Priority,
        move_destination: String,
    },
    CMoveRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        status: Status,
        counts: SubOperationCounts,
    },
    CGetRq {
        message_id: u16,
        affected_sop_class_uid: String,
        priority: Priority,
    },
    CGetRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        status: Status,
        counts: SubOperationCounts,
    },
    CCancelRq {
        message_id_responded: u16,
    },
    NEventReportRq {
        message_id: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        event_type_id: u16,
    },
    NEventReportRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        event_type_id: u16,
        status: Status,
    },
    NGetRq {
        message_id: u16,
        requested_sop_class_uid: String,
        requested_sop_instance_uid: String,
        attribute_identifier_list: Vec<Tag>,
    },
    NGetRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        status: Status,
    },
    NSetRq {
        message_id: u16,
        requested_sop_class_uid: String,
        requested_sop_instance_uid: String,
    },
    NSetRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        status: Status,
    },
    NActionRq {
        message_id: u16,
        requested_sop_class_uid: String,
        requested_sop_instance_uid: String,
        action_type_id: u16,
    },
    NActionRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        action_type_id: u16,
        status: Status,
    },
    NCreateRq {
        message_id: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
    },
    NCreateRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        status: Status,
    },
    NDeleteRq {
        message_id: u16,
        requested_sop_class_uid: String,
        requested_sop_instance_uid: String,
    },
    NDeleteRsp {
        message_id_responded: u16,
        affected_sop_class_uid: String,
        affected_sop_instance_uid: String,
        status: Status,
    },
}

impl Message {
    /// The CommandField (0000,0100) value of this message.
    pub fn command_field(&self) -> u16 {
        match self {
            Message::CStoreRq { .. } => 0x0001,
            Message::CStoreRsp { .. } => 0x8001,
            Message::CGetRq { .. } => 0x0010,
            Message::CGetRsp { .. } => 0x8010,
            Message::CFindRq { .. } => 0x0020,
            Message::CFindRsp { .. } => 0x8020,
            Message::CMoveRq { .. } => 0x0021,
            Message::CMoveRsp { .. } => 0x8021,
            Message::CEchoRq { .. } => 0x0030,
            Message::CEchoRsp { .. } => 0x8030,
            Message::CCancelRq { .. } => 0x0FFF,
            Message::NEventReportRq { .. } => 0x0100,
            Message::NEventReportRsp { .. } => 0x8100,
            Message::NGetRq { .. } => 0x0110,
            Message::NGetRsp { .. } => 0x8110,
            Message::NSetRq { .. } => 0x0120,
            Message::NSetRsp { .. } => 0x8120,
            Message::NActionRq { .. } => 0x0130,
            Message::NActionRsp { .. } => 0x8130,
            Message::NCreateRq { .. } => 0x0140,
            Message::NCreateRsp { .. } => 0x8140,
            Message::NDeleteRq { .. } => 0x0150,
            Message::NDeleteRsp { .. } => 0x8150,
        }
    }

    /// The status carried by this message, for responses.
    pub fn status(&self) -> Option<Status> {
        match self {
            Message::CEchoRsp { status, .. }
            | Message::CStoreRsp { status, .. }
            | Message::CFindRsp { status, .. }
            | Message::CMoveRsp { status, .. }
            | Message::CGetRsp { status, .. }
            | Message::NEventReportRsp { status, .. }
            | Message::NGetRsp { status, .. }
            | Message::NSetRsp { status, .. }
            | Message::NActionRsp { status, .. }
            | Message::NCreateRsp { status, .. }
            | Message::NDeleteRsp { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn put_us(obj: &mut InMemObject, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

fn put_uid(obj: &mut InMemObject, tag: Tag, value: &str) {
    obj.put(DataElement::new(
        tag,
        VR::UI,
        PrimitiveValue::strs([value]),
    ));
}

fn put_ae(obj: &mut InMemObject, tag: Tag, value: &str) {
    obj.put(DataElement::new(
        tag,
        VR::AE,
        PrimitiveValue::strs([value]),
    ));
}

/// Serialize a message into the full group-0000 byte stream,
/// including the computed CommandGroupLength element.
pub fn write_message(message: &Message, data_set_present: bool) -> Result<Vec<u8>> {
    let mut obj = InMemObject::new();
    put_us(&mut obj, tags::COMMAND_FIELD, message.command_field());
    put_us(
        &mut obj,
        tags::COMMAND_DATA_SET_TYPE,
        if data_set_present {
            DATA_SET_FOLLOWS
        } else {
            NO_DATA_SET
        },
    );

    match message {
        Message::CEchoRq {
            message_id,
            affected_sop_class_uid,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
        }
        Message::CEchoRsp {
            message_id_responded,
            affected_sop_class_uid,
            status,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
        }
        Message::CStoreRq {
            message_id,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            priority,
            move_originator_ae_title,
            move_originator_message_id,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_us(&mut obj, tags::PRIORITY, priority.to_u16());
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
            if let Some(aet) = move_originator_ae_title {
                put_ae(&mut obj, tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE, aet);
            }
            if let Some(id) = move_originator_message_id {
                put_us(&mut obj, tags::MOVE_ORIGINATOR_MESSAGE_ID, *id);
            }
        }
        Message::CStoreRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            status,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
        }
        Message::CFindRq {
            message_id,
            affected_sop_class_uid,
            priority,
        }
        | Message::CGetRq {
            message_id,
            affected_sop_class_uid,
            priority,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_us(&mut obj, tags::PRIORITY, priority.to_u16());
        }
        Message::CFindRsp {
            message_id_responded,
            affected_sop_class_uid,
            status,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
        }
        Message::CMoveRq {
            message_id,
            affected_sop_class_uid,
            priority,
            move_destination,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_us(&mut obj, tags::PRIORITY, priority.to_u16());
            put_ae(&mut obj, tags::MOVE_DESTINATION, move_destination);
        }
        Message::CMoveRsp {
            message_id_responded,
            affected_sop_class_uid,
            status,
            counts,
        }
        | Message::CGetRsp {
            message_id_responded,
            affected_sop_class_uid,
            status,
            counts,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
            if let Some(v) = counts.remaining {
                put_us(&mut obj, tags::NUMBER_OF_REMAINING_SUBOPERATIONS, v);
            }
            if let Some(v) = counts.completed {
                put_us(&mut obj, tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, v);
            }
            if let Some(v) = counts.failed {
                put_us(&mut obj, tags::NUMBER_OF_FAILED_SUBOPERATIONS, v);
            }
            if let Some(v) = counts.warning {
                put_us(&mut obj, tags::NUMBER_OF_WARNING_SUBOPERATIONS, v);
            }
        }
        Message::CCancelRq {
            message_id_responded,
        } => {
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
        }
        Message::NEventReportRq {
            message_id,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            event_type_id,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
            put_us(&mut obj, tags::EVENT_TYPE_ID, *event_type_id);
        }
        Message::NEventReportRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            event_type_id,
            status,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
            put_us(&mut obj, tags::EVENT_TYPE_ID, *event_type_id);
        }
        Message::NGetRq {
            message_id,
            requested_sop_class_uid,
            requested_sop_instance_uid,
            attribute_identifier_list,
        } => {
            put_uid(&mut obj, tags::REQUESTED_SOP_CLASS_UID, requested_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_uid(
                &mut obj,
                tags::REQUESTED_SOP_INSTANCE_UID,
                requested_sop_instance_uid,
            );
            if !attribute_identifier_list.is_empty() {
                obj.put(DataElement::new(
                    tags::ATTRIBUTE_IDENTIFIER_LIST,
                    VR::AT,
                    PrimitiveValue::Tags(attribute_identifier_list.iter().copied().collect()),
                ));
            }
        }
        Message::NSetRq {
            message_id,
            requested_sop_class_uid,
            requested_sop_instance_uid,
        }
        | Message::NDeleteRq {
            message_id,
            requested_sop_class_uid,
            requested_sop_instance_uid,
        } => {
            put_uid(&mut obj, tags::REQUESTED_SOP_CLASS_UID, requested_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_uid(
                &mut obj,
                tags::REQUESTED_SOP_INSTANCE_UID,
                requested_sop_instance_uid,
            );
        }
        Message::NActionRq {
            message_id,
            requested_sop_class_uid,
            requested_sop_instance_uid,
            action_type_id,
        } => {
            put_uid(&mut obj, tags::REQUESTED_SOP_CLASS_UID, requested_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_uid(
                &mut obj,
                tags::REQUESTED_SOP_INSTANCE_UID,
                requested_sop_instance_uid,
            );
            put_us(&mut obj, tags::ACTION_TYPE_ID, *action_type_id);
        }
        Message::NActionRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            action_type_id,
            status,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
            put_us(&mut obj, tags::ACTION_TYPE_ID, *action_type_id);
        }
        Message::NCreateRq {
            message_id,
            affected_sop_class_uid,
            affected_sop_instance_uid,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(&mut obj, tags::MESSAGE_ID, *message_id);
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
        }
        Message::NGetRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            status,
        }
        | Message::NSetRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            status,
        }
        | Message::NCreateRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            status,
        }
        | Message::NDeleteRsp {
            message_id_responded,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            status,
        } => {
            put_uid(&mut obj, tags::AFFECTED_SOP_CLASS_UID, affected_sop_class_uid);
            put_us(
                &mut obj,
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                *message_id_responded,
            );
            put_us(&mut obj, tags::STATUS, status.0);
            put_uid(
                &mut obj,
                tags::AFFECTED_SOP_INSTANCE_UID,
                affected_sop_instance_uid,
            );
        }
    }

    // serialize the elements first so that the group length can be computed
    let mut elements = Vec::new();
    write_dataset(&obj, &mut elements, &IMPLICIT_VR_LITTLE_ENDIAN)
        .context(EncodeCommandSnafu)?;

    let mut group = InMemObject::new();
    group.put(DataElement::new(
        tags::COMMAND_GROUP_LENGTH,
        VR::UL,
        PrimitiveValue::from(elements.len() as u32),
    ));
    let mut out = Vec::with_capacity(elements.len() + 12);
    write_dataset(&group, &mut out, &IMPLICIT_VR_LITTLE_ENDIAN)
        .context(EncodeCommandSnafu)?;
    out.extend_from_slice(&elements);
    Ok(out)
}

/// Parse a group-0000 byte stream into a message,
/// also reporting whether a data set follows.
pub fn read_message(bytes: &[u8]) -> Result<(Message, bool)> {
    let mut cursor = bytes;
    let obj = read_dataset(&mut cursor, &IMPLICIT_VR_LITTLE_ENDIAN).context(DecodeCommandSnafu)?;

    let get_us = |tag: Tag| -> Result<u16> {
        obj.get(tag)
            .context(MissingCommandElementSnafu { tag })?
            .to_int()
            .ok()
            .context(MissingCommandElementSnafu { tag })
    };
    let get_us_opt = |tag: Tag| -> Option<u16> { obj.get(tag).and_then(|e| e.to_int().ok()) };
    let get_str = |tag: Tag| -> Result<String> {
        Ok(obj
            .get(tag)
            .context(MissingCommandElementSnafu { tag })?
            .to_str()
            .ok()
            .context(MissingCommandElementSnafu { tag })?
            .trim_end_matches(['\0', ' '])
            .to_string())
    };
    let get_str_opt = |tag: Tag| -> Option<String> {
        obj.get(tag)
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
    };

    let field = get_us(tags::COMMAND_FIELD)?;
    let data_set_present = get_us(tags::COMMAND_DATA_SET_TYPE)? != NO_DATA_SET;

    let counts = SubOperationCounts {
        remaining: get_us_opt(tags::NUMBER_OF_REMAINING_SUBOPERATIONS),
        completed: get_us_opt(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS),
        failed: get_us_opt(tags::NUMBER_OF_FAILED_SUBOPERATIONS),
        warning: get_us_opt(tags::NUMBER_OF_WARNING_SUBOPERATIONS),
    };

    let message = match field {
        0x0030 => Message::CEchoRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
        },
        0x8030 => Message::CEchoRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            status: Status(get_us(tags::STATUS)?),
        },
        0x0001 => Message::CStoreRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: get_str(tags::AFFECTED_SOP_INSTANCE_UID)?,
            priority: Priority::from_u16(get_us_opt(tags::PRIORITY).unwrap_or(0)),
            move_originator_ae_title: get_str_opt(
                tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE,
            ),
            move_originator_message_id: get_us_opt(tags::MOVE_ORIGINATOR_MESSAGE_ID),
        },
        0x8001 => Message::CStoreRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: get_str_opt(tags::AFFECTED_SOP_INSTANCE_UID)
                .unwrap_or_default(),
            status: Status(get_us(tags::STATUS)?),
        },
        0x0020 => Message::CFindRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            priority: Priority::from_u16(get_us_opt(tags::PRIORITY).unwrap_or(0)),
        },
        0x8020 => Message::CFindRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            status: Status(get_us(tags::STATUS)?),
        },
        0x0021 => Message::CMoveRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            priority: Priority::from_u16(get_us_opt(tags::PRIORITY).unwrap_or(0)),
            move_destination: get_str(tags::MOVE_DESTINATION)?,
        },
        0x8021 => Message::CMoveRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            status: Status(get_us(tags::STATUS)?),
            counts,
        },
        0x0010 => Message::CGetRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            priority: Priority::from_u16(get_us_opt(tags::PRIORITY).unwrap_or(0)),
        },
        0x8010 => Message::CGetRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            status: Status(get_us(tags::STATUS)?),
            counts,
        },
        0x0FFF => Message::CCancelRq {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
        },
        0x0100 => Message::NEventReportRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: get_str(tags::AFFECTED_SOP_INSTANCE_UID)?,
            event_type_id: get_us(tags::EVENT_TYPE_ID)?,
        },
        0x8100 => Message::NEventReportRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: get_str(tags::AFFECTED_SOP_INSTANCE_UID)?,
            event_type_id: get_us_opt(tags::EVENT_TYPE_ID).unwrap_or(0),
            status: Status(get_us(tags::STATUS)?),
        },
        0x0110 => Message::NGetRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            requested_sop_class_uid: get_str(tags::REQUESTED_SOP_CLASS_UID)?,
            requested_sop_instance_uid: get_str(tags::REQUESTED_SOP_INSTANCE_UID)?,
            attribute_identifier_list: obj
                .get(tags::ATTRIBUTE_IDENTIFIER_LIST)
                .and_then(|e| match e.value() {
                    radlink_core::value::Value::Primitive(PrimitiveValue::Tags(t)) => {
                        Some(t.iter().copied().collect())
                    }
                    _ => None,
                })
                .unwrap_or_default(),
        },
        0x0120 => Message::NSetRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            requested_sop_class_uid: get_str(tags::REQUESTED_SOP_CLASS_UID)?,
            requested_sop_instance_uid: get_str(tags::REQUESTED_SOP_INSTANCE_UID)?,
        },
        0x0130 => Message::NActionRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            requested_sop_class_uid: get_str(tags::REQUESTED_SOP_CLASS_UID)?,
            requested_sop_instance_uid: get_str(tags::REQUESTED_SOP_INSTANCE_UID)?,
            action_type_id: get_us(tags::ACTION_TYPE_ID)?,
        },
        0x8130 => Message::NActionRsp {
            message_id_responded: get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: get_str_opt(tags::AFFECTED_SOP_INSTANCE_UID)
                .unwrap_or_default(),
            action_type_id: get_us_opt(tags::ACTION_TYPE_ID).unwrap_or(0),
            status: Status(get_us(tags::STATUS)?),
        },
        0x0140 => Message::NCreateRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            affected_sop_class_uid: get_str(tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: get_str(tags::AFFECTED_SOP_INSTANCE_UID)?,
        },
        0x0150 => Message::NDeleteRq {
            message_id: get_us(tags::MESSAGE_ID)?,
            requested_sop_class_uid: get_str(tags::REQUESTED_SOP_CLASS_UID)?,
            requested_sop_instance_uid: get_str(tags::REQUESTED_SOP_INSTANCE_UID)?,
        },
        field @ (0x8110 | 0x8120 | 0x8140 | 0x8150) => {
            let message_id_responded = get_us(tags::MESSAGE_ID_BEING_RESPONDED_TO)?;
            let affected_sop_class_uid = get_str(tags::AFFECTED_SOP_CLASS_UID)?;
            let affected_sop_instance_uid =
                get_str_opt(tags::AFFECTED_SOP_INSTANCE_UID).unwrap_or_default();
            let status = Status(get_us(tags::STATUS)?);
            match field {
                0x8110 => Message::NGetRsp {
                    message_id_responded,
                    affected_sop_class_uid,
                    affected_sop_instance_uid,
                    status,
                },
                0x8120 => Message::NSetRsp {
                    message_id_responded,
                    affected_sop_class_uid,
                    affected_sop_instance_uid,
                    status,
                },
                0x8140 => Message::NCreateRsp {
                    message_id_responded,
                    affected_sop_class_uid,
                    affected_sop_instance_uid,
                    status,
                },
                _ => Message::NDeleteRsp {
                    message_id_responded,
                    affected_sop_class_uid,
                    affected_sop_instance_uid,
                    status,
                },
            }
        }
        field => return UnsupportedCommandFieldSnafu { field }.fail(),
    };
    Ok((message, data_set_present))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message, data_set_present: bool) {
        let bytes = write_message(&message, data_set_present).unwrap();
        let (parsed, has_data) = read_message(&bytes).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(has_data, data_set_present);
    }

    #[test]
    fn echo_round_trip() {
        round_trip(
            Message::CEchoRq {
                message_id: 1,
                affected_sop_class_uid: "1.2.840.10008.1.1".to_string(),
            },
            false,
        );
        round_trip(
            Message::CEchoRsp {
                message_id_responded: 1,
                affected_sop_class_uid: "1.2.840.10008.1.1".to_string(),
                status: Status::SUCCESS,
            },
            false,
        );
    }

    #[test]
    fn store_round_trip() {
        round_trip(
            Message::CStoreRq {
                message_id: 7,
                affected_sop_class_uid: "1.2.840.10008.5.1.4.1.1.7".to_string(),
                affected_sop_instance_uid: "1.2.3.4.5".to_string(),
                priority: Priority::Medium,
                move_originator_ae_title: None,
                move_originator_message_id: None,
            },
            true,
        );
    }

    #[test]
    fn move_response_round_trip() {
        round_trip(
            Message::CMoveRsp {
                message_id_responded: 3,
                affected_sop_class_uid: "1.2.840.10008.5.1.4.1.2.2.2".to_string(),
                status: Status::PENDING,
                counts: SubOperationCounts {
                    remaining: Some(4),
                    completed: Some(2),
                    failed: Some(0),
                    warning: Some(0),
                },
            },
            false,
        );
    }

    #[test]
    fn n_service_round_trips() {
        round_trip(
            Message::NCreateRq {
                message_id: 2,
                affected_sop_class_uid: "1.2.840.10008.5.1.4.34.6.1".to_string(),
                affected_sop_instance_uid: "1.2.3.9.1".to_string(),
            },
            true,
        );
        round_trip(
            Message::NActionRq {
                message_id: 3,
                requested_sop_class_uid: "1.2.840.10008.5.1.4.34.6.1".to_string(),
                requested_sop_instance_uid: "1.2.3.9.1".to_string(),
                action_type_id: 1,
            },
            true,
        );
        round_trip(
            Message::NGetRq {
                message_id: 4,
                requested_sop_class_uid: "1.2.840.10008.5.1.4.34.6.3".to_string(),
                requested_sop_instance_uid: "1.2.3.9.1".to_string(),
                attribute_identifier_list: vec![
                    radlink_core::tags::PROCEDURE_STEP_STATE,
                    radlink_core::tags::PROCEDURE_STEP_PROGRESS,
                ],
            },
            false,
        );
        round_trip(
            Message::NEventReportRsp {
                message_id_responded: 5,
                affected_sop_class_uid: "1.2.840.10008.5.1.4.34.6.4".to_string(),
                affected_sop_instance_uid: "1.2.3.9.1".to_string(),
                event_type_id: 1,
                status: Status::SUCCESS,
            },
            false,
        );
    }

    #[test]
    fn group_length_covers_the_remainder() {
        let bytes = write_message(
            &Message::CEchoRq {
                message_id: 1,
                affected_sop_class_uid: "1.2.840.10008.1.1".to_string(),
            },
            false,
        )
        .unwrap();
        // implicit VR: tag (4) + length (4) + UL value (4)
        let declared = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(declared as usize, bytes.len() - 12);
    }
}
