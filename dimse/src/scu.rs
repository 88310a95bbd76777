//! DIMSE services from the service class user perspective,
//! running over an established client association.
//!
//! C-FIND, C-MOVE and C-GET are exposed as lazy iterators of
//! pending and final responses, yielded in the order they arrive
//! from the provider.

use crate::command::{self, Message, Priority, SubOperationCounts};
use crate::status::{Status, StatusKind};
use crate::CancellationToken;
use radlink_core::tags;
use radlink_core::uids;
use radlink_encoding::transfer_syntax::{TransferSyntax, TransferSyntaxRegistry};
use radlink_object::{read::read_dataset, write::write_dataset, InMemObject};
use radlink_ul::association::ClientAssociation;
use radlink_ul::pdu::{PDataValue, PDataValueType, Pdu};
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::io::Read;
use std::time::{Duration, Instant};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("no presentation context accepted for {}", abstract_syntax))]
    NoPresentationContext {
        abstract_syntax: String,
        backtrace: Backtrace,
    },

    #[snafu(display("transfer syntax {} was negotiated but is not supported", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },

    /// failed to exchange PDUs with the peer
    Association {
        #[snafu(backtrace)]
        source: radlink_ul::association::client::Error,
    },

    #[snafu(display("failed to encode or decode a command set"))]
    EncodeMessage {
        #[snafu(backtrace)]
        source: command::Error,
    },

    #[snafu(display("failed to read response data set"))]
    ReadResponseData {
        #[snafu(backtrace)]
        source: radlink_object::read::Error,
    },

    #[snafu(display("failed to write data set"))]
    WriteData {
        #[snafu(backtrace)]
        source: radlink_object::write::Error,
    },

    #[snafu(display("failed to read response data"))]
    ReceiveData {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to send data"))]
    SendData {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("unexpected message {:?} in response", message))]
    UnexpectedMessage {
        message: Box<Message>,
        backtrace: Backtrace,
    },

    #[snafu(display("unexpected PDU `{}` in response", pdu.short_description()))]
    UnexpectedPdu {
        pdu: Box<Pdu>,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The outcome of a successful C-ECHO exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoOutcome {
    /// The status reported by the provider.
    pub status: Status,
    /// The measured request/response round trip.
    pub round_trip: Duration,
}

/// Send one command set over the given presentation context.
fn send_command(
    association: &mut ClientAssociation,
    presentation_context_id: u8,
    message: &Message,
    data_set_present: bool,
) -> Result<()> {
    let bytes = command::write_message(message, data_set_present).context(EncodeMessageSnafu)?;
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: bytes,
            }],
        })
        .context(AssociationSnafu)
}

/// Receive one command set, reassembling its fragments if needed.
/// Any data set PDVs carried in the same PDU are returned as well.
fn receive_command(association: &mut ClientAssociation) -> Result<(Message, bool, Vec<u8>)> {
    let mut command_bytes = Vec::new();
    loop {
        let pdu = association.receive().context(AssociationSnafu)?;
        match pdu {
            Pdu::PData { data } => {
                let mut trailing_data = Vec::new();
                let mut last = false;
                for pdv in data {
                    match pdv.value_type {
                        PDataValueType::Command => {
                            command_bytes.extend(pdv.data);
                            last = pdv.is_last;
                        }
                        PDataValueType::Data => {
                            // some providers pack the response data set
                            // into the same PDU as the command
                            trailing_data.extend(pdv.data);
                        }
                    }
                }
                if last {
                    let (message, data_set_present) =
                        command::read_message(&command_bytes).context(EncodeMessageSnafu)?;
                    return Ok((message, data_set_present, trailing_data));
                }
            }
            pdu => return UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail(),
        }
    }
}

/// Read the data set which follows a command,
/// unless it was already delivered alongside it.
fn receive_dataset(
    association: &mut ClientAssociation,
    ts: &TransferSyntax,
    inline: Vec<u8>,
) -> Result<InMemObject> {
    let bytes = if inline.is_empty() {
        let mut data = Vec::new();
        association
            .receive_pdata()
            .read_to_end(&mut data)
            .context(ReceiveDataSnafu)?;
        data
    } else {
        inline
    };
    read_dataset(&mut &bytes[..], ts).context(ReadResponseDataSnafu)
}

fn context_for(
    association: &ClientAssociation,
    abstract_syntax: &str,
) -> Result<(u8, &'static TransferSyntax)> {
    let pc = association
        .presentation_context_for(abstract_syntax)
        .context(NoPresentationContextSnafu { abstract_syntax })?;
    let ts = TransferSyntaxRegistry::get(&pc.transfer_syntax).context(
        UnsupportedTransferSyntaxSnafu {
            uid: pc.transfer_syntax.clone(),
        },
    )?;
    Ok((pc.id, ts))
}

/// Perform a C-ECHO (verification) exchange.
pub fn echo(association: &mut ClientAssociation, message_id: u16) -> Result<EchoOutcome> {
    let (pc_id, _) = context_for(association, uids::VERIFICATION)?;
    let started = Instant::now();
    send_command(
        association,
        pc_id,
        &Message::CEchoRq {
            message_id,
            affected_sop_class_uid: uids::VERIFICATION.to_string(),
        },
        false,
    )?;

    let (message, _, _) = receive_command(association)?;
    match message {
        Message::CEchoRsp { status, .. } => Ok(EchoOutcome {
            status,
            round_trip: started.elapsed(),
        }),
        message => UnexpectedMessageSnafu {
            message: Box::new(message),
        }
        .fail(),
    }
}

/// Store one object on the peer through C-STORE.
///
/// The object must carry SOPClassUID and SOPInstanceUID;
/// the presentation context is chosen by its SOP class.
pub fn store(
    association: &mut ClientAssociation,
    object: &InMemObject,
    message_id: u16,
    priority: Priority,
) -> Result<Status> {
    let sop_class_uid = object
        .get(tags::SOP_CLASS_UID)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
        .unwrap_or_default();
    let sop_instance_uid = object
        .get(tags::SOP_INSTANCE_UID)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
        .unwrap_or_default();

    let (pc_id, ts) = context_for(association, &sop_class_uid)?;

    send_command(
        association,
        pc_id,
        &Message::CStoreRq {
            message_id,
            affected_sop_class_uid: sop_class_uid,
            affected_sop_instance_uid: sop_instance_uid,
            priority,
            move_originator_ae_title: None,
            move_originator_message_id: None,
        },
        true,
    )?;

    {
        let mut writer = association.send_pdata(pc_id);
        write_dataset(object, &mut writer, ts).context(WriteDataSnafu)?;
        writer.finish().context(SendDataSnafu)?;
    }

    let (message, _, _) = receive_command(association)?;
    match message {
        Message::CStoreRsp { status, .. } => Ok(status),
        message => UnexpectedMessageSnafu {
            message: Box::new(message),
        }
        .fail(),
    }
}

/// A single C-FIND response.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResponse {
    /// A match, with its identifier data set.
    Pending {
        status: Status,
        identifier: InMemObject,
    },
    /// The terminating response.
    Final { status: Status },
}

/// Start a C-FIND operation,
/// returning a lazy iterator over the responses.
pub fn find<'a>(
    association: &'a mut ClientAssociation,
    abstract_syntax: &str,
    query: &InMemObject,
    message_id: u16,
    cancellation: CancellationToken,
) -> Result<FindIterator<'a>> {
    let (pc_id, ts) = context_for(association, abstract_syntax)?;

    send_command(
        association,
        pc_id,
        &Message::CFindRq {
            message_id,
            affected_sop_class_uid: abstract_syntax.to_string(),
            priority: Priority::Medium,
        },
        true,
    )?;
    {
        let mut writer = association.send_pdata(pc_id);
        write_dataset(query, &mut writer, ts).context(WriteDataSnafu)?;
        writer.finish().context(SendDataSnafu)?;
    }

    Ok(FindIterator {
        association,
        ts,
        pc_id,
        message_id,
        cancellation,
        cancel_sent: false,
        done: false,
    })
}

/// A lazy sequence of C-FIND responses,
/// yielded in the order received from the provider.
pub struct FindIterator<'a> {
    association: &'a mut ClientAssociation,
    ts: &'static TransferSyntax,
    pc_id: u8,
    message_id: u16,
    cancellation: CancellationToken,
    cancel_sent: bool,
    done: bool,
}

impl Iterator for FindIterator<'_> {
    type Item = Result<FindResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.cancellation.is_cancelled() && !self.cancel_sent {
            self.cancel_sent = true;
            if let Err(e) = send_command(
                self.association,
                self.pc_id,
                &Message::CCancelRq {
                    message_id_responded: self.message_id,
                },
                false,
            ) {
                self.done = true;
                return Some(Err(e));
            }
        }

        let step = (|| {
            let (message, data_set_present, inline) = receive_command(self.association)?;
            match message {
                Message::CFindRsp { status, .. } => match status.kind() {
                    StatusKind::Pending => {
                        let identifier =
                            receive_dataset(self.association, self.ts, inline)?;
                        Ok(FindResponse::Pending { status, identifier })
                    }
                    _ => {
                        if data_set_present {
                            // drain a data set we do not care about
                            let _ = receive_dataset(self.association, self.ts, inline)?;
                        }
                        Ok(FindResponse::Final { status })
                    }
                },
                message => UnexpectedMessageSnafu {
                    message: Box::new(message),
                }
                .fail(),
            }
        })();

        match step {
            Ok(FindResponse::Final { status }) => {
                self.done = true;
                Some(Ok(FindResponse::Final { status }))
            }
            Ok(response) => Some(Ok(response)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// A single C-MOVE or C-GET progress response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressResponse {
    pub status: Status,
    pub counts: SubOperationCounts,
}

/// Start a C-MOVE operation towards the given destination AE,
/// returning a lazy iterator over the progress responses.
pub fn move_to<'a>(
    association: &'a mut ClientAssociation,
    abstract_syntax: &str,
    destination: &str,
    query: &InMemObject,
    message_id: u16,
    cancellation: CancellationToken,
) -> Result<MoveIterator<'a>> {
    let (pc_id, ts) = context_for(association, abstract_syntax)?;

    send_command(
        association,
        pc_id,
        &Message::CMoveRq {
            message_id,
            affected_sop_class_uid: abstract_syntax.to_string(),
            priority: Priority::Medium,
            move_destination: destination.to_string(),
        },
        true,
    )?;
    {
        let mut writer = association.send_pdata(pc_id);
        write_dataset(query, &mut writer, ts).context(WriteDataSnafu)?;
        writer.finish().context(SendDataSnafu)?;
    }

    Ok(MoveIterator {
        association,
        ts,
        pc_id,
        message_id,
        cancellation,
        cancel_sent: false,
        done: false,
    })
}

/// A lazy sequence of C-MOVE progress responses.
pub struct MoveIterator<'a> {
    association: &'a mut ClientAssociation,
    ts: &'static TransferSyntax,
    pc_id: u8,
    message_id: u16,
    cancellation: CancellationToken,
    cancel_sent: bool,
    done: bool,
}

impl Iterator for MoveIterator<'_> {
    type Item = Result<ProgressResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.cancellation.is_cancelled() && !self.cancel_sent {
            self.cancel_sent = true;
            if let Err(e) = send_command(
                self.association,
                self.pc_id,
                &Message::CCancelRq {
                    message_id_responded: self.message_id,
                },
                false,
            ) {
                self.done = true;
                return Some(Err(e));
            }
        }

        let step = (|| {
            let (message, data_set_present, inline) = receive_command(self.association)?;
            match message {
                Message::CMoveRsp { status, counts, .. } => {
                    if data_set_present {
                        let _ = receive_dataset(self.association, self.ts, inline)?;
                    }
                    Ok(ProgressResponse { status, counts })
                }
                message => UnexpectedMessageSnafu {
                    message: Box::new(message),
                }
                .fail(),
            }
        })();

        match step {
            Ok(response) => {
                if response.status.is_final() {
                    self.done = true;
                }
                Some(Ok(response))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Start a C-GET operation.
///
/// Matching instances are delivered on the *same* association
/// through C-STORE sub-operations in the reverse direction;
/// each stored object is handed to `on_store`, whose status
/// is reported back to the provider.
pub fn get<'a, F>(
    association: &'a mut ClientAssociation,
    abstract_syntax: &str,
    query: &InMemObject,
    message_id: u16,
    cancellation: CancellationToken,
    on_store: F,
) -> Result<GetIterator<'a, F>>
where
    F: FnMut(InMemObject) -> Status,
{
    let (pc_id, ts) = context_for(association, abstract_syntax)?;

    send_command(
        association,
        pc_id,
        &Message::CGetRq {
            message_id,
            affected_sop_class_uid: abstract_syntax.to_string(),
            priority: Priority::Medium,
        },
        true,
    )?;
    {
        let mut writer = association.send_pdata(pc_id);
        write_dataset(query, &mut writer, ts).context(WriteDataSnafu)?;
        writer.finish().context(SendDataSnafu)?;
    }

    Ok(GetIterator {
        association,
        ts,
        pc_id,
        message_id,
        cancellation,
        cancel_sent: false,
        done: false,
        on_store,
    })
}

/// A lazy sequence of C-GET progress responses.
/// Incoming C-STORE sub-operations are serviced between
/// progress responses, transparently to the caller.
pub struct GetIterator<'a, F> {
    association: &'a mut ClientAssociation,
    ts: &'static TransferSyntax,
    pc_id: u8,
    message_id: u16,
    cancellation: CancellationToken,
    cancel_sent: bool,
    done: bool,
    on_store: F,
}

impl<F> Iterator for GetIterator<'_, F>
where
    F: FnMut(InMemObject) -> Status,
{
    type Item = Result<ProgressResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.cancellation.is_cancelled() && !self.cancel_sent {
                self.cancel_sent = true;
                if let Err(e) = send_command(
                    self.association,
                    self.pc_id,
                    &Message::CCancelRq {
                        message_id_responded: self.message_id,
                    },
                    false,
                ) {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            let step = (|| {
                let (message, data_set_present, inline) = receive_command(self.association)?;
                match message {
                    Message::CGetRsp { status, counts, .. } => {
                        if data_set_present {
                            let _ = receive_dataset(self.association, self.ts, inline)?;
                        }
                        Ok(Some(ProgressResponse { status, counts }))
                    }
                    // a reverse-role store sub-operation
                    Message::CStoreRq {
                        message_id,
                        affected_sop_class_uid,
                        affected_sop_instance_uid,
                        ..
                    } => {
                        let object = receive_dataset(self.association, self.ts, inline)?;
                        let status = (self.on_store)(object);
                        send_command(
                            self.association,
                            self.pc_id,
                            &Message::CStoreRsp {
                                message_id_responded: message_id,
                                affected_sop_class_uid,
                                affected_sop_instance_uid,
                                status,
                            },
                            false,
                        )?;
                        Ok(None)
                    }
                    message => UnexpectedMessageSnafu {
                        message: Box::new(message),
                    }
                    .fail(),
                }
            })();

            match step {
                Ok(Some(response)) => {
                    if response.status.is_final() {
                        self.done = true;
                    }
                    return Some(Ok(response));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
