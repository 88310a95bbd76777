//! The service class provider side:
//! accept associations, route SOP classes to handlers,
//! answer C-ECHO, C-STORE and C-FIND requests.

use crate::command::{self, Message};
use crate::status::Status;
use radlink_core::uids;
use radlink_encoding::transfer_syntax::TransferSyntaxRegistry;
use radlink_object::{read::read_dataset, write::write_dataset, InMemObject};
use radlink_ul::association::{ServerAssociation, ServerAssociationOptions};
use radlink_ul::pdu::{PDataValue, PDataValueType, Pdu};
use snafu::{OptionExt, ResultExt, Snafu};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to negotiate the association
    Negotiate {
        #[snafu(backtrace)]
        source: radlink_ul::association::server::Error,
    },

    /// failed to exchange PDUs with the peer
    Association {
        #[snafu(backtrace)]
        source: radlink_ul::association::server::Error,
    },

    #[snafu(display("failed to decode a command or data set"))]
    DecodeMessage {
        #[snafu(backtrace)]
        source: command::Error,
    },

    #[snafu(display("failed to read request data set"))]
    ReadRequestData {
        #[snafu(backtrace)]
        source: radlink_object::read::Error,
    },

    #[snafu(display("failed to write response data set"))]
    WriteResponseData {
        #[snafu(backtrace)]
        source: radlink_object::write::Error,
    },

    #[snafu(display("failed to transfer data"))]
    TransferData {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("presentation context {} was not negotiated", id))]
    UnknownPresentationContext { id: u8, backtrace: snafu::Backtrace },

    #[snafu(display("could not bind listener"))]
    Bind {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The context of one incoming store request.
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// The AE title of the requesting node.
    pub calling_ae_title: String,
    /// The affected SOP class UID.
    pub sop_class_uid: String,
    /// The affected SOP instance UID.
    pub sop_instance_uid: String,
}

type StoreHandler = dyn Fn(&StoreContext, InMemObject) -> Status + Send + Sync;
type FindHandler = dyn Fn(&InMemObject) -> Vec<InMemObject> + Send + Sync;

/// A builder for a DIMSE service class provider.
///
/// The verification service is always offered;
/// storage and query services are routed to the registered handlers
/// by the SOP classes they were registered under.
pub struct ScpBuilder {
    ae_title: String,
    max_pdu_length: u32,
    strict: bool,
    storage_classes: Vec<String>,
    query_classes: Vec<String>,
    store_handler: Option<Arc<StoreHandler>>,
    find_handler: Option<Arc<FindHandler>>,
}

impl ScpBuilder {
    /// Start building a provider with the given AE title.
    pub fn new(ae_title: impl Into<String>) -> Self {
        ScpBuilder {
            ae_title: ae_title.into(),
            max_pdu_length: radlink_ul::DEFAULT_MAX_PDU,
            strict: true,
            storage_classes: Vec::new(),
            query_classes: Vec::new(),
            store_handler: None,
            find_handler: None,
        }
    }

    /// Override the maximum PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Tolerate PDUs over the negotiated maximum.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Accept C-STORE requests for the given SOP class.
    pub fn with_storage_class(mut self, sop_class_uid: impl Into<String>) -> Self {
        self.storage_classes.push(sop_class_uid.into());
        self
    }

    /// Accept C-FIND requests for the given information model.
    pub fn with_query_class(mut self, sop_class_uid: impl Into<String>) -> Self {
        self.query_classes.push(sop_class_uid.into());
        self
    }

    /// Define the handler invoked for every received object.
    pub fn on_store<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StoreContext, InMemObject) -> Status + Send + Sync + 'static,
    {
        self.store_handler = Some(Arc::new(handler));
        self
    }

    /// Define the handler which produces the matches of a query.
    pub fn on_find<F>(mut self, handler: F) -> Self
    where
        F: Fn(&InMemObject) -> Vec<InMemObject> + Send + Sync + 'static,
    {
        self.find_handler = Some(Arc::new(handler));
        self
    }

    /// Finish building the provider.
    pub fn build(self) -> Scp {
        Scp {
            inner: Arc::new(self),
        }
    }
}

/// A DIMSE service class provider.
#[derive(Clone)]
pub struct Scp {
    inner: Arc<ScpBuilder>,
}

impl Scp {
    /// Listen for associations on the given address,
    /// spawning one thread per incoming connection.
    ///
    /// This call does not return unless the listener breaks.
    pub fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).context(BindSnafu)?;
        info!("{} listening on {}", self.inner.ae_title, addr);
        loop {
            let (stream, peer) = match listener.accept() {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("failed to accept connection: {}", e);
                    continue;
                }
            };
            debug!("incoming connection from {}", peer);
            let scp = self.clone();
            thread::spawn(move || {
                if let Err(e) = scp.handle(stream) {
                    warn!("association ended with error: {}", e);
                }
            });
        }
    }

    /// Service a single association over an accepted TCP stream.
    pub fn handle(&self, stream: TcpStream) -> Result<()> {
        let mut options = ServerAssociationOptions::new()
            .ae_title(self.inner.ae_title.clone())
            .accept_any()
            .max_pdu_length(self.inner.max_pdu_length)
            .strict(self.inner.strict)
            .with_abstract_syntax(uids::VERIFICATION);
        for uid in &self.inner.storage_classes {
            options = options.with_abstract_syntax(uid.clone());
        }
        for uid in &self.inner.query_classes {
            options = options.with_abstract_syntax(uid.clone());
        }

        let mut association = options.establish(stream).context(NegotiateSnafu)?;
        let calling_ae_title = association.client_ae_title().to_string();
        debug!("association established with {}", calling_ae_title);

        let mut command_buffer: Vec<u8> = Vec::new();
        let mut data_buffer: Vec<u8> = Vec::new();
        let mut pending: Option<(u8, Message)> = None;

        loop {
            let pdu = match association.receive() {
                Ok(pdu) => pdu,
                Err(radlink_ul::association::server::Error::Aborted { .. }) => break,
                Err(radlink_ul::association::server::Error::Receive { ref source, .. })
                    if matches!(
                        source,
                        radlink_ul::pdu::reader::Error::NoPduAvailable { .. }
                    ) =>
                {
                    break
                }
                Err(e) => return Err(e).context(AssociationSnafu),
            };

            match pdu {
                Pdu::PData { data } => {
                    for pdv in data {
                        let pc_id = pdv.presentation_context_id;
                        match pdv.value_type {
                            PDataValueType::Command => {
                                command_buffer.extend(pdv.data);
                                if pdv.is_last {
                                    let (message, data_set_present) =
                                        command::read_message(&command_buffer)
                                            .context(DecodeMessageSnafu)?;
                                    command_buffer.clear();
                                    if data_set_present {
                                        // hold the command until its data set arrives
                                        pending = Some((pc_id, message));
                                    } else {
                                        self.dispatch(
                                            &mut association,
                                            &calling_ae_title,
                                            pc_id,
                                            message,
                                            None,
                                        )?;
                                    }
                                }
                            }
                            PDataValueType::Data => {
                                data_buffer.extend(pdv.data);
                                if pdv.is_last {
                                    let (pc_id, message) = match pending.take() {
                                        Some(p) => p,
                                        None => {
                                            warn!("data set without a pending command, dropped");
                                            data_buffer.clear();
                                            continue;
                                        }
                                    };
                                    let dataset =
                                        self.decode_dataset(&association, pc_id, &data_buffer)?;
                                    data_buffer.clear();
                                    self.dispatch(
                                        &mut association,
                                        &calling_ae_title,
                                        pc_id,
                                        message,
                                        Some(dataset),
                                    )?;
                                }
                            }
                        }
                    }
                }
                Pdu::ReleaseRQ => {
                    association.send(&Pdu::ReleaseRP).context(AssociationSnafu)?;
                    debug!("association with {} released", calling_ae_title);
                    break;
                }
                pdu => {
                    warn!("unexpected {}", pdu.short_description());
                    let _ = association.abort();
                    break;
                }
            }
        }
        Ok(())
    }

    fn decode_dataset(
        &self,
        association: &ServerAssociation,
        pc_id: u8,
        bytes: &[u8],
    ) -> Result<InMemObject> {
        let ts_uid = association
            .presentation_contexts()
            .iter()
            .find(|pc| pc.id == pc_id)
            .map(|pc| pc.transfer_syntax.clone())
            .context(UnknownPresentationContextSnafu { id: pc_id })?;
        let ts = TransferSyntaxRegistry::get(&ts_uid)
            .context(UnknownPresentationContextSnafu { id: pc_id })?;
        read_dataset(&mut &bytes[..], ts).context(ReadRequestDataSnafu)
    }

    fn send_command(
        &self,
        association: &mut ServerAssociation,
        pc_id: u8,
        message: &Message,
        data_set_present: bool,
    ) -> Result<()> {
        let bytes =
            command::write_message(message, data_set_present).context(DecodeMessageSnafu)?;
        association
            .send(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: bytes,
                }],
            })
            .context(AssociationSnafu)
    }

    /// Route one complete message to its service.
    fn dispatch(
        &self,
        association: &mut ServerAssociation,
        calling_ae_title: &str,
        pc_id: u8,
        message: Message,
        dataset: Option<InMemObject>,
    ) -> Result<()> {
        match message {
            Message::CEchoRq {
                message_id,
                affected_sop_class_uid,
            } => self.send_command(
                association,
                pc_id,
                &Message::CEchoRsp {
                    message_id_responded: message_id,
                    affected_sop_class_uid,
                    status: Status::SUCCESS,
                },
                false,
            ),
            Message::CStoreRq {
                message_id,
                affected_sop_class_uid,
                affected_sop_instance_uid,
                ..
            } => {
                let context = StoreContext {
                    calling_ae_title: calling_ae_title.to_string(),
                    sop_class_uid: affected_sop_class_uid.clone(),
                    sop_instance_uid: affected_sop_instance_uid.clone(),
                };
                let status = match (&self.inner.store_handler, dataset) {
                    (Some(handler), Some(object)) => handler(&context, object),
                    (None, _) => Status::SOP_CLASS_NOT_SUPPORTED,
                    (_, None) => Status::CANNOT_UNDERSTAND,
                };
                self.send_command(
                    association,
                    pc_id,
                    &Message::CStoreRsp {
                        message_id_responded: message_id,
                        affected_sop_class_uid,
                        affected_sop_instance_uid,
                        status,
                    },
                    false,
                )
            }
            Message::CFindRq {
                message_id,
                affected_sop_class_uid,
                ..
            } => {
                let matches = match (&self.inner.find_handler, &dataset) {
                    (Some(handler), Some(query)) => handler(query),
                    _ => Vec::new(),
                };
                let ts_uid = association
                    .presentation_contexts()
                    .iter()
                    .find(|pc| pc.id == pc_id)
                    .map(|pc| pc.transfer_syntax.clone())
                    .context(UnknownPresentationContextSnafu { id: pc_id })?;
                let ts = TransferSyntaxRegistry::get(&ts_uid)
                    .context(UnknownPresentationContextSnafu { id: pc_id })?;

                for identifier in matches {
                    self.send_command(
                        association,
                        pc_id,
                        &Message::CFindRsp {
                            message_id_responded: message_id,
                            affected_sop_class_uid: affected_sop_class_uid.clone(),
                            status: Status::PENDING,
                        },
                        true,
                    )?;
                    let mut writer = association.send_pdata(pc_id);
                    write_dataset(&identifier, &mut writer, ts)
                        .context(WriteResponseDataSnafu)?;
                    writer.finish().context(TransferDataSnafu)?;
                }
                self.send_command(
                    association,
                    pc_id,
                    &Message::CFindRsp {
                        message_id_responded: message_id,
                        affected_sop_class_uid,
                        status: Status::SUCCESS,
                    },
                    false,
                )
            }
            Message::CCancelRq { .. } => {
                // nothing in flight to stop: matching runs to completion
                // within one dispatch call
                Ok(())
            }
            message => {
                warn!("unsupported command {:#06X}", message.command_field());
                if let Some(response) = respond_unsupported(&message) {
                    self.send_command(association, pc_id, &response, false)?;
                }
                Ok(())
            }
        }
    }
}

/// Build the failure response for a request this provider does not serve.
fn respond_unsupported(message: &Message) -> Option<Message> {
    match message {
        Message::CMoveRq {
            message_id,
            affected_sop_class_uid,
            ..
        } => Some(Message::CMoveRsp {
            message_id_responded: *message_id,
            affected_sop_class_uid: affected_sop_class_uid.clone(),
            status: Status::SOP_CLASS_NOT_SUPPORTED,
            counts: Default::default(),
        }),
        Message::CGetRq {
            message_id,
            affected_sop_class_uid,
            ..
        } => Some(Message::CGetRsp {
            message_id_responded: *message_id,
            affected_sop_class_uid: affected_sop_class_uid.clone(),
            status: Status::SOP_CLASS_NOT_SUPPORTED,
            counts: Default::default(),
        }),
        _ => None,
    }
}
