//! Association acceptor module

use std::borrow::Cow;
use std::net::TcpStream;
use std::time::Duration;

use crate::association::pdata::{PDataReader, PDataWriter};
use crate::machine::{self, Event, State};
use crate::pdu::reader::read_pdu;
use crate::pdu::writer::write_pdu;
use crate::pdu::{
    AbortRQSource, AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource,
    Pdu, PresentationContextResult, PresentationContextResultReason, UserVariableItem,
};
use radlink_core::uids;
use snafu::{Backtrace, ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// failed to receive association request
    ReceiveRequest {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },

    /// failed to send association response
    SendResponse {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },

    #[snafu(display("unexpected request `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnexpectedRequest {
        /// the PDU obtained from the peer
        pdu: Box<Pdu>,
        backtrace: Backtrace,
    },

    #[snafu(display("association rejected: {}", reason))]
    RejectedAssociation {
        reason: &'static str,
        backtrace: Backtrace,
    },

    /// the association was aborted by the peer
    Aborted { backtrace: Backtrace },

    /// could not configure the socket
    Configure {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("PDU is not legal in association state {}", state))]
    IllegalPdu {
        state: State,
        source: machine::UnexpectedEventError,
        backtrace: Backtrace,
    },

    /// failed to send PDU message
    #[non_exhaustive]
    Send {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },

    /// failed to receive PDU message
    #[non_exhaustive]
    Receive {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A DICOM association builder for an acceptor node.
/// The final outcome is a [`ServerAssociation`].
///
/// # Example
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use radlink_ul::association::server::ServerAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let listener = TcpListener::bind("0.0.0.0:11112")?;
/// let (stream, _addr) = listener.accept()?;
/// let mut association = ServerAssociationOptions::new()
///     .ae_title("TEAMPACS")
///     .accept_any()
///     .with_abstract_syntax("1.2.840.10008.1.1")
///     .establish(stream)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ServerAssociationOptions {
    /// the AE title of this node
    ae_title: Cow<'static, str>,
    /// whether to accept any called AE title
    accept_any_called: bool,
    /// the accepted abstract syntaxes; empty accepts all
    abstract_syntaxes: Vec<String>,
    /// the transfer syntaxes this node can decode
    transfer_syntaxes: Vec<String>,
    /// the maximum PDU length that this node can receive
    max_pdu_length: u32,
    /// whether to receive PDUs strictly within the negotiated maximum
    strict: bool,
    /// timeout applied to PDU reads (the ARTIM timer)
    timeout_read: Option<Duration>,
}

impl Default for ServerAssociationOptions {
    fn default() -> Self {
        ServerAssociationOptions {
            ae_title: "THIS-SCP".into(),
            accept_any_called: false,
            abstract_syntaxes: Vec::new(),
            transfer_syntaxes: vec![
                uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
            ],
            max_pdu_length: crate::DEFAULT_MAX_PDU,
            strict: true,
            timeout_read: Some(Duration::from_secs(30)),
        }
    }
}

impl ServerAssociationOptions {
    /// Create a new set of options for accepting an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the application entity title of this node.
    /// Requests to any other called AE title are rejected,
    /// unless [`accept_any`](Self::accept_any) is set.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Accept requests regardless of the called AE title.
    pub fn accept_any(mut self) -> Self {
        self.accept_any_called = true;
        self
    }

    /// Accept presentation contexts with this abstract syntax.
    /// When no abstract syntax is configured, all are accepted.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<String>,
    {
        self.abstract_syntaxes.push(abstract_syntax_uid.into());
        self
    }

    /// Add a transfer syntax which this node is able to decode.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<String>,
    {
        let uid = transfer_syntax_uid.into();
        if !self.transfer_syntaxes.contains(&uid) {
            self.transfer_syntaxes.push(uid);
        }
        self
    }

    /// Override the maximum PDU length that this node can receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Whether to reject PDUs which exceed the negotiated maximum.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override the ARTIM timeout applied to PDU reads.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_read = Some(timeout);
        self
    }

    /// Negotiate an association over the given TCP stream.
    pub fn establish(self, mut socket: TcpStream) -> Result<ServerAssociation> {
        socket
            .set_read_timeout(self.timeout_read)
            .context(ConfigureSnafu)?;

        let mut state = State::Idle;
        let pdu = read_pdu(&mut socket, crate::MAXIMUM_PDU_SIZE, false)
            .context(ReceiveRequestSnafu)?;

        match pdu {
            Pdu::AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            } => {
                state = transition_or_bug(state, Event::ReceivedAssociateRq);

                if !self.accept_any_called && called_ae_title != self.ae_title {
                    let response = Pdu::AssociationRJ {
                        result: AssociationRJResult::Permanent,
                        source: AssociationRJSource::ServiceUser(
                            AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                        ),
                    };
                    write_pdu(&mut socket, &response).context(SendResponseSnafu)?;
                    let _ = machine::transition(state, Event::SentAssociateRj);
                    let _ = socket.shutdown(std::net::Shutdown::Both);
                    return RejectedAssociationSnafu {
                        reason: "called AE title not recognized",
                    }
                    .fail();
                }

                // decide the outcome of every proposed context:
                // the first transfer syntax we can decode wins
                let presentation_context_results: Vec<PresentationContextResult> =
                    presentation_contexts
                        .iter()
                        .map(|pc| {
                            if !self.abstract_syntaxes.is_empty()
                                && !self.abstract_syntaxes.contains(&pc.abstract_syntax)
                            {
                                return PresentationContextResult {
                                    id: pc.id,
                                    reason:
                                        PresentationContextResultReason::AbstractSyntaxNotSupported,
                                    transfer_syntax: uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
                                };
                            }
                            match pc
                                .transfer_syntaxes
                                .iter()
                                .find(|ts| self.transfer_syntaxes.contains(*ts))
                            {
                                Some(ts) => PresentationContextResult {
                                    id: pc.id,
                                    reason: PresentationContextResultReason::Acceptance,
                                    transfer_syntax: ts.clone(),
                                },
                                None => PresentationContextResult {
                                    id: pc.id,
                                    reason:
                                        PresentationContextResultReason::TransferSyntaxesNotSupported,
                                    transfer_syntax: uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
                                },
                            }
                        })
                        .collect();

                let requestor_max_pdu = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(crate::DEFAULT_MAX_PDU);

                let response = Pdu::AssociationAC {
                    protocol_version,
                    calling_ae_title: calling_ae_title.clone(),
                    called_ae_title,
                    application_context_name,
                    presentation_contexts: presentation_context_results.clone(),
                    user_variables: vec![
                        UserVariableItem::MaxLength(self.max_pdu_length),
                        UserVariableItem::ImplementationClassUid(
                            crate::association::IMPLEMENTATION_CLASS_UID.to_string(),
                        ),
                        UserVariableItem::ImplementationVersionName(
                            crate::association::IMPLEMENTATION_VERSION_NAME.to_string(),
                        ),
                    ],
                };
                write_pdu(&mut socket, &response).context(SendResponseSnafu)?;
                state = transition_or_bug(state, Event::SentAssociateAc);

                Ok(ServerAssociation {
                    presentation_contexts: presentation_context_results,
                    client_ae_title: calling_ae_title,
                    receive_max_pdu: self.max_pdu_length,
                    send_max_pdu: self.max_pdu_length.min(requestor_max_pdu),
                    strict: self.strict,
                    socket,
                    state,
                })
            }
            Pdu::AbortRQ { .. } => AbortedSnafu.fail(),
            pdu => {
                let _ = write_pdu(
                    &mut socket,
                    &Pdu::AbortRQ {
                        source: AbortRQSource::ServiceUser,
                    },
                );
                let _ = socket.shutdown(std::net::Shutdown::Both);
                UnexpectedRequestSnafu { pdu: Box::new(pdu) }.fail()
            }
        }
    }
}

fn transition_or_bug(state: State, event: Event) -> State {
    match machine::transition(state, event) {
        Ok(next) => next,
        Err(e) => {
            debug_assert!(false, "{}", e);
            state
        }
    }
}

/// A DICOM upper level association from the perspective
/// of the association acceptor.
#[derive(Debug)]
pub struct ServerAssociation {
    /// The outcome of every proposed presentation context
    presentation_contexts: Vec<PresentationContextResult>,
    /// The AE title of the requesting node
    client_ae_title: String,
    /// The maximum PDU length that this node may receive
    receive_max_pdu: u32,
    /// The maximum PDU length that the peer may receive
    send_max_pdu: u32,
    /// Whether to reject PDUs over the negotiated maximum
    strict: bool,
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// The current state of the association
    state: State,
}

impl ServerAssociation {
    /// Retrieve the outcomes of the proposed presentation contexts.
    pub fn presentation_contexts(&self) -> &[PresentationContextResult] {
        &self.presentation_contexts
    }

    /// The AE title of the requesting node.
    pub fn client_ae_title(&self) -> &str {
        &self.client_ae_title
    }

    /// The current state of the association state machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// Send a PDU message to the requestor.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        let event = match msg {
            Pdu::PData { .. } => Event::SentPData,
            Pdu::ReleaseRQ => Event::SentReleaseRq,
            Pdu::ReleaseRP => Event::SentReleaseRp,
            Pdu::AbortRQ { .. } => Event::SentAbort,
            _ => Event::SentAssociateAc,
        };
        self.state = machine::transition(self.state, event)
            .context(IllegalPduSnafu { state: self.state })?;
        write_pdu(&mut self.socket, msg).context(SendSnafu)
    }

    /// Read a PDU message from the requestor.
    pub fn receive(&mut self) -> Result<Pdu> {
        let pdu = read_pdu(&mut self.socket, self.receive_max_pdu, self.strict)
            .context(ReceiveSnafu)?;
        let event = match &pdu {
            Pdu::PData { .. } => Event::ReceivedPData,
            Pdu::ReleaseRQ => Event::ReceivedReleaseRq,
            Pdu::ReleaseRP => Event::ReceivedReleaseRp,
            Pdu::AbortRQ { .. } => Event::ReceivedAbort,
            _ => Event::ReceivedPData,
        };
        match machine::transition(self.state, event) {
            Ok(next) => {
                self.state = next;
                if let Pdu::AbortRQ { .. } = pdu {
                    let _ = self.socket.shutdown(std::net::Shutdown::Both);
                    return AbortedSnafu.fail();
                }
                Ok(pdu)
            }
            Err(e) => {
                let _ = self.abort_impl();
                Err(e).context(IllegalPduSnafu { state: self.state })
            }
        }
    }

    /// Send an A-ABORT and shut down the connection.
    pub fn abort(mut self) -> Result<()> {
        self.abort_impl()
    }

    fn abort_impl(&mut self) -> Result<()> {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(
                crate::pdu::AbortRQServiceProviderReason::UnexpectedPdu,
            ),
        };
        let out = write_pdu(&mut self.socket, &pdu).context(SendSnafu);
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        self.state = State::Closing;
        out
    }

    /// Prepare a P-Data writer for sending
    /// one data set in the given presentation context.
    pub fn send_pdata(&mut self, presentation_context_id: u8) -> PDataWriter<&mut TcpStream> {
        PDataWriter::new(
            &mut self.socket,
            presentation_context_id,
            self.send_max_pdu,
        )
    }

    /// Prepare a P-Data reader for receiving
    /// one command or data set from the peer.
    pub fn receive_pdata(&mut self) -> PDataReader<'_, TcpStream> {
        PDataReader::new(&mut self.socket, self.receive_max_pdu)
    }
}
