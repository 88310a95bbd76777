//! Association requestor module

use std::borrow::Cow;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::association::pdata::{PDataReader, PDataWriter};
use crate::machine::{self, Event, State};
use crate::pdu::reader::read_pdu;
use crate::pdu::writer::write_pdu;
use crate::pdu::{
    AbortRQSource, AssociationRJResult, AssociationRJSource, Pdu,
    PresentationContextProposed, PresentationContextResult, PresentationContextResultReason,
    UserIdentity, UserVariableItem,
};
use radlink_core::uids;
use snafu::{ensure, Backtrace, ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing at least one requested presentation context
    MissingPresentationContext { backtrace: Backtrace },

    /// could not resolve the server address
    Resolve {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not connect to server
    Connect {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not configure the socket
    Configure {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to send association request
    SendRequest {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },

    /// failed to receive association response
    ReceiveResponse {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },

    #[snafu(display("unexpected response from server `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnexpectedResponse {
        /// the PDU obtained from the server
        pdu: Box<Pdu>,
        backtrace: Backtrace,
    },

    #[snafu(display("protocol version mismatch: expected {}, got {}", expected, got))]
    ProtocolVersionMismatch {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    /// the association was rejected by the server
    Rejected {
        association_result: AssociationRJResult,
        association_source: AssociationRJSource,
        backtrace: Backtrace,
    },

    /// the association was aborted by the server
    Aborted { backtrace: Backtrace },

    /// no presentation contexts accepted by the server
    NoAcceptedPresentationContexts { backtrace: Backtrace },

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

/// A DICOM association builder for a client node.
/// The final outcome is a [`ClientAssociation`].
///
/// This is the standard way of requesting and establishing
/// an association with another DICOM node,
/// which usually takes the role of a service class provider (SCP).
///
/// # Example
///
/// ```no_run
/// # use radlink_ul::association::client::ClientAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///     .with_abstract_syntax("1.2.840.10008.1.1")
///     .calling_ae_title("MAYAM")
///     .called_ae_title("TEAMPACS")
///     .establish("129.168.0.5:104")?;
/// # Ok(())
/// # }
/// ```
///
/// By default, each proposed presentation context
/// admits the transfer syntaxes
/// _Explicit VR Little Endian_ and _Implicit VR Little Endian_.
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions {
    /// the calling AE title
    calling_ae_title: Cow<'static, str>,
    /// the called AE title
    called_ae_title: Cow<'static, str>,
    /// the requested application context name
    application_context_name: Cow<'static, str>,
    /// the requested presentation contexts:
    /// abstract syntax plus explicit transfer syntax candidates
    presentation_contexts: Vec<(String, Vec<String>)>,
    /// the transfer syntaxes proposed for contexts without explicit ones
    transfer_syntax_uids: Vec<String>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length that this node can receive
    max_pdu_length: u32,
    /// whether to receive PDUs strictly within the negotiated maximum
    strict: bool,
    /// the user identity to negotiate, if any
    user_identity: Option<UserIdentity>,
    /// timeout for connecting to the server
    timeout_connect: Option<Duration>,
    /// timeout for reading a PDU (the ARTIM timer)
    timeout_read: Option<Duration>,
}

impl Default for ClientAssociationOptions {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: "ANY-SCP".into(),
            application_context_name: uids::APPLICATION_CONTEXT_NAME.into(),
            presentation_contexts: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            protocol_version: 1,
            max_pdu_length: crate::DEFAULT_MAX_PDU,
            strict: true,
            user_identity: None,
            timeout_connect: Some(Duration::from_secs(10)),
            timeout_read: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientAssociationOptions {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title for the association,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title for the association,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.called_ae_title = called_ae_title.into();
        self
    }

    /// Propose a presentation context with this abstract syntax
    /// and the default transfer syntax candidates.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<String>,
    {
        self.presentation_contexts
            .push((abstract_syntax_uid.into(), Vec::new()));
        self
    }

    /// Propose a presentation context with this abstract syntax
    /// and an explicit list of candidate transfer syntaxes.
    pub fn with_presentation_context<T>(
        mut self,
        abstract_syntax_uid: T,
        transfer_syntax_uids: Vec<String>,
    ) -> Self
    where
        T: Into<String>,
    {
        self.presentation_contexts
            .push((abstract_syntax_uid.into(), transfer_syntax_uids));
        self
    }

    /// Include this transfer syntax in every proposed presentation context
    /// without an explicit candidate list.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<String>,
    {
        self.transfer_syntax_uids.push(transfer_syntax_uid.into());
        self
    }

    /// Override the maximum PDU length that this node can receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Whether to reject PDUs which exceed the negotiated maximum
    /// (the default), or to tolerate them up to the absolute maximum.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Negotiate a user identity with the server.
    pub fn user_identity(mut self, identity: UserIdentity) -> Self {
        self.user_identity = Some(identity);
        self
    }

    /// Override the timeout for establishing the TCP connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_connect = Some(timeout);
        self
    }

    /// Override the ARTIM timeout applied to PDU reads.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_read = Some(timeout);
        self
    }

    /// Initiate the TCP connection and negotiate the association.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<ClientAssociation> {
        let ClientAssociationOptions {
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            transfer_syntax_uids,
            protocol_version,
            max_pdu_length,
            strict,
            user_identity,
            timeout_connect,
            timeout_read,
        } = self;

        // presentation contexts represent intent,
        // so they must not be omitted by the user
        ensure!(
            !presentation_contexts.is_empty(),
            MissingPresentationContextSnafu
        );

        let default_transfer_syntaxes = if transfer_syntax_uids.is_empty() {
            vec![
                uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
            ]
        } else {
            transfer_syntax_uids
        };

        let presentation_contexts: Vec<PresentationContextProposed> = presentation_contexts
            .into_iter()
            .enumerate()
            .map(|(i, (abstract_syntax, transfer_syntaxes))| PresentationContextProposed {
                // context identifiers are odd numbers
                id: (i as u8) * 2 + 1,
                abstract_syntax,
                transfer_syntaxes: if transfer_syntaxes.is_empty() {
                    default_transfer_syntaxes.clone()
                } else {
                    transfer_syntaxes
                },
            })
            .collect();

        let mut user_variables = vec![
            UserVariableItem::MaxLength(max_pdu_length),
            UserVariableItem::ImplementationClassUid(
                crate::association::IMPLEMENTATION_CLASS_UID.to_string(),
            ),
            UserVariableItem::ImplementationVersionName(
                crate::association::IMPLEMENTATION_VERSION_NAME.to_string(),
            ),
        ];
        if let Some(identity) = user_identity {
            user_variables.push(UserVariableItem::UserIdentity(identity));
        }

        let msg = Pdu::AssociationRQ {
            protocol_version,
            calling_ae_title: calling_ae_title.to_string(),
            called_ae_title: called_ae_title.to_string(),
            application_context_name: application_context_name.to_string(),
            presentation_contexts: presentation_contexts.clone(),
            user_variables,
        };

        let address = address
            .to_socket_addrs()
            .context(ResolveSnafu)?
            .next()
            .map(Ok)
            .unwrap_or_else(|| {
                Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no address resolved",
                ))
            })
            .context(ResolveSnafu)?;

        let mut state = State::Idle;
        let mut socket = match timeout_connect {
            Some(timeout) => TcpStream::connect_timeout(&address, timeout).context(ConnectSnafu)?,
            None => TcpStream::connect(address).context(ConnectSnafu)?,
        };
        socket.set_read_timeout(timeout_read).context(ConfigureSnafu)?;
        state = transition_or_bug(state, Event::TransportConnected);

        // send request
        write_pdu(&mut socket, &msg).context(SendRequestSnafu)?;
        state = transition_or_bug(state, Event::SentAssociateRq);

        // receive response
        let msg = read_pdu(&mut socket, max_pdu_length, strict).context(ReceiveResponseSnafu)?;

        match msg {
            Pdu::AssociationAC {
                protocol_version: protocol_version_scp,
                presentation_contexts: presentation_contexts_scp,
                user_variables,
                ..
            } => {
                state = transition_or_bug(state, Event::ReceivedAssociateAc);
                ensure!(
                    protocol_version == protocol_version_scp,
                    ProtocolVersionMismatchSnafu {
                        expected: protocol_version,
                        got: protocol_version_scp,
                    }
                );

                let accepted: Vec<PresentationContextResult> = presentation_contexts_scp
                    .into_iter()
                    .filter(|c| c.reason == PresentationContextResultReason::Acceptance)
                    .collect();
                ensure!(!accepted.is_empty(), NoAcceptedPresentationContextsSnafu);

                // effective maximum PDU size is the lesser of the two sides
                let acceptor_max_pdu = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(crate::DEFAULT_MAX_PDU);

                Ok(ClientAssociation {
                    presentation_contexts: accepted,
                    requested_contexts: presentation_contexts,
                    receive_max_pdu: max_pdu_length,
                    send_max_pdu: max_pdu_length.min(acceptor_max_pdu),
                    strict,
                    socket,
                    state,
                })
            }
            Pdu::AssociationRJ { result, source } => {
                let _ = transition_or_bug(state, Event::ReceivedAssociateRj);
                RejectedSnafu {
                    association_result: result,
                    association_source: source,
                }
                .fail()
            }
            Pdu::AbortRQ { .. } => AbortedSnafu.fail(),
            pdu => {
                // answer anything else with an abort and drop the connection
                let _ = write_pdu(
                    &mut socket,
                    &Pdu::AbortRQ {
                        source: AbortRQSource::ServiceUser,
                    },
                );
                let _ = socket.shutdown(std::net::Shutdown::Both);
                UnexpectedResponseSnafu { pdu: Box::new(pdu) }.fail()
            }
        }
    }
}

/// Apply an event which is known to be legal at this point of the flow.
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
/// of the association requestor.
#[derive(Debug)]
pub struct ClientAssociation {
    /// The accepted presentation contexts
    presentation_contexts: Vec<PresentationContextResult>,
    /// The originally proposed presentation contexts
    requested_contexts: Vec<PresentationContextProposed>,
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

impl ClientAssociation {
    /// Retrieve the accepted presentation contexts.
    pub fn presentation_contexts(&self) -> &[PresentationContextResult] {
        &self.presentation_contexts
    }

    /// Find the accepted presentation context
    /// negotiated for the given abstract syntax.
    pub fn presentation_context_for(
        &self,
        abstract_syntax: &str,
    ) -> Option<&PresentationContextResult> {
        let requested = self
            .requested_contexts
            .iter()
            .find(|pc| pc.abstract_syntax == abstract_syntax)?;
        self.presentation_contexts
            .iter()
            .find(|pc| pc.id == requested.id)
    }

    /// The effective maximum PDU size for outbound data.
    pub fn max_pdu_length(&self) -> u32 {
        self.send_max_pdu
    }

    /// The current state of the association state machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// Send a PDU message to the other intervenient.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        let event = match msg {
            Pdu::PData { .. } => Event::SentPData,
            Pdu::ReleaseRQ => Event::SentReleaseRq,
            Pdu::ReleaseRP => Event::SentReleaseRp,
            Pdu::AbortRQ { .. } => Event::SentAbort,
            _ => Event::SentAssociateRq,
        };
        self.state = machine::transition(self.state, event)
            .context(IllegalPduSnafu { state: self.state })?;
        write_pdu(&mut self.socket, msg).context(SendSnafu)
    }

    /// Read a PDU message from the other intervenient.
    ///
    /// An inbound A-ABORT terminates the association immediately
    /// and is reported as an error.
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
                // a PDU outside its allowed states warrants an abort
                let _ = self.abort_impl();
                Err(e).context(IllegalPduSnafu { state: self.state })
            }
        }
    }

    /// Gracefully release the association.
    pub fn release(mut self) -> Result<()> {
        self.send(&Pdu::ReleaseRQ)?;
        loop {
            let pdu = read_pdu(&mut self.socket, self.receive_max_pdu, self.strict)
                .context(ReceiveSnafu)?;
            match pdu {
                Pdu::ReleaseRP => {
                    self.state = transition_or_bug(self.state, Event::ReceivedReleaseRp);
                    break;
                }
                // outstanding data PDUs are discarded during release
                Pdu::PData { .. } => {
                    self.state = transition_or_bug(self.state, Event::ReceivedPData);
                }
                Pdu::AbortRQ { .. } => break,
                pdu => {
                    let _ = self.abort_impl();
                    return UnexpectedResponseSnafu { pdu: Box::new(pdu) }.fail();
                }
            }
        }
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        self.state = State::Idle;
        Ok(())
    }

    /// Send an A-ABORT and shut down the connection,
    /// terminating the association.
    pub fn abort(mut self) -> Result<()> {
        let out = self.abort_impl();
        self.state = State::Idle;
        out
    }

    fn abort_impl(&mut self) -> Result<()> {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
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

impl Drop for ClientAssociation {
    fn drop(&mut self) {
        if self.state == State::Established {
            let _ = self.abort_impl();
        }
    }
}
