//! Protocol Data Unit module:
//! the data types of PS3.8 §9.3 and their reading and writing.

pub mod reader;
pub mod writer;

pub use self::reader::read_pdu;
pub use self::writer::write_pdu;

/// A presentation context as proposed in an A-ASSOCIATE-RQ:
/// one abstract syntax with one or more candidate transfer syntaxes.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextProposed {
    /// The identifier of the presentation context, an odd number.
    pub id: u8,
    /// The abstract syntax (SOP class UID).
    pub abstract_syntax: String,
    /// The candidate transfer syntax UIDs.
    pub transfer_syntaxes: Vec<String>,
}

/// The outcome for one presentation context in an A-ASSOCIATE-AC.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextResult {
    /// The identifier of the presentation context.
    pub id: u8,
    /// Whether the context was accepted, and if not, why.
    pub reason: PresentationContextResultReason,
    /// The single transfer syntax chosen by the acceptor.
    pub transfer_syntax: String,
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PresentationContextResultReason {
    Acceptance = 0,
    UserRejection = 1,
    NoReason = 2,
    AbstractSyntaxNotSupported = 3,
    TransferSyntaxesNotSupported = 4,
}

impl PresentationContextResultReason {
    pub fn from(reason: u8) -> Option<Self> {
        match reason {
            0 => Some(PresentationContextResultReason::Acceptance),
            1 => Some(PresentationContextResultReason::UserRejection),
            2 => Some(PresentationContextResultReason::NoReason),
            3 => Some(PresentationContextResultReason::AbstractSyntaxNotSupported),
            4 => Some(PresentationContextResultReason::TransferSyntaxesNotSupported),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJResult {
    Permanent = 1,
    Transient = 2,
}

impl AssociationRJResult {
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(AssociationRJResult::Permanent),
            2 => Some(AssociationRJResult::Transient),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderAcse(AssociationRJServiceProviderAcseReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            1 => {
                use AssociationRJServiceUserReason::*;
                let r = match reason {
                    1 => NoReasonGiven,
                    2 => ApplicationContextNameNotSupported,
                    3 => CallingAETitleNotRecognized,
                    7 => CalledAETitleNotRecognized,
                    r => Reserved(r),
                };
                Some(AssociationRJSource::ServiceUser(r))
            }
            2 => {
                use AssociationRJServiceProviderAcseReason::*;
                let r = match reason {
                    2 => ProtocolVersionNotSupported,
                    _ => NoReasonGiven,
                };
                Some(AssociationRJSource::ServiceProviderAcse(r))
            }
            3 => {
                use AssociationRJServiceProviderPresentationReason::*;
                let r = match reason {
                    1 => TemporaryCongestion,
                    2 => LocalLimitExceeded,
                    r => Reserved(r),
                };
                Some(AssociationRJSource::ServiceProviderPresentation(r))
            }
            _ => None,
        }
    }

    /// The `(source, reason)` byte pair of this rejection.
    pub fn to_bytes(self) -> (u8, u8) {
        match self {
            AssociationRJSource::ServiceUser(r) => {
                use AssociationRJServiceUserReason::*;
                let reason = match r {
                    NoReasonGiven => 1,
                    ApplicationContextNameNotSupported => 2,
                    CallingAETitleNotRecognized => 3,
                    CalledAETitleNotRecognized => 7,
                    Reserved(x) => x,
                };
                (1, reason)
            }
            AssociationRJSource::ServiceProviderAcse(r) => {
                use AssociationRJServiceProviderAcseReason::*;
                let reason = match r {
                    NoReasonGiven => 1,
                    ProtocolVersionNotSupported => 2,
                };
                (2, reason)
            }
            AssociationRJSource::ServiceProviderPresentation(r) => {
                use AssociationRJServiceProviderPresentationReason::*;
                let reason = match r {
                    TemporaryCongestion => 1,
                    LocalLimitExceeded => 2,
                    Reserved(x) => x,
                };
                (3, reason)
            }
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderAcseReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

/// A single presentation data value within a P-DATA-TF PDU.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PDataValue {
    /// The presentation context of the message this value belongs to.
    pub presentation_context_id: u8,
    /// Whether the value carries command set or data set bytes.
    pub value_type: PDataValueType,
    /// Whether this is the last fragment of its command or data set.
    pub is_last: bool,
    /// The fragment bytes.
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PDataValueType {
    Command,
    Data,
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQSource {
    ServiceUser,
    ServiceProvider(AbortRQServiceProviderReason),
    Reserved,
}

impl AbortRQSource {
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            0 => Some(AbortRQSource::ServiceUser),
            1 => Some(AbortRQSource::Reserved),
            2 => {
                use AbortRQServiceProviderReason::*;
                let r = match reason {
                    0 => ReasonNotSpecified,
                    1 => UnrecognizedPdu,
                    2 => UnexpectedPdu,
                    4 => UnrecognizedPduParameter,
                    5 => UnexpectedPduParameter,
                    6 => InvalidPduParameterValue,
                    _ => Reserved,
                };
                Some(AbortRQSource::ServiceProvider(r))
            }
            _ => None,
        }
    }

    /// The `(source, reason)` byte pair of this abort.
    pub fn to_bytes(self) -> (u8, u8) {
        match self {
            AbortRQSource::ServiceUser => (0, 0),
            AbortRQSource::Reserved => (1, 0),
            AbortRQSource::ServiceProvider(r) => {
                use AbortRQServiceProviderReason::*;
                let reason = match r {
                    ReasonNotSpecified => 0,
                    UnrecognizedPdu => 1,
                    UnexpectedPdu => 2,
                    Reserved => 3,
                    UnrecognizedPduParameter => 4,
                    UnexpectedPduParameter => 5,
                    InvalidPduParameterValue => 6,
                };
                (2, reason)
            }
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    Reserved,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameterValue,
}

/// A user identity negotiation sub-item (type 0x58).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct UserIdentity {
    /// 1 = username, 2 = username and passcode,
    /// 3 = Kerberos ticket, 4 = SAML assertion, 5 = JWT.
    pub identity_type: u8,
    /// Whether a positive server response is requested.
    pub positive_response_requested: bool,
    /// The primary identity field (e.g. the username).
    pub primary_field: Vec<u8>,
    /// The secondary identity field (e.g. the passcode).
    pub secondary_field: Vec<u8>,
}

/// A sub-item of the user information item.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserVariableItem {
    Unknown(u8, Vec<u8>),
    MaxLength(u32),
    ImplementationClassUid(String),
    ImplementationVersionName(String),
    AsyncOperations(u16, u16),
    UserIdentity(UserIdentity),
}

/// A variable item of an association PDU.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PduVariableItem {
    Unknown(u8),
    ApplicationContext(String),
    PresentationContextProposed(PresentationContextProposed),
    PresentationContextResult(PresentationContextResult),
    UserVariables(Vec<UserVariableItem>),
}

/// A DICOM Upper Layer Protocol Data Unit.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum Pdu {
    /// A PDU of an unrecognized type, kept for diagnosis.
    Unknown { pdu_type: u8, data: Vec<u8> },
    /// A-ASSOCIATE-RQ (type 0x01)
    AssociationRQ {
        protocol_version: u16,
        calling_ae_title: String,
        called_ae_title: String,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextProposed>,
        user_variables: Vec<UserVariableItem>,
    },
    /// A-ASSOCIATE-AC (type 0x02)
    AssociationAC {
        protocol_version: u16,
        calling_ae_title: String,
        called_ae_title: String,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextResult>,
        user_variables: Vec<UserVariableItem>,
    },
    /// A-ASSOCIATE-RJ (type 0x03)
    AssociationRJ {
        result: AssociationRJResult,
        source: AssociationRJSource,
    },
    /// P-DATA-TF (type 0x04)
    PData { data: Vec<PDataValue> },
    /// A-RELEASE-RQ (type 0x05)
    ReleaseRQ,
    /// A-RELEASE-RP (type 0x06)
    ReleaseRP,
    /// A-ABORT (type 0x07)
    AbortRQ { source: AbortRQSource },
}

impl Pdu {
    /// A short name for logging purposes.
    pub fn short_description(&self) -> &'static str {
        match self {
            Pdu::Unknown { .. } => "Unknown",
            Pdu::AssociationRQ { .. } => "A-ASSOCIATE-RQ",
            Pdu::AssociationAC { .. } => "A-ASSOCIATE-AC",
            Pdu::AssociationRJ { .. } => "A-ASSOCIATE-RJ",
            Pdu::PData { .. } => "P-DATA-TF",
            Pdu::ReleaseRQ => "A-RELEASE-RQ",
            Pdu::ReleaseRP => "A-RELEASE-RP",
            Pdu::AbortRQ { .. } => "A-ABORT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::reader::read_pdu;
    use crate::pdu::writer::write_pdu;
    use crate::MINIMUM_PDU_SIZE;

    fn round_trip(pdu: Pdu) {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &pdu).unwrap();
        let mut cursor = &bytes[..];
        let same = read_pdu(&mut cursor, MINIMUM_PDU_SIZE, true).unwrap();
        assert_eq!(pdu, same);
        assert_eq!(cursor.len(), 0);
    }

    #[test]
    fn association_rq_round_trip() {
        round_trip(Pdu::AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "MAYAM".to_string(),
            called_ae_title: "TEAMPACS".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec![
                    "1.2.840.10008.1.2.1".to_string(),
                    "1.2.840.10008.1.2".to_string(),
                ],
            }],
            user_variables: vec![
                UserVariableItem::MaxLength(16384),
                UserVariableItem::ImplementationClassUid("1.2.3.4".to_string()),
                UserVariableItem::ImplementationVersionName("RADLINK_0_1".to_string()),
            ],
        });
    }

    #[test]
    fn association_ac_round_trip() {
        round_trip(Pdu::AssociationAC {
            protocol_version: 1,
            calling_ae_title: "MAYAM".to_string(),
            called_ae_title: "TEAMPACS".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: "1.2.840.10008.1.2.1".to_string(),
            }],
            user_variables: vec![UserVariableItem::MaxLength(32768)],
        });
    }

    #[test]
    fn association_rj_round_trip() {
        round_trip(Pdu::AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
        });
    }

    #[test]
    fn pdata_round_trip() {
        round_trip(Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0x01, 0x02, 0x03, 0x04],
            }],
        });
    }

    #[test]
    fn release_and_abort_round_trips() {
        round_trip(Pdu::ReleaseRQ);
        round_trip(Pdu::ReleaseRP);
        round_trip(Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::UnexpectedPdu,
            ),
        });
    }

    #[test]
    fn user_identity_round_trip() {
        round_trip(Pdu::AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SCU".to_string(),
            called_ae_title: "SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            }],
            user_variables: vec![UserVariableItem::UserIdentity(UserIdentity {
                identity_type: 2,
                positive_response_requested: true,
                primary_field: b"operator".to_vec(),
                secondary_field: b"secret".to_vec(),
            })],
        });
    }
}
