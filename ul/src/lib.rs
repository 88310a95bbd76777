//! This crate implements the DICOM Upper Layer Protocol:
//! PDU reading and writing, the association state machine,
//! presentation context negotiation,
//! and message fragmentation into P-DATA values.

pub mod address;
pub mod association;
pub mod machine;
pub mod pdu;

pub use crate::address::AeAddr;
pub use crate::association::client::{ClientAssociation, ClientAssociationOptions};
pub use crate::association::server::{ServerAssociation, ServerAssociationOptions};
pub use crate::machine::{Event, State};
pub use crate::pdu::reader::read_pdu;
pub use crate::pdu::writer::write_pdu;
pub use crate::pdu::Pdu;

/// The default maximum PDU size, in bytes.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The minimum PDU size, as specified by the standard.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The maximum PDU size, as specified by the standard.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;
