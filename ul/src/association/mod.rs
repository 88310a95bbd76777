//! DICOM association module.
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP:
//! [`client`] holds the service class user (requestor) side,
//! [`server`] the service class provider (acceptor) side,
//! and [`pdata`] the P-DATA fragmentation and reassembly helpers.

pub mod client;
pub mod pdata;
pub mod server;

pub use self::client::{ClientAssociation, ClientAssociationOptions};
pub use self::pdata::{PDataReader, PDataWriter};
pub use self::server::{ServerAssociation, ServerAssociationOptions};

/// The implementation class UID exchanged in association negotiation.
pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.10.1421.1";

/// The implementation version name exchanged in association negotiation.
pub const IMPLEMENTATION_VERSION_NAME: &str = "RADLINK_0_1";
