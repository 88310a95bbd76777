//! This crate contains the DICOM encoding and decoding primitives:
//! element header codecs for the supported transfer syntaxes,
//! primitive value reading and writing,
//! text codecs and the transfer syntax registry.
pub mod decode;
pub mod encode;
pub mod text;
pub mod transfer_syntax;

pub use crate::decode::{Decode, DatasetDecoder};
pub use crate::encode::{DatasetEncoder, Encode};
pub use crate::transfer_syntax::{
    entries, Codec, TransferSyntax, TransferSyntaxRegistry, VrEncoding,
};
