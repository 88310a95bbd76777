//! The transfer syntax registry.
//!
//! A transfer syntax determines the byte order of the data set,
//! whether element headers carry an explicit VR,
//! and how pixel data is laid out (native or encapsulated).
//! The registry is a compiled-in table; encapsulated syntaxes carry
//! the name of the pixel data codec expected to handle their frames.

use byteordered::Endianness;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use radlink_core::uids;
use snafu::Snafu;
use std::io::{Read, Write};

/// The VR encoding convention of a transfer syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrEncoding {
    /// Element headers do not carry a VR;
    /// it is looked up in the data dictionary.
    Implicit,
    /// Element headers carry an explicit VR.
    Explicit,
}

/// How the pixel data of a transfer syntax is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Native (uncompressed) pixel data.
    None,
    /// The data set itself is compressed with the DEFLATE algorithm.
    Deflated,
    /// Pixel data is encapsulated in fragments,
    /// to be processed by the named pixel data codec.
    Encapsulated(&'static str),
}

/// A descriptor of a single DICOM transfer syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSyntax {
    /// The unique identifier of the transfer syntax.
    pub uid: &'static str,
    /// The name of the transfer syntax.
    pub name: &'static str,
    /// The byte order of the data set.
    pub endianness: Endianness,
    /// The VR encoding convention.
    pub vr_encoding: VrEncoding,
    /// The pixel data (or data set) codec requirement.
    pub codec: Codec,
}

impl TransferSyntax {
    /// Whether pixel data under this transfer syntax is encapsulated.
    pub fn is_encapsulated(&self) -> bool {
        matches!(self.codec, Codec::Encapsulated(_))
    }

    /// Whether the data set of this transfer syntax is deflated.
    pub fn is_deflated(&self) -> bool {
        self.codec == Codec::Deflated
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("unknown transfer syntax `{}`", uid))]
pub struct UnknownTransferSyntaxError {
    /// the unrecognized UID
    pub uid: String,
}

/// Descriptors for the built-in transfer syntaxes.
pub mod entries {
    use super::*;

    /// Implicit VR Little Endian
    pub static IMPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax {
        uid: uids::IMPLICIT_VR_LITTLE_ENDIAN,
        name: "Implicit VR Little Endian",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Implicit,
        codec: Codec::None,
    };

    /// Explicit VR Little Endian
    pub static EXPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax {
        uid: uids::EXPLICIT_VR_LITTLE_ENDIAN,
        name: "Explicit VR Little Endian",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::None,
    };

    /// Deflated Explicit VR Little Endian
    pub static DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax {
        uid: uids::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN,
        name: "Deflated Explicit VR Little Endian",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::Deflated,
    };

    /// Explicit VR Big Endian (retired)
    pub static EXPLICIT_VR_BIG_ENDIAN: TransferSyntax = TransferSyntax {
        uid: uids::EXPLICIT_VR_BIG_ENDIAN,
        name: "Explicit VR Big Endian",
        endianness: Endianness::Big,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::None,
    };

    /// JPEG Baseline (Process 1)
    pub static JPEG_BASELINE_8_BIT: TransferSyntax = TransferSyntax {
        uid: uids::JPEG_BASELINE_8_BIT,
        name: "JPEG Baseline (Process 1)",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::Encapsulated("jpeg"),
    };

    /// JPEG-LS Lossless
    pub static JPEG_LS_LOSSLESS: TransferSyntax = TransferSyntax {
        uid: uids::JPEG_LS_LOSSLESS,
        name: "JPEG-LS Lossless Image Compression",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::Encapsulated("jpeg-ls"),
    };

    /// JPEG 2000 (Lossless Only)
    pub static JPEG_2000_LOSSLESS: TransferSyntax = TransferSyntax {
        uid: uids::JPEG_2000_LOSSLESS,
        name: "JPEG 2000 Image Compression (Lossless Only)",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::Encapsulated("jpeg-2000"),
    };

    /// JPEG 2000
    pub static JPEG_2000: TransferSyntax = TransferSyntax {
        uid: uids::JPEG_2000,
        name: "JPEG 2000 Image Compression",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::Encapsulated("jpeg-2000"),
    };

    /// RLE Lossless
    pub static RLE_LOSSLESS: TransferSyntax = TransferSyntax {
        uid: uids::RLE_LOSSLESS,
        name: "RLE Lossless",
        endianness: Endianness::Little,
        vr_encoding: VrEncoding::Explicit,
        codec: Codec::Encapsulated("rle"),
    };
}

static ALL_ENTRIES: &[&TransferSyntax] = &[
    &entries::IMPLICIT_VR_LITTLE_ENDIAN,
    &entries::EXPLICIT_VR_LITTLE_ENDIAN,
    &entries::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN,
    &entries::EXPLICIT_VR_BIG_ENDIAN,
    &entries::JPEG_BASELINE_8_BIT,
    &entries::JPEG_LS_LOSSLESS,
    &entries::JPEG_2000_LOSSLESS,
    &entries::JPEG_2000,
    &entries::RLE_LOSSLESS,
];

/// A view of the compiled-in transfer syntax table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransferSyntaxRegistry;

impl TransferSyntaxRegistry {
    /// Obtain the descriptor for the given transfer syntax UID.
    /// Trailing NUL characters and spaces in the UID are disregarded,
    /// as they may remain from a stored UI value.
    pub fn get(uid: &str) -> Option<&'static TransferSyntax> {
        let uid = uid.trim_end_matches(['\0', ' ']);
        ALL_ENTRIES.iter().find(|ts| ts.uid == uid).copied()
    }

    /// Obtain the descriptor for the given transfer syntax UID,
    /// raising an error when it is not known.
    pub fn get_strict(uid: &str) -> Result<&'static TransferSyntax, UnknownTransferSyntaxError> {
        Self::get(uid).ok_or_else(|| UnknownTransferSyntaxError {
            uid: uid.trim_end_matches(['\0', ' ']).to_string(),
        })
    }

    /// Iterate over all registered transfer syntaxes.
    pub fn iter() -> impl Iterator<Item = &'static TransferSyntax> {
        ALL_ENTRIES.iter().copied()
    }
}

/// Wrap a reader so that a deflated data set can be read inflated.
pub fn inflate_reader<R: Read>(reader: R) -> DeflateDecoder<R> {
    DeflateDecoder::new(reader)
}

/// Wrap a writer so that the written data set is deflated.
pub fn deflate_writer<W: Write>(writer: W) -> DeflateEncoder<W> {
    DeflateEncoder::new(writer, Compression::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_trims_stored_padding() {
        let ts = TransferSyntaxRegistry::get("1.2.840.10008.1.2.1\0").unwrap();
        assert_eq!(ts.uid, "1.2.840.10008.1.2.1");
        assert_eq!(ts.vr_encoding, VrEncoding::Explicit);
        assert_eq!(ts.endianness, Endianness::Little);
    }

    #[test]
    fn unknown_transfer_syntax_is_an_error() {
        let e = TransferSyntaxRegistry::get_strict("1.2.840.10008.1.2.4.999");
        assert!(e.is_err());
    }

    #[test]
    fn encapsulated_syntaxes_name_their_codec() {
        let ts = TransferSyntaxRegistry::get(radlink_core::uids::RLE_LOSSLESS).unwrap();
        assert_eq!(ts.codec, Codec::Encapsulated("rle"));
        assert!(ts.is_encapsulated());
        let ts = TransferSyntaxRegistry::get(radlink_core::uids::IMPLICIT_VR_LITTLE_ENDIAN).unwrap();
        assert!(!ts.is_encapsulated());
    }
}
