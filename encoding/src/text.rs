//! This module contains reusable components for decoding and encoding
//! text according to the DICOM character repertoires.
//!
//! The default repertoire (ISO-IR 6) is decoded through ISO 8859-1,
//! of which it is a subset; ISO-IR 100 is supported as a specific
//! character set.

use encoding::all::ISO_8859_1;
use encoding::{DecoderTrap, EncoderTrap, Encoding};
use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
#[snafu(display("failed to decode text from {}: {}", charset, message))]
pub struct DecodeTextError {
    charset: &'static str,
    message: String,
    backtrace: Backtrace,
}

#[derive(Debug, Snafu)]
#[snafu(display("failed to encode text to {}: {}", charset, message))]
pub struct EncodeTextError {
    charset: &'static str,
    message: String,
    backtrace: Backtrace,
}

type DecodeResult<T> = Result<T, DecodeTextError>;
type EncodeResult<T> = Result<T, EncodeTextError>;

/// A holder of encoding and decoding mechanisms for text in DICOM content,
/// which is responsible for converting between byte values
/// and Rust strings.
pub trait TextCodec {
    /// Obtain the defined term (unique name) of the text encoding,
    /// which may be used as the value of a
    /// Specific Character Set (0008,0005) element.
    fn name(&self) -> &'static str;

    /// Decode the given byte buffer as a single string.
    fn decode(&self, text: &[u8]) -> DecodeResult<String>;

    /// Encode a text value into a byte vector.
    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>>;
}

fn decode_8859_1(charset: &'static str, text: &[u8]) -> DecodeResult<String> {
    ISO_8859_1.decode(text, DecoderTrap::Strict).map_err(|message| {
        DecodeTextSnafu {
            charset,
            message: message.into_owned(),
        }
        .build()
    })
}

fn encode_8859_1(charset: &'static str, text: &str) -> EncodeResult<Vec<u8>> {
    ISO_8859_1.encode(text, EncoderTrap::Strict).map_err(|message| {
        EncodeTextSnafu {
            charset,
            message: message.into_owned(),
        }
        .build()
    })
}

/// Data type for the default character set text codec (ISO-IR 6).
///
/// Decoding is done through ISO 8859-1, of which the default repertoire
/// is a subset; values containing bytes outside the repertoire are
/// tolerated on read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCharacterSetCodec;

impl TextCodec for DefaultCharacterSetCodec {
    fn name(&self) -> &'static str {
        "ISO_IR 6"
    }

    fn decode(&self, text: &[u8]) -> DecodeResult<String> {
        decode_8859_1(self.name(), text)
    }

    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
        encode_8859_1(self.name(), text)
    }
}

/// Data type for the ISO-IR 100 (ISO 8859-1, Latin alphabet No. 1)
/// character set text codec.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IsoIr100CharacterSetCodec;

impl TextCodec for IsoIr100CharacterSetCodec {
    fn name(&self) -> &'static str {
        "ISO_IR 100"
    }

    fn decode(&self, text: &[u8]) -> DecodeResult<String> {
        decode_8859_1(self.name(), text)
    }

    fn encode(&self, text: &str) -> EncodeResult<Vec<u8>> {
        encode_8859_1(self.name(), text)
    }
}

/// An enum for the specific character sets supported by this tool kit,
/// dispatching to the respective text codec.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SpecificCharacterSet {
    /// The default character repertoire, ISO-IR 6
    #[default]
    Default,
    /// ISO-IR 100: ISO 8859-1, Latin alphabet No. 1
    IsoIr100,
}

impl SpecificCharacterSet {
    /// Obtain the character set for the given
    /// Specific Character Set (0008,0005) defined term.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim_end() {
            "" | "ISO_IR 6" | "ISO 2022 IR 6" => Some(SpecificCharacterSet::Default),
            "ISO_IR 100" | "ISO 2022 IR 100" => Some(SpecificCharacterSet::IsoIr100),
            _ => None,
        }
    }

    /// Retrieve the text codec for this character set.
    pub fn codec(self) -> Box<dyn TextCodec> {
        match self {
            SpecificCharacterSet::Default => Box::new(DefaultCharacterSetCodec),
            SpecificCharacterSet::IsoIr100 => Box::new(IsoIr100CharacterSetCodec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codec_round_trip() {
        let codec = DefaultCharacterSetCodec;
        let text = "TEST^PATIENT";
        let bytes = codec.encode(text).unwrap();
        assert_eq!(bytes, text.as_bytes());
        assert_eq!(codec.decode(&bytes).unwrap(), text);
    }

    #[test]
    fn character_set_from_code() {
        assert_eq!(
            SpecificCharacterSet::from_code("ISO_IR 100"),
            Some(SpecificCharacterSet::IsoIr100)
        );
        assert_eq!(
            SpecificCharacterSet::from_code(""),
            Some(SpecificCharacterSet::Default)
        );
        assert_eq!(SpecificCharacterSet::from_code("ISO_IR 192"), None);
    }
}
