//! Module containing the DICOM file meta information table:
//! the group 0002 elements which precede the data set in a Part 10 file,
//! always encoded in Explicit VR Little Endian.

use radlink_core::value::PrimitiveValue;
use radlink_core::{tags, DataElementHeader, Tag, VR};
use radlink_encoding::decode::{self, read_value, Decode, ExplicitVRLittleEndianDecoder};
use radlink_encoding::encode::{
    self, encode_primitive_padded, Encode, ExplicitVRLittleEndianEncoder,
};
use byteordered::Endianness;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Read, Write};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to decode a file meta element"))]
    DecodeElement {
        #[snafu(backtrace)]
        source: decode::Error,
    },

    #[snafu(display("failed to encode a file meta element"))]
    EncodeElement {
        #[snafu(backtrace)]
        source: encode::Error,
    },

    #[snafu(display(
        "unexpected first element {}, file meta group must start with (0002,0000)",
        tag
    ))]
    UnexpectedElement { tag: Tag, backtrace: Backtrace },

    #[snafu(display("file meta group is missing the mandatory element {}", name))]
    MissingElement {
        name: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("element {} has an unexpected value type", tag))]
    UnexpectedValueType { tag: Tag, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// DICOM file meta information.
///
/// The table contains the group 0002 attributes
/// which describe how the data set which follows is encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetaTable {
    /// The byte length of the remainder of the meta group
    /// after the group length element itself.
    pub information_group_length: u32,
    /// The file meta information version.
    pub information_version: [u8; 2],
    /// The SOP class of the stored object.
    pub media_storage_sop_class_uid: String,
    /// The SOP instance of the stored object.
    pub media_storage_sop_instance_uid: String,
    /// The transfer syntax of the data set.
    pub transfer_syntax: String,
    /// The UID of the implementation which wrote the file.
    pub implementation_class_uid: String,
    /// The version name of the implementation which wrote the file.
    pub implementation_version_name: Option<String>,
    /// The AE title of the entity which wrote the file.
    pub source_application_entity_title: Option<String>,
}

impl FileMetaTable {
    /// Read a file meta table from the given source.
    ///
    /// The source must be positioned right after the `DICM` magic code;
    /// the group is always in Explicit VR Little Endian.
    pub fn from_reader<R: Read>(mut source: R) -> Result<Self> {
        let decoder = ExplicitVRLittleEndianDecoder;

        let (header, _) = decoder
            .decode_header(&mut source)
            .context(DecodeElementSnafu)?;
        ensure!(
            header.tag == tags::FILE_META_INFORMATION_GROUP_LENGTH,
            UnexpectedElementSnafu { tag: header.tag }
        );
        let group_length: u32 = read_value(&mut source, &header, Endianness::Little)
            .context(DecodeElementSnafu)?
            .to_int()
            .ok()
            .context(UnexpectedValueTypeSnafu { tag: header.tag })?;

        let mut region = source.take(u64::from(group_length));

        let mut information_version = None;
        let mut media_storage_sop_class_uid = None;
        let mut media_storage_sop_instance_uid = None;
        let mut transfer_syntax = None;
        let mut implementation_class_uid = None;
        let mut implementation_version_name = None;
        let mut source_application_entity_title = None;

        loop {
            let (header, _) = match decoder.decode_header(&mut region) {
                Ok(h) => h,
                Err(decode::Error::ReadHeaderTag { ref source, .. })
                    if source.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(e) => return Err(e).context(DecodeElementSnafu),
            };
            let value =
                read_value(&mut region, &header, Endianness::Little).context(DecodeElementSnafu)?;
            match header.tag {
                tags::FILE_META_INFORMATION_VERSION => {
                    let bytes = value.to_bytes();
                    if bytes.len() >= 2 {
                        information_version = Some([bytes[0], bytes[1]]);
                    }
                }
                tags::MEDIA_STORAGE_SOP_CLASS_UID => {
                    media_storage_sop_class_uid = Some(value.to_str().to_string());
                }
                tags::MEDIA_STORAGE_SOP_INSTANCE_UID => {
                    media_storage_sop_instance_uid = Some(value.to_str().to_string());
                }
                tags::TRANSFER_SYNTAX_UID => {
                    transfer_syntax = Some(value.to_str().to_string());
                }
                tags::IMPLEMENTATION_CLASS_UID => {
                    implementation_class_uid = Some(value.to_str().to_string());
                }
                tags::IMPLEMENTATION_VERSION_NAME => {
                    implementation_version_name = Some(value.to_str().to_string());
                }
                tags::SOURCE_APPLICATION_ENTITY_TITLE => {
                    source_application_entity_title = Some(value.to_str().to_string());
                }
                _ => {
                    // other meta attributes are tolerated and dropped
                    tracing::debug!("ignoring file meta attribute {}", header.tag);
                }
            }
        }

        Ok(FileMetaTable {
            information_group_length: group_length,
            information_version: information_version.unwrap_or([0, 1]),
            media_storage_sop_class_uid: media_storage_sop_class_uid
                .context(MissingElementSnafu {
                    name: "MediaStorageSOPClassUID",
                })?,
            media_storage_sop_instance_uid: media_storage_sop_instance_uid.context(
                MissingElementSnafu {
                    name: "MediaStorageSOPInstanceUID",
                },
            )?,
            transfer_syntax: transfer_syntax.context(MissingElementSnafu {
                name: "TransferSyntaxUID",
            })?,
            implementation_class_uid: implementation_class_uid.unwrap_or_default(),
            implementation_version_name,
            source_application_entity_title,
        })
    }

    /// The transfer syntax UID of the data set,
    /// with any stored padding removed.
    pub fn transfer_syntax(&self) -> &str {
        self.transfer_syntax.trim_end_matches(['\0', ' '])
    }

    /// Recompute the information group length
    /// from the lengths of the elements which follow it.
    pub fn update_information_group_length(&mut self) {
        fn element_len(vr: VR, value_len: usize) -> u32 {
            let header = if vr.is_long_form() { 12 } else { 8 };
            let padded = (value_len as u32) + (value_len as u32 & 1);
            header + padded
        }

        let mut length = element_len(VR::OB, 2); // information version
        length += element_len(VR::UI, self.media_storage_sop_class_uid.len());
        length += element_len(VR::UI, self.media_storage_sop_instance_uid.len());
        length += element_len(VR::UI, self.transfer_syntax().len());
        length += element_len(VR::UI, self.implementation_class_uid.len());
        if let Some(name) = &self.implementation_version_name {
            length += element_len(VR::SH, name.len());
        }
        if let Some(aet) = &self.source_application_entity_title {
            length += element_len(VR::AE, aet.len());
        }
        self.information_group_length = length;
    }

    /// Serialize the file meta table to the given writer,
    /// in Explicit VR Little Endian.
    pub fn write<W: Write>(&self, mut to: W) -> Result<()> {
        let encoder = ExplicitVRLittleEndianEncoder::default();

        let mut write_element = |tag: Tag, vr: VR, value: &PrimitiveValue| -> Result<()> {
            let len = value.byte_len(vr);
            encoder
                .encode_element_header(&mut to, DataElementHeader::new(tag, vr, len))
                .context(EncodeElementSnafu)?;
            encode_primitive_padded(&mut to, Endianness::Little, vr, value)
                .context(EncodeElementSnafu)?;
            Ok(())
        };

        write_element(
            tags::FILE_META_INFORMATION_GROUP_LENGTH,
            VR::UL,
            &PrimitiveValue::from(self.information_group_length),
        )?;
        write_element(
            tags::FILE_META_INFORMATION_VERSION,
            VR::OB,
            &PrimitiveValue::from(&self.information_version[..]),
        )?;
        write_element(
            tags::MEDIA_STORAGE_SOP_CLASS_UID,
            VR::UI,
            &PrimitiveValue::strs([self.media_storage_sop_class_uid.as_str()]),
        )?;
        write_element(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            VR::UI,
            &PrimitiveValue::strs([self.media_storage_sop_instance_uid.as_str()]),
        )?;
        write_element(
            tags::TRANSFER_SYNTAX_UID,
            VR::UI,
            &PrimitiveValue::strs([self.transfer_syntax()]),
        )?;
        write_element(
            tags::IMPLEMENTATION_CLASS_UID,
            VR::UI,
            &PrimitiveValue::strs([self.implementation_class_uid.as_str()]),
        )?;
        if let Some(name) = &self.implementation_version_name {
            write_element(
                tags::IMPLEMENTATION_VERSION_NAME,
                VR::SH,
                &PrimitiveValue::strs([name.as_str()]),
            )?;
        }
        if let Some(aet) = &self.source_application_entity_title {
            write_element(
                tags::SOURCE_APPLICATION_ENTITY_TITLE,
                VR::AE,
                &PrimitiveValue::strs([aet.as_str()]),
            )?;
        }
        Ok(())
    }

    /// Start building a new file meta table.
    pub fn builder() -> FileMetaTableBuilder {
        FileMetaTableBuilder::default()
    }
}

/// A builder for DICOM file meta information.
///
/// The media storage SOP class and instance and the transfer syntax
/// are mandatory; the implementation identifiers default to
/// this library's.
#[derive(Debug, Default, Clone)]
pub struct FileMetaTableBuilder {
    media_storage_sop_class_uid: Option<String>,
    media_storage_sop_instance_uid: Option<String>,
    transfer_syntax: Option<String>,
    implementation_class_uid: Option<String>,
    implementation_version_name: Option<String>,
    source_application_entity_title: Option<String>,
}

impl FileMetaTableBuilder {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        FileMetaTableBuilder::default()
    }

    /// Define the media storage SOP class UID.
    pub fn media_storage_sop_class_uid(mut self, value: impl Into<String>) -> Self {
        self.media_storage_sop_class_uid = Some(value.into());
        self
    }

    /// Define the media storage SOP instance UID.
    pub fn media_storage_sop_instance_uid(mut self, value: impl Into<String>) -> Self {
        self.media_storage_sop_instance_uid = Some(value.into());
        self
    }

    /// Define the transfer syntax of the data set.
    pub fn transfer_syntax(mut self, value: impl Into<String>) -> Self {
        self.transfer_syntax = Some(value.into());
        self
    }

    /// Define the implementation class UID.
    pub fn implementation_class_uid(mut self, value: impl Into<String>) -> Self {
        self.implementation_class_uid = Some(value.into());
        self
    }

    /// Define the implementation version name.
    pub fn implementation_version_name(mut self, value: impl Into<String>) -> Self {
        self.implementation_version_name = Some(value.into());
        self
    }

    /// Define the source application entity title.
    pub fn source_application_entity_title(mut self, value: impl Into<String>) -> Self {
        self.source_application_entity_title = Some(value.into());
        self
    }

    /// Build the file meta table,
    /// computing the information group length.
    pub fn build(self) -> Result<FileMetaTable> {
        let mut table = FileMetaTable {
            information_group_length: 0,
            information_version: [0, 1],
            media_storage_sop_class_uid: self.media_storage_sop_class_uid.context(
                MissingElementSnafu {
                    name: "MediaStorageSOPClassUID",
                },
            )?,
            media_storage_sop_instance_uid: self.media_storage_sop_instance_uid.context(
                MissingElementSnafu {
                    name: "MediaStorageSOPInstanceUID",
                },
            )?,
            transfer_syntax: self.transfer_syntax.context(MissingElementSnafu {
                name: "TransferSyntaxUID",
            })?,
            implementation_class_uid: self
                .implementation_class_uid
                .unwrap_or_else(|| crate::IMPLEMENTATION_CLASS_UID.to_string()),
            implementation_version_name: Some(
                self.implementation_version_name
                    .unwrap_or_else(|| crate::IMPLEMENTATION_VERSION_NAME.to_string()),
            ),
            source_application_entity_title: self.source_application_entity_title,
        };
        table.update_information_group_length();
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radlink_core::uids;

    fn sample_table() -> FileMetaTable {
        FileMetaTable::builder()
            .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .media_storage_sop_instance_uid("1.2.3.4.5.6")
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_mandatory_attributes() {
        let e = FileMetaTable::builder()
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
            .build();
        assert!(matches!(e, Err(Error::MissingElement { .. })));
    }

    #[test]
    fn meta_table_round_trip() {
        let table = sample_table();
        let mut encoded = Vec::new();
        table.write(&mut encoded).unwrap();

        let decoded = FileMetaTable::from_reader(&encoded[..]).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn group_length_covers_the_group_remainder() {
        let table = sample_table();
        let mut encoded = Vec::new();
        table.write(&mut encoded).unwrap();
        // group length element occupies 12 bytes;
        // its value must match the byte count of everything after it
        assert_eq!(
            table.information_group_length as usize,
            encoded.len() - 12
        );
    }
}
