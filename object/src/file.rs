//! Reading and writing DICOM objects in the Part 10 file format:
//! preamble, magic code, file meta group and data set.

use crate::mem::InMemObject;
use crate::meta::{self, FileMetaTable};
use crate::read::{self, read_dataset, read_dataset_until, CountingRead};
use crate::write::{self, write_dataset};
use radlink_core::{tags, Length, VR};
use radlink_encoding::transfer_syntax::{
    deflate_writer, inflate_reader, TransferSyntaxRegistry, UnknownTransferSyntaxError,
};
use snafu::{ensure, Backtrace, ResultExt, Snafu};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const DICM_MAGIC_CODE: [u8; 4] = [b'D', b'I', b'C', b'M'];

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("could not open file {}", filename.display()))]
    OpenFile {
        filename: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read from the source"))]
    ReadSource {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("the file does not start with a DICM magic code"))]
    BadMagic { backtrace: Backtrace },

    #[snafu(display("could not read the file meta group"))]
    ReadMeta {
        #[snafu(backtrace)]
        source: meta::Error,
    },

    #[snafu(display("unsupported transfer syntax"))]
    UnsupportedTransferSyntax {
        source: UnknownTransferSyntaxError,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read the data set"))]
    ReadDataset {
        #[snafu(backtrace)]
        source: read::Error,
    },
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum WriteError {
    #[snafu(display("could not create file {}", filename.display()))]
    CreateFile {
        filename: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not write to the destination"))]
    WriteDestination {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not write the file meta group"))]
    WriteMeta {
        #[snafu(backtrace)]
        source: meta::Error,
    },

    #[snafu(display("unsupported transfer syntax"))]
    UnsupportedWriteTransferSyntax {
        source: UnknownTransferSyntaxError,
        backtrace: Backtrace,
    },

    #[snafu(display("could not write the data set"))]
    WriteDataset {
        #[snafu(backtrace)]
        source: write::Error,
    },
}

/// Options which govern how a Part 10 file is parsed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParsingOptions {
    /// Loosen the Part 10 checks:
    /// when the preamble or magic code is missing,
    /// fall back to reading a bare meta group from the start of the input,
    /// and failing that, to an Implicit VR Little Endian data set.
    ///
    /// The default is strict parsing.
    pub force: bool,
}

/// The position of a pixel data value deferred by a lazy read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelDataPosition {
    /// Byte offset of the pixel data value (past its header)
    /// from the start of the file.
    pub offset: u64,
    /// The declared value length (undefined when encapsulated).
    pub length: Length,
    /// The value representation of the pixel data element.
    pub vr: VR,
}

/// A DICOM object together with its file meta information.
#[derive(Debug, Clone, PartialEq)]
pub struct FileObject {
    preamble: Box<[u8; 128]>,
    meta: FileMetaTable,
    object: InMemObject,
}

/// Open a DICOM file from the file system with strict parsing.
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<FileObject, ReadError> {
    FileObject::open_file(path)
}

impl FileObject {
    /// Create a file object from its parts, with a zeroed preamble.
    pub fn new(meta: FileMetaTable, object: InMemObject) -> Self {
        FileObject {
            preamble: Box::new([0u8; 128]),
            meta,
            object,
        }
    }

    /// Replace the 128-byte preamble.
    pub fn with_preamble(mut self, preamble: [u8; 128]) -> Self {
        self.preamble = Box::new(preamble);
        self
    }

    /// Retrieve the file meta table.
    pub fn meta(&self) -> &FileMetaTable {
        &self.meta
    }

    /// Retrieve the data set.
    pub fn object(&self) -> &InMemObject {
        &self.object
    }

    /// Discard the file wrapper, keeping the data set.
    pub fn into_object(self) -> InMemObject {
        self.object
    }

    /// Open a DICOM file from the file system with strict parsing.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        Self::open_file_with(path, ParsingOptions::default())
    }

    /// Open a DICOM file from the file system with the given options.
    pub fn open_file_with<P: AsRef<Path>>(
        path: P,
        options: ParsingOptions,
    ) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).context(OpenFileSnafu { filename: path })?;
        Self::from_reader_with(BufReader::new(file), options)
    }

    /// Read a DICOM object from the given source with strict parsing.
    pub fn from_reader<R: Read>(source: R) -> Result<Self, ReadError> {
        Self::from_reader_with(source, ParsingOptions::default())
    }

    /// Read a DICOM object from the given source.
    pub fn from_reader_with<R: Read>(
        mut source: R,
        options: ParsingOptions,
    ) -> Result<Self, ReadError> {
        if options.force {
            // lenient parsing may need to retry from offset zero,
            // so the whole input is buffered up front
            let mut data = Vec::new();
            source.read_to_end(&mut data).context(ReadSourceSnafu)?;
            if data.len() >= 132 && data[128..132] == DICM_MAGIC_CODE {
                return Self::from_reader(&data[..]);
            }
            tracing::warn!("missing DICM magic code, falling back to lenient parsing");
            return Self::from_bytes_forced(data);
        }

        let mut preamble = [0u8; 128];
        let mut magic = [0u8; 4];
        source.read_exact(&mut preamble).context(ReadSourceSnafu)?;
        source.read_exact(&mut magic).context(ReadSourceSnafu)?;
        ensure!(magic == DICM_MAGIC_CODE, BadMagicSnafu);

        let meta = FileMetaTable::from_reader(&mut source).context(ReadMetaSnafu)?;
        let object = read_dataset_with_meta(&mut source, &meta)?;
        Ok(FileObject {
            preamble: Box::new(preamble),
            meta,
            object,
        })
    }

    /// Lenient fallback: a bare meta group at offset zero,
    /// then a headless Implicit VR Little Endian data set.
    fn from_bytes_forced(data: Vec<u8>) -> Result<Self, ReadError> {
        if let Ok(meta) = FileMetaTable::from_reader(&data[..]) {
            let meta_len = 12 + meta.information_group_length as usize;
            if meta_len <= data.len() {
                let mut rest = &data[meta_len..];
                let object = read_dataset_with_meta(&mut rest, &meta)?;
                return Ok(FileObject {
                    preamble: Box::new([0u8; 128]),
                    meta,
                    object,
                });
            }
        }

        tracing::warn!("no file meta group found, assuming Implicit VR Little Endian");
        let ts = radlink_encoding::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN.clone();
        let mut rest = &data[..];
        let object = read_dataset(&mut rest, &ts).context(ReadDatasetSnafu)?;

        let sop_class = object
            .get(tags::SOP_CLASS_UID)
            .and_then(|e| e.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();
        let sop_instance = object
            .get(tags::SOP_INSTANCE_UID)
            .and_then(|e| e.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();
        let meta = FileMetaTable {
            information_group_length: 0,
            information_version: [0, 1],
            media_storage_sop_class_uid: sop_class,
            media_storage_sop_instance_uid: sop_instance,
            transfer_syntax: ts.uid.to_string(),
            implementation_class_uid: crate::IMPLEMENTATION_CLASS_UID.to_string(),
            implementation_version_name: None,
            source_application_entity_title: None,
        };
        Ok(FileObject {
            preamble: Box::new([0u8; 128]),
            meta,
            object,
        })
    }

    /// Open a DICOM file, reading everything up to but not including
    /// the pixel data, whose position is reported for deferred access.
    ///
    /// Deflated files are read in full and report no position.
    pub fn open_file_lazy<P: AsRef<Path>>(
        path: P,
    ) -> Result<(Self, Option<PixelDataPosition>), ReadError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).context(OpenFileSnafu { filename: path })?;
        let mut source = BufReader::new(file);

        let mut preamble = [0u8; 128];
        let mut magic = [0u8; 4];
        source.read_exact(&mut preamble).context(ReadSourceSnafu)?;
        source.read_exact(&mut magic).context(ReadSourceSnafu)?;
        ensure!(magic == DICM_MAGIC_CODE, BadMagicSnafu);

        let meta = FileMetaTable::from_reader(&mut source).context(ReadMetaSnafu)?;
        let ts = TransferSyntaxRegistry::get_strict(meta.transfer_syntax())
            .context(UnsupportedTransferSyntaxSnafu)?;

        if ts.is_deflated() {
            let mut inflated = inflate_reader(source);
            let object = read_dataset(&mut inflated, ts).context(ReadDatasetSnafu)?;
            return Ok((
                FileObject {
                    preamble: Box::new(preamble),
                    meta,
                    object,
                },
                None,
            ));
        }

        // 132 bytes of preamble + magic,
        // 12 bytes for the group length element itself
        let base = 132 + 12 + u64::from(meta.information_group_length);
        let mut counting = CountingRead::new(source, base);
        let (object, pixel_header) =
            read_dataset_until(&mut counting, ts, tags::PIXEL_DATA).context(ReadDatasetSnafu)?;

        let position = pixel_header.map(|header| PixelDataPosition {
            offset: counting.position(),
            length: header.len,
            vr: header.vr,
        });

        Ok((
            FileObject {
                preamble: Box::new(preamble),
                meta,
                object,
            },
            position,
        ))
    }

    /// Serialize the whole file (preamble, magic code, meta group
    /// and data set) to the given writer.
    pub fn write_to<W: Write>(&self, mut to: W) -> Result<(), WriteError> {
        let ts = TransferSyntaxRegistry::get_strict(self.meta.transfer_syntax())
            .context(UnsupportedWriteTransferSyntaxSnafu)?;

        to.write_all(&self.preamble[..])
            .context(WriteDestinationSnafu)?;
        to.write_all(&DICM_MAGIC_CODE).context(WriteDestinationSnafu)?;

        let mut meta = self.meta.clone();
        meta.update_information_group_length();
        meta.write(&mut to).context(WriteMetaSnafu)?;

        if ts.is_deflated() {
            let mut deflated = deflate_writer(to);
            write_dataset(&self.object, &mut deflated, ts).context(WriteDatasetSnafu)?;
            deflated.finish().context(WriteDestinationSnafu)?;
            return Ok(());
        }
        write_dataset(&self.object, &mut to, ts).context(WriteDatasetSnafu)
    }

    /// Write the whole file to the file system.
    pub fn write_path<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteError> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).context(CreateFileSnafu { filename: path })?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush().context(WriteDestinationSnafu)
    }
}

fn read_dataset_with_meta<R: Read>(
    source: &mut R,
    meta: &FileMetaTable,
) -> Result<InMemObject, ReadError> {
    let ts = TransferSyntaxRegistry::get_strict(meta.transfer_syntax())
        .context(UnsupportedTransferSyntaxSnafu)?;
    if ts.is_deflated() {
        let mut inflated = inflate_reader(source);
        read_dataset(&mut inflated, ts).context(ReadDatasetSnafu)
    } else {
        read_dataset(source, ts).context(ReadDatasetSnafu)
    }
}

impl std::ops::Deref for FileObject {
    type Target = InMemObject;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl std::ops::DerefMut for FileObject {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FileMetaTable;
    use radlink_core::{tags, uids};

    fn secondary_capture() -> FileObject {
        let mut obj = InMemObject::new();
        obj.set_string(tags::PATIENT_NAME, "TEST^PATIENT").unwrap();
        obj.set_string(tags::PATIENT_ID, "12345").unwrap();
        obj.set_string(tags::STUDY_INSTANCE_UID, "1.2.3").unwrap();
        obj.set_string(tags::SERIES_INSTANCE_UID, "1.2.3.1").unwrap();
        obj.set_string(tags::SOP_INSTANCE_UID, "1.2.3.1.1").unwrap();
        obj.set_string(tags::SOP_CLASS_UID, uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .unwrap();
        obj.set_string(tags::PHOTOMETRIC_INTERPRETATION, "MONOCHROME2")
            .unwrap();
        obj.set_int(tags::SAMPLES_PER_PIXEL, 1).unwrap();
        obj.set_int(tags::ROWS, 1).unwrap();
        obj.set_int(tags::COLUMNS, 1).unwrap();
        obj.set_int(tags::BITS_ALLOCATED, 8).unwrap();
        obj.set_int(tags::BITS_STORED, 8).unwrap();
        obj.set_int(tags::HIGH_BIT, 7).unwrap();
        obj.set_int(tags::PIXEL_REPRESENTATION, 0).unwrap();
        obj.set_bytes(tags::PIXEL_DATA, vec![0x80, 0x00]).unwrap();

        let meta = FileMetaTable::builder()
            .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .media_storage_sop_instance_uid("1.2.3.1.1")
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .build()
            .unwrap();
        FileObject::new(meta, obj)
    }

    #[test]
    fn part10_write_read_round_trip() {
        let file = secondary_capture();
        let mut encoded = Vec::new();
        file.write_to(&mut encoded).unwrap();

        assert_eq!(&encoded[128..132], b"DICM");

        let read_back = FileObject::from_reader(&encoded[..]).unwrap();
        assert_eq!(read_back.object(), file.object());
        assert_eq!(
            read_back.meta().transfer_syntax(),
            uids::EXPLICIT_VR_LITTLE_ENDIAN
        );
        // pixel data must come back byte-identical
        let px = read_back.get(tags::PIXEL_DATA).unwrap();
        assert_eq!(px.to_bytes().unwrap().as_ref(), &[0x80, 0x00]);
    }

    #[test]
    fn strict_parsing_rejects_missing_magic() {
        let data = vec![0u8; 200];
        let e = FileObject::from_reader(&data[..]);
        assert!(matches!(e, Err(ReadError::BadMagic { .. })));
    }

    #[test]
    fn force_mode_reads_headless_dataset() {
        let file = secondary_capture();
        // serialize only the data set, in Implicit VR LE
        let mut encoded = Vec::new();
        crate::write::write_dataset(
            file.object(),
            &mut encoded,
            &radlink_encoding::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN,
        )
        .unwrap();

        let read_back =
            FileObject::from_reader_with(&encoded[..], ParsingOptions { force: true }).unwrap();
        assert_eq!(read_back.object(), file.object());
        assert_eq!(
            read_back.meta().transfer_syntax(),
            uids::IMPLICIT_VR_LITTLE_ENDIAN
        );
    }

    #[test]
    fn deflated_round_trip() {
        let mut file = secondary_capture();
        file.meta.transfer_syntax = uids::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN.to_string();
        let mut encoded = Vec::new();
        file.write_to(&mut encoded).unwrap();

        let read_back = FileObject::from_reader(&encoded[..]).unwrap();
        assert_eq!(read_back.object(), file.object());
    }

    #[test]
    fn lazy_read_reports_pixel_data_position() {
        let file = secondary_capture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sc.dcm");
        file.write_path(&path).unwrap();

        let (partial, position) = FileObject::open_file_lazy(&path).unwrap();
        assert!(partial.get(tags::PIXEL_DATA).is_none());
        assert!(partial.get(tags::PATIENT_NAME).is_some());

        let position = position.unwrap();
        assert_eq!(position.length, Length(2));

        // the recorded offset points exactly at the stored value
        let all = std::fs::read(&path).unwrap();
        let value = &all[position.offset as usize..position.offset as usize + 2];
        assert_eq!(value, &[0x80, 0x00]);
    }
}
