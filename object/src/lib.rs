//! This crate contains a high-level abstraction for reading and manipulating
//! DICOM objects. At this level, objects are comparable to a dictionary of
//! elements, in which some of them can have DICOM objects themselves.
//!
//! The [`FileObject`] type wraps a data set with its file meta information,
//! providing reading and writing in the DICOM Part 10 file format.

pub mod file;
pub mod mem;
pub mod meta;
pub mod read;
pub mod write;

pub use crate::file::{
    open_file, FileObject, ParsingOptions, PixelDataPosition, ReadError, WriteError,
};
pub use crate::mem::{InMemElement, InMemObject, ValueError};
pub use crate::meta::{FileMetaTable, FileMetaTableBuilder};

/// The default implementation class UID of this library,
/// used when writing new files unless overridden.
pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.10.1421.1";

/// The default implementation version name of this library.
pub const IMPLEMENTATION_VERSION_NAME: &str = "RADLINK_0_1";
