//! The umbrella crate of the `radlink` tool kit.
//!
//! Each member crate is re-exported under a short module name:
//!
//! - [`core`]: tags, value representations, elements, the dictionary
//! - [`encoding`]: element codecs and the transfer syntax registry
//! - [`object`]: in-memory objects and the Part 10 file format
//! - [`pixeldata`]: frame access and window/level rendering
//! - [`ul`]: the Upper Layer protocol and associations
//! - [`dimse`]: the DIMSE services, pooling and failover
//! - [`ups`]: the Unified Procedure Step worklist subsystem
//! - [`anon`]: anonymization and the audit log

pub use radlink_anon as anon;
pub use radlink_core as core;
pub use radlink_dimse as dimse;
pub use radlink_encoding as encoding;
pub use radlink_object as object;
pub use radlink_pixeldata as pixeldata;
pub use radlink_ul as ul;
#[cfg(feature = "ups")]
pub use radlink_ups as ups;

pub use radlink_core::{dictionary, tags, uids, DataElement, Length, Tag, VR};
pub use radlink_object::{open_file, FileObject, InMemObject};
