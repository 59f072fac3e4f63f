//! Legacy (multi-read fast5) container access
//!
//! The converter never touches a legacy file format directly. It works through
//! two small traits:
//!
//! - [`LegacyReader`]: opens a path and yields a [`LegacyFile`] handle
//! - [`LegacyFile`]: root attribute lookup, child enumeration, and per-read
//!   [`Group`] loading
//!
//! A loaded read is an owned [`Group`] tree (attributes, child groups and an
//! optional raw signal dataset). Backends decide how lazily they load it.
//!
//! Each worker opens its own handle and only ever uses it from its own thread,
//! so handles are not required to be `Send`.

pub mod builder;
pub mod group;
pub mod json;
pub mod memory;

pub use builder::{multi_read_container, ReadBuilder};
pub use group::{AttrValue, Group};
pub use json::JsonReader;
pub use memory::MemoryReader;

use crate::error::LegacyResult;
use std::path::Path;

/// Prefix of child groups that hold a read record
pub const READ_GROUP_PREFIX: &str = "read_";

/// Opens legacy containers
pub trait LegacyReader: Send + Sync {
    /// File extension (without dot) of containers this reader understands
    fn extension(&self) -> &str;

    /// Open a container read-only
    fn open(&self, path: &Path) -> LegacyResult<Box<dyn LegacyFile>>;
}

/// An open legacy container
pub trait LegacyFile {
    /// Look up a root attribute
    fn attr(&self, key: &str) -> Option<AttrValue>;

    /// Names of the root's child groups, in scan order
    fn list_children(&self) -> LegacyResult<Vec<String>>;

    /// Load one child group; backends may hand each group out only once
    fn group(&self, name: &str) -> LegacyResult<Group>;
}

/// Check whether a child group name denotes a read record
pub fn is_read_group(name: &str) -> bool {
    name.starts_with(READ_GROUP_PREFIX)
}

/// Check that an open container is a multi-read container
///
/// A container qualifies if it declares `file_type = multi-read`, if it is
/// empty, or if any of its children is a read group.
pub fn is_multi_read(file: &dyn LegacyFile) -> bool {
    if let Some(AttrValue::Str(file_type)) = file.attr("file_type") {
        if file_type == "multi-read" {
            return true;
        }
    }

    match file.list_children() {
        Ok(children) => children.is_empty() || children.iter().any(|name| is_read_group(name)),
        Err(_) => false,
    }
}
