//! JSON attribute-tree backend
//!
//! Reads legacy containers that were exported as a JSON document holding the
//! root [`Group`]: root attributes, one child group per read, and the nested
//! `channel_id`, `Raw`, `context_tags` and `tracking_id` groups of each read.
//!
//! The whole document is parsed when the file is opened, so a handle holds
//! the file's reads in memory. Each read group is moved out on its first
//! load rather than cloned, and memory shrinks as the file is converted.

use super::{AttrValue, Group, LegacyFile, LegacyReader};
use crate::error::{LegacyError, LegacyResult};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Extension of exported containers
pub const JSON_EXTENSION: &str = "json";

/// Reader for JSON-exported legacy containers
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReader;

impl JsonReader {
    pub fn new() -> Self {
        Self
    }

    /// Write a container tree to disk in the format this reader opens
    pub fn save(path: &Path, root: &Group) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, root)?;
        writer.flush()
    }
}

impl LegacyReader for JsonReader {
    fn extension(&self) -> &str {
        JSON_EXTENSION
    }

    fn open(&self, path: &Path) -> LegacyResult<Box<dyn LegacyFile>> {
        let file = File::open(path).map_err(|e| LegacyError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut root: Group =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| LegacyError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let groups = std::mem::take(&mut root.groups);
        Ok(Box::new(JsonFile {
            names: groups.keys().cloned().collect(),
            groups: RefCell::new(groups),
            root,
        }))
    }
}

/// An open JSON container
struct JsonFile {
    /// Root attributes; child groups live in `groups`
    root: Group,

    /// Child names as stored in the file
    names: Vec<String>,

    /// Child groups not yet loaded
    groups: RefCell<BTreeMap<String, Group>>,
}

impl LegacyFile for JsonFile {
    fn attr(&self, key: &str) -> Option<AttrValue> {
        self.root.attr(key).cloned()
    }

    fn list_children(&self) -> LegacyResult<Vec<String>> {
        Ok(self.names.clone())
    }

    /// Each group can be loaded once
    fn group(&self, name: &str) -> LegacyResult<Group> {
        self.groups
            .borrow_mut()
            .remove(name)
            .ok_or_else(|| LegacyError::GroupNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch_0.json");

        let root = Group::new()
            .with_attr("file_type", "multi-read")
            .with_group("read_a", Group::new().with_attr("run_id", "abc"))
            .with_group("read_b", Group::new());
        JsonReader::save(&path, &root).unwrap();

        let file = JsonReader::new().open(&path).unwrap();
        assert_eq!(file.attr("file_type"), Some(AttrValue::Str("multi-read".into())));
        assert_eq!(file.list_children().unwrap(), vec!["read_a", "read_b"]);
        assert_eq!(
            file.group("read_a").unwrap().attr("run_id"),
            Some(&AttrValue::Str("abc".into()))
        );
        assert!(matches!(
            file.group("read_c"),
            Err(LegacyError::GroupNotFound { .. })
        ));
    }

    #[test]
    fn test_groups_are_moved_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch_1.json");
        let root = Group::new()
            .with_group("read_a", Group::new().with_signal(vec![1, 2, 3]))
            .with_group("read_b", Group::new());
        JsonReader::save(&path, &root).unwrap();

        let file = JsonReader::new().open(&path).unwrap();
        let read = file.group("read_a").unwrap();
        assert_eq!(read.signal.as_deref(), Some(&[1i16, 2, 3][..]));

        // Listing is unaffected; a second load finds nothing left to hand out
        assert_eq!(file.list_children().unwrap(), vec!["read_a", "read_b"]);
        assert!(matches!(
            file.group("read_a"),
            Err(LegacyError::GroupNotFound { .. })
        ));
        assert!(file.group("read_b").is_ok());
    }

    #[test]
    fn test_open_errors() {
        let dir = tempdir().unwrap();

        let missing = JsonReader::new().open(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(LegacyError::OpenFailed { .. })));

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, b"{ not json").unwrap();
        let result = JsonReader::new().open(&corrupt);
        assert!(matches!(result, Err(LegacyError::Malformed { .. })));
    }
}
