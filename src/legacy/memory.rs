//! In-process container backend
//!
//! Holds container trees keyed by path. Useful for embedding the converter
//! behind another loader and for exercising the pipeline without disk input.

use super::{AttrValue, Group, LegacyFile, LegacyReader};
use crate::error::{LegacyError, LegacyResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader over containers registered in memory
#[derive(Debug, Clone)]
pub struct MemoryReader {
    extension: String,
    files: Arc<RwLock<HashMap<PathBuf, Arc<Group>>>>,
}

impl MemoryReader {
    /// Create an empty reader claiming the `fast5` extension
    pub fn new() -> Self {
        Self::with_extension("fast5")
    }

    /// Create an empty reader claiming `extension`
    pub fn with_extension(extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            files: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or replace) a container
    pub fn insert(&self, path: impl Into<PathBuf>, root: Group) {
        self.files.write().insert(path.into(), Arc::new(root));
    }

    /// Number of registered containers
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl Default for MemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyReader for MemoryReader {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn open(&self, path: &Path) -> LegacyResult<Box<dyn LegacyFile>> {
        let root = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LegacyError::OpenFailed {
                path: path.to_path_buf(),
                reason: "no such container".into(),
            })?;

        Ok(Box::new(MemoryFile { root }))
    }
}

struct MemoryFile {
    root: Arc<Group>,
}

impl LegacyFile for MemoryFile {
    fn attr(&self, key: &str) -> Option<AttrValue> {
        self.root.attr(key).cloned()
    }

    fn list_children(&self) -> LegacyResult<Vec<String>> {
        Ok(self.root.groups.keys().cloned().collect())
    }

    fn group(&self, name: &str) -> LegacyResult<Group> {
        self.root
            .group(name)
            .cloned()
            .ok_or_else(|| LegacyError::GroupNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reader() {
        let reader = MemoryReader::new();
        assert!(reader.is_empty());

        reader.insert("/data/a.fast5", Group::new().with_group("read_1", Group::new()));
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.extension(), "fast5");

        let file = reader.open(Path::new("/data/a.fast5")).unwrap();
        assert_eq!(file.list_children().unwrap(), vec!["read_1"]);

        assert!(matches!(
            reader.open(Path::new("/data/b.fast5")),
            Err(LegacyError::OpenFailed { .. })
        ));
    }
}
