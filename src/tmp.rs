//! Lazy per-command `${tmp.*}` directory allocation (spec §4.3, §5).
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::EngineError;

/// Allocates named temporary directories on first reference.
///
/// One allocator is constructed per command. Within that command, repeated
/// references to `${tmp.X}` return the same directory; a fresh allocator
/// (and fresh directories) is used for the next command.
#[derive(Debug)]
pub struct TmpAllocator {
    root: TempDir,
    allocated: RefCell<BTreeMap<String, PathBuf>>,
}

impl TmpAllocator {
    /// Create an allocator rooted under `parent` (typically a run-scoped
    /// directory shared by the whole job, so cleanup is a single `rmdir -r`).
    ///
    /// # Errors
    ///
    /// Returns an error if a temporary root directory cannot be created.
    pub fn new(parent: &Path) -> Result<Self, EngineError> {
        let root = tempfile::Builder::new()
            .prefix("cmd-")
            .tempdir_in(parent)?;
        Ok(Self {
            root,
            allocated: RefCell::new(BTreeMap::new()),
        })
    }

    /// Return the directory for `name`, allocating and creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created on disk.
    pub fn get(&self, name: &str) -> Result<PathBuf, EngineError> {
        if let Some(existing) = self.allocated.borrow().get(name) {
            return Ok(existing.clone());
        }
        let path = self.root.path().join(name);
        std::fs::create_dir_all(&path)?;
        self.allocated
            .borrow_mut()
            .insert(name.to_string(), path.clone());
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn same_name_returns_same_directory() {
        let parent = tempfile::tempdir().unwrap();
        let alloc = TmpAllocator::new(parent.path()).unwrap();
        let a = alloc.get("foo").unwrap();
        let b = alloc.get("foo").unwrap();
        assert_eq!(a, b);
        assert!(a.is_dir());
    }

    #[test]
    fn distinct_names_return_distinct_directories() {
        let parent = tempfile::tempdir().unwrap();
        let alloc = TmpAllocator::new(parent.path()).unwrap();
        let a = alloc.get("foo").unwrap();
        let b = alloc.get("bar").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn separate_allocators_yield_separate_directories() {
        let parent = tempfile::tempdir().unwrap();
        let alloc1 = TmpAllocator::new(parent.path()).unwrap();
        let alloc2 = TmpAllocator::new(parent.path()).unwrap();
        assert_ne!(alloc1.get("foo").unwrap(), alloc2.get("foo").unwrap());
    }
}
