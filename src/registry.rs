//! Task discovery (spec §4.2): walk task search roots, load every
//! `manifest.yml`, and key the results by task name.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineError;
use crate::manifest::{Task, load_task};

/// Task manifest file name, matched case-sensitively during the walk.
const MANIFEST_FILE_NAME: &str = "manifest.yml";

/// A name-keyed, read-only set of discovered tasks.
#[derive(Debug, Default)]
pub struct Registry {
    tasks: BTreeMap<String, Arc<Task>>,
}

impl Registry {
    /// Walk `roots` in order, loading every `manifest.yml` found beneath
    /// each. Within a root, subdirectories are visited in lexicographic
    /// order, making discovery deterministic across runs and platforms.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateTaskName`] if two manifests declare
    /// the same task name, or any error [`load_task`] itself can return.
    pub fn discover(roots: &[PathBuf]) -> Result<Self, EngineError> {
        let mut tasks: BTreeMap<String, Arc<Task>> = BTreeMap::new();
        let mut declared_at: BTreeMap<String, String> = BTreeMap::new();

        for root in roots {
            let mut manifests = Vec::new();
            walk(root, &mut manifests)?;
            manifests.sort();

            for manifest_path in manifests {
                let task = load_task(&manifest_path)?;
                if let Some(first_path) = declared_at.get(&task.name) {
                    return Err(EngineError::DuplicateTaskName {
                        name: task.name,
                        first: first_path.clone(),
                        second: manifest_path.display().to_string(),
                    });
                }
                declared_at.insert(task.name.clone(), manifest_path.display().to_string());
                tasks.insert(task.name.clone(), Arc::new(task));
            }
        }

        Ok(Self { tasks })
    }

    /// Look up a task by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks.get(name).cloned()
    }

    /// Registered task names, for "available tasks" diagnostics.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// Comma-separated, sorted list of registered task names.
    #[must_use]
    pub fn names_joined(&self) -> String {
        self.names().join(", ")
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if file_type.is_file() && entry.file_name() == MANIFEST_FILE_NAME {
            out.push(path);
        }
    }
    Ok(())
}
