//! The `Task` data model (spec §3).
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A reusable executable template, discovered by the task registry.
#[derive(Debug, Clone, Eq)]
pub struct Task {
    /// Task identifier, unique across the registry.
    pub name: String,
    /// Directory containing this task's `manifest.yml`; used to resolve relative script paths.
    pub path: PathBuf,
    /// Free-text description.
    pub description: Option<String>,
    /// Declared env keys, mapped to human-readable descriptions (not defaults).
    pub env: BTreeMap<String, String>,
    /// How to execute this task.
    pub run: Run,
}

/// How a task's process is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Run {
    /// `interpreter` is tokenised and spawned with `script` as its final argument.
    Inline {
        /// Shell command line naming the interpreter (and any fixed flags).
        interpreter: String,
        /// Script text (or path to one) passed as the interpreter's last argument.
        script: String,
    },
    /// A raw shell line, spawned via `/bin/sh -c` (`cmd /C` on Windows).
    Command {
        /// The shell command line to execute.
        command: String,
    },
}

impl PartialEq for Task {
    /// Two tasks are equal when their declared content matches, regardless of
    /// which manifest path they were loaded from (spec §8 testable property).
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.env == other.env
            && self.run == other.run
    }
}

impl Task {
    /// Declared env keys as a sorted, deduplicated list (for binder diagnostics).
    #[must_use]
    pub fn env_keys(&self) -> Vec<&str> {
        self.env.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(path: &str) -> Task {
        Task {
            name: "build".to_string(),
            path: PathBuf::from(path),
            description: Some("builds the thing".to_string()),
            env: BTreeMap::from([("OUT".to_string(), "output path".to_string())]),
            run: Run::Command {
                command: "make".to_string(),
            },
        }
    }

    #[test]
    fn equal_content_different_path_is_equal() {
        let a = sample("/tasks/a");
        let b = sample("/tasks/b");
        assert_eq!(a, b);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn differing_env_is_not_equal() {
        let a = sample("/tasks/a");
        let mut b = sample("/tasks/a");
        b.env.insert("EXTRA".to_string(), "desc".to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn env_keys_returns_declared_keys() {
        let t = sample("/tasks/a");
        assert_eq!(t.env_keys(), vec!["OUT"]);
    }
}
