//! The `Job` and `Command` data model (spec §3).
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::task::Task;

/// An ordered, named pipeline of commands.
///
/// Constructed once by the loader and immutable thereafter; execution state
/// (resolved env snapshots, exit codes) lives in a separate run record, not
/// on this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Job identifier.
    pub name: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Working directory for spawned commands; defaults to the manifest's directory.
    pub data: PathBuf,
    /// Absolute task search root directories.
    pub tasks: Vec<PathBuf>,
    /// Job-level env, reachable via `${job.env.*}` but never auto-injected into a command's env.
    pub env: BTreeMap<String, String>,
    /// Ordered, non-empty sequence of commands.
    pub commands: Vec<Command>,
}

/// A single scheduled invocation of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Optional identifier, unique within the job when present.
    pub name: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Name of the task this command invokes.
    pub task: String,
    /// Env values supplied for the task's declared keys; values may contain placeholders.
    pub env: BTreeMap<String, String>,
    /// When true, the executor skips spawning this command.
    pub skip: bool,
}

impl Command {
    /// A human-readable label for diagnostics: the command's `name` if
    /// present, otherwise its positional index.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("#{index}"))
    }
}

/// A command together with the `Task` the binder resolved it against.
///
/// Produced by [`crate::bind::bind`]; kept separate from [`Command`] so that
/// `Job` remains immutable after construction (spec §3 invariant).
#[derive(Debug, Clone)]
pub struct BoundCommand<'job> {
    /// The original command definition.
    pub command: &'job Command,
    /// Zero-based position within `job.commands`.
    pub index: usize,
    /// The resolved task this command invokes.
    pub task: Arc<Task>,
}
