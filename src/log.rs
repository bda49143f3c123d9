//! The structured log sink consumer contract (spec §6).
//!
//! Terminal rendering — banners, box-drawing, summaries — is explicitly out
//! of scope for the engine (spec §1). This module only defines the event
//! stream the executor emits and a minimal default [`LogSink`] so the engine
//! is usable standalone; a real front end implements its own sink.
use std::collections::BTreeMap;
use std::time::Duration;

/// Which child pipe an [`LogEvent::OutputLine`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// The child's standard output.
    Stdout,
    /// The child's standard error.
    Stderr,
}

/// How a job run concluded, attached to [`LogEvent::JobEnd`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every command ran and exited zero.
    Success,
    /// A command exited non-zero; remaining commands were not run.
    Failed {
        /// Zero-based index of the failing command.
        index: usize,
        /// Display name of the failing command.
        name: String,
        /// The child's exit code.
        code: i32,
    },
    /// The engine was interrupted by a termination signal.
    Interrupted,
}

/// A resolved command, snapshotted for [`LogEvent::CommandStart`].
#[derive(Debug, Clone)]
pub struct CommandSnapshot {
    /// Zero-based position within the job.
    pub index: usize,
    /// Total number of commands in the job.
    pub total: usize,
    /// The command's `name`, if present.
    pub name: Option<String>,
    /// The task this command invokes.
    pub task: String,
    /// The fully resolved env values the command is about to run with.
    pub env: BTreeMap<String, String>,
}

/// Events the executor publishes while running a job (spec §6).
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A job run has begun.
    JobStart {
        /// The job's name.
        name: String,
    },
    /// A job run has concluded.
    JobEnd {
        /// How it concluded.
        status: JobOutcome,
    },
    /// The task registry finished discovery.
    TasksDiscovered {
        /// Names of every task found, in registry order.
        names: Vec<String>,
    },
    /// A command is about to spawn.
    CommandStart {
        /// The resolved command about to run.
        snapshot: CommandSnapshot,
    },
    /// A command was skipped (`skip: true`) and will not spawn.
    CommandSkipped {
        /// Zero-based position within the job.
        index: usize,
        /// The command's `name` or positional label.
        name: String,
    },
    /// One line of child output.
    OutputLine {
        /// Which pipe it came from.
        stream: OutputStream,
        /// Elapsed time since `JobStart`, for monotonic ordering.
        timestamp: Duration,
        /// The line's text, without its trailing newline.
        text: String,
    },
    /// A command's child process exited.
    CommandEnd {
        /// The child's exit code.
        exit_code: i32,
    },
}

/// Consumer of the executor's event stream.
///
/// Implement this to render a job run (banners, indentation, summaries);
/// the engine depends only on this interface (spec §6).
pub trait LogSink: Send + Sync {
    /// Receive one event. Must not block the executor for long: events are
    /// emitted synchronously on the command-sequencing thread.
    fn emit(&self, event: &LogEvent);
}

/// A minimal [`LogSink`] that forwards every event to `tracing`.
///
/// This is the engine's only built-in sink; it exists so the crate is
/// directly usable without a dedicated front end, not as the intended
/// rendering surface.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        match event {
            LogEvent::JobStart { name } => tracing::info!(job = %name, "job start"),
            LogEvent::JobEnd { status } => match status {
                JobOutcome::Success => tracing::info!("job end: success"),
                JobOutcome::Failed { index, name, code } => {
                    tracing::error!(index, name = %name, code, "job end: command failed");
                }
                JobOutcome::Interrupted => tracing::warn!("job end: interrupted"),
            },
            LogEvent::TasksDiscovered { names } => {
                let joined = names.join(", ");
                tracing::debug!(count = names.len(), tasks = %joined, "tasks discovered");
            }
            LogEvent::CommandStart { snapshot } => tracing::info!(
                index = snapshot.index,
                total = snapshot.total,
                name = snapshot.name.as_deref().unwrap_or("-"),
                task = %snapshot.task,
                "command start"
            ),
            LogEvent::CommandSkipped { index, name } => {
                tracing::info!(index, name = %name, "command skipped");
            }
            LogEvent::OutputLine { stream, timestamp, text } => {
                let stream_name = match stream {
                    OutputStream::Stdout => "stdout",
                    OutputStream::Stderr => "stderr",
                };
                let elapsed_ms = timestamp.as_millis();
                tracing::debug!(stream = stream_name, %elapsed_ms, "{text}");
            }
            LogEvent::CommandEnd { exit_code } => tracing::info!(exit_code, "command end"),
        }
    }
}
