//! Typed error hierarchy for the orchestration engine.
//!
//! Internal modules (loader, registry, resolver, binder, executor) return
//! [`EngineError`] directly; the CLI boundary maps it to a process exit code
//! (see [`EngineError::exit_code`]). It also converts cleanly into
//! [`anyhow::Error`] via `?` for callers that want to fold it into a wider
//! error chain.

use thiserror::Error;

/// Top-level error type for a single engine run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A manifest document could not be parsed as YAML.
    #[error("malformed manifest {path}: {message}")]
    MalformedManifest {
        /// Path to the manifest file that failed to parse.
        path: String,
        /// Underlying parser message.
        message: String,
    },

    /// A manifest parsed but violated the job/task schema.
    #[error("schema violation in {path} at `{field}`: {message}")]
    SchemaViolation {
        /// Path to the offending manifest file.
        path: String,
        /// Dotted field path within the document (e.g. `commands[1].env`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// A required path did not exist or was not a directory.
    #[error("path error: {path} {reason}")]
    PathError {
        /// The path that failed the check.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// Two task manifests declared the same task name.
    #[error("duplicate task name '{name}': declared at {first} and {second}")]
    DuplicateTaskName {
        /// The name that was declared twice.
        name: String,
        /// Path to the first manifest that declared it.
        first: String,
        /// Path to the second manifest that declared it.
        second: String,
    },

    /// A command named a task absent from the registry.
    #[error("unknown task '{task}' in command {command}; available tasks: {available}")]
    UnknownTask {
        /// The command that named the unknown task (index or name).
        command: String,
        /// The unresolved task name.
        task: String,
        /// Comma-separated list of registered task names.
        available: String,
    },

    /// A command omitted one or more env keys its task declares.
    #[error("command {command} is missing required env keys for task '{task}': {keys}")]
    MissingEnv {
        /// The command that is missing keys (index or name).
        command: String,
        /// The task whose declaration was not satisfied.
        task: String,
        /// Comma-separated list of missing keys.
        keys: String,
    },

    /// A command supplied env keys its task does not declare.
    #[error("command {command} supplies unexpected env keys for task '{task}': {keys}")]
    UnexpectedEnv {
        /// The command that supplied extra keys (index or name).
        command: String,
        /// The task whose declaration was exceeded.
        task: String,
        /// Comma-separated list of unexpected keys.
        keys: String,
    },

    /// A `${...}` expression was malformed.
    #[error("placeholder syntax error in `{value}` at offset {offset}: {message}")]
    PlaceholderSyntaxError {
        /// The full string value containing the offending placeholder.
        value: String,
        /// Byte offset of the error within `value`.
        offset: usize,
        /// Human-readable description of the syntax problem.
        message: String,
    },

    /// A `${...}` expression referenced an unknown scope, key, or a command
    /// that has not (yet, or ever) executed.
    #[error("placeholder reference error in `{expr}`: {message}")]
    PlaceholderReferenceError {
        /// The offending expression, verbatim (without the `${` `}` delimiters).
        expr: String,
        /// Human-readable description of the reference problem.
        message: String,
    },

    /// A spawned command exited with a non-zero status.
    #[error("command {index} ('{name}') failed with exit code {code}")]
    CommandFailed {
        /// Zero-based index of the failing command.
        index: usize,
        /// Display name of the failing command (its `name` field, or its task name).
        name: String,
        /// The child's exit code.
        code: i32,
    },

    /// The engine received a termination signal mid-run.
    #[error("interrupted by signal {signal}")]
    EngineInterrupted {
        /// Numeric signal value that triggered the interruption.
        signal: i32,
    },

    /// Wraps an I/O failure encountered outside the cases above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Process exit code this error should produce at the CLI boundary.
    ///
    /// `CommandFailed` surfaces the child's own exit code (capped at 125, per
    /// the documented external interface); every other kind is an
    /// engine-level failure and exits `1`.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { code, .. } => {
                if *code > 125 { 125 } else { *code }
            }
            _ => 1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_exit_code_passthrough() {
        let e = EngineError::CommandFailed {
            index: 0,
            name: "build".to_string(),
            code: 2,
        };
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn command_failed_exit_code_capped() {
        let e = EngineError::CommandFailed {
            index: 0,
            name: "build".to_string(),
            code: 200,
        };
        assert_eq!(e.exit_code(), 125);
    }

    #[test]
    fn non_command_errors_exit_one() {
        let e = EngineError::UnknownTask {
            command: "1".to_string(),
            task: "frobnicate".to_string(),
            available: "build, test".to_string(),
        };
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn engine_error_converts_to_anyhow() {
        let e = EngineError::EngineInterrupted { signal: 15 };
        let _anyhow_err: anyhow::Error = e.into();
    }

    #[test]
    fn display_messages_name_offending_keys() {
        let e = EngineError::MissingEnv {
            command: "deploy".to_string(),
            task: "ship".to_string(),
            keys: "TARGET".to_string(),
        };
        assert!(e.to_string().contains("TARGET"));
        assert!(e.to_string().contains("ship"));
    }
}
