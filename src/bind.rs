//! The command binder (spec §4.4): validates every command's task reference
//! and env-key agreement before any command is spawned.
use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::manifest::{BoundCommand, Job};
use crate::registry::Registry;

/// A job whose commands have all been validated against the registry and
/// carry a resolved [`crate::manifest::Task`] reference.
///
/// Produced once, up front, for every command regardless of `skip` (spec §9
/// open question (b)): binding is a static check, not a runtime gate.
#[derive(Debug)]
pub struct BoundJob<'job> {
    /// The original job, unchanged.
    pub job: &'job Job,
    /// Bound commands, in declared order.
    pub commands: Vec<BoundCommand<'job>>,
}

/// Validate and bind every command in `job` against `registry`.
///
/// # Errors
///
/// Returns [`EngineError::UnknownTask`] if a command names a task the
/// registry does not contain, or [`EngineError::MissingEnv`] /
/// [`EngineError::UnexpectedEnv`] if a command's env keys do not exactly
/// match its task's declared keys.
pub fn bind<'job>(job: &'job Job, registry: &Registry) -> Result<BoundJob<'job>, EngineError> {
    let mut bound = Vec::with_capacity(job.commands.len());

    for (index, command) in job.commands.iter().enumerate() {
        let label = command.label(index);
        let task = registry.get(&command.task).ok_or_else(|| EngineError::UnknownTask {
            command: label.clone(),
            task: command.task.clone(),
            available: registry.names_joined(),
        })?;

        let declared: BTreeSet<&str> = task.env_keys().into_iter().collect();
        let supplied: BTreeSet<&str> = command.env.keys().map(String::as_str).collect();

        let missing: Vec<&str> = declared.difference(&supplied).copied().collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingEnv {
                command: label.clone(),
                task: task.name.clone(),
                keys: missing.join(", "),
            });
        }

        let unexpected: Vec<&str> = supplied.difference(&declared).copied().collect();
        if !unexpected.is_empty() {
            return Err(EngineError::UnexpectedEnv {
                command: label,
                task: task.name.clone(),
                keys: unexpected.join(", "),
            });
        }

        bound.push(BoundCommand { command, index, task });
    }

    Ok(BoundJob { job, commands: bound })
}
