//! The `${...}` placeholder expression language (spec §4.3).
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::manifest::Job;
use crate::tmp::TmpAllocator;

/// The resolved outcome of one already-executed command, published for
/// later placeholder references (`previous`, `commands.<name>`).
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// The command's `name`, if it had one.
    pub name: Option<String>,
    /// The task the command invoked.
    pub task: String,
    /// The resolved (literal) env values the command was spawned with.
    pub env: BTreeMap<String, String>,
    /// The child's exit code.
    pub returncode: i32,
}

/// The scope a placeholder expression is resolved against: the static job,
/// the most recently completed command, all named completed commands, the
/// host environment, and this command's lazy tmp allocator.
pub struct Scope<'a> {
    job: &'a Job,
    previous: Option<&'a CommandRecord>,
    named: &'a BTreeMap<String, CommandRecord>,
    tmp: &'a TmpAllocator,
}

impl<'a> Scope<'a> {
    /// Build a scope for resolving the env of the command about to run.
    #[must_use]
    pub const fn new(
        job: &'a Job,
        previous: Option<&'a CommandRecord>,
        named: &'a BTreeMap<String, CommandRecord>,
        tmp: &'a TmpAllocator,
    ) -> Self {
        Self {
            job,
            previous,
            named,
            tmp,
        }
    }

    /// Resolve every `${...}` occurrence in `input`, returning the literal string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PlaceholderSyntaxError`] for malformed
    /// expressions, or [`EngineError::PlaceholderReferenceError`] when an
    /// expression names an unknown scope, key, or unexecuted command.
    pub fn resolve(&self, input: &str) -> Result<String, EngineError> {
        let mut out = String::with_capacity(input.len());
        let bytes = input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'$' {
                let start = i;
                while i < bytes.len() && bytes[i] != b'$' {
                    i += 1;
                }
                out.push_str(&input[start..i]);
                continue;
            }

            // At a '$'.
            if bytes.get(i + 1) == Some(&b'$') {
                out.push('$');
                i += 2;
                continue;
            }
            if bytes.get(i + 1) != Some(&b'{') {
                return Err(EngineError::PlaceholderSyntaxError {
                    value: input.to_string(),
                    offset: i,
                    message: "'$' must be followed by '{' or another '$'".to_string(),
                });
            }

            let expr_start = i + 2;
            let Some(rel_close) = input[expr_start..].find('}') else {
                return Err(EngineError::PlaceholderSyntaxError {
                    value: input.to_string(),
                    offset: i,
                    message: "unclosed '${'".to_string(),
                });
            };
            let expr_end = expr_start + rel_close;
            let expr = input[expr_start..expr_end].trim();
            if expr.is_empty() {
                return Err(EngineError::PlaceholderSyntaxError {
                    value: input.to_string(),
                    offset: i,
                    message: "empty placeholder expression".to_string(),
                });
            }

            let segments = split_segments(expr, input, i)?;
            out.push_str(&self.lookup(&segments, expr)?);
            i = expr_end + 1;
        }
        Ok(out)
    }

    fn lookup(&self, segments: &[&str], expr: &str) -> Result<String, EngineError> {
        match segments {
            ["job", "name"] => Ok(self.job.name.clone()),
            ["job", "description"] => Ok(self.job.description.clone().unwrap_or_default()),
            ["job", "data"] => Ok(self.job.data.display().to_string()),
            ["job", "env", key] => self.job.env.get(*key).cloned().ok_or_else(|| {
                reference_error(expr, format!("job.env has no key '{key}'"))
            }),
            ["job", ..] => Err(reference_error(
                expr,
                "job scope only exposes name, description, data, env.<KEY>".to_string(),
            )),
            ["previous", rest @ ..] => {
                let record = self
                    .previous
                    .ok_or_else(|| reference_error(expr, "no command has executed yet".to_string()))?;
                lookup_record(record, rest, expr)
            }
            ["commands", name, rest @ ..] => {
                let record = self.named.get(*name).ok_or_else(|| {
                    reference_error(expr, format!("command '{name}' has not executed yet"))
                })?;
                lookup_record(record, rest, expr)
            }
            ["env", key] => std::env::var(key)
                .map_err(|_| reference_error(expr, format!("env has no key '{key}'"))),
            ["tmp", name] => self.tmp.get(name).map(|p| p.display().to_string()),
            _ => Err(reference_error(
                expr,
                "unknown scope; expected job, previous, commands, env, or tmp".to_string(),
            )),
        }
    }
}

fn lookup_record(
    record: &CommandRecord,
    rest: &[&str],
    expr: &str,
) -> Result<String, EngineError> {
    match rest {
        ["name"] => record
            .name
            .clone()
            .ok_or_else(|| reference_error(expr, "command has no name".to_string())),
        ["task"] => Ok(record.task.clone()),
        ["returncode"] => Ok(record.returncode.to_string()),
        ["env", key] => record
            .env
            .get(*key)
            .cloned()
            .ok_or_else(|| reference_error(expr, format!("command env has no key '{key}'"))),
        _ => Err(reference_error(
            expr,
            "command scope only exposes name, task, returncode, env.<KEY>".to_string(),
        )),
    }
}

fn reference_error(expr: &str, message: String) -> EngineError {
    EngineError::PlaceholderReferenceError {
        expr: expr.to_string(),
        message,
    }
}

fn split_segments<'e>(
    expr: &'e str,
    whole: &str,
    offset: usize,
) -> Result<Vec<&'e str>, EngineError> {
    let segments: Vec<&str> = expr.split('.').collect();
    for segment in &segments {
        if segment.is_empty() || !is_valid_segment(segment) {
            return Err(EngineError::PlaceholderSyntaxError {
                value: whole.to_string(),
                offset,
                message: format!("invalid path segment '{segment}'"),
            });
        }
    }
    Ok(segments)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
