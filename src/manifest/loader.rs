//! Reads YAML documents into [`Job`] and [`Task`] values (spec §4.1).
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::EngineError;

use super::job::{Command, Job};
use super::task::{Run, Task};

/// Load and validate a job manifest from `path`.
///
/// # Errors
///
/// Returns [`EngineError::MalformedManifest`] if the document does not parse,
/// [`EngineError::SchemaViolation`] for unknown/missing/mistyped fields, or
/// [`EngineError::PathError`] if a declared task search path does not exist.
pub fn load_job(path: &Path) -> Result<Job, EngineError> {
    let display_path = path.display().to_string();

    // Canonicalize before deriving `base_dir`: a bare relative manifest name
    // (the ordinary CLI invocation, e.g. `jobrunner job.yml`) has a `parent()`
    // of `""`, which would make `job.data`/`job.tasks` relative instead of the
    // absolute paths the data model requires.
    let canonical_path = std::fs::canonicalize(path).map_err(|e| EngineError::PathError {
        path: display_path.clone(),
        reason: format!("could not resolve manifest path: {e}"),
    })?;
    let base_dir = manifest_base_dir(&canonical_path);

    let contents = std::fs::read_to_string(&canonical_path).map_err(|e| EngineError::PathError {
        path: display_path.clone(),
        reason: format!("could not read manifest: {e}"),
    })?;

    let raw: RawJob = parse_yaml(&contents, &display_path)?;

    if raw.name.trim().is_empty() {
        return Err(EngineError::SchemaViolation {
            path: display_path,
            field: "name".to_string(),
            message: "must be a non-empty string".to_string(),
        });
    }
    if raw.commands.is_empty() {
        return Err(EngineError::SchemaViolation {
            path: display_path,
            field: "commands".to_string(),
            message: "must be a non-empty list".to_string(),
        });
    }

    let data = raw.data.as_ref().map_or_else(
        || base_dir.clone(),
        |p| resolve_path_against(&base_dir, &expand_path(p)),
    );

    let mut tasks = Vec::new();
    for raw_path in raw.tasks.entries() {
        let expanded = resolve_path_against(&base_dir, &expand_path(raw_path));
        if !expanded.is_dir() {
            return Err(EngineError::PathError {
                path: expanded.display().to_string(),
                reason: "is not a directory".to_string(),
            });
        }
        tasks.push(expanded);
    }

    let env = coerce_env_map(raw.env, &display_path, "env")?;

    let mut commands = Vec::with_capacity(raw.commands.len());
    for (i, raw_cmd) in raw.commands.into_iter().enumerate() {
        let field = format!("commands[{i}].env");
        let env = coerce_env_map(raw_cmd.env, &display_path, &field)?;
        commands.push(Command {
            name: raw_cmd.name,
            description: raw_cmd.description,
            task: raw_cmd.task,
            env,
            skip: raw_cmd.skip,
        });
    }

    let mut seen_names = std::collections::HashSet::new();
    for (i, cmd) in commands.iter().enumerate() {
        if let Some(name) = &cmd.name
            && !seen_names.insert(name.clone())
        {
            return Err(EngineError::SchemaViolation {
                path: display_path,
                field: format!("commands[{i}].name"),
                message: format!("duplicate command name '{name}'"),
            });
        }
    }

    Ok(Job {
        name: raw.name,
        description: raw.description,
        data,
        tasks,
        env,
        commands,
    })
}

/// Load and validate a task manifest from the `manifest.yml` file at `path`.
///
/// The task's [`Task::path`] is the parent directory of `path`.
///
/// # Errors
///
/// Returns [`EngineError::MalformedManifest`] if the document does not parse,
/// or [`EngineError::SchemaViolation`] if the schema is violated (missing
/// `name`, or zero/both of the two `run` forms present).
pub fn load_task(path: &Path) -> Result<Task, EngineError> {
    let display_path = path.display().to_string();
    let task_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::PathError {
        path: display_path.clone(),
        reason: format!("could not read manifest: {e}"),
    })?;

    let raw: RawTask = parse_yaml(&contents, &display_path)?;

    if raw.name.trim().is_empty() {
        return Err(EngineError::SchemaViolation {
            path: display_path,
            field: "name".to_string(),
            message: "must be a non-empty string".to_string(),
        });
    }

    let run = match (raw.run.interpreter, raw.run.script, raw.run.command) {
        (Some(interpreter), Some(script), None) => Run::Inline { interpreter, script },
        (None, None, Some(command)) => Run::Command { command },
        (None, None, None) => {
            return Err(EngineError::SchemaViolation {
                path: display_path,
                field: "run".to_string(),
                message: "must set either `interpreter`+`script` or `command`".to_string(),
            });
        }
        _ => {
            return Err(EngineError::SchemaViolation {
                path: display_path,
                field: "run".to_string(),
                message: "must set exactly one of `interpreter`+`script` or `command`, not both"
                    .to_string(),
            });
        }
    };

    let env = coerce_env_map(raw.env, &display_path, "env")?;

    Ok(Task {
        name: raw.name,
        path: task_dir,
        description: raw.description,
        env,
        run,
    })
}

fn manifest_base_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn resolve_path_against(base_dir: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

fn parse_yaml<T: for<'de> Deserialize<'de>>(
    contents: &str,
    display_path: &str,
) -> Result<T, EngineError> {
    serde_yaml::from_str(contents).map_err(|e| classify_yaml_error(&e, display_path))
}

/// `serde_yaml` does not distinguish "syntax error" from "schema mismatch" in
/// its public API; we classify by message content, which is the only signal
/// available, and fall back to `MalformedManifest` for genuine parse errors.
fn classify_yaml_error(err: &serde_yaml::Error, display_path: &str) -> EngineError {
    let message = err.to_string();
    if message.contains("unknown field")
        || message.contains("missing field")
        || message.contains("invalid type")
        || message.contains("duplicate field")
    {
        EngineError::SchemaViolation {
            path: display_path.to_string(),
            field: err
                .location()
                .map_or_else(|| "?".to_string(), |l| format!("line {}", l.line())),
            message,
        }
    } else {
        EngineError::MalformedManifest {
            path: display_path.to_string(),
            message,
        }
    }
}

/// Coerce a raw `env`-shaped map (values may be YAML strings, integers, or
/// booleans) into a `String -> String` map, per the loader's scalar
/// coercion rule (spec §4.1).
fn coerce_env_map(
    raw: BTreeMap<String, serde_yaml::Value>,
    display_path: &str,
    field: &str,
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        let coerced = coerce_scalar(&value).ok_or_else(|| EngineError::SchemaViolation {
            path: display_path.to_string(),
            field: format!("{field}.{key}"),
            message: "env values must be a string, integer, or boolean".to_string(),
        })?;
        out.insert(key, coerced);
    }
    Ok(out)
}

fn coerce_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Expand a leading `~` and any `$VAR`/`${VAR}` references in a path string.
///
/// Unresolvable env references are left verbatim; this is a literal,
/// shell-like expansion for manifest path fields, distinct from the
/// placeholder resolver's `${...}` language (spec §4.3).
fn expand_path(raw: &str) -> PathBuf {
    let home_expanded = if let Some(rest) = raw.strip_prefix('~') {
        home_dir().map_or_else(|| raw.to_string(), |home| format!("{home}{rest}"))
    } else {
        raw.to_string()
    };
    PathBuf::from(expand_env_vars(&home_expanded))
}

fn home_dir() -> Option<String> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = chars.peek().is_some_and(|&(_, nc)| nc == '{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&(_, nc)) = chars.peek() {
            if nc.is_alphanumeric() || nc == '_' {
                name.push(nc);
                chars.next();
            } else {
                break;
            }
        }
        if braced {
            if chars.peek().is_some_and(|&(_, nc)| nc == '}') {
                chars.next();
            } else {
                out.push('$');
                out.push('{');
                out.push_str(&name);
                continue;
            }
        }
        if name.is_empty() {
            out.push('$');
            continue;
        }
        match std::env::var(&name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(&name);
                if braced {
                    out.push('}');
                }
            }
        }
    }
    out
}

/// `data`/`tasks` fields accept either a single scalar path or a list of paths.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PathOrList {
    One(String),
    Many(Vec<String>),
}

impl Default for PathOrList {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl PathOrList {
    fn entries(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJob {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    tasks: PathOrList,
    #[serde(default)]
    env: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    commands: Vec<RawCommand>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommand {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    task: String,
    #[serde(default)]
    env: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    skip: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTask {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, serde_yaml::Value>,
    run: RawRun,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRun {
    #[serde(default)]
    interpreter: Option<String>,
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_minimal_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.yml",
            "name: demo\ncommands:\n  - task: build\n    env: {}\n",
        );
        let job = load_job(&path).unwrap();
        assert_eq!(job.name, "demo");
        assert_eq!(job.commands.len(), 1);
        assert_eq!(job.data, dir.path().canonicalize().unwrap());
        assert!(job.data.is_absolute());
    }

    #[test]
    fn rejects_empty_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "job.yml", "name: demo\ncommands: []\n");
        let err = load_job(&path).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.yml",
            "name: demo\nbogus: true\ncommands:\n  - task: build\n",
        );
        let err = load_job(&path).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn coerces_integer_and_bool_env_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.yml",
            "name: demo\ncommands:\n  - task: build\n    env:\n      RETRIES: 3\n      VERBOSE: true\n",
        );
        let job = load_job(&path).unwrap();
        assert_eq!(job.commands[0].env["RETRIES"], "3");
        assert_eq!(job.commands[0].env["VERBOSE"], "true");
    }

    #[test]
    fn tasks_field_accepts_scalar_or_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("t1")).unwrap();
        let path = write(
            dir.path(),
            "job.yml",
            "name: demo\ntasks: t1\ncommands:\n  - task: build\n",
        );
        let job = load_job(&path).unwrap();
        assert_eq!(job.tasks, vec![dir.path().canonicalize().unwrap().join("t1")]);
    }

    #[test]
    fn missing_task_search_path_is_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.yml",
            "name: demo\ntasks: [nope]\ncommands:\n  - task: build\n",
        );
        let err = load_job(&path).unwrap_err();
        assert!(matches!(err, EngineError::PathError { .. }));
    }

    #[test]
    fn duplicate_command_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "job.yml",
            "name: demo\ncommands:\n  - name: a\n    task: build\n  - name: a\n    task: build\n",
        );
        let err = load_job(&path).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn loads_inline_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "manifest.yml",
            "name: build\nenv:\n  OUT: where to write output\nrun:\n  interpreter: bash -eu\n  script: echo hi\n",
        );
        let task = load_task(&path).unwrap();
        assert_eq!(task.path, dir.path());
        assert_eq!(
            task.run,
            Run::Inline {
                interpreter: "bash -eu".to_string(),
                script: "echo hi".to_string(),
            }
        );
    }

    #[test]
    fn loads_command_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "manifest.yml", "name: build\nrun:\n  command: make\n");
        let task = load_task(&path).unwrap();
        assert_eq!(
            task.run,
            Run::Command {
                command: "make".to_string(),
            }
        );
    }

    #[test]
    fn task_rejects_both_run_forms() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "manifest.yml",
            "name: build\nrun:\n  command: make\n  interpreter: bash\n  script: x\n",
        );
        let err = load_task(&path).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    fn task_rejects_neither_run_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "manifest.yml", "name: build\nrun: {}\n");
        let err = load_task(&path).unwrap_err();
        assert!(matches!(err, EngineError::SchemaViolation { .. }));
    }

    #[test]
    #[allow(unsafe_code)]
    fn expand_path_handles_tilde_and_env_vars() {
        // SAFETY: test runs single-threaded within this process's test harness;
        // no other test reads MY_TEST_VAR.
        unsafe {
            std::env::set_var("MY_TEST_VAR", "value");
        }
        let expanded = expand_env_vars("$MY_TEST_VAR/${MY_TEST_VAR}/literal");
        assert_eq!(expanded, "value/value/literal");
        unsafe {
            std::env::remove_var("MY_TEST_VAR");
        }
    }

    #[test]
    fn expand_env_vars_leaves_unknown_vars_untouched() {
        let expanded = expand_env_vars("$DEFINITELY_NOT_SET_XYZ/rest");
        assert_eq!(expanded, "$DEFINITELY_NOT_SET_XYZ/rest");
    }
}
