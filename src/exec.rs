//! The command executor (spec §4.5): resolves each command's env, spawns its
//! child, streams output, and halts the run on the first non-zero exit.
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use crate::bind::BoundJob;
use crate::error::EngineError;
use crate::log::{CommandSnapshot, JobOutcome, LogEvent, LogSink, OutputStream};
use crate::manifest::{Job, Run, Task};
use crate::resolve::{CommandRecord, Scope};
use crate::signal::Interrupt;
use crate::tmp::TmpAllocator;

/// Run every command in `bound`, in order, halting at the first non-zero
/// exit or interrupt.
///
/// # Errors
///
/// Returns [`EngineError::CommandFailed`] if a child exits non-zero,
/// [`EngineError::EngineInterrupted`] if a termination signal arrived mid-run,
/// or a placeholder/spawn error encountered while preparing a command.
pub fn execute(
    bound: &BoundJob<'_>,
    sink: &dyn LogSink,
    interrupt: &Interrupt,
    run_root: &Path,
) -> Result<(), EngineError> {
    let job = bound.job;
    let total = bound.commands.len();
    let start = Instant::now();

    sink.emit(&LogEvent::JobStart { name: job.name.clone() });

    let mut previous: Option<CommandRecord> = None;
    let mut named: BTreeMap<String, CommandRecord> = BTreeMap::new();

    for bound_cmd in &bound.commands {
        let command = bound_cmd.command;
        if command.skip {
            sink.emit(&LogEvent::CommandSkipped {
                index: bound_cmd.index,
                name: command.label(bound_cmd.index),
            });
            continue;
        }

        let result = run_one(
            job,
            &bound_cmd.task,
            command,
            bound_cmd.index,
            total,
            previous.as_ref(),
            &named,
            sink,
            interrupt,
            run_root,
            start,
        );

        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let outcome = outcome_for(&err, bound_cmd.index, command.label(bound_cmd.index));
                sink.emit(&LogEvent::JobEnd { status: outcome });
                return Err(err);
            }
        };

        if let Some(name) = &command.name {
            named.insert(name.clone(), record.clone());
        }
        previous = Some(record);
    }

    sink.emit(&LogEvent::JobEnd { status: JobOutcome::Success });
    Ok(())
}

fn outcome_for(err: &EngineError, index: usize, label: String) -> JobOutcome {
    match err {
        EngineError::CommandFailed { code, .. } => JobOutcome::Failed {
            index,
            name: label,
            code: *code,
        },
        EngineError::EngineInterrupted { .. } => JobOutcome::Interrupted,
        _ => JobOutcome::Failed {
            index,
            name: label,
            code: -1,
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn run_one(
    job: &Job,
    task: &Task,
    command: &crate::manifest::Command,
    index: usize,
    total: usize,
    previous: Option<&CommandRecord>,
    named: &BTreeMap<String, CommandRecord>,
    sink: &dyn LogSink,
    interrupt: &Interrupt,
    run_root: &Path,
    start: Instant,
) -> Result<CommandRecord, EngineError> {
    let tmp = TmpAllocator::new(run_root)?;
    let scope = Scope::new(job, previous, named, &tmp);

    let mut resolved_env = BTreeMap::new();
    for (key, value) in &command.env {
        resolved_env.insert(key.clone(), scope.resolve(value)?);
    }

    sink.emit(&LogEvent::CommandStart {
        snapshot: CommandSnapshot {
            index,
            total,
            name: command.name.clone(),
            task: task.name.clone(),
            env: resolved_env.clone(),
        },
    });

    let mut child = spawn(task, job, &resolved_env)?;
    let pid = child.id();
    interrupt.track(Some(pid));

    // SAFETY net for the borrow checker, not memory: stdout/stderr are only
    // `Some` immediately after spawn, since we always request piped streams.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let status = std::thread::scope(|scope| {
        if let Some(stdout) = stdout {
            scope.spawn(move || drain(stdout, OutputStream::Stdout, sink, start));
        }
        if let Some(stderr) = stderr {
            scope.spawn(move || drain(stderr, OutputStream::Stderr, sink, start));
        }
        child.wait()
    })?;

    interrupt.track(None);

    if interrupt.is_interrupted() {
        return Err(EngineError::EngineInterrupted { signal: 15 });
    }

    let exit_code = status.code().unwrap_or(-1);
    sink.emit(&LogEvent::CommandEnd { exit_code });

    let record = CommandRecord {
        name: command.name.clone(),
        task: task.name.clone(),
        env: resolved_env,
        returncode: exit_code,
    };

    if exit_code != 0 {
        return Err(EngineError::CommandFailed {
            index,
            name: command.label(index),
            code: exit_code,
        });
    }

    Ok(record)
}

fn spawn(task: &Task, job: &Job, env: &BTreeMap<String, String>) -> Result<Child, EngineError> {
    let mut cmd = match &task.run {
        Run::Inline { interpreter, script } => {
            let words = shlex::split(interpreter).ok_or_else(|| EngineError::SchemaViolation {
                path: task.path.join("manifest.yml").display().to_string(),
                field: "run.interpreter".to_string(),
                message: format!("could not tokenise interpreter command line: {interpreter}"),
            })?;
            let (program, args) = words.split_first().ok_or_else(|| EngineError::SchemaViolation {
                path: task.path.join("manifest.yml").display().to_string(),
                field: "run.interpreter".to_string(),
                message: "interpreter must not be empty".to_string(),
            })?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd.arg(script);
            cmd
        }
        Run::Command { command } => {
            let mut cmd = shell_command();
            cmd.arg(shell_flag()).arg(command);
            cmd
        }
    };

    cmd.current_dir(&job.data);
    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    cmd.spawn().map_err(EngineError::from)
}

#[cfg(unix)]
fn shell_command() -> Command {
    Command::new("/bin/sh")
}

#[cfg(unix)]
fn shell_flag() -> &'static str {
    "-c"
}

#[cfg(windows)]
fn shell_command() -> Command {
    Command::new("cmd")
}

#[cfg(windows)]
fn shell_flag() -> &'static str {
    "/C"
}

/// Forward every line from `pipe` to `sink` as it arrives, tagged with the
/// elapsed time since the job started and which stream it came from.
fn drain<R: Read>(pipe: R, stream: OutputStream, sink: &dyn LogSink, start: Instant) {
    let reader = BufReader::new(pipe);
    for line in reader.lines() {
        let Ok(text) = line else { break };
        sink.emit(&LogEvent::OutputLine {
            stream,
            timestamp: start.elapsed(),
            text,
        });
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bind::bind;
    use crate::log::TracingSink;
    use crate::manifest::Command;
    use crate::registry::Registry;
    use std::path::PathBuf;

    fn write_task(dir: &Path, name: &str, env_keys: &[&str], run_yaml: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let env_lines: String = env_keys.iter().map(|k| format!("  {k}: desc\n")).collect();
        std::fs::write(
            dir.join("manifest.yml"),
            format!("name: {name}\nenv:\n{env_lines}run:\n{run_yaml}"),
        )
        .unwrap();
    }

    fn job_with(data: PathBuf, tasks: Vec<PathBuf>, commands: Vec<Command>) -> Job {
        Job {
            name: "demo".to_string(),
            description: None,
            data,
            tasks,
            env: BTreeMap::new(),
            commands,
        }
    }

    fn command(name: Option<&str>, task: &str, env: &[(&str, &str)], skip: bool) -> Command {
        Command {
            name: name.map(str::to_string),
            description: None,
            task: task.to_string(),
            env: env.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
            skip,
        }
    }

    #[test]
    fn sequential_propagation_through_previous() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("a"), "producer", &["OUT"], "  command: \"echo hi\"\n");
        write_task(&root.path().join("b"), "consumer", &["IN"], "  command: \"echo hi\"\n");
        let registry = Registry::discover(&[root.path().to_path_buf()]).unwrap();

        let data_dir = tempfile::tempdir().unwrap();
        let job = job_with(
            data_dir.path().to_path_buf(),
            vec![root.path().to_path_buf()],
            vec![
                command(Some("fetch"), "producer", &[("OUT", "/tmp/a.txt")], false),
                command(None, "consumer", &[("IN", "${previous.env.OUT}")], false),
            ],
        );
        let bound = bind(&job, &registry).unwrap();
        let run_root = tempfile::tempdir().unwrap();
        let interrupt = Interrupt::disarmed();
        let sink = TracingSink;
        execute(&bound, &sink, &interrupt, run_root.path()).unwrap();
    }

    #[test]
    fn skip_leaves_previous_unset_for_placeholder_resolution() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("a"), "noop", &[], "  command: \"true\"\n");
        write_task(&root.path().join("b"), "wants_previous", &["IN"], "  command: \"true\"\n");
        let registry = Registry::discover(&[root.path().to_path_buf()]).unwrap();

        let data_dir = tempfile::tempdir().unwrap();
        let job = job_with(
            data_dir.path().to_path_buf(),
            vec![root.path().to_path_buf()],
            vec![
                command(None, "noop", &[], true),
                command(None, "wants_previous", &[("IN", "${previous.env.OUT}")], false),
            ],
        );
        let bound = bind(&job, &registry).unwrap();
        let run_root = tempfile::tempdir().unwrap();
        let interrupt = Interrupt::disarmed();
        let sink = TracingSink;
        let err = execute(&bound, &sink, &interrupt, run_root.path()).unwrap_err();
        assert!(matches!(err, EngineError::PlaceholderReferenceError { .. }));
    }

    #[test]
    fn nonzero_exit_halts_and_reports_command_failed() {
        let root = tempfile::tempdir().unwrap();
        write_task(&root.path().join("a"), "boom", &[], "  command: \"exit 2\"\n");
        write_task(&root.path().join("b"), "never", &[], "  command: \"true\"\n");
        let registry = Registry::discover(&[root.path().to_path_buf()]).unwrap();

        let data_dir = tempfile::tempdir().unwrap();
        let job = job_with(
            data_dir.path().to_path_buf(),
            vec![root.path().to_path_buf()],
            vec![command(None, "boom", &[], false), command(None, "never", &[], false)],
        );
        let bound = bind(&job, &registry).unwrap();
        let run_root = tempfile::tempdir().unwrap();
        let interrupt = Interrupt::disarmed();
        let sink = TracingSink;
        let err = execute(&bound, &sink, &interrupt, run_root.path()).unwrap_err();
        assert!(matches!(err, EngineError::CommandFailed { index: 0, code: 2, .. }));
    }
}
