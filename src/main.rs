//! `jobrunner` binary entry point: load, discover, bind, then execute.
use clap::Parser;
use jobrunner::bind::bind;
use jobrunner::cli::Cli;
use jobrunner::error::EngineError;
use jobrunner::exec::execute;
use jobrunner::log::{LogEvent, LogSink, TracingSink};
use jobrunner::manifest::load_job;
use jobrunner::registry::Registry;
use jobrunner::signal::Interrupt;

fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(%err, "job run failed");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(args: &Cli) -> Result<(), EngineError> {
    let job = load_job(&args.job)?;
    let registry = Registry::discover(&job.tasks)?;

    let sink = TracingSink;
    sink.emit(&LogEvent::TasksDiscovered {
        names: registry.names().into_iter().map(String::from).collect(),
    });

    let bound = bind(&job, &registry)?;

    if args.dry_run {
        return Ok(());
    }

    let interrupt = Interrupt::install().map_err(|e| EngineError::Io(std::io::Error::other(e.to_string())))?;
    let run_root = tempfile::Builder::new().prefix("jobrunner-").tempdir()?;

    execute(&bound, &sink, &interrupt, run_root.path())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
