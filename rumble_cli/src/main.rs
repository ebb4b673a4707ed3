use clap::Parser;
use easyerr::{Error, ResultExt};
use rumble::{
    Config, Emulator, EmulatorError, Shared,
    core::rom::database::{Database, DatabaseError},
    plugin::PluginSet,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs an N64 ROM headlessly, with null collaborators.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// The ROM image to run.
    rom: PathBuf,
    /// ROM database document (RON) with per-title settings.
    #[arg(long)]
    database: Option<PathBuf>,
    /// Directory where save files are kept.
    #[arg(long)]
    save_dir: Option<PathBuf>,
    /// COUNT increment per retired instruction.
    #[arg(long, default_value_t = 2)]
    count_per_op: u32,
    /// Run as fast as possible instead of at the refresh rate.
    #[arg(long)]
    no_limit: bool,
    /// Report 4MiB of RDRAM instead of 8MiB.
    #[arg(long)]
    disable_extra_mem: bool,
    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
    /// Log filter, in the `RUST_LOG` syntax. Overrides `RUST_LOG`, which defaults to `info`.
    #[arg(long)]
    log: Option<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("couldn't read database {path:?}")]
    DatabaseRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid database")]
    Database { source: DatabaseError },
    #[error("couldn't start the emulator")]
    Emulator { source: EmulatorError },
    #[error("couldn't spawn the emulation thread")]
    Spawn { source: std::io::Error },
}

fn load_database(path: &Path) -> Result<Database, CliError> {
    let text = std::fs::read_to_string(path).context(CliCtx::DatabaseRead {
        path: path.to_owned(),
    })?;
    Database::parse(&text).context(CliCtx::Database)
}

fn run(args: Args) -> Result<(), CliError> {
    let database = args.database.as_deref().map(load_database).transpose()?;

    let config = Config {
        count_per_op: args.count_per_op,
        disable_extra_mem: args.disable_extra_mem,
        limit_fps: !args.no_limit,
        save_dir: args.save_dir.clone(),
        ..Default::default()
    };

    let shared = Arc::new(Shared::new(config.limit_fps));
    let mut emulator = Emulator::open(
        config,
        &args.rom,
        database.as_ref(),
        PluginSet::null(),
        shared.clone(),
    )
    .context(CliCtx::Emulator)?;

    let worker = std::thread::Builder::new()
        .name("emulation thread".to_owned())
        .spawn(move || emulator.run())
        .context(CliCtx::Spawn)?;

    let start = Instant::now();
    let limit = args.seconds.map(Duration::from_secs);
    while !worker.is_finished() {
        std::thread::sleep(Duration::from_secs(1));
        info!("{:.1} VI/s", shared.fps());

        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            info!("time limit reached");
            shared.request_stop();
        }
    }

    if worker.join().is_err() {
        error!("emulation thread panicked");
    }

    info!("finished in state {}", <&'static str>::from(shared.state()));

    Ok(())
}

fn env_filter(log: Option<&str>) -> EnvFilter {
    match log {
        Some(log) => EnvFilter::new(log),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(args.log.as_deref()))
        .init();

    if let Err(e) = run(args) {
        error!("{e}");
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            error!("caused by: {cause}");
            source = cause.source();
        }

        std::process::exit(1);
    }
}
