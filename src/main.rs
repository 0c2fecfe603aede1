//! Binary entrypoint for the slideshow.
//!
//! Plays the viewer role in a terminal: picks the images, drives the engine
//! from keyboard input and renders its events as log lines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use slideshow::config::Configuration;
use slideshow::events::{Progress, SlideChange};
use slideshow::scan::{self, ScanOptions};
use slideshow::tasks::presenter::Presenter;
use slideshow::tasks::{controls, presenter};
use slideshow::{Error, PlaybackEngine, playlist};

#[derive(Debug, Parser)]
#[command(name = "slideshow", version, about = "Timed image slideshow")]
struct Cli {
    /// Path to YAML config file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory to pick images from
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Time per image, e.g. `5s` or `1m 30s`
    #[arg(short = 't', long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Number of images to show
    #[arg(short = 'n', long, value_name = "COUNT")]
    count: Option<usize>,

    /// Deterministic shuffle seed
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("slideshow={level}").parse()?);
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Configuration> {
    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(dir) = &cli.dir {
        cfg.photo_library_path = dir.clone();
    }
    if let Some(duration) = cli.duration {
        cfg.slide_duration = duration;
    }
    if cli.count.is_some() {
        cfg.image_count = cli.count;
    }
    if cli.seed.is_some() {
        cfg.shuffle_seed = cli.seed;
    }
    cfg.validated().context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = load_config(&cli)?;
    debug!("configuration:\n{:#?}", cfg);

    let found = scan::scan_images(&cfg.photo_library_path, &ScanOptions::from(&cfg))
        .with_context(|| format!("scanning {}", cfg.photo_library_path.display()))?;
    info!(count = found.len(), "scanned images");
    let images = playlist::sample(found, cfg.image_count, cfg.shuffle_seed)?;

    let (engine, events) = PlaybackEngine::with_options(images, cfg.engine_options())
        .context("creating playback engine")?;
    let engine = Arc::new(engine);
    let view = Presenter::new(
        engine.playlist().len(),
        SlideChange {
            index: engine.current_index(),
            item: engine.current_item(),
        },
        Progress::reset(engine.slide_duration()),
    );

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    // Keys -> Controls
    let (line_tx, line_rx) = mpsc::channel::<String>(16);
    tokio::task::spawn_blocking(move || controls::read_stdin(line_tx));

    let mut tasks = JoinSet::new();
    tasks.spawn(presenter::run(events, view, cancel.clone()));
    tasks.spawn(controls::run(line_rx, Arc::clone(&engine), cancel.clone()));

    info!("keys: n next, p previous, enter/r pause, g <n> go to, s restart, q stop");
    engine.start().context("starting slideshow")?;

    cancel.cancelled().await;
    match engine.stop() {
        Ok(()) => {}
        // q or a closed event stream got there first
        Err(Error::Stopped) => debug!("engine already stopped"),
        Err(err) => warn!("stopping engine failed: {err}"),
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("task error: {e:?}"),
            Err(e) => error!("join error: {e}"),
        }
    }
    if let Some(engine) = Arc::into_inner(engine) {
        engine.join().await;
    }

    // The stdin reader blocks until the next line; do not wait for it.
    std::process::exit(0);
}
