//! Quarky-RS - Command Line Runner
//!
//! Runs experiments without the GUI:
//!
//! ```bash
//! quarky-rs list
//! quarky-rs run DampOsc --set gamma=0.3 --sets 20
//! quarky-rs run experiments/spectroscopy.rhai --no-save
//! quarky-rs show ~/.local/share/quarky-rs/data/Cos/Cos_2024_03_07/Cos_2024_03_07_09_05_01_data.json
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use quarky_rs::{
    backend::{ExperimentBackend, RunEvent, RunOutcome, StopHandle},
    config::Settings,
    experiment::ExperimentRegistry,
    logging::init_logging,
    sinks::{DatasetFile, DatasetWriter, EventBus, SinkRunner, TraceRenderer},
};
use std::future::Future;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quarky-rs")]
#[command(about = "Live acquisition and averaging for RFSoC experiments", long_about = None)]
struct Cli {
    /// Runner settings file (defaults to ./quarky.toml when present)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available experiments and their parameters
    List,

    /// Run an experiment by name, or a .rhai experiment script
    Run(RunArgs),

    /// Print the contents of a saved dataset
    Show {
        /// Dataset file
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Experiment name or path to a .rhai script
    experiment: String,

    /// Override a parameter, e.g. --set alpha=2.5 (repeatable)
    #[arg(long = "set", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,

    /// JSON config file layered over the experiment template
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of sets to acquire
    #[arg(long)]
    sets: Option<u32>,

    /// Repetitions per set (progress display only)
    #[arg(long)]
    reps: Option<u32>,

    /// Write the final run configuration to this file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Do not write datasets
    #[arg(long)]
    no_save: bool,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.settings.as_deref())?;
    let _log_guard = init_logging(&settings.logging)?;

    match cli.command {
        Commands::List => list_experiments(),
        Commands::Run(args) => run_experiment(args, &settings),
        Commands::Show { path } => show_dataset(path),
    }
}

fn list_experiments() -> Result<()> {
    let registry = ExperimentRegistry::with_builtins();
    for experiment in registry.iter() {
        println!("{:<12} {}", experiment.name(), experiment.description());
        for (key, value) in experiment.config_template() {
            println!("    {:<12} = {}", key, value);
        }
    }
    Ok(())
}

fn run_experiment(args: RunArgs, settings: &Settings) -> Result<()> {
    let mut registry = ExperimentRegistry::with_builtins();
    let name = if args.experiment.ends_with(".rhai") {
        registry.load_script(&args.experiment)?
    } else {
        args.experiment.clone()
    };
    let experiment = registry.get(&name)?;

    let mut builder = experiment.config_builder()?;
    if let Some(path) = &args.config {
        builder = builder.layer_file(path)?;
    }
    for (key, value) in &args.overrides {
        builder.set_from_str(key, value)?;
    }
    if let Some(sets) = args.sets {
        builder = builder.sets(sets);
    }
    if let Some(reps) = args.reps {
        builder = builder.reps(reps);
    }
    let config = builder.build()?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
    }

    let hardware = experiment.instantiate(&config)?;
    let mut backend = ExperimentBackend::new(settings.event_capacity);
    let run = backend.start(hardware, config.clone())?;
    install_ctrl_c_handler(run.stop_handle());

    let mut bus = EventBus::new(settings.event_capacity);
    let sink_events = bus.subscribe();
    let console = bus.subscribe();
    let bus_thread = bus.forward(run.events().clone())?;

    let mut sinks = SinkRunner::new(config)
        .with_renderer(Box::new(TraceRenderer::new()))
        .save_every(settings.save_every);
    if !args.no_save {
        sinks = sinks.with_persistence(Box::new(DatasetWriter::new(
            &settings.data_root,
            name.as_str(),
            settings.dataset_prefix.as_str(),
        )));
    }
    let sink_thread = sinks.spawn(sink_events)?;

    for event in console.iter() {
        match event {
            RunEvent::Progress(progress) => tracing::info!("{}: {}", name, progress),
            RunEvent::Error(e) => tracing::error!("{}: {}", name, e),
            RunEvent::Finished(_) => break,
            RunEvent::DataUpdated(_) => {}
        }
    }

    let summary = run.join()?;
    bus_thread
        .join()
        .map_err(|_| anyhow!("Event bus thread panicked"))?;
    let report = sink_thread
        .join()
        .map_err(|_| anyhow!("Sink thread panicked"))?;

    println!(
        "{} {}: {}/{} sets, {:.1} ms per set",
        name,
        summary.outcome.label(),
        summary.sets_completed,
        summary.sets_scheduled,
        summary.stats.avg_time_us() / 1000.0
    );
    if let Some(path) = report.last_saved() {
        println!("Dataset: {}", path.display());
    }
    if report.save_failures > 0 {
        println!("{} dataset save(s) failed, see log", report.save_failures);
    }

    match summary.outcome {
        RunOutcome::Failed(e) => Err(e).context(format!("Experiment '{}' failed", name)),
        RunOutcome::Completed | RunOutcome::Stopped => Ok(()),
    }
}

/// Request a stop on the first signal; exit on the second
async fn stop_on_signal<S, F>(stop: StopHandle, mut next_signal: S)
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        tracing::warn!("Signal handling unavailable: {}", e);
        return;
    }
    tracing::warn!("Received Ctrl+C, stopping after the current set (again to abort)");
    stop.stop();

    if next_signal().await.is_ok() {
        tracing::warn!("Received second Ctrl+C, aborting");
        std::process::exit(130);
    }
}

fn install_ctrl_c_handler(stop: StopHandle) {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create signal handler runtime: {}", e);
                    return;
                }
            };
            rt.block_on(stop_on_signal(stop, tokio::signal::ctrl_c));
        });
    if let Err(e) = spawned {
        tracing::warn!("Ctrl+C will not stop the run: {}", e);
    }
}

fn show_dataset(path: PathBuf) -> Result<()> {
    let dataset = DatasetFile::load(&path)?;
    println!("Experiment:  {}", dataset.experiment);
    println!("Saved at:    {}", dataset.saved_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Sets:        {}", dataset.sets_incorporated);
    for (name, data) in dataset.data.iter().chain(dataset.axes.iter()) {
        println!("  {:<12} shape {:?}", name, data.shape());
    }
    println!("Config:");
    for (key, value) in &dataset.config {
        println!("  {:<16} = {}", key, value);
    }
    Ok(())
}
