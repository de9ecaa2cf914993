use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use bw_store::SnapshotStore;
use bw_types::{ChangeEvent, ObjectRecord, WatchTarget};
use bw_watch::{CycleOutcome, LoopExit, LoopReport, Supervisor, WatchLoop};
use colored::Colorize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{
    CheckArgs, Cli, Command, ForgetArgs, OnceArgs, OutputFormat, SnapshotArgs, StatArgs, WatchArgs,
};
use crate::config::WatcherFile;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        config,
        format,
        ..
    } = cli;

    match command {
        Command::Watch(args) => runtime()?.block_on(cmd_watch(&config, args, format)),
        Command::Once(args) => runtime()?.block_on(cmd_once(&config, args, format)),
        Command::Snapshot(args) => cmd_snapshot(&config, args, format),
        Command::Stat(args) => runtime()?.block_on(cmd_stat(&config, args, format)),
        Command::Forget(args) => cmd_forget(&config, args, format),
        Command::Check(args) => cmd_check(&config, args, format),
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")
}

fn load_valid(path: &Path) -> anyhow::Result<WatcherFile> {
    let file = WatcherFile::load(path)?;
    file.validate()?;
    Ok(file)
}

/// Loops built from the configuration, plus the task printing events when
/// the stdout sink is configured. The printer ends once every loop is gone.
struct Watchers {
    supervisor: Supervisor,
    printer: Option<JoinHandle<()>>,
}

impl Watchers {
    async fn finish_printing(printer: Option<JoinHandle<()>>) {
        if let Some(printer) = printer {
            if let Err(err) = printer.await {
                warn!(error = %err, "event printer failed");
            }
        }
    }
}

/// Build one loop per configured target, all sharing one source, sink, and
/// store. Must be called inside the runtime when the stdout sink is used.
fn build_supervisor(
    file: &WatcherFile,
    cancel: CancellationToken,
    poll_interval: Option<u64>,
    emit_initial: bool,
) -> anyhow::Result<Watchers> {
    let specs = file.watch_specs(poll_interval);
    for spec in &specs {
        spec.config
            .validate()
            .with_context(|| format!("target {}", spec.target))?;
    }

    let source = file.build_source()?;
    let built = file.build_sink()?;
    let sink = built.sink;
    let store: Arc<dyn SnapshotStore> = Arc::new(file.open_store()?);

    let mut supervisor = Supervisor::new(cancel);
    for spec in specs {
        let mut config = spec.config;
        config.emit_initial |= emit_initial;
        let watch = WatchLoop::new(
            spec.target,
            config.lister(source.clone(), spec.filter),
            store.clone(),
            config.notifier(sink.clone()),
            config,
            supervisor.child_token(),
        );
        supervisor.add(watch);
    }

    let printer = built.events.map(|events| tokio::spawn(print_events(events)));
    Ok(Watchers { supervisor, printer })
}

async fn print_events(mut events: mpsc::Receiver<ChangeEvent>) {
    while let Some(event) = events.recv().await {
        match event.to_json() {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(key = %event.key, error = %err, "cannot serialize change event"),
        }
    }
}

/// Loops that stopped for any reason other than shutdown.
fn failed_loops(reports: &[LoopReport]) -> usize {
    reports.iter().filter(|r| r.exit.is_failure()).count()
}

/// Targets whose cycle halted or panicked.
fn failed_cycles(outcomes: &[(WatchTarget, CycleOutcome)]) -> usize {
    outcomes
        .iter()
        .filter(|(_, o)| matches!(o, CycleOutcome::Halted { .. } | CycleOutcome::Panicked { .. }))
        .count()
}

async fn cmd_watch(path: &Path, args: WatchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = load_valid(path)?;
    let cancel = CancellationToken::new();
    let Watchers { supervisor, printer } =
        build_supervisor(&file, cancel.clone(), args.poll_interval, false)?;

    if format == OutputFormat::Text {
        println!(
            "{} Watching {} target(s), state in {}",
            "▶".green().bold(),
            supervisor.len(),
            file.state_dir.display().to_string().bold()
        );
    }

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        shutdown.cancel();
    });

    let reports = supervisor.run().await;
    Watchers::finish_printing(printer).await;
    print_exits(&reports, format)?;

    let failed = failed_loops(&reports);
    if failed > 0 {
        bail!("{failed} target(s) stopped on fatal errors or panics");
    }
    Ok(())
}

async fn cmd_once(path: &Path, args: OnceArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = load_valid(path)?;
    let Watchers { supervisor, printer } =
        build_supervisor(&file, CancellationToken::new(), None, args.emit_initial)?;
    let outcomes = supervisor.run_once().await;
    Watchers::finish_printing(printer).await;
    print_outcomes(&outcomes, format)?;

    let failed = failed_cycles(&outcomes);
    if failed > 0 {
        bail!("{failed} target(s) failed with fatal errors or panics");
    }
    Ok(())
}

fn cmd_snapshot(path: &Path, args: SnapshotArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = WatcherFile::load(path)?;
    let store = file.open_store()?;
    let target = WatchTarget::new(args.bucket, args.prefix);
    let snapshot = store
        .load(&target)
        .with_context(|| format!("loading snapshot for {target}"))?;

    let Some(snapshot) = snapshot else {
        match format {
            OutputFormat::Text => println!("No snapshot stored for {}.", target.to_string().yellow()),
            OutputFormat::Json => println!("null"),
        }
        return Ok(());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => {
            println!(
                "{} {}  captured {}",
                "Snapshot".bold(),
                target.to_string().yellow().bold(),
                snapshot.captured_at().to_rfc3339().dimmed()
            );
            println!(
                "  {} object(s), {} byte(s)",
                snapshot.len().to_string().bold(),
                snapshot.total_bytes()
            );
            for record in snapshot.records() {
                println!(
                    "  {:>12}  {}  {}",
                    record.size,
                    record.content_hash.dimmed(),
                    record.key
                );
            }
        }
    }
    Ok(())
}

/// The object as the configured target's lister would record it.
async fn stat(file: &WatcherFile, bucket: &str, key: &str) -> anyhow::Result<Option<ObjectRecord>> {
    let target = file
        .target_for(bucket, key)
        .with_context(|| format!("no configured target covers {bucket}/{key}"))?;
    let lister = file.defaults.lister(file.build_source()?, target.filter());
    Ok(lister.head(&target.target(), key).await?)
}

async fn cmd_stat(path: &Path, args: StatArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = load_valid(path)?;
    let record = stat(&file, &args.bucket, &args.key).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => match &record {
            Some(record) => {
                println!("{} {}", "key".cyan(), record.key.bold());
                println!("  size           {}", record.size);
                println!("  content hash   {}", record.content_hash);
                println!("  last modified  {}", record.last_modified.to_rfc3339());
            }
            None => println!(
                "{} {}/{} is absent or filtered out",
                "!".yellow().bold(),
                args.bucket,
                args.key
            ),
        },
    }
    Ok(())
}

fn cmd_forget(path: &Path, args: ForgetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = WatcherFile::load(path)?;
    let store = file.open_store()?;
    let target = WatchTarget::new(args.bucket, args.prefix);
    let removed = store
        .remove(&target)
        .with_context(|| format!("forgetting snapshot for {target}"))?;

    match format {
        OutputFormat::Json => println!("{}", json!({ "target": target, "removed": removed })),
        OutputFormat::Text if removed => println!(
            "{} Forgot {}; the next cycle re-baselines.",
            "✓".green().bold(),
            target.to_string().bold()
        ),
        OutputFormat::Text => println!("No snapshot stored for {}.", target.to_string().yellow()),
    }
    Ok(())
}

fn cmd_check(path: &Path, _args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = WatcherFile::load(path)?;
    let problems = file.problems();

    match format {
        OutputFormat::Json => {
            let report = json!({
                "valid": problems.is_empty(),
                "problems": &problems,
                "targets": file.targets.iter().map(|t| t.target().to_string()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for target in &file.targets {
                println!("  {} {}", "target".cyan(), target.target());
            }
            if problems.is_empty() {
                println!("{} Configuration is valid.", "✓".green().bold());
            } else {
                for problem in &problems {
                    println!("  {} {}", "✗".red(), problem);
                }
            }
        }
    }

    if !problems.is_empty() {
        bail!("{} configuration problem(s) in {}", problems.len(), path.display());
    }
    Ok(())
}

fn print_outcomes(outcomes: &[(WatchTarget, CycleOutcome)], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = outcomes
                .iter()
                .map(|(target, outcome)| {
                    json!({
                        "target": target,
                        "outcome": outcome.label(),
                        "committed": outcome.committed(),
                        "detail": outcome.to_string(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for (target, outcome) in outcomes {
                let mark = match outcome {
                    CycleOutcome::Halted { .. } | CycleOutcome::Panicked { .. } => "✗".red().bold(),
                    CycleOutcome::Skipped { .. } | CycleOutcome::TimedOut { .. } => "!".yellow().bold(),
                    _ => "✓".green().bold(),
                };
                println!("{mark} {}: {outcome}", target.to_string().bold());
            }
        }
    }
    Ok(())
}

fn print_exits(reports: &[LoopReport], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = reports
                .iter()
                .map(|r| match &r.exit {
                    LoopExit::Cancelled => json!({ "target": r.target, "exit": "cancelled" }),
                    LoopExit::Halted(err) => {
                        json!({ "target": r.target, "exit": "halted", "error": err.to_string() })
                    }
                    LoopExit::Panicked(reason) => {
                        json!({ "target": r.target, "exit": "panicked", "error": reason })
                    }
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for report in reports {
                match &report.exit {
                    LoopExit::Cancelled => {
                        println!("{} {} stopped", "■".dimmed(), report.target.to_string().bold())
                    }
                    LoopExit::Halted(err) => println!(
                        "{} {} halted: {}",
                        "✗".red().bold(),
                        report.target.to_string().bold(),
                        err
                    ),
                    LoopExit::Panicked(reason) => println!(
                        "{} {} panicked: {}",
                        "✗".red().bold(),
                        report.target.to_string().bold(),
                        reason
                    ),
                }
            }
        }
    }
    Ok(())
}

/// Resolve on SIGINT or, on Unix, SIGTERM.
async fn wait_for_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
