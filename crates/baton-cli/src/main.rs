use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use baton_core::{
    ChainBuilder, ChainOutcome, CompletionHandle, ExecutionContext, PoolConfig, PoolStats,
    Runtime, RuntimeBuilder, StepResult, Task, WorkItem,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(2);

#[derive(Parser)]
#[command(name = "baton")]
#[command(about = "Transactional task chains on a worker pool", long_about = None)]
struct Cli {
    /// Pool configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of background threads (overrides the config file)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a calling -> worker -> calling chain; the worker step fails for input <= 0
    Demo {
        #[arg(long, default_value = "5", allow_negative_numbers = true)]
        input: i64,
        /// Run the last step on the primary thread instead of the calling context
        #[arg(long)]
        return_to_primary: bool,
    },
    /// Submit many background items and watch the backlog drain
    Stress {
        #[arg(long, default_value = "100")]
        items: usize,
        #[arg(long, default_value = "5")]
        sleep_ms: u64,
    },
    /// Print the effective pool configuration
    Config,
}

#[derive(Debug, Clone, Serialize)]
struct JournalEntry {
    task: &'static str,
    action: &'static str,
    thread: String,
}

type Journal = Arc<Mutex<Vec<JournalEntry>>>;

#[derive(Debug, Serialize)]
struct DemoReport {
    chain: String,
    input: i64,
    outcome: ChainOutcome,
    journal: Vec<JournalEntry>,
    stats: PoolStats,
}

#[derive(Debug, Serialize)]
struct StressReport {
    items: usize,
    executed_once: usize,
    backlog_samples: Vec<usize>,
    backlog_never_grew: bool,
    elapsed_ms: u128,
    stats: PoolStats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let builder = runtime_builder(&cli)?;

    match cli.command {
        Commands::Demo {
            input,
            return_to_primary,
        } => {
            let runtime = builder.build()?;
            let report = demo(&runtime, input, return_to_primary)?;
            runtime.shutdown();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Stress { items, sleep_ms } => {
            let runtime = builder.build()?;
            let report = stress(&runtime, items, Duration::from_millis(sleep_ms))?;
            runtime.shutdown();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            let config = effective_config(&builder)?;
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

fn runtime_builder(cli: &Cli) -> Result<RuntimeBuilder> {
    let mut builder = match &cli.config {
        Some(path) => RuntimeBuilder::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RuntimeBuilder::new(),
    };
    if let Some(threads) = cli.threads {
        builder = builder.threads(threads);
    }
    Ok(builder)
}

/// Validated configuration, without starting any threads.
fn effective_config(builder: &RuntimeBuilder) -> Result<&PoolConfig> {
    let config = builder.config_ref();
    config.validate()?;
    Ok(config)
}

fn record(journal: &Journal, task: &'static str, action: &'static str) {
    let current = thread::current();
    let entry = JournalEntry {
        task,
        action,
        thread: current.name().unwrap_or("unnamed").to_string(),
    };
    debug!(task, action, thread = %entry.thread, "journal");
    if let Ok(mut entries) = journal.lock() {
        entries.push(entry);
    }
}

fn journaled(
    context: Arc<dyn ExecutionContext>,
    name: &'static str,
    journal: &Journal,
    accept: fn(i64) -> bool,
) -> Task<i64, i64, i64> {
    let exec_journal = Arc::clone(journal);
    let undo_journal = Arc::clone(journal);
    Task::with_context(
        context,
        move |x: i64| {
            record(&exec_journal, name, "execute");
            if accept(x) {
                StepResult::success(x, x)
            } else {
                StepResult::failure(format!("{name} rejected input {x}"))
            }
        },
        move |_: i64| record(&undo_journal, name, "rollback"),
    )
    .named(name)
}

fn demo(runtime: &Runtime, input: i64, return_to_primary: bool) -> Result<DemoReport> {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let calling: Arc<dyn ExecutionContext> = Arc::new(runtime.calling());
    let last: Arc<dyn ExecutionContext> = if return_to_primary {
        Arc::new(runtime.primary())
    } else {
        Arc::clone(&calling)
    };

    let (chain, handle) = ChainBuilder::with_input(input)
        .then(journaled(Arc::clone(&calling), "a", &journal, |_| true))
        .then(journaled(
            Arc::new(runtime.worker()),
            "b",
            &journal,
            |x| x > 0,
        ))
        .then(journaled(last, "c", &journal, |_| true))
        .build();
    let chain_id = chain.id();
    info!(chain = %chain_id, input, "starting demo chain");
    chain.resume();

    let outcome = drive(runtime, handle)?;
    let journal = journal
        .lock()
        .map(|entries| entries.clone())
        .unwrap_or_default();

    Ok(DemoReport {
        chain: chain_id.to_string(),
        input,
        outcome,
        journal,
        stats: runtime.stats(),
    })
}

/// Primary loop: tick until the chain reports its outcome.
fn drive(runtime: &Runtime, mut handle: CompletionHandle) -> Result<ChainOutcome> {
    loop {
        runtime.tick();
        if let Some(outcome) = handle.try_outcome()? {
            return Ok(outcome);
        }
        thread::sleep(TICK);
    }
}

fn stress(runtime: &Runtime, items: usize, sleep: Duration) -> Result<StressReport> {
    let started = Instant::now();
    let runs: Arc<Vec<AtomicUsize>> =
        Arc::new((0..items).map(|_| AtomicUsize::new(0)).collect());

    for index in 0..items {
        let runs = Arc::clone(&runs);
        runtime.submit(WorkItem::background(move || {
            thread::sleep(sleep);
            runs[index].fetch_add(1, Ordering::SeqCst);
        }));
    }

    let mut samples = vec![runtime.pool().pending_background_count()];
    while samples.last().is_some_and(|&pending| pending > 0) {
        thread::sleep(TICK);
        let pending = runtime.pool().pending_background_count();
        if samples.last() != Some(&pending) {
            samples.push(pending);
        }
    }
    runtime.wait_idle();

    let executed_once = runs
        .iter()
        .filter(|count| count.load(Ordering::SeqCst) == 1)
        .count();
    if executed_once != items {
        bail!("{} of {items} items did not run exactly once", items - executed_once);
    }

    Ok(StressReport {
        items,
        executed_once,
        backlog_never_grew: samples.windows(2).all(|pair| pair[1] < pair[0]),
        backlog_samples: samples,
        elapsed_ms: started.elapsed().as_millis(),
        stats: runtime.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        RuntimeBuilder::new().threads(2).build().unwrap()
    }

    fn actions(report: &DemoReport) -> Vec<(&'static str, &'static str)> {
        report
            .journal
            .iter()
            .map(|entry| (entry.task, entry.action))
            .collect()
    }

    #[test]
    fn demo_succeeds_for_positive_input() {
        let runtime = runtime();
        let report = demo(&runtime, 5, false).unwrap();
        assert_eq!(report.outcome, ChainOutcome::Succeeded);
        assert_eq!(
            actions(&report),
            vec![("a", "execute"), ("b", "execute"), ("c", "execute")]
        );
        assert!(report.journal[1].thread.starts_with("WorkerThread"));
    }

    #[test]
    fn demo_rolls_back_first_task_for_negative_input() {
        let runtime = runtime();
        let report = demo(&runtime, -1, false).unwrap();
        assert_eq!(report.outcome, ChainOutcome::RolledBack);
        assert_eq!(
            actions(&report),
            vec![("a", "execute"), ("b", "execute"), ("a", "rollback")]
        );
    }

    #[test]
    fn demo_can_finish_on_the_primary_thread() {
        let runtime = runtime();
        let report = demo(&runtime, 3, true).unwrap();
        let main_name = thread::current().name().unwrap_or("unnamed").to_string();
        assert_eq!(report.outcome, ChainOutcome::Succeeded);
        assert_eq!(report.journal[2].thread, main_name);
    }

    #[test]
    fn stress_runs_every_item_once() {
        let runtime = RuntimeBuilder::new().threads(4).build().unwrap();
        let report = stress(&runtime, 100, Duration::from_millis(1)).unwrap();
        assert_eq!(report.executed_once, 100);
        assert!(report.backlog_never_grew);
        assert_eq!(report.backlog_samples.last(), Some(&0));
    }

    #[test]
    fn config_is_validated_without_a_runtime() {
        let builder = RuntimeBuilder::new().threads(6);
        assert_eq!(effective_config(&builder).unwrap().threads, Some(6));

        let invalid = RuntimeBuilder::new().threads(0);
        let err = effective_config(&invalid).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["baton", "demo", "--input", "-1", "--threads", "3"]);
        assert_eq!(cli.threads, Some(3));
        assert!(matches!(
            cli.command,
            Commands::Demo {
                input: -1,
                return_to_primary: false
            }
        ));
    }
}
