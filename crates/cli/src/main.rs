mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use events::{Event, EventBus, EventEnvelope, Subscription};
use orchestrator::{
    load_required, AbortHandle, ContinuousRunner, CycleOrchestrator, CycleStore, HttpAgentEngine,
    JsonCycleStore, ReportGenerator,
};
use pdca_core::{CycleState, PdcaPhase, PdcaStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::{PdcaConfig, StorageBackend};

const PDCA_DIR: &str = ".pdca";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_NAME: &str = "pdca.db";
const CYCLES_DIR: &str = "cycles";

#[derive(Parser)]
#[command(name = "pdca")]
#[command(about = "Run Plan-Do-Check-Act improvement cycles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Agent engine base URL, overrides the config file
    #[arg(long, global = true, env = "PDCA_ENGINE_URL")]
    engine_url: Option<String>,

    /// Bearer token for the agent engine
    #[arg(long, global = true, env = "PDCA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .pdca/ in the current directory
    Init,
    /// Run one or more cycles, each seeded by the previous one
    Run(RunArgs),
    /// Continue an interrupted cycle
    Resume { cycle_id: Uuid },
    /// Re-run a cycle from a phase as a new cycle
    Restart {
        cycle_id: Uuid,
        #[arg(long, value_parser = parse_phase)]
        from: PdcaPhase,
    },
    /// Print a report for some or all stored cycles
    Report {
        cycle_ids: Vec<Uuid>,
        /// Print cycle summaries as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored cycles
    Status {
        /// Only cycles with this status
        #[arg(long, value_parser = parse_status)]
        only: Option<PdcaStatus>,
        /// Only cycles continued from this one
        #[arg(long)]
        continued_from: Option<Uuid>,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    problem: Option<String>,
    #[arg(long)]
    objective: Option<String>,
    #[arg(long)]
    context: Option<String>,
    #[arg(long)]
    constraints: Option<String>,
    #[arg(long)]
    deadline: Option<String>,
    #[arg(long)]
    resources: Option<String>,
    /// Cycle name, defaults to the project name
    #[arg(long)]
    name: Option<String>,
    /// TOML file of string inputs; flags win over file entries
    #[arg(long)]
    inputs: Option<PathBuf>,
    /// Number of cycles, defaults to the config value
    #[arg(long)]
    cycles: Option<usize>,
    #[arg(long)]
    continue_on_failure: bool,
}

fn parse_phase(value: &str) -> std::result::Result<PdcaPhase, String> {
    PdcaPhase::parse(value).ok_or_else(|| format!("unknown phase '{}' (plan, do, check, act)", value))
}

fn parse_status(value: &str) -> std::result::Result<PdcaStatus, String> {
    PdcaStatus::parse(value).ok_or_else(|| {
        format!(
            "unknown status '{}' (pending, in_progress, completed, failed, aborted)",
            value
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let engine = EngineOverrides {
        url: cli.engine_url,
        api_key: cli.api_key,
    };

    match cli.command {
        Commands::Init => init_project().await,
        Commands::Run(args) => run_cycles(args, &engine).await,
        Commands::Resume { cycle_id } => resume_cycle(cycle_id, &engine).await,
        Commands::Restart { cycle_id, from } => restart_cycle(cycle_id, from, &engine).await,
        Commands::Report { cycle_ids, json } => report(cycle_ids, json).await,
        Commands::Status {
            only,
            continued_from,
        } => status(only, continued_from).await,
    }
}

struct EngineOverrides {
    url: Option<String>,
    api_key: Option<String>,
}

/// The `.pdca/` directory of the current working directory.
struct Project {
    root: PathBuf,
    config: PdcaConfig,
}

impl Project {
    fn dir() -> Result<PathBuf> {
        Ok(std::env::current_dir()?.join(PDCA_DIR))
    }

    fn open() -> Result<Self> {
        let root = Self::dir()?;
        if !root.exists() {
            bail!("No {} directory found. Run 'pdca init' first.", PDCA_DIR);
        }
        let config_path = root.join(CONFIG_FILE);
        let config = if config_path.exists() {
            PdcaConfig::load(&config_path)?
        } else {
            PdcaConfig::default()
        };
        Ok(Self { root, config })
    }

    fn database_url(root: &Path) -> String {
        format!("sqlite:{}", root.join(DEFAULT_DB_NAME).display())
    }

    async fn store(&self) -> Result<Arc<dyn CycleStore>> {
        match self.config.storage.backend {
            StorageBackend::Sqlite => {
                let pool = db::connect(&Self::database_url(&self.root))
                    .await
                    .context("Failed to open cycle database")?;
                Ok(Arc::new(db::CycleRepository::new(pool)))
            }
            StorageBackend::Json => Ok(Arc::new(JsonCycleStore::new(&self.root))),
        }
    }

    fn orchestrator(&self, overrides: &EngineOverrides) -> Result<CycleOrchestrator> {
        let url = overrides
            .url
            .clone()
            .unwrap_or_else(|| self.config.engine.url.clone());
        let mut engine = HttpAgentEngine::new(url)
            .with_request_timeout(Duration::from_secs(self.config.engine.request_timeout_secs))
            .context("Failed to build engine client")?;
        if let Some(key) = overrides
            .api_key
            .clone()
            .or_else(|| self.config.engine.api_key.clone())
        {
            engine = engine.with_api_key(key);
        }
        tracing::info!(engine_url = engine.base_url(), "Using agent engine");

        let executor = self.config.phase_executor(Arc::new(engine));
        Ok(CycleOrchestrator::new(
            Arc::new(executor),
            self.config.orchestrator_config(),
        ))
    }
}

async fn init_project() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let pdca_dir = cwd.join(PDCA_DIR);

    if pdca_dir.exists() {
        println!("Project already initialized at {}", pdca_dir.display());
        return Ok(());
    }

    println!("Initializing PDCA workspace in {}", cwd.display());

    tokio::fs::create_dir_all(pdca_dir.join(CYCLES_DIR)).await?;

    let project_name = cwd
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("PDCA cycle")
        .to_string();

    let mut config = PdcaConfig::default();
    config.project.name = project_name.clone();

    let config_path = pdca_dir.join(CONFIG_FILE);
    let config_content = toml::to_string_pretty(&config)?;
    tokio::fs::write(&config_path, config_content).await?;

    db::connect(&Project::database_url(&pdca_dir))
        .await
        .context("Failed to create cycle database")?;

    println!();
    println!("Initialized PDCA workspace for '{}'", project_name.bold());
    println!();
    println!("Created:");
    println!("  {}/", PDCA_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  ├── {}", DEFAULT_DB_NAME);
    println!("  └── {}/", CYCLES_DIR);
    println!();
    println!("Next steps:");
    println!("  1. Point [engine] url in {} at your agent engine", CONFIG_FILE);
    println!("  2. Run 'pdca run --problem \"...\" --objective \"...\"'");

    Ok(())
}

async fn run_cycles(args: RunArgs, overrides: &EngineOverrides) -> Result<()> {
    let project = Project::open()?;
    init_tracing();

    let inputs = collect_inputs(&args).await?;
    if !inputs.contains_key("problem") {
        bail!("A problem statement is required (--problem or an inputs file)");
    }
    let num_cycles = args.cycles.unwrap_or(project.config.continuous.cycles);
    if num_cycles == 0 {
        bail!("--cycles must be at least 1");
    }

    let store = project.store().await?;
    let bus = EventBus::new();
    let progress = spawn_progress(bus.subscription());

    let orchestrator = project
        .orchestrator(overrides)?
        .with_store(store)
        .with_event_bus(bus.clone());
    watch_ctrl_c(orchestrator.abort_handle().clone());

    let runner = ContinuousRunner::new(
        orchestrator,
        project.config.continuous_config(args.continue_on_failure),
    )
    .with_name(
        args.name
            .clone()
            .unwrap_or_else(|| project.config.project.name.clone()),
    )
    .with_composer(project.config.composer())
    .with_event_bus(bus.clone());

    let cycles = runner.run(inputs, num_cycles).await?;

    drop(runner);
    finish_progress(bus, progress).await;
    print_outcome(&cycles);
    Ok(())
}

async fn resume_cycle(cycle_id: Uuid, overrides: &EngineOverrides) -> Result<()> {
    let project = Project::open()?;
    init_tracing();

    let store = project.store().await?;
    let state = load_required(store.as_ref(), cycle_id).await?;
    if state.is_terminal() {
        println!(
            "Cycle {} is already {}; nothing to resume.",
            cycle_id,
            colored_status(state.status())
        );
        return Ok(());
    }

    let state = drive(&project, overrides, store, cycle_id, |orchestrator| async move {
        orchestrator.resume(state).await
    })
    .await?;
    print_outcome(std::slice::from_ref(&state));
    Ok(())
}

async fn restart_cycle(cycle_id: Uuid, from: PdcaPhase, overrides: &EngineOverrides) -> Result<()> {
    let project = Project::open()?;
    init_tracing();

    let store = project.store().await?;
    let original = load_required(store.as_ref(), cycle_id).await?;
    let restarted = original.restarted_from_phase(from);
    println!(
        "Restarting cycle {} from {} as {}",
        cycle_id,
        from.title(),
        restarted.id
    );

    let restarted_id = restarted.id;
    let state = drive(&project, overrides, store, restarted_id, |orchestrator| async move {
        orchestrator.run(restarted).await
    })
    .await?;
    print_outcome(std::slice::from_ref(&state));
    Ok(())
}

/// Build a wired orchestrator, hand it to `f` and wait for the progress
/// output of `cycle_id` to drain.
async fn drive<F, Fut>(
    project: &Project,
    overrides: &EngineOverrides,
    store: Arc<dyn CycleStore>,
    cycle_id: Uuid,
    f: F,
) -> Result<CycleState>
where
    F: FnOnce(CycleOrchestrator) -> Fut,
    Fut: std::future::Future<Output = orchestrator::Result<CycleState>>,
{
    let bus = EventBus::new();
    let progress = spawn_progress(bus.subscribe_cycle(cycle_id));
    let orchestrator = project
        .orchestrator(overrides)?
        .with_store(store)
        .with_event_bus(bus.clone());
    watch_ctrl_c(orchestrator.abort_handle().clone());

    let state = f(orchestrator).await?;
    finish_progress(bus, progress).await;
    Ok(state)
}

async fn report(cycle_ids: Vec<Uuid>, json: bool) -> Result<()> {
    let project = Project::open()?;
    let store = project.store().await?;

    let cycles = if cycle_ids.is_empty() {
        store.list().await?
    } else {
        let mut cycles = Vec::with_capacity(cycle_ids.len());
        for id in cycle_ids {
            cycles.push(load_required(store.as_ref(), id).await?);
        }
        cycles
    };

    if json {
        let summaries = ReportGenerator::summaries(&cycles);
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print!("{}", ReportGenerator::render(&cycles));
    }
    Ok(())
}

async fn status(only: Option<PdcaStatus>, continued_from: Option<Uuid>) -> Result<()> {
    let pdca_dir = Project::dir()?;
    if !pdca_dir.exists() {
        println!("Not a PDCA workspace.");
        println!("Run 'pdca init' to initialize.");
        return Ok(());
    }

    let project = Project::open()?;
    let store = project.store().await?;
    let mut cycles = match (continued_from, only) {
        (Some(id), _) => store.continuations_of(id).await?,
        (None, Some(status)) => store.list_by_status(status).await?,
        (None, None) => store.list().await?,
    };
    if let (Some(_), Some(status)) = (continued_from, only) {
        cycles.retain(|c| c.status() == status);
    }

    println!();
    println!("Project: {}", project.config.project.name.bold());
    println!("Path:    {}", project.root.display());
    println!();

    if cycles.is_empty() {
        println!("No cycles yet.");
    } else {
        println!("Cycles ({}):", cycles.len());
        for cycle in &cycles {
            let phases: Vec<&str> = cycle
                .completed_phases()
                .iter()
                .map(|p| p.as_str())
                .collect();
            println!(
                "  {} [{}] {} ({}) phases: {}",
                status_icon(cycle.status()),
                colored_status(cycle.status()),
                cycle.name,
                cycle.id,
                if phases.is_empty() {
                    "-".to_string()
                } else {
                    phases.join(", ")
                }
            );
        }
    }

    println!();
    Ok(())
}

/// Inputs from `--inputs`, then individual flags on top.
async fn collect_inputs(args: &RunArgs) -> Result<BTreeMap<String, String>> {
    let mut inputs = match &args.inputs {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read inputs file {}", path.display()))?;
            parse_inputs(&content)
                .with_context(|| format!("Invalid inputs file {}", path.display()))?
        }
        None => BTreeMap::new(),
    };

    let flags = [
        ("problem", &args.problem),
        ("objective", &args.objective),
        ("context", &args.context),
        ("constraints", &args.constraints),
        ("deadline", &args.deadline),
        ("resources", &args.resources),
    ];
    for (key, value) in flags {
        if let Some(value) = value {
            inputs.insert(key.to_string(), value.clone());
        }
    }
    Ok(inputs)
}

fn parse_inputs(content: &str) -> Result<BTreeMap<String, String>> {
    Ok(toml::from_str(content)?)
}

fn watch_ctrl_c(abort: AbortHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupt received, stopping after the current step...".yellow());
            abort.abort("interrupted by user");
        }
    });
}

fn spawn_progress(mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            print_event(&envelope);
        }
        if subscription.missed() > 0 {
            tracing::warn!(missed = subscription.missed(), "Progress output skipped events");
        }
    })
}

/// Close the bus and wait until every queued event has been printed.
async fn finish_progress(bus: EventBus, progress: JoinHandle<()>) {
    drop(bus);
    if let Err(e) = progress.await {
        tracing::warn!(error = %e, "Progress task failed");
    }
}

fn print_event(envelope: &EventEnvelope) {
    match &envelope.event {
        Event::CycleStarted { cycle_id, name } => {
            println!("{} {} ({})", "▶".cyan(), name.bold(), cycle_id);
        }
        Event::CycleResumed {
            cycle_id,
            next_phase,
        } => {
            let at = next_phase.map(|p| p.title()).unwrap_or("end");
            println!("{} resumed {} at {}", "▶".cyan(), cycle_id, at);
        }
        Event::PhaseStarted { phase, attempt, .. } => {
            if *attempt > 1 {
                println!("  {} {} (attempt {})", "…".dimmed(), phase.title(), attempt);
            } else {
                println!("  {} {}", "…".dimmed(), phase.title());
            }
        }
        Event::PhaseCompleted { phase, .. } => {
            println!("  {} {}", "✓".green(), phase.title());
        }
        Event::PhaseRetrying { phase, error, .. } => {
            println!("  {} {} failed, retrying: {}", "↻".yellow(), phase.title(), error);
        }
        Event::CycleCompleted { .. } => println!("{}", "Cycle completed".green()),
        Event::CycleFailed { error, .. } => println!("{} {}", "Cycle failed:".red(), error),
        Event::CycleAborted {
            last_completed_phase,
            ..
        } => {
            let last = last_completed_phase.map(|p| p.title()).unwrap_or("none");
            println!("{} (last completed phase: {})", "Cycle aborted".yellow(), last);
        }
        Event::TeamRecomposed {
            cycle_index,
            revision,
            agent_count,
        } => {
            println!(
                "{} team for cycle {} is now revision {} ({} agents)",
                "⚙".blue(),
                cycle_index,
                revision,
                agent_count
            );
        }
        Event::RunStopped { cycles_run, reason } => {
            println!("{} after {} cycle(s): {}", "Run stopped".yellow(), cycles_run, reason);
        }
        Event::StoreFailed { error, .. } => {
            println!("{} could not save cycle: {}", "warning:".red(), error)
        }
    }
}

fn print_outcome(cycles: &[CycleState]) {
    println!();
    print!("{}", ReportGenerator::render(cycles));
    println!();

    let completed = cycles
        .iter()
        .filter(|c| c.status() == PdcaStatus::Completed)
        .count();
    let line = format!("{} of {} cycle(s) completed", completed, cycles.len());
    if completed == cycles.len() {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.yellow().bold());
    }
}

fn status_icon(status: PdcaStatus) -> &'static str {
    match status {
        PdcaStatus::Pending => "○",
        PdcaStatus::InProgress => "◑",
        PdcaStatus::Completed => "●",
        PdcaStatus::Failed => "✗",
        PdcaStatus::Aborted => "■",
    }
}

fn colored_status(status: PdcaStatus) -> colored::ColoredString {
    match status {
        PdcaStatus::Completed => status.as_str().green(),
        PdcaStatus::Failed => status.as_str().red(),
        PdcaStatus::Aborted => status.as_str().yellow(),
        PdcaStatus::Pending | PdcaStatus::InProgress => status.as_str().cyan(),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdca=info,orchestrator=info".into()),
        )
        .init();
}
