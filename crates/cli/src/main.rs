use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, eyre, Result};
use colored::Colorize;
use sk_core::config::{load_config, AppConfig};
use sk_core::engine::{
    available_variables, preview_block_prompt, seed_pool, validate_sequence, EngineSettings,
    RunRequest, SequenceEngine, ValidationOptions,
};
use sk_core::providers::ProviderFactory;
use sk_core::state::RunManager;
use sk_core::store::{InMemoryStore, Store};
use sk_protocol::block_models::Block;
use sk_protocol::ipc::Event;
use sk_protocol::run_models::{Run, RunStatus};
use sk_protocol::sequence_models::Sequence;
use sk_protocol::variable_models::VariableValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Run prompt sequences against language models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory containing `.sequence-kit/`
    #[arg(short, long, default_value = ".", global = true)]
    dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List sequences and global lists
    List,

    /// Check sequences without calling any model
    Validate {
        /// Sequence name or id; all sequences when omitted
        sequence: Option<String>,
    },

    /// Show the names a block's prompt may reference
    Variables {
        /// Sequence name or id
        sequence: String,
        /// Block name or id
        block: String,
    },

    /// Render a block's prompt without calling any model
    Preview {
        /// Sequence name or id
        sequence: String,
        /// Block name or id
        block: String,
        /// Input override as NAME=VALUE; JSON arrays become lists
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
    },

    /// Execute a sequence
    Run {
        /// Sequence name or id
        sequence: String,
        /// Input override as NAME=VALUE; JSON arrays become lists
        #[arg(short = 's', long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
        /// Model used by blocks that do not name one
        #[arg(short, long)]
        model: Option<String>,
        /// Start at this block (name or id) instead of the first one
        #[arg(long)]
        from: Option<String>,
        /// Execute only this block (name or id); earlier outputs it uses come from --set
        #[arg(long, conflicts_with = "from")]
        only: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

/// Which blocks of a sequence `run` executes.
enum BlockSelection {
    All,
    From(String),
    Only(String),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli.dir).await?;
    debug!(
        sequences = config.sequences.len(),
        lists = config.lists.len(),
        "configuration loaded"
    );

    match cli.command {
        Commands::List => list(&config),
        Commands::Validate { sequence } => validate(&config, sequence.as_deref()),
        Commands::Variables { sequence, block } => variables(&config, &sequence, &block),
        Commands::Preview {
            sequence,
            block,
            overrides,
        } => preview(&config, &sequence, &block, &overrides),
        Commands::Run {
            sequence,
            overrides,
            model,
            from,
            only,
            output,
        } => {
            let selection = match only {
                Some(block) => BlockSelection::Only(block),
                None => from.map_or(BlockSelection::All, BlockSelection::From),
            };
            run(&config, &sequence, &overrides, model, selection, output).await
        }
    }
}

fn find_sequence<'a>(config: &'a AppConfig, key: &str) -> Result<&'a Sequence> {
    config
        .sequence(key)
        .ok_or_else(|| eyre!("Sequence '{key}' not found"))
}

fn find_block<'a>(sequence: &'a Sequence, key: &str) -> Result<&'a Block> {
    let id = Uuid::parse_str(key).ok();
    sequence
        .blocks
        .iter()
        .find(|block| block.name == key || Some(block.id) == id)
        .ok_or_else(|| eyre!("Block '{key}' not found in sequence '{}'", sequence.name))
}

/// Parse `NAME=VALUE` overrides. Values starting with `[` or `{` are read
/// as JSON lists or matrices.
fn parse_overrides(raw: &[String]) -> Result<BTreeMap<String, VariableValue>> {
    let mut overrides = BTreeMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            bail!("Invalid override '{entry}', expected NAME=VALUE");
        };
        let value = if value.starts_with('[') || value.starts_with('{') {
            serde_json::from_str(value)
                .map_err(|e| eyre!("Invalid value for '{name}': {e}"))?
        } else {
            VariableValue::from(value)
        };
        overrides.insert(name.trim().to_string(), value);
    }
    Ok(overrides)
}

fn list(config: &AppConfig) -> Result<()> {
    println!("{}", "Sequences".bold());
    if config.sequences.is_empty() {
        println!("  (none)");
    }
    for sequence in &config.sequences {
        println!(
            "  {} {} {}",
            sequence.name.cyan(),
            format!("({} blocks)", sequence.blocks.len()).dimmed(),
            sequence.description.as_deref().unwrap_or_default()
        );
    }

    println!("{}", "Global lists".bold());
    if config.lists.is_empty() {
        println!("  (none)");
    }
    for list in &config.lists {
        println!(
            "  {} {}",
            list.name.cyan(),
            format!("({} values)", list.values.len()).dimmed()
        );
    }
    Ok(())
}

fn validate(config: &AppConfig, key: Option<&str>) -> Result<()> {
    let sequences: Vec<&Sequence> = match key {
        Some(key) => vec![find_sequence(config, key)?],
        None => config.sequences.iter().collect(),
    };

    let mut issue_count = 0;
    for sequence in sequences {
        let pool = seed_pool(sequence, &config.lists, &BTreeMap::new());
        let fallback_model = sequence
            .default_model
            .as_deref()
            .or(config.global.default_model.as_deref());
        let issues = validate_sequence(
            sequence,
            &pool,
            ValidationOptions {
                fallback_model,
                ..Default::default()
            },
        );

        if issues.is_empty() {
            println!("{} {}", "ok".green().bold(), sequence.name);
            continue;
        }

        issue_count += issues.len();
        println!("{} {}", "error".red().bold(), sequence.name);
        for issue in issues {
            match issue.block_name {
                Some(block) => println!("  [{}] {}", block.yellow(), issue.error),
                None => println!("  {}", issue.error),
            }
        }
    }

    if issue_count > 0 {
        eprintln!("{issue_count} issue(s) found");
        std::process::exit(1);
    }
    Ok(())
}

fn variables(config: &AppConfig, sequence_key: &str, block_key: &str) -> Result<()> {
    let sequence = find_sequence(config, sequence_key)?;
    let block = find_block(sequence, block_key)?;

    for variable in available_variables(sequence, block.id, &config.lists)? {
        println!(
            "{:<24} {:<7} {}",
            variable.name.cyan(),
            variable.shape.to_string(),
            variable.provenance.describe().dimmed()
        );
    }
    Ok(())
}

fn preview(
    config: &AppConfig,
    sequence_key: &str,
    block_key: &str,
    raw_overrides: &[String],
) -> Result<()> {
    let sequence = find_sequence(config, sequence_key)?;
    let block = find_block(sequence, block_key)?;
    let overrides = parse_overrides(raw_overrides)?;

    let preview = preview_block_prompt(sequence, block.id, &overrides, &config.lists)?;
    println!("{}", preview.rendered);
    for failure in &preview.failures {
        eprintln!("{} {failure}", "warning:".yellow().bold());
    }
    Ok(())
}

async fn run(
    config: &AppConfig,
    sequence_key: &str,
    raw_overrides: &[String],
    model: Option<String>,
    selection: BlockSelection,
    output: OutputFormat,
) -> Result<()> {
    let sequence = find_sequence(config, sequence_key)?;
    let mut request = match selection {
        BlockSelection::All => RunRequest::new(sequence.id),
        BlockSelection::From(key) => {
            let mut request = RunRequest::new(sequence.id);
            request.start_block = Some(find_block(sequence, &key)?.id);
            request
        }
        BlockSelection::Only(key) => {
            RunRequest::single_block(sequence.id, find_block(sequence, &key)?.id)
        }
    };
    request.overrides = parse_overrides(raw_overrides)?;
    request.model_override = model;

    let provider =
        ProviderFactory::manager_from_config(&config.global).map_err(|e| eyre!("{e:#}"))?;
    let store = InMemoryStore::seeded(config.sequences.clone(), config.lists.clone());
    let engine = SequenceEngine::new(
        Arc::new(provider),
        Arc::new(store.clone()),
        EngineSettings::from(config.global.clone()),
    );

    let (events_tx, mut events_rx) = mpsc::channel(256);
    let manager = Arc::new(RunManager::new(Arc::new(engine), events_tx));

    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if output == OutputFormat::Text {
                print_event(&event);
            }
        }
    });

    let run_id = manager.start_run(request).await.map_err(|e| eyre!("{e:#}"))?;

    let canceller = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Cancelling run...".yellow());
                if let Err(error) = manager.cancel_run(run_id).await {
                    debug!(%error, "cancellation ignored");
                }
            }
        })
    };

    let run = manager
        .wait_for_run(run_id)
        .await
        .map_err(|e| eyre!("{e:#}"))?;

    // The printer stops once every event sender is gone.
    canceller.abort();
    let _ = canceller.await;
    drop(manager);
    let _ = printer.await;

    match output {
        OutputFormat::Text => print_summary(&run),
        OutputFormat::Json => {
            let block_runs = store.list_block_runs(run.id).await?;
            let report = serde_json::json!({
                "run": run,
                "block_runs": block_runs,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if run.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::RunStarted { sequence_name, .. } => {
            println!("{} {}", "Running".bold(), sequence_name.cyan());
        }
        Event::BlockStarted {
            block_name,
            block_index,
            ..
        } => {
            println!("{} {}", format!("[{}]", block_index + 1).dimmed(), block_name);
        }
        Event::BlockRunRecorded { status, .. } if *status == RunStatus::Failed => {
            println!("    {}", "call failed".red());
        }
        Event::RunError { kind, error, .. } => {
            println!("{} {error} ({kind:?})", "failed:".red().bold());
        }
        Event::RunCompleted { .. } => {
            println!("{}", "completed".green().bold());
        }
        _ => {}
    }
}

fn print_summary(run: &Run) {
    println!();
    for (name, value) in &run.results_summary {
        println!("{}:", name.cyan().bold());
        println!("{}", value.to_prompt_text());
    }
    println!();
    println!(
        "{} {} in {} ms, {} tokens in / {} out, est. cost {:.4}",
        "Run".dimmed(),
        run.id,
        run.total_execution_time_ms,
        run.total_token_usage.input,
        run.total_token_usage.output,
        run.total_cost_estimate
    );
}
