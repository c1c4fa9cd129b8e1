//! Experiments CLI
//!
//! The `experiments` command drives an `ExperimentStore` against the
//! experiments API and prints every result as a `{success, data, error}`
//! JSON document.
//!
//! ## Commands
//!
//! - `list` / `summary`: load experiments and show a view or bucket counts
//! - `show`, `stats`, `datapoints`: read a single experiment
//! - `create`, `update`, `delete`, `complete`: write operations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, Level};

use experiment_state::{
    init_tracing, ActionOutcome, ActionResult, ApiConfig, CompletionPayload, ExperimentDraft,
    ExperimentId, ExperimentStore, HttpRemoteClient, ReloadStatus,
};

#[derive(Parser)]
#[command(name = "experiments")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track personal experiments against the experiments API")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Backend base URL
    #[arg(long, global = true, env = "EXPERIMENTS_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load experiments and print one view
    List {
        /// Use the plain listing instead of the with-stats endpoint
        #[arg(long)]
        plain: bool,

        /// Which classification to print
        #[arg(long, value_enum, default_value_t = View::All)]
        view: View,
    },

    /// Load experiments and print bucket counts
    Summary {
        /// Use the plain listing instead of the with-stats endpoint
        #[arg(long)]
        plain: bool,
    },

    /// Fetch a single experiment
    Show { id: ExperimentId },

    /// Create an experiment
    Create {
        #[command(flatten)]
        fields: DraftArgs,
    },

    /// Update an experiment; unspecified fields keep their current value
    Update {
        id: ExperimentId,

        #[command(flatten)]
        fields: DraftArgs,
    },

    /// Delete an experiment
    Delete { id: ExperimentId },

    /// Complete an experiment and reload
    Complete {
        id: ExperimentId,

        /// JSON file holding the completion payload
        #[arg(long, conflicts_with_all = ["final_average", "all_datapoints"])]
        file: Option<PathBuf>,

        /// Final average to record
        #[arg(long)]
        final_average: Option<f64>,

        /// Include every datapoint in the experiment window
        #[arg(long)]
        all_datapoints: bool,
    },

    /// Show benchmark vs. current values for an experiment
    Stats { id: ExperimentId },

    /// List metric datapoints inside the experiment window
    Datapoints { id: ExperimentId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum View {
    All,
    Ongoing,
    Completed,
    NotStarted,
}

/// Draft fields shared by `create` and `update`
#[derive(Args, Debug, Default)]
struct DraftArgs {
    /// JSON file holding the draft; flags below override its fields
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    benchmark: Option<String>,

    #[arg(long)]
    period: Option<String>,

    /// Metric of interest
    #[arg(long)]
    metric: Option<String>,

    #[arg(long)]
    primary_metric: Option<String>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    driver: Option<String>,
}

impl DraftArgs {
    /// Overlay the given flags on `base` (or on the `--file` draft when set).
    fn apply(self, base: ExperimentDraft) -> Result<ExperimentDraft> {
        let mut draft = match &self.file {
            Some(path) => read_json(path)?,
            None => base,
        };

        let set = |slot: &mut Option<String>, value: Option<String>| {
            if value.is_some() {
                *slot = value;
            }
        };
        set(&mut draft.title, self.title);
        set(&mut draft.benchmark, self.benchmark);
        set(&mut draft.period, self.period);
        set(&mut draft.metric_of_interest, self.metric);
        set(&mut draft.primary_metric_of_interest, self.primary_metric);
        set(&mut draft.start_date, self.start);
        set(&mut draft.end_date, self.end);
        if let Some(description) = self.description {
            draft = draft.with_field("description", description.into());
        }
        if let Some(driver) = self.driver {
            draft = draft.with_field("driver", driver.into());
        }
        Ok(draft)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_outcome<T: Serialize>(result: &ActionResult<T>) -> Result<bool> {
    let outcome = ActionOutcome::from_result(result);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.success)
}

fn reload_result(status: ReloadStatus) -> ActionResult<()> {
    match status {
        ReloadStatus::Failed(err) => Err(err),
        ReloadStatus::Loaded(_) | ReloadStatus::Skipped => Ok(()),
    }
}

fn build_store(api_url: Option<&str>) -> Result<ExperimentStore> {
    let mut config = ApiConfig::from_env();
    if let Some(url) = api_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    debug!(base_url = %config.base_url, prefix = %config.api_prefix, "Using experiments API");

    let client = HttpRemoteClient::new(config).context("Failed to create API client")?;
    Ok(ExperimentStore::with_remote(Arc::new(client)))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json_logs, level);

    let store = build_store(cli.api_url.as_deref())?;
    let success = run(&store, cli.command).await?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(store: &ExperimentStore, command: Commands) -> Result<bool> {
    match command {
        Commands::List { plain, view } => cmd_list(store, plain, view).await,
        Commands::Summary { plain } => cmd_summary(store, plain).await,
        Commands::Show { id } => print_outcome(&store.fetch(&id).await),
        Commands::Create { fields } => {
            let draft = fields.apply(ExperimentDraft::default())?;
            print_outcome(&store.create(&draft).await)
        }
        Commands::Update { id, fields } => cmd_update(store, &id, fields).await,
        Commands::Delete { id } => print_outcome(&store.delete(&id).await),
        Commands::Complete {
            id,
            file,
            final_average,
            all_datapoints,
        } => cmd_complete(store, &id, file.as_deref(), final_average, all_datapoints).await,
        Commands::Stats { id } => print_outcome(&store.stats(&id).await),
        Commands::Datapoints { id } => print_outcome(&store.datapoints(&id).await),
    }
}

/// Load and print one view
async fn cmd_list(store: &ExperimentStore, plain: bool, view: View) -> Result<bool> {
    let result = reload_result(store.reload(!plain).await).map(|()| match view {
        View::All => store.experiments(),
        View::Ongoing => store.ongoing(),
        View::Completed => store.completed(),
        View::NotStarted => store.not_started(),
    });
    print_outcome(&result)
}

/// Load and print bucket counts
async fn cmd_summary(store: &ExperimentStore, plain: bool) -> Result<bool> {
    let status = store.reload(!plain).await;
    let result = reload_result(status).map(|()| store.summary());
    print_outcome(&result)
}

/// Fetch the current record, overlay the flags and submit
async fn cmd_update(
    store: &ExperimentStore,
    id: &ExperimentId,
    fields: DraftArgs,
) -> Result<bool> {
    let base = if fields.file.is_some() {
        ExperimentDraft::default()
    } else {
        match store.fetch(id).await {
            Ok(current) => ExperimentDraft::from(&current),
            Err(err) => return print_outcome::<()>(&Err(err)),
        }
    };
    let draft = fields.apply(base)?;
    print_outcome(&store.update(id, &draft).await)
}

/// Build the completion payload and submit it
async fn cmd_complete(
    store: &ExperimentStore,
    id: &ExperimentId,
    file: Option<&Path>,
    final_average: Option<f64>,
    all_datapoints: bool,
) -> Result<bool> {
    let payload = if let Some(path) = file {
        read_json::<CompletionPayload>(path)?
    } else if all_datapoints {
        match store.datapoints(id).await {
            Ok(set) => {
                let total = set.total_count.max(set.datapoints.len());
                CompletionPayload::from_datapoints(set.datapoints, total)
            }
            Err(err) => return print_outcome::<()>(&Err(err)),
        }
    } else {
        CompletionPayload {
            final_average,
            ..Default::default()
        }
    };
    print_outcome(&store.complete(id, &payload).await)
}
