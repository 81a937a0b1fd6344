use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apexrun_ml::backend::{BackendCapability, BackendKind};
use apexrun_ml::config::{Config, ConfigBuilder, DEFAULT_SAMPLES};
use apexrun_ml::pipeline::{BuildPipeline, BuildStatus};
use apexrun_ml::quant::QuantizationMode;
use apexrun_ml::store::ArtifactStore;
use apexrun_ml::task::Task;
use apexrun_ml::tracking::RunStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, env = "APEXRUN_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to bind to
        #[arg(short, long, env = "APEXRUN_PORT", default_value_t = 8001)]
        port: u16,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Build artifacts once and exit
    Build {
        /// Only build these tasks (default: all)
        #[arg(long = "task")]
        tasks: Vec<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory holding artifacts and normalization params
    #[arg(short, long, env = "APEXRUN_MODELS_DIR", default_value = "./models")]
    models_dir: PathBuf,

    /// Numeric backend (native or disabled)
    #[arg(long, env = "APEXRUN_BACKEND", default_value = "native")]
    backend: BackendKind,

    /// Export quantization (none, float16, dynamic, int8)
    #[arg(short, long, env = "APEXRUN_QUANTIZATION", default_value = "float16")]
    quantization: QuantizationMode,

    /// Synthetic samples per task
    #[arg(long, env = "APEXRUN_SAMPLES", default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Epoch cap
    #[arg(long, env = "APEXRUN_EPOCHS", default_value_t = 50)]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, env = "APEXRUN_BATCH_SIZE", default_value_t = 32)]
    batch_size: usize,

    /// Wall-clock ceiling per task, in seconds
    #[arg(long, env = "APEXRUN_MAX_TRAINING_SECS", default_value_t = 600)]
    max_training_secs: u64,

    /// Write Parquet snapshots of generated datasets here
    #[arg(long, env = "APEXRUN_SNAPSHOT_DIR")]
    snapshot_dir: Option<PathBuf>,
}

impl CommonArgs {
    fn config(self) -> ConfigBuilder {
        Config::builder()
            .models_dir(self.models_dir)
            .backend(self.backend)
            .quantization(self.quantization)
            .samples(self.samples)
            .epochs(self.epochs)
            .batch_size(self.batch_size)
            .max_training_secs(self.max_training_secs)
            .snapshot_dir(self.snapshot_dir)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve { host, port, common } => {
            let config = common.config().host(host).port(port).build()?;
            info!(
                version = env!("CARGO_PKG_VERSION"),
                models_dir = %config.models_dir.display(),
                "Starting ApexRun ML service"
            );
            apexrun_ml::server::serve(config)
                .await
                .context("HTTP server stopped")?;
        }
        Command::Build { tasks, common } => {
            let config = common.config().build()?;
            let tasks = if tasks.is_empty() {
                Task::ALL.to_vec()
            } else {
                tasks
                    .iter()
                    .map(|t| t.parse())
                    .collect::<apexrun_ml::Result<Vec<Task>>>()?
            };
            build(config, tasks).await?;
        }
    }

    Ok(())
}

async fn build(config: Config, tasks: Vec<Task>) -> anyhow::Result<()> {
    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let store = ArtifactStore::open(&config.models_dir)
            .with_context(|| format!("opening {}", config.models_dir.display()))?;
        let capability = BackendCapability::detect(config.backend);
        let runs = Mutex::new(RunStore::new());
        let backend = capability.backend()?;
        Ok(BuildPipeline::new(&config, &store, backend, &runs).build(&tasks))
    })
    .await??;

    for (task, error) in &summary.errors {
        warn!(task = %task, error = %error, "Task failed");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.status == BuildStatus::Failed {
        anyhow::bail!("every task failed to build");
    }
    Ok(())
}
