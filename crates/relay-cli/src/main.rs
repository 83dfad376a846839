//! relay - object store 経由の変換ジョブ CLI
//!
//! 入力ファイルを `input1/` に置き、ワーカーが書いた変換結果を待って保存します。
//!
//! - `relay convert <file>`: upload → wait → download
//! - `relay submit <file>`: upload だけ（ジョブを表示）
//! - `relay wait <input-key>`: タイムアウト後の再待機
//!
//! ストアは `--config`（JSON）か、`--bucket`/`--region`、`--store-dir` で指定します。
//! ログは `RUST_LOG`（既定 `warn`）。

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_core::app::{CancelSignal, JobCoordinator, PollPolicy, cancel_pair};
use relay_core::config::{PollSettings, RelayConfig, S3Settings, StoreConfig};
use relay_core::domain::{Completion, Job, JobError, NamingConvention, WaitEvent};
use relay_core::impls::{TracingEventSink, connect_gateway};
use relay_core::ports::EventSink;

const NOT_FINISHED: &str = "Conversion not finished yet. Try again after a few seconds.";

#[derive(Debug, Parser)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file; flags below override it.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    poll: PollArgs,

    /// How input and output keys are named.
    #[arg(long, value_enum)]
    naming: Option<Naming>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[arg(long, env = "RELAY_BUCKET")]
    bucket: Option<String>,

    #[arg(long, env = "RELAY_REGION")]
    region: Option<String>,

    /// S3-compatible endpoint URL (MinIO etc.).
    #[arg(long, env = "RELAY_ENDPOINT")]
    endpoint: Option<String>,

    /// Use a local directory as the store.
    #[arg(long, env = "RELAY_STORE_DIR", conflicts_with = "bucket")]
    store_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PollArgs {
    /// Seconds between checks.
    #[arg(long)]
    interval: Option<f64>,

    /// Give up after this many seconds.
    #[arg(long)]
    max_wait: Option<f64>,

    /// Backoff multiplier (1.0 = fixed interval).
    #[arg(long)]
    backoff: Option<f64>,

    /// Storage failures tolerated in a row.
    #[arg(long)]
    max_failures: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload a file, wait for the converted output and save it.
    Convert {
        file: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Upload a file without waiting.
    Submit { file: PathBuf },
    /// Wait again for a previously submitted input key.
    Wait {
        input_key: String,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Naming {
    Legacy,
    Reserved,
}

impl From<Naming> for NamingConvention {
    fn from(naming: Naming) -> Self {
        match naming {
            Naming::Legacy => NamingConvention::Legacy,
            Naming::Reserved => NamingConvention::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl StoreArgs {
    /// Flags win over the config file; a bucket flag switches to S3.
    fn resolve(&self, from_file: Option<&StoreConfig>) -> Result<StoreConfig> {
        if let Some(root) = &self.store_dir {
            return Ok(StoreConfig::Local { root: root.clone() });
        }

        let file_s3 = match from_file {
            Some(StoreConfig::S3(settings)) => Some(settings),
            _ => None,
        };

        match (&self.bucket, from_file) {
            (None, None) => {
                bail!("No store configured. Use --bucket/--region, --store-dir or --config")
            }
            (None, Some(StoreConfig::Local { root })) => Ok(StoreConfig::Local { root: root.clone() }),
            (bucket, _) => {
                let bucket = bucket
                    .clone()
                    .or_else(|| file_s3.map(|s| s.bucket.clone()))
                    .context("Bucket is required. Set RELAY_BUCKET or use --bucket")?;
                let region = self
                    .region
                    .clone()
                    .or_else(|| file_s3.map(|s| s.region.clone()))
                    .context("Region is required. Set RELAY_REGION or use --region")?;
                let endpoint = self
                    .endpoint
                    .clone()
                    .or_else(|| file_s3.and_then(|s| s.endpoint.clone()));
                Ok(StoreConfig::S3(S3Settings {
                    bucket,
                    region,
                    endpoint,
                }))
            }
        }
    }
}

impl PollArgs {
    fn apply(&self, settings: &mut PollSettings) {
        if let Some(interval) = self.interval {
            settings.interval_secs = interval;
        }
        if let Some(max_wait) = self.max_wait {
            settings.max_wait_secs = max_wait;
        }
        if let Some(backoff) = self.backoff {
            settings.backoff = backoff;
        }
        if let Some(max_failures) = self.max_failures {
            settings.max_failures = max_failures;
        }
    }
}

impl Cli {
    async fn relay_config(&self) -> Result<RelayConfig> {
        let from_file = match &self.config {
            Some(path) => Some(RelayConfig::from_json_file(path).await?),
            None => None,
        };

        let store = self.store.resolve(from_file.as_ref().map(|c| &c.store))?;
        let mut poll = from_file
            .as_ref()
            .map(|c| c.poll.clone())
            .unwrap_or_default();
        self.poll.apply(&mut poll);
        let naming = self
            .naming
            .map(NamingConvention::from)
            .or(from_file.map(|c| c.naming))
            .unwrap_or_default();

        Ok(RelayConfig {
            store,
            poll,
            naming,
        })
    }
}

/// stderr に進捗を出しつつ tracing にも流す
struct ProgressSink;

impl EventSink for ProgressSink {
    fn emit(&self, event: &WaitEvent) {
        match event {
            WaitEvent::Polled {
                tick, tick_budget, ..
            } => eprintln!("Checking for converted file... ({tick}/{tick_budget})"),
            WaitEvent::Ambiguous {
                selected, others, ..
            } => eprintln!(
                "warning: {} other output(s) also matched; using {selected}",
                others.len()
            ),
            _ => {}
        }
        TracingEventSink.emit(event);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.relay_config().await?;
    let policy = PollPolicy::try_from(&config.poll)?;
    let gateway = connect_gateway(&config.store).await?;
    let coordinator = JobCoordinator::builder(gateway)
        .events(Arc::new(ProgressSink))
        .convention(config.naming)
        .policy(policy)
        .build()?;

    match cli.command {
        Commands::Convert { file, out_dir } => {
            let (bytes, file_name) = read_input(&file).await?;
            let job = coordinator.submit(&bytes, &file_name).await?;
            eprintln!("Uploaded {file_name} as {}", job.input_key());
            wait_and_save(&coordinator, &job, &out_dir, cli.format).await
        }
        Commands::Submit { file } => {
            let (bytes, file_name) = read_input(&file).await?;
            let job = coordinator.submit(&bytes, &file_name).await?;
            print_job(&job, cli.format)
        }
        Commands::Wait { input_key, out_dir } => {
            let job = coordinator.resume(&input_key)?;
            wait_and_save(&coordinator, &job, &out_dir, cli.format).await
        }
    }
}

async fn read_input(path: &Path) -> Result<(Vec<u8>, String)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file name: {}", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((bytes, file_name))
}

async fn wait_and_save(
    coordinator: &JobCoordinator,
    job: &Job,
    out_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    let cancel = ctrl_c_signal();
    let completion = match coordinator
        .await_result(job, coordinator.policy(), &cancel)
        .await
    {
        Ok(completion) => completion,
        Err(err @ JobError::Timeout { .. }) => {
            eprintln!("{NOT_FINISHED}");
            eprintln!("Resume with: relay wait {}", job.input_key());
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let path = save_output(&completion, out_dir).await?;
    info!(output = %path.display(), "saved output");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&completion.summary())?),
        OutputFormat::Text => {
            println!(
                "Converted file: {} ({}, {} bytes)",
                completion.file_name(),
                completion.mime_type(),
                completion.bytes.len()
            );
            println!("Saved to: {}", path.display());
        }
    }
    Ok(())
}

async fn save_output(completion: &Completion, out_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(completion.file_name());
    tokio::fs::write(&path, &completion.bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn print_job(job: &Job, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(job)?),
        OutputFormat::Text => {
            println!("Submitted {} as {}", job.file_name(), job.input_key());
            println!("Job: {}", job.id());
            println!("Wait with: relay wait {}", job.input_key());
        }
    }
    Ok(())
}

/// Ctrl-C で待機を打ち切る
fn ctrl_c_signal() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    signal
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<JobError>() {
        Some(JobError::Timeout { .. }) => ExitCode::from(2),
        Some(JobError::Cancelled { .. }) => {
            eprintln!("Cancelled.");
            ExitCode::from(130)
        }
        _ => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => exit_code(&err),
    }
}
