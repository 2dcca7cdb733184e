mod batch;
mod catalog;
mod category;
mod config;
mod consensus;
mod events;
mod http;
mod images;
mod llm;
mod metrics;
mod models;
mod pairing;
mod pipeline;
mod sheet;
mod vision;

use batch::BatchOptions;
use catalog::Backend;
use clap::Parser;
use config::Settings;
use eyre::{WrapErr, eyre};
use llm::{LlmClient, LlmConfig};
use models::{ImageSet, RunSummary};
use pipeline::Pipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use vision::{ProductKind, VocabSet};

const EXIT_FAILURE: u8 = 1;
const EXIT_PARTIAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Turn scanned product photo pairs into ready-to-upload eBay listings:
/// image variants, vision-model metadata, category mapping, catalog
/// upload and a File Exchange CSV.
#[derive(Debug, Parser)]
#[command(name = "postcard-lister", version, about)]
struct Cli {
    /// Front scan of a single item (pairs with --back).
    #[arg(long, conflicts_with = "batch")]
    input: Option<PathBuf>,

    /// Back scan of a single item; defaults to the front scan for
    /// one-photo items.
    #[arg(long, requires = "input")]
    back: Option<PathBuf>,

    /// Batch root: every subdirectory is one item folder of scan pairs.
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Output tree for processed images and CSVs.
    #[arg(long, default_value = "catalog")]
    output: PathBuf,

    /// Concurrent folder workers in batch mode.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Settings file (JSON). Missing file falls back to defaults plus
    /// environment variables.
    #[arg(long, default_value = "config/settings.json")]
    config: PathBuf,

    /// Product kind hint, e.g. "postcard" or "solar panel".
    #[arg(long)]
    product_hint: Option<String>,

    /// Commit images to the GitHub catalog instead of S3.
    #[arg(long)]
    github_upload: bool,

    /// Also write one combined listings.csv at the output root.
    #[arg(long)]
    csv_export: bool,

    /// Reprocess folders that already have a listings.csv.
    #[arg(long)]
    force: bool,

    /// Skip uploads and API calls where possible; still writes images.
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let pipeline = match build_pipeline(&cli) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(target = "lister.cli", "startup failed: {err:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let summary = tokio::select! {
        result = run(&cli, pipeline.0) => result,
        _ = tokio::signal::ctrl_c() => {
            error!(target = "lister.cli", "interrupted");
            return ExitCode::from(EXIT_INTERRUPTED);
        }
    };

    // Dropping the last sender ends the renderer; await it to flush.
    let renderer = pipeline.1;
    let code = match summary {
        Ok(summary) if summary.all_ok() => ExitCode::SUCCESS,
        Ok(summary) => {
            error!(
                target = "lister.cli",
                failed = summary.failed,
                "run finished with failures"
            );
            ExitCode::from(EXIT_PARTIAL)
        }
        Err(err) => {
            error!(target = "lister.cli", "run failed: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    };
    let _ = renderer.await;
    code
}

/// Everything that can only fail from bad configuration or bad flags;
/// failures here exit with the hard-failure code before any work starts.
fn build_pipeline(cli: &Cli) -> eyre::Result<(Pipeline, tokio::task::JoinHandle<()>)> {
    if cli.input.is_none() && cli.batch.is_none() {
        return Err(eyre!("nothing to do: pass --input or --batch"));
    }

    let settings = Settings::load(&cli.config)
        .wrap_err_with(|| format!("loading settings from {}", cli.config.display()))?;
    if !cli.dry_run && !settings.has_openai_key() {
        return Err(eyre!(
            "no OpenAI API key configured (settings file or OPENAI_API_KEY)"
        ));
    }

    let headers = sheet::load_template_headers(std::path::Path::new(&settings.csv_template))
        .wrap_err("loading csv template")?;
    let vocab = VocabSet::load(std::path::Path::new(&settings.data_dir));
    let llm = LlmClient::new(LlmConfig::new(
        settings.openai_api_key.clone(),
        settings.openai_model.clone(),
    ));
    let backend = Backend::from_settings(&settings, cli.github_upload);
    let kind = ProductKind::from_hint(cli.product_hint.as_deref());

    info!(
        target = "lister.cli",
        run_id = %uuid::Uuid::new_v4(),
        model = %settings.openai_model,
        backend = ?backend,
        kind = ?kind,
        dry_run = cli.dry_run,
        "pipeline configured"
    );

    let (events, renderer) = events::channel();
    let pipeline = Pipeline::new(
        Arc::new(settings),
        Arc::new(llm),
        Arc::new(vocab),
        backend,
        kind,
        headers,
        events,
        cli.dry_run,
    );
    Ok((pipeline, renderer))
}

async fn run(cli: &Cli, pipeline: Pipeline) -> eyre::Result<RunSummary> {
    if let Some(batch_root) = &cli.batch {
        let options = BatchOptions {
            workers: cli.workers,
            skip_processed: !cli.force,
            export_csv: cli
                .csv_export
                .then(|| cli.output.join("listings.csv")),
        };
        return batch::run_batch(pipeline, batch_root, &cli.output, options)
            .await
            .wrap_err("batch run");
    }

    let front = cli.input.clone().ok_or_else(|| eyre!("--input required"))?;
    let back = cli.back.clone().unwrap_or_else(|| front.clone());
    let label = front
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let set = ImageSet {
        front,
        back,
    };

    let mut summary = RunSummary {
        total: 1,
        ..RunSummary::default()
    };
    let out_dir = cli.output.join(&label);
    match pipeline.process_set(&set, &label, 0, &out_dir).await {
        Ok(output) => {
            sheet::write_csv(
                &out_dir.join("listings.csv"),
                pipeline.headers(),
                std::slice::from_ref(&output.row),
            )?;
            metrics::item_finished(&label, true);
            summary.successful = 1;
        }
        Err(err) => {
            metrics::item_finished(&label, false);
            pipeline
                .events()
                .error(Some(&label), format!("processing failed: {err}"));
            summary.failed = 1;
        }
    }
    Ok(summary)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt().with_env_filter(filter).try_init();
}
