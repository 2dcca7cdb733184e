use crate::metrics;
use crate::models::RunSummary;
use crate::pairing::{self, PairingError};
use crate::pipeline::Pipeline;
use crate::sheet::{self, SheetError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read batch root `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("batch root `{0}` contains no item folders")]
    NoFolders(String),
    #[error(transparent)]
    Pairing(#[from] PairingError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub workers: usize,
    pub skip_processed: bool,
    /// When set, every successful row across all folders also lands in one
    /// combined CSV at this path.
    pub export_csv: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            skip_processed: true,
            export_csv: None,
        }
    }
}

/// Outcome of one folder. `rows` is returned so batch mode can build the
/// combined export without re-reading the per-folder CSVs.
pub enum FolderStatus {
    Completed {
        rows: Vec<Vec<String>>,
        pairs: usize,
        failures: usize,
    },
    Skipped,
}

fn folder_label(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

/// Run every pair in one item folder and write its `listings.csv`. Pairs
/// are isolated: one failing pair is counted and skipped, the rest of the
/// folder still completes.
pub async fn process_folder(
    pipeline: &Pipeline,
    folder: &Path,
    output_root: &Path,
    skip_processed: bool,
) -> Result<FolderStatus, BatchError> {
    let label = folder_label(folder);
    if skip_processed && pairing::has_been_processed(output_root, &label) {
        info!(target = "lister.batch", item = %label, "already processed, skipping");
        pipeline
            .events()
            .info(Some(&label), "already processed, skipping");
        return Ok(FolderStatus::Skipped);
    }

    let sets = pairing::pair_folder(folder)?;
    let out_dir = output_root.join(&label);
    let mut rows = Vec::with_capacity(sets.len());
    let mut failures = 0usize;

    for (index, set) in sets.iter().enumerate() {
        match pipeline.process_set(set, &label, index, &out_dir).await {
            Ok(output) => {
                metrics::item_finished(&label, true);
                if let Ok(report) = serde_json::to_string(&output.report) {
                    debug!(target = "lister.batch", item = %label, report = %report, "stage report");
                }
                rows.push(output.row);
            }
            Err(err) => {
                metrics::item_finished(&label, false);
                failures += 1;
                warn!(
                    target = "lister.batch",
                    item = %label,
                    index = index,
                    error = %err,
                    "pair failed"
                );
                pipeline
                    .events()
                    .error(Some(&label), format!("pair {index} failed: {err}"));
            }
        }
    }

    if !rows.is_empty() {
        sheet::write_csv(&out_dir.join("listings.csv"), pipeline.headers(), &rows)?;
    }

    Ok(FolderStatus::Completed {
        pairs: sets.len(),
        failures,
        rows,
    })
}

/// Immediate subdirectories of the batch root, sorted by name so runs are
/// deterministic.
pub fn item_folders(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let entries = std::fs::read_dir(root).map_err(|source| BatchError::Io {
        path: root.display().to_string(),
        source,
    })?;
    let mut folders: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    folders.sort();
    if folders.is_empty() {
        return Err(BatchError::NoFolders(root.display().to_string()));
    }
    Ok(folders)
}

/// Process every item folder under `input_root` with bounded concurrency.
/// Folder-level problems (unreadable directory, no pairs) count the folder
/// as failed and the run continues.
pub async fn run_batch(
    pipeline: Pipeline,
    input_root: &Path,
    output_root: &Path,
    options: BatchOptions,
) -> Result<RunSummary, BatchError> {
    let folders = item_folders(input_root)?;
    let total_folders = folders.len();
    pipeline.events().info(
        None,
        format!(
            "batch run: {total_folders} folders, {} workers",
            options.workers.max(1)
        ),
    );

    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut join_set = JoinSet::new();
    for folder in folders {
        let semaphore = semaphore.clone();
        let pipeline = pipeline.clone();
        let output_root = output_root.to_path_buf();
        let skip_processed = options.skip_processed;
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                // Closed semaphore means the run is shutting down.
                Err(_) => return (folder, Ok(FolderStatus::Skipped)),
            };
            let status = process_folder(&pipeline, &folder, &output_root, skip_processed).await;
            (folder, status)
        });
    }

    let mut summary = RunSummary::default();
    let mut export_rows: Vec<Vec<String>> = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let (folder, status) = match joined {
            Ok(result) => result,
            Err(err) => {
                error!(target = "lister.batch", error = %err, "worker panicked");
                summary.failed += 1;
                summary.total += 1;
                continue;
            }
        };
        let label = folder_label(&folder);
        match status {
            Ok(FolderStatus::Completed {
                rows,
                pairs,
                failures,
            }) => {
                summary.total += pairs;
                summary.failed += failures;
                summary.successful += pairs - failures;
                if options.export_csv.is_some() {
                    export_rows.extend(rows);
                }
            }
            Ok(FolderStatus::Skipped) => {
                summary.skipped += 1;
            }
            Err(err) => {
                summary.total += 1;
                summary.failed += 1;
                pipeline
                    .events()
                    .error(Some(&label), format!("folder failed: {err}"));
            }
        }
    }

    if let Some(path) = &options.export_csv
        && !export_rows.is_empty()
    {
        sheet::write_csv(path, pipeline.headers(), &export_rows)?;
        info!(
            target = "lister.batch",
            path = %path.display(),
            rows = export_rows.len(),
            "combined export written"
        );
    }

    info!(
        target = "lister.batch",
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        skipped = summary.skipped,
        "batch run finished"
    );
    Ok(summary)
}
