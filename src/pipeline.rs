use crate::catalog::{self, Backend};
use crate::category;
use crate::config::Settings;
use crate::consensus::{self, AnalysisResult};
use crate::events::EventSender;
use crate::images;
use crate::llm::LlmClient;
use crate::metrics;
use crate::models::{ImageSet, ItemReport, ProcessedImages, StageReport};
use crate::sheet;
use crate::vision::{self, ExtractError, ProductKind, VocabSet};
use chrono::Local;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    pub stage: &'static str,
    pub message: String,
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    fn invalid(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }
}

struct StageOutcome<T> {
    value: T,
    output: Value,
}

async fn capture_stage<T, F>(
    reports: &mut Vec<StageReport>,
    name: &'static str,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<StageOutcome<T>, PipelineError>>,
{
    let start = Instant::now();
    let outcome = fut.await?;
    let elapsed = start.elapsed().as_millis();
    metrics::stage_elapsed(name, elapsed);
    reports.push(StageReport::new(name, elapsed, outcome.output));
    Ok(outcome.value)
}

/// One processed image set: the per-item stage trace plus the listing row
/// ready for the folder CSV.
pub struct ItemOutput {
    pub report: ItemReport,
    pub row: Vec<String>,
}

/// Shared, read-only per-run state. Clones are cheap, so batch workers
/// each carry one.
#[derive(Clone)]
pub struct Pipeline {
    pub settings: Arc<Settings>,
    llm: Arc<LlmClient>,
    vocab: Arc<VocabSet>,
    http: Client,
    backend: Backend,
    kind: ProductKind,
    headers: Arc<Vec<String>>,
    events: EventSender,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(
        settings: Arc<Settings>,
        llm: Arc<LlmClient>,
        vocab: Arc<VocabSet>,
        backend: Backend,
        kind: ProductKind,
        headers: Vec<String>,
        events: EventSender,
        dry_run: bool,
    ) -> Self {
        Self {
            settings,
            llm,
            vocab,
            http: crate::http::build_client(),
            backend,
            kind,
            headers: Arc::new(headers),
            events,
            dry_run,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Run one image set through every stage. Failures carry the stage
    /// name; the caller decides whether to abort the run or just count
    /// this item as failed.
    pub async fn process_set(
        &self,
        set: &ImageSet,
        label: &str,
        index: usize,
        output_dir: &Path,
    ) -> Result<ItemOutput, PipelineError> {
        let mut reports = Vec::new();
        self.events
            .info(Some(label), format!("processing pair {index}"));

        let processed = capture_stage(&mut reports, "build_images", async {
            let front = set.front.clone();
            let back = set.back.clone();
            let out = output_dir.to_path_buf();
            let bg = self.settings.background_color.clone();
            // Image decode/encode is CPU-bound; keep it off the runtime.
            let processed = tokio::task::spawn_blocking(move || {
                images::process_image_set(&front, &back, &out, index, &bg)
            })
            .await
            .map_err(|err| PipelineError::internal("build_images", err.to_string()))?
            .map_err(|err| PipelineError::invalid("build_images", err.to_string()))?;
            Ok(StageOutcome {
                output: json!({
                    "front": &processed.front,
                    "back": &processed.back,
                    "vision": &processed.vision,
                    "final": &processed.final_square,
                }),
                value: processed,
            })
        })
        .await?;

        let metadata = capture_stage(&mut reports, "extract_metadata", async {
            let metadata = self.extract_with_degradation(&processed, label).await?;
            let missing = category::missing_minimum_keys(&metadata);
            Ok(StageOutcome {
                output: json!({
                    "fields": metadata.0.len(),
                    "missing": missing,
                }),
                value: metadata,
            })
        })
        .await?;

        let merged = capture_stage(&mut reports, "merge_consensus", async {
            let assignment = category::assign(&metadata);
            let confidence = metadata
                .get_str("confidence")
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(0.8);
            let result = AnalysisResult {
                model_name: self.llm.model().to_string(),
                confidence,
                product_type: metadata
                    .get_any(&["product_type", "Product Type", "Type"])
                    .unwrap_or_default(),
                category_id: assignment.category_id,
                subcategory: metadata
                    .get_any(&["subcategory", "Subcategory"])
                    .unwrap_or_default(),
                metadata: metadata.clone(),
                raw_response: String::new(),
                processing_time_ms: 0,
            };
            let merged = consensus::merge(vec![result])
                .map_err(|err| PipelineError::internal("merge_consensus", err.to_string()))?;
            Ok(StageOutcome {
                output: json!({
                    "method": merged.consensus_method,
                    "confidence": merged.confidence,
                    "models": merged.individual_results.len(),
                }),
                value: merged,
            })
        })
        .await?;

        let assignment = capture_stage(&mut reports, "map_category", async {
            let assignment =
                category::map_category(&merged.product_type, &merged.subcategory);
            Ok(StageOutcome {
                output: json!({
                    "category_id": &assignment.category_id,
                    "subcategory_id": &assignment.subcategory_id,
                }),
                value: assignment,
            })
        })
        .await?;

        let urls = capture_stage(&mut reports, "upload_catalog", async {
            let urls = catalog::upload_set(
                &self.http,
                &self.settings,
                self.backend,
                label,
                &processed,
                self.dry_run,
            )
            .await
            .map_err(|err| PipelineError::internal("upload_catalog", err.to_string()))?;
            Ok(StageOutcome {
                output: json!({
                    "front": &urls.front,
                    "back": &urls.back,
                    "final": &urls.final_square,
                }),
                value: urls,
            })
        })
        .await?;

        let row = capture_stage(&mut reports, "build_row", async {
            let row = sheet::fill_row(
                &self.headers,
                &merged.metadata,
                &urls,
                label,
                &self.settings,
                Local::now().date_naive(),
            )
            .map_err(|err| PipelineError::invalid("build_row", err.to_string()))?;
            Ok(StageOutcome {
                output: json!({ "columns": row.len() }),
                value: row,
            })
        })
        .await?;

        info!(
            target = "lister.pipeline",
            item = label,
            index = index,
            category = %assignment.category_id,
            "image set processed"
        );
        self.events
            .success(Some(label), format!("pair {index} listed"));

        Ok(ItemOutput {
            report: ItemReport {
                label: label.to_string(),
                index,
                stages: reports,
            },
            row,
        })
    }

    /// An unparseable model reply degrades to an empty metadata map (the
    /// row is still written, mostly blank); transport and API errors fail
    /// the item. Dry runs never call the model at all, so an images-only
    /// run completes without an API key.
    async fn extract_with_degradation(
        &self,
        processed: &ProcessedImages,
        label: &str,
    ) -> Result<crate::models::ExtractedMetadata, PipelineError> {
        if self.dry_run {
            self.events
                .info(Some(label), "dry run, skipping metadata extraction");
            return Ok(crate::models::ExtractedMetadata::default());
        }
        let result =
            vision::extract_metadata(&self.llm, &processed.vision, self.kind, &self.vocab).await;
        self.degrade_extraction(result, label)
    }

    fn degrade_extraction(
        &self,
        result: Result<crate::models::ExtractedMetadata, ExtractError>,
        label: &str,
    ) -> Result<crate::models::ExtractedMetadata, PipelineError> {
        match result {
            Ok(metadata) => Ok(metadata),
            Err(ExtractError::Parse) => {
                warn!(
                    target = "lister.pipeline",
                    item = label,
                    "model reply was not valid JSON, continuing with empty metadata"
                );
                self.events
                    .warn(Some(label), "metadata extraction returned no usable JSON");
                Ok(crate::models::ExtractedMetadata::default())
            }
            Err(err @ ExtractError::Io { .. }) => {
                Err(PipelineError::invalid("extract_metadata", err.to_string()))
            }
            Err(err) => Err(PipelineError::internal("extract_metadata", err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmConfig, LlmError};
    use crate::models::ExtractedMetadata;
    use std::path::PathBuf;

    fn test_pipeline(dry_run: bool) -> Pipeline {
        let (events, _renderer) = crate::events::channel();
        Pipeline::new(
            Arc::new(Settings::default()),
            Arc::new(LlmClient::new(LlmConfig::new("", "gpt-4o"))),
            Arc::new(VocabSet::default()),
            Backend::S3,
            ProductKind::Postcard,
            Vec::new(),
            events,
            dry_run,
        )
    }

    #[test]
    fn error_constructors_keep_stage_and_kind() {
        let err = PipelineError::invalid("build_images", "bad jpeg");
        assert_eq!(err.stage, "build_images");
        assert_eq!(err.kind, PipelineErrorKind::InvalidInput);
        assert_eq!(
            err.to_string(),
            "stage `build_images` failed: bad jpeg"
        );
    }

    #[tokio::test]
    async fn capture_stage_records_a_report_per_stage() {
        let mut reports = Vec::new();
        let value = capture_stage(&mut reports, "map_category", async {
            Ok(StageOutcome {
                output: json!({"category_id": "10398"}),
                value: 42u32,
            })
        })
        .await
        .expect("stage");
        assert_eq!(value, 42);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "map_category");
        assert_eq!(reports[0].output["category_id"], "10398");
    }

    #[tokio::test]
    async fn capture_stage_propagates_failures_without_a_report() {
        let mut reports = Vec::new();
        let result: Result<u32, _> = capture_stage(&mut reports, "upload_catalog", async {
            Err(PipelineError::internal("upload_catalog", "HTTP 503"))
        })
        .await;
        assert!(result.is_err());
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn dry_run_skips_extraction_even_without_an_api_key() {
        let pipeline = test_pipeline(true);
        let processed = ProcessedImages {
            front: PathBuf::from("front_0.jpg"),
            back: PathBuf::from("back_0.jpg"),
            vision: PathBuf::from("does-not-exist/vision_0.jpg"),
            final_square: PathBuf::from("final_0.jpg"),
        };
        let metadata = pipeline
            .extract_with_degradation(&processed, "Box 1")
            .await
            .expect("dry run must not touch the model");
        assert!(metadata.0.is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_degrades_to_empty_metadata() {
        let pipeline = test_pipeline(false);
        let metadata = pipeline
            .degrade_extraction(Err(ExtractError::Parse), "Box 1")
            .expect("parse failure degrades");
        assert!(metadata.0.is_empty());
    }

    #[tokio::test]
    async fn api_and_io_failures_still_fail_the_item() {
        let pipeline = test_pipeline(false);

        let err = pipeline
            .degrade_extraction(Err(ExtractError::Api(LlmError::MissingApiKey)), "Box 1")
            .expect_err("api failure is not degraded");
        assert_eq!(err.stage, "extract_metadata");
        assert_eq!(err.kind, PipelineErrorKind::Internal);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = pipeline
            .degrade_extraction(
                Err(ExtractError::Io {
                    path: "vision_0.jpg".into(),
                    source: io,
                }),
                "Box 1",
            )
            .expect_err("missing composite is not degraded");
        assert_eq!(err.kind, PipelineErrorKind::InvalidInput);
    }

    #[test]
    fn confidence_parses_from_metadata_strings_and_numbers() {
        let meta = ExtractedMetadata::from_value(serde_json::json!({
            "confidence": 0.93,
        }))
        .expect("object");
        let parsed = meta
            .get_str("confidence")
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(0.8);
        assert!((parsed - 0.93).abs() < 1e-9);

        let missing = ExtractedMetadata::default()
            .get_str("confidence")
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(0.8);
        assert!((missing - 0.8).abs() < 1e-9);
    }
}
