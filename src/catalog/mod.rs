mod github;
mod s3;

use crate::config::Settings;
use crate::models::{CatalogUrls, ProcessedImages};
use chrono::Local;
use reqwest::Client;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("upload rejected: HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("catalog backend is not configured: {0}")]
    NotConfigured(&'static str),
}

/// Which blob store receives the processed images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    S3,
    GitHub,
}

impl Backend {
    pub fn from_settings(settings: &Settings, github_flag: bool) -> Self {
        if github_flag || settings.use_github_catalog {
            Backend::GitHub
        } else {
            Backend::S3
        }
    }
}

/// Replace anything outside `[A-Za-z0-9_.-]` so keys stay URL-safe.
pub fn sanitize_path_part(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Date-partitioned key layout shared by both backends:
/// `Postcards/{YYYY-MM-DD}/{folder}/{file}`.
pub fn object_key(folder_label: &str, file_name: &str, date: &str) -> String {
    format!(
        "Postcards/{date}/{}/{}",
        sanitize_path_part(folder_label),
        sanitize_path_part(file_name)
    )
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string())
}

/// Push the front, back and final variants and hand back their public
/// URLs. The vision composite stays local; it exists only for the model.
/// With `dry_run` the URLs are constructed without any network traffic.
pub async fn upload_set(
    client: &Client,
    settings: &Settings,
    backend: Backend,
    folder_label: &str,
    processed: &ProcessedImages,
    dry_run: bool,
) -> Result<CatalogUrls, CatalogError> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let mut urls = Vec::with_capacity(3);

    for path in [&processed.front, &processed.back, &processed.final_square] {
        let key = object_key(folder_label, &file_name(path), &date);
        let url = match backend {
            Backend::S3 => {
                s3::upload_file(client, settings, &key, path, dry_run).await?
            }
            Backend::GitHub => {
                github::upload_file(client, settings, &key, path, dry_run).await?
            }
        };
        urls.push(url);
    }

    info!(
        target = "lister.catalog",
        folder = folder_label,
        backend = ?backend,
        dry_run = dry_run,
        "image set uploaded"
    );

    let mut iter = urls.into_iter();
    Ok(CatalogUrls {
        front: iter.next().unwrap_or_default(),
        back: iter.next().unwrap_or_default(),
        final_square: iter.next().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_path_part("Lot #4 (new)"), "Lot__4__new_");
        assert_eq!(sanitize_path_part("front_1.jpg"), "front_1.jpg");
    }

    #[test]
    fn object_key_layout() {
        assert_eq!(
            object_key("Box 12", "front_0.jpg", "2026-08-27"),
            "Postcards/2026-08-27/Box_12/front_0.jpg"
        );
    }

    #[test]
    fn backend_selection() {
        let mut settings = Settings::default();
        assert_eq!(Backend::from_settings(&settings, false), Backend::S3);
        assert_eq!(Backend::from_settings(&settings, true), Backend::GitHub);
        settings.use_github_catalog = true;
        assert_eq!(Backend::from_settings(&settings, false), Backend::GitHub);
    }

    #[tokio::test]
    async fn dry_run_constructs_urls_without_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let touch = |name: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"jpeg").expect("write");
            path
        };
        let processed = ProcessedImages {
            front: touch("front_0.jpg"),
            back: touch("back_0.jpg"),
            vision: touch("vision_0.jpg"),
            final_square: touch("final_0.jpg"),
        };
        let mut settings = Settings::default();
        settings.s3_bucket = "my-bucket".into();
        let client = crate::http::build_client();
        let urls = upload_set(&client, &settings, Backend::S3, "Box 1", &processed, true)
            .await
            .expect("dry run");
        assert!(urls.front.contains("my-bucket"));
        assert!(urls.front.ends_with("front_0.jpg"));
        assert!(urls.final_square.ends_with("final_0.jpg"));
    }
}
