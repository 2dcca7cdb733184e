use super::CatalogError;
use crate::config::Settings;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ContentsRequest {
    message: String,
    content: String,
    branch: String,
}

/// Raw-content URL for a committed path.
pub fn public_url(settings: &Settings, key: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{}/{}/{}/{key}",
        settings.github_owner, settings.github_repo, settings.github_branch
    )
}

/// Commit one image through the repository contents API. One commit per
/// file keeps the handler simple; catalogs are low-volume.
pub async fn upload_file(
    client: &Client,
    settings: &Settings,
    key: &str,
    path: &Path,
    dry_run: bool,
) -> Result<String, CatalogError> {
    if !settings.has_github_catalog() {
        return Err(CatalogError::NotConfigured(
            "github_token/github_owner/github_repo are required",
        ));
    }

    let url = public_url(settings, key);
    if dry_run {
        return Ok(url);
    }

    let body = std::fs::read(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let api_url = format!(
        "https://api.github.com/repos/{}/{}/contents/{key}",
        settings.github_owner, settings.github_repo
    );
    let payload = ContentsRequest {
        message: format!("Catalog upload: {key}"),
        content: BASE64.encode(&body),
        branch: settings.github_branch.clone(),
    };

    let response = client
        .put(&api_url)
        .bearer_auth(&settings.github_token)
        .header("Accept", "application/vnd.github+json")
        .json(&payload)
        .send()
        .await
        .map_err(|err| CatalogError::Request(err.to_string()))?;

    if !response.status().is_success() {
        return Err(CatalogError::Status {
            status: response.status().as_u16(),
            url: api_url,
        });
    }

    Ok(url)
}
