use super::CatalogError;
use crate::config::Settings;
use reqwest::Client;
use std::path::Path;

/// Public URL for a key: the custom base URL when configured, otherwise
/// the bucket's virtual-hosted address.
pub fn public_url(settings: &Settings, key: &str) -> String {
    if settings.s3_base_url.trim().is_empty() {
        format!(
            "https://{}.s3.{}.amazonaws.com/{key}",
            settings.s3_bucket, settings.aws_region
        )
    } else {
        format!("{}/{key}", settings.s3_base_url.trim_end_matches('/'))
    }
}

/// Legacy catalog path. The bucket is expected to accept the PUT (public
/// write policy or a proxy injecting credentials at `s3_base_url`); this
/// tool does not sign requests itself.
pub async fn upload_file(
    client: &Client,
    settings: &Settings,
    key: &str,
    path: &Path,
    dry_run: bool,
) -> Result<String, CatalogError> {
    if settings.s3_bucket.trim().is_empty() {
        return Err(CatalogError::NotConfigured("s3_bucket is empty"));
    }

    let url = public_url(settings, key);
    if dry_run {
        return Ok(url);
    }

    let body = std::fs::read(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let response = client
        .put(&url)
        .header("Content-Type", "image/jpeg")
        .body(body)
        .send()
        .await
        .map_err(|err| CatalogError::Request(err.to_string()))?;

    if !response.status().is_success() {
        return Err(CatalogError::Status {
            status: response.status().as_u16(),
            url,
        });
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bucket_url() {
        let mut settings = Settings::default();
        settings.s3_bucket = "pcc-ebay-photos".into();
        assert_eq!(
            public_url(&settings, "Postcards/2026-08-27/Box_1/front_0.jpg"),
            "https://pcc-ebay-photos.s3.us-east-1.amazonaws.com/Postcards/2026-08-27/Box_1/front_0.jpg"
        );
    }

    #[test]
    fn custom_base_url_wins() {
        let mut settings = Settings::default();
        settings.s3_bucket = "bucket".into();
        settings.s3_base_url = "https://cdn.example.com/".into();
        assert_eq!(
            public_url(&settings, "k/v.jpg"),
            "https://cdn.example.com/k/v.jpg"
        );
    }

    #[tokio::test]
    async fn unconfigured_bucket_is_rejected() {
        let settings = Settings::default();
        let client = crate::http::build_client();
        let err = upload_file(&client, &settings, "k", Path::new("x.jpg"), true)
            .await
            .expect_err("must reject");
        assert!(matches!(err, CatalogError::NotConfigured(_)));
    }
}
