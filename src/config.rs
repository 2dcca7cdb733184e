use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Process-wide settings, loaded once at startup from a JSON file and
/// read-only afterward. Every key has a default so a missing file still
/// yields a usable (offline) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_model: String,
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub s3_bucket: String,
    pub aws_region: String,
    pub s3_base_url: String,
    pub github_token: String,
    pub github_owner: String,
    pub github_repo: String,
    pub github_branch: String,
    pub background_color: String,
    pub custom_html: String,
    pub store_category_id: String,
    pub zip_code: String,
    pub shipping_policy: String,
    pub return_policy: String,
    pub payment_policy: String,
    pub use_multi_llm: bool,
    pub use_github_catalog: bool,
    pub csv_template: String,
    pub banner_url: String,
    pub data_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_model: "gpt-4o".into(),
            aws_access_key: String::new(),
            aws_secret_key: String::new(),
            s3_bucket: String::new(),
            aws_region: "us-east-1".into(),
            s3_base_url: String::new(),
            github_token: String::new(),
            github_owner: String::new(),
            github_repo: String::new(),
            github_branch: "main".into(),
            background_color: "#000000".into(),
            custom_html: String::new(),
            store_category_id: "4231764019".into(),
            zip_code: String::new(),
            shipping_policy: String::new(),
            return_policy: String::new(),
            payment_policy: String::new(),
            use_multi_llm: true,
            use_github_catalog: false,
            csv_template: "templates/ebay_template.csv".into(),
            banner_url: "https://pcc-ebay-photos.s3.us-east-1.amazonaws.com/PCC-banner.png"
                .into(),
            data_dir: "data".into(),
        }
    }
}

impl Settings {
    /// Missing file is not an error (first-run experience); a present but
    /// malformed file is.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(target = "lister.config", path = %path.display(), "settings file missing, using defaults");
            let mut settings = Self::default();
            settings.apply_env_fallbacks();
            return Ok(settings);
        }
        let raw = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&raw)?;
        settings.apply_env_fallbacks();
        Ok(settings)
    }

    /// Environment variables fill in keys the JSON file leaves blank.
    pub fn apply_env_fallbacks(&mut self) {
        if self.openai_api_key.trim().is_empty()
            && let Ok(key) = std::env::var("OPENAI_API_KEY")
        {
            self.openai_api_key = key;
        }
        if self.github_token.trim().is_empty() {
            if let Ok(token) = std::env::var("GH_TOKEN") {
                self.github_token = token;
            } else if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                self.github_token = token;
            }
        }
    }

    pub fn has_openai_key(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }

    pub fn has_github_catalog(&self) -> bool {
        !self.github_token.trim().is_empty()
            && !self.github_owner.trim().is_empty()
            && !self.github_repo.trim().is_empty()
    }
}
