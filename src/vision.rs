use crate::llm::{LlmClient, LlmError};
use crate::models::ExtractedMetadata;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read image `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("llm request failed: {0}")]
    Api(#[from] LlmError),
    #[error("response is not a JSON object")]
    Parse,
}

/// Which prompt family to use for one run. Hint-driven: a `--product-hint`
/// containing "solar" or "postcard" selects the specialized prompt,
/// anything else gets the universal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    Postcard,
    SolarPanel,
    Generic,
}

impl ProductKind {
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some(value) if value.to_lowercase().contains("solar") => ProductKind::SolarPanel,
            Some(value) if value.to_lowercase().contains("postcard") => ProductKind::Postcard,
            Some(_) => ProductKind::Generic,
            None => ProductKind::Postcard,
        }
    }
}

/// Controlled vocabularies embedded into the postcard prompt so the model
/// prefers known values over free invention. A missing file is an empty
/// list, not an error.
#[derive(Debug, Clone, Default)]
pub struct VocabSet {
    pub regions: Vec<String>,
    pub cities: Vec<String>,
    pub countries: Vec<String>,
    pub subjects: Vec<String>,
    pub themes: Vec<String>,
    pub types: Vec<String>,
    pub eras: Vec<String>,
}

impl VocabSet {
    pub fn load(dir: &Path) -> Self {
        Self {
            regions: read_value_list(&dir.join("region_values.txt")),
            cities: read_value_list(&dir.join("city_values.txt")),
            countries: read_value_list(&dir.join("country_values.txt")),
            subjects: read_value_list(&dir.join("subject_values.txt")),
            themes: read_value_list(&dir.join("theme_values.txt")),
            types: read_value_list(&dir.join("type_values.txt")),
            eras: read_value_list(&dir.join("era_values.txt")),
        }
    }
}

fn read_value_list(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => {
            warn!(target = "lister.vision", path = %path.display(), "vocabulary file missing");
            Vec::new()
        }
    }
}

pub fn postcard_prompt(vocab: &VocabSet) -> String {
    let mut prompt = String::from(
        "You are a postcard expert that extracts structured metadata from postcard images for eBay listings. \
         You are given a combined image of a postcard front and back. \
         Please extract the following fields in JSON format: City, State, Country, Region, Year, Publisher, \
         Era, Type, Subject, Theme, Title, Description, Posted. \
         If you cannot find a match, return an empty string for that element.\n\n",
    );
    push_vocab(&mut prompt, "Region", &vocab.regions);
    push_vocab(&mut prompt, "City", &vocab.cities);
    push_vocab(&mut prompt, "Country", &vocab.countries);
    push_vocab(&mut prompt, "Subject", &vocab.subjects);
    push_vocab(&mut prompt, "Theme", &vocab.themes);
    push_vocab(&mut prompt, "Type", &vocab.types);
    push_vocab(&mut prompt, "Era", &vocab.eras);
    prompt.push_str(
        "For 'Title', provide an eBay search engine optimized title that accurately describes the card. \
         The title must be 80 characters maximum and should always include the word 'Postcard'. \
         Use as many of those 80 characters as possible with relevant keywords such as the subject, theme, \
         city and state; do not repeat keywords. Aim for at least 70 characters but never exceed 80.\n\
         For 'Description', provide a detailed description of the postcard formatted as HTML paragraphs \
         suitable for an eBay description.\n\
         For 'Posted', choose either 'Posted' or 'Unposted'. A card with a stamp and/or writing is Posted; \
         a blank card is Unposted.\n\
         If there are people in the image you do NOT have to personally identify them.",
    );
    prompt
}

fn push_vocab(prompt: &mut String, field: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    prompt.push_str(&format!(
        "For '{field}', choose the closest match from this list, if any:\n{}\n\n",
        values.join(", ")
    ));
}

pub fn solar_panel_prompt() -> String {
    "You are a solar equipment expert that extracts structured metadata from solar panel images \
     for eBay listings. Analyze the panel and return a JSON object with these fields: \
     product_type, brand, model, wattage, voltage, cell_type, dimensions, condition, \
     subcategory, confidence, Title, Description. \
     cell_type is one of Monocrystalline, Polycrystalline, Flexible, Bifacial when identifiable. \
     confidence is a number between 0 and 1. \
     Title must be an SEO-optimized eBay title of at most 80 characters. \
     Description is detailed HTML suitable for an eBay listing. Output JSON only."
        .to_string()
}

pub fn universal_prompt() -> String {
    "You are a product listing expert. Analyze this product image and return a JSON object with: \
     product_type, subcategory, confidence, brand, model, specifications, condition, \
     Title, Description. confidence is a number between 0 and 1. \
     Title must be an SEO-optimized eBay title of at most 80 characters. \
     Description is detailed HTML suitable for an eBay listing. Output JSON only."
        .to_string()
}

pub fn system_prompt(kind: ProductKind, vocab: &VocabSet) -> String {
    match kind {
        ProductKind::Postcard => postcard_prompt(vocab),
        ProductKind::SolarPanel => solar_panel_prompt(),
        ProductKind::Generic => universal_prompt(),
    }
}

/// Send the vision composite to the model and parse the JSON reply.
/// Outcomes stay typed: an API failure and a malformed reply are different
/// errors, so the caller decides how to degrade.
pub async fn extract_metadata(
    llm: &LlmClient,
    image_path: &Path,
    kind: ProductKind,
    vocab: &VocabSet,
) -> Result<ExtractedMetadata, ExtractError> {
    let bytes = std::fs::read(image_path).map_err(|source| ExtractError::Io {
        path: image_path.display().to_string(),
        source,
    })?;
    let image_b64 = BASE64.encode(&bytes);

    let response = llm
        .chat_vision(
            &system_prompt(kind, vocab),
            "Please analyze this product and extract the metadata in JSON format.",
            &image_b64,
        )
        .await?;

    debug!(
        target = "lister.vision",
        model = llm.model(),
        bytes = bytes.len(),
        "vision response received"
    );
    parse_response(&response.text)
}

pub fn parse_response(raw: &str) -> Result<ExtractedMetadata, ExtractError> {
    let cleaned = strip_markdown_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|_| ExtractError::Parse)?;
    ExtractedMetadata::from_value(value).ok_or(ExtractError::Parse)
}

pub fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_parses() {
        let meta = parse_response("```json\n{\"Title\": \"X\"}\n```").expect("parse");
        assert_eq!(meta.get_str("Title").as_deref(), Some("X"));
    }

    #[test]
    fn bare_fence_parses_too() {
        let meta = parse_response("```\n{\"Title\": \"Y\", \"Year\": 1950}\n```").expect("parse");
        assert_eq!(meta.get_str("Year").as_deref(), Some("1950"));
    }

    #[test]
    fn non_json_is_a_parse_error() {
        assert!(matches!(
            parse_response("not json at all"),
            Err(ExtractError::Parse)
        ));
    }

    #[test]
    fn json_array_is_a_parse_error() {
        assert!(matches!(parse_response("[1, 2, 3]"), Err(ExtractError::Parse)));
    }

    #[test]
    fn fence_strip_leaves_plain_text_alone() {
        assert_eq!(strip_markdown_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn product_kind_from_hint() {
        assert_eq!(
            ProductKind::from_hint(Some("Used Solar Panel")),
            ProductKind::SolarPanel
        );
        assert_eq!(
            ProductKind::from_hint(Some("vintage postcard")),
            ProductKind::Postcard
        );
        assert_eq!(ProductKind::from_hint(Some("camera")), ProductKind::Generic);
        assert_eq!(ProductKind::from_hint(None), ProductKind::Postcard);
    }

    #[test]
    fn postcard_prompt_embeds_vocab_and_skips_empty_lists() {
        let vocab = VocabSet {
            regions: vec!["New England".into(), "Midwest".into()],
            ..VocabSet::default()
        };
        let prompt = postcard_prompt(&vocab);
        assert!(prompt.contains("New England, Midwest"));
        assert!(!prompt.contains("For 'City', choose"));
        assert!(prompt.contains("the word 'Postcard'"));
    }

    #[test]
    fn vocab_load_tolerates_missing_dir() {
        let vocab = VocabSet::load(Path::new("/definitely/not/here"));
        assert!(vocab.regions.is_empty());
        assert!(vocab.eras.is_empty());
    }

    #[test]
    fn vocab_load_reads_trimmed_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("era_values.txt"),
            "Divided Back (1907-1915)\n\n  Linen (1930-1945)  \n",
        )
        .expect("write");
        let vocab = VocabSet::load(dir.path());
        assert_eq!(
            vocab.eras,
            vec!["Divided Back (1907-1915)", "Linen (1930-1945)"]
        );
    }
}
