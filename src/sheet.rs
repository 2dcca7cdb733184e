use crate::config::Settings;
use crate::models::{CatalogUrls, ExtractedMetadata};
use chrono::{Duration, NaiveDate};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read csv template `{path}`: {source}")]
    Template {
        path: String,
        source: csv::Error,
    },
    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("custom html references missing metadata key `{0}`")]
    MissingPlaceholder(String),
    #[error("unbalanced brace in custom html template")]
    UnbalancedBrace,
}

const ACTION_COLUMN: &str = "*Action(SiteID=US|Country=US|Currency=USD|Version=1193)";
const CATEGORY_NAME: &str =
    "/Collectibles/Postcards & Supplies/Postcards/Topographical Postcards";
const DISCLAIMER: &str = "<p>You will receive the exact postcard in the scans. Please view the \
     scans and message me if you have any questions because I can usually respond within \
     minutes.</p>";

/// The template's header row is the authoritative column order for every
/// emitted CSV.
pub fn load_template_headers(path: &Path) -> Result<Vec<String>, SheetError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|source| SheetError::Template {
            path: path.display().to_string(),
            source,
        })?;
    let headers = reader
        .headers()
        .map_err(|source| SheetError::Template {
            path: path.display().to_string(),
            source,
        })?;
    Ok(headers.iter().map(str::to_string).collect())
}

/// Fill one listing row. Every template column not explicitly set stays an
/// empty string, so the output always matches the header width exactly.
pub fn fill_row(
    headers: &[String],
    metadata: &ExtractedMetadata,
    urls: &CatalogUrls,
    folder_label: &str,
    settings: &Settings,
    today: NaiveDate,
) -> Result<Vec<String>, SheetError> {
    let title = metadata.get_any(&["Title", "title"]).unwrap_or_default();
    let description = metadata
        .get_any(&["Description", "description"])
        .unwrap_or_default();
    let custom = render_template(&settings.custom_html, metadata)?;
    let schedule = today + Duration::days(1);

    let value_for = |header: &str| -> String {
        match header {
            h if h == ACTION_COLUMN => "Add".into(),
            "Custom label (SKU)" => format!("{folder_label} - {}", today.format("%Y-%m-%d")),
            "Title" => title.clone(),
            "Schedule Time" => format!("{} 18:00:00", schedule.format("%Y-%m-%d")),
            "Item photo URL" => format!(
                "{}|{}|{}|{}",
                urls.front, urls.back, urls.final_square, settings.banner_url
            ),
            "Category ID" => "262042".into(),
            "Condition ID" => "3000-Used".into(),
            "Category name" => CATEGORY_NAME.into(),
            "Start price" => "8.99".into(),
            "Quantity" => "1".into(),
            "Format" => "FixedPrice".into(),
            "Duration" => "GTC".into(),
            "Best Offer Enabled" => "1".into(),
            "Location" => settings.zip_code.clone(),
            "Shipping profile name" => settings.shipping_policy.clone(),
            "Return profile name" => settings.return_policy.clone(),
            "Payment profile name" => settings.payment_policy.clone(),
            "Store category" => settings.store_category_id.clone(),
            "C:Unit of Sale" => "Single Unit".into(),
            "C:Region" => metadata.get_any(&["Region"]).unwrap_or_default(),
            "C:City" => metadata.get_any(&["City"]).unwrap_or_default(),
            "C:Subject" => metadata.get_any(&["Subject"]).unwrap_or_default(),
            "C:Country" => metadata.get_any(&["Country"]).unwrap_or_default(),
            "C:Original/Licensed Reprint" => "Original".into(),
            "C:Theme" => metadata.get_any(&["Theme"]).unwrap_or_default(),
            "C:Type" => metadata.get_any(&["Type"]).unwrap_or_default(),
            "C:Posted Condition" => metadata
                .get_any(&["Posted Condition", "Posted"])
                .unwrap_or_default(),
            "C:Era" => metadata.get_any(&["Era"]).unwrap_or_default(),
            "Description" => {
                format!("<h1>{title}</h1><br>{DISCLAIMER}<br>{description}{custom}")
            }
            _ => String::new(),
        }
    };

    Ok(headers.iter().map(|header| value_for(header)).collect())
}

/// Format-string substitution for the user-supplied description
/// template: `{key}` pulls from metadata, `{{`/`}}` escape literal braces.
/// A missing key is a hard error; the caller reports the item as failed
/// rather than shipping a listing with a hole in it.
pub fn render_template(
    template: &str,
    metadata: &ExtractedMetadata,
) -> Result<String, SheetError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => name.push(inner),
                        None => return Err(SheetError::UnbalancedBrace),
                    }
                }
                let value = metadata
                    .get_str(&name)
                    .ok_or_else(|| SheetError::MissingPlaceholder(name.clone()))?;
                out.push_str(&value);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(SheetError::UnbalancedBrace);
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Write header plus rows; always UTF-8, comma-delimited, one header row.
pub fn write_csv(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<(), SheetError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(SheetError::Write)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
