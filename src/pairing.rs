use crate::models::ImageSet;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("failed to read folder `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("no image pairs found in `{0}`")]
    NoPairs(String),
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

fn is_generated(name: &str) -> bool {
    name.starts_with("vision_") || name.starts_with("final_")
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Pair scans by filename order: files sorted lexicographically, then
/// (0,1), (2,3), ... Scanner output names sort front-before-back, which
/// is the convention this relies on. Previously generated `vision_*` and
/// `final_*` files are ignored so a re-run does not pair its own output.
pub fn pair_folder(folder: &Path) -> Result<Vec<ImageSet>, PairingError> {
    let entries = std::fs::read_dir(folder).map_err(|source| PairingError::Io {
        path: folder.display().to_string(),
        source,
    })?;

    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| !is_generated(name))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    if files.len() % 2 != 0 {
        warn!(
            target = "lister.pairing",
            folder = %folder.display(),
            count = files.len(),
            "odd number of scans, dropping the last file"
        );
        files.pop();
    }

    let pairs: Vec<ImageSet> = files
        .chunks_exact(2)
        .map(|pair| ImageSet {
            front: pair[0].clone(),
            back: pair[1].clone(),
        })
        .collect();

    if pairs.is_empty() {
        return Err(PairingError::NoPairs(folder.display().to_string()));
    }
    Ok(pairs)
}

/// A folder counts as processed once its listings CSV exists in the
/// output tree, so interrupted batch runs can resume where they stopped.
pub fn has_been_processed(output_dir: &Path, label: &str) -> bool {
    output_dir.join(label).join("listings.csv").is_file()
}
