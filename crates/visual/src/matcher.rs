//! Pairing of mockup images with HTML documents

use std::path::{Path, PathBuf};

use tracing::debug;

use docproof_common::MockupPair;

use crate::error::VisualResult;

/// Raster formats treated as mockups (case-insensitive).
pub const MOCKUP_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub const NO_HTML_DETAILS: &str = "No HTML files found in directory for comparison.";

/// Image files directly inside `dir`, sorted case-insensitively by name.
pub fn find_mockups(dir: &Path) -> VisualResult<Vec<PathBuf>> {
    list_files(dir, |path| {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| MOCKUP_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    })
}

/// `*.html` files directly inside `dir`, sorted case-insensitively by name.
pub fn find_html_files(dir: &Path) -> VisualResult<Vec<PathBuf>> {
    list_files(dir, |path| path.extension().map(|e| e == "html").unwrap_or(false))
}

fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> VisualResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && keep(&path) {
            files.push(path);
        }
    }
    files.sort_by_key(|p| lowercase_name(p));
    Ok(files)
}

fn lowercase_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn lowercase_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// HTML counterpart for a mockup: same stem, then `index`, then the first file.
pub fn match_html<'a>(mockup: &Path, html_files: &'a [PathBuf]) -> Option<&'a PathBuf> {
    let base = lowercase_stem(mockup);
    html_files
        .iter()
        .find(|html| lowercase_stem(html) == base)
        .or_else(|| html_files.iter().find(|html| lowercase_stem(html) == "index"))
        .or_else(|| html_files.first())
}

/// Unevaluated pairs for every mockup in `dir`.
///
/// Mockups without any HTML in the directory come back as `no_html`; the rest
/// are `not_run` until compared. A directory without images yields nothing.
pub fn pair_mockups(dir: &Path) -> VisualResult<Vec<MockupPair>> {
    let images = find_mockups(dir)?;
    if images.is_empty() {
        return Ok(Vec::new());
    }

    let html_files = find_html_files(dir)?;
    debug!(
        "{}: {} mockup(s), {} HTML file(s)",
        dir.display(),
        images.len(),
        html_files.len()
    );

    Ok(images
        .into_iter()
        .map(|image| match match_html(&image, &html_files) {
            Some(html) => MockupPair::new(image, Some(html.clone())),
            None => MockupPair::no_html(image, NO_HTML_DETAILS),
        })
        .collect())
}
