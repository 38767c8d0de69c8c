//! Visual comparison of rendered HTML against reference mockups

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{debug, info, warn};

use docproof_common::{MockupPair, PairStatus, VisualSettings};

use crate::error::{VisualError, VisualResult};
use crate::playwright::RendererSession;

/// Largest possible distance between two RGB pixels (255 * sqrt(3)).
const MAX_CHANNEL_DISTANCE: f64 = 441.672_955_930_063_7;

/// Outcome of an optional-capability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub available: bool,
    pub reason: Option<String>,
}

impl Capability {
    pub fn available() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}

/// Check that PNG encode and decode work in this build.
pub fn probe_image_codec() -> Capability {
    let probe = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([12, 34, 56])));
    let mut buffer = Cursor::new(Vec::new());

    let result = probe
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .and_then(|_| image::load_from_memory(buffer.get_ref()));

    match result {
        Ok(decoded) if decoded.to_rgb8() == probe.to_rgb8() => Capability::available(),
        Ok(_) => Capability::unavailable("Image codec round trip produced different pixels"),
        Err(e) => Capability::unavailable(format!("Image processing unavailable: {}", e)),
    }
}

/// Check that the Node.js runtime can be started.
pub async fn probe_node(settings: &VisualSettings) -> Capability {
    match Command::new(&settings.node_binary)
        .arg("--version")
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            debug!(
                "Node.js {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Capability::available()
        }
        Ok(output) => Capability::unavailable(format!(
            "Unable to launch Playwright browser: {} --version exited with {}",
            settings.node_binary, output.status
        )),
        Err(e) => Capability::unavailable(format!(
            "Unable to launch Playwright browser: {} not found: {}",
            settings.node_binary, e
        )),
    }
}

/// Result of comparing a screenshot with its reference image
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// 0.0 (identical) - 1.0
    pub normalized: f64,
    /// 0.0 - 100.0, two decimals
    pub match_percent: f64,
    pub status: PairStatus,
    pub diff_image_path: Option<PathBuf>,
    pub details: String,
}

/// `Mismatch` only when the difference strictly exceeds the tolerance.
pub fn classify(normalized: f64, tolerance: f64) -> PairStatus {
    if normalized > tolerance {
        PairStatus::Mismatch
    } else {
        PairStatus::Match
    }
}

/// `100 * (1 - normalized)`, floored at zero and rounded to two decimals.
pub fn match_percent(normalized: f64) -> f64 {
    let percent = (100.0 * (1.0 - normalized)).max(0.0);
    (percent * 100.0).round() / 100.0
}

/// Absolute per-channel difference image and the normalized RMS distance.
///
/// The per-band RMS values are combined as `sqrt(sum(rms_b^2))` and divided by
/// the maximum RGB distance. Both images must have the same dimensions.
pub fn normalized_difference(reference: &RgbImage, actual: &RgbImage) -> (f64, RgbImage) {
    let (width, height) = reference.dimensions();
    let mut diff = RgbImage::new(width, height);
    let mut sum_squares = [0f64; 3];

    for (x, y, expected) in reference.enumerate_pixels() {
        let got = actual.get_pixel(x, y);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let d = expected.0[c].abs_diff(got.0[c]);
            out[c] = d;
            sum_squares[c] += f64::from(d) * f64::from(d);
        }
        diff.put_pixel(x, y, image::Rgb(out));
    }

    let pixels = u64::from(width) * u64::from(height);
    if pixels == 0 {
        return (0.0, diff);
    }

    let mean_squares: f64 = sum_squares.iter().map(|s| s / pixels as f64).sum();
    let normalized = (mean_squares.sqrt() / MAX_CHANNEL_DISTANCE).clamp(0.0, 1.0);
    (normalized, diff)
}

/// Scale difference pixels up so small deviations become visible.
pub fn amplify(diff: &RgbImage, factor: u8) -> RgbImage {
    let mut out = diff.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = channel.saturating_mul(factor);
        }
    }
    out
}

/// Compare a screenshot against its reference image on disk.
///
/// On mismatch the amplified difference is written to `diff_path`; on match
/// any stale file at `diff_path` is removed.
pub fn evaluate_images(
    reference: &Path,
    screenshot: &Path,
    diff_path: &Path,
    tolerance: f64,
    amplification: u8,
) -> VisualResult<Comparison> {
    let tolerance = tolerance.max(0.0);
    let expected = load_rgb(reference)?;
    let (normalized, diff) = if same_contents(reference, screenshot) {
        debug!("Screenshot matches {} exactly (same hash)", reference.display());
        (0.0, None)
    } else {
        let mut actual = load_rgb(screenshot)?;

        if actual.dimensions() != expected.dimensions() {
            debug!(
                "Resizing screenshot {:?} to reference {:?}",
                actual.dimensions(),
                expected.dimensions()
            );
            let (width, height) = expected.dimensions();
            actual = image::imageops::resize(&actual, width, height, FilterType::CatmullRom);
        }

        let (normalized, diff) = normalized_difference(&expected, &actual);
        (normalized, Some(diff))
    };

    let status = classify(normalized, tolerance);
    let mut comparison = Comparison {
        normalized,
        match_percent: match_percent(normalized),
        status,
        diff_image_path: None,
        details: String::new(),
    };

    match (status, diff) {
        (PairStatus::Mismatch, Some(diff)) => {
            amplify(&diff, amplification).save(diff_path)?;
            comparison.diff_image_path = Some(diff_path.to_path_buf());
            comparison.details = format!(
                "Visual diff exceeds tolerance ({:.4} > {:.4}).",
                normalized, tolerance
            );
        }
        _ => {
            if diff_path.exists() {
                std::fs::remove_file(diff_path)?;
            }
        }
    }

    Ok(comparison)
}

fn load_rgb(path: &Path) -> VisualResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| VisualError::ImageLoad(e.to_string()))
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (hash_file(a), hash_file(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Hash a file using SHA256
fn hash_file(path: &Path) -> VisualResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// File-name stem for the screenshot and diff of one pair.
///
/// Built from the page's path relative to `root` with components joined by
/// `__`, plus the mockup stem when it differs from the page stem, so pages
/// with the same name in different directories never share artifacts.
pub fn artifact_stem(root: &Path, html_path: &Path, reference: &Path) -> String {
    let relative = html_path.strip_prefix(root).unwrap_or(html_path);
    let mut parts: Vec<String> = relative
        .with_extension("")
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let page_stem = html_path.file_stem();
    if let Some(mockup_stem) = reference.file_stem() {
        if Some(mockup_stem) != page_stem {
            parts.push(mockup_stem.to_string_lossy().into_owned());
        }
    }

    if parts.is_empty() {
        "page".to_string()
    } else {
        parts.join("__")
    }
}

/// Screenshots HTML documents and diffs them against mockups.
///
/// Holds the renderer session for the whole run. Construction never fails; a
/// missing capability leaves the comparator unavailable and every comparison
/// reports `not_run` with the reason.
pub struct VisualComparator {
    settings: VisualSettings,
    assets_dir: PathBuf,
    root: PathBuf,
    tolerance: f64,
    capability: Capability,
    session: Option<RendererSession>,
}

impl VisualComparator {
    /// Probe capabilities and launch the renderer.
    ///
    /// Artifacts are written to `assets_dir` and named after each page's
    /// path relative to `root`.
    pub async fn start(
        settings: VisualSettings,
        assets_dir: PathBuf,
        root: PathBuf,
        tolerance: f64,
    ) -> Self {
        let image = probe_image_codec();
        if !image.available {
            return Self::unavailable(settings, assets_dir, root, tolerance, image);
        }

        let node = probe_node(&settings).await;
        if !node.available {
            return Self::unavailable(settings, assets_dir, root, tolerance, node);
        }

        match RendererSession::launch(&settings).await {
            Ok(session) => Self {
                settings,
                assets_dir,
                root,
                tolerance: tolerance.max(0.0),
                capability: Capability::available(),
                session: Some(session),
            },
            Err(e) => {
                let capability = Capability::unavailable(e.to_string());
                Self::unavailable(settings, assets_dir, root, tolerance, capability)
            }
        }
    }

    /// Comparator that never renders.
    pub fn unavailable(
        settings: VisualSettings,
        assets_dir: PathBuf,
        root: PathBuf,
        tolerance: f64,
        capability: Capability,
    ) -> Self {
        if let Some(reason) = &capability.reason {
            warn!("Visual comparison unavailable: {}", reason);
        }
        Self {
            settings,
            assets_dir,
            root,
            tolerance: tolerance.max(0.0),
            capability,
            session: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.capability.available && self.session.is_some()
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Engine the renderer launched with
    pub fn engine(&self) -> Option<&str> {
        self.session.as_ref().map(RendererSession::engine)
    }

    /// Render `html_path` and compare it with `reference`. Never fails; errors
    /// become the pair's status and details.
    pub async fn compare(&mut self, html_path: &Path, reference: &Path) -> MockupPair {
        let pair = MockupPair::new(reference, Some(html_path.to_path_buf()));

        let session = match self.session.as_mut() {
            Some(session) if self.capability.available => session,
            _ => {
                let reason = self
                    .capability
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Visual comparator unavailable.".to_string());
                return pair.with_status(PairStatus::NotRun, reason);
            }
        };

        let stem = artifact_stem(&self.root, html_path, reference);
        let screenshot_path = self.assets_dir.join(format!("{}_render.png", stem));
        let diff_path = self.assets_dir.join(format!("{}_diff.png", stem));

        let captured = match std::fs::create_dir_all(&self.assets_dir) {
            Ok(()) => {
                session
                    .screenshot(html_path, &screenshot_path, &self.settings)
                    .await
            }
            Err(e) => Err(VisualError::Io(e)),
        };
        if let Err(e) = captured {
            warn!("Screenshot of {} failed: {}", html_path.display(), e);
            return pair.with_status(PairStatus::Error, e.into_render().to_string());
        }

        let mut pair = MockupPair {
            screenshot_path: Some(screenshot_path.clone()),
            ..pair
        };

        match evaluate_images(
            reference,
            &screenshot_path,
            &diff_path,
            self.tolerance,
            self.settings.diff_amplification,
        ) {
            Ok(comparison) => {
                info!(
                    "{} vs {}: {} ({:.2}%)",
                    html_path.display(),
                    reference.display(),
                    comparison.status,
                    comparison.match_percent
                );
                pair.status = comparison.status;
                pair.match_percent = Some(comparison.match_percent);
                pair.diff_image_path = comparison.diff_image_path;
                pair.details = comparison.details;
                pair
            }
            Err(e) => {
                warn!("Comparison of {} failed: {}", html_path.display(), e);
                pair.with_status(PairStatus::Error, e.to_string())
            }
        }
    }

    /// Tear down the renderer session.
    pub async fn shutdown(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Renderer shutdown failed: {}", e);
            }
        }
    }
}
