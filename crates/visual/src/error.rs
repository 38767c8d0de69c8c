//! Error types for visual comparison

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisualError {
    #[error("{0}")]
    RendererUnavailable(String),

    #[error("Failed to capture screenshot: {0}")]
    Render(String),

    #[error("Unable to load images for comparison: {0}")]
    ImageLoad(String),

    #[error("Renderer protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl VisualError {
    /// Fold any failure during capture into a render failure.
    pub fn into_render(self) -> Self {
        match self {
            VisualError::Render(_) => self,
            other => VisualError::Render(other.to_string()),
        }
    }
}

pub type VisualResult<T> = Result<T, VisualError>;
