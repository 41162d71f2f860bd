use thiserror::Error;

/// Error type returned by collaborator ports (detector, text reader, owner
/// registry, notifier). Implementations outside this crate can put anything here.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Toml Error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not open source {source_ref}: {reason}")]
    SourceOpen { source_ref: String, reason: String },

    #[error("frame read failed: {0}")]
    SourceRead(String),

    /// One frame could not be decoded; the source itself is still usable.
    #[error("frame {index} could not be decoded: {reason}")]
    FrameDecode { index: u64, reason: String },

    #[error("Detector Error: {0}")]
    Detector(BoxError),

    #[error("assignment could not be solved: {0}")]
    Assignment(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}
