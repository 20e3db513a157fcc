mod audio;
mod model;
mod reconcile;
mod text;

pub use audio::{majority_vote, AudioClassifier, AudioVerdict};
pub use model::{LinearModel, Scaler};
pub use reconcile::reconcile;
pub use text::{tokenize, TextClassifier, TextVectorizer};

use crate::mood::MoodLabel;

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid model artifact {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("malformed model: {0}")]
    Malformed(String),

    #[error("feature vector has {actual} coefficients, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no voiced segments in audio, nothing to classify")]
    NoVoicedSegments,

    #[error("model produced a non-finite score for class {0}")]
    NonFiniteScore(MoodLabel),
}

pub(crate) fn read_artifact<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<T, ModelError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ModelError::Parse {
        path: display,
        source,
    })
}
