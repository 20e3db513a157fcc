//! Artifacts loaded once at startup and shared read-only by every request.

use crate::classify::{AudioClassifier, LinearModel, ModelError, TextClassifier, TextVectorizer};
use crate::config::{ClassificationMode, ModelPaths};
use crate::features::{feature_len, FeatureExtractor};
use crate::mood::{PreambleError, PreambleTable};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Preambles(#[from] PreambleError),
    #[error("audio model expects {actual} features but {mode} mode produces {expected}")]
    ModeMismatch {
        mode: ClassificationMode,
        expected: usize,
        actual: usize,
    },
    #[error("{0} mode needs a text model and vectorizer")]
    MissingTextModels(ClassificationMode),
}

#[derive(Debug)]
pub struct ModelContext {
    mode: ClassificationMode,
    extractor: FeatureExtractor,
    audio: AudioClassifier,
    text: Option<TextClassifier>,
    preambles: Arc<PreambleTable>,
}

impl ModelContext {
    /// Checks that the artifacts fit the mode: the audio model width must
    /// match what the feature extractor emits, and text fusion needs a text
    /// classifier.
    pub fn new(
        mode: ClassificationMode,
        audio_model: LinearModel,
        text: Option<TextClassifier>,
        preambles: PreambleTable,
    ) -> Result<Self, ContextError> {
        let expected = feature_len(mode.feature);
        if audio_model.n_features() != expected {
            return Err(ContextError::ModeMismatch {
                mode,
                expected,
                actual: audio_model.n_features(),
            });
        }
        if mode.text_fusion && text.is_none() {
            return Err(ContextError::MissingTextModels(mode));
        }
        Ok(Self {
            mode,
            extractor: FeatureExtractor::new(mode.feature),
            audio: AudioClassifier::new(audio_model),
            text,
            preambles: Arc::new(preambles),
        })
    }

    pub fn load(mode: ClassificationMode, paths: &ModelPaths) -> Result<Self, ContextError> {
        let audio_model = LinearModel::load(&paths.audio_model)?;

        let text = match (mode.text_fusion, &paths.text_model, &paths.vectorizer) {
            (true, Some(model), Some(vectorizer)) => Some(TextClassifier::new(
                TextVectorizer::load(vectorizer)?,
                LinearModel::load(model)?,
            )?),
            (true, _, _) => return Err(ContextError::MissingTextModels(mode)),
            (false, _, _) => None,
        };

        let preambles = match &paths.preambles {
            Some(path) => PreambleTable::load(path)?,
            None => PreambleTable::default(),
        };

        let ctx = Self::new(mode, audio_model, text, preambles)?;
        tracing::info!(%mode, "model context ready");
        Ok(ctx)
    }

    pub fn mode(&self) -> ClassificationMode {
        self.mode
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn audio(&self) -> &AudioClassifier {
        &self.audio
    }

    pub fn text(&self) -> Option<&TextClassifier> {
        self.text.as_ref()
    }

    pub fn preambles(&self) -> Arc<PreambleTable> {
        Arc::clone(&self.preambles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureMode;
    use crate::mood::MoodLabel;

    fn model(width: usize) -> LinearModel {
        LinearModel {
            classes: vec![MoodLabel(0), MoodLabel(1)],
            coefficients: vec![vec![0.1; width], vec![-0.1; width]],
            intercepts: vec![0.0, 0.0],
            scaler: None,
        }
    }

    #[test]
    fn segment_mode_accepts_thirteen_wide_model() {
        let ctx = ModelContext::new(
            ClassificationMode::default(),
            model(13),
            None,
            PreambleTable::default(),
        )
        .unwrap();
        assert_eq!(ctx.audio().n_features(), 13);
        assert!(ctx.text().is_none());
    }

    #[test]
    fn width_mismatch_fails_at_startup() {
        let mode = ClassificationMode {
            feature: FeatureMode::FixedWindow,
            text_fusion: false,
        };
        let err = ModelContext::new(mode, model(13), None, PreambleTable::default()).unwrap_err();
        assert!(matches!(
            err,
            ContextError::ModeMismatch {
                expected: 3900,
                actual: 13,
                ..
            }
        ));
    }

    #[test]
    fn text_fusion_without_text_models_is_rejected() {
        let mode = ClassificationMode {
            feature: FeatureMode::SegmentVote,
            text_fusion: true,
        };
        assert!(matches!(
            ModelContext::new(mode, model(13), None, PreambleTable::default()),
            Err(ContextError::MissingTextModels(_))
        ));
    }
}
