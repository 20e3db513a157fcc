use crate::classify::{read_artifact, ModelError};
use crate::mood::MoodLabel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standardizer fitted at training time: `(x - mean) / scale` per column.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl Scaler {
    pub fn apply(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

/// Pretrained linear classifier: one coefficient row and intercept per class,
/// predicting the class with the highest decision score. A two-class model
/// may carry a single row, in which case a positive score picks `classes[1]`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LinearModel {
    pub classes: Vec<MoodLabel>,
    pub coefficients: Vec<Vec<f32>>,
    pub intercepts: Vec<f32>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
}

impl LinearModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model: Self = read_artifact(path)?;
        model.validate()?;
        tracing::info!(
            path = %path.display(),
            classes = model.classes.len(),
            n_features = model.n_features(),
            scaled = model.scaler.is_some(),
            "loaded linear model"
        );
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.classes.len() < 2 {
            return Err(ModelError::Malformed(format!(
                "need at least 2 classes, got {}",
                self.classes.len()
            )));
        }
        let binary = self.classes.len() == 2 && self.coefficients.len() == 1;
        if !binary && self.coefficients.len() != self.classes.len() {
            return Err(ModelError::Malformed(format!(
                "{} coefficient rows for {} classes",
                self.coefficients.len(),
                self.classes.len()
            )));
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err(ModelError::Malformed(format!(
                "{} intercepts for {} coefficient rows",
                self.intercepts.len(),
                self.coefficients.len()
            )));
        }
        let width = self.n_features();
        if width == 0 || self.coefficients.iter().any(|row| row.len() != width) {
            return Err(ModelError::Malformed(
                "coefficient rows must be non-empty and equally long".to_owned(),
            ));
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != width || scaler.scale.len() != width {
                return Err(ModelError::Malformed(format!(
                    "scaler has {}/{} columns, model has {width}",
                    scaler.mean.len(),
                    scaler.scale.len()
                )));
            }
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(ModelError::Malformed(
                    "scaler contains a zero or non-finite scale".to_owned(),
                ));
            }
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.first().map(Vec::len).unwrap_or(0)
    }

    pub fn classes(&self) -> &[MoodLabel] {
        &self.classes
    }

    /// Raw scores, one per coefficient row.
    pub fn decision_function(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
        let expected = self.n_features();
        if features.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }
        let scaled;
        let x = match &self.scaler {
            Some(scaler) => {
                scaled = scaler.apply(features);
                scaled.as_slice()
            }
            None => features,
        };
        Ok(self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect())
    }

    pub fn predict(&self, features: &[f32]) -> Result<MoodLabel, ModelError> {
        let scores = self.decision_function(features)?;
        if scores.len() == 1 {
            let score = scores[0];
            if !score.is_finite() {
                return Err(ModelError::NonFiniteScore(self.classes[1]));
            }
            return Ok(if score > 0.0 {
                self.classes[1]
            } else {
                self.classes[0]
            });
        }

        let mut best = 0;
        for (i, &s) in scores.iter().enumerate() {
            if !s.is_finite() {
                return Err(ModelError::NonFiniteScore(self.classes[i]));
            }
            if s > scores[best] {
                best = i;
            }
        }
        Ok(self.classes[best])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_class() -> LinearModel {
        LinearModel {
            classes: vec![MoodLabel(0), MoodLabel(1), MoodLabel(2)],
            coefficients: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, -1.0]],
            intercepts: vec![0.0, 0.0, 0.5],
            scaler: None,
        }
    }

    #[test]
    fn predicts_highest_scoring_class() {
        let m = three_class();
        assert_eq!(m.predict(&[2.0, 1.0]).unwrap(), MoodLabel(0));
        assert_eq!(m.predict(&[0.0, 3.0]).unwrap(), MoodLabel(1));
        assert_eq!(m.predict(&[-1.0, -1.0]).unwrap(), MoodLabel(2));
    }

    #[test]
    fn wrong_width_fails_fast() {
        let err = three_class().predict(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn binary_single_row_uses_sign() {
        let m = LinearModel {
            classes: vec![MoodLabel(0), MoodLabel(1)],
            coefficients: vec![vec![1.0]],
            intercepts: vec![-0.5],
            scaler: None,
        };
        m.validate().unwrap();
        assert_eq!(m.predict(&[1.0]).unwrap(), MoodLabel(1));
        assert_eq!(m.predict(&[0.0]).unwrap(), MoodLabel(0));
    }

    #[test]
    fn scaler_is_applied_before_scoring() {
        let mut m = three_class();
        m.scaler = Some(Scaler {
            mean: vec![10.0, 10.0],
            scale: vec![1.0, 1.0],
        });
        m.validate().unwrap();
        // (12, 10) standardizes to (2, 0)
        assert_eq!(m.predict(&[12.0, 10.0]).unwrap(), MoodLabel(0));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut m = three_class();
        m.coefficients[1] = vec![1.0];
        assert!(matches!(m.validate(), Err(ModelError::Malformed(_))));
    }

    #[test]
    fn scaler_width_mismatch_is_rejected() {
        let mut m = three_class();
        m.scaler = Some(Scaler {
            mean: vec![0.0],
            scale: vec![1.0],
        });
        assert!(matches!(m.validate(), Err(ModelError::Malformed(_))));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut m = three_class();
        m.scaler = Some(Scaler {
            mean: vec![0.0, 0.0],
            scale: vec![1.0, 0.0],
        });
        assert!(m.validate().is_err());
    }

    #[test]
    fn parses_json_artifact() {
        let raw = r#"{
            "classes": [0, 1, 2],
            "coefficients": [[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0]],
            "intercepts": [0.0, 0.0, 0.5]
        }"#;
        let m: LinearModel = serde_json::from_str(raw).unwrap();
        assert_eq!(m, three_class());
    }
}
