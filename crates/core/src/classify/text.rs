use crate::classify::{read_artifact, LinearModel, ModelError};
use crate::mood::MoodLabel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L2,
}

fn default_true() -> bool {
    true
}

/// Fixed-vocabulary bag-of-words vectorizer. Tokens outside the vocabulary
/// are ignored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TextVectorizer {
    vocabulary: HashMap<String, usize>,
    #[serde(default)]
    idf: Option<Vec<f32>>,
    #[serde(default)]
    norm: Option<Norm>,
    #[serde(default = "default_true")]
    lowercase: bool,
}

impl TextVectorizer {
    pub fn new(vocabulary: HashMap<String, usize>) -> Result<Self, ModelError> {
        let v = Self {
            vocabulary,
            idf: None,
            norm: None,
            lowercase: true,
        };
        v.validate()?;
        Ok(v)
    }

    pub fn with_idf(mut self, idf: Vec<f32>, norm: Option<Norm>) -> Result<Self, ModelError> {
        self.idf = Some(idf);
        self.norm = norm;
        self.validate()?;
        Ok(self)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let v: Self = read_artifact(path)?;
        v.validate()?;
        tracing::info!(path = %path.display(), vocabulary = v.len(), "loaded text vectorizer");
        Ok(v)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let n = self.vocabulary.len();
        if n == 0 {
            return Err(ModelError::Malformed("empty vocabulary".to_owned()));
        }
        let mut seen = vec![false; n];
        for (token, &idx) in &self.vocabulary {
            match seen.get_mut(idx) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(ModelError::Malformed(format!(
                        "vocabulary index {idx} for {token:?} is out of range or duplicated"
                    )))
                }
            }
        }
        if let Some(idf) = &self.idf {
            if idf.len() != n {
                return Err(ModelError::Malformed(format!(
                    "{} idf weights for a vocabulary of {n}",
                    idf.len()
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.len()];
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_owned()
        };
        for token in tokenize(&text) {
            if let Some(&idx) = self.vocabulary.get(token) {
                counts[idx] += 1.0;
            }
        }
        if let Some(idf) = &self.idf {
            for (c, w) in counts.iter_mut().zip(idf) {
                *c *= w;
            }
        }
        if self.norm == Some(Norm::L2) {
            let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
            if norm > 0.0 {
                counts.iter_mut().for_each(|c| *c /= norm);
            }
        }
        counts
    }
}

/// Runs of word characters at least two characters long.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().nth(1).is_some())
}

#[derive(Clone, Debug)]
pub struct TextClassifier {
    vectorizer: TextVectorizer,
    model: LinearModel,
}

impl TextClassifier {
    pub fn new(vectorizer: TextVectorizer, model: LinearModel) -> Result<Self, ModelError> {
        if model.n_features() != vectorizer.len() {
            return Err(ModelError::DimensionMismatch {
                expected: model.n_features(),
                actual: vectorizer.len(),
            });
        }
        Ok(Self { vectorizer, model })
    }

    pub fn classify(&self, transcript: &str) -> Result<MoodLabel, ModelError> {
        let features = self.vectorizer.transform(transcript);
        let label = self
            .model
            .predict(&features)
            .inspect_err(|e| tracing::error!(error = %e, "text classification failed"))?;
        tracing::debug!(%label, "text label");
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> HashMap<String, usize> {
        [("scared", 0), ("sad", 1), ("great", 2)]
            .into_iter()
            .map(|(t, i)| (t.to_owned(), i))
            .collect()
    }

    #[test]
    fn tokenizer_drops_single_characters_and_punctuation() {
        let tokens: Vec<_> = tokenize("I'm so scared, a bit_sad!").collect();
        assert_eq!(tokens, vec!["so", "scared", "bit_sad"]);
    }

    #[test]
    fn counts_vocabulary_hits_and_ignores_unknown_words() {
        let v = TextVectorizer::new(vocab()).unwrap();
        assert_eq!(v.transform("Scared scared and SAD, zebra"), vec![2.0, 1.0, 0.0]);
        assert_eq!(v.transform("nothing known here"), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn idf_and_l2_norm_are_applied() {
        let v = TextVectorizer::new(vocab())
            .unwrap()
            .with_idf(vec![3.0, 4.0, 1.0], Some(Norm::L2))
            .unwrap();
        let x = v.transform("scared sad");
        assert!((x[0] - 0.6).abs() < 1e-6);
        assert!((x[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn duplicated_index_is_rejected() {
        let mut bad = vocab();
        bad.insert("also".to_owned(), 0);
        assert!(TextVectorizer::new(bad).is_err());
    }

    #[test]
    fn classifier_requires_matching_width() {
        let v = TextVectorizer::new(vocab()).unwrap();
        let model = LinearModel {
            classes: vec![MoodLabel(0), MoodLabel(1)],
            coefficients: vec![vec![1.0, -1.0]],
            intercepts: vec![0.0],
            scaler: None,
        };
        assert!(matches!(
            TextClassifier::new(v, model),
            Err(ModelError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn classifier_labels_transcript() {
        let v = TextVectorizer::new(vocab()).unwrap();
        let model = LinearModel {
            classes: vec![MoodLabel(0), MoodLabel(1), MoodLabel(3)],
            coefficients: vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
            intercepts: vec![0.0, 0.0, 0.1],
            scaler: None,
        };
        let c = TextClassifier::new(v, model).unwrap();
        assert_eq!(c.classify("I'm scared").unwrap(), MoodLabel(0));
        assert_eq!(c.classify("so sad, sad day").unwrap(), MoodLabel(1));
        assert_eq!(c.classify("hello there").unwrap(), MoodLabel(3));
    }
}
