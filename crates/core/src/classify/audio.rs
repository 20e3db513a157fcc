use crate::classify::{LinearModel, ModelError};
use crate::features::FeatureVector;
use crate::mood::MoodLabel;
use serde::Serialize;
use std::collections::BTreeMap;

/// Final audio label plus the per-vector labels it was voted from.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AudioVerdict {
    pub label: MoodLabel,
    pub votes: Vec<MoodLabel>,
}

/// Applies the audio model to each feature vector and aggregates the labels.
#[derive(Clone, Debug)]
pub struct AudioClassifier {
    model: LinearModel,
}

impl AudioClassifier {
    pub fn new(model: LinearModel) -> Self {
        Self { model }
    }

    pub fn n_features(&self) -> usize {
        self.model.n_features()
    }

    /// One label per vector, in input order.
    pub fn predict_each(&self, features: &[FeatureVector]) -> Result<Vec<MoodLabel>, ModelError> {
        features
            .iter()
            .map(|f| self.model.predict(f.as_slice()))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| tracing::error!(error = %e, "audio classification failed"))
    }

    /// Per-vector prediction followed by a majority vote. Empty input is an
    /// error, never a default label.
    pub fn classify(&self, features: &[FeatureVector]) -> Result<AudioVerdict, ModelError> {
        let votes = self.predict_each(features)?;
        let label = majority_vote(&votes).inspect_err(|e| {
            tracing::error!(error = %e, "audio classification failed");
        })?;
        tracing::debug!(?votes, %label, "audio label");
        Ok(AudioVerdict { label, votes })
    }
}

/// Most frequent label; ties go to the lowest label value.
pub fn majority_vote(labels: &[MoodLabel]) -> Result<MoodLabel, ModelError> {
    let mut counts: BTreeMap<MoodLabel, usize> = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_default() += 1;
    }
    // ascending label order: only a strictly larger count replaces the current best
    let mut best: Option<(MoodLabel, usize)> = None;
    for (label, count) in counts {
        match best {
            Some((_, c)) if count <= c => {}
            _ => best = Some((label, count)),
        }
    }
    best.map(|(label, _)| label)
        .ok_or(ModelError::NoVoicedSegments)
}
