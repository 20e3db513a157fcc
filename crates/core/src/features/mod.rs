//! Waveform to feature vectors.
//!
//! Two layouts are supported, picked by [`FeatureMode`]:
//! segment vote produces one 13-dim MFCC mean per voiced segment, fixed window
//! produces a single 13x300 MFCC matrix flattened coefficient-major.

pub mod mfcc;
pub mod split;

use crate::config::FeatureMode;
use crate::decode::{resample, DecodeError, Waveform};
use serde::{Deserialize, Serialize};

pub use mfcc::{MfccExtractor, MfccMatrix, MfccParams};
pub use split::{split_voiced, VoicedSegment};

pub const N_MFCC: usize = 13;
pub const SILENCE_TOP_DB: f32 = 20.0;
pub const FIXED_WINDOW_SAMPLE_RATE: u32 = 16_000;
pub const FIXED_WINDOW_SAMPLES: usize = 2 * FIXED_WINDOW_SAMPLE_RATE as usize;
pub const FIXED_WINDOW_FRAMES: usize = 300;
pub const FIXED_WINDOW_LEN: usize = N_MFCC * FIXED_WINDOW_FRAMES;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

}

/// Width of every vector a given mode emits.
pub fn feature_len(mode: FeatureMode) -> usize {
    match mode {
        FeatureMode::SegmentVote => N_MFCC,
        FeatureMode::FixedWindow => FIXED_WINDOW_LEN,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureExtractor {
    mode: FeatureMode,
}

impl FeatureExtractor {
    pub fn new(mode: FeatureMode) -> Self {
        Self { mode }
    }

    /// Segment mode may return an empty collection (silent clip); fixed-window
    /// mode always returns exactly one vector.
    pub fn extract(&self, waveform: &Waveform) -> Result<Vec<FeatureVector>, DecodeError> {
        match self.mode {
            FeatureMode::SegmentVote => Ok(extract_segments(waveform)),
            FeatureMode::FixedWindow => Ok(vec![extract_fixed_window(waveform)?]),
        }
    }
}

pub fn extract_segments(waveform: &Waveform) -> Vec<FeatureVector> {
    let segments = split_voiced(
        &waveform.samples,
        SILENCE_TOP_DB,
        split::FRAME_LENGTH,
        split::HOP_LENGTH,
    );
    tracing::debug!(
        segments = segments.len(),
        samples = waveform.len(),
        sample_rate = waveform.sample_rate,
        "split voiced segments"
    );
    if segments.is_empty() {
        return Vec::new();
    }

    let mfcc = MfccExtractor::new(waveform.sample_rate, MfccParams::default());
    segments
        .iter()
        .map(|seg| {
            let matrix = mfcc.compute(&waveform.samples[seg.start..seg.end]);
            FeatureVector::new(matrix.mean_over_frames())
        })
        .collect()
}

pub fn extract_fixed_window(waveform: &Waveform) -> Result<FeatureVector, DecodeError> {
    let resampled = resample(waveform, FIXED_WINDOW_SAMPLE_RATE)?;
    let window = fit_to_length(&resampled.samples, FIXED_WINDOW_SAMPLES);
    let matrix = MfccExtractor::new(FIXED_WINDOW_SAMPLE_RATE, MfccParams::default()).compute(&window);
    Ok(FeatureVector::new(matrix.flatten_fixed(FIXED_WINDOW_FRAMES)))
}

/// Truncates, or zero-pads at the end, to exactly `len` samples.
pub fn fit_to_length(samples: &[f32], len: usize) -> Vec<f32> {
    let mut out: Vec<f32> = samples.iter().take(len).copied().collect();
    out.resize(len, 0.0);
    out
}
