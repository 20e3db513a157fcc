//! Energy-based silence splitting.

use serde::{Deserialize, Serialize};

pub const FRAME_LENGTH: usize = 2048;
pub const HOP_LENGTH: usize = 512;

const AMIN: f64 = 1e-5;

/// Half-open sample range `[start, end)` judged to contain signal.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoicedSegment {
    pub start: usize,
    pub end: usize,
}

impl VoicedSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Frame RMS with centered, zero-padded frames.
fn frame_rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f64> {
    let pad = frame_length / 2;
    let n_frames = 1 + samples.len() / hop_length;
    (0..n_frames)
        .map(|t| {
            // frame t covers padded[t*hop .. t*hop + frame_length]
            let start = (t * hop_length) as isize - pad as isize;
            let end = start + frame_length as isize;
            let lo = start.max(0) as usize;
            let hi = (end.max(0) as usize).min(samples.len());
            let sum_sq: f64 = samples
                .get(lo..hi)
                .unwrap_or(&[])
                .iter()
                .map(|&s| f64::from(s) * f64::from(s))
                .sum();
            (sum_sq / frame_length as f64).sqrt()
        })
        .collect()
}

/// Splits `samples` into voiced segments: frames whose level is more than
/// `top_db` below the loudest frame count as silence. A signal whose loudest
/// frame is zero has no voiced segments at all.
pub fn split_voiced(
    samples: &[f32],
    top_db: f32,
    frame_length: usize,
    hop_length: usize,
) -> Vec<VoicedSegment> {
    if samples.is_empty() || hop_length == 0 || frame_length == 0 {
        return Vec::new();
    }

    let rms = frame_rms(samples, frame_length, hop_length);
    let peak = rms.iter().copied().fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return Vec::new();
    }

    let ref_db = 20.0 * peak.max(AMIN).log10();
    let threshold = -f64::from(top_db);
    let voiced: Vec<bool> = rms
        .iter()
        .map(|&r| 20.0 * r.max(AMIN).log10() - ref_db > threshold)
        .collect();

    let mut segments = Vec::new();
    let mut open: Option<usize> = None;
    for (t, &v) in voiced.iter().enumerate() {
        match (v, open) {
            (true, None) => open = Some(t),
            (false, Some(start)) => {
                segments.push(to_samples(start, t, hop_length, samples.len()));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        segments.push(to_samples(start, voiced.len(), hop_length, samples.len()));
    }

    segments.retain(|s| !s.is_empty());
    segments
}

fn to_samples(start_frame: usize, end_frame: usize, hop: usize, len: usize) -> VoicedSegment {
    VoicedSegment {
        start: (start_frame * hop).min(len),
        end: (end_frame * hop).min(len),
    }
}
