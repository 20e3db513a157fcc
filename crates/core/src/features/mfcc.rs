//! Mel-frequency cepstral coefficients.
//!
//! Follows the usual librosa defaults so that models trained offline on
//! `librosa.feature.mfcc(y, sr, n_mfcc=13)` see the same numbers here:
//! centered frames with zero padding, periodic Hann window, power spectrum,
//! Slaney mel scale with area normalisation, dB with an 80 dB floor, and an
//! orthonormal DCT-II.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const N_MELS: usize = 128;

const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MfccParams {
    pub n_mfcc: usize,
    pub n_mels: usize,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for MfccParams {
    fn default() -> Self {
        Self {
            n_mfcc: 13,
            n_mels: N_MELS,
            n_fft: N_FFT,
            hop_length: HOP_LENGTH,
        }
    }
}

/// Per-frame coefficients, `frames[t][k]` is coefficient `k` of frame `t`.
#[derive(Clone, Debug, PartialEq)]
pub struct MfccMatrix {
    pub n_mfcc: usize,
    pub frames: Vec<Vec<f32>>,
}

impl MfccMatrix {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Mean of each coefficient over time.
    pub fn mean_over_frames(&self) -> Vec<f32> {
        let mut acc = vec![0.0f64; self.n_mfcc];
        for frame in &self.frames {
            for (a, &c) in acc.iter_mut().zip(frame) {
                *a += f64::from(c);
            }
        }
        let n = self.frames.len().max(1) as f64;
        acc.into_iter().map(|a| (a / n) as f32).collect()
    }

    /// Coefficient-major flattening of a `n_mfcc x n_frames` matrix, zero-padded
    /// or truncated along time to exactly `n_frames`.
    pub fn flatten_fixed(&self, n_frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; self.n_mfcc * n_frames];
        for (t, frame) in self.frames.iter().take(n_frames).enumerate() {
            for (k, &c) in frame.iter().enumerate() {
                out[k * n_frames + t] = c;
            }
        }
        out
    }
}

pub struct MfccExtractor {
    params: MfccParams,
    window: Vec<f64>,
    mel_filters: Vec<Vec<f64>>,
    dct: Vec<Vec<f64>>,
    fft: Arc<dyn Fft<f64>>,
}

impl MfccExtractor {
    pub fn new(sample_rate: u32, params: MfccParams) -> Self {
        let n_fft = params.n_fft;
        let window = (0..n_fft)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n_fft as f64).cos())
            .collect();
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n_fft);

        Self {
            mel_filters: slaney_mel_filters(f64::from(sample_rate), n_fft, params.n_mels),
            dct: dct_ortho(params.n_mfcc, params.n_mels),
            params,
            window,
            fft,
        }
    }

    pub fn compute(&self, samples: &[f32]) -> MfccMatrix {
        let MfccParams {
            n_mfcc,
            n_fft,
            hop_length,
            ..
        } = self.params;
        let pad = n_fft / 2;

        let mut padded = vec![0.0f64; samples.len() + 2 * pad];
        for (dst, &s) in padded[pad..].iter_mut().zip(samples) {
            *dst = f64::from(s);
        }
        let n_frames = 1 + (padded.len() - n_fft) / hop_length;

        let mut buffer = vec![Complex::new(0.0f64, 0.0); n_fft];
        let mut mel_db: Vec<Vec<f64>> = Vec::with_capacity(n_frames);
        let mut max_db = f64::NEG_INFINITY;

        for t in 0..n_frames {
            let frame = &padded[t * hop_length..t * hop_length + n_fft];
            for ((b, &x), &w) in buffer.iter_mut().zip(frame).zip(&self.window) {
                *b = Complex::new(x * w, 0.0);
            }
            self.fft.process(&mut buffer);

            let power: Vec<f64> = buffer[..n_fft / 2 + 1].iter().map(|c| c.norm_sqr()).collect();
            let row: Vec<f64> = self
                .mel_filters
                .iter()
                .map(|filter| {
                    let energy: f64 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect();
            max_db = row.iter().copied().fold(max_db, f64::max);
            mel_db.push(row);
        }

        let floor = max_db - TOP_DB;
        let frames = mel_db
            .into_iter()
            .map(|row| {
                let row: Vec<f64> = row.into_iter().map(|v| v.max(floor)).collect();
                self.dct
                    .iter()
                    .map(|basis| basis.iter().zip(&row).map(|(b, v)| b * v).sum::<f64>() as f32)
                    .collect()
            })
            .collect();

        MfccMatrix { n_mfcc, frames }
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular filters over `[0, sr/2]`, each scaled to unit area (Slaney norm).
fn slaney_mel_filters(sample_rate: f64, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sample_rate / 2.0);
    let mel_f: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|i| {
            let lower_width = mel_f[i + 1] - mel_f[i];
            let upper_width = mel_f[i + 2] - mel_f[i + 1];
            let enorm = 2.0 / (mel_f[i + 2] - mel_f[i]);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - mel_f[i]) / lower_width;
                    let upper = (mel_f[i + 2] - f) / upper_width;
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

fn dct_ortho(n_out: usize, n_in: usize) -> Vec<Vec<f64>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}
