use rubato::{FftFixedInOut, Resampler};
use std::io::Cursor;
use std::time::Duration;

/// Mono PCM decoded from an uploaded clip. Never mutated after decoding;
/// resampling produces a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Waveform {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_sample_count(self.sample_rate, 1, self.samples.len())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("invalid wav data: {0}")]
    InvalidWav(#[from] hound::Error),

    #[error("unsupported wav format: {0}")]
    InvalidFormat(String),

    #[error("resampling failed: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decodes a WAV file held in memory, averaging all channels down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<Waveform> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(DecodeError::InvalidFormat(format!(
            "sample_rate={} channels={}",
            spec.sample_rate, spec.channels
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(DecodeError::InvalidFormat(format!(
                    "bits_per_sample={}",
                    spec.bits_per_sample
                )));
            }
            let scale = 1.0f64 / f64::from(1u32 << (spec.bits_per_sample - 1));
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (f64::from(v) * scale) as f32))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let channels = usize::from(spec.channels);
    let samples = if channels > 1 {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok(Waveform::new(spec.sample_rate, samples))
}

/// Input block size handed to the FFT resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Band-limited FFT resampler. Returns the input unchanged when the rates match.
/// The output is aligned to the input (resampler delay removed) and has
/// `round(len * target / source)` samples.
pub fn resample(waveform: &Waveform, target_rate: u32) -> Result<Waveform> {
    if waveform.sample_rate == target_rate || waveform.is_empty() {
        return Ok(Waveform::new(target_rate, waveform.samples.clone()));
    }
    if target_rate == 0 {
        return Err(DecodeError::Resample("target sample rate is 0".to_owned()));
    }

    let mut resampler = FftFixedInOut::<f32>::new(
        waveform.sample_rate as usize,
        target_rate as usize,
        RESAMPLE_CHUNK,
        1,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let expected_len = (waveform.len() as f64 * f64::from(target_rate)
        / f64::from(waveform.sample_rate))
    .round() as usize;
    let delay = resampler.output_delay();
    let chunk = resampler.input_frames_next();

    let mut output = Vec::with_capacity(expected_len + delay + resampler.output_frames_max());
    let mut pos = 0;
    while output.len() < expected_len + delay {
        let start = pos.min(waveform.len());
        let end = (pos + chunk).min(waveform.len());
        let mut block = waveform.samples[start..end].to_vec();
        block.resize(chunk, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        output.extend_from_slice(&result[0]);
        pos += chunk;
    }

    output.drain(..delay);
    output.truncate(expected_len);
    Ok(Waveform::new(target_rate, output))
}

pub fn duration_from_sample_count(
    sample_rate_hz: u32,
    channels: u16,
    sample_count: usize,
) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = (sample_count / usize::from(channels)) as u128;
    let micros = (frames * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

/// Encodes 16-bit mono PCM as an in-memory WAV file.
pub fn encode_wav_i16(sample_rate: u32, samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
