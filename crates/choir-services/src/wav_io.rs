//! WAV reading (any layout, downmixed to mono) and stereo float export

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),
    #[error("WAV file has no channels")]
    NoChannels,
    #[error("Left and right channels differ in length ({left} vs {right})")]
    ChannelMismatch { left: usize, right: usize },
}

/// Decoded audio, interleaved
pub struct AudioData {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Read a WAV file to interleaved f32 samples in [-1, 1].
pub fn read_wav(path: &Path) -> Result<AudioData, WavError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(WavError::NoChannels);
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(AudioData { samples, channels: spec.channels, sample_rate: spec.sample_rate })
}

/// Read a WAV file and convert to mono. Returns (mono_samples, sample_rate).
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), WavError> {
    let audio = read_wav(path)?;
    let mono = to_mono(&audio.samples, audio.channels as usize);
    info!(
        path = %path.display(),
        channels = audio.channels,
        sample_rate = audio.sample_rate,
        frames = mono.len(),
        "Loaded dry vocal"
    );
    Ok((mono, audio.sample_rate))
}

/// Convert interleaved samples to mono by averaging channels.
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Write a stereo pair as a 32-bit float WAV.
///
/// Samples go to a temporary sibling file that replaces `path` only once
/// the whole file has been finalized.
pub fn write_wav_stereo(
    path: &Path,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> Result<(), WavError> {
    if left.len() != right.len() {
        return Err(WavError::ChannelMismatch { left: left.len(), right: right.len() });
    }

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let partial = path.with_extension("wav.partial");
    let written = write_interleaved(&partial, left, right, spec)
        .and_then(|()| std::fs::rename(&partial, path).map_err(hound::Error::IoError));
    if let Err(err) = written {
        if partial.exists() {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                warn!(path = %partial.display(), %cleanup, "Failed to remove partial output");
            }
        }
        return Err(err.into());
    }

    info!(path = %path.display(), frames = left.len(), sample_rate, "Wrote stereo mix");
    Ok(())
}

fn write_interleaved(
    path: &Path,
    left: &[f32],
    right: &[f32],
    spec: hound::WavSpec,
) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, spec)?;
    for (&l, &r) in left.iter().zip(right) {
        writer.write_sample(l)?;
        writer.write_sample(r)?;
    }
    writer.finalize()
}
