use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Container-level properties read without decoding any packets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// `None` when the container does not declare its frame count.
    pub duration_secs: Option<f64>,
}

/// Mono PCM samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Failed to probe audio format: {}", path.display()))?;
    Ok(probed.format)
}

/// Reads sample rate, channel count and duration from the container header.
pub fn probe_audio(path: &Path) -> Result<AudioInfo> {
    let format = open_format(path)?;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track in {}", path.display()))?;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| anyhow!("Missing sample rate for {}", path.display()))?;
    let channels = params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| anyhow!("Missing channel layout for {}", path.display()))?;
    let duration_secs = params
        .n_frames
        .map(|frames| frames as f64 / f64::from(sample_rate));

    Ok(AudioInfo {
        sample_rate,
        channels,
        duration_secs,
    })
}

/// Decodes an audio file to mono at its native sample rate.
///
/// Channels are averaged. When `max_seconds` is set, decoding stops once that
/// much audio has been read and the output is truncated to it.
pub fn decode_mono(path: &Path, max_seconds: Option<f64>) -> Result<DecodedAudio> {
    let mut format = open_format(path)?;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track in {}", path.display()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for {}", path.display()))?;

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut max_frames = frame_limit(max_seconds, sample_rate);
    let mut mono: Vec<f32> = Vec::new();

    loop {
        if max_frames.is_some_and(|limit| mono.len() >= limit) {
            break;
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read packet from {}", path.display()));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to decode {}", path.display()));
            }
        };

        let spec = *audio_buf.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
            max_frames = frame_limit(max_seconds, sample_rate);
        }
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        mono.extend(
            sample_buf
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if sample_rate == 0 {
        bail!("Could not determine sample rate for {}", path.display());
    }
    if mono.is_empty() {
        bail!("Decoded 0 samples from {}", path.display());
    }
    if let Some(limit) = max_frames {
        mono.truncate(limit);
    }

    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
    })
}

fn frame_limit(max_seconds: Option<f64>, sample_rate: u32) -> Option<usize> {
    if sample_rate == 0 {
        return None;
    }
    max_seconds
        .filter(|secs| *secs > 0.0)
        .map(|secs| ((secs * f64::from(sample_rate)).ceil() as usize).max(1))
}

/// Linear interpolation resampler.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        if idx + 1 < samples.len() {
            let frac = (pos - idx as f64) as f32;
            output.push(samples[idx].mul_add(1.0 - frac, samples[idx + 1] * frac));
        } else if idx < samples.len() {
            output.push(samples[idx]);
        }
    }

    output
}

/// Root-mean-square amplitude; 0.0 for empty input.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}
