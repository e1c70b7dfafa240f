use super::decode::{decode_mono, probe_audio, resample_linear};
use crate::config::AudioSettings;
use anyhow::{Context, Result, bail};
use log::debug;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Audio ready to hand to the embedder.
///
/// A resampled copy lives in the scratch directory only as long as this value;
/// dropping it deletes the file.
#[derive(Debug)]
pub enum PreparedAudio {
    /// The source already fits the envelope and is used as is.
    Original(PathBuf),
    /// A mono copy at the target rate, truncated to the max duration.
    Resampled(TempPath),
}

impl PreparedAudio {
    pub fn path(&self) -> &Path {
        match self {
            PreparedAudio::Original(path) => path,
            PreparedAudio::Resampled(temp) => temp,
        }
    }

    pub fn is_resampled(&self) -> bool {
        matches!(self, PreparedAudio::Resampled(_))
    }
}

/// Brings audio to the sample rate and duration the embedding model accepts.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    target_sample_rate: u32,
    max_duration_secs: f64,
    scratch_dir: PathBuf,
}

impl AudioNormalizer {
    pub fn new(target_sample_rate: u32, max_duration_secs: f64, scratch_dir: PathBuf) -> Self {
        Self {
            target_sample_rate,
            max_duration_secs,
            scratch_dir,
        }
    }

    pub fn from_settings(settings: &AudioSettings) -> Self {
        Self::new(
            settings.target_sample_rate,
            settings.max_duration_secs,
            settings.scratch_dir.clone(),
        )
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Returns the original path when it already matches the target rate and
    /// fits within the max duration, otherwise a resampled temporary copy.
    ///
    /// The returned path is always valid UTF-8; sources with other names are
    /// copied into the scratch directory.
    pub fn prepare(&self, path: &Path) -> Result<PreparedAudio> {
        match probe_audio(path) {
            Ok(info) if path.to_str().is_none() => debug!(
                "Copying {} ({} Hz) to a UTF-8 scratch name",
                path.display(),
                info.sample_rate
            ),
            Ok(info) if self.fits(info.sample_rate, info.duration_secs) => {
                return Ok(PreparedAudio::Original(path.to_path_buf()));
            }
            Ok(info) => debug!(
                "Normalizing {} ({} Hz, {:?} s)",
                path.display(),
                info.sample_rate,
                info.duration_secs
            ),
            Err(e) => debug!("Probe failed for {}, normalizing: {:#}", path.display(), e),
        }

        let decoded = decode_mono(path, Some(self.max_duration_secs))?;
        let mut samples =
            resample_linear(&decoded.samples, decoded.sample_rate, self.target_sample_rate);
        let max_samples =
            (self.max_duration_secs * f64::from(self.target_sample_rate)).floor() as usize;
        samples.truncate(max_samples);

        let temp_path = self.write_scratch(path, &samples)?;
        debug!(
            "Wrote {} samples for {} to {}",
            samples.len(),
            path.display(),
            temp_path.display()
        );
        Ok(PreparedAudio::Resampled(temp_path))
    }

    fn fits(&self, sample_rate: u32, duration_secs: Option<f64>) -> bool {
        sample_rate == self.target_sample_rate
            && duration_secs.is_some_and(|d| d <= self.max_duration_secs)
    }

    fn write_scratch(&self, source: &Path, samples: &[f32]) -> Result<TempPath> {
        std::fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!(
                "Failed to create scratch directory {}",
                self.scratch_dir.display()
            )
        })?;

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let temp_file = tempfile::Builder::new()
            .prefix(&format!("{}_", stem))
            .suffix("_resampled.wav")
            .tempfile_in(&self.scratch_dir)
            .context("Failed to create scratch file")?;
        let (file, temp_path) = temp_file.into_parts();
        if temp_path.to_str().is_none() {
            bail!(
                "Scratch path is not valid UTF-8: {}",
                temp_path.display()
            );
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.target_sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer =
            hound::WavWriter::new(BufWriter::new(file), spec).context("Failed to start wav")?;
        for sample in samples {
            writer
                .write_sample(*sample)
                .context("Failed to write sample")?;
        }
        writer.finalize().context("Failed to finalize wav")?;
        Ok(temp_path)
    }
}
