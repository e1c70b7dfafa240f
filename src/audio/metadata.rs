use super::decode::{decode_mono, probe_audio, rms};
use crate::traits::{Metadata, MetadataValue};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How much audio the fallback decode reads when the header is unusable.
const FALLBACK_DECODE_SECS: f64 = 5.0;

/// Window used for the quick energy estimate.
const ENERGY_WINDOW_SECS: f64 = 1.0;

/// Technical and path-derived properties of one audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub file_path: String,
    pub file_name: String,
    pub extension: String,
    pub directory: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub rms_energy: f64,
    pub file_size_bytes: u64,
}

impl AudioMetadata {
    /// Flattens into the metadata map stored next to the embedding.
    pub fn to_metadata(&self, indexed_at: f64) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("file_path".to_string(), self.file_path.clone().into());
        metadata.insert("file_name".to_string(), self.file_name.clone().into());
        metadata.insert("extension".to_string(), self.extension.clone().into());
        metadata.insert("directory".to_string(), self.directory.clone().into());
        metadata.insert(
            "duration_seconds".to_string(),
            MetadataValue::Float(self.duration_seconds),
        );
        metadata.insert("sample_rate".to_string(), self.sample_rate.into());
        metadata.insert(
            "channels".to_string(),
            MetadataValue::Int(i64::from(self.channels)),
        );
        metadata.insert("rms_energy".to_string(), MetadataValue::Float(self.rms_energy));
        metadata.insert(
            "file_size_bytes".to_string(),
            MetadataValue::Int(i64::try_from(self.file_size_bytes).unwrap_or(i64::MAX)),
        );
        metadata.insert("indexed_at".to_string(), MetadataValue::Float(indexed_at));
        metadata
    }
}

/// Absolute form of a path as stored in `file_path` metadata.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Reads duration, sample rate, channels, energy and size for a file.
///
/// The container header is tried first; if it cannot be read, up to five
/// seconds are decoded instead and the file is assumed mono. Energy is the RMS
/// of the first second and falls back to 0.0 on any decode failure.
pub fn extract_metadata(path: &Path) -> Result<AudioMetadata> {
    let absolute = absolute_path(path);

    let (duration, sample_rate, channels) = match probe_audio(path) {
        Ok(info) if info.duration_secs.is_some() => (
            info.duration_secs.unwrap_or_default(),
            info.sample_rate,
            info.channels,
        ),
        probed => {
            if let Err(e) = &probed {
                debug!("Header probe failed for {}: {:#}", path.display(), e);
            }
            let decoded = decode_mono(path, Some(FALLBACK_DECODE_SECS))
                .with_context(|| format!("Failed to read audio properties: {}", path.display()))?;
            (decoded.duration_secs(), decoded.sample_rate, 1)
        }
    };

    let rms_energy = match decode_mono(path, Some(ENERGY_WINDOW_SECS)) {
        Ok(decoded) => rms(&decoded.samples),
        Err(e) => {
            debug!("Energy estimate failed for {}: {:#}", path.display(), e);
            0.0
        }
    };

    let file_size_bytes = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    Ok(AudioMetadata {
        file_path: absolute.to_string_lossy().to_string(),
        file_name: absolute
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        extension: absolute
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy().to_lowercase()))
            .unwrap_or_default(),
        directory: absolute
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default(),
        duration_seconds: round_to(duration, 3),
        sample_rate,
        channels,
        rms_energy: round_to(rms_energy, 4),
        file_size_bytes,
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
