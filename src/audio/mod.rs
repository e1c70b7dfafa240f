//! Audio probing, decoding and normalization on top of symphonia.

pub mod decode;
pub mod metadata;
pub mod normalize;

pub use decode::{AudioInfo, DecodedAudio, decode_mono, probe_audio, resample_linear, rms};
pub use metadata::{AudioMetadata, absolute_path, extract_metadata};
pub use normalize::{AudioNormalizer, PreparedAudio};
