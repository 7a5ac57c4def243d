//! Audio handling for the voice-clone service
//!
//! This module provides:
//! - Decoding of WAV, MP3 and FLAC (plus OGG) uploads
//! - 16-bit mono WAV output
//! - Audio resampling
//! - Peak normalization and pre-emphasis
//! - Container transcoding through ffmpeg

mod decode;
mod io;
pub mod resample;
pub mod transcode;

pub use decode::{decode_file, probe_duration, DecodedAudio};
pub use io::{save_wav, AudioBuffer, PRE_EMPHASIS_COEF};
pub use resample::{resample, ResampleQuality, Resampler};
pub use transcode::{is_output_format, Transcoder, OUTPUT_FORMATS};

/// Sample rate of processed voice samples
pub const PROCESSED_SAMPLE_RATE: u32 = 22050;

/// Upload extensions accepted by the service
pub const SUPPORTED_FORMATS: &[&str] = &["wav", "mp3", "flac"];

/// Lower-cased extension of `filename` if it is one of [`SUPPORTED_FORMATS`].
///
/// Only the suffix after the last dot is inspected; content is not sniffed.
pub fn supported_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_FORMATS.contains(&ext.as_str()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extension() {
        assert_eq!(supported_extension("voice.wav").as_deref(), Some("wav"));
        assert_eq!(supported_extension("VOICE.MP3").as_deref(), Some("mp3"));
        assert_eq!(supported_extension("a.b.Flac").as_deref(), Some("flac"));
        assert_eq!(supported_extension("voice.ogg"), None);
        assert_eq!(supported_extension("wav"), None);
        assert_eq!(supported_extension("voice."), None);
    }
}
