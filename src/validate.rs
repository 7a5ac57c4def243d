//! Upload validation: decode, measure, and check duration bounds.

use serde::Serialize;
use std::path::Path;

use crate::audio::decode_file;
use crate::error::{ServiceError, ServiceResult};

/// Facts about a validated upload. Computed per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMetadata {
    /// Seconds
    pub duration: f64,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes on disk
    pub file_size: u64,
}

/// Accepts audio whose duration lies within `[min_duration, max_duration]`.
#[derive(Debug, Clone)]
pub struct AudioValidator {
    min_duration: f64,
    max_duration: f64,
}

impl AudioValidator {
    pub fn new(min_duration: f64, max_duration: f64) -> Self {
        Self {
            min_duration,
            max_duration,
        }
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    /// Decode the whole file and check it against the bounds.
    ///
    /// Decode failures and out-of-range durations both come back as
    /// [`ServiceError::Validation`].
    pub fn validate(&self, path: &Path) -> ServiceResult<ValidationMetadata> {
        let decoded = decode_file(path)
            .map_err(|e| ServiceError::Validation(format!("Invalid audio file: {e:#}")))?;
        let duration = decoded.duration();

        if duration < self.min_duration {
            return Err(ServiceError::Validation(format!(
                "Audio too short. Minimum {} seconds required.",
                fmt_seconds(self.min_duration)
            )));
        }
        if duration > self.max_duration {
            return Err(ServiceError::Validation(format!(
                "Audio too long. Maximum {} seconds allowed.",
                fmt_seconds(self.max_duration)
            )));
        }

        let file_size = std::fs::metadata(path)
            .map_err(|e| ServiceError::Validation(format!("Invalid audio file: {e}")))?
            .len();

        Ok(ValidationMetadata {
            duration,
            sample_rate: decoded.sample_rate,
            channels: decoded.channels.max(1),
            file_size,
        })
    }
}

/// `10` prints as `10.0`, `2.5` as `2.5`.
fn fmt_seconds(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    fn write_tone(path: &Path, seconds: f64, sample_rate: u32, channels: u16) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f64).round() as usize;
        for i in 0..frames {
            let v = (i as f32 * 0.05).sin() * 12000.0;
            for _ in 0..channels {
                writer.write_sample(v as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_accepts_in_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ok.wav");
        write_tone(&path, 2.0, 8000, 2);

        let validator = AudioValidator::new(1.0, 3.0);
        let meta = validator.validate(&path).unwrap();
        assert!((meta.duration - 2.0).abs() < 1e-6);
        assert_eq!(meta.sample_rate, 8000);
        assert_eq!(meta.channels, 2);
        assert_eq!(meta.file_size, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_rejects_too_short() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_tone(&path, 0.99, 8000, 1);

        let err = AudioValidator::new(1.0, 3.0).validate(&path).unwrap_err();
        match err {
            ServiceError::Validation(msg) => {
                assert_eq!(msg, "Audio too short. Minimum 1.0 seconds required.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_too_long() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_tone(&path, 3.01, 8000, 1);

        let err = AudioValidator::new(1.0, 3.0).validate(&path).unwrap_err();
        assert!(err.to_string().starts_with("Audio too long"));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edge.wav");
        write_tone(&path, 1.0, 8000, 1);
        assert!(AudioValidator::new(1.0, 1.0).validate(&path).is_ok());
    }

    #[test]
    fn test_decode_failure_is_validation_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"\x00\x01\x02 not an mp3").unwrap();

        let err = AudioValidator::new(1.0, 3.0).validate(&path).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(err.to_string().starts_with("Invalid audio file:"));
    }

    #[test]
    fn test_fmt_seconds() {
        assert_eq!(fmt_seconds(10.0), "10.0");
        assert_eq!(fmt_seconds(2.5), "2.5");
    }
}
