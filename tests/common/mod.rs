//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::TempDir;
use voice_clone_service::synthesis::CloneTimedOut;
use voice_clone_service::{
    AppState, AudioBuffer, CloneRequest, ServiceConfig, VoiceCloner, Workspace,
};

/// Write a 16-bit WAV holding a 220 Hz tone on every channel.
pub fn write_tone(path: &Path, seconds: f64, sample_rate: u32, channels: u16, amplitude: f32) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let frames = (seconds * sample_rate as f64).round() as usize;
    for i in 0..frames {
        let v = amplitude * (2.0 * PI * 220.0 * i as f32 / sample_rate as f32).sin();
        for _ in 0..channels {
            writer.write_sample((v * 32767.0) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Bytes of a mono 8 kHz tone, suitable as an upload body.
pub fn tone_bytes(seconds: f64) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone(&path, seconds, 8000, 1, 0.5);
    std::fs::read(path).unwrap()
}

/// Whether an ffmpeg binary is on PATH.
pub fn ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Config rooted in a fresh temp dir, with default duration bounds.
pub fn test_config() -> (TempDir, ServiceConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig {
        upload_dir: dir.path().join("uploads"),
        model_dir: dir.path().join("models"),
        output_dir: dir.path().join("output"),
        ..ServiceConfig::default()
    };
    Workspace::from_config(&config).init().unwrap();
    (dir, config)
}

pub fn test_state(
    config: ServiceConfig,
    cloner: Option<Arc<dyn VoiceCloner>>,
) -> Arc<AppState> {
    AppState::new(config, cloner)
}

pub fn all_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

/// Stand-in model: writes one second of tone per call, optionally slowly.
pub struct FakeCloner {
    pub delay: Duration,
}

impl FakeCloner {
    pub fn instant() -> Arc<dyn VoiceCloner> {
        Arc::new(Self {
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<dyn VoiceCloner> {
        Arc::new(Self { delay })
    }
}

impl VoiceCloner for FakeCloner {
    fn name(&self) -> &str {
        "fake-xtts"
    }

    fn clone_to_file(&self, request: &CloneRequest<'_>, deadline: Duration) -> anyhow::Result<()> {
        anyhow::ensure!(request.speaker_wav.is_file(), "reference sample missing");
        if self.delay >= deadline {
            std::thread::sleep(deadline);
            return Err(CloneTimedOut(deadline).into());
        }
        std::thread::sleep(self.delay);
        let samples = (0..24000)
            .map(|i| 0.4 * (2.0 * PI * 330.0 * i as f32 / 24000.0).sin())
            .collect();
        AudioBuffer::new(samples, 24000).save(request.output)
    }
}
