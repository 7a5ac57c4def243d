//! Service configuration read from the environment.

use anyhow::{bail, Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Raw uploads awaiting validation/processing
    pub upload_dir: PathBuf,
    /// Processed voice samples
    pub model_dir: PathBuf,
    /// Synthesis output
    pub output_dir: PathBuf,
    /// Upload size cap in bytes
    pub max_file_size: u64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Program implementing the voice-cloning model
    pub tts_command: String,
    pub tts_model: String,
    pub tts_use_cuda: bool,
    pub ffmpeg_path: String,
    pub synthesis_timeout: Duration,
    /// Model calls allowed to run at once
    pub synthesis_concurrency: usize,
    /// Requests allowed to wait for a model slot before new ones are refused
    pub synthesis_queue_depth: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("/tmp/podstream/voice_uploads"),
            model_dir: PathBuf::from("/tmp/podstream/voice_models"),
            output_dir: PathBuf::from("/tmp/podstream/voice_output"),
            max_file_size: 10 * 1024 * 1024,
            min_duration: 10.0,
            max_duration: 300.0,
            host: "0.0.0.0".to_string(),
            port: 5001,
            debug: false,
            tts_command: "tts".to_string(),
            tts_model: "tts_models/multilingual/multi-dataset/xtts_v2".to_string(),
            tts_use_cuda: false,
            ffmpeg_path: "ffmpeg".to_string(),
            synthesis_timeout: Duration::from_secs(600),
            synthesis_concurrency: 1,
            synthesis_queue_depth: 4,
        }
    }
}

impl ServiceConfig {
    /// Build from process environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values are logged and
    /// replaced with the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let string = |key: &str, default: String| match lookup(key) {
            Some(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
            _ => default,
        };

        let config = Self {
            upload_dir: string("VOICE_UPLOAD_DIR", d.upload_dir.display().to_string()).into(),
            model_dir: string("VOICE_MODEL_DIR", d.model_dir.display().to_string()).into(),
            output_dir: string("VOICE_OUTPUT_DIR", d.output_dir.display().to_string()).into(),
            max_file_size: parsed(&lookup, "MAX_VOICE_FILE_SIZE", d.max_file_size),
            min_duration: parsed(&lookup, "MIN_VOICE_DURATION", d.min_duration),
            max_duration: parsed(&lookup, "MAX_VOICE_DURATION", d.max_duration),
            host: string("TTS_SERVICE_HOST", d.host),
            port: parsed(&lookup, "TTS_SERVICE_PORT", d.port),
            debug: flag(&lookup, "DEBUG"),
            tts_command: string("TTS_COMMAND", d.tts_command),
            tts_model: string("TTS_MODEL", d.tts_model),
            tts_use_cuda: flag(&lookup, "TTS_USE_CUDA"),
            ffmpeg_path: string("FFMPEG_PATH", d.ffmpeg_path),
            synthesis_timeout: Duration::from_secs(parsed(
                &lookup,
                "SYNTHESIS_TIMEOUT_SECS",
                d.synthesis_timeout.as_secs(),
            )),
            synthesis_concurrency: parsed(
                &lookup,
                "SYNTHESIS_CONCURRENCY",
                d.synthesis_concurrency,
            ),
            synthesis_queue_depth: parsed(
                &lookup,
                "SYNTHESIS_QUEUE_DEPTH",
                d.synthesis_queue_depth,
            ),
        };
        config.check()?;
        Ok(config)
    }

    /// Listen address. IPv6 hosts are written bare (`::`) or bracketed
    /// (`[::1]`).
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("invalid TTS_SERVICE_HOST '{}'", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Reject combinations that cannot work.
    pub fn check(&self) -> Result<()> {
        if !(self.min_duration >= 0.0 && self.min_duration.is_finite()) {
            bail!("MIN_VOICE_DURATION must be a non-negative number");
        }
        if !self.max_duration.is_finite() {
            bail!("MAX_VOICE_DURATION must be a finite number");
        }
        if self.max_duration < self.min_duration {
            bail!(
                "MAX_VOICE_DURATION ({}) is below MIN_VOICE_DURATION ({})",
                self.max_duration,
                self.min_duration
            );
        }
        if self.synthesis_concurrency == 0 {
            bail!("SYNTHESIS_CONCURRENCY must be at least 1");
        }
        if self.synthesis_timeout.is_zero() {
            bail!("SYNTHESIS_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

/// Default `tracing` filter directive; `RUST_LOG` takes precedence over it.
pub fn log_directive(debug: bool) -> &'static str {
    if debug {
        "voice_clone_service=debug,serve=debug,tower_http=debug"
    } else {
        "voice_clone_service=info,serve=info,tower_http=info"
    }
}

/// Read the `DEBUG` flag on its own, before logging is set up.
pub fn debug_from_env() -> bool {
    flag(&|key: &str| std::env::var(key).ok(), "DEBUG")
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {}='{}', falling back to {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}

fn flag<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}
