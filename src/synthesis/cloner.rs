//! The voice-cloning model boundary.
//!
//! The model is opaque to the service: it takes text, a reference recording
//! and a language code, and writes a WAV file. [`CommandCloner`] drives the
//! Coqui `tts` program as a child process.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for stderr to close once the model process is gone.
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// One synthesis call against the model.
#[derive(Debug, Clone, Copy)]
pub struct CloneRequest<'a> {
    pub text: &'a str,
    /// Reference recording of the target voice
    pub speaker_wav: &'a Path,
    pub language: &'a str,
    /// Where the model must write its WAV output
    pub output: &'a Path,
}

/// Returned (inside `anyhow::Error`) when a model call outlives its deadline.
#[derive(Debug, thiserror::Error)]
#[error("synthesis did not finish within {0:?}")]
pub struct CloneTimedOut(pub Duration);

/// A loaded voice-cloning model.
///
/// Implementations are shared between requests and must tolerate concurrent
/// calls; the invoker bounds how many run at once.
pub trait VoiceCloner: Send + Sync {
    /// Model identifier for health reporting
    fn name(&self) -> &str;

    /// Render `request.text` in the reference voice to `request.output`.
    ///
    /// Blocks until done. Must give up with [`CloneTimedOut`] once
    /// `deadline` has elapsed.
    fn clone_to_file(&self, request: &CloneRequest<'_>, deadline: Duration) -> Result<()>;
}

/// Runs `<program> --model_name <model> --text .. --speaker_wav .. --language_idx .. --out_path ..`.
#[derive(Debug, Clone)]
pub struct CommandCloner {
    program: String,
    model_name: String,
    use_cuda: bool,
}

impl CommandCloner {
    pub fn new(program: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model_name: model_name.into(),
            use_cuda: false,
        }
    }

    pub fn with_cuda(mut self, use_cuda: bool) -> Self {
        self.use_cuda = use_cuda;
        self
    }

    /// Check that the program starts; the model itself is fetched and
    /// loaded by the program on first use.
    pub fn load(self) -> Result<Self> {
        let output = Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to start {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} --help exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        info!("TTS model {} available via {}", self.model_name, self.program);
        Ok(self)
    }

    fn command(&self, request: &CloneRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--model_name")
            .arg(&self.model_name)
            .arg("--text")
            .arg(request.text)
            .arg("--speaker_wav")
            .arg(request.speaker_wav)
            .arg("--language_idx")
            .arg(request.language)
            .arg("--out_path")
            .arg(request.output);
        if self.use_cuda {
            cmd.arg("--use_cuda").arg("true");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl VoiceCloner for CommandCloner {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn clone_to_file(&self, request: &CloneRequest<'_>, deadline: Duration) -> Result<()> {
        let mut child = self
            .command(request)
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        // drain stderr concurrently so a chatty model cannot fill the pipe
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf);
            }
            let _ = tx.send(buf);
        });
        // grandchildren of the model may hold the pipe open after it exits
        let collect_stderr = || rx.recv_timeout(STDERR_GRACE).unwrap_or_default();

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                let stderr = collect_stderr();
                debug!("{} killed after {:?}: {}", self.program, deadline, stderr.trim());
                return Err(CloneTimedOut(deadline).into());
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        let stderr = collect_stderr();
        debug!("{} finished in {:?}", self.program, started.elapsed());

        if !status.success() {
            bail!("{} exited with {}: {}", self.program, status, stderr.trim());
        }
        if !request.output.is_file() {
            bail!(
                "{} did not produce {}",
                self.program,
                request.output.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_program() {
        let result = CommandCloner::new("/nonexistent/tts-binary", "xtts").load();
        assert!(result.is_err());
    }

    #[test]
    fn test_command_arguments() {
        let cloner = CommandCloner::new("tts", "xtts").with_cuda(true);
        let request = CloneRequest {
            text: "Hello world",
            speaker_wav: Path::new("/m/voice_sample_a.wav"),
            language: "en",
            output: Path::new("/o/speech_1.wav"),
        };
        let cmd = cloner.command(&request);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--model_name",
                "xtts",
                "--text",
                "Hello world",
                "--speaker_wav",
                "/m/voice_sample_a.wav",
                "--language_idx",
                "en",
                "--out_path",
                "/o/speech_1.wav",
                "--use_cuda",
                "true"
            ]
        );
        assert_eq!(cloner.name(), "xtts");
    }

    #[cfg(unix)]
    #[test]
    fn test_deadline_kills_child() {
        // stands in for a model that never finishes
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-tts");
        std::fs::write(&script, "#!/bin/sh\nsleep 5 &\nexec sleep 5\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cloner = CommandCloner::new(script.to_string_lossy(), "slow");
        let out = dir.path().join("out.wav");
        let request = CloneRequest {
            text: "hi",
            speaker_wav: Path::new("ref.wav"),
            language: "en",
            output: &out,
        };
        let started = Instant::now();
        let err = cloner
            .clone_to_file(&request, Duration::from_millis(200))
            .unwrap_err();
        assert!(err.downcast_ref::<CloneTimedOut>().is_some());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_lingering_grandchild_does_not_block() {
        // the script exits at once but leaves a process holding stderr
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("forking-tts");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do\n\
             if [ \"$1\" = \"--out_path\" ]; then out=\"$2\"; fi\n\
             shift\n\
             done\n\
             : > \"$out\"\n\
             sleep 5 &\n\
             exit 0\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cloner = CommandCloner::new(script.to_string_lossy(), "forking");
        let out = dir.path().join("out.wav");
        let request = CloneRequest {
            text: "hi",
            speaker_wav: Path::new("ref.wav"),
            language: "en",
            output: &out,
        };
        let started = Instant::now();
        cloner
            .clone_to_file(&request, Duration::from_secs(10))
            .unwrap();
        assert!(out.is_file());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("bad-tts");
        std::fs::write(&script, "#!/bin/sh\necho 'model exploded' >&2\nexit 3\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cloner = CommandCloner::new(script.to_string_lossy(), "bad");
        let out = dir.path().join("out.wav");
        let request = CloneRequest {
            text: "hi",
            speaker_wav: Path::new("ref.wav"),
            language: "en",
            output: &out,
        };
        let err = cloner
            .clone_to_file(&request, Duration::from_secs(10))
            .unwrap_err();
        assert!(err.to_string().contains("model exploded"));
    }
}
