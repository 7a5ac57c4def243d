//! Speech synthesis with a cloned voice.
//!
//! [`SynthesisInvoker`] owns the (optional) loaded model and runs each call on
//! the blocking pool behind a bounded admission queue:
//!
//! 1. input checks (text, output format, language)
//! 2. model availability
//! 3. reference sample existence
//! 4. admission: at most `concurrency + queue_depth` requests in flight,
//!    the rest are refused straight away
//! 5. model call under a deadline, then optional transcode and duration
//!    read-back

mod cloner;

pub use cloner::{CloneRequest, CloneTimedOut, CommandCloner, VoiceCloner};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::audio::{is_output_format, probe_duration, Transcoder};
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::workspace::Workspace;

/// Extra time granted past the model deadline before the invoker stops
/// waiting on the blocking task.
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Native container of the model output
pub const NATIVE_FORMAT: &str = "wav";

/// Load the configured model. Failure is logged and yields `None`; the
/// service then runs with synthesis disabled.
pub fn load_cloner(config: &ServiceConfig) -> Option<Arc<dyn VoiceCloner>> {
    match CommandCloner::new(&config.tts_command, &config.tts_model)
        .with_cuda(config.tts_use_cuda)
        .load()
    {
        Ok(cloner) => {
            info!("TTS model loaded successfully");
            Some(Arc::new(cloner))
        }
        Err(e) => {
            error!("Failed to load TTS model: {e:#}");
            None
        }
    }
}

/// Concurrency and deadline settings for model calls.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisLimits {
    pub timeout: Duration,
    pub concurrency: usize,
    pub queue_depth: usize,
}

impl SynthesisLimits {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            timeout: config.synthesis_timeout,
            concurrency: config.synthesis_concurrency,
            queue_depth: config.synthesis_queue_depth,
        }
    }
}

impl Default for SynthesisLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            concurrency: 1,
            queue_depth: 4,
        }
    }
}

/// Parameters of one synthesis request.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub text: String,
    pub voice_sample: PathBuf,
    pub language: String,
    pub output_format: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisResult {
    pub output_path: PathBuf,
    /// Seconds, measured from the written file
    pub duration: f64,
    pub format: String,
}

pub struct SynthesisInvoker {
    cloner: Option<Arc<dyn VoiceCloner>>,
    workspace: Workspace,
    transcoder: Transcoder,
    timeout: Duration,
    slots: Arc<Semaphore>,
    admission: Arc<Semaphore>,
}

impl SynthesisInvoker {
    pub fn new(
        cloner: Option<Arc<dyn VoiceCloner>>,
        workspace: Workspace,
        transcoder: Transcoder,
        limits: SynthesisLimits,
    ) -> Self {
        let concurrency = limits.concurrency.max(1);
        Self {
            cloner,
            workspace,
            transcoder,
            timeout: limits.timeout,
            slots: Arc::new(Semaphore::new(concurrency)),
            admission: Arc::new(Semaphore::new(concurrency + limits.queue_depth)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cloner.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.cloner.as_deref().map(|c| c.name())
    }

    pub async fn synthesize(&self, job: SynthesisJob) -> ServiceResult<SynthesisResult> {
        if job.text.trim().is_empty() {
            return Err(ServiceError::bad_request("Text cannot be empty"));
        }
        let format = job.output_format.trim().to_ascii_lowercase();
        if !is_output_format(&format) {
            return Err(ServiceError::bad_request(format!(
                "Unsupported output format '{}'",
                job.output_format
            )));
        }
        let language = job.language.trim().to_string();
        if language.is_empty() {
            return Err(ServiceError::bad_request("language cannot be empty"));
        }

        let cloner = self
            .cloner
            .clone()
            .ok_or_else(|| ServiceError::unavailable("TTS model not loaded"))?;

        if !job.voice_sample.is_file() {
            return Err(ServiceError::not_found("Voice sample not found"));
        }

        let admitted = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| ServiceError::unavailable("Synthesis queue is full"))?;
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::unavailable("Synthesis is shutting down"))?;

        info!(
            "Synthesizing speech with text length: {}",
            job.text.chars().count()
        );

        let (id, native_path) = self.workspace.new_output(NATIVE_FORMAT);
        let output_path = self.workspace.output_path_for(&id, &format);
        let transcoder = self.transcoder.clone();
        let deadline = self.timeout;
        let job = SynthesisJob {
            language,
            output_format: format.clone(),
            ..job
        };

        let mut guard = AbandonGuard::new([native_path.clone(), output_path.clone()]);
        let abandoned = guard.flag.clone();
        let render_output = output_path.clone();
        // the permits travel with the blocking call: a slot frees up only
        // once the model is done, even if this future is dropped first
        let task = tokio::task::spawn_blocking(move || {
            let _permits = (admitted, slot);
            let rendered = render(
                &*cloner,
                &job,
                &native_path,
                &render_output,
                &transcoder,
                deadline,
            );
            if abandoned.load(Ordering::SeqCst) {
                remove_quietly(&native_path);
                remove_quietly(&render_output);
            }
            rendered
        });

        let duration = match tokio::time::timeout(deadline + DEADLINE_GRACE, task).await {
            Ok(joined) => {
                guard.disarm();
                joined??
            }
            Err(_) => {
                return Err(ServiceError::Timeout(format!(
                    "synthesis did not finish within {deadline:?}"
                )))
            }
        };

        Ok(SynthesisResult {
            output_path,
            duration,
            format,
        })
    }
}

/// Blocking part of a synthesis call. Leaves no intermediate files behind.
fn render(
    cloner: &dyn VoiceCloner,
    job: &SynthesisJob,
    native_path: &Path,
    output_path: &Path,
    transcoder: &Transcoder,
    deadline: Duration,
) -> ServiceResult<f64> {
    let request = CloneRequest {
        text: &job.text,
        speaker_wav: &job.voice_sample,
        language: &job.language,
        output: native_path,
    };

    if let Err(e) = cloner.clone_to_file(&request, deadline) {
        remove_quietly(native_path);
        if e.downcast_ref::<CloneTimedOut>().is_some() {
            return Err(ServiceError::Timeout(e.to_string()));
        }
        return Err(ServiceError::internal(format!("{e:#}")));
    }

    if output_path != native_path {
        let converted = transcoder.convert(native_path, output_path);
        remove_quietly(native_path);
        if let Err(e) = converted {
            remove_quietly(output_path);
            return Err(ServiceError::internal(format!(
                "Format conversion failed: {e:#}"
            )));
        }
    }

    probe_duration(output_path)
        .map_err(|e| ServiceError::internal(format!("Failed to read generated audio: {e:#}")))
}

/// Marks a call whose caller stopped waiting and removes its outputs.
///
/// Both sides clean up: the guard removes whatever is already written, the
/// blocking task removes what it writes after the flag is set.
struct AbandonGuard {
    flag: Arc<AtomicBool>,
    paths: [PathBuf; 2],
    armed: bool,
}

impl AbandonGuard {
    fn new(paths: [PathBuf; 2]) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            paths,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
            for path in &self.paths {
                remove_quietly(path);
            }
            warn!("Synthesis result no longer awaited, outputs discarded");
        }
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}
