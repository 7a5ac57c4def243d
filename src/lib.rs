//! # voice-clone-service
//!
//! HTTP service that validates voice recordings, turns them into reference
//! samples, and synthesizes speech in the recorded voice with a pretrained
//! voice-cloning model (XTTS v2 through the Coqui `tts` program by default).
//!
//! ## Pipeline
//!
//! 1. **Validate** (`POST /validate-audio`): the upload is decoded in full and
//!    its duration checked against the configured bounds. The file stays in
//!    the upload directory under a server-issued `upload_id`.
//! 2. **Process** (`POST /process-voice-sample`): the upload is resampled to
//!    22050 Hz, mixed to mono, peak-normalized and pre-emphasized, then stored
//!    as `voice_sample_<sample_id>.wav`.
//! 3. **Synthesize** (`POST /synthesize`): the model renders text in the
//!    sample's voice. Output is WAV, optionally transcoded with ffmpeg.
//! 4. **Download / cleanup**: `GET /download/{filename}`, `POST /cleanup`.
//!
//! Every path a client sends is resolved through [`Workspace`], which only
//! accepts files inside the three managed directories.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voice_clone_service::{create_router, load_cloner, AppState, ServiceConfig, Workspace};
//!
//! let config = ServiceConfig::from_env()?;
//! Workspace::from_config(&config).init()?;
//! let state = AppState::new(config.clone(), load_cloner(&config));
//! let app = create_router(state);
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod preprocess;
pub mod server;
pub mod synthesis;
pub mod validate;
pub mod workspace;

pub use audio::AudioBuffer;
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use preprocess::Preprocessor;
pub use server::{create_router, AppState};
pub use synthesis::{
    load_cloner, CloneRequest, CommandCloner, SynthesisInvoker, SynthesisJob, SynthesisLimits,
    SynthesisResult, VoiceCloner,
};
pub use validate::{AudioValidator, ValidationMetadata};
pub use workspace::Workspace;
