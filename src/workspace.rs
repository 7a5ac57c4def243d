//! Managed directories and the identifiers that name files inside them.
//!
//! Clients never address the filesystem directly: every path or id they send
//! is resolved here, and anything that would land outside the upload, model
//! or output directory is refused.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::audio::SUPPORTED_FORMATS;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};

const MAX_SAMPLE_ID_LEN: usize = 64;

/// The three flat directories the service owns.
#[derive(Debug, Clone)]
pub struct Workspace {
    upload_dir: PathBuf,
    model_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        model_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            model_dir: model_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.upload_dir, &config.model_dir, &config.output_dir)
    }

    /// Create all managed directories.
    pub fn init(&self) -> Result<()> {
        for dir in self.roots() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        info!(
            upload = %self.upload_dir.display(),
            model = %self.model_dir.display(),
            output = %self.output_dir.display(),
            "Directories initialized"
        );
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn roots(&self) -> [&Path; 3] {
        [&self.upload_dir, &self.model_dir, &self.output_dir]
    }

    /// Fresh upload location: `temp_<id>.<ext>`. Returns the id and the path.
    pub fn new_upload(&self, ext: &str) -> (String, PathBuf) {
        let id = Uuid::new_v4().to_string();
        let path = self.upload_dir.join(format!("temp_{id}.{ext}"));
        (id, path)
    }

    /// Locate an existing upload by the id handed out at validation time.
    pub fn upload_path(&self, upload_id: &str) -> ServiceResult<PathBuf> {
        let id = Uuid::parse_str(upload_id.trim())
            .map_err(|_| ServiceError::bad_request("Invalid upload_id"))?;
        SUPPORTED_FORMATS
            .iter()
            .map(|ext| self.upload_dir.join(format!("temp_{id}.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| ServiceError::not_found("File not found"))
    }

    /// Location of the processed sample `voice_sample_<sample_id>.wav`.
    pub fn sample_path(&self, sample_id: &str) -> ServiceResult<PathBuf> {
        if !is_valid_sample_id(sample_id) {
            return Err(ServiceError::bad_request(
                "sample_id must be 1-64 characters of letters, digits, '-' or '_'",
            ));
        }
        Ok(self.model_dir.join(format!("voice_sample_{sample_id}.wav")))
    }

    /// Fresh synthesis output location: `speech_<id>.<format>`.
    pub fn new_output(&self, format: &str) -> (String, PathBuf) {
        let id = Uuid::new_v4().to_string();
        let path = self.output_path_for(&id, format);
        (id, path)
    }

    pub fn output_path_for(&self, id: &str, format: &str) -> PathBuf {
        self.output_dir.join(format!("speech_{id}.{format}"))
    }

    /// Resolve a download name. Only bare file names inside the output
    /// directory are served.
    pub fn output_file(&self, filename: &str) -> ServiceResult<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !filename.contains('\\') => {
                Ok(self.output_dir.join(name))
            }
            _ => Err(ServiceError::bad_request("Invalid filename")),
        }
    }

    /// Resolve a client-supplied path, requiring it to lie inside one of the
    /// managed directories. The check is lexical; `..` is always refused.
    pub fn resolve(&self, raw: &str) -> ServiceResult<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ServiceError::bad_request("Empty path"));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ServiceError::bad_request(
                        "Path is outside the managed directories",
                    ))
                }
                other => normalized.push(other),
            }
        }

        let inside = self.roots().iter().any(|root| {
            let root = strip_cur_dir(root);
            normalized.starts_with(&root) && normalized != root
        });
        if !inside {
            return Err(ServiceError::bad_request(
                "Path is outside the managed directories",
            ));
        }
        Ok(normalized)
    }
}

fn strip_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Sample ids are used verbatim in file names.
pub fn is_valid_sample_id(sample_id: &str) -> bool {
    !sample_id.is_empty()
        && sample_id.len() <= MAX_SAMPLE_ID_LEN
        && sample_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn workspace(root: &Path) -> Workspace {
        Workspace::new(
            root.join("uploads"),
            root.join("models"),
            root.join("output"),
        )
    }

    #[test]
    fn test_init_creates_directories() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        ws.init().unwrap();
        assert!(ws.upload_dir().is_dir());
        assert!(ws.model_dir().is_dir());
        assert!(ws.output_dir().is_dir());
        // idempotent
        ws.init().unwrap();
    }

    #[test]
    fn test_resolve_inside_roots() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let path = ws.output_dir().join("speech_x.wav");
        let resolved = ws.resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());

        let sneaky = format!("{}/../../etc/passwd", ws.upload_dir().display());
        assert!(matches!(
            ws.resolve(&sneaky),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(ws.resolve("/etc/passwd").is_err());
        assert!(ws.resolve("").is_err());
        // the root itself is not a file reference
        assert!(ws.resolve(ws.model_dir().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_sample_ids() {
        assert!(is_valid_sample_id("abc-123_X"));
        assert!(!is_valid_sample_id(""));
        assert!(!is_valid_sample_id("../x"));
        assert!(!is_valid_sample_id("a/b"));
        assert!(!is_valid_sample_id(&"a".repeat(65)));

        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        let path = ws.sample_path("alice").unwrap();
        assert_eq!(path, ws.model_dir().join("voice_sample_alice.wav"));
        assert!(ws.sample_path("../alice").is_err());
    }

    #[test]
    fn test_output_file_names() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        assert_eq!(
            ws.output_file("speech_1.wav").unwrap(),
            ws.output_dir().join("speech_1.wav")
        );
        assert!(ws.output_file("../secret").is_err());
        assert!(ws.output_file("a/b.wav").is_err());
        assert!(ws.output_file("/etc/passwd").is_err());
        assert!(ws.output_file("..").is_err());
        assert!(ws.output_file("").is_err());
    }

    #[test]
    fn test_upload_lookup() {
        let dir = tempdir().unwrap();
        let ws = workspace(dir.path());
        ws.init().unwrap();

        let (id, path) = ws.new_upload("flac");
        assert!(path.starts_with(ws.upload_dir()));
        assert!(matches!(
            ws.upload_path(&id),
            Err(ServiceError::NotFound(_))
        ));

        std::fs::write(&path, b"x").unwrap();
        assert_eq!(ws.upload_path(&id).unwrap(), path);
        assert!(matches!(
            ws.upload_path("not-a-uuid"),
            Err(ServiceError::BadRequest(_))
        ));
    }
}
