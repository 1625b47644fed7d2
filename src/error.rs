use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of a transcription run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unsupported audio format '{0}'")]
    UnsupportedFormat(String),

    #[error("service account key not found at {0:?}")]
    CredentialMissing(PathBuf),

    #[error("invalid credentials: {0}")]
    Credential(String),

    #[error("input audio file not found: {0:?}")]
    InputMissing(PathBuf),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("recognition did not finish within {}s", .0.as_secs())]
    RecognitionTimeout(Duration),

    #[error("saving results failed: {0}")]
    SaveFailed(String),

    #[error("interrupted")]
    Interrupted,

    /// Only ever logged; cleanup never fails a run.
    #[error("cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Startup conditions the operator has to fix before re-running.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            PipelineError::CredentialMissing(_) | PipelineError::InputMissing(_)
        )
    }
}
