use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Audio encodings accepted by the recognition service.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    Mp3,
    Linear16,
    Flac,
    OggOpus,
    Amr,
    AmrWb,
}

impl AudioEncoding {
    /// Wire name used by the Speech-to-Text API.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::Linear16 => "LINEAR16",
            AudioEncoding::Flac => "FLAC",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::Amr => "AMR",
            AudioEncoding::AmrWb => "AMR_WB",
        }
    }

    /// Maps a lower-case extension (without the dot) to an encoding.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "mp3" => Some(AudioEncoding::Mp3),
            "wav" => Some(AudioEncoding::Linear16),
            "flac" => Some(AudioEncoding::Flac),
            "ogg" => Some(AudioEncoding::OggOpus),
            "amr" => Some(AudioEncoding::Amr),
            "awb" => Some(AudioEncoding::AmrWb),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lower-cased extension of `file_name` including the leading dot, or an
/// empty string when there is none.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn resolve_encoding(file_name: &str) -> Result<AudioEncoding, PipelineError> {
    let ext = extension_of(file_name);
    match ext.strip_prefix('.').and_then(AudioEncoding::from_extension) {
        Some(encoding) => Ok(encoding),
        None => Err(PipelineError::UnsupportedFormat(ext)),
    }
}
