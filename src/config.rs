use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, PartialEq, Eq, Debug, Hash, Default)]
pub enum Language {
    #[default]
    Vietnamese,
    English,
    /// Any other BCP-47 code understood by the recognizer.
    Other(String),
}

impl Language {
    /// Choices offered by the interactive prompt, in display order.
    pub const PROMPT_CHOICES: [Language; 2] = [Language::Vietnamese, Language::English];

    pub fn as_str(&self) -> &str {
        match self {
            Language::Vietnamese => "vi-VN",
            Language::English => "en-US",
            Language::Other(code) => code,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Language::Vietnamese => "Vietnamese",
            Language::English => "English",
            Language::Other(code) => code,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("language code must not be empty".to_string()),
            "vi" | "vi-VN" => Ok(Language::Vietnamese),
            "en" | "en-US" => Ok(Language::English),
            other => Ok(Language::Other(other.to_string())),
        }
    }
}

const DEFAULT_BUCKET: &str = "cloudscribe-audio";
const DEFAULT_CREDENTIALS: &str = "key.json";
const DEFAULT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_OBJECT_PREFIX: &str = "uploaded_audio";
const DEFAULT_INPUT_PATTERN: &str = "audio";
const DEFAULT_TRANSCRIPT_FILE: &str = "recognized_text.txt";
const DEFAULT_SUBTITLE_FILE: &str = "recognized_subtitles.srt";

/// Settings for a run, merged once at startup from the YAML file and the
/// command line, then handed to every collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub bucket: String,
    pub credentials: PathBuf,
    pub language: Option<Language>,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub object_prefix: String,
    pub input_pattern: String,
    pub auto_punctuation: bool,
    pub transcript_file: PathBuf,
    pub subtitle_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            credentials: PathBuf::from(DEFAULT_CREDENTIALS),
            language: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            object_prefix: DEFAULT_OBJECT_PREFIX.to_string(),
            input_pattern: DEFAULT_INPUT_PATTERN.to_string(),
            auto_punctuation: true,
            transcript_file: PathBuf::from(DEFAULT_TRANSCRIPT_FILE),
            subtitle_file: PathBuf::from(DEFAULT_SUBTITLE_FILE),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Key file location; relative paths are anchored at `program_dir`.
    pub fn credentials_path(&self, program_dir: &Path) -> PathBuf {
        if self.credentials.is_absolute() {
            self.credentials.clone()
        } else {
            program_dir.join(&self.credentials)
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub bucket: Option<String>,
    pub credentials: Option<PathBuf>,
    pub language: Option<Language>,
    pub timeout_secs: Option<u64>,
    pub transcript_file: Option<PathBuf>,
    pub subtitle_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(bucket) = overrides.bucket {
            self.bucket = bucket;
        }
        if let Some(credentials) = overrides.credentials {
            self.credentials = credentials;
        }
        if overrides.language.is_some() {
            self.language = overrides.language;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(path) = overrides.transcript_file {
            self.transcript_file = path;
        }
        if let Some(path) = overrides.subtitle_file {
            self.subtitle_file = path;
        }
        self
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".cloudscribe/config.yaml"))
}

/// Loads the config file. An explicitly named file must exist; the default
/// location silently falls back to built-in defaults.
pub fn load_app_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config_path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found at {:?}", path);
            }
            path.to_path_buf()
        }
        None => {
            let path = default_config_path()?;
            if !path.exists() {
                log::debug!("no config at {:?}, using defaults", path);
                return Ok(AppConfig::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config {:?}", config_path))?;
    let config: AppConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", config_path))?;
    log::debug!("loaded config from {:?}", config_path);
    Ok(config)
}

/// Directory holding the running executable.
pub fn program_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("Could not locate executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("Executable has no parent directory")
}
