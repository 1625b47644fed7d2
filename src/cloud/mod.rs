pub mod auth;
pub mod speech;
pub mod storage;
#[cfg(test)]
mod testing;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Language;
use crate::encoding::AudioEncoding;
use crate::error::PipelineError;
use crate::subtitle::WordTiming;

/// Upper bound for one API call. Uploads scale it with the file size.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An object living in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub bucket: String,
    pub name: String,
}

impl RemoteObject {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `local_path` and returns the `gs://` reference.
    async fn put(&self, object: &RemoteObject, local_path: &Path) -> Result<String, PipelineError>;

    async fn delete(&self, object: &RemoteObject) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RecognitionOptions {
    pub auto_punctuation: bool,
    pub word_offsets: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            auto_punctuation: true,
            word_offsets: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub words: Vec<WordTiming>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Recognition {
    pub utterances: Vec<Utterance>,
}

impl Recognition {
    /// Utterance texts in service order, each terminated by a newline.
    pub fn transcript(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}\n", u.text))
            .collect()
    }

    pub fn words(&self) -> Vec<WordTiming> {
        self.utterances
            .iter()
            .flat_map(|u| u.words.iter().cloned())
            .collect()
    }
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Blocks until the remote operation completes or the configured wait
    /// runs out.
    async fn recognize(
        &self,
        uri: &str,
        encoding: AudioEncoding,
        language: &Language,
        options: RecognitionOptions,
    ) -> Result<Recognition, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_joins_bucket_and_name() {
        let object = RemoteObject::new("bucket", "uploaded_audio-1.wav");
        assert_eq!(object.uri(), "gs://bucket/uploaded_audio-1.wav");
    }

    #[test]
    fn transcript_is_newline_terminated_per_utterance() {
        let recognition = Recognition {
            utterances: vec![
                Utterance {
                    text: "hi there".into(),
                    words: vec![
                        WordTiming::new("hi", Duration::ZERO, Duration::from_millis(500)),
                        WordTiming::new(
                            "there",
                            Duration::from_millis(500),
                            Duration::from_millis(1200),
                        ),
                    ],
                },
                Utterance {
                    text: "bye".into(),
                    words: vec![WordTiming::new(
                        "bye",
                        Duration::from_secs(2),
                        Duration::from_millis(2400),
                    )],
                },
            ],
        };
        assert_eq!(recognition.transcript(), "hi there\nbye\n");

        let words: Vec<String> = recognition.words().into_iter().map(|w| w.text).collect();
        assert_eq!(words, ["hi", "there", "bye"]);
    }

    #[test]
    fn empty_recognition_has_empty_transcript() {
        assert_eq!(Recognition::default().transcript(), "");
        assert!(Recognition::default().words().is_empty());
    }
}
