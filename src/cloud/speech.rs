use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::auth::GcpSession;
use super::{REQUEST_TIMEOUT, Recognition, RecognitionOptions, SpeechRecognizer, Utterance};
use crate::config::Language;
use crate::encoding::AudioEncoding;
use crate::error::PipelineError;
use crate::subtitle::{WordTiming, parse_seconds};

const SPEECH_BASE_URL: &str = "https://speech.googleapis.com";

/// Speech-to-Text v1 long-running recognition.
pub struct GoogleSpeech {
    session: GcpSession,
    base_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct OperationHandle {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<RecognizeResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    words: Vec<WordInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WordInfo {
    start_time: Option<String>,
    end_time: Option<String>,
    #[serde(default)]
    word: String,
}

/// Parses a protobuf JSON duration such as `"1.500s"`; absent means zero.
fn parse_offset(value: Option<&str>) -> Result<Duration, PipelineError> {
    let Some(value) = value else {
        return Ok(Duration::ZERO);
    };
    value
        .strip_suffix('s')
        .and_then(parse_seconds)
        .ok_or_else(|| PipelineError::RecognitionFailed(format!("bad time offset '{}'", value)))
}

impl RecognizeResponse {
    /// Keeps the top alternative of each result, in service order.
    fn into_recognition(self) -> Result<Recognition, PipelineError> {
        let mut utterances = Vec::with_capacity(self.results.len());

        for result in self.results {
            let Some(alternative) = result.alternatives.into_iter().next() else {
                continue;
            };

            let words = alternative
                .words
                .into_iter()
                .map(|w| {
                    let start = parse_offset(w.start_time.as_deref())?;
                    let end = parse_offset(w.end_time.as_deref())?;
                    Ok(WordTiming::new(w.word, start, end))
                })
                .collect::<Result<Vec<_>, PipelineError>>()?;

            utterances.push(Utterance {
                text: alternative.transcript,
                words,
            });
        }

        Ok(Recognition { utterances })
    }
}

impl GoogleSpeech {
    pub fn new(session: GcpSession, timeout: Duration, poll_interval: Duration) -> Self {
        Self::with_base_url(session, SPEECH_BASE_URL, timeout, poll_interval)
    }

    pub fn with_base_url(
        session: GcpSession,
        base_url: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            poll_interval,
        }
    }

    fn request_body(
        uri: &str,
        encoding: AudioEncoding,
        language: &Language,
        options: RecognitionOptions,
    ) -> serde_json::Value {
        json!({
            "config": {
                "encoding": encoding.as_str(),
                "languageCode": language.as_str(),
                "enableAutomaticPunctuation": options.auto_punctuation,
                "enableWordTimeOffsets": options.word_offsets,
            },
            "audio": { "uri": uri },
        })
    }

    async fn start(&self, body: &serde_json::Value) -> Result<OperationHandle, PipelineError> {
        let url = format!("{}/v1/speech:longrunningrecognize", self.base_url);
        let response = self
            .session
            .http()
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(self.session.bearer().await?)
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::RecognitionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::RecognitionFailed(format!(
                "speech API returned {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::RecognitionFailed(format!("operation handle: {}", e)))
    }

    async fn poll(&self, name: &str) -> Result<Operation, PipelineError> {
        let url = format!("{}/v1/operations/{}", self.base_url, name);
        let response = self
            .session
            .http()
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(self.session.bearer().await?)
            .send()
            .await
            .map_err(|e| PipelineError::RecognitionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::RecognitionFailed(format!(
                "operation {} returned {}: {}",
                name, status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::RecognitionFailed(format!("operation body: {}", e)))
    }

    async fn wait_for(&self, name: &str) -> Result<Recognition, PipelineError> {
        loop {
            let operation = self.poll(name).await?;
            if let Some(error) = operation.error {
                return Err(PipelineError::RecognitionFailed(format!(
                    "code {}: {}",
                    error.code, error.message
                )));
            }
            if operation.done {
                return operation.response.unwrap_or_default().into_recognition();
            }
            log::debug!("operation {} still running", name);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleSpeech {
    async fn recognize(
        &self,
        uri: &str,
        encoding: AudioEncoding,
        language: &Language,
        options: RecognitionOptions,
    ) -> Result<Recognition, PipelineError> {
        let body = Self::request_body(uri, encoding, language, options);
        let handle = self.start(&body).await?;
        log::info!("recognition operation {} started for {}", handle.name, uri);

        tokio::time::timeout(self.timeout, self.wait_for(&handle.name))
            .await
            .map_err(|_| PipelineError::RecognitionTimeout(self.timeout))?
    }
}
