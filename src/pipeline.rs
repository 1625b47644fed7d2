use std::path::{Path, PathBuf};

use crate::cloud::{ObjectStore, Recognition, RecognitionOptions, RemoteObject, SpeechRecognizer};
use crate::config::{AppConfig, Language};
use crate::encoding::{AudioEncoding, extension_of, resolve_encoding};
use crate::error::PipelineError;
use crate::output;
use crate::subtitle::build_subtitles;

/// Where a run currently is. `CleanedUp` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Uploaded,
    Recognized,
    Saved,
    CleanedUp,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub transcript: PathBuf,
    pub subtitles: PathBuf,
    pub recognition: Option<PathBuf>,
}

impl OutputPaths {
    /// Configured file names placed in `dir`.
    pub fn in_dir(dir: &Path, config: &AppConfig) -> Self {
        Self {
            transcript: dir.join(&config.transcript_file),
            subtitles: dir.join(&config.subtitle_file),
            recognition: None,
        }
    }
}

/// One audio file to process and where its artifacts go.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub language: Language,
    pub outputs: OutputPaths,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub transcript_path: PathBuf,
    pub subtitle_path: PathBuf,
    pub subtitle_count: usize,
    pub utterance_count: usize,
}

/// The uploaded object, deleted on release. A guard dropped without being
/// released means a leaked object and is reported.
struct StagedObject<'a, S: ObjectStore> {
    store: &'a S,
    object: RemoteObject,
    released: bool,
}

impl<'a, S: ObjectStore> StagedObject<'a, S> {
    fn new(store: &'a S, object: RemoteObject) -> Self {
        Self {
            store,
            object,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        match self.store.delete(&self.object).await {
            Ok(()) => log::info!("removed {}", self.object.uri()),
            Err(e) => log::warn!("could not remove {}: {}", self.object.uri(), e),
        }
    }
}

impl<S: ObjectStore> Drop for StagedObject<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("{} was left in the bucket", self.object.uri());
        }
    }
}

pub fn remote_object_name(prefix: &str, file_name: &str) -> String {
    format!("{}-{}{}", prefix, uuid::Uuid::new_v4(), extension_of(file_name))
}

pub struct Pipeline<'a, S: ObjectStore, R: SpeechRecognizer> {
    store: &'a S,
    recognizer: &'a R,
    config: &'a AppConfig,
}

impl<'a, S: ObjectStore, R: SpeechRecognizer> Pipeline<'a, S, R> {
    pub fn new(store: &'a S, recognizer: &'a R, config: &'a AppConfig) -> Self {
        Self {
            store,
            recognizer,
            config,
        }
    }

    /// Upload, recognize, save, then always try to remove the upload.
    ///
    /// `on_stage` sees every state the run enters, ending with either
    /// `CleanedUp` or `Failed`. Ctrl-C abandons the run but still removes
    /// the upload.
    pub async fn run(
        &self,
        job: &Job,
        on_stage: impl FnMut(Stage),
    ) -> Result<Artifacts, PipelineError> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(job, on_stage, ctrl_c).await
    }

    /// Like [`Pipeline::run`], stopping with `Interrupted` as soon as
    /// `interrupt` completes.
    pub async fn run_until(
        &self,
        job: &Job,
        mut on_stage: impl FnMut(Stage),
        interrupt: impl Future<Output = ()>,
    ) -> Result<Artifacts, PipelineError> {
        on_stage(Stage::Idle);

        let outcome = match self.prepare(job) {
            Ok((file_name, encoding)) => {
                let object = RemoteObject::new(
                    &self.config.bucket,
                    remote_object_name(&self.config.object_prefix, &file_name),
                );
                let staged = StagedObject::new(self.store, object);
                let outcome = tokio::select! {
                    outcome = self.process(job, &staged.object, encoding, &mut on_stage) => outcome,
                    () = interrupt => Err(PipelineError::Interrupted),
                };
                staged.release().await;
                outcome
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => on_stage(Stage::CleanedUp),
            Err(e) => {
                log::error!("run failed: {}", e);
                on_stage(Stage::Failed);
            }
        }
        outcome
    }

    fn prepare(&self, job: &Job) -> Result<(String, AudioEncoding), PipelineError> {
        if !job.input.is_file() {
            return Err(PipelineError::InputMissing(job.input.clone()));
        }
        let file_name = job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let encoding = resolve_encoding(&file_name)?;
        Ok((file_name, encoding))
    }

    async fn process(
        &self,
        job: &Job,
        object: &RemoteObject,
        encoding: AudioEncoding,
        on_stage: &mut impl FnMut(Stage),
    ) -> Result<Artifacts, PipelineError> {
        let uri = self.store.put(object, &job.input).await?;
        log::info!("uploaded {} to {}", job.input.display(), uri);
        on_stage(Stage::Uploaded);

        let options = RecognitionOptions {
            auto_punctuation: self.config.auto_punctuation,
            word_offsets: true,
        };
        log::info!(
            "recognizing {} as {} in {}",
            uri,
            encoding,
            job.language.as_str()
        );
        let recognition = self
            .recognizer
            .recognize(&uri, encoding, &job.language, options)
            .await?;
        on_stage(Stage::Recognized);

        let artifacts = save_artifacts(&job.outputs, &recognition)
            .map_err(|e| PipelineError::SaveFailed(format!("{:#}", e)))?;
        on_stage(Stage::Saved);

        Ok(artifacts)
    }
}

/// Writes the transcript, the SRT and optionally the raw recognition.
pub fn save_artifacts(outputs: &OutputPaths, recognition: &Recognition) -> anyhow::Result<Artifacts> {
    let blocks = build_subtitles(&recognition.words());

    output::save_transcript(&outputs.transcript, &recognition.transcript())?;
    output::save_srt(&outputs.subtitles, &blocks)?;
    if let Some(path) = &outputs.recognition {
        output::save_recognition_json(path, recognition)?;
    }

    Ok(Artifacts {
        transcript_path: outputs.transcript.clone(),
        subtitle_path: outputs.subtitles.clone(),
        subtitle_count: blocks.len(),
        utterance_count: recognition.utterances.len(),
    })
}
