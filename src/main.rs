mod cloud;
mod config;
mod encoding;
mod error;
mod input;
mod output;
mod pipeline;
mod subtitle;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Language;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::cloud::auth::{GcpSession, load_service_account};
use crate::cloud::speech::GoogleSpeech;
use crate::cloud::storage::GcsStore;
use crate::config::{AppConfig, Overrides};
use crate::error::PipelineError;
use crate::pipeline::{Job, OutputPaths, Pipeline, Stage};

#[derive(Parser)]
#[command(name = "cloudscribe")]
#[command(about = "Cloud speech-to-text transcription with SRT output", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload, recognize and save transcript and subtitles
    Run {
        /// Input audio file (default: first matching file in the working directory)
        input: Option<PathBuf>,

        /// Configuration file (default: ~/.cloudscribe/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Storage bucket to stage the audio in
        #[arg(short, long)]
        bucket: Option<String>,

        /// Service account key file
        #[arg(long)]
        credentials: Option<PathBuf>,

        /// Recognition language, e.g. vi-VN or en-US (prompted when absent)
        #[arg(short, long)]
        lang: Option<Language>,

        /// Maximum seconds to wait for recognition
        #[arg(long)]
        timeout: Option<u64>,

        /// Transcript output file
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Subtitle output file
        #[arg(long)]
        subtitles: Option<PathBuf>,

        /// Also keep the recognition result as JSON
        #[arg(long)]
        save_json: bool,
    },

    /// Rebuild transcript and subtitles from a saved recognition JSON
    Subtitles {
        /// Input file: MUST BE json saved by 'run --save-json'
        input: PathBuf,

        /// Configuration file (default: ~/.cloudscribe/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Transcript output file
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Subtitle output file
        #[arg(long)]
        subtitles: Option<PathBuf>,
    },
}

fn spinner() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{} min {} sec", secs / 60, secs % 60)
}

fn recognition_json_path(transcript: &Path) -> PathBuf {
    let stem = transcript
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recognized".to_string());
    transcript.with_file_name(format!("{}.recognition.json", stem))
}

async fn run_pipeline(
    config: AppConfig,
    input: Option<PathBuf>,
    save_json: bool,
) -> anyhow::Result<()> {
    // 1. Credentials, before anything touches the network
    let key_path = config.credentials_path(&config::program_dir()?);
    let key = load_service_account(&key_path)?;

    // 2. Input and language
    let work_dir = std::env::current_dir().context("Failed to read working directory")?;
    let input = match input {
        Some(path) if path.is_file() => path,
        Some(path) => return Err(PipelineError::InputMissing(path).into()),
        None => input::discover_input(&work_dir, &config.input_pattern)?,
    };
    println!("Processing audio file: {}", input.display());

    let language = match config.language.clone() {
        Some(lang) => lang,
        None => {
            let stdin = std::io::stdin();
            input::prompt_language(&mut stdin.lock(), &mut std::io::stdout())
                .context("Failed to read language choice")?
        }
    };

    let mut outputs = OutputPaths::in_dir(&work_dir, &config);
    if save_json {
        outputs.recognition = Some(recognition_json_path(&outputs.transcript));
    }
    let job = Job {
        input,
        language,
        outputs,
    };

    // 3. Remote collaborators
    let session = GcpSession::authenticate(&key)
        .await
        .context("Failed to authenticate with service account")?;
    let store = GcsStore::new(session.clone());
    let speech = GoogleSpeech::new(session, config.timeout(), config.poll_interval());

    // 4. Run
    let pb = spinner()?;
    pb.set_message("Uploading...");
    let result = Pipeline::new(&store, &speech, &config)
        .run(&job, |stage| match stage {
            Stage::Uploaded => pb.set_message(format!(
                "Recognizing ({}), waiting up to {}s...",
                job.language,
                config.timeout_secs
            )),
            Stage::Recognized => pb.set_message("Saving results..."),
            Stage::Saved => pb.set_message("Removing uploaded audio..."),
            Stage::Idle | Stage::CleanedUp | Stage::Failed => {}
        })
        .await;

    match &result {
        Ok(_) => pb.finish_with_message("Recognition complete"),
        Err(PipelineError::Interrupted) => pb.abandon_with_message("Interrupted"),
        Err(_) => pb.abandon_with_message("Recognition failed"),
    }
    let artifacts = result?;

    println!(
        "Saved transcript ({} utterances) to {:?}",
        artifacts.utterance_count, artifacts.transcript_path
    );
    println!(
        "Saved SRT ({} entries) to {:?}",
        artifacts.subtitle_count, artifacts.subtitle_path
    );
    if let Some(path) = &job.outputs.recognition {
        println!("Saved recognition to {:?}", path);
    }

    Ok(())
}

fn rebuild_subtitles(config: &AppConfig, input: &Path) -> anyhow::Result<()> {
    println!("Rebuilding from recognition: {:?}", input);

    let recognition = output::load_recognition_json(input)?;

    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let outputs = OutputPaths::in_dir(parent, config);
    let artifacts = pipeline::save_artifacts(&outputs, &recognition)?;

    println!(
        "Saved transcript ({} utterances) to {:?}",
        artifacts.utterance_count, artifacts.transcript_path
    );
    println!(
        "Saved SRT ({} entries) to {:?}",
        artifacts.subtitle_count, artifacts.subtitle_path
    );
    Ok(())
}

async fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            input,
            config,
            bucket,
            credentials,
            lang,
            timeout,
            transcript,
            subtitles,
            save_json,
        } => {
            let started = Instant::now();
            let app_config = config::load_app_config(config.as_deref())
                .context("Failed to load app config")?
                .apply(Overrides {
                    bucket,
                    credentials,
                    language: lang,
                    timeout_secs: timeout,
                    transcript_file: transcript,
                    subtitle_file: subtitles,
                });

            let result = run_pipeline(app_config, input, save_json).await;
            println!("Total processing time: {}", format_elapsed(started.elapsed()));
            result
        }
        Commands::Subtitles {
            input,
            config,
            transcript,
            subtitles,
        } => {
            let app_config = config::load_app_config(config.as_deref())
                .context("Failed to load app config")?
                .apply(Overrides {
                    transcript_file: transcript,
                    subtitle_file: subtitles,
                    ..Overrides::default()
                });
            rebuild_subtitles(&app_config, &input)
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<PipelineError>() {
        Some(e) if e.is_fatal_startup() => ExitCode::from(2),
        Some(PipelineError::Interrupted) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}
