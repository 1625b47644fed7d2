use crate::cloud::Recognition;
use crate::subtitle::SubtitleBlock;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn save_transcript(path: &Path, transcript: &str) -> Result<()> {
    std::fs::write(path, transcript)
        .with_context(|| format!("Failed to write transcript {:?}", path))
}

pub fn save_srt(path: &Path, blocks: &[SubtitleBlock]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create SRT {:?}", path))?;

    for block in blocks {
        write!(file, "{}", block)?;
    }

    Ok(())
}

pub fn save_recognition_json(path: &Path, recognition: &Recognition) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create recognition {:?}", path))?;
    serde_json::to_writer_pretty(file, recognition)
        .with_context(|| format!("Failed to write recognition {:?}", path))?;
    Ok(())
}

pub fn load_recognition_json(path: &Path) -> Result<Recognition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recognition {:?}", path))?;
    let recognition = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse recognition {:?}", path))?;
    Ok(recognition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Utterance;
    use crate::subtitle::{WordTiming, build_subtitles};
    use std::time::Duration;

    #[test]
    fn srt_file_has_four_lines_per_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let blocks = build_subtitles(&[
            WordTiming::new("hi", Duration::ZERO, Duration::from_millis(500)),
            WordTiming::new(
                "there",
                Duration::from_millis(500),
                Duration::from_millis(1200),
            ),
        ]);

        save_srt(&path, &blocks).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            [
                "1",
                "00:00:00,000 --> 00:00:00,500",
                "hi",
                "",
                "2",
                "00:00:00,500 --> 00:00:01,200",
                "there",
                "",
            ]
        );
    }

    #[test]
    fn transcript_is_written_as_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        save_transcript(&path, "Xin chào\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Xin chào\n");
    }

    #[test]
    fn recognition_json_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.recognition.json");
        let recognition = Recognition {
            utterances: vec![Utterance {
                text: "hi".into(),
                words: vec![WordTiming::new(
                    "hi",
                    Duration::ZERO,
                    Duration::from_millis(500),
                )],
            }],
        };

        save_recognition_json(&path, &recognition).unwrap();
        assert_eq!(load_recognition_json(&path).unwrap(), recognition);
    }

    #[test]
    fn unwritable_recognition_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("r.recognition.json");
        let err = save_recognition_json(&path, &Recognition::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("r.recognition.json"));
    }

    #[test]
    fn missing_recognition_json_reports_path() {
        let err = load_recognition_json(Path::new("/nonexistent/r.json")).unwrap_err();
        assert!(err.to_string().contains("r.json"));
    }
}
