use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::Language;
use crate::encoding::resolve_encoding;
use crate::error::PipelineError;

/// First file in `dir` (lexical order) whose name contains `pattern` and
/// whose extension is a supported audio encoding.
pub fn discover_input(dir: &Path, pattern: &str) -> Result<PathBuf, PipelineError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            name.contains(pattern) && resolve_encoding(&name).is_ok()
        })
        .collect();

    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::InputMissing(dir.join(format!("*{}*", pattern))))
}

/// Asks for one of the prompt languages. Empty input or EOF picks the first.
pub fn prompt_language<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<Language> {
    let choices = Language::PROMPT_CHOICES;
    loop {
        writeln!(writer, "Select recognition language:")?;
        for (i, lang) in choices.iter().enumerate() {
            writeln!(writer, "  {}) {} ({})", i + 1, lang.display_name(), lang)?;
        }
        write!(writer, "Choice [1]: ")?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(choices[0].clone());
        }

        let answer = line.trim();
        if answer.is_empty() {
            return Ok(choices[0].clone());
        }
        match answer.parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => return Ok(choices[n - 1].clone()),
            _ => writeln!(writer, "Please enter a number between 1 and {}.", choices.len())?,
        }
    }
}
