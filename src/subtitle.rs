use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One recognized word with its offsets from the start of the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub text: String,
    #[serde(with = "seconds")]
    pub start: Duration,
    #[serde(with = "seconds")]
    pub end: Duration,
}

impl WordTiming {
    pub fn new(text: impl Into<String>, start: Duration, end: Duration) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// Offsets are stored as JSON numbers of seconds.
mod seconds {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let decimal = format!("{}.{:09}", value.as_secs(), value.subsec_nanos());
        let secs: f64 = decimal
            .parse()
            .map_err(<S::Error as serde::ser::Error>::custom)?;
        serializer.serialize_f64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        super::parse_seconds(&secs.to_string())
            .ok_or_else(|| D::Error::custom(format!("invalid offset {}", secs)))
    }
}

/// Parses a non-negative decimal count of seconds such as `"1.200"` without
/// going through binary floating point. Digits past nanoseconds are dropped.
pub fn parse_seconds(value: &str) -> Option<Duration> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
        return None;
    }

    let secs = if whole.is_empty() { 0 } else { whole.parse::<u64>().ok()? };
    let nanos = format!("{:0<9}", &frac[..frac.len().min(9)])
        .parse::<u32>()
        .ok()?;
    Some(Duration::new(secs, nanos))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleBlock {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl fmt::Display for SubtitleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(
            f,
            "{} --> {}",
            format_timecode(self.start),
            format_timecode(self.end)
        )?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Formats an offset as `HH:MM:SS,mmm`. Milliseconds are truncated, never
/// rounded, and hours are not wrapped at 24.
pub fn format_timecode(offset: Duration) -> String {
    let whole = offset.as_secs();
    let millis = offset.subsec_millis();

    let mins = whole / 60;
    let secs = whole % 60;
    let hours = mins / 60;
    let mins = mins % 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}

/// Formats seconds as `HH:MM:SS,mmm`, like [`format_timecode`].
///
/// The value is read as its shortest decimal form (`1.2`, not
/// `1.19999..`) so truncation sees the number that was written. Negative
/// or NaN input is treated as zero.
pub fn to_subtitle_time(seconds: f64) -> String {
    let offset = if seconds.is_nan() || seconds <= 0.0 {
        Duration::ZERO
    } else {
        parse_seconds(&seconds.to_string()).unwrap_or(Duration::MAX)
    };
    format_timecode(offset)
}

/// One single-word block per input word, numbered from 1 in input order.
pub fn build_subtitles(words: &[WordTiming]) -> Vec<SubtitleBlock> {
    words
        .iter()
        .enumerate()
        .map(|(i, word)| SubtitleBlock {
            index: i + 1,
            start: word.start,
            end: word.end,
            text: word.text.clone(),
        })
        .collect()
}

/// Serializes blocks into an SRT document.
pub fn render_srt(blocks: &[SubtitleBlock]) -> String {
    blocks.iter().map(|b| b.to_string()).collect()
}
