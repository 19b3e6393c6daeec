use std::borrow::Cow;
use std::fmt;
use std::fmt::Write as _;
use regex::Regex;
use once_cell::sync::Lazy;
use encoding_rs::Encoding;
use log::debug;
use crate::errors::SubtitleError;

// @module: Subtitle model and strict SubRip codec

/// Milliseconds from the start of the track
pub type TimeCode = u64;

// @const: SRT timing line, hours may have any number of digits
static TIMING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2}),(\d{3}) --> (\d+):(\d{2}):(\d{2}),(\d{3})$").unwrap()
});

// @const: Single SRT timestamp
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2}),(\d{3})$").unwrap()
});

// @const: Inline styling markers (html-like tags and {\...} override blocks)
static STYLE_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?\s*(?:i|b|u|s|font)(?:\s[^>]*)?>|\{\\[^}]*\}").unwrap()
});

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Start time in ms
    pub start_time_ms: TimeCode,

    // @field: End time in ms
    pub end_time_ms: TimeCode,

    // @field: Text lines, top to bottom
    pub lines: Vec<String>,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry without validation - used by tests and the merge engine
    pub fn new(start_time_ms: TimeCode, end_time_ms: TimeCode, lines: Vec<String>) -> Self {
        SubtitleEntry {
            start_time_ms,
            end_time_ms,
            lines,
        }
    }

    /// Creates an entry from newline-separated text
    pub fn from_text(start_time_ms: TimeCode, end_time_ms: TimeCode, text: &str) -> Self {
        Self::new(start_time_ms, end_time_ms, text.lines().map(String::from).collect())
    }

    // @validates: Time range, non-blank lines without line breaks
    // @returns: Reason the entry is invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.end_time_ms <= self.start_time_ms {
            return Err(format!(
                "end time {} is not after start time {}",
                Self::format_timestamp(self.end_time_ms),
                Self::format_timestamp(self.start_time_ms)
            ));
        }
        if self.lines.is_empty() {
            return Err("subtitle text is empty".to_string());
        }
        if self.lines.iter().any(|line| line.trim().is_empty()) {
            return Err("subtitle text contains a blank line".to_string());
        }
        if self.lines.iter().any(|line| line.contains(['\n', '\r'])) {
            return Err("subtitle line contains a line break".to_string());
        }
        Ok(())
    }

    /// Lines joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Parse a strict SRT timestamp (H:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<TimeCode, String> {
        let caps = TIMESTAMP_REGEX
            .captures(timestamp)
            .ok_or_else(|| format!("invalid timestamp: {}", timestamp))?;
        timecode_from_captures(&caps, 1)
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: TimeCode) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        write!(f, "{}", self.text())
    }
}

/// An immutable subtitle track.
///
/// Entries keep the order they were produced in. They may overlap and need not be
/// sorted; only the merge engine imposes chronological order. Display indices are
/// not stored and are regenerated on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtitles {
    entries: Vec<SubtitleEntry>,
}

impl Subtitles {
    /// Build a track from entries, rejecting any entry that breaks the entry invariants
    pub fn new(entries: Vec<SubtitleEntry>) -> Result<Self, SubtitleError> {
        for (i, entry) in entries.iter().enumerate() {
            entry.validate().map_err(|reason| SubtitleError::InvalidBlock {
                block_number: i + 1,
                reason,
                raw: entry.to_string(),
            })?;
        }
        Ok(Self { entries })
    }

    /// Build a track from entries the caller already guarantees to be valid
    pub(crate) fn from_valid_entries(entries: Vec<SubtitleEntry>) -> Self {
        debug_assert!(entries.iter().all(|e| e.validate().is_ok()));
        Self { entries }
    }

    /// Empty track
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SubtitleEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubtitleEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the track in characters when serialized with styling preserved
    pub fn char_count(&self) -> usize {
        self.to_srt_string(false).chars().count()
    }

    /// Decode raw bytes with the declared encoding and parse them as SRT
    pub fn parse_srt_bytes(bytes: &[u8], encoding_label: &str) -> Result<Self, SubtitleError> {
        let text = decode_text(bytes, encoding_label)?;
        Self::parse_srt_string(&text)
    }

    /// Parse SRT text.
    ///
    /// Blocks are separated by one or more blank lines. Any malformed block rejects
    /// the whole input. Input without blocks yields an empty track.
    pub fn parse_srt_string(content: &str) -> Result<Self, SubtitleError> {
        let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);

        let mut entries = Vec::new();
        let mut block: Vec<&str> = Vec::new();
        let mut block_number = 0;

        for line in content.lines() {
            if line.trim().is_empty() {
                if !block.is_empty() {
                    block_number += 1;
                    entries.push(parse_block(&block, block_number)?);
                    block.clear();
                }
                continue;
            }
            block.push(line);
        }

        if !block.is_empty() {
            block_number += 1;
            entries.push(parse_block(&block, block_number)?);
        }

        debug!("Parsed {} subtitle entries", entries.len());
        Ok(Self { entries })
    }

    /// Serialize to SRT text, renumbering entries from 1.
    ///
    /// With `plain_text` all styling markers are removed; lines left blank are dropped
    /// and entries left without lines are skipped, so the output always parses back.
    pub fn to_srt_string(&self, plain_text: bool) -> String {
        let mut output = String::new();
        let mut index = 0;

        for entry in &self.entries {
            let lines: Vec<Cow<'_, str>> = if plain_text {
                entry
                    .lines
                    .iter()
                    .map(|line| strip_styling(line))
                    .filter(|line| !line.trim().is_empty())
                    .collect()
            } else {
                entry.lines.iter().map(|line| Cow::Borrowed(line.as_str())).collect()
            };

            if lines.is_empty() {
                debug!(
                    "Skipping entry at {} with no visible text",
                    entry.format_start_time()
                );
                continue;
            }

            index += 1;
            // Writing into a String cannot fail
            let _ = writeln!(output, "{}", index);
            let _ = writeln!(output, "{} --> {}", entry.format_start_time(), entry.format_end_time());
            for line in &lines {
                let _ = writeln!(output, "{}", line);
            }
            output.push('\n');
        }

        output
    }
}

impl<'a> IntoIterator for &'a Subtitles {
    type Item = &'a SubtitleEntry;
    type IntoIter = std::slice::Iter<'a, SubtitleEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Remove inline styling markers from a line
pub fn strip_styling(line: &str) -> Cow<'_, str> {
    STYLE_MARKER_REGEX.replace_all(line, "")
}

/// Decode bytes strictly with the given encoding label.
///
/// A BOM of the declared encoding is skipped. Malformed sequences are an error,
/// never replaced.
pub fn decode_text(bytes: &[u8], encoding_label: &str) -> Result<String, SubtitleError> {
    let encoding = Encoding::for_label(encoding_label.trim().as_bytes())
        .ok_or_else(|| SubtitleError::UnknownEncoding(encoding_label.to_string()))?;

    let bytes = match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_length)) if bom_encoding == encoding => &bytes[bom_length..],
        _ => bytes,
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| SubtitleError::Decoding {
            encoding: encoding.name().to_string(),
        })
}

/// Parse one non-empty block of lines
fn parse_block(lines: &[&str], block_number: usize) -> Result<SubtitleEntry, SubtitleError> {
    let invalid = |reason: String| SubtitleError::InvalidBlock {
        block_number,
        reason,
        raw: lines.join("\n"),
    };

    let index_line = lines[0].trim();
    if !index_line.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("expected a numeric index, found '{}'", index_line)));
    }

    let timing_line = lines
        .get(1)
        .ok_or_else(|| invalid("missing timing line".to_string()))?;
    let (start_time_ms, end_time_ms) = parse_timing_line(timing_line.trim_end()).map_err(invalid)?;

    if start_time_ms >= end_time_ms {
        return Err(invalid(format!(
            "start time {} is not before end time {}",
            SubtitleEntry::format_timestamp(start_time_ms),
            SubtitleEntry::format_timestamp(end_time_ms)
        )));
    }

    let text_lines: Vec<String> = lines[2..].iter().map(|line| line.to_string()).collect();
    if text_lines.is_empty() {
        return Err(invalid("subtitle text is empty".to_string()));
    }

    Ok(SubtitleEntry::new(start_time_ms, end_time_ms, text_lines))
}

/// Parse `H:MM:SS,mmm --> H:MM:SS,mmm`
fn parse_timing_line(line: &str) -> Result<(TimeCode, TimeCode), String> {
    let caps = TIMING_REGEX
        .captures(line)
        .ok_or_else(|| format!("malformed timing line '{}'", line))?;

    let start = timecode_from_captures(&caps, 1)?;
    let end = timecode_from_captures(&caps, 5)?;
    Ok((start, end))
}

/// Convert four consecutive capture groups (h, m, s, ms) to milliseconds
fn timecode_from_captures(caps: &regex::Captures, start_idx: usize) -> Result<TimeCode, String> {
    let group = |offset: usize| -> Result<u64, String> {
        let value = caps.get(start_idx + offset).map_or("", |m| m.as_str());
        value
            .parse::<u64>()
            .map_err(|_| format!("time component '{}' is out of range", value))
    };

    let hours = group(0)?;
    let minutes = group(1)?;
    let seconds = group(2)?;
    let millis = group(3)?;

    if minutes >= 60 || seconds >= 60 {
        return Err(format!(
            "invalid time {}:{:02}:{:02},{:03}",
            hours, minutes, seconds, millis
        ));
    }

    hours
        .checked_mul(3_600_000)
        .and_then(|h| h.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
        .ok_or_else(|| format!("hour value {} is out of range", hours))
}
