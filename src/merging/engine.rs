/*!
 * Interval merge of an upper and a lower subtitle track.
 *
 * Every start and end time of both tracks becomes a boundary. Each slice between
 * two consecutive boundaries receives the lines of all upper entries covering it
 * followed by the lines of all lower entries covering it, both in source order.
 * Slices nobody covers are dropped and contiguous slices with identical lines are
 * collapsed, which yields the fewest entries that describe the combined timeline.
 */

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::subtitle_processor::{SubtitleEntry, Subtitles, TimeCode};

/// Optional decoration of the upper lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MergeStyle {
    /// Font color wrapped around each upper line, e.g. "#ffff54"
    pub upper_color: Option<String>,
}

// @const: Hex (#rgb, #rrggbb) or named font color
static COLOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:#[0-9A-Fa-f]{3}|#[0-9A-Fa-f]{6}|[A-Za-z]+)$").unwrap()
});

/// Whether a font color can be embedded in a subtitle line
pub fn is_valid_color(color: &str) -> bool {
    COLOR_REGEX.is_match(color)
}

impl MergeStyle {
    fn decorate_upper(&self, line: &str) -> String {
        match &self.upper_color {
            Some(color) if is_valid_color(color) => {
                format!("<font color=\"{}\">{}</font>", color, line)
            }
            _ => line.to_string(),
        }
    }
}

/// Merge two tracks without styling
pub fn merge(upper: &Subtitles, lower: &Subtitles) -> Subtitles {
    merge_with_style(upper, lower, &MergeStyle::default())
}

/// Merge two tracks. Total for any pair of valid tracks; the result is sorted by start time.
pub fn merge_with_style(upper: &Subtitles, lower: &Subtitles, style: &MergeStyle) -> Subtitles {
    let mut boundaries: Vec<TimeCode> = upper
        .iter()
        .chain(lower.iter())
        .flat_map(|entry| [entry.start_time_ms, entry.end_time_ms])
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut upper_active = ActiveEntries::new(upper.entries());
    let mut lower_active = ActiveEntries::new(lower.entries());
    let mut merged: Vec<SubtitleEntry> = Vec::new();

    for window in boundaries.windows(2) {
        let (from, to) = (window[0], window[1]);
        upper_active.advance_to(from);
        lower_active.advance_to(from);

        if upper_active.is_empty() && lower_active.is_empty() {
            continue;
        }

        let mut lines = Vec::new();
        upper_active.collect_lines(&mut lines, |line| style.decorate_upper(line));
        lower_active.collect_lines(&mut lines, str::to_string);

        match merged.last_mut() {
            Some(last) if last.end_time_ms == from && last.lines == lines => last.end_time_ms = to,
            _ => merged.push(SubtitleEntry::new(from, to, lines)),
        }
    }

    Subtitles::from_valid_entries(merged)
}

/// Entries of one track that cover the current slice
struct ActiveEntries<'a> {
    entries: &'a [SubtitleEntry],
    /// Entry indices ordered by start time
    by_start: Vec<usize>,
    next: usize,
    /// Covering entries, ordered by their position in the source track
    active: BTreeSet<usize>,
}

impl<'a> ActiveEntries<'a> {
    fn new(entries: &'a [SubtitleEntry]) -> Self {
        let mut by_start: Vec<usize> = (0..entries.len()).collect();
        by_start.sort_by_key(|&i| entries[i].start_time_ms);
        Self {
            entries,
            by_start,
            next: 0,
            active: BTreeSet::new(),
        }
    }

    /// Make the set hold exactly the entries with `start <= time < end`.
    /// Times must be passed in ascending order.
    fn advance_to(&mut self, time: TimeCode) {
        while let Some(&index) = self.by_start.get(self.next) {
            if self.entries[index].start_time_ms > time {
                break;
            }
            self.active.insert(index);
            self.next += 1;
        }
        let entries = self.entries;
        self.active.retain(|&index| entries[index].end_time_ms > time);
    }

    fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn collect_lines(&self, out: &mut Vec<String>, decorate: impl Fn(&str) -> String) {
        for &index in &self.active {
            out.extend(self.entries[index].lines.iter().map(|line| decorate(line)));
        }
    }
}
