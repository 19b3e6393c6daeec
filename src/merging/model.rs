/*!
 * Data model of a merge run.
 *
 * `MediaFile` is the foreground's view of one video and its subtitle sources.
 * The worker only ever sees a snapshot of it; everything the worker learns
 * (loaded texts, refreshed stream lists) comes back as plain values that the
 * foreground applies to its own copy.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::media_tools::StreamInfo;
use crate::merging::cache::SourceKey;
use crate::subtitle_processor::Subtitles;

/// Index of a file in the list handed to the orchestrator
pub type FileId = usize;

/// Encoding of text produced by the extraction tool
pub const EXTRACTED_ENCODING: &str = "utf-8";

/// Where a subtitle source lives
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A stream inside the video container
    Embedded(StreamInfo),
    /// A standalone subtitle file supplied next to the video
    External { path: PathBuf },
}

/// One selectable subtitle source of a media file
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSource {
    pub kind: SourceKind,
    pub language: Option<String>,
    pub title: Option<String>,
    /// Declared text encoding
    pub encoding: String,
    /// Parsed text, `None` until loaded
    pub subtitles: Option<Arc<Subtitles>>,
}

impl SubtitleSource {
    /// Source backed by an embedded stream
    pub fn embedded(stream: StreamInfo) -> Self {
        Self {
            language: stream.language.clone(),
            title: stream.title.clone(),
            kind: SourceKind::Embedded(stream),
            encoding: EXTRACTED_ENCODING.to_string(),
            subtitles: None,
        }
    }

    /// Source backed by a subtitle file
    pub fn external(path: impl Into<PathBuf>, language: Option<String>, encoding: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::External { path: path.into() },
            language,
            title: None,
            encoding: encoding.into(),
            subtitles: None,
        }
    }

    /// Stable id of the source within its media file
    pub fn source_id(&self, media_path: &Path) -> String {
        match &self.kind {
            SourceKind::Embedded(stream) => format!("{}#{}", media_path.display(), stream.index),
            SourceKind::External { path } => path.display().to_string(),
        }
    }

    /// Short identifier used in file names and stream titles
    pub fn identifier(&self) -> String {
        match (&self.kind, &self.language) {
            (SourceKind::External { .. }, _) => "external".to_string(),
            (SourceKind::Embedded(_), Some(language)) => language.to_lowercase(),
            (SourceKind::Embedded(_), None) => "unknown".to_string(),
        }
    }

    /// Memoization key of the source as currently declared
    pub fn cache_key(&self, media_path: &Path) -> SourceKey {
        SourceKey::new(self.source_id(media_path), self.encoding.clone())
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, SourceKind::Embedded(_))
    }

    /// Bitmap streams can never be merged
    pub fn is_bitmap(&self) -> bool {
        match &self.kind {
            SourceKind::Embedded(stream) => stream.is_bitmap(),
            SourceKind::External { .. } => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.subtitles.is_some()
    }
}

/// A video file with its subtitle sources and the user's choice of upper and lower source
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub id: FileId,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Embedded streams first, in container order, then external files
    pub sources: Vec<SubtitleSource>,
    /// Index into `sources`
    pub upper: Option<usize>,
    /// Index into `sources`
    pub lower: Option<usize>,
}

impl MediaFile {
    pub fn new(id: FileId, path: impl Into<PathBuf>, size_bytes: u64, sources: Vec<SubtitleSource>) -> Self {
        Self {
            id,
            path: path.into(),
            size_bytes,
            sources,
            upper: None,
            lower: None,
        }
    }

    /// Both selections, when the user made them
    pub fn selection(&self) -> Option<(usize, usize)> {
        Some((self.upper?, self.lower?))
    }

    /// Embedded streams in container order
    pub fn embedded_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.sources.iter().filter_map(|source| match &source.kind {
            SourceKind::Embedded(stream) => Some(stream),
            SourceKind::External { .. } => None,
        })
    }

    /// Store texts fetched by the worker
    pub fn apply_loaded(&mut self, loaded: &[LoadedSource]) {
        for item in loaded.iter().filter(|item| item.file_id == self.id) {
            if let Some(source) = self.sources.get_mut(item.source_index) {
                source.subtitles = Some(Arc::clone(&item.subtitles));
            }
        }
    }

    /// Rebuild the embedded sources from a fresh probe.
    ///
    /// Already loaded texts and the selections survive as long as their stream still exists.
    pub fn replace_streams(&mut self, streams: Vec<StreamInfo>) {
        let upper_id = self.upper.and_then(|i| self.sources.get(i)).map(|s| s.source_id(&self.path));
        let lower_id = self.lower.and_then(|i| self.sources.get(i)).map(|s| s.source_id(&self.path));

        let (old_embedded, external): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.sources).into_iter().partition(SubtitleSource::is_embedded);

        let mut sources: Vec<SubtitleSource> = streams
            .into_iter()
            .map(|stream| {
                let mut source = SubtitleSource::embedded(stream);
                source.subtitles = old_embedded
                    .iter()
                    .find(|old| old.kind == source.kind)
                    .and_then(|old| old.subtitles.clone());
                source
            })
            .collect();
        sources.extend(external);
        self.sources = sources;

        let position = |id: Option<String>| {
            id.and_then(|id| self.sources.iter().position(|s| s.source_id(&self.path) == id))
        };
        self.upper = position(upper_id);
        self.lower = position(lower_id);
    }
}

/// Text fetched for one source during Prepare
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    pub file_id: FileId,
    pub source_index: usize,
    pub subtitles: Arc<Subtitles>,
}

/// Why a single stream fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFailureKind {
    /// The extraction tool failed
    Tool,
    /// The subtitle file could not be read
    Io,
    /// The text did not parse
    Format,
}

/// Failure annotation of one source, kept for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub source_index: usize,
    pub kind: StreamFailureKind,
    pub message: String,
}

/// Prepare classification of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMergeStatus {
    FailedToLoadSubtitles,
    Duplicate,
    Ok,
}

/// Where the merged text of a file goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A `.srt` file next to the video
    Sibling(PathBuf),
    /// A new stream appended to the video itself
    Inject,
}

/// Working state of one file during a run
#[derive(Debug, Clone, PartialEq)]
pub struct FileMergeRecord {
    pub file_id: FileId,
    pub status: FileMergeStatus,
    pub failed_stream_count: usize,
    pub failures: Vec<StreamFailure>,
    /// Index of the upper source
    pub upper: usize,
    /// Index of the lower source
    pub lower: usize,
    /// Serialized merge, set for `Ok` and `Duplicate`
    pub merged_text: Option<String>,
    /// Set for `Ok` only
    pub output_target: Option<OutputTarget>,
}

impl FileMergeRecord {
    pub fn new(file_id: FileId, upper: usize, lower: usize) -> Self {
        Self {
            file_id,
            status: FileMergeStatus::Ok,
            failed_stream_count: 0,
            failures: Vec::new(),
            upper,
            lower,
            merged_text: None,
            output_target: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FileMergeStatus::Ok
    }
}
