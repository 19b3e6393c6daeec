/*!
 * Subtitle merge pipeline.
 *
 * This module combines an upper and a lower subtitle track per video and writes
 * the result, for a whole batch of videos at once:
 *
 * - `engine`: interval merge of two tracks
 * - `cache`: memoized merge results keyed by source identity
 * - `context`: cancellation flag and progress events shared with the foreground
 * - `model`: media files, subtitle sources and per-file run state
 * - `orchestrator`: the Prepare and Commit stages
 * - `sink`: sibling file output and container re-injection
 * - `summary`: success / warning / error report of a run
 */

pub mod cache;
pub mod context;
pub mod engine;
pub mod model;
pub mod orchestrator;
pub mod sink;
pub mod summary;

pub use cache::{MergeCache, MergedSubtitleInfo, SourceKey};
pub use context::{CancelFlag, MergeStage, ProgressEvent, RunContext};
pub use engine::{is_valid_color, merge, merge_with_style, MergeStyle};
pub use model::{
    FileId, FileMergeRecord, FileMergeStatus, LoadedSource, MediaFile, OutputTarget, SourceKind,
    StreamFailure, StreamFailureKind, SubtitleSource,
};
pub use orchestrator::{
    CommitOutcome, CommitResult, CommitStatus, FailureReason, MergeSettings, Orchestrator,
    OverwriteAgreement, PrepareOutcome,
};
pub use summary::{BatchSummary, MergeReport};
