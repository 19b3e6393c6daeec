/*!
 * # dualsub - dual-language subtitle merging
 *
 * A Rust library that merges two time-coded subtitle tracks (an "upper" and a
 * "lower" language) into one track and writes it next to the video or back into
 * the video container.
 *
 * ## Features
 *
 * - Strict SubRip parsing with per-block error reporting and declared encodings
 * - Interval merge of two independently timed tracks
 * - Batch processing in two stages (prepare, commit) with cooperative cancellation
 * - Duplicate detection against streams already in the container
 * - Overwrite and free-space checks before anything is written
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_processor`: Subtitle model and SubRip codec
 * - `merging`: The merge pipeline:
 *   - `merging::engine`: Interval merge of two tracks
 *   - `merging::orchestrator`: Prepare and Commit stages over a batch
 *   - `merging::sink`: Sibling file output and container re-injection
 *   - `merging::summary`: Human-readable run report
 * - `media_tools`: ffprobe/ffmpeg boundary
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod file_utils;
pub mod subtitle_processor;
pub mod merging;
pub mod media_tools;
pub mod app_controller;
pub mod language_utils;
pub mod errors;

// Re-export main types for easier usage
pub use app_config::Config;
pub use subtitle_processor::{SubtitleEntry, Subtitles};
pub use merging::{merge, Orchestrator};
pub use language_utils::{language_codes_match, normalize_to_part2t, get_language_name};
pub use errors::{SinkError, StateError, SubtitleError, ToolError};
