/*!
 * Output sink for merged subtitles.
 *
 * Merged text either lands in a sibling `.srt` file or is appended to the video
 * container as a new stream. In both cases the user's file is replaced only after
 * the new content is complete, so an interrupted write never leaves a truncated file.
 */

use std::path::Path;
use log::{debug, warn};

use crate::errors::SinkError;
use crate::file_utils::FileManager;
use crate::media_tools::{InjectMetadata, InjectRequest, MediaTools, StreamInfo};
use crate::merging::context::CancelFlag;
use crate::merging::model::{MediaFile, SubtitleSource};

/// Language tag used when the merged stream has no language
pub const UNDEFINED_LANGUAGE: &str = "und";

/// Write merged text next to the video, replacing an existing file atomically
pub fn write_sibling(target: &Path, merged_text: &str) -> Result<(), SinkError> {
    debug!("Writing merged subtitles to {:?}", target);
    FileManager::write_atomically(target, merged_text.as_bytes())?;
    Ok(())
}

/// Metadata of the stream appended to `file`
pub fn inject_metadata(
    file: &MediaFile,
    upper: &SubtitleSource,
    lower: &SubtitleSource,
    make_default: bool,
) -> InjectMetadata {
    let existing: Vec<&StreamInfo> = file.embedded_streams().collect();

    let clear_default = if make_default {
        existing
            .iter()
            .filter(|stream| stream.is_default)
            .map(|stream| stream.subtitle_position)
            .collect()
    } else {
        Vec::new()
    };

    InjectMetadata {
        language: upper
            .language
            .clone()
            .unwrap_or_else(|| UNDEFINED_LANGUAGE.to_string()),
        title: format!("merged-{}-{}", upper.identifier(), lower.identifier()),
        make_default,
        clear_default,
        existing_subtitle_count: existing.len(),
    }
}

/// Result of a successful injection
#[derive(Debug, Clone, PartialEq)]
pub struct InjectOutcome {
    /// Stream list of the replaced file, `None` when the re-probe failed
    pub refreshed_streams: Option<Vec<StreamInfo>>,
}

/// Append the merged stream to the video and swap the result in for the original.
///
/// The new container is built in `temp_dir`, given the original's permissions and
/// then moved over the original. A failing re-probe afterwards does not undo the
/// merge; it only leaves the caller with a possibly stale stream list.
pub async fn inject_into_video(
    tools: &dyn MediaTools,
    file: &MediaFile,
    merged_text: &str,
    metadata: InjectMetadata,
    temp_dir: &Path,
    cancel: &CancelFlag,
) -> Result<InjectOutcome, SinkError> {
    let temp_path = temp_container_path(temp_dir, &file.path)?;

    let request = InjectRequest {
        source: file.path.clone(),
        output: temp_path.to_path_buf(),
        merged_text: merged_text.to_string(),
        metadata,
    };

    debug!("Injecting merged stream into {:?} via {:?}", file.path, request.output);
    tools.inject(&request, cancel).await?;

    FileManager::copy_permissions(&file.path, &temp_path)?;
    FileManager::replace_file(&temp_path, &file.path)?;
    // The temp file has been moved; nothing left to clean up
    let _ = temp_path.keep();

    let refreshed_streams = match tools.probe(&file.path, cancel).await {
        Ok(streams) => Some(streams),
        Err(e) => {
            warn!("Merged into {:?} but failed to refresh its stream list: {}", file.path, e);
            None
        }
    };

    Ok(InjectOutcome { refreshed_streams })
}

/// Reserve a temp path with the original's extension so the muxer picks the same container
fn temp_container_path(temp_dir: &Path, original: &Path) -> std::io::Result<tempfile::TempPath> {
    let suffix = original
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix("dualsub-")
        .suffix(&suffix)
        .tempfile_in(temp_dir)?;
    Ok(temp.into_temp_path())
}
