/*!
 * Error types for the dualsub application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors raised while decoding or parsing subtitle text.
///
/// A subtitle file is rejected as a unit: there is no partial recovery, so one
/// of these errors always means the whole stream is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtitleError {
    /// The declared encoding label is not known
    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),

    /// The bytes are not valid in the declared encoding
    #[error("Subtitle text is not valid {encoding}")]
    Decoding {
        /// Name of the declared encoding
        encoding: String,
    },

    /// A block violates the SubRip grammar
    #[error("Invalid subtitle block {block_number}: {reason}")]
    InvalidBlock {
        /// 1-based position of the block in the file
        block_number: usize,
        /// What is wrong with the block
        reason: String,
        /// The offending block exactly as it appeared in the input
        raw: String,
    },
}

impl SubtitleError {
    /// Raw text of the block that failed to parse, if the error is attributable to one
    pub fn raw_block(&self) -> Option<&str> {
        match self {
            Self::InvalidBlock { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Errors returned by the external media tools (ffprobe/ffmpeg)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The tool was stopped because the run was canceled
    #[error("Media tool was interrupted")]
    Interrupted,

    /// The tool could not be started, crashed, timed out or produced unusable output
    #[error("{tool} failed: {message}")]
    Failed {
        /// Tool name, e.g. "ffmpeg"
        tool: String,
        /// Filtered diagnostic output
        message: String,
    },
}

impl ToolError {
    /// Create a general tool failure
    pub fn failed(tool: &str, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Whether the failure was caused by cancellation
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Errors while writing merged text to its destination
#[derive(Error, Debug)]
pub enum SinkError {
    /// Filesystem failure while writing or replacing a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The muxing tool failed or was interrupted
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Violations of the orchestrator's preconditions.
///
/// These are programming defects rather than user-facing conditions and stop the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A record refers to a file that is not part of the run
    #[error("File {0} is not part of this merge run")]
    UnknownFile(usize),

    /// A record reached the commit stage without merged text or output target
    #[error("File {0} was committed without being prepared")]
    NotPrepared(usize),

    /// A selection index does not point at an existing source
    #[error("File {0} has a selection that does not match any source")]
    MissingSelection(usize),
}
