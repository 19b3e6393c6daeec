/*!
 * Tests for error types and conversions
 */

use dualsub::errors::{SinkError, StateError, SubtitleError, ToolError};

#[test]
fn test_subtitleError_invalidBlock_shouldDisplayBlockNumber() {
    let error = SubtitleError::InvalidBlock {
        block_number: 3,
        reason: "invalid timing line".to_string(),
        raw: "3\nbroken".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("block 3"));
    assert!(display.contains("invalid timing line"));
    assert_eq!(error.raw_block(), Some("3\nbroken"));
}

#[test]
fn test_subtitleError_decoding_shouldHaveNoRawBlock() {
    let error = SubtitleError::Decoding {
        encoding: "UTF-8".to_string(),
    };
    assert!(error.to_string().contains("UTF-8"));
    assert_eq!(error.raw_block(), None);
}

#[test]
fn test_toolError_failed_shouldDisplayToolAndMessage() {
    let error = ToolError::failed("ffprobe", "moov atom not found");
    assert_eq!(error.to_string(), "ffprobe failed: moov atom not found");
    assert!(!error.is_interrupted());
    assert!(ToolError::Interrupted.is_interrupted());
}

#[test]
fn test_sinkError_fromToolError_shouldBeTransparent() {
    let error: SinkError = ToolError::failed("ffmpeg", "Conversion failed!").into();
    assert_eq!(error.to_string(), "ffmpeg failed: Conversion failed!");
}

#[test]
fn test_stateError_shouldNameFile() {
    assert!(StateError::NotPrepared(4).to_string().contains("File 4"));
    assert_eq!(
        StateError::MissingSelection(2).to_string(),
        "File 2 has a selection that does not match any source"
    );
}
