/*!
 * Scripted media tools for testing
 *
 * This module provides a `MediaTools` implementation that answers probe and
 * extract calls from predetermined data and simulates injection by writing a
 * small file, so no ffmpeg binary is needed in tests.
 */

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dualsub::errors::ToolError;
use dualsub::media_tools::{InjectRequest, MediaTools, StreamInfo};
use dualsub::merging::CancelFlag;

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Probe(PathBuf),
    Extract(PathBuf, usize),
    Inject(PathBuf),
}

/// Mock implementation of the ffmpeg/ffprobe backend
#[derive(Debug, Default)]
pub struct ScriptedTools {
    streams: Mutex<HashMap<PathBuf, Vec<StreamInfo>>>,
    texts: Mutex<HashMap<(PathBuf, usize), Result<Vec<u8>, ToolError>>>,
    /// Extracting from these files raises the cancel flag and reports an interruption
    interrupt_on: Mutex<HashSet<PathBuf>>,
    fail_inject: Mutex<bool>,
    /// Injecting raises the cancel flag, as a Ctrl-C during a long remux would
    cancel_on_inject: Mutex<bool>,
    fail_probe_after_inject: Mutex<bool>,
    injected: Mutex<HashSet<PathBuf>>,
    calls: Mutex<Vec<ToolCall>>,
    last_inject: Mutex<Option<InjectRequest>>,
}

impl ScriptedTools {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams reported by `probe` for a file
    pub fn with_streams(self, file: &Path, streams: Vec<StreamInfo>) -> Self {
        self.streams.lock().unwrap().insert(file.to_path_buf(), streams);
        self
    }

    /// Text returned when extracting a stream
    pub fn with_text(self, file: &Path, stream_index: usize, text: &str) -> Self {
        self.texts
            .lock()
            .unwrap()
            .insert((file.to_path_buf(), stream_index), Ok(text.as_bytes().to_vec()));
        self
    }

    /// Make extracting a stream fail
    pub fn with_extract_error(self, file: &Path, stream_index: usize) -> Self {
        self.texts.lock().unwrap().insert(
            (file.to_path_buf(), stream_index),
            Err(ToolError::failed("ffmpeg", "Invalid data found when processing input")),
        );
        self
    }

    /// Cancel the run as soon as anything is extracted from `file`
    pub fn interrupt_on(self, file: &Path) -> Self {
        self.interrupt_on.lock().unwrap().insert(file.to_path_buf());
        self
    }

    /// Make every injection fail
    pub fn failing_inject(self) -> Self {
        *self.fail_inject.lock().unwrap() = true;
        self
    }

    /// Raise the cancel flag whenever an injection runs; the injection itself completes
    pub fn canceling_on_inject(self) -> Self {
        *self.cancel_on_inject.lock().unwrap() = true;
        self
    }

    /// Make probing fail for files that were injected into
    pub fn failing_probe_after_inject(self) -> Self {
        *self.fail_probe_after_inject.lock().unwrap() = true;
        self
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of extract calls made so far
    pub fn extract_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ToolCall::Extract(..)))
            .count()
    }

    /// The last injection request
    pub fn last_inject(&self) -> Option<InjectRequest> {
        self.last_inject.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTools for ScriptedTools {
    async fn probe(&self, file: &Path, _cancel: &CancelFlag) -> Result<Vec<StreamInfo>, ToolError> {
        self.calls.lock().unwrap().push(ToolCall::Probe(file.to_path_buf()));

        if *self.fail_probe_after_inject.lock().unwrap() && self.injected.lock().unwrap().contains(file) {
            return Err(ToolError::failed("ffprobe", "moov atom not found"));
        }

        Ok(self.streams.lock().unwrap().get(file).cloned().unwrap_or_default())
    }

    async fn extract_text(&self, file: &Path, stream_index: usize, cancel: &CancelFlag) -> Result<Vec<u8>, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push(ToolCall::Extract(file.to_path_buf(), stream_index));

        if self.interrupt_on.lock().unwrap().contains(file) {
            cancel.cancel();
            return Err(ToolError::Interrupted);
        }

        self.texts
            .lock()
            .unwrap()
            .get(&(file.to_path_buf(), stream_index))
            .cloned()
            .unwrap_or_else(|| Err(ToolError::failed("ffmpeg", "Stream not found")))
    }

    async fn inject(&self, request: &InjectRequest, cancel: &CancelFlag) -> Result<(), ToolError> {
        self.calls.lock().unwrap().push(ToolCall::Inject(request.source.clone()));
        *self.last_inject.lock().unwrap() = Some(request.clone());

        if *self.cancel_on_inject.lock().unwrap() {
            cancel.cancel();
        }

        if *self.fail_inject.lock().unwrap() {
            return Err(ToolError::failed("ffmpeg", "Conversion failed!"));
        }

        std::fs::write(&request.output, format!("container with {}", request.metadata.title))
            .map_err(|e| ToolError::failed("ffmpeg", e.to_string()))?;

        // The new stream shows up on the next probe
        let mut streams = self.streams.lock().unwrap();
        let list = streams.entry(request.source.clone()).or_default();
        let index = list.iter().map(|s| s.index + 1).max().unwrap_or(0);
        list.push(StreamInfo {
            index,
            subtitle_position: request.metadata.existing_subtitle_count,
            codec_name: "subrip".to_string(),
            language: Some(request.metadata.language.clone()),
            title: Some(request.metadata.title.clone()),
            is_default: request.metadata.make_default,
        });
        self.injected.lock().unwrap().insert(request.source.clone());
        self.texts
            .lock()
            .unwrap()
            .insert((request.source.clone(), index), Ok(request.merged_text.as_bytes().to_vec()));

        Ok(())
    }
}

/// Free space mock with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct FixedFreeSpace {
    pub available: u64,
    pub writable: bool,
}

impl FixedFreeSpace {
    pub fn plenty() -> Self {
        Self {
            available: u64::MAX,
            writable: true,
        }
    }
}

impl dualsub::file_utils::FreeSpace for FixedFreeSpace {
    fn available_bytes(&self, _dir: &Path) -> std::io::Result<u64> {
        Ok(self.available)
    }

    fn is_writable_dir(&self, _dir: &Path) -> bool {
        self.writable
    }
}
