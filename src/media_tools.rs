use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use crate::app_config::ToolsConfig;
use crate::errors::ToolError;
use crate::merging::context::CancelFlag;

// @module: Boundary to the external probing and muxing tools

/// Information about a subtitle stream inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Absolute stream index in the container (for `-map 0:N`)
    pub index: usize,
    /// Position among the subtitle streams only (for `:s:N` specifiers)
    pub subtitle_position: usize,
    /// The codec name of the stream
    pub codec_name: String,
    /// The language tag, if any
    pub language: Option<String>,
    /// The title tag, if any
    pub title: Option<String>,
    /// Default disposition flag
    pub is_default: bool,
}

impl StreamInfo {
    /// Whether the stream holds images rather than text
    pub fn is_bitmap(&self) -> bool {
        is_bitmap_codec(&self.codec_name)
    }
}

/// Metadata for a stream appended by [`MediaTools::inject`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectMetadata {
    /// Language tag, "und" when unknown
    pub language: String,
    /// Human readable stream title
    pub title: String,
    /// Whether the new stream becomes the default one
    pub make_default: bool,
    /// Subtitle positions of existing streams whose default flag must be cleared
    pub clear_default: Vec<usize>,
    /// Number of subtitle streams already in the container
    pub existing_subtitle_count: usize,
}

/// Request to produce a new container with one more subtitle stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectRequest {
    /// Original container
    pub source: PathBuf,
    /// Where the new container is written
    pub output: PathBuf,
    /// SRT text of the stream to append
    pub merged_text: String,
    pub metadata: InjectMetadata,
}

/// External media tooling consumed by the merge pipeline
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// List the subtitle streams of a container
    async fn probe(&self, file: &Path, cancel: &CancelFlag) -> Result<Vec<StreamInfo>, ToolError>;

    /// Extract one subtitle stream as SRT bytes
    async fn extract_text(&self, file: &Path, stream_index: usize, cancel: &CancelFlag) -> Result<Vec<u8>, ToolError>;

    /// Write `request.output` as a copy of the source with the merged stream appended
    async fn inject(&self, request: &InjectRequest, cancel: &CancelFlag) -> Result<(), ToolError>;
}

/// Check if a subtitle codec is bitmap-based (cannot be converted to text SRT)
pub fn is_bitmap_codec(codec_name: &str) -> bool {
    matches!(
        codec_name,
        "hdmv_pgs_subtitle" | "dvd_subtitle" | "dvb_subtitle" | "xsub"
    )
}

/// ffmpeg/ffprobe implementation of [`MediaTools`]
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
}

impl FfmpegTools {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Run a tool to completion, honouring the timeout and the cancel flag.
    /// The child is killed when the run is abandoned.
    async fn run_tool(&self, program: &str, args: Vec<OsString>, cancel: &CancelFlag) -> Result<Vec<u8>, ToolError> {
        let tool = tool_name(program);
        if cancel.is_canceled() {
            return Err(ToolError::Interrupted);
        }

        debug!("Running {} {:?}", tool, args);
        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::failed(&tool, format!("failed to start: {}", e)))?;

        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| ToolError::failed(&tool, format!("failed to run: {}", e)))?
            },
            _ = cancel.canceled() => {
                debug!("{} interrupted by cancellation", tool);
                return Err(ToolError::Interrupted);
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ToolError::failed(&tool, format!("timed out after {} seconds", self.timeout.as_secs())));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let filtered = filter_ffmpeg_stderr(&stderr);
            warn!("{} exited with {}: {}", tool, output.status, filtered);
            return Err(ToolError::failed(&tool, filtered));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe(&self, file: &Path, cancel: &CancelFlag) -> Result<Vec<StreamInfo>, ToolError> {
        if !file.exists() {
            return Err(ToolError::failed("ffprobe", format!("file not found: {}", file.display())));
        }

        let args: Vec<OsString> = vec![
            "-v".into(), "quiet".into(),
            "-print_format".into(), "json".into(),
            "-show_streams".into(),
            "-select_streams".into(), "s".into(),
            file.as_os_str().to_os_string(),
        ];
        let stdout = self.run_tool(&self.ffprobe_path, args, cancel).await?;
        parse_probe_output(&String::from_utf8_lossy(&stdout))
    }

    async fn extract_text(&self, file: &Path, stream_index: usize, cancel: &CancelFlag) -> Result<Vec<u8>, ToolError> {
        let args: Vec<OsString> = vec![
            "-nostdin".into(),
            "-v".into(), "error".into(),
            "-i".into(), file.as_os_str().to_os_string(),
            "-map".into(), format!("0:{}", stream_index).into(),
            "-c:s".into(), "srt".into(),
            "-f".into(), "srt".into(),
            "pipe:1".into(),
        ];
        self.run_tool(&self.ffmpeg_path, args, cancel).await
    }

    async fn inject(&self, request: &InjectRequest, cancel: &CancelFlag) -> Result<(), ToolError> {
        let work_dir = request.output.parent().unwrap_or(Path::new("."));
        let merged_file = tempfile::Builder::new()
            .prefix("dualsub-")
            .suffix(".srt")
            .tempfile_in(work_dir)
            .map_err(|e| ToolError::failed("ffmpeg", format!("failed to create temporary subtitle file: {}", e)))?;
        std::fs::write(merged_file.path(), request.merged_text.as_bytes())
            .map_err(|e| ToolError::failed("ffmpeg", format!("failed to write temporary subtitle file: {}", e)))?;

        let args = build_inject_args(request, merged_file.path());
        self.run_tool(&self.ffmpeg_path, args, cancel).await?;
        Ok(())
    }
}

/// Build the ffmpeg arguments that append the merged stream
pub fn build_inject_args(request: &InjectRequest, merged_file: &Path) -> Vec<OsString> {
    let metadata = &request.metadata;
    let new_position = metadata.existing_subtitle_count;

    let mut args: Vec<OsString> = vec![
        "-nostdin".into(),
        "-y".into(),
        "-v".into(), "error".into(),
        "-i".into(), request.source.as_os_str().to_os_string(),
        "-i".into(), merged_file.as_os_str().to_os_string(),
        "-map".into(), "0".into(),
        "-map".into(), "1:0".into(),
        "-c".into(), "copy".into(),
        format!("-c:s:{}", new_position).into(), subtitle_codec_for(&request.output).into(),
        "-max_interleave_delta".into(), "0".into(),
        format!("-metadata:s:s:{}", new_position).into(), format!("language={}", metadata.language).into(),
        format!("-metadata:s:s:{}", new_position).into(), format!("title={}", metadata.title).into(),
    ];

    for position in &metadata.clear_default {
        args.push(format!("-disposition:s:{}", position).into());
        args.push("0".into());
    }

    args.push(format!("-disposition:s:{}", new_position).into());
    args.push(if metadata.make_default { "default" } else { "0" }.into());
    args.push(request.output.as_os_str().to_os_string());
    args
}

/// Subtitle codec accepted by the output container
fn subtitle_codec_for(output: &Path) -> &'static str {
    let extension = output
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" | "m4v" | "mov" => "mov_text",
        _ => "srt",
    }
}

/// Parse `ffprobe -show_streams -print_format json` output
pub fn parse_probe_output(stdout: &str) -> Result<Vec<StreamInfo>, ToolError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let json: Value = serde_json::from_str(stdout)
        .map_err(|e| ToolError::failed("ffprobe", format!("unparseable output: {}", e)))?;

    let Some(streams) = json.get("streams").and_then(|s| s.as_array()) else {
        return Ok(Vec::new());
    };

    let mut tracks = Vec::with_capacity(streams.len());
    for (position, stream) in streams.iter().enumerate() {
        let index = stream
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ToolError::failed("ffprobe", "stream without index"))? as usize;

        let codec_name = stream
            .get("codec_name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        let tag = |name: &str| {
            stream
                .get("tags")
                .and_then(|t| t.get(name))
                .and_then(|l| l.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let is_default = stream
            .get("disposition")
            .and_then(|d| d.get("default"))
            .and_then(|v| v.as_u64())
            .is_some_and(|v| v == 1);

        tracks.push(StreamInfo {
            index,
            subtitle_position: position,
            codec_name: codec_name.to_string(),
            language: tag("language").filter(|l| l != "und"),
            title: tag("title"),
            is_default,
        });
    }

    Ok(tracks)
}

/// Filter ffmpeg stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, and stream metadata noise.
fn filter_ffmpeg_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Chapter",
        "Stream #",
        "Output #",
        "Stream mapping:",
        "Press [q]",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !noise_prefixes.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}

fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}
