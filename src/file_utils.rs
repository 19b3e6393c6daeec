use anyhow::{Result, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::language_utils;

// @module: File and directory utilities

// @const: Container extensions treated as videos
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v",
    "mpg", "mpeg", "ogv", "ts", "mts", "m2ts",
];

// @const: Loose SRT block signature for extension-less files
static SRT_SIGNATURE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+\s*\r?\n\d+:\d{2}:\d{2},\d{3} --> \d+:\d{2}:\d{2},\d{3}").unwrap()
});

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @generates: Sibling path of a merged subtitle
    // @params: video, upper and lower source identifiers
    pub fn sibling_output_path<P: AsRef<Path>>(video: P, upper_id: &str, lower_id: &str) -> PathBuf {
        let video = video.as_ref();
        let stem = video.file_stem().unwrap_or_default().to_string_lossy();
        let file_name = format!("{}.{}-{}.srt", stem, upper_id, lower_id);

        match video.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Write `content` to `target` through a temp file in the same directory.
    ///
    /// An existing target is replaced only after the whole content was written.
    pub fn write_atomically<P: AsRef<Path>>(target: P, content: &[u8]) -> io::Result<()> {
        let target = target.as_ref();
        let parent = parent_dir(target);

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(content)?;
        temp.as_file().sync_all()?;
        temp.persist(target).map_err(|e| e.error)?;
        Ok(())
    }

    /// Move `from` over `to`, copying when both sides are on different filesystems
    pub fn replace_file<P1: AsRef<Path>, P2: AsRef<Path>>(from: P1, to: P2) -> io::Result<()> {
        let from = from.as_ref();
        let to = to.as_ref();

        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                log::debug!("{:?} and {:?} are on different filesystems, copying", from, to);
                Self::copy_over(from, to)?;
                // The target is already replaced at this point
                discard_source(from);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Copy `from` over `to`, staging the copy next to the target so the final step is a rename
    fn copy_over(from: &Path, to: &Path) -> io::Result<()> {
        let mut staged = NamedTempFile::new_in(parent_dir(to))?;
        let mut source = fs::File::open(from)?;
        io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(to).map_err(|e| e.error)?;
        Ok(())
    }

    // @copies: Permission bits of one file onto another
    pub fn copy_permissions<P1: AsRef<Path>, P2: AsRef<Path>>(from: P1, to: P2) -> io::Result<()> {
        let permissions = fs::metadata(from)?.permissions();
        fs::set_permissions(to, permissions)
    }

    // @checks: A file can be created inside the directory
    pub fn is_writable_dir<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        Self::dir_exists(path) && tempfile::tempfile_in(path).is_ok()
    }

    /// Collect video files from files and directories, recursing into directories
    pub fn find_video_files<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for input in inputs {
            let input = input.as_ref();

            if Self::dir_exists(input) {
                for entry in WalkDir::new(input).follow_links(true).sort_by_file_name() {
                    let entry = entry.context("Failed to read directory entry")?;
                    let path = entry.path();
                    if path.is_file() && Self::detect_file_type(path)? == FileType::Video {
                        result.push(path.to_path_buf());
                    }
                }
            } else if Self::detect_file_type(input)? == FileType::Video {
                result.push(input.to_path_buf());
            } else {
                log::warn!("Skipping {:?}: not a video file", input);
            }
        }

        Ok(result)
    }

    /// Subtitle files next to a video, named `<stem>.srt` or `<stem>.<lang>.srt`.
    ///
    /// Returns each path with its language tag; names that look like earlier merge
    /// outputs (`<stem>.<a>-<b>.srt`) are skipped.
    pub fn find_sibling_subtitles<P: AsRef<Path>>(video: P) -> Result<Vec<(PathBuf, Option<String>)>> {
        let video = video.as_ref();
        let stem = video.file_stem().unwrap_or_default().to_string_lossy().to_string();
        let dir = parent_dir(video);

        let mut result = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if !path.is_file() || Self::detect_file_type(path)? != FileType::Subtitle {
                continue;
            }

            let name_stem = path.file_stem().unwrap_or_default().to_string_lossy().to_string();
            let language = if name_stem == stem {
                None
            } else if let Some(tag) = name_stem.strip_prefix(&format!("{}.", stem)) {
                if tag.contains('-') || tag.contains('.') {
                    continue;
                }
                language_utils::validate_language_code(tag).ok().map(|_| tag.to_lowercase())
            } else {
                continue;
            };

            result.push((path.to_path_buf(), language));
        }

        Ok(result)
    }

    /// Detect if a file is a subtitle file (SRT) or a video file
    pub fn detect_file_type<P: AsRef<Path>>(path: P) -> Result<FileType> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("File does not exist: {:?}", path));
        }

        if let Some(ext) = path.extension() {
            let ext_str = ext.to_string_lossy().to_lowercase();

            if ext_str == "srt" {
                return Ok(FileType::Subtitle);
            }

            if VIDEO_EXTENSIONS.contains(&ext_str.as_str()) {
                return Ok(FileType::Video);
            }

            return Ok(FileType::Unknown);
        }

        // Fall back to examining file contents
        if let Ok(content) = fs::read_to_string(path) {
            if SRT_SIGNATURE_REGEX.is_match(&content) {
                return Ok(FileType::Subtitle);
            }
        }

        Ok(FileType::Unknown)
    }
}

/// Remove the source of a cross-device move; failing here only leaves a stray copy behind
fn discard_source(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Replaced the target but failed to remove {:?}: {}", path, e);
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Enum representing different file types
#[derive(Debug, PartialEq, Eq)]
pub enum FileType {
    /// Subtitle file (SRT)
    Subtitle,
    /// Video container
    Video,
    /// Unknown file type
    Unknown,
}

/// Free space query for the temp directory used by injection
pub trait FreeSpace: Send + Sync {
    /// Bytes available to unprivileged users in the filesystem holding `dir`
    fn available_bytes(&self, dir: &Path) -> io::Result<u64>;

    /// Whether new files can be created in `dir`
    fn is_writable_dir(&self, dir: &Path) -> bool {
        FileManager::is_writable_dir(dir)
    }
}

/// [`FreeSpace`] backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFreeSpace;

impl FreeSpace for SystemFreeSpace {
    #[cfg(unix)]
    fn available_bytes(&self, dir: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(dir).map_err(io::Error::from)?;
        Ok((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64))
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "free space query is not supported on this platform"))
    }
}
