/*!
 * Tests for file utility functions
 */

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use dualsub::file_utils::{FileManager, FileType};
use crate::common;

/// Test file type detection
#[test]
fn test_detect_file_type_withVariousFiles_shouldDetectCorrectType() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;

    let srt = common::create_test_file(temp_dir.path(), "movie.en.srt", common::UPPER_SRT)?;
    let video = common::create_test_video(temp_dir.path(), "movie.MKV", 16)?;
    let text = common::create_test_file(temp_dir.path(), "notes.txt", "hello")?;
    let bare_srt = common::create_test_file(temp_dir.path(), "subtitles", common::LOWER_SRT)?;
    let bare_text = common::create_test_file(temp_dir.path(), "README", "nothing here")?;

    assert_eq!(FileManager::detect_file_type(&srt)?, FileType::Subtitle);
    assert_eq!(FileManager::detect_file_type(&video)?, FileType::Video);
    assert_eq!(FileManager::detect_file_type(&text)?, FileType::Unknown);
    assert_eq!(FileManager::detect_file_type(&bare_srt)?, FileType::Subtitle);
    assert_eq!(FileManager::detect_file_type(&bare_text)?, FileType::Unknown);
    assert!(FileManager::detect_file_type(temp_dir.path().join("missing.mkv")).is_err());
    Ok(())
}

/// Test recursive discovery keeps only videos, sorted by name
#[test]
fn test_find_video_files_withNestedDirectory_shouldReturnSortedVideos() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let season = temp_dir.path().join("season1");
    FileManager::ensure_dir(&season)?;

    common::create_test_video(&season, "ep02.mkv", 8)?;
    common::create_test_video(&season, "ep01.mp4", 8)?;
    common::create_test_file(&season, "ep01.en.srt", common::UPPER_SRT)?;
    let single = common::create_test_video(temp_dir.path(), "extra.avi", 8)?;

    let found = FileManager::find_video_files(&[season.clone(), single.clone()])?;

    assert_eq!(found, vec![season.join("ep01.mp4"), season.join("ep02.mkv"), single]);
    Ok(())
}

/// Test a non-video input is skipped rather than rejected
#[test]
fn test_find_video_files_withSubtitleInput_shouldSkipIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let srt = common::create_test_file(temp_dir.path(), "movie.srt", common::UPPER_SRT)?;

    assert!(FileManager::find_video_files(&[srt])?.is_empty());
    Ok(())
}

/// Test sibling subtitle discovery
#[test]
fn test_find_sibling_subtitles_withTaggedFiles_shouldReturnLanguages() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let video = common::create_test_video(temp_dir.path(), "movie.mkv", 8)?;
    common::create_test_file(temp_dir.path(), "movie.en.srt", common::UPPER_SRT)?;
    common::create_test_file(temp_dir.path(), "movie.eng-rus.srt", common::UPPER_SRT)?;
    common::create_test_file(temp_dir.path(), "movie2.ru.srt", common::LOWER_SRT)?;

    let found = FileManager::find_sibling_subtitles(&video)?;

    assert_eq!(found, vec![(temp_dir.path().join("movie.en.srt"), Some("en".to_string()))]);
    Ok(())
}

/// Test sibling output naming
#[test]
fn test_sibling_output_path_withRelativeVideo_shouldStayRelative() {
    assert_eq!(
        FileManager::sibling_output_path("movie.mp4", "eng", "rus"),
        PathBuf::from("movie.eng-rus.srt")
    );
}

/// Test atomic write into a fresh file
#[test]
fn test_write_atomically_withNewTarget_shouldCreateFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let target = temp_dir.path().join("movie.en-ru.srt");

    FileManager::write_atomically(&target, common::UPPER_SRT.as_bytes())?;

    assert_eq!(fs::read_to_string(&target)?, common::UPPER_SRT);
    Ok(())
}

/// Test file replacement moves the content and removes the source
#[test]
fn test_replace_file_withExistingTarget_shouldMoveContent() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let from = common::create_test_file(temp_dir.path(), "new.mkv", "new container")?;
    let to = common::create_test_file(temp_dir.path(), "movie.mkv", "old container")?;

    FileManager::replace_file(&from, &to)?;

    assert_eq!(fs::read_to_string(&to)?, "new container");
    assert!(!from.exists());
    Ok(())
}

/// Test directory helpers
#[test]
fn test_dir_helpers_withTempDir_shouldReportState() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("a").join("b");

    assert!(!FileManager::dir_exists(&nested));
    FileManager::ensure_dir(&nested)?;
    assert!(FileManager::dir_exists(&nested));
    assert!(FileManager::is_writable_dir(&nested));
    assert!(!FileManager::is_writable_dir(temp_dir.path().join("missing")));
    assert!(!FileManager::file_exists(&nested));
    Ok(())
}
