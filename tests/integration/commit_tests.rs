/*!
 * Integration tests for the Commit stage
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dualsub::app_config::OutputMode;
use dualsub::errors::StateError;
use dualsub::media_tools::StreamInfo;
use dualsub::merging::{
    BatchSummary, CancelFlag, CommitStatus, FailureReason, FileMergeStatus, MediaFile, Orchestrator,
    OutputTarget, OverwriteAgreement, PrepareOutcome, RunContext,
};
use crate::common::{self, mock_tools::{FixedFreeSpace, ScriptedTools, ToolCall}};

fn en_ru_streams() -> Vec<StreamInfo> {
    let mut upper = common::text_stream(2, 0, Some("en"));
    upper.is_default = true;
    vec![upper, common::text_stream(3, 1, Some("ru"))]
}

/// Create `names` as videos with scripted en/ru streams
fn scripted_batch(dir: &Path, names: &[&str], size: usize) -> Result<(ScriptedTools, Vec<MediaFile>)> {
    let mut tools = ScriptedTools::new();
    let mut files = Vec::new();

    for (id, name) in names.iter().enumerate() {
        let video = common::create_test_video(dir, name, size)?;
        tools = tools
            .with_streams(&video, en_ru_streams())
            .with_text(&video, 2, common::UPPER_SRT)
            .with_text(&video, 3, common::LOWER_SRT);
        files.push(common::media_file(id, &video, en_ru_streams(), Some(0), Some(1)));
    }

    Ok((tools, files))
}

async fn prepare_all(orchestrator: &Orchestrator, files: &[MediaFile]) -> Result<PrepareOutcome> {
    Ok(orchestrator.prepare(files, &RunContext::default()).await?)
}

/// Test a prepared file is written next to the video
#[tokio::test]
async fn test_commit_withSiblingTarget_shouldWriteMergedFile() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["movie.mkv"], 10)?;
    let orchestrator = Orchestrator::new(
        Arc::new(tools),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Sibling, temp_dir.path()),
    );

    let prepare = prepare_all(&orchestrator, &files).await?;
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;

    assert_eq!(commit.count(CommitStatus::Merged), 1);
    let written = fs::read_to_string(temp_dir.path().join("movie.en-ru.srt"))?;
    assert_eq!(Some(written.as_str()), prepare.records[0].merged_text.as_deref());
    assert!(written.contains("00:00:02,000 --> 00:00:04,000\nThis is a test subtitle.\nЭто тестовый субтитр.\n"));

    let report = BatchSummary::from_run(&prepare, Some(&commit)).report();
    assert_eq!(report.success.as_deref(), Some("Subtitles have been merged successfully"));
    Ok(())
}

/// Test existing targets are only replaced with agreement
#[tokio::test]
async fn test_commit_withExistingTarget_shouldRequireAgreement() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["a.mkv", "b.mkv"], 10)?;
    let target_a = common::create_test_file(temp_dir.path(), "a.en-ru.srt", "old")?;
    let target_b = common::create_test_file(temp_dir.path(), "b.en-ru.srt", "old")?;
    let orchestrator = Orchestrator::new(
        Arc::new(tools),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Sibling, temp_dir.path()),
    );
    let prepare = prepare_all(&orchestrator, &files).await?;
    assert_eq!(prepare.existing_targets(), vec![target_a.clone(), target_b.clone()]);

    // Nothing agreed
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;
    assert_eq!(commit.count(CommitStatus::NoAgreement), 2);
    assert_eq!(fs::read_to_string(&target_a)?, "old");

    // Only one path agreed
    let agreement = OverwriteAgreement::Paths([target_b.clone()].into_iter().collect());
    let commit = orchestrator
        .commit(&files, &prepare.records, &agreement, &RunContext::default())
        .await?;
    assert_eq!(commit.results[0].status, CommitStatus::NoAgreement);
    assert_eq!(commit.results[1].status, CommitStatus::Merged);
    assert_eq!(fs::read_to_string(&target_a)?, "old");
    assert_ne!(fs::read_to_string(&target_b)?, "old");

    // Everything agreed
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::All, &RunContext::default())
        .await?;
    assert_eq!(commit.count(CommitStatus::Merged), 2);
    assert_ne!(fs::read_to_string(&target_a)?, "old");
    Ok(())
}

/// Test injection replaces the video and returns its refreshed stream list
#[tokio::test]
async fn test_commit_withInjectTarget_shouldReplaceVideoAndRefreshStreams() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let work_dir = common::create_temp_dir()?;
    let (tools, mut files) = scripted_batch(temp_dir.path(), &["movie.mkv"], 10)?;
    let tools = Arc::new(tools);
    let orchestrator = Orchestrator::new(
        tools.clone(),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Inject, work_dir.path()),
    );

    let prepare = prepare_all(&orchestrator, &files).await?;
    assert_eq!(prepare.records[0].output_target, Some(OutputTarget::Inject));
    files[0].apply_loaded(&prepare.loaded);

    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;

    let result = &commit.results[0];
    assert_eq!(result.status, CommitStatus::Merged);
    assert_eq!(fs::read_to_string(&files[0].path)?, "container with merged-en-ru");
    assert_eq!(fs::read_dir(work_dir.path())?.count(), 0);

    let request = tools.last_inject().expect("inject was called");
    assert_eq!(request.metadata.language, "en");
    assert_eq!(request.metadata.clear_default, vec![0]);
    assert_eq!(request.metadata.existing_subtitle_count, 2);
    assert_eq!(request.output.extension().and_then(|e| e.to_str()), Some("mkv"));
    assert!(request.output.starts_with(work_dir.path()));

    let streams = result.refreshed_streams.clone().expect("streams were refreshed");
    assert_eq!(streams.len(), 3);
    files[0].replace_streams(streams);
    assert_eq!(files[0].selection(), Some((0, 1)));
    assert!(files[0].sources[0].is_loaded());
    assert!(!files[0].sources[2].is_loaded());

    // The next run finds the injected stream and skips the file
    let again = prepare_all(&orchestrator, &files).await?;
    assert_eq!(again.records[0].status, FileMergeStatus::Duplicate);
    Ok(())
}

/// Test a failing re-probe still counts as merged, with a warning
#[tokio::test]
async fn test_commit_withFailingReprobe_shouldReportStaleStreamList() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["movie.mp4"], 10)?;
    let orchestrator = Orchestrator::new(
        Arc::new(tools.failing_probe_after_inject()),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Inject, temp_dir.path()),
    );

    let prepare = prepare_all(&orchestrator, &files).await?;
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;

    assert_eq!(commit.results[0].status, CommitStatus::MergedStreamListStale);
    assert!(commit.results[0].refreshed_streams.is_none());

    let report = BatchSummary::from_run(&prepare, Some(&commit)).report();
    assert_eq!(report.success.as_deref(), Some("Merge finished for 1/1 files"));
    assert_eq!(
        report.warning.as_deref(),
        Some("Merge was incomplete: stream list not refreshed for 1/1")
    );
    Ok(())
}

/// Test a failing muxer leaves the original untouched
#[tokio::test]
async fn test_commit_withFailingInject_shouldReportToolFailure() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let work_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["movie.mkv"], 10)?;
    let orchestrator = Orchestrator::new(
        Arc::new(tools.failing_inject()),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Inject, work_dir.path()),
    );

    let prepare = prepare_all(&orchestrator, &files).await?;
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;

    assert_eq!(commit.results[0].status, CommitStatus::Failed(FailureReason::Tool));
    assert_eq!(fs::read(&files[0].path)?, vec![0u8; 10]);
    assert_eq!(fs::read_dir(work_dir.path())?.count(), 0);

    let report = BatchSummary::from_run(&prepare, Some(&commit)).report();
    assert_eq!(report.error.as_deref(), Some("Media tool failed for the file"));
    Ok(())
}

/// Test injection is refused before any write when the temp dir is too small
#[tokio::test]
async fn test_commit_withTooLittleSpace_shouldFailEveryInjectUpFront() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["a.mkv", "b.mkv"], 100)?;
    let tools = Arc::new(tools);
    let orchestrator = Orchestrator::new(
        tools.clone(),
        Arc::new(FixedFreeSpace {
            available: 99,
            writable: true,
        }),
        common::merge_settings(OutputMode::Inject, temp_dir.path()),
    );

    let prepare = prepare_all(&orchestrator, &files).await?;
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;

    assert_eq!(commit.count(CommitStatus::Failed(FailureReason::NotEnoughSpace)), 2);
    assert!(!tools.calls().iter().any(|call| matches!(call, ToolCall::Inject(_))));
    Ok(())
}

/// Test the free-space margin applies to small files and read-only dirs fail the check
#[tokio::test]
async fn test_commit_withMarginOrReadOnlyDir_shouldReportNotEnoughSpace() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["movie.mkv"], 10)?;
    let tools = Arc::new(tools);

    let mut settings = common::merge_settings(OutputMode::Inject, temp_dir.path());
    settings.min_free_space_bytes = 1_000;
    let margin = Orchestrator::new(
        tools.clone(),
        Arc::new(FixedFreeSpace {
            available: 500,
            writable: true,
        }),
        settings,
    );
    let prepared = prepare_all(&margin, &files).await?;
    let commit = margin
        .commit(&files, &prepared.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;
    assert_eq!(commit.results[0].status, CommitStatus::Failed(FailureReason::NotEnoughSpace));

    let read_only = Orchestrator::new(
        tools.clone(),
        Arc::new(FixedFreeSpace {
            available: u64::MAX,
            writable: false,
        }),
        common::merge_settings(OutputMode::Inject, temp_dir.path()),
    );
    let commit = read_only
        .commit(&files, &prepared.records, &OverwriteAgreement::default(), &RunContext::default())
        .await?;
    assert_eq!(commit.results[0].status, CommitStatus::Failed(FailureReason::NotEnoughSpace));
    Ok(())
}

/// Test a batch canceled during Prepare still writes what was prepared
#[tokio::test]
async fn test_commit_afterCanceledPrepare_shouldWritePreparedFilesOnly() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let names = ["e1.mkv", "e2.mkv", "e3.mkv", "e4.mkv", "e5.mkv"];
    let (tools, files) = scripted_batch(temp_dir.path(), &names, 10)?;
    let tools = tools.interrupt_on(&files[2].path);
    let orchestrator = Orchestrator::new(
        Arc::new(tools),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Sibling, temp_dir.path()),
    );
    let ctx = RunContext::new(CancelFlag::new());

    let prepare = orchestrator.prepare(&files, &ctx).await?;
    assert!(prepare.canceled);
    assert_eq!(prepare.records.len(), 2);

    ctx.cancel.reset();
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &ctx)
        .await?;

    assert_eq!(commit.count(CommitStatus::Merged), 2);
    assert!(temp_dir.path().join("e2.en-ru.srt").exists());
    assert!(!temp_dir.path().join("e3.en-ru.srt").exists());

    let report = BatchSummary::from_run(&prepare, Some(&commit)).report();
    assert_eq!(report.success.as_deref(), Some("Merge finished for 2/5 files"));
    assert_eq!(report.warning.as_deref(), Some("Merge was incomplete: canceled for 3/5"));
    assert!(report.error.is_none());
    Ok(())
}

/// Test a raised cancel flag stops the commit before the first write
#[tokio::test]
async fn test_commit_withCanceledContext_shouldWriteNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["movie.mkv"], 10)?;
    let orchestrator = Orchestrator::new(
        Arc::new(tools),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Sibling, temp_dir.path()),
    );
    let prepare = prepare_all(&orchestrator, &files).await?;

    let ctx = RunContext::new(CancelFlag::new());
    ctx.cancel.cancel();
    let commit = orchestrator
        .commit(&files, &prepare.records, &OverwriteAgreement::default(), &ctx)
        .await?;

    assert!(commit.canceled);
    assert!(commit.results.is_empty());
    assert!(!temp_dir.path().join("movie.en-ru.srt").exists());
    Ok(())
}

/// Test records that do not fit the file list are rejected before anything is written
#[tokio::test]
async fn test_commit_withInconsistentRecords_shouldReturnStateError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (tools, files) = scripted_batch(temp_dir.path(), &["movie.mkv"], 10)?;
    let orchestrator = Orchestrator::new(
        Arc::new(tools),
        Arc::new(FixedFreeSpace::plenty()),
        common::merge_settings(OutputMode::Sibling, temp_dir.path()),
    );
    let prepare = prepare_all(&orchestrator, &files).await?;

    let mut unknown = prepare.records.clone();
    unknown[0].file_id = 99;
    let result = orchestrator
        .commit(&files, &unknown, &OverwriteAgreement::All, &RunContext::default())
        .await;
    assert_eq!(result.unwrap_err(), StateError::UnknownFile(99));

    let mut unprepared = prepare.records.clone();
    unprepared[0].merged_text = None;
    let result = orchestrator
        .commit(&files, &unprepared, &OverwriteAgreement::All, &RunContext::default())
        .await;
    assert_eq!(result.unwrap_err(), StateError::NotPrepared(0));

    let target: PathBuf = temp_dir.path().join("movie.en-ru.srt");
    assert!(!target.exists());
    Ok(())
}
