/*!
 * Two-stage batch merge.
 *
 * `prepare` loads, parses and merges the selected sources of every file and
 * classifies each file. `commit` then writes the files classified `Ok`, after
 * running all overwrite and free-space checks up front. Both stages process one
 * file at a time and poll the cancel flag between files and between stream
 * fetches or writes.
 *
 * The orchestrator never mutates the caller's files. Loaded texts and refreshed
 * stream lists are returned in the outcomes for the caller to apply.
 */

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, MutexGuard};

use crate::app_config::{Config, OutputMode};
use crate::errors::{SinkError, StateError};
use crate::file_utils::{FileManager, FreeSpace};
use crate::language_utils;
use crate::media_tools::{MediaTools, StreamInfo};
use crate::merging::cache::{MergeCache, MergedSubtitleInfo};
use crate::merging::context::{MergeStage, ProgressEvent, RunContext};
use crate::merging::engine::{self, MergeStyle};
use crate::merging::model::{
    FileId, FileMergeRecord, FileMergeStatus, LoadedSource, MediaFile, OutputTarget, SourceKind,
    StreamFailure, StreamFailureKind, SubtitleSource,
};
use crate::merging::sink;
use crate::subtitle_processor::Subtitles;

/// Settings that stay fixed for the lifetime of an orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSettings {
    pub output_mode: OutputMode,
    pub plain_text: bool,
    pub style: MergeStyle,
    /// Mark an injected stream as default
    pub make_default: bool,
    /// Where new containers are staged before replacing the original
    pub temp_dir: PathBuf,
    /// Free space required in `temp_dir` even for small files
    pub min_free_space_bytes: u64,
}

impl MergeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_mode: config.merge.output_mode,
            plain_text: config.merge.plain_text,
            style: MergeStyle {
                upper_color: config.merge.upper_color.clone(),
            },
            make_default: config.merge.make_default,
            temp_dir: config.storage.effective_temp_dir(),
            min_free_space_bytes: config.storage.min_free_space_bytes(),
        }
    }
}

/// Which existing sibling files the user agreed to overwrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverwriteAgreement {
    /// Every existing target may be replaced
    All,
    /// Only these targets may be replaced
    Paths(HashSet<PathBuf>),
}

impl Default for OverwriteAgreement {
    fn default() -> Self {
        Self::Paths(HashSet::new())
    }
}

impl OverwriteAgreement {
    pub fn allows(&self, path: &Path) -> bool {
        match self {
            Self::All => true,
            Self::Paths(paths) => paths.contains(path),
        }
    }
}

/// Result of the Prepare stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareOutcome {
    /// Number of files handed to `prepare`
    pub total_files: usize,
    /// Classified files, in processing order
    pub records: Vec<FileMergeRecord>,
    /// Files skipped because the upper or lower source was not chosen
    pub no_selection: Vec<FileId>,
    /// Texts fetched during the stage
    pub loaded: Vec<LoadedSource>,
    /// Whether the stage stopped early
    pub canceled: bool,
}

impl PrepareOutcome {
    fn new(total_files: usize) -> Self {
        Self {
            total_files,
            ..Self::default()
        }
    }

    /// Number of records with the given status
    pub fn count(&self, status: FileMergeStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Sibling targets of `Ok` records that already exist and would be overwritten
    pub fn existing_targets(&self) -> Vec<PathBuf> {
        self.records
            .iter()
            .filter(|r| r.is_ok())
            .filter_map(|r| match &r.output_target {
                Some(OutputTarget::Sibling(path)) if FileManager::file_exists(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Why a commit failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The temp directory is missing, read-only or too small
    NotEnoughSpace,
    /// Writing or replacing a file failed
    Io,
    /// The muxing tool failed
    Tool,
}

/// Commit classification of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Merged,
    /// Merged, but the stream list could not be refreshed afterwards
    MergedStreamListStale,
    /// The target exists and overwriting it was not confirmed
    NoAgreement,
    Failed(FailureReason),
}

/// Commit result of one file
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    pub file_id: FileId,
    pub status: CommitStatus,
    /// New stream list after an injection
    pub refreshed_streams: Option<Vec<StreamInfo>>,
}

/// Result of the Commit stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub results: Vec<CommitResult>,
    pub canceled: bool,
}

impl CommitOutcome {
    pub fn count(&self, status: CommitStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Outcome of preparing one file
enum FilePrepare {
    Done(FileMergeRecord),
    /// Canceled; carries the record when it already had failures to report
    Interrupted(Option<FileMergeRecord>),
}

enum FetchError {
    Interrupted,
    Failed(StreamFailureKind, String),
}

/// A committable record with everything it refers to resolved
struct CommitPlan<'a> {
    file: &'a MediaFile,
    upper: &'a SubtitleSource,
    lower: &'a SubtitleSource,
    merged_text: &'a str,
    target: &'a OutputTarget,
}

/// Runs the Prepare and Commit stages over a batch of files
pub struct Orchestrator {
    tools: Arc<dyn MediaTools>,
    space: Arc<dyn FreeSpace>,
    cache: MergeCache,
    settings: MergeSettings,
    // @field: Held for the duration of a stage, later stages queue behind it
    run_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(tools: Arc<dyn MediaTools>, space: Arc<dyn FreeSpace>, settings: MergeSettings) -> Self {
        Self {
            tools,
            space,
            cache: MergeCache::new(),
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Cache of merged tracks shared by every run of this orchestrator
    pub fn cache(&self) -> &MergeCache {
        &self.cache
    }

    /// Wait until no other stage runs on this orchestrator
    async fn start_run(&self) -> MutexGuard<'_, ()> {
        match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Waiting for the previous merge run to finish");
                self.run_lock.lock().await
            }
        }
    }

    fn state_error(e: StateError) -> StateError {
        error!("Merge run stopped: {}", e);
        e
    }

    /// Stage 1: load, merge and classify every file
    pub async fn prepare(&self, files: &[MediaFile], ctx: &RunContext) -> Result<PrepareOutcome, StateError> {
        let _guard = self.start_run().await;
        let total = files.len();
        let mut outcome = PrepareOutcome::new(total);

        for (position, file) in files.iter().enumerate() {
            if ctx.is_canceled() {
                outcome.canceled = true;
                break;
            }

            ctx.report(ProgressEvent {
                stage: MergeStage::Prepare,
                file_index: position,
                total_files: total,
                message: format!("Preparing {}", display_name(&file.path)),
                fraction: Some(position as f32 / total as f32),
            });

            let Some((upper, lower)) = file.selection() else {
                debug!("No upper/lower selection for {:?}", file.path);
                outcome.no_selection.push(file.id);
                continue;
            };
            if file.sources.get(upper).is_none() || file.sources.get(lower).is_none() {
                return Err(Self::state_error(StateError::MissingSelection(file.id)));
            }

            match self.prepare_file(file, (position, total), upper, lower, ctx, &mut outcome.loaded).await {
                FilePrepare::Done(record) => {
                    debug!("{:?} prepared as {:?}", file.path, record.status);
                    outcome.records.push(record);
                }
                FilePrepare::Interrupted(record) => {
                    outcome.records.extend(record);
                    outcome.canceled = true;
                    break;
                }
            }
        }

        if outcome.canceled {
            info!(
                "Preparation canceled after {} of {} files",
                outcome.records.len() + outcome.no_selection.len(),
                total
            );
        }
        Ok(outcome)
    }

    async fn prepare_file(
        &self,
        file: &MediaFile,
        (position, total): (usize, usize),
        upper: usize,
        lower: usize,
        ctx: &RunContext,
        loaded: &mut Vec<LoadedSource>,
    ) -> FilePrepare {
        let mut record = FileMergeRecord::new(file.id, upper, lower);
        let upper_source = &file.sources[upper];
        let lower_source = &file.sources[lower];

        // Selected sources first, then existing streams the result could duplicate
        let mut needed = vec![upper, lower];
        needed.extend(duplicate_candidates(file, upper_source));
        let mut seen = HashSet::new();
        needed.retain(|index| seen.insert(*index));

        let mut texts: Vec<Option<Arc<Subtitles>>> = file.sources.iter().map(|s| s.subtitles.clone()).collect();

        for index in needed {
            if texts[index].is_some() {
                continue;
            }
            if ctx.is_canceled() {
                return FilePrepare::Interrupted(interrupted_record(record));
            }

            let source = &file.sources[index];
            ctx.report(ProgressEvent {
                stage: MergeStage::Prepare,
                file_index: position,
                total_files: total,
                message: format!("Loading {} subtitles from {}", source.identifier(), display_name(&file.path)),
                fraction: None,
            });

            match self.fetch_source(file, source, ctx).await {
                Ok(subtitles) => {
                    let subtitles = Arc::new(subtitles);
                    loaded.push(LoadedSource {
                        file_id: file.id,
                        source_index: index,
                        subtitles: Arc::clone(&subtitles),
                    });
                    texts[index] = Some(subtitles);
                }
                Err(FetchError::Interrupted) => {
                    return FilePrepare::Interrupted(interrupted_record(record));
                }
                Err(FetchError::Failed(kind, message)) => {
                    warn!(
                        "Failed to load {} subtitles of {:?}: {}",
                        source.identifier(),
                        file.path,
                        message
                    );
                    record.failed_stream_count += 1;
                    record.failures.push(StreamFailure {
                        source_index: index,
                        kind,
                        message,
                    });
                }
            }
        }

        if record.failed_stream_count > 0 {
            record.status = FileMergeStatus::FailedToLoadSubtitles;
            return FilePrepare::Done(record);
        }

        let (Some(upper_text), Some(lower_text)) = (&texts[upper], &texts[lower]) else {
            record.status = FileMergeStatus::FailedToLoadSubtitles;
            return FilePrepare::Done(record);
        };

        let merged = self.merged_track(file, upper_source, lower_source, upper_text, lower_text);
        let merged_text = merged.to_srt_string(self.settings.plain_text);

        let is_duplicate = duplicate_candidates(file, upper_source).any(|index| {
            texts[index]
                .as_ref()
                .is_some_and(|existing| existing.to_srt_string(self.settings.plain_text) == merged_text)
        });

        if is_duplicate {
            info!("{:?} already contains these merged subtitles", file.path);
            record.status = FileMergeStatus::Duplicate;
        } else {
            record.status = FileMergeStatus::Ok;
            record.output_target = Some(match self.settings.output_mode {
                OutputMode::Inject => OutputTarget::Inject,
                OutputMode::Sibling => OutputTarget::Sibling(FileManager::sibling_output_path(
                    &file.path,
                    &upper_source.identifier(),
                    &lower_source.identifier(),
                )),
            });
        }
        record.merged_text = Some(merged_text);

        FilePrepare::Done(record)
    }

    /// Merge two loaded tracks, reusing an earlier merge of the same sources
    fn merged_track(
        &self,
        file: &MediaFile,
        upper_source: &SubtitleSource,
        lower_source: &SubtitleSource,
        upper_text: &Subtitles,
        lower_text: &Subtitles,
    ) -> Arc<Subtitles> {
        let upper_key = upper_source.cache_key(&file.path);
        let lower_key = lower_source.cache_key(&file.path);

        if let Some(info) = self.cache.get(&upper_key, &lower_key) {
            return info.merged;
        }

        let merged = Arc::new(engine::merge_with_style(upper_text, lower_text, &self.settings.style));
        self.cache
            .store(MergedSubtitleInfo::new(Arc::clone(&merged), &upper_key, &lower_key));
        merged
    }

    async fn fetch_source(
        &self,
        file: &MediaFile,
        source: &SubtitleSource,
        ctx: &RunContext,
    ) -> Result<Subtitles, FetchError> {
        let bytes = match &source.kind {
            SourceKind::Embedded(stream) if stream.is_bitmap() => {
                return Err(FetchError::Failed(
                    StreamFailureKind::Format,
                    format!("{} is a bitmap subtitle codec", stream.codec_name),
                ));
            }
            SourceKind::Embedded(stream) => self
                .tools
                .extract_text(&file.path, stream.index, &ctx.cancel)
                .await
                .map_err(|e| {
                    if e.is_interrupted() {
                        FetchError::Interrupted
                    } else {
                        FetchError::Failed(StreamFailureKind::Tool, e.to_string())
                    }
                })?,
            SourceKind::External { path } => tokio::fs::read(path)
                .await
                .map_err(|e| FetchError::Failed(StreamFailureKind::Io, format!("{:?}: {}", path, e)))?,
        };

        Subtitles::parse_srt_bytes(&bytes, &source.encoding).map_err(|e| {
            if let Some(raw) = e.raw_block() {
                debug!("Rejected block:\n{}", raw);
            }
            FetchError::Failed(StreamFailureKind::Format, e.to_string())
        })
    }

    /// Stage 2: write every `Ok` record.
    ///
    /// Every record is validated and every overwrite and space check is made before
    /// the first file is touched.
    pub async fn commit(
        &self,
        files: &[MediaFile],
        records: &[FileMergeRecord],
        agreement: &OverwriteAgreement,
        ctx: &RunContext,
    ) -> Result<CommitOutcome, StateError> {
        let _guard = self.start_run().await;
        let plans = self.plan_commit(files, records)?;
        let verdicts = self.precheck(&plans, agreement);

        let mut outcome = CommitOutcome::default();
        let total = plans.len();

        for (position, (plan, verdict)) in plans.iter().zip(verdicts).enumerate() {
            if ctx.is_canceled() {
                outcome.canceled = true;
                break;
            }

            if let Some(status) = verdict {
                outcome.results.push(CommitResult {
                    file_id: plan.file.id,
                    status,
                    refreshed_streams: None,
                });
                continue;
            }

            ctx.report(ProgressEvent {
                stage: MergeStage::Commit,
                file_index: position,
                total_files: total,
                message: format!("Writing {}", display_name(&plan.file.path)),
                fraction: Some(position as f32 / total as f32),
            });

            match self.write_plan(plan, ctx).await {
                Some(result) => outcome.results.push(result),
                None => {
                    outcome.canceled = true;
                    break;
                }
            }
        }

        Ok(outcome)
    }

    fn plan_commit<'a>(
        &self,
        files: &'a [MediaFile],
        records: &'a [FileMergeRecord],
    ) -> Result<Vec<CommitPlan<'a>>, StateError> {
        let mut plans = Vec::new();

        for record in records.iter().filter(|r| r.is_ok()) {
            let file = files
                .iter()
                .find(|f| f.id == record.file_id)
                .ok_or_else(|| Self::state_error(StateError::UnknownFile(record.file_id)))?;

            let (Some(merged_text), Some(target)) = (&record.merged_text, &record.output_target) else {
                return Err(Self::state_error(StateError::NotPrepared(record.file_id)));
            };

            let (Some(upper), Some(lower)) = (file.sources.get(record.upper), file.sources.get(record.lower)) else {
                return Err(Self::state_error(StateError::MissingSelection(record.file_id)));
            };

            plans.push(CommitPlan {
                file,
                upper,
                lower,
                merged_text,
                target,
            });
        }

        Ok(plans)
    }

    /// Read-only checks made before anything is written; `Some` means the file is skipped
    fn precheck(&self, plans: &[CommitPlan<'_>], agreement: &OverwriteAgreement) -> Vec<Option<CommitStatus>> {
        let injects = plans.iter().any(|p| matches!(p.target, OutputTarget::Inject));
        let temp_dir = &self.settings.temp_dir;

        let available = if injects && self.space.is_writable_dir(temp_dir) {
            match self.space.available_bytes(temp_dir) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Failed to query free space of {:?}: {}", temp_dir, e);
                    None
                }
            }
        } else {
            if injects {
                warn!("Temporary directory {:?} is not writable", temp_dir);
            }
            None
        };

        plans
            .iter()
            .map(|plan| match plan.target {
                OutputTarget::Sibling(path) => {
                    if FileManager::file_exists(path) && !agreement.allows(path) {
                        info!("Not overwriting {:?} without agreement", path);
                        Some(CommitStatus::NoAgreement)
                    } else {
                        None
                    }
                }
                OutputTarget::Inject => {
                    let required = plan.file.size_bytes.max(self.settings.min_free_space_bytes);
                    match available {
                        Some(bytes) if bytes >= required => None,
                        _ => {
                            warn!(
                                "Not enough space in {:?} to merge into {:?} ({} bytes required)",
                                temp_dir, plan.file.path, required
                            );
                            Some(CommitStatus::Failed(FailureReason::NotEnoughSpace))
                        }
                    }
                }
            })
            .collect()
    }

    /// Write one file; `None` means the write was interrupted by cancellation
    async fn write_plan(&self, plan: &CommitPlan<'_>, ctx: &RunContext) -> Option<CommitResult> {
        let file_id = plan.file.id;
        let failed = |reason| CommitResult {
            file_id,
            status: CommitStatus::Failed(reason),
            refreshed_streams: None,
        };

        match plan.target {
            OutputTarget::Sibling(path) => match sink::write_sibling(path, plan.merged_text) {
                Ok(()) => {
                    info!("Merged subtitles written to {:?}", path);
                    Some(CommitResult {
                        file_id,
                        status: CommitStatus::Merged,
                        refreshed_streams: None,
                    })
                }
                Err(e) => {
                    error!("Failed to write {:?}: {}", path, e);
                    Some(failed(FailureReason::Io))
                }
            },
            OutputTarget::Inject => {
                let metadata = sink::inject_metadata(plan.file, plan.upper, plan.lower, self.settings.make_default);
                let result = sink::inject_into_video(
                    self.tools.as_ref(),
                    plan.file,
                    plan.merged_text,
                    metadata,
                    &self.settings.temp_dir,
                    &ctx.cancel,
                )
                .await;

                match result {
                    Ok(outcome) => {
                        info!("Merged subtitles injected into {:?}", plan.file.path);
                        let status = if outcome.refreshed_streams.is_some() {
                            CommitStatus::Merged
                        } else {
                            CommitStatus::MergedStreamListStale
                        };
                        Some(CommitResult {
                            file_id,
                            status,
                            refreshed_streams: outcome.refreshed_streams,
                        })
                    }
                    Err(SinkError::Tool(ref e)) if e.is_interrupted() => {
                        info!("Injection into {:?} interrupted", plan.file.path);
                        None
                    }
                    Err(SinkError::Tool(e)) => {
                        error!("Failed to inject into {:?}: {}", plan.file.path, e);
                        Some(failed(FailureReason::Tool))
                    }
                    Err(SinkError::Io(e)) => {
                        error!("Failed to replace {:?}: {}", plan.file.path, e);
                        Some(failed(FailureReason::Io))
                    }
                }
            }
        }
    }
}

/// Embedded text streams in the same language family as the upper source
fn duplicate_candidates<'a>(file: &'a MediaFile, upper: &'a SubtitleSource) -> impl Iterator<Item = usize> + 'a {
    file.sources
        .iter()
        .enumerate()
        .filter(move |(_, source)| {
            source.is_embedded()
                && !source.is_bitmap()
                && language_utils::same_language_family(upper.language.as_deref(), source.language.as_deref())
        })
        .map(|(index, _)| index)
}

/// A file interrupted mid-load is still reported when it already has failures
fn interrupted_record(mut record: FileMergeRecord) -> Option<FileMergeRecord> {
    if record.failed_stream_count > 0 {
        record.status = FileMergeStatus::FailedToLoadSubtitles;
        Some(record)
    } else {
        None
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
