use anyhow::{Result, Context};
use log::{error, warn, info, debug};
use std::path::PathBuf;
use std::sync::Arc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use crate::app_config::Config;
use crate::file_utils::{FileManager, FreeSpace, SystemFreeSpace};
use crate::language_utils;
use crate::media_tools::{FfmpegTools, MediaTools};
use crate::merging::{
    BatchSummary, CancelFlag, MediaFile, MergeReport, MergeSettings, Orchestrator, OverwriteAgreement,
    ProgressEvent, RunContext, SubtitleSource,
};

// @module: Application controller for batch subtitle merging

/// Main application controller for subtitle merging
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Probe/extract/inject backend
    tools: Arc<dyn MediaTools>,
    // @field: Free space query for injection
    space: Arc<dyn FreeSpace>,
}

impl Controller {
    // @method: Create a new controller backed by ffmpeg and the real filesystem
    pub fn with_config(config: Config) -> Result<Self> {
        let tools: Arc<dyn MediaTools> = Arc::new(FfmpegTools::new(&config.tools));
        Ok(Self::with_backends(config, tools, Arc::new(SystemFreeSpace)))
    }

    // @method: Create a controller with explicit backends
    pub fn with_backends(config: Config, tools: Arc<dyn MediaTools>, space: Arc<dyn FreeSpace>) -> Self {
        Self { config, tools, space }
    }

    /// Merge subtitles of every video found under `inputs`.
    ///
    /// Ctrl-C cancels the current stage cooperatively; files already written stay written.
    /// Files prepared before a cancel are still committed, and a further Ctrl-C stops that.
    pub async fn run(&self, inputs: &[PathBuf], force_overwrite: bool) -> Result<MergeReport> {
        let cancel = CancelFlag::new();
        let signal_task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                // Every press cancels the current stage; a second press before the stage stops exits
                while tokio::signal::ctrl_c().await.is_ok() {
                    if cancel.is_canceled() {
                        warn!("Interrupted again, exiting");
                        std::process::exit(130);
                    }
                    warn!("Interrupted, stopping after the current step");
                    cancel.cancel();
                }
            })
        };

        let result = self.run_with_cancel(inputs, force_overwrite, &cancel).await;
        signal_task.abort();
        result
    }

    /// Same as [`Controller::run`] with a caller-owned cancel flag
    pub async fn run_with_cancel(
        &self,
        inputs: &[PathBuf],
        force_overwrite: bool,
        cancel: &CancelFlag,
    ) -> Result<MergeReport> {
        let mut files = self.discover(inputs, cancel).await?;
        info!(
            "Merging {} subtitles over {} subtitles for {} file(s)",
            self.config.upper_language,
            self.config.lower_language,
            files.len()
        );

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&self.tools),
            Arc::clone(&self.space),
            MergeSettings::from_config(&self.config),
        ));

        // Stage 1 runs on the worker against a snapshot of the file list
        let prepare = {
            let (sender, receiver) = mpsc::unbounded_channel();
            let ctx = RunContext::new(cancel.clone()).with_progress(sender);
            let snapshot = files.clone();
            let orchestrator = Arc::clone(&orchestrator);
            let worker = tokio::spawn(async move { orchestrator.prepare(&snapshot, &ctx).await });
            Self::drive_progress(worker, receiver, files.len()).await??
        };

        for file in files.iter_mut() {
            file.apply_loaded(&prepare.loaded);
        }

        if prepare.canceled {
            // Already prepared files are still written
            cancel.reset();
        }

        let agreement = if force_overwrite {
            OverwriteAgreement::All
        } else {
            for target in prepare.existing_targets() {
                warn!("Output already exists: {:?} (use -f to force overwrite)", target);
            }
            OverwriteAgreement::default()
        };

        let commit = {
            let (sender, receiver) = mpsc::unbounded_channel();
            let ctx = RunContext::new(cancel.clone()).with_progress(sender);
            let snapshot = files.clone();
            let records = prepare.records.clone();
            let orchestrator = Arc::clone(&orchestrator);
            let worker = tokio::spawn(async move {
                orchestrator.commit(&snapshot, &records, &agreement, &ctx).await
            });
            let ok_count = prepare.records.iter().filter(|r| r.is_ok()).count();
            Self::drive_progress(worker, receiver, ok_count).await??
        };

        for result in &commit.results {
            if let (Some(streams), Some(file)) = (&result.refreshed_streams, files.get_mut(result.file_id)) {
                file.replace_streams(streams.clone());
            }
        }

        let report = BatchSummary::from_run(&prepare, Some(&commit)).report();
        Self::log_report(&report);
        Ok(report)
    }

    /// Find videos, list their subtitle sources and pick upper and lower sources
    pub async fn discover(&self, inputs: &[PathBuf], cancel: &CancelFlag) -> Result<Vec<MediaFile>> {
        let videos = FileManager::find_video_files(inputs)?;
        let mut files = Vec::with_capacity(videos.len());

        for (id, path) in videos.into_iter().enumerate() {
            if cancel.is_canceled() {
                break;
            }

            let size_bytes = std::fs::metadata(&path)
                .with_context(|| format!("Failed to read metadata of {:?}", path))?
                .len();

            let mut sources: Vec<SubtitleSource> = match self.tools.probe(&path, cancel).await {
                Ok(streams) => streams.into_iter().map(SubtitleSource::embedded).collect(),
                Err(e) => {
                    warn!("Failed to list subtitle streams of {:?}: {}", path, e);
                    Vec::new()
                }
            };

            for (subtitle_path, language) in FileManager::find_sibling_subtitles(&path)? {
                sources.push(SubtitleSource::external(
                    subtitle_path,
                    language,
                    self.config.storage.external_encoding.clone(),
                ));
            }

            let mut file = MediaFile::new(id, path, size_bytes, sources);
            self.select_sources(&mut file);
            files.push(file);
        }

        Ok(files)
    }

    /// Pick upper and lower sources from the configured languages
    pub fn select_sources(&self, file: &mut MediaFile) {
        file.upper = select_subtitle_source(&file.sources, &self.config.upper_language, None);
        file.lower = select_subtitle_source(&file.sources, &self.config.lower_language, file.upper);

        match file.selection() {
            Some((upper, lower)) => debug!(
                "{:?}: upper {} / lower {}",
                file.path,
                file.sources[upper].identifier(),
                file.sources[lower].identifier()
            ),
            None => warn!(
                "{:?}: no {} or {} subtitles found",
                file.path, self.config.upper_language, self.config.lower_language
            ),
        }
    }

    /// Render worker progress until the worker finishes
    async fn drive_progress<T>(
        worker: JoinHandle<T>,
        mut receiver: mpsc::UnboundedReceiver<ProgressEvent>,
        total: usize,
    ) -> Result<T> {
        let progress_bar = ProgressBar::new(total as u64);
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {prefix} {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));

        while let Some(event) = receiver.recv().await {
            progress_bar.set_prefix(event.stage.to_string());
            progress_bar.set_position(event.file_index as u64);
            progress_bar.set_message(event.message);
        }

        progress_bar.finish_and_clear();
        worker.await.context("Merge worker panicked")
    }

    fn log_report(report: &MergeReport) {
        if let Some(success) = &report.success {
            info!("{}", success);
        }
        if let Some(warning) = &report.warning {
            warn!("{}", warning);
        }
        if let Some(error) = &report.error {
            error!("{}", error);
        }
    }
}

/// Pick the first text source in the preferred language.
///
/// A source matches by language tag, or by a title naming the language when it has
/// no tag (or `und`). Bitmap streams and the `exclude`d source are never picked.
pub fn select_subtitle_source(
    sources: &[SubtitleSource],
    preferred_language: &str,
    exclude: Option<usize>,
) -> Option<usize> {
    let language_name = language_utils::get_language_name(preferred_language)
        .ok()
        .map(|name| name.to_lowercase());

    let candidates = sources
        .iter()
        .enumerate()
        .filter(|(index, source)| Some(*index) != exclude && !source.is_bitmap());

    // Language tags win over titles
    for (index, source) in candidates.clone() {
        if let Some(language) = &source.language {
            if language_utils::language_codes_match(language, preferred_language) {
                return Some(index);
            }
        }
    }

    // A tagged source names another language here, so its title is not trusted
    let untagged = |source: &SubtitleSource| {
        source
            .language
            .as_deref()
            .map(str::trim)
            .is_none_or(|tag| tag.is_empty() || tag.eq_ignore_ascii_case("und"))
    };

    for (index, source) in candidates.filter(|(_, source)| untagged(source)) {
        if let Some(title) = &source.title {
            let title_lower = title.to_lowercase();
            let names_language = language_name
                .as_deref()
                .is_some_and(|name| title_lower.contains(name));
            let has_code = title_lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == preferred_language.to_lowercase());
            if names_language || has_code {
                return Some(index);
            }
        }
    }

    None
}
