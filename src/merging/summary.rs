/*!
 * Batch result aggregation.
 *
 * The outcome of a run is reduced to counts per category and then rendered as a
 * three-part report (success, warning, error). When every file ends up in one
 * category the report is a single sentence; otherwise each non-empty category is
 * listed with its `count/total` ratio. Raw error text never reaches the report.
 */

use crate::merging::model::FileMergeStatus;
use crate::merging::orchestrator::{CommitOutcome, CommitStatus, FailureReason, PrepareOutcome};

/// Per-category file counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// Written, including `merged_stale`
    pub merged: usize,
    /// Written, but the stream list could not be refreshed
    pub merged_stale: usize,
    pub no_selection: usize,
    pub duplicate: usize,
    pub no_agreement: usize,
    /// Never reached a final classification
    pub canceled: usize,
    pub failed_to_load: usize,
    pub failed_not_enough_space: usize,
    pub failed_io: usize,
    pub failed_tool: usize,
}

/// Human-readable outcome of a run; any part may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub success: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

/// One category as it appears in a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Merged,
    NoSelection,
    Duplicate,
    NoAgreement,
    Canceled,
    FailedToLoad,
    NotEnoughSpace,
    Io,
    Tool,
}

impl BatchSummary {
    /// Count a run; `commit` is `None` when the Commit stage never ran
    pub fn from_run(prepare: &PrepareOutcome, commit: Option<&CommitOutcome>) -> Self {
        let mut summary = Self {
            total: prepare.total_files,
            no_selection: prepare.no_selection.len(),
            duplicate: prepare.count(FileMergeStatus::Duplicate),
            failed_to_load: prepare.count(FileMergeStatus::FailedToLoadSubtitles),
            ..Self::default()
        };

        for result in commit.map(|c| c.results.as_slice()).unwrap_or_default() {
            match result.status {
                CommitStatus::Merged => summary.merged += 1,
                CommitStatus::MergedStreamListStale => {
                    summary.merged += 1;
                    summary.merged_stale += 1;
                }
                CommitStatus::NoAgreement => summary.no_agreement += 1,
                CommitStatus::Failed(FailureReason::NotEnoughSpace) => summary.failed_not_enough_space += 1,
                CommitStatus::Failed(FailureReason::Io) => summary.failed_io += 1,
                CommitStatus::Failed(FailureReason::Tool) => summary.failed_tool += 1,
            }
        }

        let classified = summary.merged
            + summary.no_selection
            + summary.duplicate
            + summary.no_agreement
            + summary.failed();
        summary.canceled = summary.total.saturating_sub(classified);
        summary
    }

    /// Files that failed for any reason
    pub fn failed(&self) -> usize {
        self.failed_to_load + self.failed_not_enough_space + self.failed_io + self.failed_tool
    }

    fn count(&self, category: Category) -> usize {
        match category {
            Category::Merged => self.merged,
            Category::NoSelection => self.no_selection,
            Category::Duplicate => self.duplicate,
            Category::NoAgreement => self.no_agreement,
            Category::Canceled => self.canceled,
            Category::FailedToLoad => self.failed_to_load,
            Category::NotEnoughSpace => self.failed_not_enough_space,
            Category::Io => self.failed_io,
            Category::Tool => self.failed_tool,
        }
    }

    /// Render the three-part report
    pub fn report(&self) -> MergeReport {
        let mut report = MergeReport::default();
        let total = self.total;

        if total == 0 {
            report.warning = Some("No files were selected for merging".to_string());
            return report;
        }

        const ALL: [Category; 9] = [
            Category::Merged,
            Category::NoSelection,
            Category::Duplicate,
            Category::NoAgreement,
            Category::Canceled,
            Category::FailedToLoad,
            Category::NotEnoughSpace,
            Category::Io,
            Category::Tool,
        ];

        if self.merged_stale == 0 {
            if let Some(&only) = ALL.iter().find(|&&c| self.count(c) == total) {
                let message = single_message(only, total);
                match only {
                    Category::Merged => report.success = Some(message),
                    Category::NoSelection | Category::Duplicate | Category::NoAgreement | Category::Canceled => {
                        report.warning = Some(message)
                    }
                    _ => report.error = Some(message),
                }
                return report;
            }
        }

        if self.merged > 0 {
            report.success = Some(format!("Merge finished for {}/{} files", self.merged, total));
        }

        let warnings: Vec<String> = [
            (self.no_selection, "no selection"),
            (self.duplicate, "already merged"),
            (self.no_agreement, "no overwrite agreement"),
            (self.canceled, "canceled"),
            (self.merged_stale, "stream list not refreshed"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} for {}/{}", label, count, total))
        .collect();
        if !warnings.is_empty() {
            report.warning = Some(format!("Merge was incomplete: {}", warnings.join(", ")));
        }

        let failures: Vec<String> = [
            (self.failed_to_load, "subtitles failed to load"),
            (self.failed_not_enough_space, "not enough temporary space"),
            (self.failed_io, "write error"),
            (self.failed_tool, "media tool error"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} for {}/{}", label, count, total))
        .collect();
        if !failures.is_empty() {
            report.error = Some(format!(
                "Merge failed for {}/{} files: {}",
                self.failed(),
                total,
                failures.join(", ")
            ));
        }

        report
    }
}

/// Message for a batch where every file ended up in `category`
fn single_message(category: Category, total: usize) -> String {
    let scope = if total == 1 {
        "the file".to_string()
    } else {
        format!("all {} files", total)
    };

    match category {
        Category::Merged if total == 1 => "Subtitles have been merged successfully".to_string(),
        Category::Merged => format!("Subtitles have been merged successfully for {}", scope),
        Category::NoSelection => format!("Upper and lower subtitles are not selected for {}", scope),
        Category::Duplicate => format!("Merged subtitles already exist for {}", scope),
        Category::NoAgreement => format!("Overwrite was not confirmed for {}", scope),
        Category::Canceled => format!("Merge was canceled for {}", scope),
        Category::FailedToLoad => format!("Failed to load subtitles for {}", scope),
        Category::NotEnoughSpace => format!("Not enough temporary space to merge {}", scope),
        Category::Io => format!("Failed to write merged subtitles for {}", scope),
        Category::Tool => format!("Media tool failed for {}", scope),
    }
}
