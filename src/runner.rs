use crate::config::EvaluationSettings;
use crate::dataset::{self, Dataset, DatasetError};
use crate::judge::{Judge, call_judge, failure_sentinel};
use crate::models::{FileReport, GradingOutcome, Row, ScoredDataset, ScoredRow};
use crate::parser;
use crate::prompt::PromptBuilder;
use crate::statistics;
use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Receives a notification each time a row finishes grading
pub trait ProgressReporter {
    /// `completed` counts rows finished so far in the current dataset
    fn row_completed(&self, completed: usize);
}

/// One input file named on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct FileJob {
    pub path: PathBuf,
    /// Label reported back to the caller and used to name the copied result
    pub name: String,
    pub kind: String,
}

impl FileJob {
    /// Split `path label kind` triples
    pub fn from_args(args: &[String]) -> Result<Vec<FileJob>> {
        if args.is_empty() || args.len() % 3 != 0 {
            anyhow::bail!(
                "expected one or more <file_path> <file_name> <file_type> triples, got {} argument(s)",
                args.len()
            );
        }

        Ok(args
            .chunks(3)
            .map(|triple| FileJob {
                path: PathBuf::from(&triple[0]),
                name: triple[1].clone(),
                kind: triple[2].clone(),
            })
            .collect())
    }
}

/// Rows a loaded file contributes to the run
#[derive(Debug, Clone, PartialEq)]
pub enum JobInput {
    /// Rows still to be sent to the judge
    Ungraded(Dataset),
    /// Rows whose existing scores are summarized as they are
    Scored(ScoredDataset),
}

impl JobInput {
    pub fn len(&self) -> usize {
        match self {
            JobInput::Ungraded(dataset) => dataset.len(),
            JobInput::Scored(scored) => scored.len(),
        }
    }

    /// Rows that will need a judge call
    pub fn pending_rows(&self) -> usize {
        match self {
            JobInput::Ungraded(dataset) => dataset.len(),
            JobInput::Scored(_) => 0,
        }
    }
}

/// A validated file ready to be graded or summarized
#[derive(Debug, Clone)]
pub struct LoadedJob {
    pub job: FileJob,
    pub input: JobInput,
}

/// Load and validate every file before any judge call is made.
///
/// With `reuse_scores`, a table that already has a `score` column is read as
/// scored and never reaches the judge.
pub fn load_jobs(jobs: &[FileJob], reuse_scores: bool) -> Result<Vec<LoadedJob>> {
    jobs.iter()
        .map(|job| {
            let input = load_input(&job.path, reuse_scores)
                .with_context(|| format!("Invalid dataset {}", job.path.display()))?;
            info!(
                file = %job.path.display(),
                rows = input.len(),
                scored = matches!(input, JobInput::Scored(_)),
                "dataset validated"
            );
            Ok(LoadedJob {
                job: job.clone(),
                input,
            })
        })
        .collect()
}

fn load_input(path: &Path, reuse_scores: bool) -> Result<JobInput, DatasetError> {
    if reuse_scores && dataset::has_score_column(path)? {
        return Ok(JobInput::Scored(dataset::read_scored_csv(path)?));
    }
    Ok(JobInput::Ungraded(Dataset::from_csv(path)?))
}

/// Wait for a permit, then call the judge while holding it
async fn call_with_permit<J: Judge + ?Sized>(judge: &J, semaphore: &Semaphore, prompt: &str) -> String {
    match semaphore.acquire().await {
        Ok(_permit) => call_judge(judge, prompt).await,
        Err(_) => {
            warn!("judge permits closed, row degraded");
            failure_sentinel()
        }
    }
}

/// Drives grading of whole datasets against one judge
pub struct Runner<J> {
    judge: J,
    settings: EvaluationSettings,
    prompts: PromptBuilder,
}

impl<J: Judge> Runner<J> {
    pub fn new(judge: J, settings: EvaluationSettings) -> Self {
        let prompts = PromptBuilder::new(settings.honor_reference);
        Self {
            judge,
            settings,
            prompts,
        }
    }

    /// Grade every row, keeping input order in the result.
    ///
    /// Rows are taken in batches of `batch_size`. The rows of a batch are
    /// polled together on the current task, at most
    /// `min(max_concurrency, 24)` of them inside a judge call at once, and
    /// the next batch starts only once the previous one has fully finished.
    pub async fn evaluate(&self, dataset: &Dataset, progress: &dyn ProgressReporter) -> ScoredDataset {
        let semaphore = Semaphore::new(self.settings.effective_concurrency());
        let completed = AtomicUsize::new(0);
        let batch_size = self.settings.batch_size.max(1);
        let mut outcomes: Vec<GradingOutcome> = Vec::with_capacity(dataset.len());

        for (batch_index, batch) in dataset.rows().chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            debug!(batch = batch_index, rows = batch.len(), "grading batch");

            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .map(|(i, row)| self.grade_row(offset + i, row, &semaphore, &completed, progress))
                .collect();

            let mut results = Vec::with_capacity(batch.len());
            while let Some(result) = pending.next().await {
                results.push(result);
            }

            // completion order is arbitrary
            results.sort_by_key(|(index, _)| *index);
            outcomes.extend(results.into_iter().map(|(_, outcome)| outcome));
        }

        let rows = dataset
            .rows()
            .iter()
            .cloned()
            .zip(outcomes)
            .map(|(row, outcome)| ScoredRow { row, outcome })
            .collect();

        ScoredDataset { rows }
    }

    /// Build, call and parse for a single row
    async fn grade_row(
        &self,
        index: usize,
        row: &Row,
        semaphore: &Semaphore,
        completed: &AtomicUsize,
        progress: &dyn ProgressReporter,
    ) -> (usize, GradingOutcome) {
        let prompt = self.prompts.build(row);
        debug!(row = index, variant = ?self.prompts.variant(row), "prompt built");

        let raw_output = call_with_permit(&self.judge, semaphore, &prompt).await;

        let (score, reason) = parser::extract(&raw_output);
        debug!(row = index, id = %row.id, score, "row graded");

        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        progress.row_completed(done);

        (
            index,
            GradingOutcome {
                score,
                reason,
                raw_output,
            },
        )
    }

    /// Grade each loaded file in turn and persist its results
    pub async fn grade_loaded(
        &self,
        loaded: &[LoadedJob],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<FileReport>> {
        let mut reports = Vec::with_capacity(loaded.len());

        for LoadedJob { job, input } in loaded {
            let report = match input {
                JobInput::Ungraded(dataset) => {
                    info!(file = %job.path.display(), rows = dataset.len(), "grading file");
                    let scored = self.evaluate(dataset, progress).await;
                    debug!(file = %job.path.display(), rows = scored.len(), "file graded");
                    self.store_results(job, &scored)?
                }
                JobInput::Scored(scored) => {
                    info!(file = %job.path.display(), rows = scored.len(), "reusing existing scores");
                    summarize_existing(job, scored)?
                }
            };
            reports.push(report);
        }

        Ok(reports)
    }

    /// Write scored table and summary next to the input, then copy the table
    /// into the completed-files directory
    fn store_results(&self, job: &FileJob, scored: &ScoredDataset) -> Result<FileReport> {
        let statistics = statistics::summarize(scored);

        let scored_file = dataset::scored_path(&job.path);
        dataset::write_scored_csv(&scored_file, scored)?;
        dataset::write_summary(&dataset::summary_path(&job.path), &statistics)?;

        let output_path = self.copy_to_completed(&scored_file, &job.name)?;
        info!(file = %job.path.display(), output = %output_path.display(), "results stored");

        Ok(FileReport {
            file_name: job.name.clone(),
            kind: job.kind.clone(),
            output_path: output_path.display().to_string(),
            statistics,
        })
    }

    fn copy_to_completed(&self, scored_file: &Path, label: &str) -> Result<PathBuf> {
        let dir = &self.settings.completed_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let base = Path::new(label)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let target = dir.join(format!("{}_scored_{}.csv", base, &unique[..8]));

        std::fs::copy(scored_file, &target).with_context(|| {
            format!("Failed to copy {} to {}", scored_file.display(), target.display())
        })?;

        Ok(target)
    }
}

/// Summary for a table graded earlier; the table itself is left untouched
fn summarize_existing(job: &FileJob, scored: &ScoredDataset) -> Result<FileReport> {
    let statistics = statistics::summarize(scored);
    dataset::write_summary(&dataset::summary_path(&job.path), &statistics)?;

    Ok(FileReport {
        file_name: job.name.clone(),
        kind: job.kind.clone(),
        output_path: job.path.display().to_string(),
        statistics,
    })
}
