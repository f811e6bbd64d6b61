use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod comparison;
mod config;
mod dataset;
mod judge;
mod models;
mod output;
mod parser;
mod prompt;
mod runner;
mod statistics;

use crate::config::Config;
use crate::judge::{JudgeProfile, ProfileJudge};
use crate::models::FileReport;
use crate::output::{OutputFormat, RunMessage};
use crate::runner::{FileJob, Runner};

/// Medical answer grader - score model answers with a judge model and summarize the results
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Judge profile: Deepseek or GPT-oss
    judge: String,

    /// One or more `<file_path> <file_name> <file_type>` triples
    #[arg(required = true, num_args = 1..)]
    files: Vec<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: json or plain
    #[arg(short, long, default_value = "json")]
    output: OutputFormat,

    /// Maximum simultaneous judge calls (capped at 24)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Grade against reference answers when rows provide them
    #[arg(long)]
    honor_reference: bool,

    /// Summarize files that already have a score column instead of grading them again
    #[arg(long)]
    reuse_scores: bool,

    /// Verbose output - log every batch and row
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let message = RunMessage::Error {
                message: err.to_string().trim().to_string(),
            };
            output::print_message(&message, OutputFormat::Json);
            std::process::exit(2);
        }
    };

    init_tracing(args.verbose);
    let format = args.output;

    match run(args).await {
        Ok(results) => output::print_message(&RunMessage::complete(results), format),
        Err(err) => {
            output::print_message(&RunMessage::error(&err), format);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<Vec<FileReport>> {
    let profile: JudgeProfile = args.judge.parse()?;
    let jobs = FileJob::from_args(&args.files)?;

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(concurrency) = args.concurrency {
        config.evaluation.max_concurrency = concurrency;
    }
    if args.honor_reference {
        config.evaluation.honor_reference = true;
    }
    if args.reuse_scores {
        config.evaluation.reuse_scores = true;
    }

    let loaded = runner::load_jobs(&jobs, config.evaluation.reuse_scores)?;
    let total_rows: usize = loaded.iter().map(|loaded| loaded.input.pending_rows()).sum();

    let judge = ProfileJudge::from_config(profile, &config)?;
    let runner = Runner::new(judge, config.evaluation.clone());

    let bar = output::progress_bar(total_rows as u64);
    let results = runner.grade_loaded(&loaded, &bar).await;
    bar.finish_and_clear();

    results
}

/// Logs go to stderr so stdout carries only the run message
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCORED_HEADER: &str =
        "id,instruction,reference,parent_class,subclass,model_ans,source,score,reason,teacher_model_output\n";

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("grader").chain(args.iter().copied()))
    }

    #[test]
    fn test_args_parsing() {
        let args = parse(&[
            "GPT-oss", "a.csv", "A", "exam", "--concurrency", "30", "--honor-reference", "-o", "plain",
        ])
        .unwrap();

        assert_eq!(args.judge, "GPT-oss");
        assert_eq!(args.files, vec!["a.csv", "A", "exam"]);
        assert_eq!(args.concurrency, Some(30));
        assert!(args.honor_reference);
        assert!(!args.reuse_scores);
        assert!(matches!(args.output, OutputFormat::Plain));
    }

    #[test]
    fn test_args_require_files() {
        assert!(parse(&["Deepseek"]).is_err());
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_profile() {
        let args = parse(&["Claude", "a.csv", "A", "exam"]).unwrap();
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("unsupported judge profile"));
    }

    #[tokio::test]
    async fn test_run_rejects_incomplete_triples() {
        let args = parse(&["Deepseek", "a.csv", "A"]).unwrap();
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("triples"));
    }

    #[tokio::test]
    async fn test_run_rejects_missing_file_before_grading() {
        let args = parse(&["Deepseek", "/nonexistent/rows.csv", "rows", "exam"]).unwrap();
        let err = run(args).await.unwrap_err();
        assert!(format!("{err:#}").contains("Invalid dataset"));
    }

    #[tokio::test]
    async fn test_run_stops_on_bad_file_without_writing() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.csv");
        let empty = dir.path().join("empty.csv");
        std::fs::write(
            &good,
            "id,instruction,reference,parent_class,subclass,model_ans,source\n1,q,,A,x,a,src\n",
        )
        .unwrap();
        std::fs::write(&empty, "id,instruction,reference,parent_class,subclass,model_ans,source\n").unwrap();

        let good_arg = good.display().to_string();
        let empty_arg = empty.display().to_string();
        let args = parse(&["Deepseek", good_arg.as_str(), "good", "base", empty_arg.as_str(), "empty", "compare"]).unwrap();

        let err = run(args).await.unwrap_err();
        assert!(format!("{err:#}").contains("no data rows"));
        assert!(!dir.path().join("good_scored.csv").exists());
        assert!(!dir.path().join("good_summary.json").exists());
    }

    #[tokio::test]
    async fn test_run_compares_reused_scores() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.csv");
        let compare = dir.path().join("compare.csv");
        std::fs::write(
            &base,
            format!("{SCORED_HEADER}1,q1,,cardio,x,a,src,0.5,,\n2,q2,,neuro,x,a,src,0.5,,\n"),
        )
        .unwrap();
        std::fs::write(
            &compare,
            format!("{SCORED_HEADER}1,q1,,cardio,x,a,src,1.0,,\n2,q2,,neuro,x,a,src,0.0,,\n3,q3,,cardio,,a,src,1.0,,\n"),
        )
        .unwrap();

        let base_arg = base.display().to_string();
        let compare_arg = compare.display().to_string();
        let args = parse(&[
            "GPT-oss", "--reuse-scores", base_arg.as_str(), "Old model", "base", compare_arg.as_str(), "New model", "compare",
        ])
        .unwrap();
        assert!(args.reuse_scores);

        let results = run(args).await.unwrap();
        let RunMessage::Complete { results, comparison } = RunMessage::complete(results) else {
            panic!("expected a completion message");
        };

        assert_eq!(results.len(), 2);
        let comparison = comparison.unwrap();
        assert_eq!(comparison.base_file, "Old model");
        assert_eq!(comparison.compare_file, "New model");

        let overall = comparison.overall.unwrap();
        assert_eq!(overall.average_score.delta, 0.167);
        assert_eq!(overall.total_questions.delta, 1);
        assert_eq!(comparison.by_parent_class["cardio"].delta, 0.5);
        assert_eq!(comparison.by_parent_class["neuro"].delta, -0.5);
        assert_eq!(comparison.by_sub_class["x"].delta, 0.0);
    }
}
