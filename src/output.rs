use crate::comparison;
use crate::models::{Comparison, FileReport, ScoreDelta, StatisticsReport};
use crate::runner::ProgressReporter;
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// The single message a run reports to its caller
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunMessage {
    Complete {
        results: Vec<FileReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        comparison: Option<Comparison>,
    },
    Error { message: String },
}

impl RunMessage {
    /// Completion message, comparing the `base` and `compare` files when both are present
    pub fn complete(results: Vec<FileReport>) -> Self {
        let comparison = comparison::compare_reports(&results);
        RunMessage::Complete { results, comparison }
    }


    pub fn error(err: &anyhow::Error) -> Self {
        RunMessage::Error {
            message: format!("{err:#}"),
        }
    }
}

/// Print the run message in the specified format
pub fn print_message(message: &RunMessage, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(message),
        OutputFormat::Plain => print_plain(message),
    }
}

/// One JSON line on stdout
fn print_json(message: &RunMessage) {
    match serde_json::to_string(message) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing message to JSON: {}", e),
    }
}

fn print_plain(message: &RunMessage) {
    match message {
        RunMessage::Error { message } => println!("Error: {}", message),
        RunMessage::Complete {
            results,
            comparison,
        } => {
            for (i, report) in results.iter().enumerate() {
                println!("=== {} ({}) ===", report.file_name, report.kind);
                println!("Output: {}", report.output_path);
                println!();
                print!("{}", render_statistics(&report.statistics));

                if i < results.len() - 1 {
                    println!("{}", "=".repeat(50));
                    println!();
                }
            }

            if let Some(comparison) = comparison {
                println!("{}", "=".repeat(50));
                println!();
                print!("{}", render_comparison(comparison));
            }
        }
    }
}

/// Render a statistics report as plain-text tables
pub fn render_statistics(stats: &StatisticsReport) -> String {
    let Some(overall) = &stats.overall else {
        return "No statistics available.\n".to_string();
    };

    let mut out = String::new();
    out.push_str("OVERALL\n-------\n");
    out.push_str(&format!("{:<15} {:.3}\n", "Average", overall.average_score));
    out.push_str(&format!("{:<15} {}\n", "Questions", overall.total_questions));
    out.push_str(&format!("{:<15} {:.3}\n", "Max", overall.max_score));
    out.push_str(&format!("{:<15} {:.3}\n", "Min", overall.min_score));

    for (title, groups) in [
        ("BY PARENT CLASS", &stats.by_parent_class),
        ("BY SUBCLASS", &stats.by_sub_class),
    ] {
        if groups.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(&format!("{}\n{}\n", title, "-".repeat(title.len())));
        out.push_str(&format!("{:<24} {:<8} {:<6}\n", "Label", "Average", "Count"));
        for (label, group) in groups {
            out.push_str(&format!(
                "{:<24} {:<8.3} {:<6}\n",
                label, group.average_score, group.count
            ));
        }
    }
    out.push('\n');
    out
}

/// Render base-versus-compare tables; deltas are `compare - base`
pub fn render_comparison(comparison: &Comparison) -> String {
    let mut out = format!(
        "COMPARISON: {} (base) vs {} (compare)\n",
        comparison.base_file, comparison.compare_file
    );

    if let Some(overall) = &comparison.overall {
        out.push_str(&format!(
            "\n{:<24} {:>8} {:>8} {:>8}\n",
            "Metric", "Base", "Compare", "Delta"
        ));
        for (metric, delta) in [
            ("Average", &overall.average_score),
            ("Max", &overall.max_score),
            ("Min", &overall.min_score),
        ] {
            out.push_str(&delta_line(metric, delta));
        }
        let questions = &overall.total_questions;
        out.push_str(&format!(
            "{:<24} {:>8} {:>8} {:>+8}\n",
            "Questions", questions.base, questions.compare, questions.delta
        ));
    }

    for (title, deltas) in [
        ("BY PARENT CLASS", &comparison.by_parent_class),
        ("BY SUBCLASS", &comparison.by_sub_class),
    ] {
        if deltas.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(&format!("{}\n{}\n", title, "-".repeat(title.len())));
        out.push_str(&format!(
            "{:<24} {:>8} {:>8} {:>8}\n",
            "Label", "Base", "Compare", "Delta"
        ));
        for (label, delta) in deltas {
            out.push_str(&delta_line(label, delta));
        }
    }
    out.push('\n');
    out
}

fn delta_line(label: &str, delta: &ScoreDelta) -> String {
    format!(
        "{:<24} {:>8.3} {:>8.3} {:>+8.3}\n",
        label, delta.base, delta.compare, delta.delta
    )
}

/// Overall progress bar across every file of a run, drawn on stderr
pub fn progress_bar(total_rows: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_rows);
    if let Ok(style) =
        ProgressStyle::with_template("Overall Progress {bar:40} {pos}/{len} questions [{elapsed_precise}]")
    {
        bar.set_style(style);
    }
    bar
}

impl ProgressReporter for ProgressBar {
    fn row_completed(&self, _completed: usize) {
        self.inc(1);
    }
}
