use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One question / candidate answer pair to be graded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Stable identifier, unique within a dataset
    pub id: String,
    /// Question text
    #[serde(rename = "instruction", default)]
    pub question: String,
    /// Reference answer, when the dataset provides one
    #[serde(default)]
    pub reference: Option<String>,
    /// Primary grouping label
    #[serde(default)]
    pub parent_class: Option<String>,
    /// Secondary grouping label
    #[serde(default)]
    pub subclass: Option<String>,
    /// Candidate answer produced by the model under test
    #[serde(rename = "model_ans", default)]
    pub answer: String,
    /// Provenance label, carried through untouched
    #[serde(default)]
    pub source: Option<String>,
}

impl Row {
    /// Reference answer if it carries any non-whitespace text
    pub fn reference_text(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .filter(|reference| !reference.trim().is_empty())
    }
}

/// Result of grading a single row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingOutcome {
    /// Score in [0.0, 1.0]
    pub score: f64,
    /// Normalized justification, at most 150 characters plus an ellipsis
    pub reason: String,
    /// Raw judge output kept for auditing
    pub raw_output: String,
}

/// A row together with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    pub row: Row,
    pub outcome: GradingOutcome,
}

/// Rows of a dataset extended with one outcome each, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredDataset {
    pub rows: Vec<ScoredRow>,
}

impl ScoredDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Scores in row order
    pub fn scores(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.outcome.score).collect()
    }
}

/// Figures over every scored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallStatistics {
    pub average_score: f64,
    pub total_questions: usize,
    pub max_score: f64,
    pub min_score: f64,
}

/// Figures for one category label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatistics {
    pub average_score: f64,
    pub count: usize,
}

/// Summary of a scored dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    /// Absent when nothing was scored
    pub overall: Option<OverallStatistics>,
    pub by_parent_class: BTreeMap<String, GroupStatistics>,
    pub by_sub_class: BTreeMap<String, GroupStatistics>,
}

/// Per-file entry of the completion message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub file_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub output_path: String,
    pub statistics: StatisticsReport,
}

/// One figure from the base and the compare file, with `compare - base`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub base: f64,
    pub compare: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountDelta {
    pub base: usize,
    pub compare: usize,
    pub delta: i64,
}

/// Overall figures of two files side by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallDelta {
    pub average_score: ScoreDelta,
    pub max_score: ScoreDelta,
    pub min_score: ScoreDelta,
    pub total_questions: CountDelta,
}

/// Comparison of the `base` file of a run against its `compare` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(rename = "baseFile")]
    pub base_file: String,
    #[serde(rename = "compareFile")]
    pub compare_file: String,
    /// Absent when either side scored nothing
    pub overall: Option<OverallDelta>,
    /// Average score per label; a label missing on one side counts as 0.0 there
    pub by_parent_class: BTreeMap<String, ScoreDelta>,
    pub by_sub_class: BTreeMap<String, ScoreDelta>,
}
