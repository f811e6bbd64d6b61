use crate::models::{GradingOutcome, Row, ScoredDataset, ScoredRow, StatisticsReport};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Columns every input table must expose
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "id",
    "instruction",
    "reference",
    "parent_class",
    "subclass",
    "model_ans",
    "source",
];

/// Column holding a previously assigned score
pub const SCORE_COLUMN: &str = "score";

/// Reasons a dataset is rejected before grading starts
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("dataset has no data rows")]
    Empty,
    #[error("duplicate row id: {0}")]
    DuplicateId(String),
}

/// Ordered, validated collection of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset, rejecting empty input and repeated identifiers
    pub fn new(rows: Vec<Row>) -> Result<Self, DatasetError> {
        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert(row.id.as_str()) {
                return Err(DatasetError::DuplicateId(row.id.clone()));
            }
        }

        Ok(Self { rows })
    }

    /// Read and validate a CSV table
    pub fn from_csv(path: &Path) -> Result<Self, DatasetError> {
        let mut reader = open_reader(path)?;
        let headers = reader.headers().map_err(read_err(path))?.clone();
        check_columns(&headers, &REQUIRED_COLUMNS)?;

        let rows = reader
            .deserialize::<Row>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err(path))?;

        Self::new(rows)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

fn read_err(path: &Path) -> impl Fn(csv::Error) -> DatasetError + '_ {
    move |source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    }
}

/// Header names are trimmed here so validation and deserialization agree
fn open_reader(path: &Path) -> Result<csv::Reader<File>, DatasetError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(read_err(path))
}

fn check_columns(headers: &csv::StringRecord, required: &[&str]) -> Result<(), DatasetError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| column.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatasetError::MissingColumns(missing))
    }
}

/// Whether a table already carries a `score` column
pub fn has_score_column(path: &Path) -> Result<bool, DatasetError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(read_err(path))?;
    Ok(headers.iter().any(|h| h == SCORE_COLUMN))
}

/// One row of a table that was graded before
#[derive(Deserialize)]
struct ScoredInput {
    id: String,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    parent_class: Option<String>,
    #[serde(default)]
    subclass: Option<String>,
    #[serde(default)]
    model_ans: String,
    #[serde(default)]
    source: Option<String>,
    score: f64,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    teacher_model_output: Option<String>,
}

impl From<ScoredInput> for ScoredRow {
    fn from(input: ScoredInput) -> Self {
        ScoredRow {
            row: Row {
                id: input.id,
                question: input.instruction,
                reference: input.reference,
                parent_class: input.parent_class,
                subclass: input.subclass,
                answer: input.model_ans,
                source: input.source,
            },
            outcome: GradingOutcome {
                score: input.score,
                reason: input.reason.unwrap_or_default(),
                raw_output: input.teacher_model_output.unwrap_or_default(),
            },
        }
    }
}

/// Read a table whose rows already carry scores, validated like a fresh one
pub fn read_scored_csv(path: &Path) -> Result<ScoredDataset, DatasetError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(read_err(path))?.clone();
    check_columns(&headers, &REQUIRED_COLUMNS)?;
    check_columns(&headers, &[SCORE_COLUMN])?;

    let rows: Vec<ScoredRow> = reader
        .deserialize::<ScoredInput>()
        .map(|input| input.map(ScoredRow::from))
        .collect::<Result<_, _>>()
        .map_err(read_err(path))?;

    Dataset::new(rows.iter().map(|r| r.row.clone()).collect())?;
    Ok(ScoredDataset { rows })
}

#[derive(Serialize)]
struct ScoredRecord<'a> {
    id: &'a str,
    instruction: &'a str,
    reference: Option<&'a str>,
    parent_class: Option<&'a str>,
    subclass: Option<&'a str>,
    model_ans: &'a str,
    source: Option<&'a str>,
    score: f64,
    reason: &'a str,
    teacher_model_output: &'a str,
}

/// `<dir>/<stem>_scored.csv` next to the input file
pub fn scored_path(input: &Path) -> PathBuf {
    sibling_with_suffix(input, "_scored.csv")
}

/// `<dir>/<stem>_summary.json` next to the input file
pub fn summary_path(input: &Path) -> PathBuf {
    sibling_with_suffix(input, "_summary.json")
}

fn sibling_with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    input.with_file_name(format!("{stem}{suffix}"))
}

/// Write the scored table as CSV
pub fn write_scored_csv(path: &Path, scored: &ScoredDataset) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create scored file: {}", path.display()))?;

    for scored_row in &scored.rows {
        let row = &scored_row.row;
        writer
            .serialize(ScoredRecord {
                id: &row.id,
                instruction: &row.question,
                reference: row.reference.as_deref(),
                parent_class: row.parent_class.as_deref(),
                subclass: row.subclass.as_deref(),
                model_ans: &row.answer,
                source: row.source.as_deref(),
                score: scored_row.outcome.score,
                reason: &scored_row.outcome.reason,
                teacher_model_output: &scored_row.outcome.raw_output,
            })
            .with_context(|| format!("Failed to write row {} to {}", row.id, path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush scored file: {}", path.display()))
}

/// Write the statistics report as pretty JSON
pub fn write_summary(path: &Path, report: &StatisticsReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize statistics report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write summary: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradingOutcome, ScoredRow};
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    const HEADER: &str = "id,instruction,reference,parent_class,subclass,model_ans,source\n";

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn row(id: &str) -> Row {
        Row {
            id: id.to_string(),
            question: format!("question {id}"),
            reference: None,
            parent_class: Some("cardiology".to_string()),
            subclass: None,
            answer: format!("answer {id}"),
            source: None,
        }
    }

    #[test]
    fn test_load_valid_csv() {
        let file = csv_file(&format!(
            "{HEADER}1,What lowers blood pressure?,ACE inhibitors,cardiology,drugs,Beta blockers,exam\n\
             2,Define sepsis,,infectious,,Systemic infection response,\n"
        ));

        let dataset = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset.rows()[0];
        assert_eq!(first.id, "1");
        assert_eq!(first.question, "What lowers blood pressure?");
        assert_eq!(first.reference_text(), Some("ACE inhibitors"));
        assert_eq!(first.answer, "Beta blockers");

        let second = &dataset.rows()[1];
        assert_eq!(second.reference, None);
        assert_eq!(second.subclass, None);
        assert_eq!(second.parent_class.as_deref(), Some("infectious"));
    }

    #[test]
    fn test_load_coerces_missing_text_to_empty() {
        let file = csv_file(&format!("{HEADER}7,,,a,b,,x\n"));
        let dataset = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(dataset.rows()[0].question, "");
        assert_eq!(dataset.rows()[0].answer, "");
    }

    #[test]
    fn test_missing_columns_rejected() {
        let file = csv_file("id,instruction,model_ans\n1,q,a\n");
        match Dataset::from_csv(file.path()) {
            Err(DatasetError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["reference", "parent_class", "subclass", "source"]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let file = csv_file(HEADER);
        assert!(matches!(Dataset::from_csv(file.path()), Err(DatasetError::Empty)));
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let file = csv_file(
            "id,instruction,reference,parent_class,subclass,model_ans,source,notes\n1,q,,p,s,a,src,extra\n",
        );
        let dataset = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_padded_headers_still_bind_fields() {
        let file = csv_file(
            "id, instruction ,reference,parent_class,subclass, model_ans,source\n1,q,,p,s,a,src\n",
        );
        let dataset = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(dataset.rows()[0].question, "q");
        assert_eq!(dataset.rows()[0].answer, "a");
    }

    #[test]
    fn test_bom_header_is_accepted() {
        let file = csv_file(&format!("\u{feff}{HEADER}1,q,,p,s,a,src\n"));
        let dataset = Dataset::from_csv(file.path()).unwrap();
        assert_eq!(dataset.rows()[0].id, "1");
    }

    #[test]
    fn test_read_scored_csv_reuses_scores() {
        let file = csv_file(
            "id,instruction,reference,parent_class,subclass,model_ans,source,score,reason,teacher_model_output\n\
             1,q1,,A,x,a1,src,0.8,Mostly right,raw\n\
             2,q2,,B,,a2,src,0.2,,\n",
        );

        assert!(has_score_column(file.path()).unwrap());
        let scored = read_scored_csv(file.path()).unwrap();
        assert_eq!(scored.scores(), vec![0.8, 0.2]);
        assert_eq!(scored.rows[0].outcome.reason, "Mostly right");
        assert_eq!(scored.rows[0].outcome.raw_output, "raw");
        assert_eq!(scored.rows[1].outcome.reason, "");
        assert_eq!(scored.rows[1].row.parent_class.as_deref(), Some("B"));
    }

    #[test]
    fn test_read_scored_csv_requires_score_column() {
        let file = csv_file(&format!("{HEADER}1,q,,p,s,a,src\n"));
        assert!(!has_score_column(file.path()).unwrap());
        match read_scored_csv(file.path()) {
            Err(DatasetError::MissingColumns(missing)) => assert_eq!(missing, vec!["score"]),
            other => panic!("expected missing score column, got {:?}", other),
        }
    }

    #[test]
    fn test_read_scored_csv_rejects_duplicate_ids() {
        let file = csv_file(
            "id,instruction,reference,parent_class,subclass,model_ans,source,score\n\
             1,q,,p,s,a,src,1.0\n1,q,,p,s,a,src,0.0\n",
        );
        assert!(matches!(read_scored_csv(file.path()), Err(DatasetError::DuplicateId(_))));
    }

    #[test]
    fn test_written_table_reads_back_as_scored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("again_scored.csv");
        let scored = ScoredDataset {
            rows: vec![ScoredRow {
                row: row("9"),
                outcome: GradingOutcome {
                    score: 0.5,
                    reason: "Half".to_string(),
                    raw_output: "text".to_string(),
                },
            }],
        };

        write_scored_csv(&path, &scored).unwrap();
        assert_eq!(read_scored_csv(&path).unwrap(), scored);
    }

    #[test]
    fn test_missing_file() {
        let result = Dataset::from_csv(Path::new("/nonexistent/rows.csv"));
        assert!(matches!(result, Err(DatasetError::Read { .. })));
    }

    #[test]
    fn test_new_rejects_empty_and_duplicates() {
        assert!(matches!(Dataset::new(vec![]), Err(DatasetError::Empty)));
        match Dataset::new(vec![row("1"), row("2"), row("1")]) {
            Err(DatasetError::DuplicateId(id)) => assert_eq!(id, "1"),
            other => panic!("expected duplicate id, got {:?}", other),
        }
    }

    #[test]
    fn test_output_paths() {
        let input = Path::new("/data/runs/cardio.csv");
        assert_eq!(scored_path(input), PathBuf::from("/data/runs/cardio_scored.csv"));
        assert_eq!(summary_path(input), PathBuf::from("/data/runs/cardio_summary.json"));
    }

    #[test]
    fn test_write_scored_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out_scored.csv");
        let scored = ScoredDataset {
            rows: vec![ScoredRow {
                row: row("1"),
                outcome: GradingOutcome {
                    score: 0.8,
                    reason: "Mostly correct".to_string(),
                    raw_output: "{\"student\": 0.8}\n{\"reason\": \"Mostly correct\"}".to_string(),
                },
            }],
        };

        write_scored_csv(&path, &scored).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(7), Some("score"));
        assert_eq!(headers.get(9), Some("teacher_model_output"));

        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.get(0), Some("1"));
        assert_eq!(record.get(2), Some(""));
        assert_eq!(record.get(7), Some("0.8"));
        assert_eq!(record.get(8), Some("Mostly correct"));
    }

    #[test]
    fn test_write_summary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_summary(&path, &StatisticsReport::default()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("by_parent_class"));
        assert!(content.contains("\"overall\": null"));
    }
}
