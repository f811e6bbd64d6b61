use crate::models::{
    GroupStatistics, OverallStatistics, Row, ScoredDataset, StatisticsReport,
};
use std::collections::BTreeMap;

/// Summarize a scored dataset; empty input gives an empty report
pub fn summarize(scored: &ScoredDataset) -> StatisticsReport {
    let scores = scored.scores();
    if scores.is_empty() {
        return StatisticsReport::default();
    }

    StatisticsReport {
        overall: Some(overall_statistics(&scores)),
        by_parent_class: group_statistics(scored, |row| row.parent_class.as_deref()),
        by_sub_class: group_statistics(scored, |row| row.subclass.as_deref()),
    }
}

fn overall_statistics(scores: &[f64]) -> OverallStatistics {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);

    OverallStatistics {
        average_score: round3(calculate_mean(scores)),
        total_questions: scores.len(),
        max_score: round3(max),
        min_score: round3(min),
    }
}

/// Group scores by a label, skipping rows without one
fn group_statistics<F>(scored: &ScoredDataset, label: F) -> BTreeMap<String, GroupStatistics>
where
    F: Fn(&Row) -> Option<&str>,
{
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for scored_row in &scored.rows {
        let Some(name) = label(&scored_row.row).map(str::trim).filter(|l| !l.is_empty()) else {
            continue;
        };
        groups
            .entry(name.to_string())
            .or_default()
            .push(scored_row.outcome.score);
    }

    groups
        .into_iter()
        .map(|(name, scores)| {
            let stats = GroupStatistics {
                average_score: round3(calculate_mean(&scores)),
                count: scores.len(),
            };
            (name, stats)
        })
        .collect()
}

/// Mean of a non-empty slice, computed at full precision
fn calculate_mean(scores: &[f64]) -> f64 {
    let sum: f64 = scores.iter().sum();
    sum / scores.len() as f64
}

/// Round to three decimals for presentation
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
