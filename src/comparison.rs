use crate::models::{
    Comparison, CountDelta, FileReport, GroupStatistics, OverallDelta, OverallStatistics,
    ScoreDelta,
};
use crate::statistics::round3;
use std::collections::{BTreeMap, BTreeSet};

/// File type marking the reference side of a comparison
pub const BASE_KIND: &str = "base";
/// File type marking the side measured against the base
pub const COMPARE_KIND: &str = "compare";

/// Compare the first `base` report of a run with its first `compare` report
pub fn compare_reports(reports: &[FileReport]) -> Option<Comparison> {
    let base = find_kind(reports, BASE_KIND)?;
    let compare = find_kind(reports, COMPARE_KIND)?;
    Some(compare_pair(base, compare))
}

fn find_kind<'a>(reports: &'a [FileReport], kind: &str) -> Option<&'a FileReport> {
    reports
        .iter()
        .find(|report| report.kind.trim().eq_ignore_ascii_case(kind))
}

fn compare_pair(base: &FileReport, compare: &FileReport) -> Comparison {
    let (base_stats, compare_stats) = (&base.statistics, &compare.statistics);

    let overall = match (&base_stats.overall, &compare_stats.overall) {
        (Some(b), Some(c)) => Some(overall_delta(b, c)),
        _ => None,
    };

    Comparison {
        base_file: base.file_name.clone(),
        compare_file: compare.file_name.clone(),
        overall,
        by_parent_class: label_deltas(&base_stats.by_parent_class, &compare_stats.by_parent_class),
        by_sub_class: label_deltas(&base_stats.by_sub_class, &compare_stats.by_sub_class),
    }
}

fn overall_delta(base: &OverallStatistics, compare: &OverallStatistics) -> OverallDelta {
    OverallDelta {
        average_score: score_delta(base.average_score, compare.average_score),
        max_score: score_delta(base.max_score, compare.max_score),
        min_score: score_delta(base.min_score, compare.min_score),
        total_questions: CountDelta {
            base: base.total_questions,
            compare: compare.total_questions,
            delta: compare.total_questions as i64 - base.total_questions as i64,
        },
    }
}

fn score_delta(base: f64, compare: f64) -> ScoreDelta {
    ScoreDelta {
        base,
        compare,
        delta: round3(compare - base),
    }
}

/// Average per label over the union of both sides
fn label_deltas(
    base: &BTreeMap<String, GroupStatistics>,
    compare: &BTreeMap<String, GroupStatistics>,
) -> BTreeMap<String, ScoreDelta> {
    let labels: BTreeSet<&String> = base.keys().chain(compare.keys()).collect();
    let average = |groups: &BTreeMap<String, GroupStatistics>, label: &String| {
        groups.get(label).map_or(0.0, |g| g.average_score)
    };

    labels
        .into_iter()
        .map(|label| {
            let delta = score_delta(average(base, label), average(compare, label));
            (label.clone(), delta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatisticsReport;

    fn group(average_score: f64, count: usize) -> GroupStatistics {
        GroupStatistics { average_score, count }
    }

    fn report(name: &str, kind: &str, average: f64, total: usize, parents: &[(&str, f64)]) -> FileReport {
        FileReport {
            file_name: name.to_string(),
            kind: kind.to_string(),
            output_path: format!("completed-files/{name}"),
            statistics: StatisticsReport {
                overall: Some(OverallStatistics {
                    average_score: average,
                    total_questions: total,
                    max_score: 1.0,
                    min_score: 0.0,
                }),
                by_parent_class: parents
                    .iter()
                    .map(|(label, avg)| (label.to_string(), group(*avg, 1)))
                    .collect(),
                by_sub_class: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_compare_base_against_compare() {
        let reports = vec![
            report("old.csv", "base", 0.5, 4, &[("cardiology", 0.75), ("neurology", 0.25)]),
            report("new.csv", "compare", 0.7, 5, &[("cardiology", 0.5), ("oncology", 0.9)]),
        ];

        let comparison = compare_reports(&reports).unwrap();
        assert_eq!(comparison.base_file, "old.csv");
        assert_eq!(comparison.compare_file, "new.csv");

        let overall = comparison.overall.unwrap();
        assert_eq!(overall.average_score, ScoreDelta { base: 0.5, compare: 0.7, delta: 0.2 });
        assert_eq!(overall.max_score.delta, 0.0);
        assert_eq!(overall.total_questions.delta, 1);

        let parents = &comparison.by_parent_class;
        assert_eq!(parents.len(), 3);
        assert_eq!(parents["cardiology"].delta, -0.25);
        assert_eq!(parents["neurology"], ScoreDelta { base: 0.25, compare: 0.0, delta: -0.25 });
        assert_eq!(parents["oncology"], ScoreDelta { base: 0.0, compare: 0.9, delta: 0.9 });
        assert!(comparison.by_sub_class.is_empty());
    }

    #[test]
    fn test_order_and_case_of_kinds_do_not_matter() {
        let reports = vec![
            report("new.csv", "Compare", 0.3, 2, &[]),
            report("other.csv", "exam", 0.9, 2, &[]),
            report("old.csv", " BASE ", 0.1, 3, &[]),
        ];

        let comparison = compare_reports(&reports).unwrap();
        assert_eq!(comparison.base_file, "old.csv");
        assert_eq!(comparison.overall.unwrap().average_score.delta, 0.2);
    }

    #[test]
    fn test_no_comparison_without_both_sides() {
        assert!(compare_reports(&[report("a.csv", "base", 0.5, 1, &[])]).is_none());
        assert!(compare_reports(&[report("b.csv", "exam", 0.5, 1, &[])]).is_none());
        assert!(compare_reports(&[]).is_none());
    }

    #[test]
    fn test_empty_side_has_no_overall() {
        let mut base = report("old.csv", "base", 0.5, 1, &[]);
        base.statistics = StatisticsReport::default();
        let reports = vec![base, report("new.csv", "compare", 0.5, 1, &[("a", 1.0)])];

        let comparison = compare_reports(&reports).unwrap();
        assert!(comparison.overall.is_none());
        assert_eq!(comparison.by_parent_class["a"].delta, 1.0);
    }
}
