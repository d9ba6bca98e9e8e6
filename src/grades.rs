use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::models::GradeRecord;

pub const PASSING_MEAN: f64 = 6.0;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Subject,
    SubjectAndLabel,
}

/// `label` is always `None` when grouping by subject alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub subject_id: i64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub subject_id: i64,
    pub label: Option<String>,
    pub mean: f64,
    pub sample_count: usize,
    pub passed: bool,
}

impl AggregateResult {
    pub fn status(&self) -> Status {
        if self.passed {
            Status::Aprovado
        } else {
            Status::Reprovado
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Aprovado,
    Reprovado,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Aprovado => "Aprovado",
            Status::Reprovado => "Reprovado",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The numeric score of a record if it may take part in an average.
pub fn valid_score(record: &GradeRecord) -> Option<f64> {
    let value = record.score.as_ref()?.as_number()?;
    (value.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&value)).then_some(value)
}

pub fn invalid_scores(records: &[GradeRecord]) -> usize {
    records
        .iter()
        .filter(|record| valid_score(record).is_none())
        .count()
}

/// Averages scores per group. Records without a usable score are skipped
/// and groups with no contributing records never appear.
pub fn aggregate(records: &[GradeRecord], group_by: GroupBy) -> BTreeMap<GroupKey, AggregateResult> {
    let mut sums: BTreeMap<GroupKey, (f64, usize)> = BTreeMap::new();

    for record in records {
        let Some(score) = valid_score(record) else {
            continue;
        };

        let key = GroupKey {
            subject_id: record.subject_id,
            label: match group_by {
                GroupBy::Subject => None,
                GroupBy::SubjectAndLabel => record.label_key(),
            },
        };
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(key, (sum, count))| {
            let mean = sum / count as f64;
            let result = AggregateResult {
                subject_id: key.subject_id,
                label: key.label.clone(),
                mean,
                sample_count: count,
                passed: classify(mean) == Status::Aprovado,
            };
            (key, result)
        })
        .collect()
}

pub fn classify(mean: f64) -> Status {
    if mean >= PASSING_MEAN {
        Status::Aprovado
    } else {
        Status::Reprovado
    }
}

pub fn format_mean(mean: f64) -> String {
    format!("{mean:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawScore;

    fn record(subject_id: i64, label: Option<&str>, score: Option<RawScore>) -> GradeRecord {
        GradeRecord {
            id: None,
            student_id: 1,
            subject_id,
            subject_name: None,
            term: None,
            score,
            label: label.map(str::to_string),
        }
    }

    fn scored(subject_id: i64, label: Option<&str>, score: f64) -> GradeRecord {
        record(subject_id, label, Some(RawScore::Number(score)))
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(aggregate(&[], GroupBy::Subject).is_empty());
        assert!(aggregate(&[], GroupBy::SubjectAndLabel).is_empty());
    }

    #[test]
    fn mean_is_sum_over_count() {
        let records = vec![
            scored(4, Some("ATV 1"), 7.3),
            scored(4, Some("ATV 2"), 5.1),
            scored(4, None, 9.9),
            scored(4, Some("PR 1"), 0.0),
        ];
        let groups = aggregate(&records, GroupBy::Subject);
        let result = &groups[&GroupKey { subject_id: 4, label: None }];
        let expected = (7.3 + 5.1 + 9.9 + 0.0) / 4.0;
        assert!((result.mean - expected).abs() < 1e-9);
        assert_eq!(result.sample_count, 4);
    }

    #[test]
    fn out_of_range_and_non_numeric_scores_are_dropped() {
        let records = vec![
            scored(1, None, -1.0),
            scored(1, None, 11.0),
            scored(1, None, f64::NAN),
            scored(1, None, f64::INFINITY),
            record(1, None, Some(RawScore::Text("abc".to_string()))),
            record(1, None, None),
            scored(1, None, 8.0),
        ];
        let groups = aggregate(&records, GroupBy::Subject);
        assert_eq!(groups.len(), 1);
        let result = &groups[&GroupKey { subject_id: 1, label: None }];
        assert_eq!(result.mean, 8.0);
        assert_eq!(result.sample_count, 1);
        assert_eq!(invalid_scores(&records), 6);
    }

    #[test]
    fn invalid_scores_are_not_counted_as_zero() {
        let records = vec![
            record(2, None, Some(RawScore::Text("".to_string()))),
            scored(2, None, 6.0),
            scored(2, None, 8.0),
        ];
        let groups = aggregate(&records, GroupBy::Subject);
        let result = groups.values().next().unwrap();
        assert_eq!(result.mean, 7.0);
        assert_eq!(result.sample_count, 2);
    }

    #[test]
    fn subject_with_only_invalid_scores_has_no_group() {
        let records = vec![scored(3, None, 12.0), scored(5, None, 4.0)];
        let groups = aggregate(&records, GroupBy::Subject);
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key(&GroupKey { subject_id: 5, label: None }));
    }

    #[test]
    fn text_scores_within_range_are_used() {
        let records = vec![record(1, None, Some(RawScore::Text("7.5".to_string())))];
        let groups = aggregate(&records, GroupBy::Subject);
        assert_eq!(groups.values().next().unwrap().mean, 7.5);
    }

    #[test]
    fn grouping_mode_controls_label_split() {
        let records = vec![scored(1, Some("A"), 6.0), scored(1, Some("B"), 10.0)];

        let by_subject = aggregate(&records, GroupBy::Subject);
        assert_eq!(by_subject.len(), 1);
        assert_eq!(by_subject.values().next().unwrap().mean, 8.0);

        let by_label = aggregate(&records, GroupBy::SubjectAndLabel);
        assert_eq!(by_label.len(), 2);
        let a = &by_label[&GroupKey { subject_id: 1, label: Some("A".to_string()) }];
        let b = &by_label[&GroupKey { subject_id: 1, label: Some("B".to_string()) }];
        assert_eq!(a.mean, 6.0);
        assert_eq!(b.mean, 10.0);
    }

    #[test]
    fn missing_and_blank_labels_share_the_no_label_group() {
        let records = vec![
            scored(1, None, 4.0),
            scored(1, Some(""), 6.0),
            scored(1, Some("  "), 8.0),
            scored(1, Some(" ATV 1 "), 9.0),
            scored(1, Some("ATV 1"), 7.0),
        ];
        let groups = aggregate(&records, GroupBy::SubjectAndLabel);
        assert_eq!(groups.len(), 2);
        let unlabeled = &groups[&GroupKey { subject_id: 1, label: None }];
        assert_eq!(unlabeled.sample_count, 3);
        assert_eq!(unlabeled.mean, 6.0);
        let labeled = &groups[&GroupKey { subject_id: 1, label: Some("ATV 1".to_string()) }];
        assert_eq!(labeled.mean, 8.0);
    }

    #[test]
    fn subjects_are_kept_apart() {
        let records = vec![scored(1, None, 5.0), scored(2, None, 7.0), scored(1, None, 6.0)];
        let groups = aggregate(&records, GroupBy::Subject);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&GroupKey { subject_id: 1, label: None }].mean, 5.5);
        assert!(!groups[&GroupKey { subject_id: 1, label: None }].passed);
        assert!(groups[&GroupKey { subject_id: 2, label: None }].passed);
    }

    #[test]
    fn arrival_order_does_not_change_results() {
        let mut records = vec![
            scored(1, Some("A"), 2.5),
            scored(2, None, 9.0),
            scored(1, Some("A"), 7.5),
            scored(1, Some("B"), 6.0),
        ];
        let forward = aggregate(&records, GroupBy::SubjectAndLabel);
        records.reverse();
        let backward = aggregate(&records, GroupBy::SubjectAndLabel);
        assert_eq!(forward.len(), backward.len());
        for (key, result) in &forward {
            assert!((result.mean - backward[key].mean).abs() < 1e-9);
            assert_eq!(result.sample_count, backward[key].sample_count);
        }
    }

    #[test]
    fn repeated_aggregation_is_identical() {
        let records = vec![scored(1, Some("A"), 0.1), scored(1, Some("A"), 0.2), scored(3, None, 9.7)];
        let first = aggregate(&records, GroupBy::SubjectAndLabel);
        let second = aggregate(&records, GroupBy::SubjectAndLabel);
        assert_eq!(first, second);
        for (a, b) in first.values().zip(second.values()) {
            assert_eq!(a.mean.to_bits(), b.mean.to_bits());
        }
    }

    #[test]
    fn classify_boundary_is_a_pass() {
        assert_eq!(classify(6.0), Status::Aprovado);
        assert_eq!(classify(5.999), Status::Reprovado);
        assert_eq!(classify(10.0), Status::Aprovado);
        assert_eq!(classify(-3.0), Status::Reprovado);
        assert_eq!(classify(42.0), Status::Aprovado);
        assert_eq!(classify(f64::NAN), Status::Reprovado);
        assert_eq!(classify(6.0).to_string(), "Aprovado");
        assert_eq!(classify(5.0).to_string(), "Reprovado");
    }

    #[test]
    fn mean_is_unrounded_until_formatted() {
        let records = vec![scored(1, None, 7.0), scored(1, None, 8.0), scored(1, None, 8.0)];
        let result = aggregate(&records, GroupBy::Subject).into_values().next().unwrap();
        assert!((result.mean - 23.0 / 3.0).abs() < 1e-12);
        assert_eq!(format_mean(result.mean), "7.67");
        assert_eq!(format_mean(6.0), "6.00");
    }
}
