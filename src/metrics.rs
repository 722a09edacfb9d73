//! Held-out evaluation of a trained size classifier.
//!
//! Produces the per-class precision / recall / F1 table plus accuracy and
//! macro / weighted averages. A ratio with a zero denominator is reported
//! as 0.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SizeLabel;

/// Scores for a single class (or an average over classes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Number of true samples of the class in the evaluation set.
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Classes that occur in either the true or the predicted labels.
    pub classes: BTreeMap<SizeLabel, ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

/// Fraction of positions where `predicted` matches `actual`.
pub fn accuracy(actual: &[SizeLabel], predicted: &[SizeLabel]) -> f64 {
    debug_assert_eq!(actual.len(), predicted.len());
    if actual.is_empty() {
        return 0.0;
    }
    let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    correct as f64 / actual.len() as f64
}

impl ClassificationReport {
    pub fn new(actual: &[SizeLabel], predicted: &[SizeLabel]) -> Self {
        debug_assert_eq!(actual.len(), predicted.len());

        let mut classes = BTreeMap::new();
        for label in SizeLabel::ALL {
            let tp = count(actual, predicted, |a, p| a == label && p == label);
            let fp = count(actual, predicted, |a, p| a != label && p == label);
            let fn_ = count(actual, predicted, |a, p| a == label && p != label);
            let support = tp + fn_;

            if support == 0 && tp + fp == 0 {
                continue;
            }

            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, support);
            let f1_score = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            classes.insert(
                label,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score,
                    support,
                },
            );
        }

        let total_support: usize = classes.values().map(|m| m.support).sum();
        let macro_avg = average(classes.values(), |_| 1.0, total_support);
        let weighted_avg = average(classes.values(), |m| m.support as f64, total_support);

        Self {
            classes,
            accuracy: accuracy(actual, predicted),
            macro_avg,
            weighted_avg,
        }
    }

    pub fn class(&self, label: SizeLabel) -> Option<&ClassMetrics> {
        self.classes.get(&label)
    }
}

fn count<F: Fn(SizeLabel, SizeLabel) -> bool>(actual: &[SizeLabel], predicted: &[SizeLabel], pred: F) -> usize {
    actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| pred(**a, **p))
        .count()
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn average<'a, I, W>(metrics: I, weight: W, total_support: usize) -> ClassMetrics
where
    I: Iterator<Item = &'a ClassMetrics> + Clone,
    W: Fn(&ClassMetrics) -> f64,
{
    let total_weight: f64 = metrics.clone().map(&weight).sum();
    if total_weight <= 0.0 {
        return ClassMetrics {
            support: total_support,
            ..ClassMetrics::default()
        };
    }

    let mut avg = ClassMetrics {
        support: total_support,
        ..ClassMetrics::default()
    };
    for m in metrics {
        let w = weight(m) / total_weight;
        avg.precision += w * m.precision;
        avg.recall += w * m.recall;
        avg.f1_score += w * m.f1_score;
    }
    avg
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>12} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (label, m) in &self.classes {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label.as_str(),
                m.precision,
                m.recall,
                m.f1_score,
                m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SizeLabel::*;

    #[test]
    fn perfect_predictions() {
        let labels = [XS, S, M, M, L];
        let report = ClassificationReport::new(&labels, &labels);

        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.classes.len(), 4);
        assert_eq!(report.class(M).unwrap().support, 2);
        assert_eq!(report.macro_avg.f1_score, 1.0);
        assert_eq!(report.weighted_avg.support, 5);
        assert!(report.class(XXL).is_none());
    }

    #[test]
    fn mixed_predictions() {
        let actual = [M, M, M, L];
        let predicted = [M, M, L, L];
        let report = ClassificationReport::new(&actual, &predicted);

        assert!((report.accuracy - 0.75).abs() < 1e-12);

        let m = report.class(M).unwrap();
        assert_eq!(m.precision, 1.0);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 0.8).abs() < 1e-12);

        let l = report.class(L).unwrap();
        assert_eq!(l.precision, 0.5);
        assert_eq!(l.recall, 1.0);

        // weighted by support 3:1
        let expected = (3.0 * m.precision + 1.0 * l.precision) / 4.0;
        assert!((report.weighted_avg.precision - expected).abs() < 1e-12);
        let expected_macro = (m.recall + l.recall) / 2.0;
        assert!((report.macro_avg.recall - expected_macro).abs() < 1e-12);
    }

    #[test]
    fn predicted_only_class_is_listed_with_zero_support() {
        let report = ClassificationReport::new(&[S, S], &[S, XL]);
        let xl = report.class(XL).unwrap();
        assert_eq!(xl.support, 0);
        assert_eq!(xl.precision, 0.0);
        assert_eq!(xl.recall, 0.0);
    }

    #[test]
    fn empty_input() {
        let report = ClassificationReport::new(&[], &[]);
        assert_eq!(report.accuracy, 0.0);
        assert!(report.classes.is_empty());
        assert_eq!(report.macro_avg, ClassMetrics::default());
    }

    #[test]
    fn display_lists_classes() {
        let report = ClassificationReport::new(&[XS, XXL], &[XS, XL]);
        let text = report.to_string();
        assert!(text.contains("XXL"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("accuracy"));
    }
}
