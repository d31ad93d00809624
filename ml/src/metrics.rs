use std::fmt::{self, Display};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricsError {
    #[error("Got {0} true labels but {1} predictions")]
    LengthMismatchError(usize, usize),
    #[error("Cannot build a report without samples")]
    EmptyError,
    #[error("Label {0} has no target name ({1} names given)")]
    UnknownLabelError(usize, usize),
}

/// Precision, recall, f1 score and support of a single class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per class scores of a classifier, laid out like the classification report
/// of scikit-learn.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_avg: (f64, f64, f64),
    pub weighted_avg: (f64, f64, f64),
    pub total_support: usize,
}

/// Division that treats 0/0 as 0
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ClassificationReport {
    pub fn new(
        y_true: &[usize],
        y_pred: &[usize],
        target_names: &[String],
    ) -> Result<ClassificationReport, MetricsError> {
        if y_true.len() != y_pred.len() {
            return Err(MetricsError::LengthMismatchError(y_true.len(), y_pred.len()));
        }
        if y_true.is_empty() {
            return Err(MetricsError::EmptyError);
        }
        let num_classes = target_names.len();
        if let Some(&label) = y_true.iter().chain(y_pred).find(|&&l| l >= num_classes) {
            return Err(MetricsError::UnknownLabelError(label, num_classes));
        }

        let mut true_positives = vec![0; num_classes];
        let mut predicted = vec![0; num_classes];
        let mut support = vec![0; num_classes];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            support[t] += 1;
            predicted[p] += 1;
            if t == p {
                true_positives[t] += 1;
            }
        }

        let classes: Vec<ClassScores> = target_names
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let precision = ratio(true_positives[c], predicted[c]);
                let recall = ratio(true_positives[c], support[c]);
                let f1_score = if precision + recall == 0. {
                    0.
                } else {
                    2. * precision * recall / (precision + recall)
                };
                ClassScores {
                    name: name.clone(),
                    precision,
                    recall,
                    f1_score,
                    support: support[c],
                }
            })
            .collect();

        let total = y_true.len();
        let n = num_classes.max(1) as f64;
        let macro_avg = classes.iter().fold((0., 0., 0.), |acc, s| {
            (acc.0 + s.precision / n, acc.1 + s.recall / n, acc.2 + s.f1_score / n)
        });
        let weighted_avg = classes.iter().fold((0., 0., 0.), |acc, s| {
            let w = s.support as f64 / total as f64;
            (acc.0 + s.precision * w, acc.1 + s.recall * w, acc.2 + s.f1_score * w)
        });

        Ok(ClassificationReport {
            classes,
            accuracy: ratio(true_positives.iter().sum(), total),
            macro_avg,
            weighted_avg,
            total_support: total,
        })
    }
}

impl Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.name,
                c.precision,
                c.recall,
                c.f1_score,
                c.support,
                width = width
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_support,
            width = width
        )?;
        let averages = [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)];
        for (name, (p, r, f1)) in &averages {
            writeln!(
                f,
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name,
                p,
                r,
                f1,
                self.total_support,
                width = width
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_matches_sklearn() {
        // sklearn.metrics.classification_report([0, 1, 2, 2, 2], [0, 0, 2, 2, 1])
        let report = ClassificationReport::new(
            &[0, 1, 2, 2, 2],
            &[0, 0, 2, 2, 1],
            &names(&["class 0", "class 1", "class 2"]),
        )
        .unwrap();

        let scores: Vec<_> = report
            .classes
            .iter()
            .map(|c| (c.precision, c.recall, c.f1_score, c.support))
            .collect();
        assert!(close(scores[0].0, 0.5) && close(scores[0].1, 1.) && close(scores[0].2, 2. / 3.));
        assert_eq!(scores[1], (0., 0., 0., 1));
        assert!(close(scores[2].0, 1.) && close(scores[2].1, 2. / 3.) && close(scores[2].2, 0.8));
        assert_eq!(scores[2].3, 3);

        assert!(close(report.accuracy, 0.6));
        assert!(close(report.macro_avg.0, 0.5));
        assert!(close(report.macro_avg.1, 5. / 9.));
        assert!(close(report.weighted_avg.0, 0.7));
        assert!(close(report.weighted_avg.2, (2. / 3. + 3. * 0.8) / 5.));
    }

    #[test]
    fn test_display_layout() {
        let report =
            ClassificationReport::new(&[0, 1, 1], &[0, 1, 0], &names(&["Degas", "Monet"])).unwrap();
        let printed = report.to_string();
        let lines: Vec<&str> = printed.lines().collect();

        assert_eq!(lines[0], "              precision    recall  f1-score   support");
        assert_eq!(lines[2], "       Degas       0.50      1.00      0.67         1");
        assert_eq!(lines[5], "    accuracy                           0.67         3");
        assert!(lines[7].starts_with("weighted avg"));
    }

    #[test]
    fn test_errors() {
        let n = names(&["a", "b"]);
        assert_eq!(
            ClassificationReport::new(&[0, 1], &[0], &n),
            Err(MetricsError::LengthMismatchError(2, 1))
        );
        assert_eq!(ClassificationReport::new(&[], &[], &n), Err(MetricsError::EmptyError));
        assert_eq!(
            ClassificationReport::new(&[0, 2], &[0, 1], &n),
            Err(MetricsError::UnknownLabelError(2, 2))
        );
    }
}
