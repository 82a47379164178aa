//! Confusion matrix computation and display.

use serde::{Deserialize, Serialize};

use crate::error::{check_lengths, AnalysisError, Result};

/// Confusion matrix for classification evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// The matrix values (row = true, col = pred).
    pub matrix: Vec<Vec<usize>>,
    /// Number of classes.
    pub n_classes: usize,
    /// Class labels.
    pub labels: Option<Vec<String>>,
}

impl ConfusionMatrix {
    /// Create an empty confusion matrix.
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        Self {
            matrix: vec![vec![0; n_classes]; n_classes],
            n_classes,
            labels: None,
        }
    }

    /// Set class labels.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Record one prediction.
    ///
    /// # Errors
    ///
    /// Returns an error if either class is out of range.
    pub fn add(&mut self, true_class: usize, pred_class: usize) -> Result<()> {
        for class in [true_class, pred_class] {
            if class >= self.n_classes {
                return Err(AnalysisError::ClassOutOfRange {
                    class,
                    n_classes: self.n_classes,
                });
            }
        }
        self.matrix[true_class][pred_class] += 1;
        Ok(())
    }

    /// Total number of recorded predictions.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Get accuracy.
    #[must_use]
    pub fn accuracy(&self) -> f32 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f32 / total as f32
        }
    }

    /// Number of true instances of a class.
    #[must_use]
    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    /// Number of predictions of a class.
    #[must_use]
    pub fn predicted(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    /// Get precision for a class. Zero when the class is never predicted.
    #[must_use]
    pub fn precision(&self, class: usize) -> f32 {
        let tp = self.matrix[class][class];
        let predicted = self.predicted(class);
        if predicted == 0 {
            0.0
        } else {
            tp as f32 / predicted as f32
        }
    }

    /// Get recall for a class. Zero when the class never occurs.
    #[must_use]
    pub fn recall(&self, class: usize) -> f32 {
        let tp = self.matrix[class][class];
        let support = self.support(class);
        if support == 0 {
            0.0
        } else {
            tp as f32 / support as f32
        }
    }

    /// Get F1 score for a class.
    #[must_use]
    pub fn f1(&self, class: usize) -> f32 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Classes that occur as a target or a prediction.
    fn seen_classes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.n_classes).filter(|&c| self.support(c) + self.predicted(c) > 0)
    }

    fn macro_average(&self, per_class: impl Fn(usize) -> f32) -> f32 {
        let (sum, count) = self
            .seen_classes()
            .fold((0.0, 0usize), |(sum, count), c| (sum + per_class(c), count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Unweighted mean precision over classes that were seen.
    #[must_use]
    pub fn macro_precision(&self) -> f32 {
        self.macro_average(|c| self.precision(c))
    }

    /// Unweighted mean recall over classes that were seen.
    #[must_use]
    pub fn macro_recall(&self) -> f32 {
        self.macro_average(|c| self.recall(c))
    }

    /// Unweighted mean F1 over classes that were seen.
    #[must_use]
    pub fn macro_f1(&self) -> f32 {
        self.macro_average(|c| self.f1(c))
    }

    /// Normalize the matrix row-wise (shows recall).
    #[must_use]
    pub fn normalize(&self) -> Vec<Vec<f32>> {
        self.matrix
            .iter()
            .map(|row| {
                let sum: usize = row.iter().sum();
                if sum == 0 {
                    vec![0.0; self.n_classes]
                } else {
                    row.iter().map(|&v| v as f32 / sum as f32).collect()
                }
            })
            .collect()
    }

    fn label(&self, class: usize) -> String {
        self.labels
            .as_ref()
            .and_then(|l| l.get(class).cloned())
            .unwrap_or_else(|| class.to_string())
    }

    /// Get a text representation.
    #[must_use]
    pub fn to_string_table(&self) -> String {
        let mut s = String::from("       ");
        for j in 0..self.n_classes {
            s.push_str(&format!("{:>8}", self.label(j).chars().take(7).collect::<String>()));
        }
        s.push('\n');

        for i in 0..self.n_classes {
            s.push_str(&format!("{:>6} ", self.label(i).chars().take(6).collect::<String>()));
            for j in 0..self.n_classes {
                s.push_str(&format!("{:>8}", self.matrix[i][j]));
            }
            s.push('\n');
        }

        s
    }
}

/// Compute a confusion matrix from predictions and targets.
///
/// # Errors
///
/// Returns an error if the slices differ in length or hold a class
/// outside `0..n_classes`.
pub fn confusion_matrix(
    preds: &[usize],
    targets: &[usize],
    n_classes: usize,
) -> Result<ConfusionMatrix> {
    check_lengths("predictions", preds.len(), "targets", targets.len())?;
    let mut cm = ConfusionMatrix::new(n_classes);
    for (&pred, &target) in preds.iter().zip(targets) {
        cm.add(target, pred)?;
    }
    Ok(cm)
}
