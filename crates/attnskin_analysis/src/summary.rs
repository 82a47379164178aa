//! Per-class probability tables and the evaluation summary computed from them.

use serde::{Deserialize, Serialize};

use crate::confusion::{confusion_matrix, ConfusionMatrix};
use crate::error::{check_lengths, AnalysisError, Result};
use crate::ranking::{average_precision, roc_auc, roc_curve, RocCurve};

/// Class index of melanoma in the two-class ISIC setup.
pub const MELANOMA_CLASS: usize = 1;

/// Predicted class probabilities, one row per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    rows: Vec<Vec<f32>>,
    n_classes: usize,
}

impl ProbabilityTable {
    /// Build from rows of equal width.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no rows or the rows differ in width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let n_classes = rows.first().map(Vec::len).ok_or(AnalysisError::Empty)?;
        for row in &rows {
            check_lengths("columns in first row", n_classes, "columns", row.len())?;
        }
        Ok(Self { rows, n_classes })
    }

    /// Build from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or not a multiple of `n_classes`.
    pub fn from_flat(values: &[f32], n_classes: usize) -> Result<Self> {
        if n_classes == 0 || values.is_empty() {
            return Err(AnalysisError::Empty);
        }
        check_lengths(
            "values",
            values.len(),
            "rows × classes",
            values.len() / n_classes * n_classes,
        )?;
        Self::from_rows(values.chunks(n_classes).map(<[f32]>::to_vec).collect())
    }

    /// Rows of the table.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Most probable class per sample.
    #[must_use]
    pub fn predictions(&self) -> Vec<usize> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map_or(0, |(i, _)| i)
            })
            .collect()
    }

    /// Scores for one class across all samples.
    #[must_use]
    pub fn class_scores(&self, class: usize) -> Vec<f32> {
        self.rows.iter().map(|row| row[class]).collect()
    }
}

fn one_vs_rest(labels: &[usize], class: usize) -> Vec<bool> {
    labels.iter().map(|&l| l == class).collect()
}

/// Macro average of one-vs-rest average precision.
///
/// Classes without positives are skipped; if none have positives the
/// result is 0 and a warning is logged.
///
/// # Errors
///
/// Returns an error if `labels` does not match the table length.
pub fn mean_average_precision(table: &ProbabilityTable, labels: &[usize]) -> Result<f32> {
    check_lengths("rows", table.len(), "labels", labels.len())?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for class in 0..table.n_classes() {
        if let Some(ap) = average_precision(&table.class_scores(class), &one_vs_rest(labels, class))? {
            sum += ap;
            count += 1;
        }
    }
    if count == 0 {
        tracing::warn!("no class has positives, mAP reported as 0");
        return Ok(0.0);
    }
    Ok(sum / count as f32)
}

/// All metrics reported after an evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Fraction of correctly classified samples.
    pub accuracy: f32,
    /// Macro-averaged precision.
    pub mean_precision: f32,
    /// Macro-averaged recall.
    pub mean_recall: f32,
    /// Precision of the positive class.
    pub positive_precision: f32,
    /// Recall of the positive class.
    pub positive_recall: f32,
    /// Macro one-vs-rest average precision.
    pub mean_ap: f32,
    /// AUC of the positive class.
    pub positive_auc: f32,
    /// ROC curve of the positive class.
    pub roc: RocCurve,
    /// Confusion matrix.
    pub confusion: ConfusionMatrix,
    /// Index of the positive class.
    pub positive_class: usize,
}

impl EvaluationSummary {
    /// Compute every metric from a probability table and true labels.
    ///
    /// # Errors
    ///
    /// Returns an error on length mismatches or labels outside the table width.
    pub fn compute(table: &ProbabilityTable, labels: &[usize], positive_class: usize) -> Result<Self> {
        if positive_class >= table.n_classes() {
            return Err(AnalysisError::ClassOutOfRange {
                class: positive_class,
                n_classes: table.n_classes(),
            });
        }
        let confusion = confusion_matrix(&table.predictions(), labels, table.n_classes())?;
        let scores = table.class_scores(positive_class);
        let positives = one_vs_rest(labels, positive_class);

        Ok(Self {
            accuracy: confusion.accuracy(),
            mean_precision: confusion.macro_precision(),
            mean_recall: confusion.macro_recall(),
            positive_precision: confusion.precision(positive_class),
            positive_recall: confusion.recall(positive_class),
            mean_ap: mean_average_precision(table, labels)?,
            positive_auc: roc_auc(&scores, &positives)?,
            roc: roc_curve(&scores, &positives)?,
            confusion,
            positive_class,
        })
    }
}

impl std::fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accuracy {:.2}% | mean precision {:.4} | mean recall {:.4} | \
             class {} precision {:.4} recall {:.4} auc {:.4} | mAP {:.4}",
            self.accuracy * 100.0,
            self.mean_precision,
            self.mean_recall,
            self.positive_class,
            self.positive_precision,
            self.positive_recall,
            self.positive_auc,
            self.mean_ap
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProbabilityTable {
        ProbabilityTable::from_rows(vec![
            vec![0.9, 0.1],
            vec![0.3, 0.7],
            vec![0.6, 0.4],
            vec![0.2, 0.8],
        ])
        .unwrap()
    }

    #[test]
    fn test_predictions() {
        assert_eq!(table().predictions(), vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_summary() {
        let labels = [0, 1, 1, 1];
        let summary = EvaluationSummary::compute(&table(), &labels, MELANOMA_CLASS).unwrap();
        assert!((summary.accuracy - 0.75).abs() < 1e-6);
        assert!((summary.positive_precision - 1.0).abs() < 1e-6);
        assert!((summary.positive_recall - 2.0 / 3.0).abs() < 1e-6);
        assert!((summary.positive_auc - 1.0).abs() < 1e-6);
        assert!((summary.mean_ap - 1.0).abs() < 1e-6);
        assert!(summary.to_string().contains("accuracy 75.00%"));
    }

    #[test]
    fn test_from_flat() {
        let t = ProbabilityTable::from_flat(&[0.5, 0.5, 0.1, 0.9], 2).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.class_scores(1), vec![0.5, 0.9]);
        assert!(ProbabilityTable::from_flat(&[0.5, 0.5, 0.1], 2).is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(ProbabilityTable::from_rows(vec![vec![0.1, 0.9], vec![1.0]]).is_err());
        assert!(matches!(ProbabilityTable::from_rows(vec![]), Err(AnalysisError::Empty)));
    }

    #[test]
    fn test_positive_class_out_of_range() {
        assert!(EvaluationSummary::compute(&table(), &[0, 0, 0, 0], 2).is_err());
    }
}
