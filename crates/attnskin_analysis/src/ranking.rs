//! Threshold-free metrics over scored samples: ROC curve, AUC, average precision.
//!
//! Every function takes one score per sample and a boolean "is positive" flag.
//! Ties between scores are handled as a single threshold. A NaN score makes the
//! result NaN.

use serde::{Deserialize, Serialize};

use crate::error::{check_lengths, Result};

/// Points of a receiver operating characteristic curve.
///
/// The first point is always `(0, 0)` at an infinite threshold; the last is `(1, 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    /// False positive rates, non-decreasing.
    pub fpr: Vec<f32>,
    /// True positive rates, non-decreasing.
    pub tpr: Vec<f32>,
    /// Score thresholds, decreasing.
    pub thresholds: Vec<f32>,
}

impl RocCurve {
    /// Area under the curve by the trapezoidal rule.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fpr.len()
    }

    /// True if the curve holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fpr.is_empty()
    }
}

fn count_positives(labels: &[bool]) -> (usize, usize) {
    let pos = labels.iter().filter(|&&l| l).count();
    (pos, labels.len() - pos)
}

/// Indices sorted by descending score, grouped by equal score.
///
/// Each group is `(score, positives, negatives)`.
fn descending_groups(scores: &[f32], labels: &[bool]) -> Vec<(f32, usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut groups: Vec<(f32, usize, usize)> = Vec::new();
    for i in order {
        let (pos, neg) = if labels[i] { (1, 0) } else { (0, 1) };
        match groups.last_mut() {
            Some(last) if last.0 == scores[i] => {
                last.1 += pos;
                last.2 += neg;
            }
            _ => groups.push((scores[i], pos, neg)),
        }
    }
    groups
}

/// Compute the ROC curve.
///
/// A class with no positives (or no negatives) yields a rate of 0 along the
/// corresponding axis.
///
/// # Errors
///
/// Returns an error if `scores` and `labels` differ in length.
pub fn roc_curve(scores: &[f32], labels: &[bool]) -> Result<RocCurve> {
    check_lengths("scores", scores.len(), "labels", labels.len())?;
    let (n_pos, n_neg) = count_positives(labels);
    let rate = |count: usize, total: usize| {
        if total == 0 {
            0.0
        } else {
            count as f32 / total as f32
        }
    };

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f32::INFINITY],
    };
    let (mut tp, mut fp) = (0, 0);
    for (threshold, pos, neg) in descending_groups(scores, labels) {
        tp += pos;
        fp += neg;
        curve.fpr.push(rate(fp, n_neg));
        curve.tpr.push(rate(tp, n_pos));
        curve.thresholds.push(threshold);
    }
    Ok(curve)
}

/// Area under the ROC curve via the Wilcoxon-Mann-Whitney statistic.
///
/// Tied scores receive their average rank. When only one class is present the
/// AUC is undefined and 0.5 is returned with a warning.
///
/// # Errors
///
/// Returns an error if `scores` and `labels` differ in length.
pub fn roc_auc(scores: &[f32], labels: &[bool]) -> Result<f32> {
    check_lengths("scores", scores.len(), "labels", labels.len())?;
    if scores.iter().any(|s| s.is_nan()) {
        return Ok(f32::NAN);
    }

    let (n_pos, n_neg) = count_positives(labels);
    if n_pos == 0 || n_neg == 0 {
        tracing::warn!(n_pos, n_neg, "AUC undefined with a single class present, reporting 0.5");
        return Ok(0.5);
    }

    // Ascending ranks: walk descending groups from the back.
    let groups = descending_groups(scores, labels);
    let mut rank_sum = 0.0f64;
    let mut seen = 0usize;
    for &(_, pos, neg) in groups.iter().rev() {
        let size = pos + neg;
        let avg_rank = seen as f64 + (size as f64 + 1.0) / 2.0;
        rank_sum += avg_rank * pos as f64;
        seen += size;
    }

    let n_pos = n_pos as f64;
    let auc = (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64);
    Ok(auc as f32)
}

/// Average precision: `Σ (R_k − R_{k−1}) · P_k` over decreasing thresholds.
///
/// Returns `None` when there are no positives.
///
/// # Errors
///
/// Returns an error if `scores` and `labels` differ in length.
pub fn average_precision(scores: &[f32], labels: &[bool]) -> Result<Option<f32>> {
    check_lengths("scores", scores.len(), "labels", labels.len())?;
    let (n_pos, _) = count_positives(labels);
    if n_pos == 0 {
        return Ok(None);
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Ok(Some(f32::NAN));
    }

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut prev_recall = 0.0f64;
    let mut ap = 0.0f64;
    for (_, pos, neg) in descending_groups(scores, labels) {
        tp += pos;
        fp += neg;
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Ok(Some(ap as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_ranking() {
        let scores = [0.9, 0.8, 0.3, 0.1];
        let labels = [true, true, false, false];
        assert!((roc_auc(&scores, &labels).unwrap() - 1.0).abs() < 1e-6);
        assert!((average_precision(&scores, &labels).unwrap().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverted_ranking() {
        let scores = [0.1, 0.2, 0.8, 0.9];
        let labels = [true, true, false, false];
        assert!(roc_auc(&scores, &labels).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_auc_with_ties() {
        // One positive tied with one negative: half credit for that pair.
        let scores = [0.5, 0.5, 0.1];
        let labels = [true, false, false];
        assert!((roc_auc(&scores, &labels).unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_curve_area_matches_rank_auc() {
        let scores = [0.1, 0.4, 0.35, 0.8, 0.35, 0.6];
        let labels = [false, false, true, true, false, true];
        let curve = roc_curve(&scores, &labels).unwrap();
        let auc = roc_auc(&scores, &labels).unwrap();
        assert!((curve.area() - auc).abs() < 1e-6);
        assert_eq!(curve.fpr.first(), Some(&0.0));
        assert_eq!(curve.tpr.last(), Some(&1.0));
        assert_eq!(curve.len(), 6);
    }

    #[test]
    fn test_average_precision_known_value() {
        // Ranking: P N P N -> precisions 1, 2/3 at recalls 0.5, 1.0.
        let scores = [0.9, 0.8, 0.7, 0.6];
        let labels = [true, false, true, false];
        let ap = average_precision(&scores, &labels).unwrap().unwrap();
        assert!((ap - (0.5 + 0.5 * 2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_single_class() {
        let scores = [0.2, 0.7];
        assert_eq!(roc_auc(&scores, &[false, false]).unwrap(), 0.5);
        assert_eq!(average_precision(&scores, &[false, false]).unwrap(), None);
    }

    #[test]
    fn test_nan_propagates() {
        let scores = [f32::NAN, 0.3];
        let labels = [true, false];
        assert!(roc_auc(&scores, &labels).unwrap().is_nan());
        assert!(average_precision(&scores, &labels).unwrap().unwrap().is_nan());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(roc_auc(&[0.1], &[true, false]).is_err());
        assert!(roc_curve(&[0.1], &[]).is_err());
    }
}
