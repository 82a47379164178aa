//! # attnskin_analysis
//!
//! Metrics for evaluating lesion classifiers.
//!
//! This crate provides:
//! - Confusion matrix with per-class and macro precision/recall
//! - ROC curve and AUC with tie handling
//! - Average precision and its macro mean over classes
//! - [`EvaluationSummary`] bundling the metrics reported after each epoch

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod confusion;
mod error;
mod ranking;
mod summary;

pub use confusion::{confusion_matrix, ConfusionMatrix};
pub use error::{AnalysisError, Result};
pub use ranking::{average_precision, roc_auc, roc_curve, RocCurve};
pub use summary::{mean_average_precision, EvaluationSummary, ProbabilityTable, MELANOMA_CLASS};
