//! Classification losses.
//!
//! Both losses reduce to a scalar mean over the batch and are built from
//! differentiable tensor operations, so gradients reach every gate.

use std::fmt;
use std::str::FromStr;

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Cross-entropy loss for classification.
#[derive(Debug, Default, Clone)]
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Create a new cross-entropy loss.
    pub fn new() -> Self {
        Self
    }

    /// Compute the loss.
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let loss = CrossEntropyLossConfig::new().init(&logits.device());
        loss.forward(logits, targets)
    }
}

/// Focal Loss for handling class imbalance.
///
/// Down-weights easy examples and focuses training on hard examples.
///
/// FL(p_t) = -alpha_t * (1 - p_t)^gamma * log(p_t)
///
/// With `gamma = 0` and no `alpha` this is exactly cross-entropy.
///
/// Reference: "Focal Loss for Dense Object Detection" by Lin et al. (2017)
#[derive(Debug, Clone)]
pub struct FocalLoss {
    /// Focusing parameter. Higher values increase focus on hard examples.
    pub gamma: f32,
    /// Per-class weights. None means equal weights.
    pub alpha: Option<Vec<f32>>,
}

impl FocalLoss {
    /// Create a new Focal Loss.
    ///
    /// # Arguments
    ///
    /// * `gamma` - Focusing parameter (typically 2.0).
    pub fn new(gamma: f32) -> Self {
        Self { gamma, alpha: None }
    }

    /// Set per-class weights.
    #[must_use]
    pub fn with_alpha(mut self, alpha: Vec<f32>) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Compute the loss.
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let [n, _] = logits.dims();
        let device = logits.device();

        let log_pt = log_softmax(logits, 1)
            .gather(1, targets.clone().reshape([n, 1]))
            .reshape([n]);
        let mut loss = log_pt.clone().neg();

        if self.gamma != 0.0 {
            let modulating = log_pt.exp().neg().add_scalar(1.0).powf_scalar(self.gamma);
            loss = loss * modulating;
        }

        if let Some(alpha) = &self.alpha {
            let weights: Tensor<B, 1> =
                Tensor::from_data(TensorData::new(alpha.clone(), [alpha.len()]), &device);
            loss = loss * weights.select(0, targets);
        }

        loss.mean()
    }
}

impl Default for FocalLoss {
    fn default() -> Self {
        Self::new(2.0)
    }
}

/// Which loss to train with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LossConfig {
    /// Plain cross-entropy.
    CrossEntropy,
    /// Focal loss.
    Focal {
        /// Focusing parameter.
        gamma: f32,
        /// Optional per-class weights.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alpha: Option<Vec<f32>>,
    },
}

impl Default for LossConfig {
    fn default() -> Self {
        Self::CrossEntropy
    }
}

impl LossConfig {
    /// Focal loss with the given `gamma` and no class weights.
    #[must_use]
    pub fn focal(gamma: f32) -> Self {
        Self::Focal { gamma, alpha: None }
    }

    /// Build the loss for a model with `n_classes` outputs.
    ///
    /// # Errors
    ///
    /// Returns an error for a negative or non-finite `gamma`, or class
    /// weights that are negative or not one per class.
    pub fn init(&self, n_classes: usize) -> Result<Criterion> {
        match self {
            Self::CrossEntropy => Ok(Criterion::CrossEntropy(CrossEntropyLoss::new())),
            Self::Focal { gamma, alpha } => {
                if !gamma.is_finite() || *gamma < 0.0 {
                    return Err(TrainError::Config(format!(
                        "focal gamma must be finite and >= 0, got {gamma}"
                    )));
                }
                let mut loss = FocalLoss::new(*gamma);
                if let Some(alpha) = alpha {
                    if alpha.len() != n_classes {
                        return Err(TrainError::Config(format!(
                            "focal alpha has {} weights for {} classes",
                            alpha.len(),
                            n_classes
                        )));
                    }
                    if alpha.iter().any(|a| !a.is_finite() || *a < 0.0) {
                        return Err(TrainError::Config(
                            "focal alpha weights must be finite and >= 0".into(),
                        ));
                    }
                    loss = loss.with_alpha(alpha.clone());
                }
                Ok(Criterion::Focal(loss))
            }
        }
    }
}

impl fmt::Display for LossConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossEntropy => write!(f, "cross-entropy"),
            Self::Focal { gamma, .. } => write!(f, "focal(gamma={gamma})"),
        }
    }
}

impl FromStr for LossConfig {
    type Err = TrainError;

    /// Parses `cross-entropy`/`ce` or `focal` (gamma 2.0).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cross-entropy" | "crossentropy" | "ce" => Ok(Self::CrossEntropy),
            "focal" => Ok(Self::focal(2.0)),
            other => Err(TrainError::Config(format!(
                "unknown loss '{other}', expected cross-entropy or focal"
            ))),
        }
    }
}

/// A constructed loss.
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Cross-entropy.
    CrossEntropy(CrossEntropyLoss),
    /// Focal loss.
    Focal(FocalLoss),
}

impl Criterion {
    /// Mean loss over the batch.
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        match self {
            Self::CrossEntropy(loss) => loss.forward(logits, targets),
            Self::Focal(loss) => loss.forward(logits, targets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn inputs() -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 1, Int>) {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[2.0, -1.0], [0.3, 0.1], [-0.5, 1.5], [0.0, 0.0]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1, 0], &device);
        (logits, targets)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_focal_gamma_zero_equals_cross_entropy() {
        let (logits, targets) = inputs();
        let ce = scalar(CrossEntropyLoss::new().forward(logits.clone(), targets.clone()));
        let focal = scalar(FocalLoss::new(0.0).forward(logits, targets));
        assert!((ce - focal).abs() < 1e-6, "ce={ce} focal={focal}");
    }

    #[test]
    fn test_focal_downweights_easy_examples() {
        let (logits, targets) = inputs();
        let ce = scalar(CrossEntropyLoss::new().forward(logits.clone(), targets.clone()));
        let focal = scalar(FocalLoss::new(2.0).forward(logits, targets));
        assert!(focal < ce);
        assert!(focal > 0.0);
    }

    #[test]
    fn test_focal_alpha_scales_classes() {
        let (logits, targets) = inputs();
        let plain = scalar(FocalLoss::new(0.0).forward(logits.clone(), targets.clone()));
        let doubled = scalar(
            FocalLoss::new(0.0)
                .with_alpha(vec![2.0, 2.0])
                .forward(logits, targets),
        );
        assert!((doubled - 2.0 * plain).abs() < 1e-5);
    }

    #[test]
    fn test_focal_is_differentiable() {
        type AD = Autodiff<NdArray>;
        let device = Default::default();
        let logits = Tensor::<AD, 2>::from_floats([[1.0, 0.0], [0.2, 0.4]], &device).require_grad();
        let targets = Tensor::<AD, 1, Int>::from_ints([1, 0], &device);

        let loss = FocalLoss::new(2.0).forward(logits.clone(), targets);
        let grads = loss.backward();
        let grad = logits.grad(&grads).expect("gradient for logits");
        let values = grad.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(values.iter().any(|g| g.abs() > 1e-6));
    }

    #[test]
    fn test_nan_logits_propagate() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[f32::NAN, 0.0]], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0], &device);
        assert!(scalar(FocalLoss::new(2.0).forward(logits, targets)).is_nan());
    }

    #[test]
    fn test_loss_config() {
        assert_eq!("ce".parse::<LossConfig>().unwrap(), LossConfig::CrossEntropy);
        assert_eq!("focal".parse::<LossConfig>().unwrap(), LossConfig::focal(2.0));
        assert!("hinge".parse::<LossConfig>().is_err());

        assert!(LossConfig::focal(-1.0).init(2).is_err());
        let bad_alpha = LossConfig::Focal {
            gamma: 2.0,
            alpha: Some(vec![1.0]),
        };
        assert!(bad_alpha.init(2).is_err());
        assert!(matches!(LossConfig::focal(2.0).init(2), Ok(Criterion::Focal(_))));

        let json = serde_json::to_string(&LossConfig::focal(1.5)).unwrap();
        assert_eq!(json, r#"{"kind":"focal","gamma":1.5}"#);
    }
}
