//! Combining per-stage descriptors into the classifier input.

use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// How the three pooled stage vectors are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    /// Concatenate `p1 || p2 || p3`.
    #[default]
    Concat,
    /// Elementwise sum; every stage must have the same width.
    Sum,
    /// Only the deepest stage feeds the classifier.
    Deepest,
}

impl FromStr for FusionMode {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "concat" => Ok(Self::Concat),
            "sum" => Ok(Self::Sum),
            "deepest" => Ok(Self::Deepest),
            other => Err(ModelError::Config(format!("unknown fusion mode '{other}'"))),
        }
    }
}

impl std::fmt::Display for FusionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concat => write!(f, "concat"),
            Self::Sum => write!(f, "sum"),
            Self::Deepest => write!(f, "deepest"),
        }
    }
}

/// Fusion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FusionConfig {
    /// Combination mode.
    pub mode: FusionMode,
    /// Also feed the global descriptor (appended, or added for `Sum`).
    pub include_global: bool,
}

impl FusionConfig {
    /// Create a config.
    pub fn new(mode: FusionMode) -> Self {
        Self {
            mode,
            include_global: false,
        }
    }

    /// Set whether the global descriptor is fused.
    #[must_use]
    pub fn with_include_global(mut self, include_global: bool) -> Self {
        self.include_global = include_global;
        self
    }

    /// Width of the fused descriptor for the given channel counts.
    ///
    /// # Errors
    ///
    /// `Sum` fails when the stages (or the global descriptor, if included)
    /// differ in width.
    pub fn output_dim(&self, stage_channels: [usize; 3], global_channels: usize) -> Result<usize> {
        let global = if self.include_global { global_channels } else { 0 };
        match self.mode {
            FusionMode::Concat => Ok(stage_channels.iter().sum::<usize>() + global),
            FusionMode::Deepest => Ok(stage_channels[2] + global),
            FusionMode::Sum => {
                let width = stage_channels[0];
                let mismatched = stage_channels.iter().any(|&c| c != width)
                    || (self.include_global && global_channels != width);
                if mismatched {
                    return Err(ModelError::Config(format!(
                        "sum fusion needs equal widths, got stages {:?} and global {}{}",
                        stage_channels,
                        global_channels,
                        if self.include_global { "" } else { " (unused)" }
                    )));
                }
                Ok(width)
            }
        }
    }

    /// Build the fusion step, checking dimensions.
    pub fn init(&self, stage_channels: [usize; 3], global_channels: usize) -> Result<StageFusion> {
        let output_dim = self.output_dim(stage_channels, global_channels)?;
        Ok(StageFusion {
            config: *self,
            output_dim,
        })
    }
}

/// Validated fusion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageFusion {
    config: FusionConfig,
    output_dim: usize,
}

impl StageFusion {
    /// Width of the fused descriptor.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Fusion mode.
    pub fn mode(&self) -> FusionMode {
        self.config.mode
    }

    /// Fuse pooled stage vectors `(N, C_i)` and the global descriptor `(N, C_g)`.
    pub fn fuse<B: Backend>(&self, pooled: [Tensor<B, 2>; 3], global: Tensor<B, 2>) -> Tensor<B, 2> {
        let [p1, p2, p3] = pooled;
        let global = self.config.include_global.then_some(global);
        match self.config.mode {
            FusionMode::Concat => {
                let mut parts = vec![p1, p2, p3];
                parts.extend(global);
                Tensor::cat(parts, 1)
            }
            FusionMode::Deepest => match global {
                Some(g) => Tensor::cat(vec![p3, g], 1),
                None => p3,
            },
            FusionMode::Sum => {
                let sum = p1 + p2 + p3;
                match global {
                    Some(g) => sum + g,
                    None => sum,
                }
            }
        }
    }
}
