//! Parameter initialization schemes.

use std::str::FromStr;

use burn::nn::Initializer;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Weight initialization applied to every convolution and linear layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WeightInit {
    /// He normal, fan-in mode.
    #[default]
    KaimingNormal,
    /// He uniform, fan-in mode.
    KaimingUniform,
    /// Glorot normal.
    XavierNormal,
    /// Glorot uniform.
    XavierUniform,
}

impl WeightInit {
    /// Burn initializer for this scheme.
    #[must_use]
    pub fn initializer(&self) -> Initializer {
        let relu_gain = std::f64::consts::SQRT_2;
        match self {
            Self::KaimingNormal => Initializer::KaimingNormal {
                gain: relu_gain,
                fan_out_only: false,
            },
            Self::KaimingUniform => Initializer::KaimingUniform {
                gain: relu_gain,
                fan_out_only: false,
            },
            Self::XavierNormal => Initializer::XavierNormal { gain: 1.0 },
            Self::XavierUniform => Initializer::XavierUniform { gain: 1.0 },
        }
    }
}

impl FromStr for WeightInit {
    type Err = ModelError;

    /// Accepts `kaiming-normal`, `kaiming_normal` and `kaimingNormal` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "kaimingnormal" => Ok(Self::KaimingNormal),
            "kaiminguniform" => Ok(Self::KaimingUniform),
            "xaviernormal" => Ok(Self::XavierNormal),
            "xavieruniform" => Ok(Self::XavierUniform),
            _ => Err(ModelError::Config(format!(
                "invalid type of initialization '{s}'"
            ))),
        }
    }
}

impl std::fmt::Display for WeightInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::KaimingNormal => "kaiming-normal",
            Self::KaimingUniform => "kaiming-uniform",
            Self::XavierNormal => "xavier-normal",
            Self::XavierUniform => "xavier-uniform",
        };
        f.write_str(name)
    }
}
