//! Activation functions a cell may apply to its state.

use crate::error::{EvoError, EvoResult};
use core::{f64::consts::E, fmt, str::FromStr};
use serde::{Deserialize, Serialize};

pub fn steep_sigmoid(x: f64) -> f64 {
    1. / (1. + E.powf(-4.9 * x))
}

pub fn relu(x: f64) -> f64 {
    if x < 0. {
        0.
    } else {
        x
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationFunction {
    Identity,
    TanH,
    Sigmoid,
    SteepSigmoid,
    ReLU,
    LeakyReLU,
    BinaryStep,
    Gaussian,
    Sine,
    SoftSign,
}

impl ActivationFunction {
    pub const ALL: [Self; 10] = [
        Self::Identity,
        Self::TanH,
        Self::Sigmoid,
        Self::SteepSigmoid,
        Self::ReLU,
        Self::LeakyReLU,
        Self::BinaryStep,
        Self::Gaussian,
        Self::Sine,
        Self::SoftSign,
    ];

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Self::Identity => x,
            Self::TanH => x.tanh(),
            Self::Sigmoid => 1. / (1. + (-x).exp()),
            Self::SteepSigmoid => steep_sigmoid(x),
            Self::ReLU => relu(x),
            Self::LeakyReLU => {
                if x < 0. {
                    0.01 * x
                } else {
                    x
                }
            }
            Self::BinaryStep => {
                if x < 0. {
                    0.
                } else {
                    1.
                }
            }
            Self::Gaussian => (-x * x).exp(),
            Self::Sine => x.sin(),
            Self::SoftSign => x / (1. + x.abs()),
        }
    }

    /// Label used by the template text format
    pub fn label(&self) -> &'static str {
        match self {
            Self::Identity => "IDENTITY",
            Self::TanH => "TANH",
            Self::Sigmoid => "SIGMOID",
            Self::SteepSigmoid => "STEEPSIGMOID",
            Self::ReLU => "RELU",
            Self::LeakyReLU => "LEAKYRELU",
            Self::BinaryStep => "BINARYSTEP",
            Self::Gaussian => "GAUSSIAN",
            Self::Sine => "SINE",
            Self::SoftSign => "SOFTSIGN",
        }
    }
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ActivationFunction {
    type Err = EvoError;

    fn from_str(s: &str) -> EvoResult<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| EvoError::UnknownActivation(s.to_string()))
    }
}
