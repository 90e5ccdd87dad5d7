// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Elementwise operations and numeric conversion.
//!
//! Every kernel in this crate computes in `f32` and converts at the edges.
//! An [`ElementOp`] is a tagged operation applied to one value; a
//! [`NumericKind`] names a storage precision. Together they replace one
//! functor per (operation, source type, destination type) triple with a
//! single `match` plus one conversion function.
//!
//! ```rust
//! use tilekit::kernels::element::{ElementOp, NumericKind};
//!
//! let op = ElementOp::Scale(0.5);
//! assert_eq!(op.apply(3.0), 1.5);
//!
//! // f32 -> f16 rounding
//! let y = NumericKind::F16.round(1.0 / 3.0);
//! assert!((y - 0.333_25).abs() < 1e-4);
//! ```

use candle_core::{DType, Tensor};
use half::{bf16, f16};

use crate::error::{Result, TilekitError};

/// Storage precision of a tensor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumericKind {
    /// IEEE-754 single precision.
    #[default]
    F32,
    /// IEEE-754 half precision.
    F16,
    /// Brain floating point (8-bit exponent, 7-bit mantissa).
    BF16,
}

impl NumericKind {
    /// Map a candle dtype to a numeric kind.
    ///
    /// `F64` inputs are accepted and computed as `f32`.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::UnsupportedDType`] for integer dtypes.
    pub fn from_dtype(dtype: DType) -> Result<Self> {
        match dtype {
            DType::F32 | DType::F64 => Ok(Self::F32),
            DType::F16 => Ok(Self::F16),
            DType::BF16 => Ok(Self::BF16),
            other => Err(TilekitError::UnsupportedDType(format!(
                "{other:?} is not a floating point dtype"
            ))),
        }
    }

    /// Candle dtype used to materialize tensors of this kind.
    #[must_use]
    pub const fn dtype(self) -> DType {
        match self {
            Self::F32 => DType::F32,
            Self::F16 => DType::F16,
            Self::BF16 => DType::BF16,
        }
    }

    /// Bytes per element.
    #[must_use]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    /// Round an `f32` to the nearest value representable in this kind
    /// (round-to-nearest-even), returned widened back to `f32`.
    #[must_use]
    pub fn round(self, value: f32) -> f32 {
        match self {
            Self::F32 => value,
            Self::F16 => f16::from_f32(value).to_f32(),
            Self::BF16 => bf16::from_f32(value).to_f32(),
        }
    }
}

/// Read a floating point tensor as contiguous `f32`.
pub(crate) fn tensor_to_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    NumericKind::from_dtype(tensor.dtype())?;
    Ok(tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?)
}

/// Scalar types the kernels can read and write.
pub trait Numeric: Copy + Send + Sync + 'static {
    /// Runtime tag for this type.
    const KIND: NumericKind;

    /// Widen to the compute type.
    fn to_f32(self) -> f32;

    /// Narrow from the compute type (round-to-nearest-even).
    fn from_f32(value: f32) -> Self;
}

impl Numeric for f32 {
    const KIND: NumericKind = NumericKind::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

impl Numeric for f16 {
    const KIND: NumericKind = NumericKind::F16;

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }
}

impl Numeric for bf16 {
    const KIND: NumericKind = NumericKind::BF16;

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        bf16::from_f32(value)
    }
}

/// Convert a value between numeric types through the `f32` compute type.
#[must_use]
pub fn convert<S: Numeric, D: Numeric>(value: S) -> D {
    D::from_f32(value.to_f32())
}

/// Convert an `f32`-carried value from one storage kind to another.
///
/// The value is first rounded to `src` (it is assumed to have been stored
/// there) and then to `dst`.
#[must_use]
pub fn convert_kind(value: f32, src: NumericKind, dst: NumericKind) -> f32 {
    dst.round(src.round(value))
}

/// A unary elementwise operation.
///
/// Parameterized variants carry their constants. All variants evaluate in
/// `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ElementOp {
    /// `y = x`
    #[default]
    PassThrough,
    /// `y = scale * x`
    Scale(f32),
    /// `y = -inf` for NaN inputs, else `scale * x`
    ScaleAndResetNanToNegInf(f32),
    /// `y = x / divider`
    UnaryDivide(f32),
    /// `y = x * x`
    Square,
    /// `y = |x|`
    Abs,
    /// `y = sqrt(x)`
    Sqrt,
    /// `y = max(x, 0)`
    Relu,
    /// Tanh-approximated GeLU.
    FastGelu,
    /// `y = 1 / (1 + exp(-x))`
    Sigmoid,
    /// `y = x * sigmoid(x)`
    Silu,
    /// `y = x / (1 + exp(-beta * x))`
    Swish {
        /// Slope inside the sigmoid.
        beta: f32,
    },
    /// `y = tanh(x)`
    TanH,
    /// `y = -x`
    Neg,
    /// `y = exp(x)`
    Exp,
    /// `y = ln(x)`
    Log,
    /// `y = 1 / x`
    Rcp,
    /// `y = ln(1 + exp(alpha * x)) / alpha`
    SoftRelu {
        /// Sharpness.
        alpha: f32,
    },
    /// `y = (alpha + beta * x) ^ gamma`
    Power {
        /// Shift.
        alpha: f32,
        /// Scale.
        beta: f32,
        /// Exponent.
        gamma: f32,
    },
    /// `y = min(beta, max(alpha, x))`
    ClippedRelu {
        /// Lower clip.
        alpha: f32,
        /// Upper clip.
        beta: f32,
    },
    /// `y = x` for `x >= 0`, else `alpha * x`
    LeakyRelu {
        /// Negative slope.
        alpha: f32,
    },
    /// `y = x` for `x > 0`, else `alpha * (exp(x) - 1)`
    Elu {
        /// Saturation value.
        alpha: f32,
    },
    /// `y = alpha / (1 + exp(-x) * alpha)`
    Logistic {
        /// Scale.
        alpha: f32,
    },
}

impl ElementOp {
    /// Apply the operation to one value.
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::PassThrough => x,
            Self::Scale(scale) => scale * x,
            Self::ScaleAndResetNanToNegInf(scale) => {
                if x.is_nan() {
                    f32::NEG_INFINITY
                } else {
                    scale * x
                }
            }
            Self::UnaryDivide(divider) => x / divider,
            Self::Square => x * x,
            Self::Abs => x.abs(),
            Self::Sqrt => x.sqrt(),
            Self::Relu => x.max(0.0),
            Self::FastGelu => {
                const C1: f32 = -2.0 * 0.035_677;
                const C2: f32 = -2.0 * 0.797_885;
                let u = x * (C1 * x * x + C2);
                x / (1.0 + u.exp())
            }
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Silu => x / (1.0 + (-x).exp()),
            Self::Swish { beta } => x / (1.0 + (-beta * x).exp()),
            Self::TanH => x.tanh(),
            Self::Neg => -x,
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Rcp => 1.0 / x,
            Self::SoftRelu { alpha } => (1.0 + (x * alpha).exp()).ln() / alpha,
            Self::Power { alpha, beta, gamma } => (alpha + beta * x).powf(gamma),
            Self::ClippedRelu { alpha, beta } => beta.min(alpha.max(x)),
            Self::LeakyRelu { alpha } => {
                if x >= 0.0 {
                    x
                } else {
                    x * alpha
                }
            }
            Self::Elu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Self::Logistic { alpha } => alpha / (1.0 + (-x).exp() * alpha),
        }
    }

    /// Apply the operation reading `S` and producing `D`.
    #[must_use]
    pub fn apply_as<S: Numeric, D: Numeric>(self, x: S) -> D {
        D::from_f32(self.apply(x.to_f32()))
    }

    /// Whether the operation is the identity.
    #[must_use]
    pub fn is_identity(self) -> bool {
        matches!(self, Self::PassThrough)
            || matches!(self, Self::Scale(s) if s == 1.0)
            || matches!(self, Self::UnaryDivide(d) if d == 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through_and_scale() {
        assert_eq!(ElementOp::PassThrough.apply(-2.5), -2.5);
        assert_eq!(ElementOp::Scale(2.0).apply(-2.5), -5.0);
        assert_eq!(ElementOp::UnaryDivide(4.0).apply(2.0), 0.5);
        assert!(ElementOp::default().is_identity());
        assert!(ElementOp::Scale(1.0).is_identity());
        assert!(!ElementOp::Relu.is_identity());
    }

    #[test]
    fn test_reset_nan_to_neg_inf() {
        let op = ElementOp::ScaleAndResetNanToNegInf(2.0);
        assert_eq!(op.apply(f32::NAN), f32::NEG_INFINITY);
        assert_eq!(op.apply(1.5), 3.0);
    }

    #[test]
    fn test_activations() {
        assert_eq!(ElementOp::Relu.apply(-1.0), 0.0);
        assert_eq!(ElementOp::Relu.apply(3.0), 3.0);
        assert!((ElementOp::Sigmoid.apply(0.0) - 0.5).abs() < 1e-7);
        assert!((ElementOp::Silu.apply(0.0)).abs() < 1e-7);
        assert!((ElementOp::Swish { beta: 1.0 }.apply(2.0) - ElementOp::Silu.apply(2.0)).abs() < 1e-6);
        assert_eq!(ElementOp::LeakyRelu { alpha: 0.1 }.apply(-2.0), -0.2);
        assert_eq!(ElementOp::ClippedRelu { alpha: 0.0, beta: 1.0 }.apply(5.0), 1.0);
        assert_eq!(ElementOp::ClippedRelu { alpha: 0.0, beta: 1.0 }.apply(-5.0), 0.0);
        assert!((ElementOp::Elu { alpha: 1.0 }.apply(-1.0) - (-0.632_120_6)).abs() < 1e-6);
        assert_eq!(ElementOp::Power { alpha: 1.0, beta: 2.0, gamma: 2.0 }.apply(1.0), 9.0);
    }

    #[test]
    fn test_fast_gelu_matches_tanh_form() {
        for &x in &[-3.0f32, -1.0, -0.1, 0.0, 0.5, 2.0] {
            let reference =
                0.5 * x * (1.0 + ((2.0f32 / std::f32::consts::PI).sqrt() * (x + 0.044_715 * x * x * x)).tanh());
            let got = ElementOp::FastGelu.apply(x);
            assert!((got - reference).abs() < 1e-4, "x={x}: {got} vs {reference}");
        }
    }

    #[test]
    fn test_numeric_kind_round_trip() {
        assert_eq!(NumericKind::F32.round(0.1), 0.1);
        assert_eq!(NumericKind::F16.round(1.0), 1.0);
        assert!((NumericKind::BF16.round(1.0 / 3.0) - 0.333_984_4).abs() < 1e-7);
        assert_eq!(NumericKind::F16.round(f32::NEG_INFINITY), f32::NEG_INFINITY);
    }

    #[test]
    fn test_from_dtype() {
        assert_eq!(NumericKind::from_dtype(DType::F64).unwrap(), NumericKind::F32);
        assert_eq!(NumericKind::from_dtype(DType::BF16).unwrap(), NumericKind::BF16);
        assert!(NumericKind::from_dtype(DType::U32).is_err());
    }

    #[test]
    fn test_generic_conversion() {
        let h: f16 = convert(2.5f32);
        assert_eq!(h.to_f32(), 2.5);
        let b: bf16 = ElementOp::Scale(2.0).apply_as(h);
        assert_eq!(b.to_f32(), 5.0);
        assert_eq!(convert_kind(1.0, NumericKind::BF16, NumericKind::F16), 1.0);
    }
}
