//! Numeric precision and realness of tensor data, independent of any
//! particular array library.
//!
//! A [`Dtype`] is what the tensor-facing layer talks about; each
//! [`BlockBackend`][crate::backend::BlockBackend] translates it into its own
//! native element type (see
//! [`BlockBackend::parse_dtype`][crate::backend::BlockBackend::parse_dtype]).

use std::{ fmt, ops::Neg };
use num_complex::Complex64 as C64;

/// Floating-point precision of a single real number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Precision {
    /// 16 bits per float.
    Half,
    /// 32 bits per float.
    Single,
    /// 64 bits per float.
    Double,
    /// C `long double`; 80, 96, or 128 bits depending on the platform.
    LongDouble,
    /// 128 bits per float.
    Quadruple,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Half => write!(f, "half"),
            Self::Single => write!(f, "single"),
            Self::Double => write!(f, "double"),
            Self::LongDouble => write!(f, "long_double"),
            Self::Quadruple => write!(f, "quadruple"),
        }
    }
}

/// Precision and realness of a numeric type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dtype {
    pub precision: Precision,
    pub is_real: bool,
}

impl Dtype {
    /// Single-precision real numbers.
    pub const FLOAT32: Self = Self::new(Precision::Single, true);

    /// Double-precision real numbers.
    pub const FLOAT64: Self = Self::new(Precision::Double, true);

    /// Single-precision complex numbers.
    pub const COMPLEX64: Self = Self::new(Precision::Single, false);

    /// Double-precision complex numbers.
    pub const COMPLEX128: Self = Self::new(Precision::Double, false);

    pub const fn new(precision: Precision, is_real: bool) -> Self {
        Self { precision, is_real }
    }

    /// Return the real dtype of the same precision.
    pub const fn as_real(self) -> Self { Self::new(self.precision, true) }

    /// Return the complex dtype of the same precision.
    pub const fn as_complex(self) -> Self { Self::new(self.precision, false) }

    /// Return the dtype that both `self` and `other` are promoted to in a
    /// binary operation: the higher of the two precisions, complex if either
    /// is complex.
    pub fn common(self, other: Self) -> Self {
        Self::new(
            self.precision.max(other.precision),
            self.is_real && other.is_real,
        )
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dtype({}, {})",
            self.precision,
            if self.is_real { "real" } else { "complex" },
        )
    }
}

/// A single number, either real or complex.
///
/// This is what a backend hands out when a tensor is reduced to a single
/// value (e.g. [`item`][crate::backend::BlockBackend::block_item]) and what
/// it accepts as a multiplier in scalar multiplication.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AnyScalar {
    Real(f64),
    Complex(C64),
}

impl AnyScalar {
    /// Return `true` if `self` is `Real`.
    pub fn is_real(&self) -> bool { matches!(self, Self::Real(..)) }

    /// Return `true` if `self` is `Complex`.
    pub fn is_complex(&self) -> bool { matches!(self, Self::Complex(..)) }

    /// Convert to a complex number.
    pub fn to_c64(self) -> C64 {
        match self {
            Self::Real(x) => C64::new(x, 0.0),
            Self::Complex(z) => z,
        }
    }

    /// Return the real part.
    pub fn re(self) -> f64 {
        match self {
            Self::Real(x) => x,
            Self::Complex(z) => z.re,
        }
    }

    /// Return the absolute value.
    pub fn abs(self) -> f64 {
        match self {
            Self::Real(x) => x.abs(),
            Self::Complex(z) => z.norm(),
        }
    }

    /// Return the complex conjugate.
    pub fn conj(self) -> Self {
        match self {
            Self::Real(x) => Self::Real(x),
            Self::Complex(z) => Self::Complex(z.conj()),
        }
    }
}

impl Neg for AnyScalar {
    type Output = Self;

    fn neg(self) -> Self {
        match self {
            Self::Real(x) => Self::Real(-x),
            Self::Complex(z) => Self::Complex(-z),
        }
    }
}

impl From<f64> for AnyScalar {
    fn from(x: f64) -> Self { Self::Real(x) }
}

impl From<f32> for AnyScalar {
    fn from(x: f32) -> Self { Self::Real(x.into()) }
}

impl From<C64> for AnyScalar {
    fn from(z: C64) -> Self { Self::Complex(z) }
}

impl fmt::Display for AnyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(x) => fmt::Display::fmt(x, f),
            Self::Complex(z) => fmt::Display::fmt(z, f),
        }
    }
}
