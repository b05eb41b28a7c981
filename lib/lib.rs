//! Pluggable numerical backends for symmetry-aware tensors.
//!
//! Tensors here are multi-dimensional arrays whose legs are described by
//! [`VectorSpace`][symmetries::VectorSpace]s and which may be constrained by a
//! [`Symmetry`][symmetries::Symmetry]. All numerics are delegated to a
//! backend, which is split into two orthogonal halves (see [`backend`]):
//!
//! - a symmetry strategy, implementing [`TensorBackend`][backend::TensorBackend]
//!   on whole-tensor data;
//! - a block strategy, implementing [`BlockBackend`][backend::BlockBackend] on
//!   single dense arrays.
//!
//! The provided combination is
//! [`NoSymmetryNdarrayBackend`][no_symmetry::NoSymmetryNdarrayBackend]: no
//! symmetry, with dense blocks held as [`ndarray`] arrays.
//!
//! ```
//! use tensor_backends::prelude::*;
//!
//! let backend = default_backend();
//! let a = Tensor::from_nested(
//!     vec![vec![1.0, 2.0], vec![3.0, 4.0]], backend.clone())
//!     .unwrap()
//!     .with_labels(["a", "b"])
//!     .unwrap();
//! let b = a.conj();
//! let c = a.tdot(&b, ["b"], ["b*"]).unwrap();
//! assert_eq!(c.labels(), &[Some("a".to_string()), Some("a*".to_string())]);
//! assert!((c.trace([0], [1]).unwrap().item().unwrap().re() - 30.0).abs() < 1e-12);
//! ```

use ndarray_linalg::Scalar;
use num_complex::Complex64 as C64;
use num_traits::ToPrimitive;

pub mod dtype;
pub mod symmetries;
pub mod backend;
pub mod ndarray_blocks;
pub mod no_symmetry;
pub mod tensor;

/// Common imports.
pub mod prelude {
    pub use crate::{
        backend::{
            default_backend,
            get_backend,
            BackendError,
            BlockBackend,
            BlockInput,
            Nested,
            TensorBackend,
            Truncation,
        },
        dtype::{ AnyScalar, Dtype, Precision },
        ndarray_blocks::{ NdBlock, NdarrayBlockBackend },
        no_symmetry::{ NoSymmetryBackend, NoSymmetryNdarrayBackend },
        symmetries::{ Symmetry, VectorSpace },
        tensor::{ LegRef, SvdOptions, Tensor, TensorError },
    };
}

/// Extension trait for [`Scalar`].
pub trait ScalarExt: Scalar {
    /// Convert from a real `f64`.
    fn from_re(x: f64) -> Self;

    /// Convert to a `Complex64`.
    fn to_c64(self) -> C64;
}

impl<A: Scalar> ScalarExt for A {
    fn from_re(x: f64) -> Self { Self::from_real(Self::real(x)) }

    fn to_c64(self) -> C64 {
        C64::new(real_to_f64(self.re()), real_to_f64(self.im()))
    }
}

#[inline]
pub(crate) fn real_to_f64<R: ToPrimitive>(x: R) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}
