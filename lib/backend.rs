//! The two halves of a tensor backend.
//!
//! A concrete backend is assembled from one *symmetry* strategy and one
//! *block* strategy:
//!
//! - A [`BlockBackend`] performs numerical operations on single dense blocks.
//!   It knows about shapes and dtypes, but nothing about legs or symmetries.
//! - A [`TensorBackend`] operates on the (backend-specific) data of whole
//!   tensors. It validates and derives leg structure, enforces the
//!   conservation laws encoded by its symmetry, and hands the numerical work
//!   down to the block backend it holds.
//!
//! ```text
//!      TensorBackend            BlockBackend
//!            |                       |
//!   XxxBackend<B> { symmetry,  blocks: B }
//! ```
//!
//! The only symmetry strategy implemented so far is
//! [`NoSymmetryBackend`][crate::no_symmetry::NoSymmetryBackend], whose data is
//! a single block. The only block strategy is
//! [`NdarrayBlockBackend`][crate::ndarray_blocks::NdarrayBlockBackend].
//!
//! A process-wide default backend is available through [`default_backend`];
//! [`get_backend`] selects one by symmetry and block-backend name.

use std::{ fmt, sync::Arc };
use ndarray as nd;
use ndarray_linalg::error::LinalgError;
use num_complex::Complex64 as C64;
use once_cell::sync::Lazy;
use rand::Rng;
use rustc_hash::FxHashSet as HashSet;
use thiserror::Error;
use crate::{
    dtype::{ AnyScalar, Dtype, Precision },
    ndarray_blocks::NdarrayBlockBackend,
    no_symmetry::{ NoSymmetryBackend, NoSymmetryNdarrayBackend },
    symmetries::{ Symmetry, VectorSpace },
};

#[derive(Debug, Error)]
pub enum BackendError {
    /// Returned when an input cannot be interpreted as numeric data of
    /// consistent rectangular shape.
    #[error("cannot interpret input as a block: {0}")]
    Type(String),

    /// Returned when a dtype cannot be represented by a block backend.
    #[error("dtype {0} is not supported by the {1} block backend")]
    UnsupportedDtype(Dtype, &'static str),

    /// Returned when axis extents disagree between operands.
    #[error("shape mismatch in {op}: {msg}")]
    ShapeMismatch { op: &'static str, msg: String },

    /// Returned when axis indices are out of range or repeated, or a
    /// permutation is not a bijection.
    #[error("invalid axes in {op}: {msg}")]
    InvalidAxes { op: &'static str, msg: String },

    /// Returned when legs do not match the data, or two legs being contracted
    /// are not mutually dual.
    #[error("incompatible legs: {0}")]
    IncompatibleLegs(String),

    /// Returned when a symmetry conversion cannot be performed by the current
    /// backend.
    #[error("unsupported symmetry conversion: {0}")]
    UnsupportedSymmetry(String),

    /// Returned when data is not symmetric enough to be represented under a
    /// higher symmetry.
    #[error("data is not symmetric within tolerance: |data - projection| = {residual:e} >= {bound:e}")]
    ToleranceViolation { residual: f64, bound: f64 },

    /// Returned when a leg cannot be split into the requested spaces.
    #[error("cannot split leg {leg}: {msg}")]
    InvalidSplit { leg: usize, msg: String },

    /// Returned when requesting an SVD algorithm that a block backend does
    /// not provide.
    #[error("unknown SVD algorithm '{0}'; available: {1:?}")]
    UnknownSvdAlgorithm(String, Vec<&'static str>),

    /// Returned when selecting a block backend by an unknown name.
    #[error("unknown block backend '{0}'")]
    UnknownBlockBackend(String),

    /// Returned when a matrix operation is applied to a block that is not
    /// rank 2.
    #[error("expected a matrix, got a block of rank {0}")]
    NotAMatrix(usize),

    /// Returned when a square matrix is required.
    #[error("expected a square matrix, got shape {0}x{1}")]
    NotSquare(usize, usize),

    /// Returned when a single entry is requested from a block that does not
    /// have exactly one.
    #[error("expected a block with exactly one entry, got {0}")]
    NotScalar(usize),

    /// Returned when a numerical parameter is out of its allowed range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Returned when a LAPACK routine produces no singular vectors.
    #[error("SVD failed: {0}")]
    Svd(String),

    #[error("layout error: {0}")]
    Layout(#[from] nd::ShapeError),

    #[error("linear algebra error: {0}")]
    Linalg(#[from] LinalgError),
}
use BackendError::*;
pub type BackendResult<T> = Result<T, BackendError>;

/// A nested list of numbers, e.g. `[[1, 2], [3, 4]]`.
///
/// Every list at a given depth must have the same length, and all leaves must
/// sit at the same depth.
#[derive(Clone, Debug, PartialEq)]
pub enum Nested {
    Value(AnyScalar),
    List(Vec<Nested>),
}

impl Nested {
    /// Flatten into a row-major list of values along with the inferred shape.
    ///
    /// Values are reported as complex if any leaf is complex.
    pub fn into_flat(self) -> BackendResult<(Vec<usize>, FlatValues)> {
        let shape = self.shape()?;
        let mut leaves: Vec<AnyScalar> = Vec::with_capacity(shape.iter().product());
        self.collect_leaves(&mut leaves);
        let values
            = if leaves.iter().all(AnyScalar::is_real) {
                FlatValues::Real(leaves.into_iter().map(AnyScalar::re).collect())
            } else {
                FlatValues::Complex(
                    leaves.into_iter().map(AnyScalar::to_c64).collect())
            };
        Ok((shape, values))
    }

    fn shape(&self) -> BackendResult<Vec<usize>> {
        match self {
            Self::Value(_) => Ok(Vec::new()),
            Self::List(items) => {
                let mut shapes = items.iter().map(Self::shape);
                let inner: Vec<usize> = match shapes.next() {
                    Some(first) => first?,
                    None => Vec::new(),
                };
                for shape in shapes {
                    if shape? != inner {
                        return Err(Type("ragged nested list".to_string()));
                    }
                }
                let mut shape = vec![items.len()];
                shape.extend(inner);
                Ok(shape)
            },
        }
    }

    fn collect_leaves(self, acc: &mut Vec<AnyScalar>) {
        match self {
            Self::Value(x) => { acc.push(x); },
            Self::List(items) => {
                items.into_iter().for_each(|item| item.collect_leaves(acc));
            },
        }
    }
}

impl From<f64> for Nested {
    fn from(x: f64) -> Self { Self::Value(AnyScalar::Real(x)) }
}

impl From<C64> for Nested {
    fn from(z: C64) -> Self { Self::Value(AnyScalar::Complex(z)) }
}

impl From<AnyScalar> for Nested {
    fn from(x: AnyScalar) -> Self { Self::Value(x) }
}

impl<T> From<Vec<T>> for Nested
where T: Into<Nested>
{
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Row-major list of values.
#[derive(Clone, Debug, PartialEq)]
pub enum FlatValues {
    Real(Vec<f64>),
    Complex(Vec<C64>),
}

impl FlatValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// The closed set of representations that can be parsed into a block.
#[derive(Clone, Debug)]
pub enum BlockInput<B> {
    /// A nested list of numbers.
    Nested(Nested),
    /// A flat buffer of values in row-major order along with a shape.
    Flat { shape: Vec<usize>, values: FlatValues },
    /// An existing block of the target backend.
    Block(B),
}

impl<B> From<Nested> for BlockInput<B> {
    fn from(nested: Nested) -> Self { Self::Nested(nested) }
}

/// Bounds for a truncated singular value decomposition.
///
/// A `None` bound is disabled. See [`truncate_singular_values`] for how the
/// bounds are combined.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Truncation {
    /// Keep at most this many singular values.
    pub max_singular_values: Option<usize>,
    /// Discard singular values below this value.
    pub threshold: Option<f64>,
    /// Keep enough singular values for the relative norm of the discarded ones
    /// to be at most this value.
    pub max_err: Option<f64>,
}

impl Truncation {
    /// No truncation at all.
    pub fn none() -> Self { Self::default() }

    pub fn max_singular_values(mut self, n: usize) -> Self {
        self.max_singular_values = Some(n);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn max_err(mut self, max_err: f64) -> Self {
        self.max_err = Some(max_err);
        self
    }
}

/// Decide how many of a list of non-increasing singular values to keep.
///
/// Returns the number of kept values along with the relative truncation
/// error, `norm(discarded) / norm(all)`.
///
/// The count is first capped at `max_singular_values`. Within that cap, the
/// `threshold` cutoff (values below it are dropped) and the `max_err` cutoff
/// (the fewest values whose discarded remainder has relative norm at most
/// `max_err`) are both computed and the looser one, keeping more values,
/// applies. The cutoffs never go below one value; only the cap can.
pub fn truncate_singular_values(svals: &[f64], trunc: &Truncation)
    -> (usize, f64)
{
    let n = svals.len();
    if n == 0 { return (0, 0.0); }
    let n_max = trunc.max_singular_values.map_or(n, |m| m.min(n));
    let n_thr
        = trunc.threshold
        .map(|thr| svals.iter().take_while(|s| **s >= thr).count());
    // tail[k] = sum of squares of svals[k..]
    let mut tail: Vec<f64> = vec![0.0; n + 1];
    for k in (0..n).rev() { tail[k] = tail[k + 1] + svals[k].powi(2); }
    let total = tail[0].sqrt();
    let rel_err = |keep: usize| -> f64 {
        if total > 0.0 { tail[keep].sqrt() / total } else { 0.0 }
    };
    let n_err
        = trunc.max_err
        .map(|max_err| (0..=n).find(|k| rel_err(*k) <= max_err).unwrap_or(n));
    let keep
        = match (n_thr, n_err) {
            (None, None) => n_max,
            (Some(k), None) | (None, Some(k)) => k.max(1).min(n_max),
            (Some(k1), Some(k2)) => k1.max(k2).max(1).min(n_max),
        };
    (keep, rel_err(keep))
}

/// Check the policy for converting data to a higher symmetry.
///
/// `residual` is the norm of the difference between the data and its
/// projection onto the symmetric subspace and `norm` is the norm of the data.
/// Fails if `residual >= atol + rtol * norm`, except that an exactly zero
/// residual is always accepted.
pub fn check_projection(residual: f64, norm: f64, atol: f64, rtol: f64)
    -> BackendResult<()>
{
    let bound = atol + rtol * norm;
    if residual > 0.0 && residual >= bound {
        Err(ToleranceViolation { residual, bound })
    } else {
        Ok(())
    }
}

pub(crate) fn check_axes(op: &'static str, rank: usize, axes: &[usize])
    -> BackendResult<()>
{
    if let Some(bad) = axes.iter().find(|ax| **ax >= rank) {
        return Err(InvalidAxes {
            op,
            msg: format!("axis {bad} out of range for rank {rank}"),
        });
    }
    let mut seen: HashSet<usize> = HashSet::default();
    if let Some(dup) = axes.iter().find(|ax| !seen.insert(**ax)) {
        return Err(InvalidAxes { op, msg: format!("repeated axis {dup}") });
    }
    Ok(())
}

pub(crate) fn check_permutation(op: &'static str, rank: usize, perm: &[usize])
    -> BackendResult<()>
{
    if perm.len() != rank {
        return Err(InvalidAxes {
            op,
            msg: format!(
                "expected a permutation of {rank} axes, got {}", perm.len()),
        });
    }
    check_axes(op, rank, perm)
}

pub(crate) fn check_axis_pairs(
    op: &'static str,
    shape1: &[usize],
    shape2: &[usize],
    idcs1: &[usize],
    idcs2: &[usize],
) -> BackendResult<()>
{
    if idcs1.len() != idcs2.len() {
        return Err(InvalidAxes {
            op,
            msg: format!(
                "unequal numbers of paired axes ({} and {})",
                idcs1.len(), idcs2.len(),
            ),
        });
    }
    for (i1, i2) in idcs1.iter().zip(idcs2) {
        if shape1[*i1] != shape2[*i2] {
            return Err(ShapeMismatch {
                op,
                msg: format!(
                    "axis {i1} has extent {} but axis {i2} has extent {}",
                    shape1[*i1], shape2[*i2],
                ),
            });
        }
    }
    Ok(())
}

/// Inverse of a permutation.
pub(crate) fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv: Vec<usize> = vec![0; perm.len()];
    perm.iter().enumerate().for_each(|(k, p)| { inv[*p] = k; });
    inv
}

/// Bookkeeping to undo [`BlockBackend::block_matrixify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixifyAux {
    /// Permutation that was applied before grouping axes.
    pub permutation: Vec<usize>,
    /// Extents of the axes grouped into rows.
    pub row_dims: Vec<usize>,
    /// Extents of the axes grouped into columns.
    pub col_dims: Vec<usize>,
}

/// Numerical operations on single dense blocks.
///
/// Implementations know nothing about legs or symmetries: a block is only a
/// shape and a dtype. Blocks passed by reference are never modified.
pub trait BlockBackend: fmt::Debug + Send + Sync {
    /// A single dense array of numbers.
    type Block: Clone + fmt::Debug + Send + Sync;

    /// The native representation of a [`Dtype`].
    type BlockDtype: Copy + fmt::Debug;

    /// Short name identifying the numerical library.
    fn name(&self) -> &'static str;

    /// Precision used for data parsed without an explicit dtype.
    fn default_precision(&self) -> Precision;

    /// Names of the available SVD algorithms. The first is the default.
    fn svd_algorithms(&self) -> &[&'static str];

    /// Translate a [`Dtype`] into the native representation.
    fn parse_dtype(&self, dtype: Dtype) -> BackendResult<Self::BlockDtype>;

    /// Parse a block from one of the accepted input representations,
    /// optionally converting to `dtype`.
    fn parse_block(&self, obj: BlockInput<Self::Block>, dtype: Option<Dtype>)
        -> BackendResult<Self::Block>;

    fn block_shape(&self, a: &Self::Block) -> Vec<usize>;

    fn block_dtype(&self, a: &Self::Block) -> Dtype;

    /// Return `true` if the block holds real numbers.
    ///
    /// Complex blocks are never reported as real, even if all their imaginary
    /// parts are zero.
    fn block_is_real(&self, a: &Self::Block) -> bool;

    /// Return the single entry of a one-element block.
    fn block_item(&self, a: &Self::Block) -> BackendResult<AnyScalar>;

    fn block_to_dtype(&self, a: &Self::Block, dtype: Dtype)
        -> BackendResult<Self::Block>;

    /// Deep copy.
    fn block_copy(&self, a: &Self::Block) -> Self::Block;

    /// Render a block for display, at most `max_lines` lines of at most
    /// `max_width` characters each, each prefixed with `indent`.
    fn block_repr_lines(
        &self,
        a: &Self::Block,
        indent: &str,
        max_width: usize,
        max_lines: usize,
    ) -> Vec<String>;

    /// Contract axes `idcs_a[k]` of `a` with axes `idcs_b[k]` of `b`.
    ///
    /// The result carries the remaining axes of `a`, then the remaining axes
    /// of `b`, each in their original order.
    fn block_tdot(
        &self,
        a: &Self::Block,
        b: &Self::Block,
        idcs_a: &[usize],
        idcs_b: &[usize],
    ) -> BackendResult<Self::Block>;

    /// Exact thin singular value decomposition `a = u · diag(s) · vh` of a
    /// rank-2 block.
    ///
    /// `s` is a real rank-1 block of non-negative, non-increasing values.
    fn matrix_svd(&self, a: &Self::Block, algorithm: Option<&str>)
        -> BackendResult<(Self::Block, Self::Block, Self::Block)>;

    /// Tensor product; the axes of `a` followed by the axes of `b`.
    fn block_outer(&self, a: &Self::Block, b: &Self::Block)
        -> BackendResult<Self::Block>;

    /// Sum over all entries of `conj(a) * b`.
    fn block_inner(&self, a: &Self::Block, b: &Self::Block)
        -> BackendResult<C64>;

    /// Axis `i` of the result is axis `permutation[i]` of `a`.
    fn block_transpose(&self, a: &Self::Block, permutation: &[usize])
        -> BackendResult<Self::Block>;

    /// Sum the diagonals over each pair of axes `(idcs1[k], idcs2[k])`.
    fn block_trace(&self, a: &Self::Block, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<Self::Block>;

    fn block_conj(&self, a: &Self::Block) -> Self::Block;

    /// Fuse the axes `legs` into a single axis, placed where `legs[0]` was
    /// relative to the remaining axes. Fusion is row-major in the order given.
    fn block_combine_legs(&self, a: &Self::Block, legs: &[usize])
        -> BackendResult<Self::Block>;

    /// Split axis `leg` into axes of extents `dims`.
    fn block_split_leg(&self, a: &Self::Block, leg: usize, dims: &[usize])
        -> BackendResult<Self::Block>;

    /// Elementwise `|a - b| <= atol + rtol * |b|`.
    fn block_allclose(
        &self,
        a: &Self::Block,
        b: &Self::Block,
        rtol: f64,
        atol: f64,
    ) -> BackendResult<bool>;

    /// Remove axes of extent one.
    fn block_squeeze_legs(&self, a: &Self::Block, idcs: &[usize])
        -> BackendResult<Self::Block>;

    /// Frobenius norm.
    fn block_norm(&self, a: &Self::Block) -> f64;

    fn block_add(&self, a: &Self::Block, b: &Self::Block)
        -> BackendResult<Self::Block>;

    fn block_mul(&self, scalar: AnyScalar, a: &Self::Block) -> Self::Block;

    fn matrix_exp(&self, a: &Self::Block) -> BackendResult<Self::Block>;

    fn matrix_log(&self, a: &Self::Block) -> BackendResult<Self::Block>;

    /// Block with normally distributed entries of standard deviation `sigma`.
    ///
    /// Real and imaginary parts of complex entries are drawn independently.
    fn block_random_gaussian<R>(
        &self,
        dims: &[usize],
        dtype: Dtype,
        sigma: f64,
        rng: &mut R,
    ) -> BackendResult<Self::Block>
    where R: Rng + ?Sized;

    fn zero_block(&self, dims: &[usize], dtype: Dtype)
        -> BackendResult<Self::Block>;

    /// Identity over the fused `dims`, with shape `dims ++ dims`.
    fn eye_block(&self, dims: &[usize], dtype: Dtype)
        -> BackendResult<Self::Block>;

    /// Square matrix with a rank-1 block on its diagonal.
    fn block_from_diagonal(&self, diag: &Self::Block)
        -> BackendResult<Self::Block>;

    /// Keep only the first `n` entries along `axis`.
    fn block_keep_leading(&self, a: &Self::Block, axis: usize, n: usize)
        -> BackendResult<Self::Block>;

    /// Read out the entries of a real block in row-major order.
    fn block_real_entries(&self, a: &Self::Block) -> BackendResult<Vec<f64>>;

    /// Group the axes `idcs1` into matrix rows and `idcs2` into matrix
    /// columns. Together, the two must list every axis exactly once, and
    /// neither may be empty.
    fn block_matrixify(&self, a: &Self::Block, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<(Self::Block, MatrixifyAux)>
    {
        let shape = self.block_shape(a);
        if idcs1.is_empty() || idcs2.is_empty() {
            return Err(InvalidAxes {
                op: "matrixify",
                msg: "rows and columns must each have at least one axis"
                    .to_string(),
            });
        }
        let permutation: Vec<usize>
            = idcs1.iter().chain(idcs2).copied().collect();
        check_permutation("matrixify", shape.len(), &permutation)?;
        let n1 = idcs1.len();
        let n = permutation.len();
        let rows: Vec<usize> = (0..n1).collect();
        let cols: Vec<usize> = (1..=n - n1).collect();
        let matrix
            = self.block_combine_legs(
                &self.block_combine_legs(
                    &self.block_transpose(a, &permutation)?, &rows)?,
                &cols,
            )?;
        let aux = MatrixifyAux {
            permutation,
            row_dims: idcs1.iter().map(|k| shape[*k]).collect(),
            col_dims: idcs2.iter().map(|k| shape[*k]).collect(),
        };
        Ok((matrix, aux))
    }

    /// Undo [`Self::block_matrixify`].
    fn block_dematrixify(&self, matrix: &Self::Block, aux: &MatrixifyAux)
        -> BackendResult<Self::Block>
    {
        let split
            = self.block_split_leg(
                &self.block_split_leg(matrix, 1, &aux.col_dims)?,
                0,
                &aux.row_dims,
            )?;
        self.block_transpose(&split, &inverse_permutation(&aux.permutation))
    }
}

/// Outputs of [`TensorBackend::svd`].
#[derive(Clone, Debug)]
pub struct SvdData<D> {
    /// Left singular vectors, with the new leg last.
    pub u: D,
    /// Singular values as a diagonal matrix.
    pub s: D,
    /// Right singular vectors, with the new leg first.
    pub vh: D,
    /// Relative norm of the discarded singular values.
    pub trunc_err: f64,
    /// The new leg appearing on `u` (last) and `s` (second). Its dual appears
    /// on `vh` (first) and `s` (first).
    pub new_space: VectorSpace,
}

/// Operations on the data of whole, symmetry-respecting tensors.
///
/// Axes are always given as integer indices; translating labels and
/// recomputing the legs of results is left to the caller (see
/// [`Tensor`][crate::tensor::Tensor]).
pub trait TensorBackend: fmt::Debug + fmt::Display + Send + Sync {
    /// Dense block type of the underlying block backend.
    type Block: Clone + fmt::Debug + Send + Sync;

    /// Data of a single tensor.
    type Data: Clone + fmt::Debug + Send + Sync;

    fn symmetry(&self) -> &Symmetry;

    fn default_precision(&self) -> Precision;

    fn svd_algorithms(&self) -> &[&'static str];

    fn parse_data(&self, obj: BlockInput<Self::Block>, dtype: Option<Dtype>)
        -> BackendResult<Self::Data>;

    fn infer_dtype(&self, a: &Self::Data) -> Dtype;

    fn to_dtype(&self, a: &Self::Data, dtype: Dtype)
        -> BackendResult<Self::Data>;

    /// Return `true` if the data holds real numbers. Complex data is never
    /// reported as real.
    fn is_real(&self, a: &Self::Data) -> bool;

    /// Infer a list of legs from the data alone, if possible.
    fn infer_legs(&self, a: &Self::Data) -> BackendResult<Vec<VectorSpace>>;

    /// Return `true` if `legs` are a valid description of `a`.
    fn legs_are_compatible(&self, a: &Self::Data, legs: &[VectorSpace]) -> bool;

    fn item(&self, a: &Self::Data) -> BackendResult<AnyScalar>;

    /// Forget about symmetry structure and convert to a single block.
    fn to_dense_block(&self, a: &Self::Data) -> BackendResult<Self::Block>;

    fn from_dense_block(&self, block: Self::Block, legs: &[VectorSpace])
        -> BackendResult<Self::Data>;

    /// Copy such that future in-place operations on the output do not affect
    /// the input.
    fn copy_data(&self, a: &Self::Data) -> Self::Data;

    fn data_repr_lines(
        &self,
        a: &Self::Data,
        indent: &str,
        max_width: usize,
        max_lines: usize,
    ) -> Vec<String>;

    fn tdot(
        &self,
        a: &Self::Data,
        b: &Self::Data,
        axs_a: &[usize],
        axs_b: &[usize],
    ) -> BackendResult<Self::Data>;

    fn outer(&self, a: &Self::Data, b: &Self::Data)
        -> BackendResult<Self::Data>;

    /// Inner product `<a|b>`, conjugate-linear in `a`.
    fn inner(&self, a: &Self::Data, b: &Self::Data) -> BackendResult<C64>;

    fn transpose(&self, a: &Self::Data, permutation: &[usize])
        -> BackendResult<Self::Data>;

    fn trace(&self, a: &Self::Data, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<Self::Data>;

    fn conj(&self, a: &Self::Data) -> Self::Data;

    /// Combine the legs `idcs` into `new_leg`, placed where `idcs[0]` was.
    fn combine_legs(&self, a: &Self::Data, idcs: &[usize], new_leg: &VectorSpace)
        -> BackendResult<Self::Data>;

    /// Split leg `leg` back into `orig_spaces`.
    fn split_leg(&self, a: &Self::Data, leg: usize, orig_spaces: &[VectorSpace])
        -> BackendResult<Self::Data>;

    /// Convert to a lower symmetry group.
    fn reduce_symmetry(&self, a: &Self::Data, new_symm: &Symmetry)
        -> BackendResult<Self::Data>;

    /// Convert to a higher symmetry group, if the data is symmetric under it
    /// within tolerance (see [`check_projection`]).
    fn increase_symmetry(
        &self,
        a: &Self::Data,
        new_symm: &Symmetry,
        atol: f64,
        rtol: f64,
    ) -> BackendResult<Self::Data>;

    /// Dimension of the space of symmetry-allowed tensors with the given legs.
    fn num_parameters(&self, legs: &[VectorSpace]) -> usize;

    /// Truncated singular value decomposition, grouping the legs `idcs1` into
    /// rows and `idcs2` into columns.
    fn svd(
        &self,
        a: &Self::Data,
        idcs1: &[usize],
        idcs2: &[usize],
        truncation: &Truncation,
        algorithm: Option<&str>,
    ) -> BackendResult<SvdData<Self::Data>>;

    fn allclose(&self, a: &Self::Data, b: &Self::Data, rtol: f64, atol: f64)
        -> BackendResult<bool>;

    fn squeeze_legs(&self, a: &Self::Data, idcs: &[usize])
        -> BackendResult<Self::Data>;

    fn norm(&self, a: &Self::Data) -> f64;

    /// Matrix exponential, treating legs `idcs1` as rows and `idcs2` as
    /// columns.
    fn exp(&self, a: &Self::Data, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<Self::Data>;

    /// Matrix logarithm, treating legs `idcs1` as rows and `idcs2` as
    /// columns.
    fn log(&self, a: &Self::Data, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<Self::Data>;

    fn random_gaussian<R>(
        &self,
        legs: &[VectorSpace],
        dtype: Dtype,
        sigma: f64,
        rng: &mut R,
    ) -> BackendResult<Self::Data>
    where R: Rng + ?Sized;

    fn add(&self, a: &Self::Data, b: &Self::Data) -> BackendResult<Self::Data>;

    fn mul(&self, scalar: AnyScalar, a: &Self::Data) -> Self::Data;

    fn zero_data(&self, legs: &[VectorSpace], dtype: Dtype)
        -> BackendResult<Self::Data>;

    /// Identity from `legs` to themselves; the data carries `legs` followed
    /// by their duals.
    fn eye_data(&self, legs: &[VectorSpace], dtype: Dtype)
        -> BackendResult<Self::Data>;
}

static DEFAULT_BACKEND: Lazy<Arc<NoSymmetryNdarrayBackend>>
    = Lazy::new(|| Arc::new(NoSymmetryBackend::new(NdarrayBlockBackend::default())));

/// Return the process-wide default backend.
pub fn default_backend() -> Arc<NoSymmetryNdarrayBackend> {
    Arc::clone(Lazy::force(&DEFAULT_BACKEND))
}

/// Select a shared backend instance by symmetry and block-backend name.
///
/// Fails if no backend is available for `symmetry` or if `block_backend` is
/// not a known block backend.
pub fn get_backend(symmetry: &Symmetry, block_backend: &str)
    -> BackendResult<Arc<NoSymmetryNdarrayBackend>>
{
    if block_backend != NdarrayBlockBackend::NAME {
        return Err(UnknownBlockBackend(block_backend.to_string()));
    }
    if !symmetry.is_trivial() {
        return Err(UnsupportedSymmetry(
            format!("no backend available for symmetry {symmetry}")));
    }
    let backend = default_backend();
    log::debug!("selected backend {backend}");
    Ok(backend)
}
