//! The trivial symmetry strategy: the data of a tensor is a single dense block
//! and every operation is passed straight through to a [`BlockBackend`].

use std::fmt;
use num_complex::Complex64 as C64;
use rand::Rng;
use crate::{
    backend::{
        check_projection,
        truncate_singular_values,
        BackendError,
        BackendResult,
        BlockBackend,
        BlockInput,
        SvdData,
        TensorBackend,
        Truncation,
    },
    dtype::{ AnyScalar, Dtype, Precision },
    ndarray_blocks::NdarrayBlockBackend,
    symmetries::{ Symmetry, VectorSpace },
};
use BackendError::*;

/// Tensor backend for tensors without symmetry, generic over the block
/// backend.
#[derive(Clone, Debug, Default)]
pub struct NoSymmetryBackend<B> {
    symmetry: Symmetry,
    blocks: B,
}

/// [`NoSymmetryBackend`] on top of [`ndarray`] blocks.
pub type NoSymmetryNdarrayBackend = NoSymmetryBackend<NdarrayBlockBackend>;

impl<B: BlockBackend> NoSymmetryBackend<B> {
    pub fn new(blocks: B) -> Self {
        Self { symmetry: Symmetry::NoSymmetry, blocks }
    }

    /// Return a reference to the underlying block backend.
    pub fn blocks(&self) -> &B { &self.blocks }

    fn block_dims(legs: &[VectorSpace]) -> Vec<usize> {
        legs.iter().map(VectorSpace::dim).collect()
    }
}

impl<B: BlockBackend> fmt::Display for NoSymmetryBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoSymmetryBackend<{}>({})", self.blocks.name(), self.symmetry)
    }
}

impl<B: BlockBackend> TensorBackend for NoSymmetryBackend<B> {
    type Block = B::Block;
    type Data = B::Block;

    fn symmetry(&self) -> &Symmetry { &self.symmetry }

    fn default_precision(&self) -> Precision { self.blocks.default_precision() }

    fn svd_algorithms(&self) -> &[&'static str] { self.blocks.svd_algorithms() }

    fn parse_data(&self, obj: BlockInput<B::Block>, dtype: Option<Dtype>)
        -> BackendResult<B::Block>
    {
        self.blocks.parse_block(obj, dtype)
    }

    fn infer_dtype(&self, a: &B::Block) -> Dtype { self.blocks.block_dtype(a) }

    fn to_dtype(&self, a: &B::Block, dtype: Dtype) -> BackendResult<B::Block> {
        self.blocks.block_to_dtype(a, dtype)
    }

    fn is_real(&self, a: &B::Block) -> bool { self.blocks.block_is_real(a) }

    fn infer_legs(&self, a: &B::Block) -> BackendResult<Vec<VectorSpace>> {
        let is_real = self.blocks.block_is_real(a);
        Ok(
            self.blocks.block_shape(a).into_iter()
                .map(|d| VectorSpace::non_symmetric(d).with_realness(is_real))
                .collect()
        )
    }

    fn legs_are_compatible(&self, a: &B::Block, legs: &[VectorSpace]) -> bool {
        let shape = self.blocks.block_shape(a);
        shape.len() == legs.len()
            && shape.iter().zip(legs)
                .all(|(d, leg)| leg.symmetry().is_trivial() && leg.dim() == *d)
    }

    fn item(&self, a: &B::Block) -> BackendResult<AnyScalar> {
        self.blocks.block_item(a)
    }

    fn to_dense_block(&self, a: &B::Block) -> BackendResult<B::Block> {
        Ok(self.blocks.block_copy(a))
    }

    fn from_dense_block(&self, block: B::Block, legs: &[VectorSpace])
        -> BackendResult<B::Block>
    {
        if self.legs_are_compatible(&block, legs) {
            Ok(block)
        } else {
            Err(IncompatibleLegs(format!(
                "legs {legs:?} do not describe a block of shape {:?}",
                self.blocks.block_shape(&block),
            )))
        }
    }

    fn copy_data(&self, a: &B::Block) -> B::Block { self.blocks.block_copy(a) }

    fn data_repr_lines(
        &self,
        a: &B::Block,
        indent: &str,
        max_width: usize,
        max_lines: usize,
    ) -> Vec<String>
    {
        self.blocks.block_repr_lines(a, indent, max_width, max_lines)
    }

    fn tdot(
        &self,
        a: &B::Block,
        b: &B::Block,
        axs_a: &[usize],
        axs_b: &[usize],
    ) -> BackendResult<B::Block>
    {
        self.blocks.block_tdot(a, b, axs_a, axs_b)
    }

    fn outer(&self, a: &B::Block, b: &B::Block) -> BackendResult<B::Block> {
        self.blocks.block_outer(a, b)
    }

    fn inner(&self, a: &B::Block, b: &B::Block) -> BackendResult<C64> {
        self.blocks.block_inner(a, b)
    }

    fn transpose(&self, a: &B::Block, permutation: &[usize])
        -> BackendResult<B::Block>
    {
        self.blocks.block_transpose(a, permutation)
    }

    fn trace(&self, a: &B::Block, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<B::Block>
    {
        self.blocks.block_trace(a, idcs1, idcs2)
    }

    fn conj(&self, a: &B::Block) -> B::Block { self.blocks.block_conj(a) }

    fn combine_legs(&self, a: &B::Block, idcs: &[usize], new_leg: &VectorSpace)
        -> BackendResult<B::Block>
    {
        let shape = self.blocks.block_shape(a);
        let fused: usize
            = idcs.iter().filter_map(|k| shape.get(*k)).product();
        if new_leg.dim() != fused {
            return Err(IncompatibleLegs(format!(
                "combined leg {new_leg} does not have dimension {fused}")));
        }
        self.blocks.block_combine_legs(a, idcs)
    }

    fn split_leg(&self, a: &B::Block, leg: usize, orig_spaces: &[VectorSpace])
        -> BackendResult<B::Block>
    {
        self.blocks.block_split_leg(a, leg, &Self::block_dims(orig_spaces))
    }

    fn reduce_symmetry(&self, a: &B::Block, new_symm: &Symmetry)
        -> BackendResult<B::Block>
    {
        if new_symm.is_trivial() {
            Ok(self.blocks.block_copy(a))
        } else {
            Err(UnsupportedSymmetry(format!(
                "cannot reduce {} to {new_symm}", self.symmetry)))
        }
    }

    fn increase_symmetry(
        &self,
        a: &B::Block,
        new_symm: &Symmetry,
        atol: f64,
        rtol: f64,
    ) -> BackendResult<B::Block>
    {
        if !new_symm.is_trivial() {
            return Err(UnsupportedSymmetry(format!(
                "{self} cannot represent data with symmetry {new_symm}")));
        }
        // projecting onto the trivial symmetry leaves everything in place
        let projected = self.blocks.block_copy(a);
        let diff
            = self.blocks.block_add(
                a, &self.blocks.block_mul(AnyScalar::Real(-1.0), &projected))?;
        check_projection(
            self.blocks.block_norm(&diff),
            self.blocks.block_norm(a),
            atol,
            rtol,
        )?;
        Ok(projected)
    }

    fn num_parameters(&self, legs: &[VectorSpace]) -> usize {
        legs.iter().map(VectorSpace::dim).product()
    }

    fn svd(
        &self,
        a: &B::Block,
        idcs1: &[usize],
        idcs2: &[usize],
        truncation: &Truncation,
        algorithm: Option<&str>,
    ) -> BackendResult<SvdData<B::Block>>
    {
        if truncation.max_singular_values == Some(0) {
            return Err(InvalidParameter(
                "max_singular_values must be at least 1".to_string()));
        }
        let (matrix, aux) = self.blocks.block_matrixify(a, idcs1, idcs2)?;
        let (u, s, vh) = self.blocks.matrix_svd(&matrix, algorithm)?;
        let svals = self.blocks.block_real_entries(&s)?;
        let (keep, trunc_err) = truncate_singular_values(&svals, truncation);
        if keep < svals.len() {
            log::debug!(
                "truncated {} of {} singular values (relative error {trunc_err:e})",
                svals.len() - keep,
                svals.len(),
            );
        }
        let u
            = self.blocks.block_split_leg(
                &self.blocks.block_keep_leading(&u, 1, keep)?, 0, &aux.row_dims)?;
        let s
            = self.blocks.block_from_diagonal(
                &self.blocks.block_keep_leading(&s, 0, keep)?)?;
        let vh
            = self.blocks.block_split_leg(
                &self.blocks.block_keep_leading(&vh, 0, keep)?, 1, &aux.col_dims)?;
        let new_space
            = VectorSpace::non_symmetric(keep)
            .with_realness(self.blocks.block_is_real(a));
        Ok(SvdData { u, s, vh, trunc_err, new_space })
    }

    fn allclose(&self, a: &B::Block, b: &B::Block, rtol: f64, atol: f64)
        -> BackendResult<bool>
    {
        self.blocks.block_allclose(a, b, rtol, atol)
    }

    fn squeeze_legs(&self, a: &B::Block, idcs: &[usize])
        -> BackendResult<B::Block>
    {
        self.blocks.block_squeeze_legs(a, idcs)
    }

    fn norm(&self, a: &B::Block) -> f64 { self.blocks.block_norm(a) }

    fn exp(&self, a: &B::Block, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<B::Block>
    {
        let (matrix, aux) = self.blocks.block_matrixify(a, idcs1, idcs2)?;
        self.blocks.block_dematrixify(&self.blocks.matrix_exp(&matrix)?, &aux)
    }

    fn log(&self, a: &B::Block, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<B::Block>
    {
        let (matrix, aux) = self.blocks.block_matrixify(a, idcs1, idcs2)?;
        self.blocks.block_dematrixify(&self.blocks.matrix_log(&matrix)?, &aux)
    }

    fn random_gaussian<R>(
        &self,
        legs: &[VectorSpace],
        dtype: Dtype,
        sigma: f64,
        rng: &mut R,
    ) -> BackendResult<B::Block>
    where R: Rng + ?Sized
    {
        self.blocks.block_random_gaussian(
            &Self::block_dims(legs), dtype, sigma, rng)
    }

    fn add(&self, a: &B::Block, b: &B::Block) -> BackendResult<B::Block> {
        self.blocks.block_add(a, b)
    }

    fn mul(&self, scalar: AnyScalar, a: &B::Block) -> B::Block {
        self.blocks.block_mul(scalar, a)
    }

    fn zero_data(&self, legs: &[VectorSpace], dtype: Dtype)
        -> BackendResult<B::Block>
    {
        self.blocks.zero_block(&Self::block_dims(legs), dtype)
    }

    fn eye_data(&self, legs: &[VectorSpace], dtype: Dtype)
        -> BackendResult<B::Block>
    {
        self.blocks.eye_block(&Self::block_dims(legs), dtype)
    }
}
