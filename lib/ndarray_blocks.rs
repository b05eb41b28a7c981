//! Dense blocks held as [`ndarray`] arrays.
//!
//! Blocks are dynamically-dimensioned arrays of one of four element types:
//! `f32`, `f64`, `Complex32`, or `Complex64`. Binary operations promote both
//! operands to their common type first (see [`Dtype::common`]). Matrix
//! decompositions go through LAPACK via [`ndarray_linalg`].

use std::fmt;
use ndarray::{ self as nd, IxDyn };
use ndarray_linalg::{ Eig, Inverse, JobSvd, Lapack, Norm, SVD, SVDDC, Scalar };
use num_complex::{ Complex32 as C32, Complex64 as C64 };
use num_traits::{ One, Zero };
use rand::{ Rng, distributions::Distribution };
use statrs::distribution::Normal;
use crate::{
    ScalarExt,
    real_to_f64,
    backend::{
        check_axes,
        check_axis_pairs,
        check_permutation,
        BackendError,
        BackendResult,
        BlockBackend,
        BlockInput,
        FlatValues,
    },
    dtype::{ AnyScalar, Dtype, Precision },
};
use BackendError::*;

/// Native element type of an [`NdBlock`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NdDtype {
    F32,
    F64,
    C32,
    C64,
}

impl NdDtype {
    fn from_parts(double: bool, real: bool) -> Self {
        match (double, real) {
            (false, true) => Self::F32,
            (true, true) => Self::F64,
            (false, false) => Self::C32,
            (true, false) => Self::C64,
        }
    }

    pub fn is_real(self) -> bool { matches!(self, Self::F32 | Self::F64) }

    pub fn is_double(self) -> bool { matches!(self, Self::F64 | Self::C64) }

    pub fn as_real(self) -> Self { Self::from_parts(self.is_double(), true) }

    pub fn as_complex(self) -> Self { Self::from_parts(self.is_double(), false) }

    /// Type that both operands of a binary operation are promoted to.
    pub fn common(self, other: Self) -> Self {
        Self::from_parts(
            self.is_double() || other.is_double(),
            self.is_real() && other.is_real(),
        )
    }

    pub fn to_dtype(self) -> Dtype {
        match self {
            Self::F32 => Dtype::FLOAT32,
            Self::F64 => Dtype::FLOAT64,
            Self::C32 => Dtype::COMPLEX64,
            Self::C64 => Dtype::COMPLEX128,
        }
    }
}

/// A single dense block.
#[derive(Clone, Debug, PartialEq)]
pub enum NdBlock {
    F32(nd::ArrayD<f32>),
    F64(nd::ArrayD<f64>),
    C32(nd::ArrayD<C32>),
    C64(nd::ArrayD<C64>),
}

macro_rules! on_block {
    ( $block:expr, $arr:ident => $body:expr ) => {
        match $block {
            NdBlock::F32($arr) => $body,
            NdBlock::F64($arr) => $body,
            NdBlock::C32($arr) => $body,
            NdBlock::C64($arr) => $body,
        }
    }
}

macro_rules! map_block {
    ( $block:expr, $arr:ident => $body:expr ) => {
        match $block {
            NdBlock::F32($arr) => NdBlock::F32($body),
            NdBlock::F64($arr) => NdBlock::F64($body),
            NdBlock::C32($arr) => NdBlock::C32($body),
            NdBlock::C64($arr) => NdBlock::C64($body),
        }
    }
}

// two blocks promoted to a common element type
enum Pair {
    F32(nd::ArrayD<f32>, nd::ArrayD<f32>),
    F64(nd::ArrayD<f64>, nd::ArrayD<f64>),
    C32(nd::ArrayD<C32>, nd::ArrayD<C32>),
    C64(nd::ArrayD<C64>, nd::ArrayD<C64>),
}

macro_rules! on_pair {
    ( $pair:expr, ($a:ident, $b:ident) => $body:expr ) => {
        match $pair {
            Pair::F32($a, $b) => $body,
            Pair::F64($a, $b) => $body,
            Pair::C32($a, $b) => $body,
            Pair::C64($a, $b) => $body,
        }
    }
}

macro_rules! map_pair {
    ( $pair:expr, ($a:ident, $b:ident) => $body:expr ) => {
        match $pair {
            Pair::F32($a, $b) => NdBlock::F32($body),
            Pair::F64($a, $b) => NdBlock::F64($body),
            Pair::C32($a, $b) => NdBlock::C32($body),
            Pair::C64($a, $b) => NdBlock::C64($body),
        }
    }
}

fn promote(a: &NdBlock, b: &NdBlock) -> Pair {
    match a.nd_dtype().common(b.nd_dtype()) {
        NdDtype::F32 => Pair::F32(a.to_f32_array(), b.to_f32_array()),
        NdDtype::F64 => Pair::F64(a.to_f64_array(), b.to_f64_array()),
        NdDtype::C32 => Pair::C32(a.to_c32_array(), b.to_c32_array()),
        NdDtype::C64 => Pair::C64(a.to_c64_array(), b.to_c64_array()),
    }
}

impl NdBlock {
    pub fn shape(&self) -> &[usize] { on_block!(self, a => a.shape()) }

    pub fn ndim(&self) -> usize { on_block!(self, a => a.ndim()) }

    /// Total number of entries.
    pub fn len(&self) -> usize { on_block!(self, a => a.len()) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn nd_dtype(&self) -> NdDtype {
        match self {
            Self::F32(_) => NdDtype::F32,
            Self::F64(_) => NdDtype::F64,
            Self::C32(_) => NdDtype::C32,
            Self::C64(_) => NdDtype::C64,
        }
    }

    // complex -> real conversions keep only the real part
    fn to_f32_array(&self) -> nd::ArrayD<f32> {
        match self {
            Self::F32(a) => a.clone(),
            Self::F64(a) => a.mapv(|x| x as f32),
            Self::C32(a) => a.mapv(|z| z.re),
            Self::C64(a) => a.mapv(|z| z.re as f32),
        }
    }

    fn to_f64_array(&self) -> nd::ArrayD<f64> {
        match self {
            Self::F32(a) => a.mapv(f64::from),
            Self::F64(a) => a.clone(),
            Self::C32(a) => a.mapv(|z| f64::from(z.re)),
            Self::C64(a) => a.mapv(|z| z.re),
        }
    }

    fn to_c32_array(&self) -> nd::ArrayD<C32> {
        match self {
            Self::F32(a) => a.mapv(|x| C32::new(x, 0.0)),
            Self::F64(a) => a.mapv(|x| C32::new(x as f32, 0.0)),
            Self::C32(a) => a.clone(),
            Self::C64(a) => a.mapv(|z| C32::new(z.re as f32, z.im as f32)),
        }
    }

    fn to_c64_array(&self) -> nd::ArrayD<C64> {
        match self {
            Self::F32(a) => a.mapv(|x| C64::new(f64::from(x), 0.0)),
            Self::F64(a) => a.mapv(|x| C64::new(x, 0.0)),
            Self::C32(a) => a.mapv(|z| C64::new(f64::from(z.re), f64::from(z.im))),
            Self::C64(a) => a.clone(),
        }
    }

    fn into_nd_dtype(self, dtype: NdDtype) -> Self {
        if self.nd_dtype() == dtype { return self; }
        match dtype {
            NdDtype::F32 => Self::F32(self.to_f32_array()),
            NdDtype::F64 => Self::F64(self.to_f64_array()),
            NdDtype::C32 => Self::C32(self.to_c32_array()),
            NdDtype::C64 => Self::C64(self.to_c64_array()),
        }
    }

    // largest magnitude of any imaginary part
    fn max_imag(&self) -> f64 {
        match self {
            Self::F32(_) | Self::F64(_) => 0.0,
            Self::C32(a) => a.iter().fold(0.0_f64, |acc, z| acc.max(f64::from(z.im.abs()))),
            Self::C64(a) => a.iter().fold(0.0_f64, |acc, z| acc.max(z.im.abs())),
        }
    }

    fn max_abs(&self) -> f64 {
        on_block!(self, a => a.iter().fold(0.0_f64, |acc, v| acc.max(real_to_f64(v.abs()))))
    }
}

macro_rules! impl_from_array {
    ( $elem:ty, $variant:ident ) => {
        impl<D: nd::Dimension> From<nd::Array<$elem, D>> for NdBlock {
            fn from(a: nd::Array<$elem, D>) -> Self { Self::$variant(a.into_dyn()) }
        }

        impl<D: nd::Dimension> From<nd::Array<$elem, D>> for BlockInput<NdBlock> {
            fn from(a: nd::Array<$elem, D>) -> Self { Self::Block(a.into()) }
        }
    }
}
impl_from_array!(f32, F32);
impl_from_array!(f64, F64);
impl_from_array!(C32, C32);
impl_from_array!(C64, C64);

impl From<NdBlock> for BlockInput<NdBlock> {
    fn from(block: NdBlock) -> Self { Self::Block(block) }
}

impl fmt::Display for NdBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        on_block!(self, a => fmt::Display::fmt(a, f))
    }
}

fn permute_reshape<A>(a: &nd::ArrayD<A>, perm: &[usize], shape: &[usize])
    -> BackendResult<nd::ArrayD<A>>
where A: Clone
{
    Ok(
        a.view()
            .permuted_axes(perm)
            .as_standard_layout()
            .into_owned()
            .into_shape(shape)?
    )
}

fn reshape<A>(a: &nd::ArrayD<A>, shape: &[usize])
    -> BackendResult<nd::ArrayD<A>>
where A: Clone
{
    Ok(a.as_standard_layout().into_owned().into_shape(shape)?)
}

fn tdot_kernel<A>(
    a: &nd::ArrayD<A>,
    b: &nd::ArrayD<A>,
    idcs_a: &[usize],
    idcs_b: &[usize],
) -> BackendResult<nd::ArrayD<A>>
where A: nd::LinalgScalar
{
    let free_a: Vec<usize>
        = (0..a.ndim()).filter(|k| !idcs_a.contains(k)).collect();
    let free_b: Vec<usize>
        = (0..b.ndim()).filter(|k| !idcs_b.contains(k)).collect();
    let m: usize = free_a.iter().map(|k| a.shape()[*k]).product();
    let c: usize = idcs_a.iter().map(|k| a.shape()[*k]).product();
    let n: usize = free_b.iter().map(|k| b.shape()[*k]).product();
    let perm_a: Vec<usize> = free_a.iter().chain(idcs_a).copied().collect();
    let perm_b: Vec<usize> = idcs_b.iter().chain(&free_b).copied().collect();
    let mat_a: nd::Array2<A>
        = permute_reshape(a, &perm_a, &[m, c])?
        .into_dimensionality::<nd::Ix2>()?;
    let mat_b: nd::Array2<A>
        = permute_reshape(b, &perm_b, &[c, n])?
        .into_dimensionality::<nd::Ix2>()?;
    let shape: Vec<usize>
        = free_a.iter().map(|k| a.shape()[*k])
        .chain(free_b.iter().map(|k| b.shape()[*k]))
        .collect();
    Ok(mat_a.dot(&mat_b).into_shape(shape)?)
}

fn trace_kernel<A>(a: &nd::ArrayD<A>, idcs1: &[usize], idcs2: &[usize])
    -> BackendResult<nd::ArrayD<A>>
where A: nd::LinalgScalar
{
    let rest: Vec<usize>
        = (0..a.ndim())
        .filter(|k| !idcs1.contains(k) && !idcs2.contains(k))
        .collect();
    let rest_shape: Vec<usize> = rest.iter().map(|k| a.shape()[*k]).collect();
    let r: usize = rest_shape.iter().product();
    let k: usize = idcs1.iter().map(|i| a.shape()[*i]).product();
    let perm: Vec<usize>
        = rest.iter().chain(idcs1).chain(idcs2).copied().collect();
    let a3: nd::Array3<A>
        = permute_reshape(a, &perm, &[r, k, k])?
        .into_dimensionality::<nd::Ix3>()?;
    let diag_sums: nd::Array1<A>
        = (0..r)
        .map(|i| (0..k).fold(A::zero(), |acc, j| acc + a3[[i, j, j]]))
        .collect();
    Ok(diag_sums.into_shape(rest_shape)?)
}

fn inner_kernel<A>(a: &nd::ArrayD<A>, b: &nd::ArrayD<A>) -> C64
where A: Scalar
{
    a.iter().zip(b.iter())
        .fold(A::zero(), |acc, (x, y)| acc + x.conj() * *y)
        .to_c64()
}

fn allclose_kernel<A>(a: &nd::ArrayD<A>, b: &nd::ArrayD<A>, rtol: f64, atol: f64)
    -> bool
where A: Scalar
{
    a.iter().zip(b.iter())
        .all(|(x, y)| {
            real_to_f64((*x - *y).abs()) <= atol + rtol * real_to_f64(y.abs())
        })
}

fn scale<A>(a: &nd::ArrayD<A>, s: A) -> nd::ArrayD<A>
where A: Scalar
{
    a.mapv(|x| x * s)
}

fn eye_kernel<A>(dims: &[usize]) -> BackendResult<nd::ArrayD<A>>
where A: Clone + Zero + One
{
    let n: usize = dims.iter().product();
    let shape: Vec<usize> = dims.iter().chain(dims).copied().collect();
    Ok(nd::Array2::<A>::eye(n).into_shape(shape)?)
}

type SvdParts<A> = (nd::ArrayD<A>, nd::ArrayD<<A as Scalar>::Real>, nd::ArrayD<A>);

fn svd_kernel<A>(a: &nd::ArrayD<A>, driver: SvdDriver)
    -> BackendResult<SvdParts<A>>
where A: Scalar + Lapack
{
    let mat: nd::ArrayView2<A> = a.view().into_dimensionality::<nd::Ix2>()?;
    let (m, n) = mat.dim();
    let k = m.min(n);
    if k == 0 {
        return Ok((
            nd::ArrayD::zeros(nd::IxDyn(&[m, 0])),
            nd::ArrayD::zeros(nd::IxDyn(&[0])),
            nd::ArrayD::zeros(nd::IxDyn(&[0, n])),
        ));
    }
    let (u, s, vt)
        = match driver {
            SvdDriver::Gesdd => mat.svddc(JobSvd::Some)?,
            SvdDriver::Gesvd => mat.svd(true, true)?,
        };
    let (Some(u), Some(vt)) = (u, vt)
        else { return Err(Svd("no singular vectors returned".to_string())); };
    // gesvd computes full U and V^h
    let u = u.slice(nd::s![.., ..k]).to_owned().into_dyn();
    let vt = vt.slice(nd::s![..k, ..]).to_owned().into_dyn();
    Ok((u, s.into_dyn(), vt))
}

const EXPM_MAX_TERMS: usize = 64;

// scaling and squaring with a Taylor series
fn expm<A>(a: nd::Array2<A>) -> nd::Array2<A>
where A: Scalar + Lapack
{
    let n = a.nrows();
    let size = real_to_f64(a.norm_l1());
    let squarings: i32
        = if size > 0.5 { (size / 0.5).log2().ceil() as i32 } else { 0 };
    let factor = A::from_re(0.5_f64.powi(squarings));
    let x: nd::Array2<A> = a.mapv(|aij| aij * factor);
    let mut term: nd::Array2<A> = nd::Array2::eye(n);
    let mut acc: nd::Array2<A> = term.clone();
    for k in 1..=EXPM_MAX_TERMS {
        let kinv = A::from_re((k as f64).recip());
        term = term.dot(&x).mapv(|tij| tij * kinv);
        acc += &term;
        if real_to_f64(term.norm_l1()) <= f64::EPSILON * real_to_f64(acc.norm_l1()) {
            break;
        }
    }
    (0..squarings).fold(acc, |acc, _| acc.dot(&acc))
}

// via eigendecomposition; requires a diagonalizable matrix
fn logm(a: &nd::Array2<C64>) -> BackendResult<nd::Array2<C64>> {
    let (vals, vecs) = a.eig()?;
    let vecs_inv = vecs.inv()?;
    let logs = vals.mapv(|z| z.ln()).insert_axis(nd::Axis(0));
    Ok((&vecs * &logs).dot(&vecs_inv))
}

// relative size of imaginary parts below which a logarithm is taken to be real
const LOG_IMAG_TOL: f64 = 1e-12;

fn clip_line(indent: &str, line: &str, max_width: usize) -> String {
    let full = format!("{indent}{line}");
    if full.chars().count() <= max_width {
        full
    } else {
        let mut clipped: String
            = full.chars().take(max_width.saturating_sub(3)).collect();
        clipped.push_str("...");
        clipped
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SvdDriver {
    Gesdd,
    Gesvd,
}

/// Block backend based on [`ndarray`] arrays.
///
/// Only single and double precision are supported. SVDs are available through
/// the LAPACK drivers `gesdd` (divide and conquer; the default) and `gesvd`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdarrayBlockBackend {
    default_precision: Precision,
    svd_algorithms: Vec<&'static str>,
}

impl Default for NdarrayBlockBackend {
    fn default() -> Self {
        Self {
            default_precision: Precision::Double,
            svd_algorithms: Self::SVD_ALGORITHMS.to_vec(),
        }
    }
}

impl NdarrayBlockBackend {
    /// Name used to select this backend.
    pub const NAME: &'static str = "ndarray";

    /// All supported SVD algorithms.
    pub const SVD_ALGORITHMS: [&'static str; 2] = ["gesdd", "gesvd"];

    /// Create a new backend with a given default precision.
    ///
    /// Fails for anything other than single or double precision.
    pub fn new(default_precision: Precision) -> BackendResult<Self> {
        match default_precision {
            Precision::Single | Precision::Double => Ok(Self {
                default_precision,
                ..Self::default()
            }),
            _ => Err(UnsupportedDtype(
                Dtype::new(default_precision, true), Self::NAME)),
        }
    }

    /// Make `algorithm` the default SVD algorithm.
    pub fn with_default_svd_algorithm(mut self, algorithm: &str)
        -> BackendResult<Self>
    {
        let k
            = self.svd_algorithms.iter()
            .position(|alg| *alg == algorithm)
            .ok_or_else(|| {
                UnknownSvdAlgorithm(
                    algorithm.to_string(), self.svd_algorithms.clone())
            })?;
        self.svd_algorithms[..=k].rotate_right(1);
        Ok(self)
    }

    fn svd_driver(&self, algorithm: Option<&str>) -> BackendResult<SvdDriver> {
        let name = algorithm.unwrap_or(self.svd_algorithms[0]);
        match name {
            "gesdd" => Ok(SvdDriver::Gesdd),
            "gesvd" => Ok(SvdDriver::Gesvd),
            _ => Err(UnknownSvdAlgorithm(
                name.to_string(), self.svd_algorithms.clone())),
        }
    }

    fn default_nd_dtype(&self, real: bool) -> NdDtype {
        NdDtype::from_parts(self.default_precision == Precision::Double, real)
    }

    fn block_from_flat(&self, shape: Vec<usize>, values: FlatValues)
        -> BackendResult<NdBlock>
    {
        let size: usize = shape.iter().product();
        if values.len() != size {
            return Err(Type(format!(
                "{} values cannot fill a block of shape {shape:?}",
                values.len(),
            )));
        }
        let shape = IxDyn(&shape);
        let block
            = match values {
                FlatValues::Real(v)
                    => NdBlock::F64(nd::ArrayD::from_shape_vec(shape, v)?),
                FlatValues::Complex(v)
                    => NdBlock::C64(nd::ArrayD::from_shape_vec(shape, v)?),
            };
        let dtype = self.default_nd_dtype(block.nd_dtype().is_real());
        Ok(block.into_nd_dtype(dtype))
    }

    fn square_dims(a: &NdBlock) -> BackendResult<usize> {
        match a.shape() {
            [n, m] if n == m => Ok(*n),
            [n, m] => Err(NotSquare(*n, *m)),
            sh => Err(NotAMatrix(sh.len())),
        }
    }
}

impl BlockBackend for NdarrayBlockBackend {
    type Block = NdBlock;
    type BlockDtype = NdDtype;

    fn name(&self) -> &'static str { Self::NAME }

    fn default_precision(&self) -> Precision { self.default_precision }

    fn svd_algorithms(&self) -> &[&'static str] { &self.svd_algorithms }

    fn parse_dtype(&self, dtype: Dtype) -> BackendResult<NdDtype> {
        match dtype.precision {
            Precision::Single => Ok(NdDtype::from_parts(false, dtype.is_real)),
            Precision::Double => Ok(NdDtype::from_parts(true, dtype.is_real)),
            _ => Err(UnsupportedDtype(dtype, Self::NAME)),
        }
    }

    fn parse_block(&self, obj: BlockInput<NdBlock>, dtype: Option<Dtype>)
        -> BackendResult<NdBlock>
    {
        let block
            = match obj {
                BlockInput::Block(block) => block,
                BlockInput::Nested(nested) => {
                    let (shape, values) = nested.into_flat()?;
                    self.block_from_flat(shape, values)?
                },
                BlockInput::Flat { shape, values }
                    => self.block_from_flat(shape, values)?,
            };
        match dtype {
            Some(dtype) => self.block_to_dtype(&block, dtype),
            None => Ok(block),
        }
    }

    fn block_shape(&self, a: &NdBlock) -> Vec<usize> { a.shape().to_vec() }

    fn block_dtype(&self, a: &NdBlock) -> Dtype { a.nd_dtype().to_dtype() }

    fn block_is_real(&self, a: &NdBlock) -> bool { a.nd_dtype().is_real() }

    fn block_item(&self, a: &NdBlock) -> BackendResult<AnyScalar> {
        if a.len() != 1 { return Err(NotScalar(a.len())); }
        let z: C64
            = on_block!(a, x => x.iter().next().map(|v| v.to_c64()))
            .ok_or(NotScalar(0))?;
        if a.nd_dtype().is_real() {
            Ok(AnyScalar::Real(z.re))
        } else {
            Ok(AnyScalar::Complex(z))
        }
    }

    fn block_to_dtype(&self, a: &NdBlock, dtype: Dtype)
        -> BackendResult<NdBlock>
    {
        let target = self.parse_dtype(dtype)?;
        if target.is_real() && a.max_imag() > 0.0 {
            log::warn!(
                "discarding non-zero imaginary parts in conversion to {dtype}");
        }
        Ok(a.clone().into_nd_dtype(target))
    }

    fn block_copy(&self, a: &NdBlock) -> NdBlock { a.clone() }

    fn block_repr_lines(
        &self,
        a: &NdBlock,
        indent: &str,
        max_width: usize,
        max_lines: usize,
    ) -> Vec<String>
    {
        let text = a.to_string();
        let mut lines: Vec<String>
            = text.lines()
            .map(|line| clip_line(indent, line, max_width))
            .collect();
        if lines.len() > max_lines {
            lines.truncate(max_lines.saturating_sub(1));
            lines.push(format!("{indent}..."));
        }
        lines
    }

    fn block_tdot(
        &self,
        a: &NdBlock,
        b: &NdBlock,
        idcs_a: &[usize],
        idcs_b: &[usize],
    ) -> BackendResult<NdBlock>
    {
        check_axes("tdot", a.ndim(), idcs_a)?;
        check_axes("tdot", b.ndim(), idcs_b)?;
        check_axis_pairs("tdot", a.shape(), b.shape(), idcs_a, idcs_b)?;
        Ok(map_pair!(promote(a, b), (x, y) => tdot_kernel(&x, &y, idcs_a, idcs_b)?))
    }

    fn matrix_svd(&self, a: &NdBlock, algorithm: Option<&str>)
        -> BackendResult<(NdBlock, NdBlock, NdBlock)>
    {
        let driver = self.svd_driver(algorithm)?;
        if a.ndim() != 2 { return Err(NotAMatrix(a.ndim())); }
        match a {
            NdBlock::F32(x) => {
                let (u, s, vh) = svd_kernel(x, driver)?;
                Ok((NdBlock::F32(u), NdBlock::F32(s), NdBlock::F32(vh)))
            },
            NdBlock::F64(x) => {
                let (u, s, vh) = svd_kernel(x, driver)?;
                Ok((NdBlock::F64(u), NdBlock::F64(s), NdBlock::F64(vh)))
            },
            NdBlock::C32(x) => {
                let (u, s, vh) = svd_kernel(x, driver)?;
                Ok((NdBlock::C32(u), NdBlock::F32(s), NdBlock::C32(vh)))
            },
            NdBlock::C64(x) => {
                let (u, s, vh) = svd_kernel(x, driver)?;
                Ok((NdBlock::C64(u), NdBlock::F64(s), NdBlock::C64(vh)))
            },
        }
    }

    fn block_outer(&self, a: &NdBlock, b: &NdBlock) -> BackendResult<NdBlock> {
        self.block_tdot(a, b, &[], &[])
    }

    fn block_inner(&self, a: &NdBlock, b: &NdBlock) -> BackendResult<C64> {
        if a.shape() != b.shape() {
            return Err(ShapeMismatch {
                op: "inner",
                msg: format!("{:?} vs {:?}", a.shape(), b.shape()),
            });
        }
        Ok(on_pair!(promote(a, b), (x, y) => inner_kernel(&x, &y)))
    }

    fn block_transpose(&self, a: &NdBlock, permutation: &[usize])
        -> BackendResult<NdBlock>
    {
        check_permutation("transpose", a.ndim(), permutation)?;
        let shape: Vec<usize>
            = permutation.iter().map(|k| a.shape()[*k]).collect();
        Ok(map_block!(a, x => permute_reshape(x, permutation, &shape)?))
    }

    fn block_trace(&self, a: &NdBlock, idcs1: &[usize], idcs2: &[usize])
        -> BackendResult<NdBlock>
    {
        let all: Vec<usize> = idcs1.iter().chain(idcs2).copied().collect();
        check_axes("trace", a.ndim(), &all)?;
        check_axis_pairs("trace", a.shape(), a.shape(), idcs1, idcs2)?;
        Ok(map_block!(a, x => trace_kernel(x, idcs1, idcs2)?))
    }

    fn block_conj(&self, a: &NdBlock) -> NdBlock {
        match a {
            NdBlock::C32(x) => NdBlock::C32(x.mapv(|z| z.conj())),
            NdBlock::C64(x) => NdBlock::C64(x.mapv(|z| z.conj())),
            real => real.clone(),
        }
    }

    fn block_combine_legs(&self, a: &NdBlock, legs: &[usize])
        -> BackendResult<NdBlock>
    {
        let Some(first) = legs.first()
            else {
                return Err(InvalidAxes {
                    op: "combine_legs",
                    msg: "no legs to combine".to_string(),
                });
            };
        check_axes("combine_legs", a.ndim(), legs)?;
        let shape = a.shape();
        let rest: Vec<usize>
            = (0..a.ndim()).filter(|k| !legs.contains(k)).collect();
        let pos = rest.iter().take_while(|k| *k < first).count();
        let perm: Vec<usize>
            = rest[..pos].iter()
            .chain(legs)
            .chain(&rest[pos..])
            .copied()
            .collect();
        let fused: usize = legs.iter().map(|k| shape[*k]).product();
        let new_shape: Vec<usize>
            = rest[..pos].iter().map(|k| shape[*k])
            .chain(std::iter::once(fused))
            .chain(rest[pos..].iter().map(|k| shape[*k]))
            .collect();
        Ok(map_block!(a, x => permute_reshape(x, &perm, &new_shape)?))
    }

    fn block_split_leg(&self, a: &NdBlock, leg: usize, dims: &[usize])
        -> BackendResult<NdBlock>
    {
        let shape = a.shape();
        if leg >= shape.len() {
            return Err(InvalidAxes {
                op: "split_leg",
                msg: format!("axis {leg} out of range for rank {}", shape.len()),
            });
        }
        if dims.is_empty() || dims.iter().product::<usize>() != shape[leg] {
            return Err(InvalidSplit {
                leg,
                msg: format!(
                    "extent {} does not factor into {dims:?}", shape[leg]),
            });
        }
        let new_shape: Vec<usize>
            = shape[..leg].iter()
            .chain(dims)
            .chain(&shape[leg + 1..])
            .copied()
            .collect();
        Ok(map_block!(a, x => reshape(x, &new_shape)?))
    }

    fn block_allclose(
        &self,
        a: &NdBlock,
        b: &NdBlock,
        rtol: f64,
        atol: f64,
    ) -> BackendResult<bool>
    {
        if a.shape() != b.shape() {
            return Err(ShapeMismatch {
                op: "allclose",
                msg: format!("{:?} vs {:?}", a.shape(), b.shape()),
            });
        }
        Ok(on_pair!(promote(a, b), (x, y) => allclose_kernel(&x, &y, rtol, atol)))
    }

    fn block_squeeze_legs(&self, a: &NdBlock, idcs: &[usize])
        -> BackendResult<NdBlock>
    {
        check_axes("squeeze_legs", a.ndim(), idcs)?;
        if let Some(k) = idcs.iter().find(|k| a.shape()[**k] != 1) {
            return Err(ShapeMismatch {
                op: "squeeze_legs",
                msg: format!(
                    "axis {k} has extent {} instead of 1", a.shape()[*k]),
            });
        }
        let new_shape: Vec<usize>
            = a.shape().iter().enumerate()
            .filter(|(k, _)| !idcs.contains(k))
            .map(|(_, d)| *d)
            .collect();
        Ok(map_block!(a, x => reshape(x, &new_shape)?))
    }

    fn block_norm(&self, a: &NdBlock) -> f64 {
        on_block!(a, x => real_to_f64(x.norm_l2()))
    }

    fn block_add(&self, a: &NdBlock, b: &NdBlock) -> BackendResult<NdBlock> {
        if a.shape() != b.shape() {
            return Err(ShapeMismatch {
                op: "add",
                msg: format!("{:?} vs {:?}", a.shape(), b.shape()),
            });
        }
        Ok(map_pair!(promote(a, b), (x, y) => x + y))
    }

    fn block_mul(&self, scalar: AnyScalar, a: &NdBlock) -> NdBlock {
        match scalar {
            AnyScalar::Real(r) => map_block!(a, x => scale(x, ScalarExt::from_re(r))),
            AnyScalar::Complex(z) => match a {
                NdBlock::F32(_) | NdBlock::C32(_) => {
                    let z32 = C32::new(z.re as f32, z.im as f32);
                    NdBlock::C32(scale(&a.to_c32_array(), z32))
                },
                NdBlock::F64(_) | NdBlock::C64(_)
                    => NdBlock::C64(scale(&a.to_c64_array(), z)),
            },
        }
    }

    fn matrix_exp(&self, a: &NdBlock) -> BackendResult<NdBlock> {
        Self::square_dims(a)?;
        Ok(map_block!(
            a,
            x => expm(x.clone().into_dimensionality::<nd::Ix2>()?).into_dyn()
        ))
    }

    fn matrix_log(&self, a: &NdBlock) -> BackendResult<NdBlock> {
        Self::square_dims(a)?;
        let mat = a.to_c64_array().into_dimensionality::<nd::Ix2>()?;
        let logarithm = NdBlock::C64(logm(&mat)?.into_dyn());
        let dtype = a.nd_dtype();
        if dtype.is_real() {
            let max_imag = logarithm.max_imag();
            let size = logarithm.max_abs();
            if max_imag <= LOG_IMAG_TOL * size.max(1.0) {
                Ok(logarithm.into_nd_dtype(dtype))
            } else {
                log::warn!(
                    "logarithm of a real matrix has imaginary parts up to \
                    {max_imag:e}; returning a complex result"
                );
                Ok(logarithm.into_nd_dtype(dtype.as_complex()))
            }
        } else {
            Ok(logarithm.into_nd_dtype(dtype))
        }
    }

    fn block_random_gaussian<R>(
        &self,
        dims: &[usize],
        dtype: Dtype,
        sigma: f64,
        rng: &mut R,
    ) -> BackendResult<NdBlock>
    where R: Rng + ?Sized
    {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(InvalidParameter(format!(
                "standard deviation must be finite and non-negative; got {sigma}"
            )));
        }
        let normal = Normal::standard();
        let mut draw = || {
            let x: f64 = normal.sample(rng);
            sigma * x
        };
        let shape = IxDyn(dims);
        let block
            = match self.parse_dtype(dtype)? {
                NdDtype::F32 => NdBlock::F32(
                    nd::ArrayD::from_shape_simple_fn(shape, || draw() as f32)),
                NdDtype::F64 => NdBlock::F64(
                    nd::ArrayD::from_shape_simple_fn(shape, &mut draw)),
                NdDtype::C32 => NdBlock::C32(
                    nd::ArrayD::from_shape_simple_fn(
                        shape, || C32::new(draw() as f32, draw() as f32))),
                NdDtype::C64 => NdBlock::C64(
                    nd::ArrayD::from_shape_simple_fn(
                        shape, || C64::new(draw(), draw()))),
            };
        Ok(block)
    }

    fn zero_block(&self, dims: &[usize], dtype: Dtype)
        -> BackendResult<NdBlock>
    {
        let shape = IxDyn(dims);
        let block
            = match self.parse_dtype(dtype)? {
                NdDtype::F32 => NdBlock::F32(nd::ArrayD::zeros(shape)),
                NdDtype::F64 => NdBlock::F64(nd::ArrayD::zeros(shape)),
                NdDtype::C32 => NdBlock::C32(nd::ArrayD::zeros(shape)),
                NdDtype::C64 => NdBlock::C64(nd::ArrayD::zeros(shape)),
            };
        Ok(block)
    }

    fn eye_block(&self, dims: &[usize], dtype: Dtype)
        -> BackendResult<NdBlock>
    {
        let block
            = match self.parse_dtype(dtype)? {
                NdDtype::F32 => NdBlock::F32(eye_kernel(dims)?),
                NdDtype::F64 => NdBlock::F64(eye_kernel(dims)?),
                NdDtype::C32 => NdBlock::C32(eye_kernel(dims)?),
                NdDtype::C64 => NdBlock::C64(eye_kernel(dims)?),
            };
        Ok(block)
    }

    fn block_from_diagonal(&self, diag: &NdBlock) -> BackendResult<NdBlock> {
        if diag.ndim() != 1 {
            return Err(ShapeMismatch {
                op: "from_diagonal",
                msg: format!("expected a rank-1 block, got rank {}", diag.ndim()),
            });
        }
        Ok(map_block!(
            diag,
            x => nd::Array2::from_diag(
                &x.view().into_dimensionality::<nd::Ix1>()?).into_dyn()
        ))
    }

    fn block_keep_leading(&self, a: &NdBlock, axis: usize, n: usize)
        -> BackendResult<NdBlock>
    {
        if axis >= a.ndim() || n > a.shape()[axis] {
            return Err(InvalidAxes {
                op: "keep_leading",
                msg: format!(
                    "cannot keep {n} entries along axis {axis} of shape {:?}",
                    a.shape(),
                ),
            });
        }
        let slice = nd::Slice::from(0..n);
        Ok(map_block!(a, x => x.slice_axis(nd::Axis(axis), slice).to_owned()))
    }

    fn block_real_entries(&self, a: &NdBlock) -> BackendResult<Vec<f64>> {
        match a {
            NdBlock::F32(x) => Ok(x.iter().map(|v| f64::from(*v)).collect()),
            NdBlock::F64(x) => Ok(x.iter().copied().collect()),
            _ => Err(Type("expected a real block".to_string())),
        }
    }
}
