//! Labeled tensors whose numerics are delegated to a [`TensorBackend`].
//!
//! A [`Tensor`] couples backend-specific data with a list of legs (one
//! [`VectorSpace`] per axis) and an optional label for each leg. Legs can be
//! referred to either by position or by label (see [`LegRef`]); results of
//! operations carry their legs and labels along according to a few
//! conventions:
//!
//! - conjugation maps a label `a` to `a*` (and back), and every leg to its
//!   dual;
//! - combining legs labeled `a` and `b` produces a leg labeled `(a.b)`, and
//!   splitting it restores the original labels;
//! - contraction removes the contracted legs and keeps the remaining ones in
//!   order.
//!
//! ```
//! use tensor_backends::prelude::*;
//!
//! let backend = default_backend();
//! let t = Tensor::zero(backend, vec![2.into(), 3.into(), 4.into()], Dtype::FLOAT64)
//!     .unwrap()
//!     .with_labels(["a", "b", "c"])
//!     .unwrap();
//! let fused = t.combine_legs(["a", "c"]).unwrap();
//! assert_eq!(fused.shape(), vec![8, 3]);
//! assert_eq!(fused.labels()[0].as_deref(), Some("(a.c)"));
//! let split = fused.split_leg(0).unwrap();
//! assert!(split.labels_are(["a", "b", "c"]));
//! ```

use std::{
    borrow::Cow,
    fmt,
    ops::{ Div, Mul, Neg },
    sync::Arc,
};
use itertools::Itertools;
use num_complex::Complex64 as C64;
use rand::Rng;
use rustc_hash::FxHashSet as HashSet;
use thiserror::Error;
use crate::{
    backend::{
        BackendError,
        BlockInput,
        Nested,
        TensorBackend,
        Truncation,
    },
    dtype::{ AnyScalar, Dtype },
    no_symmetry::NoSymmetryNdarrayBackend,
    symmetries::{ Symmetry, SymmetryError, VectorSpace },
};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Symmetry(#[from] SymmetryError),

    /// Returned when a leg index is out of range or a label is not present.
    #[error("error in leg lookup: no leg {0}")]
    NoSuchLeg(LegRef),

    /// Returned when the same label would be given to two legs.
    #[error("error in labeling: duplicate label '{0}'")]
    DuplicateLabel(String),

    /// Returned when the number of labels differs from the number of legs.
    #[error("error in labeling: expected {expected} labels, got {got}")]
    LabelCount { expected: usize, got: usize },

    /// Returned when squeezing a leg whose dimension is not 1.
    #[error("error in squeeze: leg {0} has dimension {1}")]
    NotSqueezable(usize, usize),
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// Reference to a leg of a tensor, either by position or by label.
///
/// Negative positions count from the last leg.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LegRef {
    Pos(isize),
    Label(String),
}

impl fmt::Display for LegRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pos(k) => write!(f, "{k}"),
            Self::Label(label) => write!(f, "'{label}'"),
        }
    }
}

impl From<isize> for LegRef {
    fn from(k: isize) -> Self { Self::Pos(k) }
}

impl From<i32> for LegRef {
    fn from(k: i32) -> Self { Self::Pos(k as isize) }
}

impl From<usize> for LegRef {
    fn from(k: usize) -> Self { Self::Pos(k as isize) }
}

impl From<&str> for LegRef {
    fn from(label: &str) -> Self { Self::Label(label.to_string()) }
}

impl From<String> for LegRef {
    fn from(label: String) -> Self { Self::Label(label) }
}

impl From<&String> for LegRef {
    fn from(label: &String) -> Self { Self::Label(label.clone()) }
}

/// Something that can be used as an optional leg label.
pub trait IntoLabel {
    fn into_label(self) -> Option<String>;
}

impl IntoLabel for &str {
    fn into_label(self) -> Option<String> { Some(self.to_string()) }
}

impl IntoLabel for String {
    fn into_label(self) -> Option<String> { Some(self) }
}

impl IntoLabel for &String {
    fn into_label(self) -> Option<String> { Some(self.clone()) }
}

impl<T: IntoLabel> IntoLabel for Option<T> {
    fn into_label(self) -> Option<String> { self.and_then(IntoLabel::into_label) }
}

fn dual_label(label: &Option<String>) -> Option<String> {
    label.as_ref().map(|l| dual_label_str(l))
}

fn dual_label_str(label: &str) -> String {
    if let Some(parts) = split_label_parts(label) {
        let duals = parts.iter()
            .map(|part| {
                if part.starts_with('?') {
                    part.to_string()
                } else {
                    dual_label_str(part)
                }
            })
            .join(".");
        format!("({duals})")
    } else if let Some(base) = label.strip_suffix('*') {
        base.to_string()
    } else {
        format!("{label}*")
    }
}

fn combined_label<'a, I>(labels: I) -> String
where I: IntoIterator<Item = &'a Option<String>>
{
    let parts
        = labels.into_iter().enumerate()
        .map(|(k, label)| {
            label.clone().unwrap_or_else(|| format!("?{k}"))
        })
        .join(".");
    format!("({parts})")
}

// top-level components of a combined label `(a.b.(c.d))`
fn split_label_parts(label: &str) -> Option<Vec<&str>> {
    let inner = label.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts: Vec<&str> = Vec::new();
    let mut depth: usize = 0;
    let mut start: usize = 0;
    for (k, c) in inner.char_indices() {
        match c {
            '(' => { depth += 1; },
            ')' => { depth = depth.checked_sub(1)?; },
            '.' if depth == 0 => {
                parts.push(&inner[start..k]);
                start = k + 1;
            },
            _ => { },
        }
    }
    (depth == 0).then_some(())?;
    parts.push(&inner[start..]);
    Some(parts)
}

fn split_label(label: &Option<String>, n: usize) -> Vec<Option<String>> {
    label.as_deref()
        .and_then(split_label_parts)
        .filter(|parts| parts.len() == n)
        .map(|parts| {
            parts.into_iter()
                .map(|part| {
                    (!part.starts_with('?')).then(|| part.to_string())
                })
                .collect()
        })
        .unwrap_or_else(|| vec![None; n])
}

fn check_unique_labels(labels: &[Option<String>]) -> TensorResult<()> {
    let mut seen: HashSet<&str> = HashSet::default();
    match labels.iter().flatten().find(|l| !seen.insert(l.as_str())) {
        Some(dup) => Err(DuplicateLabel(dup.clone())),
        None => Ok(()),
    }
}

fn is_identity(perm: &[usize]) -> bool {
    perm.iter().enumerate().all(|(k, p)| k == *p)
}

/// Options for [`Tensor::svd`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SvdOptions {
    pub truncation: Truncation,
    /// Algorithm name, as listed by the backend's `svd_algorithms`.
    pub algorithm: Option<String>,
    /// Label of the new leg on `U` and the new leg on `Vh`.
    pub new_labels: (Option<String>, Option<String>),
}

impl SvdOptions {
    pub fn truncation(mut self, truncation: Truncation) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn algorithm(mut self, algorithm: &str) -> Self {
        self.algorithm = Some(algorithm.to_string());
        self
    }

    pub fn new_labels<L, R>(mut self, l: L, r: R) -> Self
    where
        L: IntoLabel,
        R: IntoLabel,
    {
        self.new_labels = (l.into_label(), r.into_label());
        self
    }
}

/// Output of [`Tensor::svd`].
#[derive(Clone, Debug)]
pub struct SvdTensors<Bk: TensorBackend = NoSymmetryNdarrayBackend> {
    /// The legs of the decomposed tensor that were grouped into rows,
    /// followed by the new leg.
    pub u: Tensor<Bk>,
    /// Diagonal matrix of singular values, with legs `[new.dual(), new]`.
    pub s: Tensor<Bk>,
    /// The dual of the new leg, followed by the remaining legs of the
    /// decomposed tensor.
    pub vh: Tensor<Bk>,
    /// Relative norm of the discarded singular values.
    pub trunc_err: f64,
}

/// A tensor with labeled legs.
///
/// The backend is shared: cloning a tensor copies its data and labels, but not
/// the backend.
#[derive(Debug)]
pub struct Tensor<Bk: TensorBackend = NoSymmetryNdarrayBackend> {
    data: Bk::Data,
    backend: Arc<Bk>,
    legs: Vec<VectorSpace>,
    labels: Vec<Option<String>>,
}

impl<Bk: TensorBackend> Clone for Tensor<Bk> {
    fn clone(&self) -> Self {
        Self {
            data: self.backend.copy_data(&self.data),
            backend: Arc::clone(&self.backend),
            legs: self.legs.clone(),
            labels: self.labels.clone(),
        }
    }
}

impl<Bk: TensorBackend> Tensor<Bk> {
    // assemble an operation result; labels are checked for uniqueness
    fn assemble(
        &self,
        data: Bk::Data,
        legs: Vec<VectorSpace>,
        labels: Vec<Option<String>>,
    ) -> TensorResult<Self>
    {
        check_unique_labels(&labels)?;
        Ok(Self { data, backend: Arc::clone(&self.backend), legs, labels })
    }

    /// Create a new tensor from backend data.
    ///
    /// If `legs` are not given, they are inferred from the data. Unlabeled if
    /// `labels` is not given.
    pub fn new(
        data: Bk::Data,
        backend: Arc<Bk>,
        legs: Option<Vec<VectorSpace>>,
        labels: Option<Vec<Option<String>>>,
    ) -> TensorResult<Self>
    {
        let legs
            = match legs {
                Some(legs) => {
                    if !backend.legs_are_compatible(&data, &legs) {
                        return Err(BackendError::IncompatibleLegs(format!(
                            "legs {} do not describe the given data",
                            legs.iter().join(", "),
                        )).into());
                    }
                    legs
                },
                None => backend.infer_legs(&data)?,
            };
        let labels = labels.unwrap_or_else(|| vec![None; legs.len()]);
        if labels.len() != legs.len() {
            return Err(LabelCount { expected: legs.len(), got: labels.len() });
        }
        check_unique_labels(&labels)?;
        Ok(Self { data, backend, legs, labels })
    }

    /// Create a new tensor from any input accepted by the backend, optionally
    /// converting to `dtype`.
    pub fn from_dense_block<T>(
        block: T,
        backend: Arc<Bk>,
        legs: Option<Vec<VectorSpace>>,
        dtype: Option<Dtype>,
    ) -> TensorResult<Self>
    where T: Into<BlockInput<Bk::Block>>
    {
        let data = backend.parse_data(block.into(), dtype)?;
        Self::new(data, backend, legs, None)
    }

    /// Create a new tensor from a nested list of numbers.
    pub fn from_nested<T>(values: T, backend: Arc<Bk>) -> TensorResult<Self>
    where T: Into<Nested>
    {
        Self::from_dense_block(
            BlockInput::Nested(values.into()), backend, None, None)
    }

    /// Create a tensor of zeros.
    pub fn zero(backend: Arc<Bk>, legs: Vec<VectorSpace>, dtype: Dtype)
        -> TensorResult<Self>
    {
        let data = backend.zero_data(&legs, dtype)?;
        Self::new(data, backend, Some(legs), None)
    }

    /// Create the identity map on `legs`.
    ///
    /// The result carries `legs` followed by their duals.
    pub fn eye(backend: Arc<Bk>, legs: Vec<VectorSpace>, dtype: Dtype)
        -> TensorResult<Self>
    {
        let data = backend.eye_data(&legs, dtype)?;
        let all_legs: Vec<VectorSpace>
            = legs.iter().cloned()
            .chain(legs.iter().map(VectorSpace::dual))
            .collect();
        Self::new(data, backend, Some(all_legs), None)
    }

    /// Create a tensor with normally distributed entries of standard
    /// deviation `sigma`.
    pub fn random_gaussian<R>(
        backend: Arc<Bk>,
        legs: Vec<VectorSpace>,
        dtype: Dtype,
        sigma: f64,
        rng: &mut R,
    ) -> TensorResult<Self>
    where R: Rng + ?Sized
    {
        let data = backend.random_gaussian(&legs, dtype, sigma, rng)?;
        Self::new(data, backend, Some(legs), None)
    }

    /// Replace all labels.
    pub fn set_labels<I, L>(&mut self, labels: I) -> TensorResult<()>
    where
        I: IntoIterator<Item = L>,
        L: IntoLabel,
    {
        let labels: Vec<Option<String>>
            = labels.into_iter().map(IntoLabel::into_label).collect();
        if labels.len() != self.legs.len() {
            return Err(LabelCount { expected: self.legs.len(), got: labels.len() });
        }
        check_unique_labels(&labels)?;
        self.labels = labels;
        Ok(())
    }

    /// Like [`Self::set_labels`], but taking and returning `self` by value.
    pub fn with_labels<I, L>(mut self, labels: I) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoLabel,
    {
        self.set_labels(labels)?;
        Ok(self)
    }

    pub fn data(&self) -> &Bk::Data { &self.data }

    pub fn backend(&self) -> &Arc<Bk> { &self.backend }

    pub fn legs(&self) -> &[VectorSpace] { &self.legs }

    pub fn labels(&self) -> &[Option<String>] { &self.labels }

    pub fn symmetry(&self) -> &Symmetry { self.backend.symmetry() }

    /// Number of legs.
    pub fn rank(&self) -> usize { self.legs.len() }

    /// Dimension of each leg.
    pub fn shape(&self) -> Vec<usize> {
        self.legs.iter().map(VectorSpace::dim).collect()
    }

    /// Total number of entries in the dense representation.
    pub fn size(&self) -> usize { self.legs.iter().map(VectorSpace::dim).product() }

    /// Number of free parameters allowed by the symmetry.
    pub fn num_parameters(&self) -> usize {
        self.backend.num_parameters(&self.legs)
    }

    pub fn dtype(&self) -> Dtype { self.backend.infer_dtype(&self.data) }

    pub fn is_real(&self) -> bool { self.backend.is_real(&self.data) }

    /// Return `true` if every leg has dimension 1.
    pub fn is_scalar(&self) -> bool { self.legs.iter().all(|leg| leg.dim() == 1) }

    /// Return `true` if every leg has a label.
    pub fn is_fully_labelled(&self) -> bool {
        self.labels.iter().all(Option::is_some)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.as_deref() == Some(label))
    }

    pub fn has_labels<I, S>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels.into_iter().all(|l| self.has_label(l.as_ref()))
    }

    /// Return `true` if the tensor is fully labelled with exactly `labels`,
    /// in any order.
    pub fn labels_are<I, S>(&self, labels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let given: Vec<S> = labels.into_iter().collect();
        self.is_fully_labelled()
            && given.len() == self.labels.len()
            && given.iter().all(|l| self.has_label(l.as_ref()))
    }

    /// Translate a leg reference into a leg position.
    pub fn get_leg_idx<L>(&self, leg: L) -> TensorResult<usize>
    where L: Into<LegRef>
    {
        let leg = leg.into();
        let rank = self.rank() as isize;
        let idx
            = match &leg {
                LegRef::Pos(k) => {
                    let k = if *k < 0 { *k + rank } else { *k };
                    (0..rank).contains(&k).then_some(k as usize)
                },
                LegRef::Label(label) => {
                    self.labels.iter()
                        .position(|l| l.as_deref() == Some(label.as_str()))
                },
            };
        idx.ok_or(NoSuchLeg(leg))
    }

    /// Translate a list of leg references into leg positions.
    pub fn get_leg_idcs<I, L>(&self, legs: I) -> TensorResult<Vec<usize>>
    where
        I: IntoIterator<Item = L>,
        L: Into<LegRef>,
    {
        legs.into_iter().map(|leg| self.get_leg_idx(leg)).collect()
    }

    /// Check internal consistency.
    pub fn check_sanity(&self) -> TensorResult<()> {
        if self.labels.len() != self.legs.len() {
            return Err(LabelCount { expected: self.legs.len(), got: self.labels.len() });
        }
        if !self.backend.legs_are_compatible(&self.data, &self.legs) {
            return Err(BackendError::IncompatibleLegs(
                "legs do not describe the tensor data".to_string()).into());
        }
        check_unique_labels(&self.labels)
    }

    /// Return the single entry of a tensor with one entry.
    pub fn item(&self) -> TensorResult<AnyScalar> {
        Ok(self.backend.item(&self.data)?)
    }

    /// Convert to a single dense block.
    pub fn to_dense_block(&self) -> TensorResult<Bk::Block> {
        Ok(self.backend.to_dense_block(&self.data)?)
    }

    /// Deep copy.
    pub fn copy(&self) -> Self { self.clone() }

    pub fn to_dtype(&self, dtype: Dtype) -> TensorResult<Self> {
        let data = self.backend.to_dtype(&self.data, dtype)?;
        let legs: Vec<VectorSpace>
            = self.legs.iter()
            .map(|leg| leg.clone().with_realness(dtype.is_real))
            .collect();
        self.assemble(data, legs, self.labels.clone())
    }

    /// Contract legs `legs1` of `self` with legs `legs2` of `other`.
    ///
    /// Each pair of contracted legs must be mutually dual. The result carries
    /// the remaining legs of `self` followed by the remaining legs of `other`.
    pub fn tdot<I, J, L, M>(&self, other: &Self, legs1: I, legs2: J)
        -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        J: IntoIterator<Item = M>,
        L: Into<LegRef>,
        M: Into<LegRef>,
    {
        let idcs1 = self.get_leg_idcs(legs1)?;
        let idcs2 = other.get_leg_idcs(legs2)?;
        if idcs1.len() != idcs2.len() {
            return Err(BackendError::IncompatibleLegs(format!(
                "cannot contract {} legs with {} legs", idcs1.len(), idcs2.len(),
            )).into());
        }
        for (i, j) in idcs1.iter().zip(&idcs2) {
            if !self.legs[*i].is_dual_of(&other.legs[*j]) {
                return Err(BackendError::IncompatibleLegs(format!(
                    "cannot contract {} with {}: not dual",
                    self.legs[*i], other.legs[*j],
                )).into());
            }
        }
        let data = self.backend.tdot(&self.data, &other.data, &idcs1, &idcs2)?;
        let (legs, labels): (Vec<VectorSpace>, Vec<Option<String>>)
            = self.legs.iter().zip(&self.labels).enumerate()
            .filter(|(k, _)| !idcs1.contains(k))
            .chain(
                other.legs.iter().zip(&other.labels).enumerate()
                    .filter(|(k, _)| !idcs2.contains(k))
            )
            .map(|(_, (leg, label))| (leg.clone(), label.clone()))
            .unzip();
        self.assemble(data, legs, labels)
    }

    /// Tensor product, with the legs of `self` followed by those of `other`.
    pub fn outer(&self, other: &Self) -> TensorResult<Self> {
        let data = self.backend.outer(&self.data, &other.data)?;
        let legs: Vec<VectorSpace>
            = self.legs.iter().chain(&other.legs).cloned().collect();
        let labels: Vec<Option<String>>
            = self.labels.iter().chain(&other.labels).cloned().collect();
        self.assemble(data, legs, labels)
    }

    // data of `other` with legs ordered like those of `self`, matching labels
    // if both tensors are fully labelled
    fn aligned_data<'a>(&self, other: &'a Self) -> TensorResult<Cow<'a, Bk::Data>> {
        if self.rank() != other.rank() {
            return Err(BackendError::IncompatibleLegs(format!(
                "tensors have different ranks {} and {}",
                self.rank(), other.rank(),
            )).into());
        }
        let perm: Vec<usize>
            = if self.is_fully_labelled() && other.is_fully_labelled() {
                self.labels.iter().flatten()
                    .map(|label| other.get_leg_idx(label))
                    .collect::<TensorResult<_>>()?
            } else {
                (0..self.rank()).collect()
            };
        for (k, p) in perm.iter().enumerate() {
            if !self.legs[k].matches(&other.legs[*p]) {
                return Err(BackendError::IncompatibleLegs(format!(
                    "leg {} does not match leg {}", self.legs[k], other.legs[*p],
                )).into());
            }
        }
        if is_identity(&perm) {
            Ok(Cow::Borrowed(&other.data))
        } else {
            Ok(Cow::Owned(self.backend.transpose(&other.data, &perm)?))
        }
    }

    /// Inner product `<self|other>`, conjugate-linear in `self`.
    ///
    /// If both tensors are fully labelled, legs are matched by label;
    /// otherwise by position.
    pub fn inner(&self, other: &Self) -> TensorResult<C64> {
        let other_data = self.aligned_data(other)?;
        Ok(self.backend.inner(&self.data, &other_data)?)
    }

    /// Permute legs, such that leg `k` of the result is leg `permutation[k]`
    /// of `self`.
    pub fn transpose<I, L>(&self, permutation: I) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<LegRef>,
    {
        let perm = self.get_leg_idcs(permutation)?;
        let data = self.backend.transpose(&self.data, &perm)?;
        let legs: Vec<VectorSpace>
            = perm.iter().map(|k| self.legs[*k].clone()).collect();
        let labels: Vec<Option<String>>
            = perm.iter().map(|k| self.labels[*k].clone()).collect();
        self.assemble(data, legs, labels)
    }

    /// Partial trace over pairs of mutually dual legs.
    pub fn trace<I, J, L, M>(&self, legs1: I, legs2: J) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        J: IntoIterator<Item = M>,
        L: Into<LegRef>,
        M: Into<LegRef>,
    {
        let idcs1 = self.get_leg_idcs(legs1)?;
        let idcs2 = self.get_leg_idcs(legs2)?;
        for (i, j) in idcs1.iter().zip(&idcs2) {
            if !self.legs[*i].is_dual_of(&self.legs[*j]) {
                return Err(BackendError::IncompatibleLegs(format!(
                    "cannot trace {} with {}: not dual",
                    self.legs[*i], self.legs[*j],
                )).into());
            }
        }
        let data = self.backend.trace(&self.data, &idcs1, &idcs2)?;
        let (legs, labels): (Vec<VectorSpace>, Vec<Option<String>>)
            = self.legs.iter().zip(&self.labels).enumerate()
            .filter(|(k, _)| !idcs1.contains(k) && !idcs2.contains(k))
            .map(|(_, (leg, label))| (leg.clone(), label.clone()))
            .unzip();
        self.assemble(data, legs, labels)
    }

    /// Trace over the last two legs.
    pub fn trace_last(&self) -> TensorResult<Self> { self.trace([-2], [-1]) }

    /// Complex conjugate. Every leg is replaced by its dual.
    pub fn conj(&self) -> Self {
        Self {
            data: self.backend.conj(&self.data),
            backend: Arc::clone(&self.backend),
            legs: self.legs.iter().map(VectorSpace::dual).collect(),
            labels: self.labels.iter().map(dual_label).collect(),
        }
    }

    /// Fuse several legs into one, placed where the first of them was.
    pub fn combine_legs<I, L>(&self, legs: I) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<LegRef>,
    {
        let idcs = self.get_leg_idcs(legs)?;
        let new_leg
            = VectorSpace::product(
                idcs.iter().map(|k| self.legs[*k].clone()).collect())?;
        let data = self.backend.combine_legs(&self.data, &idcs, &new_leg)?;
        let new_label = combined_label(idcs.iter().map(|k| &self.labels[*k]));
        let rest: Vec<usize>
            = (0..self.rank()).filter(|k| !idcs.contains(k)).collect();
        let pos = rest.iter().take_while(|k| **k < idcs[0]).count();
        let mut legs: Vec<VectorSpace>
            = rest.iter().map(|k| self.legs[*k].clone()).collect();
        let mut labels: Vec<Option<String>>
            = rest.iter().map(|k| self.labels[*k].clone()).collect();
        legs.insert(pos, new_leg);
        labels.insert(pos, Some(new_label));
        self.assemble(data, legs, labels)
    }

    /// Undo [`Self::combine_legs`] for a single leg.
    pub fn split_leg<L>(&self, leg: L) -> TensorResult<Self>
    where L: Into<LegRef>
    {
        let idx = self.get_leg_idx(leg)?;
        let factors
            = self.legs[idx].factors()
            .ok_or_else(|| BackendError::InvalidSplit {
                leg: idx,
                msg: format!("{} is not a product space", self.legs[idx]),
            })?;
        let data = self.backend.split_leg(&self.data, idx, factors)?;
        let mut legs = self.legs.clone();
        legs.splice(idx..=idx, factors.iter().cloned());
        let mut labels = self.labels.clone();
        labels.splice(idx..=idx, split_label(&self.labels[idx], factors.len()));
        self.assemble(data, legs, labels)
    }

    /// Remove legs of dimension 1.
    pub fn squeeze_legs<I, L>(&self, legs: I) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<LegRef>,
    {
        let idcs = self.get_leg_idcs(legs)?;
        if let Some(k) = idcs.iter().find(|k| self.legs[**k].dim() != 1) {
            return Err(NotSqueezable(*k, self.legs[*k].dim()));
        }
        let data = self.backend.squeeze_legs(&self.data, &idcs)?;
        let (legs, labels): (Vec<VectorSpace>, Vec<Option<String>>)
            = self.legs.iter().zip(&self.labels).enumerate()
            .filter(|(k, _)| !idcs.contains(k))
            .map(|(_, (leg, label))| (leg.clone(), label.clone()))
            .unzip();
        self.assemble(data, legs, labels)
    }

    /// Remove all legs of dimension 1.
    pub fn squeeze_all(&self) -> TensorResult<Self> {
        let idcs: Vec<usize>
            = self.legs.iter().enumerate()
            .filter(|(_, leg)| leg.dim() == 1)
            .map(|(k, _)| k)
            .collect();
        self.squeeze_legs(idcs)
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 { self.backend.norm(&self.data) }

    // positions of row and column legs for a matrix function
    fn matrix_legs<I, J, L, M>(&self, legs1: I, legs2: J)
        -> TensorResult<(Vec<usize>, Vec<usize>)>
    where
        I: IntoIterator<Item = L>,
        J: IntoIterator<Item = M>,
        L: Into<LegRef>,
        M: Into<LegRef>,
    {
        let idcs1 = self.get_leg_idcs(legs1)?;
        let idcs2 = self.get_leg_idcs(legs2)?;
        if idcs1.len() != idcs2.len()
            || idcs1.iter().zip(&idcs2)
                .any(|(i, j)| !self.legs[*i].is_dual_of(&self.legs[*j]))
        {
            return Err(BackendError::IncompatibleLegs(
                "row and column legs must be pairwise dual".to_string()).into());
        }
        Ok((idcs1, idcs2))
    }

    /// Matrix exponential, with legs `legs1` as rows and `legs2` as columns.
    pub fn exp<I, J, L, M>(&self, legs1: I, legs2: J) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        J: IntoIterator<Item = M>,
        L: Into<LegRef>,
        M: Into<LegRef>,
    {
        let (idcs1, idcs2) = self.matrix_legs(legs1, legs2)?;
        let data = self.backend.exp(&self.data, &idcs1, &idcs2)?;
        self.assemble(data, self.legs.clone(), self.labels.clone())
    }

    /// Matrix logarithm, with legs `legs1` as rows and `legs2` as columns.
    pub fn log<I, J, L, M>(&self, legs1: I, legs2: J) -> TensorResult<Self>
    where
        I: IntoIterator<Item = L>,
        J: IntoIterator<Item = M>,
        L: Into<LegRef>,
        M: Into<LegRef>,
    {
        let (idcs1, idcs2) = self.matrix_legs(legs1, legs2)?;
        let data = self.backend.log(&self.data, &idcs1, &idcs2)?;
        self.assemble(data, self.legs.clone(), self.labels.clone())
    }

    /// Elementwise sum. Legs are matched as in [`Self::inner`].
    pub fn add(&self, other: &Self) -> TensorResult<Self> {
        let other_data = self.aligned_data(other)?;
        let data = self.backend.add(&self.data, &other_data)?;
        self.assemble(data, self.legs.clone(), self.labels.clone())
    }

    /// Elementwise difference. Legs are matched as in [`Self::inner`].
    pub fn sub(&self, other: &Self) -> TensorResult<Self> {
        let other_data = self.aligned_data(other)?;
        let neg = self.backend.mul(AnyScalar::Real(-1.0), &other_data);
        let data = self.backend.add(&self.data, &neg)?;
        self.assemble(data, self.legs.clone(), self.labels.clone())
    }

    /// Multiply by a scalar.
    pub fn scale<S>(&self, scalar: S) -> Self
    where S: Into<AnyScalar>
    {
        Self {
            data: self.backend.mul(scalar.into(), &self.data),
            backend: Arc::clone(&self.backend),
            legs: self.legs.clone(),
            labels: self.labels.clone(),
        }
    }

    /// Elementwise `|self - other| <= atol + rtol * |other|`. Legs are matched
    /// as in [`Self::inner`].
    pub fn allclose(&self, other: &Self, rtol: f64, atol: f64)
        -> TensorResult<bool>
    {
        let other_data = self.aligned_data(other)?;
        Ok(self.backend.allclose(&self.data, &other_data, rtol, atol)?)
    }

    /// Convert to a lower symmetry.
    pub fn reduce_symmetry(&self, new_symm: &Symmetry) -> TensorResult<Self> {
        let data = self.backend.reduce_symmetry(&self.data, new_symm)?;
        self.assemble(data, self.legs.clone(), self.labels.clone())
    }

    /// Convert to a higher symmetry, if the data is symmetric within
    /// tolerance.
    pub fn increase_symmetry(&self, new_symm: &Symmetry, atol: f64, rtol: f64)
        -> TensorResult<Self>
    {
        let data
            = self.backend.increase_symmetry(&self.data, new_symm, atol, rtol)?;
        self.assemble(data, self.legs.clone(), self.labels.clone())
    }

    /// Singular value decomposition `self = U · S · Vh`, with `u_legs` grouped
    /// into rows and all other legs (in their original order) into columns.
    pub fn svd<I, L>(&self, u_legs: I, options: &SvdOptions)
        -> TensorResult<SvdTensors<Bk>>
    where
        I: IntoIterator<Item = L>,
        L: Into<LegRef>,
    {
        let idcs1 = self.get_leg_idcs(u_legs)?;
        let idcs2: Vec<usize>
            = (0..self.rank()).filter(|k| !idcs1.contains(k)).collect();
        let res
            = self.backend.svd(
                &self.data,
                &idcs1,
                &idcs2,
                &options.truncation,
                options.algorithm.as_deref(),
            )?;
        let new = res.new_space;
        let (l, r) = options.new_labels.clone();
        let u_legs: Vec<VectorSpace>
            = idcs1.iter().map(|k| self.legs[*k].clone())
            .chain(std::iter::once(new.clone()))
            .collect();
        let u_labels: Vec<Option<String>>
            = idcs1.iter().map(|k| self.labels[*k].clone())
            .chain(std::iter::once(l.clone()))
            .collect();
        let vh_legs: Vec<VectorSpace>
            = std::iter::once(new.dual())
            .chain(idcs2.iter().map(|k| self.legs[*k].clone()))
            .collect();
        let vh_labels: Vec<Option<String>>
            = std::iter::once(r.clone())
            .chain(idcs2.iter().map(|k| self.labels[*k].clone()))
            .collect();
        let s_legs = vec![new.dual(), new];
        let s_labels = vec![dual_label(&l), dual_label(&r)];
        Ok(SvdTensors {
            u: self.assemble(res.u, u_legs, u_labels)?,
            s: self.assemble(res.s, s_legs, s_labels)?,
            vh: self.assemble(res.vh, vh_legs, vh_labels)?,
            trunc_err: res.trunc_err,
        })
    }
}

impl<Bk: TensorBackend> fmt::Display for Tensor<Bk> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Tensor>")?;
        writeln!(f, "* Backend: {}", self.backend)?;
        writeln!(f, "* Rank: {}", self.rank())?;
        writeln!(f, "* Legs:")?;
        for (leg, label) in self.legs.iter().zip(&self.labels) {
            writeln!(f, "  {:<10} {}", label.as_deref().unwrap_or("-"), leg)?;
        }
        write!(f, "* Data:")?;
        for line in self.backend.data_repr_lines(&self.data, "  ", 70, 20) {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

impl<Bk: TensorBackend> Neg for &Tensor<Bk> {
    type Output = Tensor<Bk>;

    fn neg(self) -> Tensor<Bk> { self.scale(-1.0) }
}

impl<Bk: TensorBackend> Neg for Tensor<Bk> {
    type Output = Tensor<Bk>;

    fn neg(self) -> Tensor<Bk> { -&self }
}

impl<Bk: TensorBackend> Mul<f64> for &Tensor<Bk> {
    type Output = Tensor<Bk>;

    fn mul(self, rhs: f64) -> Tensor<Bk> { self.scale(rhs) }
}

impl<Bk: TensorBackend> Mul<f64> for Tensor<Bk> {
    type Output = Tensor<Bk>;

    fn mul(self, rhs: f64) -> Tensor<Bk> { self.scale(rhs) }
}

impl<Bk: TensorBackend> Mul<&Tensor<Bk>> for f64 {
    type Output = Tensor<Bk>;

    fn mul(self, rhs: &Tensor<Bk>) -> Tensor<Bk> { rhs.scale(self) }
}

impl<Bk: TensorBackend> Div<f64> for &Tensor<Bk> {
    type Output = Tensor<Bk>;

    fn div(self, rhs: f64) -> Tensor<Bk> { self.scale(rhs.recip()) }
}

impl<Bk: TensorBackend> Div<f64> for Tensor<Bk> {
    type Output = Tensor<Bk>;

    fn div(self, rhs: f64) -> Tensor<Bk> { self.scale(rhs.recip()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_duality() {
        assert_eq!(dual_label_str("a"), "a*");
        assert_eq!(dual_label_str("a*"), "a");
        assert_eq!(dual_label_str("(a.b*)"), "(a*.b)");
        assert_eq!(dual_label_str("(?0.(b.c))"), "(?0.(b*.c*))");
        assert_eq!(dual_label(&None), None);
    }

    #[test]
    fn label_combination() {
        let labels = [Some("a".to_string()), None, Some("(c.d)".to_string())];
        let combined = combined_label(&labels);
        assert_eq!(combined, "(a.?1.(c.d))");
        assert_eq!(split_label(&Some(combined), 3), labels.to_vec());
        assert_eq!(split_label(&Some("x".to_string()), 2), vec![None, None]);
        assert_eq!(split_label(&Some("(a.b)".to_string()), 3), vec![None; 3]);
        assert_eq!(split_label_parts("(a.(b.c)"), None);
    }

    #[test]
    fn unique_labels() {
        assert!(check_unique_labels(&[Some("a".into()), None, None]).is_ok());
        assert!(matches!(
            check_unique_labels(&[Some("a".into()), Some("a".into())]),
            Err(DuplicateLabel(l)) if l == "a",
        ));
    }
}
