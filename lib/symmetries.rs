//! Symmetry groups and the vector spaces that make up tensor legs.
//!
//! Every leg of a [`Tensor`][crate::tensor::Tensor] is described by a
//! [`VectorSpace`]: a dimension, decomposed into sectors of a [`Symmetry`],
//! together with a flag marking whether the leg is the dual (conjugate) space.
//! Two legs can be contracted with each other only if one is the dual of the
//! other.
//!
//! Only the trivial symmetry is implemented all the way down to the numerics;
//! the other groups are described here so that requests to convert to them can
//! be recognized and rejected explicitly.
//!
//! ```
//! use tensor_backends::symmetries::VectorSpace;
//!
//! let a = VectorSpace::non_symmetric(3);
//! let b = VectorSpace::non_symmetric(4);
//! assert!(a.dual().is_dual_of(&a));
//! assert_eq!(a.dual().dual(), a);
//!
//! let ab = VectorSpace::product(vec![a.clone(), b.clone()]).unwrap();
//! assert_eq!(ab.dim(), 12);
//! assert_eq!(ab.factors(), Some(&[a, b][..]));
//! ```

use std::fmt;
use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymmetryError {
    /// Returned when the sector and multiplicity lists of a new space have
    /// different lengths.
    #[error("error in space creation: got {0} sectors but {1} multiplicities")]
    SectorCountMismatch(usize, usize),

    /// Returned when a symmetry has no valid sectors at all, e.g. `ZN(0)`.
    #[error("error in space creation: invalid symmetry {0}")]
    InvalidSymmetry(Symmetry),

    /// Returned when a sector is not a valid label for the given symmetry.
    #[error("error in space creation: invalid sector {0:?} for symmetry {1}")]
    InvalidSector(Sector, Symmetry),

    /// Returned when attempting to create a space of total dimension zero.
    #[error("error in space creation: encountered a zero-dimensional space")]
    ZeroDimSpace,

    /// Returned when attempting to fuse an empty list of spaces.
    #[error("error in space fusion: no spaces to fuse")]
    EmptyProduct,

    /// Returned when attempting to fuse spaces of differing symmetry.
    #[error("error in space fusion: mismatched symmetries {0} and {1}")]
    MismatchedSymmetries(Symmetry, Symmetry),

    /// Returned when fusing spaces whose sectors would need group-specific
    /// fusion rules.
    #[error("error in space fusion: sector fusion is not available for {0}")]
    FusionUnsupported(Symmetry),
}
use SymmetryError::*;
pub type SymmetryResult<T> = Result<T, SymmetryError>;

/// Label of an irreducible representation of a [`Symmetry`].
///
/// The trivial symmetry has a single, empty sector label. `U1` and `ZN`
/// sectors are a single charge; `SU2` sectors are a single value `2j`. Sectors
/// of a `Product` symmetry are the concatenation of the factors' sectors.
pub type Sector = Vec<i64>;

/// A symmetry group that constrains which tensor components may be non-zero.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symmetry {
    /// No constraint at all.
    NoSymmetry,
    /// Conservation of an integer charge.
    U1,
    /// Conservation of an integer charge modulo `n`.
    ZN(usize),
    /// Spin rotation invariance.
    SU2,
    /// Direct product of several symmetries.
    Product(Vec<Symmetry>),
}

impl Default for Symmetry {
    fn default() -> Self { Self::NoSymmetry }
}

impl Symmetry {
    /// Return `true` if `self` is `NoSymmetry`.
    pub fn is_trivial(&self) -> bool { matches!(self, Self::NoSymmetry) }

    /// Return `true` if all irreducible representations are one-dimensional.
    pub fn is_abelian(&self) -> bool {
        match self {
            Self::NoSymmetry | Self::U1 | Self::ZN(_) => true,
            Self::SU2 => false,
            Self::Product(factors) => factors.iter().all(Self::is_abelian),
        }
    }

    /// Return `true` if `self` is a well-formed group, i.e. has no `ZN(0)`
    /// factor.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::NoSymmetry | Self::U1 | Self::SU2 => true,
            Self::ZN(n) => *n > 0,
            Self::Product(factors) => factors.iter().all(Self::is_valid),
        }
    }

    /// Number of integers in a sector label.
    pub fn sector_len(&self) -> usize {
        match self {
            Self::NoSymmetry => 0,
            Self::U1 | Self::ZN(_) | Self::SU2 => 1,
            Self::Product(factors) => factors.iter().map(Self::sector_len).sum(),
        }
    }

    /// Return the label of the trivial (invariant) sector.
    pub fn trivial_sector(&self) -> Sector { vec![0; self.sector_len()] }

    /// Return `true` if `sector` labels an irreducible representation of
    /// `self`.
    pub fn is_valid_sector(&self, sector: &[i64]) -> bool {
        if sector.len() != self.sector_len() { return false; }
        match self {
            Self::NoSymmetry | Self::U1 => true,
            Self::ZN(n) => {
                usize::try_from(sector[0]).map_or(false, |q| q < *n)
            },
            Self::SU2 => sector[0] >= 0,
            Self::Product(factors) => {
                let mut offset: usize = 0;
                factors.iter()
                    .all(|factor| {
                        let len = factor.sector_len();
                        let valid
                            = factor.is_valid_sector(
                                &sector[offset..offset + len]);
                        offset += len;
                        valid
                    })
            },
        }
    }

    /// Dimension of the irreducible representation labeled by `sector`.
    ///
    /// `sector` is assumed to be valid.
    pub fn sector_dim(&self, sector: &[i64]) -> usize {
        match self {
            Self::NoSymmetry | Self::U1 | Self::ZN(_) => 1,
            Self::SU2 => sector[0] as usize + 1,
            Self::Product(factors) => {
                let mut offset: usize = 0;
                factors.iter()
                    .map(|factor| {
                        let len = factor.sector_len();
                        let dim
                            = factor.sector_dim(&sector[offset..offset + len]);
                        offset += len;
                        dim
                    })
                    .product()
            },
        }
    }

    /// Short name used when printing backends and spaces.
    pub fn short_str(&self) -> String {
        match self {
            Self::NoSymmetry => "NoSymmetry".to_string(),
            Self::U1 => "U(1)".to_string(),
            Self::ZN(n) => format!("Z_{n}"),
            Self::SU2 => "SU(2)".to_string(),
            Self::Product(factors)
                => factors.iter().map(Self::short_str).join("⨉"),
        }
    }
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_str())
    }
}

/// A (possibly symmetry-graded) vector space describing one tensor leg.
///
/// A space is the direct sum of a number of sectors of its [`Symmetry`], each
/// appearing with some multiplicity. A space may also be the fused product of
/// an ordered list of other spaces (see [`Self::product`]), in which case the
/// factors are kept so that the fusion can be undone later.
///
/// Realness is informational only and plays no part in
/// [`Self::is_dual_of`] or [`Self::matches`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VectorSpace {
    symmetry: Symmetry,
    sectors: Vec<Sector>,
    multiplicities: Vec<usize>,
    is_dual: bool,
    is_real: bool,
    factors: Option<Vec<VectorSpace>>,
}

impl VectorSpace {
    /// Create a new (non-dual) space from a list of sectors and their
    /// multiplicities.
    ///
    /// Fails if the two lists differ in length, if any sector is invalid for
    /// `symmetry`, or if the total dimension is zero.
    pub fn new(
        symmetry: Symmetry,
        sectors: Vec<Sector>,
        multiplicities: Vec<usize>,
        is_real: bool,
    ) -> SymmetryResult<Self>
    {
        if !symmetry.is_valid() {
            return Err(InvalidSymmetry(symmetry));
        }
        if sectors.len() != multiplicities.len() {
            return Err(SectorCountMismatch(sectors.len(), multiplicities.len()));
        }
        if let Some(bad) = sectors.iter().find(|s| !symmetry.is_valid_sector(s)) {
            return Err(InvalidSector(bad.clone(), symmetry));
        }
        let space = Self {
            symmetry,
            sectors,
            multiplicities,
            is_dual: false,
            is_real,
            factors: None,
        };
        (space.dim() > 0).then_some(space).ok_or(ZeroDimSpace)
    }

    /// Create a space with no symmetry.
    ///
    /// A zero-dimensional space is allowed here, since it can arise as the
    /// extent of an empty block.
    pub fn non_symmetric(dim: usize) -> Self {
        Self {
            symmetry: Symmetry::NoSymmetry,
            sectors: vec![Vec::new()],
            multiplicities: vec![dim],
            is_dual: false,
            is_real: false,
            factors: None,
        }
    }

    /// Create the fused product of an ordered list of spaces.
    ///
    /// All factors must share the same symmetry. Sector fusion is only
    /// available for the trivial symmetry.
    pub fn product(spaces: Vec<VectorSpace>) -> SymmetryResult<Self> {
        let first = spaces.first().ok_or(EmptyProduct)?;
        if let Some(other)
            = spaces.iter().find(|s| s.symmetry != first.symmetry)
        {
            return Err(
                MismatchedSymmetries(
                    first.symmetry.clone(), other.symmetry.clone()));
        }
        if !first.symmetry.is_trivial() {
            return Err(FusionUnsupported(first.symmetry.clone()));
        }
        let dim: usize = spaces.iter().map(|s| s.dim()).product();
        let is_real = spaces.iter().all(|s| s.is_real);
        Ok(Self {
            symmetry: Symmetry::NoSymmetry,
            sectors: vec![Vec::new()],
            multiplicities: vec![dim],
            is_dual: false,
            is_real,
            factors: Some(spaces),
        })
    }

    /// Return a copy of `self` with the given realness.
    pub fn with_realness(mut self, is_real: bool) -> Self {
        self.is_real = is_real;
        self
    }

    /// Return the symmetry of the space.
    pub fn symmetry(&self) -> &Symmetry { &self.symmetry }

    /// Return the sectors of the space.
    pub fn sectors(&self) -> &[Sector] { &self.sectors }

    /// Return the multiplicity of each sector.
    pub fn multiplicities(&self) -> &[usize] { &self.multiplicities }

    /// Return `true` if `self` is a dual space.
    pub fn is_dual(&self) -> bool { self.is_dual }

    /// Return `true` if `self` was created for real-valued data.
    pub fn is_real(&self) -> bool { self.is_real }

    /// Return `true` if `self` is the product of other spaces.
    pub fn is_product(&self) -> bool { self.factors.is_some() }

    /// Return the fused factors if `self` is a product space.
    pub fn factors(&self) -> Option<&[VectorSpace]> { self.factors.as_deref() }

    /// Return the total dimension.
    pub fn dim(&self) -> usize {
        self.sectors.iter()
            .zip(&self.multiplicities)
            .map(|(sector, mult)| mult * self.symmetry.sector_dim(sector))
            .sum()
    }

    /// Return the dual space.
    pub fn dual(&self) -> Self {
        Self {
            symmetry: self.symmetry.clone(),
            sectors: self.sectors.clone(),
            multiplicities: self.multiplicities.clone(),
            is_dual: !self.is_dual,
            is_real: self.is_real,
            factors: self.factors.as_ref()
                .map(|fs| fs.iter().map(Self::dual).collect()),
        }
    }

    /// Return `true` if `self` and `other` describe the same space, ignoring
    /// realness.
    pub fn matches(&self, other: &Self) -> bool {
        self.symmetry == other.symmetry
            && self.sectors == other.sectors
            && self.multiplicities == other.multiplicities
            && self.is_dual == other.is_dual
            && match (&self.factors, &other.factors) {
                (None, None) => true,
                (Some(l), Some(r)) => {
                    l.len() == r.len()
                        && l.iter().zip(r).all(|(lk, rk)| lk.matches(rk))
                },
                _ => false,
            }
    }

    /// Return `true` if `other` is the dual of `self`, i.e. the two legs can
    /// be contracted with each other.
    pub fn is_dual_of(&self, other: &Self) -> bool {
        self.matches(&other.dual())
    }
}

impl From<usize> for VectorSpace {
    fn from(dim: usize) -> Self { Self::non_symmetric(dim) }
}

impl fmt::Display for VectorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(factors) = &self.factors {
            write!(f, "({})", factors.iter().join(" ⊗ "))?;
        } else if self.symmetry.is_trivial() {
            write!(f, "V({})", self.dim())?;
        } else {
            write!(f, "V[{}](", self.symmetry)?;
            let n = self.sectors.len();
            for (k, (sector, mult))
                in self.sectors.iter().zip(&self.multiplicities).enumerate()
            {
                write!(f, "{sector:?}: {mult}")?;
                if k < n - 1 { write!(f, ", ")?; }
            }
            write!(f, ")")?;
        }
        if self.is_dual { write!(f, "*")?; }
        Ok(())
    }
}
