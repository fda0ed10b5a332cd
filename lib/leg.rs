//! Tensor legs partitioned into quantum-number sectors.
//!
//! A [`Leg`] is one index of a [`CompositeTensor`][crate::CompositeTensor]. Its
//! dense index range `0..dim` is split into consecutive [`Sector`]s, each tagged
//! with a [`Charge`] and covering `degeneracy` consecutive index values, in the
//! order the sectors were given. Legs are plain values: fusing, splitting, or
//! reversing one always produces a new `Leg`.

use std::{ collections::BTreeMap, fmt };
use rustc_hash::FxHashMap;
use thiserror::Error;
use crate::{
    charge::Charge,
    symmetry::{ Symmetry, SymError },
};

#[derive(Debug, Error)]
pub enum LegError {
    #[error("symmetry error: {0}")]
    Sym(#[from] SymError),

    #[error("label {0} not found on leg")]
    LabelNotFound(Charge),

    #[error("duplicate label {0} on leg")]
    DuplicateLabel(Charge),

    #[error("sector with label {0} has zero degeneracy")]
    ZeroDegeneracy(Charge),

    #[error("cannot fuse an empty list of legs")]
    NoLegs,

    #[error("cannot truncate a leg of dimension {current} to {dim}")]
    InvalidTruncation { dim: usize, current: usize },
}
pub type LegResult<T> = Result<T, LegError>;

use LegError::*;

/// Orientation of a leg relative to its tensor.
///
/// Charges on `In` legs enter the conservation sum with sign `+1`, and those on
/// `Out` legs with sign `-1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Incoming leg (ket side).
    In,

    /// Outgoing leg (bra side).
    Out,
}

impl Direction {
    /// Return `+1` for `In` and `-1` for `Out`.
    pub fn sign(&self) -> i64 {
        match self {
            Self::In => 1,
            Self::Out => -1,
        }
    }

    /// Return the opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
        }
    }

    /// Return `true` if `self` is `In`.
    pub fn is_in(&self) -> bool { matches!(self, Self::In) }

    /// Return `true` if `self` is `Out`.
    pub fn is_out(&self) -> bool { matches!(self, Self::Out) }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A `(label, degeneracy)` pair on a leg.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sector {
    charge: Charge,
    degeneracy: usize,
}

impl Sector {
    /// Create a new sector.
    pub fn new<Q>(charge: Q, degeneracy: usize) -> Self
    where Q: Into<Charge>
    {
        Self { charge: charge.into(), degeneracy }
    }

    /// Return the sector's label.
    pub fn charge(&self) -> &Charge { &self.charge }

    /// Return the number of index values the sector covers.
    pub fn degeneracy(&self) -> usize { self.degeneracy }
}

impl<Q> From<(Q, usize)> for Sector
where Q: Into<Charge>
{
    fn from(pair: (Q, usize)) -> Self { Self::new(pair.0, pair.1) }
}

/// Where each pair of sectors lands in the leg produced by
/// [`Leg::fusion_plan`].
///
/// Pairs `(i, j)` (sector `i` of the left leg, sector `j` of the right leg)
/// contributing to the same fused label are laid out one after another inside
/// the fused sector, in row-major pair order, each covering
/// `deg_i * deg_j` index values with the right leg's index varying fastest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FusionMap {
    n_right: usize,
    entries: Vec<(usize, usize)>,
}

impl FusionMap {
    /// Return the fused sector position and the offset inside that sector of
    /// the pair `(i, j)`.
    ///
    /// *Panics if `(i, j)` is out of range.*
    pub fn get(&self, i: usize, j: usize) -> (usize, usize) {
        assert!(j < self.n_right, "FusionMap::get: right sector out of range");
        self.entries[i * self.n_right + j]
    }

    /// Return the number of sectors on the left leg.
    pub fn n_left(&self) -> usize {
        if self.n_right == 0 { 0 } else { self.entries.len() / self.n_right }
    }

    /// Return the number of sectors on the right leg.
    pub fn n_right(&self) -> usize { self.n_right }
}

/// One index of a composite tensor: an ordered list of [`Sector`]s, a
/// [`Direction`], and the [`Symmetry`] the sector labels live under.
///
/// Labels are unique within a leg and every sector has non-zero degeneracy.
#[derive(Clone, Debug)]
pub struct Leg {
    sym: Symmetry,
    dir: Direction,
    sectors: Vec<Sector>,
    // offsets[k] is the first index value of sector k; last entry is dim
    offsets: Vec<usize>,
    positions: FxHashMap<Charge, usize>,
}

impl PartialEq for Leg {
    fn eq(&self, other: &Self) -> bool {
        self.sym == other.sym
            && self.dir == other.dir
            && self.sectors == other.sectors
    }
}

impl Eq for Leg { }

impl Leg {
    /// Create a new leg.
    ///
    /// Labels are normalized under `sym` (e.g. `-1` becomes `2` under `Z3`)
    /// before checking. Fails if any label has the wrong arity, if two sectors
    /// share a label, or if any sector has zero degeneracy.
    pub fn new<I, S>(sym: Symmetry, dir: Direction, sectors: I) -> LegResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Sector>,
    {
        let mut checked: Vec<Sector> = Vec::new();
        for sector in sectors.into_iter() {
            let Sector { charge, degeneracy } = sector.into();
            let charge = sym.normalize(charge)?;
            if degeneracy == 0 { return Err(ZeroDegeneracy(charge)); }
            if checked.iter().any(|s| s.charge == charge) {
                return Err(DuplicateLabel(charge));
            }
            checked.push(Sector { charge, degeneracy });
        }
        Ok(Self::from_sectors_unchecked(sym, dir, checked))
    }

    /// Create a new `U(1)` leg from `(label, degeneracy)` pairs.
    pub fn u1<I>(dir: Direction, sectors: I) -> LegResult<Self>
    where I: IntoIterator<Item = (i64, usize)>
    {
        Self::new(Symmetry::u1(), dir, sectors)
    }

    /// Create a leg of dimension `dim` under the trivial symmetry.
    ///
    /// The leg has a single sector unless `dim == 0`, in which case it has
    /// none.
    pub fn trivial(dir: Direction, dim: usize) -> Self {
        let sectors: Vec<Sector> =
            if dim == 0 {
                Vec::new()
            } else {
                vec![Sector { charge: Charge::empty(), degeneracy: dim }]
            };
        Self::from_sectors_unchecked(Symmetry::trivial(), dir, sectors)
    }

    pub(crate) fn from_sectors_unchecked(
        sym: Symmetry,
        dir: Direction,
        sectors: Vec<Sector>,
    ) -> Self
    {
        let mut offsets: Vec<usize> = Vec::with_capacity(sectors.len() + 1);
        offsets.push(0);
        let mut acc: usize = 0;
        for s in sectors.iter() {
            acc += s.degeneracy;
            offsets.push(acc);
        }
        let positions: FxHashMap<Charge, usize> =
            sectors.iter().enumerate()
            .map(|(k, s)| (s.charge.clone(), k))
            .collect();
        Self { sym, dir, sectors, offsets, positions }
    }

    /// Return the symmetry the leg's labels live under.
    pub fn symmetry(&self) -> &Symmetry { &self.sym }

    /// Return the leg's direction.
    pub fn direction(&self) -> Direction { self.dir }

    /// Return the sectors in leg order.
    pub fn sectors(&self) -> &[Sector] { &self.sectors }

    /// Return the sector at position `k`, if it exists.
    pub fn sector(&self, k: usize) -> Option<&Sector> { self.sectors.get(k) }

    /// Return the number of sectors.
    pub fn num_sectors(&self) -> usize { self.sectors.len() }

    /// Return the total dimension, i.e. the sum of all degeneracies.
    pub fn dim(&self) -> usize { self.offsets[self.sectors.len()] }

    /// Return the position of the sector labeled `q`, if there is one.
    ///
    /// `q` is normalized first, so it may be given in any form [`Leg::new`]
    /// accepts. Returns `None` if `q` has the wrong arity.
    pub fn sector_position(&self, q: &Charge) -> Option<usize> {
        let q = self.sym.normalize(q.clone()).ok()?;
        self.positions.get(&q).copied()
    }

    /// Return the first dense index value covered by sector `k`.
    ///
    /// `sector_offset(num_sectors())` is the leg dimension.
    ///
    /// *Panics if `k > num_sectors()`.*
    pub fn sector_offset(&self, k: usize) -> usize { self.offsets[k] }

    /// Return the degeneracy of the sector labeled `q`.
    ///
    /// Fails with `LabelNotFound` if there is no such sector; see
    /// [`degeneracy_or_zero`][Self::degeneracy_or_zero] for the lenient
    /// version.
    pub fn degeneracy_of(&self, q: &Charge) -> LegResult<usize> {
        self.sector_position(q)
            .map(|k| self.sectors[k].degeneracy)
            .ok_or_else(|| LabelNotFound(q.clone()))
    }

    /// Return the degeneracy of the sector labeled `q`, or zero if there is no
    /// such sector.
    pub fn degeneracy_or_zero(&self, q: &Charge) -> usize {
        self.sector_position(q)
            .map(|k| self.sectors[k].degeneracy)
            .unwrap_or(0)
    }

    /// Return all labels with their aggregate degeneracies, sorted by label.
    pub fn unique_labels(&self) -> BTreeMap<Charge, usize> {
        let mut labels: BTreeMap<Charge, usize> = BTreeMap::new();
        self.sectors.iter()
            .for_each(|s| {
                *labels.entry(s.charge.clone()).or_insert(0) += s.degeneracy;
            });
        labels
    }

    /// Map a dense index value to its sector position and the offset within
    /// that sector.
    ///
    /// Returns `None` if `index >= dim()`. Runs a binary search over the
    /// cumulative degeneracies.
    pub fn locate(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.dim() { return None; }
        let k = self.offsets.partition_point(|off| *off <= index) - 1;
        Some((k, index - self.offsets[k]))
    }

    /// Return a copy of `self` with the direction flipped and labels unchanged.
    pub fn reverse_direction(&self) -> Self {
        let mut new = self.clone();
        new.dir = self.dir.reversed();
        new
    }

    /// Return a copy of `self` keeping only the first `dim` index values.
    ///
    /// Sectors past the cut are dropped and the sector containing the cut is
    /// shrunk, so the result has the same leading sectors in the same
    /// positions. Fails with `InvalidTruncation` unless `0 < dim <= dim()`.
    pub fn truncated(&self, dim: usize) -> LegResult<Self> {
        let current = self.dim();
        let (k, off) =
            dim.checked_sub(1)
            .and_then(|last| self.locate(last))
            .ok_or(InvalidTruncation { dim, current })?;
        let mut sectors: Vec<Sector> = self.sectors[..=k].to_vec();
        sectors[k].degeneracy = off + 1;
        Ok(Self::from_sectors_unchecked(self.sym.clone(), self.dir, sectors))
    }

    /// Return `true` if `self` and `other` can be contracted with each other:
    /// equal symmetries and sectors, opposite directions.
    pub fn is_dual_of(&self, other: &Self) -> bool {
        self.sym == other.sym
            && self.dir != other.dir
            && self.sectors == other.sectors
    }

    /// Fuse `self` with `other` into a single leg.
    ///
    /// See [`fusion_plan`][Self::fusion_plan].
    pub fn fuse_with(&self, other: &Self) -> LegResult<Self> {
        self.fusion_plan(other).map(|(leg, _)| leg)
    }

    /// Fuse `self` with `other` into a single leg, also returning where each
    /// sector pair ends up.
    ///
    /// The result takes the direction of `self`. Every sector pair `(a, b)`
    /// contributes the label `a + b` if both legs point the same way and
    /// `a - b` otherwise, with degeneracy `deg_a * deg_b`; pairs sharing a
    /// label are merged into one sector by summing their degeneracies. The
    /// result's sectors are sorted by label.
    ///
    /// Fails if the legs have different symmetries.
    pub fn fusion_plan(&self, other: &Self) -> LegResult<(Self, FusionMap)> {
        self.sym.ensure_same(&other.sym)?;
        let conv =
            if other.dir == self.dir { Direction::In } else { Direction::Out };
        let mut fill: BTreeMap<Charge, usize> = BTreeMap::new();
        let mut landing: Vec<(Charge, usize)> =
            Vec::with_capacity(self.sectors.len() * other.sectors.len());
        for sa in self.sectors.iter() {
            for sb in other.sectors.iter() {
                let q = self.sym.fuse(&sa.charge, Direction::In, &sb.charge, conv)?;
                let filled = fill.entry(q.clone()).or_insert(0);
                landing.push((q, *filled));
                *filled += sa.degeneracy * sb.degeneracy;
            }
        }
        let sectors: Vec<Sector> =
            fill.into_iter()
            .map(|(charge, degeneracy)| Sector { charge, degeneracy })
            .collect();
        let leg = Self::from_sectors_unchecked(self.sym.clone(), self.dir, sectors);
        let entries: Vec<(usize, usize)> =
            landing.into_iter()
            .map(|(q, off)| (leg.positions[&q], off))
            .collect();
        let map = FusionMap { n_right: other.sectors.len(), entries };
        Ok((leg, map))
    }

    /// Fuse a list of legs left to right.
    ///
    /// Fails if `legs` is empty or the legs have different symmetries.
    pub fn fuse_all(legs: &[Self]) -> LegResult<Self> {
        let (first, rest) = legs.split_first().ok_or(NoLegs)?;
        rest.iter()
            .try_fold(first.clone(), |acc, leg| acc.fuse_with(leg))
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Leg({}, {}) [", self.dir, self.sym)?;
        let n = self.sectors.len();
        for (k, s) in self.sectors.iter().enumerate() {
            write!(f, "{}: {}", s.charge, s.degeneracy)?;
            if k < n - 1 { write!(f, ", ")?; }
        }
        write!(f, "]")
    }
}
