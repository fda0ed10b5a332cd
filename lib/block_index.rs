//! Enumeration and lookup of the symmetry-allowed blocks of a list of legs.
//!
//! Given an ordered list of [`Leg`]s and a target [`Charge`], a [`BlockIndex`]
//! holds every tuple of sectors (one sector per leg) whose labels, each signed
//! by its leg's direction, fuse to the target. Tuples are stored in canonical
//! order, lexicographic over the legs' sector positions with the first leg most
//! significant, and each is identified by its position in that order, its
//! [`BlockId`].

use std::collections::{ BTreeMap, BTreeSet };
use log::debug;
use rustc_hash::{ FxHashMap, FxHashSet };
use thiserror::Error;
use crate::{
    charge::Charge,
    leg::{ Direction, Leg },
    symmetry::{ Symmetry, SymError },
};

#[derive(Debug, Error)]
pub enum BlockIndexError {
    #[error("symmetry error: {0}")]
    Sym(#[from] SymError),

    #[error("{0} blocks match the requested total label")]
    AmbiguousBlock(usize),

    #[error("no block matches the requested labels")]
    BlockNotFound,

    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },

    #[error("duplicate axis {0}")]
    DuplicateAxis(usize),

    #[error("a block index over no legs needs an explicit symmetry")]
    NoLegs,
}
pub type BlockIndexResult<T> = Result<T, BlockIndexError>;

use BlockIndexError::*;

/// Identifier of one block: its position in canonical order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Return the position of the block in canonical order.
    pub fn index(&self) -> usize { self.0 }
}

impl From<usize> for BlockId {
    fn from(k: usize) -> Self { Self(k) }
}

/// Result of a block lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Exactly one block matches.
    Found(BlockId),

    /// More than one block matches; all matches in canonical order.
    Ambiguous(Vec<BlockId>),

    /// No block matches.
    NotFound,
}

impl Lookup {
    fn from_matches(mut matches: Vec<BlockId>) -> Self {
        match matches.len() {
            0 => Self::NotFound,
            1 => Self::Found(matches.remove(0)),
            _ => Self::Ambiguous(matches),
        }
    }

    /// Return the block if exactly one matched.
    pub fn found(&self) -> Option<BlockId> {
        match self {
            Self::Found(id) => Some(*id),
            _ => None,
        }
    }

    /// Return the first match in canonical order, if any.
    pub fn first(&self) -> Option<BlockId> {
        match self {
            Self::Found(id) => Some(*id),
            Self::Ambiguous(ids) => ids.first().copied(),
            Self::NotFound => None,
        }
    }

    /// Return the block if exactly one matched, and fail with
    /// `AmbiguousBlock` or `BlockNotFound` otherwise.
    pub fn unique(self) -> BlockIndexResult<BlockId> {
        match self {
            Self::Found(id) => Ok(id),
            Self::Ambiguous(ids) => Err(AmbiguousBlock(ids.len())),
            Self::NotFound => Err(BlockNotFound),
        }
    }

    /// Return `true` if `self` is `Found`.
    pub fn is_found(&self) -> bool { matches!(self, Self::Found(_)) }

    /// Return `true` if `self` is `Ambiguous`.
    pub fn is_ambiguous(&self) -> bool { matches!(self, Self::Ambiguous(_)) }

    /// Return `true` if `self` is `NotFound`.
    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound) }
}

/// The canonical set of symmetry-allowed sector tuples for a list of legs and
/// a target label.
#[derive(Clone, Debug)]
pub struct BlockIndex {
    sym: Symmetry,
    legs: Vec<Leg>,
    target: Charge,
    tuples: Vec<Box<[usize]>>,
    lookup: FxHashMap<Box<[usize]>, BlockId>,
}

impl PartialEq for BlockIndex {
    fn eq(&self, other: &Self) -> bool {
        self.sym == other.sym
            && self.legs == other.legs
            && self.target == other.target
    }
}

impl BlockIndex {
    /// Enumerate the blocks of `legs` conserving `target`.
    ///
    /// All legs must share one symmetry, and `target` must have the arity of
    /// its charges. Fails with `NoLegs` if `legs` is empty; use
    /// [`with_symmetry`][Self::with_symmetry] for rank-0 indices.
    pub fn new(legs: Vec<Leg>, target: Charge) -> BlockIndexResult<Self> {
        let sym = legs.first().ok_or(NoLegs)?.symmetry().clone();
        Self::with_symmetry(sym, legs, target)
    }

    /// Enumerate the blocks of `legs` conserving `target` under `sym`.
    ///
    /// `target` is normalized under `sym` first, so e.g. `-1` and `2` name the
    /// same target under `Z3`. With no legs, the index has a single, empty
    /// tuple if `target` is the identity and is empty otherwise.
    pub fn with_symmetry(sym: Symmetry, legs: Vec<Leg>, target: Charge)
        -> BlockIndexResult<Self>
    {
        for leg in legs.iter() {
            sym.ensure_same(leg.symmetry())?;
        }
        let target = sym.normalize(target)?;
        let tuples = enumerate(&sym, &legs, &target)?;
        let lookup: FxHashMap<Box<[usize]>, BlockId> =
            tuples.iter().enumerate()
            .map(|(k, tup)| (tup.clone(), BlockId(k)))
            .collect();
        debug!(
            "enumerated {} blocks over {} legs for target {}",
            tuples.len(), legs.len(), target,
        );
        Ok(Self { sym, legs, target, tuples, lookup })
    }

    /// Return the symmetry shared by all legs.
    pub fn symmetry(&self) -> &Symmetry { &self.sym }

    /// Return the legs, in order.
    pub fn legs(&self) -> &[Leg] { &self.legs }

    /// Return the number of legs.
    pub fn rank(&self) -> usize { self.legs.len() }

    /// Return the target label.
    pub fn target(&self) -> &Charge { &self.target }

    /// Return the number of blocks.
    pub fn len(&self) -> usize { self.tuples.len() }

    /// Return `true` if no sector tuple conserves the target.
    pub fn is_empty(&self) -> bool { self.tuples.is_empty() }

    /// Return the sector positions of a block, one per leg.
    ///
    /// *Panics if `id` does not belong to `self`.*
    pub fn sectors(&self, id: BlockId) -> &[usize] { &self.tuples[id.0] }

    /// Return the labels of a block, one per leg.
    ///
    /// *Panics if `id` does not belong to `self`.*
    pub fn charges(&self, id: BlockId) -> Vec<Charge> {
        self.legs.iter().zip(self.tuples[id.0].iter())
            .map(|(leg, k)| leg.sectors()[*k].charge().clone())
            .collect()
    }

    /// Return the dense shape of a block.
    ///
    /// *Panics if `id` does not belong to `self`.*
    pub fn shape(&self, id: BlockId) -> Vec<usize> {
        self.legs.iter().zip(self.tuples[id.0].iter())
            .map(|(leg, k)| leg.sectors()[*k].degeneracy())
            .collect()
    }

    /// Iterate over all blocks in canonical order.
    ///
    /// The iterator item type is `(BlockId, &[usize])`, where the slice holds
    /// the block's sector positions.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &[usize])> + '_ {
        self.tuples.iter().enumerate()
            .map(|(k, tup)| (BlockId(k), tup.as_ref()))
    }

    /// Return every block's labels with its identifier, in canonical order.
    pub fn all_blocks(&self) -> Vec<(Vec<Charge>, BlockId)> {
        (0..self.tuples.len())
            .map(|k| (self.charges(BlockId(k)), BlockId(k)))
            .collect()
    }

    /// Look up a block by sector positions.
    pub fn find_sectors(&self, sectors: &[usize]) -> Option<BlockId> {
        self.lookup.get(sectors).copied()
    }

    /// Look up a block by its labels, one per leg.
    ///
    /// Labels are matched after normalization. Never returns `Ambiguous`,
    /// since labels are unique within each leg.
    pub fn find(&self, charges: &[Charge]) -> Lookup {
        if charges.len() != self.legs.len() { return Lookup::NotFound; }
        let mb_sectors: Option<Vec<usize>> =
            self.legs.iter().zip(charges)
            .map(|(leg, q)| leg.sector_position(q))
            .collect();
        mb_sectors
            .and_then(|sectors| self.find_sectors(&sectors))
            .map(Lookup::Found)
            .unwrap_or(Lookup::NotFound)
    }

    fn check_axes(&self, axes: &[usize]) -> BlockIndexResult<()> {
        let rank = self.legs.len();
        let mut seen: FxHashSet<usize> = FxHashSet::default();
        for &axis in axes.iter() {
            if axis >= rank { return Err(AxisOutOfRange { axis, rank }); }
            if !seen.insert(axis) { return Err(DuplicateAxis(axis)); }
        }
        Ok(())
    }

    fn partial_total(&self, sectors: &[usize], axes: &[usize])
        -> BlockIndexResult<Charge>
    {
        let mut acc: Vec<i64> = vec![0; self.sym.num_factors()];
        for &axis in axes.iter() {
            let leg = &self.legs[axis];
            let q = leg.sectors()[sectors[axis]].charge();
            self.sym.accumulate(&mut acc, q, leg.direction())?;
        }
        Ok(Charge::from_vec(acc))
    }

    /// Look up the blocks whose labels on a subset of legs fuse to `total`.
    ///
    /// Returns `Found` if exactly one block matches and `Ambiguous` with every
    /// match in canonical order if several do. `total` is normalized first; a
    /// total of the wrong arity matches nothing.
    pub fn find_by_total(&self, axes: &[usize], total: &Charge)
        -> BlockIndexResult<Lookup>
    {
        self.check_axes(axes)?;
        let Ok(total) = self.sym.normalize(total.clone()) else {
            return Ok(Lookup::NotFound);
        };
        let mut matches: Vec<BlockId> = Vec::new();
        for (id, tup) in self.iter() {
            if self.partial_total(tup, axes)? == total { matches.push(id); }
        }
        Ok(Lookup::from_matches(matches))
    }

    /// Return the labels that a subset of legs fuses to across all blocks,
    /// sorted, each with its aggregate degeneracy.
    ///
    /// The aggregate degeneracy of a label sums, over the distinct sector
    /// sub-tuples on `axes` that appear in some block and fuse to that label,
    /// the product of the sub-tuple's degeneracies.
    pub fn unique_target_labels(&self, axes: &[usize])
        -> BlockIndexResult<Vec<(Charge, usize)>>
    {
        self.check_axes(axes)?;
        let subtuples: BTreeSet<Vec<usize>> =
            self.tuples.iter()
            .map(|tup| axes.iter().map(|ax| tup[*ax]).collect())
            .collect();
        let mut totals: BTreeMap<Charge, usize> = BTreeMap::new();
        for sub in subtuples.into_iter() {
            let mut acc: Vec<i64> = vec![0; self.sym.num_factors()];
            let mut deg: usize = 1;
            for (ax, k) in axes.iter().zip(sub.iter()) {
                let leg = &self.legs[*ax];
                let sector = &leg.sectors()[*k];
                self.sym.accumulate(&mut acc, sector.charge(), leg.direction())?;
                deg *= sector.degeneracy();
            }
            *totals.entry(Charge::from_vec(acc)).or_insert(0) += deg;
        }
        Ok(totals.into_iter().collect())
    }
}

// Depth-first search over sector positions, left to right. A partial
// assignment of legs 0..k is only extended if the charge still missing from the
// target can be produced by legs k..n, so every branch ends in a block.
fn enumerate(sym: &Symmetry, legs: &[Leg], target: &Charge)
    -> BlockIndexResult<Vec<Box<[usize]>>>
{
    let n = legs.len();
    let mut reach: Vec<FxHashSet<Charge>> = vec![FxHashSet::default(); n + 1];
    reach[n].insert(sym.identity());
    for k in (0..n).rev() {
        let (head, tail) = reach.split_at_mut(k + 1);
        let dir = legs[k].direction();
        for r in tail[0].iter() {
            for sector in legs[k].sectors().iter() {
                let mut acc: Vec<i64> = r.components().to_vec();
                sym.accumulate(&mut acc, sector.charge(), dir)?;
                head[k].insert(Charge::from_vec(acc));
            }
        }
    }

    let mut tuples: Vec<Box<[usize]>> = Vec::new();
    if !reach[0].contains(target) { return Ok(tuples); }
    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let acc: Vec<i64> = vec![0; sym.num_factors()];
    search(sym, legs, target, &reach, &acc, &mut stack, &mut tuples)?;
    Ok(tuples)
}

fn search(
    sym: &Symmetry,
    legs: &[Leg],
    target: &Charge,
    reach: &[FxHashSet<Charge>],
    acc: &[i64],
    stack: &mut Vec<usize>,
    tuples: &mut Vec<Box<[usize]>>,
) -> BlockIndexResult<()>
{
    let k = stack.len();
    if k == legs.len() {
        tuples.push(stack.as_slice().into());
        return Ok(());
    }
    let dir: Direction = legs[k].direction();
    for (p, sector) in legs[k].sectors().iter().enumerate() {
        let mut next: Vec<i64> = acc.to_vec();
        sym.accumulate(&mut next, sector.charge(), dir)?;
        if reach[k + 1].contains(&sym.remainder(target, &next)?) {
            stack.push(p);
            search(sym, legs, target, reach, &next, stack, tuples)?;
            stack.pop();
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use crate::symmetry::Group;
    use super::*;
    use Direction::*;

    fn q(a: i64) -> Charge { Charge::from(a) }

    fn naive(legs: &[Leg], target: &Charge) -> Vec<Vec<usize>> {
        let sym = legs[0].symmetry();
        legs.iter()
            .map(|leg| 0..leg.num_sectors())
            .multi_cartesian_product()
            .filter(|tup| {
                let total =
                    sym.fuse_all(
                        legs.iter().zip(tup)
                        .map(|(leg, k)| {
                            (leg.sectors()[*k].charge(), leg.direction())
                        })
                    )
                    .unwrap();
                &total == target
            })
            .collect()
    }

    #[test]
    fn diagonal_blocks() {
        let l1 = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let idx =
            BlockIndex::new(vec![l1.clone(), l1.reverse_direction()], q(0))
            .unwrap();
        let tuples: Vec<Vec<usize>> =
            idx.iter().map(|(_, tup)| tup.to_vec()).collect();
        assert_eq!(tuples, vec![vec![0, 0], vec![1, 1]]);
        assert_eq!(idx.shape(BlockId(0)), vec![2, 2]);
        assert_eq!(idx.shape(BlockId(1)), vec![3, 3]);
        assert_eq!(idx.find(&[q(0), q(1)]), Lookup::NotFound);
        assert_eq!(idx.find(&[q(1), q(0)]), Lookup::NotFound);
        assert_eq!(idx.find(&[q(1), q(1)]), Lookup::Found(BlockId(1)));
    }

    #[test]
    fn matches_naive_product() {
        let legs =
            vec![
                Leg::u1(In, [(0, 1), (1, 2), (2, 1), (-1, 3)]).unwrap(),
                Leg::u1(In, [(1, 1), (0, 1), (-2, 2)]).unwrap(),
                Leg::u1(Out, [(0, 2), (1, 1), (3, 1)]).unwrap(),
                Leg::u1(Out, [(-1, 1), (2, 2)]).unwrap(),
            ];
        for t in -4..=5 {
            let idx = BlockIndex::new(legs.clone(), q(t)).unwrap();
            let tuples: Vec<Vec<usize>> =
                idx.iter().map(|(_, tup)| tup.to_vec()).collect();
            assert_eq!(tuples, naive(&legs, &q(t)), "target {t}");
        }
    }

    #[test]
    fn matches_naive_product_group() {
        let sym = Symmetry::product([Group::U1, Group::Zn(3)]).unwrap();
        let legs =
            vec![
                Leg::new(sym.clone(), In, [([0_i64, 0], 1), ([1, 1], 2), ([1, 2], 1)])
                    .unwrap(),
                Leg::new(sym.clone(), Out, [([0_i64, 2], 2), ([1, 0], 1)]).unwrap(),
                Leg::new(sym.clone(), In, [([-1_i64, 1], 1), ([0, 0], 3)]).unwrap(),
            ];
        for target in [[0_i64, 0], [0, 1], [1, 2], [-1, 0], [2, 2]] {
            let target = Charge::from(target);
            let idx = BlockIndex::new(legs.clone(), target.clone()).unwrap();
            let tuples: Vec<Vec<usize>> =
                idx.iter().map(|(_, tup)| tup.to_vec()).collect();
            assert_eq!(tuples, naive(&legs, &target));
        }
    }

    #[test]
    fn deterministic() {
        let legs =
            vec![
                Leg::u1(In, [(0, 1), (1, 2)]).unwrap(),
                Leg::u1(In, [(0, 1), (1, 1)]).unwrap(),
                Leg::u1(Out, [(0, 1), (1, 1), (2, 1)]).unwrap(),
            ];
        let a = BlockIndex::new(legs.clone(), q(0)).unwrap();
        let b = BlockIndex::new(legs, q(0)).unwrap();
        assert_eq!(a.all_blocks(), b.all_blocks());
        assert_eq!(a.all_blocks(), a.all_blocks());
        assert_eq!(a, b);
    }

    #[test]
    fn find_by_total() {
        let l = Leg::u1(In, [(0, 1), (1, 2)]).unwrap();
        let legs = vec![l.clone(), l.clone(), l.reverse_direction(), l.reverse_direction()];
        let idx = BlockIndex::new(legs, q(0)).unwrap();

        let lookup = idx.find_by_total(&[0, 1], &q(2)).unwrap();
        assert!(lookup.is_found());
        let id = lookup.unique().unwrap();
        assert_eq!(idx.charges(id), vec![q(1), q(1), q(1), q(1)]);

        let lookup = idx.find_by_total(&[0, 1], &q(1)).unwrap();
        assert!(lookup.is_ambiguous());
        let first = lookup.first().unwrap();
        assert_eq!(idx.charges(first), vec![q(0), q(1), q(0), q(1)]);
        assert!(matches!(lookup.unique(), Err(AmbiguousBlock(4))));

        let lookup = idx.find_by_total(&[0, 1], &q(3)).unwrap();
        assert!(lookup.is_not_found());
        assert!(matches!(lookup.unique(), Err(BlockNotFound)));

        assert!(matches!(
            idx.find_by_total(&[0, 4], &q(0)),
            Err(AxisOutOfRange { axis: 4, rank: 4 }),
        ));
        assert!(matches!(
            idx.find_by_total(&[1, 1], &q(0)),
            Err(DuplicateAxis(1)),
        ));
    }

    #[test]
    fn unique_target_labels() {
        let l1 = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let l2 = Leg::u1(In, [(0, 1), (1, 1)]).unwrap();
        let l3 = Leg::u1(Out, [(0, 1), (1, 1), (2, 1)]).unwrap();
        let idx = BlockIndex::new(vec![l1, l2, l3], q(0)).unwrap();
        let labels = idx.unique_target_labels(&[0, 1]).unwrap();
        assert_eq!(labels, vec![(q(0), 2), (q(1), 5), (q(2), 3)]);
        let labels = idx.unique_target_labels(&[2]).unwrap();
        assert_eq!(labels, vec![(q(-2), 1), (q(-1), 1), (q(0), 1)]);
    }

    #[test]
    fn rank_zero() {
        let sym = Symmetry::u1();
        let idx = BlockIndex::with_symmetry(sym.clone(), vec![], q(0)).unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.shape(BlockId(0)), Vec::<usize>::new());
        let idx = BlockIndex::with_symmetry(sym, vec![], q(1)).unwrap();
        assert!(idx.is_empty());
        assert!(matches!(BlockIndex::new(vec![], q(0)), Err(NoLegs)));
    }

    #[test]
    fn incompatible_legs() {
        let l1 = Leg::u1(In, [(0, 1)]).unwrap();
        let l2 = Leg::new(Symmetry::zn(2).unwrap(), Out, [(0_i64, 1)]).unwrap();
        assert!(matches!(
            BlockIndex::new(vec![l1.clone(), l2], q(0)),
            Err(Sym(SymError::IncompatibleSymmetry(..))),
        ));
        assert!(matches!(
            BlockIndex::new(vec![l1], Charge::from([0, 0])),
            Err(Sym(SymError::ChargeArity { .. })),
        ));
    }

    #[test]
    fn cyclic_labels_normalized() {
        let z3 = Symmetry::zn(3).unwrap();
        let leg = Leg::new(z3.clone(), In, [(-1_i64, 2), (0, 1)]).unwrap();
        let idx =
            BlockIndex::new(vec![leg.clone(), leg.clone()], Charge::from(-2))
            .unwrap();
        assert_eq!(idx.target(), &Charge::from(1));
        let expected =
            BlockIndex::new(vec![leg.clone(), leg.clone()], Charge::from(1)).unwrap();
        assert_eq!(idx.all_blocks(), expected.all_blocks());

        // (-1) + (-1) = -2 = 1 mod 3
        let id = idx.find(&[Charge::from(-1), Charge::from(-1)]);
        assert_eq!(id, Lookup::Found(BlockId(0)));
        assert_eq!(idx.find(&[Charge::from(2), Charge::from(2)]), id);
        assert_eq!(idx.find(&[Charge::from(5), Charge::from(-4)]), id);
        assert_eq!(idx.find(&[Charge::from([2, 0]), Charge::from(2)]), Lookup::NotFound);

        let lookup = idx.find_by_total(&[0], &Charge::from(-1)).unwrap();
        assert_eq!(lookup, id);
        let lookup = idx.find_by_total(&[0], &Charge::from([2, 0])).unwrap();
        assert!(lookup.is_not_found());

        assert!(matches!(
            BlockIndex::new(vec![leg], Charge::from([1, 1])),
            Err(Sym(SymError::ChargeArity { .. })),
        ));
    }

    #[test]
    fn label_overflow() {
        let l = Leg::u1(In, [(i64::MAX, 1), (0, 1)]).unwrap();
        assert!(matches!(
            BlockIndex::new(vec![l.clone(), l], q(0)),
            Err(Sym(SymError::LabelOverflow(_))),
        ));
    }

    #[test]
    fn unreachable_target() {
        let l = Leg::u1(In, [(0, 1), (1, 1)]).unwrap();
        let idx = BlockIndex::new(vec![l.clone(), l], q(5)).unwrap();
        assert!(idx.is_empty());
        assert!(idx.all_blocks().is_empty());
    }
}
