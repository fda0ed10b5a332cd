use std::{ fmt, sync::OnceLock };
use itertools::Itertools;
use ndarray::{ self as nd, Dimension };
use rustc_hash::FxHashSet;
use crate::{
    block_index::{ BlockId, BlockIndex, BlockIndexError, Lookup },
    charge::Charge,
    leg::Leg,
    symmetry::Symmetry,
};
use super::{ Scalar, TensorError, TensorResult };

use TensorError::*;

/// A dynamically dimensioned array, with data stored behind an atomic reference
/// counter.
pub type ArcArrayD<T> = nd::ArcArray<T, nd::IxDyn>;

pub(crate) fn default_labels(rank: usize) -> Vec<String> {
    (0..rank).map(|k| k.to_string()).collect()
}

// keep `labels` if they are all distinct, fall back to positional names otherwise
pub(crate) fn labels_or_default(labels: Vec<String>) -> Vec<String> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    if labels.iter().all(|l| seen.insert(l.as_str())) {
        labels
    } else {
        default_labels(labels.len())
    }
}

pub(crate) fn check_permutation(order: &[usize], rank: usize) -> TensorResult<()> {
    let mut seen: Vec<bool> = vec![false; rank];
    let valid =
        order.len() == rank
        && order.iter()
            .all(|k| *k < rank && !std::mem::replace(&mut seen[*k], true));
    if valid { Ok(()) } else { Err(InvalidPermutation(order.into())) }
}

/// A tensor whose legs carry quantum-number sectors, storing only the blocks
/// allowed by charge conservation.
///
/// Every tensor has an ordered list of [`Leg`]s, a target [`Charge`] that the
/// signed labels of each stored block fuse to, and one unique string label per
/// leg (`"0"`, `"1"`, ... by default) used to pair legs by name. Block storage
/// is exactly the set enumerated by the tensor's [`BlockIndex`], indexed by
/// [`BlockId`].
///
/// Buffers are reference-counted and copied on the first mutable access while
/// shared, so cloning or permuting a tensor is cheap. The Frobenius norm is
/// computed lazily and cached until the next mutable access.
#[derive(Clone, Debug)]
pub struct CompositeTensor<A> {
    pub(crate) index: BlockIndex,
    pub(crate) labels: Vec<String>,
    pub(crate) blocks: Vec<ArcArrayD<A>>,
    pub(crate) norm: OnceLock<f64>,
}

impl<A> CompositeTensor<A>
where A: Scalar
{
    pub(crate) fn from_parts(
        index: BlockIndex,
        labels: Vec<String>,
        blocks: Vec<ArcArrayD<A>>,
    ) -> Self
    {
        Self { index, labels, blocks, norm: OnceLock::new() }
    }

    pub(crate) fn zeros_from_index(index: BlockIndex, labels: Vec<String>) -> Self {
        let blocks: Vec<ArcArrayD<A>> =
            index.iter()
            .map(|(id, _)| ArcArrayD::zeros(index.shape(id)))
            .collect();
        Self::from_parts(index, labels, blocks)
    }

    /// Create a new tensor with all allowed blocks zero-initialized.
    ///
    /// `target` is normalized under the legs' symmetry. Fails if `legs` is
    /// empty, the legs have different symmetries, or `target` has the wrong
    /// arity.
    pub fn zeros(legs: Vec<Leg>, target: Charge) -> TensorResult<Self> {
        let rank = legs.len();
        let index = BlockIndex::new(legs, target)?;
        Ok(Self::zeros_from_index(index, default_labels(rank)))
    }

    /// Like [`zeros`][Self::zeros], but with an explicit symmetry so that
    /// `legs` may be empty.
    pub fn zeros_with_symmetry(sym: Symmetry, legs: Vec<Leg>, target: Charge)
        -> TensorResult<Self>
    {
        let rank = legs.len();
        let index = BlockIndex::with_symmetry(sym, legs, target)?;
        Ok(Self::zeros_from_index(index, default_labels(rank)))
    }

    /// Create a rank-0 tensor holding a single value, with the identity as
    /// target.
    pub fn scalar(sym: Symmetry, val: A) -> TensorResult<Self> {
        let target = sym.identity();
        let index = BlockIndex::with_symmetry(sym, Vec::new(), target)?;
        let blocks = vec![nd::arr0(val).into_dyn().into_shared()];
        Ok(Self::from_parts(index, Vec::new(), blocks))
    }

    /// Create a new tensor from explicit block data, given in canonical block
    /// order.
    ///
    /// Fails if the number of blocks or any block's shape does not match the
    /// block index of `(legs, target)`.
    pub fn from_blocks<I>(legs: Vec<Leg>, target: Charge, blocks: I)
        -> TensorResult<Self>
    where I: IntoIterator<Item = nd::ArrayD<A>>
    {
        let rank = legs.len();
        let index = BlockIndex::new(legs, target)?;
        let blocks: Vec<nd::ArrayD<A>> = blocks.into_iter().collect();
        if blocks.len() != index.len() {
            return Err(BlockCount { expected: index.len(), found: blocks.len() });
        }
        for (id, blk) in index.iter().map(|(id, _)| id).zip(blocks.iter()) {
            let expected = index.shape(id);
            if blk.shape() != expected.as_slice() {
                return Err(BlockShapeMismatch {
                    expected: expected.into(),
                    found: blk.shape().into(),
                });
            }
        }
        let blocks: Vec<ArcArrayD<A>> =
            blocks.into_iter().map(|blk| blk.into_shared()).collect();
        Ok(Self::from_parts(index, default_labels(rank), blocks))
    }

    /// Create a new tensor using a function over global indices.
    ///
    /// `elems` is only called for elements inside an allowed block; all others
    /// are zero.
    pub fn from_fn<F>(legs: Vec<Leg>, target: Charge, mut elems: F)
        -> TensorResult<Self>
    where F: FnMut(&[usize]) -> A
    {
        let rank = legs.len();
        let index = BlockIndex::new(legs, target)?;
        let mut global: Vec<usize> = vec![0; rank];
        let blocks: Vec<ArcArrayD<A>> =
            index.iter()
            .map(|(id, tup)| {
                let offsets: Vec<usize> =
                    index.legs().iter().zip(tup)
                    .map(|(leg, k)| leg.sector_offset(*k))
                    .collect();
                nd::ArrayD::from_shape_fn(
                    index.shape(id),
                    |ix| {
                        global.iter_mut()
                            .zip(offsets.iter().zip(ix.slice()))
                            .for_each(|(g, (off, i))| { *g = off + i; });
                        elems(&global)
                    },
                )
                .into_shared()
            })
            .collect();
        Ok(Self::from_parts(index, default_labels(rank), blocks))
    }

    /// Create a new tensor from a full dense array.
    ///
    /// Fails with `ForbiddenWrite` if any element outside the allowed blocks is
    /// non-zero, and with `BlockShapeMismatch` if the array's shape does not
    /// match the leg dimensions.
    pub fn from_dense<S>(
        legs: Vec<Leg>,
        target: Charge,
        array: &nd::ArrayBase<S, nd::IxDyn>,
    ) -> TensorResult<Self>
    where S: nd::Data<Elem = A>
    {
        let dims: Vec<usize> = legs.iter().map(|leg| leg.dim()).collect();
        if array.shape() != dims.as_slice() {
            return Err(BlockShapeMismatch {
                expected: dims.into(),
                found: array.shape().into(),
            });
        }
        let tensor = Self::zeros(legs, target)?;
        for (ix, a) in array.indexed_iter() {
            if *a == A::zero() { continue; }
            let idx = ix.slice();
            if tensor.locate(idx)?.is_none() { return Err(ForbiddenWrite(idx.into())); }
        }
        Self::from_fn(
            tensor.index.legs().to_vec(),
            tensor.index.target().clone(),
            |idx| array[idx],
        )
    }

    /// Replace all leg labels.
    ///
    /// Fails if the number of labels does not match the rank or two labels are
    /// equal.
    pub fn with_labels<I, S>(mut self, labels: I) -> TensorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(|l| l.into()).collect();
        if labels.len() != self.rank() {
            return Err(RankMismatch { expected: self.rank(), found: labels.len() });
        }
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
            return Err(DuplicateLabel(dup.clone()));
        }
        self.labels = labels;
        Ok(self)
    }

    /// Rename the leg labeled `old` to `new`.
    ///
    /// Fails if `old` does not exist or `new` is already used by another leg.
    pub fn relabel(&mut self, old: &str, new: &str) -> TensorResult<()> {
        let k = self.label_position(old)?;
        if self.labels.iter().enumerate().any(|(j, l)| j != k && l == new) {
            return Err(DuplicateLabel(new.to_string()));
        }
        self.labels[k] = new.to_string();
        Ok(())
    }

    /// Return the position of the leg labeled `label`.
    pub fn label_position(&self, label: &str) -> TensorResult<usize> {
        self.labels.iter()
            .position(|l| l == label)
            .ok_or_else(|| LabelNotFound(label.to_string()))
    }

    /// Return the leg labels.
    pub fn labels(&self) -> &[String] { &self.labels }

    /// Return the block index.
    pub fn index(&self) -> &BlockIndex { &self.index }

    /// Return the legs, in order.
    pub fn legs(&self) -> &[Leg] { self.index.legs() }

    /// Return the leg at position `k`, if it exists.
    pub fn leg(&self, k: usize) -> Option<&Leg> { self.index.legs().get(k) }

    /// Return the number of legs.
    pub fn rank(&self) -> usize { self.index.rank() }

    /// Return the full dense shape, i.e. the dimension of every leg.
    pub fn shape(&self) -> Vec<usize> {
        self.index.legs().iter().map(|leg| leg.dim()).collect()
    }

    /// Return the target label.
    pub fn target(&self) -> &Charge { self.index.target() }

    /// Return the symmetry shared by all legs.
    pub fn symmetry(&self) -> &Symmetry { self.index.symmetry() }

    /// Return the number of stored blocks.
    pub fn num_blocks(&self) -> usize { self.blocks.len() }

    fn check_index(&self, idx: &[usize]) -> TensorResult<()> {
        if idx.len() != self.rank() {
            return Err(RankMismatch { expected: self.rank(), found: idx.len() });
        }
        for (axis, (leg, index)) in self.legs().iter().zip(idx).enumerate() {
            if *index >= leg.dim() {
                return Err(IndexOutOfBounds { axis, index: *index, dim: leg.dim() });
            }
        }
        Ok(())
    }

    /// Map a global multi-index to its block and the local index inside that
    /// block.
    ///
    /// Returns `Ok(None)` if the element is forbidden by the symmetry.
    pub fn locate(&self, idx: &[usize]) -> TensorResult<Option<(BlockId, Vec<usize>)>> {
        self.check_index(idx)?;
        let mut sectors: Vec<usize> = Vec::with_capacity(idx.len());
        let mut local: Vec<usize> = Vec::with_capacity(idx.len());
        for (axis, (leg, i)) in self.legs().iter().zip(idx).enumerate() {
            let (k, off) =
                leg.locate(*i)
                .ok_or(IndexOutOfBounds { axis, index: *i, dim: leg.dim() })?;
            sectors.push(k);
            local.push(off);
        }
        Ok(self.index.find_sectors(&sectors).map(|id| (id, local)))
    }

    /// Return `true` if the element at `idx` lies inside an allowed block.
    pub fn elem_exists(&self, idx: &[usize]) -> TensorResult<bool> {
        self.locate(idx).map(|loc| loc.is_some())
    }

    /// Return the element at `idx`, which is zero if the element is forbidden
    /// by the symmetry.
    pub fn at(&self, idx: &[usize]) -> TensorResult<A> {
        Ok(
            self.locate(idx)?
            .map(|(id, local)| self.blocks[id.0][local.as_slice()])
            .unwrap_or_else(A::zero)
        )
    }

    /// Return the element at `idx`, failing with `ElementOutOfSymmetrySector`
    /// if it is forbidden by the symmetry.
    pub fn elem(&self, idx: &[usize]) -> TensorResult<A> {
        self.locate(idx)?
            .map(|(id, local)| self.blocks[id.0][local.as_slice()])
            .ok_or_else(|| ElementOutOfSymmetrySector(idx.into()))
    }

    /// Set the element at `idx`.
    ///
    /// Writing zero to a forbidden element is a no-op; writing anything else
    /// there fails with `ForbiddenWrite`.
    pub fn set(&mut self, idx: &[usize], val: A) -> TensorResult<()> {
        match self.locate(idx)? {
            Some((id, local)) => {
                self.invalidate();
                self.blocks[id.0][local.as_slice()] = val;
                Ok(())
            },
            None if val == A::zero() => Ok(()),
            None => Err(ForbiddenWrite(idx.into())),
        }
    }

    fn invalidate(&mut self) { self.norm = OnceLock::new(); }

    /// Return a read-only view of a block.
    pub fn block(&self, id: BlockId) -> Option<nd::ArrayViewD<'_, A>> {
        self.blocks.get(id.0).map(|blk| blk.view())
    }

    /// Return a mutable view of a block.
    ///
    /// If the block's storage is shared with another tensor, it is copied
    /// first.
    pub fn block_mut(&mut self, id: BlockId) -> Option<nd::ArrayViewMutD<'_, A>> {
        self.invalidate();
        self.blocks.get_mut(id.0).map(|blk| blk.view_mut())
    }

    /// Return a read-only view of the block with the given labels, one per
    /// leg.
    pub fn block_by_charges(&self, charges: &[Charge])
        -> TensorResult<nd::ArrayViewD<'_, A>>
    {
        let id = self.index.find(charges).unique()?;
        Ok(self.blocks[id.0].view())
    }

    /// Return a mutable view of the block with the given labels, one per leg.
    pub fn block_by_charges_mut(&mut self, charges: &[Charge])
        -> TensorResult<nd::ArrayViewMutD<'_, A>>
    {
        let id = self.index.find(charges).unique()?;
        self.invalidate();
        Ok(self.blocks[id.0].view_mut())
    }

    /// Look up the blocks whose labels on `axes` fuse to `total`, leaving the
    /// choice of what to do with several matches to the caller.
    pub fn lookup_by_total(&self, axes: &[usize], total: &Charge)
        -> TensorResult<Lookup>
    {
        Ok(self.index.find_by_total(axes, total)?)
    }

    /// Return the unique block whose labels on `axes` fuse to `total`.
    ///
    /// Fails with `AmbiguousBlock` if several blocks match; use
    /// [`lookup_by_total`][Self::lookup_by_total] with [`Lookup::first`] to
    /// take the first one instead.
    pub fn block_by_total(&self, axes: &[usize], total: &Charge)
        -> TensorResult<(BlockId, nd::ArrayViewD<'_, A>)>
    {
        let id = self.index.find_by_total(axes, total)?.unique()?;
        Ok((id, self.blocks[id.0].view()))
    }

    /// Iterate over all blocks in canonical order.
    ///
    /// The iterator item type is `(BlockId, ArrayViewD<A>)`.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, nd::ArrayViewD<'_, A>)> + '_ {
        self.blocks.iter().enumerate()
            .map(|(k, blk)| (BlockId(k), blk.view()))
    }

    /// Replace the data of a block.
    ///
    /// Fails if `id` is not a block of `self` or the shape does not match.
    pub fn put_block<S>(&mut self, id: BlockId, data: nd::ArrayBase<S, nd::IxDyn>)
        -> TensorResult<()>
    where S: nd::DataOwned<Elem = A>
    {
        if id.0 >= self.blocks.len() { return Err(BlockIndexError::BlockNotFound.into()); }
        let expected = self.index.shape(id);
        if data.shape() != expected.as_slice() {
            return Err(BlockShapeMismatch {
                expected: expected.into(),
                found: data.shape().into(),
            });
        }
        self.invalidate();
        self.blocks[id.0] = data.into_shared();
        Ok(())
    }

    /// Return the Frobenius norm, computing it on first use.
    pub fn norm(&self) -> f64 {
        *self.norm.get_or_init(|| {
            self.blocks.iter()
                .flat_map(|blk| blk.iter())
                .map(|a| a.norm_sqr())
                .sum::<f64>()
                .sqrt()
        })
    }

    /// Return `true` if the norm is currently cached.
    pub fn norm_is_cached(&self) -> bool { self.norm.get().is_some() }

    /// Multiply every element by a scalar in place.
    pub fn scale_inplace(&mut self, scalar: A) {
        self.invalidate();
        self.blocks.iter_mut()
            .for_each(|blk| { blk.mapv_inplace(|a| a * scalar); });
    }

    /// Multiply every element by a scalar, consuming `self`.
    pub fn scale(mut self, scalar: A) -> Self {
        self.scale_inplace(scalar);
        self
    }

    /// Return the conjugate tensor: elements conjugated, every leg direction
    /// reversed, and the target reversed.
    ///
    /// Blocks keep their identifiers.
    pub fn conj(&self) -> TensorResult<Self> {
        let sym = self.symmetry().clone();
        let legs: Vec<Leg> =
            self.legs().iter().map(|leg| leg.reverse_direction()).collect();
        let target = sym.reverse(self.target())?;
        let index = BlockIndex::with_symmetry(sym, legs, target)?;
        let blocks: Vec<ArcArrayD<A>> =
            self.blocks.iter()
            .map(|blk| blk.mapv(|a| a.conj()).into_shared())
            .collect();
        Ok(Self::from_parts(index, self.labels.clone(), blocks))
    }

    /// Reorder the legs.
    ///
    /// Leg `k` of the result is leg `order[k]` of `self`, and labels follow
    /// their legs. The result shares block storage with `self`; elements keep
    /// their values, i.e. `permuted.at(i) == self.at(j)` whenever
    /// `i[k] == j[order[k]]`.
    pub fn permute(&self, order: &[usize]) -> TensorResult<Self> {
        check_permutation(order, self.rank())?;
        let legs: Vec<Leg> =
            order.iter().map(|k| self.legs()[*k].clone()).collect();
        let labels: Vec<String> =
            order.iter().map(|k| self.labels[*k].clone()).collect();
        let index =
            BlockIndex::with_symmetry(
                self.symmetry().clone(), legs, self.target().clone())?;
        let mut old_tup: Vec<usize> = vec![0; order.len()];
        let blocks: Vec<ArcArrayD<A>> =
            index.iter()
            .map(|(_, tup)| -> TensorResult<ArcArrayD<A>> {
                order.iter().zip(tup)
                    .for_each(|(k, s)| { old_tup[*k] = *s; });
                let old_id =
                    self.index.find_sectors(&old_tup)
                    .ok_or(BlockIndexError::BlockNotFound)?;
                Ok(self.blocks[old_id.0].clone().permuted_axes(order.to_vec()))
            })
            .collect::<TensorResult<Vec<_>>>()?;
        Ok(Self::from_parts(index, labels, blocks))
    }

    /// Reorder the legs by label.
    ///
    /// Leg `k` of the result is the leg labeled `labels[k]`.
    pub fn permute_by_labels<S>(&self, labels: &[S]) -> TensorResult<Self>
    where S: AsRef<str>
    {
        let order: Vec<usize> =
            labels.iter()
            .map(|l| self.label_position(l.as_ref()))
            .collect::<TensorResult<_>>()?;
        self.permute(&order)
    }

    /// Expand into a full dense array, with zeros outside the allowed blocks.
    pub fn to_dense(&self) -> nd::ArrayD<A> {
        let mut dense: nd::ArrayD<A> = nd::ArrayD::zeros(self.shape());
        for (id, tup) in self.index.iter() {
            let legs = self.legs();
            let shape = self.index.shape(id);
            dense.slice_each_axis_mut(|ax| {
                let k = ax.axis.index();
                let start = legs[k].sector_offset(tup[k]);
                nd::Slice::from(start..start + shape[k])
            })
            .assign(&self.blocks[id.0]);
        }
        dense
    }

    /// Return `true` if `self` and `other` have identical legs and targets,
    /// and all corresponding elements differ in modulus by less than
    /// `thresh`, which defaults to `1e-12`.
    ///
    /// Labels are not compared.
    pub fn approx_eq(&self, other: &Self, thresh: Option<f64>) -> bool {
        let eps = thresh.unwrap_or(1e-12);
        self.index == other.index
            && self.blocks.iter().zip(other.blocks.iter())
                .all(|(l, r)| {
                    l.iter().zip(r.iter())
                        .all(|(a, b)| (*a - *b).norm_sqr().sqrt() < eps)
                })
    }
}

impl<A> fmt::Display for CompositeTensor<A>
where A: Scalar + fmt::Display
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CompositeTensor {{ target: {} }}", self.target())?;
        for (label, leg) in self.labels.iter().zip(self.legs()) {
            writeln!(f, "  {label}: {leg}")?;
        }
        for (id, blk) in self.blocks() {
            let charges = self.index.charges(id);
            writeln!(f, "block {} [{}]", id.index(), charges.iter().join(", "))?;
            writeln!(f, "{blk}")?;
        }
        Ok(())
    }
}
