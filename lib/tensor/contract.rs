use ndarray::{ self as nd, linalg::general_mat_mul };
use log::{ debug, trace };
use rayon::prelude::*;
use rustc_hash::{ FxHashMap, FxHashSet };
use crate::{
    block_index::{ BlockId, BlockIndex, BlockIndexError },
    leg::{ Direction, Leg },
};
use super::{
    Scalar,
    TensorError,
    TensorResult,
    composite::{ ArcArrayD, CompositeTensor, labels_or_default },
};

use TensorError::*;

/// Settings for [`CompositeTensor::contract_with`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContractOptions {
    /// Compute result blocks on the `rayon` thread pool. Defaults to `false`.
    pub parallel: bool,

    /// Minimum number of non-empty result blocks needed before work is
    /// actually spread over threads. Defaults to `8`.
    pub min_parallel_blocks: usize,
}

impl Default for ContractOptions {
    fn default() -> Self {
        Self { parallel: false, min_parallel_blocks: 8 }
    }
}

impl ContractOptions {
    /// Set `parallel`.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set `min_parallel_blocks`.
    pub fn with_min_parallel_blocks(mut self, min: usize) -> Self {
        self.min_parallel_blocks = min;
        self
    }
}

fn check_axes<I>(axes: I, rank: usize) -> TensorResult<()>
where I: IntoIterator<Item = usize>
{
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    for axis in axes.into_iter() {
        if axis >= rank { return Err(AxisOutOfRange { axis, rank }); }
        if !seen.insert(axis) { return Err(DuplicateAxis(axis)); }
    }
    Ok(())
}

// axes of a block arranged for matricization, with the sizes of the two groups
struct Layout {
    perm: Vec<usize>,
    rows: usize,
    cols: usize,
}

impl Layout {
    fn new(first: &[usize], second: &[usize], shape: &[usize]) -> Self {
        let perm: Vec<usize> = first.iter().chain(second).copied().collect();
        let rows: usize = first.iter().map(|k| shape[*k]).product();
        let cols: usize = second.iter().map(|k| shape[*k]).product();
        Self { perm, rows, cols }
    }
}

// move the axes in `first` to the rows and those in `second` to the columns
fn matricize<A>(blk: &ArcArrayD<A>, first: &[usize], second: &[usize])
    -> TensorResult<nd::Array2<A>>
where A: Scalar
{
    let Layout { perm, rows, cols } = Layout::new(first, second, blk.shape());
    let mat: nd::Array2<A> =
        blk.view()
        .permuted_axes(perm)
        .as_standard_layout()
        .into_owned()
        .into_shape((rows, cols))?;
    Ok(mat)
}

impl<A> CompositeTensor<A>
where A: Scalar
{
    /// Contract `self` with `other` over pairs of legs, using default
    /// [`ContractOptions`].
    ///
    /// See [`contract_with`][Self::contract_with].
    pub fn contract(&self, other: &Self, pairs: &[(usize, usize)])
        -> TensorResult<Self>
    {
        self.contract_with(other, pairs, &ContractOptions::default())
    }

    /// Contract `self` with `other` over every pair of legs sharing a label.
    ///
    /// With no shared labels this is the outer product.
    pub fn contract_common(&self, other: &Self) -> TensorResult<Self> {
        let pairs: Vec<(usize, usize)> =
            self.labels.iter().enumerate()
            .filter_map(|(a, label)| {
                other.labels.iter().position(|l| l == label).map(|b| (a, b))
            })
            .collect();
        self.contract(other, &pairs)
    }

    /// Contract `self` with `other` over pairs of legs `(a, b)`, summing over
    /// leg `a` of `self` against leg `b` of `other`.
    ///
    /// Each leg `b` must be exactly leg `a` with its direction reversed, or
    /// this fails with `LegMismatch`. All checks happen before any block data
    /// is read.
    ///
    /// The result's legs are the uncontracted legs of `self` followed by those
    /// of `other`, each group in its original order, with labels following
    /// their legs (positional labels are used instead if this would duplicate
    /// a label). Its target is the fusion of both operands' targets.
    ///
    /// Every pair of operand blocks whose contracted sectors agree contributes
    /// one matrix product to exactly one result block. Result blocks no pair
    /// contributes to are zero.
    pub fn contract_with(
        &self,
        other: &Self,
        pairs: &[(usize, usize)],
        opts: &ContractOptions,
    ) -> TensorResult<Self>
    {
        self.symmetry().ensure_same(other.symmetry())?;
        check_axes(pairs.iter().map(|(a, _)| *a), self.rank())?;
        check_axes(pairs.iter().map(|(_, b)| *b), other.rank())?;
        for &(a, b) in pairs.iter() {
            if self.legs()[a].reverse_direction() != other.legs()[b] {
                return Err(LegMismatch(a, b));
            }
        }

        let comm_a: Vec<usize> = pairs.iter().map(|(a, _)| *a).collect();
        let comm_b: Vec<usize> = pairs.iter().map(|(_, b)| *b).collect();
        let free_a: Vec<usize> =
            (0..self.rank()).filter(|k| !comm_a.contains(k)).collect();
        let free_b: Vec<usize> =
            (0..other.rank()).filter(|k| !comm_b.contains(k)).collect();

        let sym = self.symmetry().clone();
        let target =
            sym.fuse(self.target(), Direction::In, other.target(), Direction::In)?;
        let legs: Vec<Leg> =
            free_a.iter().map(|k| self.legs()[*k].clone())
            .chain(free_b.iter().map(|k| other.legs()[*k].clone()))
            .collect();
        let labels: Vec<String> =
            free_a.iter().map(|k| self.labels[*k].clone())
            .chain(free_b.iter().map(|k| other.labels[*k].clone()))
            .collect();
        let index = BlockIndex::with_symmetry(sym, legs, target)?;

        // group the blocks of `other` by their sectors on the contracted legs
        let mut by_key: FxHashMap<Vec<usize>, Vec<(BlockId, &[usize])>> =
            FxHashMap::default();
        for (id, tup) in other.index.iter() {
            let key: Vec<usize> = comm_b.iter().map(|k| tup[*k]).collect();
            by_key.entry(key).or_default().push((id, tup));
        }

        let mut plan: Vec<Vec<(BlockId, BlockId)>> = vec![Vec::new(); index.len()];
        let mut res_tup: Vec<usize> = Vec::with_capacity(index.rank());
        let mut n_pairs: usize = 0;
        for (id_a, tup_a) in self.index.iter() {
            let key: Vec<usize> = comm_a.iter().map(|k| tup_a[*k]).collect();
            let Some(matches) = by_key.get(&key) else { continue; };
            for (id_b, tup_b) in matches.iter() {
                res_tup.clear();
                res_tup.extend(free_a.iter().map(|k| tup_a[*k]));
                res_tup.extend(free_b.iter().map(|k| tup_b[*k]));
                let res_id =
                    index.find_sectors(&res_tup)
                    .ok_or(BlockIndexError::BlockNotFound)?;
                plan[res_id.index()].push((id_a, *id_b));
                n_pairs += 1;
            }
        }

        let n_nonempty = plan.iter().filter(|p| !p.is_empty()).count();
        let parallel = opts.parallel && n_nonempty >= opts.min_parallel_blocks;
        debug!(
            "contracting over {} legs: {} block pairs into {} of {} result blocks{}",
            pairs.len(), n_pairs, n_nonempty, index.len(),
            if parallel { " (parallel)" } else { "" },
        );

        let compute = |(k, contribs): (usize, &Vec<(BlockId, BlockId)>)|
            -> TensorResult<ArcArrayD<A>>
        {
            let shape = index.shape(BlockId(k));
            let rows: usize = shape[..free_a.len()].iter().product();
            let cols: usize = shape[free_a.len()..].iter().product();
            let mut acc: nd::Array2<A> = nd::Array2::zeros((rows, cols));
            for (id_a, id_b) in contribs.iter() {
                trace!(
                    "block {} x block {} -> block {}",
                    id_a.index(), id_b.index(), k,
                );
                let a = matricize(&self.blocks[id_a.index()], &free_a, &comm_a)?;
                let b = matricize(&other.blocks[id_b.index()], &comm_b, &free_b)?;
                general_mat_mul(A::one(), &a, &b, A::one(), &mut acc);
            }
            Ok(acc.into_shape(shape)?.into_shared())
        };
        let blocks: Vec<ArcArrayD<A>> =
            if parallel {
                plan.par_iter().enumerate().map(compute).collect::<TensorResult<_>>()?
            } else {
                plan.iter().enumerate().map(compute).collect::<TensorResult<_>>()?
            };

        Ok(Self::from_parts(index, labels_or_default(labels), blocks))
    }
}
