use ndarray::{ self as nd, Axis, Slice };
use log::debug;
use crate::{
    block_index::{ BlockIndex, BlockIndexError },
    leg::Leg,
};
use super::{
    Scalar,
    TensorError,
    TensorResult,
    composite::{ ArcArrayD, CompositeTensor },
};

use TensorError::*;

impl<A> CompositeTensor<A>
where A: Scalar
{
    /// Trace over a pair of legs.
    ///
    /// Legs `a` and `b` must be duals of each other (see [`Leg::is_dual_of`]).
    /// The result keeps the remaining legs in order, with their labels, and
    /// the same target: element `i` of the result is the sum over `k` of the
    /// element of `self` whose index is `i` with `k` inserted at both `a` and
    /// `b`. Only blocks sitting on the same sector of both legs contribute.
    pub fn trace(&self, a: usize, b: usize) -> TensorResult<Self> {
        let rank = self.rank();
        for axis in [a, b] {
            if axis >= rank { return Err(AxisOutOfRange { axis, rank }); }
        }
        if a == b { return Err(DuplicateAxis(a)); }
        if !self.legs()[a].is_dual_of(&self.legs()[b]) {
            return Err(LegMismatch(a, b));
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let kept: Vec<usize> = (0..rank).filter(|k| *k != a && *k != b).collect();
        let legs: Vec<Leg> = kept.iter().map(|k| self.legs()[*k].clone()).collect();
        let labels: Vec<String> = kept.iter().map(|k| self.labels[*k].clone()).collect();
        let index =
            BlockIndex::with_symmetry(
                self.symmetry().clone(), legs, self.target().clone())?;

        let mut blocks: Vec<nd::ArrayD<A>> =
            index.iter()
            .map(|(id, _)| nd::ArrayD::zeros(index.shape(id)))
            .collect();
        let mut tup: Vec<usize> = Vec::with_capacity(kept.len());
        let mut n_diag: usize = 0;
        for (old_id, old_tup) in self.index.iter() {
            if old_tup[a] != old_tup[b] { continue; }
            tup.clear();
            tup.extend(kept.iter().map(|k| old_tup[*k]));
            let id = index.find_sectors(&tup).ok_or(BlockIndexError::BlockNotFound)?;
            let blk = &self.blocks[old_id.index()];
            let acc = &mut blocks[id.index()];
            for i in 0..blk.shape()[a] {
                let diag = blk.index_axis(Axis(hi), i).index_axis_move(Axis(lo), i);
                acc.zip_mut_with(&diag, |x, y| { *x = *x + *y; });
            }
            n_diag += 1;
        }
        debug!(
            "traced legs {} and {}: {} diagonal blocks into {}",
            a, b, n_diag, index.len(),
        );
        let blocks: Vec<ArcArrayD<A>> =
            blocks.into_iter().map(|blk| blk.into_shared()).collect();
        Ok(Self::from_parts(index, labels, blocks))
    }

    /// Like [`trace`][Self::trace], naming the legs by label.
    pub fn trace_by_labels(&self, a: &str, b: &str) -> TensorResult<Self> {
        self.trace(self.label_position(a)?, self.label_position(b)?)
    }

    /// Return the Hermitian conjugate: [`conj`][Self::conj] followed by
    /// reversing the order of the legs, labels included.
    ///
    /// For a rank-2 tensor this is the matrix adjoint.
    pub fn dagger(&self) -> TensorResult<Self> {
        let order: Vec<usize> = (0..self.rank()).rev().collect();
        self.conj()?.permute(&order)
    }

    /// Keep only the first `dim` index values of the leg at `axis`.
    ///
    /// The leg is cut as by [`Leg::truncated`]. Blocks on dropped sectors are
    /// discarded, blocks on the shrunk sector are sliced, and all others are
    /// shared with `self`.
    pub fn truncate(&self, axis: usize, dim: usize) -> TensorResult<Self> {
        let rank = self.rank();
        if axis >= rank { return Err(AxisOutOfRange { axis, rank }); }
        let cut = self.legs()[axis].truncated(dim)?;
        let legs: Vec<Leg> =
            self.legs().iter().enumerate()
            .map(|(k, leg)| if k == axis { cut.clone() } else { leg.clone() })
            .collect();
        let index =
            BlockIndex::with_symmetry(
                self.symmetry().clone(), legs, self.target().clone())?;
        let blocks: Vec<ArcArrayD<A>> =
            index.iter()
            .map(|(id, tup)| -> TensorResult<ArcArrayD<A>> {
                let old_id =
                    self.index.find_sectors(tup)
                    .ok_or(BlockIndexError::BlockNotFound)?;
                let blk = &self.blocks[old_id.index()];
                let width = index.shape(id)[axis];
                if blk.shape()[axis] == width {
                    Ok(blk.clone())
                } else {
                    Ok(blk.slice_axis(Axis(axis), Slice::from(0..width))
                        .to_owned()
                        .into_shared())
                }
            })
            .collect::<TensorResult<_>>()?;
        debug!(
            "truncated axis {} to dimension {}: {} of {} blocks kept",
            axis, dim, index.len(), self.num_blocks(),
        );
        Ok(Self::from_parts(index, self.labels.clone(), blocks))
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use num_complex::Complex64 as C64;
    use rand::Rng;
    use crate::{
        charge::Charge,
        leg::{ Direction::*, LegError },
        symmetry::{ Group, Symmetry },
    };
    use super::*;

    fn q(a: i64) -> Charge { Charge::from(a) }

    fn random_tensor(legs: Vec<Leg>, target: Charge) -> CompositeTensor<f64> {
        let mut rng = rand::thread_rng();
        CompositeTensor::from_fn(legs, target, |_| rng.gen::<f64>() - 0.5)
            .unwrap()
    }

    fn all_indices(shape: &[usize]) -> Vec<Vec<usize>> {
        if shape.is_empty() { return vec![vec![]]; }
        shape.iter()
            .map(|d| 0..*d)
            .multi_cartesian_product()
            .collect()
    }

    fn dense_trace(d: &nd::ArrayD<f64>, a: usize, b: usize) -> nd::ArrayD<f64> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let mut shape = d.shape().to_vec();
        shape.remove(hi);
        shape.remove(lo);
        let mut out: nd::ArrayD<f64> = nd::ArrayD::zeros(shape);
        for k in 0..d.shape()[a] {
            out += &d.index_axis(Axis(hi), k).index_axis_move(Axis(lo), k);
        }
        out
    }

    fn assert_close(a: &nd::ArrayD<f64>, b: &nd::ArrayD<f64>) {
        assert_eq!(a.shape(), b.shape());
        a.iter().zip(b.iter())
            .for_each(|(x, y)| { assert!((x - y).abs() < 1e-10, "{x} != {y}"); });
    }

    #[test]
    fn matches_dense_trace() {
        let l = Leg::u1(In, [(0, 2), (1, 1), (-1, 2)]).unwrap();
        let p = Leg::u1(In, [(0, 1), (1, 1)]).unwrap();
        let t =
            random_tensor(
                vec![l.clone(), p.clone(), l.reverse_direction(), p.reverse_direction()],
                q(0),
            )
            .with_labels(["a", "i", "b", "j"])
            .unwrap();
        let r = t.trace(0, 2).unwrap();
        assert_eq!(r.rank(), 2);
        assert_eq!(r.legs()[0], p);
        assert_eq!(r.labels(), &["i", "j"]);
        assert_eq!(r.target(), &q(0));
        assert_close(&r.to_dense(), &dense_trace(&t.to_dense(), 0, 2));

        let s = t.trace(2, 0).unwrap();
        assert!(s.approx_eq(&r, None));
        let s = t.trace_by_labels("b", "a").unwrap();
        assert!(s.approx_eq(&r, None));
    }

    #[test]
    fn matches_dense_trace_cyclic() {
        let sym = Symmetry::product([Group::U1, Group::Zn(2)]).unwrap();
        let l = Leg::new(sym.clone(), In, [([0_i64, 1], 2), ([1, 0], 1), ([1, 1], 2)])
            .unwrap();
        let m = Leg::new(sym.clone(), Out, [([0_i64, 0], 1), ([1, 1], 2), ([2, 1], 1)])
            .unwrap();
        let t =
            random_tensor(
                vec![m.clone(), l.clone(), l.reverse_direction()],
                Charge::from([-1, 1]),
            );
        let r = t.trace(1, 2).unwrap();
        assert_eq!(r.target(), &Charge::from([-1, 1]));
        assert_close(&r.to_dense(), &dense_trace(&t.to_dense(), 1, 2));
    }

    #[test]
    fn full_trace() {
        let l = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let t = random_tensor(vec![l.clone(), l.reverse_direction()], q(0));
        let r = t.trace(0, 1).unwrap();
        assert_eq!(r.rank(), 0);
        let d = t.to_dense();
        let expected: f64 = (0..l.dim()).map(|k| d[[k, k]]).sum();
        assert!((r.at(&[]).unwrap() - expected).abs() < 1e-10);
    }

    #[test]
    fn trace_errors() {
        let l = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let p = Leg::u1(In, [(0, 2), (1, 2)]).unwrap();
        let t = random_tensor(vec![l.clone(), l.clone(), p.reverse_direction()], q(1));
        assert!(matches!(t.trace(0, 1), Err(LegMismatch(0, 1))));
        assert!(matches!(t.trace(0, 2), Err(LegMismatch(0, 2))));
        assert!(matches!(t.trace(1, 1), Err(DuplicateAxis(1))));
        assert!(matches!(t.trace(0, 3), Err(AxisOutOfRange { axis: 3, rank: 3 })));
        assert!(matches!(t.trace_by_labels("0", "x"), Err(LabelNotFound(_))));
    }

    #[test]
    fn dagger_is_adjoint() {
        let l = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let p = Leg::u1(In, [(-1, 1), (0, 2)]).unwrap();
        let mut rng = rand::thread_rng();
        let t: CompositeTensor<C64> =
            CompositeTensor::from_fn(
                vec![l.clone(), p.clone(), l.reverse_direction()],
                q(-1),
                |_| C64::new(rng.gen(), rng.gen()),
            )
            .unwrap()
            .with_labels(["a", "b", "c"])
            .unwrap();
        let d = t.dagger().unwrap();
        assert_eq!(d.labels(), &["c", "b", "a"]);
        assert_eq!(d.target(), &q(1));
        assert_eq!(d.legs()[0], l);
        assert_eq!(d.legs()[1], p.reverse_direction());
        for idx in all_indices(&t.shape()) {
            let rev: Vec<usize> = idx.iter().rev().copied().collect();
            assert_eq!(d.at(&rev).unwrap(), t.at(&idx).unwrap().conj());
        }
        assert!(d.dagger().unwrap().approx_eq(&t, None));
    }

    #[test]
    fn matches_dense_truncate() {
        let l = Leg::u1(In, [(0, 2), (1, 3), (2, 1)]).unwrap();
        let p = Leg::u1(Out, [(0, 1), (1, 2), (2, 2)]).unwrap();
        let t = random_tensor(vec![l.clone(), p.clone()], q(0));
        let d = t.to_dense();
        for dim in 1..=l.dim() {
            let r = t.truncate(0, dim).unwrap();
            assert_eq!(r.shape(), vec![dim, p.dim()]);
            assert_eq!(r.legs()[1], p);
            let expected = d.slice_axis(Axis(0), Slice::from(0..dim)).to_owned();
            assert_close(&r.to_dense(), &expected);
        }
        // cut inside the second sector: the third sector's block is dropped
        let r = t.truncate(0, 4).unwrap();
        assert_eq!(r.num_blocks(), 2);
        assert_eq!(r.block(crate::BlockId::from(1)).unwrap().shape(), &[2, 2]);
    }

    #[test]
    fn truncate_shares_untouched_blocks() {
        let l = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let t = random_tensor(vec![l.clone(), l.reverse_direction()], q(0));
        let mut r = t.truncate(1, 4).unwrap();
        assert_eq!(r.block(crate::BlockId::from(0)), t.block(crate::BlockId::from(0)));
        r.set(&[0, 0], 9.0).unwrap();
        assert!(t.at(&[0, 0]).unwrap() != 9.0);
        assert_eq!(r.at(&[0, 0]).unwrap(), 9.0);
    }

    #[test]
    fn truncate_errors() {
        let l = Leg::u1(In, [(0, 2), (1, 3)]).unwrap();
        let t = random_tensor(vec![l.clone(), l.reverse_direction()], q(0));
        assert!(matches!(t.truncate(2, 1), Err(AxisOutOfRange { axis: 2, rank: 2 })));
        assert!(matches!(
            t.truncate(0, 0),
            Err(TensorError::Leg(LegError::InvalidTruncation { dim: 0, current: 5 })),
        ));
        assert!(matches!(
            t.truncate(0, 6),
            Err(TensorError::Leg(LegError::InvalidTruncation { .. })),
        ));
    }
}
