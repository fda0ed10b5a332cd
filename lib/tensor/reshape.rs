use ndarray::{ self as nd, Axis, Slice };
use log::debug;
use rustc_hash::FxHashSet;
use crate::{
    block_index::{ BlockIndex, BlockIndexError },
    leg::{ Leg, LegError },
};
use super::{
    Scalar,
    TensorError,
    TensorResult,
    composite::{ ArcArrayD, CompositeTensor, labels_or_default },
};

use TensorError::*;

impl<A> CompositeTensor<A>
where A: Scalar
{
    // merge legs `p` and `p + 1` into a single leg at `p`
    fn fuse_adjacent(&self, p: usize) -> TensorResult<Self> {
        let old_legs = self.legs();
        let (fused, map) = old_legs[p].fusion_plan(&old_legs[p + 1])?;
        let legs: Vec<Leg> =
            old_legs[..p].iter().cloned()
            .chain(std::iter::once(fused))
            .chain(old_legs[p + 2..].iter().cloned())
            .collect();
        let index =
            BlockIndex::with_symmetry(
                self.symmetry().clone(), legs, self.target().clone())?;
        let mut blocks: Vec<nd::ArrayD<A>> =
            index.iter()
            .map(|(id, _)| nd::ArrayD::zeros(index.shape(id)))
            .collect();
        let mut tup: Vec<usize> = Vec::with_capacity(index.rank());
        for (old_id, old_tup) in self.index.iter() {
            let (fs, off) = map.get(old_tup[p], old_tup[p + 1]);
            tup.clear();
            tup.extend_from_slice(&old_tup[..p]);
            tup.push(fs);
            tup.extend_from_slice(&old_tup[p + 2..]);
            let id = index.find_sectors(&tup).ok_or(BlockIndexError::BlockNotFound)?;

            let old_shape = self.index.shape(old_id);
            let width = old_shape[p] * old_shape[p + 1];
            let shape: Vec<usize> =
                old_shape[..p].iter().copied()
                .chain(std::iter::once(width))
                .chain(old_shape[p + 2..].iter().copied())
                .collect();
            let data =
                self.blocks[old_id.index()]
                .as_standard_layout()
                .into_shape(shape)?;
            blocks[id.index()]
                .slice_axis_mut(Axis(p), Slice::from(off..off + width))
                .assign(&data);
        }
        let mut labels = self.labels.clone();
        labels.remove(p + 1);
        let blocks: Vec<ArcArrayD<A>> =
            blocks.into_iter().map(|blk| blk.into_shared()).collect();
        Ok(Self::from_parts(index, labels, blocks))
    }

    /// Fuse several legs into one.
    ///
    /// The fused leg is built by folding [`Leg::fuse_with`] over the legs at
    /// `axes`, in the order given, and placed where the first listed axis sits
    /// among the legs that remain; it keeps that axis's label and direction.
    /// Within the fused leg, data follows the layout described by
    /// [`Leg::fusion_plan`], which [`split_leg`][Self::split_leg] inverts.
    pub fn combine_legs(&self, axes: &[usize]) -> TensorResult<Self> {
        let rank = self.rank();
        let Some(&head) = axes.first() else { return Err(LegError::NoLegs.into()); };
        let mut seen: FxHashSet<usize> = FxHashSet::default();
        for &axis in axes.iter() {
            if axis >= rank { return Err(AxisOutOfRange { axis, rank }); }
            if !seen.insert(axis) { return Err(DuplicateAxis(axis)); }
        }

        let p = (0..head).filter(|k| !axes.contains(k)).count();
        let order: Vec<usize> =
            (0..head).filter(|k| !axes.contains(k))
            .chain(axes.iter().copied())
            .chain((head + 1..rank).filter(|k| !axes.contains(k)))
            .collect();
        debug!("combining legs {:?} into position {}", axes, p);
        let mut res = self.permute(&order)?;
        for _ in 1..axes.len() {
            res = res.fuse_adjacent(p)?;
        }
        Ok(res)
    }

    // undo `fuse_adjacent(axis)` given the two legs that were fused
    fn split_adjacent(&self, axis: usize, left: &Leg, right: &Leg)
        -> TensorResult<Self>
    {
        let (_, map) = left.fusion_plan(right)?;
        let old_legs = self.legs();
        let legs: Vec<Leg> =
            old_legs[..axis].iter().cloned()
            .chain([left.clone(), right.clone()])
            .chain(old_legs[axis + 1..].iter().cloned())
            .collect();
        let index =
            BlockIndex::with_symmetry(
                self.symmetry().clone(), legs, self.target().clone())?;
        let mut old_tup: Vec<usize> = Vec::with_capacity(self.rank());
        let blocks: Vec<ArcArrayD<A>> =
            index.iter()
            .map(|(id, tup)| -> TensorResult<ArcArrayD<A>> {
                let (fs, off) = map.get(tup[axis], tup[axis + 1]);
                old_tup.clear();
                old_tup.extend_from_slice(&tup[..axis]);
                old_tup.push(fs);
                old_tup.extend_from_slice(&tup[axis + 2..]);
                let old_id =
                    self.index.find_sectors(&old_tup)
                    .ok_or(BlockIndexError::BlockNotFound)?;
                let shape = index.shape(id);
                let width = shape[axis] * shape[axis + 1];
                let view =
                    self.blocks[old_id.index()]
                    .slice_axis(Axis(axis), Slice::from(off..off + width));
                let data: nd::ArrayD<A> =
                    view.as_standard_layout()
                    .into_owned()
                    .into_shape(shape)?;
                Ok(data.into_shared())
            })
            .collect::<TensorResult<_>>()?;
        Ok(Self::from_parts(index, self.labels.clone(), blocks))
    }

    /// Split one leg into several.
    ///
    /// `parts` must fuse (by [`Leg::fuse_all`]) to exactly the leg at `axis`,
    /// or this fails with `LegMismatch`. The new legs take the place of the old
    /// one, in order, labeled `"{label}_0"`, `"{label}_1"`, ... after the old
    /// leg's label, unless this would duplicate a label, in which case all legs
    /// get positional labels.
    pub fn split_leg(&self, axis: usize, parts: &[Leg]) -> TensorResult<Self> {
        let rank = self.rank();
        if axis >= rank { return Err(AxisOutOfRange { axis, rank }); }
        let fused = Leg::fuse_all(parts)?;
        if fused != self.legs()[axis] { return Err(LegMismatch(axis, axis)); }
        debug!("splitting leg {} into {} legs", axis, parts.len());

        // fuse_all is a left fold, so peel legs off the right end
        let mut res = self.clone();
        for n in (2..=parts.len()).rev() {
            let left = Leg::fuse_all(&parts[..n - 1])?;
            res = res.split_adjacent(axis, &left, &parts[n - 1])?;
        }

        let base = &self.labels[axis];
        let labels: Vec<String> =
            self.labels[..axis].iter().cloned()
            .chain((0..parts.len()).map(|k| format!("{base}_{k}")))
            .chain(self.labels[axis + 1..].iter().cloned())
            .collect();
        res.labels = labels_or_default(labels);
        Ok(res)
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use rand::Rng;
    use crate::{ charge::Charge, leg::Direction::*, symmetry::{ Group, Symmetry } };
    use super::*;

    fn q(a: i64) -> Charge { Charge::from(a) }

    fn random_tensor(legs: Vec<Leg>, target: Charge) -> CompositeTensor<f64> {
        let mut rng = rand::thread_rng();
        CompositeTensor::from_fn(legs, target, |_| rng.gen::<f64>() - 0.5)
            .unwrap()
    }

    fn all_indices(shape: &[usize]) -> Vec<Vec<usize>> {
        shape.iter()
            .map(|d| 0..*d)
            .multi_cartesian_product()
            .collect()
    }

    fn legs_abc() -> (Leg, Leg, Leg) {
        (
            Leg::u1(In, [(0, 2), (1, 3)]).unwrap(),
            Leg::u1(In, [(-1, 1), (0, 2), (1, 1)]).unwrap(),
            Leg::u1(Out, [(0, 1), (1, 2), (2, 1)]).unwrap(),
        )
    }

    // global index on `left.fuse_with(right)` of the pair (i, j)
    fn fused_index(left: &Leg, right: &Leg, i: usize, j: usize) -> usize {
        let (fused, map) = left.fusion_plan(right).unwrap();
        let (si, oi) = left.locate(i).unwrap();
        let (sj, oj) = right.locate(j).unwrap();
        let (fs, off) = map.get(si, sj);
        let dj = right.sectors()[sj].degeneracy();
        fused.sector_offset(fs) + off + oi * dj + oj
    }

    #[test]
    fn combine_moves_elements() {
        let (la, lb, lc) = legs_abc();
        let t = random_tensor(vec![la.clone(), lb.clone(), lc.clone()], q(0));
        let c = t.combine_legs(&[1, 2]).unwrap();
        assert_eq!(c.rank(), 2);
        assert_eq!(c.legs()[1], lb.fuse_with(&lc).unwrap());
        for idx in all_indices(&t.shape()) {
            let f = fused_index(&lb, &lc, idx[1], idx[2]);
            assert_eq!(c.at(&[idx[0], f]).unwrap(), t.at(&idx).unwrap());
        }
        assert!((c.norm() - t.norm()).abs() < 1e-12);
    }

    #[test]
    fn combine_places_first_axis() {
        let (la, lb, lc) = legs_abc();
        let t =
            random_tensor(vec![la.clone(), lb.clone(), lc.clone()], q(1))
            .with_labels(["a", "b", "c"]).unwrap();
        let c = t.combine_legs(&[2, 0]).unwrap();
        assert_eq!(c.labels(), &["b".to_string(), "c".into()]);
        assert_eq!(c.legs()[0], lb);
        assert_eq!(c.legs()[1], lc.fuse_with(&la).unwrap());
        for idx in all_indices(&t.shape()) {
            let f = fused_index(&lc, &la, idx[2], idx[0]);
            assert_eq!(c.at(&[idx[1], f]).unwrap(), t.at(&idx).unwrap());
        }
    }

    #[test]
    fn split_inverts_combine() {
        let (la, lb, lc) = legs_abc();
        let t = random_tensor(vec![la.clone(), lb.clone(), lc.clone()], q(0));
        let c = t.combine_legs(&[1, 2]).unwrap();
        let s = c.split_leg(1, &[lb.clone(), lc.clone()]).unwrap();
        assert!(s.approx_eq(&t, Some(f64::EPSILON)));
        assert_eq!(s.labels(), &["0".to_string(), "1_0".into(), "1_1".into()]);

        let c = t.combine_legs(&[0, 2]).unwrap();
        let s = c.split_leg(0, &[la.clone(), lc.clone()]).unwrap();
        assert!(s.approx_eq(&t.permute(&[0, 2, 1]).unwrap(), Some(f64::EPSILON)));
    }

    #[test]
    fn three_way() {
        let (la, lb, lc) = legs_abc();
        let ld = Leg::u1(Out, [(-1, 2), (1, 1)]).unwrap();
        let t = random_tensor(vec![la.clone(), lb.clone(), lc.clone(), ld.clone()], q(0));
        let c = t.combine_legs(&[0, 1, 2]).unwrap();
        assert_eq!(c.rank(), 2);
        assert_eq!(c.legs()[0], Leg::fuse_all(&[la.clone(), lb.clone(), lc.clone()]).unwrap());
        assert!((c.norm() - t.norm()).abs() < 1e-12);
        let s = c.split_leg(0, &[la, lb, lc]).unwrap();
        assert!(s.approx_eq(&t, Some(f64::EPSILON)));
    }

    #[test]
    fn combine_all_to_matrix() {
        let sym = Symmetry::product([Group::U1, Group::Zn(2)]).unwrap();
        let l1 = Leg::new(sym.clone(), In, [([0_i64, 0], 1), ([1, 1], 2)]).unwrap();
        let l2 = Leg::new(sym.clone(), In, [([0_i64, 1], 2), ([1, 0], 1)]).unwrap();
        let l3 = Leg::new(sym.clone(), Out, [([1_i64, 1], 1), ([0, 1], 2)]).unwrap();
        let target = Charge::from([0_i64, 0]);
        let t = random_tensor(vec![l1.clone(), l2.clone(), l3.clone()], target);
        let c = t.combine_legs(&[0, 1]).unwrap();
        let s = c.split_leg(0, &[l1, l2]).unwrap();
        assert!(s.approx_eq(&t, Some(f64::EPSILON)));
    }

    #[test]
    fn errors() {
        let (la, lb, lc) = legs_abc();
        let t = random_tensor(vec![la.clone(), lb.clone(), lc.clone()], q(0));
        assert!(matches!(t.combine_legs(&[]), Err(TensorError::Leg(LegError::NoLegs))));
        assert!(matches!(t.combine_legs(&[0, 3]), Err(AxisOutOfRange { axis: 3, rank: 3 })));
        assert!(matches!(t.combine_legs(&[1, 1]), Err(DuplicateAxis(1))));
        let c = t.combine_legs(&[1, 2]).unwrap();
        assert!(matches!(c.split_leg(1, &[lc.clone(), lb.clone()]), Err(LegMismatch(1, 1))));
        assert!(matches!(c.split_leg(1, &[lb, lc.reverse_direction()]), Err(LegMismatch(1, 1))));
        assert!(matches!(c.split_leg(2, &[la]), Err(AxisOutOfRange { axis: 2, rank: 2 })));
        assert!(matches!(c.split_leg(0, &[]), Err(TensorError::Leg(LegError::NoLegs))));
    }
}
