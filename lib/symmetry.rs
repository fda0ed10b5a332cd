//! Abelian symmetry rules used to combine [`Charge`]s.
//!
//! A [`Symmetry`] is a product of zero or more factor [`Group`]s, each acting
//! on one component of a charge. Only the closed set of groups below is
//! supported, and all of them are abelian, so fusion is associative and
//! commutative; [`Symmetry::fuse_all`] nevertheless always folds left to right
//! from the identity.

use std::fmt;
use thiserror::Error;
use crate::{ charge::Charge, leg::Direction };

#[derive(Debug, Error)]
pub enum SymError {
    #[error("incompatible symmetries {0} and {1}")]
    IncompatibleSymmetry(Symmetry, Symmetry),

    #[error("charge {found} has {} components, but the symmetry {sym} has {}", .found.arity(), .sym.num_factors())]
    ChargeArity { found: Charge, sym: Symmetry },

    #[error("charge {0} is not valid under {1}")]
    InvalidCharge(Charge, Symmetry),

    #[error("cyclic group modulus must be non-zero")]
    ZeroModulus,

    #[error("label arithmetic overflowed under {0}")]
    LabelOverflow(Group),
}
pub type SymResult<T> = Result<T, SymError>;

use SymError::*;

/// A single abelian factor group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Group {
    /// Integer addition, e.g. particle number or total spin-*z*.
    U1,

    /// Addition modulo `n`, e.g. parity for `n = 2`.
    Zn(u32),
}

impl Group {
    /// Combine two components.
    ///
    /// Fails with `LabelOverflow` if a `U(1)` sum leaves the range of `i64`.
    /// Cyclic components are reduced before adding and never overflow.
    pub fn combine(&self, a: i64, b: i64) -> SymResult<i64> {
        match self {
            Self::U1 => a.checked_add(b).ok_or(LabelOverflow(*self)),
            Self::Zn(n) => {
                let n = *n as i64;
                Ok((a.rem_euclid(n) + b.rem_euclid(n)).rem_euclid(n))
            },
        }
    }

    /// Return the inverse of a component.
    ///
    /// Fails with `LabelOverflow` for the `U(1)` component `i64::MIN`, which
    /// has no representable inverse.
    pub fn reverse(&self, a: i64) -> SymResult<i64> {
        match self {
            Self::U1 => a.checked_neg().ok_or(LabelOverflow(*self)),
            Self::Zn(n) => {
                let n = *n as i64;
                Ok((n - a.rem_euclid(n)).rem_euclid(n))
            },
        }
    }

    /// Return `true` if `a` is a valid (normalized) component for this group.
    pub fn is_valid(&self, a: i64) -> bool {
        match self {
            Self::U1 => true,
            Self::Zn(n) => (0..*n as i64).contains(&a),
        }
    }

    fn normalize(&self, a: i64) -> i64 {
        match self {
            Self::U1 => a,
            Self::Zn(n) => a.rem_euclid(*n as i64),
        }
    }

    fn signed(&self, a: i64, dir: Direction) -> SymResult<i64> {
        match dir {
            Direction::In => Ok(a),
            Direction::Out => self.reverse(a),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U1 => write!(f, "U1"),
            Self::Zn(n) => write!(f, "Z{n}"),
        }
    }
}

/// A product of abelian [`Group`]s.
///
/// Two legs can only be combined if their symmetries are equal, i.e. they
/// consist of the same groups in the same order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Symmetry(Vec<Group>);

impl Symmetry {
    /// The symmetry with no factors. Every leg under it has at most one sector,
    /// labeled by the empty charge.
    pub fn trivial() -> Self { Self(Vec::new()) }

    /// A single `U(1)` factor.
    pub fn u1() -> Self { Self(vec![Group::U1]) }

    /// A single `Z(n)` factor.
    ///
    /// Fails if `n == 0`.
    pub fn zn(n: u32) -> SymResult<Self> { Self::product([Group::Zn(n)]) }

    /// A product of factor groups, in the given order.
    ///
    /// Fails if any cyclic factor has modulus 0.
    pub fn product<I>(groups: I) -> SymResult<Self>
    where I: IntoIterator<Item = Group>
    {
        let groups: Vec<Group> = groups.into_iter().collect();
        if groups.iter().any(|g| matches!(g, Group::Zn(0))) {
            return Err(ZeroModulus);
        }
        Ok(Self(groups))
    }

    /// Return the factor groups.
    pub fn groups(&self) -> &[Group] { &self.0 }

    /// Return the number of factor groups, which is also the arity of every
    /// valid charge.
    pub fn num_factors(&self) -> usize { self.0.len() }

    /// Return the identity ("no charge") label.
    pub fn identity(&self) -> Charge { Charge::from_vec(vec![0; self.0.len()]) }

    /// Return `Ok` if `self` and `other` are the same symmetry.
    pub fn ensure_same(&self, other: &Self) -> SymResult<()> {
        if self == other {
            Ok(())
        } else {
            Err(IncompatibleSymmetry(self.clone(), other.clone()))
        }
    }

    fn check_arity(&self, q: &Charge) -> SymResult<()> {
        if q.arity() == self.0.len() {
            Ok(())
        } else {
            Err(ChargeArity { found: q.clone(), sym: self.clone() })
        }
    }

    /// Return `Ok` if `q` has the right arity and all of its components are
    /// normalized for their groups.
    pub fn check_charge(&self, q: &Charge) -> SymResult<()> {
        self.check_arity(q)?;
        let valid =
            self.0.iter().zip(q.components())
            .all(|(g, a)| g.is_valid(*a));
        if valid { Ok(()) } else { Err(InvalidCharge(q.clone(), self.clone())) }
    }

    /// Map every component of `q` into its group's canonical range, e.g. `-1`
    /// to `2` under `Z3`.
    ///
    /// Fails if `q` has the wrong arity.
    pub fn normalize(&self, q: Charge) -> SymResult<Charge> {
        self.check_arity(&q)?;
        let comps: Vec<i64> =
            self.0.iter().zip(q.components())
            .map(|(g, a)| g.normalize(*a))
            .collect();
        Ok(Charge::from_vec(comps))
    }

    /// Return the inverse of `q`.
    ///
    /// Fails if `q` has the wrong arity.
    pub fn reverse(&self, q: &Charge) -> SymResult<Charge> {
        self.check_arity(q)?;
        let comps: Vec<i64> =
            self.0.iter().zip(q.components())
            .map(|(g, a)| g.reverse(*a))
            .collect::<SymResult<_>>()?;
        Ok(Charge::from_vec(comps))
    }

    /// Fuse two charges, each weighted by the sign of a direction (`In` is
    /// `+1`, `Out` is `-1`).
    pub fn fuse(&self, a: &Charge, dir_a: Direction, b: &Charge, dir_b: Direction)
        -> SymResult<Charge>
    {
        self.check_arity(a)?;
        self.check_arity(b)?;
        let comps: Vec<i64> =
            self.0.iter()
            .zip(a.components().iter().zip(b.components()))
            .map(|(g, (qa, qb))| {
                g.combine(g.signed(*qa, dir_a)?, g.signed(*qb, dir_b)?)
            })
            .collect::<SymResult<_>>()?;
        Ok(Charge::from_vec(comps))
    }

    /// Fold a sequence of signed charges left to right, starting from the
    /// identity.
    pub fn fuse_all<'a, I>(&self, charges: I) -> SymResult<Charge>
    where I: IntoIterator<Item = (&'a Charge, Direction)>
    {
        let mut acc: Vec<i64> = vec![0; self.0.len()];
        for (q, dir) in charges.into_iter() {
            self.check_arity(q)?;
            self.accumulate(&mut acc, q, dir)?;
        }
        Ok(Charge::from_vec(acc))
    }

    /// Fuse `q` with sign `dir` into `acc` in place, without arity checks.
    pub(crate) fn accumulate(&self, acc: &mut [i64], q: &Charge, dir: Direction)
        -> SymResult<()>
    {
        for (g, (a, qk)) in self.0.iter().zip(acc.iter_mut().zip(q.components())) {
            *a = g.combine(*a, g.signed(*qk, dir)?)?;
        }
        Ok(())
    }

    /// Return the charge `x` such that fusing `acc` with `x` gives `target`,
    /// without arity checks.
    pub(crate) fn remainder(&self, target: &Charge, acc: &[i64])
        -> SymResult<Charge>
    {
        let comps: Vec<i64> =
            self.0.iter()
            .zip(target.components().iter().zip(acc))
            .map(|(g, (t, a))| g.combine(*t, g.reverse(*a)?))
            .collect::<SymResult<_>>()?;
        Ok(Charge::from_vec(comps))
    }
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() { return write!(f, "trivial"); }
        let n = self.0.len();
        for (k, g) in self.0.iter().enumerate() {
            g.fmt(f)?;
            if k < n - 1 { write!(f, " x ")?; }
        }
        Ok(())
    }
}
