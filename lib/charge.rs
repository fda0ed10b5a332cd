//! Quantum-number labels.

use std::fmt;
use itertools::Itertools;

/// A conserved quantum number tagging one sector of a [`Leg`][crate::Leg].
///
/// A `Charge` holds one integer component per factor group of the governing
/// [`Symmetry`][crate::Symmetry]; a plain `U(1)` charge has one component, a
/// `U(1) × Z(2)` charge has two, and the charge of a trivial (symmetry-less)
/// leg has none.
///
/// [`Ord`] is lexicographic over components, which is the order used to sort
/// the sectors of fused legs.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Charge(Vec<i64>);

impl Charge {
    /// Create a new charge from its components.
    pub fn new<I>(components: I) -> Self
    where I: IntoIterator<Item = i64>
    {
        Self(components.into_iter().collect())
    }

    /// Create a charge with no components, i.e. the only charge of the trivial
    /// symmetry.
    pub fn empty() -> Self { Self(Vec::new()) }

    /// Return the number of components.
    pub fn arity(&self) -> usize { self.0.len() }

    /// Return the components as a slice.
    pub fn components(&self) -> &[i64] { &self.0 }

    pub(crate) fn from_vec(components: Vec<i64>) -> Self { Self(components) }
}

impl From<i64> for Charge {
    fn from(q: i64) -> Self { Self(vec![q]) }
}

impl<const N: usize> From<[i64; N]> for Charge {
    fn from(qs: [i64; N]) -> Self { Self(qs.to_vec()) }
}

impl From<Vec<i64>> for Charge {
    fn from(qs: Vec<i64>) -> Self { Self(qs) }
}

impl fmt::Display for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [q] => write!(f, "{q}"),
            qs => write!(f, "({})", qs.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Charge::from(-1) < Charge::from(0));
        assert!(Charge::from([0, 5]) < Charge::from([1, 0]));
        assert!(Charge::from([1, 0]) < Charge::from([1, 1]));
        assert_eq!(Charge::new([2, 3]), Charge::from([2, 3]));
    }

    #[test]
    fn display() {
        assert_eq!(Charge::from(-3).to_string(), "-3");
        assert_eq!(Charge::from([1, 0]).to_string(), "(1, 0)");
        assert_eq!(Charge::empty().to_string(), "()");
    }
}
