//! Element types usable in a [`CompositeTensor`][super::CompositeTensor].

use std::fmt::Debug;
use ndarray::LinalgScalar;
use num_complex::{ Complex32 as C32, Complex64 as C64 };

/// Numeric element type of a tensor's blocks.
///
/// Anything `ndarray` can multiply-accumulate with `general_mat_mul`, plus
/// complex conjugation and a squared modulus for norms.
pub trait Scalar: LinalgScalar + PartialEq + Debug + Send + Sync {
    /// Return the complex conjugate (the identity for real types).
    fn conj(self) -> Self;

    /// Return the squared modulus.
    fn norm_sqr(self) -> f64;
}

impl Scalar for f32 {
    fn conj(self) -> Self { self }

    fn norm_sqr(self) -> f64 { (self as f64) * (self as f64) }
}

impl Scalar for f64 {
    fn conj(self) -> Self { self }

    fn norm_sqr(self) -> f64 { self * self }
}

impl Scalar for C32 {
    fn conj(self) -> Self { C32::conj(&self) }

    fn norm_sqr(self) -> f64 { C32::norm_sqr(&self) as f64 }
}

impl Scalar for C64 {
    fn conj(self) -> Self { C64::conj(&self) }

    fn norm_sqr(self) -> f64 { C64::norm_sqr(&self) }
}
