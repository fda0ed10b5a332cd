#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! This package provides block-sparse tensors whose legs carry conserved
//! quantum numbers, as used in symmetric tensor-network algorithms.
//!
//! - [`symmetry`] defines the abelian fusion rules (`U(1)`, `Z(n)`, and
//! products thereof) that labels combine under.
//! - [`leg`] describes a single tensor index as an ordered list of labeled,
//! degenerate sectors, and implements leg fusion.
//! - [`block_index`] enumerates the sector tuples of a list of legs that
//! conserve a target label, and looks blocks up by label.
//! - [`tensor`] holds the [`CompositeTensor`] itself: element and block access,
//! permutation, contraction, traces, truncation, and leg combination and
//! splitting, with one dense [`ndarray`] buffer per allowed block.
//!
//! ```
//! use symblock::{ Charge, CompositeTensor, Direction, Leg };
//!
//! let leg = Leg::u1(Direction::In, [(0, 2), (1, 3)]).unwrap();
//! let mut t: CompositeTensor<f64> =
//!     CompositeTensor::zeros(vec![leg.clone(), leg.reverse_direction()], Charge::from(0))
//!     .unwrap();
//! assert_eq!(t.num_blocks(), 2);
//! t.set(&[3, 4], 1.0).unwrap();
//! assert!(t.set(&[0, 4], 1.0).is_err());
//! assert_eq!(t.at(&[0, 4]).unwrap(), 0.0);
//! ```
//!
//! # Further reading
//! - S. Singh, R. N. C. Pfeifer, G. Vidal, "Tensor network decompositions in
//! the presence of a global symmetry."
//! [arXiv:0907.2994](https://arxiv.org/abs/0907.2994)
//!

pub mod charge;
pub mod symmetry;
pub mod leg;
pub mod block_index;
pub mod tensor;

pub use charge::Charge;
pub use symmetry::{ Group, SymError, SymResult, Symmetry };
pub use leg::{ Direction, FusionMap, Leg, LegError, LegResult, Sector };
pub use block_index::{
    BlockId,
    BlockIndex,
    BlockIndexError,
    BlockIndexResult,
    Lookup,
};
pub use tensor::{
    ArcArrayD,
    CompositeTensor,
    ContractOptions,
    Scalar,
    TensorError,
    TensorResult,
};

pub extern crate ndarray;
pub extern crate num_complex;
