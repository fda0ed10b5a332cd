//! Block-sparse tensors over symmetry-constrained legs.
//!
//! A [`CompositeTensor`] stores one dense `ndarray` buffer per block of its
//! [`BlockIndex`][crate::BlockIndex]; every element outside those blocks is
//! forbidden by the conservation rule and implicitly zero. Buffers are held
//! behind atomic reference counters, so tensors derived from one another (e.g.
//! by permutation) share storage until one of them is mutated.

use thiserror::Error;
use crate::{
    block_index::BlockIndexError,
    leg::LegError,
    symmetry::SymError,
};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("symmetry error: {0}")]
    Sym(#[from] SymError),

    #[error("leg error: {0}")]
    Leg(#[from] LegError),

    #[error("block index error: {0}")]
    Index(#[from] BlockIndexError),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("leg {0} cannot be joined with leg {1}: sectors or directions do not match")]
    LegMismatch(usize, usize),

    #[error("element {0:?} lies outside every symmetry sector")]
    ElementOutOfSymmetrySector(Box<[usize]>),

    #[error("cannot write a non-zero value to symmetry-forbidden element {0:?}")]
    ForbiddenWrite(Box<[usize]>),

    #[error("expected {expected} indices, got {found}")]
    RankMismatch { expected: usize, found: usize },

    #[error("index {index} out of bounds for axis {axis} with dimension {dim}")]
    IndexOutOfBounds { axis: usize, index: usize, dim: usize },

    #[error("invalid permutation {0:?}")]
    InvalidPermutation(Box<[usize]>),

    #[error("block shape mismatch: expected {expected:?}, got {found:?}")]
    BlockShapeMismatch { expected: Box<[usize]>, found: Box<[usize]> },

    #[error("expected {expected} blocks, got {found}")]
    BlockCount { expected: usize, found: usize },

    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },

    #[error("duplicate axis {0}")]
    DuplicateAxis(usize),

    #[error("duplicate leg label {0:?}")]
    DuplicateLabel(String),

    #[error("leg label {0:?} not found")]
    LabelNotFound(String),
}
pub type TensorResult<T> = Result<T, TensorError>;

pub mod scalar;
pub use scalar::Scalar;

pub(crate) mod composite;
pub use composite::*;

pub(crate) mod contract;
pub use contract::ContractOptions;

pub(crate) mod reshape;

pub(crate) mod ops;
