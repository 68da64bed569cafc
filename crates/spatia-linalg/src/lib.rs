#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Module to calculate SVD of a 3x3 matrix
pub mod svd;

pub use svd::{svd3, Svd3};
