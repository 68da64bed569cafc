#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod correspondence;
pub use correspondence::{find_correspondences, AggregateError, Correspondence};

mod icp;
pub use icp::*;

/// Fixed-size worker pool used for the data-parallel loops.
pub mod parallel;
pub use parallel::{WorkerPool, WorkerPoolError};

mod rigid;
pub use rigid::{align, alignment_error, AlignmentError, ReflectionCorrection};
