#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod bvh;
pub use bvh::{Bvh, BvhNode, Child, HitRecord, Intersection};

/// Error types for the bvh module.
pub mod error;
pub use error::BvhError;

mod intersector;
pub use intersector::{make_intersector, IntersectionMode, Intersector};

/// Primitive kinds a [`Bvh`] can be built over.
pub mod primitive;
pub use primitive::{Points, Primitive, Triangles};
