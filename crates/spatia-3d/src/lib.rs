#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Axis-aligned bounding boxes.
pub mod aabb;

/// Rays with precomputed reciprocal direction.
pub mod ray;

/// Nearest neighbour index over a point cloud.
pub mod spatial_index;

/// Point attribute buffer contract.
pub mod vertex_buffer;

pub use aabb::Aabb;
pub use ray::Ray;
pub use spatial_index::{SpatialIndex3D, SpatialIndexError};
pub use vertex_buffer::{
    CpuVertexBuffer, PositionView, VertexAttribute, VertexBuffer, VertexBufferError,
};
