use glam::DVec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::vertex_buffer::{PositionView, VertexBuffer, VertexBufferError};

/// Errors raised when building a [`SpatialIndex3D`].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SpatialIndexError {
    /// Nearest neighbour queries need at least one indexed point.
    #[error("cannot index an empty point cloud")]
    EmptyCloud,

    /// Point identifiers are stored as `u32`.
    #[error("point cloud has {0} points, more than an index can address")]
    TooManyPoints(usize),

    /// The positions could not be read.
    #[error(transparent)]
    VertexBuffer(#[from] VertexBufferError),
}

/// Single nearest neighbour index over the positions of a point cloud.
///
/// The index copies the positions into a K-D tree at construction and never
/// looks at the source buffer again.
pub struct SpatialIndex3D {
    kdtree: ImmutableKdTree<f64, u32, 3, 32>,
    len: usize,
}

impl SpatialIndex3D {
    /// Build the index over the positions of `cloud`.
    ///
    /// Empty clouds are rejected so that [`SpatialIndex3D::nearest`] always
    /// has an answer.
    pub fn new<B: VertexBuffer + ?Sized>(cloud: &B) -> Result<Self, SpatialIndexError> {
        let view = PositionView::new(cloud)?;
        Self::from_view(&view)
    }

    /// Build the index from an already validated position view.
    pub fn from_view(view: &PositionView<'_>) -> Result<Self, SpatialIndexError> {
        if view.is_empty() {
            return Err(SpatialIndexError::EmptyCloud);
        }
        if view.len() > u32::MAX as usize {
            return Err(SpatialIndexError::TooManyPoints(view.len()));
        }

        let points = view
            .iter()
            .map(|p| p.as_dvec3().to_array())
            .collect::<Vec<_>>();

        let now = std::time::Instant::now();
        let kdtree = ImmutableKdTree::new_from_slice(&points);
        log::debug!(
            "indexed {} points in {:?}",
            points.len(),
            now.elapsed()
        );

        Ok(Self {
            kdtree,
            len: points.len(),
        })
    }

    /// Get the number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false, empty clouds are rejected at construction.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the indexed point closest to `point`.
    ///
    /// Returns the index of that point in the source cloud and its squared
    /// Euclidean distance to `point`.
    #[inline]
    pub fn nearest(&self, point: &DVec3) -> (usize, f64) {
        let nn = self
            .kdtree
            .nearest_one::<kiddo::SquaredEuclidean>(&point.to_array());
        (nn.item as usize, nn.distance)
    }
}

impl std::fmt::Debug for SpatialIndex3D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex3D")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
