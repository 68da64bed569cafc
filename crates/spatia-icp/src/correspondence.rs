use std::sync::{Mutex, PoisonError};

use glam::DMat4;
use spatia_3d::{PositionView, SpatialIndex3D};

use crate::parallel::WorkerPool;

/// The nearest reference point of one source point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Correspondence {
    /// Index of the matched point in the reference cloud.
    pub reference_index: usize,
    /// Squared distance between the transformed source point and its match.
    pub squared_distance: f64,
}

impl Correspondence {
    /// Check if the match lies within the acceptance radius.
    #[inline]
    pub fn is_accepted(&self, radius_squared: f64) -> bool {
        self.squared_distance <= radius_squared
    }
}

/// Sum of squared distances over the accepted correspondences.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregateError {
    /// Sum of the accepted squared distances.
    pub sum_squared_error: f64,
    /// Number of accepted correspondences.
    pub accepted_count: usize,
}

impl AggregateError {
    /// Root mean squared error, `NaN` when nothing was accepted.
    pub fn rmse(&self) -> f64 {
        if self.accepted_count == 0 {
            return f64::NAN;
        }
        (self.sum_squared_error / self.accepted_count as f64).sqrt()
    }

    /// Add one accepted squared distance.
    #[inline]
    pub fn accumulate(&mut self, squared_distance: f64) {
        self.sum_squared_error += squared_distance;
        self.accepted_count += 1;
    }

    /// Combine a partial aggregate into this one.
    pub fn merge(&mut self, other: &AggregateError) {
        self.sum_squared_error += other.sum_squared_error;
        self.accepted_count += other.accepted_count;
    }
}

/// Match every source point, moved by `transform`, to its nearest reference point.
///
/// `correspondences` is resized to the number of source points and every slot
/// is written, including the matches farther than `radius_squared`. Those are
/// kept in the buffer but left out of the returned aggregate.
///
/// Each worker accumulates a partial aggregate over its own chunk and merges it
/// into the total under a single lock. The merge order follows the scheduling
/// of the workers, so the aggregate is not bit-reproducible across runs; the
/// correspondences themselves are deterministic.
///
/// # Arguments
///
/// * `index` - Nearest neighbour index over the reference cloud.
/// * `transform` - Pose applied to the source points before the queries.
/// * `source` - Source point positions.
/// * `radius_squared` - Acceptance radius, squared.
/// * `pool` - Worker pool running the queries.
/// * `correspondences` - Output buffer, reused across calls.
pub fn find_correspondences(
    index: &SpatialIndex3D,
    transform: &DMat4,
    source: &PositionView<'_>,
    radius_squared: f64,
    pool: &WorkerPool,
    correspondences: &mut Vec<Correspondence>,
) -> AggregateError {
    correspondences.resize(source.len(), Correspondence::default());

    let total = Mutex::new(AggregateError::default());

    pool.parallelize_chunks_mut(correspondences, |offset, chunk| {
        let mut partial = AggregateError::default();
        for (i, slot) in chunk.iter_mut().enumerate() {
            let point = transform.transform_point3(source.get_f64(offset + i));
            let (reference_index, squared_distance) = index.nearest(&point);
            *slot = Correspondence {
                reference_index,
                squared_distance,
            };
            if slot.is_accepted(radius_squared) {
                partial.accumulate(squared_distance);
            }
        }

        total
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&partial);
    });

    total.into_inner().unwrap_or_else(PoisonError::into_inner)
}
