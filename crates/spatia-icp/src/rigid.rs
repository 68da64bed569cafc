//! Rigid alignment of matched point pairs (Kabsch / Umeyama without scale).

use std::sync::{Mutex, PoisonError};

use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};
use spatia_3d::PositionView;
use spatia_linalg::svd3;
use thiserror::Error;

use crate::correspondence::{AggregateError, Correspondence};
use crate::parallel::WorkerPool;

/// Error type for rigid alignment.
#[derive(Debug, Error, PartialEq)]
pub enum AlignmentError {
    /// Centroids are undefined without accepted correspondences.
    #[error("rigid alignment needs at least one accepted correspondence")]
    NoCorrespondences,

    /// The correspondence buffer must hold one match per source point.
    #[error("expected {expected} correspondences, one per source point, got {actual}")]
    LengthMismatch {
        /// Number of source points.
        expected: usize,
        /// Number of correspondences given.
        actual: usize,
    },
}

/// How a reflection in the SVD solution is turned into a proper rotation.
///
/// When `det(U) * det(V) < 0` the unconstrained least-squares solution is a
/// reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionCorrection {
    /// Flip the axis of the smallest singular value: `R = U diag(1, 1, -1) Vᵀ`.
    ///
    /// This is the least-squares optimal proper rotation.
    #[default]
    Kabsch,
    /// Negate the whole matrix: `R = -U Vᵀ`.
    ///
    /// Always a proper rotation but not the optimal one. Only use it to
    /// reproduce poses computed by tools that correct reflections this way.
    FlipRotation,
}

/// Accepted pairs of (transformed source point, reference point).
fn accepted_pairs<'a>(
    reference: &'a PositionView<'a>,
    transform: &'a DMat4,
    source: &'a PositionView<'a>,
    correspondences: &'a [Correspondence],
    radius_squared: f64,
) -> impl Iterator<Item = (DVec3, DVec3)> + 'a {
    correspondences
        .iter()
        .enumerate()
        .filter(move |(_, c)| c.is_accepted(radius_squared))
        .map(move |(i, c)| {
            (
                transform.transform_point3(source.get_f64(i)),
                reference.get_f64(c.reference_index),
            )
        })
}

/// Estimate the rigid motion that best maps the accepted correspondences onto
/// the reference, and compose it with the current pose.
///
/// The algorithm:
/// 1. Compute the centroids of the accepted transformed source points and of
///    their matches, dividing by `accepted_count`
/// 2. Compute the cross-covariance matrix H = Σ[(r - r_mean) * (s - s_mean)^T]
/// 3. Compute the SVD of H = U * S * V^T
/// 4. Calculate rotation matrix R = U * V^T, corrected per `reflection`
/// 5. Calculate translation vector t = r_mean - R * s_mean
/// 6. Return [R | t] * current_transform
///
/// For more details, see: Arun, K., Huang, T. S., and Blostein, S. D.
/// "Least-squares fitting of two 3-D point sets." IEEE PAMI, 1987.
///
/// # Arguments
///
/// * `reference` - Reference point positions.
/// * `current_transform` - Current pose of the source cloud.
/// * `source` - Source point positions, before `current_transform`.
/// * `correspondences` - One match per source point.
/// * `radius_squared` - Acceptance radius used to filter the matches.
/// * `accepted_count` - Number of matches within `radius_squared`.
/// * `reflection` - Reflection handling.
///
/// # Returns
///
/// The new pose, already including `current_transform`.
pub fn align(
    reference: &PositionView<'_>,
    current_transform: &DMat4,
    source: &PositionView<'_>,
    correspondences: &[Correspondence],
    radius_squared: f64,
    accepted_count: usize,
    reflection: ReflectionCorrection,
) -> Result<DMat4, AlignmentError> {
    if accepted_count == 0 {
        return Err(AlignmentError::NoCorrespondences);
    }
    if correspondences.len() != source.len() {
        return Err(AlignmentError::LengthMismatch {
            expected: source.len(),
            actual: correspondences.len(),
        });
    }

    let pairs = move || {
        accepted_pairs(
            reference,
            current_transform,
            source,
            correspondences,
            radius_squared,
        )
    };

    // 1. centroids
    let n = accepted_count as f64;
    let (src_sum, ref_sum) = pairs().fold((DVec3::ZERO, DVec3::ZERO), |(s, r), (ps, pr)| {
        (s + ps, r + pr)
    });
    let src_centroid = src_sum / n;
    let ref_centroid = ref_sum / n;

    // 2. cross-covariance, column j is (r - r_mean) * (s - s_mean)_j
    let h = pairs().fold(DMat3::ZERO, |h, (ps, pr)| {
        let sc = ps - src_centroid;
        let rc = pr - ref_centroid;
        h + DMat3::from_cols(rc * sc.x, rc * sc.y, rc * sc.z)
    });

    // 3. decomposition
    let svd = svd3(&h);
    let (u, v) = (*svd.u(), *svd.v());

    // 4. rotation
    let rotation = if u.determinant() * v.determinant() >= 0.0 {
        u * v.transpose()
    } else {
        match reflection {
            ReflectionCorrection::Kabsch => {
                u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, -1.0)) * v.transpose()
            }
            ReflectionCorrection::FlipRotation => u * v.transpose() * -1.0,
        }
    };

    // 5. translation
    let translation = ref_centroid - rotation * src_centroid;

    // 6. correction in reference space, then the prior pose
    let correction = DMat4::from_cols(
        rotation.x_axis.extend(0.0),
        rotation.y_axis.extend(0.0),
        rotation.z_axis.extend(0.0),
        translation.extend(1.0),
    );

    Ok(correction * *current_transform)
}

/// Squared residuals of the accepted correspondences under `transform`.
///
/// The matches are not recomputed; this measures how well a pose explains the
/// pairs found by a previous search. Partial sums are merged in worker order,
/// so the result is not bit-reproducible across runs.
pub fn alignment_error(
    reference: &PositionView<'_>,
    transform: &DMat4,
    source: &PositionView<'_>,
    correspondences: &[Correspondence],
    radius_squared: f64,
    pool: &WorkerPool,
) -> AggregateError {
    let total = Mutex::new(AggregateError::default());

    pool.parallelize_loop(0, correspondences.len(), |begin, end| {
        let mut partial = AggregateError::default();
        for (i, c) in correspondences[begin..end].iter().enumerate() {
            if !c.is_accepted(radius_squared) {
                continue;
            }
            let point = transform.transform_point3(source.get_f64(begin + i));
            partial.accumulate(point.distance_squared(reference.get_f64(c.reference_index)));
        }

        total
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(&partial);
    });

    total.into_inner().unwrap_or_else(PoisonError::into_inner)
}
