use std::sync::Arc;

use glam::DMat4;
use serde::{Deserialize, Serialize};
use spatia_3d::{PositionView, SpatialIndex3D, SpatialIndexError, VertexBuffer, VertexBufferError};

use crate::correspondence::{find_correspondences, AggregateError, Correspondence};
use crate::parallel::{WorkerPool, WorkerPoolError};
use crate::rigid::{align, alignment_error, AlignmentError, ReflectionCorrection};

/// Errors raised while setting up or running a registration.
#[derive(thiserror::Error, Debug)]
pub enum IcpError {
    /// The configuration is inconsistent.
    #[error("invalid ICP configuration: {0}")]
    InvalidConfig(#[from] IcpConfigError),

    /// There is nothing to register.
    #[error("source point cloud is empty")]
    EmptySource,

    /// The reference cloud could not be indexed.
    #[error(transparent)]
    SpatialIndex(#[from] SpatialIndexError),

    /// A point cloud has no usable positions.
    #[error(transparent)]
    VertexBuffer(#[from] VertexBufferError),

    /// The worker pool could not be created.
    #[error(transparent)]
    WorkerPool(#[from] WorkerPoolError),

    /// The alignment step rejected its input.
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
}

/// Inconsistent [`IcpConfig`] values.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum IcpConfigError {
    /// Radii must be finite and positive, and the floor must not exceed the start.
    #[error("radius floor {min_radius} must be positive and at most the initial radius {initial_radius}")]
    InvalidRadius {
        /// Configured initial radius.
        initial_radius: f64,
        /// Configured radius floor.
        min_radius: f64,
    },

    /// The annealing step must be finite and non-negative.
    #[error("radius step must be finite and non-negative, got {0}")]
    InvalidRadiusStep(f64),

    /// At least one correspondence is needed to align.
    #[error("minimum number of correspondences must be at least 1")]
    InvalidMinCorrespondences,
}

/// Parameters of the annealed ICP driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Acceptance radius of the first step.
    pub initial_radius: f64,
    /// The radius never shrinks below this value.
    pub min_radius: f64,
    /// Amount the radius shrinks after each step.
    pub radius_step: f64,
    /// Steps with fewer accepted correspondences stall without moving the pose.
    pub min_correspondences: usize,
    /// Reflection handling of the alignment step.
    pub reflection: ReflectionCorrection,
    /// Worker count of the correspondence search, `None` for the rayon default.
    pub num_threads: Option<usize>,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            initial_radius: 100.0,
            min_radius: 10.0,
            radius_step: 1.0,
            min_correspondences: 100,
            reflection: ReflectionCorrection::Kabsch,
            num_threads: None,
        }
    }
}

impl IcpConfig {
    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<(), IcpConfigError> {
        let radii_valid = self.min_radius.is_finite()
            && self.min_radius > 0.0
            && self.initial_radius.is_finite()
            && self.min_radius <= self.initial_radius;
        if !radii_valid {
            return Err(IcpConfigError::InvalidRadius {
                initial_radius: self.initial_radius,
                min_radius: self.min_radius,
            });
        }
        if !(self.radius_step.is_finite() && self.radius_step >= 0.0) {
            return Err(IcpConfigError::InvalidRadiusStep(self.radius_step));
        }
        if self.min_correspondences == 0 {
            return Err(IcpConfigError::InvalidMinCorrespondences);
        }
        Ok(())
    }
}

/// Structure to define the stopping rule of [`IcpDriver::run`].
#[derive(Debug, Clone)]
pub struct IcpConvergenceCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance as the difference in RMSE between two consecutive iterations.
    pub tolerance: f64,
}

/// Result of [`IcpDriver::run`].
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Final pose of the source cloud.
    pub transform: DMat4,
    /// Number of calls to [`IcpDriver::step`].
    pub num_iterations: usize,
    /// RMSE of the last step, `NaN` if it stalled.
    pub rmse: f64,
    /// Whether the RMSE settled within the tolerance.
    pub converged: bool,
}

/// An object whose pose is driven by the registration.
pub trait Transformable {
    /// Current pose.
    fn transform(&self) -> DMat4;

    /// Replace the pose.
    fn set_transform(&mut self, transform: DMat4);
}

impl Transformable for DMat4 {
    fn transform(&self) -> DMat4 {
        *self
    }

    fn set_transform(&mut self, transform: DMat4) {
        *self = transform;
    }
}

/// Annealed point-to-point ICP registering a source cloud onto a reference.
///
/// Every [`IcpDriver::step`] matches the source, moved by the target's pose, to
/// the reference within the current radius, fits a rigid motion to the matches
/// and writes the new pose back. The radius shrinks on every step, stalled or
/// not, until it reaches the configured floor.
pub struct IcpDriver<T: Transformable> {
    source: Arc<dyn VertexBuffer>,
    reference: Arc<dyn VertexBuffer>,
    target: T,
    index: SpatialIndex3D,
    pool: WorkerPool,
    config: IcpConfig,
    radius: f64,
    correspondences: Vec<Correspondence>,
    last_search: AggregateError,
}

impl<T: Transformable> IcpDriver<T> {
    /// Create a new driver.
    ///
    /// # Arguments
    ///
    /// * `source` - Point cloud to move.
    /// * `reference` - Fixed point cloud, indexed once here.
    /// * `target` - Object holding the pose of the source cloud.
    /// * `config` - Annealing and alignment parameters.
    pub fn new(
        source: Arc<dyn VertexBuffer>,
        reference: Arc<dyn VertexBuffer>,
        target: T,
        config: IcpConfig,
    ) -> Result<Self, IcpError> {
        config.validate()?;

        if PositionView::new(source.as_ref())?.is_empty() {
            return Err(IcpError::EmptySource);
        }
        let index = SpatialIndex3D::new(reference.as_ref())?;

        let pool = match config.num_threads {
            Some(n) => WorkerPool::new(n)?,
            None => WorkerPool::with_default_threads()?,
        };

        log::debug!(
            "icp: {} source points, {} reference points, {} workers",
            source.len(),
            index.len(),
            pool.num_threads()
        );

        Ok(Self {
            source,
            reference,
            target,
            index,
            pool,
            radius: config.initial_radius,
            config,
            correspondences: Vec::new(),
            last_search: AggregateError::default(),
        })
    }

    /// Perform one registration step.
    ///
    /// Returns the RMSE of this step's accepted correspondences under the new
    /// pose, or `NaN` when fewer than `min_correspondences` matches fall within
    /// the current radius. A stalled step leaves the pose untouched; the caller
    /// decides whether to stop or reset. The radius shrinks on every call.
    pub fn step(&mut self) -> f64 {
        match self.try_step() {
            Ok(rmse) => rmse,
            Err(err) => {
                log::warn!("icp: step failed: {err}");
                f64::NAN
            }
        }
    }

    fn try_step(&mut self) -> Result<f64, IcpError> {
        let now = std::time::Instant::now();

        let radius = self.radius;
        let radius_squared = radius * radius;
        self.radius = (radius - self.config.radius_step).max(self.config.min_radius);

        let current = self.target.transform();

        let source = PositionView::new(self.source.as_ref())?;
        let reference = PositionView::new(self.reference.as_ref())?;

        self.last_search = find_correspondences(
            &self.index,
            &current,
            &source,
            radius_squared,
            &self.pool,
            &mut self.correspondences,
        );

        let accepted_count = self.last_search.accepted_count;
        if accepted_count < self.config.min_correspondences {
            log::warn!(
                "icp: {} correspondences within radius {}, need {}",
                accepted_count,
                radius,
                self.config.min_correspondences
            );
            return Ok(f64::NAN);
        }

        let transform = align(
            &reference,
            &current,
            &source,
            &self.correspondences,
            radius_squared,
            accepted_count,
            self.config.reflection,
        )?;
        self.target.set_transform(transform);

        let rmse = alignment_error(
            &reference,
            &transform,
            &source,
            &self.correspondences,
            radius_squared,
            &self.pool,
        )
        .rmse();

        log::debug!(
            "icp: radius {} accepted {} rmse {} -> {} in {:?}",
            radius,
            accepted_count,
            self.last_search.rmse(),
            rmse,
            now.elapsed()
        );

        Ok(rmse)
    }

    /// Step until the RMSE settles, the step stalls, or the iteration budget runs out.
    pub fn run(&mut self, criteria: &IcpConvergenceCriteria) -> IcpResult {
        let mut result = IcpResult {
            transform: self.target.transform(),
            num_iterations: 0,
            rmse: f64::INFINITY,
            converged: false,
        };

        for _ in 0..criteria.max_iterations {
            let rmse = self.step();
            result.num_iterations += 1;

            if rmse.is_nan() {
                result.rmse = rmse;
                break;
            }

            // check convergence and exit if below tolerance
            let converged = (result.rmse - rmse).abs() < criteria.tolerance;
            result.rmse = rmse;
            if converged {
                log::debug!(
                    "icp converged in {} iterations with error {}",
                    result.num_iterations,
                    rmse
                );
                result.converged = true;
                break;
            }
        }

        result.transform = self.target.transform();
        result
    }

    /// Current acceptance radius.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Restart the annealing schedule from the initial radius.
    pub fn reset_radius(&mut self) {
        self.radius = self.config.initial_radius;
    }

    /// The configuration of the driver.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// The object holding the pose.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the object holding the pose, e.g. to reset it.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Consume the driver and return the object holding the pose.
    pub fn into_target(self) -> T {
        self.target
    }

    /// Correspondences of the last step, one per source point.
    pub fn correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    /// Aggregate of the last correspondence search, before alignment.
    pub fn last_search(&self) -> AggregateError {
        self.last_search
    }
}
