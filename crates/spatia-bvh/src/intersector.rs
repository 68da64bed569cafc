use std::sync::Arc;

use glam::Vec3;
use spatia_3d::VertexBuffer;

use crate::bvh::{Bvh, Intersection};
use crate::error::BvhError;
use crate::primitive::{Points, Primitive, Triangles};

/// Ray picking against a set of primitives.
pub trait Intersector: Send + Sync {
    /// Find the nearest primitive hit by the ray, `None` while not ready.
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<Intersection>;

    /// Check if queries can report hits.
    fn is_ready(&self) -> bool;

    /// Block until the background build has finished.
    fn wait(&self);
}

impl<P: Primitive> Intersector for Bvh<P> {
    fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<Intersection> {
        Bvh::intersect(self, origin, direction)
    }

    fn is_ready(&self) -> bool {
        Bvh::is_ready(self)
    }

    fn wait(&self) {
        Bvh::wait(self)
    }
}

/// The kind of primitive a vertex buffer is picked as.
#[derive(Debug, Clone, PartialEq)]
pub enum IntersectionMode {
    /// Every vertex is a sphere of the given radius.
    Points {
        /// Radius of every sphere.
        radius: f32,
    },
    /// Vertices are indexed into triangles.
    Triangles {
        /// One index triple per triangle.
        indices: Arc<Vec<[u32; 3]>>,
    },
}

impl Default for IntersectionMode {
    fn default() -> Self {
        IntersectionMode::Points {
            radius: Points::DEFAULT_RADIUS,
        }
    }
}

/// Create an intersector over a vertex buffer and start building it.
///
/// # Arguments
///
/// * `buffer` - The vertex buffer holding the positions.
/// * `mode` - How the vertices form primitives.
pub fn make_intersector(
    buffer: Arc<dyn VertexBuffer>,
    mode: IntersectionMode,
) -> Result<Box<dyn Intersector>, BvhError> {
    let intersector: Box<dyn Intersector> = match mode {
        IntersectionMode::Points { radius } => {
            Box::new(Bvh::new(Points::new(buffer).with_radius(radius)?)?)
        }
        IntersectionMode::Triangles { indices } => {
            Box::new(Bvh::new(Triangles::new(buffer, indices)?)?)
        }
    };
    Ok(intersector)
}
