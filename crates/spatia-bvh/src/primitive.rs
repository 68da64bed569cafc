use std::sync::Arc;

use glam::{Vec2, Vec3};
use spatia_3d::{Aabb, PositionView, Ray, VertexBuffer};

use crate::error::BvhError;

/// A set of primitives a [`crate::Bvh`] can be built over.
///
/// Primitives are addressed by their index in `[0, len)`. Geometry is read
/// from the positions of [`Primitive::buffer`], validated once per build or
/// query and passed to every call.
pub trait Primitive: Send + Sync + 'static {
    /// Extra data produced by a hit, e.g. barycentric coordinates.
    type Payload: Copy + Default + Send;

    /// The buffer holding the vertex positions.
    fn buffer(&self) -> &dyn VertexBuffer;

    /// Number of primitives.
    fn len(&self) -> usize;

    /// Check if there are no primitives.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounding box of primitive `id`.
    fn aabb(&self, positions: &PositionView<'_>, id: usize) -> Aabb;

    /// Exact intersection of the ray with primitive `id`.
    ///
    /// Returns the distance along the ray and the hit payload.
    fn hit_test(
        &self,
        positions: &PositionView<'_>,
        id: usize,
        ray: &Ray,
    ) -> Option<(f32, Self::Payload)>;

    /// Coordinate of primitive `id` along `axis`, used to order the median split.
    fn sort_key(&self, positions: &PositionView<'_>, id: usize, axis: usize) -> f32;

    /// The point reported for a hit on primitive `id`.
    fn hit_point(&self, positions: &PositionView<'_>, id: usize, payload: &Self::Payload) -> Vec3;

    /// Barycentric coordinates of a hit, for primitives that have them.
    fn barycentric(&self, _payload: &Self::Payload) -> Option<Vec3> {
        None
    }
}

/// Every point of a cloud as a sphere of a shared radius.
#[derive(Clone)]
pub struct Points {
    buffer: Arc<dyn VertexBuffer>,
    radius: f32,
    radius_squared: f32,
}

impl Points {
    /// Radius used by [`Points::new`].
    pub const DEFAULT_RADIUS: f32 = 1.0;

    /// Create the point set of a buffer with the default radius.
    pub fn new(buffer: Arc<dyn VertexBuffer>) -> Self {
        Self {
            buffer,
            radius: Self::DEFAULT_RADIUS,
            radius_squared: Self::DEFAULT_RADIUS * Self::DEFAULT_RADIUS,
        }
    }

    /// Set the radius of every point.
    pub fn with_radius(mut self, radius: f32) -> Result<Self, BvhError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(BvhError::InvalidRadius(radius));
        }
        self.radius = radius;
        self.radius_squared = radius * radius;
        Ok(self)
    }

    /// The radius of every point.
    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Primitive for Points {
    type Payload = ();

    fn buffer(&self) -> &dyn VertexBuffer {
        self.buffer.as_ref()
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn aabb(&self, positions: &PositionView<'_>, id: usize) -> Aabb {
        Aabb::inflated(positions.get(id), self.radius)
    }

    fn hit_test(&self, positions: &PositionView<'_>, id: usize, ray: &Ray) -> Option<(f32, ())> {
        let diff = positions.get(id) - ray.origin;
        let t0 = diff.dot(ray.direction);
        let d2 = diff.length_squared() - t0 * t0;
        if d2 > self.radius_squared {
            return None;
        }

        // far root when the origin is inside the sphere
        let t1 = (self.radius_squared - d2).sqrt();
        let distance = if t0 > t1 + f32::EPSILON {
            t0 - t1
        } else {
            t0 + t1
        };
        (distance > f32::EPSILON).then_some((distance, ()))
    }

    fn sort_key(&self, positions: &PositionView<'_>, id: usize, axis: usize) -> f32 {
        positions.get(id)[axis]
    }

    fn hit_point(&self, positions: &PositionView<'_>, id: usize, _payload: &()) -> Vec3 {
        positions.get(id)
    }
}

/// An indexed triangle mesh.
#[derive(Clone)]
pub struct Triangles {
    buffer: Arc<dyn VertexBuffer>,
    indices: Arc<Vec<[u32; 3]>>,
}

impl Triangles {
    /// Create a triangle set from a vertex buffer and one index triple per triangle.
    ///
    /// Fails when a triangle references a vertex the buffer does not have.
    pub fn new(
        buffer: Arc<dyn VertexBuffer>,
        indices: Arc<Vec<[u32; 3]>>,
    ) -> Result<Self, BvhError> {
        let len = buffer.len();
        for (triangle, tri) in indices.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= len) {
                return Err(BvhError::TriangleIndexOutOfBounds {
                    triangle,
                    index,
                    len,
                });
            }
        }
        Ok(Self { buffer, indices })
    }

    /// The index triples of the mesh.
    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    /// The three vertices of triangle `id`.
    #[inline]
    pub fn vertices(&self, positions: &PositionView<'_>, id: usize) -> [Vec3; 3] {
        self.indices[id].map(|i| positions.get(i as usize))
    }
}

impl Primitive for Triangles {
    /// `(u, v)` weights of the second and third vertex.
    type Payload = Vec2;

    fn buffer(&self) -> &dyn VertexBuffer {
        self.buffer.as_ref()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn aabb(&self, positions: &PositionView<'_>, id: usize) -> Aabb {
        Aabb::from_points(self.vertices(positions, id))
    }

    /// Two-sided Möller-Trumbore intersection.
    fn hit_test(&self, positions: &PositionView<'_>, id: usize, ray: &Ray) -> Option<(f32, Vec2)> {
        let [p0, p1, p2] = self.vertices(positions, id);
        let e1 = p1 - p0;
        let e2 = p2 - p0;

        let p = ray.direction.cross(e2);
        let det = e1.dot(p);
        // parallel to the plane or degenerate
        if det.abs() <= f32::EPSILON * e1.length() * e2.length() {
            return None;
        }
        let inv_det = det.recip();

        let s = ray.origin - p0;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(e1);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let distance = e2.dot(q) * inv_det;
        (distance >= 0.0).then_some((distance, Vec2::new(u, v)))
    }

    fn sort_key(&self, positions: &PositionView<'_>, id: usize, axis: usize) -> f32 {
        let [p0, p1, p2] = self.vertices(positions, id);
        (p0[axis] + p1[axis] + p2[axis]) / 3.0
    }

    fn hit_point(&self, positions: &PositionView<'_>, id: usize, payload: &Vec2) -> Vec3 {
        let [p0, p1, p2] = self.vertices(positions, id);
        let [a, b, c] = barycentric_weights(payload).to_array();
        p0 * a + p1 * b + p2 * c
    }

    fn barycentric(&self, payload: &Vec2) -> Option<Vec3> {
        Some(barycentric_weights(payload))
    }
}

#[inline]
fn barycentric_weights(uv: &Vec2) -> Vec3 {
    Vec3::new(1.0 - uv.x - uv.y, uv.x, uv.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spatia_3d::CpuVertexBuffer;

    fn triangle() -> Result<Triangles, BvhError> {
        let buffer = CpuVertexBuffer::new(vec![
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
        ]);
        Triangles::new(Arc::new(buffer), Arc::new(vec![[0, 1, 2]]))
    }

    #[test]
    fn test_points_hit_closed_form() -> Result<(), Box<dyn std::error::Error>> {
        let points = Points::new(Arc::new(CpuVertexBuffer::new(vec![[0.0, 0.0, -5.0]])))
            .with_radius(1.0)?;
        let positions = PositionView::new(points.buffer())?;

        let ray = Ray::new(Vec3::new(0.5, 0.0, 0.0), Vec3::NEG_Z);
        let (distance, ()) = points.hit_test(&positions, 0, &ray).ok_or("miss")?;
        assert_relative_eq!(distance, 5.0 - 0.75f32.sqrt(), epsilon = 1e-5);

        let miss = Ray::new(Vec3::new(1.5, 0.0, 0.0), Vec3::NEG_Z);
        assert!(points.hit_test(&positions, 0, &miss).is_none());

        let behind = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(points.hit_test(&positions, 0, &behind).is_none());
        Ok(())
    }

    #[test]
    fn test_points_hit_from_inside() -> Result<(), Box<dyn std::error::Error>> {
        let points = Points::new(Arc::new(CpuVertexBuffer::new(vec![[0.0, 0.0, 0.0]])))
            .with_radius(2.0)?;
        let positions = PositionView::new(points.buffer())?;

        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::Z);
        let (distance, ()) = points.hit_test(&positions, 0, &ray).ok_or("miss")?;
        assert_relative_eq!(distance, 1.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_points_aabb_and_radius() -> Result<(), Box<dyn std::error::Error>> {
        let points = Points::new(Arc::new(CpuVertexBuffer::new(vec![[1.0, 2.0, 3.0]])));
        assert_eq!(points.radius(), Points::DEFAULT_RADIUS);
        let positions = PositionView::new(points.buffer())?;
        let aabb = points.aabb(&positions, 0);
        assert_eq!(aabb.min, Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(aabb.max, Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(points.sort_key(&positions, 0, 2), 3.0);

        assert!(matches!(
            points.clone().with_radius(0.0),
            Err(BvhError::InvalidRadius(_))
        ));
        assert!(matches!(
            points.with_radius(f32::NAN),
            Err(BvhError::InvalidRadius(_))
        ));
        Ok(())
    }

    #[test]
    fn test_triangle_hit_barycentric() -> Result<(), Box<dyn std::error::Error>> {
        let triangles = triangle()?;
        let positions = PositionView::new(triangles.buffer())?;

        let centroid = Vec3::new(2.0 / 3.0, 2.0 / 3.0, 0.0);
        for direction in [Vec3::NEG_Z, Vec3::Z] {
            let ray = Ray::new(centroid - direction * 3.0, direction);
            let (distance, uv) = triangles.hit_test(&positions, 0, &ray).ok_or("miss")?;
            assert_relative_eq!(distance, 3.0, epsilon = 1e-5);

            let bc = triangles.barycentric(&uv).ok_or("no barycentric")?;
            assert_relative_eq!(bc.element_sum(), 1.0, epsilon = 1e-6);
            assert_relative_eq!(bc.x, 1.0 / 3.0, epsilon = 1e-5);

            let point = triangles.hit_point(&positions, 0, &uv);
            assert!(point.abs_diff_eq(centroid, 1e-5));
        }
        Ok(())
    }

    #[test]
    fn test_triangle_miss() -> Result<(), Box<dyn std::error::Error>> {
        let triangles = triangle()?;
        let positions = PositionView::new(triangles.buffer())?;

        let outside = Ray::new(Vec3::new(1.5, 1.5, 1.0), Vec3::NEG_Z);
        assert!(triangles.hit_test(&positions, 0, &outside).is_none());

        let parallel = Ray::new(Vec3::new(-1.0, 0.5, 0.0), Vec3::X);
        assert!(triangles.hit_test(&positions, 0, &parallel).is_none());

        let behind = Ray::new(Vec3::new(0.5, 0.5, 1.0), Vec3::Z);
        assert!(triangles.hit_test(&positions, 0, &behind).is_none());
        Ok(())
    }

    #[test]
    fn test_triangle_aabb_and_sort_key() -> Result<(), Box<dyn std::error::Error>> {
        let triangles = triangle()?;
        let positions = PositionView::new(triangles.buffer())?;
        let aabb = triangles.aabb(&positions, 0);
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::new(2.0, 2.0, 0.0));
        assert_relative_eq!(triangles.sort_key(&positions, 0, 0), 2.0 / 3.0);
        Ok(())
    }

    #[test]
    fn test_triangle_index_validation() {
        let buffer: Arc<dyn VertexBuffer> =
            Arc::new(CpuVertexBuffer::new(vec![[0.0; 3], [1.0, 0.0, 0.0]]));
        let res = Triangles::new(buffer, Arc::new(vec![[0, 1, 0], [0, 1, 2]]));
        assert!(matches!(
            res,
            Err(BvhError::TriangleIndexOutOfBounds {
                triangle: 1,
                index: 2,
                len: 2
            })
        ));
    }
}
