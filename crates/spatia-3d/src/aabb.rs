use glam::Vec3;

use crate::ray::Ray;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The minimum corner.
    pub min: Vec3,
    /// The maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// A box that contains nothing; it is the identity of [`Aabb::union`].
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    /// Create a new box from its two corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The tight bound of a set of points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        })
    }

    /// The bound of a sphere of the given radius.
    pub fn inflated(center: Vec3, radius: f32) -> Self {
        let d = Vec3::splat(radius);
        Self {
            min: center - d,
            max: center + d,
        }
    }

    /// The smallest box containing both boxes.
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Check if the box contains the point, boundary included.
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Check if the box is the empty box or otherwise inverted.
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    /// The center of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Slab test of the ray against the box.
    ///
    /// Uses the precomputed reciprocal direction of the ray. A box entirely
    /// behind the origin is a miss, a box containing the origin is a hit. A ray
    /// parallel to a slab hits it when its origin lies within the slab,
    /// boundary included.
    #[inline]
    pub fn hit(&self, ray: &Ray) -> bool {
        let parallel = ray.direction.cmpeq(Vec3::ZERO);
        let inside = ray.origin.cmpge(self.min) & ray.origin.cmple(self.max);
        if (parallel & !inside).any() {
            return false;
        }

        // 0 * inf is NaN on the faces of a parallel slab
        let t0 = (self.min - ray.origin) * ray.inv_direction;
        let t1 = (self.max - ray.origin) * ray.inv_direction;
        let near = Vec3::select(parallel, Vec3::NEG_INFINITY, t0.min(t1));
        let far = Vec3::select(parallel, Vec3::INFINITY, t0.max(t1));

        let tmax = far.min_element();
        if tmax < 0.0 {
            return false;
        }

        let tmin = near.max_element();
        tmin <= tmax
    }
}

impl std::ops::Add for Aabb {
    type Output = Aabb;

    fn add(self, rhs: Aabb) -> Aabb {
        self.union(&rhs)
    }
}
