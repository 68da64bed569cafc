use glam::Vec3;

/// A half-line with its reciprocal direction cached for slab tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin of the ray.
    pub origin: Vec3,
    /// Unit direction of the ray.
    pub direction: Vec3,
    /// Component-wise reciprocal of `direction`, infinite on zero components.
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray. The direction is normalized, so distances along the
    /// ray are in world units.
    ///
    /// A zero direction yields a zero unit direction that never hits anything.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = direction.normalize_or_zero();
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// The point at distance `t` along the ray.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ray_normalizes() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -4.0));
        assert_eq!(ray.direction, Vec3::NEG_Z);
        assert_eq!(ray.inv_direction.z, -1.0);
        assert!(ray.inv_direction.x.is_infinite());

        let p = ray.at(2.5);
        assert_relative_eq!(p.z, -2.5);
    }
}
