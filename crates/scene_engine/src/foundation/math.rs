//! Math utilities and types
//!
//! Provides fundamental math types for the scene-graph core. Vectors,
//! quaternions and matrices are consumed as opaque value types; all the
//! heavy lifting is delegated to `nalgebra`.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform from full position, rotation and scale
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Convert to a transformation matrix (TRS order)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Combine this transform with another (parent * child)
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * (self.scale.component_mul(&other.position)),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Get the inverse transform
    pub fn inverse(&self) -> Transform {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.inverse();
        let inv_position = inv_rotation * (-self.position.component_mul(&inv_scale));

        Transform {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Express this (world-space) transform relative to another world-space
    /// transform, so that `parent.combine(&result) == self`
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        parent.inverse().combine(self)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(&point)
    }
}

/// Compute a rotation that aligns the local -Z axis with `direction`
///
/// Returns identity when `direction` is degenerate.
pub fn look_rotation(direction: Vec3, up: Vec3) -> Quat {
    let magnitude = direction.magnitude();
    if magnitude < 1e-6 {
        return Quat::identity();
    }
    let forward = direction / magnitude;

    // Default forward direction is -Z (right-handed, Y-up)
    let default_forward = Vec3::new(0.0, 0.0, -1.0);

    if (forward + default_forward).magnitude() < 1e-6 {
        // Direction is opposite to default forward
        return Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::PI);
    }

    let right = forward.cross(&up.normalize());
    if right.magnitude() < 1e-6 {
        // Direction is parallel to up, fall back to the shortest arc
        return Quat::rotation_between(&default_forward, &forward).unwrap_or_else(Quat::identity);
    }
    let right = right.normalize();
    let real_up = right.cross(&forward);

    let rotation_matrix = Matrix3::new(
        right.x, real_up.x, -forward.x, right.y, real_up.y, -forward.y, right.z, real_up.z,
        -forward.z,
    );
    Quat::from_matrix(&rotation_matrix)
}

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::zeros(),
            max: Vec3::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_transform_identity_matrix() {
        let t = Transform::identity();
        let m = t.to_matrix();

        assert_relative_eq!(m, Mat4::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_combine_translations() {
        let parent = Transform::from_position(Vec3::new(10.0, 0.0, 0.0));
        let child = Transform::from_position(Vec3::new(5.0, 0.0, 0.0));

        let combined = parent.combine(&child);
        assert_relative_eq!(
            combined.position,
            Vec3::new(15.0, 0.0, 0.0),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_relative_to_roundtrip() {
        let parent = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
            Vec3::new(2.0, 2.0, 2.0),
        );
        let world = Transform::new(
            Vec3::new(4.0, -1.0, 0.5),
            Quat::from_axis_angle(&Vec3::x_axis(), 0.3),
            Vec3::new(1.0, 1.0, 1.0),
        );

        let local = world.relative_to(&parent);
        let reconstructed = parent.combine(&local);

        assert_relative_eq!(reconstructed.position, world.position, epsilon = EPSILON);
        assert_relative_eq!(reconstructed.scale, world.scale, epsilon = EPSILON);

        // Quaternions may flip sign but represent the same rotation
        let dot = reconstructed.rotation.coords.dot(&world.rotation.coords);
        assert!(dot.abs() > 0.999, "rotation mismatch: dot = {dot}");
    }

    #[test]
    fn test_inverse_yields_identity() {
        let t = Transform::new(
            Vec3::new(2.0, 3.0, 1.0),
            Quat::from_axis_angle(&Vec3::y_axis(), 0.785),
            Vec3::new(2.0, 2.0, 2.0),
        );

        let identity = t.combine(&t.inverse());
        assert_relative_eq!(identity.position, Vec3::zeros(), epsilon = EPSILON);
        assert_relative_eq!(identity.scale, Vec3::new(1.0, 1.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_look_rotation_faces_target() {
        let direction = Vec3::new(1.0, 0.0, -1.0);
        let rotation = look_rotation(direction, Vec3::y_axis().into_inner());

        let forward = rotation * Vec3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(forward, direction.normalize(), epsilon = 1e-4);
    }

    #[test]
    fn test_aabb_point_box() {
        let bounds = Aabb::from_center_extents(Vec3::new(1.0, 2.0, 3.0), Vec3::zeros());
        assert_eq!(bounds.center(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bounds.extents(), Vec3::zeros());
        assert!(bounds.contains_point(Vec3::new(1.0, 2.0, 3.0)));
        assert!(!bounds.contains_point(Vec3::zeros()));
    }
}
