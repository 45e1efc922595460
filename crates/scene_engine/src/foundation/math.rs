//! Math utilities and types
//!
//! Single-precision aliases are used for GPU-facing data, double-precision
//! aliases for the scene graph's authoritative transforms.

pub use nalgebra::{
    Matrix3, Matrix4, Point3, Quaternion, Unit, UnitQuaternion, Vector2, Vector3, Vector4,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Double-precision 3D vector
pub type DVec3 = Vector3<f64>;

/// Double-precision 4D vector
pub type DVec4 = Vector4<f64>;

/// Double-precision affine transform stored as a homogeneous 4x4 matrix
pub type DMat4 = Matrix4<f64>;

/// Double-precision rotation
pub type DQuat = UnitQuaternion<f64>;

/// Translation, rotation and non-uniform scaling of a scene node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation
    pub translation: DVec3,

    /// Rotation quaternion
    pub rotation: DQuat,

    /// Scale factors
    pub scaling: DVec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: DVec3::zeros(),
            rotation: DQuat::identity(),
            scaling: DVec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose the affine matrix: scaling is applied first, then rotation, then translation.
    pub fn to_matrix(&self) -> DMat4 {
        DMat4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * DMat4::new_nonuniform_scaling(&self.scaling)
    }

    /// Decompose an affine matrix without shear into translation, rotation and scaling.
    ///
    /// A negative determinant is folded into the X scale.
    pub fn from_matrix(m: &DMat4) -> Self {
        let linear = m.fixed_view::<3, 3>(0, 0).into_owned();
        let mut scaling = DVec3::new(
            linear.column(0).magnitude(),
            linear.column(1).magnitude(),
            linear.column(2).magnitude(),
        );
        if linear.determinant() < 0.0 {
            scaling.x = -scaling.x;
        }
        let mut basis = linear;
        for i in 0..3 {
            if scaling[i].abs() > f64::EPSILON {
                basis.set_column(i, &(linear.column(i) / scaling[i]));
            }
        }
        let rotation = DQuat::from_rotation_matrix(&nalgebra::Rotation3::from_matrix_unchecked(basis));
        Self {
            translation: affine_translation(m),
            rotation,
            scaling,
        }
    }
}

/// Extract the translation column of an affine matrix.
pub fn affine_translation(m: &DMat4) -> DVec3 {
    DVec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Row-major 3x4 packing of an affine matrix, as consumed by shaders.
pub fn affine_to_rows(m: &Mat4) -> [f32; 12] {
    [
        m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(0, 3)],
        m[(1, 0)], m[(1, 1)], m[(1, 2)], m[(1, 3)],
        m[(2, 0)], m[(2, 1)], m[(2, 2)], m[(2, 3)],
    ]
}

/// Inverse of an affine transform, falling back to identity for singular matrices.
pub fn affine_inverse(m: &DMat4) -> DMat4 {
    m.try_inverse().unwrap_or_else(|| {
        log::warn!("Singular affine transform, using identity as its inverse");
        DMat4::identity()
    })
}

/// Rotation that turns the -Z axis towards `direction`.
pub fn rotation_from_direction(direction: &DVec3) -> DQuat {
    let forward = -DVec3::z();
    match direction.try_normalize(1e-12) {
        Some(dir) => DQuat::rotation_between(&forward, &dir)
            .unwrap_or_else(|| DQuat::from_axis_angle(&DVec3::y_axis(), std::f64::consts::PI)),
        None => DQuat::identity(),
    }
}

/// Quaternion from XYZ Euler angles in radians.
pub fn rotation_from_euler(euler: &DVec3) -> DQuat {
    DQuat::from_euler_angles(euler.x, euler.y, euler.z)
}

/// Axis-aligned bounding box; an empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Box3 {
    /// Create a new box from min and max points
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The empty box, identity element of [`Box3::union`]
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Create a box centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// True if the box contains no points
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the box
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Smallest box enclosing both boxes
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Box grown by `amount` in every direction
    #[must_use]
    pub fn grow(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::repeat(amount),
            max: self.max + Vec3::repeat(amount),
        }
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this box intersects another box
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Bounding box of the eight transformed corners. Empty boxes stay empty.
    #[must_use]
    pub fn transformed(&self, m: &DMat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut result = Self::empty();
        for i in 0..8 {
            let corner = nalgebra::Point3::new(
                f64::from(if i & 1 == 0 { self.min.x } else { self.max.x }),
                f64::from(if i & 2 == 0 { self.min.y } else { self.max.y }),
                f64::from(if i & 4 == 0 { self.min.z } else { self.max.z }),
            );
            let p = m.transform_point(&corner).coords.cast::<f32>();
            result.min = result.min.inf(&p);
            result.max = result.max.sup(&p);
        }
        result
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if a point lies inside the sphere
    pub fn contains_point(&self, point: Vec3) -> bool {
        (point - self.center).magnitude_squared() <= self.radius * self.radius
    }

    /// Sphere-sphere overlap test.
    ///
    /// Note: the second radius enters the comparison as `other.radius + other.radius`,
    /// not squared. Existing scene content was tuned against this behavior.
    pub fn intersects_sphere(&self, other: &Self) -> bool {
        let v = self.center - other.center;
        let r1sq = self.radius * self.radius;
        let r2sq = other.radius + other.radius;
        v.dot(&v) < r1sq + r2sq
    }

    /// Sphere-box overlap test
    pub fn intersects_box(&self, b: &Box3) -> bool {
        b.grow(self.radius).contains_point(self.center)
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix (Gribb-Hartmann).
    ///
    /// Assumes a `[-1, 1]` clip-space depth range, as produced by nalgebra's
    /// projection constructors.
    pub fn from_matrix(vp: &Mat4) -> Self {
        let row = |i: usize| Vec4::new(vp[(i, 0)], vp[(i, 1)], vp[(i, 2)], vp[(i, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let plane = |v: Vec4| Plane::new(Vec3::new(v.x, v.y, v.z), v.w);
        Self {
            planes: [
                plane(r3 + r0),
                plane(r3 - r0),
                plane(r3 + r1),
                plane(r3 - r1),
                plane(r3 + r2),
                plane(r3 - r2),
            ],
        }
    }

    /// Check if a box is inside or intersects the frustum
    pub fn intersects_box(&self, b: &Box3) -> bool {
        if b.is_empty() {
            return false;
        }
        self.planes.iter().all(|plane| {
            let mut p = b.min;
            if plane.normal.x >= 0.0 { p.x = b.max.x; }
            if plane.normal.y >= 0.0 { p.y = b.max.y; }
            if plane.normal.z >= 0.0 { p.z = b.max.z; }
            plane.distance_to_point(p) >= 0.0
        })
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane, normalizing the equation
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.magnitude();
        if length > 0.0 {
            Self { normal: normal / length, distance: distance / length }
        } else {
            Self { normal, distance }
        }
    }

    /// Signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}
