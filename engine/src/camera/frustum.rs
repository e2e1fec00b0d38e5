//! View Frustum
//!
//! Camera position, view direction and clip planes consumed by the terrain
//! mesh for visibility and priority. Planes keep the inside where
//! `normal · p + d >= 0`.
//!
//! # Example
//!
//! ```ignore
//! use roam_terrain_engine::camera::ViewFrustum;
//! use glam::Vec3;
//!
//! let frustum = ViewFrustum::perspective(
//!     Vec3::new(0.0, 40.0, 0.0),
//!     Vec3::new(1.0, -0.3, 1.0),
//!     Vec3::Y,
//!     std::f32::consts::FRAC_PI_3,
//!     16.0 / 9.0,
//!     1.0,
//!     500.0,
//! );
//! assert_eq!(frustum.planes.len(), 6);
//! ```

use glam::{Mat4, Vec3, Vec4};

/// Visibility of a triangle against the view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisState {
    /// Entirely inside every clip plane
    In,
    /// Entirely outside at least one clip plane
    Out,
    /// Straddles a clip plane; children must be tested
    Partial,
}

impl VisState {
    /// Anything not fully outside counts as visible.
    #[inline]
    pub fn is_visible(self) -> bool {
        self != VisState::Out
    }

    /// Combine two tests of the same volume.
    #[inline]
    pub fn combine(self, other: VisState) -> VisState {
        match (self, other) {
            (VisState::Out, _) | (_, VisState::Out) => VisState::Out,
            (VisState::In, VisState::In) => VisState::In,
            _ => VisState::Partial,
        }
    }
}

/// Clip plane in Hessian normal form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Plane through `point` whose inside faces along `normal`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    /// Normalized plane from `(a, b, c, d)` coefficients.
    fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                d: v.w / len,
            }
        } else {
            Self { normal, d: v.w }
        }
    }

    /// Signed distance; positive inside.
    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    /// Classify an axis-aligned box against this plane alone.
    pub fn classify_aabb(&self, min: Vec3, max: Vec3) -> VisState {
        // Corner furthest along the normal, and the one furthest against it.
        let positive = Vec3::select(self.normal.cmpge(Vec3::ZERO), max, min);
        let negative = Vec3::select(self.normal.cmpge(Vec3::ZERO), min, max);

        if self.distance(positive) < 0.0 {
            VisState::Out
        } else if self.distance(negative) >= 0.0 {
            VisState::In
        } else {
            VisState::Partial
        }
    }
}

/// Camera description for one terrain update.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewFrustum {
    /// Camera position in world space
    pub position: Vec3,
    /// View direction (normalized)
    pub forward: Vec3,
    /// Clip planes; an empty list only applies the mesh far clip
    pub planes: Vec<Plane>,
}

impl Default for ViewFrustum {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::X,
            planes: Vec::new(),
        }
    }
}

impl ViewFrustum {
    /// Create a frustum from explicit clip planes.
    pub fn new(position: Vec3, forward: Vec3, planes: Vec<Plane>) -> Self {
        Self {
            position,
            forward: forward.normalize_or(Vec3::X),
            planes,
        }
    }

    /// Create a frustum without clip planes; only distance culling applies.
    pub fn unbounded(position: Vec3, forward: Vec3) -> Self {
        Self::new(position, forward, Vec::new())
    }

    /// Build a perspective frustum and extract its six planes.
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `forward` - View direction (need not be normalized)
    /// * `up` - Approximate up vector
    /// * `fov_y` - Vertical field of view in radians
    /// * `aspect` - Width / height
    /// * `near` - Near plane distance
    /// * `far` - Far plane distance
    pub fn perspective(
        position: Vec3,
        forward: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let forward = forward.normalize_or(Vec3::X);
        // Looking along `up` would make the view matrix degenerate.
        let up = if forward.cross(up).length_squared() < 1e-8 {
            forward.any_orthonormal_vector()
        } else {
            up
        };

        let view = Mat4::look_to_rh(position, forward, up);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        let clip = proj * view;

        let r0 = clip.row(0);
        let r1 = clip.row(1);
        let r2 = clip.row(2);
        let r3 = clip.row(3);

        // Depth range is 0..1 for perspective_rh.
        let planes = vec![
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r2),
            Plane::from_coefficients(r3 - r2),
        ];

        Self {
            position,
            forward,
            planes,
        }
    }

    /// Test a point against every plane.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(p) >= 0.0)
    }

    /// Classify an axis-aligned box against all planes.
    pub fn classify_aabb(&self, min: Vec3, max: Vec3) -> VisState {
        let mut state = VisState::In;
        for plane in &self.planes {
            state = state.combine(plane.classify_aabb(min, max));
            if state == VisState::Out {
                break;
            }
        }
        state
    }
}
