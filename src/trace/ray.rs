//! Rays, clip planes and hit records.

use serde::{Deserialize, Serialize};

use crate::geom::PrimitiveKind;
use crate::util::Vec3;

/// Ray with an unnormalized direction. Hit distances are in units of `dir`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir }
    }

    /// Point at distance `t`.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Half-space clip used for slicing views.
///
/// A point `p` is kept when `(dot(normal, p) - offset) * side <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipPlane {
    pub normal: Vec3,
    pub offset: f32,
    /// `1.0` keeps the negative side, `-1.0` the positive side.
    pub side: f32,
}

impl ClipPlane {
    pub fn new(normal: Vec3, offset: f32, side: f32) -> Self {
        Self { normal, offset, side }
    }

    #[inline]
    pub fn accepts(&self, p: Vec3) -> bool {
        (self.normal.dot(p) - self.offset) * self.side <= 0.0
    }
}

/// Which part of a cylinder was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CylinderPart {
    Side,
    /// Hemisphere around `p1`.
    CapStart,
    /// Hemisphere around `p2`.
    CapEnd,
}

/// Per-kind extra data of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HitDetail {
    /// Barycentric weights of `v1` and `v2`.
    Triangle { u: f32, v: f32 },
    Sphere,
    Cylinder(CylinderPart),
}

/// Nearest accepted intersection of a ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub t: f32,
    pub kind: PrimitiveKind,
    /// Index within the primitive's own list.
    pub index: u32,
    pub detail: HitDetail,
}

impl Hit {
    /// `(w, u, v)` barycentrics for triangle hits, summing to 1.
    pub fn barycentric(&self) -> Option<Vec3> {
        match self.detail {
            HitDetail::Triangle { u, v } => Some(Vec3::new(1.0 - u - v, u, v)),
            _ => None,
        }
    }

    #[inline]
    pub fn point(&self, ray: &Ray) -> Vec3 {
        ray.at(self.t)
    }
}
