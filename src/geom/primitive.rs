//! Primitive kinds and the bounds/centroid/area adapter.
//!
//! Every primitive the tree indexes is one of three shapes. The builder only
//! ever sees [`PrimitiveInfo`], which is computed once per primitive here.

use std::f32::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::{Aabb, Error, Result, Vec3};

/// Padding added to cylinder bounds so zero-length cylinders keep a volume.
pub const CYLINDER_BOUNDS_EPSILON: f32 = 1e-4;

/// Type tag of a primitive. The numeric value is the 2-bit tag stored in
/// packed primitive references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum PrimitiveKind {
    Triangle = 0,
    Sphere = 1,
    Cylinder = 2,
}

impl PrimitiveKind {
    /// All kinds in tag order.
    pub const ALL: [Self; 3] = [Self::Triangle, Self::Sphere, Self::Cylinder];

    /// Numeric tag.
    #[inline]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Decode a numeric tag. Tag 3 fits the packing but names no shape.
    #[inline]
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(Self::Triangle),
            1 => Ok(Self::Sphere),
            2 => Ok(Self::Cylinder),
            other => Err(Error::UnknownPrimitiveTag(other)),
        }
    }

    /// Lower-case display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Triangle => "triangle",
            Self::Sphere => "sphere",
            Self::Cylinder => "cylinder",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Triangle with its three vertex positions resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }
}

/// Analytic sphere (atom in a space-filling or ball-and-stick model).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Finite cylinder between two endpoints with hemispherical caps (bond).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub p1: Vec3,
    pub p2: Vec3,
    pub radius: f32,
}

impl Cylinder {
    pub fn new(p1: Vec3, p2: Vec3, radius: f32) -> Self {
        Self { p1, p2, radius }
    }

    /// Distance between the endpoints.
    #[inline]
    pub fn height(&self) -> f32 {
        (self.p2 - self.p1).length()
    }

    /// Unit axis from `p1` to `p2`, zero for a degenerate cylinder.
    #[inline]
    pub fn axis(&self) -> Vec3 {
        (self.p2 - self.p1).normalize_or_zero()
    }
}

/// A primitive with its geometry resolved, ready for bounds or intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Triangle(Triangle),
    Sphere(Sphere),
    Cylinder(Cylinder),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Triangle(_) => PrimitiveKind::Triangle,
            Self::Sphere(_) => PrimitiveKind::Sphere,
            Self::Cylinder(_) => PrimitiveKind::Cylinder,
        }
    }

    /// Axis-aligned bounds.
    pub fn bounds(&self) -> Aabb {
        match self {
            Self::Triangle(t) => Aabb::from_points([t.v0, t.v1, t.v2]),
            Self::Sphere(s) => Aabb::from_point(s.center).padded(Vec3::splat(s.radius)),
            Self::Cylinder(c) => {
                // Projection of the circular cross-section onto each world axis.
                let axis = c.axis();
                let extent = c.radius * (Vec3::ONE - axis * axis).max(Vec3::ZERO).powf(0.5);
                Aabb::new(c.p1.min(c.p2), c.p1.max(c.p2))
                    .padded(extent + Vec3::splat(CYLINDER_BOUNDS_EPSILON))
            }
        }
    }

    pub fn centroid(&self) -> Vec3 {
        match self {
            Self::Triangle(t) => (t.v0 + t.v1 + t.v2) / 3.0,
            Self::Sphere(s) => s.center,
            Self::Cylinder(c) => (c.p1 + c.p2) * 0.5,
        }
    }

    /// Surface area used as the SAH cost weight.
    ///
    /// The cylinder term is `2πr(h + r)`: side plus two flat caps, not the
    /// capsule's `2πrh + 4πr²`.
    pub fn surface_area(&self) -> f32 {
        match self {
            Self::Triangle(t) => 0.5 * (t.v1 - t.v0).cross(t.v2 - t.v0).length(),
            Self::Sphere(s) => 4.0 * PI * s.radius * s.radius,
            Self::Cylinder(c) => 2.0 * PI * c.radius * (c.height() + c.radius),
        }
    }
}

/// Per-primitive data the builder works from. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveInfo {
    pub kind: PrimitiveKind,
    /// Index within the primitive's own list (triangles, spheres or cylinders).
    pub local_index: usize,
    pub bounds: Aabb,
    pub centroid: Vec3,
    pub surface_area: f32,
}

impl PrimitiveInfo {
    pub fn new(primitive: &Primitive, local_index: usize) -> Self {
        Self {
            kind: primitive.kind(),
            local_index,
            bounds: primitive.bounds(),
            centroid: primitive.centroid(),
            surface_area: primitive.surface_area(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec3;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_tag_round_trip() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(matches!(
            PrimitiveKind::from_tag(3),
            Err(Error::UnknownPrimitiveTag(3))
        ));
    }

    #[test]
    fn test_triangle_adapter() {
        let tri = Primitive::Triangle(Triangle::new(
            Vec3::ZERO,
            vec3(2.0, 0.0, 0.0),
            vec3(0.0, 2.0, 0.0),
        ));
        let b = tri.bounds();
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, vec3(2.0, 2.0, 0.0));
        assert!(approx(tri.surface_area(), 2.0));
        assert!((tri.centroid() - vec3(2.0 / 3.0, 2.0 / 3.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_sphere_adapter() {
        let s = Primitive::Sphere(Sphere::new(vec3(1.0, 2.0, 3.0), 0.5));
        let b = s.bounds();
        assert_eq!(b.min, vec3(0.5, 1.5, 2.5));
        assert_eq!(b.max, vec3(1.5, 2.5, 3.5));
        assert!(approx(s.surface_area(), PI));
        assert_eq!(s.centroid(), vec3(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_cylinder_bounds_are_tight() {
        // Axis along y: no extent along y beyond the endpoints, full radius in x/z.
        let c = Primitive::Cylinder(Cylinder::new(Vec3::ZERO, vec3(0.0, 2.0, 0.0), 0.5));
        let b = c.bounds();
        let eps = CYLINDER_BOUNDS_EPSILON;
        assert!(approx(b.min.x, -0.5 - eps));
        assert!(approx(b.max.x, 0.5 + eps));
        assert!(approx(b.min.y, -eps));
        assert!(approx(b.max.y, 2.0 + eps));
        assert!(approx(b.max.z, 0.5 + eps));

        // Side + flat caps proxy.
        assert!(approx(c.surface_area(), 2.0 * PI * 0.5 * 2.5));
    }

    #[test]
    fn test_diagonal_cylinder_tighter_than_sphere_union() {
        let c = Cylinder::new(Vec3::ZERO, vec3(4.0, 4.0, 0.0), 1.0);
        let b = Primitive::Cylinder(c).bounds();
        // Naive union of endpoint spheres would extend by the full radius in x.
        assert!(b.max.x < 5.0);
        assert!(b.max.x > 4.0);
        // Perpendicular axis keeps the full radius.
        assert!(approx(b.max.z, 1.0 + CYLINDER_BOUNDS_EPSILON));
    }

    #[test]
    fn test_zero_length_cylinder_has_volume() {
        let c = Primitive::Cylinder(Cylinder::new(Vec3::ONE, Vec3::ONE, 0.0));
        let b = c.bounds();
        assert!(!b.is_empty());
        assert!(b.size().min_element() > 0.0);
    }

    #[test]
    fn test_info_copies_adapter_output() {
        let s = Primitive::Sphere(Sphere::new(Vec3::ZERO, 1.0));
        let info = PrimitiveInfo::new(&s, 7);
        assert_eq!(info.kind, PrimitiveKind::Sphere);
        assert_eq!(info.local_index, 7);
        assert_eq!(info.bounds, s.bounds());
    }
}
