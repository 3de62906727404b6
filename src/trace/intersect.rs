//! Ray-primitive and ray-box intersection.
//!
//! These are the exact formulas the GPU kernel ports. Each primitive test
//! returns the nearest root that passes the distance window and clip plane,
//! so a rejected near root falls through to the far one.

use smallvec::SmallVec;

use super::ray::{ClipPlane, CylinderPart, HitDetail, Ray};
use crate::geom::{Cylinder, Primitive, Sphere, Triangle};
use crate::util::Aabb;

/// Direction components below this magnitude are treated as zero by the slab test.
pub const DIR_EPSILON: f32 = 1e-8;

/// Determinant threshold below which a ray is parallel to a triangle.
pub const TRIANGLE_EPSILON: f32 = 1e-8;

/// Slab test. Returns the entry distance when the ray overlaps `bounds`
/// within `[t_min, t_max]`.
///
/// An axis with a negligible direction component only passes when the
/// origin lies inside the box on that axis.
#[inline]
pub fn ray_aabb(ray: &Ray, bounds: &Aabb, t_min: f32, t_max: f32) -> Option<f32> {
    let mut t_near = t_min;
    let mut t_far = t_max;
    for axis in 0..3 {
        let o = ray.origin[axis];
        let d = ray.dir[axis];
        let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
        if d.abs() < DIR_EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let t0 = (lo - o) * inv;
        let t1 = (hi - o) * inv;
        let (t0, t1) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }
    Some(t_near)
}

/// Möller–Trumbore, double-sided. Returns `(t, u, v)` for any `t`.
#[inline]
pub fn ray_triangle(ray: &Ray, tri: &Triangle) -> Option<(f32, f32, f32)> {
    let e1 = tri.v1 - tri.v0;
    let e2 = tri.v2 - tri.v0;
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < TRIANGLE_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - tri.v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    Some((e2.dot(q) * inv_det, u, v))
}

/// Both roots of the ray-sphere quadratic, nearest first.
#[inline]
pub fn ray_sphere(ray: &Ray, sphere: &Sphere) -> Option<(f32, f32)> {
    let oc = ray.origin - sphere.center;
    let a = ray.dir.dot(ray.dir);
    if a == 0.0 {
        return None;
    }
    let b = oc.dot(ray.dir);
    let c = oc.dot(oc) - sphere.radius * sphere.radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    Some(((-b - sq) / a, (-b + sq) / a))
}

type Candidates = SmallVec<[(f32, HitDetail); 6]>;

/// Side and cap roots of a capsule-capped cylinder.
///
/// Side roots count when their axial coordinate lies in `[0, h]`. The cap
/// at `p1` keeps roots on its outer half (`y <= 0`), the cap at `p2` roots
/// with `y >= h`.
fn cylinder_candidates(ray: &Ray, cyl: &Cylinder, out: &mut Candidates) {
    let h = cyl.height();
    let axis = cyl.axis();
    let oc = ray.origin - cyl.p1;
    let axial = |t: f32| (oc + ray.dir * t).dot(axis);

    if h > 0.0 {
        let d_perp = ray.dir - axis * ray.dir.dot(axis);
        let o_perp = oc - axis * oc.dot(axis);
        let a = d_perp.dot(d_perp);
        if a > DIR_EPSILON * DIR_EPSILON {
            let b = o_perp.dot(d_perp);
            let c = o_perp.dot(o_perp) - cyl.radius * cyl.radius;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let sq = disc.sqrt();
                for t in [(-b - sq) / a, (-b + sq) / a] {
                    let y = axial(t);
                    if (0.0..=h).contains(&y) {
                        out.push((t, HitDetail::Cylinder(CylinderPart::Side)));
                    }
                }
            }
        }
    }

    let caps = [
        (cyl.p1, CylinderPart::CapStart),
        (cyl.p2, CylinderPart::CapEnd),
    ];
    for (center, part) in caps {
        let Some((t0, t1)) = ray_sphere(ray, &Sphere::new(center, cyl.radius)) else {
            continue;
        };
        for t in [t0, t1] {
            let y = axial(t);
            let outer = match part {
                CylinderPart::CapStart => y <= 0.0,
                _ => y >= h,
            };
            if outer {
                out.push((t, HitDetail::Cylinder(part)));
            }
        }
    }
}

/// Nearest root of `primitive` with `t_min < t < t_max` whose hit point the
/// clip plane accepts.
pub fn intersect_primitive(
    primitive: &Primitive,
    ray: &Ray,
    t_min: f32,
    t_max: f32,
    clip: Option<&ClipPlane>,
) -> Option<(f32, HitDetail)> {
    let mut candidates = Candidates::new();
    match primitive {
        Primitive::Triangle(tri) => {
            if let Some((t, u, v)) = ray_triangle(ray, tri) {
                candidates.push((t, HitDetail::Triangle { u, v }));
            }
        }
        Primitive::Sphere(sphere) => {
            if let Some((t0, t1)) = ray_sphere(ray, sphere) {
                candidates.push((t0, HitDetail::Sphere));
                candidates.push((t1, HitDetail::Sphere));
            }
        }
        Primitive::Cylinder(cyl) => {
            cylinder_candidates(ray, cyl, &mut candidates);
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
    }

    candidates.into_iter().find(|&(t, _)| {
        t > t_min && t < t_max && clip.map_or(true, |plane| plane.accepts(ray.at(t)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{vec3, Vec3};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn z_ray(x: f32, y: f32) -> Ray {
        Ray::new(vec3(x, y, -5.0), Vec3::Z)
    }

    #[test]
    fn test_slab_hit_and_miss() {
        let b = Aabb::new(vec3(-1.0, -1.0, -1.0), vec3(1.0, 1.0, 1.0));
        assert!(approx(ray_aabb(&z_ray(0.0, 0.0), &b, 0.0, f32::INFINITY).unwrap(), 4.0));
        assert!(ray_aabb(&z_ray(2.0, 0.0), &b, 0.0, f32::INFINITY).is_none());
        // Box beyond the far clip
        assert!(ray_aabb(&z_ray(0.0, 0.0), &b, 0.0, 3.0).is_none());
        // Box behind the origin
        let back = Ray::new(vec3(0.0, 0.0, 5.0), Vec3::Z);
        assert!(ray_aabb(&back, &b, 0.0, f32::INFINITY).is_none());
    }

    #[test]
    fn test_slab_flat_box_and_zero_direction() {
        // Zero thickness along z, the ray enters and leaves at t = 5
        let flat = Aabb::new(vec3(-1.0, -1.0, 0.0), vec3(1.0, 1.0, 0.0));
        assert!(approx(ray_aabb(&z_ray(0.0, 0.0), &flat, 0.0, f32::INFINITY).unwrap(), 5.0));

        // x and y components are zero: only the origin's x/y decide
        assert!(ray_aabb(&z_ray(1.0, 1.0), &flat, 0.0, f32::INFINITY).is_some());
        assert!(ray_aabb(&z_ray(1.01, 0.0), &flat, 0.0, f32::INFINITY).is_none());
    }

    #[test]
    fn test_triangle_hit() {
        let tri = Triangle::new(vec3(-1.0, -1.0, 0.0), vec3(1.0, -1.0, 0.0), vec3(0.0, 1.0, 0.0));
        let (t, u, v) = ray_triangle(&z_ray(0.0, 0.0), &tri).unwrap();
        assert!(approx(t, 5.0));
        assert!(approx(u, 0.25));
        assert!(approx(v, 0.5));

        // Back face is hit too
        let reverse = Ray::new(vec3(0.0, 0.0, 5.0), -Vec3::Z);
        assert!(approx(ray_triangle(&reverse, &tri).unwrap().0, 5.0));

        assert!(ray_triangle(&z_ray(2.0, 0.0), &tri).is_none());
    }

    #[test]
    fn test_sphere_roots() {
        let s = Sphere::new(Vec3::ZERO, 1.0);
        let (t0, t1) = ray_sphere(&z_ray(0.0, 0.0), &s).unwrap();
        assert!(approx(t0, 4.0));
        assert!(approx(t1, 6.0));
        assert!(ray_sphere(&z_ray(1.5, 0.0), &s).is_none());
    }

    #[test]
    fn test_sphere_from_inside_takes_far_root() {
        let s = Primitive::Sphere(Sphere::new(Vec3::ZERO, 1.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let (t, _) = intersect_primitive(&s, &ray, 0.0, f32::INFINITY, None).unwrap();
        assert!(approx(t, 1.0));
    }

    #[test]
    fn test_cylinder_side() {
        let c = Primitive::Cylinder(Cylinder::new(Vec3::ZERO, vec3(0.0, 2.0, 0.0), 0.5));
        let ray = Ray::new(vec3(0.3, 1.0, -5.0), Vec3::Z);
        let (t, detail) = intersect_primitive(&c, &ray, 0.0, f32::INFINITY, None).unwrap();
        assert!(approx(t, 4.6));
        assert_eq!(detail, HitDetail::Cylinder(CylinderPart::Side));
        let p = ray.at(t);
        assert!(approx(p.x * p.x + p.z * p.z, 0.25));

        // Outside the radius
        let miss = Ray::new(vec3(1.0, 1.0, -5.0), Vec3::Z);
        assert!(intersect_primitive(&c, &miss, 0.0, f32::INFINITY, None).is_none());
    }

    #[test]
    fn test_cylinder_caps() {
        let c = Primitive::Cylinder(Cylinder::new(Vec3::ZERO, vec3(0.0, 2.0, 0.0), 0.5));

        // Straight down the axis from above hits the p2 hemisphere at y = 2.5
        let down = Ray::new(vec3(0.0, 10.0, 0.0), -Vec3::Y);
        let (t, detail) = intersect_primitive(&c, &down, 0.0, f32::INFINITY, None).unwrap();
        assert!(approx(t, 7.5));
        assert_eq!(detail, HitDetail::Cylinder(CylinderPart::CapEnd));

        // Below p1, across the cap hemisphere
        let under = Ray::new(vec3(0.0, -0.3, -5.0), Vec3::Z);
        let (t, detail) = intersect_primitive(&c, &under, 0.0, f32::INFINITY, None).unwrap();
        assert_eq!(detail, HitDetail::Cylinder(CylinderPart::CapStart));
        assert!(approx(t, 5.0 - 0.4));
    }

    #[test]
    fn test_degenerate_cylinder_is_sphere() {
        let c = Primitive::Cylinder(Cylinder::new(Vec3::ONE, Vec3::ONE, 0.5));
        let ray = Ray::new(vec3(1.0, 1.0, -5.0), Vec3::Z);
        let (t, _) = intersect_primitive(&c, &ray, 0.0, f32::INFINITY, None).unwrap();
        assert!(approx(t, 5.5));
    }

    #[test]
    fn test_window_and_clip() {
        let s = Primitive::Sphere(Sphere::new(Vec3::ZERO, 1.0));
        let ray = z_ray(0.0, 0.0);
        // Near root excluded by t_min, far root remains
        let (t, _) = intersect_primitive(&s, &ray, 4.5, f32::INFINITY, None).unwrap();
        assert!(approx(t, 6.0));
        // Both excluded by t_max
        assert!(intersect_primitive(&s, &ray, 0.0, 3.9, None).is_none());

        // Keep z >= 0.5: near root at z = -1 is clipped, far root at z = 1 stays
        let clip = ClipPlane::new(Vec3::Z, 0.5, -1.0);
        let (t, _) = intersect_primitive(&s, &ray, 0.0, f32::INFINITY, Some(&clip)).unwrap();
        assert!(approx(t, 6.0));
    }
}
