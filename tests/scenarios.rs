//! End-to-end build and query scenarios.

use molray::bvh::{BuildOptions, Bvh, BvhNode};
use molray::geom::{Cylinder, Geometry, PrimitiveKind, Sphere};
use molray::trace::{any_hit, closest_hit, CylinderPart, HitDetail, Ray};
use molray::util::{vec3, Aabb, Error, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_triangles(count: usize, seed: u64) -> Geometry {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = Vec::with_capacity(count * 3);
    for _ in 0..count {
        let c = vec3(rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0));
        for _ in 0..3 {
            let offset = vec3(rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2));
            positions.push(c + offset);
        }
    }
    let indices = (0..(count * 3) as u32).collect();
    Geometry::from_triangles(positions, indices)
}

#[test]
fn test_unit_quad_single_leaf() {
    let geometry = Geometry::from_triangles(
        vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 1.0, 0.0),
        ],
        vec![0, 1, 2, 1, 3, 2],
    );
    let options = BuildOptions {
        max_leaf_size: 2,
        ..BuildOptions::default()
    };
    let bvh = Bvh::build(&geometry, &options).unwrap();

    assert_eq!(bvh.node_count(), 1);
    match bvh.root() {
        BvhNode::Leaf { bounds, primitives } => {
            assert_eq!(*bounds, Aabb::new(Vec3::ZERO, vec3(1.0, 1.0, 0.0)));
            assert_eq!(primitives.len(), 2);
        }
        other => panic!("expected leaf, got {:?}", other),
    }

    let flat = bvh.flatten().unwrap();
    let mut refs = flat.leaf_refs(0).unwrap();
    refs.sort();
    assert_eq!(refs, vec![(PrimitiveKind::Triangle, 0), (PrimitiveKind::Triangle, 1)]);
}

#[test]
fn test_thousand_random_triangles() {
    let geometry = random_triangles(1000, 7);
    let bvh = Bvh::build(&geometry, &BuildOptions::default()).unwrap();
    let stats = bvh.stats().unwrap();

    assert_eq!(stats.primitives, 1000);
    assert_eq!(stats.internal + 1, stats.leaves);
    assert_eq!(stats.internal + stats.leaves, stats.nodes);
    assert!(stats.max_leaf_primitives <= 4);
    for node in &bvh.nodes {
        if node.is_leaf() {
            assert!(!node.primitives().is_empty());
            assert!(node.primitives().len() <= 4);
        }
    }
}

#[test]
fn test_ray_hits_triangle_at_five() {
    let geometry = Geometry::from_triangles(
        vec![vec3(-1.0, -1.0, 0.0), vec3(1.0, -1.0, 0.0), vec3(0.0, 1.0, 0.0)],
        vec![0, 1, 2],
    );
    let bvh = Bvh::build(&geometry, &BuildOptions::default()).unwrap();
    let ray = Ray::new(vec3(0.0, 0.0, -5.0), Vec3::Z);

    let hit = closest_hit(&bvh, &geometry, &ray, 0.0, None).unwrap().unwrap();
    assert!((hit.t - 5.0).abs() < 1e-5);
    assert_eq!(hit.kind, PrimitiveKind::Triangle);
    assert_eq!(hit.index, 0);
    let bary = hit.barycentric().unwrap();
    assert!((bary.x + bary.y + bary.z - 1.0).abs() < 1e-5);
    assert!(bary.min_element() >= 0.0);
}

#[test]
fn test_any_hit_bounded_by_t_max() {
    let geometry = Geometry::from_triangles(
        vec![vec3(-1.0, -1.0, 0.0), vec3(1.0, -1.0, 0.0), vec3(0.0, 1.0, 0.0)],
        vec![0, 1, 2],
    );
    let bvh = Bvh::build(&geometry, &BuildOptions::default()).unwrap();
    let ray = Ray::new(vec3(0.0, 0.0, -5.0), Vec3::Z);

    assert!(closest_hit(&bvh, &geometry, &ray, 0.0, None).unwrap().is_some());
    assert!(!any_hit(&bvh, &geometry, &ray, 4.0, 0.0, None).unwrap());
    assert!(any_hit(&bvh, &geometry, &ray, 6.0, 0.0, None).unwrap());
}

#[test]
fn test_cylinder_side_hit() {
    let geometry = Geometry::new().with_cylinders(vec![Cylinder::new(Vec3::ZERO, vec3(0.0, 2.0, 0.0), 0.5)]);
    let bvh = Bvh::build(&geometry, &BuildOptions::default()).unwrap();

    // x = 1 lies outside the radius: the ray passes beside the cylinder
    let beside = Ray::new(vec3(1.0, 1.0, -5.0), Vec3::Z);
    assert!(closest_hit(&bvh, &geometry, &beside, 0.0, None).unwrap().is_none());

    let through = Ray::new(vec3(0.3, 1.0, -5.0), Vec3::Z);
    let hit = closest_hit(&bvh, &geometry, &through, 0.0, None).unwrap().unwrap();
    assert_eq!(hit.kind, PrimitiveKind::Cylinder);
    assert_eq!(hit.detail, HitDetail::Cylinder(CylinderPart::Side));
    // 0.3^2 + z^2 = 0.25 -> z = -0.4
    assert!((hit.t - 4.6).abs() < 1e-4);
    let p = hit.point(&through);
    assert!((p.x * p.x + p.z * p.z - 0.25).abs() < 1e-4);
}

#[test]
fn test_empty_and_small_inputs() {
    let empty = Bvh::build(&Geometry::new(), &BuildOptions::default()).unwrap();
    assert_eq!(empty.node_count(), 1);
    assert!(empty.root().is_leaf());
    assert_eq!(*empty.root().bounds(), Aabb::DEGENERATE);

    let three = Geometry::new().with_spheres(vec![
        Sphere::new(vec3(0.0, 0.0, 0.0), 1.0),
        Sphere::new(vec3(5.0, 0.0, 0.0), 1.0),
        Sphere::new(vec3(9.0, 0.0, 0.0), 1.0),
    ]);
    let bvh = Bvh::build(&three, &BuildOptions::default()).unwrap();
    assert_eq!(bvh.node_count(), 1);
}

#[test]
fn test_bad_index_buffer_rejected() {
    let err = Bvh::build_triangles(&[Vec3::ZERO, Vec3::X, Vec3::Y], &[0, 1], &BuildOptions::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidIndexCount { len: 2 }));
    assert!(err.to_string().contains("multiple of 3"));
}

#[test]
fn test_triangle_entry_point_matches_unified() {
    let geometry = random_triangles(300, 11);
    let options = BuildOptions::default();
    let legacy = Bvh::build_triangles(&geometry.positions, &geometry.indices, &options).unwrap();
    let unified = Bvh::build(&geometry.clone().with_spheres(vec![]).with_cylinders(vec![]), &options).unwrap();

    assert_eq!(legacy.nodes, unified.nodes);
    assert_eq!(legacy.primitives, unified.primitives);
    assert_eq!(legacy.flatten().unwrap(), unified.flatten().unwrap());
}
