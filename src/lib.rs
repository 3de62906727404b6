//! # molray
//!
//! Unified bounding volume hierarchy for a molecular path tracer.
//!
//! One binary tree indexes triangles, spheres (atoms) and capsule cylinders
//! (bonds). The tree is built with binned SAH, flattened into 3-texel node
//! records plus packed `(type << 30) | index` primitive references for a GPU
//! kernel, and queried on the CPU with the same explicit-stack traversal the
//! kernel implements.
//!
//! ## Modules
//!
//! - [`util`] - Errors, glam re-exports, [`Aabb`](util::Aabb)
//! - [`geom`] - Primitive kinds, scene geometry, per-primitive build data
//! - [`bvh`] - Builder, flattener, texture layout, GPU arrays
//! - [`trace`] - Rays, intersection tests, closest-hit and any-hit traversal
//! - [`scene`] - Owner of geometry and its trees
//! - [`settings`] - Persistent build/traversal settings
//!
//! ## Example
//!
//! ```ignore
//! use molray::prelude::*;
//!
//! let geometry = Geometry::new().with_spheres(vec![Sphere::new(Vec3::ZERO, 1.0)]);
//! let scene = Scene::new(geometry, Settings::default())?;
//!
//! let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
//! if let Some(hit) = scene.pick(&ray, None)? {
//!     println!("{} {} at t={}", hit.kind, hit.index, hit.t);
//! }
//! ```

pub mod util;
pub mod geom;
pub mod bvh;
pub mod trace;
pub mod scene;
pub mod settings;

// Re-export commonly used types
pub use util::{Error, Result};
pub use scene::Scene;
pub use settings::{Settings, TraversalMode};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Aabb, Error, Result, Vec3};
    pub use crate::geom::{Cylinder, Geometry, Primitive, PrimitiveKind, Sphere, Triangle};
    pub use crate::bvh::{BuildOptions, Bvh, FlattenedBvh, GpuSceneData, PrimitiveRef, TextureLayout, TextureLimits};
    pub use crate::trace::{BvhLayout, ClipPlane, Hit, HitDetail, Ray};
    pub use crate::scene::Scene;
    pub use crate::settings::{Settings, TraversalMode};
}
