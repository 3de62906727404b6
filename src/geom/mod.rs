//! Geometry input: triangle meshes, spheres and cylinders.
//!
//! - [`Geometry`] - Owned primitive arrays for one scene
//! - [`Primitive`] - A resolved primitive of any kind
//! - [`PrimitiveInfo`] - Bounds, centroid and area the builder consumes

mod geometry;
mod primitive;

pub use geometry::*;
pub use primitive::*;
