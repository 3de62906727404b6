//! Ray queries against a BVH or the raw primitive lists.
//!
//! - [`closest_hit`] / [`any_hit`] - Explicit-stack traversal over any [`BvhLayout`]
//! - [`closest_hit_brute`] / [`any_hit_brute`] - Linear scan fallback
//! - [`intersect`] - Slab, triangle, sphere and cylinder tests

pub mod intersect;
mod ray;
mod traverse;

pub use ray::*;
pub use traverse::*;
