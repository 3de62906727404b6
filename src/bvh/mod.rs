//! Bounding volume hierarchy: construction, flattening and texture packing.
//!
//! - [`Bvh`] - Arena tree built with binned SAH
//! - [`FlattenedBvh`] - 3-texel node records plus packed primitive references
//! - [`layout`] - Row-width packing shared by every uploaded array
//! - [`GpuSceneData`] - All arrays the render backend samples

mod build;
mod flatten;
mod gpu_data;
mod node;
mod texture;

pub use build::*;
pub use flatten::*;
pub use gpu_data::*;
pub use node::*;
pub use texture::*;
