//! Serialize the flattened BVH and primitive arrays into texture buffers.
//!
//! Texel formats (RGBA32F unless noted):
//! - nodes: 3 texels per node, see [`NodeRecord`](super::NodeRecord)
//! - refs: one packed `u32` per texel (R32UI)
//! - triangles: 3 texels per triangle, `(v0, 0) (v1, 0) (v2, 0)`
//! - spheres: 1 texel per sphere, `(center, radius)`
//! - cylinders: 2 texels per cylinder, `(p1, radius) (p2, 0)`
//!
//! Primitive arrays stay in local index order; packed references address
//! them directly.

use super::flatten::FlattenedBvh;
use super::texture::{pack, TexelBuffer, TextureLimits};
use crate::geom::Geometry;
use crate::util::{Result, Vec3};

/// One RGBA32F texel.
pub type Texel = [f32; 4];

/// Complete scene data ready for texture upload.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuSceneData {
    pub nodes: TexelBuffer<Texel>,
    pub refs: TexelBuffer<u32>,
    pub triangles: TexelBuffer<Texel>,
    pub spheres: TexelBuffer<Texel>,
    pub cylinders: TexelBuffer<Texel>,
    /// Total node count.
    pub node_count: u32,
}

#[inline]
fn texel(v: Vec3, w: f32) -> Texel {
    [v.x, v.y, v.z, w]
}

/// Build texture-ready scene data from a flattened tree and its geometry.
///
/// Every array is laid out with the same [`TextureLimits`], so one
/// oversized array fails the whole upload.
#[tracing::instrument(skip_all, fields(nodes = flat.node_count(), refs = flat.refs().len()))]
pub fn build_gpu_data(flat: &FlattenedBvh, geometry: &Geometry, limits: &TextureLimits) -> Result<GpuSceneData> {
    let nodes = pack(flat.node_texels().to_vec(), limits)?;
    let refs = pack(flat.ref_bits().to_vec(), limits)?;

    // Triangle vertex cache
    let mut tri_texels = Vec::with_capacity(geometry.triangle_count() * 3);
    for i in 0..geometry.triangle_count() {
        let tri = geometry.triangle(i)?;
        tri_texels.extend([texel(tri.v0, 0.0), texel(tri.v1, 0.0), texel(tri.v2, 0.0)]);
    }
    let triangles = pack(tri_texels, limits)?;

    let spheres = pack(
        geometry.spheres.iter().map(|s| texel(s.center, s.radius)).collect(),
        limits,
    )?;

    let cylinders = pack(
        geometry
            .cylinders
            .iter()
            .flat_map(|c| [texel(c.p1, c.radius), texel(c.p2, 0.0)])
            .collect(),
        limits,
    )?;

    tracing::debug!(
        nodes = ?nodes.layout,
        refs = ?refs.layout,
        triangles = ?triangles.layout,
        spheres = ?spheres.layout,
        cylinders = ?cylinders.layout,
        "GPU scene data packed"
    );

    Ok(GpuSceneData {
        nodes,
        refs,
        triangles,
        spheres,
        cylinders,
        node_count: flat.node_count() as u32,
    })
}

/// Raw byte views for upload.
impl GpuSceneData {
    /// Node texels as bytes.
    pub fn nodes_bytes(&self) -> &[u8] {
        self.nodes.bytes()
    }

    /// Packed primitive references as bytes.
    pub fn refs_bytes(&self) -> &[u8] {
        self.refs.bytes()
    }

    /// Triangle vertex cache as bytes.
    pub fn triangles_bytes(&self) -> &[u8] {
        self.triangles.bytes()
    }

    /// Sphere data as bytes.
    pub fn spheres_bytes(&self) -> &[u8] {
        self.spheres.bytes()
    }

    /// Cylinder data as bytes.
    pub fn cylinders_bytes(&self) -> &[u8] {
        self.cylinders.bytes()
    }
}
