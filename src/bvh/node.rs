//! BVH node types: the in-memory arena node and the 3-texel GPU record.
//!
//! Record layout (48 bytes, three RGBA32F texels):
//! - texel 0: `min.xyz`, `left_first`
//! - texel 1: `max.xyz`, `prim_count`
//! - texel 2: `right_child`, padding
//!
//! Internal node: `prim_count = 0`, `left_first`/`right_child` are node indices.
//! Leaf node: `prim_count > 0`, `left_first` indexes the primitive reference array.
//! Integer lanes hold raw `u32` bits; the kernel reads them with `floatBitsToUint`.

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;

use crate::util::{Aabb, Vec3};

/// Index of a node in the arena. The root is always node 0.
pub type NodeId = u32;

/// Number of texels one [`NodeRecord`] occupies.
pub const TEXELS_PER_NODE: usize = 3;

/// Leaf primitive list: indices into the tree's `PrimitiveInfo` array.
pub type LeafPrimitives = SmallVec<[u32; 4]>;

/// Arena node of the in-memory tree.
#[derive(Debug, Clone, PartialEq)]
pub enum BvhNode {
    Internal {
        bounds: Aabb,
        left: NodeId,
        right: NodeId,
    },
    Leaf {
        bounds: Aabb,
        primitives: LeafPrimitives,
    },
}

impl BvhNode {
    #[inline]
    pub fn bounds(&self) -> &Aabb {
        match self {
            BvhNode::Internal { bounds, .. } => bounds,
            BvhNode::Leaf { bounds, .. } => bounds,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, BvhNode::Leaf { .. })
    }

    /// Leaf primitive list, empty for internal nodes.
    #[inline]
    pub fn primitives(&self) -> &[u32] {
        match self {
            BvhNode::Leaf { primitives, .. } => primitives,
            BvhNode::Internal { .. } => &[],
        }
    }
}

/// GPU-friendly node record (48 bytes = 3 texels).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeRecord {
    pub min: [f32; 3],
    pub left_first: u32,
    pub max: [f32; 3],
    pub prim_count: u32,
    pub right_child: u32,
    pub _pad: [u32; 3],
}

impl NodeRecord {
    pub fn internal(bounds: &Aabb, left: NodeId, right: NodeId) -> Self {
        Self {
            min: bounds.min.to_array(),
            left_first: left,
            max: bounds.max.to_array(),
            prim_count: 0,
            right_child: right,
            _pad: [0; 3],
        }
    }

    pub fn leaf(bounds: &Aabb, first: u32, count: u32) -> Self {
        Self {
            min: bounds.min.to_array(),
            left_first: first,
            max: bounds.max.to_array(),
            prim_count: count,
            right_child: 0,
            _pad: [0; 3],
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.prim_count > 0
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::from_array(self.min), Vec3::from_array(self.max))
    }

    /// The record as three RGBA texels (bit-exact).
    #[inline]
    pub fn to_texels(&self) -> [[f32; 4]; TEXELS_PER_NODE] {
        bytemuck::cast(*self)
    }

    /// Decode three texels the way the kernel does.
    #[inline]
    pub fn from_texels(texels: [[f32; 4]; TEXELS_PER_NODE]) -> Self {
        let t0 = texels[0];
        let t1 = texels[1];
        let t2 = texels[2];
        Self {
            min: [t0[0], t0[1], t0[2]],
            left_first: t0[3].to_bits(),
            max: [t1[0], t1[1], t1[2]],
            prim_count: t1[3].to_bits(),
            right_child: t2[0].to_bits(),
            _pad: [t2[1].to_bits(), t2[2].to_bits(), t2[3].to_bits()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec3;

    #[test]
    fn test_record_size() {
        assert_eq!(std::mem::size_of::<NodeRecord>(), 48);
        assert_eq!(std::mem::size_of::<NodeRecord>(), TEXELS_PER_NODE * 16);
    }

    #[test]
    fn test_texel_lanes() {
        let b = Aabb::new(vec3(-1.0, -2.0, -3.0), vec3(1.0, 2.0, 3.0));
        let rec = NodeRecord::internal(&b, 5, 9);
        let texels = rec.to_texels();
        assert_eq!(texels[0][0], -1.0);
        assert_eq!(texels[0][3].to_bits(), 5);
        assert_eq!(texels[1][2], 3.0);
        assert_eq!(texels[1][3].to_bits(), 0);
        assert_eq!(texels[2][0].to_bits(), 9);
        assert_eq!(NodeRecord::from_texels(texels), rec);
    }

    #[test]
    fn test_leaf_flag() {
        let b = Aabb::DEGENERATE;
        assert!(NodeRecord::leaf(&b, 0, 3).is_leaf());
        assert!(!NodeRecord::internal(&b, 1, 2).is_leaf());
    }

    #[test]
    fn test_node_accessors() {
        let leaf = BvhNode::Leaf {
            bounds: Aabb::DEGENERATE,
            primitives: LeafPrimitives::from_slice(&[2, 4]),
        };
        assert!(leaf.is_leaf());
        assert_eq!(leaf.primitives(), &[2, 4]);

        let internal = BvhNode::Internal {
            bounds: Aabb::DEGENERATE,
            left: 1,
            right: 2,
        };
        assert!(!internal.is_leaf());
        assert!(internal.primitives().is_empty());
    }
}
