//! Flattened tree: node records plus packed primitive references.
//!
//! A reference packs a 2-bit type tag and a 30-bit local index into one
//! word, `(tag << 30) | index`. The kernel reinterprets the texel bits as
//! `u32` and unpacks with the same shifts as [`PrimitiveRef::decode`].

use bytemuck::{Pod, Zeroable};

use super::build::Bvh;
use super::node::{BvhNode, NodeId, NodeRecord, TEXELS_PER_NODE};
use crate::geom::{PrimitiveInfo, PrimitiveKind};
use crate::util::{Error, Result};

/// Bits reserved for the local primitive index.
pub const INDEX_BITS: u32 = 30;
/// Mask selecting the index bits of a packed reference.
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
/// Largest local index a reference can carry.
pub const MAX_PRIMITIVE_INDEX: usize = INDEX_MASK as usize;

/// Packed `(type, index)` primitive reference.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct PrimitiveRef(u32);

impl PrimitiveRef {
    /// Pack a reference. Indices that do not fit 30 bits are rejected.
    #[inline]
    pub fn encode(kind: PrimitiveKind, index: usize) -> Result<Self> {
        if index > MAX_PRIMITIVE_INDEX {
            return Err(Error::IndexOverflow { index });
        }
        Ok(Self((kind.tag() << INDEX_BITS) | index as u32))
    }

    /// Unpack a reference. Tag 3 is a consistency error.
    #[inline]
    pub fn decode(self) -> Result<(PrimitiveKind, u32)> {
        let kind = PrimitiveKind::from_tag(self.0 >> INDEX_BITS)?;
        Ok((kind, self.0 & INDEX_MASK))
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Flattened, upload-ready form of a [`Bvh`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedBvh {
    pub(crate) nodes: Vec<NodeRecord>,
    pub(crate) refs: Vec<PrimitiveRef>,
}

impl FlattenedBvh {
    #[inline]
    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    #[inline]
    pub fn refs(&self) -> &[PrimitiveRef] {
        &self.refs
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when no primitive is referenced. The root record of an empty
    /// tree has `prim_count = 0` and must not be traversed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Record `index`, range checked.
    pub fn record(&self, index: NodeId) -> Result<&NodeRecord> {
        self.nodes.get(index as usize).ok_or(Error::NodeOutOfRange {
            index: index as usize,
            count: self.nodes.len(),
        })
    }

    /// References owned by leaf record `rec`, range checked.
    pub fn leaf_slice(&self, rec: &NodeRecord) -> Result<&[PrimitiveRef]> {
        let first = rec.left_first as usize;
        let end = first + rec.prim_count as usize;
        self.refs.get(first..end).ok_or(Error::NodeOutOfRange {
            index: end,
            count: self.refs.len(),
        })
    }

    /// Decoded `(kind, index)` pairs of leaf `index`, empty for internal nodes.
    pub fn leaf_refs(&self, index: NodeId) -> Result<Vec<(PrimitiveKind, u32)>> {
        let rec = self.record(index)?;
        if !rec.is_leaf() {
            return Ok(Vec::new());
        }
        self.leaf_slice(rec)?.iter().map(|r| r.decode()).collect()
    }

    /// Node records as RGBA texels, `TEXELS_PER_NODE` per node.
    pub fn node_texels(&self) -> &[[f32; 4]] {
        bytemuck::cast_slice(&self.nodes)
    }

    /// Raw reference words.
    pub fn ref_bits(&self) -> &[u32] {
        bytemuck::cast_slice(&self.refs)
    }

    /// Number of texels the node array occupies.
    #[inline]
    pub fn node_texel_count(&self) -> usize {
        self.nodes.len() * TEXELS_PER_NODE
    }
}

impl Bvh {
    /// Flatten this tree for upload.
    pub fn flatten(&self) -> Result<FlattenedBvh> {
        flatten(&self.nodes, &self.primitives)
    }
}

/// Serialize a node arena into records and packed references.
///
/// Leaf reference ranges are laid out in node-array order.
#[tracing::instrument(skip_all, fields(nodes = nodes.len(), prims = infos.len()))]
pub fn flatten(nodes: &[BvhNode], infos: &[PrimitiveInfo]) -> Result<FlattenedBvh> {
    // Pass 1: leaf offsets (prefix sum of leaf sizes)
    let mut offsets = Vec::with_capacity(nodes.len());
    let mut total = 0usize;
    for node in nodes {
        offsets.push(total);
        total += node.primitives().len();
    }

    // Pass 2: records and references
    let mut records = Vec::with_capacity(nodes.len());
    let mut refs = Vec::with_capacity(total);
    for (i, node) in nodes.iter().enumerate() {
        match node {
            BvhNode::Internal { bounds, left, right } => {
                for &child in [left, right] {
                    if child as usize >= nodes.len() {
                        return Err(Error::NodeOutOfRange {
                            index: child as usize,
                            count: nodes.len(),
                        });
                    }
                }
                records.push(NodeRecord::internal(bounds, *left, *right));
            }
            BvhNode::Leaf { bounds, primitives } => {
                // A zero count decodes as internal; only the empty tree's root may carry one.
                if primitives.is_empty() && !(nodes.len() == 1 && infos.is_empty()) {
                    return Err(Error::malformed(format!("leaf {i} has no primitives")));
                }
                for &p in primitives {
                    let info = infos.get(p as usize).ok_or_else(|| {
                        Error::malformed(format!(
                            "leaf {i} references primitive record {p} of {}",
                            infos.len()
                        ))
                    })?;
                    refs.push(PrimitiveRef::encode(info.kind, info.local_index)?);
                }
                records.push(NodeRecord::leaf(
                    bounds,
                    offsets[i] as u32,
                    primitives.len() as u32,
                ));
            }
        }
    }

    tracing::debug!(records = records.len(), refs = refs.len(), "BVH flattened");
    Ok(FlattenedBvh {
        nodes: records,
        refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::build::{build_bvh, BuildOptions};
    use crate::bvh::node::LeafPrimitives;
    use crate::geom::{Primitive, Sphere};
    use crate::util::{Aabb, Vec3};

    fn sphere_infos(n: usize) -> Vec<PrimitiveInfo> {
        (0..n)
            .map(|i| {
                let s = Primitive::Sphere(Sphere::new(Vec3::new(i as f32 * 3.0, 0.0, 0.0), 1.0));
                PrimitiveInfo::new(&s, i)
            })
            .collect()
    }

    #[test]
    fn test_ref_packing() {
        let r = PrimitiveRef::encode(PrimitiveKind::Cylinder, 12345).unwrap();
        assert_eq!(r.bits(), (2 << 30) | 12345);
        assert_eq!(r.decode().unwrap(), (PrimitiveKind::Cylinder, 12345));

        let max = PrimitiveRef::encode(PrimitiveKind::Sphere, MAX_PRIMITIVE_INDEX).unwrap();
        assert_eq!(max.decode().unwrap(), (PrimitiveKind::Sphere, INDEX_MASK));
    }

    #[test]
    fn test_ref_overflow_fails() {
        let err = PrimitiveRef::encode(PrimitiveKind::Triangle, 1 << 30).unwrap_err();
        assert!(matches!(err, Error::IndexOverflow { index } if index == 1 << 30));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let r = PrimitiveRef::from_bits(3 << 30);
        assert!(matches!(r.decode(), Err(Error::UnknownPrimitiveTag(3))));
    }

    #[test]
    fn test_leaf_offsets_prefix_sum() {
        let bvh = build_bvh(
            sphere_infos(40),
            &BuildOptions {
                max_leaf_size: 3,
                max_depth: 32,
            },
        )
        .unwrap();
        let flat = bvh.flatten().unwrap();
        assert_eq!(flat.node_count(), bvh.node_count());
        assert_eq!(flat.refs().len(), 40);

        let mut expected = 0u32;
        for (node, rec) in bvh.nodes.iter().zip(flat.nodes()) {
            match node {
                BvhNode::Leaf { primitives, .. } => {
                    assert_eq!(rec.left_first, expected);
                    assert_eq!(rec.prim_count as usize, primitives.len());
                    expected += primitives.len() as u32;
                }
                BvhNode::Internal { left, right, .. } => {
                    assert_eq!(rec.prim_count, 0);
                    assert_eq!(rec.left_first, *left);
                    assert_eq!(rec.right_child, *right);
                }
            }
            assert_eq!(rec.bounds(), *node.bounds());
        }
    }

    #[test]
    fn test_leaf_refs_decode_to_local_indices() {
        let bvh = build_bvh(sphere_infos(3), &BuildOptions::default()).unwrap();
        let flat = bvh.flatten().unwrap();
        let mut refs = flat.leaf_refs(0).unwrap();
        refs.sort();
        assert_eq!(
            refs,
            vec![
                (PrimitiveKind::Sphere, 0),
                (PrimitiveKind::Sphere, 1),
                (PrimitiveKind::Sphere, 2)
            ]
        );
    }

    #[test]
    fn test_empty_tree_flattens_to_one_record() {
        let bvh = build_bvh(vec![], &BuildOptions::default()).unwrap();
        let flat = bvh.flatten().unwrap();
        assert_eq!(flat.node_count(), 1);
        assert!(flat.is_empty());
        assert_eq!(flat.node_texels().len(), TEXELS_PER_NODE);
    }

    #[test]
    fn test_bad_leaf_is_internal_error() {
        let nodes = vec![BvhNode::Leaf {
            bounds: Aabb::DEGENERATE,
            primitives: LeafPrimitives::from_slice(&[4]),
        }];
        let err = flatten(&nodes, &sphere_infos(2)).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_bad_child_is_internal_error() {
        let nodes = vec![BvhNode::Internal {
            bounds: Aabb::DEGENERATE,
            left: 1,
            right: 2,
        }];
        let err = flatten(&nodes, &[]).unwrap_err();
        assert!(matches!(err, Error::NodeOutOfRange { index: 1, count: 1 }));
    }

    #[test]
    fn test_empty_leaf_rejected() {
        let nodes = vec![
            BvhNode::Internal {
                bounds: Aabb::new(Vec3::splat(-1.0), Vec3::ONE),
                left: 1,
                right: 2,
            },
            BvhNode::Leaf {
                bounds: Aabb::new(Vec3::splat(-1.0), Vec3::ONE),
                primitives: LeafPrimitives::from_slice(&[0]),
            },
            BvhNode::Leaf {
                bounds: Aabb::DEGENERATE,
                primitives: LeafPrimitives::new(),
            },
        ];
        let err = flatten(&nodes, &sphere_infos(1)).unwrap_err();
        assert!(matches!(err, Error::MalformedTree(_)));
        assert!(err.is_internal());

        // A childless root over primitives is just as wrong
        let root_only = &nodes[2..];
        assert!(matches!(flatten(root_only, &sphere_infos(1)), Err(Error::MalformedTree(_))));
    }
}
