//! Explicit-stack BVH traversal: closest hit and any hit.
//!
//! Traversal is generic over [`BvhLayout`], implemented by the in-memory
//! [`Bvh`] and by [`FlattenedBvh`]. The flattened implementation decodes
//! node texels and packed references the way the GPU kernel does, so the
//! CPU runs the same decode path the kernel ports.
//!
//! Results do not depend on the order children are visited in. Queries are
//! read-only and may run concurrently over one tree.

use std::cell::Cell;

use smallvec::{smallvec, SmallVec};

use super::intersect::{intersect_primitive, ray_aabb};
use super::ray::{ClipPlane, Hit, Ray};
use crate::bvh::{Bvh, BvhNode, FlattenedBvh, NodeId, NodeRecord, PrimitiveRef, TEXELS_PER_NODE};
use crate::geom::{Geometry, Primitive, PrimitiveInfo, PrimitiveKind};
use crate::util::{Aabb, Error, Result};

/// Stack depth kept inline before spilling to the heap.
const STACK_INLINE: usize = 64;

/// Primitive references of one leaf.
#[derive(Debug, Clone, Copy)]
pub enum LeafRefs<'a> {
    /// Slots into the in-memory tree's primitive records.
    Indexed {
        slots: &'a [u32],
        infos: &'a [PrimitiveInfo],
    },
    /// Packed `(type << 30) | index` words.
    Packed(&'a [PrimitiveRef]),
}

impl LeafRefs<'_> {
    pub fn len(&self) -> usize {
        match self {
            LeafRefs::Indexed { slots, .. } => slots.len(),
            LeafRefs::Packed(refs) => refs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded `(kind, local index)` of entry `i`.
    pub fn get(&self, i: usize) -> Result<(PrimitiveKind, u32)> {
        let out_of_range = || Error::NodeOutOfRange {
            index: i,
            count: self.len(),
        };
        match self {
            LeafRefs::Indexed { slots, infos } => {
                let slot = *slots.get(i).ok_or_else(out_of_range)?;
                let info = infos
                    .get(slot as usize)
                    .ok_or_else(|| Error::malformed(format!("leaf slot {slot} of {}", infos.len())))?;
                Ok((info.kind, info.local_index as u32))
            }
            LeafRefs::Packed(refs) => refs.get(i).ok_or_else(out_of_range)?.decode(),
        }
    }
}

/// One node as traversal sees it.
#[derive(Debug, Clone, Copy)]
pub enum NodeView<'a> {
    Internal {
        bounds: Aabb,
        left: NodeId,
        right: NodeId,
    },
    Leaf {
        bounds: Aabb,
        refs: LeafRefs<'a>,
    },
}

impl NodeView<'_> {
    #[inline]
    pub fn bounds(&self) -> &Aabb {
        match self {
            NodeView::Internal { bounds, .. } | NodeView::Leaf { bounds, .. } => bounds,
        }
    }
}

/// A tree traversal can walk.
pub trait BvhLayout {
    /// True when the tree indexes no primitives. The root of an empty tree
    /// is never read.
    fn is_empty(&self) -> bool;

    fn node_count(&self) -> usize;

    /// Node `index`, range checked.
    fn node(&self, index: NodeId) -> Result<NodeView<'_>>;
}

impl BvhLayout for Bvh {
    fn is_empty(&self) -> bool {
        Bvh::is_empty(self)
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, index: NodeId) -> Result<NodeView<'_>> {
        let node = self.nodes.get(index as usize).ok_or(Error::NodeOutOfRange {
            index: index as usize,
            count: self.nodes.len(),
        })?;
        Ok(match node {
            BvhNode::Internal { bounds, left, right } => NodeView::Internal {
                bounds: *bounds,
                left: *left,
                right: *right,
            },
            BvhNode::Leaf { bounds, primitives } => NodeView::Leaf {
                bounds: *bounds,
                refs: LeafRefs::Indexed {
                    slots: primitives,
                    infos: &self.primitives,
                },
            },
        })
    }
}

impl BvhLayout for FlattenedBvh {
    fn is_empty(&self) -> bool {
        FlattenedBvh::is_empty(self)
    }

    fn node_count(&self) -> usize {
        self.nodes().len()
    }

    fn node(&self, index: NodeId) -> Result<NodeView<'_>> {
        let base = index as usize * TEXELS_PER_NODE;
        let texels = self
            .node_texels()
            .get(base..base + TEXELS_PER_NODE)
            .ok_or(Error::NodeOutOfRange {
                index: index as usize,
                count: self.node_count(),
            })?;
        let rec = NodeRecord::from_texels([texels[0], texels[1], texels[2]]);
        if rec.is_leaf() {
            Ok(NodeView::Leaf {
                bounds: rec.bounds(),
                refs: LeafRefs::Packed(self.leaf_slice(&rec)?),
            })
        } else {
            Ok(NodeView::Internal {
                bounds: rec.bounds(),
                left: rec.left_first,
                right: rec.right_child,
            })
        }
    }
}

/// Walk every node whose box the ray enters before `far(..)`, calling
/// `visit` on each leaf primitive. `visit` returns `true` to stop.
fn walk<L, F, V>(layout: &L, geometry: &Geometry, ray: &Ray, t_min: f32, far: F, mut visit: V) -> Result<()>
where
    L: BvhLayout + ?Sized,
    F: Fn() -> f32,
    V: FnMut(PrimitiveKind, u32, &Primitive) -> bool,
{
    if layout.is_empty() {
        return Ok(());
    }

    let limit = layout.node_count();
    let mut visited = 0usize;
    let mut stack: SmallVec<[NodeId; STACK_INLINE]> = smallvec![0];

    while let Some(idx) = stack.pop() {
        // Each node has one parent, so a sound tree pops every node at most once.
        visited += 1;
        if visited > limit {
            return Err(Error::malformed(format!("traversal visited more than {limit} nodes")));
        }

        let node = layout.node(idx)?;
        if ray_aabb(ray, node.bounds(), t_min, far()).is_none() {
            continue;
        }
        match node {
            NodeView::Internal { left, right, .. } => {
                stack.push(right);
                stack.push(left);
            }
            NodeView::Leaf { refs, .. } => {
                for i in 0..refs.len() {
                    let (kind, index) = refs.get(i)?;
                    let prim = geometry.primitive(kind, index as usize)?;
                    if visit(kind, index, &prim) {
                        return Ok(());
                    }
                }
            }
        }
    }
    Ok(())
}

/// Nearest hit with `t > t_min` accepted by `clip`.
///
/// `Ok(None)` means no hit. `Err` means the tree and `geometry` disagree.
pub fn closest_hit<L: BvhLayout + ?Sized>(
    layout: &L,
    geometry: &Geometry,
    ray: &Ray,
    t_min: f32,
    clip: Option<&ClipPlane>,
) -> Result<Option<Hit>> {
    let best = Cell::new(None::<Hit>);
    let far = || best.get().map_or(f32::INFINITY, |h| h.t);
    walk(layout, geometry, ray, t_min, far, |kind, index, prim| {
        if let Some((t, detail)) = intersect_primitive(prim, ray, t_min, far(), clip) {
            best.set(Some(Hit { t, kind, index, detail }));
        }
        false
    })?;
    Ok(best.get())
}

/// True when any primitive is hit with `t_min < t < t_max` and accepted by `clip`.
pub fn any_hit<L: BvhLayout + ?Sized>(
    layout: &L,
    geometry: &Geometry,
    ray: &Ray,
    t_max: f32,
    t_min: f32,
    clip: Option<&ClipPlane>,
) -> Result<bool> {
    let mut found = false;
    walk(layout, geometry, ray, t_min, || t_max, |_, _, prim| {
        found = intersect_primitive(prim, ray, t_min, t_max, clip).is_some();
        found
    })?;
    Ok(found)
}

/// Iterate every primitive of `geometry` by kind and local index.
fn each_primitive(
    geometry: &Geometry,
    mut visit: impl FnMut(PrimitiveKind, u32, &Primitive) -> bool,
) -> Result<()> {
    for kind in PrimitiveKind::ALL {
        for index in 0..geometry.count(kind) {
            let prim = geometry.primitive(kind, index)?;
            if visit(kind, index as u32, &prim) {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// [`closest_hit`] without a tree: tests every primitive.
pub fn closest_hit_brute(
    geometry: &Geometry,
    ray: &Ray,
    t_min: f32,
    clip: Option<&ClipPlane>,
) -> Result<Option<Hit>> {
    let mut best: Option<Hit> = None;
    each_primitive(geometry, |kind, index, prim| {
        let far = best.map_or(f32::INFINITY, |h| h.t);
        if let Some((t, detail)) = intersect_primitive(prim, ray, t_min, far, clip) {
            best = Some(Hit { t, kind, index, detail });
        }
        false
    })?;
    Ok(best)
}

/// [`any_hit`] without a tree: tests every primitive.
pub fn any_hit_brute(
    geometry: &Geometry,
    ray: &Ray,
    t_max: f32,
    t_min: f32,
    clip: Option<&ClipPlane>,
) -> Result<bool> {
    let mut found = false;
    each_primitive(geometry, |_, _, prim| {
        found = intersect_primitive(prim, ray, t_min, t_max, clip).is_some();
        found
    })?;
    Ok(found)
}
