//! Binned SAH BVH builder.
//!
//! Top-down construction over a set of [`PrimitiveInfo`]. Nodes go into an
//! append-only arena (index 0 = root, children always after their parent).
//! Splits are chosen by evaluating the Surface Area Heuristic at the 7 bin
//! boundaries of 8 centroid bins on each axis.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::node::{BvhNode, LeafPrimitives, NodeId};
use crate::geom::{Geometry, PrimitiveInfo};
use crate::util::{Aabb, Error, Result, Vec3};

/// Number of SAH bins per axis.
pub const NUM_BINS: usize = 8;

/// Largest primitive count whose `2n - 1` nodes stay addressable by [`NodeId`].
pub const MAX_BUILD_PRIMITIVES: usize = (NodeId::MAX / 2) as usize;

/// Builder limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Sets of at most this many primitives become leaves.
    pub max_leaf_size: usize,
    /// Nodes at this depth become leaves regardless of size.
    pub max_depth: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            max_depth: 32,
        }
    }
}

/// Built tree: node arena plus the primitive data its leaves index.
#[derive(Debug, Clone)]
pub struct Bvh {
    /// Flat node array (index 0 = root).
    pub nodes: Vec<BvhNode>,
    /// Per-primitive data, in build order. Leaves hold indices into this.
    pub primitives: Vec<PrimitiveInfo>,
}

/// Shape summary of a built tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BvhStats {
    pub nodes: usize,
    pub leaves: usize,
    pub internal: usize,
    /// Depth of the deepest node (root = 0).
    pub max_depth: usize,
    pub max_leaf_primitives: usize,
    pub primitives: usize,
}

/// SAH bin for evaluating split candidates.
#[derive(Clone, Copy)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

impl Bin {
    const EMPTY: Self = Self {
        bounds: Aabb::EMPTY,
        count: 0,
    };
}

/// Winning split candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Split {
    axis: usize,
    /// Centroids below this value go left.
    position: f32,
    cost: f32,
}

impl Bvh {
    /// Validate `geometry` and build a tree over all of its primitives.
    pub fn build(geometry: &Geometry, options: &BuildOptions) -> Result<Self> {
        let infos = geometry.primitive_infos()?;
        build_bvh(infos, options)
    }

    /// Triangle-only entry point. Produces exactly the tree [`Bvh::build`]
    /// produces for the same mesh with no spheres or cylinders.
    pub fn build_triangles(positions: &[Vec3], indices: &[u32], options: &BuildOptions) -> Result<Self> {
        let geometry = Geometry::from_triangles(positions.to_vec(), indices.to_vec());
        Self::build(&geometry, options)
    }

    #[inline]
    pub fn root(&self) -> &BvhNode {
        &self.nodes[0]
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree indexes no primitives.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Walk the tree and summarize its shape.
    ///
    /// Fails with an internal error when a child index is out of range or the
    /// walk pops more nodes than the arena holds (a cycle).
    pub fn stats(&self) -> Result<BvhStats> {
        let limit = self.nodes.len();
        let mut stats = BvhStats {
            nodes: limit,
            primitives: self.primitives.len(),
            ..Default::default()
        };
        let mut visited = 0usize;
        let mut stack: SmallVec<[(NodeId, usize); 64]> = SmallVec::new();
        stack.push((0, 0));
        while let Some((idx, depth)) = stack.pop() {
            visited += 1;
            if visited > limit {
                return Err(Error::malformed(format!("stats walk visited more than {limit} nodes")));
            }
            let node = self.nodes.get(idx as usize).ok_or(Error::NodeOutOfRange {
                index: idx as usize,
                count: limit,
            })?;
            stats.max_depth = stats.max_depth.max(depth);
            match node {
                BvhNode::Internal { left, right, .. } => {
                    stats.internal += 1;
                    stack.push((*right, depth + 1));
                    stack.push((*left, depth + 1));
                }
                BvhNode::Leaf { primitives, .. } => {
                    stats.leaves += 1;
                    stats.max_leaf_primitives = stats.max_leaf_primitives.max(primitives.len());
                }
            }
        }
        Ok(stats)
    }
}

/// Build a BVH over precomputed primitive data using binned SAH.
///
/// Zero primitives yield a single leaf with degenerate bounds, and sets that
/// cannot be split become leaves. Only fails with [`Error::IndexOverflow`]
/// when the input exceeds [`MAX_BUILD_PRIMITIVES`].
#[tracing::instrument(skip_all, fields(prim_count = infos.len()))]
pub fn build_bvh(infos: Vec<PrimitiveInfo>, options: &BuildOptions) -> Result<Bvh> {
    let n = infos.len();
    check_primitive_count(n)?;
    if n == 0 {
        return Ok(Bvh {
            nodes: vec![BvhNode::Leaf {
                bounds: Aabb::DEGENERATE,
                primitives: LeafPrimitives::new(),
            }],
            primitives: infos,
        });
    }

    // Working index array (reordered by partitioning)
    let mut indices: Vec<u32> = (0..n as u32).collect();

    // Worst case: 2*n - 1 nodes for a full binary tree
    let mut nodes: Vec<BvhNode> = Vec::with_capacity(2 * n);
    nodes.push(placeholder());

    struct Task {
        node_idx: usize,
        start: usize,
        end: usize, // exclusive
        depth: usize,
    }

    let mut stack = vec![Task {
        node_idx: 0,
        start: 0,
        end: n,
        depth: 0,
    }];
    let mut median_splits = 0usize;
    let mut depth_limited = 0usize;

    while let Some(task) = stack.pop() {
        let (start, end) = (task.start, task.end);
        let count = end - start;
        let range = &indices[start..end];

        let mut node_bounds = Aabb::EMPTY;
        for &idx in range {
            node_bounds.expand_by_box(&infos[idx as usize].bounds);
        }

        let make_leaf = |range: &[u32]| BvhNode::Leaf {
            bounds: node_bounds,
            primitives: LeafPrimitives::from_slice(range),
        };

        if count <= options.max_leaf_size {
            nodes[task.node_idx] = make_leaf(range);
            continue;
        }
        if task.depth >= options.max_depth {
            depth_limited += 1;
            nodes[task.node_idx] = make_leaf(range);
            continue;
        }

        let mut centroid_bounds = Aabb::EMPTY;
        for &idx in range {
            centroid_bounds.expand_by_point(infos[idx as usize].centroid);
        }

        // No split with both sides populated: all centroids coincide.
        let Some(split) = find_best_split(range, &infos, &centroid_bounds) else {
            nodes[task.node_idx] = make_leaf(range);
            continue;
        };

        let mid = stable_partition(&mut indices[start..end], |&idx| {
            infos[idx as usize].centroid[split.axis] < split.position
        }) + start;

        // Skewed centroids can put everything on one side of the boundary
        // even though the bins did not. Split the list in half instead.
        let mid = if mid == start || mid == end {
            median_splits += 1;
            start + count / 2
        } else {
            mid
        };

        let left_idx = nodes.len();
        let right_idx = left_idx + 1;
        nodes.push(placeholder());
        nodes.push(placeholder());

        nodes[task.node_idx] = BvhNode::Internal {
            bounds: node_bounds,
            left: left_idx as NodeId,
            right: right_idx as NodeId,
        };

        // Right first so the left subtree is processed first
        stack.push(Task {
            node_idx: right_idx,
            start: mid,
            end,
            depth: task.depth + 1,
        });
        stack.push(Task {
            node_idx: left_idx,
            start,
            end: mid,
            depth: task.depth + 1,
        });
    }

    if median_splits > 0 {
        tracing::warn!(median_splits, "SAH partition was one-sided; used median split");
    }
    if depth_limited > 0 {
        tracing::warn!(depth_limited, max_depth = options.max_depth, "leaves forced by depth limit");
    }
    tracing::debug!(nodes = nodes.len(), "BVH built");

    Ok(Bvh {
        nodes,
        primitives: infos,
    })
}

/// Node and slot indices are `u32`; larger inputs would truncate.
fn check_primitive_count(n: usize) -> Result<()> {
    if n > MAX_BUILD_PRIMITIVES {
        return Err(Error::IndexOverflow { index: n });
    }
    Ok(())
}

fn placeholder() -> BvhNode {
    BvhNode::Leaf {
        bounds: Aabb::EMPTY,
        primitives: LeafPrimitives::new(),
    }
}

/// SAH binned split search across all 3 axes.
///
/// Cost of boundary `i` is `area(left) * left_count + area(right) * right_count`.
/// Boundaries with an empty side are skipped; ties keep the first candidate.
fn find_best_split(indices: &[u32], infos: &[PrimitiveInfo], centroid_bounds: &Aabb) -> Option<Split> {
    let mut best: Option<Split> = None;

    for axis in 0..3 {
        let cmin = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - cmin;
        // A flat axis puts every centroid in bin 0, so no boundary qualifies.
        let scale = if extent > 0.0 { NUM_BINS as f32 / extent } else { 0.0 };

        let mut bins = [Bin::EMPTY; NUM_BINS];
        for &idx in indices {
            let info = &infos[idx as usize];
            let bin = bin_index(info.centroid[axis], cmin, scale);
            bins[bin].bounds.expand_by_box(&info.bounds);
            bins[bin].count += 1;
        }

        // Sweep from left: prefix areas and counts
        let mut left_area = [0.0f32; NUM_BINS - 1];
        let mut left_count = [0usize; NUM_BINS - 1];
        let mut sweep = Aabb::EMPTY;
        let mut sweep_count = 0;
        for i in 0..NUM_BINS - 1 {
            sweep.expand_by_box(&bins[i].bounds);
            sweep_count += bins[i].count;
            left_area[i] = sweep.surface_area();
            left_count[i] = sweep_count;
        }

        // Sweep from right
        let mut right_area = [0.0f32; NUM_BINS - 1];
        let mut right_count = [0usize; NUM_BINS - 1];
        sweep = Aabb::EMPTY;
        sweep_count = 0;
        for i in (1..NUM_BINS).rev() {
            sweep.expand_by_box(&bins[i].bounds);
            sweep_count += bins[i].count;
            right_area[i - 1] = sweep.surface_area();
            right_count[i - 1] = sweep_count;
        }

        for i in 0..NUM_BINS - 1 {
            if left_count[i] == 0 || right_count[i] == 0 {
                continue;
            }
            let cost = left_area[i] * left_count[i] as f32 + right_area[i] * right_count[i] as f32;
            if best.map_or(true, |b| cost < b.cost) {
                best = Some(Split {
                    axis,
                    position: cmin + ((i + 1) as f32 / NUM_BINS as f32) * extent,
                    cost,
                });
            }
        }
    }

    best
}

/// `floor((c - min) * scale)` clamped into `[0, NUM_BINS - 1]`.
#[inline]
fn bin_index(centroid: f32, cmin: f32, scale: f32) -> usize {
    let bin = ((centroid - cmin) * scale).floor();
    if bin > 0.0 {
        (bin as usize).min(NUM_BINS - 1)
    } else {
        0
    }
}

/// Order-preserving partition. Returns the count of elements where `pred` holds.
fn stable_partition<T: Copy, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let (left, right): (Vec<T>, Vec<T>) = slice.iter().copied().partition(|v| pred(v));
    let mid = left.len();
    slice[..mid].copy_from_slice(&left);
    slice[mid..].copy_from_slice(&right);
    mid
}
