//! Scene geometry: a shared position buffer plus analytic primitives.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::primitive::{Cylinder, Primitive, PrimitiveInfo, PrimitiveKind, Sphere, Triangle};
use crate::util::{Error, Result, Vec3};

/// All primitives of one scene.
///
/// Triangles index into `positions` three at a time. Spheres and cylinders
/// are stored directly. The JSON form of this struct is the scene file the
/// CLI reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub spheres: Vec<Sphere>,
    pub cylinders: Vec<Cylinder>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triangle mesh with no analytic primitives.
    pub fn from_triangles(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            ..Self::default()
        }
    }

    pub fn with_spheres(mut self, spheres: Vec<Sphere>) -> Self {
        self.spheres = spheres;
        self
    }

    pub fn with_cylinders(mut self, cylinders: Vec<Cylinder>) -> Self {
        self.cylinders = cylinders;
        self
    }

    /// Load a JSON scene file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write this geometry as a JSON scene file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of primitives of one kind.
    pub fn count(&self, kind: PrimitiveKind) -> usize {
        match kind {
            PrimitiveKind::Triangle => self.triangle_count(),
            PrimitiveKind::Sphere => self.spheres.len(),
            PrimitiveKind::Cylinder => self.cylinders.len(),
        }
    }

    /// Number of primitives of all kinds.
    pub fn primitive_count(&self) -> usize {
        PrimitiveKind::ALL.iter().map(|&k| self.count(k)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.primitive_count() == 0
    }

    /// Reject index buffers that do not describe whole, addressable triangles.
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(Error::InvalidIndexCount {
                len: self.indices.len(),
            });
        }
        let count = self.positions.len();
        for (i, &vertex) in self.indices.iter().enumerate() {
            if vertex as usize >= count {
                return Err(Error::VertexOutOfRange {
                    triangle: i / 3,
                    vertex,
                    count,
                });
            }
        }
        Ok(())
    }

    /// Resolve triangle `index` to its vertex positions.
    pub fn triangle(&self, index: usize) -> Result<Triangle> {
        let out_of_range = || Error::PrimitiveOutOfRange {
            kind: PrimitiveKind::Triangle,
            index: index as u32,
            count: self.triangle_count(),
        };
        let tri = self
            .indices
            .get(index * 3..index * 3 + 3)
            .ok_or_else(out_of_range)?;
        let vertex = |i: u32| self.positions.get(i as usize).copied().ok_or_else(out_of_range);
        Ok(Triangle::new(vertex(tri[0])?, vertex(tri[1])?, vertex(tri[2])?))
    }

    /// Resolve a (kind, local index) pair. Out-of-range indices mean the
    /// caller's tree does not belong to this geometry.
    pub fn primitive(&self, kind: PrimitiveKind, index: usize) -> Result<Primitive> {
        let out_of_range = || Error::PrimitiveOutOfRange {
            kind,
            index: index as u32,
            count: self.count(kind),
        };
        match kind {
            PrimitiveKind::Triangle => self.triangle(index).map(Primitive::Triangle),
            PrimitiveKind::Sphere => self
                .spheres
                .get(index)
                .map(|s| Primitive::Sphere(*s))
                .ok_or_else(out_of_range),
            PrimitiveKind::Cylinder => self
                .cylinders
                .get(index)
                .map(|c| Primitive::Cylinder(*c))
                .ok_or_else(out_of_range),
        }
    }

    /// Iterate every primitive in build order: triangles, spheres, cylinders.
    pub fn primitives(&self) -> impl Iterator<Item = (usize, Primitive)> + '_ {
        let triangles = self.indices.chunks_exact(3).enumerate().filter_map(|(i, tri)| {
            let v = |k: usize| self.positions.get(tri[k] as usize).copied();
            Some((i, Primitive::Triangle(Triangle::new(v(0)?, v(1)?, v(2)?))))
        });
        let spheres = self
            .spheres
            .iter()
            .enumerate()
            .map(|(i, s)| (i, Primitive::Sphere(*s)));
        let cylinders = self
            .cylinders
            .iter()
            .enumerate()
            .map(|(i, c)| (i, Primitive::Cylinder(*c)));
        triangles.chain(spheres).chain(cylinders)
    }

    /// Validate and compute the builder's per-primitive data.
    #[tracing::instrument(skip_all, fields(
        triangles = self.triangle_count(),
        spheres = self.spheres.len(),
        cylinders = self.cylinders.len(),
    ))]
    pub fn primitive_infos(&self) -> Result<Vec<PrimitiveInfo>> {
        self.validate()?;
        Ok(self
            .primitives()
            .map(|(local, prim)| PrimitiveInfo::new(&prim, local))
            .collect())
    }
}
