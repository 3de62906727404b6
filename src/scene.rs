//! Scene: explicit owner of geometry, tree and flattened form.
//!
//! A scene is rebuilt as a whole whenever its geometry changes. Queries take
//! `&self`, so any number of them can run at once between rebuilds.

use rayon::prelude::*;

use crate::bvh::{build_gpu_data, BuildOptions, Bvh, BvhStats, FlattenedBvh, GpuSceneData};
use crate::geom::Geometry;
use crate::settings::{Settings, TraversalMode};
use crate::trace::{self, ClipPlane, Hit, Ray};
use crate::util::Result;

/// Geometry plus its acceleration structures.
#[derive(Debug, Clone)]
pub struct Scene {
    geometry: Geometry,
    bvh: Bvh,
    flat: FlattenedBvh,
    settings: Settings,
}

impl Scene {
    /// Validate settings and geometry, build and flatten the tree.
    #[tracing::instrument(skip_all)]
    pub fn new(geometry: Geometry, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let bvh = Bvh::build(&geometry, &settings.build_options())?;
        let flat = bvh.flatten()?;
        tracing::debug!(
            primitives = geometry.primitive_count(),
            nodes = bvh.node_count(),
            "scene built"
        );
        Ok(Self {
            geometry,
            bvh,
            flat,
            settings,
        })
    }

    /// Replace the geometry and rebuild everything. On error the scene is
    /// left unchanged.
    pub fn rebuild(&mut self, geometry: Geometry) -> Result<()> {
        *self = Self::new(geometry, self.settings.clone())?;
        Ok(())
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn flattened(&self) -> &FlattenedBvh {
        &self.flat
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn build_options(&self) -> BuildOptions {
        self.settings.build_options()
    }

    pub fn stats(&self) -> Result<BvhStats> {
        self.bvh.stats()
    }

    /// Pack all arrays for the render backend.
    pub fn gpu_data(&self) -> Result<GpuSceneData> {
        build_gpu_data(&self.flat, &self.geometry, &self.settings.texture_limits())
    }

    /// Nearest hit using the configured traversal mode.
    pub fn closest_hit(&self, ray: &Ray, t_min: f32, clip: Option<&ClipPlane>) -> Result<Option<Hit>> {
        match self.settings.traversal {
            TraversalMode::Bvh => trace::closest_hit(&self.bvh, &self.geometry, ray, t_min, clip),
            TraversalMode::Flattened => trace::closest_hit(&self.flat, &self.geometry, ray, t_min, clip),
            TraversalMode::BruteForce => trace::closest_hit_brute(&self.geometry, ray, t_min, clip),
        }
    }

    /// Occlusion test using the configured traversal mode.
    pub fn any_hit(&self, ray: &Ray, t_max: f32, t_min: f32, clip: Option<&ClipPlane>) -> Result<bool> {
        match self.settings.traversal {
            TraversalMode::Bvh => trace::any_hit(&self.bvh, &self.geometry, ray, t_max, t_min, clip),
            TraversalMode::Flattened => trace::any_hit(&self.flat, &self.geometry, ray, t_max, t_min, clip),
            TraversalMode::BruteForce => trace::any_hit_brute(&self.geometry, ray, t_max, t_min, clip),
        }
    }

    /// Object picking: nearest hit in front of the ray origin.
    pub fn pick(&self, ray: &Ray, clip: Option<&ClipPlane>) -> Result<Option<Hit>> {
        self.closest_hit(ray, 0.0, clip)
    }

    /// Closest hits for many rays in parallel, in input order.
    pub fn closest_hits(&self, rays: &[Ray], t_min: f32, clip: Option<&ClipPlane>) -> Result<Vec<Option<Hit>>> {
        rays.par_iter()
            .map(|ray| self.closest_hit(ray, t_min, clip))
            .collect()
    }
}
