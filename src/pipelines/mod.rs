//! Pipeline permutations.
//!
//! A renderable object never builds a pipeline directly. Its
//! [`FeatureConfiguration`] and the vertex format of its data are mapped to a
//! [`PipelineVariant`], and the [`PipelineCache`] hands out one device pipeline
//! per distinct variant.
//!
//! - `object` creates wgpu render pipelines for a variant
//! - `object.wgsl` / `sky.wgsl` are the shader sources, specialised by constants

use std::collections::HashMap;

use crate::{
    data_structures::{
        feature::{FeatureConfiguration, MAX_LIGHTS},
        object_data::VertexFormat,
    },
    error::LoadError,
    gpu::{GpuDevice, PipelineId},
};

pub mod object;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Object,
    Sky,
}

/// The value a pipeline is keyed by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineVariant {
    pub kind: PipelineKind,
    pub light_count: u8,
    pub texture: bool,
    pub normal_map: bool,
    pub reflect: bool,
    pub skinned: bool,
    pub tessellation: bool,
    pub vertex_format: VertexFormat,
}

impl PipelineVariant {
    const SKY_ID: u32 = 1 << 9;

    /// Maps a feature configuration and the data it is applied to onto a
    /// variant, rejecting combinations no variant can draw.
    pub fn select(
        features: &FeatureConfiguration,
        vertex_format: VertexFormat,
    ) -> Result<Self, LoadError> {
        features.validate()?;
        if features.normal_map_enable && !vertex_format.has_tangents() {
            return Err(LoadError::UnsupportedConfiguration(
                "normal mapping requires vertices with tangents".into(),
            ));
        }
        if features.skinned != (vertex_format == VertexFormat::Skinned) {
            return Err(LoadError::UnsupportedConfiguration(format!(
                "skinned = {} does not match {:?} vertices",
                features.skinned, vertex_format
            )));
        }
        Ok(Self {
            kind: PipelineKind::Object,
            light_count: features.light_count.min(MAX_LIGHTS),
            texture: features.texture_enable,
            normal_map: features.normal_map_enable,
            reflect: features.reflect_enable,
            skinned: features.skinned,
            tessellation: features.tessellation_enable(),
            vertex_format,
        })
    }

    /// The background cube drawn behind everything.
    pub fn sky() -> Self {
        Self {
            kind: PipelineKind::Sky,
            light_count: 0,
            texture: false,
            normal_map: false,
            reflect: false,
            skinned: false,
            tessellation: false,
            vertex_format: VertexFormat::Basic,
        }
    }

    /// Stable permutation id: two variants share an id exactly when they are
    /// equal.
    pub fn id(&self) -> u32 {
        if self.kind == PipelineKind::Sky {
            return Self::SKY_ID;
        }
        let format = match self.vertex_format {
            VertexFormat::Basic => 0,
            VertexFormat::Tangent => 1,
            VertexFormat::Skinned => 2,
        };
        (self.light_count as u32 & 0b11)
            | (self.texture as u32) << 2
            | (self.normal_map as u32) << 3
            | (self.reflect as u32) << 4
            | (self.skinned as u32) << 5
            | (self.tessellation as u32) << 6
            | format << 7
    }
}

/// One device pipeline per variant.
#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineVariant, PipelineId>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        device: &mut dyn GpuDevice,
        variant: &PipelineVariant,
    ) -> Result<PipelineId, LoadError> {
        if let Some(id) = self.pipelines.get(variant) {
            return Ok(*id);
        }
        let id = device.create_pipeline(variant)?;
        log::debug!("created pipeline permutation {:#05x}", variant.id());
        self.pipelines.insert(*variant, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for (_, id) in self.pipelines.drain() {
            device.destroy_pipeline(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_structures::feature::TessellationDesc, gpu::HeadlessDevice};

    #[test]
    fn selection_is_deterministic_and_ids_are_unique() {
        let lit = FeatureConfiguration::lit(3).with_texture();
        let a = PipelineVariant::select(&lit, VertexFormat::Basic).unwrap();
        let b = PipelineVariant::select(&lit, VertexFormat::Basic).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());

        let tangent = PipelineVariant::select(&lit, VertexFormat::Tangent).unwrap();
        assert_ne!(a.id(), tangent.id());
        assert_ne!(a.id(), PipelineVariant::sky().id());
    }

    #[test]
    fn normal_mapping_needs_tangents() {
        let features = FeatureConfiguration::lit(1).with_texture().with_normal_map();
        assert!(matches!(
            PipelineVariant::select(&features, VertexFormat::Basic),
            Err(LoadError::UnsupportedConfiguration(_))
        ));
        assert!(PipelineVariant::select(&features, VertexFormat::Tangent).is_ok());
    }

    #[test]
    fn tessellation_without_normal_map_is_rejected() {
        let features = FeatureConfiguration::lit(3)
            .with_texture()
            .with_tessellation(TessellationDesc::default());
        assert!(matches!(
            PipelineVariant::select(&features, VertexFormat::Tangent),
            Err(LoadError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn skinning_must_match_the_vertex_format() {
        let skinned = FeatureConfiguration::lit(3).with_skinning(true);
        assert!(PipelineVariant::select(&skinned, VertexFormat::Tangent).is_err());
        assert!(PipelineVariant::select(&skinned, VertexFormat::Skinned).is_ok());
        let plain = FeatureConfiguration::lit(3);
        assert!(PipelineVariant::select(&plain, VertexFormat::Skinned).is_err());
    }

    #[test]
    fn cache_creates_each_variant_once() {
        let mut device = HeadlessDevice::new();
        let mut cache = PipelineCache::new();
        let variant =
            PipelineVariant::select(&FeatureConfiguration::lit(2), VertexFormat::Basic).unwrap();
        let first = cache.get_or_create(&mut device, &variant).unwrap();
        let second = cache.get_or_create(&mut device, &variant).unwrap();
        assert_eq!(first, second);
        assert_eq!(device.live_resources().pipelines, 1);

        cache.release(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_resources().pipelines, 0);
    }
}
