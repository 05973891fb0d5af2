//! Logical (CPU-side) loading of renderable objects.
//!
//! Preparing an object parses its geometry, decodes every texture it refers to
//! and selects its pipeline variant. None of this touches the device, so it can
//! run on a worker thread; the device resources are created from the prepared
//! [`LogicalObject`] later, on the render thread.

use std::collections::VecDeque;

use cgmath::Matrix4;

use crate::{
    animation::AnimationController,
    data_structures::{
        feature::FeatureConfiguration,
        light::Material,
        object_data::{AttributeArray, ObjectData, RenderUnit, VertexData},
    },
    error::LoadError,
    gpu::{ColorSpace, TextureSource},
    pipelines::{PipelineKind, PipelineVariant},
    resources::{AssetRoot, decode_cube_strip, load_obj, load_skinned_gltf, load_text_mesh, load_texture},
};

/// Lifecycle of a renderable object.
///
/// Objects only move forward through these states, except for a device loss or
/// an explicit release which drops them back to `LogicallyInitialized`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    #[default]
    Uninitialized,
    LogicallyInitialized,
    DeviceResourcesLoading,
    Ready,
}

/// Where the geometry of an object comes from.
#[derive(Clone, Debug)]
pub enum ObjectSource {
    /// Geometry built in code.
    Data(ObjectData),
    /// A plain text mesh of positions and normals, drawn with one material.
    TextMesh {
        file: String,
        material: Material,
        worlds: Vec<Matrix4<f32>>,
    },
    /// A Wavefront OBJ file with its MTL library.
    Obj { file: String, worlds: Vec<Matrix4<f32>> },
    /// A skinned glTF file. `clip_names` selects the clips that can be played,
    /// in the order [`start_animation`](crate::object::RenderableObject::start_animation)
    /// indexes them.
    Skinned {
        file: String,
        clip_names: Vec<String>,
        worlds: Vec<Matrix4<f32>>,
    },
}

/// Everything needed to load one object.
#[derive(Clone, Debug)]
pub struct ObjectDescriptor {
    pub name: String,
    pub features: FeatureConfiguration,
    pub source: ObjectSource,
    pub kind: PipelineKind,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>, features: FeatureConfiguration, source: ObjectSource) -> Self {
        Self {
            name: name.into(),
            features,
            source,
            kind: PipelineKind::Object,
        }
    }

    pub fn with_kind(mut self, kind: PipelineKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A decoded texture together with the file it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTexture {
    pub file: String,
    pub source: TextureSource,
}

/// An object after logical initialization: geometry in memory, textures
/// decoded, variant selected. Kept for the lifetime of the object so device
/// resources can be recreated without touching the files again.
#[derive(Clone, Debug)]
pub struct LogicalObject {
    pub name: String,
    pub features: FeatureConfiguration,
    pub variant: PipelineVariant,
    pub data: ObjectData,
    pub textures: Vec<DecodedTexture>,
    /// The object's own environment map, when it names one.
    pub environment: Option<DecodedTexture>,
    pub animation: Option<AnimationController>,
}

impl LogicalObject {
    pub fn prepare(assets: &AssetRoot, descriptor: ObjectDescriptor) -> Result<Self, LoadError> {
        let ObjectDescriptor {
            name,
            features,
            source,
            kind,
        } = descriptor;

        let (data, animation) = match source {
            ObjectSource::Data(data) => (data, None),
            ObjectSource::TextMesh { file, material, worlds } => {
                let (vertices, indices) = load_text_mesh(assets, &file)?;
                let unit = RenderUnit::new(0, vertices.len() as u32, 0, indices.len() as u32)
                    .with_worlds(worlds)
                    .with_materials(AttributeArray::single(material));
                (ObjectData::new(VertexData::Basic(vertices), indices).with_unit(unit), None)
            }
            ObjectSource::Obj { file, worlds } => (load_obj(assets, &file, worlds)?, None),
            ObjectSource::Skinned {
                file,
                clip_names,
                worlds,
            } => {
                let mesh = load_skinned_gltf(assets, &file)?;
                let controller = AnimationController::new(mesh.skin, &clip_names, features.loop_animation)?;
                let units = mesh.subsets.into_iter().map(|subset| {
                    RenderUnit::new(
                        subset.vertex_base,
                        subset.vertex_count,
                        subset.index_start,
                        subset.index_count,
                    )
                    .with_worlds(worlds.clone())
                    .with_materials(AttributeArray::single(subset.material))
                    .with_textures(subset.texture.map_or_else(AttributeArray::empty, AttributeArray::single))
                });
                let data = units.fold(
                    ObjectData::new(VertexData::Skinned(mesh.vertices), mesh.indices),
                    ObjectData::with_unit,
                );
                (data, Some(controller))
            }
        };

        let variant = match kind {
            PipelineKind::Object => PipelineVariant::select(&features, data.vertices.format())?,
            PipelineKind::Sky => {
                features.validate()?;
                if data.vertices.format() != PipelineVariant::sky().vertex_format {
                    return Err(LoadError::UnsupportedConfiguration(format!(
                        "the sky is drawn from {:?} vertices",
                        PipelineVariant::sky().vertex_format
                    )));
                }
                PipelineVariant::sky()
            }
        };
        data.validate()?;

        let textures = if features.texture_enable || features.normal_map_enable {
            decode_unit_textures(assets, &data, &features)?
        } else {
            Vec::new()
        };
        let environment = match &features.reflect_source_texture {
            Some(file) => {
                let bytes = assets.load_binary(file)?;
                Some(DecodedTexture {
                    file: file.clone(),
                    source: decode_cube_strip(assets, file, &bytes)?,
                })
            }
            None => None,
        };

        log::debug!(
            "{name}: {} units, {} instances, {} textures, permutation {:#05x}",
            data.units.len(),
            data.instance_count(),
            textures.len(),
            variant.id()
        );

        Ok(Self {
            name,
            features,
            variant,
            data,
            textures,
            environment,
            animation,
        })
    }

    pub fn texture(&self, file: &str) -> Option<&DecodedTexture> {
        self.textures.iter().find(|t| t.file == file)
    }
}

/// Decodes each referenced file once. Normal maps hold vectors, not colours,
/// and are uploaded linear.
fn decode_unit_textures(
    assets: &AssetRoot,
    data: &ObjectData,
    features: &FeatureConfiguration,
) -> Result<Vec<DecodedTexture>, LoadError> {
    let normal_maps: Vec<&str> = data
        .units
        .iter()
        .flat_map(|unit| unit.textures.items())
        .filter_map(|texture| texture.normal_map.as_deref())
        .collect();

    let mut decoded = Vec::new();
    for file in data.texture_files() {
        let is_normal_map = normal_maps.contains(&file);
        if (is_normal_map && !features.normal_map_enable) || (!is_normal_map && !features.texture_enable) {
            continue;
        }
        let color_space = if is_normal_map {
            ColorSpace::Linear
        } else {
            ColorSpace::Srgb
        };
        decoded.push(DecodedTexture {
            file: file.to_string(),
            source: load_texture(assets, file, color_space)?,
        });
    }
    Ok(decoded)
}

/// Prepares every descriptor in order. Failures are reported per object so
/// one broken asset does not take the others down.
pub fn prepare_all(
    assets: &AssetRoot,
    descriptors: Vec<ObjectDescriptor>,
) -> Vec<(String, Result<LogicalObject, LoadError>)> {
    descriptors
        .into_iter()
        .map(|descriptor| {
            let name = descriptor.name.clone();
            let prepared = LogicalObject::prepare(assets, descriptor);
            if let Err(e) = &prepared {
                log::error!("{name}: {e}");
            }
            (name, prepared)
        })
        .collect()
}

/// Orders device resource creation so that an object only starts uploading
/// once the previous one has finished.
#[derive(Clone, Debug, Default)]
pub struct LoadChain<T> {
    queue: VecDeque<T>,
    in_flight: Option<T>,
}

impl<T: Copy + PartialEq> LoadChain<T> {
    pub fn new(order: impl IntoIterator<Item = T>) -> Self {
        Self {
            queue: order.into_iter().collect(),
            in_flight: None,
        }
    }

    /// The next entry to start, once `settled` reports the one in flight as
    /// done (ready or failed). `None` while waiting or when the chain is empty.
    pub fn poll(&mut self, settled: impl Fn(T) -> bool) -> Option<T> {
        if let Some(current) = self.in_flight
            && !settled(current)
        {
            return None;
        }
        self.in_flight = self.queue.pop_front();
        self.in_flight
    }

    pub fn in_flight(&self) -> Option<T> {
        self.in_flight
    }

    pub fn is_finished(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::geometry::{MeshBuilder, create_box};

    fn boxed(features: FeatureConfiguration) -> ObjectDescriptor {
        let mut builder = MeshBuilder::new();
        let unit = builder
            .append(create_box(1.0, 1.0, 1.0))
            .with_worlds(vec![Matrix4::from_scale(1.0)])
            .with_materials(AttributeArray::single(Material::neutral()));
        ObjectDescriptor::new("box", features, ObjectSource::Data(builder.build(vec![unit])))
    }

    #[test]
    fn chain_waits_for_the_object_in_flight() {
        let mut chain = LoadChain::new([0usize, 1, 2]);
        assert_eq!(chain.poll(|_| false), Some(0));
        assert_eq!(chain.poll(|_| false), None);
        assert_eq!(chain.poll(|i| i == 0), Some(1));
        assert_eq!(chain.poll(|_| true), Some(2));
        assert!(!chain.is_finished());
        assert_eq!(chain.poll(|_| true), None);
        assert!(chain.is_finished());
    }

    #[test]
    fn code_built_objects_prepare_without_assets() {
        let object = LogicalObject::prepare(&AssetRoot::new("/nonexistent"), boxed(FeatureConfiguration::lit(3))).unwrap();
        assert_eq!(object.variant.light_count, 3);
        assert!(object.textures.is_empty());
        assert!(object.environment.is_none());
    }

    #[test]
    fn invalid_configurations_fail_preparation() {
        let prepared = LogicalObject::prepare(&AssetRoot::new("."), boxed(FeatureConfiguration::lit(4)));
        assert!(matches!(prepared, Err(LoadError::UnsupportedConfiguration(_))));
    }

    #[test]
    fn missing_textures_fail_preparation() {
        let mut descriptor = boxed(FeatureConfiguration::lit(1).with_texture());
        if let ObjectSource::Data(data) = &mut descriptor.source {
            data.units[0].textures = AttributeArray::single(crate::data_structures::object_data::TextureRef::new("missing.png"));
        }
        let prepared = LogicalObject::prepare(&AssetRoot::new("/nonexistent"), descriptor);
        assert!(matches!(prepared, Err(LoadError::Io { .. })));
    }
}
