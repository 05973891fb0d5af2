//! Geometry and per-instance attributes of a renderable object.
//!
//! An [`ObjectData`] packs one or more sub-meshes into a shared vertex and
//! index buffer. Each sub-mesh is a [`RenderUnit`] that is drawn once per entry
//! of its `worlds`; materials, textures and texture transforms are stored in
//! [`AttributeArray`]s whose length and step rate decide which entry an
//! instance uses.

use std::mem;

use cgmath::{Matrix4, SquareMatrix};

use crate::{data_structures::light::Material, error::LoadError};

/// Describes how the bytes of a vertex type map to shader inputs.
pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

/// Position, normal and texture coordinates.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BasicVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

/// [`BasicVertex`] plus the tangent needed by normal mapping.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TangentVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub tangent: [f32; 3],
}

/// Vertex of a skinned mesh: up to four bone influences per vertex.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    /// `w` holds the handedness of the tangent frame.
    pub tangent: [f32; 4],
    pub weights: [f32; 4],
    pub bone_indices: [u32; 4],
}

const BASIC_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const TANGENT_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x3
];
const SKINNED_ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x4, 4 => Float32x4, 5 => Uint32x4
];

impl Vertex for BasicVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<BasicVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &BASIC_ATTRIBUTES,
        }
    }
}

impl Vertex for TangentVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<TangentVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &TANGENT_ATTRIBUTES,
        }
    }
}

impl Vertex for SkinnedVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<SkinnedVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &SKINNED_ATTRIBUTES,
        }
    }
}

/// Which of the vertex layouts an object's vertex buffer uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Basic,
    Tangent,
    Skinned,
}

impl VertexFormat {
    pub fn layout(&self) -> wgpu::VertexBufferLayout<'static> {
        match self {
            VertexFormat::Basic => BasicVertex::desc(),
            VertexFormat::Tangent => TangentVertex::desc(),
            VertexFormat::Skinned => SkinnedVertex::desc(),
        }
    }

    pub fn has_tangents(&self) -> bool {
        !matches!(self, VertexFormat::Basic)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum VertexData {
    Basic(Vec<BasicVertex>),
    Tangent(Vec<TangentVertex>),
    Skinned(Vec<SkinnedVertex>),
}

impl VertexData {
    pub fn format(&self) -> VertexFormat {
        match self {
            VertexData::Basic(_) => VertexFormat::Basic,
            VertexData::Tangent(_) => VertexFormat::Tangent,
            VertexData::Skinned(_) => VertexFormat::Skinned,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VertexData::Basic(v) => v.len(),
            VertexData::Tangent(v) => v.len(),
            VertexData::Skinned(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            VertexData::Basic(v) => bytemuck::cast_slice(v),
            VertexData::Tangent(v) => bytemuck::cast_slice(v),
            VertexData::Skinned(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Diffuse texture and its optional normal map, both relative to the asset root.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub diffuse: String,
    pub normal_map: Option<String>,
}

impl TextureRef {
    pub fn new(diffuse: impl Into<String>) -> Self {
        Self {
            diffuse: diffuse.into(),
            normal_map: None,
        }
    }

    pub fn with_normal_map(mut self, normal_map: impl Into<String>) -> Self {
        self.normal_map = Some(normal_map.into());
        self
    }
}

/// How sequences whose length differs from the instance count are treated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StepRatePolicy {
    /// Every sequence must hold one entry or one entry per instance.
    #[default]
    Strict,
    /// Any length is accepted and cycled with the step rate.
    Cycle,
}

/// A per-instance attribute sequence together with its step rate.
///
/// A single entry is shared by all instances. With more entries, instance `k`
/// uses entry `(k / step_rate) % len`.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeArray<T> {
    items: Vec<T>,
    step_rate: u32,
}

impl<T> AttributeArray<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            step_rate: 1,
        }
    }

    pub fn single(item: T) -> Self {
        Self::new(vec![item])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_step_rate(mut self, step_rate: u32) -> Self {
        self.step_rate = step_rate;
        self
    }

    pub fn step_rate(&self) -> u32 {
        self.step_rate
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Index of the entry used by `instance`, `None` for an empty sequence.
    pub fn index_for(&self, instance: usize) -> Option<usize> {
        match self.items.len() {
            0 => None,
            1 => Some(0),
            len => Some((instance / self.step_rate.max(1) as usize) % len),
        }
    }

    pub fn resolve(&self, instance: usize) -> Option<&T> {
        self.index_for(instance).map(|idx| &self.items[idx])
    }

    fn check(&self, name: &str, instances: usize, policy: StepRatePolicy) -> Result<(), LoadError> {
        if self.step_rate == 0 {
            return Err(LoadError::InvalidObjectData(format!(
                "{name} has a step rate of zero"
            )));
        }
        let len = self.items.len();
        if policy == StepRatePolicy::Strict && len > 1 && len != instances {
            return Err(LoadError::InvalidObjectData(format!(
                "{name} holds {len} entries for {instances} instances; expected 1 or {instances}"
            )));
        }
        Ok(())
    }
}

impl<T> Default for AttributeArray<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Vec<T>> for AttributeArray<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// One drawable sub-range of an object's shared buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderUnit {
    pub vertex_base: u32,
    pub vertex_count: u32,
    pub index_start: u32,
    pub index_count: u32,
    pub worlds: Vec<Matrix4<f32>>,
    pub materials: AttributeArray<Material>,
    pub textures: AttributeArray<TextureRef>,
    pub texture_transforms: AttributeArray<Matrix4<f32>>,
}

/// The attributes one instance of a unit is drawn with.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedInstance<'a> {
    pub world: Matrix4<f32>,
    pub material: Material,
    pub texture: Option<&'a TextureRef>,
    pub texture_transform: Matrix4<f32>,
}

impl RenderUnit {
    pub fn new(vertex_base: u32, vertex_count: u32, index_start: u32, index_count: u32) -> Self {
        Self {
            vertex_base,
            vertex_count,
            index_start,
            index_count,
            worlds: Vec::new(),
            materials: AttributeArray::empty(),
            textures: AttributeArray::empty(),
            texture_transforms: AttributeArray::empty(),
        }
    }

    pub fn with_worlds(mut self, worlds: Vec<Matrix4<f32>>) -> Self {
        self.worlds = worlds;
        self
    }

    pub fn with_materials(mut self, materials: AttributeArray<Material>) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_textures(mut self, textures: AttributeArray<TextureRef>) -> Self {
        self.textures = textures;
        self
    }

    pub fn with_texture_transforms(mut self, transforms: AttributeArray<Matrix4<f32>>) -> Self {
        self.texture_transforms = transforms;
        self
    }

    pub fn instance_count(&self) -> usize {
        self.worlds.len()
    }

    pub fn resolve(&self, instance: usize) -> ResolvedInstance<'_> {
        ResolvedInstance {
            world: self.worlds[instance],
            material: self.materials.resolve(instance).copied().unwrap_or_default(),
            texture: self.textures.resolve(instance),
            texture_transform: self
                .texture_transforms
                .resolve(instance)
                .copied()
                .unwrap_or_else(Matrix4::identity),
        }
    }

    fn validate(
        &self,
        idx: usize,
        vertex_total: usize,
        index_total: usize,
        policy: StepRatePolicy,
    ) -> Result<(), LoadError> {
        let instances = self.worlds.len();
        if instances == 0 {
            return Err(LoadError::InvalidObjectData(format!(
                "unit {idx} has no world transforms"
            )));
        }
        if self.materials.is_empty() {
            return Err(LoadError::InvalidObjectData(format!(
                "unit {idx} has no material"
            )));
        }
        self.materials
            .check(&format!("unit {idx} materials"), instances, policy)?;
        self.textures
            .check(&format!("unit {idx} textures"), instances, policy)?;
        self.texture_transforms
            .check(&format!("unit {idx} texture transforms"), instances, policy)?;

        let vertex_end = self.vertex_base as usize + self.vertex_count as usize;
        if vertex_end > vertex_total {
            return Err(LoadError::InvalidObjectData(format!(
                "unit {idx} addresses vertices up to {vertex_end} but only {vertex_total} exist"
            )));
        }
        let index_end = self.index_start as usize + self.index_count as usize;
        if index_end > index_total {
            return Err(LoadError::InvalidObjectData(format!(
                "unit {idx} addresses indices up to {index_end} but only {index_total} exist"
            )));
        }
        Ok(())
    }
}

/// Raw geometry plus the units drawn from it.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectData {
    pub vertices: VertexData,
    pub indices: Vec<u32>,
    pub units: Vec<RenderUnit>,
    pub step_rate_policy: StepRatePolicy,
}

impl ObjectData {
    pub fn new(vertices: VertexData, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            units: Vec::new(),
            step_rate_policy: StepRatePolicy::default(),
        }
    }

    pub fn with_unit(mut self, unit: RenderUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_step_rate_policy(mut self, policy: StepRatePolicy) -> Self {
        self.step_rate_policy = policy;
        self
    }

    pub fn instance_count(&self) -> usize {
        self.units.iter().map(RenderUnit::instance_count).sum()
    }

    /// Every texture file referenced by any unit, in first-use order.
    pub fn texture_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for unit in &self.units {
            for texture in unit.textures.items() {
                let refs = std::iter::once(texture.diffuse.as_str())
                    .chain(texture.normal_map.as_deref());
                for file in refs {
                    if !files.contains(&file) {
                        files.push(file);
                    }
                }
            }
        }
        files
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.units.is_empty() {
            return Err(LoadError::InvalidObjectData("object has no render units".into()));
        }
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(LoadError::InvalidObjectData("object has no geometry".into()));
        }
        for (idx, unit) in self.units.iter().enumerate() {
            unit.validate(idx, self.vertices.len(), self.indices.len(), self.step_rate_policy)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(instances: usize) -> RenderUnit {
        RenderUnit::new(0, 3, 0, 3)
            .with_worlds(vec![Matrix4::identity(); instances])
            .with_materials(AttributeArray::single(Material::neutral()))
    }

    fn triangle(unit: RenderUnit) -> ObjectData {
        ObjectData::new(VertexData::Basic(vec![BasicVertex::default(); 3]), vec![0, 1, 2]).with_unit(unit)
    }

    #[test]
    fn single_entry_is_shared_by_every_instance() {
        let textures = AttributeArray::single(TextureRef::new("a.png")).with_step_rate(4);
        assert_eq!(textures.index_for(0), Some(0));
        assert_eq!(textures.index_for(99), Some(0));
        assert_eq!(AttributeArray::<u8>::empty().index_for(0), None);
    }

    #[test]
    fn step_rate_groups_consecutive_instances() {
        let colours = AttributeArray::new(vec!['a', 'b', 'c']).with_step_rate(2);
        let resolved: String = (0..8).filter_map(|k| colours.resolve(k)).collect();
        assert_eq!(resolved, "aabbccaa");
    }

    #[test]
    fn missing_texture_transform_resolves_to_identity() {
        let data = unit(2);
        let resolved = data.resolve(1);
        assert_eq!(resolved.texture_transform, Matrix4::identity());
        assert!(resolved.texture.is_none());
    }

    #[test]
    fn strict_policy_rejects_partial_sequences() {
        let partial = unit(3).with_textures(AttributeArray::new(vec![TextureRef::new("a"), TextureRef::new("b")]));
        assert!(matches!(
            triangle(partial.clone()).validate(),
            Err(LoadError::InvalidObjectData(_))
        ));
        triangle(partial)
            .with_step_rate_policy(StepRatePolicy::Cycle)
            .validate()
            .unwrap();
    }

    #[test]
    fn units_must_stay_inside_the_buffers() {
        let too_long = RenderUnit::new(0, 3, 0, 6)
            .with_worlds(vec![Matrix4::identity()])
            .with_materials(AttributeArray::single(Material::neutral()));
        assert!(triangle(too_long).validate().is_err());
        assert!(triangle(unit(0)).validate().is_err());
    }

    #[test]
    fn texture_files_are_listed_once_in_first_use_order() {
        let textures = AttributeArray::new(vec![
            TextureRef::new("b.png").with_normal_map("b_nmap.png"),
            TextureRef::new("a.png"),
            TextureRef::new("b.png"),
        ]);
        let data = triangle(unit(3).with_textures(textures));
        assert_eq!(data.texture_files(), ["b.png", "b_nmap.png", "a.png"]);
    }
}
