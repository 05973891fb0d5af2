//! The renderable object.
//!
//! A [`RenderableObject`] goes through three steps before it draws anything:
//!
//! 1. `initialize` (or [`RenderableObject::from_logical`] after a background
//!    preparation) loads the geometry and textures into memory,
//! 2. `create_device_dependent_resources` uploads them and requests an
//!    [`UploadFence`](crate::gpu::UploadFence),
//! 3. `poll_loading` observes the fence and marks the object ready.
//!
//! `update` and `render` are no-ops until the object is ready, so a scene can
//! call them every frame while loading is still in progress.

use std::collections::HashMap;

use cgmath::Matrix4;

use crate::{
    constants::{ConstantBindings, ObjectConstants, SkinningConstants},
    data_structures::{feature::FeatureConfiguration, instance::InstanceRaw},
    error::LoadError,
    gpu::{BufferId, BufferKind, DrawCall, GpuDevice, PipelineId, TextureBindings, TextureId, UploadFence},
    loader::{LoadState, LogicalObject, ObjectDescriptor},
    pipelines::PipelineCache,
    resources::AssetRoot,
};

/// Decides per `(unit, instance)` whether it is drawn.
pub type InstanceFilter<'a> = &'a dyn Fn(usize, usize) -> bool;

#[derive(Debug)]
struct DeviceResources {
    pipeline: PipelineId,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    instance_buffer: BufferId,
    textures: HashMap<String, TextureId>,
    environment: Option<TextureId>,
    fence: Option<UploadFence>,
}

#[derive(Debug)]
pub struct RenderableObject {
    name: String,
    state: LoadState,
    descriptor: Option<ObjectDescriptor>,
    logical: Option<LogicalObject>,
    resources: Option<DeviceResources>,
    /// First slot of each unit in the instance buffer.
    instance_offsets: Vec<u32>,
    instances_dirty: bool,
    skinning: Option<Box<SkinningConstants>>,
    external_environment: Option<TextureId>,
    missing_environment_logged: bool,
}

impl RenderableObject {
    pub fn new(descriptor: ObjectDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            state: LoadState::Uninitialized,
            descriptor: Some(descriptor),
            logical: None,
            resources: None,
            instance_offsets: Vec::new(),
            instances_dirty: false,
            skinning: None,
            external_environment: None,
            missing_environment_logged: false,
        }
    }

    /// An object whose logical initialization already happened elsewhere.
    pub fn from_logical(logical: LogicalObject) -> Self {
        let mut object = Self {
            name: logical.name.clone(),
            state: LoadState::Uninitialized,
            descriptor: None,
            logical: None,
            resources: None,
            instance_offsets: Vec::new(),
            instances_dirty: false,
            skinning: None,
            external_environment: None,
            missing_environment_logged: false,
        };
        object.attach(logical);
        object
    }

    fn attach(&mut self, logical: LogicalObject) {
        let mut offset = 0;
        self.instance_offsets = logical
            .data
            .units
            .iter()
            .map(|unit| {
                let start = offset;
                offset += unit.instance_count() as u32;
                start
            })
            .collect();
        self.logical = Some(logical);
        self.state = LoadState::LogicallyInitialized;
    }

    /// Loads geometry and textures. Calling it again after success does nothing.
    pub fn initialize(&mut self, assets: &AssetRoot) -> Result<(), LoadError> {
        let Some(descriptor) = self.descriptor.take() else {
            return Ok(());
        };
        let logical = LogicalObject::prepare(assets, descriptor)?;
        self.attach(logical);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    pub fn features(&self) -> Option<&FeatureConfiguration> {
        self.logical.as_ref().map(|l| &l.features)
    }

    pub fn logical(&self) -> Option<&LogicalObject> {
        self.logical.as_ref()
    }

    /// Uploads geometry, instances and textures and requests a fence for them.
    ///
    /// Before logical initialization this only logs a warning.
    pub fn create_device_dependent_resources(
        &mut self,
        device: &mut dyn GpuDevice,
        pipelines: &mut PipelineCache,
    ) -> Result<(), LoadError> {
        if self.state != LoadState::LogicallyInitialized {
            log::warn!(
                "{}: components haven't been initialized, device resources not created ({:?})",
                self.name,
                self.state
            );
            return Ok(());
        }
        let Some(logical) = &self.logical else {
            return Ok(());
        };

        let pipeline = pipelines.get_or_create(device, &logical.variant)?;
        let vertex_buffer = device.create_buffer(
            &format!("{} vertices", self.name),
            BufferKind::Vertex,
            logical.data.vertices.as_bytes(),
        );
        let index_buffer = device.create_buffer(
            &format!("{} indices", self.name),
            BufferKind::Index,
            bytemuck::cast_slice(&logical.data.indices),
        );
        let instance_buffer = device.create_buffer(
            &format!("{} instances", self.name),
            BufferKind::Instance,
            bytemuck::cast_slice(&instance_data(logical)),
        );
        let textures = logical
            .textures
            .iter()
            .map(|texture| (texture.file.clone(), device.create_texture(&texture.source)))
            .collect();
        let environment = logical
            .environment
            .as_ref()
            .map(|texture| device.create_texture(&texture.source));

        self.resources = Some(DeviceResources {
            pipeline,
            vertex_buffer,
            index_buffer,
            instance_buffer,
            textures,
            environment,
            fence: Some(device.upload_fence()),
        });
        self.instances_dirty = false;
        self.state = LoadState::DeviceResourcesLoading;
        log::debug!("{}: device resources requested", self.name);
        Ok(())
    }

    /// Moves the object to [`LoadState::Ready`] once its uploads completed.
    /// Returns whether it is ready.
    pub fn poll_loading(&mut self, device: &mut dyn GpuDevice) -> Result<bool, LoadError> {
        match self.state {
            LoadState::Ready => return Ok(true),
            LoadState::DeviceResourcesLoading => {}
            _ => return Ok(false),
        }
        let polled = match self.resources.as_mut().and_then(|r| r.fence.as_mut()) {
            Some(fence) => fence.poll_complete(),
            None => Ok(true),
        };
        match polled {
            Ok(true) => {
                if let Some(resources) = &mut self.resources {
                    resources.fence = None;
                }
                self.refresh_skinning();
                self.state = LoadState::Ready;
                log::info!("{} is ready", self.name);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                self.release(device);
                Err(e)
            }
        }
    }

    pub fn update(&mut self, dt: f32) {
        if self.state != LoadState::Ready {
            return;
        }
        if let Some(controller) = self.logical.as_mut().and_then(|l| l.animation.as_mut()) {
            controller.update(dt);
        }
        self.refresh_skinning();
    }

    fn refresh_skinning(&mut self) {
        self.skinning = self
            .logical
            .as_ref()
            .and_then(|l| l.animation.as_ref())
            .map(|controller| Box::new(SkinningConstants::from_transforms(&controller.bone_transforms())));
    }

    /// Records the draws of every instance `include` accepts (all without a
    /// filter) into the pass that is currently open.
    ///
    /// Consecutive instances of a unit that share their texture are drawn in
    /// one instanced call when the device supports it.
    pub fn render(
        &mut self,
        device: &mut dyn GpuDevice,
        bindings: &mut ConstantBindings,
        include: Option<InstanceFilter<'_>>,
    ) {
        if self.state != LoadState::Ready {
            return;
        }
        let (Some(logical), Some(resources)) = (&self.logical, &self.resources) else {
            return;
        };

        if self.instances_dirty {
            device.write_buffer(resources.instance_buffer, 0, bytemuck::cast_slice(&instance_data(logical)));
            self.instances_dirty = false;
        }

        let features = &logical.features;
        let environment = if features.consumes_external_reflection() {
            let supplied = self.external_environment.take();
            if supplied.is_none() && !self.missing_environment_logged {
                log::debug!("{}: no reflection map supplied, using the fallback", self.name);
                self.missing_environment_logged = true;
            }
            supplied
        } else {
            resources.environment
        };
        let instancing = device.supports_instancing();
        let included = |unit: usize, instance: usize| include.is_none_or(|f| f(unit, instance));

        for (u, unit) in logical.data.units.iter().enumerate() {
            let count = unit.instance_count();
            let base = self.instance_offsets[u];
            let mut k = 0;
            while k < count {
                if !included(u, k) {
                    k += 1;
                    continue;
                }
                let texture_slot = unit.textures.index_for(k);
                let mut end = k + 1;
                if instancing {
                    while end < count && included(u, end) && unit.textures.index_for(end) == texture_slot {
                        end += 1;
                    }
                }

                let first = unit.resolve(k);
                let constants =
                    ObjectConstants::new(first.world, first.texture_transform, first.material, features);
                let Some(uniforms) = bindings.push_object(device, constants, self.skinning.as_deref()) else {
                    return;
                };
                let lookup = |file: Option<&String>| file.and_then(|f| resources.textures.get(f)).copied();
                let textures = TextureBindings {
                    diffuse: first
                        .texture
                        .filter(|_| features.texture_enable)
                        .and_then(|t| lookup(Some(&t.diffuse))),
                    normal: first
                        .texture
                        .filter(|_| features.normal_map_enable)
                        .and_then(|t| lookup(t.normal_map.as_ref())),
                    environment,
                };

                device.draw(DrawCall {
                    pipeline: resources.pipeline,
                    vertex_buffer: resources.vertex_buffer,
                    index_buffer: resources.index_buffer,
                    instance_buffer: resources.instance_buffer,
                    textures,
                    uniforms,
                    indices: unit.index_start..unit.index_start + unit.index_count,
                    base_vertex: unit.vertex_base as i32,
                    instances: base + k as u32..base + end as u32,
                });
                k = end;
            }
        }
    }

    /// Frees every device resource. The logical data stays, so the object can
    /// be recreated without reloading. Calling it twice is harmless.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(resources) = self.resources.take() {
            device.destroy_buffer(resources.vertex_buffer);
            device.destroy_buffer(resources.index_buffer);
            device.destroy_buffer(resources.instance_buffer);
            for texture in resources.textures.into_values() {
                device.destroy_texture(texture);
            }
            if let Some(environment) = resources.environment {
                device.destroy_texture(environment);
            }
            log::debug!("{}: device resources released", self.name);
        }
        self.external_environment = None;
        if self.logical.is_some() {
            self.state = LoadState::LogicallyInitialized;
        }
    }

    /// Replaces the world transform of one instance. Out-of-range indices are
    /// ignored with a warning.
    pub fn set_world(&mut self, unit: usize, instance: usize, world: Matrix4<f32>) -> bool {
        let Some(logical) = &mut self.logical else {
            log::warn!("{}: world set before initialization", self.name);
            return false;
        };
        match logical
            .data
            .units
            .get_mut(unit)
            .and_then(|u| u.worlds.get_mut(instance))
        {
            Some(slot) => {
                *slot = world;
                self.instances_dirty = true;
                true
            }
            None => {
                log::warn!("{}: no instance {instance} in unit {unit}", self.name);
                false
            }
        }
    }

    pub fn world(&self, unit: usize, instance: usize) -> Option<Matrix4<f32>> {
        self.logical
            .as_ref()?
            .data
            .units
            .get(unit)?
            .worlds
            .get(instance)
            .copied()
    }

    /// Supplies the environment map sampled by the next `render`.
    pub fn update_reflect_map(&mut self, cube: TextureId) {
        self.external_environment = Some(cube);
    }

    /// Plays the `index`th clip named when the object was described.
    pub fn start_animation(&mut self, index: usize) -> bool {
        match self.logical.as_mut().and_then(|l| l.animation.as_mut()) {
            Some(controller) => controller.start_animation(index),
            None => {
                log::warn!("{} has no animation", self.name);
                false
            }
        }
    }

    pub fn animation_time(&self) -> Option<f32> {
        self.logical
            .as_ref()
            .and_then(|l| l.animation.as_ref())
            .map(|controller| controller.elapsed())
    }
}

fn instance_data(logical: &LogicalObject) -> Vec<InstanceRaw> {
    logical
        .data
        .units
        .iter()
        .flat_map(|unit| (0..unit.instance_count()).map(|k| InstanceRaw::from(&unit.resolve(k))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::PerFrameConstants,
        camera::{Camera, Projection},
        data_structures::{
            geometry::{MeshBuilder, create_box},
            light::{DirectionalLight, Fog, Material},
            object_data::{AttributeArray, TextureRef},
        },
        gpu::{HeadlessDevice, PassTarget, TextureSource, ColorSpace},
        loader::ObjectSource,
        pipelines::PipelineVariant,
        data_structures::object_data::VertexFormat,
    };

    fn boxes(instances: usize) -> LogicalObject {
        let mut builder = MeshBuilder::new();
        let unit = builder
            .append(create_box(1.0, 1.0, 1.0))
            .with_worlds((0..instances).map(|i| Matrix4::from_translation([i as f32, 0.0, 0.0].into())).collect())
            .with_materials(AttributeArray::single(Material::neutral()))
            .with_textures(
                AttributeArray::new(vec![TextureRef::new("a.png"), TextureRef::new("b.png")]).with_step_rate(2),
            );
        let features = FeatureConfiguration::lit(1).with_texture();
        LogicalObject {
            name: "boxes".into(),
            variant: PipelineVariant::select(&features, VertexFormat::Tangent).unwrap(),
            features,
            data: builder.build(vec![unit]).with_step_rate_policy(crate::data_structures::object_data::StepRatePolicy::Cycle),
            textures: ["a.png", "b.png"]
                .into_iter()
                .map(|file| crate::loader::DecodedTexture {
                    file: file.into(),
                    source: TextureSource::solid(file, [255; 4], ColorSpace::Srgb),
                })
                .collect(),
            environment: None,
            animation: None,
        }
    }

    fn ready(device: &mut HeadlessDevice, logical: LogicalObject) -> (RenderableObject, PipelineCache) {
        let mut object = RenderableObject::from_logical(logical);
        let mut pipelines = PipelineCache::new();
        object.create_device_dependent_resources(device, &mut pipelines).unwrap();
        assert!(object.poll_loading(device).unwrap());
        (object, pipelines)
    }

    fn frame(device: &mut HeadlessDevice) -> ConstantBindings {
        let mut bindings = ConstantBindings::new();
        bindings.initialize(device);
        bindings.begin_frame();
        let constants = PerFrameConstants::new(
            &Camera::new((0.0, 0.0, -5.0), cgmath::Deg(90.0), cgmath::Deg(0.0)),
            &Projection::new(4, 4, cgmath::Deg(45.0), 0.1, 100.0),
            &[DirectionalLight::default(); 3],
            &Fog::default(),
        );
        bindings.push_frame(device, constants);
        bindings
    }

    #[test]
    fn runs_of_one_texture_share_a_draw() {
        let mut device = HeadlessDevice::new();
        let (mut object, _) = ready(&mut device, boxes(4));
        let mut bindings = frame(&mut device);
        device.begin_pass(PassTarget::Frame, None);
        object.render(&mut device, &mut bindings, None);
        device.end_pass();

        let passes = device.take_passes();
        let draws = &passes[0].draws;
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].instances, 0..2);
        assert_eq!(draws[1].instances, 2..4);
        assert_ne!(draws[0].textures.diffuse, draws[1].textures.diffuse);
    }

    #[test]
    fn without_instancing_every_instance_is_drawn_alone() {
        let mut device = HeadlessDevice::without_instancing();
        let (mut object, _) = ready(&mut device, boxes(3));
        let mut bindings = frame(&mut device);
        device.begin_pass(PassTarget::Frame, None);
        object.render(&mut device, &mut bindings, None);
        device.end_pass();
        let instances: Vec<_> = device.take_passes()[0].draws.iter().map(|d| d.instances.clone()).collect();
        assert_eq!(instances, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn full_object_ring_drops_draws_instead_of_reusing_slots() {
        let mut device = HeadlessDevice::without_instancing();
        let (mut object, _) = ready(&mut device, boxes(4));
        let mut bindings = frame(&mut device);
        bindings.object = crate::constants::ConstantBuffer::new(crate::gpu::UniformKind::Object, 2);
        bindings.object.initialize(&mut device);
        device.begin_pass(PassTarget::Frame, None);
        object.render(&mut device, &mut bindings, None);
        device.end_pass();

        let passes = device.take_passes();
        let offsets: Vec<_> = passes[0].draws.iter().map(|d| d.uniforms.object.offset).collect();
        assert_eq!(offsets.len(), 2);
        assert_ne!(offsets[0], offsets[1]);
    }

    #[test]
    fn filtered_instances_split_batches() {
        let mut device = HeadlessDevice::new();
        let (mut object, _) = ready(&mut device, boxes(2));
        let mut bindings = frame(&mut device);
        device.begin_pass(PassTarget::Frame, None);
        let skip_first: InstanceFilter<'_> = &|_, k| k != 0;
        object.render(&mut device, &mut bindings, Some(skip_first));
        device.end_pass();
        let passes = device.take_passes();
        let draws = &passes[0].draws;
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].instances, 1..2);
    }

    #[test]
    fn set_world_rejects_unknown_instances() {
        let mut object = RenderableObject::from_logical(boxes(2));
        assert!(object.set_world(0, 1, Matrix4::from_scale(2.0)));
        assert!(!object.set_world(0, 2, Matrix4::from_scale(2.0)));
        assert!(!object.set_world(1, 0, Matrix4::from_scale(2.0)));
        assert_eq!(object.world(0, 1), Some(Matrix4::from_scale(2.0)));
    }

    #[test]
    fn uninitialized_objects_create_nothing() {
        let mut device = HeadlessDevice::new();
        let descriptor = ObjectDescriptor::new(
            "later",
            FeatureConfiguration::lit(1),
            ObjectSource::Obj {
                file: "missing.obj".into(),
                worlds: vec![],
            },
        );
        let mut object = RenderableObject::new(descriptor);
        let before = device.command_count();
        object
            .create_device_dependent_resources(&mut device, &mut PipelineCache::new())
            .unwrap();
        assert_eq!(device.command_count(), before);
        assert_eq!(object.state(), LoadState::Uninitialized);
    }
}
