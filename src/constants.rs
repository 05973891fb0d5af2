//! Per-frame, per-object and skinning constants.
//!
//! Every kind of constant lives in one uniform ring owned by a
//! [`ConstantBuffer`]. A push copies the CPU-side value into the next ring slot
//! unless it is unchanged since the previous push, in which case the previous
//! slot is reused. Draws refer to the slot they were pushed into, so one ring
//! serves every object of a scene.
//!
//! The bindings are shared by all objects and passed around as `&mut`; the
//! borrow is the single-writer guarantee.

use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix, Matrix4, SquareMatrix};

use crate::{
    camera::{Camera, Projection},
    data_structures::{
        feature::FeatureConfiguration,
        light::{DirectionalLight, Fog, Material},
    },
    gpu::{BufferId, GpuDevice, RingSlot, UniformKind, UniformSlots, align_uniform},
};

pub const FRAME_RING_CAPACITY: u32 = 16;
pub const OBJECT_RING_CAPACITY: u32 = 4096;
pub const SKINNING_RING_CAPACITY: u32 = 64;
pub const MAX_BONES: usize = 96;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PerFrameConstants {
    pub view: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub lights: [DirectionalLight; 3],
    pub eye_pos: [f32; 3],
    pub fog_start: f32,
    pub fog_range: f32,
    _pad: [f32; 3],
    pub fog_colour: [f32; 4],
}

fn inverse_or_identity(m: Matrix4<f32>) -> Matrix4<f32> {
    m.invert().unwrap_or_else(Matrix4::identity)
}

impl PerFrameConstants {
    pub fn new(camera: &Camera, projection: &Projection, lights: &[DirectionalLight; 3], fog: &Fog) -> Self {
        let view = camera.calc_matrix();
        let proj = projection.calc_matrix();
        Self {
            view: view.into(),
            inv_view: inverse_or_identity(view).into(),
            proj: proj.into(),
            inv_proj: inverse_or_identity(proj).into(),
            view_proj: (proj * view).into(),
            lights: *lights,
            eye_pos: camera.position.into(),
            fog_start: fog.start,
            fog_range: fog.range,
            _pad: [0.0; 3],
            fog_colour: fog.colour,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: [[f32; 4]; 4],
    pub world_inv_transpose: [[f32; 4]; 4],
    pub tex_transform: [[f32; 4]; 4],
    pub material: Material,
    /// Light count, texture, normal map, reflect.
    pub flags: [u32; 4],
    /// Skinned, tessellation, external environment, unused.
    pub features: [u32; 4],
    /// Height scale, max distance, min distance, min factor.
    pub tess: [f32; 4],
    /// Max factor.
    pub tess_max: [f32; 4],
}

impl ObjectConstants {
    pub fn new(
        world: Matrix4<f32>,
        tex_transform: Matrix4<f32>,
        material: Material,
        features: &FeatureConfiguration,
    ) -> Self {
        let tess = features.tessellation.unwrap_or_default();
        Self {
            world: world.into(),
            world_inv_transpose: inverse_or_identity(world).transpose().into(),
            tex_transform: tex_transform.into(),
            material,
            flags: [
                features.light_count as u32,
                features.texture_enable as u32,
                features.normal_map_enable as u32,
                features.reflect_enable as u32,
            ],
            features: [
                features.skinned as u32,
                features.tessellation_enable() as u32,
                features.consumes_external_reflection() as u32,
                0,
            ],
            tess: [tess.height_scale, tess.max_distance, tess.min_distance, tess.min_factor],
            tess_max: [tess.max_factor, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SkinningConstants {
    pub bones: [[[f32; 4]; 4]; MAX_BONES],
}

impl SkinningConstants {
    /// Identity palette, then `transforms` copied over the first bones.
    pub fn from_transforms(transforms: &[Matrix4<f32>]) -> Self {
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        let mut bones = [identity; MAX_BONES];
        for (bone, transform) in bones.iter_mut().zip(transforms) {
            *bone = (*transform).into();
        }
        Self { bones }
    }
}

impl Default for SkinningConstants {
    fn default() -> Self {
        Self::from_transforms(&[])
    }
}

/// CPU-side constants plus the uniform ring they are pushed into.
#[derive(Debug)]
pub struct ConstantBuffer<T: Pod> {
    pub data: T,
    kind: UniformKind,
    ring: Option<BufferId>,
    stride: u64,
    capacity: u32,
    cursor: u32,
    last: Option<(T, RingSlot)>,
    overflowed: bool,
}

impl<T: Pod> ConstantBuffer<T> {
    pub fn new(kind: UniformKind, capacity: u32) -> Self {
        Self {
            data: T::zeroed(),
            kind,
            ring: None,
            stride: align_uniform(size_of::<T>() as u64),
            capacity,
            cursor: 0,
            last: None,
            overflowed: false,
        }
    }

    pub fn initialize(&mut self, device: &mut dyn GpuDevice) {
        if self.ring.is_none() {
            self.ring = Some(device.create_uniform_ring(self.kind, self.stride, self.capacity));
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.ring.is_some()
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Slots pushed since the last [`begin_frame`](Self::begin_frame).
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Slots of the previous frame may be overwritten from here on.
    pub fn begin_frame(&mut self) {
        self.cursor = 0;
        self.last = None;
        self.overflowed = false;
    }

    /// Pushes `data` unless it equals what was pushed last. Returns the slot
    /// holding the current value, `None` before [`initialize`](Self::initialize)
    /// or once every slot of the frame is taken. Slots written this frame are
    /// still read by recorded draws, so a full ring never wraps.
    pub fn apply_changes(&mut self, device: &mut dyn GpuDevice) -> Option<RingSlot> {
        let Some(ring) = self.ring else {
            log::error!("{:?} constants pushed before the ring was created", self.kind);
            return None;
        };
        if let Some((last, slot)) = &self.last
            && bytemuck::bytes_of(last) == bytemuck::bytes_of(&self.data)
        {
            return Some(*slot);
        }

        if self.cursor >= self.capacity {
            if !self.overflowed {
                log::warn!(
                    "{:?} constant ring is full ({} slots), dropping draws until the next frame",
                    self.kind,
                    self.capacity
                );
                self.overflowed = true;
            }
            return None;
        }
        let offset = self.cursor as u64 * self.stride;
        device.write_buffer(ring, offset, bytemuck::bytes_of(&self.data));
        self.cursor += 1;

        let slot = RingSlot {
            ring,
            offset: offset as u32,
        };
        self.last = Some((self.data, slot));
        Some(slot)
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(ring) = self.ring.take() {
            device.destroy_buffer(ring);
        }
        self.begin_frame();
    }
}

/// The constant buffers shared by every object of a scene.
#[derive(Debug)]
pub struct ConstantBindings {
    pub frame: ConstantBuffer<PerFrameConstants>,
    pub object: ConstantBuffer<ObjectConstants>,
    pub skinning: ConstantBuffer<SkinningConstants>,
    frame_slot: Option<RingSlot>,
}

impl Default for ConstantBindings {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantBindings {
    pub fn new() -> Self {
        Self {
            frame: ConstantBuffer::new(UniformKind::Frame, FRAME_RING_CAPACITY),
            object: ConstantBuffer::new(UniformKind::Object, OBJECT_RING_CAPACITY),
            skinning: ConstantBuffer::new(UniformKind::Skinning, SKINNING_RING_CAPACITY),
            frame_slot: None,
        }
    }

    pub fn initialize(&mut self, device: &mut dyn GpuDevice) {
        self.frame.initialize(device);
        self.object.initialize(device);
        self.skinning.initialize(device);
    }

    pub fn is_initialized(&self) -> bool {
        self.frame.is_initialized() && self.object.is_initialized() && self.skinning.is_initialized()
    }

    pub fn begin_frame(&mut self) {
        self.frame.begin_frame();
        self.object.begin_frame();
        self.skinning.begin_frame();
        self.frame_slot = None;
    }

    /// Pushes the per-frame constants of the pass about to be drawn.
    pub fn push_frame(&mut self, device: &mut dyn GpuDevice, constants: PerFrameConstants) -> Option<RingSlot> {
        self.frame.data = constants;
        self.frame_slot = self.frame.apply_changes(device);
        self.frame_slot
    }

    pub fn frame_slot(&self) -> Option<RingSlot> {
        self.frame_slot
    }

    /// Pushes per-object (and optionally skinning) constants and pairs them with
    /// the current frame slot.
    pub fn push_object(
        &mut self,
        device: &mut dyn GpuDevice,
        object: ObjectConstants,
        skinning: Option<&SkinningConstants>,
    ) -> Option<UniformSlots> {
        let Some(frame) = self.frame_slot else {
            log::error!("object constants pushed before the frame constants");
            return None;
        };
        self.object.data = object;
        let object = self.object.apply_changes(device)?;
        let skinning = match skinning {
            Some(bones) => {
                self.skinning.data = *bones;
                Some(self.skinning.apply_changes(device)?)
            }
            None => None,
        };
        Some(UniformSlots {
            frame,
            object,
            skinning,
        })
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        self.frame.release(device);
        self.object.release(device);
        self.skinning.release(device);
        self.frame_slot = None;
    }
}
