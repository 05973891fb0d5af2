//! A device without a GPU.
//!
//! [`HeadlessDevice`] keeps every resource in memory and records every command
//! it receives. It backs CPU-only runs and lets tests observe exactly which
//! device work an operation caused.

use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    ops::Range,
};

use futures::channel::oneshot;

use crate::{
    error::LoadError,
    gpu::{
        BufferId, BufferKind, DrawCall, GpuDevice, LiveResources, PassTarget, PipelineId,
        RingSlot, TextureId, TextureSource, UniformKind, UploadFence,
    },
    pipelines::PipelineVariant,
};

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCommand {
    CreateBuffer { id: BufferId, label: String, kind: BufferKind, size: usize },
    CreateUniformRing { id: BufferId, kind: UniformKind, slot_size: u64, capacity: u32 },
    WriteBuffer { id: BufferId, offset: u64, size: usize },
    DestroyBuffer(BufferId),
    CreateTexture { id: TextureId, label: String },
    CreateCubeTarget { id: TextureId, label: String, size: u32 },
    DestroyTexture(TextureId),
    CreatePipeline { id: PipelineId, variant: PipelineVariant },
    DestroyPipeline(PipelineId),
    BeginPass { target: PassTarget, clear: Option<[f32; 4]> },
    Draw(DrawCall),
    EndPass,
    UploadFence,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPass {
    pub target: PassTarget,
    pub clear: Option<[f32; 4]>,
    pub draws: Vec<DrawCall>,
}

#[derive(Debug)]
struct StoredBuffer {
    label: String,
    slot_size: u64,
    data: Vec<u8>,
}

/// What a draw consumed, independent of the ids the resources happen to have.
///
/// Two frames with equal signatures would produce identical pixels on a real
/// device, which makes it usable to compare renders across a release and
/// re-creation of device resources.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DrawSignature {
    pub target: String,
    pub pipeline: Option<u32>,
    pub geometry: u64,
    pub instance_data: u64,
    pub textures: [Option<String>; 3],
    pub uniforms: u64,
    pub indices: Range<u32>,
    pub base_vertex: i32,
    pub instances: Range<u32>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    instancing: bool,
    next_id: u32,
    buffers: HashMap<BufferId, StoredBuffer>,
    textures: HashMap<TextureId, String>,
    pipelines: HashMap<PipelineId, PipelineVariant>,
    commands: Vec<DeviceCommand>,
    passes: Vec<RecordedPass>,
    open_pass: Option<RecordedPass>,
    hold_uploads: bool,
    pending_uploads: Vec<oneshot::Sender<()>>,
    lost: bool,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            instancing: true,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            commands: Vec::new(),
            passes: Vec::new(),
            open_pass: None,
            hold_uploads: false,
            pending_uploads: Vec::new(),
            lost: false,
        }
    }

    /// A device that draws a single instance per call.
    pub fn without_instancing() -> Self {
        Self {
            instancing: false,
            ..Self::new()
        }
    }

    /// While held, upload fences stay unsignalled until
    /// [`release_uploads`](Self::release_uploads).
    pub fn hold_uploads(&mut self, hold: bool) {
        self.hold_uploads = hold;
        if !hold {
            self.release_uploads();
        }
    }

    pub fn release_uploads(&mut self) {
        for sender in self.pending_uploads.drain(..) {
            let _ = sender.send(());
        }
    }

    /// Marks the device as lost, the way a driver reset would.
    pub fn lose(&mut self) {
        self.lost = true;
    }

    pub fn pending_uploads(&self) -> usize {
        self.pending_uploads.len()
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Passes finished since the last call, in execution order.
    pub fn take_passes(&mut self) -> Vec<RecordedPass> {
        std::mem::take(&mut self.passes)
    }

    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|b| b.data.as_slice())
    }

    pub fn buffer_label(&self, id: BufferId) -> Option<&str> {
        self.buffers.get(&id).map(|b| b.label.as_str())
    }

    pub fn texture_label(&self, id: TextureId) -> Option<&str> {
        self.textures.get(&id).map(String::as_str)
    }

    pub fn pipeline_variant(&self, id: PipelineId) -> Option<&PipelineVariant> {
        self.pipelines.get(&id)
    }

    /// Bytes of one uniform ring slot.
    pub fn ring_slot(&self, slot: RingSlot) -> Option<&[u8]> {
        let buffer = self.buffers.get(&slot.ring)?;
        let start = slot.offset as usize;
        let end = start + buffer.slot_size as usize;
        buffer.data.get(start..end)
    }

    pub fn signature(&self, passes: &[RecordedPass]) -> Vec<DrawSignature> {
        passes
            .iter()
            .flat_map(|pass| {
                let target = self.target_name(pass.target);
                pass.draws
                    .iter()
                    .map(move |draw| self.draw_signature(target.clone(), draw))
            })
            .collect()
    }

    fn target_name(&self, target: PassTarget) -> String {
        match target {
            PassTarget::Frame => "frame".to_string(),
            PassTarget::CubeFace { cube, face } => format!(
                "{}[{face}]",
                self.texture_label(cube).unwrap_or("<destroyed cube>")
            ),
        }
    }

    fn draw_signature(&self, target: String, draw: &DrawCall) -> DrawSignature {
        let hash_buffer = |hasher: &mut DefaultHasher, id: BufferId| {
            self.buffer_data(id).hash(hasher);
        };

        let mut geometry = DefaultHasher::new();
        hash_buffer(&mut geometry, draw.vertex_buffer);
        hash_buffer(&mut geometry, draw.index_buffer);

        let mut instance_data = DefaultHasher::new();
        hash_buffer(&mut instance_data, draw.instance_buffer);

        let mut uniforms = DefaultHasher::new();
        self.ring_slot(draw.uniforms.frame).hash(&mut uniforms);
        self.ring_slot(draw.uniforms.object).hash(&mut uniforms);
        draw.uniforms
            .skinning
            .and_then(|slot| self.ring_slot(slot))
            .hash(&mut uniforms);

        let label = |id: Option<TextureId>| {
            id.and_then(|id| self.texture_label(id)).map(str::to_string)
        };

        DrawSignature {
            target,
            pipeline: self.pipeline_variant(draw.pipeline).map(PipelineVariant::id),
            geometry: geometry.finish(),
            instance_data: instance_data.finish(),
            textures: [
                label(draw.textures.diffuse),
                label(draw.textures.normal),
                label(draw.textures.environment),
            ],
            uniforms: uniforms.finish(),
            indices: draw.indices.clone(),
            base_vertex: draw.base_vertex,
            instances: draw.instances.clone(),
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuDevice for HeadlessDevice {
    fn supports_instancing(&self) -> bool {
        self.instancing
    }

    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> BufferId {
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            StoredBuffer {
                label: label.to_string(),
                slot_size: contents.len() as u64,
                data: contents.to_vec(),
            },
        );
        self.commands.push(DeviceCommand::CreateBuffer {
            id,
            label: label.to_string(),
            kind,
            size: contents.len(),
        });
        id
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        let Some(buffer) = self.buffers.get_mut(&id) else {
            log::error!("write to unknown buffer {id}");
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.data.len() {
            log::error!(
                "write of {} bytes at {offset} overflows buffer {id} ({} bytes)",
                data.len(),
                buffer.data.len()
            );
            return;
        }
        buffer.data[start..end].copy_from_slice(data);
        self.commands.push(DeviceCommand::WriteBuffer {
            id,
            offset,
            size: data.len(),
        });
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id).is_some() {
            self.commands.push(DeviceCommand::DestroyBuffer(id));
        }
    }

    fn create_uniform_ring(&mut self, kind: UniformKind, slot_size: u64, capacity: u32) -> BufferId {
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            StoredBuffer {
                label: format!("{kind:?} constants"),
                slot_size,
                data: vec![0; (slot_size * capacity as u64) as usize],
            },
        );
        self.commands.push(DeviceCommand::CreateUniformRing {
            id,
            kind,
            slot_size,
            capacity,
        });
        id
    }

    fn create_texture(&mut self, source: &TextureSource) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures.insert(id, source.label.clone());
        self.commands.push(DeviceCommand::CreateTexture {
            id,
            label: source.label.clone(),
        });
        id
    }

    fn create_cube_target(&mut self, label: &str, size: u32) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures.insert(id, label.to_string());
        self.commands.push(DeviceCommand::CreateCubeTarget {
            id,
            label: label.to_string(),
            size,
        });
        id
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.commands.push(DeviceCommand::DestroyTexture(id));
        }
    }

    fn create_pipeline(&mut self, variant: &PipelineVariant) -> Result<PipelineId, LoadError> {
        let id = PipelineId(self.allocate());
        self.pipelines.insert(id, *variant);
        self.commands.push(DeviceCommand::CreatePipeline {
            id,
            variant: *variant,
        });
        Ok(id)
    }

    fn destroy_pipeline(&mut self, id: PipelineId) {
        if self.pipelines.remove(&id).is_some() {
            self.commands.push(DeviceCommand::DestroyPipeline(id));
        }
    }

    fn begin_pass(&mut self, target: PassTarget, clear: Option<[f32; 4]>) {
        if let Some(pass) = self.open_pass.take() {
            log::error!("pass into {:?} was never ended", pass.target);
            self.passes.push(pass);
        }
        self.open_pass = Some(RecordedPass {
            target,
            clear,
            draws: Vec::new(),
        });
        self.commands.push(DeviceCommand::BeginPass { target, clear });
    }

    fn draw(&mut self, call: DrawCall) {
        let Some(pass) = self.open_pass.as_mut() else {
            log::error!("draw outside of a pass was dropped");
            return;
        };
        pass.draws.push(call.clone());
        self.commands.push(DeviceCommand::Draw(call));
    }

    fn end_pass(&mut self) {
        match self.open_pass.take() {
            Some(pass) => {
                self.passes.push(pass);
                self.commands.push(DeviceCommand::EndPass);
            }
            None => log::error!("end_pass without an open pass"),
        }
    }

    fn upload_fence(&mut self) -> UploadFence {
        self.commands.push(DeviceCommand::UploadFence);
        let (sender, fence) = UploadFence::new();
        if self.hold_uploads {
            self.pending_uploads.push(sender);
        } else {
            let _ = sender.send(());
        }
        fence
    }

    fn live_resources(&self) -> LiveResources {
        LiveResources {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            pipelines: self.pipelines.len(),
        }
    }

    fn is_lost(&self) -> bool {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_fences_resolve_on_release() {
        let mut device = HeadlessDevice::new();
        device.hold_uploads(true);
        let mut fence = device.upload_fence();
        assert!(!fence.poll_complete().unwrap());
        assert_eq!(device.pending_uploads(), 1);
        device.release_uploads();
        assert!(fence.poll_complete().unwrap());
    }

    #[test]
    fn out_of_bounds_writes_are_rejected() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer("v", BufferKind::Vertex, &[0; 4]);
        device.write_buffer(id, 2, &[1, 2, 3]);
        assert_eq!(device.buffer_data(id), Some(&[0u8, 0, 0, 0][..]));
        device.write_buffer(id, 2, &[1, 2]);
        assert_eq!(device.buffer_data(id), Some(&[0u8, 0, 1, 2][..]));
    }

    #[test]
    fn destroyed_resources_leave_the_live_count() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer("i", BufferKind::Index, &[0; 8]);
        let texture = device.create_cube_target("cube", 16);
        assert_eq!(device.live_resources().buffers, 1);
        assert_eq!(device.live_resources().textures, 1);
        device.destroy_buffer(buffer);
        device.destroy_texture(texture);
        assert!(device.live_resources().is_empty());
    }
}
