//! [`GpuDevice`] over wgpu.
//!
//! Resources live in id-keyed maps. Passes are recorded as they are issued and
//! replayed into real render passes by [`WgpuDevice::submit`], which is the
//! only place a command encoder exists.

use std::{
    collections::HashMap,
    iter,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    data_structures::texture::{CubeTarget, Texture, create_default_sampler},
    error::LoadError,
    gpu::{
        BufferId, BufferKind, ColorSpace, DrawCall, GpuDevice, LiveResources, PassTarget,
        PipelineId, TextureBindings, TextureId, TextureSource, UniformKind, UniformSlots,
        UploadFence,
    },
    pipelines::{
        PipelineVariant,
        object::{Winding, constants_layout, mk_variant_pipeline, texture_layout},
    },
};

const SKINNING_SLOT_SIZE: u64 = 96 * 64;

/// The views a frame pass renders into.
pub struct FrameTarget<'a> {
    pub colour: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
}

#[derive(Debug)]
enum GpuTexture {
    Sampled(Texture),
    Cube(CubeTarget),
}

impl GpuTexture {
    fn view(&self) -> &wgpu::TextureView {
        match self {
            GpuTexture::Sampled(texture) => &texture.view,
            GpuTexture::Cube(cube) => &cube.colour.view,
        }
    }
}

#[derive(Debug)]
struct GpuBuffer {
    buffer: wgpu::Buffer,
    slot_size: u64,
}

#[derive(Debug)]
struct VariantPipelines {
    frame: wgpu::RenderPipeline,
    mirrored: wgpu::RenderPipeline,
}

#[derive(Debug)]
struct Pass {
    target: PassTarget,
    clear: Option<[f32; 4]>,
    draws: Vec<DrawCall>,
}

#[derive(Debug, Copy, Clone)]
struct Fallbacks {
    white: TextureId,
    flat_normal: TextureId,
    black_cube: TextureId,
    skinning: BufferId,
}

type ConstantsKey = (BufferId, BufferId, BufferId);
type TexturesKey = (TextureId, TextureId, TextureId);

#[derive(Debug)]
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    constants_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    next_id: u32,
    buffers: HashMap<BufferId, GpuBuffer>,
    textures: HashMap<TextureId, GpuTexture>,
    pipelines: HashMap<PipelineId, VariantPipelines>,
    constant_groups: HashMap<ConstantsKey, wgpu::BindGroup>,
    texture_groups: HashMap<TexturesKey, wgpu::BindGroup>,
    fallbacks: Option<Fallbacks>,
    passes: Vec<Pass>,
    open_pass: Option<Pass>,
    lost: Arc<AtomicBool>,
}

impl WgpuDevice {
    /// `color_format` is the format of the frame; cube targets use it too so a
    /// pipeline can draw into both.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, color_format: wgpu::TextureFormat) -> Self {
        let constants_layout = constants_layout(&device);
        let texture_layout = texture_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Object Pipeline Layout"),
            bind_group_layouts: &[Some(&constants_layout), Some(&texture_layout)],
            immediate_size: 0,
        });
        let sampler = create_default_sampler(&device);
        let lost = Arc::new(AtomicBool::new(false));
        {
            let lost = lost.clone();
            device.set_device_lost_callback(move |reason, message| {
                log::error!("graphics device lost ({reason:?}): {message}");
                lost.store(true, Ordering::SeqCst);
            });
        }

        let mut this = Self {
            device,
            queue,
            color_format,
            constants_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            constant_groups: HashMap::new(),
            texture_groups: HashMap::new(),
            fallbacks: None,
            passes: Vec::new(),
            open_pass: None,
            lost,
        };

        let white = this.create_texture(&TextureSource::solid(
            "fallback white",
            [255, 255, 255, 255],
            ColorSpace::Srgb,
        ));
        let flat_normal = this.create_texture(&TextureSource::solid(
            "fallback normal",
            [127, 127, 255, 255],
            ColorSpace::Linear,
        ));
        let black_cube = this.create_texture(&TextureSource {
            label: "fallback environment".into(),
            width: 1,
            height: 1,
            layers: 6,
            color_space: ColorSpace::Srgb,
            pixels: [0, 0, 0, 255].repeat(6),
        });
        let skinning = this.create_uniform_ring(UniformKind::Skinning, SKINNING_SLOT_SIZE, 1);
        this.fallbacks = Some(Fallbacks {
            white,
            flat_normal,
            black_cube,
            skinning,
        });
        this
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    /// Lets wgpu run completed-work callbacks, which resolves upload fences.
    pub fn maintain(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
    }

    /// Encodes every pass recorded since the last submit and hands the work to
    /// the queue. Frame passes are skipped when no `frame` is given.
    pub fn submit(&mut self, frame: Option<FrameTarget<'_>>) {
        if let Some(pass) = self.open_pass.take() {
            log::error!("pass into {:?} was never ended", pass.target);
            self.passes.push(pass);
        }
        let passes = std::mem::take(&mut self.passes);
        let Some(fallbacks) = self.fallbacks else {
            return;
        };

        for pass in &passes {
            for draw in &pass.draws {
                self.prepare_bind_groups(draw, fallbacks);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        for pass in &passes {
            let (colour, depth, winding) = match pass.target {
                PassTarget::Frame => match &frame {
                    Some(frame) => (frame.colour, frame.depth, Winding::Frame),
                    None => continue,
                },
                PassTarget::CubeFace { cube, face } => match self.textures.get(&cube) {
                    Some(GpuTexture::Cube(target)) if (face as usize) < target.face_views.len() => {
                        (&target.face_views[face as usize], &target.depth.view, Winding::Mirrored)
                    }
                    _ => {
                        log::error!("pass into missing cube face {cube} [{face}] was dropped");
                        continue;
                    }
                },
            };

            let load = match pass.clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let depth_load = match pass.clear {
                Some(_) => wgpu::LoadOp::Clear(1.0),
                None => wgpu::LoadOp::Load,
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: colour,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            for draw in &pass.draws {
                self.encode_draw(&mut render_pass, draw, winding, fallbacks);
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
    }

    fn constants_key(uniforms: &UniformSlots, fallbacks: Fallbacks) -> ConstantsKey {
        (
            uniforms.frame.ring,
            uniforms.object.ring,
            uniforms
                .skinning
                .map(|slot| slot.ring)
                .unwrap_or(fallbacks.skinning),
        )
    }

    fn textures_key(textures: &TextureBindings, fallbacks: Fallbacks) -> TexturesKey {
        (
            textures.diffuse.unwrap_or(fallbacks.white),
            textures.normal.unwrap_or(fallbacks.flat_normal),
            textures.environment.unwrap_or(fallbacks.black_cube),
        )
    }

    fn prepare_bind_groups(&mut self, draw: &DrawCall, fallbacks: Fallbacks) {
        let constants = Self::constants_key(&draw.uniforms, fallbacks);
        if !self.constant_groups.contains_key(&constants) {
            let rings = [constants.0, constants.1, constants.2];
            let bindings: Option<Vec<_>> = rings
                .iter()
                .map(|id| self.buffers.get(id))
                .collect::<Option<Vec<_>>>();
            match bindings {
                Some(buffers) => {
                    let entries: Vec<_> = buffers
                        .iter()
                        .enumerate()
                        .map(|(binding, ring)| wgpu::BindGroupEntry {
                            binding: binding as u32,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &ring.buffer,
                                offset: 0,
                                size: wgpu::BufferSize::new(ring.slot_size),
                            }),
                        })
                        .collect();
                    let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        layout: &self.constants_layout,
                        entries: &entries,
                        label: Some("constants_bind_group"),
                    });
                    self.constant_groups.insert(constants, group);
                }
                None => log::error!("draw references a destroyed constant ring"),
            }
        }

        let textures = Self::textures_key(&draw.textures, fallbacks);
        if !self.texture_groups.contains_key(&textures) {
            let views = (
                self.textures.get(&textures.0),
                self.textures.get(&textures.1),
                self.textures.get(&textures.2),
            );
            match views {
                (Some(diffuse), Some(normal), Some(environment)) => {
                    let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        layout: &self.texture_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(diffuse.view()),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::TextureView(normal.view()),
                            },
                            wgpu::BindGroupEntry {
                                binding: 2,
                                resource: wgpu::BindingResource::TextureView(environment.view()),
                            },
                            wgpu::BindGroupEntry {
                                binding: 3,
                                resource: wgpu::BindingResource::Sampler(&self.sampler),
                            },
                        ],
                        label: Some("object_texture_bind_group"),
                    });
                    self.texture_groups.insert(textures, group);
                }
                _ => log::error!("draw references a destroyed texture"),
            }
        }
    }

    fn encode_draw(
        &self,
        render_pass: &mut wgpu::RenderPass<'_>,
        draw: &DrawCall,
        winding: Winding,
        fallbacks: Fallbacks,
    ) {
        let resources = (
            self.pipelines.get(&draw.pipeline),
            self.constant_groups
                .get(&Self::constants_key(&draw.uniforms, fallbacks)),
            self.texture_groups
                .get(&Self::textures_key(&draw.textures, fallbacks)),
            self.buffers.get(&draw.vertex_buffer),
            self.buffers.get(&draw.instance_buffer),
            self.buffers.get(&draw.index_buffer),
        );
        let (Some(pipelines), Some(constants), Some(textures), Some(vertex), Some(instance), Some(index)) =
            resources
        else {
            log::error!("draw with released resources was dropped");
            return;
        };

        let pipeline = match winding {
            Winding::Frame => &pipelines.frame,
            Winding::Mirrored => &pipelines.mirrored,
        };
        let offsets = [
            draw.uniforms.frame.offset,
            draw.uniforms.object.offset,
            draw.uniforms.skinning.map(|slot| slot.offset).unwrap_or(0),
        ];
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, constants, &offsets);
        render_pass.set_bind_group(1, textures, &[]);
        render_pass.set_vertex_buffer(0, vertex.buffer.slice(..));
        render_pass.set_vertex_buffer(1, instance.buffer.slice(..));
        render_pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(draw.indices.clone(), draw.base_vertex, draw.instances.clone());
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GpuDevice for WgpuDevice {
    fn supports_instancing(&self) -> bool {
        true
    }

    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> BufferId {
        use wgpu::util::DeviceExt;

        let usage = match kind {
            BufferKind::Vertex | BufferKind::Instance => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                slot_size: contents.len() as u64,
            },
        );
        id
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(&id) {
            Some(buffer) => self.queue.write_buffer(&buffer.buffer, offset, data),
            None => log::error!("write to unknown buffer {id}"),
        }
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id) {
            self.constant_groups
                .retain(|key, _| key.0 != id && key.1 != id && key.2 != id);
            buffer.buffer.destroy();
        }
    }

    fn create_uniform_ring(&mut self, kind: UniformKind, slot_size: u64, capacity: u32) -> BufferId {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{kind:?} constants")),
            size: slot_size * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = BufferId(self.allocate());
        self.buffers.insert(id, GpuBuffer { buffer, slot_size });
        id
    }

    fn create_texture(&mut self, source: &TextureSource) -> TextureId {
        let texture = Texture::from_source(&self.device, &self.queue, source);
        let id = TextureId(self.allocate());
        self.textures.insert(id, GpuTexture::Sampled(texture));
        id
    }

    fn create_cube_target(&mut self, label: &str, size: u32) -> TextureId {
        let target = CubeTarget::new(&self.device, self.color_format, size, label);
        let id = TextureId(self.allocate());
        self.textures.insert(id, GpuTexture::Cube(target));
        id
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(&id) {
            self.texture_groups
                .retain(|key, _| key.0 != id && key.1 != id && key.2 != id);
            match texture {
                GpuTexture::Sampled(texture) => texture.texture.destroy(),
                GpuTexture::Cube(cube) => {
                    cube.colour.texture.destroy();
                    cube.depth.texture.destroy();
                }
            }
        }
    }

    fn create_pipeline(&mut self, variant: &PipelineVariant) -> Result<PipelineId, LoadError> {
        if variant.light_count > 3 {
            return Err(LoadError::Device(format!(
                "no pipeline for {} lights",
                variant.light_count
            )));
        }
        let make = |winding| {
            mk_variant_pipeline(
                &self.device,
                &self.pipeline_layout,
                self.color_format,
                variant,
                winding,
            )
        };
        let pipelines = VariantPipelines {
            frame: make(Winding::Frame),
            mirrored: make(Winding::Mirrored),
        };
        let id = PipelineId(self.allocate());
        self.pipelines.insert(id, pipelines);
        Ok(id)
    }

    fn destroy_pipeline(&mut self, id: PipelineId) {
        self.pipelines.remove(&id);
    }

    fn begin_pass(&mut self, target: PassTarget, clear: Option<[f32; 4]>) {
        if let Some(pass) = self.open_pass.take() {
            log::error!("pass into {:?} was never ended", pass.target);
            self.passes.push(pass);
        }
        self.open_pass = Some(Pass {
            target,
            clear,
            draws: Vec::new(),
        });
    }

    fn draw(&mut self, call: DrawCall) {
        match self.open_pass.as_mut() {
            Some(pass) => pass.draws.push(call),
            None => log::error!("draw outside of a pass was dropped"),
        }
    }

    fn end_pass(&mut self) {
        match self.open_pass.take() {
            Some(pass) => self.passes.push(pass),
            None => log::error!("end_pass without an open pass"),
        }
    }

    fn upload_fence(&mut self) -> UploadFence {
        let (sender, fence) = UploadFence::new();
        // Staged writes only reach the device with the next submission.
        self.queue.submit(iter::empty());
        self.queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        fence
    }

    fn live_resources(&self) -> LiveResources {
        // The fallback textures and skinning ring are not counted.
        LiveResources {
            buffers: self.buffers.len().saturating_sub(1),
            textures: self.textures.len().saturating_sub(3),
            pipelines: self.pipelines.len(),
        }
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}
