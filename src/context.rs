//! wgpu bootstrap.
//!
//! A [`Context`] owns the adapter-side objects (surface, configuration, depth
//! buffer) and the [`WgpuDevice`] every renderable object is created through.
//! It renders either to a window surface or, headless, to an off-screen
//! texture that can be read back.

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use instant::Duration;
use winit::window::Window;

use crate::{
    data_structures::texture::Texture,
    gpu::{WgpuDevice, wgpu_device::FrameTarget},
    scene::SceneComposer,
};

const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug)]
enum Output {
    Surface {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        configured: bool,
    },
    Offscreen(Texture),
}

#[derive(Debug)]
pub struct Context {
    output: Output,
    pub config: wgpu::SurfaceConfiguration,
    pub depth_texture: Texture,
    pub gpu: WgpuDevice,
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> anyhow::Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .context("no suitable graphics adapter")?;
    log::info!("using adapter {:?}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("mirror-ngin device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        })
        .await
        .context("cannot create the device")?;
    Ok((adapter, device, queue))
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..wgpu::InstanceDescriptor::new_without_display_handle()
    })
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let instance = new_instance();
        let surface = instance.create_surface(window.clone())?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shaders output linear colour and rely on an sRGB target for the
        // conversion.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("the surface supports no formats"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let depth_texture = Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");
        let gpu = WgpuDevice::new(device, queue, surface_format);
        Ok(Self {
            output: Output::Surface {
                window,
                surface,
                configured: false,
            },
            config,
            depth_texture,
            gpu,
        })
    }

    /// A context without a window, rendering into a `width` x `height`
    /// texture.
    pub async fn headless(width: u32, height: u32) -> anyhow::Result<Self> {
        let instance = new_instance();
        let (_, device, queue) = request_device(&instance, None).await?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: HEADLESS_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let target = offscreen_target(&device, &config);
        let depth_texture = Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");
        let gpu = WgpuDevice::new(device, queue, HEADLESS_FORMAT);
        Ok(Self {
            output: Output::Offscreen(target),
            config,
            depth_texture,
            gpu,
        })
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.output {
            Output::Surface { window, .. } => Some(window),
            Output::Offscreen(_) => None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        let device = self.gpu.device().clone();
        match &mut self.output {
            Output::Surface {
                surface, configured, ..
            } => {
                surface.configure(&device, &self.config);
                *configured = true;
            }
            Output::Offscreen(target) => *target = offscreen_target(&device, &self.config),
        }
        self.depth_texture = Texture::create_depth_texture(&device, [width, height], "depth_texture");
    }

    /// Records the scene and submits it to the current output.
    pub fn render(&mut self, scene: &mut SceneComposer) -> Result<(), wgpu::CurrentSurfaceTexture> {
        self.gpu.maintain();
        scene.poll_loading(&mut self.gpu);
        scene.render(&mut self.gpu);

        match &self.output {
            Output::Surface {
                window,
                surface,
                configured,
            } => {
                window.request_redraw();
                if !configured {
                    // Recorded passes are dropped with the next submit.
                    self.gpu.submit(None);
                    return Ok(());
                }
                let output = match surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(texture)
                    | wgpu::CurrentSurfaceTexture::Suboptimal(texture) => texture,
                    other => return Err(other),
                };
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.gpu.submit(Some(FrameTarget {
                    colour: &view,
                    depth: &self.depth_texture.view,
                }));
                output.present();
            }
            Output::Offscreen(target) => {
                self.gpu.submit(Some(FrameTarget {
                    colour: &target.view,
                    depth: &self.depth_texture.view,
                }));
            }
        }
        Ok(())
    }

    /// Reads the off-screen target back. Fails for windowed contexts.
    pub async fn capture(&self) -> anyhow::Result<image::RgbaImage> {
        let Output::Offscreen(target) = &self.output else {
            return Err(anyhow!("only headless contexts can be captured"));
        };
        let device = self.gpu.device();
        let (width, height) = self.size();
        let unpadded_row = 4 * width;
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture buffer"),
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("capture encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue().submit(std::iter::once(encoder.finish()));

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| anyhow!("waiting for the capture failed: {e}"))?;
        rx.receive()
            .await
            .ok_or_else(|| anyhow!("capture mapping was dropped"))??;

        let data = buffer_slice.get_mapped_range();
        let pixels: Vec<u8> = data
            .chunks(padded_row as usize)
            .flat_map(|row| &row[..unpadded_row as usize])
            .copied()
            .collect();
        drop(data);
        output_buffer.unmap();
        image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| anyhow!("capture has the wrong size"))
    }
}

fn offscreen_target(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: config.format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Texture { texture, view }
}
