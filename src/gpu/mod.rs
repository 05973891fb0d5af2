//! The device seam.
//!
//! Everything that touches the GPU goes through [`GpuDevice`]. Resources are
//! referred to by small ids, never by backend handles, so renderable objects can
//! be driven by the real wgpu backend ([`WgpuDevice`]) or by the recording
//! [`HeadlessDevice`] used for CPU-only runs and tests.
//!
//! The device is owned by the render thread and handed to every operation as
//! `&mut dyn GpuDevice`. Nothing here is `Sync`; rendering is serial.

use std::{
    fmt,
    future::Future,
    ops::Range,
    pin::Pin,
    task::{Context, Poll},
};

use futures::channel::oneshot;

use crate::{error::LoadError, pipelines::PipelineVariant};

pub mod headless;
pub mod wgpu_device;

pub use headless::HeadlessDevice;
pub use wgpu_device::WgpuDevice;

/// Dynamic uniform offsets have to be multiples of this.
pub const UNIFORM_ALIGNMENT: u64 = 256;

macro_rules! resource_id {
    ($name:ident) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

resource_id!(BufferId);
resource_id!(TextureId);
resource_id!(PipelineId);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Instance,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Frame,
    Object,
    Skinning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// Decoded RGBA8 pixels ready for upload.
///
/// Cube textures carry six layers in the order +X, -X, +Y, -Y, +Z, -Z.
#[derive(Clone, PartialEq)]
pub struct TextureSource {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub color_space: ColorSpace,
    pub pixels: Vec<u8>,
}

impl TextureSource {
    pub fn is_cube(&self) -> bool {
        self.layers == 6
    }

    /// A 1x1 texture of a single colour.
    pub fn solid(label: impl Into<String>, rgba: [u8; 4], color_space: ColorSpace) -> Self {
        Self {
            label: label.into(),
            width: 1,
            height: 1,
            layers: 1,
            color_space,
            pixels: rgba.to_vec(),
        }
    }
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureSource")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layers", &self.layers)
            .field("color_space", &self.color_space)
            .finish_non_exhaustive()
    }
}

/// Where a pass writes to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PassTarget {
    /// The frame presented to the user.
    Frame,
    /// One face of a cube render target created by
    /// [`GpuDevice::create_cube_target`].
    CubeFace { cube: TextureId, face: u32 },
}

/// A slot inside a uniform ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RingSlot {
    pub ring: BufferId,
    pub offset: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformSlots {
    pub frame: RingSlot,
    pub object: RingSlot,
    pub skinning: Option<RingSlot>,
}

/// Textures sampled by a draw. Missing entries are replaced by the device's
/// neutral fallbacks (white, flat normal, black cube).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureBindings {
    pub diffuse: Option<TextureId>,
    pub normal: Option<TextureId>,
    pub environment: Option<TextureId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub pipeline: PipelineId,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub instance_buffer: BufferId,
    pub textures: TextureBindings,
    pub uniforms: UniformSlots,
    pub indices: Range<u32>,
    pub base_vertex: i32,
    pub instances: Range<u32>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveResources {
    pub buffers: usize,
    pub textures: usize,
    pub pipelines: usize,
}

impl LiveResources {
    pub fn is_empty(&self) -> bool {
        self.buffers == 0 && self.textures == 0 && self.pipelines == 0
    }
}

/// Resolves once every upload submitted before it was requested has completed
/// on the device.
///
/// The fence can be awaited, or polled without blocking from the frame loop.
#[derive(Debug)]
pub struct UploadFence {
    receiver: oneshot::Receiver<()>,
    complete: bool,
}

impl UploadFence {
    pub fn new() -> (oneshot::Sender<()>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                receiver,
                complete: false,
            },
        )
    }

    pub fn signalled() -> Self {
        let (sender, fence) = Self::new();
        // The receiver is alive, sending cannot fail.
        let _ = sender.send(());
        fence
    }

    /// `Ok(true)` once the uploads completed. A dropped sender means the device
    /// went away before signalling and is reported as [`LoadError::Cancelled`].
    pub fn poll_complete(&mut self) -> Result<bool, LoadError> {
        if self.complete {
            return Ok(true);
        }
        match self.receiver.try_recv() {
            Ok(Some(())) => {
                self.complete = true;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(oneshot::Canceled) => Err(LoadError::Cancelled),
        }
    }
}

impl Future for UploadFence {
    type Output = Result<(), LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.complete {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(())) => {
                self.complete = true;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(LoadError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// All device work of the renderer.
///
/// Passes are recorded between [`begin_pass`](Self::begin_pass) and
/// [`end_pass`](Self::end_pass) and executed in recording order, so a cube face
/// rendered in an earlier pass is complete before a later pass samples it.
pub trait GpuDevice {
    /// `false` when the target cannot draw more than one instance per call.
    fn supports_instancing(&self) -> bool;

    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> BufferId;
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, id: BufferId);

    /// Uniform storage of `capacity` slots addressed by dynamic offsets.
    /// `slot_size` is already aligned to [`UNIFORM_ALIGNMENT`].
    fn create_uniform_ring(&mut self, kind: UniformKind, slot_size: u64, capacity: u32) -> BufferId;

    fn create_texture(&mut self, source: &TextureSource) -> TextureId;
    /// A cube colour target with its own depth buffer, renderable face by face
    /// and sampleable as a cube texture afterwards.
    fn create_cube_target(&mut self, label: &str, size: u32) -> TextureId;
    fn destroy_texture(&mut self, id: TextureId);

    fn create_pipeline(&mut self, variant: &PipelineVariant) -> Result<PipelineId, LoadError>;
    fn destroy_pipeline(&mut self, id: PipelineId);

    /// Starts a pass. `clear` clears colour and depth, `None` keeps the
    /// target's contents.
    fn begin_pass(&mut self, target: PassTarget, clear: Option<[f32; 4]>);
    fn draw(&mut self, call: DrawCall);
    fn end_pass(&mut self);

    fn upload_fence(&mut self) -> UploadFence;

    fn live_resources(&self) -> LiveResources;

    /// `true` once the device is gone. Its resources can only be released;
    /// the scene has to be loaded again on a new device.
    fn is_lost(&self) -> bool {
        false
    }
}

/// Rounds `size` up to the next multiple of [`UNIFORM_ALIGNMENT`].
pub fn align_uniform(size: u64) -> u64 {
    size.div_ceil(UNIFORM_ALIGNMENT) * UNIFORM_ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_are_rounded_to_the_dynamic_offset_alignment() {
        assert_eq!(align_uniform(1), 256);
        assert_eq!(align_uniform(256), 256);
        assert_eq!(align_uniform(320), 512);
    }

    #[test]
    fn signalled_fence_is_complete() {
        let mut fence = UploadFence::signalled();
        assert!(fence.poll_complete().unwrap());
    }

    #[test]
    fn fence_reports_a_dropped_sender() {
        let (sender, mut fence) = UploadFence::new();
        assert!(!fence.poll_complete().unwrap());
        drop(sender);
        assert!(matches!(fence.poll_complete(), Err(LoadError::Cancelled)));
    }
}
