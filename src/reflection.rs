//! Dynamic cube-map reflections.
//!
//! The scene around a reflective object is rendered into the six faces of a
//! cube target from the object's centre, then the object samples that cube.

use cgmath::Point3;

use crate::{
    camera::{Camera, Projection},
    error::LoadError,
    gpu::{GpuDevice, PassTarget, TextureId, UploadFence},
};

pub const DEFAULT_CUBE_MAP_SIZE: u32 = 256;

#[derive(Debug)]
pub struct DynamicCubeMap {
    size: u32,
    centre: Point3<f32>,
    projection: Projection,
    target: Option<TextureId>,
    fence: Option<UploadFence>,
}

impl DynamicCubeMap {
    pub fn new(size: u32, centre: Point3<f32>) -> Self {
        Self {
            size: size.max(1),
            centre,
            projection: Projection::cube_face(0.1, 1000.0),
            target: None,
            fence: None,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn centre(&self) -> Point3<f32> {
        self.centre
    }

    pub fn set_centre(&mut self, centre: Point3<f32>) {
        self.centre = centre;
    }

    /// The cube texture, once created.
    pub fn texture(&self) -> Option<TextureId> {
        self.target
    }

    pub fn create_device_dependent_resources(&mut self, device: &mut dyn GpuDevice) {
        if self.target.is_some() {
            return;
        }
        self.target = Some(device.create_cube_target("dynamic cube map", self.size));
        self.fence = Some(device.upload_fence());
    }

    pub fn poll_loading(&mut self) -> Result<bool, LoadError> {
        if self.target.is_none() {
            return Ok(false);
        }
        match &mut self.fence {
            Some(fence) => {
                let done = fence.poll_complete()?;
                if done {
                    self.fence = None;
                }
                Ok(done)
            }
            None => Ok(true),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.target.is_some() && self.fence.is_none()
    }

    /// Camera, projection and pass target of one face, in the order
    /// +X, -X, +Y, -Y, +Z, -Z.
    pub fn face(&self, face: u32) -> Option<(Camera, Projection, PassTarget)> {
        let cube = self.target?;
        (face < 6).then(|| {
            (
                Camera::cube_face(self.centre, face),
                self.projection,
                PassTarget::CubeFace { cube, face },
            )
        })
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(target) = self.target.take() {
            device.destroy_texture(target);
        }
        self.fence = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn faces_need_the_target() {
        let mut device = HeadlessDevice::new();
        let mut cube = DynamicCubeMap::new(64, Point3::new(0.0, 2.0, 0.0));
        assert!(cube.face(0).is_none());
        cube.create_device_dependent_resources(&mut device);
        assert!(cube.poll_loading().unwrap());
        let (camera, _, target) = cube.face(3).unwrap();
        assert_eq!(camera.position, Point3::new(0.0, 2.0, 0.0));
        assert!(matches!(target, PassTarget::CubeFace { face: 3, .. }));
        assert!(cube.face(6).is_none());

        cube.release(&mut device);
        cube.release(&mut device);
        assert!(device.live_resources().is_empty());
    }
}
