//! Per-instance data.
//!
//! [`Instance`] is a convenience for composing world matrices out of
//! translation, rotation and scale. [`InstanceRaw`] is what one instance of a
//! render unit looks like in the instance stream the object shaders read.

use std::{mem, ops::Mul};

use cgmath::{Matrix4, One};

use crate::data_structures::{
    light::Material,
    object_data::{ResolvedInstance, Vertex},
};

/// Position, rotation and scale of one instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Identity transform.
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: cgmath::Vector3::new(x, y, z),
            ..Self::new()
        }
    }

    pub fn with_rotation(mut self, rotation: impl Into<cgmath::Quaternion<f32>>) -> Self {
        self.rotation = rotation.into();
        self
    }

    pub fn with_scale(mut self, x: f32, y: f32, z: f32) -> Self {
        self.scale = cgmath::Vector3::new(x, y, z);
        self
    }

    pub fn with_uniform_scale(self, s: f32) -> Self {
        self.with_scale(s, s, s)
    }

    /// Scale first, then rotate, then translate.
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

impl From<cgmath::Vector3<f32>> for Instance {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl From<&Instance> for Matrix4<f32> {
    fn from(instance: &Instance) -> Self {
        instance.to_matrix()
    }
}

/// `parent * child` places `child` in the space of `parent`.
impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        Instance {
            position: self.position + (self.rotation * scaled_rhs_pos),
            rotation: self.rotation * rhs.rotation,
            scale: cgmath::Vector3::new(
                self.scale.x * rhs.scale.x,
                self.scale.y * rhs.scale.y,
                self.scale.z * rhs.scale.z,
            ),
        }
    }
}

/// One entry of the instance stream.
///
/// The texture transform only keeps the two rows that act on `(u, v, 1)`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    world: [[f32; 4]; 4],
    tex_rows: [[f32; 4]; 2],
    material: Material,
}

impl InstanceRaw {
    pub fn new(world: Matrix4<f32>, tex_transform: Matrix4<f32>, material: Material) -> Self {
        let m = tex_transform;
        Self {
            world: world.into(),
            tex_rows: [[m.x.x, m.y.x, m.w.x, 0.0], [m.x.y, m.y.y, m.w.y, 0.0]],
            material,
        }
    }

    pub fn world(&self) -> Matrix4<f32> {
        self.world.into()
    }

    pub fn material(&self) -> &Material {
        &self.material
    }
}

impl From<&ResolvedInstance<'_>> for InstanceRaw {
    fn from(resolved: &ResolvedInstance<'_>) -> Self {
        Self::new(resolved.world, resolved.texture_transform, resolved.material)
    }
}

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 10] = wgpu::vertex_attr_array![
    6 => Float32x4, 7 => Float32x4, 8 => Float32x4, 9 => Float32x4,
    10 => Float32x4, 11 => Float32x4,
    12 => Float32x4, 13 => Float32x4, 14 => Float32x4, 15 => Float32x4
];

impl Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // Advance once per instance rather than once per vertex.
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        }
    }
}
