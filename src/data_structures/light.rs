//! Fixed-function lighting data: directional lights, surface materials and fog.
//!
//! These are plain data. Every struct here is laid out the way the shaders
//! expect it: fields are packed into 4D vectors and nothing straddles a 16 byte
//! boundary.

/// A light infinitely far away, shining along `direction`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLight {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub direction: [f32; 3],
    // Pad the last float so lights can be stored in an array.
    pub _pad: f32,
}

impl DirectionalLight {
    pub fn new(ambient: [f32; 4], diffuse: [f32; 4], specular: [f32; 4], direction: [f32; 3]) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
            direction,
            _pad: 0.0,
        }
    }
}

/// Surface response to light. `specular[3]` is the specular power and
/// `reflect` scales the environment-map contribution.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Material {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub reflect: [f32; 4],
}

impl Material {
    pub fn new(ambient: [f32; 4], diffuse: [f32; 4], specular: [f32; 4], reflect: [f32; 4]) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
            reflect,
        }
    }

    /// Neutral grey used when a mesh file carries no material of its own.
    pub fn neutral() -> Self {
        Self {
            ambient: [0.5, 0.5, 0.5, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.2, 0.2, 0.2, 16.0],
            reflect: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Linear distance fog applied by every object shader.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Fog {
    pub start: f32,
    pub range: f32,
    pub colour: [f32; 4],
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            start: 10.0,
            range: 60.0,
            colour: [0.65, 0.65, 0.65, 1.0],
        }
    }
}
