//! Procedural meshes.
//!
//! Every generator returns tangent-space vertices with counter-clockwise
//! front faces. [`MeshBuilder`] packs several meshes into the shared buffers
//! of one [`ObjectData`].

use std::f32::consts::{PI, TAU};

use cgmath::{InnerSpace, Vector3};

use crate::data_structures::object_data::{ObjectData, RenderUnit, TangentVertex, VertexData};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<TangentVertex>,
    pub indices: Vec<u32>,
}

fn vertex(position: Vector3<f32>, normal: Vector3<f32>, tex_coords: [f32; 2], tangent: Vector3<f32>) -> TangentVertex {
    TangentVertex {
        position: position.into(),
        normal: normal.into(),
        tex_coords,
        tangent: tangent.into(),
    }
}

/// Axis aligned box centred at the origin, one texture per face.
pub fn create_box(width: f32, height: f32, depth: f32) -> MeshData {
    let half = Vector3::new(width * 0.5, height * 0.5, depth * 0.5);
    let scale = |v: Vector3<f32>| Vector3::new(v.x * half.x, v.y * half.y, v.z * half.z);
    // (normal, tangent); the up vector of each face is normal x tangent.
    let faces = [
        (Vector3::unit_z(), Vector3::unit_x()),
        (-Vector3::unit_z(), -Vector3::unit_x()),
        (Vector3::unit_x(), -Vector3::unit_z()),
        (-Vector3::unit_x(), Vector3::unit_z()),
        (Vector3::unit_y(), Vector3::unit_x()),
        (-Vector3::unit_y(), Vector3::unit_x()),
    ];

    let mut mesh = MeshData::default();
    for (normal, tangent) in faces {
        let up = normal.cross(tangent);
        let base = mesh.vertices.len() as u32;
        for (s, r) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = scale(normal + tangent * s + up * r);
            let uv = [(s + 1.0) * 0.5, (1.0 - r) * 0.5];
            mesh.vertices.push(vertex(position, normal, uv, tangent));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// UV sphere with poles on the Y axis.
pub fn create_sphere(radius: f32, slice_count: u32, stack_count: u32) -> MeshData {
    let slice_count = slice_count.max(3);
    let stack_count = stack_count.max(2);
    let mut mesh = MeshData::default();

    mesh.vertices.push(vertex(
        Vector3::new(0.0, radius, 0.0),
        Vector3::unit_y(),
        [0.0, 0.0],
        Vector3::unit_x(),
    ));
    let phi_step = PI / stack_count as f32;
    let theta_step = TAU / slice_count as f32;
    for i in 1..stack_count {
        let phi = i as f32 * phi_step;
        for j in 0..=slice_count {
            let theta = j as f32 * theta_step;
            let position = Vector3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.cos(),
                radius * phi.sin() * theta.sin(),
            );
            let tangent = Vector3::new(-theta.sin(), 0.0, theta.cos());
            mesh.vertices.push(vertex(
                position,
                position.normalize(),
                [theta / TAU, phi / PI],
                tangent,
            ));
        }
    }
    mesh.vertices.push(vertex(
        Vector3::new(0.0, -radius, 0.0),
        -Vector3::unit_y(),
        [0.0, 1.0],
        Vector3::unit_x(),
    ));

    for i in 1..=slice_count {
        mesh.indices.extend_from_slice(&[0, i + 1, i]);
    }
    let ring = slice_count + 1;
    let base = 1;
    for i in 0..stack_count - 2 {
        for j in 0..slice_count {
            let a = base + i * ring + j;
            let b = base + (i + 1) * ring + j;
            mesh.indices
                .extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }
    let south = mesh.vertices.len() as u32 - 1;
    let last_ring = south - ring;
    for i in 0..slice_count {
        mesh.indices
            .extend_from_slice(&[south, last_ring + i, last_ring + i + 1]);
    }
    mesh
}

/// Flat `m x n` vertex grid in the XZ plane, facing +Y.
pub fn create_grid(width: f32, depth: f32, m: u32, n: u32) -> MeshData {
    let m = m.max(2);
    let n = n.max(2);
    let (half_width, half_depth) = (width * 0.5, depth * 0.5);
    let dx = width / (n - 1) as f32;
    let dz = depth / (m - 1) as f32;
    let du = 1.0 / (n - 1) as f32;
    let dv = 1.0 / (m - 1) as f32;

    let mut mesh = MeshData::default();
    for i in 0..m {
        let z = half_depth - i as f32 * dz;
        for j in 0..n {
            let x = -half_width + j as f32 * dx;
            mesh.vertices.push(vertex(
                Vector3::new(x, 0.0, z),
                Vector3::unit_y(),
                [j as f32 * du, i as f32 * dv],
                Vector3::unit_x(),
            ));
        }
    }
    for i in 0..m - 1 {
        for j in 0..n - 1 {
            let a = i * n + j;
            let b = (i + 1) * n + j;
            mesh.indices
                .extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }
    mesh
}

/// Capped cylinder (or cone frustum) centred at the origin along Y.
pub fn create_cylinder(
    bottom_radius: f32,
    top_radius: f32,
    height: f32,
    slice_count: u32,
    stack_count: u32,
) -> MeshData {
    let slice_count = slice_count.max(3);
    let stack_count = stack_count.max(1);
    let stack_height = height / stack_count as f32;
    let radius_step = (top_radius - bottom_radius) / stack_count as f32;
    let theta_step = TAU / slice_count as f32;
    let dr = bottom_radius - top_radius;

    let mut mesh = MeshData::default();
    for i in 0..=stack_count {
        let y = -0.5 * height + i as f32 * stack_height;
        let r = bottom_radius + i as f32 * radius_step;
        for j in 0..=slice_count {
            let (s, c) = (j as f32 * theta_step).sin_cos();
            let tangent = Vector3::new(-s, 0.0, c);
            let bitangent = Vector3::new(dr * c, -height, dr * s);
            let normal = tangent.cross(bitangent).normalize();
            mesh.vertices.push(vertex(
                Vector3::new(r * c, y, r * s),
                normal,
                [j as f32 / slice_count as f32, 1.0 - i as f32 / stack_count as f32],
                tangent,
            ));
        }
    }
    let ring = slice_count + 1;
    for i in 0..stack_count {
        for j in 0..slice_count {
            let a = i * ring + j;
            let b = (i + 1) * ring + j;
            mesh.indices
                .extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }

    for (y, radius, normal) in [
        (0.5 * height, top_radius, Vector3::unit_y()),
        (-0.5 * height, bottom_radius, -Vector3::unit_y()),
    ] {
        let base = mesh.vertices.len() as u32;
        for j in 0..=slice_count {
            let (s, c) = (j as f32 * theta_step).sin_cos();
            let (x, z) = (radius * c, radius * s);
            mesh.vertices.push(vertex(
                Vector3::new(x, y, z),
                normal,
                [x / height + 0.5, z / height + 0.5],
                Vector3::unit_x(),
            ));
        }
        let centre = mesh.vertices.len() as u32;
        mesh.vertices
            .push(vertex(Vector3::new(0.0, y, 0.0), normal, [0.5, 0.5], Vector3::unit_x()));
        for j in 0..slice_count {
            if normal.y > 0.0 {
                mesh.indices
                    .extend_from_slice(&[centre, base + j + 1, base + j]);
            } else {
                mesh.indices
                    .extend_from_slice(&[centre, base + j, base + j + 1]);
            }
        }
    }
    mesh
}

/// Concatenates meshes into one vertex and index buffer. Indices stay local to
/// their mesh; units address their vertices through `vertex_base`.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertices: Vec<TangentVertex>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `mesh` and returns a unit covering it, without instances yet.
    pub fn append(&mut self, mesh: MeshData) -> RenderUnit {
        let unit = RenderUnit::new(
            self.vertices.len() as u32,
            mesh.vertices.len() as u32,
            self.indices.len() as u32,
            mesh.indices.len() as u32,
        );
        self.vertices.extend(mesh.vertices);
        self.indices.extend(mesh.indices);
        unit
    }

    pub fn build(self, units: Vec<RenderUnit>) -> ObjectData {
        units
            .into_iter()
            .fold(ObjectData::new(VertexData::Tangent(self.vertices), self.indices), |data, unit| {
                data.with_unit(unit)
            })
    }
}
