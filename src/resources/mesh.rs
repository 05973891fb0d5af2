use std::io::{BufReader, Cursor};

use cgmath::{InnerSpace, Matrix4};

use crate::{
    data_structures::{
        light::Material,
        object_data::{AttributeArray, ObjectData, RenderUnit, TangentVertex, TextureRef, VertexData},
    },
    error::LoadError,
    resources::AssetRoot,
};

/**
 * Obj files don't come with tangents so they have to be calculated for
 * normal maps to work correctly.
 *
 * Each triangle contributes the tangent solving
 *     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
 *     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
 * and every vertex averages the tangents of the triangles it belongs to.
 */
pub fn compute_tangents(vertices: &mut [TangentVertex], indices: &[u32]) {
    let mut sums = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    let mut triangles_included = vec![0u32; vertices.len()];

    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

        let pos0: cgmath::Vector3<_> = v0.position.into();
        let pos1: cgmath::Vector3<_> = v1.position.into();
        let pos2: cgmath::Vector3<_> = v2.position.into();

        let uv0: cgmath::Vector2<_> = v0.tex_coords.into();
        let uv1: cgmath::Vector2<_> = v1.tex_coords.into();
        let uv2: cgmath::Vector2<_> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        // Degenerate mapping, no tangent direction to learn from.
        if det.abs() < f32::EPSILON {
            continue;
        }
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) / det;

        for i in [i0, i1, i2] {
            sums[i] += tangent;
            triangles_included[i] += 1;
        }
    }

    for ((v, sum), n) in vertices.iter_mut().zip(sums).zip(triangles_included) {
        let tangent = if n == 0 || sum.magnitude2() == 0.0 {
            // Any direction orthogonal to the normal keeps the frame valid.
            let normal: cgmath::Vector3<f32> = v.normal.into();
            let helper = if normal.x.abs() < 0.9 {
                cgmath::Vector3::unit_x()
            } else {
                cgmath::Vector3::unit_y()
            };
            normal.cross(helper)
        } else {
            sum / n as f32
        };
        v.tangent = tangent.into();
    }
}

fn material_from_mtl(m: &tobj::Material) -> Material {
    let neutral = Material::neutral();
    let rgb = |c: Option<[f32; 3]>, fallback: [f32; 4], w: f32| match c {
        Some([r, g, b]) => [r, g, b, w],
        None => fallback,
    };
    Material {
        ambient: rgb(m.ambient, neutral.ambient, 1.0),
        diffuse: rgb(m.diffuse, neutral.diffuse, m.dissolve.unwrap_or(1.0)),
        specular: rgb(
            m.specular,
            neutral.specular,
            m.shininess.unwrap_or(neutral.specular[3]),
        ),
        reflect: neutral.reflect,
    }
}

/// Loads every model of an OBJ file into one [`ObjectData`], one unit per
/// model, each drawn once per entry of `worlds`.
///
/// Materials come from the MTL library when there is one. Models whose
/// material has no diffuse texture are drawn untextured.
pub fn load_obj(assets: &AssetRoot, file_name: &str, worlds: Vec<Matrix4<f32>>) -> Result<ObjectData, LoadError> {
    let obj_text = assets.load_string(file_name)?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, obj_materials) = tobj::load_obj_buf(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| match assets.load_string(&p.to_string_lossy()) {
            Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
            Err(e) => {
                log::warn!("material library of {file_name} not loaded: {e}");
                Err(tobj::LoadError::OpenFileFailed)
            }
        },
    )
    .map_err(|e| LoadError::parse(assets.path(file_name), e.to_string()))?;
    // A missing MTL only costs the materials.
    let obj_materials = obj_materials.unwrap_or_default();

    let mut vertices: Vec<TangentVertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut units = Vec::new();

    for m in &models {
        let mut mesh_vertices = (0..m.mesh.positions.len() / 3)
            .map(|i| TangentVertex {
                position: [
                    m.mesh.positions[i * 3],
                    m.mesh.positions[i * 3 + 1],
                    m.mesh.positions[i * 3 + 2],
                ],
                tex_coords: [
                    m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                    1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
                ],
                normal: [
                    m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                    m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                    m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
                ],
                // Calculated below
                tangent: [0.0; 3],
            })
            .collect::<Vec<_>>();
        compute_tangents(&mut mesh_vertices, &m.mesh.indices);

        let obj_material = m.mesh.material_id.and_then(|id| obj_materials.get(id));
        let material = obj_material.map_or_else(Material::neutral, material_from_mtl);
        let texture = obj_material.and_then(|mat| {
            mat.diffuse_texture.as_ref().map(|diffuse| {
                let texture = TextureRef::new(diffuse.clone());
                match &mat.normal_texture {
                    Some(normal) => texture.with_normal_map(normal.clone()),
                    None => texture,
                }
            })
        });

        let unit = RenderUnit::new(
            vertices.len() as u32,
            mesh_vertices.len() as u32,
            indices.len() as u32,
            m.mesh.indices.len() as u32,
        )
        .with_worlds(worlds.clone())
        .with_materials(AttributeArray::single(material))
        .with_textures(texture.map_or_else(AttributeArray::empty, AttributeArray::single));

        vertices.extend(mesh_vertices);
        indices.extend_from_slice(&m.mesh.indices);
        units.push(unit);
    }

    if units.is_empty() {
        return Err(LoadError::parse(assets.path(file_name), "no models found"));
    }
    log::debug!("{file_name}: {} models, {} vertices", units.len(), vertices.len());

    Ok(units
        .into_iter()
        .fold(ObjectData::new(VertexData::Tangent(vertices), indices), |data, unit| {
            data.with_unit(unit)
        }))
}
