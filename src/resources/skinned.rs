//! Skinned meshes from glTF.
//!
//! Every primitive of every skinned node becomes one subset of a shared
//! vertex and index buffer. The first skin of the document is the skeleton;
//! all animations become clips of it, keyed by name.

use std::collections::HashMap;

use cgmath::{Matrix4, Quaternion, SquareMatrix, Vector3};

use crate::{
    animation::{AnimationClip, Keyframes, SkinData},
    data_structures::{
        instance::Instance,
        light::Material,
        object_data::{SkinnedVertex, TangentVertex, TextureRef},
    },
    error::LoadError,
    resources::{AssetRoot, mesh::compute_tangents},
};

/// One drawable part of a skinned mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Subset {
    pub name: String,
    pub vertex_base: u32,
    pub vertex_count: u32,
    pub index_start: u32,
    pub index_count: u32,
    pub material: Material,
    pub texture: Option<TextureRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkinnedMesh {
    pub vertices: Vec<SkinnedVertex>,
    pub indices: Vec<u32>,
    pub subsets: Vec<Subset>,
    pub skin: SkinData,
}

fn gltf_error(assets: &AssetRoot, file_name: &str, source: gltf::Error) -> LoadError {
    LoadError::Gltf {
        path: assets.path(file_name),
        source,
    }
}

fn image_uri(source: gltf::image::Source<'_>) -> Option<String> {
    match source {
        gltf::image::Source::Uri { uri, .. } => Some(uri.to_string()),
        gltf::image::Source::View { .. } => {
            log::warn!("embedded glTF images are not supported, the subset is drawn untextured");
            None
        }
    }
}

fn local_transform(node: &gltf::Node<'_>) -> Instance {
    let (t, r, s) = node.transform().decomposed();
    Instance {
        position: Vector3::from(t),
        rotation: Quaternion::new(r[3], r[0], r[1], r[2]),
        scale: Vector3::from(s),
    }
}

pub fn load_skinned_gltf(assets: &AssetRoot, file_name: &str) -> Result<SkinnedMesh, LoadError> {
    let bytes = assets.load_binary(file_name)?;
    let gltf = gltf::Gltf::from_slice(&bytes).map_err(|e| gltf_error(assets, file_name, e))?;

    // Buffer uris are relative to the glTF file.
    let base_dir = std::path::Path::new(file_name)
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => buffer_data.push(blob.to_vec()),
                None => {
                    return Err(LoadError::parse(assets.path(file_name), "binary chunk is missing"));
                }
            },
            gltf::buffer::Source::Uri(uri) => {
                let path = base_dir.join(uri);
                buffer_data.push(assets.load_binary(&path.to_string_lossy())?);
            }
        }
    }
    let buffers = |buffer: gltf::Buffer<'_>| buffer_data.get(buffer.index()).map(|data| data.as_slice());

    let skin = gltf
        .skins()
        .next()
        .ok_or_else(|| LoadError::parse(assets.path(file_name), "the file contains no skin"))?;

    let joints: Vec<usize> = skin.joints().map(|node| node.index()).collect();
    let joint_of: HashMap<usize, usize> = joints.iter().enumerate().map(|(bone, &node)| (node, bone)).collect();

    let mut node_parent: HashMap<usize, usize> = HashMap::new();
    for node in gltf.nodes() {
        for child in node.children() {
            node_parent.insert(child.index(), node.index());
        }
    }
    let nodes: Vec<gltf::Node<'_>> = gltf.nodes().collect();

    let mut parents = Vec::with_capacity(joints.len());
    let mut root_offsets = Vec::with_capacity(joints.len());
    let mut rest = Vec::with_capacity(joints.len());
    for &node in &joints {
        rest.push(local_transform(&nodes[node]));
        let mut offset = Matrix4::identity();
        let mut parent = None;
        let mut current = node_parent.get(&node).copied();
        while let Some(ancestor) = current {
            if let Some(&bone) = joint_of.get(&ancestor) {
                parent = Some(bone);
                break;
            }
            offset = Matrix4::from(nodes[ancestor].transform().matrix()) * offset;
            current = node_parent.get(&ancestor).copied();
        }
        parents.push(parent);
        root_offsets.push(if parent.is_some() { Matrix4::identity() } else { offset });
    }

    let inverse_bind: Vec<Matrix4<f32>> = match skin.reader(buffers).read_inverse_bind_matrices() {
        Some(matrices) => matrices.map(Matrix4::from).collect(),
        None => vec![Matrix4::identity(); joints.len()],
    };

    let mut skin_data = SkinData::new(parents, inverse_bind, rest, root_offsets)?;

    for animation in gltf.animations() {
        let name = animation.name().unwrap_or("Default").to_string();
        let mut clip = AnimationClip::new(name, joints.len());
        for channel in animation.channels() {
            let Some(&bone) = joint_of.get(&channel.target().node().index()) else {
                continue;
            };
            let reader = channel.reader(buffers);
            let times: Vec<f32> = match reader.read_inputs() {
                Some(inputs) => inputs.collect(),
                None => continue,
            };
            let keyframes = match reader.read_outputs() {
                Some(gltf::animation::util::ReadOutputs::Translations(translations)) => {
                    Keyframes::Translation(translations.map(Vector3::from).collect())
                }
                Some(gltf::animation::util::ReadOutputs::Rotations(rotations)) => Keyframes::Rotation(
                    rotations
                        .into_f32()
                        .map(|q| Quaternion::new(q[3], q[0], q[1], q[2]))
                        .collect(),
                ),
                Some(gltf::animation::util::ReadOutputs::Scales(scales)) => {
                    Keyframes::Scale(scales.map(Vector3::from).collect())
                }
                Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) | None => Keyframes::Other,
            };
            clip.bones[bone].add_channel(&times, keyframes);
        }
        skin_data.add_clip(clip);
    }

    let mut vertices: Vec<SkinnedVertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut subsets = Vec::new();

    for node in gltf.nodes().filter(|node| node.skin().is_some()) {
        let Some(mesh) = node.mesh() else {
            continue;
        };
        for primitive in mesh.primitives() {
            let name = format!("{}/{}", mesh.name().unwrap_or("mesh"), primitive.index());
            let reader = primitive.reader(buffers);
            let invalid = |what: &str| LoadError::InvalidObjectData(format!("{file_name}: {name} has no {what}"));

            let positions: Vec<[f32; 3]> = reader.read_positions().ok_or_else(|| invalid("positions"))?.collect();
            let normals: Vec<[f32; 3]> = reader.read_normals().ok_or_else(|| invalid("normals"))?.collect();
            let joints: Vec<[u16; 4]> = reader
                .read_joints(0)
                .ok_or_else(|| invalid("joint indices"))?
                .into_u16()
                .collect();
            let weights: Vec<[f32; 4]> = reader
                .read_weights(0)
                .ok_or_else(|| invalid("joint weights"))?
                .into_f32()
                .collect();
            let tex_coords: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|uv| uv.into_f32().collect())
                .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);
            let mesh_indices: Vec<u32> = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let tangents: Vec<[f32; 4]> = match reader.read_tangents() {
                Some(tangents) => tangents.collect(),
                None => {
                    let mut frame: Vec<TangentVertex> = positions
                        .iter()
                        .zip(&normals)
                        .zip(&tex_coords)
                        .map(|((&position, &normal), &tex_coords)| TangentVertex {
                            position,
                            normal,
                            tex_coords,
                            tangent: [0.0; 3],
                        })
                        .collect();
                    compute_tangents(&mut frame, &mesh_indices);
                    frame.iter().map(|v| [v.tangent[0], v.tangent[1], v.tangent[2], 1.0]).collect()
                }
            };

            let count = positions.len();
            if [normals.len(), joints.len(), weights.len(), tex_coords.len(), tangents.len()]
                .iter()
                .any(|&len| len != count)
            {
                return Err(invalid("consistent attribute counts"));
            }
            if let Some(&bad) = mesh_indices.iter().find(|&&i| i as usize >= count) {
                return Err(LoadError::InvalidObjectData(format!(
                    "{file_name}: {name} references vertex {bad} of {count}"
                )));
            }

            let material = primitive.material();
            let pbr = material.pbr_metallic_roughness();
            let diffuse = pbr.base_color_factor();
            let texture = pbr
                .base_color_texture()
                .and_then(|info| image_uri(info.texture().source().source()))
                .map(|uri| {
                    let texture = TextureRef::new(base_dir.join(uri).to_string_lossy());
                    match material
                        .normal_texture()
                        .and_then(|normal| image_uri(normal.texture().source().source()))
                    {
                        Some(normal) => texture.with_normal_map(base_dir.join(normal).to_string_lossy()),
                        None => texture,
                    }
                });

            subsets.push(Subset {
                name,
                vertex_base: vertices.len() as u32,
                vertex_count: count as u32,
                index_start: indices.len() as u32,
                index_count: mesh_indices.len() as u32,
                material: Material {
                    ambient: diffuse,
                    diffuse,
                    specular: [0.2, 0.2, 0.2, 16.0],
                    reflect: [0.0, 0.0, 0.0, 1.0],
                },
                texture,
            });

            for i in 0..count {
                let j = joints[i];
                vertices.push(SkinnedVertex {
                    position: positions[i],
                    normal: normals[i],
                    tex_coords: tex_coords[i],
                    tangent: tangents[i],
                    weights: weights[i],
                    bone_indices: [j[0] as u32, j[1] as u32, j[2] as u32, j[3] as u32],
                });
            }
            indices.extend(mesh_indices);
        }
    }

    if subsets.is_empty() {
        return Err(LoadError::parse(assets.path(file_name), "no skinned mesh found"));
    }
    log::debug!(
        "{file_name}: {} subsets, {} bones, clips {:?}",
        subsets.len(),
        skin_data.bone_count(),
        skin_data.clip_names()
    );

    Ok(SkinnedMesh {
        vertices,
        indices,
        subsets,
        skin: skin_data,
    })
}
