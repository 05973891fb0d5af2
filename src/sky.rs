//! The sky: a large sphere around the camera sampling a cube texture.

use cgmath::{EuclideanSpace, Matrix4};

use crate::{
    camera::Camera,
    data_structures::{
        feature::FeatureConfiguration,
        geometry::create_sphere,
        light::Material,
        object_data::{AttributeArray, BasicVertex, ObjectData, RenderUnit, VertexData},
    },
    loader::{ObjectDescriptor, ObjectSource},
    object::RenderableObject,
    pipelines::PipelineKind,
};

pub const SKY_OBJECT_NAME: &str = "sky";

/// Describes a sky sphere of `radius` textured with the cube strip `file`.
pub fn sky_descriptor(file: &str, radius: f32) -> ObjectDescriptor {
    let sphere = create_sphere(radius, 30, 30);
    let vertices: Vec<BasicVertex> = sphere
        .vertices
        .iter()
        .map(|v| BasicVertex {
            position: v.position,
            normal: v.normal,
            tex_coords: v.tex_coords,
        })
        .collect();
    let unit = RenderUnit::new(0, vertices.len() as u32, 0, sphere.indices.len() as u32)
        .with_worlds(vec![Matrix4::from_scale(1.0)])
        .with_materials(AttributeArray::single(Material::neutral()));
    let data = ObjectData::new(VertexData::Basic(vertices), sphere.indices).with_unit(unit);

    ObjectDescriptor::new(
        SKY_OBJECT_NAME,
        FeatureConfiguration::lit(0).with_reflection_source(file),
        ObjectSource::Data(data),
    )
    .with_kind(PipelineKind::Sky)
}

/// Keeps the sky centred on the eye so it never gets closer.
pub fn follow_camera(sky: &mut RenderableObject, camera: &Camera) {
    let world = Matrix4::from_translation(camera.position.to_vec());
    if sky.world(0, 0) != Some(world) {
        sky.set_world(0, 0, world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loader::LogicalObject, resources::AssetRoot};

    #[test]
    fn sky_needs_its_cube_texture() {
        let prepared = LogicalObject::prepare(&AssetRoot::new("/nonexistent"), sky_descriptor("sky.png", 10.0));
        assert!(prepared.is_err());
    }

    #[test]
    fn sky_follows_the_eye() {
        let descriptor = sky_descriptor("sky.png", 10.0);
        let ObjectSource::Data(data) = descriptor.source.clone() else {
            panic!("sky is built in code");
        };
        assert_eq!(data.vertices.format(), crate::data_structures::object_data::VertexFormat::Basic);

        let mut logical_features = descriptor.features.clone();
        logical_features.reflect_source_texture = None;
        logical_features.reflect_enable = false;
        let logical = LogicalObject::prepare(
            &AssetRoot::new("/nonexistent"),
            ObjectDescriptor {
                features: logical_features,
                ..descriptor
            },
        )
        .unwrap();
        let mut sky = RenderableObject::from_logical(logical);
        let camera = Camera::look_at((1.0, 2.0, 3.0).into(), (0.0, 0.0, 0.0).into());
        follow_camera(&mut sky, &camera);
        assert_eq!(sky.world(0, 0).unwrap().w.truncate(), cgmath::Vector3::new(1.0, 2.0, 3.0));
    }
}
