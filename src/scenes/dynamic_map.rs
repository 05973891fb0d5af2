//! A mirror sphere in the middle of a small courtyard, with a skull orbiting
//! it. The sphere reflects everything else through a dynamic cube map.

use cgmath::{Matrix4, Point3, Rad, Vector3};

use crate::{
    camera::Camera,
    data_structures::{
        feature::FeatureConfiguration,
        geometry::{MeshBuilder, create_box, create_cylinder, create_grid, create_sphere},
        light::{DirectionalLight, Fog, Material},
        object_data::{AttributeArray, TextureRef},
    },
    scene::{
        ObjectDescriptor, ObjectSource, ReflectionDescriptor, SceneBlueprint, SceneHandle, SceneScript,
        SkyDescriptor,
    },
};

pub const CENTER_SPHERE: &str = "centerSphere";
pub const SKULL: &str = "skull";
pub const SPHERES: &str = "sphere";
pub const BASE: &str = "base";

const SKY_TEXTURE: &str = "textures/sunsetcube.png";
const SKULL_MESH: &str = "models/skull.txt";

fn material(ambient: [f32; 3], diffuse: [f32; 3], specular: f32, power: f32, reflect: f32) -> Material {
    let [ar, ag, ab] = ambient;
    let [dr, dg, db] = diffuse;
    Material::new(
        [ar, ag, ab, 1.0],
        [dr, dg, db, 1.0],
        [specular, specular, specular, power],
        [reflect, reflect, reflect, 1.0],
    )
}

fn translation(x: f32, y: f32, z: f32) -> Matrix4<f32> {
    Matrix4::from_translation(Vector3::new(x, y, z))
}

/// Two rows of five, one row on each side of the courtyard.
fn column_positions(y: f32) -> Vec<Matrix4<f32>> {
    (0..5)
        .flat_map(|i| {
            let z = -10.0 + i as f32 * 5.0;
            [translation(-5.0, y, z), translation(5.0, y, z)]
        })
        .collect()
}

pub fn skull_world(total: f32) -> Matrix4<f32> {
    Matrix4::from_angle_y(Rad(0.5 * total))
        * translation(3.0, 2.0, 0.0)
        * Matrix4::from_angle_y(Rad(2.0 * total))
        * Matrix4::from_scale(0.2)
}

#[derive(Debug, Default)]
pub struct DynamicMapScene;

impl DynamicMapScene {
    pub fn new() -> Self {
        Self
    }

    pub fn lights() -> [DirectionalLight; 3] {
        [
            DirectionalLight::new(
                [0.2, 0.2, 0.2, 1.0],
                [0.5, 0.5, 0.5, 1.0],
                [0.5, 0.5, 0.5, 1.0],
                [0.57735, -0.57735, 0.57735],
            ),
            DirectionalLight::new(
                [0.0, 0.0, 0.0, 1.0],
                [0.20, 0.20, 0.20, 1.0],
                [0.25, 0.25, 0.25, 1.0],
                [-0.57735, -0.57735, 0.57735],
            ),
            DirectionalLight::new(
                [0.0, 0.0, 0.0, 1.0],
                [0.2, 0.2, 0.2, 1.0],
                [0.0, 0.0, 0.0, 1.0],
                [0.0, -0.707, -0.707],
            ),
        ]
    }

    fn center_sphere() -> ObjectDescriptor {
        let mut builder = MeshBuilder::new();
        let unit = builder
            .append(create_sphere(0.5, 20, 20))
            .with_worlds(vec![translation(0.0, 2.0, 0.0) * Matrix4::from_scale(2.0)])
            .with_materials(AttributeArray::single(material(
                [0.2, 0.2, 0.2],
                [0.2, 0.2, 0.2],
                0.8,
                16.0,
                0.8,
            )));
        ObjectDescriptor::new(
            CENTER_SPHERE,
            FeatureConfiguration::lit(3).with_dynamic_reflection(),
            ObjectSource::Data(builder.build(vec![unit])),
        )
    }

    fn skull() -> ObjectDescriptor {
        ObjectDescriptor::new(
            SKULL,
            FeatureConfiguration::lit(3),
            ObjectSource::TextMesh {
                file: SKULL_MESH.into(),
                material: material([0.4, 0.4, 0.4], [0.8, 0.8, 0.8], 0.8, 16.0, 0.4),
                worlds: vec![skull_world(0.0)],
            },
        )
    }

    fn spheres() -> ObjectDescriptor {
        let mut builder = MeshBuilder::new();
        let unit = builder
            .append(create_sphere(0.5, 20, 20))
            .with_worlds(column_positions(3.5))
            .with_materials(
                AttributeArray::single(material([0.2, 0.3, 0.4], [0.2, 0.3, 0.4], 0.9, 16.0, 0.4)).with_step_rate(10),
            )
            .with_textures(AttributeArray::single(TextureRef::new("textures/stone.png")).with_step_rate(10));
        ObjectDescriptor::new(
            SPHERES,
            FeatureConfiguration::lit(3)
                .with_texture()
                .with_reflection_source(SKY_TEXTURE),
            ObjectSource::Data(builder.build(vec![unit])),
        )
    }

    fn base() -> ObjectDescriptor {
        let plain = |reflect: f32| material([1.0, 1.0, 1.0], [1.0, 1.0, 1.0], 0.8, 16.0, reflect);
        let mut builder = MeshBuilder::new();
        let floor_box = builder
            .append(create_box(1.0, 1.0, 1.0))
            .with_worlds(vec![
                translation(0.0, 0.5, 0.0) * Matrix4::from_nonuniform_scale(3.0, 1.0, 3.0),
            ])
            .with_materials(AttributeArray::single(plain(0.0)))
            .with_textures(AttributeArray::single(
                TextureRef::new("textures/stone.png").with_normal_map("textures/stones_nmap.png"),
            ));
        let grid = builder
            .append(create_grid(20.0, 30.0, 60, 40))
            .with_worlds(vec![Matrix4::from_scale(1.0)])
            .with_materials(AttributeArray::single(material([0.8, 0.8, 0.8], [0.8, 0.8, 0.8], 0.8, 16.0, 0.0)))
            .with_textures(AttributeArray::single(
                TextureRef::new("textures/floor.png").with_normal_map("textures/floor_nmap.png"),
            ))
            .with_texture_transforms(AttributeArray::single(Matrix4::from_nonuniform_scale(6.0, 8.0, 1.0)));
        let cylinders = builder
            .append(create_cylinder(0.5, 0.3, 3.0, 20, 20))
            .with_worlds(column_positions(1.5))
            .with_materials(AttributeArray::single(plain(0.0)).with_step_rate(10))
            .with_textures(
                AttributeArray::single(TextureRef::new("textures/bricks.png").with_normal_map("textures/bricks_nmap.png"))
                    .with_step_rate(10),
            );
        ObjectDescriptor::new(
            BASE,
            FeatureConfiguration::lit(3).with_texture().with_normal_map(),
            ObjectSource::Data(builder.build(vec![floor_box, grid, cylinders])),
        )
    }
}

impl SceneScript for DynamicMapScene {
    fn blueprint(&self) -> SceneBlueprint {
        SceneBlueprint {
            objects: vec![Self::center_sphere(), Self::skull(), Self::spheres(), Self::base()],
            sky: Some(SkyDescriptor {
                file: SKY_TEXTURE.into(),
                radius: 5000.0,
            }),
            reflection: Some(ReflectionDescriptor::new(CENTER_SPHERE, Point3::new(0.0, 2.0, 0.0))),
            lights: Self::lights(),
            fog: Fog::default(),
            clear_colour: Fog::default().colour,
            camera: Camera::look_at(Point3::new(0.0, 6.0, -18.0), Point3::new(0.0, 2.0, 0.0)),
        }
    }

    fn update(&mut self, scene: &mut SceneHandle<'_>, _dt: f32, total: f32) {
        if let Some(skull) = scene.object(SKULL) {
            skull.set_world(0, 0, skull_world(total));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::{EuclideanSpace, Transform};

    #[test]
    fn skull_orbits_at_a_fixed_radius() {
        for t in [0.0, 1.0, 2.5, 10.0] {
            let centre = skull_world(t).transform_point(Point3::origin());
            assert_relative_eq!((centre.x * centre.x + centre.z * centre.z).sqrt(), 3.0, epsilon = 1e-4);
            assert_relative_eq!(centre.y, 2.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn blueprint_lists_objects_in_loading_order() {
        let blueprint = DynamicMapScene::new().blueprint();
        let names: Vec<_> = blueprint.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, [CENTER_SPHERE, SKULL, SPHERES, BASE]);
        assert_eq!(blueprint.reflection.unwrap().reflector, CENTER_SPHERE);
    }

    #[test]
    fn base_units_validate() {
        let ObjectSource::Data(data) = DynamicMapScene::base().source else {
            panic!("base is built in code");
        };
        assert_eq!(data.units.len(), 3);
        assert_eq!(data.units[2].instance_count(), 10);
        data.validate().unwrap();
    }
}
