//! One animated character under three slowly turning lights.

use cgmath::{Matrix4, Point3, Quaternion, Rad, Rotation, Rotation3, Vector3};

use crate::{
    camera::Camera,
    data_structures::{feature::FeatureConfiguration, light::DirectionalLight},
    scene::{ObjectDescriptor, ObjectSource, SceneBlueprint, SceneHandle, SceneScript},
};

pub const SOLDIER: &str = "soldier";
pub const SOLDIER_MODEL: &str = "models/soldier.gltf";
pub const SOLDIER_CLIP: &str = "all_in_one";

/// Angular speed of the lights around the Y axis.
const LIGHT_SPEED: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct SkinnedMeshScene {
    model: String,
    clip: String,
    base_lights: [DirectionalLight; 3],
}

impl Default for SkinnedMeshScene {
    fn default() -> Self {
        Self::new(SOLDIER_MODEL, SOLDIER_CLIP)
    }
}

impl SkinnedMeshScene {
    pub fn new(model: impl Into<String>, clip: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            clip: clip.into(),
            base_lights: [
                DirectionalLight::new(
                    [0.9, 0.9, 0.9, 1.0],
                    [0.7, 0.7, 0.7, 1.0],
                    [0.8, 0.8, 0.8, 1.0],
                    [-0.57735, -0.57735, 0.57735],
                ),
                DirectionalLight::new(
                    [0.0, 0.0, 0.0, 1.0],
                    [0.4, 0.4, 0.4, 1.0],
                    [0.2, 0.2, 0.2, 1.0],
                    [0.707, -0.707, 0.0],
                ),
                DirectionalLight::new(
                    [0.0, 0.0, 0.0, 1.0],
                    [0.2, 0.2, 0.2, 1.0],
                    [0.2, 0.2, 0.2, 1.0],
                    [0.0, 0.0, -1.0],
                ),
            ],
        }
    }

    pub fn world() -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::new(0.0, -5.0, 10.0))
            * Matrix4::from_angle_y(Rad(std::f32::consts::PI))
            * Matrix4::from_scale(0.1)
    }

    /// The lights after `total` seconds.
    pub fn lights_at(&self, total: f32) -> [DirectionalLight; 3] {
        let rotation = Quaternion::from_angle_y(Rad(LIGHT_SPEED * total));
        self.base_lights.map(|light| {
            let direction = rotation.rotate_vector(Vector3::from(light.direction));
            DirectionalLight {
                direction: direction.into(),
                ..light
            }
        })
    }
}

impl SceneScript for SkinnedMeshScene {
    fn blueprint(&self) -> SceneBlueprint {
        SceneBlueprint {
            objects: vec![ObjectDescriptor::new(
                SOLDIER,
                FeatureConfiguration::lit(3).with_texture().with_skinning(true),
                ObjectSource::Skinned {
                    file: self.model.clone(),
                    clip_names: vec![self.clip.clone()],
                    worlds: vec![Self::world()],
                },
            )],
            lights: self.base_lights,
            camera: Camera::look_at(Point3::new(0.0, 0.0, -5.0), Point3::new(0.0, -2.0, 10.0)),
            ..SceneBlueprint::default()
        }
    }

    fn on_ready(&mut self, scene: &mut SceneHandle<'_>) {
        if let Some(soldier) = scene.object(SOLDIER) {
            soldier.start_animation(0);
        }
    }

    fn update(&mut self, scene: &mut SceneHandle<'_>, _dt: f32, total: f32) {
        *scene.lights() = self.lights_at(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lights_turn_half_a_radian_per_second() {
        let scene = SkinnedMeshScene::default();
        let lights = scene.lights_at(2.0 * std::f32::consts::PI);
        // Half a turn about Y.
        assert_relative_eq!(lights[2].direction[2], 1.0, epsilon = 1e-5);
        assert_relative_eq!(lights[1].direction[1], -0.707, epsilon = 1e-5);
        assert_eq!(lights[0].ambient, scene.base_lights[0].ambient);
    }
}
