//! Ready-made scenes.

pub mod dynamic_map;
pub mod skinned_mesh;

pub use dynamic_map::DynamicMapScene;
pub use skinned_mesh::SkinnedMeshScene;

use crate::scene::SceneScript;

/// Names accepted by [`by_name`].
pub const SCENE_NAMES: [&str; 2] = ["dynamic-map", "skinned-mesh"];

pub fn by_name(name: &str) -> Option<Box<dyn SceneScript>> {
    match name {
        "dynamic-map" => Some(Box::new(DynamicMapScene::new())),
        "skinned-mesh" => Some(Box::new(SkinnedMeshScene::default())),
        _ => None,
    }
}
