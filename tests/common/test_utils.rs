use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use cgmath::{Matrix4, Vector3};
use mirror_ngin::{
    data_structures::{
        feature::FeatureConfiguration,
        geometry::{MeshBuilder, create_box},
        light::Material,
        object_data::AttributeArray,
    },
    gpu::{DrawCall, HeadlessDevice, headless::RecordedPass},
    resources::AssetRoot,
    scene::{ObjectDescriptor, ObjectSource, SceneBlueprint, SceneComposer, SceneHandle, SceneScript},
};

/// The small asset set under `tests/fixtures`.
pub fn fixtures() -> AssetRoot {
    AssetRoot::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures"))
}

/// `count` unit boxes in a row along X.
pub fn boxes(name: &str, count: usize) -> ObjectDescriptor {
    let mut builder = MeshBuilder::new();
    let unit = builder
        .append(create_box(1.0, 1.0, 1.0))
        .with_worlds(
            (0..count)
                .map(|i| Matrix4::from_translation(Vector3::new(2.0 * i as f32, 0.0, 0.0)))
                .collect(),
        )
        .with_materials(AttributeArray::single(Material::neutral()));
    ObjectDescriptor::new(
        name,
        FeatureConfiguration::lit(1),
        ObjectSource::Data(builder.build(vec![unit])),
    )
}

/// A scene made of a fixed blueprint that counts how often it was called.
#[derive(Clone, Debug, Default)]
pub struct ScriptedScene {
    pub blueprint: SceneBlueprint,
    pub ready_calls: Arc<AtomicU32>,
    pub update_calls: Arc<AtomicU32>,
}

impl ScriptedScene {
    pub fn new(objects: Vec<ObjectDescriptor>) -> Self {
        Self {
            blueprint: SceneBlueprint {
                objects,
                ..SceneBlueprint::default()
            },
            ..Self::default()
        }
    }

    pub fn ready_calls(&self) -> u32 {
        self.ready_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

impl SceneScript for ScriptedScene {
    fn blueprint(&self) -> SceneBlueprint {
        self.blueprint.clone()
    }

    fn on_ready(&mut self, _scene: &mut SceneHandle<'_>) {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn update(&mut self, _scene: &mut SceneHandle<'_>, _dt: f32, _total: f32) {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Initializes `script` against the fixtures and loads it completely.
pub fn loaded_scene(script: Box<dyn SceneScript>, device: &mut HeadlessDevice) -> SceneComposer {
    let mut scene = SceneComposer::new(script, fixtures(), 640, 480);
    scene.initialize_blocking();
    scene.create_device_dependent_resources(device);
    assert!(scene.poll_loading(device), "scene did not finish loading");
    scene
}

/// Name of the object a draw belongs to, taken from its vertex buffer label.
pub fn drawn_object(device: &HeadlessDevice, draw: &DrawCall) -> String {
    device
        .buffer_label(draw.vertex_buffer)
        .and_then(|label| label.strip_suffix(" vertices"))
        .unwrap_or("<unknown>")
        .to_string()
}

pub fn drawn_objects(device: &HeadlessDevice, pass: &RecordedPass) -> Vec<String> {
    pass.draws.iter().map(|draw| drawn_object(device, draw)).collect()
}
