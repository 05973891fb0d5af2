use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use mirror_ngin::{
    FeatureConfiguration, LoadError, SceneComposer,
    data_structures::light::Material,
    gpu::{GpuDevice, HeadlessDevice},
    loader::LoadState,
    scene::{ObjectDescriptor, ObjectSource, SceneBlueprint, SceneScript},
    scenes::{
        DynamicMapScene,
        dynamic_map::{BASE, CENTER_SPHERE, SKULL, SPHERES},
    },
    sky::SKY_OBJECT_NAME,
};

use crate::common::test_utils::{ScriptedScene, boxes, fixtures, loaded_scene};

mod common;

fn missing_mesh() -> ObjectDescriptor {
    ObjectDescriptor::new(
        "ghost",
        FeatureConfiguration::lit(1),
        ObjectSource::TextMesh {
            file: "models/ghost.txt".into(),
            material: Material::neutral(),
            worlds: vec![cgmath::Matrix4::from_scale(1.0)],
        },
    )
}

#[tokio::test]
async fn background_initialization_prepares_every_object() {
    let mut scene = SceneComposer::new(Box::new(DynamicMapScene::new()), fixtures(), 640, 480);
    scene.initialize();
    scene.wait_for_initialization().await.unwrap();

    let names: Vec<_> = scene.objects().iter().map(|o| o.name().to_string()).collect();
    assert_eq!(names, [CENTER_SPHERE, SKULL, SPHERES, BASE, SKY_OBJECT_NAME]);
    assert!(scene.failures().is_empty());
    assert!(scene.objects().iter().all(|o| o.state() == LoadState::LogicallyInitialized));

    let skull = scene.object(SKULL).unwrap().logical().unwrap();
    assert_eq!(skull.data.vertices.len(), 221);
    assert_eq!(skull.data.indices.len(), 384 * 3);
}

#[tokio::test]
async fn a_newer_load_supersedes_the_previous_one() {
    let mut scene = SceneComposer::new(Box::new(DynamicMapScene::new()), fixtures(), 640, 480);
    scene.initialize();
    scene.initialize();
    scene.wait_for_initialization().await.unwrap();

    assert_eq!(scene.generation(), 2);
    assert_eq!(scene.objects().len(), 5);
}

#[test]
fn initialization_without_a_runtime_uses_a_thread() {
    let mut scene = SceneComposer::new(Box::new(ScriptedScene::new(vec![boxes("a", 1)])), fixtures(), 640, 480);
    scene.initialize();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !scene.poll_initialization() {
        assert!(std::time::Instant::now() < deadline, "initialization timed out");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(scene.objects().len(), 1);
}

#[test]
fn failed_objects_are_left_out() {
    let script = ScriptedScene::new(vec![boxes("a", 1), missing_mesh(), boxes("b", 2)]);
    let mut device = HeadlessDevice::new();
    let mut scene = SceneComposer::new(Box::new(script.clone()), fixtures(), 640, 480);
    scene.initialize_blocking();

    assert_eq!(scene.objects().len(), 2);
    assert_eq!(scene.failures().len(), 1);
    assert_eq!(scene.failures()[0].0, "ghost");
    assert!(matches!(scene.failures()[0].1, LoadError::Io { .. }));

    scene.create_device_dependent_resources(&mut device);
    assert!(scene.poll_loading(&mut device));
    assert_eq!(script.ready_calls(), 1);
}

#[test]
fn objects_load_one_after_another() {
    let script = ScriptedScene::new(vec![boxes("a", 1), boxes("b", 1), boxes("c", 1)]);
    let mut device = HeadlessDevice::new();
    let mut scene = SceneComposer::new(Box::new(script.clone()), fixtures(), 640, 480);
    scene.initialize_blocking();

    device.hold_uploads(true);
    scene.create_device_dependent_resources(&mut device);
    let states = |scene: &SceneComposer| scene.objects().iter().map(|o| o.state()).collect::<Vec<_>>();
    assert_eq!(
        states(&scene),
        [
            LoadState::DeviceResourcesLoading,
            LoadState::LogicallyInitialized,
            LoadState::LogicallyInitialized
        ]
    );

    device.release_uploads();
    assert!(!scene.poll_loading(&mut device));
    assert_eq!(
        states(&scene),
        [
            LoadState::Ready,
            LoadState::DeviceResourcesLoading,
            LoadState::LogicallyInitialized
        ]
    );
    assert_eq!(script.ready_calls(), 0);

    device.hold_uploads(false);
    assert!(scene.poll_loading(&mut device));
    assert!(scene.loading_complete());
    assert_eq!(script.ready_calls(), 1);

    // Completed loading is not reported twice.
    assert!(scene.poll_loading(&mut device));
    assert_eq!(script.ready_calls(), 1);

    scene.update(0.1);
    assert_eq!(script.update_calls(), 1);
}

/// Three boxes on the first initialization, a single one on every later one.
#[derive(Clone, Debug, Default)]
struct ShrinkingScene {
    blueprints: Arc<AtomicU32>,
}

impl SceneScript for ShrinkingScene {
    fn blueprint(&self) -> SceneBlueprint {
        let objects = if self.blueprints.fetch_add(1, Ordering::SeqCst) == 0 {
            vec![boxes("a", 1), boxes("b", 1), boxes("c", 1)]
        } else {
            vec![boxes("d", 2)]
        };
        SceneBlueprint {
            objects,
            ..SceneBlueprint::default()
        }
    }
}

#[test]
fn reinitializing_while_uploads_are_in_flight_loads_the_new_objects() {
    let mut device = HeadlessDevice::new();
    let mut scene = SceneComposer::new(Box::new(ShrinkingScene::default()), fixtures(), 640, 480);
    scene.initialize_blocking();
    device.hold_uploads(true);
    scene.create_device_dependent_resources(&mut device);
    assert_eq!(scene.objects()[0].state(), LoadState::DeviceResourcesLoading);

    scene.initialize_blocking();
    let names: Vec<_> = scene.objects().iter().map(|o| o.name().to_string()).collect();
    assert_eq!(names, ["d"]);

    // The replaced object still waits for its upload; nothing new starts.
    assert!(!scene.poll_loading(&mut device));
    assert_eq!(scene.objects()[0].state(), LoadState::LogicallyInitialized);

    device.hold_uploads(false);
    assert!(scene.poll_loading(&mut device));
    assert!(scene.objects()[0].is_ready());

    let mut fresh_device = HeadlessDevice::new();
    loaded_scene(Box::new(ScriptedScene::new(vec![boxes("d", 2)])), &mut fresh_device);
    assert_eq!(device.live_resources(), fresh_device.live_resources());

    scene.release(&mut device);
    assert!(device.live_resources().is_empty());
}

#[test]
fn reinitializing_a_loaded_scene_frees_the_old_resources() {
    let mut device = HeadlessDevice::new();
    let mut scene = loaded_scene(Box::new(DynamicMapScene::new()), &mut device);
    let loaded = device.live_resources();

    scene.initialize_blocking();
    assert!(!scene.loading_complete());
    assert!(scene.poll_loading(&mut device));
    assert_eq!(scene.generation(), 2);
    assert!(scene.cube_map().is_some_and(|cube| cube.is_ready()));
    assert_eq!(device.live_resources(), loaded);
}

#[test]
fn reinitializing_before_device_loading_creates_nothing() {
    let mut device = HeadlessDevice::new();
    let mut scene = SceneComposer::new(Box::new(ShrinkingScene::default()), fixtures(), 640, 480);
    scene.initialize_blocking();
    scene.initialize_blocking();
    assert!(!scene.poll_loading(&mut device));
    assert!(device.live_resources().is_empty());
}
