use mirror_ngin::{
    camera::{Camera, Projection},
    constants::{ConstantBindings, PerFrameConstants},
    data_structures::light::{DirectionalLight, Fog},
    gpu::{GpuDevice, HeadlessDevice, PassTarget},
    loader::LoadState,
    object::RenderableObject,
    pipelines::PipelineCache,
    scenes::DynamicMapScene,
};

use crate::common::test_utils::{ScriptedScene, boxes, fixtures, loaded_scene};

mod common;

fn frame(device: &mut HeadlessDevice, bindings: &mut ConstantBindings, object: &mut RenderableObject) {
    let camera = Camera::look_at((0.0, 2.0, -10.0).into(), (0.0, 0.0, 0.0).into());
    let projection = Projection::new(640, 480, cgmath::Deg(45.0), 1.0, 100.0);
    bindings.begin_frame();
    bindings.push_frame(
        device,
        PerFrameConstants::new(&camera, &projection, &[DirectionalLight::default(); 3], &Fog::default()),
    );
    device.begin_pass(PassTarget::Frame, Some([0.0, 0.0, 0.0, 1.0]));
    object.render(device, bindings, None);
    device.end_pass();
}

#[test]
fn device_resources_need_logical_initialization() {
    let mut device = HeadlessDevice::new();
    let mut pipelines = PipelineCache::new();
    let mut object = RenderableObject::new(boxes("early", 2));

    object
        .create_device_dependent_resources(&mut device, &mut pipelines)
        .unwrap();

    assert_eq!(object.state(), LoadState::Uninitialized);
    assert_eq!(device.command_count(), 0);
    assert!(device.live_resources().is_empty());
}

#[test]
fn object_stays_loading_until_its_uploads_complete() {
    let mut device = HeadlessDevice::new();
    let mut pipelines = PipelineCache::new();
    let mut bindings = ConstantBindings::new();
    bindings.initialize(&mut device);

    let mut object = RenderableObject::new(boxes("crate", 3));
    object.initialize(&fixtures()).unwrap();
    assert_eq!(object.state(), LoadState::LogicallyInitialized);

    device.hold_uploads(true);
    object
        .create_device_dependent_resources(&mut device, &mut pipelines)
        .unwrap();
    assert_eq!(object.state(), LoadState::DeviceResourcesLoading);
    assert!(!object.poll_loading(&mut device).unwrap());

    frame(&mut device, &mut bindings, &mut object);
    assert!(device.take_passes()[0].draws.is_empty());

    device.release_uploads();
    assert!(object.poll_loading(&mut device).unwrap());
    assert_eq!(object.state(), LoadState::Ready);

    frame(&mut device, &mut bindings, &mut object);
    let passes = device.take_passes();
    assert_eq!(passes[0].draws.len(), 1);
    assert_eq!(passes[0].draws[0].instances, 0..3);
}

#[test]
fn release_keeps_logical_data_and_can_repeat() {
    let mut device = HeadlessDevice::new();
    let mut pipelines = PipelineCache::new();
    let mut object = RenderableObject::new(boxes("crate", 1));
    object.initialize(&fixtures()).unwrap();
    object
        .create_device_dependent_resources(&mut device, &mut pipelines)
        .unwrap();
    assert!(object.poll_loading(&mut device).unwrap());

    object.release(&mut device);
    object.release(&mut device);
    pipelines.release(&mut device);

    assert_eq!(object.state(), LoadState::LogicallyInitialized);
    assert!(object.logical().is_some());
    assert!(device.live_resources().is_empty());

    object
        .create_device_dependent_resources(&mut device, &mut pipelines)
        .unwrap();
    assert!(object.poll_loading(&mut device).unwrap());
}

#[test]
fn scene_does_nothing_before_it_is_ready() {
    let mut device = HeadlessDevice::new();
    let script = ScriptedScene::new(vec![boxes("a", 2), boxes("b", 1)]);
    let mut scene = mirror_ngin::SceneComposer::new(Box::new(script.clone()), fixtures(), 640, 480);

    // Nothing may happen before logical initialization either.
    scene.create_device_dependent_resources(&mut device);
    assert_eq!(device.command_count(), 0);

    scene.initialize_blocking();
    device.hold_uploads(true);
    scene.create_device_dependent_resources(&mut device);
    assert!(!scene.loading_complete());

    let before = device.command_count();
    scene.update(0.5);
    scene.render(&mut device);
    assert_eq!(device.command_count(), before);
    assert!(device.passes().is_empty());
    assert_eq!(script.update_calls(), 0);
}

#[test]
fn recreated_resources_render_the_same_frame() {
    let mut device = HeadlessDevice::new();
    let mut scene = loaded_scene(Box::new(DynamicMapScene::new()), &mut device);

    scene.render(&mut device);
    let passes = device.take_passes();
    let before = device.signature(&passes);
    assert!(!before.is_empty());

    scene.release(&mut device);
    scene.release(&mut device);
    assert!(device.live_resources().is_empty());
    assert!(scene.objects().iter().all(|o| o.state() == LoadState::LogicallyInitialized));

    scene.recreate_device_resources(&mut device);
    assert!(scene.poll_loading(&mut device));
    scene.render(&mut device);
    let passes = device.take_passes();
    assert_eq!(device.signature(&passes), before);
}

#[test]
fn scene_moves_to_a_new_device_after_device_loss() {
    let mut lost = HeadlessDevice::new();
    let mut scene = loaded_scene(Box::new(DynamicMapScene::new()), &mut lost);
    scene.render(&mut lost);
    let passes = lost.take_passes();
    let before = lost.signature(&passes);
    let loaded = lost.live_resources();

    lost.lose();
    assert!(lost.is_lost());
    scene.release(&mut lost);
    assert!(lost.live_resources().is_empty());

    let mut device = HeadlessDevice::new();
    assert!(!device.is_lost());
    scene.create_device_dependent_resources(&mut device);
    assert!(scene.poll_loading(&mut device));
    assert_eq!(device.live_resources(), loaded);

    scene.render(&mut device);
    let passes = device.take_passes();
    assert_eq!(device.signature(&passes), before);
    assert!(lost.passes().is_empty());
}
