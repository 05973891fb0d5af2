use approx::assert_relative_eq;
use cgmath::{Matrix4, SquareMatrix};
use mirror_ngin::{
    FeatureConfiguration, LoadError,
    gpu::HeadlessDevice,
    object::RenderableObject,
    pipelines::PipelineCache,
    scene::{ObjectDescriptor, ObjectSource},
    scenes::{
        SkinnedMeshScene,
        skinned_mesh::{SOLDIER, SOLDIER_CLIP, SOLDIER_MODEL},
    },
};

use crate::common::test_utils::{fixtures, loaded_scene};

mod common;

fn soldier(clip: &str, loop_animation: bool) -> ObjectDescriptor {
    ObjectDescriptor::new(
        "soldier",
        FeatureConfiguration::lit(3).with_skinning(loop_animation),
        ObjectSource::Skinned {
            file: SOLDIER_MODEL.into(),
            clip_names: vec![clip.into()],
            worlds: vec![Matrix4::identity()],
        },
    )
}

fn ready(descriptor: ObjectDescriptor, device: &mut HeadlessDevice) -> RenderableObject {
    let mut object = RenderableObject::new(descriptor);
    object.initialize(&fixtures()).unwrap();
    object
        .create_device_dependent_resources(device, &mut PipelineCache::new())
        .unwrap();
    assert!(object.poll_loading(device).unwrap());
    object
}

#[test]
fn looping_clip_wraps_around() {
    let mut device = HeadlessDevice::new();
    let mut object = ready(soldier(SOLDIER_CLIP, true), &mut device);
    assert!(object.start_animation(0));

    object.update(0.25);
    assert_relative_eq!(object.animation_time().unwrap(), 0.25, epsilon = 1e-5);
    // The fixture clip lasts one second.
    object.update(1.0);
    assert_relative_eq!(object.animation_time().unwrap(), 0.25, epsilon = 1e-5);
}

#[test]
fn clamped_clip_holds_the_last_pose() {
    let mut device = HeadlessDevice::new();
    let mut object = ready(soldier(SOLDIER_CLIP, false), &mut device);
    assert!(object.start_animation(0));

    let pose = |object: &RenderableObject| {
        object
            .logical()
            .and_then(|l| l.animation.as_ref())
            .map(|controller| controller.bone_transforms())
            .unwrap()
    };

    object.update(0.4);
    object.update(0.6);
    let at_end = pose(&object);
    object.update(5.0);
    assert_relative_eq!(object.animation_time().unwrap(), 1.0, epsilon = 1e-5);
    assert_eq!(pose(&object), at_end);
}

#[test]
fn out_of_range_clip_is_refused() {
    let mut device = HeadlessDevice::new();
    let mut object = ready(soldier(SOLDIER_CLIP, true), &mut device);
    assert!(!object.start_animation(1));
    object.update(0.5);
    assert_eq!(object.animation_time(), Some(0.0));
}

#[test]
fn unknown_clip_fails_initialization() {
    let mut object = RenderableObject::new(soldier("moonwalk", true));
    match object.initialize(&fixtures()) {
        Err(LoadError::ClipNotFound { clip, available }) => {
            assert_eq!(clip, "moonwalk");
            assert_eq!(available, vec![SOLDIER_CLIP.to_string()]);
        }
        other => panic!("expected a missing clip, got {other:?}"),
    }
}

#[test]
fn skinned_scene_draws_with_a_bone_palette() {
    let mut device = HeadlessDevice::new();
    let mut scene = loaded_scene(Box::new(SkinnedMeshScene::default()), &mut device);

    // `on_ready` started the clip.
    scene.update(0.3);
    assert_relative_eq!(scene.object(SOLDIER).unwrap().animation_time().unwrap(), 0.3, epsilon = 1e-5);

    scene.render(&mut device);
    let passes = device.take_passes();
    assert_eq!(passes.len(), 1);
    let draw = &passes[0].draws[0];
    assert!(draw.uniforms.skinning.is_some());
    let diffuse = draw.textures.diffuse.and_then(|id| device.texture_label(id));
    assert_eq!(diffuse, Some("models/soldier_diffuse.png"));
}
