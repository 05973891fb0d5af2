use cgmath::{Matrix4, Vector3};
use mirror_ngin::{
    FeatureConfiguration, LoadError,
    data_structures::{
        geometry::{MeshBuilder, create_box},
        light::Material,
        object_data::{AttributeArray, StepRatePolicy, TextureRef},
    },
    gpu::HeadlessDevice,
    scene::{ObjectDescriptor, ObjectSource},
};

use crate::common::test_utils::{ScriptedScene, loaded_scene};

mod common;

fn row(count: usize) -> Vec<Matrix4<f32>> {
    (0..count)
        .map(|i| Matrix4::from_translation(Vector3::new(i as f32, 0.0, 0.0)))
        .collect()
}

#[test]
fn instance_k_uses_entry_k_div_step_rate_mod_len() {
    for len in 1..5usize {
        for step_rate in 1..4u32 {
            let attribute = AttributeArray::new((0..len).collect::<Vec<_>>()).with_step_rate(step_rate);
            for k in 0..20 {
                let expected = if len == 1 { 0 } else { (k / step_rate as usize) % len };
                assert_eq!(attribute.resolve(k), Some(&expected), "len {len}, step rate {step_rate}, k {k}");
            }
        }
    }
    assert_eq!(AttributeArray::<u32>::empty().resolve(3), None);
}

#[test]
fn strict_policy_rejects_partial_sequences() {
    let mut builder = MeshBuilder::new();
    let unit = builder
        .append(create_box(1.0, 1.0, 1.0))
        .with_worlds(row(4))
        .with_materials(AttributeArray::new(vec![Material::neutral(); 2]));
    let data = builder.build(vec![unit]);

    assert!(matches!(data.validate(), Err(LoadError::InvalidObjectData(_))));
    data.with_step_rate_policy(StepRatePolicy::Cycle).validate().unwrap();
}

#[test]
fn zero_step_rate_is_rejected() {
    let mut builder = MeshBuilder::new();
    let unit = builder
        .append(create_box(1.0, 1.0, 1.0))
        .with_worlds(row(2))
        .with_materials(AttributeArray::single(Material::neutral()).with_step_rate(0));
    assert!(builder.build(vec![unit]).validate().is_err());
}

#[test]
fn texture_changes_split_instanced_draws() {
    let mut builder = MeshBuilder::new();
    let unit = builder
        .append(create_box(1.0, 1.0, 1.0))
        .with_worlds(row(6))
        .with_materials(AttributeArray::single(Material::neutral()))
        .with_textures(
            AttributeArray::new(vec![
                TextureRef::new("textures/stone.png"),
                TextureRef::new("textures/floor.png"),
            ])
            .with_step_rate(2),
        );
    let data = builder
        .build(vec![unit])
        .with_step_rate_policy(StepRatePolicy::Cycle);
    let pillars = ObjectDescriptor::new(
        "pillars",
        FeatureConfiguration::lit(1).with_texture(),
        ObjectSource::Data(data),
    );

    let mut device = HeadlessDevice::new();
    let mut scene = loaded_scene(Box::new(ScriptedScene::new(vec![pillars])), &mut device);
    scene.render(&mut device);

    let passes = device.take_passes();
    let draws = &passes[0].draws;
    let ranges: Vec<_> = draws.iter().map(|d| d.instances.clone()).collect();
    assert_eq!(ranges, [0..2, 2..4, 4..6]);
    let textures: Vec<_> = draws
        .iter()
        .map(|d| d.textures.diffuse.and_then(|id| device.texture_label(id)))
        .collect();
    assert_eq!(
        textures,
        [
            Some("textures/stone.png"),
            Some("textures/floor.png"),
            Some("textures/stone.png")
        ]
    );
}

#[test]
fn devices_without_instancing_draw_every_instance_alone() {
    let mut builder = MeshBuilder::new();
    let unit = builder
        .append(create_box(1.0, 1.0, 1.0))
        .with_worlds(row(3))
        .with_materials(AttributeArray::single(Material::neutral()));
    let crates = ObjectDescriptor::new(
        "crates",
        FeatureConfiguration::lit(1),
        ObjectSource::Data(builder.build(vec![unit])),
    );

    let mut device = HeadlessDevice::without_instancing();
    let mut scene = loaded_scene(Box::new(ScriptedScene::new(vec![crates])), &mut device);
    scene.render(&mut device);

    let passes = device.take_passes();
    let ranges: Vec<_> = passes[0].draws.iter().map(|d| d.instances.clone()).collect();
    assert_eq!(ranges, [0..1, 1..2, 2..3]);
}
