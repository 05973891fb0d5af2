#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
async fn render_frames(
    script: Box<dyn mirror_ngin::SceneScript>,
    frames: usize,
    clear_colour: Option<[f32; 4]>,
) -> image::RgbaImage {
    use mirror_ngin::{SceneComposer, context::Context};

    let mut context = Context::headless(128, 96)
        .await
        .expect("no adapter for the golden image test");
    let mut scene = SceneComposer::new(script, common::test_utils::fixtures(), 128, 96);
    if let Some(colour) = clear_colour {
        scene = scene.with_clear_colour(colour);
    }
    scene.initialize_blocking();
    scene.create_device_dependent_resources(&mut context.gpu);
    // Uploads complete while frames are submitted.
    let mut budget = 240;
    while !scene.loading_complete() {
        assert!(budget > 0, "scene did not finish loading");
        budget -= 1;
        context.render(&mut scene).expect("offscreen frames cannot be lost");
    }
    for _ in 0..frames {
        scene.update(1.0 / 60.0);
        context.render(&mut scene).expect("offscreen frames cannot be lost");
    }
    context.capture().await.expect("capture failed")
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn should_render_clear_colour() {
    use crate::common::test_utils::ScriptedScene;

    let image = render_frames(Box::new(ScriptedScene::new(Vec::new())), 2, Some([1.0; 4])).await;
    for pixel in image.pixels() {
        assert_eq!(*pixel, image::Rgba([255, 255, 255, 255]));
    }
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn should_draw_the_reflecting_sphere() {
    use mirror_ngin::scenes::DynamicMapScene;

    let clear = [0.0, 0.0, 0.0, 1.0];
    let image = render_frames(Box::new(DynamicMapScene::new()), 4, Some(clear)).await;
    let (width, height) = image.dimensions();
    // The camera looks straight at the sphere.
    let centre = image.get_pixel(width / 2, height / 2);
    assert_ne!(*centre, image::Rgba([0, 0, 0, 255]));
}
