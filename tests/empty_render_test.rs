#![cfg(feature = "integration-tests")]

mod common;

use common::test_utils::{HEIGHT, WIDTH, expected_channel, headless_context, side_camera};
use shade_ngin::scene::{RenderSettings, SceneRenderer};
use shade_ngin::submission::FrameSubmission;

#[tokio::test]
async fn empty_submission_renders_tone_mapped_background() {
    let ctx = headless_context().await;
    let mut renderer = SceneRenderer::new(&ctx).await.expect("renderer creation");
    let (camera, projection) = side_camera();

    let settings = RenderSettings {
        background: [0.2, 0.4, 0.6],
        dither: 0.0,
        ..RenderSettings::default()
    };
    let mut submission = FrameSubmission::new();
    let stats = renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render");
    assert_eq!(stats.static_entities, 0);
    assert_eq!(stats.instanced_batches, 0);
    assert_eq!(stats.instances, 0);

    let (pixels, width, height) = renderer.read_pixels(&ctx).await.expect("read back");
    assert_eq!((width, height), (WIDTH, HEIGHT));
    assert_eq!(pixels.len(), (WIDTH * HEIGHT * 4) as usize);

    // Background pixels carry occlusion 1, so the frame is exactly the
    // tone-mapped clear color.
    let expected = [
        expected_channel(0.2, settings.white_point),
        expected_channel(0.4, settings.white_point),
        expected_channel(0.6, settings.white_point),
    ];
    for pixel in pixels.chunks_exact(4) {
        for c in 0..3 {
            assert!(
                (pixel[c] as i32 - expected[c] as i32).abs() <= 2,
                "channel {c}: got {} expected {}",
                pixel[c],
                expected[c]
            );
        }
    }
}
