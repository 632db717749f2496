#![cfg(feature = "integration-tests")]

mod common;

use common::test_utils::{
    WIDTH, expected_channel, facing_quad, headless_context, pixel_at, side_camera,
};
use shade_ngin::scene::{FrameStats, RenderSettings, SceneRenderer};
use shade_ngin::submission::FrameSubmission;
use shade_ngin::{Matrix4, SquareMatrix, Vector3};

#[tokio::test]
async fn unlit_entity_darkens_its_silhouette() {
    let ctx = headless_context().await;
    let mut renderer = SceneRenderer::new(&ctx).await.expect("renderer creation");
    let (camera, projection) = side_camera();

    // With both light terms zeroed an entity renders pure black against
    // the bright background, making the silhouette trivially detectable.
    let settings = RenderSettings {
        direct_light: [0.0; 3],
        ambient_light: [0.0; 3],
        background: [0.8, 0.8, 0.8],
        dither: 0.0,
        ..RenderSettings::default()
    };
    let mut submission = FrameSubmission::new();
    submission.push_static(facing_quad(&ctx), Matrix4::identity(), [1.0; 4]);
    renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render");

    let (pixels, width, _) = renderer.read_pixels(&ctx).await.expect("read back");
    let center = pixel_at(&pixels, width, WIDTH / 2, WIDTH / 2);
    let corner = pixel_at(&pixels, width, 2, 2);
    assert!(center[0] < 20, "center should be dark, got {}", center[0]);
    assert!(corner[0] > 100, "corner should show background, got {}", corner[0]);
}

#[tokio::test]
async fn flat_surface_keeps_full_ambient() {
    let ctx = headless_context().await;
    let mut renderer = SceneRenderer::new(&ctx).await.expect("renderer creation");
    let (camera, projection) = side_camera();

    // A single quad has no occluders, so the occlusion factor stays at 1
    // and the ambient term passes through composition unchanged.
    let settings = RenderSettings {
        direct_light: [0.0; 3],
        ambient_light: [0.5, 0.5, 0.5],
        background: [0.0; 3],
        dither: 0.0,
        ..RenderSettings::default()
    };
    let mut submission = FrameSubmission::new();
    submission.push_static(facing_quad(&ctx), Matrix4::identity(), [1.0; 4]);
    renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render");

    let (pixels, width, _) = renderer.read_pixels(&ctx).await.expect("read back");
    let center = pixel_at(&pixels, width, WIDTH / 2, WIDTH / 2);
    let expected = expected_channel(0.5, settings.white_point) as i32;
    for c in 0..3 {
        assert!(
            (center[c] as i32 - expected).abs() <= 3,
            "channel {c}: got {} expected {expected}",
            center[c]
        );
    }
}

#[tokio::test]
async fn frame_stats_count_entities_and_queues_drain() {
    let ctx = headless_context().await;
    let mut renderer = SceneRenderer::new(&ctx).await.expect("renderer creation");
    let (camera, projection) = side_camera();
    let settings = RenderSettings::default();
    let quad = facing_quad(&ctx);

    let mut submission = FrameSubmission::new();
    for i in 0..3 {
        let offset = Matrix4::from_translation(Vector3::new(0.0, 0.0, i as f32));
        submission.push_static(quad.clone(), offset, [1.0; 4]);
    }
    submission
        .push_batch(
            quad.clone(),
            vec![Matrix4::identity(); 5],
            vec![[0.5; 4]; 5],
        )
        .expect("batch push");

    let stats = renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render");
    assert_eq!(stats.static_entities, 3);
    assert_eq!(stats.instanced_batches, 1);
    assert_eq!(stats.instances, 8);
    // 4 draws in each of the two scene passes plus 4 fullscreen passes.
    assert_eq!(stats.draw_calls, 12);
    assert!(submission.is_empty());
    assert_eq!(renderer.frames(), 1);

    // A second frame with nothing queued renders clean.
    let stats = renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render");
    assert_eq!(stats, FrameStats { draw_calls: 4, ..FrameStats::default() });
    assert_eq!(renderer.frames(), 2);
}

#[tokio::test]
async fn access_off_the_owning_thread_panics() {
    let ctx = headless_context().await;
    let renderer = SceneRenderer::new(&ctx).await.expect("renderer creation");

    assert!(renderer.output_view().is_ok());
    std::thread::scope(|scope| {
        let handle = scope.spawn(|| {
            let _ = renderer.output_view();
        });
        assert!(
            handle.join().is_err(),
            "cross-thread access must panic, not hand out GPU views"
        );
    });
}

#[tokio::test]
async fn resize_recreates_every_target() {
    let ctx = headless_context().await;
    let mut renderer = SceneRenderer::new(&ctx).await.expect("renderer creation");
    let (camera, mut projection) = side_camera();
    let settings = RenderSettings::default();

    let mut submission = FrameSubmission::new();
    renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render before resize");

    renderer.resize(&ctx, 96, 48).expect("resize");
    projection.resize(96, 48);
    renderer
        .render(&ctx, &mut submission, &settings, &camera, &projection)
        .expect("render after resize");

    // 96 * 4 bytes per row is not copy-aligned, which also exercises the
    // read-back padding path.
    let (pixels, width, height) = renderer.read_pixels(&ctx).await.expect("read back");
    assert_eq!((width, height), (96, 48));
    assert_eq!(pixels.len(), 96 * 48 * 4);
}
