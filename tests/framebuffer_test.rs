#![cfg(feature = "integration-tests")]

mod common;

use common::test_utils::headless_context;
use shade_ngin::resources::framebuffer::{AttachmentDesc, Framebuffer, FramebufferDesc};

#[tokio::test]
async fn multisample_clear_resolves_to_the_clear_color() {
    let ctx = headless_context().await;
    let framebuffer = Framebuffer::new(
        &ctx.device,
        &FramebufferDesc {
            label: "resolve test",
            width: 32,
            height: 32,
            samples: 4,
            attachments: vec![AttachmentDesc {
                name: "color",
                slot: 0,
                format: wgpu::TextureFormat::Rgba8Unorm,
            }],
            depth: false,
        },
    )
    .expect("framebuffer creation");

    let clear = wgpu::Color {
        r: 1.0,
        g: 0.5,
        b: 0.25,
        a: 1.0,
    };
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
    {
        let attachments = framebuffer.color_attachments(&[clear]).expect("attachments");
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear pass"),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }
    ctx.queue.submit(std::iter::once(encoder.finish()));

    // The read-back goes through the single-sample resolve storage; every
    // pixel of a cleared pass must carry the clear color exactly.
    let (pixels, width, height) = framebuffer
        .read_pixels(&ctx.device, &ctx.queue, "color")
        .await
        .expect("read back");
    assert_eq!((width, height), (32, 32));
    let expected = [255u8, 128, 64, 255];
    for pixel in pixels.chunks_exact(4) {
        for c in 0..4 {
            assert!(
                (pixel[c] as i32 - expected[c] as i32).abs() <= 1,
                "channel {c}: got {} expected {}",
                pixel[c],
                expected[c]
            );
        }
    }

    assert!(framebuffer.sample_view("color").is_ok());
    assert!(framebuffer.sample_view("missing").is_err());
}
