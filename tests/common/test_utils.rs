//! Shared helpers for GPU integration tests. Everything here assumes an
//! adapter is present; the tests are gated behind the `integration-tests`
//! feature so the default suite runs without one.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use shade_ngin::Deg;
use shade_ngin::camera::{OrbitCamera, Projection};
use shade_ngin::context::Context;
use shade_ngin::resources::mesh::Mesh;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 64;

pub async fn headless_context() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::headless(WIDTH, HEIGHT)
        .await
        .expect("no GPU adapter available for integration tests")
}

/// Camera on the +x axis looking at the origin, with a matching projection.
pub fn side_camera() -> (OrbitCamera, Projection) {
    let camera = OrbitCamera::new(3.0, 0.0, std::f32::consts::FRAC_PI_2);
    let projection = Projection::new(WIDTH, HEIGHT, Deg(45.0), 0.1, 100.0);
    (camera, projection)
}

/// A unit quad in the yz plane facing +x, wound towards the side camera.
pub fn facing_quad(ctx: &Context) -> Arc<Mesh> {
    #[rustfmt::skip]
    const VERTICES: [f32; 24] = [
        // position          normal
        0.0, -0.5,  0.5,  1.0, 0.0, 0.0,
        0.0, -0.5, -0.5,  1.0, 0.0, 0.0,
        0.0,  0.5, -0.5,  1.0, 0.0, 0.0,
        0.0,  0.5,  0.5,  1.0, 0.0, 0.0,
    ];
    const INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];
    Arc::new(
        Mesh::new(&ctx.device, "facing quad", &VERTICES, &INDICES, &[3, 3])
            .expect("quad mesh creation"),
    )
}

/// Predict an output byte: extended Reinhard tone mapping followed by the
/// sRGB transfer the output format applies.
pub fn expected_channel(linear: f32, white_point: f32) -> u8 {
    let white_sq = white_point * white_point;
    let mapped = linear * (1.0 + linear / white_sq) / (1.0 + linear);
    let srgb = if mapped <= 0.003_130_8 {
        mapped * 12.92
    } else {
        1.055 * mapped.powf(1.0 / 2.4) - 0.055
    };
    (srgb.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// RGBA bytes of one pixel from a tightly packed read-back.
pub fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}
