//! SSAO sample kernel and rotation noise.
//!
//! The occlusion pass point-samples a fixed hemisphere kernel around every
//! fragment. Samples are biased towards the fragment so close-by geometry
//! dominates the integral: sample `i` has magnitude `0.1 + 0.9 * (i/16)^2`.
//! A tileable 4x4 noise texture of per-pixel rotation vectors decorrelates
//! neighbouring fragments; the blur pass later averages the noise away.

use rand::Rng;

use crate::context::Context;
use crate::resources::texture::{Texture, TextureData};

/// Number of hemisphere samples; fixed, mirrored in the SSAO shader.
pub const KERNEL_SIZE: usize = 16;
/// Side length of the tileable rotation-noise texture.
pub const NOISE_DIM: u32 = 4;

/// The fixed hemisphere sample set, generated once at renderer init.
#[derive(Clone, Debug)]
pub struct SsaoKernel {
    pub samples: [[f32; 3]; KERNEL_SIZE],
}

impl SsaoKernel {
    /// Generate a fresh kernel. Every sample points into the +z hemisphere
    /// (tangent space, z = surface normal) and carries the index-dependent
    /// magnitude described in the module docs.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let mut samples = [[0.0f32; 3]; KERNEL_SIZE];
        for (i, sample) in samples.iter_mut().enumerate() {
            let v = loop {
                let v = [
                    rng.gen_range(-1.0f32..=1.0),
                    rng.gen_range(-1.0f32..=1.0),
                    rng.gen_range(0.0f32..=1.0),
                ];
                let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
                // Rejecting near-zero draws keeps the normalization stable.
                if len > 1e-3 {
                    break [v[0] / len, v[1] / len, v[2] / len];
                }
            };
            let t = i as f32 / KERNEL_SIZE as f32;
            let scale = 0.1 + 0.9 * t * t;
            *sample = [v[0] * scale, v[1] * scale, v[2] * scale];
        }
        Self { samples }
    }
}

/// Build the tileable rotation-noise texture: random unit-ish vectors in the
/// tangent plane (z = 0), stored as a 4-channel float texture with repeat
/// addressing and no mips.
pub fn noise_texture<R: Rng>(ctx: &Context, rng: &mut R) -> anyhow::Result<Texture> {
    let mut data = Vec::with_capacity((NOISE_DIM * NOISE_DIM * 4) as usize);
    for _ in 0..NOISE_DIM * NOISE_DIM {
        data.push(rng.gen_range(-1.0f32..=1.0));
        data.push(rng.gen_range(-1.0f32..=1.0));
        data.push(0.0);
        data.push(0.0);
    }
    Texture::from_data(
        &ctx.device,
        &ctx.queue,
        NOISE_DIM,
        NOISE_DIM,
        4,
        TextureData::F32(&data),
        Some("ssao noise"),
    )
}
