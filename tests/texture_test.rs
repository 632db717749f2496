#![cfg(feature = "integration-tests")]

mod common;

use std::io::Cursor;

use common::test_utils::headless_context;
use shade_ngin::resources::texture::{Texture, TextureData};

#[tokio::test]
async fn eight_bit_uploads_build_full_mip_chains() {
    let ctx = headless_context().await;
    for channels in [1u32, 3, 4] {
        let data = vec![128u8; (8 * 8 * channels) as usize];
        let texture = Texture::from_data(
            &ctx.device,
            &ctx.queue,
            8,
            8,
            channels,
            TextureData::U8(&data),
            Some("mip chain test"),
        )
        .unwrap_or_else(|e| panic!("{channels}-channel upload failed: {e}"));
        // 8x8 gets levels 8, 4, 2, 1.
        assert_eq!(
            texture.texture.mip_level_count(),
            4,
            "channels {channels}"
        );
    }
}

#[tokio::test]
async fn png_bytes_decode_to_a_mipped_texture() {
    let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode");

    let ctx = headless_context().await;
    let texture =
        Texture::from_bytes(&ctx.device, &ctx.queue, &bytes, "png test").expect("png upload");
    assert_eq!(texture.texture.mip_level_count(), 3);
}

#[tokio::test]
async fn wrong_data_length_is_rejected() {
    let ctx = headless_context().await;
    let result = Texture::from_data(
        &ctx.device,
        &ctx.queue,
        4,
        4,
        4,
        TextureData::U8(&[0u8; 3]),
        Some("short data"),
    );
    assert!(result.is_err());
}
