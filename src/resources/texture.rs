//! GPU textures.
//!
//! Textures are immutable after creation. A fixed lookup maps the channel
//! count of the source data to a transfer format; three-channel data is
//! expanded to four channels on upload since dense RGB has no GPU-side
//! format. 8-bit textures get a CPU-generated mip chain and clamped,
//! filtered sampling; float textures (kernel/noise carriers) use repeat
//! addressing and no mips.

use anyhow::{Context as _, bail};
use image::imageops::FilterType;
use image::{GenericImageView, RgbaImage};

/// Source pixel data for [`Texture::from_data`].
pub enum TextureData<'a> {
    U8(&'a [u8]),
    F32(&'a [f32]),
}

/// A GPU texture with its view and sampler.
#[derive(Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// The fixed channel-count lookup. Unsupported counts are a configuration
/// error, fatal to whoever is loading assets.
pub fn format_for(channels: u32, float: bool) -> anyhow::Result<wgpu::TextureFormat> {
    match (channels, float) {
        (1, false) => Ok(wgpu::TextureFormat::R8Unorm),
        (3, false) | (4, false) => Ok(wgpu::TextureFormat::Rgba8UnormSrgb),
        (1, true) => Ok(wgpu::TextureFormat::R32Float),
        (3, true) | (4, true) => Ok(wgpu::TextureFormat::Rgba32Float),
        _ => bail!("unsupported texture channel count {channels}"),
    }
}

/// Channels actually uploaded for a source channel count (RGB widens).
fn upload_channels(channels: u32) -> u32 {
    if channels == 3 { 4 } else { channels }
}

fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Widen source bytes to the RGBA base level mips are generated from:
/// single-channel data replicates into grey, RGB gains an opaque alpha.
fn base_image(width: u32, height: u32, channels: u32, bytes: &[u8]) -> anyhow::Result<RgbaImage> {
    match channels {
        1 => Ok(RgbaImage::from_fn(width, height, |x, y| {
            let v = bytes[(y * width + x) as usize];
            image::Rgba([v, v, v, 255])
        })),
        3 => Ok(RgbaImage::from_fn(width, height, |x, y| {
            let i = ((y * width + x) * 3) as usize;
            image::Rgba([bytes[i], bytes[i + 1], bytes[i + 2], 255])
        })),
        4 => RgbaImage::from_raw(width, height, bytes.to_vec())
            .context("RGBA byte length mismatch"),
        other => bail!("unsupported texture channel count {other}"),
    }
}

/// Bytes uploaded for one mip level: R8 textures collapse back to a single
/// channel, everything else uploads RGBA.
fn level_pixels(image: &image::DynamicImage, channels: u32) -> Vec<u8> {
    if channels == 1 {
        image.to_luma8().into_raw()
    } else {
        image.to_rgba8().into_raw()
    }
}

impl Texture {
    /// Create a texture from raw channel data.
    ///
    /// `data` must hold exactly `width * height * channels` values; RGB data
    /// is widened to RGBA during upload (alpha forced to max).
    pub fn from_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        channels: u32,
        data: TextureData<'_>,
        label: Option<&str>,
    ) -> anyhow::Result<Self> {
        let float = matches!(data, TextureData::F32(_));
        let format = format_for(channels, float)?;
        let expected = (width * height * channels) as usize;

        match data {
            TextureData::U8(bytes) => {
                if bytes.len() != expected {
                    bail!(
                        "texture data is {} bytes, expected {expected} ({width}x{height}x{channels})",
                        bytes.len()
                    );
                }
                Self::upload_u8(device, queue, width, height, channels, bytes, format, label)
            }
            TextureData::F32(values) => {
                if values.len() != expected {
                    bail!(
                        "texture data is {} floats, expected {expected} ({width}x{height}x{channels})",
                        values.len()
                    );
                }
                Self::upload_f32(device, queue, width, height, channels, values, format, label)
            }
        }
    }

    /// Decode an image file (PNG/JPEG bytes) into an 8-bit RGBA texture.
    pub fn from_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        label: &str,
    ) -> anyhow::Result<Self> {
        let img = image::load_from_memory(bytes).with_context(|| format!("decoding {label}"))?;
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        Self::upload_u8(
            device,
            queue,
            width,
            height,
            4,
            rgba.as_raw(),
            wgpu::TextureFormat::Rgba8UnormSrgb,
            Some(label),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_u8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        channels: u32,
        bytes: &[u8],
        format: wgpu::TextureFormat,
        label: Option<&str>,
    ) -> anyhow::Result<Self> {
        // Mips are built on the CPU from an RGBA working copy.
        let base = base_image(width, height, channels, bytes)?;

        let mip_levels = mip_level_count(width, height);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let bytes_per_pixel = if channels == 1 { 1u32 } else { 4u32 };
        let mut level_image = image::DynamicImage::ImageRgba8(base);
        for level in 0..mip_levels {
            let (lw, lh) = level_image.dimensions();
            let level_bytes = level_pixels(&level_image, channels);
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: level,
                    origin: wgpu::Origin3d::ZERO,
                },
                &level_bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(lw * bytes_per_pixel),
                    rows_per_image: Some(lh),
                },
                wgpu::Extent3d {
                    width: lw,
                    height: lh,
                    depth_or_array_layers: 1,
                },
            );
            if level + 1 < mip_levels {
                level_image =
                    level_image.resize_exact((lw / 2).max(1), (lh / 2).max(1), FilterType::Triangle);
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        Ok(Self {
            texture,
            view,
            sampler,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_f32(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        channels: u32,
        values: &[f32],
        format: wgpu::TextureFormat,
        label: Option<&str>,
    ) -> anyhow::Result<Self> {
        let widened;
        let upload: &[f32] = if channels == 3 {
            widened = values
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 1.0])
                .collect::<Vec<f32>>();
            &widened
        } else {
            values
        };

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            bytemuck::cast_slice(upload),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * upload_channels(channels) * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        Ok(Self {
            texture,
            view,
            sampler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_lookup_matches_the_fixed_table() {
        assert_eq!(format_for(1, false).unwrap(), wgpu::TextureFormat::R8Unorm);
        assert_eq!(
            format_for(3, false).unwrap(),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            format_for(4, false).unwrap(),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(format_for(1, true).unwrap(), wgpu::TextureFormat::R32Float);
        assert_eq!(
            format_for(4, true).unwrap(),
            wgpu::TextureFormat::Rgba32Float
        );
        assert!(format_for(2, false).is_err());
        assert!(format_for(0, true).is_err());
        assert!(format_for(5, false).is_err());
    }

    #[test]
    fn full_mip_chains_are_planned() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(256, 64), 9);
    }

    #[test]
    fn rgb_widens_to_opaque_rgba() {
        let base = base_image(2, 1, 3, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(base.as_raw().as_slice(), &[1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn single_channel_levels_collapse_back_to_one_channel() {
        // Grey pixels survive the RGBA round trip exactly.
        let base = base_image(2, 2, 1, &[0, 64, 128, 255]).unwrap();
        let level = level_pixels(&image::DynamicImage::ImageRgba8(base), 1);
        assert_eq!(level, vec![0, 64, 128, 255]);
    }

    #[test]
    fn rgba_levels_pass_through_unchanged() {
        let bytes = [9, 8, 7, 6, 5, 4, 3, 2];
        let base = base_image(2, 1, 4, &bytes).unwrap();
        let level = level_pixels(&image::DynamicImage::ImageRgba8(base), 4);
        assert_eq!(level, bytes.to_vec());
    }

    #[test]
    fn unsupported_channel_counts_fail_base_construction() {
        assert!(base_image(1, 1, 2, &[0, 0]).is_err());
    }
}
