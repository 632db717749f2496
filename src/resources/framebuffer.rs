//! Offscreen framebuffers with named color attachments.
//!
//! A framebuffer owns one color texture per named attachment, bound to a
//! fixed slot, plus optional multisample storage and an optional depth
//! buffer. The attachment set is closed at creation: descriptor validation
//! failures are configuration errors and fatal to pipeline setup, because a
//! render into a broken framebuffer would silently corrupt every downstream
//! pass.
//!
//! Multisampled framebuffers also own a single-sample resolve texture per
//! attachment. Multisampled storage can never be sampled directly; render
//! passes resolve into the single-sample twin, and
//! [`Framebuffer::sample_view`] always hands out the sampleable one.

use anyhow::{Context as _, bail};

pub const MAX_COLOR_SLOTS: u32 = 4;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// One named color attachment request.
#[derive(Clone, Debug)]
pub struct AttachmentDesc {
    pub name: &'static str,
    pub slot: u32,
    pub format: wgpu::TextureFormat,
}

/// Framebuffer configuration, validated before any GPU allocation.
#[derive(Clone, Debug)]
pub struct FramebufferDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub attachments: Vec<AttachmentDesc>,
    pub depth: bool,
}

impl FramebufferDesc {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("framebuffer '{}' has zero extent", self.label);
        }
        if !matches!(self.samples, 1 | 2 | 4 | 8) {
            bail!(
                "framebuffer '{}' requests unsupported sample count {}",
                self.label,
                self.samples
            );
        }
        if self.attachments.is_empty() {
            bail!("framebuffer '{}' declares no color attachments", self.label);
        }
        for (i, attachment) in self.attachments.iter().enumerate() {
            if attachment.slot >= MAX_COLOR_SLOTS {
                bail!(
                    "framebuffer '{}': attachment '{}' uses slot {} outside the fixed set 0..{}",
                    self.label,
                    attachment.name,
                    attachment.slot,
                    MAX_COLOR_SLOTS
                );
            }
            for other in &self.attachments[i + 1..] {
                if other.name == attachment.name {
                    bail!(
                        "framebuffer '{}': duplicate attachment name '{}'",
                        self.label,
                        attachment.name
                    );
                }
                if other.slot == attachment.slot {
                    bail!(
                        "framebuffer '{}': attachments '{}' and '{}' share slot {}",
                        self.label,
                        attachment.name,
                        other.name,
                        attachment.slot
                    );
                }
            }
        }
        Ok(())
    }
}

struct ColorAttachment {
    name: &'static str,
    format: wgpu::TextureFormat,
    view: wgpu::TextureView,
    /// Single-sample twin, present when the framebuffer is multisampled.
    resolve_view: Option<wgpu::TextureView>,
    texture: wgpu::Texture,
    resolve_texture: Option<wgpu::Texture>,
}

/// A set of named render targets created once at pipeline initialization.
pub struct Framebuffer {
    label: &'static str,
    width: u32,
    height: u32,
    samples: u32,
    /// Sorted by slot; render pass color attachments follow this order.
    color: Vec<ColorAttachment>,
    depth_view: Option<wgpu::TextureView>,
}

impl Framebuffer {
    pub fn new(device: &wgpu::Device, desc: &FramebufferDesc) -> anyhow::Result<Self> {
        desc.validate()?;

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let mut attachments = desc.attachments.clone();
        attachments.sort_by_key(|a| a.slot);

        let mut color = Vec::with_capacity(attachments.len());
        for attachment in &attachments {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{} {}", desc.label, attachment.name)),
                size,
                mip_level_count: 1,
                sample_count: desc.samples,
                dimension: wgpu::TextureDimension::D2,
                format: attachment.format,
                usage: if desc.samples > 1 {
                    wgpu::TextureUsages::RENDER_ATTACHMENT
                } else {
                    wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC
                },
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let (resolve_texture, resolve_view) = if desc.samples > 1 {
                let resolve = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("{} {} resolve", desc.label, attachment.name)),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: attachment.format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                });
                let resolve_view = resolve.create_view(&wgpu::TextureViewDescriptor::default());
                (Some(resolve), Some(resolve_view))
            } else {
                (None, None)
            };

            color.push(ColorAttachment {
                name: attachment.name,
                format: attachment.format,
                view,
                resolve_view,
                texture,
                resolve_texture,
            });
        }

        let depth_view = if desc.depth {
            let depth = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{} depth", desc.label)),
                size,
                mip_level_count: 1,
                sample_count: desc.samples,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            Some(depth.create_view(&wgpu::TextureViewDescriptor::default()))
        } else {
            None
        };

        Ok(Self {
            label: desc.label,
            width: desc.width,
            height: desc.height,
            samples: desc.samples,
            color,
            depth_view,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn attachment(&self, name: &str) -> anyhow::Result<&ColorAttachment> {
        self.color
            .iter()
            .find(|a| a.name == name)
            .with_context(|| format!("framebuffer '{}' has no attachment '{name}'", self.label))
    }

    /// Declare the full draw-buffer set for a render pass, clearing every
    /// attachment to its paired color. On multisampled framebuffers this
    /// also wires the mandatory resolve into the single-sample twins.
    pub fn color_attachments(
        &self,
        clear: &[wgpu::Color],
    ) -> anyhow::Result<Vec<Option<wgpu::RenderPassColorAttachment<'_>>>> {
        if clear.len() != self.color.len() {
            bail!(
                "framebuffer '{}' has {} attachments but {} clear colors were given",
                self.label,
                self.color.len(),
                clear.len()
            );
        }
        Ok(self
            .color
            .iter()
            .zip(clear.iter())
            .map(|(attachment, &clear)| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &attachment.view,
                    resolve_target: attachment.resolve_view.as_ref(),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect())
    }

    pub fn depth_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        self.depth_view
            .as_ref()
            .map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            })
    }

    /// View of a named attachment for sampling in a later pass. Always the
    /// single-sample (resolved) storage.
    pub fn sample_view(&self, name: &str) -> anyhow::Result<&wgpu::TextureView> {
        let attachment = self.attachment(name)?;
        Ok(attachment.resolve_view.as_ref().unwrap_or(&attachment.view))
    }

    /// Read a named attachment back as tightly packed bytes
    /// (`pixel size x width x height`), for export/screenshot use.
    pub async fn read_pixels(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        name: &str,
    ) -> anyhow::Result<(Vec<u8>, u32, u32)> {
        let attachment = self.attachment(name)?;
        let texture = attachment
            .resolve_texture
            .as_ref()
            .unwrap_or(&attachment.texture);
        let bytes_per_pixel = pixel_size(attachment.format)?;

        // Copies require rows padded to 256 bytes; the padding is stripped
        // below before returning.
        let unpadded_bytes_per_row = self.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("attachment read-back buffer"),
            size: (padded_bytes_per_row * self.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("attachment read-back encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        // NOTE: the mapping must be requested and the device polled before
        // the future is awaited, or the wait never completes.
        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow::anyhow!("device poll failed during read-back: {e:?}"))?;
        rx.receive()
            .await
            .context("read-back mapping callback dropped")??;

        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * self.height) as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in data.chunks(padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
        }
        output_buffer.unmap();

        Ok((pixels, self.width, self.height))
    }
}

/// Bytes per pixel for the formats this core renders into.
pub fn pixel_size(format: wgpu::TextureFormat) -> anyhow::Result<u32> {
    match format {
        wgpu::TextureFormat::R8Unorm => Ok(1),
        wgpu::TextureFormat::Rgba8Unorm
        | wgpu::TextureFormat::Rgba8UnormSrgb
        | wgpu::TextureFormat::R32Float => Ok(4),
        wgpu::TextureFormat::Rgba16Float => Ok(8),
        wgpu::TextureFormat::Rgba32Float => Ok(16),
        other => bail!("no read-back support for attachment format {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(attachments: Vec<AttachmentDesc>) -> FramebufferDesc {
        FramebufferDesc {
            label: "test",
            width: 64,
            height: 64,
            samples: 1,
            attachments,
            depth: false,
        }
    }

    #[test]
    fn duplicate_names_and_slots_are_configuration_errors() {
        let dup_name = desc(vec![
            AttachmentDesc {
                name: "color",
                slot: 0,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
            },
            AttachmentDesc {
                name: "color",
                slot: 1,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
            },
        ]);
        assert!(dup_name.validate().is_err());

        let dup_slot = desc(vec![
            AttachmentDesc {
                name: "a",
                slot: 0,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
            },
            AttachmentDesc {
                name: "b",
                slot: 0,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
            },
        ]);
        assert!(dup_slot.validate().is_err());
    }

    #[test]
    fn slot_set_is_closed() {
        let out_of_range = desc(vec![AttachmentDesc {
            name: "a",
            slot: MAX_COLOR_SLOTS,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
        }]);
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn sample_counts_and_extent_are_checked() {
        let mut d = desc(vec![AttachmentDesc {
            name: "a",
            slot: 0,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
        }]);
        assert!(d.validate().is_ok());
        d.samples = 3;
        assert!(d.validate().is_err());
        d.samples = 4;
        d.width = 0;
        assert!(d.validate().is_err());
    }

    #[test]
    fn pixel_sizes_cover_render_formats() {
        assert_eq!(pixel_size(wgpu::TextureFormat::R8Unorm).unwrap(), 1);
        assert_eq!(pixel_size(wgpu::TextureFormat::Rgba8UnormSrgb).unwrap(), 4);
        assert_eq!(pixel_size(wgpu::TextureFormat::Rgba16Float).unwrap(), 8);
        assert!(pixel_size(wgpu::TextureFormat::Depth32Float).is_err());
    }
}
