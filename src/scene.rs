//! The scene renderer: drives the full pass chain for one frame.
//!
//! A frame runs lighting (multisampled, resolved into single-sample
//! attachments), geometry, occlusion, blur, compose and effect, always in
//! that order. The renderer owns every framebuffer, pipeline and scratch
//! buffer involved; callers hand it a drained-per-frame [`FrameSubmission`]
//! plus the current camera and settings, and read the finished frame from
//! [`SceneRenderer::output_view`], the surface blit or the pixel export.
//!
//! The renderer is single-threaded: every call must come from the thread
//! that created it, and violating that is a programming error that panics
//! rather than corrupting GPU state.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::camera::{OrbitCamera, Projection};
use crate::context::Context;
use crate::pipelines::stages::{
    self, GEOMETRY_FORMAT, HDR_FORMAT, LIT_SAMPLES, OCCLUSION_FORMAT, OUTPUT_FORMAT,
};
use crate::pipelines::uniforms::UniformValue;
use crate::pipelines::Pipeline;
use crate::resources::framebuffer::{AttachmentDesc, Framebuffer, FramebufferDesc};
use crate::resources::instance::{
    FLOATS_PER_COLOR, FLOATS_PER_MODEL, InstanceBuffer, flatten_matrix,
};
use crate::resources::mesh::Mesh;
use crate::ssao::{self, SsaoKernel};
use crate::submission::FrameSubmission;

/// Everything tunable about how a frame looks.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    /// Directional light color, scaled by the diffuse/specular terms.
    pub direct_light: [f32; 3],
    /// Ambient light color, scaled by the occlusion factor at composition.
    pub ambient_light: [f32; 3],
    /// World-space direction the light travels in.
    pub light_direction: [f32; 3],
    /// 0 = mirror-sharp highlights, 1 = fully rough.
    pub roughness: f32,
    /// Specular highlight strength.
    pub reflectivity: f32,
    /// View-space radius of the occlusion hemisphere.
    pub ssao_radius: f32,
    /// Depth range over which an occluder still counts; beyond it the
    /// contribution fades to nothing.
    pub ssao_range: f32,
    /// Minimum depth difference before a sample counts as occluded; keeps
    /// flat surfaces from shadowing themselves.
    pub ssao_boundary: f32,
    /// Luminance that tone-maps to full white.
    pub white_point: f32,
    /// Dither amplitude in 8-bit steps; 0 disables dithering.
    pub dither: f32,
    /// Clear color behind all geometry (linear).
    pub background: [f32; 3],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            direct_light: [1.0, 0.96, 0.9],
            ambient_light: [0.35, 0.35, 0.4],
            light_direction: [-0.5, -1.0, -0.3],
            roughness: 0.6,
            reflectivity: 0.3,
            ssao_radius: 0.5,
            ssao_range: 0.5,
            ssao_boundary: 0.025,
            white_point: 2.5,
            dither: 1.0,
            background: [0.05, 0.06, 0.08],
        }
    }
}

/// Counters for the most recent frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub static_entities: usize,
    pub instanced_batches: usize,
    /// Total instances drawn, statics included.
    pub instances: usize,
    /// Draw commands encoded, scene passes and fullscreen passes together.
    pub draw_calls: usize,
}

/// All render targets, recreated together on resize.
struct Targets {
    lit: Framebuffer,
    geometry: Framebuffer,
    occlusion: Framebuffer,
    blur: Framebuffer,
    compose: Framebuffer,
    output: Framebuffer,
}

impl Targets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> anyhow::Result<Self> {
        let lit = Framebuffer::new(
            device,
            &FramebufferDesc {
                label: "lit",
                width,
                height,
                samples: LIT_SAMPLES,
                attachments: vec![
                    AttachmentDesc {
                        name: "direct",
                        slot: 0,
                        format: HDR_FORMAT,
                    },
                    AttachmentDesc {
                        name: "ambient",
                        slot: 1,
                        format: HDR_FORMAT,
                    },
                ],
                depth: true,
            },
        )?;
        let geometry = Framebuffer::new(
            device,
            &FramebufferDesc {
                label: "geometry",
                width,
                height,
                samples: 1,
                attachments: vec![
                    AttachmentDesc {
                        name: "position",
                        slot: 0,
                        format: GEOMETRY_FORMAT,
                    },
                    AttachmentDesc {
                        name: "normal",
                        slot: 1,
                        format: GEOMETRY_FORMAT,
                    },
                ],
                depth: true,
            },
        )?;
        let occlusion = Framebuffer::new(
            device,
            &FramebufferDesc {
                label: "occlusion",
                width,
                height,
                samples: 1,
                attachments: vec![AttachmentDesc {
                    name: "occlusion",
                    slot: 0,
                    format: OCCLUSION_FORMAT,
                }],
                depth: false,
            },
        )?;
        let blur = Framebuffer::new(
            device,
            &FramebufferDesc {
                label: "blur",
                width,
                height,
                samples: 1,
                attachments: vec![AttachmentDesc {
                    name: "occlusion",
                    slot: 0,
                    format: OCCLUSION_FORMAT,
                }],
                depth: false,
            },
        )?;
        let compose = Framebuffer::new(
            device,
            &FramebufferDesc {
                label: "compose",
                width,
                height,
                samples: 1,
                attachments: vec![AttachmentDesc {
                    name: "color",
                    slot: 0,
                    format: HDR_FORMAT,
                }],
                depth: false,
            },
        )?;
        let output = Framebuffer::new(
            device,
            &FramebufferDesc {
                label: "output",
                width,
                height,
                samples: 1,
                attachments: vec![AttachmentDesc {
                    name: "color",
                    slot: 0,
                    format: OUTPUT_FORMAT,
                }],
                depth: false,
            },
        )?;
        Ok(Self {
            lit,
            geometry,
            occlusion,
            blur,
            compose,
            output,
        })
    }
}

/// One instanced draw against the shared scratch buffers.
struct DrawRange {
    mesh: Arc<Mesh>,
    first: usize,
    count: usize,
}

pub struct SceneRenderer {
    thread: ThreadId,
    targets: Targets,
    lighting: Pipeline,
    geometry: Pipeline,
    occlusion: Pipeline,
    blur: Pipeline,
    compose: Pipeline,
    effect: Pipeline,
    blit: Pipeline,
    quad: Mesh,
    models: InstanceBuffer,
    colors: InstanceBuffer,
    kernel: SsaoKernel,
    noise: crate::resources::texture::Texture,
    stats: FrameStats,
    frames: u64,
}

impl SceneRenderer {
    pub async fn new(ctx: &Context) -> anyhow::Result<Self> {
        let (width, height) = (ctx.config.width, ctx.config.height);
        let targets = Targets::new(&ctx.device, width, height)?;

        let lighting = stages::lighting(&ctx.device).await?;
        let geometry = stages::geometry(&ctx.device).await?;
        let mut occlusion = stages::occlusion(&ctx.device).await?;
        let blur = stages::blur(&ctx.device).await?;
        let compose = stages::compose(&ctx.device).await?;
        let effect = stages::effect(&ctx.device).await?;
        let blit = stages::blit(&ctx.device, ctx.config.format).await?;
        let quad = stages::fullscreen_quad(&ctx.device)?;

        let mut rng = rand::thread_rng();
        let kernel = SsaoKernel::generate(&mut rng);
        let noise = ssao::noise_texture(ctx, &mut rng)?;
        occlusion.set_uniform(
            "kernel",
            UniformValue::Vec3Array(kernel.samples.to_vec()),
        );

        let models = InstanceBuffer::new(&ctx.device, FLOATS_PER_MODEL, "instance models");
        let colors = InstanceBuffer::new(&ctx.device, FLOATS_PER_COLOR, "instance colors");

        let mut renderer = Self {
            thread: thread::current().id(),
            targets,
            lighting,
            geometry,
            occlusion,
            blur,
            compose,
            effect,
            blit,
            quad,
            models,
            colors,
            kernel,
            noise,
            stats: FrameStats::default(),
            frames: 0,
        };
        renderer.wire_inputs(&ctx.device)?;
        log::info!("scene renderer ready at {width}x{height}");
        Ok(renderer)
    }

    /// Point every fullscreen pipeline at the current framebuffer views.
    /// Re-run after the targets are recreated.
    fn wire_inputs(&mut self, device: &wgpu::Device) -> anyhow::Result<()> {
        self.occlusion.set_inputs(
            device,
            &[
                self.targets.geometry.sample_view("position")?,
                self.targets.geometry.sample_view("normal")?,
                &self.noise.view,
            ],
        )?;
        self.blur
            .set_inputs(device, &[self.targets.occlusion.sample_view("occlusion")?])?;
        self.compose.set_inputs(
            device,
            &[
                self.targets.lit.sample_view("direct")?,
                self.targets.lit.sample_view("ambient")?,
                self.targets.blur.sample_view("occlusion")?,
            ],
        )?;
        self.effect
            .set_inputs(device, &[self.targets.compose.sample_view("color")?])?;
        self.blit
            .set_inputs(device, &[self.targets.output.sample_view("color")?])?;
        Ok(())
    }

    /// Recreate every render target at a new size.
    pub fn resize(&mut self, ctx: &Context, width: u32, height: u32) -> anyhow::Result<()> {
        self.check_thread();
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.targets = Targets::new(&ctx.device, width, height)?;
        self.wire_inputs(&ctx.device)
    }

    /// Render one frame. Drains `submission` completely; the queues are
    /// empty when this returns.
    pub fn render(
        &mut self,
        ctx: &Context,
        submission: &mut FrameSubmission,
        settings: &RenderSettings,
        camera: &OrbitCamera,
        projection: &Projection,
    ) -> anyhow::Result<FrameStats> {
        self.check_thread();
        let started = instant::Instant::now();

        let (statics, batches) = submission.drain();

        // Flatten everything into the two scratch buffers up front; the
        // writes must be queued before any pass is encoded so they land
        // ahead of the frame's draws.
        let mut model_floats = Vec::new();
        let mut color_floats = Vec::new();
        let mut draws = Vec::with_capacity(statics.len() + batches.len());
        let mut stats = FrameStats {
            static_entities: statics.len(),
            instanced_batches: batches.len(),
            ..FrameStats::default()
        };

        for entity in statics {
            check_scene_mesh(&entity.mesh)?;
            draws.push(DrawRange {
                mesh: entity.mesh,
                first: model_floats.len() / FLOATS_PER_MODEL,
                count: 1,
            });
            model_floats.extend_from_slice(&flatten_matrix(&entity.model));
            color_floats.extend_from_slice(&entity.color);
        }
        for batch in batches {
            check_scene_mesh(&batch.mesh)?;
            let count = batch.count();
            if count == 0 {
                continue;
            }
            draws.push(DrawRange {
                mesh: batch.mesh,
                first: model_floats.len() / FLOATS_PER_MODEL,
                count,
            });
            for model in &batch.models {
                model_floats.extend_from_slice(&flatten_matrix(model));
            }
            for color in &batch.colors {
                color_floats.extend_from_slice(color);
            }
        }
        stats.instances = model_floats.len() / FLOATS_PER_MODEL;

        self.models.upload(&ctx.device, &ctx.queue, &model_floats);
        self.colors.upload(&ctx.device, &ctx.queue, &color_floats);
        self.update_uniforms(ctx, settings, camera, projection);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        let background = wgpu::Color {
            r: settings.background[0] as f64,
            g: settings.background[1] as f64,
            b: settings.background[2] as f64,
            a: 1.0,
        };

        // Lighting: direct clears to the background so unlit pixels show
        // it after composition; ambient clears to black.
        {
            let attachments = self
                .targets
                .lit
                .color_attachments(&[background, wgpu::Color::BLACK])?;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lighting pass"),
                color_attachments: &attachments,
                depth_stencil_attachment: self.targets.lit.depth_attachment(),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            self.lighting.start(&mut pass);
            for draw in &draws {
                pass.set_vertex_buffer(1, self.models.slice(draw.first, draw.count));
                pass.set_vertex_buffer(2, self.colors.slice(draw.first, draw.count));
                draw.mesh.draw_instanced(&mut pass, 0..draw.count as u32);
                stats.draw_calls += 1;
            }
        }

        // Geometry: position w = 0 in the clear marks background pixels.
        {
            let attachments = self
                .targets
                .geometry
                .color_attachments(&[wgpu::Color::TRANSPARENT, wgpu::Color::TRANSPARENT])?;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("geometry pass"),
                color_attachments: &attachments,
                depth_stencil_attachment: self.targets.geometry.depth_attachment(),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            self.geometry.start(&mut pass);
            for draw in &draws {
                pass.set_vertex_buffer(1, self.models.slice(draw.first, draw.count));
                draw.mesh.draw_instanced(&mut pass, 0..draw.count as u32);
                stats.draw_calls += 1;
            }
        }

        stats.draw_calls += self.fullscreen_pass(
            &mut encoder,
            "occlusion pass",
            &self.targets.occlusion,
            &self.occlusion,
        )?;
        stats.draw_calls +=
            self.fullscreen_pass(&mut encoder, "blur pass", &self.targets.blur, &self.blur)?;
        stats.draw_calls += self.fullscreen_pass(
            &mut encoder,
            "compose pass",
            &self.targets.compose,
            &self.compose,
        )?;
        stats.draw_calls += self.fullscreen_pass(
            &mut encoder,
            "effect pass",
            &self.targets.output,
            &self.effect,
        )?;

        ctx.queue.submit(std::iter::once(encoder.finish()));

        self.stats = stats;
        self.frames += 1;
        log::trace!(
            "frame {} encoded in {:?} ({} instances, {} draw calls)",
            self.frames,
            started.elapsed(),
            stats.instances,
            stats.draw_calls
        );
        Ok(stats)
    }

    fn update_uniforms(
        &mut self,
        ctx: &Context,
        settings: &RenderSettings,
        camera: &OrbitCamera,
        projection: &Projection,
    ) {
        let view = camera.view_matrix();
        let proj = projection.matrix();
        let position = camera.position();

        self.lighting.set_uniform("view", UniformValue::Mat4(view));
        self.lighting
            .set_uniform("projection", UniformValue::Mat4(proj));
        self.lighting.set_uniform(
            "camera_position",
            UniformValue::Vec3([position.x, position.y, position.z]),
        );
        self.lighting.set_uniform(
            "light_direction",
            UniformValue::Vec3(settings.light_direction),
        );
        self.lighting
            .set_uniform("roughness", UniformValue::Scalar(settings.roughness));
        self.lighting
            .set_uniform("direct_light", UniformValue::Vec3(settings.direct_light));
        self.lighting
            .set_uniform("reflectivity", UniformValue::Scalar(settings.reflectivity));
        self.lighting
            .set_uniform("ambient_light", UniformValue::Vec3(settings.ambient_light));

        self.geometry.set_uniform("view", UniformValue::Mat4(view));
        self.geometry
            .set_uniform("projection", UniformValue::Mat4(proj));

        self.occlusion
            .set_uniform("projection", UniformValue::Mat4(proj));
        self.occlusion
            .set_uniform("radius", UniformValue::Scalar(settings.ssao_radius));
        self.occlusion
            .set_uniform("range", UniformValue::Scalar(settings.ssao_range));
        self.occlusion
            .set_uniform("boundary", UniformValue::Scalar(settings.ssao_boundary));

        self.compose
            .set_uniform("white_point", UniformValue::Scalar(settings.white_point));
        self.effect
            .set_uniform("dither", UniformValue::Scalar(settings.dither));

        for pipeline in [
            &mut self.lighting,
            &mut self.geometry,
            &mut self.occlusion,
            &mut self.compose,
            &mut self.effect,
        ] {
            pipeline.flush_uniforms(&ctx.queue);
        }
    }

    /// Encode one fullscreen pass; returns the number of draw calls (1).
    fn fullscreen_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        framebuffer: &Framebuffer,
        pipeline: &Pipeline,
    ) -> anyhow::Result<usize> {
        let attachments = framebuffer.color_attachments(&[wgpu::Color::BLACK])?;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pipeline.start(&mut pass);
        self.quad.draw_instanced(&mut pass, 0..1);
        Ok(1)
    }

    /// Blit the finished frame to the window surface and present it.
    pub fn blit_to_surface(&mut self, ctx: &Context) -> anyhow::Result<()> {
        self.check_thread();
        let Some(surface) = &ctx.surface else {
            anyhow::bail!("cannot present on a headless context");
        };
        let frame = match surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(frame)
            | wgpu::CurrentSurfaceTexture::Suboptimal(frame) => frame,
            status => anyhow::bail!("failed to acquire surface texture: {status:?}"),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            self.blit.start(&mut pass);
            self.quad.draw_instanced(&mut pass, 0..1);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Read the finished frame back as tightly packed RGBA bytes.
    pub async fn read_pixels(&self, ctx: &Context) -> anyhow::Result<(Vec<u8>, u32, u32)> {
        self.check_thread();
        self.targets
            .output
            .read_pixels(&ctx.device, &ctx.queue, "color")
            .await
    }

    /// View of the finished frame, for embedding in a larger UI pass.
    pub fn output_view(&self) -> anyhow::Result<&wgpu::TextureView> {
        self.check_thread();
        self.targets.output.sample_view("color")
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn kernel(&self) -> &SsaoKernel {
        &self.kernel
    }

    fn check_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.thread,
            "SceneRenderer must be used from the thread that created it"
        );
    }
}

/// Scene passes require position + normal vertices; anything else is a
/// submission error surfaced before it can corrupt a frame.
fn check_scene_mesh(mesh: &Mesh) -> anyhow::Result<()> {
    let expected: usize = stages::SCENE_VERTEX_COMPONENTS.iter().sum::<u32>() as usize;
    if mesh.layout.floats_per_vertex() != expected {
        anyhow::bail!(
            "scene meshes need {expected} floats per vertex (position + normal), got {}",
            mesh.layout.floats_per_vertex()
        );
    }
    Ok(())
}
