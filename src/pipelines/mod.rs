//! Render pipelines.
//!
//! Every pass in the frame is driven by a [`Pipeline`]: one shader module,
//! one render pipeline, an optional uniform block at bind group 0 and an
//! optional set of input textures in the following group. Stage-specific
//! construction lives in [`stages`]; this module holds the shared wrapper.
//!
//! Shader compilation is validated eagerly: a WGSL error fails pipeline
//! construction with a real error instead of leaving a half-initialized
//! renderer behind.

pub mod stages;
pub mod uniforms;

use anyhow::bail;

use crate::pipelines::uniforms::{UniformLayout, UniformStore, UniformValue};

/// Everything needed to build one pass's pipeline.
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    /// WGSL source with `vs_main` and `fs_main` entry points.
    pub shader_source: &'a str,
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub targets: &'a [Option<wgpu::ColorTargetState>],
    pub depth: Option<wgpu::DepthStencilState>,
    pub samples: u32,
    /// `None` for passes whose shader declares no uniform struct.
    pub uniforms: Option<UniformLayout>,
    /// Number of input textures the fragment shader reads with
    /// `textureLoad`. Views are attached later via [`Pipeline::set_inputs`].
    pub input_textures: u32,
}

/// One render pass's pipeline with its uniform block and input bindings.
pub struct Pipeline {
    label: String,
    pipeline: wgpu::RenderPipeline,
    uniforms: Option<UniformStore>,
    uniform_bind_group: Option<wgpu::BindGroup>,
    input_layout: Option<wgpu::BindGroupLayout>,
    input_count: u32,
    input_bind_group: Option<wgpu::BindGroup>,
}

impl Pipeline {
    pub async fn new(device: &wgpu::Device, desc: PipelineDesc<'_>) -> anyhow::Result<Self> {
        let shader = compile_shader(device, desc.label, desc.shader_source).await?;

        let uniforms = desc
            .uniforms
            .map(|layout| UniformStore::new(device, &format!("{} uniforms", desc.label), layout));

        let uniform_layout = uniforms.is_some().then(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} uniform layout", desc.label)),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            })
        });
        let uniform_bind_group = match (&uniforms, &uniform_layout) {
            (Some(store), Some(layout)) => Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} uniform bind group", desc.label)),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: store.buffer().as_entire_binding(),
                }],
            })),
            _ => None,
        };

        let input_layout = if desc.input_textures > 0 {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..desc.input_textures)
                .map(|binding| wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    // Inputs are read with textureLoad, so nothing needs to
                    // be filterable and no samplers are bound.
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                })
                .collect();
            Some(
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} input layout", desc.label)),
                    entries: &entries,
                }),
            )
        } else {
            None
        };

        let mut bind_group_layouts = Vec::new();
        if let Some(layout) = &uniform_layout {
            bind_group_layouts.push(Some(layout));
        }
        if let Some(layout) = &input_layout {
            bind_group_layouts.push(Some(layout));
        }
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} layout", desc.label)),
            bind_group_layouts: &bind_group_layouts,
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: desc.vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: desc.targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: desc.depth,
            multisample: wgpu::MultisampleState {
                count: desc.samples,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview_mask: None,
            cache: None,
        });

        Ok(Self {
            label: desc.label.to_owned(),
            pipeline,
            uniforms,
            uniform_bind_group,
            input_layout,
            input_count: desc.input_textures,
            input_bind_group: None,
        })
    }

    /// Attach (or re-attach, after a resize) the input texture views, in
    /// binding order.
    pub fn set_inputs(
        &mut self,
        device: &wgpu::Device,
        views: &[&wgpu::TextureView],
    ) -> anyhow::Result<()> {
        let Some(layout) = &self.input_layout else {
            bail!("pipeline '{}' takes no input textures", self.label);
        };
        if views.len() as u32 != self.input_count {
            bail!(
                "pipeline '{}' takes {} input textures, got {}",
                self.label,
                self.input_count,
                views.len()
            );
        }
        let entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        self.input_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} inputs", self.label)),
            layout,
            entries: &entries,
        }));
        Ok(())
    }

    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        match &mut self.uniforms {
            Some(store) => store.set(name, value),
            None => log::warn!("pipeline '{}' has no uniform block", self.label),
        }
    }

    /// Upload pending uniform changes. Call before encoding the pass that
    /// uses them.
    pub fn flush_uniforms(&mut self, queue: &wgpu::Queue) {
        if let Some(store) = &mut self.uniforms {
            store.flush(queue);
        }
    }

    /// Bind the pipeline and its groups on a pass.
    pub fn start(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        let mut group = 0;
        if let Some(bind_group) = &self.uniform_bind_group {
            pass.set_bind_group(group, bind_group, &[]);
            group += 1;
        }
        if let Some(bind_group) = &self.input_bind_group {
            pass.set_bind_group(group, bind_group, &[]);
        }
    }
}

/// Compile WGSL with an explicit validation scope so a broken shader is a
/// hard error at startup.
async fn compile_shader(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> anyhow::Result<wgpu::ShaderModule> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    if let Some(error) = scope.pop().await {
        bail!("shader '{label}' failed to compile: {error}");
    }
    Ok(module)
}
