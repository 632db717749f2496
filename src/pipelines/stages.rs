//! Pipeline constructors for the fixed pass chain.
//!
//! The frame runs lighting (multisampled, resolved on pass end), geometry,
//! occlusion, blur, compose and effect, in that order, plus a blit used when
//! presenting to a window surface. Each constructor fixes the stage's
//! vertex inputs, targets and uniform struct; the scene renderer only wires
//! framebuffers between them.

use crate::pipelines::uniforms::{UniformKind, UniformLayout};
use crate::pipelines::{Pipeline, PipelineDesc};
use crate::resources::framebuffer::DEPTH_FORMAT;
use crate::resources::instance;
use crate::resources::mesh::{Mesh, VertexLayout};

/// Format of the lit and composed color attachments.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of the view-space position and normal attachments.
pub const GEOMETRY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Single-channel occlusion factor.
pub const OCCLUSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
/// Format of the final frame.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
/// Sample count of the lighting pass.
pub const LIT_SAMPLES: u32 = 4;

fn target(format: wgpu::TextureFormat) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    })
}

fn depth_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: Some(true),
        depth_compare: Some(wgpu::CompareFunction::Less),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Component counts of scene mesh vertices: position + normal.
pub const SCENE_VERTEX_COMPONENTS: [u32; 2] = [3, 3];

/// Lighting: draws every entity into direct and ambient HDR attachments
/// with multisampling; the resolve happens when the pass ends.
pub async fn lighting(device: &wgpu::Device) -> anyhow::Result<Pipeline> {
    let scene = VertexLayout::new(&SCENE_VERTEX_COMPONENTS)?;
    let uniforms = UniformLayout::new(&[
        ("view", UniformKind::Mat4),
        ("projection", UniformKind::Mat4),
        ("camera_position", UniformKind::Vec3),
        ("light_direction", UniformKind::Vec3),
        ("roughness", UniformKind::Scalar),
        ("direct_light", UniformKind::Vec3),
        ("reflectivity", UniformKind::Scalar),
        ("ambient_light", UniformKind::Vec3),
    ])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "lighting",
            shader_source: include_str!("lit.wgsl"),
            vertex_buffers: &[
                scene.buffer_layout(),
                instance::model_matrix_layout(),
                instance::color_layout(),
            ],
            targets: &[target(HDR_FORMAT), target(HDR_FORMAT)],
            depth: Some(depth_state()),
            samples: LIT_SAMPLES,
            uniforms: Some(uniforms),
            input_textures: 0,
        },
    )
    .await
}

/// Geometry: re-draws every entity writing view-space position and normal.
/// Position carries w = 1 so later passes can tell geometry from cleared
/// background.
pub async fn geometry(device: &wgpu::Device) -> anyhow::Result<Pipeline> {
    let scene = VertexLayout::new(&SCENE_VERTEX_COMPONENTS)?;
    let uniforms = UniformLayout::new(&[
        ("view", UniformKind::Mat4),
        ("projection", UniformKind::Mat4),
    ])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "geometry",
            shader_source: include_str!("geometry.wgsl"),
            vertex_buffers: &[scene.buffer_layout(), instance::model_matrix_layout()],
            targets: &[target(GEOMETRY_FORMAT), target(GEOMETRY_FORMAT)],
            depth: Some(depth_state()),
            samples: 1,
            uniforms: Some(uniforms),
            input_textures: 0,
        },
    )
    .await
}

/// Occlusion: fullscreen hemisphere sampling against the geometry buffers.
/// Inputs: position, normal, rotation noise.
pub async fn occlusion(device: &wgpu::Device) -> anyhow::Result<Pipeline> {
    let quad = VertexLayout::new(&[2])?;
    let uniforms = UniformLayout::new(&[
        ("projection", UniformKind::Mat4),
        ("kernel", UniformKind::Vec3Array(crate::ssao::KERNEL_SIZE)),
        ("radius", UniformKind::Scalar),
        ("range", UniformKind::Scalar),
        ("boundary", UniformKind::Scalar),
    ])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "occlusion",
            shader_source: include_str!("ssao.wgsl"),
            vertex_buffers: &[quad.buffer_layout()],
            targets: &[target(OCCLUSION_FORMAT)],
            depth: None,
            samples: 1,
            uniforms: Some(uniforms),
            input_textures: 3,
        },
    )
    .await
}

/// Blur: 4x4 box over the raw occlusion factor, washing out the noise
/// pattern. Input: occlusion.
pub async fn blur(device: &wgpu::Device) -> anyhow::Result<Pipeline> {
    let quad = VertexLayout::new(&[2])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "blur",
            shader_source: include_str!("blur.wgsl"),
            vertex_buffers: &[quad.buffer_layout()],
            targets: &[target(OCCLUSION_FORMAT)],
            depth: None,
            samples: 1,
            uniforms: None,
            input_textures: 1,
        },
    )
    .await
}

/// Compose: direct + ambient x occlusion, tone mapped with extended
/// Reinhard. Inputs: direct, ambient, blurred occlusion.
pub async fn compose(device: &wgpu::Device) -> anyhow::Result<Pipeline> {
    let quad = VertexLayout::new(&[2])?;
    let uniforms = UniformLayout::new(&[("white_point", UniformKind::Scalar)])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "compose",
            shader_source: include_str!("compose.wgsl"),
            vertex_buffers: &[quad.buffer_layout()],
            targets: &[target(HDR_FORMAT)],
            depth: None,
            samples: 1,
            uniforms: Some(uniforms),
            input_textures: 3,
        },
    )
    .await
}

/// Effect: dithers the tone-mapped frame into the 8-bit output; the sRGB
/// target format applies the transfer function. Input: composed frame.
pub async fn effect(device: &wgpu::Device) -> anyhow::Result<Pipeline> {
    let quad = VertexLayout::new(&[2])?;
    let uniforms = UniformLayout::new(&[("dither", UniformKind::Scalar)])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "effect",
            shader_source: include_str!("effect.wgsl"),
            vertex_buffers: &[quad.buffer_layout()],
            targets: &[target(OUTPUT_FORMAT)],
            depth: None,
            samples: 1,
            uniforms: Some(uniforms),
            input_textures: 1,
        },
    )
    .await
}

/// Blit: copies the finished frame to the swapchain. Input: output frame.
pub async fn blit(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
) -> anyhow::Result<Pipeline> {
    let quad = VertexLayout::new(&[2])?;
    Pipeline::new(
        device,
        PipelineDesc {
            label: "blit",
            shader_source: include_str!("blit.wgsl"),
            vertex_buffers: &[quad.buffer_layout()],
            targets: &[target(surface_format)],
            depth: None,
            samples: 1,
            uniforms: None,
            input_textures: 1,
        },
    )
    .await
}

/// Two clip-space triangles covering the viewport, shared by every
/// fullscreen pass.
pub fn fullscreen_quad(device: &wgpu::Device) -> anyhow::Result<Mesh> {
    #[rustfmt::skip]
    const VERTICES: [f32; 8] = [
        -1.0, -1.0,
         1.0, -1.0,
         1.0,  1.0,
        -1.0,  1.0,
    ];
    const INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];
    Mesh::new(device, "fullscreen quad", &VERTICES, &INDICES, &[2])
}
