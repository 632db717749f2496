//! shade-ngin
//!
//! An offscreen, deferred scene-rendering core. Application code submits
//! drawable entities (single meshes or instanced batches) into per-frame
//! queues; the renderer turns them into a composited frame through a fixed
//! seven-stage pipeline: multisampled lighting, resolve, geometry, SSAO,
//! blur, compose (tone mapping) and a final effect pass. The finished frame
//! lives in an offscreen buffer that can be blitted to a window surface,
//! read back as raw pixels, or sampled by a later compositing stage.
//!
//! High-level modules
//! - `camera`: smoothed orbit camera with spherical state and ray unprojection
//! - `context`: GPU context owning device/queue, windowed or headless
//! - `submission`: per-frame draw-entity queues filled by application code
//! - `pipelines`: render pipeline wrapper with a cached uniform block
//! - `resources`: GPU resource wrappers (meshes, textures, framebuffers,
//!   instance scratch buffers)
//! - `scene`: the seven-stage scene renderer and its settings record
//! - `ssao`: hemisphere kernel and rotation-noise generation
//!

pub mod camera;
pub mod context;
pub mod pipelines;
pub mod resources;
pub mod scene;
pub mod ssao;
pub mod submission;

// Re-exports commonly used types for convenience in downstream code.
pub use winit::dpi::PhysicalPosition;
pub use cgmath::*;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;
pub use wgpu::*;
