//! Per-instance scratch buffers.
//!
//! The renderer owns exactly two of these: one for model matrices (16 floats
//! per instance) and one for colors (4 floats). They are shared, mutable
//! scratch storage: every frame the full set of submitted instance data is
//! rewritten into them at disjoint offsets, and each batch's draw call reads
//! its own slice. Nothing outside the current frame may hold on to their
//! contents.

use std::mem;

use cgmath::Matrix4;

/// First shader location used by instance attributes; mesh vertex
/// attributes occupy the locations below it.
pub const MODEL_MATRIX_LOCATION: u32 = 5;
/// Shader location of the per-instance color.
pub const COLOR_LOCATION: u32 = 9;

pub const FLOATS_PER_MODEL: usize = 16;
pub const FLOATS_PER_COLOR: usize = 4;

/// A growable GPU array sized in floats per instance.
pub struct InstanceBuffer {
    buffer: wgpu::Buffer,
    floats_per_instance: usize,
    capacity_instances: usize,
    label: &'static str,
}

impl InstanceBuffer {
    pub fn new(device: &wgpu::Device, floats_per_instance: usize, label: &'static str) -> Self {
        let capacity_instances = 256;
        Self {
            buffer: Self::allocate(device, floats_per_instance, capacity_instances, label),
            floats_per_instance,
            capacity_instances,
            label,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        floats_per_instance: usize,
        capacity_instances: usize,
        label: &'static str,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity_instances * floats_per_instance * mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Overwrite the buffer with this frame's instance data, growing it
    /// first if the frame needs more room. Must be called before any pass
    /// of the frame is encoded; the queued write lands before submission.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[f32]) {
        debug_assert_eq!(data.len() % self.floats_per_instance, 0);
        let needed = data.len() / self.floats_per_instance;
        if needed > self.capacity_instances {
            let capacity = needed.next_power_of_two();
            log::debug!(
                "growing instance buffer '{}' from {} to {capacity} instances",
                self.label,
                self.capacity_instances
            );
            self.buffer = Self::allocate(device, self.floats_per_instance, capacity, self.label);
            self.capacity_instances = capacity;
        }
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
    }

    /// Byte range covering `count` instances starting at `first`.
    pub fn slice(&self, first: usize, count: usize) -> wgpu::BufferSlice<'_> {
        let stride = (self.floats_per_instance * mem::size_of::<f32>()) as u64;
        let start = first as u64 * stride;
        let end = (first + count) as u64 * stride;
        self.buffer.slice(start..end)
    }

    pub fn capacity_instances(&self) -> usize {
        self.capacity_instances
    }
}

/// Flatten a model matrix into the 16-float column-major form the instance
/// buffer stores.
pub fn flatten_matrix(m: &Matrix4<f32>) -> [f32; 16] {
    let cols: [[f32; 4]; 4] = (*m).into();
    let mut out = [0.0f32; 16];
    for (i, col) in cols.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(col);
    }
    out
}

const MODEL_MATRIX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = [
    // A mat4 is wider than one attribute slot, so it is split across four
    // vec4 slots that all advance once per instance.
    wgpu::VertexAttribute {
        offset: 0,
        shader_location: MODEL_MATRIX_LOCATION,
        format: wgpu::VertexFormat::Float32x4,
    },
    wgpu::VertexAttribute {
        offset: 16,
        shader_location: MODEL_MATRIX_LOCATION + 1,
        format: wgpu::VertexFormat::Float32x4,
    },
    wgpu::VertexAttribute {
        offset: 32,
        shader_location: MODEL_MATRIX_LOCATION + 2,
        format: wgpu::VertexFormat::Float32x4,
    },
    wgpu::VertexAttribute {
        offset: 48,
        shader_location: MODEL_MATRIX_LOCATION + 3,
        format: wgpu::VertexFormat::Float32x4,
    },
];

const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    offset: 0,
    shader_location: COLOR_LOCATION,
    format: wgpu::VertexFormat::Float32x4,
}];

pub fn model_matrix_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: (FLOATS_PER_MODEL * mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &MODEL_MATRIX_ATTRIBUTES,
    }
}

pub fn color_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: (FLOATS_PER_COLOR * mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &COLOR_ATTRIBUTES,
    }
}
