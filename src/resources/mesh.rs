use anyhow::bail;
use wgpu::util::DeviceExt;

/// Vertex attributes are numbered from zero; instance attributes start at
/// [`crate::resources::instance::MODEL_MATRIX_LOCATION`], which caps how many
/// per-vertex attributes a mesh may declare.
pub const MAX_VERTEX_ATTRIBUTES: usize = 5;

/// Derived vertex layout: per-attribute component counts plus the strides
/// and offsets summed from them.
///
/// This is plain arithmetic kept separate from the GPU objects so it can be
/// checked without a device.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexLayout {
    components: Vec<u32>,
    attributes: Vec<wgpu::VertexAttribute>,
    stride: u64,
}

impl VertexLayout {
    /// Build a layout from ordered per-attribute component counts
    /// (e.g. `[3, 3]` for position + normal, `[2, 2]` for a screen quad).
    pub fn new(components: &[u32]) -> anyhow::Result<Self> {
        if components.is_empty() || components.len() > MAX_VERTEX_ATTRIBUTES {
            bail!(
                "vertex layout must declare 1..={} attributes, got {}",
                MAX_VERTEX_ATTRIBUTES,
                components.len()
            );
        }
        let mut attributes = Vec::with_capacity(components.len());
        let mut offset = 0u64;
        for (location, &count) in components.iter().enumerate() {
            let format = match count {
                1 => wgpu::VertexFormat::Float32,
                2 => wgpu::VertexFormat::Float32x2,
                3 => wgpu::VertexFormat::Float32x3,
                4 => wgpu::VertexFormat::Float32x4,
                other => bail!("unsupported attribute component count {other}"),
            };
            attributes.push(wgpu::VertexAttribute {
                offset,
                shader_location: location as u32,
                format,
            });
            offset += count as u64 * 4;
        }
        Ok(Self {
            components: components.to_vec(),
            attributes,
            stride: offset,
        })
    }

    /// Stride in floats; the vertex slice length must be a multiple of this.
    pub fn floats_per_vertex(&self) -> usize {
        (self.stride / 4) as usize
    }

    pub fn stride_bytes(&self) -> u64 {
        self.stride
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.attributes.iter().map(|a| a.offset).collect()
    }

    pub fn buffer_layout(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }
    }
}

/// An immutable indexed triangle-list mesh.
///
/// Created once at load time and shared (usually behind an `Arc`) by every
/// entity that draws it. There is no dynamic mesh lifecycle: buffers live
/// until the mesh is dropped at teardown.
pub struct Mesh {
    pub layout: VertexLayout,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl Mesh {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        vertices: &[f32],
        indices: &[u32],
        components: &[u32],
    ) -> anyhow::Result<Self> {
        let layout = VertexLayout::new(components)?;
        if vertices.len() % layout.floats_per_vertex() != 0 {
            bail!(
                "vertex data for '{label}' ({} floats) is not a multiple of the stride ({} floats)",
                vertices.len(),
                layout.floats_per_vertex()
            );
        }
        let vertex_count = (vertices.len() / layout.floats_per_vertex()) as u32;
        if let Some(&index) = indices.iter().find(|&&i| i >= vertex_count) {
            bail!("index {index} out of range for '{label}' ({vertex_count} vertices)");
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} vertex buffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} index buffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            layout,
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bind the mesh buffers and issue one indexed draw covering
    /// `instances` instances.
    pub fn draw_instanced(&self, pass: &mut wgpu::RenderPass<'_>, instances: std::ops::Range<u32>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_and_offsets_sum_component_counts() {
        let layout = VertexLayout::new(&[3, 3, 2]).unwrap();
        assert_eq!(layout.floats_per_vertex(), 8);
        assert_eq!(layout.stride_bytes(), 32);
        assert_eq!(layout.offsets(), vec![0, 12, 24]);

        let buffer_layout = layout.buffer_layout();
        assert_eq!(buffer_layout.array_stride, 32);
        assert_eq!(buffer_layout.attributes.len(), 3);
        assert_eq!(buffer_layout.attributes[2].shader_location, 2);
        assert_eq!(
            buffer_layout.attributes[2].format,
            wgpu::VertexFormat::Float32x2
        );
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(VertexLayout::new(&[]).is_err());
        assert!(VertexLayout::new(&[3, 3, 3, 3, 3, 3]).is_err());
        assert!(VertexLayout::new(&[5]).is_err());
    }
}
