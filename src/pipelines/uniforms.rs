//! Uniform blocks with named-field access.
//!
//! Shaders declare their parameters as one uniform struct per pipeline. On
//! the CPU side the same struct is described as an ordered field list; byte
//! offsets follow WGSL uniform layout rules and are computed once. Callers
//! set fields by name, and the name lookup is memoized so the string search
//! happens once per field, not once per frame.
//!
//! A set against an unknown name or with the wrong value shape logs a
//! warning and leaves the block untouched. Field names come from code, not
//! user input, so these are programming errors worth surfacing loudly but
//! not worth aborting a frame over.

use std::collections::HashMap;

use cgmath::Matrix4;

/// Shape of one uniform field. The set is closed: these are the only shapes
/// the render stages need, and a closed enum keeps the layout arithmetic
/// total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Scalar,
    Vec2,
    Vec3,
    /// Fixed-length array of vec3s, padded to vec4 stride per WGSL rules.
    Vec3Array(usize),
    Vec4,
    Mat4,
}

impl UniformKind {
    /// WGSL uniform-address-space alignment.
    fn align(self) -> usize {
        match self {
            UniformKind::Scalar => 4,
            UniformKind::Vec2 => 8,
            _ => 16,
        }
    }

    /// Bytes occupied, excluding trailing padding the next field may reuse.
    fn size(self) -> usize {
        match self {
            UniformKind::Scalar => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec3Array(n) => 16 * n,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
        }
    }
}

/// A value for one uniform field.
#[derive(Clone, Debug)]
pub enum UniformValue {
    Scalar(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec3Array(Vec<[f32; 3]>),
    Vec4([f32; 4]),
    Mat4(Matrix4<f32>),
}

impl UniformValue {
    fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Scalar(_) => UniformKind::Scalar,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec3Array(v) => UniformKind::Vec3Array(v.len()),
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }
}

#[derive(Clone, Debug)]
struct Field {
    name: &'static str,
    kind: UniformKind,
    offset: usize,
}

/// Ordered field list of one shader-side uniform struct, with offsets
/// resolved per WGSL uniform layout.
#[derive(Clone, Debug)]
pub struct UniformLayout {
    fields: Vec<Field>,
    size: usize,
}

impl UniformLayout {
    pub fn new(fields: &[(&'static str, UniformKind)]) -> anyhow::Result<Self> {
        if fields.is_empty() {
            anyhow::bail!("uniform layout must declare at least one field");
        }
        let mut resolved = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for &(name, kind) in fields {
            if resolved.iter().any(|f: &Field| f.name == name) {
                anyhow::bail!("duplicate uniform field '{name}'");
            }
            offset = offset.next_multiple_of(kind.align());
            resolved.push(Field { name, kind, offset });
            offset += kind.size();
        }
        Ok(Self {
            fields: resolved,
            // Uniform buffer bindings are sized in 16-byte units.
            size: offset.next_multiple_of(16),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[cfg(test)]
    fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.offset)
    }
}

/// CPU shadow of one uniform struct: the layout, the current bytes, and the
/// memoized name lookup. Kept free of GPU handles so the resolution and
/// packing logic is testable on its own.
pub struct UniformBlock {
    layout: UniformLayout,
    shadow: Vec<u8>,
    cache: HashMap<String, Option<usize>>,
    resolutions: usize,
    dirty: bool,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let shadow = vec![0u8; layout.size()];
        Self {
            layout,
            shadow,
            cache: HashMap::new(),
            resolutions: 0,
            dirty: true,
        }
    }

    /// Set a field by name. Unknown names and shape mismatches warn and
    /// leave the block unchanged; both results are memoized.
    pub fn set(&mut self, name: &str, value: UniformValue) {
        let index = match self.cache.get(name) {
            Some(&index) => index,
            None => {
                self.resolutions += 1;
                let index = self.layout.fields.iter().position(|f| f.name == name);
                if index.is_none() {
                    log::warn!("uniform field '{name}' does not exist in this block");
                }
                self.cache.insert(name.to_owned(), index);
                index
            }
        };
        let Some(index) = index else {
            return;
        };

        let field = &self.layout.fields[index];
        if value.kind() != field.kind {
            log::warn!(
                "uniform field '{name}' is {:?}, ignoring {:?} value",
                field.kind,
                value.kind()
            );
            return;
        }

        let offset = field.offset;
        match value {
            UniformValue::Scalar(v) => self.write(offset, &[v]),
            UniformValue::Vec2(v) => self.write(offset, &v),
            UniformValue::Vec3(v) => self.write(offset, &v),
            UniformValue::Vec4(v) => self.write(offset, &v),
            UniformValue::Mat4(m) => {
                let cols: [[f32; 4]; 4] = m.into();
                for (i, col) in cols.iter().enumerate() {
                    self.write(offset + i * 16, col);
                }
            }
            UniformValue::Vec3Array(v) => {
                for (i, elem) in v.iter().enumerate() {
                    self.write(offset + i * 16, elem);
                }
            }
        }
        self.dirty = true;
    }

    fn write(&mut self, offset: usize, values: &[f32]) {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        self.shadow[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.shadow
    }

    /// Clear and report the dirty flag; true means the bytes changed since
    /// the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Number of name lookups that actually scanned the layout. Stays flat
    /// once every field name has been seen.
    pub fn resolutions(&self) -> usize {
        self.resolutions
    }
}

/// A [`UniformBlock`] paired with its GPU buffer.
pub struct UniformStore {
    block: UniformBlock,
    buffer: wgpu::Buffer,
}

impl UniformStore {
    pub fn new(device: &wgpu::Device, label: &str, layout: UniformLayout) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            block: UniformBlock::new(layout),
            buffer,
        }
    }

    pub fn set(&mut self, name: &str, value: UniformValue) {
        self.block.set(name, value);
    }

    /// Push the shadow bytes to the GPU if any field changed.
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        if self.block.take_dirty() {
            queue.write_buffer(&self.buffer, 0, self.block.bytes());
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn lit_layout() -> UniformLayout {
        UniformLayout::new(&[
            ("view", UniformKind::Mat4),
            ("projection", UniformKind::Mat4),
            ("light_direction", UniformKind::Vec3),
            ("roughness", UniformKind::Scalar),
            ("direct_light", UniformKind::Vec3),
            ("reflectivity", UniformKind::Scalar),
            ("ambient_light", UniformKind::Vec3),
        ])
        .unwrap()
    }

    #[test]
    fn offsets_follow_wgsl_uniform_rules() {
        let layout = lit_layout();
        assert_eq!(layout.offset_of("view"), Some(0));
        assert_eq!(layout.offset_of("projection"), Some(64));
        assert_eq!(layout.offset_of("light_direction"), Some(128));
        // A scalar fits in the vec3's trailing pad.
        assert_eq!(layout.offset_of("roughness"), Some(140));
        assert_eq!(layout.offset_of("direct_light"), Some(144));
        assert_eq!(layout.offset_of("reflectivity"), Some(156));
        assert_eq!(layout.offset_of("ambient_light"), Some(160));
        assert_eq!(layout.size(), 176);
    }

    #[test]
    fn arrays_use_vec4_stride() {
        let layout = UniformLayout::new(&[
            ("scale", UniformKind::Scalar),
            ("kernel", UniformKind::Vec3Array(16)),
            ("tail", UniformKind::Vec2),
        ])
        .unwrap();
        assert_eq!(layout.offset_of("kernel"), Some(16));
        assert_eq!(layout.offset_of("tail"), Some(16 + 256));
        assert_eq!(layout.size(), 288);
    }

    #[test]
    fn duplicate_and_empty_layouts_are_rejected() {
        assert!(UniformLayout::new(&[]).is_err());
        assert!(
            UniformLayout::new(&[("a", UniformKind::Scalar), ("a", UniformKind::Vec2)]).is_err()
        );
    }

    #[test]
    fn name_lookup_is_memoized() {
        let mut block = UniformBlock::new(lit_layout());
        for _ in 0..10 {
            block.set("roughness", UniformValue::Scalar(0.5));
            block.set("view", UniformValue::Mat4(Matrix4::identity()));
        }
        assert_eq!(block.resolutions(), 2);

        // Misses are memoized too.
        for _ in 0..10 {
            block.set("no_such_field", UniformValue::Scalar(1.0));
        }
        assert_eq!(block.resolutions(), 3);
    }

    #[test]
    fn mismatched_shape_leaves_bytes_untouched() {
        let mut block = UniformBlock::new(lit_layout());
        block.set("roughness", UniformValue::Scalar(0.25));
        block.take_dirty();
        let before = block.bytes().to_vec();

        block.set("roughness", UniformValue::Vec3([1.0, 2.0, 3.0]));
        assert_eq!(block.bytes(), &before[..]);
        assert!(!block.take_dirty());
    }

    #[test]
    fn values_land_at_their_field_offsets() {
        let mut block = UniformBlock::new(lit_layout());
        block.set("direct_light", UniformValue::Vec3([0.1, 0.2, 0.3]));
        block.set("reflectivity", UniformValue::Scalar(0.9));

        let floats: &[f32] = bytemuck::cast_slice(block.bytes());
        assert_eq!(&floats[144 / 4..144 / 4 + 3], &[0.1, 0.2, 0.3]);
        assert_eq!(floats[156 / 4], 0.9);
        assert!(block.take_dirty());
    }
}
