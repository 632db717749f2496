//! Per-frame draw-entity queues.
//!
//! Application and UI code push entities here between frames; the scene
//! renderer drains the whole submission exactly once per frame, in push
//! order, and leaves it empty. Making the queues an explicit object (rather
//! than free-standing globals) is what enforces that contract structurally.

use std::sync::Arc;

use anyhow::bail;
use cgmath::Matrix4;

use crate::resources::mesh::Mesh;

/// A single opaque mesh with one transform and one color.
///
/// Generic over the mesh handle so the queue logic stays testable without a
/// GPU; in the renderer `M` is always [`Arc<Mesh>`].
#[derive(Clone)]
pub struct StaticEntity<M> {
    pub mesh: M,
    pub model: Matrix4<f32>,
    pub color: [f32; 4],
}

/// One mesh drawn many times in a single instanced call.
///
/// `models` and `colors` run parallel; the queue rejects mismatched lengths
/// at push time so a half-formed batch can never reach the GPU.
#[derive(Clone)]
pub struct InstancedBatch<M> {
    pub mesh: M,
    pub models: Vec<Matrix4<f32>>,
    pub colors: Vec<[f32; 4]>,
}

impl<M> InstancedBatch<M> {
    pub fn count(&self) -> usize {
        self.models.len()
    }
}

/// Append-only entity queues for one frame.
pub struct FrameSubmission<M = Arc<Mesh>> {
    statics: Vec<StaticEntity<M>>,
    batches: Vec<InstancedBatch<M>>,
}

impl<M> Default for FrameSubmission<M> {
    fn default() -> Self {
        Self {
            statics: Vec::new(),
            batches: Vec::new(),
        }
    }
}

impl<M> FrameSubmission<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a single entity.
    ///
    /// `model` may rotate, translate and uniformly scale. Normals are
    /// transformed by the model matrix directly, so a non-uniform scale
    /// skews lighting and the occlusion basis.
    pub fn push_static(&mut self, mesh: M, model: Matrix4<f32>, color: [f32; 4]) {
        self.statics.push(StaticEntity { mesh, model, color });
    }

    /// Queue an instanced batch. Transforms follow the same uniform-scale
    /// contract as [`FrameSubmission::push_static`].
    pub fn push_batch(
        &mut self,
        mesh: M,
        models: Vec<Matrix4<f32>>,
        colors: Vec<[f32; 4]>,
    ) -> anyhow::Result<()> {
        if models.len() != colors.len() {
            bail!(
                "instanced batch has {} matrices but {} colors",
                models.len(),
                colors.len()
            );
        }
        self.batches.push(InstancedBatch {
            mesh,
            models,
            colors,
        });
        Ok(())
    }

    /// Take every queued entity, leaving the submission empty. Called once
    /// per frame by the renderer.
    pub(crate) fn drain(&mut self) -> (Vec<StaticEntity<M>>, Vec<InstancedBatch<M>>) {
        (
            std::mem::take(&mut self.statics),
            std::mem::take(&mut self.batches),
        )
    }

    pub fn static_count(&self) -> usize {
        self.statics.len()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    #[test]
    fn drain_preserves_order_and_empties_queues() {
        let mut frame = FrameSubmission::<u32>::new();
        for i in 0..4 {
            frame.push_static(i, Matrix4::identity(), [i as f32, 0.0, 0.0, 1.0]);
        }
        frame
            .push_batch(9, vec![Matrix4::identity(); 3], vec![[1.0; 4]; 3])
            .unwrap();

        assert_eq!(frame.static_count(), 4);
        assert_eq!(frame.batch_count(), 1);

        let (statics, batches) = frame.drain();
        for (i, entity) in statics.iter().enumerate() {
            assert_eq!(entity.mesh, i as u32);
            assert_eq!(entity.color[0], i as f32);
        }
        assert_eq!(batches[0].count(), 3);
        assert!(frame.is_empty());

        let (statics, batches) = frame.drain();
        assert!(statics.is_empty() && batches.is_empty());
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let mut frame = FrameSubmission::<u32>::new();
        let result = frame.push_batch(7, vec![Matrix4::identity(); 2], vec![[1.0; 4]; 3]);
        assert!(result.is_err());
        assert!(frame.is_empty());
    }
}
