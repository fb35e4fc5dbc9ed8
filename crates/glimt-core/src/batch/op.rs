use std::rc::Rc;

use crate::filter::Filter;
use crate::quads::BYTES_PER_QUAD;
use crate::shader::Shader;
use crate::texture::{NodeId, RenderTexture};

/// One draw batch: a contiguous run of quads sharing GPU state.
///
/// A batch is worth emitting when it has quads, carries a clear
/// instruction, or its shader demands execution even when empty.
pub struct QuadOp {
    /// Shader instance bound for the whole run.
    pub shader: Rc<dyn Shader>,
    /// Node supplying the shader's uniform values.
    pub shader_owner: Option<NodeId>,
    /// Target; `None` draws to the screen surface.
    pub render_texture: Option<Rc<RenderTexture>>,
    /// Clear the target before drawing this batch's quads.
    pub clear_render_texture: bool,
    /// Index of the batch's first quad in the quad buffer.
    pub first_quad: usize,
    /// Number of quads in the run.
    pub quad_count: usize,
    /// Byte offset of this batch's extra-attribute run; meaningful only
    /// after the `finish()` sizing pass.
    pub extra_attribs_offset: usize,
}

impl QuadOp {
    /// Byte offset of the batch's vertex range (head slot skipped).
    pub fn byte_offset(&self) -> usize {
        self.first_quad * BYTES_PER_QUAD + BYTES_PER_QUAD
    }

    /// Byte length of the batch's base vertex range.
    pub fn byte_len(&self) -> usize {
        self.quad_count * BYTES_PER_QUAD
    }
}

/// A post-processing pass synchronized to a point in the batch sequence.
///
/// The pass runs once exactly `checkpoint` batches have executed: strictly
/// after every batch closed before it was queued, strictly before any batch
/// opened afterwards.
pub struct FilterOp {
    pub filter: Rc<dyn Filter>,
    /// Node the pass belongs to (supplies filter uniform values).
    pub owner: NodeId,
    /// Input texture.
    pub source: Rc<RenderTexture>,
    /// Output target; `None` writes to the screen surface.
    pub render_texture: Option<Rc<RenderTexture>>,
    /// Number of batches that must have executed before this pass runs.
    pub checkpoint: usize,
}
