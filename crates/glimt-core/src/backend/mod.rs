//! Graphics backend abstraction.
//!
//! The core emits a backend-agnostic command stream; a backend maps it onto
//! an immediate-mode graphics API exposing textures, framebuffers and
//! shader programs. The executor drives these calls strictly sequentially,
//! once per frame, and performs no semantic decisions of its own.
//!
//! Two implementations ship with the crate: the software rasterizer in
//! [`soft`] and (in `glimt-wgpu`) a GPU backend.

pub mod soft;

#[cfg(test)]
pub(crate) mod recording;

use anyhow::Result;

use crate::batch::{FilterOp, QuadOp};
use crate::quads::QuadBuffer;
use crate::shader::ProgramId;
use crate::texture::{NodeId, RenderTexture};

/// Backend contract for replaying a frame's batch sequence.
pub trait RenderBackend {
    /// Creates backing storage for a pooled render texture.
    fn create_render_texture(&mut self, id: u64, width: u32, height: u32) -> Result<()>;

    /// Destroys the backing of an evicted render texture.
    fn free_render_texture(&mut self, id: u64);

    /// Starts a frame; the quad buffer is final at this point and may be
    /// uploaded wholesale.
    fn begin_frame(&mut self, quads: &QuadBuffer) -> Result<()>;

    /// Makes `target` the active color target; `None` selects the screen
    /// surface.
    fn bind_render_target(&mut self, target: Option<&RenderTexture>);

    /// Clears the active target with a straight-alpha RGBA color.
    fn clear(&mut self, color: [f32; 4]);

    /// Binds a shader program; `owner` supplies its uniform values.
    fn bind_program(&mut self, program: ProgramId, owner: Option<NodeId>);

    /// Draws one batch's quad range onto the active target.
    fn draw_quads(&mut self, op: &QuadOp, quads: &QuadBuffer) -> Result<()>;

    /// Runs one post-processing pass onto the active target.
    fn run_filter(&mut self, op: &FilterOp, quads: &QuadBuffer) -> Result<()>;

    /// Finishes the frame (submit/present).
    fn end_frame(&mut self) -> Result<()>;
}
