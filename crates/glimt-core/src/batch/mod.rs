//! Batch construction.
//!
//! Responsibilities:
//! - group a paint-ordered stream of quad requests into the fewest batches
//!   that preserve draw order and render-target dependencies
//! - thread post-processing (filter) passes through the batch sequence via
//!   batch-count checkpoints
//! - size extra per-vertex shader attribute runs once the full frame is
//!   known

mod op;
mod state;

pub use op::{FilterOp, QuadOp};
pub use state::RenderState;
