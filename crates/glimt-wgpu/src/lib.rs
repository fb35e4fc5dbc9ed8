//! wgpu backend for the Glimt rendering core.
//!
//! Maps the core's backend-agnostic command stream onto wgpu: one command
//! encoder per frame, one render pass per batch, pooled render textures as
//! offscreen color attachments. Headless by design; the embedding
//! application owns presentation.

mod backend;
mod init;

pub use backend::WgpuBackend;
pub use init::{Wgpu, WgpuInit};
