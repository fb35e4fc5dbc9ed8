//! Glimt rendering core.
//!
//! Backend-agnostic heart of a retained scene-graph UI engine: per-frame
//! quad batching, render-to-texture pooling, filter passes and frame
//! orchestration. The scene graph itself and texture loading live in
//! collaborating crates behind the [`scene::SceneDriver`] seam; GPU output
//! lives behind [`backend::RenderBackend`] (see `glimt-wgpu`).

pub mod backend;
pub mod batch;
pub mod config;
pub mod context;
pub mod exec;
pub mod filter;
pub mod pool;
pub mod quads;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod texturizer;

pub mod logging;
pub mod time;
