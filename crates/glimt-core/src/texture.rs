//! Texture and node handles shared across the rendering core.
//!
//! The core never decodes or uploads image data itself; source textures are
//! opaque handles owned by the texture-loading collaborator and resolved by
//! the active backend. Render textures are the one exception: their backing
//! storage is created and destroyed through the backend on behalf of the
//! [`pool`](crate::pool).

use std::cell::Cell;

/// Opaque reference to a backend-resident texture.
///
/// `Source` handles are assigned by the texture-loading collaborator (the
/// shared atlas texture is just another source). `RenderTexture` handles
/// reference the backing of a pooled offscreen target by its pool id, so a
/// texturized subtree's output can be drawn like any other texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureHandle {
    Source(u64),
    RenderTexture(u64),
}

/// Identifier of a scene-graph node.
///
/// Nodes live entirely in the scene-graph collaborator; the core only uses
/// ids for shader-owner comparison and for routing forced z-sorts back.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Conventional id of the scene root.
    pub const ROOT: NodeId = NodeId(0);
}

/// A pooled offscreen color target.
///
/// The pool owns its existence; while checked out, the texturizing node is
/// the sole user. Size and id are fixed at creation — only the last-use
/// frame stamp changes over the texture's lifetime.
#[derive(Debug)]
pub struct RenderTexture {
    id: u64,
    logical_w: f32,
    logical_h: f32,
    width: u32,
    height: u32,
    precision: f32,
    last_used_frame: Cell<u64>,
}

impl RenderTexture {
    pub(crate) fn new(
        id: u64,
        logical_w: f32,
        logical_h: f32,
        width: u32,
        height: u32,
        precision: f32,
        frame: u64,
    ) -> Self {
        Self {
            id,
            logical_w,
            logical_h,
            width,
            height,
            precision,
            last_used_frame: Cell::new(frame),
        }
    }

    /// Monotonically increasing pool id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle under which the backing can be sampled as a source.
    pub fn handle(&self) -> TextureHandle {
        TextureHandle::RenderTexture(self.id)
    }

    /// Requested logical size.
    pub fn logical_size(&self) -> (f32, f32) {
        (self.logical_w, self.logical_h)
    }

    /// Backing size in device pixels.
    pub fn device_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Device pixel ratio the device size was derived with.
    pub fn precision(&self) -> f32 {
        self.precision
    }

    /// Contribution to the pool's running pixel total.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Frame counter at last allocation or reuse.
    pub fn last_used_frame(&self) -> u64 {
        self.last_used_frame.get()
    }

    pub(crate) fn touch(&self, frame: u64) {
        self.last_used_frame.set(frame);
    }
}
