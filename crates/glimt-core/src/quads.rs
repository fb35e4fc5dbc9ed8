//! Per-frame quad vertex scratch buffer.
//!
//! One large contiguous region holds the interleaved vertex attributes of
//! every quad drawn in a frame. The buffer is a pure data container: reset
//! is O(1), offsets are stable for the duration of a frame, and capacity is
//! fixed at construction.
//!
//! Layout: 16 bytes per vertex (position, packed texcoord, packed color),
//! 64 bytes per quad. The first quad slot is reserved for a constant
//! identity quad used by full-target passes, so quad `n` starts at byte
//! `n * 64 + 64`. Extra per-shader attributes are packed after the base
//! region, one contiguous run per batch, sized during the `finish()` pass.

use bytemuck::{Pod, Zeroable};

use crate::texture::{NodeId, TextureHandle};

/// Size of one interleaved vertex.
pub const BYTES_PER_VERTEX: usize = 16;

/// Size of one quad's four-vertex attribute block.
pub const BYTES_PER_QUAD: usize = 4 * BYTES_PER_VERTEX;

/// One interleaved vertex.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Position in device pixels of the active render target.
    pub pos: [f32; 2],
    /// Texcoord, two unorm16 packed little-endian (u low, v high).
    pub uv: u32,
    /// Premultiplied RGBA8 color, red in the low byte.
    pub color: u32,
}

/// Packs a normalized texcoord pair into the vertex format.
pub fn pack_uv(u: f32, v: f32) -> u32 {
    let u = (u.clamp(0.0, 1.0) * 65535.0).round() as u32;
    let v = (v.clamp(0.0, 1.0) * 65535.0).round() as u32;
    (v << 16) | u
}

/// Unpacks a texcoord produced by [`pack_uv`].
pub fn unpack_uv(uv: u32) -> (f32, f32) {
    (
        (uv & 0xffff) as f32 / 65535.0,
        (uv >> 16) as f32 / 65535.0,
    )
}

/// One externally supplied draw request: a single visible node's quad.
///
/// Geometry arrives already transformed and clipped by the scene-graph
/// update pass; the core never reorders or re-projects it.
#[derive(Debug, Clone)]
pub struct QuadRequest {
    /// Node the quad belongs to.
    pub owner: NodeId,
    /// Source texture; `None` draws a solid (textureless) quad.
    pub texture: Option<TextureHandle>,
    /// True when the node's image is packed into the shared texture atlas;
    /// the atlas texture then replaces `texture` during resolution.
    pub in_atlas: bool,
    /// Corner positions in paint order (not necessarily axis-aligned).
    pub coords: [[f32; 2]; 4],
    /// Normalized texcoords per corner.
    pub uvs: [[f32; 2]; 4],
    /// Premultiplied RGBA8 color per corner (alpha/tint already applied).
    pub colors: [u32; 4],
}

/// Fixed-capacity vertex scratch region plus per-quad bookkeeping.
pub struct QuadBuffer {
    data: Vec<u8>,
    quad_count: usize,
    data_len: usize,
    textures: Vec<Option<TextureHandle>>,
    owners: Vec<NodeId>,
}

impl QuadBuffer {
    /// Creates a buffer with a fixed byte capacity.
    ///
    /// Capacity must cover the reserved head slot plus every quad of the
    /// busiest expected frame and any extra shader attributes; exceeding it
    /// fails fast in [`append`](Self::append) rather than corrupting
    /// memory.
    pub fn new(capacity_bytes: usize) -> Self {
        let capacity = capacity_bytes.max(2 * BYTES_PER_QUAD);
        let mut buffer = Self {
            data: vec![0; capacity],
            quad_count: 0,
            data_len: BYTES_PER_QUAD,
            textures: Vec::new(),
            owners: Vec::new(),
        };
        buffer.write_identity_quad();
        buffer
    }

    /// Logically empties the buffer. Storage is retained, not reallocated.
    pub fn reset(&mut self) {
        self.quad_count = 0;
        self.data_len = BYTES_PER_QUAD;
        self.textures.clear();
        self.owners.clear();
    }

    /// Number of quads appended this frame (excluding the head slot).
    pub fn quad_count(&self) -> usize {
        self.quad_count
    }

    /// Total bytes in use, including extra attribute runs once sized.
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub(crate) fn set_data_len(&mut self, len: usize) {
        assert!(
            len <= self.data.len(),
            "quad buffer capacity exceeded by extra shader attributes \
             ({len} > {} bytes)",
            self.data.len(),
        );
        self.data_len = len;
    }

    /// Reserves the next quad slot and returns the byte offset of its
    /// four-vertex block.
    ///
    /// # Panics
    /// Panics when the fixed capacity is exhausted. Overflow is a sizing
    /// error, not a recoverable condition.
    pub fn append(&mut self, texture: Option<TextureHandle>, owner: NodeId) -> usize {
        let offset = self.quad_count * BYTES_PER_QUAD + BYTES_PER_QUAD;
        assert!(
            offset + BYTES_PER_QUAD <= self.data.len(),
            "quad buffer capacity exceeded at quad {} ({} bytes)",
            self.quad_count,
            self.data.len(),
        );

        self.textures.push(texture);
        self.owners.push(owner);
        self.quad_count += 1;
        self.data_len = offset + BYTES_PER_QUAD;
        offset
    }

    /// Writes the four vertices of the quad starting at `byte_offset`.
    pub fn write_quad(&mut self, byte_offset: usize, vertices: &[QuadVertex; 4]) {
        let bytes = bytemuck::cast_slice(vertices);
        self.data[byte_offset..byte_offset + BYTES_PER_QUAD].copy_from_slice(bytes);
    }

    /// Mutable access to an extra-attribute region sized by `finish()`.
    pub fn extra_region_mut(&mut self, byte_offset: usize, len: usize) -> &mut [u8] {
        &mut self.data[byte_offset..byte_offset + len]
    }

    /// All bytes in use this frame, head slot included.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.data_len]
    }

    /// Vertices of the quad at `index` (0-based, head slot excluded).
    pub fn quad_vertices(&self, index: usize) -> [QuadVertex; 4] {
        let offset = index * BYTES_PER_QUAD + BYTES_PER_QUAD;
        let mut vertices = [QuadVertex::zeroed(); 4];
        bytemuck::cast_slice_mut::<QuadVertex, u8>(&mut vertices)
            .copy_from_slice(&self.data[offset..offset + BYTES_PER_QUAD]);
        vertices
    }

    /// Resolved texture of the quad at `index`.
    pub fn texture_for(&self, index: usize) -> Option<TextureHandle> {
        self.textures[index]
    }

    /// Owner node of the quad at `index`.
    pub fn owner_for(&self, index: usize) -> NodeId {
        self.owners[index]
    }

    // Head slot: a unit quad with full texcoords and white color, so a
    // full-target pass can always source well-defined vertex data.
    fn write_identity_quad(&mut self) {
        let vertices = [
            QuadVertex {
                pos: [0.0, 0.0],
                uv: pack_uv(0.0, 0.0),
                color: 0xffff_ffff,
            },
            QuadVertex {
                pos: [1.0, 0.0],
                uv: pack_uv(1.0, 0.0),
                color: 0xffff_ffff,
            },
            QuadVertex {
                pos: [1.0, 1.0],
                uv: pack_uv(1.0, 1.0),
                color: 0xffff_ffff,
            },
            QuadVertex {
                pos: [0.0, 1.0],
                uv: pack_uv(0.0, 1.0),
                color: 0xffff_ffff,
            },
        ];
        let bytes = bytemuck::cast_slice(&vertices);
        self.data[0..BYTES_PER_QUAD].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_skips_reserved_head_slot() {
        let mut quads = QuadBuffer::new(1024);
        assert_eq!(quads.append(None, NodeId(1)), BYTES_PER_QUAD);
        assert_eq!(quads.append(None, NodeId(2)), 2 * BYTES_PER_QUAD);
        assert_eq!(quads.quad_count(), 2);
    }

    #[test]
    fn reset_is_logical_only() {
        let mut quads = QuadBuffer::new(1024);
        quads.append(Some(TextureHandle::Source(7)), NodeId(1));
        quads.reset();
        assert_eq!(quads.quad_count(), 0);
        assert_eq!(quads.data_len(), BYTES_PER_QUAD);
        // Offsets restart right after the head slot.
        assert_eq!(quads.append(None, NodeId(2)), BYTES_PER_QUAD);
    }

    #[test]
    fn write_and_read_round_trip() {
        let mut quads = QuadBuffer::new(1024);
        let offset = quads.append(None, NodeId(1));
        let vertices = [
            QuadVertex {
                pos: [1.0, 2.0],
                uv: pack_uv(0.0, 0.0),
                color: 0xff00_00ff,
            },
            QuadVertex {
                pos: [3.0, 2.0],
                uv: pack_uv(1.0, 0.0),
                color: 0xff00_00ff,
            },
            QuadVertex {
                pos: [3.0, 4.0],
                uv: pack_uv(1.0, 1.0),
                color: 0xff00_00ff,
            },
            QuadVertex {
                pos: [1.0, 4.0],
                uv: pack_uv(0.0, 1.0),
                color: 0xff00_00ff,
            },
        ];
        quads.write_quad(offset, &vertices);
        assert_eq!(quads.quad_vertices(0), vertices);
    }

    #[test]
    #[should_panic(expected = "quad buffer capacity exceeded")]
    fn overflow_fails_fast() {
        // Room for the head slot plus exactly one quad.
        let mut quads = QuadBuffer::new(2 * BYTES_PER_QUAD);
        quads.append(None, NodeId(1));
        quads.append(None, NodeId(2));
    }

    #[test]
    fn uv_packing_round_trips_extremes() {
        let (u, v) = unpack_uv(pack_uv(0.0, 1.0));
        assert_eq!(u, 0.0);
        assert_eq!(v, 1.0);
    }
}
