//! Shader capability interface.
//!
//! Shaders are modeled as a small polymorphic interface rather than an
//! inheritance chain: the batch builder only needs to know whether a shader
//! can be substituted by the shared default program, whether it must run
//! even for an empty batch, and how many extra per-vertex attribute bytes
//! it packs behind the base vertex region. Everything GPU-specific hides
//! behind the [`ProgramId`] the backend maps to an actual program.

use std::rc::Rc;

use crate::batch::QuadOp;
use crate::quads::QuadBuffer;

/// Backend-side program identifier.
///
/// Two shaders that report the same program can share a bound pipeline;
/// batch-merge decisions additionally require shader *instance* identity
/// (see [`shader_eq`]) because uniform values come from the owner.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub u32);

impl ProgramId {
    /// The shared default quad program (textured, tinted, no effect).
    pub const DEFAULT: ProgramId = ProgramId(0);
}

/// Capability interface consulted by the batch builder and the executor.
pub trait Shader {
    /// Program the backend should bind for batches using this shader.
    fn program(&self) -> ProgramId;

    /// True when the shader currently has no visible effect and the shared
    /// default shader may be bound instead, avoiding a program switch.
    fn use_default(&self) -> bool {
        false
    }

    /// True when a batch with zero quads must still be emitted and executed
    /// (e.g. a shader that leaves a render target in a defined state).
    fn supports_empty_batch(&self) -> bool {
        false
    }

    /// Bytes of extra per-vertex attributes beyond the base layout.
    fn extra_attrib_bytes_per_vertex(&self) -> usize {
        0
    }

    /// Packs extra per-vertex attributes for `op` into the buffer region
    /// starting at `op.extra_attribs_offset`. Called during the second
    /// sizing pass of `finish()`, once offsets are final.
    fn write_extra_attribs(&self, op: &QuadOp, quads: &mut QuadBuffer) {
        let _ = (op, quads);
    }
}

/// The shared no-effect shader every context owns one instance of.
#[derive(Debug, Default)]
pub struct DefaultShader;

impl Shader for DefaultShader {
    fn program(&self) -> ProgramId {
        ProgramId::DEFAULT
    }

    fn use_default(&self) -> bool {
        true
    }
}

/// Shader identity comparison.
///
/// Batching compares shader *instances*, not programs: two instances of the
/// same program may pull different uniform values from their owners.
pub fn shader_eq(a: &Rc<dyn Shader>, b: &Rc<dyn Shader>) -> bool {
    Rc::ptr_eq(a, b)
}
