//! Backend test double recording the exact call sequence.

use anyhow::Result;

use crate::backend::RenderBackend;
use crate::batch::{FilterOp, QuadOp};
use crate::quads::QuadBuffer;
use crate::shader::ProgramId;
use crate::texture::{NodeId, RenderTexture};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    BeginFrame,
    BindTarget(Option<u64>),
    Clear([f32; 4]),
    BindProgram(ProgramId, Option<NodeId>),
    Draw {
        first_quad: usize,
        quad_count: usize,
    },
    Filter {
        program: ProgramId,
        source: u64,
        target: Option<u64>,
    },
    EndFrame,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub created: Vec<(u64, u32, u32)>,
    pub freed: Vec<u64>,
    pub events: Vec<Event>,
}

impl RenderBackend for RecordingBackend {
    fn create_render_texture(&mut self, id: u64, width: u32, height: u32) -> Result<()> {
        self.created.push((id, width, height));
        Ok(())
    }

    fn free_render_texture(&mut self, id: u64) {
        self.freed.push(id);
    }

    fn begin_frame(&mut self, _quads: &QuadBuffer) -> Result<()> {
        self.events.push(Event::BeginFrame);
        Ok(())
    }

    fn bind_render_target(&mut self, target: Option<&RenderTexture>) {
        self.events.push(Event::BindTarget(target.map(|t| t.id())));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.events.push(Event::Clear(color));
    }

    fn bind_program(&mut self, program: ProgramId, owner: Option<NodeId>) {
        self.events.push(Event::BindProgram(program, owner));
    }

    fn draw_quads(&mut self, op: &QuadOp, _quads: &QuadBuffer) -> Result<()> {
        self.events.push(Event::Draw {
            first_quad: op.first_quad,
            quad_count: op.quad_count,
        });
        Ok(())
    }

    fn run_filter(&mut self, op: &FilterOp, _quads: &QuadBuffer) -> Result<()> {
        self.events.push(Event::Filter {
            program: op.filter.program(),
            source: op.source.id(),
            target: op.render_texture.as_ref().map(|t| t.id()),
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.events.push(Event::EndFrame);
        Ok(())
    }
}
