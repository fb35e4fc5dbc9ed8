//! Frame executor.
//!
//! Replays a finalized batch sequence onto a [`RenderBackend`] in strict
//! order. The executor makes no batching decisions of its own; it only
//! elides backend calls that would be redundant (re-binding the program or
//! target already bound) and interleaves queued filter passes at their
//! recorded checkpoints.

use anyhow::Result;

use crate::backend::RenderBackend;
use crate::batch::{FilterOp, QuadOp, RenderState};
use crate::shader::ProgramId;
use crate::texture::NodeId;

/// Replays finalized frames onto a backend.
pub struct Executor {
    /// Screen clear color at frame start; `None` preserves the previous
    /// frame's screen contents.
    clear_color: Option<[f32; 4]>,
}

/// Redundancy tracking for one frame's replay.
struct BindState {
    program: Option<(ProgramId, Option<NodeId>)>,
    /// Bound target as a render-texture id; `Some(None)` is the screen,
    /// `None` means nothing bound yet.
    target: Option<Option<u64>>,
}

impl Executor {
    pub fn new(clear_color: Option<[f32; 4]>) -> Self {
        Self { clear_color }
    }

    /// Replays one finalized frame.
    ///
    /// A filter pass with checkpoint `n` runs after exactly `n` batches:
    /// strictly after every batch closed before it was queued, strictly
    /// before any batch opened afterwards. Passes queued at the same
    /// checkpoint keep their queue order.
    pub fn execute(&self, state: &RenderState, backend: &mut dyn RenderBackend) -> Result<()> {
        let quads = state.quads();
        backend.begin_frame(quads)?;

        let mut bind = BindState {
            program: None,
            target: None,
        };

        if let Some(color) = self.clear_color {
            self.bind_target(&mut bind, backend, None);
            backend.clear(color);
        }

        let mut filters = state.filter_ops().iter().peekable();

        for (index, op) in state.quad_ops().iter().enumerate() {
            while let Some(filter) = filters.next_if(|f| f.checkpoint <= index) {
                self.run_filter(&mut bind, backend, filter, quads)?;
            }

            self.draw_batch(&mut bind, backend, op, quads)?;
        }

        for filter in filters {
            self.run_filter(&mut bind, backend, filter, quads)?;
        }

        backend.end_frame()
    }

    fn draw_batch(
        &self,
        bind: &mut BindState,
        backend: &mut dyn RenderBackend,
        op: &QuadOp,
        quads: &crate::quads::QuadBuffer,
    ) -> Result<()> {
        self.bind_target(bind, backend, op.render_texture.as_deref());

        if op.clear_render_texture {
            // Texturized subtrees composite over transparent black; the
            // screen keeps the configured clear color.
            let color = if op.render_texture.is_some() {
                [0.0; 4]
            } else {
                self.clear_color.unwrap_or([0.0; 4])
            };
            backend.clear(color);
        }

        if op.quad_count == 0 && !op.shader.supports_empty_batch() {
            return Ok(());
        }

        let program = (op.shader.program(), op.shader_owner);
        if bind.program != Some(program) {
            backend.bind_program(program.0, program.1);
            bind.program = Some(program);
        }

        backend.draw_quads(op, quads)
    }

    fn run_filter(
        &self,
        bind: &mut BindState,
        backend: &mut dyn RenderBackend,
        op: &FilterOp,
        quads: &crate::quads::QuadBuffer,
    ) -> Result<()> {
        self.bind_target(bind, backend, op.render_texture.as_deref());
        backend.run_filter(op, quads)?;
        // The pass binds its own program behind the backend boundary.
        bind.program = None;
        Ok(())
    }

    fn bind_target(
        &self,
        bind: &mut BindState,
        backend: &mut dyn RenderBackend,
        target: Option<&crate::texture::RenderTexture>,
    ) {
        let key = target.map(|t| t.id());
        if bind.target != Some(key) {
            backend.bind_render_target(target);
            bind.target = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::backend::recording::{Event, RecordingBackend};
    use crate::config::ContextOptions;
    use crate::filter::{Filter, GrayscaleFilter};
    use crate::quads::QuadRequest;
    use crate::shader::Shader;
    use crate::texture::RenderTexture;

    fn quad(owner: u64) -> QuadRequest {
        QuadRequest {
            owner: NodeId(owner),
            texture: None,
            in_atlas: false,
            coords: [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            uvs: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            colors: [0xffff_ffff; 4],
        }
    }

    fn rt(id: u64) -> Rc<RenderTexture> {
        Rc::new(RenderTexture::new(id, 64.0, 64.0, 64, 64, 1.0, 0))
    }

    struct TestShader(ProgramId);
    impl Shader for TestShader {
        fn program(&self) -> ProgramId {
            self.0
        }
    }

    fn draws_and_filters(events: &[Event]) -> Vec<&Event> {
        events
            .iter()
            .filter(|event| matches!(event, Event::Draw { .. } | Event::Filter { .. }))
            .collect()
    }

    #[test]
    fn frame_is_bracketed_and_screen_cleared() {
        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        state.finish();

        let mut backend = RecordingBackend::default();
        Executor::new(Some([0.1, 0.2, 0.3, 1.0]))
            .execute(&state, &mut backend)
            .unwrap();

        assert_eq!(backend.events.first(), Some(&Event::BeginFrame));
        assert_eq!(backend.events.last(), Some(&Event::EndFrame));
        assert!(backend.events.contains(&Event::Clear([0.1, 0.2, 0.3, 1.0])));
    }

    #[test]
    fn no_clear_when_color_is_none() {
        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        state.finish();

        let mut backend = RecordingBackend::default();
        Executor::new(None).execute(&state, &mut backend).unwrap();

        assert!(
            !backend
                .events
                .iter()
                .any(|event| matches!(event, Event::Clear(_)))
        );
    }

    #[test]
    fn filter_runs_between_its_checkpoint_batches() {
        // Two batches, a filter queued, then one more batch: the pass must
        // run strictly between batch 2 and batch 3.
        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        let a: Rc<dyn Shader> = Rc::new(TestShader(ProgramId(1)));
        let b: Rc<dyn Shader> = Rc::new(TestShader(ProgramId(2)));
        let filter: Rc<dyn Filter> = Rc::new(GrayscaleFilter::new(1.0));

        state.set_shader(&a, NodeId(1));
        state.add_quad(&quad(1));
        state.set_shader(&b, NodeId(1));
        state.add_quad(&quad(2));
        state.add_filter(&filter, NodeId(9), rt(1), Some(rt(2)));
        state.set_shader(&a, NodeId(1));
        state.add_quad(&quad(3));
        state.finish();

        let mut backend = RecordingBackend::default();
        Executor::new(None).execute(&state, &mut backend).unwrap();

        let sequence = draws_and_filters(&backend.events);
        assert_eq!(sequence.len(), 4);
        assert!(matches!(sequence[0], Event::Draw { quad_count: 1, .. }));
        assert!(matches!(sequence[1], Event::Draw { quad_count: 1, .. }));
        assert!(matches!(
            sequence[2],
            Event::Filter {
                source: 1,
                target: Some(2),
                ..
            }
        ));
        assert!(matches!(sequence[3], Event::Draw { quad_count: 1, .. }));
    }

    #[test]
    fn trailing_filter_runs_after_last_batch() {
        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        let shader: Rc<dyn Shader> = Rc::new(TestShader(ProgramId(1)));
        let filter: Rc<dyn Filter> = Rc::new(GrayscaleFilter::new(0.5));

        state.set_shader(&shader, NodeId(1));
        state.add_quad(&quad(1));
        state.add_filter(&filter, NodeId(2), rt(1), None);
        state.finish();

        let mut backend = RecordingBackend::default();
        Executor::new(None).execute(&state, &mut backend).unwrap();

        let sequence = draws_and_filters(&backend.events);
        assert_eq!(sequence.len(), 2);
        assert!(matches!(sequence[0], Event::Draw { .. }));
        assert!(matches!(sequence[1], Event::Filter { .. }));
    }

    #[test]
    fn redundant_program_binds_are_elided() {
        // A target round-trip splits batches but keeps the same program and
        // owner; the program must be bound exactly once.
        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        let shader: Rc<dyn Shader> = Rc::new(TestShader(ProgramId(1)));
        let target = rt(1);

        state.set_shader(&shader, NodeId(1));
        state.add_quad(&quad(1));
        state.set_render_target(Some(target), false);
        state.add_quad(&quad(2));
        state.restore_render_target();
        state.add_quad(&quad(3));
        state.finish();

        let mut backend = RecordingBackend::default();
        Executor::new(None).execute(&state, &mut backend).unwrap();

        let binds = backend
            .events
            .iter()
            .filter(|event| matches!(event, Event::BindProgram(..)))
            .count();
        assert_eq!(binds, 1);
    }

    #[test]
    fn cleared_subtree_target_is_cleared_transparent() {
        let options = ContextOptions::default();
        let mut state = RenderState::new(&options);
        state.reset();
        let shader: Rc<dyn Shader> = Rc::new(TestShader(ProgramId(1)));

        state.set_shader(&shader, NodeId(1));
        state.set_render_target(Some(rt(5)), true);
        state.add_quad(&quad(1));
        state.restore_render_target();
        state.finish();

        let mut backend = RecordingBackend::default();
        Executor::new(None).execute(&state, &mut backend).unwrap();

        let position = backend
            .events
            .iter()
            .position(|event| *event == Event::BindTarget(Some(5)))
            .unwrap();
        assert_eq!(backend.events[position + 1], Event::Clear([0.0; 4]));
    }
}
