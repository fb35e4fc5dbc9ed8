//! Frame orchestration.
//!
//! [`RenderContext`] owns the per-frame machinery (batch builder, render
//! texture pool, executor, backend, clock) and drives the scene-graph
//! collaborator through the fixed frame sequence: update, forced z-sorts,
//! render, execute.

use std::rc::Rc;

use anyhow::Result;
use log::{debug, info};

use crate::backend::RenderBackend;
use crate::batch::RenderState;
use crate::config::ContextOptions;
use crate::exec::Executor;
use crate::pool::{RenderTexturePool, SOFT_MAX_AGE};
use crate::scene::{PaintCtx, SceneDriver};
use crate::texture::{NodeId, RenderTexture};
use crate::time::FrameClock;

/// Rendering core entry point.
pub struct RenderContext {
    options: ContextOptions,
    state: RenderState,
    pool: RenderTexturePool,
    backend: Box<dyn RenderBackend>,
    exec: Executor,
    clock: FrameClock,
    frame_counter: u64,
    dt: f64,
    force_render: bool,
    z_sort_queue: Vec<NodeId>,
}

impl RenderContext {
    pub fn new(options: ContextOptions, backend: Box<dyn RenderBackend>) -> Self {
        info!(
            "render context: {}x{} logical at precision {}",
            options.logical_w, options.logical_h, options.precision
        );
        Self {
            state: RenderState::new(&options),
            pool: RenderTexturePool::new(options.render_texture_memory),
            backend,
            exec: Executor::new(options.clear_color),
            clock: FrameClock::new(),
            frame_counter: 0,
            dt: 0.0,
            force_render: false,
            z_sort_queue: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Frames drawn so far. Advanced by [`draw_frame`](Self::draw_frame)
    /// whether or not the frame was skipped, so pool age bookkeeping keeps
    /// moving on a static screen.
    pub fn frame(&self) -> u64 {
        self.frame_counter
    }

    /// Delta time of the current frame in seconds.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Forces the next [`draw_frame`](Self::draw_frame) to render even when
    /// the driver reports no pending render updates.
    pub fn force_render_update(&mut self) {
        self.force_render = true;
    }

    /// Queues a forced z-sort of `node`'s children, executed between the
    /// update and render passes of the next drawn frame.
    pub fn force_z_sort(&mut self, node: NodeId) {
        self.z_sort_queue.push(node);
    }

    /// Checks a render texture out of the pool, stamped with the current
    /// frame.
    pub fn allocate_render_texture(
        &mut self,
        logical_w: f32,
        logical_h: f32,
    ) -> Result<Rc<RenderTexture>> {
        self.pool.allocate(
            self.backend.as_mut(),
            self.frame_counter,
            self.options.precision,
            logical_w,
            logical_h,
        )
    }

    /// Returns a checked-out render texture to the pool.
    pub fn release_render_texture(&mut self, texture: Rc<RenderTexture>) {
        self.pool.release(texture, self.frame_counter);
    }

    /// Reclaims idle pooled render textures. The soft variant only evicts
    /// textures unused for a while; `aggressive` sweeps them all.
    pub fn evict_render_textures(&mut self, aggressive: bool) {
        let max_age = if aggressive { 0 } else { SOFT_MAX_AGE };
        self.pool
            .evict(self.backend.as_mut(), self.frame_counter, max_age);
    }

    pub fn render_texture_pixels(&self) -> u64 {
        self.pool.total_pixels()
    }

    /// Runs one complete frame unconditionally: update (re-entered at most
    /// once when the first pass schedules more work), forced z-sorts,
    /// render, execute.
    pub fn frame_now(&mut self, driver: &mut dyn SceneDriver) -> Result<()> {
        driver.update(self.dt);
        if driver.has_updates() {
            // One bounded re-entry: updates scheduled during update (e.g.
            // layout reacting to layout) land this frame, but a driver that
            // keeps scheduling work cannot starve rendering.
            driver.update(self.dt);
        }

        for node in std::mem::take(&mut self.z_sort_queue) {
            driver.sort_children(node);
        }

        driver.clear_render_updates();
        self.render(driver)
    }

    /// Per-tick entry point: advances the clock and frame counter, and
    /// draws a frame only when something changed. Returns whether a frame
    /// was actually rendered.
    pub fn draw_frame(&mut self, driver: &mut dyn SceneDriver) -> Result<bool> {
        let dt = self.clock.tick();
        self.dt = if self.options.fixed_dt > 0.0 {
            self.options.fixed_dt
        } else {
            dt
        };

        // The counter moves on skipped frames too: idle time must still age
        // pooled textures toward eviction.
        self.frame_counter += 1;

        let render = driver.has_render_updates() || self.force_render;
        self.force_render = false;
        if !render {
            debug!("frame {} skipped: no render updates", self.frame_counter);
            return Ok(false);
        }

        self.frame_now(driver)?;
        Ok(true)
    }

    fn render(&mut self, driver: &mut dyn SceneDriver) -> Result<()> {
        self.state.reset();
        {
            let mut ctx = PaintCtx::new(
                &mut self.state,
                &mut self.pool,
                self.backend.as_mut(),
                self.frame_counter,
                self.options.precision,
            );
            driver.render(&mut ctx)?;
        }
        self.state.finish();
        self.exec.execute(&self.state, self.backend.as_mut())
    }

    /// Releases all pooled render textures. Also runs on drop.
    pub fn destroy(&mut self) {
        self.pool.destroy(self.backend.as_mut());
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::backend::recording::RecordingBackend;
    use crate::backend::soft::SoftwareBackend;
    use crate::quads::QuadRequest;

    #[derive(Default)]
    struct TestDriver {
        updates: usize,
        extra_updates: usize,
        render_updates: bool,
        cleared: usize,
        sorted: Vec<NodeId>,
        quads: Vec<QuadRequest>,
        renders: usize,
    }

    impl SceneDriver for TestDriver {
        fn update(&mut self, _dt: f64) {
            self.updates += 1;
        }

        fn has_updates(&self) -> bool {
            self.extra_updates >= self.updates
        }

        fn has_render_updates(&self) -> bool {
            self.render_updates
        }

        fn clear_render_updates(&mut self) {
            self.render_updates = false;
            self.cleared += 1;
        }

        fn force_render_update(&mut self) {
            self.render_updates = true;
        }

        fn render(&mut self, ctx: &mut PaintCtx<'_>) -> Result<()> {
            self.renders += 1;
            let shader = Rc::clone(ctx.state.default_shader());
            for (index, request) in self.quads.iter().enumerate() {
                ctx.state.set_shader(&shader, NodeId(index as u64));
                ctx.state.add_quad(request);
            }
            Ok(())
        }

        fn sort_children(&mut self, node: NodeId) {
            self.sorted.push(node);
        }
    }

    fn context() -> RenderContext {
        RenderContext::new(
            ContextOptions::default(),
            Box::new(RecordingBackend::default()),
        )
    }

    fn solid_quad() -> QuadRequest {
        QuadRequest {
            owner: NodeId(1),
            texture: None,
            in_atlas: false,
            coords: [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]],
            uvs: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            colors: [0xff00_00ff; 4],
        }
    }

    #[test]
    fn skipped_frame_still_advances_counter() {
        crate::logging::init_test_logging();
        let mut ctx = context();
        let mut driver = TestDriver::default();

        assert!(!ctx.draw_frame(&mut driver).unwrap());
        assert_eq!(ctx.frame(), 1);
        assert_eq!(driver.updates, 0);
        assert_eq!(driver.renders, 0);
    }

    #[test]
    fn render_updates_trigger_a_full_frame() {
        let mut ctx = context();
        let mut driver = TestDriver {
            render_updates: true,
            ..TestDriver::default()
        };

        assert!(ctx.draw_frame(&mut driver).unwrap());
        assert_eq!(driver.updates, 1);
        assert_eq!(driver.cleared, 1);
        assert_eq!(driver.renders, 1);
        // A second tick with nothing pending is skipped.
        assert!(!ctx.draw_frame(&mut driver).unwrap());
        assert_eq!(driver.renders, 1);
    }

    #[test]
    fn update_reenters_at_most_once() {
        let mut ctx = context();
        let mut driver = TestDriver {
            render_updates: true,
            // Driver keeps reporting pending updates forever.
            extra_updates: usize::MAX,
            ..TestDriver::default()
        };

        ctx.draw_frame(&mut driver).unwrap();
        assert_eq!(driver.updates, 2);
    }

    #[test]
    fn forced_render_overrides_skip() {
        let mut ctx = context();
        let mut driver = TestDriver::default();

        ctx.force_render_update();
        assert!(ctx.draw_frame(&mut driver).unwrap());
        // The force is one-shot.
        assert!(!ctx.draw_frame(&mut driver).unwrap());
    }

    #[test]
    fn queued_z_sorts_run_before_render() {
        let mut ctx = context();
        let mut driver = TestDriver {
            render_updates: true,
            ..TestDriver::default()
        };

        ctx.force_z_sort(NodeId(7));
        ctx.force_z_sort(NodeId(3));
        ctx.draw_frame(&mut driver).unwrap();

        assert_eq!(driver.sorted, vec![NodeId(7), NodeId(3)]);
        // Queue drained; nothing replays next frame.
        driver.render_updates = true;
        ctx.draw_frame(&mut driver).unwrap();
        assert_eq!(driver.sorted.len(), 2);
    }

    #[test]
    fn fixed_dt_overrides_measured_time() {
        let mut ctx = RenderContext::new(
            ContextOptions {
                fixed_dt: 1.0 / 60.0,
                ..ContextOptions::default()
            },
            Box::new(RecordingBackend::default()),
        );
        let mut driver = TestDriver::default();
        ctx.draw_frame(&mut driver).unwrap();
        assert_eq!(ctx.dt(), 1.0 / 60.0);
    }

    #[test]
    fn frame_executes_driver_quads() {
        let mut ctx = context();
        let mut driver = TestDriver {
            render_updates: true,
            quads: vec![solid_quad(), solid_quad()],
            ..TestDriver::default()
        };

        ctx.draw_frame(&mut driver).unwrap();

        // Owners differ, so the two quads land in two batches.
        assert_eq!(ctx.state.quads().quad_count(), 2);
        assert_eq!(ctx.state.quad_ops().len(), 2);
    }

    #[test]
    fn pool_round_trip_through_context() {
        let mut ctx = context();
        let texture = ctx.allocate_render_texture(50.0, 50.0).unwrap();
        let id = texture.id();
        ctx.release_render_texture(texture);

        let again = ctx.allocate_render_texture(50.0, 50.0).unwrap();
        assert_eq!(again.id(), id);
        ctx.release_render_texture(again);

        ctx.evict_render_textures(true);
        assert_eq!(ctx.render_texture_pixels(), 0);
    }

    #[test]
    fn software_frame_draws_to_screen() {
        let mut ctx = RenderContext::new(
            ContextOptions {
                logical_w: 8.0,
                logical_h: 8.0,
                clear_color: Some([0.0, 0.0, 0.0, 1.0]),
                ..ContextOptions::default()
            },
            Box::new(SoftwareBackend::new(8, 8)),
        );
        let mut driver = TestDriver {
            render_updates: true,
            quads: vec![solid_quad()],
            ..TestDriver::default()
        };

        ctx.draw_frame(&mut driver).unwrap();

        // The backend is boxed away; verify through a fresh software run of
        // the same stream instead.
        let mut backend = SoftwareBackend::new(8, 8);
        Executor::new(Some([0.0, 0.0, 0.0, 1.0]))
            .execute(&ctx.state, &mut backend)
            .unwrap();
        assert_eq!(backend.screen().pixels[2 * 8 + 2], 0xff00_00ff);
        assert_eq!(backend.screen().pixels[6 * 8 + 6], 0xff00_0000);
    }
}
