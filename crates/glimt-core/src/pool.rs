//! Render-texture pool.
//!
//! Hands out offscreen color targets by device-pixel size, reusing released
//! ones before creating new backing storage, and keeps the total allocated
//! pixel count under a configured ceiling via a soft (aged) sweep followed,
//! if needed, by an aggressive all-ages sweep.
//!
//! Reuse is exact-size only: texturized node output sizes are typically
//! stable across frames, so exact matching gets most of the benefit without
//! sub-allocation complexity. Among equal-size candidates the most recently
//! released wins, keeping GPU-side bindings warm.

use std::rc::Rc;

use anyhow::Result;
use log::warn;

use crate::backend::RenderBackend;
use crate::texture::RenderTexture;

/// Free-list age (in frames) used by the soft eviction sweep.
pub const SOFT_MAX_AGE: u64 = 60;

/// Pool of reusable offscreen render targets.
///
/// Every texture counted in the running pixel total is either checked out
/// by exactly one subtree render or sitting in the free list — never both.
/// `release` does not decrement the total: a released texture stays
/// resident awaiting reuse until an eviction sweep destroys it.
pub struct RenderTexturePool {
    free: Vec<Rc<RenderTexture>>,
    total_pixels: u64,
    budget_pixels: u64,
    next_id: u64,
}

impl RenderTexturePool {
    pub fn new(budget_pixels: u64) -> Self {
        Self {
            free: Vec::new(),
            total_pixels: 0,
            budget_pixels,
            next_id: 1,
        }
    }

    /// Pixels currently backed by pool-created textures (live + free).
    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    /// Number of idle textures awaiting reuse or eviction.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Checks out a target for the given logical size.
    ///
    /// The free list is scanned newest-release-first for an exact
    /// device-pixel match; a hit is restamped with `frame` and returned.
    /// Otherwise new backing is created through the backend, and if the
    /// running pixel total then exceeds the budget, idle textures are
    /// swept — aged ones first, everything if that was not enough.
    pub fn allocate(
        &mut self,
        backend: &mut dyn RenderBackend,
        frame: u64,
        precision: f32,
        logical_w: f32,
        logical_h: f32,
    ) -> Result<Rc<RenderTexture>> {
        let width = device_px(logical_w, precision);
        let height = device_px(logical_h, precision);

        for index in (0..self.free.len()).rev() {
            if self.free[index].width() == width && self.free[index].height() == height {
                let texture = self.free.remove(index);
                texture.touch(frame);
                return Ok(texture);
            }
        }

        self.create(backend, frame, precision, logical_w, logical_h, width, height)
    }

    /// Returns a checked-out texture to the free list, restamped with
    /// `frame` so eviction age is measured from when it went idle.
    ///
    /// The texture is not destroyed and keeps counting against the pixel
    /// total; it becomes the preferred reuse candidate for its size.
    pub fn release(&mut self, texture: Rc<RenderTexture>, frame: u64) {
        texture.touch(frame);
        self.free.push(texture);
    }

    /// Destroys idle textures unused since `frame - max_age` or earlier and
    /// reclaims their pixel footprint. `max_age == 0` sweeps every idle
    /// texture unconditionally.
    pub fn evict(&mut self, backend: &mut dyn RenderBackend, frame: u64, max_age: u64) {
        // During the first max_age frames nothing can be old enough yet;
        // saturating to zero here would evict frame-0 releases immediately.
        let Some(limit) = frame.checked_sub(max_age) else {
            return;
        };
        let before = self.total_pixels;

        let mut kept = Vec::with_capacity(self.free.len());
        for texture in self.free.drain(..) {
            if texture.last_used_frame() <= limit {
                backend.free_render_texture(texture.id());
                self.total_pixels -= texture.pixel_count();
            } else {
                kept.push(texture);
            }
        }
        self.free = kept;

        if self.total_pixels != before {
            warn!(
                "evicted idle render textures{}: {}px -> {}px",
                if max_age == 0 { " (aggressive)" } else { "" },
                before,
                self.total_pixels,
            );
        }
    }

    /// Destroys every idle texture. Called on context teardown.
    pub fn destroy(&mut self, backend: &mut dyn RenderBackend) {
        for texture in self.free.drain(..) {
            backend.free_render_texture(texture.id());
            self.total_pixels -= texture.pixel_count();
        }
    }

    fn create(
        &mut self,
        backend: &mut dyn RenderBackend,
        frame: u64,
        precision: f32,
        logical_w: f32,
        logical_h: f32,
        width: u32,
        height: u32,
    ) -> Result<Rc<RenderTexture>> {
        let id = self.next_id;
        self.next_id += 1;

        backend.create_render_texture(id, width, height)?;

        let texture = Rc::new(RenderTexture::new(
            id, logical_w, logical_h, width, height, precision, frame,
        ));
        self.total_pixels += texture.pixel_count();

        if self.total_pixels > self.budget_pixels {
            self.evict(backend, frame, SOFT_MAX_AGE);

            if self.total_pixels > self.budget_pixels {
                self.evict(backend, frame, 0);
            }
        }

        Ok(texture)
    }
}

fn device_px(logical: f32, precision: f32) -> u32 {
    ((logical * precision).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    fn pool_with_budget(budget: u64) -> (RenderTexturePool, RecordingBackend) {
        (RenderTexturePool::new(budget), RecordingBackend::default())
    }

    // ── allocation and reuse ──────────────────────────────────────────────

    #[test]
    fn allocate_release_allocate_reuses_same_texture() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let first = pool.allocate(&mut backend, 1, 1.0, 100.0, 100.0).unwrap();
        let id = first.id();
        pool.release(first, 1);
        let second = pool.allocate(&mut backend, 2, 1.0, 100.0, 100.0).unwrap();

        assert_eq!(second.id(), id);
        assert_eq!(second.last_used_frame(), 2);
        assert_eq!(backend.created.len(), 1);
    }

    #[test]
    fn reuse_prefers_most_recently_released() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let a = pool.allocate(&mut backend, 1, 1.0, 50.0, 50.0).unwrap();
        let b = pool.allocate(&mut backend, 1, 1.0, 50.0, 50.0).unwrap();
        let (a_id, b_id) = (a.id(), b.id());
        pool.release(a, 1);
        pool.release(b, 1);

        let reused = pool.allocate(&mut backend, 2, 1.0, 50.0, 50.0).unwrap();
        assert_eq!(reused.id(), b_id);
        let reused = pool.allocate(&mut backend, 2, 1.0, 50.0, 50.0).unwrap();
        assert_eq!(reused.id(), a_id);
    }

    #[test]
    fn double_allocation_yields_distinct_textures() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let a = pool.allocate(&mut backend, 1, 2.0, 100.0, 100.0).unwrap();
        let b = pool.allocate(&mut backend, 1, 2.0, 100.0, 100.0).unwrap();

        assert_ne!(a.id(), b.id());
        // Device size is logical x precision: 200x200 each.
        assert_eq!(pool.total_pixels(), 2 * 200 * 200);
    }

    #[test]
    fn size_mismatch_creates_instead_of_reusing() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let small = pool.allocate(&mut backend, 1, 1.0, 10.0, 10.0).unwrap();
        pool.release(small, 1);
        let large = pool.allocate(&mut backend, 1, 1.0, 20.0, 10.0).unwrap();

        assert_eq!(large.device_size(), (20, 10));
        assert_eq!(backend.created.len(), 2);
    }

    #[test]
    fn device_size_is_rounded_with_floor_of_one() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let tiny = pool.allocate(&mut backend, 1, 0.5, 0.4, 3.0).unwrap();
        assert_eq!(tiny.device_size(), (1, 2));
    }

    // ── pixel accounting ──────────────────────────────────────────────────

    #[test]
    fn pixel_total_matches_live_plus_free() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let a = pool.allocate(&mut backend, 1, 1.0, 30.0, 30.0).unwrap();
        let b = pool.allocate(&mut backend, 1, 1.0, 40.0, 40.0).unwrap();
        let live_and_free = a.pixel_count() + b.pixel_count();
        pool.release(a, 1);

        assert_eq!(pool.total_pixels(), live_and_free);

        // Eviction reclaims only what it frees.
        pool.evict(&mut backend, 100, 0);
        assert_eq!(pool.total_pixels(), b.pixel_count());
        assert_eq!(backend.freed, vec![1]);
    }

    #[test]
    fn release_does_not_decrement_total() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let texture = pool.allocate(&mut backend, 1, 1.0, 64.0, 64.0).unwrap();
        let pixels = texture.pixel_count();
        pool.release(texture, 1);
        assert_eq!(pool.total_pixels(), pixels);
        assert_eq!(pool.free_count(), 1);
    }

    // ── eviction ──────────────────────────────────────────────────────────

    #[test]
    fn aggressive_eviction_empties_free_list() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        for _ in 0..3 {
            let texture = pool.allocate(&mut backend, 5, 1.0, 16.0, 16.0).unwrap();
            pool.release(texture, 5);
        }

        pool.evict(&mut backend, 5, 0);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.total_pixels(), 0);
        assert_eq!(backend.freed.len(), 3);
    }

    #[test]
    fn soft_sweep_in_the_first_frames_keeps_everything() {
        // A texture released at frame 0 is not 60 frames idle at frame 1.
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let texture = pool.allocate(&mut backend, 0, 1.0, 16.0, 16.0).unwrap();
        pool.release(texture, 0);

        pool.evict(&mut backend, 1, SOFT_MAX_AGE);
        assert_eq!(pool.free_count(), 1);
        assert!(backend.freed.is_empty());

        pool.evict(&mut backend, SOFT_MAX_AGE, SOFT_MAX_AGE);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn soft_eviction_keeps_recently_used() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let old = pool.allocate(&mut backend, 0, 1.0, 16.0, 16.0).unwrap();
        pool.release(old, 0);
        let fresh = pool.allocate(&mut backend, 90, 1.0, 32.0, 32.0).unwrap();
        pool.release(fresh, 90);

        pool.evict(&mut backend, 100, SOFT_MAX_AGE);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.total_pixels(), 32 * 32);
    }

    #[test]
    fn budget_overrun_triggers_soft_sweep() {
        // Budget fits one texture; creating a second (different-size) one
        // must push the aged idle first one out.
        crate::logging::init_test_logging();
        let (mut pool, mut backend) = pool_with_budget(12_000);
        let first = pool.allocate(&mut backend, 1, 1.0, 100.0, 100.0).unwrap();
        pool.release(first, 1);

        let second = pool.allocate(&mut backend, 100, 1.0, 110.0, 100.0).unwrap();
        assert_eq!(pool.total_pixels(), second.pixel_count());
        assert_eq!(pool.free_count(), 0);
        assert_eq!(backend.freed, vec![1]);
    }

    #[test]
    fn budget_overrun_falls_back_to_aggressive_sweep() {
        // The idle texture is too recent for the soft sweep, so the
        // aggressive all-ages sweep must reclaim it.
        let (mut pool, mut backend) = pool_with_budget(12_000);
        let first = pool.allocate(&mut backend, 95, 1.0, 100.0, 100.0).unwrap();
        pool.release(first, 95);

        let second = pool.allocate(&mut backend, 100, 1.0, 110.0, 100.0).unwrap();
        assert_eq!(pool.total_pixels(), second.pixel_count());
        assert_eq!(backend.freed, vec![1]);
    }

    #[test]
    fn destroy_frees_all_idle_textures() {
        let (mut pool, mut backend) = pool_with_budget(u64::MAX);
        let a = pool.allocate(&mut backend, 1, 1.0, 8.0, 8.0).unwrap();
        let b = pool.allocate(&mut backend, 1, 1.0, 8.0, 8.0).unwrap();
        pool.release(a, 1);
        pool.release(b, 1);

        pool.destroy(&mut backend);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.total_pixels(), 0);
        assert_eq!(backend.freed.len(), 2);
    }
}
