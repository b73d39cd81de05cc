//! Frame-budget execution and render-mode control.
//!
//! `ProgressiveRenderer` owns all scheduling state: the work-block grid,
//! the per-block cost table, the tile queue, and the accumulation/frame
//! counters. Once per application frame it dispatches queued tiles through
//! the `TraceKernel` collaborator until the render budget is spent, feeding
//! each measured dispatch back into the cost table. The mode controller
//! trades fidelity for latency while the scene is being edited and
//! guarantees that every change invalidating accumulated radiance also
//! resets scheduling state.

use std::collections::VecDeque;
use std::time::Instant;

use render_protocol::{DispatchError, FrameParams, SurfaceExtent, TraceKernel, ViewParams};
use tile_scheduler::{
    BlockGrid, BlockTimeTable, RenderTile, TileScheduleInput, TileScheduler, TileSchedulerConfig,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    /// Cap on dispatch time spent inside one `run_frame` call.
    pub render_budget_ms: f32,
    /// Side length, in blocks, of first-pass sampling tiles.
    pub bootstrap_tile_blocks: u32,
    /// Fraction of the native viewport rendered in static mode.
    pub resolution_scale: f32,
    /// Maximum camera path length in static mode.
    pub bounce_depth: u32,
    /// Maximum light path length; only sizes the light-path buffers.
    pub light_bounce_depth: u32,
    /// Substitutes applied while dynamic mode is active.
    pub dynamic_resolution_scale: f32,
    pub dynamic_bounce_depth: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            render_budget_ms: 15.0,
            bootstrap_tile_blocks: 3,
            resolution_scale: 1.0,
            bounce_depth: 3,
            light_bounce_depth: 2,
            dynamic_resolution_scale: 0.2,
            dynamic_bounce_depth: 1,
        }
    }
}

/// Counters and quality parameters for the running render. One explicit
/// struct, owned by the renderer and touched only from its thread.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RenderState {
    /// Completed full-image passes; weights progressive averaging. Resets
    /// whenever accumulated radiance is invalidated.
    accumulation_frame: u32,
    /// Pseudo-random seed counter. Survives `request_reset`; zeroed only by
    /// surface rebuilds (resize, mode switch).
    frame_count: u32,
    resolution_scale: f32,
    bounce_depth: u32,
    dynamic_mode: bool,
    saved_resolution_scale: f32,
    saved_bounce_depth: u32,
}

/// Per-call statistics returned by `run_frame`, for display and perf logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub tiles_dispatched: u32,
    /// Sum of measured dispatch durations this call.
    pub dispatched_ms: f32,
    /// Wall-clock time spent inside `run_frame`, scheduling included.
    pub cpu_frame_ms: f32,
    pub tiles_remaining: usize,
    pub queue_drained: bool,
    pub accumulation_frame: u32,
    pub frame_count: u32,
}

pub struct ProgressiveRenderer {
    settings: RenderSettings,
    scheduler: TileScheduler,
    state: RenderState,
    viewport: SurfaceExtent,
    grid: BlockGrid,
    block_times: BlockTimeTable,
    tile_queue: VecDeque<RenderTile>,
}

impl ProgressiveRenderer {
    pub fn new(settings: RenderSettings, viewport: SurfaceExtent) -> Self {
        let grid = BlockGrid::from_scaled_surface(viewport, settings.resolution_scale);
        Self {
            scheduler: TileScheduler::new(TileSchedulerConfig {
                render_budget_ms: settings.render_budget_ms,
                bootstrap_tile_blocks: settings.bootstrap_tile_blocks,
            }),
            state: RenderState {
                accumulation_frame: 0,
                frame_count: 0,
                resolution_scale: settings.resolution_scale,
                bounce_depth: settings.bounce_depth,
                dynamic_mode: false,
                saved_resolution_scale: settings.resolution_scale,
                saved_bounce_depth: settings.bounce_depth,
            },
            viewport,
            grid,
            block_times: BlockTimeTable::new(grid),
            tile_queue: VecDeque::new(),
            settings,
        }
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn accumulation_frame(&self) -> u32 {
        self.state.accumulation_frame
    }

    pub fn frame_count(&self) -> u32 {
        self.state.frame_count
    }

    pub fn dynamic_mode(&self) -> bool {
        self.state.dynamic_mode
    }

    pub fn resolution_scale(&self) -> f32 {
        self.state.resolution_scale
    }

    pub fn bounce_depth(&self) -> u32 {
        self.state.bounce_depth
    }

    pub fn grid(&self) -> BlockGrid {
        self.grid
    }

    pub fn block_times(&self) -> &BlockTimeTable {
        &self.block_times
    }

    pub fn queued_tiles(&self) -> usize {
        self.tile_queue.len()
    }

    /// Advance scheduling and dispatch for one application frame.
    ///
    /// Rebuilds the tile queue when it is empty, then dispatches tiles
    /// front to back until the budget is spent or the queue drains. The
    /// accumulation and frame counters advance exactly when the queue
    /// drains within this call, so one progressive pass may span several
    /// application frames without corrupting the averaging weight. A
    /// dispatch failure propagates immediately; the failing tile and the
    /// remainder of the queue stay in place for retry on the next call.
    pub fn run_frame(
        &mut self,
        kernel: &mut dyn TraceKernel,
        view: &ViewParams,
    ) -> Result<FrameReport, DispatchError> {
        let frame_started = Instant::now();

        if self.grid.is_degenerate() {
            // Nothing to dispatch; the pass is trivially complete and the
            // counters still advance.
            self.state.accumulation_frame += 1;
            self.state.frame_count += 1;
            return Ok(self.report(0, 0.0, frame_started, true));
        }

        kernel.prepare_frame(
            view,
            &FrameParams {
                frame_index: self.state.frame_count,
                accumulation_frame: self.state.accumulation_frame,
                bounce_depth: self.state.bounce_depth,
                resolution_scale: self.state.resolution_scale,
            },
        );

        if self.tile_queue.is_empty() {
            let tiles = self.scheduler.build_queue(TileScheduleInput {
                grid: self.grid,
                block_times: &self.block_times,
                dynamic_mode: self.state.dynamic_mode,
                accumulation_frame: self.state.accumulation_frame,
            });
            self.tile_queue = tiles.into();
        }

        let budget_ms = self.settings.render_budget_ms;
        let mut dispatched_ms = 0.0_f32;
        let mut tiles_dispatched = 0_u32;

        while let Some(tile) = self.tile_queue.front().copied() {
            let duration = kernel.dispatch_tile(tile.region())?;
            let dispatch_ms = duration.as_secs_f32() * 1_000.0;

            if !self.state.dynamic_mode {
                self.block_times.record_tile_time(&tile, dispatch_ms);
            }

            self.tile_queue.pop_front();
            dispatched_ms += dispatch_ms;
            tiles_dispatched += 1;

            // Checked between tiles only; a tile that busts the budget
            // still runs to completion.
            if dispatched_ms + dispatch_ms >= budget_ms {
                break;
            }
        }

        let queue_drained = self.tile_queue.is_empty();
        if queue_drained {
            self.state.accumulation_frame += 1;
            self.state.frame_count += 1;
        }
        Ok(self.report(tiles_dispatched, dispatched_ms, frame_started, queue_drained))
    }

    /// Clear the tile queue and restart progressive accumulation without
    /// touching resolution-dependent state. The pseudo-random frame counter
    /// keeps running; external collaborators call this on every scene edit.
    pub fn request_reset(&mut self) {
        self.tile_queue.clear();
        self.state.accumulation_frame = 0;
    }

    /// Enter low-fidelity interactive rendering. No-op when already
    /// dynamic; otherwise saves the static quality parameters, substitutes
    /// the dynamic ones, and rebuilds every resolution-dependent surface.
    pub fn set_dynamic(&mut self, kernel: &mut dyn TraceKernel) {
        if self.state.dynamic_mode {
            return;
        }
        self.state.dynamic_mode = true;
        self.state.saved_resolution_scale = self.state.resolution_scale;
        self.state.saved_bounce_depth = self.state.bounce_depth;
        self.state.resolution_scale = self.settings.dynamic_resolution_scale;
        self.state.bounce_depth = self.settings.dynamic_bounce_depth;
        self.rebuild_surfaces(kernel);
    }

    /// Return to full-quality progressive rendering, restoring the saved
    /// parameters. No-op when already static.
    pub fn set_static(&mut self, kernel: &mut dyn TraceKernel) {
        if !self.state.dynamic_mode {
            return;
        }
        self.state.dynamic_mode = false;
        self.state.resolution_scale = self.state.saved_resolution_scale;
        self.state.bounce_depth = self.state.saved_bounce_depth;
        self.rebuild_surfaces(kernel);
    }

    /// Viewport change; rebuilds surfaces and resets scheduling state in
    /// either mode.
    pub fn resize(&mut self, kernel: &mut dyn TraceKernel, viewport: SurfaceExtent) {
        self.viewport = viewport;
        self.rebuild_surfaces(kernel);
    }

    /// Change the maximum camera path length. While dynamic mode is active
    /// the new depth takes effect on the return to static rendering.
    pub fn set_bounce_depth(&mut self, kernel: &mut dyn TraceKernel, bounce_depth: u32) {
        let bounce_depth = bounce_depth.max(1);
        if self.state.dynamic_mode {
            self.state.saved_bounce_depth = bounce_depth;
        } else {
            self.state.bounce_depth = bounce_depth;
            self.rebuild_surfaces(kernel);
        }
    }

    fn rebuild_surfaces(&mut self, kernel: &mut dyn TraceKernel) {
        self.grid = BlockGrid::from_scaled_surface(self.viewport, self.state.resolution_scale);
        self.block_times.reset(self.grid);
        self.tile_queue.clear();
        self.state.accumulation_frame = 0;
        self.state.frame_count = 0;
        kernel.resize_surfaces(
            self.viewport,
            self.state.resolution_scale,
            self.state.bounce_depth,
        );
    }

    fn report(
        &self,
        tiles_dispatched: u32,
        dispatched_ms: f32,
        frame_started: Instant,
        queue_drained: bool,
    ) -> FrameReport {
        FrameReport {
            tiles_dispatched,
            dispatched_ms,
            cpu_frame_ms: frame_started.elapsed().as_secs_f32() * 1_000.0,
            tiles_remaining: self.tile_queue.len(),
            queue_drained,
            accumulation_frame: self.state.accumulation_frame,
            frame_count: self.state.frame_count,
        }
    }
}

#[cfg(test)]
mod tests;
