use std::collections::VecDeque;
use std::time::Duration;

use render_protocol::{
    BlockRegion, DispatchError, FrameParams, SurfaceExtent, TraceKernel, ViewParams,
};

use super::{ProgressiveRenderer, RenderSettings};

/// Kernel stand-in with canned dispatch durations. Records every call so
/// tests can assert on dispatch order, uniform uploads, and surface
/// rebuilds without touching a GPU.
struct ScriptedKernel {
    scripted_ms: VecDeque<f32>,
    default_ms: f32,
    fail_on_dispatch: Option<usize>,
    dispatches: Vec<BlockRegion>,
    prepared_frames: Vec<FrameParams>,
    resizes: Vec<(SurfaceExtent, f32, u32)>,
}

impl ScriptedKernel {
    fn with_dispatch_ms(default_ms: f32) -> Self {
        Self {
            scripted_ms: VecDeque::new(),
            default_ms,
            fail_on_dispatch: None,
            dispatches: Vec::new(),
            prepared_frames: Vec::new(),
            resizes: Vec::new(),
        }
    }

    fn dispatched_block_area(&self) -> u32 {
        self.dispatches.iter().map(|region| region.block_count()).sum()
    }
}

impl TraceKernel for ScriptedKernel {
    fn prepare_frame(&mut self, _view: &ViewParams, frame: &FrameParams) {
        self.prepared_frames.push(*frame);
    }

    fn dispatch_tile(&mut self, region: BlockRegion) -> Result<Duration, DispatchError> {
        if self.fail_on_dispatch == Some(self.dispatches.len()) {
            return Err(DispatchError::DeviceLost {
                message: "scripted device loss".to_string(),
            });
        }
        self.dispatches.push(region);
        let dispatch_ms = self.scripted_ms.pop_front().unwrap_or(self.default_ms);
        Ok(Duration::from_secs_f64(f64::from(dispatch_ms) / 1_000.0))
    }

    fn resize_surfaces(&mut self, extent: SurfaceExtent, resolution_scale: f32, bounce_depth: u32) {
        self.resizes.push((extent, resolution_scale, bounce_depth));
    }
}

fn settings_with_budget(render_budget_ms: f32) -> RenderSettings {
    RenderSettings {
        render_budget_ms,
        ..RenderSettings::default()
    }
}

#[test]
fn one_bootstrap_pass_spans_three_calls_and_advances_accumulation_once() {
    // 320x320 at scale 1.0 is a 10x10 block grid: 16 bootstrap tiles. At
    // 2 ms per dispatch against a 15 ms budget each call stops after 7
    // tiles, so one progressive pass takes three application frames.
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(320, 320));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);
    let view = ViewParams::default();

    let first = renderer.run_frame(&mut kernel, &view).expect("first call");
    assert_eq!(first.tiles_dispatched, 7);
    assert!(!first.queue_drained);
    assert_eq!(first.tiles_remaining, 9);
    assert_eq!(first.accumulation_frame, 0);
    assert_eq!(first.frame_count, 0);

    let second = renderer.run_frame(&mut kernel, &view).expect("second call");
    assert_eq!(second.tiles_dispatched, 7);
    assert!(!second.queue_drained);
    assert_eq!(second.accumulation_frame, 0);

    let third = renderer.run_frame(&mut kernel, &view).expect("third call");
    assert_eq!(third.tiles_dispatched, 2);
    assert!(third.queue_drained);
    assert_eq!(third.accumulation_frame, 1);
    assert_eq!(third.frame_count, 1);

    assert_eq!(kernel.dispatches.len(), 16);
    assert_eq!(kernel.dispatched_block_area(), 100);
}

#[test]
fn over_budget_tile_still_completes_and_counts() {
    // 96x96 is a 3x3 grid, one bootstrap tile. Its 50 ms dispatch blows
    // through the 15 ms budget but is never cancelled, and the drained
    // queue still advances the pass.
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(96, 96));
    let mut kernel = ScriptedKernel::with_dispatch_ms(50.0);

    let report = renderer
        .run_frame(&mut kernel, &ViewParams::default())
        .expect("run frame");

    assert_eq!(report.tiles_dispatched, 1);
    assert!(report.dispatched_ms > 15.0);
    assert!(report.queue_drained);
    assert_eq!(report.accumulation_frame, 1);
}

#[test]
fn dynamic_mode_dispatches_one_full_grid_tile() {
    let settings = RenderSettings {
        dynamic_resolution_scale: 1.0,
        ..settings_with_budget(15.0)
    };
    // 640x640 at scale 1.0 is a 20x20 grid.
    let mut renderer = ProgressiveRenderer::new(settings, SurfaceExtent::new(640, 640));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);

    renderer.set_dynamic(&mut kernel);
    let report = renderer
        .run_frame(&mut kernel, &ViewParams::default())
        .expect("run frame");

    assert_eq!(report.tiles_dispatched, 1);
    assert!(report.queue_drained);
    assert_eq!(
        kernel.dispatches,
        vec![BlockRegion {
            block_x: 0,
            block_y: 0,
            blocks_wide: 20,
            blocks_high: 20,
        }]
    );
}

#[test]
fn dynamic_mode_leaves_block_times_untouched() {
    let settings = RenderSettings {
        dynamic_resolution_scale: 1.0,
        ..settings_with_budget(15.0)
    };
    let mut renderer = ProgressiveRenderer::new(settings, SurfaceExtent::new(64, 64));
    let mut kernel = ScriptedKernel::with_dispatch_ms(8.0);

    renderer.set_dynamic(&mut kernel);
    renderer
        .run_frame(&mut kernel, &ViewParams::default())
        .expect("run frame");

    assert_eq!(renderer.block_times().block_time_ms(0, 0), 0.0);
}

#[test]
fn static_mode_distributes_measured_time_over_tile_blocks() {
    // 64x64 is a 2x2 grid covered by a single bootstrap tile; an 8 ms
    // dispatch lands as 2 ms on each of its four blocks.
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(64, 64));
    let mut kernel = ScriptedKernel::with_dispatch_ms(8.0);

    renderer
        .run_frame(&mut kernel, &ViewParams::default())
        .expect("run frame");

    for block_y in 0..2 {
        for block_x in 0..2 {
            let block_ms = renderer.block_times().block_time_ms(block_x, block_y);
            assert!((block_ms - 2.0).abs() < 1e-3);
        }
    }
}

#[test]
fn mode_switches_are_idempotent() {
    let mut renderer =
        ProgressiveRenderer::new(RenderSettings::default(), SurfaceExtent::new(1280, 720));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);

    renderer.set_dynamic(&mut kernel);
    assert_eq!(kernel.resizes.len(), 1);
    renderer.set_dynamic(&mut kernel);
    assert_eq!(kernel.resizes.len(), 1);
    assert!(renderer.dynamic_mode());

    renderer.set_static(&mut kernel);
    assert_eq!(kernel.resizes.len(), 2);
    renderer.set_static(&mut kernel);
    assert_eq!(kernel.resizes.len(), 2);
    assert!(!renderer.dynamic_mode());
}

#[test]
fn mode_switch_substitutes_and_restores_quality_parameters() {
    let mut renderer =
        ProgressiveRenderer::new(RenderSettings::default(), SurfaceExtent::new(1280, 720));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);

    renderer.set_dynamic(&mut kernel);
    assert_eq!(renderer.resolution_scale(), 0.2);
    assert_eq!(renderer.bounce_depth(), 1);
    assert_eq!(
        kernel.resizes.last().copied(),
        Some((SurfaceExtent::new(1280, 720), 0.2, 1))
    );
    // 1280x720 at scale 0.2 is 256x144 pixels: an 8x5 grid.
    assert_eq!(renderer.grid().blocks_x(), 8);
    assert_eq!(renderer.grid().blocks_y(), 5);

    renderer.set_static(&mut kernel);
    assert_eq!(renderer.resolution_scale(), 1.0);
    assert_eq!(renderer.bounce_depth(), 3);
    assert_eq!(
        kernel.resizes.last().copied(),
        Some((SurfaceExtent::new(1280, 720), 1.0, 3))
    );
    assert_eq!(renderer.grid().blocks_x(), 40);
    assert_eq!(renderer.grid().blocks_y(), 23);
}

#[test]
fn request_reset_clears_accumulation_but_not_frame_count() {
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(64, 64));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);
    let view = ViewParams::default();

    renderer.run_frame(&mut kernel, &view).expect("first pass");
    renderer.run_frame(&mut kernel, &view).expect("second pass");
    assert_eq!(renderer.accumulation_frame(), 2);
    assert_eq!(renderer.frame_count(), 2);

    renderer.request_reset();
    assert_eq!(renderer.accumulation_frame(), 0);
    assert_eq!(renderer.queued_tiles(), 0);
    assert_eq!(renderer.frame_count(), 2);

    // A resize, by contrast, rebuilds surfaces and zeroes both counters.
    renderer.resize(&mut kernel, SurfaceExtent::new(128, 128));
    assert_eq!(renderer.accumulation_frame(), 0);
    assert_eq!(renderer.frame_count(), 0);
    assert_eq!(
        kernel.resizes.last().copied(),
        Some((SurfaceExtent::new(128, 128), 1.0, 3))
    );
}

#[test]
fn dispatch_failure_propagates_and_leaves_queue_for_retry() {
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(320, 320));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);
    let view = ViewParams::default();
    kernel.fail_on_dispatch = Some(5);

    let error = renderer
        .run_frame(&mut kernel, &view)
        .expect_err("sixth dispatch fails");
    assert!(matches!(error, DispatchError::DeviceLost { .. }));
    // Five of sixteen bootstrap tiles dispatched; the failing tile stays
    // queued and the pass has not advanced.
    assert_eq!(renderer.queued_tiles(), 11);
    assert_eq!(renderer.accumulation_frame(), 0);

    kernel.fail_on_dispatch = None;
    renderer.run_frame(&mut kernel, &view).expect("retry call");
    let report = renderer.run_frame(&mut kernel, &view).expect("drain call");
    assert!(report.queue_drained);
    assert_eq!(report.accumulation_frame, 1);
    assert_eq!(kernel.dispatches.len(), 16);
    assert_eq!(kernel.dispatched_block_area(), 100);
}

#[test]
fn degenerate_viewport_completes_trivially_and_still_advances() {
    let mut renderer =
        ProgressiveRenderer::new(RenderSettings::default(), SurfaceExtent::new(0, 480));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);

    let report = renderer
        .run_frame(&mut kernel, &ViewParams::default())
        .expect("run frame");

    assert_eq!(report.tiles_dispatched, 0);
    assert!(report.queue_drained);
    assert_eq!(report.accumulation_frame, 1);
    assert!(kernel.dispatches.is_empty());
    assert!(kernel.prepared_frames.is_empty());
}

#[test]
fn frame_uniforms_carry_the_counters_of_the_current_pass() {
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(64, 64));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);
    let view = ViewParams::default();

    renderer.run_frame(&mut kernel, &view).expect("first pass");
    renderer.run_frame(&mut kernel, &view).expect("second pass");

    assert_eq!(kernel.prepared_frames.len(), 2);
    assert_eq!(kernel.prepared_frames[0].frame_index, 0);
    assert_eq!(kernel.prepared_frames[0].accumulation_frame, 0);
    assert_eq!(kernel.prepared_frames[1].frame_index, 1);
    assert_eq!(kernel.prepared_frames[1].accumulation_frame, 1);
    assert_eq!(kernel.prepared_frames[1].bounce_depth, 3);
    assert_eq!(kernel.prepared_frames[1].resolution_scale, 1.0);
}

#[test]
fn adaptive_passes_after_bootstrap_schedule_fewer_larger_tiles() {
    let mut renderer =
        ProgressiveRenderer::new(settings_with_budget(15.0), SurfaceExtent::new(320, 320));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);
    let view = ViewParams::default();

    // Drain the bootstrap pass.
    while renderer.accumulation_frame() == 0 {
        renderer.run_frame(&mut kernel, &view).expect("bootstrap");
    }
    let bootstrap_dispatches = kernel.dispatches.len();
    assert_eq!(bootstrap_dispatches, 16);

    // Drain exactly one adaptive pass, however many calls it takes.
    loop {
        let report = renderer.run_frame(&mut kernel, &view).expect("adaptive");
        if report.queue_drained {
            break;
        }
    }
    let adaptive_regions = &kernel.dispatches[bootstrap_dispatches..];
    let adaptive_area: u32 = adaptive_regions.iter().map(|region| region.block_count()).sum();

    assert_eq!(adaptive_area, 100);
    assert!(
        adaptive_regions.len() < 16,
        "measured costs should merge blocks into larger tiles"
    );
    assert_eq!(renderer.accumulation_frame(), 2);
}

#[test]
fn set_bounce_depth_rebuilds_surfaces_in_static_mode_only() {
    let mut renderer =
        ProgressiveRenderer::new(RenderSettings::default(), SurfaceExtent::new(1280, 720));
    let mut kernel = ScriptedKernel::with_dispatch_ms(2.0);

    renderer.set_bounce_depth(&mut kernel, 5);
    assert_eq!(renderer.bounce_depth(), 5);
    assert_eq!(
        kernel.resizes.last().copied(),
        Some((SurfaceExtent::new(1280, 720), 1.0, 5))
    );

    let resizes_before = kernel.resizes.len();
    renderer.set_dynamic(&mut kernel);
    renderer.set_bounce_depth(&mut kernel, 7);
    // Still rendering at the dynamic depth; the new value waits for the
    // return to static mode.
    assert_eq!(renderer.bounce_depth(), 1);
    assert_eq!(kernel.resizes.len(), resizes_before + 1);

    renderer.set_static(&mut kernel);
    assert_eq!(renderer.bounce_depth(), 7);
}
