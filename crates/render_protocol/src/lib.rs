use std::time::Duration;

/// Side length in pixels of one work block, the unit of kernel dispatch
/// granularity. Tile coordinates and sizes are expressed in blocks.
pub const BLOCK_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceExtent {
    pub width: u32,
    pub height: u32,
}

impl SurfaceExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Extent rendered at the given resolution scale, truncated to whole
    /// pixels. A non-positive scale collapses to an empty extent.
    pub fn scaled(self, resolution_scale: f32) -> Self {
        if !resolution_scale.is_finite() || resolution_scale <= 0.0 {
            return Self {
                width: 0,
                height: 0,
            };
        }
        Self {
            width: (self.width as f32 * resolution_scale) as u32,
            height: (self.height as f32 * resolution_scale) as u32,
        }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rectangular run of work blocks handed to the accelerator as one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion {
    pub block_x: u32,
    pub block_y: u32,
    pub blocks_wide: u32,
    pub blocks_high: u32,
}

impl BlockRegion {
    pub fn block_count(self) -> u32 {
        self.blocks_wide * self.blocks_high
    }
}

/// Camera parameters forwarded verbatim to the kernel each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub origin: [f32; 3],
    pub forward: [f32; 3],
    pub right: [f32; 3],
    pub up: [f32; 3],
    pub field_of_view_degrees: f32,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            origin: [0.0, 0.0, 0.0],
            forward: [0.0, 0.0, -1.0],
            right: [1.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            field_of_view_degrees: 60.0,
        }
    }
}

/// Scalar uniforms injected before the first dispatch of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    /// Monotonic counter consumed for pseudo-random seeding.
    pub frame_index: u32,
    /// Completed full-image passes; the progressive-averaging weight.
    pub accumulation_frame: u32,
    pub bounce_depth: u32,
    pub resolution_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    DeviceLost { message: String },
    WaitFailed { message: String },
}

/// Accelerator-facing collaborator: a GPU-resident path-tracing kernel with
/// resolution-dependent surfaces. Dispatches are synchronous; the
/// implementation owns the wall-clock timer around its blocking wait and
/// reports the measured duration of each dispatch.
pub trait TraceKernel {
    /// Upload per-frame uniforms before the frame's first dispatch.
    fn prepare_frame(&mut self, view: &ViewParams, frame: &FrameParams);

    /// Dispatch one rectangular block range and block until the accelerator
    /// has finished it. Returns the measured wall-clock dispatch time.
    fn dispatch_tile(&mut self, region: BlockRegion) -> Result<Duration, DispatchError>;

    /// Recreate every surface whose size depends on the scaled viewport or
    /// the bounce depth.
    fn resize_surfaces(&mut self, extent: SurfaceExtent, resolution_scale: f32, bounce_depth: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_extent_truncates_to_whole_pixels() {
        let extent = SurfaceExtent::new(1280, 720);
        assert_eq!(extent.scaled(0.2), SurfaceExtent::new(256, 144));
        assert_eq!(extent.scaled(1.0), extent);
        assert_eq!(
            SurfaceExtent::new(333, 333).scaled(0.5),
            SurfaceExtent::new(166, 166)
        );
    }

    #[test]
    fn non_positive_scale_collapses_to_empty_extent() {
        let extent = SurfaceExtent::new(640, 480);
        assert!(extent.scaled(0.0).is_empty());
        assert!(extent.scaled(-1.0).is_empty());
        assert!(extent.scaled(f32::NAN).is_empty());
    }

    #[test]
    fn empty_extent_reports_empty_on_either_axis() {
        assert!(SurfaceExtent::new(0, 480).is_empty());
        assert!(SurfaceExtent::new(640, 0).is_empty());
        assert!(!SurfaceExtent::new(1, 1).is_empty());
    }

    #[test]
    fn block_region_counts_blocks() {
        let region = BlockRegion {
            block_x: 2,
            block_y: 3,
            blocks_wide: 4,
            blocks_high: 5,
        };
        assert_eq!(region.block_count(), 20);
    }
}
