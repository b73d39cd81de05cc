//! Adaptive tile scheduling over the work-block grid.
//!
//! The scheduler turns the scaled viewport into a grid of fixed-size work
//! blocks and builds, once per accumulation pass, an ordered queue of
//! rectangular tiles that covers the grid exactly. The first pass of a
//! static render uses small fixed tiles to collect a cost sample for every
//! block; later passes grow tiles greedily from the measured per-block
//! times until each tile's predicted cost approaches the frame budget.

use render_protocol::{BLOCK_SIZE, BlockRegion, SurfaceExtent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    blocks_x: u32,
    blocks_y: u32,
}

impl BlockGrid {
    pub fn new(blocks_x: u32, blocks_y: u32) -> Self {
        Self { blocks_x, blocks_y }
    }

    /// Grid covering the viewport as rendered at the given resolution
    /// scale. A zero-sized scaled viewport yields a degenerate grid.
    pub fn from_scaled_surface(extent: SurfaceExtent, resolution_scale: f32) -> Self {
        let scaled = extent.scaled(resolution_scale);
        Self {
            blocks_x: scaled.width.div_ceil(BLOCK_SIZE),
            blocks_y: scaled.height.div_ceil(BLOCK_SIZE),
        }
    }

    pub fn blocks_x(self) -> u32 {
        self.blocks_x
    }

    pub fn blocks_y(self) -> u32 {
        self.blocks_y
    }

    pub fn block_count(self) -> usize {
        self.blocks_x as usize * self.blocks_y as usize
    }

    pub fn is_degenerate(self) -> bool {
        self.blocks_x == 0 || self.blocks_y == 0
    }

    pub fn block_index(self, block_x: u32, block_y: u32) -> usize {
        debug_assert!(
            block_x < self.blocks_x && block_y < self.blocks_y,
            "block ({block_x}, {block_y}) outside grid {}x{}",
            self.blocks_x,
            self.blocks_y
        );
        block_y as usize * self.blocks_x as usize + block_x as usize
    }
}

/// One scheduled unit of kernel work, in block units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTile {
    pub block_x: u32,
    pub block_y: u32,
    pub blocks_wide: u32,
    pub blocks_high: u32,
    /// Predicted dispatch cost: the sum of the last-measured times of the
    /// blocks accumulated while growing. Zero for bootstrap and
    /// full-surface tiles.
    pub estimated_time_ms: f32,
}

impl RenderTile {
    pub fn block_area(&self) -> u32 {
        self.blocks_wide * self.blocks_high
    }

    pub fn region(&self) -> BlockRegion {
        BlockRegion {
            block_x: self.block_x,
            block_y: self.block_y,
            blocks_wide: self.blocks_wide,
            blocks_high: self.blocks_high,
        }
    }

    fn overlaps(&self, block_x: u32, block_y: u32, blocks_wide: u32, blocks_high: u32) -> bool {
        let horizontal =
            self.block_x < block_x + blocks_wide && self.block_x + self.blocks_wide > block_x;
        let vertical =
            self.block_y < block_y + blocks_high && self.block_y + self.blocks_high > block_y;
        horizontal && vertical
    }
}

/// True when the one-block-high row `[block_x, block_x + blocks_wide) x
/// [block_y, block_y + 1)` lies inside the grid and no committed tile
/// overlaps it.
pub fn row_is_free(
    committed: &[RenderTile],
    block_x: u32,
    block_y: u32,
    blocks_wide: u32,
    grid: BlockGrid,
) -> bool {
    if block_y >= grid.blocks_y() {
        return false;
    }
    committed
        .iter()
        .all(|tile| !tile.overlaps(block_x, block_y, blocks_wide, 1))
}

/// True when the one-block-wide column `[block_x, block_x + 1) x
/// [block_y, block_y + blocks_high)` lies inside the grid and no committed
/// tile overlaps it.
pub fn column_is_free(
    committed: &[RenderTile],
    block_x: u32,
    block_y: u32,
    blocks_high: u32,
    grid: BlockGrid,
) -> bool {
    if block_x >= grid.blocks_x() {
        return false;
    }
    committed
        .iter()
        .all(|tile| !tile.overlaps(block_x, block_y, 1, blocks_high))
}

/// First block, in row-major scan order, not covered by any committed tile.
///
/// Linear probe over the committed-rectangle list, O(blocks x tiles) per
/// pass; fine for grids of tens to low hundreds of blocks per axis.
pub fn find_open_block(committed: &[RenderTile], grid: BlockGrid) -> Option<(u32, u32)> {
    for block_y in 0..grid.blocks_y() {
        for block_x in 0..grid.blocks_x() {
            let occupied = committed
                .iter()
                .any(|tile| tile.overlaps(block_x, block_y, 1, 1));
            if !occupied {
                return Some((block_x, block_y));
            }
        }
    }
    None
}

/// Last-measured dispatch time per block, in milliseconds. Entries stay
/// zero until the block has been dispatched at least once; the table is
/// recreated (and zeroed) whenever the grid changes.
#[derive(Debug, Clone)]
pub struct BlockTimeTable {
    grid: BlockGrid,
    times_ms: Vec<f32>,
}

impl BlockTimeTable {
    pub fn new(grid: BlockGrid) -> Self {
        Self {
            grid,
            times_ms: vec![0.0; grid.block_count()],
        }
    }

    pub fn grid(&self) -> BlockGrid {
        self.grid
    }

    pub fn reset(&mut self, grid: BlockGrid) {
        self.grid = grid;
        self.times_ms.clear();
        self.times_ms.resize(grid.block_count(), 0.0);
    }

    /// Distribute one tile's measured dispatch time evenly over the blocks
    /// it covers, overwriting their entries. The table always holds the
    /// most recent sample, not an average.
    pub fn record_tile_time(&mut self, tile: &RenderTile, dispatch_ms: f32) {
        let per_block_ms = dispatch_ms / tile.block_area() as f32;
        for row in 0..tile.blocks_high {
            for column in 0..tile.blocks_wide {
                let index = self
                    .grid
                    .block_index(tile.block_x + column, tile.block_y + row);
                self.times_ms[index] = per_block_ms;
            }
        }
    }

    pub fn block_time_ms(&self, block_x: u32, block_y: u32) -> f32 {
        self.times_ms[self.grid.block_index(block_x, block_y)]
    }

    /// Predicted cost of the row `[block_x, block_x + blocks_wide) x
    /// [block_y, block_y + 1)`.
    pub fn row_time_ms(&self, block_x: u32, block_y: u32, blocks_wide: u32) -> f32 {
        (0..blocks_wide)
            .map(|column| self.block_time_ms(block_x + column, block_y))
            .sum()
    }

    /// Predicted cost of the column `[block_x, block_x + 1) x
    /// [block_y, block_y + blocks_high)`.
    pub fn column_time_ms(&self, block_x: u32, block_y: u32, blocks_high: u32) -> f32 {
        (0..blocks_high)
            .map(|row| self.block_time_ms(block_x, block_y + row))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSchedulerConfig {
    /// Per-frame dispatch budget; tile growth keeps predicted cost strictly
    /// below this.
    pub render_budget_ms: f32,
    /// Side length, in blocks, of the fixed tiles used on the first
    /// accumulation pass.
    pub bootstrap_tile_blocks: u32,
}

impl Default for TileSchedulerConfig {
    fn default() -> Self {
        Self {
            render_budget_ms: 15.0,
            bootstrap_tile_blocks: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TileScheduleInput<'a> {
    pub grid: BlockGrid,
    pub block_times: &'a BlockTimeTable,
    pub dynamic_mode: bool,
    pub accumulation_frame: u32,
}

#[derive(Debug, Clone)]
pub struct TileScheduler {
    config: TileSchedulerConfig,
}

impl TileScheduler {
    pub fn new(config: TileSchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> TileSchedulerConfig {
        self.config
    }

    /// Build one full-coverage tile queue for the current frame. The queue
    /// is consumed front to back by the executor; tiles never overlap and
    /// together cover the grid exactly.
    pub fn build_queue(&self, input: TileScheduleInput<'_>) -> Vec<RenderTile> {
        if input.grid.is_degenerate() {
            return Vec::new();
        }
        if input.dynamic_mode {
            return Self::full_surface_pass(input.grid);
        }
        if input.accumulation_frame == 0 {
            return self.bootstrap_pass(input.grid);
        }
        self.adaptive_pass(input.grid, input.block_times)
    }

    /// Dynamic mode: one tile spanning the whole grid, no measurement.
    fn full_surface_pass(grid: BlockGrid) -> Vec<RenderTile> {
        vec![RenderTile {
            block_x: 0,
            block_y: 0,
            blocks_wide: grid.blocks_x(),
            blocks_high: grid.blocks_y(),
            estimated_time_ms: 0.0,
        }]
    }

    /// First accumulation pass: fixed-size chunks in row-major order,
    /// clipped at the grid edges, so every block gets one cost sample.
    fn bootstrap_pass(&self, grid: BlockGrid) -> Vec<RenderTile> {
        let side = self.config.bootstrap_tile_blocks.max(1);
        let mut tiles = Vec::new();
        let mut block_y = 0;
        while block_y < grid.blocks_y() {
            let blocks_high = side.min(grid.blocks_y() - block_y);
            let mut block_x = 0;
            while block_x < grid.blocks_x() {
                let blocks_wide = side.min(grid.blocks_x() - block_x);
                tiles.push(RenderTile {
                    block_x,
                    block_y,
                    blocks_wide,
                    blocks_high,
                    estimated_time_ms: 0.0,
                });
                block_x += blocks_wide;
            }
            block_y += blocks_high;
        }
        tiles
    }

    /// Later passes: seed a 1x1 tile at the first free block, grow it
    /// against the measured cost table, commit, repeat until the grid is
    /// covered. Every tile only ever claims previously free space, so the
    /// result tiles the grid without gaps or overlaps by construction.
    fn adaptive_pass(&self, grid: BlockGrid, block_times: &BlockTimeTable) -> Vec<RenderTile> {
        let mut tiles = Vec::new();
        while let Some((block_x, block_y)) = find_open_block(&tiles, grid) {
            let mut tile = RenderTile {
                block_x,
                block_y,
                blocks_wide: 1,
                blocks_high: 1,
                estimated_time_ms: 0.0,
            };
            self.grow_tile(&mut tile, &tiles, grid, block_times);
            tiles.push(tile);
        }
        tiles
    }

    /// Greedy growth: each iteration first tries to claim one more block
    /// row below the tile's full width, then independently one more block
    /// column to the right along its full current height. An extension is
    /// accepted only while the predicted total stays strictly below the
    /// budget; both directions may be accepted in the same iteration.
    fn grow_tile(
        &self,
        tile: &mut RenderTile,
        committed: &[RenderTile],
        grid: BlockGrid,
        block_times: &BlockTimeTable,
    ) {
        let budget_ms = self.config.render_budget_ms;
        while tile.estimated_time_ms < budget_ms {
            let mut grew = false;

            if row_is_free(
                committed,
                tile.block_x,
                tile.block_y + tile.blocks_high,
                tile.blocks_wide,
                grid,
            ) {
                let row_ms = block_times.row_time_ms(
                    tile.block_x,
                    tile.block_y + tile.blocks_high,
                    tile.blocks_wide,
                );
                if tile.estimated_time_ms + row_ms < budget_ms {
                    tile.blocks_high += 1;
                    tile.estimated_time_ms += row_ms;
                    grew = true;
                }
            }

            if column_is_free(
                committed,
                tile.block_x + tile.blocks_wide,
                tile.block_y,
                tile.blocks_high,
                grid,
            ) {
                let column_ms = block_times.column_time_ms(
                    tile.block_x + tile.blocks_wide,
                    tile.block_y,
                    tile.blocks_high,
                );
                if tile.estimated_time_ms + column_ms < budget_ms {
                    tile.blocks_wide += 1;
                    tile.estimated_time_ms += column_ms;
                    grew = true;
                }
            }

            if !grew {
                break;
            }
        }
    }
}

impl Default for TileScheduler {
    fn default() -> Self {
        Self::new(TileSchedulerConfig::default())
    }
}
