//! Solid/empty tile grid with swept box tracing.

use glam::{IVec2, Vec2};

use crate::api::CollisionMapApi;
use crate::error::LoadError;
use crate::level::TileGrid;
use crate::types::*;

/// Slack added to the displacement before deciding how many sub-steps to take,
/// so a move of exactly one tile is still subdivided.
const STEP_SLACK: f32 = 0.1;

/// Immutable tile grid; `0` is empty, anything else is solid.
#[derive(Clone, Debug)]
pub struct CollisionMap {
    grid: TileGrid,
}

impl CollisionMap {
    /// Build from rows of tile ids. Rows must share one width.
    pub fn new(tilesize: f32, rows: &[Vec<u32>]) -> Result<Self, LoadError> {
        Ok(Self::from_grid(TileGrid::from_rows("collision", tilesize, rows)?))
    }

    pub fn from_grid(grid: TileGrid) -> Self {
        Self { grid }
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    fn tile_of(&self, v: f32) -> i32 {
        (v / self.grid.tilesize()).floor() as i32
    }

    /// One sub-step. `start` is the position before this sub-step, `step_vel`
    /// its displacement, `first` marks the very first sub-step of a trace.
    fn trace_step(&self, res: &mut TraceResult, start: Vec2, step_vel: Vec2, size: Vec2, first: bool) {
        let ts = self.grid.tilesize();
        let (width, height) = (self.width(), self.height());
        res.pos += step_vel;

        if step_vel.x != 0.0 {
            let edge = if step_vel.x > 0.0 { size.x } else { 0.0 };
            let tile_offset = if step_vel.x < 0.0 { ts } else { 0.0 };
            let tile_x = self.tile_of(res.pos.x + edge);
            let skip = first && self.already_inside(start.x + edge, tile_x, step_vel.x);

            if !skip && tile_x >= 0 && (tile_x as usize) < width {
                let first_y = self.tile_of(start.y).max(0);
                let last_y = ((start.y + size.y) / ts).ceil().min(height as f32) as i32;
                for tile_y in first_y..last_y {
                    let t = IVec2::new(tile_x, tile_y);
                    if self.grid.is_set(t) {
                        res.collision.x = true;
                        res.tile = Some(t);
                        res.pos.x = tile_x as f32 * ts - edge + tile_offset;
                        break;
                    }
                }
            }
        }

        if step_vel.y != 0.0 {
            let edge = if step_vel.y > 0.0 { size.y } else { 0.0 };
            let tile_offset = if step_vel.y < 0.0 { ts } else { 0.0 };
            let tile_y = self.tile_of(res.pos.y + edge);
            let skip = first && self.already_inside(start.y + edge, tile_y, step_vel.y);

            if !skip && tile_y >= 0 && (tile_y as usize) < height {
                let first_x = self.tile_of(res.pos.x).max(0);
                let last_x = ((res.pos.x + size.x) / ts).ceil().min(width as f32) as i32;
                for tile_x in first_x..last_x {
                    let t = IVec2::new(tile_x, tile_y);
                    if self.grid.is_set(t) {
                        res.collision.y = true;
                        res.tile = Some(t);
                        res.pos.y = tile_y as f32 * ts - edge + tile_offset;
                        break;
                    }
                }
            }
        }
    }

    /// The leading edge already sat strictly inside the tile line it is now
    /// tested against. A flush edge is not inside, so resting against a wall
    /// still blocks.
    fn already_inside(&self, prev_edge: f32, tile: i32, dir: f32) -> bool {
        if self.tile_of(prev_edge) != tile {
            return false;
        }
        let ts = self.grid.tilesize();
        let near = tile as f32 * ts;
        if dir > 0.0 { prev_edge > near } else { prev_edge < near + ts }
    }
}

impl CollisionMapApi for CollisionMap {
    fn tilesize(&self) -> f32 {
        self.grid.tilesize()
    }

    fn is_solid(&self, tile: IVec2) -> bool {
        self.grid.is_set(tile)
    }

    fn trace(&self, pos: Vec2, vel: Vec2, size: Vec2) -> TraceResult {
        let mut res = TraceResult { pos, collision: CollisionFlags::default(), tile: None };
        let steps = ((vel.x.abs().max(vel.y.abs()) + STEP_SLACK) / self.tilesize()).ceil() as u32;

        if steps > 1 {
            let mut step_vel = vel / steps as f32;
            let mut start = pos;
            for i in 0..steps {
                if step_vel == Vec2::ZERO {
                    break;
                }
                self.trace_step(&mut res, start, step_vel, size, i == 0);
                start = res.pos;
                if res.collision.x {
                    step_vel.x = 0.0;
                }
                if res.collision.y {
                    step_vel.y = 0.0;
                }
                if res.collision.slope {
                    break;
                }
            }
        } else {
            self.trace_step(&mut res, pos, vel, size, true);
        }
        res
    }
}

/// Stand-in used before a level with a collision layer is loaded: every move
/// goes through.
#[derive(Copy, Clone, Debug)]
pub struct NoCollision {
    pub tilesize: f32,
}

impl Default for NoCollision {
    fn default() -> Self {
        Self { tilesize: 64.0 }
    }
}

impl CollisionMapApi for NoCollision {
    fn tilesize(&self) -> f32 {
        self.tilesize
    }

    fn is_solid(&self, _tile: IVec2) -> bool {
        false
    }

    fn trace(&self, pos: Vec2, vel: Vec2, _size: Vec2) -> TraceResult {
        TraceResult::open(pos, vel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: f32 = 64.0;

    /// 10x5 grid with a one-tile-thick wall at column 5.
    fn wall_map() -> CollisionMap {
        let rows: Vec<Vec<u32>> = (0..5)
            .map(|_| (0..10).map(|x| u32::from(x == 5)).collect())
            .collect();
        CollisionMap::new(TS, &rows).unwrap()
    }

    fn overlaps_solid(map: &CollisionMap, pos: Vec2, size: Vec2) -> bool {
        let x0 = (pos.x / TS).floor() as i32;
        let y0 = (pos.y / TS).floor() as i32;
        let x1 = ((pos.x + size.x) / TS).ceil() as i32;
        let y1 = ((pos.y + size.y) / TS).ceil() as i32;
        (y0..y1).any(|y| (x0..x1).any(|x| map.is_solid(IVec2::new(x, y))))
    }

    #[test]
    fn test_tunneling_is_prevented() {
        let map = wall_map();
        let size = Vec2::splat(32.0);
        let res = map.trace(Vec2::new(0.0, 64.0), Vec2::new(500.0, 0.0), size);
        assert!(res.collision.x);
        assert!(!res.collision.y);
        assert_eq!(res.pos.x, 5.0 * TS - size.x);
        assert_eq!(res.tile, Some(IVec2::new(5, 1)));
    }

    #[test]
    fn test_negative_direction_clamps_to_far_face() {
        let map = wall_map();
        let res = map.trace(Vec2::new(400.0, 64.0), Vec2::new(-40.0, 0.0), Vec2::splat(32.0));
        assert!(res.collision.x);
        assert_eq!(res.pos.x, 6.0 * TS);
    }

    #[test]
    fn test_flush_against_wall_stays_blocked() {
        let map = wall_map();
        let size = Vec2::splat(32.0);
        let flush = Vec2::new(5.0 * TS - size.x, 64.0);
        let res = map.trace(flush, Vec2::new(10.0, 0.0), size);
        assert!(res.collision.x);
        assert_eq!(res.pos, flush);
    }

    #[test]
    fn test_moving_away_from_wall_is_free() {
        let map = wall_map();
        let size = Vec2::splat(32.0);
        let flush = Vec2::new(5.0 * TS - size.x, 64.0);
        let res = map.trace(flush, Vec2::new(-10.0, 0.0), size);
        assert!(!res.collision.any());
        assert_eq!(res.pos.x, flush.x - 10.0);
    }

    #[test]
    fn test_blocked_axis_never_overlaps_solid() {
        let map = wall_map();
        let size = Vec2::new(20.0, 40.0);
        for i in 0..40 {
            let vx = -64.0 + i as f32 * 3.3;
            for start_x in [200.0, 250.0, 300.0, 390.0, 420.0] {
                let res = map.trace(Vec2::new(start_x, 10.0), Vec2::new(vx, 7.0), size);
                if res.collision.x {
                    let at = Vec2::new(res.pos.x, 10.0);
                    assert!(!overlaps_solid(&map, at, size), "vx={vx} start={start_x} res={res:?}");
                }
            }
        }
    }

    #[test]
    fn test_edge_inside_solid_column_moves_free() {
        let map = wall_map();
        // Leading edge at 362 already sits inside column 5 (320..384).
        let res = map.trace(Vec2::new(330.0, 64.0), Vec2::new(10.0, 0.0), Vec2::splat(32.0));
        assert!(!res.collision.any());
        assert_eq!(res.pos, Vec2::new(340.0, 64.0));
        assert_eq!(res.tile, None);
    }

    #[test]
    fn test_edge_inside_solid_row_moves_free() {
        let rows: Vec<Vec<u32>> = (0..4).map(|y| vec![u32::from(y == 3); 4]).collect();
        let map = CollisionMap::new(TS, &rows).unwrap();
        // Bottom edge at 202 already sits inside row 3 (192..256).
        let res = map.trace(Vec2::new(10.0, 170.0), Vec2::new(0.0, 10.0), Vec2::splat(32.0));
        assert!(!res.collision.any());
        assert_eq!(res.pos, Vec2::new(10.0, 180.0));
    }

    #[test]
    fn test_only_first_substep_skips_embedded_tile() {
        let thick: Vec<Vec<u32>> = (0..5)
            .map(|_| (0..10).map(|x| u32::from(x == 5 || x == 6)).collect())
            .collect();
        let map = CollisionMap::new(TS, &thick).unwrap();
        let size = Vec2::splat(32.0);
        // Two sub-steps of 60: the first starts inside column 5 and skips it,
        // the second reaches column 6 and is blocked.
        let res = map.trace(Vec2::new(290.0, 64.0), Vec2::new(120.0, 0.0), size);
        assert!(res.collision.x);
        assert_eq!(res.pos.x, 6.0 * TS - size.x);
        assert_eq!(res.tile, Some(IVec2::new(6, 1)));

        // With column 6 open the same move goes through.
        let res = wall_map().trace(Vec2::new(290.0, 64.0), Vec2::new(120.0, 0.0), size);
        assert!(!res.collision.any());
        assert_eq!(res.pos.x, 410.0);
    }

    #[test]
    fn test_vertical_uses_clamped_horizontal() {
        // Floor row 3, solid everywhere.
        let rows: Vec<Vec<u32>> = (0..4).map(|y| vec![u32::from(y == 3); 4]).collect();
        let map = CollisionMap::new(TS, &rows).unwrap();
        let res = map.trace(Vec2::new(10.0, 100.0), Vec2::new(5.0, 80.0), Vec2::splat(32.0));
        assert!(res.collision.y);
        assert!(!res.collision.x);
        assert_eq!(res.pos, Vec2::new(15.0, 3.0 * TS - 32.0));
    }

    #[test]
    fn test_outside_grid_is_open() {
        let map = wall_map();
        let res = map.trace(Vec2::new(-500.0, -500.0), Vec2::new(-30.0, -30.0), Vec2::splat(16.0));
        assert!(!res.collision.any());
        assert_eq!(res.pos, Vec2::new(-530.0, -530.0));
    }

    #[test]
    fn test_zero_velocity_is_unmoved() {
        let map = wall_map();
        let p = Vec2::new(12.0, 34.0);
        let res = map.trace(p, Vec2::ZERO, Vec2::splat(16.0));
        assert_eq!(res.pos, p);
        assert!(!res.collision.any());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![0, 0, 0], vec![0, 0]];
        let err = CollisionMap::new(TS, &rows).unwrap_err();
        assert_eq!(
            err,
            LoadError::RaggedGrid { layer: "collision".into(), row: 1, expected: 3, found: 2 }
        );
    }

    #[test]
    fn test_no_collision_passes_through() {
        let res = NoCollision::default().trace(Vec2::ZERO, Vec2::new(1000.0, -3.0), Vec2::ONE);
        assert_eq!(res.pos, Vec2::new(1000.0, -3.0));
        assert!(!res.collision.any());
    }
}
