use glam::{IVec2, Vec2};
use serde::Deserialize;

/// Per-axis collision flags reported by a swept trace.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollisionFlags {
    pub x: bool,
    pub y: bool,
    /// Reserved; no traced path sets it.
    pub slope: bool,
}

impl CollisionFlags {
    pub fn any(self) -> bool {
        self.x || self.y || self.slope
    }
}

/// Result of a swept box trace through the tile grid.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TraceResult {
    /// Final top-left corner of the box.
    pub pos: Vec2,
    pub collision: CollisionFlags,
    /// Tile coordinate of the last solid tile that stopped the box.
    pub tile: Option<IVec2>,
}

impl TraceResult {
    /// Unobstructed move: the box lands at `pos + vel`.
    pub fn open(pos: Vec2, vel: Vec2) -> Self {
        Self { pos: pos + vel, collision: CollisionFlags::default(), tile: None }
    }
}

/// Separation axis used by the pair solver and reported to `collide_with`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// Physical collision category. Discriminants are the weights summed by the
/// pair solver against the `Active` threshold.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Collides {
    #[default]
    Never = 0,
    Lite = 1,
    Passive = 2,
    Active = 4,
    Fixed = 8,
}

impl Collides {
    pub fn weight(self) -> u8 {
        self as u8
    }
}

/// Entity type bits matched against another entity's `check_against`.
pub mod kind {
    pub const NONE: u32 = 0;
    /// Player side.
    pub const A: u32 = 1;
    /// Enemies and destructibles.
    pub const B: u32 = 2;
}

/// Bitmask-based pair filtering plus the physical category.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollisionGroups {
    /// Type bits this entity belongs to.
    pub kind: u32,
    /// Type bits whose overlap triggers this entity's `check` hook.
    pub check_against: u32,
    pub collides: Collides,
}

impl CollisionGroups {
    pub fn new(kind: u32, check_against: u32, collides: Collides) -> Self {
        Self { kind, check_against, collides }
    }

    /// `self` wants a `check` callback when overlapping `other`.
    pub fn checks(self, other: CollisionGroups) -> bool {
        (self.check_against & other.kind) != 0
    }

    /// Both sides take part in physical separation.
    ///
    /// Requires two non-`Never` categories whose weights sum past `Active`.
    /// Two `Fixed` bodies never move each other.
    pub fn separates(self, other: CollisionGroups) -> bool {
        let (a, b) = (self.collides, other.collides);
        if a == Collides::Never || b == Collides::Never {
            return false;
        }
        if a == Collides::Fixed && b == Collides::Fixed {
            return false;
        }
        a.weight() + b.weight() > Collides::Active.weight()
    }
}

slotmap::new_key_type! {
    /// Generational entity handle. A removed entity's handle never resolves
    /// to a later entity reusing its slot.
    pub struct EntityId;
}

/// Sequential sector id, assigned in creation order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectorId(pub u32);

/// Camera parameters used by the visibility traversal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraView {
    pub pos: Vec2,
    /// Facing angle in radians on the grid plane.
    pub angle: f32,
    /// Horizontal field of view in radians.
    pub fov: f32,
}

impl CameraView {
    pub fn new(pos: Vec2, angle: f32, fov: f32) -> Self {
        Self { pos, angle, fov }
    }

    /// Build a view from a renderer yaw (rotation about the vertical axis)
    /// and a horizontal field of view in degrees.
    pub fn from_yaw(pos: Vec2, yaw: f32, fov_deg: f32) -> Self {
        Self {
            pos,
            angle: -yaw - std::f32::consts::FRAC_PI_2,
            fov: fov_deg.to_radians(),
        }
    }
}

/// 2D view frustum: the apex plus one point on each boundary ray.
///
/// `r1` lies on the ray at `angle - fov/2`, `r2` on the ray at
/// `angle + fov/2`. Only the ray directions matter.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    pub origin: Vec2,
    pub r1: Vec2,
    pub r2: Vec2,
}

impl Frustum {
    pub fn from_view(view: &CameraView) -> Self {
        let half = view.fov / 2.0;
        let (a1, a2) = (view.angle - half, view.angle + half);
        Self {
            origin: view.pos,
            r1: view.pos + Vec2::new(a1.cos(), a1.sin()),
            r2: view.pos + Vec2::new(a2.cos(), a2.sin()),
        }
    }
}

/// World-level configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Downward acceleration applied to `vel.z`, scaled per entity.
    pub gravity: f32,
    /// Frame duration used by `step_default`, in seconds.
    pub tick: f32,
    /// Sector edge length in tiles.
    pub sector_size: i32,
    pub horizontal_fov_deg: f32,
    /// Enable internal timing instrumentation (adds small overhead when true).
    pub enable_timing: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: 4.0,
            tick: 1.0 / 60.0,
            sector_size: 4,
            horizontal_fov_deg: 75.0,
            enable_timing: false,
        }
    }
}

/// Counters for the last completed frame.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameStats {
    pub live_entities: usize,
    /// Pairs whose boxes overlapped and had a check or collide relation.
    pub overlapping_pairs: usize,
    pub separations: usize,
    pub spawned: usize,
    pub removed: usize,
}

/// Counters for the last visibility query.
#[derive(Copy, Clone, Debug, Default)]
pub struct VisibilityStats {
    pub sectors_traversed: usize,
    pub visible_sectors: usize,
}

/// Timing breakdown for the last completed frame operations.
#[derive(Copy, Clone, Debug, Default)]
pub struct FrameTiming {
    pub step_ms: f64,
    pub integrate_ms: f64,
    pub solve_ms: f64,
    pub commands_ms: f64,
    pub visibility_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separation_threshold() {
        let g = |c| CollisionGroups::new(kind::NONE, kind::NONE, c);
        assert!(!g(Collides::Passive).separates(g(Collides::Passive)));
        assert!(!g(Collides::Lite).separates(g(Collides::Passive)));
        assert!(g(Collides::Lite).separates(g(Collides::Active)));
        assert!(g(Collides::Passive).separates(g(Collides::Active)));
        assert!(g(Collides::Active).separates(g(Collides::Active)));
        assert!(g(Collides::Lite).separates(g(Collides::Fixed)));
        assert!(!g(Collides::Fixed).separates(g(Collides::Fixed)));
        assert!(!g(Collides::Never).separates(g(Collides::Fixed)));
    }

    #[test]
    fn test_check_is_asymmetric() {
        let player = CollisionGroups::new(kind::A, kind::NONE, Collides::Passive);
        let pickup = CollisionGroups::new(kind::NONE, kind::A, Collides::Never);
        assert!(pickup.checks(player));
        assert!(!player.checks(pickup));
    }

    #[test]
    fn test_from_yaw_turns_quarter() {
        let v = CameraView::from_yaw(Vec2::ZERO, 0.0, 90.0);
        assert!((v.angle + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((v.fov - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
