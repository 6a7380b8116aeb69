use glam::{IVec2, Vec2};

use std::collections::BTreeSet;

use crate::error::LoadError;
use crate::kinematics::Body;
use crate::level::{GeometryBatch, LevelData, Settings, TileInstance};
use crate::types::*;
use crate::world::{Commands, EntityRegistry, TickContext};

/// Tile grid that can sweep a box through itself.
pub trait CollisionMapApi {
    /// World units per tile.
    fn tilesize(&self) -> f32;

    /// Solid test for a tile coordinate; outside the grid is open space.
    fn is_solid(&self, tile: IVec2) -> bool;

    /// Move a `size` box with top-left corner `pos` by `vel`, stopping per
    /// axis at the first solid tile.
    fn trace(&self, pos: Vec2, vel: Vec2, size: Vec2) -> TraceResult;
}

/// Behaviour hooks a host entity type implements. Every hook defaults to a
/// no-op; variants override only what they need.
///
/// Hooks never see another entity mutably. Effects on the rest of the world
/// (spawns, damage) go through [`Commands`] and land at end of tick.
pub trait EntityBehavior {
    /// Per-tick logic, run before the body integrates.
    fn think(&mut self, _body: &mut Body, _ctx: &mut TickContext<'_>) {}

    /// `other`'s type matched this entity's `check_against` while overlapping.
    fn check(&mut self, _body: &mut Body, _other: &Body, _cmds: &mut Commands) {}

    /// Physically separated from `other` along `axis`.
    fn collide_with(&mut self, _body: &mut Body, _other: &Body, _axis: Axis, _cmds: &mut Commands) {}

    /// Every entity of a freshly loaded level exists.
    fn ready(&mut self, _body: &mut Body, _cmds: &mut Commands) {}

    /// Damage queued against this entity by another hook.
    fn receive_damage(&mut self, body: &mut Body, amount: f32, _from: Option<EntityId>) {
        body.health -= amount;
        if body.health <= 0.0 {
            body.kill();
        }
    }

    fn draw(&self, _body: &Body, _renderer: &mut dyn RenderSink) {}
}

/// External renderer fed by the world. The core never talks to a graphics API.
pub trait RenderSink {
    /// Static geometry of one visible sector.
    fn push_batch(&mut self, sector: SectorId, batch: &GeometryBatch);

    /// Convenience target for entity `draw` hooks.
    fn push_entity(&mut self, _body: &Body) {}
}

/// Static tile geometry that can be gathered per sector.
pub trait GeometryLayer {
    fn name(&self) -> &str;

    /// Append every tile instance belonging to the `size` rectangle at `origin`
    /// (tile coordinates).
    fn tiles_in_rect(&self, origin: IVec2, size: IVec2, out: &mut Vec<TileInstance>);
}

/// Primitive geometric tests shared by the pair solver and the visibility walk.
pub trait NarrowphaseApi {
    /// Strict overlap of two boxes given by top-left corner and size.
    fn overlap_aabb_aabb(p0: Vec2, s0: Vec2, p1: Vec2, s1: Vec2) -> bool;

    /// Strict overlap of two 1D ranges `[a, a + a_len)` and `[b, b + b_len)`.
    fn overlap_ranges(a: f32, a_len: f32, b: f32, b_len: f32) -> bool;

    /// Signed side of `p` against the ray from `origin` through `through`.
    fn side_of_ray(p: Vec2, origin: Vec2, through: Vec2) -> f32;

    /// Narrow `frustum` to the portal segment `a..b`, or `None` when the
    /// portal lies outside it.
    fn frustum_through_portal(frustum: &Frustum, a: Vec2, b: Vec2) -> Option<Frustum>;
}

/// Public contract of the simulation world.
pub trait WorldApi {
    fn new(cfg: WorldConfig) -> Self
    where
        Self: Sized;

    // --- Level lifecycle ---------------------------------------------------

    /// Replace the current level: build the collision map and sector graph,
    /// spawn every known entity descriptor, then call `ready` on each.
    fn load_level(&mut self, data: &LevelData, registry: &EntityRegistry) -> Result<(), LoadError>;

    /// Drop every entity, the collision map and the sector graph.
    fn clear_level(&mut self);

    /// Spawn through the registry. Unknown type names yield `None`.
    fn spawn(
        &mut self,
        registry: &EntityRegistry,
        type_name: &str,
        pos: Vec2,
        settings: &Settings,
    ) -> Option<EntityId>;

    // --- Frame -------------------------------------------------------------

    /// Integrate every live entity, resolve overlaps, apply queued commands
    /// and drop dead entities.
    fn step(&mut self, registry: &EntityRegistry, dt: f32);

    /// Sectors seen from `view`, in id order. Empty when the camera is
    /// outside every built sector.
    fn visible_sectors(&mut self, view: &CameraView) -> BTreeSet<SectorId>;

    /// Submit visible sector batches, then entity draw hooks.
    fn draw(&mut self, view: &CameraView, renderer: &mut dyn RenderSink);
}
