//! Per-entity kinematic state and the per-tick integrator.
//!
//! Planar motion (x, y) is swept through the collision map; height (z) is a
//! free axis with a floor at `0` and no extent.

use glam::{Vec2, Vec3};
use serde_json::Value;

use crate::api::CollisionMapApi;
use crate::level::Settings;
use crate::types::*;

/// Kinematic and collision state of one entity.
#[derive(Clone, Debug)]
pub struct Body {
    pub id: EntityId,
    /// Top-left corner of the planar box plus height.
    pub pos: Vec3,
    pub vel: Vec3,
    pub accel: Vec3,
    pub max_vel: Vec3,
    /// Planar position before the current tick's move.
    pub last: Vec2,
    /// Planar box extent; z has none.
    pub size: Vec2,
    pub friction: Vec2,
    pub bounciness: f32,
    pub min_bounce_velocity: f32,
    pub gravity_factor: f32,
    pub groups: CollisionGroups,
    pub health: f32,
    /// Non-zero draws after the rest, ascending.
    pub z_index: i32,
    alive: bool,
}

impl Body {
    pub fn new(id: EntityId, pos: Vec2) -> Self {
        Self {
            id,
            pos: pos.extend(0.0),
            vel: Vec3::ZERO,
            accel: Vec3::ZERO,
            max_vel: Vec3::splat(10_000.0),
            last: pos,
            size: Vec2::splat(32.0),
            friction: Vec2::ZERO,
            bounciness: 0.0,
            min_bounce_velocity: 0.0,
            gravity_factor: 1.0,
            groups: CollisionGroups::default(),
            health: 10.0,
            z_index: 0,
            alive: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Mark dead. The body keeps its state until the world filters it out at
    /// the end of the tick.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    pub fn planar(&self) -> Vec2 {
        self.pos.truncate()
    }

    pub fn center(&self) -> Vec2 {
        self.planar() + self.size / 2.0
    }

    pub fn angle_to(&self, other: &Body) -> f32 {
        let d = other.center() - self.center();
        d.y.atan2(d.x)
    }

    pub fn distance_to(&self, other: &Body) -> f32 {
        self.center().distance(other.center())
    }

    /// Copy recognised keys from a level settings map onto the body.
    /// Unknown keys are left for the entity factory.
    pub fn apply_settings(&mut self, settings: &Settings) {
        let num = |key: &str| settings.get(key).and_then(Value::as_f64).map(|v| v as f32);
        if let Some(v) = num("health") {
            self.health = v;
        }
        if let Some(v) = num("bounciness") {
            self.bounciness = v;
        }
        if let Some(v) = num("minBounceVelocity") {
            self.min_bounce_velocity = v;
        }
        if let Some(v) = num("gravityFactor") {
            self.gravity_factor = v;
        }
        if let Some(v) = settings.get("zIndex").and_then(Value::as_i64) {
            self.z_index = v as i32;
        }
        if let Some(v) = settings.get("size").and_then(vec2_of) {
            self.size = v.max(Vec2::ZERO);
        }
        if let Some(v) = settings.get("friction").and_then(vec2_of) {
            self.friction = v;
        }
        if let Some(v) = settings.get("maxVel") {
            self.max_vel = vec3_of(v, self.max_vel);
        }
        if let Some(v) = settings.get("vel") {
            self.vel = vec3_of(v, self.vel);
        }
    }
}

fn vec2_of(v: &Value) -> Option<Vec2> {
    let x = v.get("x")?.as_f64()? as f32;
    let y = v.get("y")?.as_f64()? as f32;
    Some(Vec2::new(x, y))
}

/// Partial `{x, y, z}` objects override only the present components.
fn vec3_of(v: &Value, base: Vec3) -> Vec3 {
    let c = |k: &str, d: f32| v.get(k).and_then(Value::as_f64).map_or(d, |f| f as f32);
    Vec3::new(c("x", base.x), c("y", base.y), c("z", base.z))
}

/// New velocity along one axis.
///
/// Acceleration wins and clamps to `±max_vel`; otherwise friction decays the
/// magnitude toward zero without crossing it; otherwise the velocity is only
/// clamped.
pub fn new_velocity(vel: f32, accel: f32, friction: f32, max_vel: f32, dt: f32) -> f32 {
    if accel != 0.0 {
        (vel + accel * dt).clamp(-max_vel, max_vel)
    } else if friction != 0.0 {
        let delta = friction * dt;
        if vel - delta > 0.0 {
            vel - delta
        } else if vel + delta < 0.0 {
            vel + delta
        } else {
            0.0
        }
    } else {
        vel.clamp(-max_vel, max_vel)
    }
}

/// Reflect or stop a blocked axis.
pub fn bounce(vel: f32, bounciness: f32, min_bounce_velocity: f32) -> f32 {
    if bounciness > 0.0 && vel.abs() > min_bounce_velocity {
        -vel * bounciness
    } else {
        0.0
    }
}

/// Apply a planar trace result: bounce or stop blocked axes, then move.
pub fn handle_trace(body: &mut Body, res: &TraceResult) {
    if res.collision.x {
        body.vel.x = bounce(body.vel.x, body.bounciness, body.min_bounce_velocity);
    }
    if res.collision.y {
        body.vel.y = bounce(body.vel.y, body.bounciness, body.min_bounce_velocity);
    }
    body.pos.x = res.pos.x;
    body.pos.y = res.pos.y;
}

/// Advance one body by `dt` against `map`. Returns the trace result; the
/// caller decides whether the planar move needs a sector membership update.
pub fn integrate(body: &mut Body, map: &dyn CollisionMapApi, gravity: f32, dt: f32) -> TraceResult {
    body.last = body.planar();
    body.vel.z -= gravity * dt * body.gravity_factor;
    body.vel.x = new_velocity(body.vel.x, body.accel.x, body.friction.x, body.max_vel.x, dt);
    body.vel.y = new_velocity(body.vel.y, body.accel.y, body.friction.y, body.max_vel.y, dt);
    body.vel.z = new_velocity(body.vel.z, body.accel.z, 0.0, body.max_vel.z, dt);

    let motion = body.vel.truncate() * dt;
    let res = map.trace(body.planar(), motion, body.size);
    handle_trace(body, &res);

    body.pos.z += body.vel.z * dt;
    if body.pos.z < 0.0 {
        body.vel.z = bounce(body.vel.z, body.bounciness, body.min_bounce_velocity);
        body.pos.z = 0.0;
    }
    res
}

/// A unit box traced between the two centres hits nothing.
pub fn line_of_sight(map: &dyn CollisionMapApi, from: &Body, to: &Body) -> bool {
    let start = from.center();
    let res = map.trace(start, to.center() - start, Vec2::ONE);
    !res.collision.x && !res.collision.y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision_map::{CollisionMap, NoCollision};
    use approx::assert_relative_eq;
    use glam::IVec2;
    use rstest::rstest;

    fn body_at(x: f32, y: f32) -> Body {
        Body::new(EntityId::default(), Vec2::new(x, y))
    }

    /// Open 8x8 room with a solid column at x = 4.
    fn room() -> CollisionMap {
        let rows: Vec<Vec<u32>> = (0..8)
            .map(|_| (0..8).map(|x| u32::from(x == 4)).collect())
            .collect();
        CollisionMap::new(64.0, &rows).unwrap()
    }

    #[rstest]
    #[case::accel_clamps(5.0, 100.0, 0.0, 10.0, 1.0, 10.0)]
    #[case::accel_clamps_negative(-5.0, -100.0, 0.0, 10.0, 1.0, -10.0)]
    #[case::friction_decays(5.0, 0.0, 2.0, 10.0, 1.0, 3.0)]
    #[case::friction_stops_at_zero(1.0, 0.0, 2.0, 10.0, 1.0, 0.0)]
    #[case::friction_negative(-5.0, 0.0, 2.0, 10.0, 0.5, -4.0)]
    #[case::plain_clamp(50.0, 0.0, 0.0, 10.0, 1.0, 10.0)]
    #[case::untouched(3.0, 0.0, 0.0, 10.0, 1.0, 3.0)]
    fn test_velocity_rules(
        #[case] vel: f32,
        #[case] accel: f32,
        #[case] friction: f32,
        #[case] max_vel: f32,
        #[case] dt: f32,
        #[case] expected: f32,
    ) {
        assert_relative_eq!(new_velocity(vel, accel, friction, max_vel, dt), expected);
    }

    #[test]
    fn test_velocity_unchanged_without_accel_or_friction() {
        let map = NoCollision::default();
        let mut b = body_at(0.0, 0.0);
        b.gravity_factor = 0.0;
        b.vel = Vec3::new(12.5, -3.0, 0.0);
        for dt in [0.016, 0.5, 0.001, 1.0, 0.033] {
            integrate(&mut b, &map, 4.0, dt);
        }
        assert_eq!(b.vel, Vec3::new(12.5, -3.0, 0.0));
    }

    #[rstest]
    #[case::rebounds(10.0, -8.0)]
    #[case::stops_below_threshold(0.3, 0.0)]
    fn test_wall_bounce(#[case] speed: f32, #[case] expected: f32) {
        let map = room();
        // Right edge flush with the wall face.
        let mut b = body_at(4.0 * 64.0 - 32.0, 64.0);
        b.bounciness = 0.8;
        b.min_bounce_velocity = 0.5;
        b.gravity_factor = 0.0;
        b.vel.x = speed;
        let res = integrate(&mut b, &map, 0.0, 1.0);
        assert!(res.collision.x);
        assert_eq!(res.tile, Some(IVec2::new(4, 1)));
        assert_relative_eq!(b.vel.x, expected);
        assert_relative_eq!(b.pos.x, 4.0 * 64.0 - 32.0);
    }

    #[test]
    fn test_gravity_and_floor() {
        let map = NoCollision::default();
        let mut b = body_at(0.0, 0.0);
        b.pos.z = 1.0;
        integrate(&mut b, &map, 4.0, 0.5);
        // vz = -2, z = 1 - 1 = 0
        assert_relative_eq!(b.vel.z, -2.0);
        assert_relative_eq!(b.pos.z, 0.0);

        integrate(&mut b, &map, 4.0, 0.5);
        assert_eq!(b.pos.z, 0.0);
        assert_eq!(b.vel.z, 0.0);
    }

    #[test]
    fn test_bouncy_floor_reflects_vz() {
        let map = NoCollision::default();
        let mut b = body_at(0.0, 0.0);
        b.bounciness = 0.5;
        b.vel.z = -10.0;
        integrate(&mut b, &map, 0.0, 1.0);
        assert_eq!(b.pos.z, 0.0);
        assert_relative_eq!(b.vel.z, 5.0);
    }

    #[test]
    fn test_last_records_pre_move_position() {
        let map = NoCollision::default();
        let mut b = body_at(10.0, 20.0);
        b.vel.x = 6.0;
        integrate(&mut b, &map, 0.0, 0.5);
        assert_eq!(b.last, Vec2::new(10.0, 20.0));
        assert_eq!(b.planar(), Vec2::new(13.0, 20.0));
    }

    #[test]
    fn test_settings_override_known_keys() {
        let mut b = body_at(0.0, 0.0);
        let settings: Settings = serde_json::from_str(
            r#"{"health": 3, "size": {"x": 8, "y": 16}, "maxVel": {"z": 1}, "zIndex": 2, "weapon": "rocket"}"#,
        )
        .unwrap();
        b.apply_settings(&settings);
        assert_eq!(b.health, 3.0);
        assert_eq!(b.size, Vec2::new(8.0, 16.0));
        assert_eq!(b.max_vel, Vec3::new(10_000.0, 10_000.0, 1.0));
        assert_eq!(b.z_index, 2);
    }

    #[test]
    fn test_sight_is_blocked_by_wall() {
        let map = room();
        let a = body_at(64.0, 64.0);
        let behind = body_at(6.0 * 64.0, 64.0);
        let beside = body_at(64.0, 5.0 * 64.0);
        assert!(!line_of_sight(&map, &a, &behind));
        assert!(line_of_sight(&map, &a, &beside));
        assert_relative_eq!(a.distance_to(&beside), 4.0 * 64.0);
        assert_relative_eq!(a.angle_to(&beside), std::f32::consts::FRAC_PI_2);
    }
}
