//! Pairwise overlap pass run once per tick after every body has integrated.
//!
//! Full O(n²) scan over live entities; levels hold tens of entities.

use slotmap::SlotMap;

use crate::api::{CollisionMapApi, NarrowphaseApi};
use crate::kinematics::Body;
use crate::narrowphase::Narrowphase;
use crate::types::*;
use crate::world::{Commands, Entity};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    pub overlapping_pairs: usize,
    pub separations: usize,
}

/// Dispatch `check` hooks and separate physically colliding pairs.
///
/// Dead entities are skipped. An entity killed by a hook mid-pass stops
/// taking part in further pairs.
pub fn resolve_tick(
    entities: &mut SlotMap<EntityId, Entity>,
    map: &dyn CollisionMapApi,
    cmds: &mut Commands,
) -> SolveStats {
    let mut stats = SolveStats::default();
    let ids: Vec<EntityId> = entities.keys().collect();

    for (i, &ia) in ids.iter().enumerate() {
        for &ib in &ids[i + 1..] {
            let Some([a, b]) = entities.get_disjoint_mut([ia, ib]) else {
                continue;
            };
            if !a.body.is_alive() {
                break;
            }
            if !b.body.is_alive() {
                continue;
            }

            let (ga, gb) = (a.body.groups, b.body.groups);
            let a_checks = ga.checks(gb);
            let b_checks = gb.checks(ga);
            let collide = ga.separates(gb);
            if !(a_checks || b_checks || collide) {
                continue;
            }
            if !Narrowphase::overlap_aabb_aabb(a.body.planar(), a.body.size, b.body.planar(), b.body.size) {
                continue;
            }
            stats.overlapping_pairs += 1;

            if a_checks {
                a.behavior.check(&mut a.body, &b.body, cmds);
            }
            if b_checks {
                b.behavior.check(&mut b.body, &a.body, cmds);
            }

            if collide {
                let axis = solve_pair(&mut a.body, &mut b.body, map);
                stats.separations += 1;
                a.behavior.collide_with(&mut a.body, &b.body, axis, cmds);
                b.behavior.collide_with(&mut b.body, &a.body, axis, cmds);
            }
        }
    }
    stats
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Weak {
    First,
    Second,
}

/// Separate two overlapping bodies and return the axis used.
///
/// The axis comes from the pre-tick positions: bodies whose last x-ranges
/// overlapped approached vertically and separate on Y, all others on X.
pub fn solve_pair(a: &mut Body, b: &mut Body, map: &dyn CollisionMapApi) -> Axis {
    let (ca, cb) = (a.groups.collides, b.groups.collides);
    let a_weak = ca == Collides::Lite || cb == Collides::Fixed;
    let b_weak = !a_weak && (cb == Collides::Lite || ca == Collides::Fixed);

    let axis = if Narrowphase::overlap_ranges(a.last.x, a.size.x, b.last.x, b.size.x) {
        Axis::Y
    } else {
        Axis::X
    };
    let i = match axis {
        Axis::X => 0,
        Axis::Y => 1,
    };

    // `first` is the body that sat nearer the origin on the axis.
    let a_first = a.last[i] < b.last[i];
    let (first, second) = if a_first { (a, b) } else { (b, a) };
    let weak = match (a_weak, b_weak) {
        (true, _) => Some(if a_first { Weak::First } else { Weak::Second }),
        (_, true) => Some(if a_first { Weak::Second } else { Weak::First }),
        _ => None,
    };
    separate(first, second, i, weak, map);
    axis
}

fn separate(first: &mut Body, second: &mut Body, i: usize, weak: Option<Weak>, map: &dyn CollisionMapApi) {
    let nudge = first.pos[i] + first.size[i] - second.pos[i];

    let Some(weak) = weak else {
        let v2 = (first.vel[i] - second.vel[i]) / 2.0;
        first.vel[i] = -v2;
        second.vel[i] = v2;
        first.pos[i] = nudge_along(first, i, -nudge / 2.0, map).floor();
        second.pos[i] = nudge_along(second, i, nudge / 2.0, map).ceil();
        return;
    };

    let (weak_body, strong_vel, dir) = match weak {
        Weak::First => (first, second.vel[i], -1.0),
        Weak::Second => (second, first.vel[i], 1.0),
    };
    weak_body.vel[i] = -weak_body.vel[i] * weak_body.bounciness + strong_vel;
    weak_body.pos[i] = nudge_along(weak_body, i, dir * nudge, map);
}

/// Trace `body` by `amount` along axis `i` and return the new coordinate on
/// that axis.
fn nudge_along(body: &Body, i: usize, amount: f32, map: &dyn CollisionMapApi) -> f32 {
    let mut motion = glam::Vec2::ZERO;
    motion[i] = amount;
    map.trace(body.planar(), motion, body.size).pos[i]
}
