use glam::Vec2;

use crate::api::NarrowphaseApi;
use crate::types::*;

/// Primitive geometric tests.
pub struct Narrowphase;

impl NarrowphaseApi for Narrowphase {
    fn overlap_aabb_aabb(p0: Vec2, s0: Vec2, p1: Vec2, s1: Vec2) -> bool {
        Self::overlap_ranges(p0.x, s0.x, p1.x, s1.x) && Self::overlap_ranges(p0.y, s0.y, p1.y, s1.y)
    }

    fn overlap_ranges(a: f32, a_len: f32, b: f32, b_len: f32) -> bool {
        a < b + b_len && a + a_len > b
    }

    fn side_of_ray(p: Vec2, origin: Vec2, through: Vec2) -> f32 {
        (p.y - origin.y) * (through.x - origin.x) - (p.x - origin.x) * (through.y - origin.y)
    }

    fn frustum_through_portal(frustum: &Frustum, a: Vec2, b: Vec2) -> Option<Frustum> {
        let side = Self::side_of_ray;
        let o = frustum.origin;

        // Inside-ness of each endpoint against each boundary ray.
        let a_in1 = side(a, o, frustum.r1) > 0.0;
        let a_in2 = side(a, o, frustum.r2) < 0.0;
        let b_in1 = side(b, o, frustum.r1) > 0.0;
        let b_in2 = side(b, o, frustum.r2) < 0.0;

        // Plane through the apex parallel to the portal: tells whether the
        // portal sits on the same side as the frustum's first ray, which
        // separates "in front" from "wrapped behind the camera".
        let perp = o + (a - b);
        let portal_side = side(a, o, perp) > 0.0;
        let frustum_side = side(frustum.r1, o, perp) > 0.0;
        let front = if frustum_side { portal_side } else { !portal_side };

        let a_inside = a_in1 && a_in2;
        let b_inside = b_in1 && b_in2;
        if !(a_inside || b_inside || (front && (a_in1 || b_in1) && (a_in2 || b_in2))) {
            return None;
        }

        // Per endpoint, keep the portal corner when it is inside, otherwise
        // fall back to whichever incoming ray it spills past.
        let pick = |inside: bool, in1: bool, in2: bool| {
            if inside {
                None
            } else if !in1 && (in2 || front) {
                Some(frustum.r1)
            } else {
                Some(frustum.r2)
            }
        };
        let na = pick(a_inside, a_in1, a_in2).unwrap_or(a);
        let nb = pick(b_inside, b_in1, b_in2).unwrap_or(b);

        Some(if portal_side {
            Frustum { origin: o, r1: na, r2: nb }
        } else {
            Frustum { origin: o, r1: nb, r2: na }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn facing_east() -> Frustum {
        Frustum::from_view(&CameraView::new(Vec2::ZERO, 0.0, FRAC_PI_2))
    }

    fn inside(f: &Frustum, p: Vec2) -> bool {
        Narrowphase::side_of_ray(p, f.origin, f.r1) > 0.0
            && Narrowphase::side_of_ray(p, f.origin, f.r2) < 0.0
    }

    #[test]
    fn test_overlap_is_strict() {
        let s = Vec2::splat(10.0);
        assert!(Narrowphase::overlap_aabb_aabb(Vec2::ZERO, s, Vec2::new(9.0, 9.0), s));
        assert!(!Narrowphase::overlap_aabb_aabb(Vec2::ZERO, s, Vec2::new(10.0, 0.0), s));
        assert!(!Narrowphase::overlap_aabb_aabb(Vec2::ZERO, s, Vec2::new(0.0, -10.0), s));
    }

    #[test]
    fn test_side_of_ray_sign() {
        let o = Vec2::ZERO;
        let through = Vec2::X;
        assert!(Narrowphase::side_of_ray(Vec2::new(1.0, 1.0), o, through) > 0.0);
        assert!(Narrowphase::side_of_ray(Vec2::new(1.0, -1.0), o, through) < 0.0);
        assert_eq!(Narrowphase::side_of_ray(Vec2::new(5.0, 0.0), o, through), 0.0);
    }

    #[test]
    fn test_frustum_rays_bracket_the_view_axis() {
        let f = facing_east();
        assert!(inside(&f, Vec2::new(10.0, 0.0)));
        assert!(inside(&f, Vec2::new(10.0, 9.0)));
        assert!(!inside(&f, Vec2::new(10.0, 11.0)));
        assert!(!inside(&f, Vec2::new(-10.0, 0.0)));
    }

    #[test]
    fn test_portal_fully_inside_becomes_new_frustum() {
        let f = facing_east();
        let a = Vec2::new(10.0, -2.0);
        let b = Vec2::new(10.0, 3.0);
        let n = Narrowphase::frustum_through_portal(&f, a, b).unwrap();
        let mut rays = [n.r1, n.r2];
        rays.sort_by(|p, q| p.y.total_cmp(&q.y));
        assert_eq!(rays, [a, b]);
        assert!(inside(&n, Vec2::new(20.0, 0.0)));
        assert!(!inside(&n, Vec2::new(20.0, 8.0)));
    }

    #[test]
    fn test_portal_spilling_past_one_ray_keeps_that_ray() {
        let f = facing_east();
        let n = Narrowphase::frustum_through_portal(&f, Vec2::new(10.0, -30.0), Vec2::new(10.0, 3.0)).unwrap();
        // Narrowed view still sees points between the old ray and the corner.
        assert!(inside(&n, Vec2::new(100.0, -90.0)));
        assert!(inside(&n, Vec2::new(100.0, 20.0)));
        assert!(!inside(&n, Vec2::new(100.0, 40.0)));
    }

    #[test]
    fn test_portal_behind_camera_is_pruned() {
        let f = facing_east();
        assert!(Narrowphase::frustum_through_portal(&f, Vec2::new(-10.0, -5.0), Vec2::new(-10.0, 5.0)).is_none());
    }

    #[test]
    fn test_portal_outside_side_is_pruned() {
        let f = facing_east();
        assert!(Narrowphase::frustum_through_portal(&f, Vec2::new(5.0, 20.0), Vec2::new(15.0, 20.0)).is_none());
    }

    #[test]
    fn test_wide_portal_in_front_keeps_frustum() {
        let f = facing_east();
        let n = Narrowphase::frustum_through_portal(&f, Vec2::new(10.0, -100.0), Vec2::new(10.0, 100.0)).unwrap();
        for p in [Vec2::new(50.0, 0.0), Vec2::new(50.0, 45.0), Vec2::new(50.0, -45.0)] {
            assert!(inside(&n, p), "{p:?}");
        }
        assert!(!inside(&n, Vec2::new(50.0, 60.0)));
    }
}
