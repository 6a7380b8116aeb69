//! Portal-frustum walk producing the set of sectors seen from a camera.

use std::collections::BTreeSet;

use log::trace;

use crate::api::NarrowphaseApi;
use crate::narrowphase::Narrowphase;
use crate::sectors::{Sector, SectorGraph};
use crate::types::*;

/// Sectors visible from `view`, in id order, plus traversal counters.
///
/// A camera outside every built sector sees nothing. Recursion depth is
/// bounded by the sector count, so a cycle of ever-equal frustums still ends.
pub fn visible_sectors(graph: &SectorGraph, view: &CameraView) -> (BTreeSet<SectorId>, VisibilityStats) {
    let mut walk = Walk {
        graph,
        visible: BTreeSet::new(),
        traversed: 0,
        max_depth: graph.len(),
    };
    if let Some(start) = graph.sector_at(view.pos) {
        walk.traverse(start, Frustum::from_view(view), None, 0);
    }
    let stats = VisibilityStats {
        sectors_traversed: walk.traversed,
        visible_sectors: walk.visible.len(),
    };
    trace!("visibility: {} traversed, {} visible", stats.sectors_traversed, stats.visible_sectors);
    (walk.visible, stats)
}

struct Walk<'a> {
    graph: &'a SectorGraph,
    visible: BTreeSet<SectorId>,
    traversed: usize,
    max_depth: usize,
}

impl Walk<'_> {
    fn traverse(&mut self, sector: &Sector, frustum: Frustum, from: Option<SectorId>, depth: usize) {
        self.visible.insert(sector.id);
        self.traversed += 1;
        if depth >= self.max_depth {
            return;
        }
        let graph = self.graph;
        for portal in &sector.portals {
            if Some(portal.to) == from {
                continue;
            }
            let Some(narrowed) = Narrowphase::frustum_through_portal(&frustum, portal.a, portal.b) else {
                continue;
            };
            if let Some(next) = graph.get(portal.to) {
                self.traverse(next, narrowed, Some(sector.id), depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::TileGrid;
    use glam::{IVec2, Vec2};
    use std::f32::consts::{FRAC_PI_2, PI};

    fn build(rows: &[&str], sector_size: i32) -> SectorGraph {
        let data: Vec<Vec<u32>> = rows
            .iter()
            .map(|r| r.chars().map(|c| u32::from(c == '.')).collect())
            .collect();
        let grid = TileGrid::from_rows("floor", 64.0, &data).unwrap();
        SectorGraph::build(&grid, &[], sector_size).unwrap()
    }

    fn open(n: usize) -> SectorGraph {
        let grid = TileGrid::from_rows("floor", 64.0, &vec![vec![1; n]; n]).unwrap();
        SectorGraph::build(&grid, &[], 4).unwrap()
    }

    fn id_at(graph: &SectorGraph, x: i32, y: i32) -> SectorId {
        graph.at_coord(IVec2::new(x, y)).unwrap().id
    }

    #[test]
    fn test_own_sector_always_visible() {
        let graph = open(10);
        for angle in [0.0, FRAC_PI_2, PI, -FRAC_PI_2, 2.5] {
            let view = CameraView::new(Vec2::new(100.0, 100.0), angle, FRAC_PI_2);
            let (set, stats) = visible_sectors(&graph, &view);
            assert!(set.contains(&id_at(&graph, 0, 0)), "angle {angle}");
            assert!(stats.sectors_traversed >= set.len());
            assert_eq!(stats.visible_sectors, set.len());
        }
    }

    #[test]
    fn test_disconnected_sector_excluded() {
        // Left and right blocks split by a solid column.
        let graph = build(
            &[
                "...#....",
                "...#....",
                "...#....",
                "...#....",
            ],
            4,
        );
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.stats().portals, 0);
        let view = CameraView::new(Vec2::new(64.0, 128.0), 0.0, FRAC_PI_2);
        let (set, _) = visible_sectors(&graph, &view);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![id_at(&graph, 0, 0)]);
    }

    #[test]
    fn test_repeated_queries_match() {
        let graph = open(12);
        let view = CameraView::new(Vec2::new(400.0, 350.0), 0.7, FRAC_PI_2);
        let (first, _) = visible_sectors(&graph, &view);
        for _ in 0..5 {
            assert_eq!(visible_sectors(&graph, &view).0, first);
        }
    }

    #[test]
    fn test_camera_outside_sees_nothing() {
        let graph = open(8);
        for pos in [Vec2::new(-10.0, 20.0), Vec2::new(20.0, 9000.0)] {
            let (set, stats) = visible_sectors(&graph, &CameraView::new(pos, 0.0, FRAC_PI_2));
            assert!(set.is_empty());
            assert_eq!(stats.sectors_traversed, 0);
        }
        let (set, _) = visible_sectors(&SectorGraph::default(), &CameraView::new(Vec2::ZERO, 0.0, 1.0));
        assert!(set.is_empty());
    }

    #[test]
    fn test_sectors_behind_camera_are_culled() {
        let graph = open(10);
        let view = CameraView::new(Vec2::new(320.0, 320.0), 0.0, FRAC_PI_2);
        let (set, _) = visible_sectors(&graph, &view);
        let own = id_at(&graph, 1, 1);
        assert!(set.contains(&own));
        assert!(set.len() > 1);
        for x in 0..3 {
            assert!(!set.contains(&id_at(&graph, 0, x)), "column 0 row {x} is behind the camera");
        }
        assert!(set.contains(&id_at(&graph, 2, 1)));
    }
}
