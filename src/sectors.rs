//! Fixed-size sector partition of the tile grid, linked by portals.
//!
//! Sectors live in one flat `Vec` indexed by `SectorId`; portals name their
//! neighbour by id, so the graph holds no reference cycles.

use std::collections::{BTreeSet, HashMap};

use glam::{IVec2, Vec2};
use log::debug;

use crate::api::GeometryLayer;
use crate::error::LoadError;
use crate::level::{GeometryBatch, TileGrid};
use crate::types::*;

/// Visibility edge into a neighbouring sector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Portal {
    /// World-space endpoints; identical in both mirrored copies.
    pub a: Vec2,
    pub b: Vec2,
    pub to: SectorId,
}

#[derive(Clone, Debug)]
pub struct Sector {
    pub id: SectorId,
    /// Sector grid coordinate.
    pub coord: IVec2,
    pub portals: Vec<Portal>,
    pub geometry: GeometryBatch,
    entities: BTreeSet<EntityId>,
}

impl Sector {
    /// Entities currently positioned inside, in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains(&id)
    }
}

/// Debug statistics for a built graph.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub sectors: usize,
    /// Bidirectional portals (each stored twice).
    pub portals: usize,
    pub geometry_tiles: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SectorGraph {
    sector_size: i32,
    tilesize: f32,
    sectors: Vec<Sector>,
    by_coord: HashMap<IVec2, SectorId>,
    portal_count: usize,
}

impl SectorGraph {
    /// Partition `traversable` into `sector_size` square blocks, link blocks
    /// across every traversable boundary run, and gather each block's
    /// geometry from `layers`.
    ///
    /// Sector ids follow row-major sector order; a block without a single
    /// traversable tile gets no sector.
    pub fn build(
        traversable: &TileGrid,
        layers: &[&dyn GeometryLayer],
        sector_size: i32,
    ) -> Result<Self, LoadError> {
        if sector_size <= 0 {
            return Err(LoadError::InvalidSectorSize(sector_size));
        }
        let s = sector_size;
        let (w, h) = (traversable.width() as i32, traversable.height() as i32);
        let mut graph = Self {
            sector_size: s,
            tilesize: traversable.tilesize(),
            ..Self::default()
        };

        let cols = (w + s - 1) / s;
        let rows = (h + s - 1) / s;
        for sy in 0..rows {
            for sx in 0..cols {
                let coord = IVec2::new(sx, sy);
                let origin = coord * s;
                let any = (origin.y..(origin.y + s).min(h))
                    .any(|y| (origin.x..(origin.x + s).min(w)).any(|x| traversable.is_set(IVec2::new(x, y))));
                if any {
                    graph.create_sector(coord, layers);
                }
            }
        }

        graph.link_boundaries(traversable, Boundary::Vertical);
        graph.link_boundaries(traversable, Boundary::Horizontal);

        let stats = graph.stats();
        debug!(
            "built sector graph: {} sectors, {} portals, {} geometry tiles",
            stats.sectors, stats.portals, stats.geometry_tiles
        );
        Ok(graph)
    }

    fn create_sector(&mut self, coord: IVec2, layers: &[&dyn GeometryLayer]) -> SectorId {
        let id = SectorId(self.sectors.len() as u32);
        let mut tiles = Vec::new();
        for layer in layers {
            layer.tiles_in_rect(coord * self.sector_size, IVec2::splat(self.sector_size), &mut tiles);
        }
        self.sectors.push(Sector {
            id,
            coord,
            portals: Vec::new(),
            geometry: GeometryBatch { tiles },
            entities: BTreeSet::new(),
        });
        self.by_coord.insert(coord, id);
        id
    }

    /// Scan every internal sector boundary of one orientation at tile
    /// granularity and emit one portal per maximal traversable run. Runs are
    /// cut at sector corners and at any tile pair that is not traversable on
    /// both sides.
    fn link_boundaries(&mut self, grid: &TileGrid, boundary: Boundary) {
        let s = self.sector_size;
        let (w, h) = (grid.width() as i32, grid.height() as i32);
        // `across` walks boundary lines, `along` walks tiles on one line.
        let (across_len, along_len) = match boundary {
            Boundary::Vertical => (w, h),
            Boundary::Horizontal => (h, w),
        };

        let mut line = s;
        while line < across_len {
            let mut start: Option<i32> = None;
            for i in 0..=along_len {
                let open = i < along_len && {
                    let (before, after) = boundary.tiles(line, i);
                    grid.is_set(before) && grid.is_set(after)
                };
                if let Some(run) = start {
                    if i == along_len || i % s == 0 || !open {
                        self.add_portal(boundary, line, run, i);
                        start = None;
                    }
                }
                if open && start.is_none() {
                    start = Some(i);
                }
            }
            line += s;
        }
    }

    fn add_portal(&mut self, boundary: Boundary, line: i32, from: i32, to: i32) {
        let s = self.sector_size;
        let ts = self.tilesize;
        let (a, b, before, after) = match boundary {
            Boundary::Vertical => (
                Vec2::new(line as f32, from as f32) * ts,
                Vec2::new(line as f32, to as f32) * ts,
                IVec2::new(line / s - 1, from / s),
                IVec2::new(line / s, from / s),
            ),
            Boundary::Horizontal => (
                Vec2::new(from as f32, line as f32) * ts,
                Vec2::new(to as f32, line as f32) * ts,
                IVec2::new(from / s, line / s - 1),
                IVec2::new(from / s, line / s),
            ),
        };
        // Both sides hold a traversable tile of the run, so both exist.
        let (Some(&sa), Some(&sb)) = (self.by_coord.get(&before), self.by_coord.get(&after)) else {
            return;
        };
        self.sectors[sa.0 as usize].portals.push(Portal { a, b, to: sb });
        self.sectors[sb.0 as usize].portals.push(Portal { a, b, to: sa });
        self.portal_count += 1;
    }

    pub fn sector_size(&self) -> i32 {
        self.sector_size
    }

    pub fn tilesize(&self) -> f32 {
        self.tilesize
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn get(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(id.0 as usize)
    }

    pub fn at_coord(&self, coord: IVec2) -> Option<&Sector> {
        self.by_coord.get(&coord).and_then(|id| self.get(*id))
    }

    /// Sector coordinate containing a world position.
    pub fn coord_of(&self, p: Vec2) -> IVec2 {
        let span = self.sector_size as f32 * self.tilesize;
        (p / span).floor().as_ivec2()
    }

    pub fn sector_at(&self, p: Vec2) -> Option<&Sector> {
        if self.sectors.is_empty() {
            return None;
        }
        self.at_coord(self.coord_of(p))
    }

    /// Record `id` in the sector at `coord`. Coordinates without a sector are
    /// ignored.
    pub fn insert_entity(&mut self, coord: IVec2, id: EntityId) {
        if let Some(&sid) = self.by_coord.get(&coord) {
            self.sectors[sid.0 as usize].entities.insert(id);
        }
    }

    pub fn remove_entity(&mut self, coord: IVec2, id: EntityId) {
        if let Some(&sid) = self.by_coord.get(&coord) {
            self.sectors[sid.0 as usize].entities.remove(&id);
        }
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            sectors: self.sectors.len(),
            portals: self.portal_count,
            geometry_tiles: self.sectors.iter().map(|s| s.geometry.len()).sum(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum Boundary {
    /// Lines of constant x between horizontally adjacent sectors.
    Vertical,
    /// Lines of constant y between vertically adjacent sectors.
    Horizontal,
}

impl Boundary {
    /// The tile pair straddling boundary `line` at position `i` along it.
    fn tiles(self, line: i32, i: i32) -> (IVec2, IVec2) {
        match self {
            Boundary::Vertical => (IVec2::new(line - 1, i), IVec2::new(line, i)),
            Boundary::Horizontal => (IVec2::new(i, line - 1), IVec2::new(i, line)),
        }
    }
}
