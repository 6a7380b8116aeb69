//! Decoded level input and the static geometry gathered from it.

use glam::IVec2;
use serde::Deserialize;

use crate::api::GeometryLayer;
use crate::error::LoadError;

/// Free-form per-entity settings from the level file.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// One decoded level: grid layers plus entity descriptors.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LevelData {
    #[serde(default)]
    pub layer: Vec<LayerData>,
    #[serde(default)]
    pub entities: Vec<EntityData>,
}

/// A named tile layer. The name selects its role: `collision`, `floor`,
/// `ceiling` or `walls`.
#[derive(Clone, Debug, Deserialize)]
pub struct LayerData {
    pub name: String,
    pub tilesize: f32,
    pub data: Vec<Vec<u32>>,
    #[serde(rename = "tilesetName", default)]
    pub tileset_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EntityData {
    #[serde(rename = "type")]
    pub type_name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub settings: Settings,
}

impl LevelData {
    pub fn layer(&self, name: &str) -> Option<&LayerData> {
        self.layer.iter().find(|l| l.name == name)
    }
}

/// Rectangular grid of tile ids, row-major, `0` meaning empty.
#[derive(Clone, Debug)]
pub struct TileGrid {
    tilesize: f32,
    width: usize,
    height: usize,
    data: Vec<u32>,
}

impl TileGrid {
    /// Build from rows, rejecting ragged rows and a non-positive tile size.
    pub fn from_rows(name: &str, tilesize: f32, rows: &[Vec<u32>]) -> Result<Self, LoadError> {
        if !(tilesize > 0.0) {
            return Err(LoadError::invalid_tilesize(name, tilesize));
        }
        let width = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(width * rows.len());
        for (row, r) in rows.iter().enumerate() {
            if r.len() != width {
                return Err(LoadError::RaggedGrid {
                    layer: name.to_owned(),
                    row,
                    expected: width,
                    found: r.len(),
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Self { tilesize, width, height: rows.len(), data })
    }

    pub fn from_layer(layer: &LayerData) -> Result<Self, LoadError> {
        Self::from_rows(&layer.name, layer.tilesize, &layer.data)
    }

    /// Same shape, with every empty tile set and every set tile cleared.
    pub fn inverted(&self) -> Self {
        Self {
            data: self.data.iter().map(|&t| u32::from(t == 0)).collect(),
            ..self.clone()
        }
    }

    pub fn tilesize(&self) -> f32 {
        self.tilesize
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Tile id at a tile coordinate; `0` outside the grid.
    pub fn get(&self, t: IVec2) -> u32 {
        if t.x < 0 || t.y < 0 || t.x as usize >= self.width || t.y as usize >= self.height {
            return 0;
        }
        self.data[t.y as usize * self.width + t.x as usize]
    }

    pub fn is_set(&self, t: IVec2) -> bool {
        self.get(t) != 0
    }

    /// Non-empty tiles in row-major order.
    pub fn occupied(&self) -> impl Iterator<Item = (IVec2, u32)> {
        let w = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .filter(|(_, t)| **t != 0)
            .map(move |(i, t)| (IVec2::new((i % w) as i32, (i / w) as i32), *t))
    }
}

/// Which way a tile quad faces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Floor,
    Ceiling,
    /// Wall side looking toward -y.
    North,
    /// Wall side looking toward +y.
    South,
    /// Wall side looking toward +x.
    East,
    /// Wall side looking toward -x.
    West,
}

impl Face {
    pub const WALLS: [Face; 4] = [Face::North, Face::South, Face::East, Face::West];

    /// Tile offset the face looks onto.
    pub fn offset(self) -> IVec2 {
        match self {
            Face::North => IVec2::NEG_Y,
            Face::South => IVec2::Y,
            Face::East => IVec2::X,
            Face::West => IVec2::NEG_X,
            Face::Floor | Face::Ceiling => IVec2::ZERO,
        }
    }
}

/// One textured quad of static geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileInstance {
    /// Tile coordinate of the owning tile.
    pub tile: IVec2,
    /// Tile id from the layer.
    pub id: u32,
    pub face: Face,
}

/// Static geometry of one sector, handed unmodified to the render sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryBatch {
    pub tiles: Vec<TileInstance>,
}

impl GeometryBatch {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Floor or ceiling plane: one quad per non-empty tile.
#[derive(Clone, Debug)]
pub struct PlaneLayer {
    name: String,
    face: Face,
    grid: TileGrid,
}

impl PlaneLayer {
    pub fn new(name: impl Into<String>, face: Face, grid: TileGrid) -> Self {
        Self { name: name.into(), face, grid }
    }
}

impl GeometryLayer for PlaneLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tiles_in_rect(&self, origin: IVec2, size: IVec2, out: &mut Vec<TileInstance>) {
        for y in origin.y..origin.y + size.y {
            for x in origin.x..origin.x + size.x {
                let tile = IVec2::new(x, y);
                let id = self.grid.get(tile);
                if id != 0 {
                    out.push(TileInstance { tile, id, face: self.face });
                }
            }
        }
    }
}

/// Solid wall blocks, each carrying up to four side faces.
#[derive(Clone, Debug)]
pub struct WallLayer {
    name: String,
    grid: TileGrid,
    /// Per tile, bit `i` set when `Face::WALLS[i]` is kept.
    faces: Vec<u8>,
}

impl WallLayer {
    pub fn new(name: impl Into<String>, grid: TileGrid) -> Self {
        let faces = vec![0b1111; grid.width() * grid.height()];
        Self { name: name.into(), grid, faces }
    }

    fn face_bits(&self, tile: IVec2) -> u8 {
        if !self.grid.is_set(tile) {
            return 0;
        }
        self.faces[tile.y as usize * self.grid.width() + tile.x as usize]
    }

    pub fn has_face(&self, tile: IVec2, face: Face) -> bool {
        Face::WALLS
            .iter()
            .position(|f| *f == face)
            .is_some_and(|i| self.face_bits(tile) & (1 << i) != 0)
    }

    /// Drop every face that does not look onto a floor tile. Returns how many
    /// faces were erased.
    pub fn erase_disconnected(&mut self, floor: &TileGrid) -> usize {
        let mut erased = 0;
        let tiles: Vec<IVec2> = self.grid.occupied().map(|(t, _)| t).collect();
        for tile in tiles {
            let idx = tile.y as usize * self.grid.width() + tile.x as usize;
            for (i, face) in Face::WALLS.iter().enumerate() {
                let bit = 1 << i;
                if self.faces[idx] & bit != 0 && !floor.is_set(tile + face.offset()) {
                    self.faces[idx] &= !bit;
                    erased += 1;
                }
            }
        }
        erased
    }
}

impl GeometryLayer for WallLayer {
    fn name(&self) -> &str {
        &self.name
    }

    /// A face belongs to the tile it looks onto, so each wall side lands in
    /// the sector it is seen from.
    fn tiles_in_rect(&self, origin: IVec2, size: IVec2, out: &mut Vec<TileInstance>) {
        for y in origin.y..origin.y + size.y {
            for x in origin.x..origin.x + size.x {
                let seen_from = IVec2::new(x, y);
                for face in Face::WALLS {
                    let tile = seen_from - face.offset();
                    if self.has_face(tile, face) {
                        out.push(TileInstance { tile, id: self.grid.get(tile), face });
                    }
                }
            }
        }
    }
}
