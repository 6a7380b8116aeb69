use glam::{IVec2, Vec2};
use log::{debug, trace, warn};
use serde_json::Value;
use slotmap::SlotMap;

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::api::{CollisionMapApi, EntityBehavior, GeometryLayer, RenderSink, WorldApi};
use crate::collision_map::{CollisionMap, NoCollision};
use crate::error::LoadError;
use crate::kinematics::{self, Body};
use crate::level::{Face, LevelData, PlaneLayer, Settings, TileGrid, WallLayer};
use crate::sectors::SectorGraph;
use crate::solver;
use crate::types::*;
use crate::visibility;

/// A live simulated object: kinematic body plus host-defined behaviour.
pub struct Entity {
    pub body: Body,
    pub behavior: Box<dyn EntityBehavior>,
    pub name: Option<String>,
    // Sector coordinate the world last filed this entity under.
    sector: Option<IVec2>,
}

impl Entity {
    pub fn new(body: Body, behavior: Box<dyn EntityBehavior>) -> Self {
        Self { body, behavior, name: None, sector: None }
    }

    pub fn sector_coord(&self) -> Option<IVec2> {
        self.sector
    }
}

/// Deferred world mutation queued by a hook.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Spawn { type_name: String, pos: Vec2, settings: Settings },
    Damage { target: EntityId, amount: f32, from: Option<EntityId> },
}

/// Command buffer drained at the end of every tick, in queue order.
#[derive(Clone, Debug, Default)]
pub struct Commands {
    queue: Vec<Command>,
}

impl Commands {
    pub fn spawn(&mut self, type_name: impl Into<String>, pos: Vec2, settings: Settings) {
        self.queue.push(Command::Spawn { type_name: type_name.into(), pos, settings });
    }

    pub fn damage(&mut self, target: EntityId, amount: f32, from: Option<EntityId>) {
        self.queue.push(Command::Damage { target, amount, from });
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// What a `think` hook may read and queue during a tick.
///
/// Other entities are visible only through the snapshot taken before any
/// entity thought or moved this tick.
pub struct TickContext<'a> {
    pub dt: f32,
    pub map: &'a dyn CollisionMapApi,
    pub commands: &'a mut Commands,
    snapshot: &'a [Body],
    names: &'a HashMap<String, EntityId>,
}

impl TickContext<'_> {
    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.snapshot.iter().find(|b| b.id == id)
    }

    pub fn named(&self, name: &str) -> Option<&Body> {
        self.names.get(name).and_then(|id| self.body(*id))
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.snapshot.iter()
    }

    pub fn line_of_sight(&self, from: &Body, to: &Body) -> bool {
        kinematics::line_of_sight(self.map, from, to)
    }
}

/// Read-only world state handed to entity factories.
pub struct SpawnContext<'a> {
    pub map: &'a dyn CollisionMapApi,
    pub config: &'a WorldConfig,
}

/// Builds an entity's behaviour. The factory may also shape the fresh body
/// (size, collision groups, defaults); level settings are applied after it.
pub type Factory = Box<dyn Fn(&mut Body, &Settings, &SpawnContext<'_>) -> Box<dyn EntityBehavior>>;

/// Type name to factory mapping supplied by the host.
#[derive(Default)]
pub struct EntityRegistry {
    factories: HashMap<String, Factory>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&mut Body, &Settings, &SpawnContext<'_>) -> Box<dyn EntityBehavior> + 'static,
    {
        self.factories.insert(type_name.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    fn get(&self, type_name: &str) -> Option<&Factory> {
        self.factories.get(type_name)
    }
}

/// Frame-synchronous simulation of one level.
pub struct World {
    pub cfg: WorldConfig,
    pub frame_counter: u32,

    map: Box<dyn CollisionMapApi>,
    graph: SectorGraph,
    entities: SlotMap<EntityId, Entity>,
    names: HashMap<String, EntityId>,
    commands: Commands,

    stats: FrameStats,
    vis_stats: VisibilityStats,
    // Timing for last operations (optional)
    last_timing: Option<FrameTiming>,
}

fn ms_since(t: Option<Instant>) -> f64 {
    t.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0)
}

fn grid_of(data: &LevelData, name: &str) -> Result<Option<TileGrid>, LoadError> {
    data.layer(name).map(TileGrid::from_layer).transpose()
}

impl WorldApi for World {
    fn new(cfg: WorldConfig) -> Self {
        Self {
            cfg,
            frame_counter: 0,
            map: Box::new(NoCollision::default()),
            graph: SectorGraph::default(),
            entities: SlotMap::with_key(),
            names: HashMap::new(),
            commands: Commands::default(),
            stats: FrameStats::default(),
            vis_stats: VisibilityStats::default(),
            last_timing: None,
        }
    }

    fn load_level(&mut self, data: &LevelData, registry: &EntityRegistry) -> Result<(), LoadError> {
        if self.cfg.sector_size <= 0 {
            return Err(LoadError::InvalidSectorSize(self.cfg.sector_size));
        }

        // Everything that can fail runs before the current level is dropped.
        let collision = grid_of(data, "collision")?;
        let floor = grid_of(data, "floor")?;
        let ceiling = grid_of(data, "ceiling")?;
        let walls = grid_of(data, "walls")?;

        let traversable = match (&floor, &collision) {
            (Some(f), _) => Some(f.clone()),
            (None, Some(c)) => Some(c.inverted()),
            (None, None) => None,
        };

        let mut wall_layer = walls.map(|g| WallLayer::new("walls", g));
        if let (Some(w), Some(f)) = (wall_layer.as_mut(), floor.as_ref()) {
            let erased = w.erase_disconnected(f);
            debug!("erased {erased} wall faces without a floor in front");
        }
        let floor_layer = floor.map(|g| PlaneLayer::new("floor", Face::Floor, g));
        let ceiling_layer = ceiling.map(|g| PlaneLayer::new("ceiling", Face::Ceiling, g));

        let mut layers: Vec<&dyn GeometryLayer> = Vec::new();
        if let Some(l) = &floor_layer {
            layers.push(l);
        }
        if let Some(l) = &ceiling_layer {
            layers.push(l);
        }
        if let Some(l) = &wall_layer {
            layers.push(l);
        }

        debug!(
            "geometry layers: {:?}",
            layers.iter().map(|l| l.name()).collect::<Vec<_>>()
        );
        let graph = match traversable {
            Some(t) => SectorGraph::build(&t, &layers, self.cfg.sector_size)?,
            None => {
                warn!("level has neither a floor nor a collision layer; no sectors built");
                SectorGraph::default()
            }
        };

        self.clear_level();
        self.map = match collision {
            Some(g) => Box::new(CollisionMap::from_grid(g)),
            None => Box::new(NoCollision::default()),
        };
        self.graph = graph;

        let mut spawned = Vec::with_capacity(data.entities.len());
        for desc in &data.entities {
            let pos = Vec2::new(desc.x, desc.y);
            match self.spawn(registry, &desc.type_name, pos, &desc.settings) {
                Some(id) => spawned.push(id),
                None => warn!("skipping entity of unknown type `{}` at {pos}", desc.type_name),
            }
        }
        for id in &spawned {
            if let Some(e) = self.entities.get_mut(*id) {
                e.behavior.ready(&mut e.body, &mut self.commands);
            }
        }
        self.apply_commands(registry);

        debug!(
            "loaded level: {} entities, {} sectors, collision layer: {}",
            self.entities.len(),
            self.graph.len(),
            data.layer("collision").is_some()
        );
        Ok(())
    }

    fn clear_level(&mut self) {
        // Free the highest slot first so the next level refills slots from
        // the lowest, keeping descriptor order in iteration.
        let ids: Vec<EntityId> = self.entities.keys().collect();
        for id in ids.into_iter().rev() {
            self.entities.remove(id);
        }
        self.names.clear();
        self.commands = Commands::default();
        self.graph = SectorGraph::default();
        self.map = Box::new(NoCollision::default());
        self.stats = FrameStats::default();
        self.vis_stats = VisibilityStats::default();
        self.last_timing = None;
    }

    fn spawn(&mut self, registry: &EntityRegistry, type_name: &str, pos: Vec2, settings: &Settings) -> Option<EntityId> {
        let factory = registry.get(type_name)?;
        let ctx = SpawnContext { map: self.map.as_ref(), config: &self.cfg };
        let name = settings.get("name").and_then(Value::as_str).map(str::to_owned);

        let id = self.entities.insert_with_key(|id| {
            let mut body = Body::new(id, pos);
            let behavior = factory(&mut body, settings, &ctx);
            body.apply_settings(settings);
            Entity { body, behavior, name: name.clone(), sector: None }
        });
        if let Some(name) = name {
            self.names.insert(name, id);
        }
        self.sync_sector(id);
        self.stats.spawned += 1;
        Some(id)
    }

    fn step(&mut self, registry: &EntityRegistry, dt: f32) {
        let timing = self.cfg.enable_timing;
        let t_all = if timing { Some(Instant::now()) } else { None };
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.stats = FrameStats::default();

        // Think + integrate
        let t0 = if timing { Some(Instant::now()) } else { None };
        let snapshot: Vec<Body> = self
            .entities
            .iter()
            .filter(|(_, e)| e.body.is_alive())
            .map(|(_, e)| e.body.clone())
            .collect();
        let ids: Vec<EntityId> = self.entities.keys().collect();
        let map = self.map.as_ref();
        for &id in &ids {
            let Some(e) = self.entities.get_mut(id) else {
                continue;
            };
            if !e.body.is_alive() {
                continue;
            }
            let mut ctx = TickContext {
                dt,
                map,
                commands: &mut self.commands,
                snapshot: &snapshot,
                names: &self.names,
            };
            e.behavior.think(&mut e.body, &mut ctx);
            if e.body.is_alive() {
                kinematics::integrate(&mut e.body, map, self.cfg.gravity, dt);
            }
        }
        let integrate_ms = ms_since(t0);

        // Pairwise overlaps
        let t1 = if timing { Some(Instant::now()) } else { None };
        let solved = solver::resolve_tick(&mut self.entities, self.map.as_ref(), &mut self.commands);
        self.stats.overlapping_pairs = solved.overlapping_pairs;
        self.stats.separations = solved.separations;
        let solve_ms = ms_since(t1);

        // Deferred commands, then drop the dead
        let t2 = if timing { Some(Instant::now()) } else { None };
        self.apply_commands(registry);
        let ids: Vec<EntityId> = self.entities.keys().collect();
        for id in ids {
            if self.entities.get(id).is_some_and(|e| e.body.is_alive()) {
                self.sync_sector(id);
            } else {
                self.remove(id);
            }
        }
        let commands_ms = ms_since(t2);

        self.stats.live_entities = self.entities.len();
        trace!(
            "frame {}: {} live, {} overlapping, {} separated, {} spawned, {} removed",
            self.frame_counter,
            self.stats.live_entities,
            self.stats.overlapping_pairs,
            self.stats.separations,
            self.stats.spawned,
            self.stats.removed
        );

        if let Some(t_all) = t_all {
            self.last_timing = Some(FrameTiming {
                step_ms: ms_since(Some(t_all)),
                integrate_ms,
                solve_ms,
                commands_ms,
                ..self.last_timing.unwrap_or_default()
            });
        }
    }

    fn visible_sectors(&mut self, view: &CameraView) -> BTreeSet<SectorId> {
        let t0 = if self.cfg.enable_timing { Some(Instant::now()) } else { None };
        let (visible, stats) = visibility::visible_sectors(&self.graph, view);
        self.vis_stats = stats;
        if t0.is_some() {
            let mut timing = self.last_timing.unwrap_or_default();
            timing.visibility_ms = ms_since(t0);
            self.last_timing = Some(timing);
        }
        visible
    }

    fn draw(&mut self, view: &CameraView, renderer: &mut dyn RenderSink) {
        let visible = self.visible_sectors(view);

        for sid in &visible {
            if let Some(sector) = self.graph.get(*sid) {
                renderer.push_batch(*sid, &sector.geometry);
            }
        }

        let mut deferred: Vec<&Entity> = Vec::new();
        for sid in &visible {
            let Some(sector) = self.graph.get(*sid) else {
                continue;
            };
            for id in sector.entities() {
                let Some(e) = self.entities.get(id) else {
                    continue;
                };
                if !e.body.is_alive() {
                    continue;
                }
                if e.body.z_index != 0 {
                    deferred.push(e);
                } else {
                    e.behavior.draw(&e.body, renderer);
                }
            }
        }
        deferred.sort_by_key(|e| e.body.z_index);
        for e in deferred {
            e.behavior.draw(&e.body, renderer);
        }
    }
}

impl World {
    /// Step by the configured tick length.
    pub fn step_default(&mut self, registry: &EntityRegistry) {
        self.step(registry, self.cfg.tick);
    }

    /// Camera view for a renderer yaw using the configured field of view.
    pub fn camera_view(&self, pos: Vec2, yaw: f32) -> CameraView {
        CameraView::from_yaw(pos, yaw, self.cfg.horizontal_fov_deg)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.entities.get(id).map(|e| &e.body)
    }

    /// Entity registered under a `name` setting.
    pub fn named(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied().filter(|id| self.entities.get(*id).is_some())
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Queue a command as if a hook had issued it; applied at end of the next step.
    pub fn commands_mut(&mut self) -> &mut Commands {
        &mut self.commands
    }

    pub fn map(&self) -> &dyn CollisionMapApi {
        self.map.as_ref()
    }

    pub fn sectors(&self) -> &SectorGraph {
        &self.graph
    }

    pub fn debug_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn visibility_stats(&self) -> VisibilityStats {
        self.vis_stats
    }

    pub fn timing(&self) -> Option<FrameTiming> {
        self.last_timing
    }

    fn apply_commands(&mut self, registry: &EntityRegistry) {
        let queued = std::mem::take(&mut self.commands).queue;
        for cmd in queued {
            match cmd {
                Command::Spawn { type_name, pos, settings } => {
                    if self.spawn(registry, &type_name, pos, &settings).is_none() {
                        warn!("dropping spawn of unknown type `{type_name}`");
                    }
                }
                Command::Damage { target, amount, from } => {
                    if let Some(e) = self.entities.get_mut(target) {
                        if e.body.is_alive() {
                            e.behavior.receive_damage(&mut e.body, amount, from);
                        }
                    }
                }
            }
        }
    }

    /// Refile an entity under the sector containing its centre.
    fn sync_sector(&mut self, id: EntityId) {
        if self.graph.is_empty() {
            return;
        }
        let Some(e) = self.entities.get_mut(id) else {
            return;
        };
        let cell = self.graph.coord_of(e.body.center());
        if e.sector == Some(cell) {
            return;
        }
        if let Some(old) = e.sector {
            self.graph.remove_entity(old, id);
        }
        self.graph.insert_entity(cell, id);
        e.sector = Some(cell);
    }

    fn remove(&mut self, id: EntityId) {
        let Some(e) = self.entities.remove(id) else {
            return;
        };
        if let Some(cell) = e.sector {
            self.graph.remove_entity(cell, id);
        }
        if let Some(name) = &e.name {
            if self.names.get(name) == Some(&id) {
                self.names.remove(name);
            }
        }
        self.stats.removed += 1;
    }
}
