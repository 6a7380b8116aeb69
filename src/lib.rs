//! twofive: tile-world simulation core (swept grid collision, pairwise
//! entity resolution, portal-culled sector visibility)

pub mod types;
pub mod api;
pub mod error;
pub mod logging;
pub mod level;
pub mod collision_map;
pub mod kinematics;
pub mod narrowphase;
pub mod solver;
pub mod sectors;
pub mod visibility;
pub mod world;

pub use crate::types::*;
pub use crate::api::*;
pub use crate::error::LoadError;
pub use crate::kinematics::Body;
pub use crate::level::{LevelData, Settings};
pub use crate::logging::init as init_logging;
pub use crate::world::{Commands, EntityRegistry, SpawnContext, TickContext, World};
