mod boss;
mod chest;
mod chunk;
mod chunk_manager;
mod entity;
mod item_pickup;
mod landmark;
mod object;
mod pathfinding;
mod pod;
mod position;
mod projectile;
mod room;
mod storage;
mod structure;
mod terrain;
mod tiles;
mod world;

pub use boss::*;
pub use chest::*;
pub use chunk::*;
pub use chunk_manager::*;
pub use entity::*;
pub use item_pickup::*;
pub use landmark::*;
pub use object::*;
pub use pathfinding::*;
pub use pod::*;
pub use position::*;
pub use projectile::*;
pub use room::*;
pub use storage::*;
pub use structure::*;
pub use terrain::*;
pub use tiles::*;
pub use world::*;
