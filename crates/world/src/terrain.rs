//! Procedural chunk generation.
//!
//! Noise is sampled on a 4D torus so that terrain tiles seamlessly across the
//! wrapped world edge in both directions.

use noise::{NoiseFn, Perlin};
use rand::Rng;
use starhaven_core::{scoped_rng, PlanetType};
use tracing::{debug, instrument};

use crate::chunk::Chunk;
use crate::object::{
    BuildableObject, ObjectTypeId, OBJECT_BERRY_BUSH, OBJECT_MERCHANT, OBJECT_ROCK, OBJECT_TREE,
};
use crate::position::{global_tile, ChunkPosition, TileCoord, CHUNK_TILE_COUNT, CHUNK_TILE_SIZE};
use crate::structure::{structure_count, structure_data, StructureObject, StructureTypeId};
use crate::tiles::{
    TileId, TILE_DIRT, TILE_GRASS, TILE_ICE, TILE_ROCK, TILE_SAND, TILE_SNOW, TILE_WATER,
};

/// Coarse climate classification of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Biome {
    Ocean,
    Beach,
    Grassland,
    Forest,
    Desert,
    Tundra,
    Mountain,
}

impl Biome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Biome::Ocean => "ocean",
            Biome::Beach => "beach",
            Biome::Grassland => "grassland",
            Biome::Forest => "forest",
            Biome::Desert => "desert",
            Biome::Tundra => "tundra",
            Biome::Mountain => "mountain",
        }
    }

    /// Ground tile for land in this biome.
    fn surface_tile(self) -> TileId {
        match self {
            Biome::Ocean => TILE_WATER,
            Biome::Beach | Biome::Desert => TILE_SAND,
            Biome::Grassland | Biome::Forest => TILE_GRASS,
            Biome::Tundra => TILE_SNOW,
            Biome::Mountain => TILE_ROCK,
        }
    }

    /// Decoration chances per land tile, in 1/1000ths.
    fn decorations(self) -> &'static [(ObjectTypeId, u16)] {
        match self {
            Biome::Forest => &[(OBJECT_TREE, 220), (OBJECT_BERRY_BUSH, 30)],
            Biome::Grassland => &[(OBJECT_TREE, 40), (OBJECT_BERRY_BUSH, 25), (OBJECT_ROCK, 10), (OBJECT_MERCHANT, 1)],
            Biome::Desert => &[(OBJECT_ROCK, 25)],
            Biome::Tundra => &[(OBJECT_ROCK, 30), (OBJECT_TREE, 15)],
            Biome::Mountain => &[(OBJECT_ROCK, 120)],
            Biome::Ocean | Biome::Beach => &[],
        }
    }
}

/// Source of freshly generated chunks for one planet.
pub trait ChunkGenerator {
    /// Generate the chunk at `pos`. Must be deterministic for a given
    /// position so that every host regenerates the same unmodified chunk.
    fn generate_chunk(&self, pos: ChunkPosition) -> Chunk;

    /// Climate of the chunk at `pos`.
    fn biome_at(&self, pos: ChunkPosition) -> Biome;
}

/// Perlin-noise generator seeded from the world seed and planet identity.
pub struct NoiseChunkGenerator {
    seed: u64,
    planet: PlanetType,
    world_size: u16,
    height: Perlin,
    temperature: Perlin,
    moisture: Perlin,
    river: Perlin,
}

const HEIGHT_FREQUENCY: f64 = 2.2;
const CLIMATE_FREQUENCY: f64 = 0.9;
const RIVER_FREQUENCY: f64 = 1.6;
const WATER_LEVEL: f64 = -0.08;
const BEACH_LEVEL: f64 = 0.0;
const MOUNTAIN_LEVEL: f64 = 0.5;
const RIVER_WIDTH: f64 = 0.025;

impl NoiseChunkGenerator {
    pub fn new(world_seed: u64, planet: PlanetType, world_size: u16) -> Self {
        let seed = world_seed ^ planet.seed_salt();
        let lane = |salt: u64| (seed.wrapping_add(salt) ^ (seed >> 32)) as u32;
        Self {
            seed,
            planet,
            world_size: world_size.max(1),
            height: Perlin::new(lane(0)),
            temperature: Perlin::new(lane(1)),
            moisture: Perlin::new(lane(2)),
            river: Perlin::new(lane(3)),
        }
    }

    /// Sample a generator on the torus at a global tile coordinate.
    fn sample(&self, noise: &Perlin, frequency: f64, gx: f64, gy: f64) -> f64 {
        let tiles = self.world_size as f64 * CHUNK_TILE_SIZE as f64;
        let ax = gx / tiles * std::f64::consts::TAU;
        let ay = gy / tiles * std::f64::consts::TAU;
        let r = frequency * self.world_size as f64 / std::f64::consts::TAU;
        noise.get([r * ax.cos(), r * ax.sin(), r * ay.cos(), r * ay.sin()])
    }

    fn climate_biome(&self, gx: f64, gy: f64) -> Biome {
        let temperature = self.sample(&self.temperature, CLIMATE_FREQUENCY, gx, gy);
        let moisture = self.sample(&self.moisture, CLIMATE_FREQUENCY, gx, gy);
        match self.planet {
            PlanetType::DUNE => {
                if moisture > 0.35 {
                    Biome::Grassland
                } else {
                    Biome::Desert
                }
            }
            PlanetType::GLACIER => {
                if temperature > 0.3 {
                    Biome::Grassland
                } else {
                    Biome::Tundra
                }
            }
            _ => {
                if temperature < -0.35 {
                    Biome::Tundra
                } else if temperature > 0.35 && moisture < 0.0 {
                    Biome::Desert
                } else if moisture > 0.1 {
                    Biome::Forest
                } else {
                    Biome::Grassland
                }
            }
        }
    }

    fn tile_at(&self, gx: f64, gy: f64) -> TileId {
        let height = self.sample(&self.height, HEIGHT_FREQUENCY, gx, gy);
        if height < WATER_LEVEL {
            return if self.planet == PlanetType::GLACIER {
                TILE_ICE
            } else {
                TILE_WATER
            };
        }
        let river = self.sample(&self.river, RIVER_FREQUENCY, gx, gy);
        if river.abs() < RIVER_WIDTH && height < MOUNTAIN_LEVEL {
            return TILE_WATER;
        }
        if height < BEACH_LEVEL {
            return TILE_SAND;
        }
        if height > MOUNTAIN_LEVEL {
            return TILE_ROCK;
        }
        match self.climate_biome(gx, gy).surface_tile() {
            TILE_SAND if height > MOUNTAIN_LEVEL * 0.8 => TILE_DIRT,
            tile => tile,
        }
    }

    fn place_structure(&self, chunk: &mut Chunk, rng: &mut impl Rng) {
        for structure_type in 0..structure_count() as StructureTypeId {
            let Some(data) = structure_data(structure_type) else {
                continue;
            };
            if rng.gen_range(0..1000) >= data.spawn_permille {
                continue;
            }
            let candidates: Vec<TileCoord> = TileCoord::all()
                .filter(|tile| {
                    chunk.ground_tile(*tile) == TILE_GRASS || chunk.ground_tile(*tile) == TILE_SAND
                })
                .filter(|tile| !chunk.is_tile_occupied(*tile))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let entrance = candidates[rng.gen_range(0..candidates.len())];
            chunk.set_structure(Some(StructureObject::new(structure_type, entrance)));
            return;
        }
    }
}

impl ChunkGenerator for NoiseChunkGenerator {
    #[instrument(skip(self), fields(chunk = %pos, planet = self.planet.as_str()))]
    fn generate_chunk(&self, pos: ChunkPosition) -> Chunk {
        let mut chunk = Chunk::new(pos);
        let mut ground = [TILE_WATER; CHUNK_TILE_COUNT];
        for tile in TileCoord::all() {
            let (gx, gy) = global_tile(pos, tile);
            ground[tile.index()] = self.tile_at(gx as f64, gy as f64);
        }
        chunk.fill_ground(ground);

        let biome = self.biome_at(pos);
        let mut rng = scoped_rng(self.seed, pos.hash_u64(), 0);
        for tile in TileCoord::all() {
            let ground = chunk.ground_tile(tile);
            if ground == TILE_WATER || ground == TILE_ICE {
                continue;
            }
            let roll: u16 = rng.gen_range(0..1000);
            let mut threshold = 0;
            for (object_type, chance) in biome.decorations() {
                threshold += chance;
                if roll < threshold {
                    if let Some(object) = BuildableObject::new(*object_type) {
                        chunk.place_generated_object(tile, object.settled());
                    }
                    break;
                }
            }
        }
        self.place_structure(&mut chunk, &mut rng);

        debug!(biome = biome.as_str(), "generated chunk");
        chunk
    }

    fn biome_at(&self, pos: ChunkPosition) -> Biome {
        let centre = TileCoord::new(CHUNK_TILE_SIZE as u8 / 2, CHUNK_TILE_SIZE as u8 / 2);
        let (gx, gy) = global_tile(pos, centre);
        let (gx, gy) = (gx as f64, gy as f64);
        let height = self.sample(&self.height, HEIGHT_FREQUENCY, gx, gy);
        if height < WATER_LEVEL {
            Biome::Ocean
        } else if height < BEACH_LEVEL {
            Biome::Beach
        } else if height > MOUNTAIN_LEVEL {
            Biome::Mountain
        } else {
            self.climate_biome(gx, gy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let a = NoiseChunkGenerator::new(42, PlanetType::VERDANT, 32);
        let b = NoiseChunkGenerator::new(42, PlanetType::VERDANT, 32);
        let pos = ChunkPosition::new(5, 9);
        let ca = a.generate_chunk(pos);
        let cb = b.generate_chunk(pos);
        assert_eq!(ca.ground(), cb.ground());
        assert_eq!(ca.to_pod(32), cb.to_pod(32));
        assert!(!ca.is_modified());
    }

    #[test]
    fn planets_differ() {
        let a = NoiseChunkGenerator::new(42, PlanetType::VERDANT, 32);
        let b = NoiseChunkGenerator::new(42, PlanetType::DUNE, 32);
        let differs = (0..8).any(|x| {
            let pos = ChunkPosition::new(x, x);
            a.generate_chunk(pos).ground() != b.generate_chunk(pos).ground()
        });
        assert!(differs);
    }

    #[test]
    fn terrain_wraps_seamlessly() {
        let generator = NoiseChunkGenerator::new(7, PlanetType::VERDANT, 16);
        let tiles = 16.0 * CHUNK_TILE_SIZE as f64;
        for y in 0..16 {
            let y = y as f64;
            assert_eq!(generator.tile_at(0.0, y), generator.tile_at(tiles, y));
        }
    }

    #[test]
    fn generated_objects_do_not_flash() {
        let generator = NoiseChunkGenerator::new(3, PlanetType::VERDANT, 32);
        for x in 0..8 {
            let chunk = generator.generate_chunk(ChunkPosition::new(x, 0));
            assert!(chunk.objects().all(|(_, object)| object.flash_time() == 0.0));
        }
    }
}
