use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use crate::capability::TerrainGenerator;
use crate::chunk::{index_of, ChunkBuffer};
use crate::constants::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};

use super::block::{BasicBlock, AIR_ID, COAL_ORE_ID, DIRT_ID, GRASS_ID, IRON_ORE_ID, STONE_ID};

const BASE_HEIGHT: f64 = 64.0;
const AMPLITUDE: f64 = 24.0;
const WORLD_SCALE: f64 = 0.01;
const SOIL_DEPTH: i32 = 4;

/// Fractal-Brownian-motion height field plus a per-column `ChaCha12Rng`
/// for ore scatter, the same noise-layer/seeded-rng split the original
/// engine's generator used, collapsed to one biome.
#[derive(Default)]
pub struct FbmTerrainGenerator;

impl FbmTerrainGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl TerrainGenerator<BasicBlock> for FbmTerrainGenerator {
    fn generate(&self, chunk_x: i32, chunk_y: i32, seed: u64) -> ChunkBuffer<BasicBlock> {
        let noise = Fbm::<Perlin>::new(seed as u32)
            .set_octaves(5)
            .set_frequency(WORLD_SCALE)
            .set_persistence(0.5)
            .set_lacunarity(2.0);

        let mut buffer = ChunkBuffer::filled_with(BasicBlock::new(AIR_ID));

        for x in 0..CHUNK_SIZE_X {
            for y in 0..CHUNK_SIZE_Y {
                let world_x = chunk_x * CHUNK_SIZE_X as i32 + x as i32;
                let world_y = chunk_y * CHUNK_SIZE_Y as i32 + y as i32;

                let height_sample = noise.get([world_x as f64, world_y as f64]);
                let surface = ((BASE_HEIGHT + height_sample * AMPLITUDE) as i32)
                    .clamp(1, CHUNK_SIZE_Z as i32 - 1);

                let mut rng = ChaCha12Rng::seed_from_u64(
                    seed ^ (world_x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                        ^ (world_y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F),
                );

                for z in 0..surface as usize {
                    let depth_from_surface = surface - z as i32;
                    let id = if depth_from_surface == 1 {
                        GRASS_ID
                    } else if depth_from_surface <= SOIL_DEPTH {
                        DIRT_ID
                    } else if rng.gen_ratio(1, 200) {
                        if rng.gen_bool(0.6) {
                            COAL_ORE_ID
                        } else {
                            IRON_ORE_ID
                        }
                    } else {
                        STONE_ID
                    };
                    buffer.set_raw(index_of(x, y, z), BasicBlock::new(id));
                }
                buffer.recompute_sky_column(x, y);
            }
        }

        buffer.seed_block_light_sources();
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_coordinates_and_seed_generate_identically() {
        let generator = FbmTerrainGenerator::new();
        let a = generator.generate(3, -2, 99);
        let b = generator.generate(3, -2, 99);
        for idx in 0..crate::constants::CHUNK_VOLUME {
            assert_eq!(a.get(idx).id(), b.get(idx).id());
        }
    }

    #[test]
    fn surface_column_has_grass_over_dirt_over_stone() {
        let generator = FbmTerrainGenerator::new();
        let buffer = generator.generate(0, 0, 7);
        let top = buffer.top_opaque_z(8, 8).unwrap();
        assert_eq!(buffer.get(index_of(8, 8, top)).id(), GRASS_ID);
        assert_eq!(buffer.get(index_of(8, 8, top - 1)).id(), DIRT_ID);
    }
}
