//! Terrain generation: seeds a [`Map`]'s heights from a pluggable noise
//! oracle using fixed fractal parameters (8 octaves, lacunarity 2, gain
//! 0.6), then renormalizes and optionally applies a radial falloff for
//! island-shaped worlds.

use crate::cellpool::Map;
use crate::mathutil::erf;
use noise::{NoiseFn, Perlin, Seedable};

const OCTAVES: u32 = 8;
const LACUNARITY: f32 = 2.0;
const GAIN: f32 = 0.6;
const BASE_FREQUENCY: f32 = 1.0;

/// A pure noise source: `sample(x, y, seed)` must be deterministic and
/// side-effect free. The core only consumes this trait; it never implements
/// noise generation on its own terms beyond the default below.
pub trait NoiseOracle {
    fn sample(&self, x: f64, y: f64, seed: u64) -> f32;
}

/// Default oracle backed by the `noise` crate's Perlin generator, keyed on
/// `seed mod 10000` per octave exactly as the terrain generator expects.
pub struct PerlinOracle {
    perlin: Perlin,
}

impl PerlinOracle {
    pub fn new(seed: u64) -> Self {
        Self {
            perlin: Perlin::new(0).set_seed((seed % 10_000) as u32),
        }
    }
}

impl NoiseOracle for PerlinOracle {
    fn sample(&self, x: f64, y: f64, _seed: u64) -> f32 {
        self.perlin.get([x, y]) as f32
    }
}

/// Fill every cell's height from the oracle using 8 octaves of fractal
/// noise, then renormalize linearly so the minimum maps to 0 and the
/// maximum maps to 1. `island` applies the radial falloff
/// `0.5*(1 + erf(1 - r^2/0.07))` around world center, used for island-style
/// worlds; a non-island world skips it.
pub fn generate(map: &mut Map, oracle: &dyn NoiseOracle, seed: u64, island: bool) {
    let res = map.world_resolution();
    let size = res as f32;
    let center = size / 2.0;

    let mut min_h = f32::MAX;
    let mut max_h = f32::MIN;

    for y in 0..res {
        for x in 0..res {
            let mut amplitude = 1.0f32;
            let mut frequency = BASE_FREQUENCY;
            let mut h = 0.0f32;

            let nx = x as f64 / size as f64;
            let ny = y as f64 / size as f64;

            for _ in 0..OCTAVES {
                let sample = oracle.sample(nx * frequency as f64, ny * frequency as f64, seed);
                h += amplitude * sample;
                amplitude *= GAIN;
                frequency *= LACUNARITY;
            }

            if let Some(cell) = map.get_mut((x, y)) {
                cell.height = h;
            }
            min_h = min_h.min(h);
            max_h = max_h.max(h);
        }
    }

    let range = (max_h - min_h).max(1e-6);
    for y in 0..res {
        for x in 0..res {
            if let Some(cell) = map.get_mut((x, y)) {
                let mut normalized = (cell.height - min_h) / range;

                if island {
                    let dx = x as f32 - center;
                    let dy = y as f32 - center;
                    let r2 = (dx * dx + dy * dy) / (0.07 * size * size);
                    let falloff = 0.5 * (1.0 + erf(1.0 - r2));
                    normalized *= falloff;
                }

                cell.height = normalized;
            }
        }
    }
}
