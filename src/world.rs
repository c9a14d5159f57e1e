//! The erosion driver: owns the map, the vegetation population, the RNG,
//! and config; exposes `erode(cycles)` as the only per-tick entry point.
//! Mirrors the grounding repo's `erosion::simulate_erosion` orchestration —
//! plain `println!` progress/summary reporting, no logging framework.

use crate::cascade;
use crate::cellpool::{FieldSnapshot, Map};
use crate::config::Config;
use crate::drop::Drop;
use crate::error::EngineError;
use crate::mathutil::Vec2;
use crate::terrain::{self, NoiseOracle};
use crate::vegetation::{self, Plant};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Cooperative cancellation flag, checked at the tick boundary — the driver
/// never suspends mid-tick.
pub struct World {
    pub map: Map,
    pub plants: Vec<Plant>,
    pub config: Config,
    pub paused: bool,
    rng: ChaCha8Rng,
    ticks_run: u64,
}

impl World {
    pub fn new(config: Config, oracle: &dyn NoiseOracle, island: bool) -> Result<Self, EngineError> {
        let mut map = Map::new(config.tile_size, config.map_size, config.map_scale)?;
        terrain::generate(&mut map, oracle, config.seed, island);
        Ok(Self {
            map,
            plants: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            paused: false,
            config,
            ticks_run: 0,
        })
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    /// Run one tick: zero the per-tick accumulators, spawn `cycles` drops
    /// per node and run each to termination, then low-pass-filter the
    /// accumulators into the persistent discharge/momentum fields. Returns
    /// immediately without doing any work if `paused` is set.
    pub fn erode(&mut self, cycles: usize) {
        if self.paused {
            return;
        }

        for node in self.map.nodes() {
            let origin = node.origin;
            let resolution = node.resolution as i32;
            for ly in 0..resolution {
                for lx in 0..resolution {
                    if let Some(cell) = self.map.get_mut((origin.0 + lx, origin.1 + ly)) {
                        cell.reset_tracks();
                    }
                }
            }
        }

        let node_origins: Vec<((i32, i32), i32)> = self
            .map
            .nodes()
            .iter()
            .map(|n| (n.origin, n.resolution as i32))
            .collect();

        let mut drops_spawned = 0usize;
        for (origin, resolution) in node_origins {
            for _ in 0..cycles {
                let spawn = Vec2::new(
                    origin.0 as f32 + self.rng.gen_range(0..resolution) as f32,
                    origin.1 as f32 + self.rng.gen_range(0..resolution) as f32,
                );
                let mut drop = Drop::new(spawn);
                drops_spawned += 1;
                while drop.descend(&mut self.map, &self.config) {
                    if self.config.flood_enabled && drop.is_trapped() {
                        drop.flood(&mut self.map, &self.config);
                        if drop.volume <= 0.0 {
                            break;
                        }
                    }
                }
            }
        }

        self.apply_ema();
        vegetation::step(&mut self.plants, &mut self.map, &self.config, &mut self.rng);

        self.ticks_run += 1;

        let (mean_d, max_d) = self.discharge_stats();
        println!(
            "tick {}: {} drops spawned, mean discharge {:.4}, max discharge {:.4}, {} plants",
            self.ticks_run,
            drops_spawned,
            mean_d,
            max_d,
            self.plants.len()
        );
    }

    /// Opt-in rayon-batched alternate to [`World::erode`]: freezes the
    /// height/momentum/discharge/root fields into a [`FieldSnapshot`], runs
    /// every node's droplets against that snapshot in parallel (each
    /// droplet producing its own delta list, never touching the live map),
    /// then serializes the merge, a cascade replay over every touched
    /// cell, and the EMA step exactly as `erode` does. Mirrors the
    /// grounding repo's `hydraulic::simulate_parallel` snapshot-then-merge
    /// shape. Not the default driver: per-drop ordering within a tick's
    /// batch is not preserved, only the merged tracked accumulators are
    /// equivalent in distribution to the sequential driver, and cascade no
    /// longer interleaves with descent step-by-step — it runs once per
    /// touched cell after the whole batch lands. The flood operator is not
    /// run here at all: it requires read-modify-write access to a live,
    /// shared map mid-descent, which the snapshot-batch model cannot give
    /// it. Hosts that need lakes should stay on `erode`.
    pub fn erode_parallel(&mut self, cycles: usize) {
        if self.paused {
            return;
        }

        for node in self.map.nodes() {
            let origin = node.origin;
            let resolution = node.resolution as i32;
            for ly in 0..resolution {
                for lx in 0..resolution {
                    if let Some(cell) = self.map.get_mut((origin.0 + lx, origin.1 + ly)) {
                        cell.reset_tracks();
                    }
                }
            }
        }

        let snapshot = FieldSnapshot::capture(&self.map);
        let node_origins: Vec<((i32, i32), i32)> = self
            .map
            .nodes()
            .iter()
            .map(|n| (n.origin, n.resolution as i32))
            .collect();

        let base_seed: u64 = self.rng.gen();
        let config = &self.config;
        let mut drops_spawned = 0usize;
        let mut height_delta: HashMap<(i32, i32), f32> = HashMap::new();
        let mut track_delta: HashMap<(i32, i32), (f32, f32, f32)> = HashMap::new();

        for (node_idx, (origin, resolution)) in node_origins.iter().enumerate() {
            let batch: Vec<_> = (0..cycles)
                .into_par_iter()
                .map(|i| {
                    let droplet_seed = base_seed.wrapping_add((node_idx * cycles + i) as u64);
                    let mut drop_rng = ChaCha8Rng::seed_from_u64(droplet_seed);
                    let spawn = Vec2::new(
                        origin.0 as f32 + drop_rng.gen_range(0..*resolution) as f32,
                        origin.1 as f32 + drop_rng.gen_range(0..*resolution) as f32,
                    );
                    Drop::run_against_snapshot(spawn, &snapshot, config)
                })
                .collect();

            for result in batch {
                drops_spawned += 1;
                for (p, dh) in result.height_deltas {
                    *height_delta.entry(p).or_insert(0.0) += dh;
                }
                for (p, dd, dmx, dmy) in result.track_deltas {
                    let entry = track_delta.entry(p).or_insert((0.0, 0.0, 0.0));
                    entry.0 += dd;
                    entry.1 += dmx;
                    entry.2 += dmy;
                }
            }
        }

        let mut touched: HashSet<(i32, i32)> = HashSet::new();
        for (p, dh) in &height_delta {
            touched.insert(*p);
            if let Some(cell) = self.map.get_mut(*p) {
                cell.height += dh;
            }
        }
        for (p, (dd, dmx, dmy)) in &track_delta {
            touched.insert(*p);
            if let Some(cell) = self.map.get_mut(*p) {
                cell.discharge_track += dd;
                cell.momentum_x_track += dmx;
                cell.momentum_y_track += dmy;
            }
        }
        for p in touched {
            cascade::cascade(&mut self.map, p, &self.config);
        }

        self.apply_ema();
        vegetation::step(&mut self.plants, &mut self.map, &self.config, &mut self.rng);

        self.ticks_run += 1;

        let (mean_d, max_d) = self.discharge_stats();
        println!(
            "tick {} (parallel): {} drops spawned, mean discharge {:.4}, max discharge {:.4}, {} plants",
            self.ticks_run,
            drops_spawned,
            mean_d,
            max_d,
            self.plants.len()
        );
    }

    fn apply_ema(&mut self) {
        let lrate = self.config.lrate;
        let node_origins: Vec<((i32, i32), i32)> = self
            .map
            .nodes()
            .iter()
            .map(|n| (n.origin, n.resolution as i32))
            .collect();

        for (origin, resolution) in node_origins {
            for ly in 0..resolution {
                for lx in 0..resolution {
                    if let Some(cell) = self.map.get_mut((origin.0 + lx, origin.1 + ly)) {
                        cell.discharge = (1.0 - lrate) * cell.discharge + lrate * cell.discharge_track;
                        cell.momentum_x =
                            (1.0 - lrate) * cell.momentum_x + lrate * cell.momentum_x_track;
                        cell.momentum_y =
                            (1.0 - lrate) * cell.momentum_y + lrate * cell.momentum_y_track;
                    }
                }
            }
        }
    }

    fn discharge_stats(&self) -> (f32, f32) {
        let res = self.map.world_resolution();
        let mut sum = 0.0f32;
        let mut max = 0.0f32;
        let mut count = 0;
        for y in 0..res {
            for x in 0..res {
                let d = self.map.discharge((x, y));
                sum += d;
                max = max.max(d);
                count += 1;
            }
        }
        if count == 0 {
            (0.0, 0.0)
        } else {
            (sum / count as f32, max)
        }
    }

    /// Read-only snapshot for a renderer between ticks: no interior
    /// mutability, so the type system enforces the read-only contract
    /// rather than a comment.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot { world: self }
    }
}

pub struct Snapshot<'a> {
    world: &'a World,
}

impl<'a> Snapshot<'a> {
    pub fn height(&self, p: (i32, i32)) -> Option<f32> {
        self.world.map.height(p)
    }

    pub fn discharge(&self, p: (i32, i32)) -> f32 {
        self.world.map.discharge(p)
    }

    pub fn momentum(&self, p: (i32, i32)) -> Option<(f32, f32)> {
        self.world.map.get(p).map(|c| (c.momentum_x, c.momentum_y))
    }

    pub fn plants(&self) -> &[Plant] {
        &self.world.plants
    }

    pub fn world_resolution(&self) -> i32 {
        self.world.map.world_resolution()
    }
}

/// Parse a seed from a CLI-provided string. On failure the caller logs the
/// condition and falls back to a wall-clock seed — this helper reports the
/// parse failure rather than panicking.
pub fn parse_seed(raw: Option<&str>) -> (u64, Option<EngineError>) {
    match raw {
        None => (wall_clock_seed(), None),
        Some(s) => match s.parse::<u64>() {
            Ok(seed) => (seed, None),
            Err(_) => (
                wall_clock_seed(),
                Some(EngineError::InvalidSeed { raw: s.to_string() }),
            ),
        },
    }
}

fn wall_clock_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::PerlinOracle;

    #[test]
    fn tick_with_zero_cycles_only_applies_ema() {
        let config = Config {
            tile_size: 8,
            map_size: 1,
            cycles_per_tick: 0,
            ..Config::default()
        };
        let oracle = PerlinOracle::new(config.seed);
        let mut world = World::new(config.clone(), &oracle, false).unwrap();

        world.map.get_mut((0, 0)).unwrap().discharge = 2.0;
        let height_before = world.map.height((0, 0)).unwrap();

        world.erode(0);

        let expected = (1.0 - config.lrate) * 2.0;
        assert!((world.map.get((0, 0)).unwrap().discharge - expected).abs() < 1e-5);
        assert_eq!(world.map.height((0, 0)).unwrap(), height_before);
    }

    #[test]
    fn ema_matches_reference_numbers_across_ticks() {
        // S4: lrate=0.1, track=10 -> discharge=1.0 after one tick,
        // ~5.22 after 7 ticks.
        let config = Config { tile_size: 4, map_size: 1, cycles_per_tick: 0, ..Config::default() };
        let oracle = PerlinOracle::new(1);
        let mut world = World::new(config, &oracle, false).unwrap();

        world.map.get_mut((0, 0)).unwrap().discharge_track = 10.0;
        world.apply_ema();
        assert!((world.map.get((0, 0)).unwrap().discharge - 1.0).abs() < 1e-5);

        for _ in 0..6 {
            world.map.get_mut((0, 0)).unwrap().discharge_track = 10.0;
            world.apply_ema();
        }
        assert!((world.map.get((0, 0)).unwrap().discharge - 5.22).abs() < 1e-2);
    }

    #[test]
    fn paused_world_skips_the_tick_entirely() {
        let config = Config { tile_size: 8, map_size: 1, ..Config::default() };
        let oracle = PerlinOracle::new(config.seed);
        let mut world = World::new(config, &oracle, false).unwrap();
        world.paused = true;
        world.erode(10);
        assert_eq!(world.ticks_run(), 0);
    }

    #[test]
    fn determinism_given_same_seed() {
        let config = Config {
            tile_size: 16,
            map_size: 1,
            cycles_per_tick: 4,
            ..Config::default()
        };
        let oracle_a = PerlinOracle::new(config.seed);
        let oracle_b = PerlinOracle::new(config.seed);
        let mut a = World::new(config.clone(), &oracle_a, false).unwrap();
        let mut b = World::new(config, &oracle_b, false).unwrap();

        for _ in 0..3 {
            a.erode(4);
            b.erode(4);
        }

        let res = a.map.world_resolution();
        for y in 0..res {
            for x in 0..res {
                assert_eq!(a.map.height((x, y)), b.map.height((x, y)));
                assert_eq!(a.map.get((x, y)).unwrap().discharge, b.map.get((x, y)).unwrap().discharge);
            }
        }
    }

    #[test]
    fn invalid_seed_falls_back_to_wall_clock() {
        let (_, err) = parse_seed(Some("not-a-number"));
        assert!(matches!(err, Some(EngineError::InvalidSeed { .. })));
        let (_, err) = parse_seed(Some("12345"));
        assert!(err.is_none());
    }

    #[test]
    fn erode_parallel_runs_and_tracks_discharge() {
        let config = Config {
            tile_size: 16,
            map_size: 1,
            cycles_per_tick: 8,
            ..Config::default()
        };
        let oracle = PerlinOracle::new(config.seed);
        let mut world = World::new(config, &oracle, false).unwrap();

        world.erode_parallel(8);
        assert_eq!(world.ticks_run(), 1);

        let res = world.map.world_resolution();
        let mut any_discharge = false;
        for y in 0..res {
            for x in 0..res {
                if world.map.get((x, y)).unwrap().discharge > 0.0 {
                    any_discharge = true;
                }
            }
        }
        assert!(any_discharge);
    }

    #[test]
    fn erode_parallel_paused_skips_tick() {
        let config = Config { tile_size: 8, map_size: 1, ..Config::default() };
        let oracle = PerlinOracle::new(config.seed);
        let mut world = World::new(config, &oracle, false).unwrap();
        world.paused = true;
        world.erode_parallel(10);
        assert_eq!(world.ticks_run(), 0);
    }
}
