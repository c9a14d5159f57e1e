//! Plants couple to the terrain through root density: a stencil written
//! into nearby cells on creation (and removed on death) that the descent
//! step reads back to damp local erosion. The model itself is intentionally
//! small — one spawn/death/spread check per tick, driven by discharge and
//! slope gates.

use crate::cellpool::Map;
use crate::config::Config;
use crate::mathutil::Vec2;
use rand::Rng;

/// Root stencil weights: center cell, the four axis-neighbors, the four
/// diagonal neighbors.
const STENCIL: [((i32, i32), f32); 9] = [
    ((0, 0), 1.0),
    ((1, 0), 0.6),
    ((-1, 0), 0.6),
    ((0, 1), 0.6),
    ((0, -1), 0.6),
    ((1, 1), 0.4),
    ((1, -1), 0.4),
    ((-1, 1), 0.4),
    ((-1, -1), 0.4),
];

#[derive(Clone, Copy, Debug)]
pub struct Plant {
    pub pos: Vec2,
    pub size: f32,
}

impl Plant {
    fn cell_pos(&self) -> (i32, i32) {
        (self.pos.x.floor() as i32, self.pos.y.floor() as i32)
    }

    fn apply_stencil(&self, map: &mut Map, sign: f32) {
        let (cx, cy) = self.cell_pos();
        for ((dx, dy), weight) in STENCIL {
            if let Some(cell) = map.get_mut((cx + dx, cy + dy)) {
                cell.root_density = (cell.root_density + sign * weight).max(0.0);
            }
        }
    }

    fn grow(&mut self, config: &Config) {
        self.size += config.plant_grow_rate * (config.plant_max_size - self.size);
    }
}

/// True when a plant may be spawned at `p`: discharge below the gate and
/// slope no steeper than `maxSteep`.
pub fn can_spawn(map: &Map, p: (i32, i32), config: &Config) -> bool {
    if map.get(p).is_none() {
        return false;
    }
    let discharge = map.discharge(p);
    let normal = map.normal(p);
    discharge < config.plant_max_discharge && normal.y >= config.plant_max_steep
}

/// One vegetation tick: attempt a random spawn, age and check every plant
/// for death, then attempt a spread from each survivor.
pub fn step(plants: &mut Vec<Plant>, map: &mut Map, config: &Config, rng: &mut impl Rng) {
    let world_res = map.world_resolution();

    // Random spawn, one attempt per tick.
    let candidate = (rng.gen_range(0..world_res), rng.gen_range(0..world_res));
    if can_spawn(map, candidate, config) {
        let plant = Plant {
            pos: Vec2::new(candidate.0 as f32 + 0.5, candidate.1 as f32 + 0.5),
            size: 0.0,
        };
        plant.apply_stencil(map, 1.0);
        plants.push(plant);
    }

    // Age, death check, spread — iterate by index so spread can push new
    // plants without a second mutable borrow of the vector.
    let mut i = 0;
    let mut spawned: Vec<Plant> = Vec::new();
    while i < plants.len() {
        plants[i].grow(config);

        let p = plants[i].cell_pos();
        let discharge = map.discharge(p);
        let dies = discharge >= config.plant_max_discharge || rng.gen_range(0..1000) == 0;

        if dies {
            plants[i].apply_stencil(map, -1.0);
            plants.swap_remove(i);
            continue;
        }

        if rng.gen_range(0..20) == 0 {
            let offset_x = rng.gen_range(-4..=4);
            let offset_y = rng.gen_range(-4..=4);
            let child_pos = (p.0 + offset_x, p.1 + offset_y);

            let accept = match map.get(child_pos) {
                None => false,
                Some(cell) => {
                    let discharge_ok = map.discharge(child_pos) < config.plant_max_discharge;
                    let root_ok = rng.gen::<f32>() >= cell.root_density;
                    let normal = map.normal(child_pos);
                    let slope_ok = normal.y >= config.plant_max_steep;
                    discharge_ok && root_ok && slope_ok
                }
            };

            if accept {
                let child = Plant {
                    pos: Vec2::new(child_pos.0 as f32 + 0.5, child_pos.1 as f32 + 0.5),
                    size: 0.0,
                };
                child.apply_stencil(map, 1.0);
                spawned.push(child);
            }
        }

        i += 1;
    }
    plants.extend(spawned);
}
