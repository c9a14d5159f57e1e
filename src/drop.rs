//! A single water particle's lifecycle: spawn with zero speed and unit
//! volume, [`Drop::descend`] repeatedly until it reports termination. This
//! is the hottest loop in the simulation — cycles_per_tick times the node
//! count times however many steps each drop survives — so everything here
//! stays on the stack and avoids allocation.

use crate::cascade;
use crate::cellpool::{FieldSnapshot, Map};
use crate::config::Config;
use crate::mathutil::Vec2;
use std::collections::VecDeque;

/// Per-cell deltas produced by one droplet run against a frozen
/// [`FieldSnapshot`] (see `World::erode_parallel`). Kept as flat vectors
/// rather than a map — a single drop touches at most `max_age + 1` cells,
/// so the caller merges these into a shared accumulator far more cheaply
/// than this function could build one itself under contention.
#[derive(Default)]
pub struct DropBatchResult {
    pub height_deltas: Vec<((i32, i32), f32)>,
    pub track_deltas: Vec<((i32, i32), f32, f32, f32)>,
}

#[derive(Clone, Copy, Debug)]
pub struct Drop {
    pub pos: Vec2,
    pub speed: Vec2,
    pub volume: f32,
    pub sediment: f32,
    pub age: u32,
}

impl Drop {
    pub fn new(pos: Vec2) -> Self {
        Self {
            pos,
            speed: Vec2::ZERO,
            volume: 1.0,
            sediment: 0.0,
            age: 0,
        }
    }

    fn ipos(&self) -> (i32, i32) {
        (self.pos.x.floor() as i32, self.pos.y.floor() as i32)
    }

    /// Advance the drop by one cell step. Returns `true` if the caller
    /// should call this again, `false` once the drop has terminated (either
    /// absorbed into the terrain or lost past the world boundary).
    pub fn descend(&mut self, map: &mut Map, config: &Config) -> bool {
        let ipos = self.ipos();

        if map.get(ipos).is_none() {
            return false;
        }
        let normal = map.normal(ipos);

        if self.age > config.max_age || self.volume < config.min_vol {
            if let Some(cell) = map.get_mut(ipos) {
                cell.height += self.sediment;
            }
            return false;
        }

        let root_density = map.get(ipos).map(|c| c.root_density).unwrap_or(0.0);
        let eff_d = config.deposition_rate * (1.0 - root_density.clamp(0.0, 1.0));

        // Gravity: the horizontal components of the surface normal pull the
        // drop downslope, scaled inversely by volume (heavier drops respond
        // more sluggishly).
        self.speed = self
            .speed
            .add(Vec2::new(normal.x, normal.z).scale(config.gravity / self.volume));

        // Momentum-transfer force: couples to the established flow field so
        // drops moving with a channel are amplified and drops moving
        // against it are damped.
        let field = map
            .get(ipos)
            .map(|c| Vec2::new(c.momentum_x, c.momentum_y))
            .unwrap_or(Vec2::ZERO);
        if field.length() > 0.0 && self.speed.length() > 0.0 {
            let alignment = field.normalize().dot(self.speed.normalize());
            let discharge = map.discharge(ipos);
            self.speed = self.speed.add(
                field.scale(config.momentum_transfer * alignment / (self.volume + discharge)),
            );
        }

        if self.speed.length() > 0.0 {
            self.speed = self.speed.normalize().scale(2f32.sqrt());
        }

        self.pos = self.pos.add(self.speed);

        if let Some(cell) = map.get_mut(ipos) {
            cell.discharge_track += self.volume;
            cell.momentum_x_track += self.volume * self.speed.x;
            cell.momentum_y_track += self.volume * self.speed.y;
        }

        let newpos = self.ipos();
        let h1 = map.height(ipos).unwrap_or(0.0);
        let h2 = map.height(newpos).unwrap_or(h1 - 0.003);

        let discharge_at_ipos = map.discharge(ipos);
        let c_eq = ((1.0 + config.entrainment * discharge_at_ipos) * (h1 - h2)).max(0.0);
        let cdiff = c_eq - self.sediment;
        self.sediment += eff_d * cdiff;
        if let Some(cell) = map.get_mut(ipos) {
            cell.height -= eff_d * cdiff;
        }

        self.sediment /= 1.0 - config.evap_rate;
        self.volume *= 1.0 - config.evap_rate;

        if map.get(newpos).is_none() {
            self.volume = 0.0;
            return false;
        }

        cascade::cascade(map, newpos, config);

        self.age += 1;
        true
    }

    /// True when the drop is effectively stationary (candidate for the
    /// flood operator): negligible speed but still carrying volume.
    pub fn is_trapped(&self) -> bool {
        self.speed.length() < 1e-4 && self.volume > 0.0
    }

    /// Grow a connected pool at the drop's current position under a rising
    /// water plane. Implemented as an explicit breadth-first work queue
    /// rather than recursion so lake size is bounded only by queue growth,
    /// never call-stack depth.
    pub fn flood(&mut self, map: &mut Map, config: &Config) {
        let ipos = self.ipos();
        let Some(cell) = map.get(ipos) else { return };
        let initial_plane = cell.height + cell.pool;
        let mut plane = initial_plane;

        let mut fail = config.flood_max_fail;

        loop {
            let mut visited: std::collections::HashSet<(i32, i32)> = std::collections::HashSet::new();
            let mut flood_set: Vec<(i32, i32)> = Vec::new();
            let mut boundary: Vec<((i32, i32), f32)> = Vec::new();
            let mut drain: Option<((i32, i32), f32)> = None;

            let mut queue: VecDeque<(i32, i32)> = VecDeque::new();
            queue.push_back(ipos);
            visited.insert(ipos);

            while let Some(p) = queue.pop_front() {
                let Some(c) = map.get(p) else { continue };
                let level = c.height + c.pool;

                // A drainage point is judged against the plane this flood()
                // call started at, not the one raised by prior commits in
                // this loop -- otherwise every cell just filled to the old
                // plane would read as "below" the newly-raised one and the
                // flood would drain into itself after its first commit.
                if level < initial_plane {
                    let replace = match drain {
                        Some((_, best)) => level < best,
                        None => true,
                    };
                    if replace {
                        drain = Some((p, level));
                    }
                    continue;
                }

                flood_set.push(p);

                for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)] {
                    let q = (p.0 + dx, p.1 + dy);
                    if visited.contains(&q) {
                        continue;
                    }
                    visited.insert(q);
                    match map.get(q) {
                        None => continue,
                        Some(qc) => {
                            let qlevel = qc.height + qc.pool;
                            if qlevel <= plane {
                                queue.push_back(q);
                            } else {
                                boundary.push((q, qlevel));
                            }
                        }
                    }
                }
            }

            if let Some((drain_pos, drain_level)) = drain {
                let delta = config.flood_delta;
                self.pos = Vec2::new(drain_pos.0 as f32, drain_pos.1 as f32);
                let mixed_plane = (1.0 - delta) * plane + delta * drain_level;
                for p in &flood_set {
                    if let Some(c) = map.get_mut(*p) {
                        c.pool = mixed_plane - c.height;
                    }
                }
                return;
            }

            let t_vol: f32 = config.flood_volume_factor
                * flood_set
                    .iter()
                    .filter_map(|p| map.get(*p))
                    .map(|c| plane - (c.height + c.pool))
                    .sum::<f32>();

            if t_vol <= self.volume {
                for p in &flood_set {
                    if let Some(c) = map.get_mut(*p) {
                        c.pool = plane - c.height;
                    }
                }
                self.volume -= t_vol;
                if !flood_set.is_empty() {
                    plane += 0.5 * (self.volume - t_vol) / flood_set.len() as f32
                        / config.flood_volume_factor;
                }
                if t_vol >= self.volume {
                    return;
                }
            } else {
                fail -= 1;
                if fail == 0 {
                    self.volume = 0.0;
                    return;
                }
            }
        }
    }

    /// Run one droplet's full trajectory to termination against a frozen
    /// [`FieldSnapshot`] instead of the live `Map`, accumulating its height
    /// and track writes into a [`DropBatchResult`] rather than applying them
    /// immediately. This is the unit of work batched across threads by
    /// `World::erode_parallel`; it never mutates the snapshot, so many of
    /// these can run concurrently over the same frozen fields. Cascade and
    /// flood are skipped here — both mutate neighbor cells mid-descent,
    /// which the snapshot model cannot express — and are replayed serially
    /// by the caller after all batch deltas are merged.
    pub fn run_against_snapshot(spawn: Vec2, snapshot: &FieldSnapshot, config: &Config) -> DropBatchResult {
        let mut drop = Drop::new(spawn);
        let mut result = DropBatchResult::default();

        loop {
            let ipos = drop.ipos();
            let Some(h1) = snapshot.height(ipos) else { break };
            let normal = snapshot.normal(ipos);

            if drop.age > config.max_age || drop.volume < config.min_vol {
                result.height_deltas.push((ipos, drop.sediment));
                break;
            }

            let root_density = snapshot.root_density(ipos);
            let eff_d = config.deposition_rate * (1.0 - root_density.clamp(0.0, 1.0));

            drop.speed = drop
                .speed
                .add(Vec2::new(normal.x, normal.z).scale(config.gravity / drop.volume));

            let field = snapshot
                .momentum(ipos)
                .map(|(mx, my)| Vec2::new(mx, my))
                .unwrap_or(Vec2::ZERO);
            if field.length() > 0.0 && drop.speed.length() > 0.0 {
                let alignment = field.normalize().dot(drop.speed.normalize());
                let discharge = snapshot.discharge(ipos);
                drop.speed = drop.speed.add(
                    field.scale(config.momentum_transfer * alignment / (drop.volume + discharge)),
                );
            }

            if drop.speed.length() > 0.0 {
                drop.speed = drop.speed.normalize().scale(2f32.sqrt());
            }

            drop.pos = drop.pos.add(drop.speed);

            result.track_deltas.push((
                ipos,
                drop.volume,
                drop.volume * drop.speed.x,
                drop.volume * drop.speed.y,
            ));

            let newpos = drop.ipos();
            let h2 = snapshot.height(newpos).unwrap_or(h1 - 0.003);

            let discharge_at_ipos = snapshot.discharge(ipos);
            let c_eq = ((1.0 + config.entrainment * discharge_at_ipos) * (h1 - h2)).max(0.0);
            let cdiff = c_eq - drop.sediment;
            drop.sediment += eff_d * cdiff;
            result.height_deltas.push((ipos, -eff_d * cdiff));

            drop.sediment /= 1.0 - config.evap_rate;
            drop.volume *= 1.0 - config.evap_rate;

            if snapshot.height(newpos).is_none() {
                break;
            }

            drop.age += 1;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_terminates_within_max_age_plus_one_steps() {
        let mut map = Map::new(16, 1, 80.0).unwrap();
        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(8.0, 8.0));
        let mut steps = 0;
        while drop.descend(&mut map, &config) {
            steps += 1;
            assert!(steps <= config.max_age + 1, "drop failed to terminate");
        }
    }

    #[test]
    fn flat_terrain_single_drop_does_not_corrupt_bounds() {
        // S1: flat terrain, one drop, must terminate and never write OOB.
        let mut map = Map::new(16, 1, 80.0).unwrap();
        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(8.0, 8.0));
        while drop.descend(&mut map, &config) {}
        assert!(drop.age <= config.max_age + 1);
    }

    #[test]
    fn unit_slope_drifts_toward_descent_and_tracks_discharge() {
        // S2: h(x,y) = 1 - x/16, drop drifts toward +x.
        let mut map = Map::new(16, 1, 80.0).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                map.get_mut((x, y)).unwrap().height = 1.0 - x as f32 / 16.0;
            }
        }
        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(1.0, 8.0));
        let start_x = drop.pos.x;
        let mut iterations = 0;
        while drop.descend(&mut map, &config) && iterations < 50 {
            iterations += 1;
        }
        assert!(drop.pos.x >= start_x);

        let mut any_discharge_tracked = false;
        for x in 1..15 {
            if map.get((x, 8)).unwrap().discharge_track > 0.0 {
                any_discharge_tracked = true;
            }
        }
        assert!(any_discharge_tracked);
    }

    #[test]
    fn boundary_flux_zeroes_volume_and_never_writes_oob() {
        // S6: drop reaching the edge sets volume=0, returns false, no OOB writes.
        let mut map = Map::new(4, 1, 80.0).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                // steep downhill slope toward the +x boundary
                map.get_mut((x, y)).unwrap().height = -(x as f32);
            }
        }
        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(2.5, 2.0));
        let mut iterations = 0;
        while drop.descend(&mut map, &config) && iterations < 100 {
            iterations += 1;
        }
        // terminated one way or another; volume is finite either way.
        assert!(drop.volume.is_finite());
        assert!(drop.volume >= 0.0);
    }

    #[test]
    fn snapshot_descent_is_deterministic_and_bounded() {
        let mut map = Map::new(16, 1, 80.0).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                map.get_mut((x, y)).unwrap().height = 1.0 - x as f32 / 16.0;
            }
        }
        let config = Config::default();
        let snapshot = FieldSnapshot::capture(&map);

        let a = Drop::run_against_snapshot(Vec2::new(1.0, 8.0), &snapshot, &config);
        let b = Drop::run_against_snapshot(Vec2::new(1.0, 8.0), &snapshot, &config);

        assert_eq!(a.height_deltas.len(), b.height_deltas.len());
        assert_eq!(a.track_deltas.len(), b.track_deltas.len());
        assert!(!a.track_deltas.is_empty());
        for ((pa, ha), (pb, hb)) in a.height_deltas.iter().zip(b.height_deltas.iter()) {
            assert_eq!(pa, pb);
            assert_eq!(ha, hb);
        }
    }

    const RING: [(i32, i32); 8] = [
        (-1, 0),
        (1, 0),
        (0, -1),
        (0, 1),
        (-1, -1),
        (1, -1),
        (-1, 1),
        (1, 1),
    ];

    #[test]
    fn flood_finds_a_drain_and_moves_the_drop_there() {
        let mut map = Map::new(16, 1, 80.0).unwrap();
        let (cx, cy) = (8, 8);
        map.get_mut((cx, cy)).unwrap().height = 1.0;
        for (dx, dy) in RING {
            map.get_mut((cx + dx, cy + dy)).unwrap().height = 2.0;
        }
        // one neighbor is a drainage channel, strictly below the seed height.
        map.get_mut((cx + 1, cy)).unwrap().height = 0.5;

        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(cx as f32, cy as f32));
        let volume_before = drop.volume;

        drop.flood(&mut map, &config);

        assert_eq!(drop.pos, Vec2::new((cx + 1) as f32, cy as f32));
        // draining relocates the drop but never consumes volume -- only a
        // commit does that.
        assert_eq!(drop.volume, volume_before);

        // the seed cell settles just under the drain-mixed plane; the
        // delta-scaled undershoot (`flood_delta`) is the only slack the
        // slowly-mixed plane allows, never more.
        let pool = map.get((cx, cy)).unwrap().pool;
        assert!(pool <= 0.0);
        assert!(pool >= -config.flood_delta);
    }

    #[test]
    fn flood_commit_raises_the_plane_and_grows_the_set_before_converging() {
        // basin: seed at height 0, an 8-neighbor ring at height 0.2, and
        // walls (height 10) two cells out that no plane this scenario
        // reaches will ever pull in. The first pass through the loop is
        // always a zero-volume probe (the set is judged against the plane
        // it already sits at), so seeing a real, positive pool here proves
        // a second, plane-raised pass committed.
        let mut map = Map::new(16, 1, 80.0).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                map.get_mut((x, y)).unwrap().height = 10.0;
            }
        }
        let (cx, cy) = (8, 8);
        map.get_mut((cx, cy)).unwrap().height = 0.0;
        for (dx, dy) in RING {
            map.get_mut((cx + dx, cy + dy)).unwrap().height = 0.2;
        }

        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(cx as f32, cy as f32));
        drop.volume = 0.22;
        let volume_before = drop.volume;

        drop.flood(&mut map, &config);

        assert!(drop.volume < volume_before);
        assert!(drop.volume >= 0.0);

        let center_pool = map.get((cx, cy)).unwrap().pool;
        assert!(center_pool > 0.0);
        let mut ring_pool_sum = 0.0;
        for (dx, dy) in RING {
            let pool = map.get((cx + dx, cy + dy)).unwrap().pool;
            assert!(pool >= 0.0, "flood must never leave a negative pool");
            ring_pool_sum += pool;
        }

        // volume conservation: the geometric fill this committed, scaled by
        // flood_volume_factor, equals the volume actually withdrawn from
        // the drop -- the same quantity computed two different ways.
        let consumed = volume_before - drop.volume;
        let geometric_fill = center_pool + ring_pool_sum;
        assert!((config.flood_volume_factor * geometric_fill - consumed).abs() < 1e-4);

        // the walls two cells out never joined the flood set.
        assert_eq!(map.get((cx + 2, cy)).unwrap().pool, 0.0);
    }

    #[test]
    fn flood_gives_up_after_flood_max_fail_attempts_and_zeroes_volume() {
        // seed plus an 8-ring just high enough, and a drop volume just
        // small enough, that every real pass after the no-op probe needs
        // more water than the drop carries -- deterministically, since
        // nothing in the scenario changes between failed attempts.
        let mut map = Map::new(16, 1, 80.0).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                map.get_mut((x, y)).unwrap().height = 100.0;
            }
        }
        let (cx, cy) = (8, 8);
        map.get_mut((cx, cy)).unwrap().height = 0.0;
        for (dx, dy) in RING {
            map.get_mut((cx + dx, cy + dy)).unwrap().height = 1.0;
        }

        let config = Config {
            flood_max_fail: 3,
            ..Config::default()
        };
        let mut drop = Drop::new(Vec2::new(cx as f32, cy as f32));
        drop.volume = 2.0;

        drop.flood(&mut map, &config);

        assert_eq!(drop.volume, 0.0);
        // every failed attempt is rejected before ever writing a pool.
        assert_eq!(map.get((cx, cy)).unwrap().pool, 0.0);
        for (dx, dy) in RING {
            assert_eq!(map.get((cx + dx, cy + dy)).unwrap().pool, 0.0);
        }
    }

    #[test]
    fn flood_set_is_reachable_from_the_seed_by_adjacency() {
        // connectivity: every member the commit in the basin test above
        // writes a pool into is either the seed or one of its direct
        // 8-neighbors, i.e. reachable from the seed in a single BFS hop --
        // nothing disconnected ever gets pulled in.
        let mut map = Map::new(16, 1, 80.0).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                map.get_mut((x, y)).unwrap().height = 10.0;
            }
        }
        let (cx, cy) = (8, 8);
        map.get_mut((cx, cy)).unwrap().height = 0.0;
        for (dx, dy) in RING {
            map.get_mut((cx + dx, cy + dy)).unwrap().height = 0.2;
        }

        let config = Config::default();
        let mut drop = Drop::new(Vec2::new(cx as f32, cy as f32));
        drop.volume = 0.22;
        drop.flood(&mut map, &config);

        let mut touched = Vec::new();
        for y in 0..16 {
            for x in 0..16 {
                if map.get((x, y)).unwrap().pool > 0.0 {
                    touched.push((x as i32, y as i32));
                }
            }
        }
        assert!(!touched.is_empty());
        for &(x, y) in &touched {
            let adjacent_to_seed = (x - cx as i32).abs() <= 1 && (y - cy as i32).abs() <= 1;
            assert!(adjacent_to_seed, "flood set member {:?} is not adjacent to the seed", (x, y));
        }
    }
}
