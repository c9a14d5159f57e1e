//! Arena-backed grid storage: a [`Pool`] owns one contiguous run of [`Cell`]
//! records, tiles ([`Node`]s) carve out sub-ranges of it, and a [`Map`]
//! indexes world-space positions down to the owning tile and cell. This is
//! the Rust shape of the C++ `mappool` arena: no cell is ever individually
//! freed, only the whole pool at shutdown.

use crate::error::EngineError;
use crate::mathutil::Vec3;

/// Per-cell simulation state. Interleaved (all fields of one cell live next
/// to each other) because the descent step touches every field of a cell in
/// one pass; a struct-of-arrays layout would just add indirection here.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cell {
    pub height: f32,
    pub discharge: f32,
    pub momentum_x: f32,
    pub momentum_y: f32,
    pub discharge_track: f32,
    pub momentum_x_track: f32,
    pub momentum_y_track: f32,
    pub root_density: f32,
    /// Standing water depth written by the flood operator. Zero unless
    /// `config.flood_enabled`.
    pub pool: f32,
}

impl Cell {
    pub fn reset_tracks(&mut self) {
        self.discharge_track = 0.0;
        self.momentum_x_track = 0.0;
        self.momentum_y_track = 0.0;
    }

    /// Bounded, saturating transform of the raw low-passed discharge into
    /// `[0, 1)`. See `Map::discharge`.
    pub fn bounded_discharge(&self) -> f32 {
        crate::mathutil::erf(0.4 * self.discharge.max(0.0))
    }
}

/// A contiguous run of cells handed out by a [`Pool`]. Never individually
/// freed; the whole pool is dropped at shutdown.
#[derive(Clone, Copy, Debug)]
pub struct CellRange {
    pub start: usize,
    pub len: usize,
}

/// The cell arena. Reserved once at startup, released as a unit at shutdown.
pub struct Pool {
    cells: Vec<Cell>,
    capacity: usize,
    used: usize,
}

impl Pool {
    /// Reserve a zero-initialized buffer of `capacity` cells.
    pub fn reserve(capacity: usize) -> Self {
        Self {
            cells: vec![Cell::default(); capacity],
            capacity,
            used: 0,
        }
    }

    /// Hand out a fresh sub-range of `len` cells. Fails if the remaining
    /// capacity cannot satisfy the request; sub-ranges are never returned to
    /// the pool individually.
    pub fn alloc(&mut self, len: usize) -> Result<CellRange, EngineError> {
        if self.used + len > self.capacity {
            return Err(EngineError::PoolExhausted {
                requested: len,
                available: self.capacity - self.used,
            });
        }
        let start = self.used;
        self.used += len;
        Ok(CellRange { start, len })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn cells(&self, range: CellRange) -> &[Cell] {
        &self.cells[range.start..range.start + range.len]
    }

    fn cells_mut(&mut self, range: CellRange) -> &mut [Cell] {
        &mut self.cells[range.start..range.start + range.len]
    }
}

/// A non-owning 2D view over a pool-allocated run of cells.
pub struct Slice<'a> {
    cells: &'a [Cell],
    resolution: usize,
}

impl<'a> Slice<'a> {
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn oob(&self, p: (i32, i32)) -> bool {
        p.0 < 0 || p.1 < 0 || p.0 >= self.resolution as i32 || p.1 >= self.resolution as i32
    }

    pub fn get(&self, p: (i32, i32)) -> Option<&Cell> {
        if self.oob(p) {
            return None;
        }
        let idx = p.1 as usize * self.resolution + p.0 as usize;
        self.cells.get(idx)
    }
}

/// Mutable counterpart of [`Slice`].
pub struct SliceMut<'a> {
    cells: &'a mut [Cell],
    resolution: usize,
}

impl<'a> SliceMut<'a> {
    pub fn oob(&self, p: (i32, i32)) -> bool {
        p.0 < 0 || p.1 < 0 || p.0 >= self.resolution as i32 || p.1 >= self.resolution as i32
    }

    pub fn get_mut(&mut self, p: (i32, i32)) -> Option<&mut Cell> {
        if self.oob(p) {
            return None;
        }
        let idx = p.1 as usize * self.resolution + p.0 as usize;
        self.cells.get_mut(idx)
    }
}

/// A tile: a world-space origin plus the pool range backing its cells. The
/// renderer handle is opaque to the simulation; nothing here reads it.
pub struct Node {
    pub origin: (i32, i32),
    pub range: CellRange,
    pub resolution: usize,
    pub renderer_handle: Option<u64>,
}

/// The world: an ordered collection of tiles over a shared cell pool.
pub struct Map {
    pool: Pool,
    nodes: Vec<Node>,
    pub tile_size: usize,
    pub map_size: usize,
    pub map_scale: f32,
}

impl Map {
    /// Allocate a `map_size x map_size` grid of `tile_size x tile_size`
    /// tiles from a freshly reserved pool.
    pub fn new(tile_size: usize, map_size: usize, map_scale: f32) -> Result<Self, EngineError> {
        let tile_area = tile_size * tile_size;
        let total = tile_area * map_size * map_size;
        let pool = Pool::reserve(total);
        Self::from_pool(pool, tile_size, map_size, map_scale)
    }

    /// Build a map's tiles by allocating out of an already-reserved pool.
    /// `new` always reserves exactly the pool this needs, so `alloc` can
    /// never fail through that path; this entry point exists so a caller
    /// (in particular, a test) can hand in an undersized pool and exercise
    /// the `PoolExhausted` propagation below directly.
    pub fn from_pool(
        mut pool: Pool,
        tile_size: usize,
        map_size: usize,
        map_scale: f32,
    ) -> Result<Self, EngineError> {
        let tile_area = tile_size * tile_size;
        let mut nodes = Vec::with_capacity(map_size * map_size);
        for ty in 0..map_size {
            for tx in 0..map_size {
                let range = pool.alloc(tile_area)?;
                nodes.push(Node {
                    origin: ((tx * tile_size) as i32, (ty * tile_size) as i32),
                    range,
                    resolution: tile_size,
                    renderer_handle: None,
                });
            }
        }
        Ok(Self {
            pool,
            nodes,
            tile_size,
            map_size,
            map_scale,
        })
    }

    pub fn world_resolution(&self) -> i32 {
        (self.tile_size * self.map_size) as i32
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn node_index_at(&self, p: (i32, i32)) -> Option<usize> {
        let res = self.world_resolution();
        if p.0 < 0 || p.1 < 0 || p.0 >= res || p.1 >= res {
            return None;
        }
        let tx = p.0 as usize / self.tile_size;
        let ty = p.1 as usize / self.tile_size;
        if tx >= self.map_size || ty >= self.map_size {
            return None;
        }
        Some(ty * self.map_size + tx)
    }

    /// Total out-of-bounds check: true for any position outside the world.
    pub fn oob(&self, p: (i32, i32)) -> bool {
        self.node_index_at(p).is_none()
    }

    pub fn get(&self, p: (i32, i32)) -> Option<&Cell> {
        let idx = self.node_index_at(p)?;
        let node = &self.nodes[idx];
        let local = (p.0 - node.origin.0, p.1 - node.origin.1);
        let slice = Slice {
            cells: self.pool.cells(node.range),
            resolution: node.resolution,
        };
        slice.get(local)
    }

    pub fn get_mut(&mut self, p: (i32, i32)) -> Option<&mut Cell> {
        let idx = self.node_index_at(p)?;
        let node = &self.nodes[idx];
        let local = (p.0 - node.origin.0, p.1 - node.origin.1);
        let resolution = node.resolution;
        let range = node.range;
        let mut slice = SliceMut {
            cells: self.pool.cells_mut(range),
            resolution,
        };
        slice.get_mut(local)
    }

    pub fn height(&self, p: (i32, i32)) -> Option<f32> {
        self.get(p).map(|c| c.height)
    }

    /// Visible discharge: `erf(0.4 * raw)`, saturating into `[0, 1)`.
    pub fn discharge(&self, p: (i32, i32)) -> f32 {
        self.get(p).map(|c| c.bounded_discharge()).unwrap_or(0.0)
    }

    /// Surface normal at `p`: the sum of four cross products formed from
    /// the height differences to the `+-x`/`+-y` neighbors, each weighted by
    /// `map_scale`, each gated by an independent in-bounds check. Falls back
    /// to the up vector where the result has zero length (including on
    /// perfectly flat terrain).
    pub fn normal(&self, p: (i32, i32)) -> Vec3 {
        let h = match self.height(p) {
            Some(h) => h,
            None => return Vec3::UP,
        };
        let s = self.map_scale;
        let (x, y) = p;

        let h_px = self.height((x + 1, y));
        let h_mx = self.height((x - 1, y));
        let h_py = self.height((x, y + 1));
        let h_my = self.height((x, y - 1));

        let mut n = Vec3::default();

        if let Some(h_py) = h_py {
            if let Some(h_px) = h_px {
                let a = Vec3::new(0.0, s * (h_py - h), 1.0);
                let b = Vec3::new(1.0, s * (h_px - h), 0.0);
                n = n.add(a.cross(b));
            }
        }
        if let Some(h_my) = h_my {
            if let Some(h_mx) = h_mx {
                let a = Vec3::new(0.0, s * (h_my - h), -1.0);
                let b = Vec3::new(-1.0, s * (h_mx - h), 0.0);
                n = n.add(a.cross(b));
            }
        }
        if let Some(h_px) = h_px {
            if let Some(h_my) = h_my {
                let a = Vec3::new(1.0, s * (h_px - h), 0.0);
                let b = Vec3::new(0.0, s * (h_my - h), -1.0);
                n = n.add(a.cross(b));
            }
        }
        if let Some(h_mx) = h_mx {
            if let Some(h_py) = h_py {
                let a = Vec3::new(-1.0, s * (h_mx - h), 0.0);
                let b = Vec3::new(0.0, s * (h_py - h), 1.0);
                n = n.add(a.cross(b));
            }
        }

        if n.length() > 0.0 {
            n.normalize()
        } else {
            Vec3::UP
        }
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }
}

/// A flat, read-only copy of the fields a drop's descent needs, taken once
/// per parallel batch (see `World::erode_parallel`). Letting each droplet
/// read a frozen snapshot instead of the live `Map` is what makes running a
/// batch of droplets across threads sound: no droplet observes another
/// droplet's in-flight writes, matching the grounding repo's
/// `hydraulic::simulate_parallel` snapshot-then-merge shape.
pub struct FieldSnapshot {
    resolution: i32,
    map_scale: f32,
    height: Vec<f32>,
    momentum_x: Vec<f32>,
    momentum_y: Vec<f32>,
    discharge: Vec<f32>,
    root_density: Vec<f32>,
}

impl FieldSnapshot {
    pub fn capture(map: &Map) -> Self {
        let res = map.world_resolution();
        let n = (res * res) as usize;
        let mut height = vec![0.0; n];
        let mut momentum_x = vec![0.0; n];
        let mut momentum_y = vec![0.0; n];
        let mut discharge = vec![0.0; n];
        let mut root_density = vec![0.0; n];

        for y in 0..res {
            for x in 0..res {
                let idx = (y * res + x) as usize;
                if let Some(cell) = map.get((x, y)) {
                    height[idx] = cell.height;
                    momentum_x[idx] = cell.momentum_x;
                    momentum_y[idx] = cell.momentum_y;
                    discharge[idx] = cell.bounded_discharge();
                    root_density[idx] = cell.root_density;
                }
            }
        }

        Self {
            resolution: res,
            map_scale: map.map_scale,
            height,
            momentum_x,
            momentum_y,
            discharge,
            root_density,
        }
    }

    pub fn resolution(&self) -> i32 {
        self.resolution
    }

    fn idx(&self, p: (i32, i32)) -> Option<usize> {
        if p.0 < 0 || p.1 < 0 || p.0 >= self.resolution || p.1 >= self.resolution {
            return None;
        }
        Some((p.1 * self.resolution + p.0) as usize)
    }

    pub fn height(&self, p: (i32, i32)) -> Option<f32> {
        self.idx(p).map(|i| self.height[i])
    }

    pub fn momentum(&self, p: (i32, i32)) -> Option<(f32, f32)> {
        self.idx(p).map(|i| (self.momentum_x[i], self.momentum_y[i]))
    }

    pub fn discharge(&self, p: (i32, i32)) -> f32 {
        self.idx(p).map(|i| self.discharge[i]).unwrap_or(0.0)
    }

    pub fn root_density(&self, p: (i32, i32)) -> f32 {
        self.idx(p).map(|i| self.root_density[i]).unwrap_or(0.0)
    }

    /// Surface normal computed the same way as `Map::normal`, but against
    /// this frozen snapshot.
    pub fn normal(&self, p: (i32, i32)) -> Vec3 {
        let h = match self.height(p) {
            Some(h) => h,
            None => return Vec3::UP,
        };
        let s = self.map_scale;
        let (x, y) = p;

        let h_px = self.height((x + 1, y));
        let h_mx = self.height((x - 1, y));
        let h_py = self.height((x, y + 1));
        let h_my = self.height((x, y - 1));

        let mut n = Vec3::default();

        if let (Some(h_py), Some(h_px)) = (h_py, h_px) {
            let a = Vec3::new(0.0, s * (h_py - h), 1.0);
            let b = Vec3::new(1.0, s * (h_px - h), 0.0);
            n = n.add(a.cross(b));
        }
        if let (Some(h_my), Some(h_mx)) = (h_my, h_mx) {
            let a = Vec3::new(0.0, s * (h_my - h), -1.0);
            let b = Vec3::new(-1.0, s * (h_mx - h), 0.0);
            n = n.add(a.cross(b));
        }
        if let (Some(h_px), Some(h_my)) = (h_px, h_my) {
            let a = Vec3::new(1.0, s * (h_px - h), 0.0);
            let b = Vec3::new(0.0, s * (h_my - h), -1.0);
            n = n.add(a.cross(b));
        }
        if let (Some(h_mx), Some(h_py)) = (h_mx, h_py) {
            let a = Vec3::new(-1.0, s * (h_mx - h), 0.0);
            let b = Vec3::new(0.0, s * (h_py - h), 1.0);
            n = n.add(a.cross(b));
        }

        if n.length() > 0.0 {
            n.normalize()
        } else {
            Vec3::UP
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_fatal() {
        let mut pool = Pool::reserve(10);
        assert!(pool.alloc(5).is_ok());
        assert!(pool.alloc(5).is_ok());
        assert!(matches!(pool.alloc(1), Err(EngineError::PoolExhausted { .. })));
    }

    #[test]
    fn map_bounds_are_total() {
        let map = Map::new(8, 1, 80.0).unwrap();
        assert!(map.get((-1, 0)).is_none());
        assert!(map.get((8, 0)).is_none());
        assert!(map.get((0, 8)).is_none());
        assert!(map.get((0, 0)).is_some());
        assert!(map.get((7, 7)).is_some());
    }

    #[test]
    fn multi_tile_world_covers_whole_extent() {
        let map = Map::new(4, 2, 80.0).unwrap();
        assert_eq!(map.world_resolution(), 8);
        for y in 0..8 {
            for x in 0..8 {
                assert!(map.get((x, y)).is_some());
            }
        }
        assert!(map.get((8, 0)).is_none());
    }

    #[test]
    fn normal_on_flat_terrain_is_up() {
        let map = Map::new(8, 1, 80.0).unwrap();
        // Default cells are all height 0.0: perfectly flat.
        assert_eq!(map.normal((3, 3)), Vec3::UP);
    }

    #[test]
    fn bounded_discharge_is_monotone_and_saturating() {
        let mut map = Map::new(4, 1, 80.0).unwrap();
        map.get_mut((0, 0)).unwrap().discharge = 1.0;
        map.get_mut((1, 0)).unwrap().discharge = 5.0;
        let d0 = map.discharge((0, 0));
        let d1 = map.discharge((1, 0));
        assert!(d0 >= 0.0 && d0 < 1.0);
        assert!(d1 >= 0.0 && d1 < 1.0);
        assert!(d1 > d0);
    }

    #[test]
    fn map_new_succeeds_when_pool_exactly_fits() {
        assert!(Map::new(512, 1, 80.0).is_ok());
    }

    #[test]
    fn pool_exhaustion_reported_from_map_construction() {
        // `Map::new` always reserves exactly the pool it needs, so drive the
        // `PoolExhausted` propagation through `from_pool` with a pool that's
        // one cell short of a single 4x4 tile.
        let undersized = Pool::reserve(4 * 4 - 1);
        let err = Map::from_pool(undersized, 4, 1, 80.0).unwrap_err();
        assert!(matches!(err, EngineError::PoolExhausted { requested: 16, available: 15 }));
    }

    #[test]
    fn field_snapshot_matches_live_map_and_is_bounds_total() {
        let mut map = Map::new(8, 1, 80.0).unwrap();
        map.get_mut((2, 2)).unwrap().height = 0.7;
        map.get_mut((2, 2)).unwrap().discharge = 2.0;
        map.get_mut((2, 2)).unwrap().root_density = 0.4;

        let snapshot = FieldSnapshot::capture(&map);
        assert_eq!(snapshot.height((2, 2)), Some(0.7));
        assert_eq!(snapshot.root_density((2, 2)), 0.4);
        assert_eq!(snapshot.discharge((2, 2)), map.discharge((2, 2)));
        assert!(snapshot.height((-1, 0)).is_none());
        assert_eq!(snapshot.discharge((8, 8)), 0.0);
        assert_eq!(snapshot.normal((100, 100)), Vec3::UP);
    }
}
