//! Dense, bounded 3D grid of cells.

use gridforge_core::constants::{DEFAULT_SCAN_CELL_SIZE, MAX_CELLS_PER_PARTITION};
use gridforge_core::{
    BoundingArea, CellCoord, Fixed64, GridError, PartitionHandle, Result, Vector3d,
};

use crate::cell::Cell;

/// A registered grid: bounds, uniform cell size and the cell array.
///
/// Cells are stored x-fastest, then y, then z. Bounds are inclusive, so a
/// partition has `floor((max - min) / cell_size) + 1` cells per axis and a
/// zero-thickness axis still holds one layer.
///
/// Cells are grouped into cubic scan cells of `scan_cell_size` cells per axis,
/// each tracking how many of its cells are occupied.
#[derive(Debug)]
pub struct Partition {
    handle: PartitionHandle,
    generation: u32,
    bounds: BoundingArea,
    cell_size: Fixed64,
    dimensions: CellCoord,
    scan_cell_size: i32,
    scan_dimensions: CellCoord,
    scan_occupants: Vec<u32>,
    cells: Vec<Cell>,
    version: u32,
}

impl Partition {
    /// Build a partition. Validates before allocating anything.
    pub(crate) fn new(
        handle: PartitionHandle,
        generation: u32,
        bounds: BoundingArea,
        cell_size: Fixed64,
        scan_cell_size: i32,
    ) -> Result<Self> {
        if !bounds.is_valid() {
            return Err(GridError::InvalidBounds {
                min: bounds.min,
                max: bounds.max,
            });
        }
        if !cell_size.is_positive() {
            return Err(GridError::InvalidCellSize(cell_size));
        }

        let dimensions = Self::compute_dimensions(&bounds, cell_size)?;
        let scan_cell_size = if scan_cell_size > 0 {
            scan_cell_size
        } else {
            DEFAULT_SCAN_CELL_SIZE
        };
        let scan_dimensions = CellCoord::new(
            div_ceil(dimensions.x, scan_cell_size),
            div_ceil(dimensions.y, scan_cell_size),
            div_ceil(dimensions.z, scan_cell_size),
        );
        let scan_count = volume(scan_dimensions);

        let mut partition = Self {
            handle,
            generation,
            bounds,
            cell_size,
            dimensions,
            scan_cell_size,
            scan_dimensions,
            scan_occupants: vec![0; scan_count],
            cells: Vec::with_capacity(volume(dimensions)),
            version: 0,
        };

        for z in 0..dimensions.z {
            for y in 0..dimensions.y {
                for x in 0..dimensions.x {
                    let coord = CellCoord::new(x, y, z);
                    let index = partition.cells.len() as u32;
                    let position = partition.local_to_world(coord);
                    partition
                        .cells
                        .push(Cell::new(coord, position, handle, index, generation));
                }
            }
        }

        Ok(partition)
    }

    fn compute_dimensions(bounds: &BoundingArea, cell_size: Fixed64) -> Result<CellCoord> {
        let extent = bounds.size() / cell_size;
        let axis = |v: Fixed64| -> i64 { (v.raw() >> Fixed64::FRACTION_BITS) + 1 };
        let (w, h, l) = (axis(extent.x), axis(extent.y), axis(extent.z));

        let total = i128::from(w) * i128::from(h) * i128::from(l);
        if total > MAX_CELLS_PER_PARTITION as i128 {
            return Err(GridError::CapacityExceeded(format!(
                "{w}x{h}x{l} cells exceeds the limit of {MAX_CELLS_PER_PARTITION}"
            )));
        }

        // Each axis is at most the total, which fits in i32 after the check above.
        Ok(CellCoord::new(w as i32, h as i32, l as i32))
    }

    /// Handle this partition is registered under
    #[inline]
    pub const fn handle(&self) -> PartitionHandle {
        self.handle
    }

    /// Slot generation this partition was created in
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// World-space bounds (inclusive)
    #[inline]
    pub const fn bounds(&self) -> BoundingArea {
        self.bounds
    }

    /// Edge length of one cell
    #[inline]
    pub const fn cell_size(&self) -> Fixed64 {
        self.cell_size
    }

    /// Cells per axis
    #[inline]
    pub const fn dimensions(&self) -> CellCoord {
        self.dimensions
    }

    /// Cells along x
    #[inline]
    pub const fn width(&self) -> i32 {
        self.dimensions.x
    }

    /// Cells along y
    #[inline]
    pub const fn height(&self) -> i32 {
        self.dimensions.y
    }

    /// Cells along z
    #[inline]
    pub const fn length(&self) -> i32 {
        self.dimensions.z
    }

    /// Total number of cells
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Scan cell edge length in cells
    #[inline]
    pub const fn scan_cell_size(&self) -> i32 {
        self.scan_cell_size
    }

    /// Counter bumped every time a cell's observable state changes.
    #[inline]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// True if the world position lies inside the bounds.
    #[inline]
    pub fn contains(&self, pos: Vector3d) -> bool {
        self.bounds.contains(pos)
    }

    /// True if the local coordinates address a cell.
    #[inline]
    pub const fn contains_coord(&self, coord: CellCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && coord.x < self.dimensions.x
            && coord.y < self.dimensions.y
            && coord.z < self.dimensions.z
    }

    /// Linear index of a coordinate, if in bounds.
    #[inline]
    pub const fn index_of(&self, coord: CellCoord) -> Option<usize> {
        if !self.contains_coord(coord) {
            return None;
        }
        let w = self.dimensions.x as usize;
        let h = self.dimensions.y as usize;
        Some(coord.x as usize + coord.y as usize * w + coord.z as usize * w * h)
    }

    /// Bounds-checked cell access
    pub fn cell_at(&self, coord: CellCoord) -> Result<&Cell> {
        self.index_of(coord)
            .and_then(|index| self.cells.get(index))
            .ok_or(GridError::OutOfBounds(coord))
    }

    /// Local coordinates of a linear index. Indices past the end map past
    /// the array.
    #[inline]
    pub const fn coord_of_index(&self, index: u32) -> CellCoord {
        coord_from_index(index, self.dimensions)
    }

    /// Cell by linear index
    #[inline]
    pub fn cell_at_index(&self, index: u32) -> Option<&Cell> {
        self.cells.get(index as usize)
    }

    /// All cells in storage order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Local coordinates of the cell whose footprint contains `pos`.
    ///
    /// Pure fixed-point `floor((pos - min) / cell_size)`; the result is not
    /// clamped, so points outside the bounds map outside the array.
    pub fn world_to_local(&self, pos: Vector3d) -> CellCoord {
        let rel = (pos - self.bounds.min) / self.cell_size;
        CellCoord::new(
            rel.x.floor_to_int(),
            rel.y.floor_to_int(),
            rel.z.floor_to_int(),
        )
    }

    /// World-space center of the cell at `coord`.
    pub fn local_to_world(&self, coord: CellCoord) -> Vector3d {
        let half = self.cell_size * Fixed64::HALF;
        self.bounds.min
            + Vector3d::new(
                self.cell_size * coord.x + half,
                self.cell_size * coord.y + half,
                self.cell_size * coord.z + half,
            )
    }

    /// World-space minimum corner of the cell at `coord`. Unlike the center,
    /// this lies inside the bounds for every cell in the array.
    pub fn cell_origin(&self, coord: CellCoord) -> Vector3d {
        self.bounds.min
            + Vector3d::new(
                self.cell_size * coord.x,
                self.cell_size * coord.y,
                self.cell_size * coord.z,
            )
    }

    /// Inclusive local coordinate range of the cells whose footprint meets
    /// `area`, clamped to the array. `None` if nothing overlaps.
    pub fn local_range(&self, area: &BoundingArea) -> Option<(CellCoord, CellCoord)> {
        let clipped = self.bounds.intersection(area)?;
        let lo = self.world_to_local(clipped.min);
        let hi = self.world_to_local(clipped.max);
        let last = CellCoord::new(
            self.dimensions.x - 1,
            self.dimensions.y - 1,
            self.dimensions.z - 1,
        );
        let lo = CellCoord::new(lo.x.max(0), lo.y.max(0), lo.z.max(0));
        let hi = CellCoord::new(hi.x.min(last.x), hi.y.min(last.y), hi.z.min(last.z));
        (lo.x <= hi.x && lo.y <= hi.y && lo.z <= hi.z).then_some((lo, hi))
    }

    /// Cells in an inclusive local range, in storage order.
    pub fn cells_in_range(&self, lo: CellCoord, hi: CellCoord) -> impl Iterator<Item = &Cell> {
        (lo.z..=hi.z).flat_map(move |z| {
            (lo.y..=hi.y).flat_map(move |y| {
                (lo.x..=hi.x).filter_map(move |x| {
                    self.index_of(CellCoord::new(x, y, z))
                        .and_then(|i| self.cells.get(i))
                })
            })
        })
    }

    /// The up to 26 in-bounds neighbours of `coord`.
    pub fn neighbors(&self, coord: CellCoord) -> impl Iterator<Item = CellCoord> + '_ {
        (-1..=1).flat_map(move |dz| {
            (-1..=1).flat_map(move |dy| {
                (-1..=1).filter_map(move |dx| {
                    if dx == 0 && dy == 0 && dz == 0 {
                        return None;
                    }
                    let n = coord + CellCoord::new(dx, dy, dz);
                    self.contains_coord(n).then_some(n)
                })
            })
        })
    }

    /// Scan cell holding `coord`
    #[inline]
    pub const fn scan_cell_of(&self, coord: CellCoord) -> CellCoord {
        CellCoord::new(
            coord.x.div_euclid(self.scan_cell_size),
            coord.y.div_euclid(self.scan_cell_size),
            coord.z.div_euclid(self.scan_cell_size),
        )
    }

    fn scan_index(&self, scan: CellCoord) -> Option<usize> {
        let d = self.scan_dimensions;
        if scan.x < 0 || scan.y < 0 || scan.z < 0 || scan.x >= d.x || scan.y >= d.y || scan.z >= d.z
        {
            return None;
        }
        let (w, h) = (d.x as usize, d.y as usize);
        Some(scan.x as usize + scan.y as usize * w + scan.z as usize * w * h)
    }

    /// Number of occupied cells inside a scan cell
    pub fn scan_occupants(&self, scan: CellCoord) -> u32 {
        self.scan_index(scan)
            .and_then(|i| self.scan_occupants.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Occupied cells in an inclusive local range. Scan cells with no
    /// occupants are skipped without visiting their cells.
    pub fn occupied_in_range(&self, lo: CellCoord, hi: CellCoord) -> Vec<&Cell> {
        let scan_lo = self.scan_cell_of(lo);
        let scan_hi = self.scan_cell_of(hi);
        let s = self.scan_cell_size;
        let mut found = Vec::new();

        for sz in scan_lo.z..=scan_hi.z {
            for sy in scan_lo.y..=scan_hi.y {
                for sx in scan_lo.x..=scan_hi.x {
                    let scan = CellCoord::new(sx, sy, sz);
                    if self.scan_occupants(scan) == 0 {
                        continue;
                    }
                    let cell_lo = CellCoord::new(
                        (sx * s).max(lo.x),
                        (sy * s).max(lo.y),
                        (sz * s).max(lo.z),
                    );
                    let cell_hi = CellCoord::new(
                        (sx * s + s - 1).min(hi.x),
                        (sy * s + s - 1).min(hi.y),
                        (sz * s + s - 1).min(hi.z),
                    );
                    found.extend(
                        self.cells_in_range(cell_lo, cell_hi)
                            .filter(|cell| cell.is_occupied()),
                    );
                }
            }
        }

        found
    }

    fn cell_mut(&mut self, index: u32) -> Result<&mut Cell> {
        let dimensions = self.dimensions;
        self.cells
            .get_mut(index as usize)
            .ok_or_else(|| GridError::OutOfBounds(coord_from_index(index, dimensions)))
    }

    /// Set the occupied flag. Returns true if it changed.
    pub(crate) fn set_occupied(&mut self, index: u32, occupied: bool) -> Result<bool> {
        let cell = self.cell_mut(index)?;
        if !cell.set_occupied(occupied) {
            return Ok(false);
        }
        let coord = cell.coord();
        if let Some(slot) = self
            .scan_index(self.scan_cell_of(coord))
            .and_then(|i| self.scan_occupants.get_mut(i))
        {
            *slot = if occupied {
                slot.saturating_add(1)
            } else {
                slot.saturating_sub(1)
            };
        }
        self.bump_version();
        Ok(true)
    }

    /// Set the manual blocked flag. Returns true if the blocked state changed.
    pub(crate) fn set_blocked(&mut self, index: u32, blocked: bool) -> Result<bool> {
        let changed = self.cell_mut(index)?.set_blocked(blocked);
        if changed {
            self.bump_version();
        }
        Ok(changed)
    }

    /// Count a blocker on a cell. Returns true if it became blocked.
    pub(crate) fn add_blocker(&mut self, index: u32) -> Result<bool> {
        let changed = self.cell_mut(index)?.add_blocker();
        if changed {
            self.bump_version();
        }
        Ok(changed)
    }

    /// Release a blocker on a cell. Returns true if it became unblocked.
    pub(crate) fn remove_blocker(&mut self, index: u32) -> Result<bool> {
        let changed = self.cell_mut(index)?.remove_blocker();
        if changed {
            self.bump_version();
        }
        Ok(changed)
    }

    #[inline]
    fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

const fn div_ceil(value: i32, divisor: i32) -> i32 {
    (value + divisor - 1) / divisor
}

const fn volume(d: CellCoord) -> usize {
    d.x as usize * d.y as usize * d.z as usize
}

const fn coord_from_index(index: u32, d: CellCoord) -> CellCoord {
    let w = d.x as u32;
    let h = d.y as u32;
    if w == 0 || h == 0 {
        return CellCoord::ZERO;
    }
    CellCoord::new(
        (index % w) as i32,
        ((index / w) % h) as i32,
        (index / (w * h)) as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(min: (i32, i32, i32), max: (i32, i32, i32)) -> Partition {
        let bounds = BoundingArea::new(
            Vector3d::from_ints(min.0, min.1, min.2),
            Vector3d::from_ints(max.0, max.1, max.2),
        );
        Partition::new(PartitionHandle(0), 0, bounds, Fixed64::ONE, 4).unwrap()
    }

    #[test]
    fn dimensions_include_max_face() {
        let p = partition((0, 0, 0), (10, 0, 10));
        assert_eq!((p.width(), p.height(), p.length()), (11, 1, 11));
        assert_eq!(p.cell_count(), 121);
    }

    #[test]
    fn half_cell_size_doubles_resolution() {
        let bounds = BoundingArea::new(Vector3d::ZERO, Vector3d::from_ints(4, 0, 2));
        let p = Partition::new(PartitionHandle(1), 0, bounds, Fixed64::HALF, 0).unwrap();
        assert_eq!(p.dimensions(), CellCoord::new(9, 1, 5));
        assert_eq!(p.scan_cell_size(), DEFAULT_SCAN_CELL_SIZE);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let bounds = BoundingArea::new(Vector3d::from_ints(0, 5, 0), Vector3d::from_ints(1, 4, 1));
        let err = Partition::new(PartitionHandle(0), 0, bounds, Fixed64::ONE, 8).unwrap_err();
        assert!(matches!(err, GridError::InvalidBounds { .. }));
    }

    #[test]
    fn rejects_oversized_partition() {
        let bounds = BoundingArea::new(Vector3d::ZERO, Vector3d::from_ints(10_000, 10_000, 10_000));
        let err = Partition::new(PartitionHandle(0), 0, bounds, Fixed64::ONE, 8).unwrap_err();
        assert!(matches!(err, GridError::CapacityExceeded(_)));
    }

    #[test]
    fn cells_are_stored_x_fastest() {
        let p = partition((0, 0, 0), (3, 2, 1));
        for (i, cell) in p.cells().enumerate() {
            assert_eq!(cell.index() as usize, i);
            assert_eq!(p.index_of(cell.coord()), Some(i));
        }
        assert_eq!(p.index_of(CellCoord::new(1, 1, 1)), Some(1 + 4 + 12));
        assert_eq!(p.coord_of_index(1 + 4 + 12), CellCoord::new(1, 1, 1));
        assert_eq!(p.coord_of_index(24), CellCoord::new(0, 0, 2));
    }

    #[test]
    fn world_local_roundtrip() {
        let p = partition((-5, 0, -5), (5, 3, 5));
        let pos = Vector3d::from_f64(1.3, 2.9, -4.2);
        let local = p.world_to_local(pos);
        assert_eq!(local, CellCoord::new(6, 2, 0));
        let center = p.local_to_world(local);
        assert_eq!(center, Vector3d::from_f64(1.5, 2.5, -4.5));
        assert_eq!(p.world_to_local(center), local);
    }

    #[test]
    fn cell_at_is_bounds_checked() {
        let p = partition((0, 0, 0), (2, 2, 2));
        assert!(p.cell_at(CellCoord::new(2, 2, 2)).is_ok());
        assert!(matches!(
            p.cell_at(CellCoord::new(3, 0, 0)),
            Err(GridError::OutOfBounds(_))
        ));
        assert!(p.cell_at(CellCoord::new(-1, 0, 0)).is_err());
    }

    #[test]
    fn local_range_clamps_to_array() {
        let p = partition((0, 0, 0), (10, 0, 10));
        let area = BoundingArea::new(Vector3d::from_ints(-3, -1, 8), Vector3d::from_ints(2, 1, 40));
        let (lo, hi) = p.local_range(&area).unwrap();
        assert_eq!(lo, CellCoord::new(0, 0, 8));
        assert_eq!(hi, CellCoord::new(2, 0, 10));
        assert_eq!(p.cells_in_range(lo, hi).count(), 3 * 3);
    }

    #[test]
    fn neighbors_respect_bounds() {
        let p = partition((0, 0, 0), (2, 2, 2));
        assert_eq!(p.neighbors(CellCoord::new(1, 1, 1)).count(), 26);
        assert_eq!(p.neighbors(CellCoord::new(0, 0, 0)).count(), 7);
        let flat = partition((0, 0, 0), (2, 0, 2));
        assert_eq!(flat.neighbors(CellCoord::new(1, 0, 1)).count(), 8);
    }

    #[test]
    fn occupancy_updates_scan_cells_and_version() {
        let mut p = partition((0, 0, 0), (9, 0, 9));
        let index = p.index_of(CellCoord::new(5, 0, 5)).unwrap() as u32;
        assert!(p.set_occupied(index, true).unwrap());
        assert!(!p.set_occupied(index, true).unwrap());
        assert_eq!(p.version(), 1);
        assert_eq!(p.scan_occupants(CellCoord::new(1, 0, 1)), 1);
        assert_eq!(p.scan_occupants(CellCoord::new(0, 0, 0)), 0);

        let found = p.occupied_in_range(CellCoord::ZERO, CellCoord::new(9, 0, 9));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].coord(), CellCoord::new(5, 0, 5));

        assert!(p.set_occupied(index, false).unwrap());
        assert_eq!(p.scan_occupants(CellCoord::new(1, 0, 1)), 0);
        assert_eq!(p.version(), 2);
    }
}
