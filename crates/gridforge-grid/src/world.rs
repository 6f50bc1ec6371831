//! The grid world: owner of every partition and the single entry point for
//! resolving world positions to cells.
//!
//! `GridWorld` is an explicit context object. Hosts construct it, call
//! [`GridWorld::setup`] once, and [`GridWorld::reset`] on teardown. There is no
//! internal locking: one simulation thread owns the world for a tick, and
//! hosts that need concurrent readers wrap it in their own lock.

use gridforge_core::constants::{
    DEFAULT_CELL_SIZE, DEFAULT_SPATIAL_HASH_CELL_SIZE, MAX_HASH_BUCKETS_PER_PARTITION,
    MAX_PARTITIONS,
};
use gridforge_core::{
    BoundingArea, CellCoord, CellRef, Fixed64, GridError, PartitionHandle, Result, Vector3d,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cell::Cell;
use crate::partition::Partition;
use crate::spatial_hash::SpatialHash;

/// Parameters fixed at setup for the lifetime of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Edge length of every cell in every partition.
    pub cell_size: Fixed64,
    /// Edge length of a spatial hash bucket in world units.
    pub spatial_hash_cell_size: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            spatial_hash_cell_size: DEFAULT_SPATIAL_HASH_CELL_SIZE,
        }
    }
}

impl WorldConfig {
    fn validate(&self) -> Result<()> {
        if !self.cell_size.is_positive() {
            return Err(GridError::InvalidCellSize(self.cell_size));
        }
        if self.spatial_hash_cell_size <= 0 {
            return Err(GridError::InvalidSpatialHashSize(
                self.spatial_hash_cell_size,
            ));
        }
        Ok(())
    }
}

/// Registry slot. The generation is bumped every time the slot's partition
/// is removed, which invalidates every `CellRef` taken from it.
#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    partition: Option<Partition>,
}

#[derive(Debug)]
struct WorldState {
    config: WorldConfig,
    /// Generation given to slots created in this session.
    base_generation: u32,
    slots: Vec<Slot>,
    free: Vec<u16>,
    live: usize,
    hash: SpatialHash,
}

impl WorldState {
    fn new(config: WorldConfig, base_generation: u32) -> Self {
        Self {
            config,
            base_generation,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            hash: SpatialHash::new(config.spatial_hash_cell_size),
        }
    }

    /// First generation no cell reference from this session can carry.
    fn next_base_generation(&self) -> u32 {
        self.slots
            .iter()
            .map(|slot| {
                if slot.partition.is_some() {
                    slot.generation.wrapping_add(1)
                } else {
                    slot.generation
                }
            })
            .fold(self.base_generation, u32::max)
    }

    fn partition(&self, handle: PartitionHandle) -> Result<&Partition> {
        self.slots
            .get(handle.index())
            .and_then(|slot| slot.partition.as_ref())
            .ok_or(GridError::UnknownHandle(handle))
    }

    fn partition_mut(&mut self, handle: PartitionHandle) -> Result<&mut Partition> {
        self.slots
            .get_mut(handle.index())
            .and_then(|slot| slot.partition.as_mut())
            .ok_or(GridError::UnknownHandle(handle))
    }

    /// Partition for a cell reference after the generation check.
    fn checked_partition_mut(&mut self, cell: CellRef) -> Result<&mut Partition> {
        let partition = self.partition_mut(cell.partition())?;
        if partition.generation() != cell.generation() {
            return Err(GridError::StaleGeneration {
                cell,
                current: partition.generation(),
            });
        }
        Ok(partition)
    }

    /// Slot the next partition will occupy and that slot's generation,
    /// reusing released handles first. Does not claim the slot.
    fn next_slot(&self) -> Result<(PartitionHandle, u32)> {
        if let Some(&index) = self.free.last() {
            let generation = self.slots[usize::from(index)].generation;
            return Ok((PartitionHandle(index), generation));
        }
        if self.slots.len() >= MAX_PARTITIONS {
            return Err(GridError::CapacityExceeded(format!(
                "at most {MAX_PARTITIONS} partitions can be registered"
            )));
        }
        Ok((PartitionHandle(self.slots.len() as u16), self.base_generation))
    }

    fn claim(&mut self, handle: PartitionHandle, partition: Partition) {
        if self.free.last() == Some(&handle.0) {
            self.free.pop();
        } else {
            self.slots.push(Slot {
                generation: self.base_generation,
                partition: None,
            });
        }
        self.slots[handle.index()].partition = Some(partition);
        self.live += 1;
    }
}

/// Registry of partitions plus the spatial hash over them.
///
/// Generations survive [`GridWorld::reset`]: partitions registered after a
/// new `setup` start above every generation handed out before, so cell
/// references from an earlier session stay stale.
#[derive(Debug, Default)]
pub struct GridWorld {
    state: Option<WorldState>,
    base_generation: u32,
}

impl GridWorld {
    /// Create a world that still needs [`GridWorld::setup`].
    pub const fn new() -> Self {
        Self {
            state: None,
            base_generation: 0,
        }
    }

    /// Create and set up a world in one step.
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        let mut world = Self::new();
        world.setup(config)?;
        Ok(world)
    }

    /// Fix the cell size and spatial hash size. Fails if already set up.
    pub fn setup(&mut self, config: WorldConfig) -> Result<()> {
        if self.state.is_some() {
            return Err(GridError::AlreadyInitialized);
        }
        config.validate()?;
        debug!(
            cell_size = %config.cell_size,
            spatial_hash_cell_size = config.spatial_hash_cell_size,
            "grid world set up"
        );
        self.state = Some(WorldState::new(config, self.base_generation));
        Ok(())
    }

    /// Release every partition and return to the pre-setup state.
    pub fn reset(&mut self) {
        if let Some(state) = self.state.take() {
            self.base_generation = state.next_base_generation();
            debug!(
                partitions = state.live,
                next_generation = self.base_generation,
                "grid world reset"
            );
        }
    }

    /// True between `setup` and `reset`.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&WorldState> {
        self.state.as_ref().ok_or(GridError::NotInitialized)
    }

    fn state_mut(&mut self) -> Result<&mut WorldState> {
        self.state.as_mut().ok_or(GridError::NotInitialized)
    }

    /// Setup parameters, if set up.
    pub fn config(&self) -> Option<&WorldConfig> {
        self.state.as_ref().map(|s| &s.config)
    }

    /// Cell edge length shared by all partitions.
    pub fn cell_size(&self) -> Result<Fixed64> {
        Ok(self.state()?.config.cell_size)
    }

    /// Register a partition over `bounds`.
    ///
    /// `scan_cell_size <= 0` selects the default. On failure nothing is
    /// modified, so batch loaders can skip the record and continue.
    pub fn add_partition(
        &mut self,
        bounds: BoundingArea,
        scan_cell_size: i32,
    ) -> Result<PartitionHandle> {
        let state = self.state_mut()?;
        if !bounds.is_valid() {
            return Err(GridError::InvalidBounds {
                min: bounds.min,
                max: bounds.max,
            });
        }

        let buckets = state.hash.bucket_span(&bounds);
        if buckets > MAX_HASH_BUCKETS_PER_PARTITION {
            return Err(GridError::CapacityExceeded(format!(
                "partition spans {buckets} spatial hash buckets, limit is {MAX_HASH_BUCKETS_PER_PARTITION}"
            )));
        }

        // Build before touching the registry so a rejected partition leaves no trace.
        let (handle, generation) = state.next_slot()?;
        let partition = Partition::new(
            handle,
            generation,
            bounds,
            state.config.cell_size,
            scan_cell_size,
        )?;

        debug!(
            handle = %handle,
            min = %bounds.min,
            max = %bounds.max,
            cells = partition.cell_count(),
            "partition added"
        );
        state.hash.insert(handle, &bounds);
        state.claim(handle, partition);
        Ok(handle)
    }

    /// Unregister a partition. Its handle becomes reusable and every cell
    /// reference taken from it turns stale.
    pub fn remove_partition(&mut self, handle: PartitionHandle) -> Result<()> {
        let state = self.state_mut()?;
        let Some(slot) = state.slots.get_mut(handle.index()) else {
            warn!(handle = %handle, "remove_partition: unknown handle");
            return Err(GridError::UnknownHandle(handle));
        };
        let Some(partition) = slot.partition.take() else {
            warn!(handle = %handle, "remove_partition: unknown handle");
            return Err(GridError::UnknownHandle(handle));
        };
        slot.generation = slot.generation.wrapping_add(1);

        let bounds = partition.bounds();
        state.hash.remove(handle, &bounds);
        state.free.push(handle.0);
        state.live -= 1;
        debug!(handle = %handle, "partition removed");
        Ok(())
    }

    /// Number of live partitions
    pub fn partition_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.live)
    }

    /// Handles of all live partitions, in slot order.
    pub fn handles(&self) -> impl Iterator<Item = PartitionHandle> + '_ {
        self.partitions().map(Partition::handle)
    }

    /// All live partitions, in slot order.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.state
            .iter()
            .flat_map(|s| s.slots.iter())
            .filter_map(|slot| slot.partition.as_ref())
    }

    /// Partition by handle
    pub fn partition(&self, handle: PartitionHandle) -> Result<&Partition> {
        self.state()?.partition(handle)
    }

    /// First partition (in bucket order) whose bounds contain `pos`.
    pub fn partition_at(&self, pos: Vector3d) -> Option<&Partition> {
        let state = self.state.as_ref()?;
        state
            .hash
            .candidates(pos)
            .iter()
            .filter_map(|&h| state.partition(h).ok())
            .find(|p| p.contains(pos))
    }

    /// Resolve a world position to its partition and cell.
    ///
    /// `NotFound` is the normal answer for positions outside every grid.
    pub fn resolve(&self, pos: Vector3d) -> Result<(PartitionHandle, &Cell)> {
        self.state()?;
        let partition = self.partition_at(pos).ok_or(GridError::NotFound(pos))?;
        let cell = partition.cell_at(partition.world_to_local(pos))?;
        Ok((partition.handle(), cell))
    }

    /// Dereference a cell handle, re-validating its generation.
    pub fn cell(&self, cell: CellRef) -> Result<&Cell> {
        let partition = self.partition(cell.partition())?;
        if partition.generation() != cell.generation() {
            return Err(GridError::StaleGeneration {
                cell,
                current: partition.generation(),
            });
        }
        partition
            .cell_at_index(cell.index())
            .ok_or_else(|| GridError::OutOfBounds(partition.coord_of_index(cell.index())))
    }

    /// Mark a cell occupied or free. Returns true if the flag changed.
    pub fn set_occupied(&mut self, cell: CellRef, occupied: bool) -> Result<bool> {
        self.state_mut()?
            .checked_partition_mut(cell)?
            .set_occupied(cell.index(), occupied)
    }

    /// Set or clear the manual blocked flag. Returns true if the cell's
    /// blocked state changed.
    pub fn set_blocked(&mut self, cell: CellRef, blocked: bool) -> Result<bool> {
        self.state_mut()?
            .checked_partition_mut(cell)?
            .set_blocked(cell.index(), blocked)
    }

    pub(crate) fn add_blocker(&mut self, cell: CellRef) -> Result<bool> {
        self.state_mut()?
            .checked_partition_mut(cell)?
            .add_blocker(cell.index())
    }

    pub(crate) fn remove_blocker(&mut self, cell: CellRef) -> Result<bool> {
        self.state_mut()?
            .checked_partition_mut(cell)?
            .remove_blocker(cell.index())
    }

    /// True if `pos` resolves to a blocked cell.
    pub fn is_blocked_at(&self, pos: Vector3d) -> bool {
        self.resolve(pos).is_ok_and(|(_, cell)| cell.is_blocked())
    }

    /// Partitions whose bounds meet `area`, in handle order.
    pub fn partitions_overlapping(&self, area: &BoundingArea) -> Result<Vec<PartitionHandle>> {
        let state = self.state()?;
        Ok(state
            .hash
            .candidates_in_area(area)
            .into_iter()
            .filter(|&h| {
                state
                    .partition(h)
                    .is_ok_and(|p| p.bounds().intersects(area))
            })
            .collect())
    }

    /// Every cell whose footprint meets `area`, grouped by partition in
    /// handle order.
    pub fn cells_in_area(&self, area: &BoundingArea) -> Result<Vec<CellRef>> {
        let mut cells = Vec::new();
        for handle in self.partitions_overlapping(area)? {
            let partition = self.partition(handle)?;
            if let Some((lo, hi)) = partition.local_range(area) {
                cells.extend(partition.cells_in_range(lo, hi).map(Cell::cell_ref));
            }
        }
        Ok(cells)
    }

    /// Occupied cells in `area`, skipping empty scan cells.
    pub fn occupied_cells_in_area(&self, area: &BoundingArea) -> Result<Vec<CellRef>> {
        let mut cells = Vec::new();
        for handle in self.partitions_overlapping(area)? {
            let partition = self.partition(handle)?;
            if let Some((lo, hi)) = partition.local_range(area) {
                cells.extend(
                    partition
                        .occupied_in_range(lo, hi)
                        .into_iter()
                        .map(Cell::cell_ref),
                );
            }
        }
        Ok(cells)
    }

    /// Neighbours of a cell. Inside its partition they come from the array;
    /// across the border they are resolved by world position, so adjacent
    /// partitions connect.
    pub fn neighbor_cells(&self, cell: CellRef) -> Result<Vec<CellRef>> {
        let origin = self.cell(cell)?.coord();
        let partition = self.partition(cell.partition())?;
        let mut neighbors = Vec::with_capacity(26);

        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let local = origin + CellCoord::new(dx, dy, dz);
                    if let Ok(n) = partition.cell_at(local) {
                        neighbors.push(n.cell_ref());
                        continue;
                    }
                    if let Ok((handle, n)) = self.resolve(partition.cell_origin(local)) {
                        if handle != cell.partition() {
                            neighbors.push(n.cell_ref());
                        }
                    }
                }
            }
        }

        Ok(neighbors)
    }
}
