//! Blockers: regions that mark every cell they cover as impassable.
//!
//! Blocking is reference counted per cell, so overlapping blockers can be
//! applied and removed in any order.

use gridforge_core::{BoundingArea, CellRef, GridError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::world::GridWorld;

/// Shape of a blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockerKind {
    /// Axis-aligned box in world space.
    Bounds(BoundingArea),
}

impl BlockerKind {
    /// Bounding box enclosing the blocker's volume.
    pub const fn bounding_area(&self) -> BoundingArea {
        match self {
            Self::Bounds(area) => *area,
        }
    }
}

/// A region that blocks the cells it covers while active and applied.
///
/// The exact cells counted by an application are kept until it is removed,
/// so removal releases only what was applied even if partitions came or went
/// in between. `cache_covered_cells` decides whether that set is reused for
/// the next application.
#[derive(Debug, Clone)]
pub struct Blocker {
    kind: BlockerKind,
    is_active: bool,
    cache_covered_cells: bool,
    cached: Option<Vec<CellRef>>,
    applied: Option<Vec<CellRef>>,
}

impl Blocker {
    /// Create a blocker. Nothing is applied until [`Blocker::apply_blockage`]
    /// or [`Blocker::activate`] is called.
    pub const fn new(kind: BlockerKind, is_active: bool, cache_covered_cells: bool) -> Self {
        Self {
            kind,
            is_active,
            cache_covered_cells,
            cached: None,
            applied: None,
        }
    }

    /// Active, caching box blocker.
    pub const fn bounds(area: BoundingArea) -> Self {
        Self::new(BlockerKind::Bounds(area), true, true)
    }

    /// Shape of the blocked volume
    #[inline]
    pub const fn kind(&self) -> &BlockerKind {
        &self.kind
    }

    /// True if the blocker applies when asked to.
    #[inline]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// True while the blocker holds a count on its covered cells.
    #[inline]
    pub const fn is_applied(&self) -> bool {
        self.applied.is_some()
    }

    /// True if the covered set is reused across applications.
    #[inline]
    pub const fn caches_covered_cells(&self) -> bool {
        self.cache_covered_cells
    }

    /// Cells counted by the current application.
    pub fn applied_cells(&self) -> Option<&[CellRef]> {
        self.applied.as_deref()
    }

    /// Cells retained from the last application, if caching.
    pub fn cached_cells(&self) -> Option<&[CellRef]> {
        self.cached.as_deref()
    }

    /// Every cell whose footprint meets the blocker's volume.
    pub fn covered_cells(&self, world: &GridWorld) -> Result<Vec<CellRef>> {
        world.cells_in_area(&self.kind.bounding_area())
    }

    /// Covered set for an application: the cache if every entry is still
    /// live, a fresh computation otherwise.
    fn cells_to_apply(&self, world: &GridWorld) -> Result<Vec<CellRef>> {
        if let Some(cached) = &self.cached {
            if cached.iter().all(|&c| world.cell(c).is_ok()) {
                return Ok(cached.clone());
            }
            debug!(area = ?self.kind, "blocker cache stale, recomputing");
        }
        self.covered_cells(world)
    }

    /// Block every covered cell. No-op if inactive or already applied.
    ///
    /// Returns the number of cells covered.
    pub fn apply_blockage(&mut self, world: &mut GridWorld) -> Result<usize> {
        if !self.is_active || self.applied.is_some() {
            return Ok(0);
        }
        let cells = self.cells_to_apply(world)?;
        for (i, &cell) in cells.iter().enumerate() {
            if let Err(err) = world.add_blocker(cell) {
                for &counted in &cells[..i] {
                    world.remove_blocker(counted)?;
                }
                return Err(err);
            }
        }
        debug!(area = ?self.kind, cells = cells.len(), "blockage applied");

        let covered = cells.len();
        if self.cache_covered_cells {
            self.cached = Some(cells.clone());
        }
        self.applied = Some(cells);
        Ok(covered)
    }

    /// Release every cell the current application counted. No-op if not
    /// applied.
    ///
    /// Cells whose partition has been removed since the blockage was applied
    /// are skipped. Returns the number of cells released.
    pub fn remove_blockage(&mut self, world: &mut GridWorld) -> Result<usize> {
        let Some(cells) = self.applied.take() else {
            return Ok(0);
        };
        if !world.is_active() {
            self.cached = None;
            return Ok(0);
        }

        let mut released = 0;
        for cell in cells {
            match world.remove_blocker(cell) {
                Ok(_) => released += 1,
                Err(err @ (GridError::StaleGeneration { .. } | GridError::UnknownHandle(_))) => {
                    debug!(%cell, %err, "skipping stale blocked cell");
                }
                Err(err) => return Err(err),
            }
        }
        debug!(area = ?self.kind, cells = released, "blockage removed");
        Ok(released)
    }

    /// Mark the blocker active and apply it.
    ///
    /// Returns `false` without failing if the world is not set up yet; the
    /// host calls `activate` again once it is.
    pub fn activate(&mut self, world: &mut GridWorld) -> Result<bool> {
        self.is_active = true;
        if !world.is_active() {
            return Ok(false);
        }
        self.apply_blockage(world)?;
        Ok(true)
    }

    /// Remove the blockage and mark the blocker inactive. Returns whether
    /// anything was released.
    pub fn deactivate(&mut self, world: &mut GridWorld) -> Result<bool> {
        let was_applied = self.is_applied();
        self.remove_blockage(world)?;
        self.is_active = false;
        Ok(was_applied)
    }

    /// Replace the blocked volume. Drops the cache and re-applies if the
    /// blocker was applied.
    pub fn set_area(&mut self, area: BoundingArea, world: &mut GridWorld) -> Result<()> {
        let was_applied = self.is_applied();
        self.remove_blockage(world)?;
        self.kind = BlockerKind::Bounds(area);
        self.cached = None;
        if was_applied {
            self.apply_blockage(world)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use gridforge_core::{CellCoord, Vector3d};

    fn area(min: (i32, i32, i32), max: (i32, i32, i32)) -> BoundingArea {
        BoundingArea::new(
            Vector3d::from_ints(min.0, min.1, min.2),
            Vector3d::from_ints(max.0, max.1, max.2),
        )
    }

    fn world() -> GridWorld {
        let mut world = GridWorld::with_config(WorldConfig::default()).unwrap();
        world.add_partition(area((0, 0, 0), (10, 0, 10)), 0).unwrap();
        world
    }

    fn blocked_coords(world: &GridWorld) -> Vec<CellCoord> {
        world
            .partitions()
            .flat_map(|p| p.cells())
            .filter(|c| c.is_blocked())
            .map(|c| c.coord())
            .collect()
    }

    #[test]
    fn box_blocks_exactly_covered_cells() {
        let mut world = world();
        let mut blocker = Blocker::bounds(area((2, 0, 2), (4, 0, 4)));
        assert_eq!(blocker.apply_blockage(&mut world).unwrap(), 9);

        let blocked = blocked_coords(&world);
        assert_eq!(blocked.len(), 9);
        assert!(blocked
            .iter()
            .all(|c| (2..=4).contains(&c.x) && c.y == 0 && (2..=4).contains(&c.z)));
    }

    #[test]
    fn apply_and_remove_are_idempotent() {
        let mut world = world();
        let mut blocker = Blocker::bounds(area((2, 0, 2), (4, 0, 4)));
        blocker.apply_blockage(&mut world).unwrap();
        assert_eq!(blocker.apply_blockage(&mut world).unwrap(), 0);
        assert_eq!(blocker.remove_blockage(&mut world).unwrap(), 9);
        assert_eq!(blocker.remove_blockage(&mut world).unwrap(), 0);
        assert!(blocked_coords(&world).is_empty());
    }

    #[test]
    fn remove_restores_prior_state() {
        let mut world = world();
        let manual = world
            .resolve(Vector3d::from_ints(3, 0, 3))
            .unwrap()
            .1
            .cell_ref();
        world.set_blocked(manual, true).unwrap();

        let mut blocker = Blocker::bounds(area((2, 0, 2), (4, 0, 4)));
        blocker.apply_blockage(&mut world).unwrap();
        blocker.remove_blockage(&mut world).unwrap();
        assert_eq!(blocked_coords(&world), vec![CellCoord::new(3, 0, 3)]);
    }

    #[test]
    fn overlapping_blockers_release_independently() {
        let mut world = world();
        let mut a = Blocker::bounds(area((0, 0, 0), (3, 0, 3)));
        let mut b = Blocker::new(BlockerKind::Bounds(area((3, 0, 3), (5, 0, 5))), true, false);
        a.apply_blockage(&mut world).unwrap();
        b.apply_blockage(&mut world).unwrap();
        a.remove_blockage(&mut world).unwrap();

        assert!(world.is_blocked_at(Vector3d::from_ints(3, 0, 3)));
        assert!(!world.is_blocked_at(Vector3d::from_ints(1, 0, 1)));
        b.remove_blockage(&mut world).unwrap();
        assert!(blocked_coords(&world).is_empty());
    }

    #[test]
    fn inactive_blocker_never_applies() {
        let mut world = world();
        let mut blocker = Blocker::new(BlockerKind::Bounds(area((2, 0, 2), (4, 0, 4))), false, true);
        assert_eq!(blocker.apply_blockage(&mut world).unwrap(), 0);
        assert!(!blocker.is_applied());

        assert!(blocker.activate(&mut world).unwrap());
        assert_eq!(blocked_coords(&world).len(), 9);
        assert!(blocker.deactivate(&mut world).unwrap());
        assert!(!blocker.is_active());
        assert!(blocked_coords(&world).is_empty());
    }

    #[test]
    fn activate_defers_until_setup() {
        let mut world = GridWorld::new();
        let mut blocker = Blocker::bounds(area((0, 0, 0), (1, 0, 1)));
        assert!(!blocker.activate(&mut world).unwrap());
        assert!(blocker.is_active());
        assert!(!blocker.is_applied());
    }

    #[test]
    fn cache_is_reused_and_dropped_on_resize() {
        let mut world = world();
        let mut blocker = Blocker::bounds(area((2, 0, 2), (4, 0, 4)));
        blocker.apply_blockage(&mut world).unwrap();
        assert_eq!(blocker.cached_cells().map(<[_]>::len), Some(9));

        blocker.set_area(area((0, 0, 0), (1, 0, 0)), &mut world).unwrap();
        assert_eq!(blocker.cached_cells().map(<[_]>::len), Some(2));
        assert_eq!(
            blocked_coords(&world),
            vec![CellCoord::new(0, 0, 0), CellCoord::new(1, 0, 0)]
        );
    }

    #[test]
    fn uncached_removal_releases_only_applied_cells() {
        let mut world = GridWorld::with_config(WorldConfig::default()).unwrap();
        world.add_partition(area((0, 0, 0), (4, 0, 0)), 0).unwrap();
        let mut wide = Blocker::new(BlockerKind::Bounds(area((0, 0, 0), (10, 0, 0))), true, false);
        assert_eq!(wide.apply_blockage(&mut world).unwrap(), 5);
        assert!(wide.cached_cells().is_none());

        world.add_partition(area((6, 0, 0), (10, 0, 0)), 0).unwrap();
        let mut narrow = Blocker::bounds(area((7, 0, 0), (7, 0, 0)));
        narrow.apply_blockage(&mut world).unwrap();

        assert_eq!(wide.remove_blockage(&mut world).unwrap(), 5);
        assert!(narrow.is_applied());
        assert!(world.is_blocked_at(Vector3d::from_ints(7, 0, 0)));
        let (_, cell) = world.resolve(Vector3d::from_ints(7, 0, 0)).unwrap();
        assert_eq!(cell.blocker_count(), 1);
        assert!(!world.is_blocked_at(Vector3d::from_ints(2, 0, 0)));
    }

    #[test]
    fn reapply_recomputes_without_cache() {
        let mut world = GridWorld::with_config(WorldConfig::default()).unwrap();
        world.add_partition(area((0, 0, 0), (4, 0, 0)), 0).unwrap();
        let mut blocker = Blocker::new(BlockerKind::Bounds(area((0, 0, 0), (10, 0, 0))), true, false);
        blocker.apply_blockage(&mut world).unwrap();
        blocker.remove_blockage(&mut world).unwrap();

        world.add_partition(area((6, 0, 0), (10, 0, 0)), 0).unwrap();
        assert_eq!(blocker.apply_blockage(&mut world).unwrap(), 10);
        assert_eq!(blocker.applied_cells().map(<[_]>::len), Some(10));
    }

    #[test]
    fn blockage_from_before_reset_is_not_released_twice() {
        let mut world = world();
        let mut old = Blocker::bounds(area((2, 0, 2), (4, 0, 4)));
        old.apply_blockage(&mut world).unwrap();

        world.reset();
        world.setup(WorldConfig::default()).unwrap();
        world.add_partition(area((0, 0, 0), (10, 0, 10)), 0).unwrap();
        let mut fresh = Blocker::bounds(area((3, 0, 3), (3, 0, 3)));
        fresh.apply_blockage(&mut world).unwrap();

        assert_eq!(old.remove_blockage(&mut world).unwrap(), 0);
        assert!(world.is_blocked_at(Vector3d::from_ints(3, 0, 3)));
        assert_eq!(blocked_coords(&world), vec![CellCoord::new(3, 0, 3)]);
    }

    #[test]
    fn removed_partition_cells_are_skipped() {
        let mut world = world();
        let extra = world.add_partition(area((20, 0, 0), (22, 0, 2)), 0).unwrap();
        let mut blocker = Blocker::bounds(area((9, 0, 0), (21, 0, 0)));
        assert_eq!(blocker.apply_blockage(&mut world).unwrap(), 4);

        world.remove_partition(extra).unwrap();
        assert_eq!(blocker.remove_blockage(&mut world).unwrap(), 2);
        assert!(blocked_coords(&world).is_empty());
    }
}
