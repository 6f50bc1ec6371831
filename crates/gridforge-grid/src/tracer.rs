//! Multi-partition 3D line tracing.
//!
//! A segment is voxelized with a fixed-point Amanatides-Woo walk over a
//! lattice of world cells, and every visited voxel is resolved through the
//! world. Consecutive cells in the same partition are grouped into one
//! [`CoveredCells`] entry; a voxel outside every partition ends the current
//! group and is otherwise skipped.
//!
//! When the segment crosses an edge or corner exactly, every cell touching
//! that point is emitted (side cells first, then the diagonal), so the
//! result is a supercover of the segment.

use std::cmp::Ordering;
use std::collections::VecDeque;

use gridforge_core::constants::TRACE_STEP_SLACK;
use gridforge_core::{CellCoord, CellRef, Fixed64, PartitionHandle, Vector3d};
use rayon::prelude::*;
use tracing::trace;

use crate::world::GridWorld;

/// Cells of one partition visited consecutively by a trace, in walk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveredCells {
    pub partition: PartitionHandle,
    pub cells: Vec<CellRef>,
}

/// Fixed-point voxel walk from the start voxel to the end voxel.
///
/// Yields one world-space sample position per visited voxel: the actual
/// endpoints for the first and last voxel, the lattice corner otherwise.
///
/// The parameter of the next boundary crossing on an axis is the ratio
/// `dist / len` of raw fixed-point values. Crossings are ordered by
/// cross-multiplying in `i128`, so ties are detected exactly.
#[derive(Debug)]
struct VoxelWalk {
    origin: Vector3d,
    cell_size: Fixed64,
    start: Vector3d,
    end: Vector3d,
    start_voxel: CellCoord,
    end_voxel: CellCoord,
    current: CellCoord,
    step: [i32; 3],
    /// Distance from `start` to the next boundary, raw.
    dist: [i128; 3],
    /// Absolute segment extent, raw.
    len: [i128; 3],
    cell: i128,
    pending: VecDeque<CellCoord>,
    steps: u32,
    max_steps: u32,
    started: bool,
}

impl VoxelWalk {
    fn new(origin: Vector3d, cell_size: Fixed64, start: Vector3d, end: Vector3d) -> Self {
        let voxel_of = |p: Vector3d| {
            let rel = (p - origin) / cell_size;
            CellCoord::new(
                rel.x.floor_to_int(),
                rel.y.floor_to_int(),
                rel.z.floor_to_int(),
            )
        };
        let start_voxel = voxel_of(start);
        let end_voxel = voxel_of(end);
        let dir = end - start;

        let cell = i128::from(cell_size.raw());

        let mut step = [0; 3];
        let mut dist = [0; 3];
        let mut len = [0; 3];
        for axis in 0..3 {
            let d = dir.axis(axis);
            if start_voxel.axis(axis) == end_voxel.axis(axis) || d == Fixed64::ZERO {
                continue;
            }
            step[axis] = d.signum();
            len[axis] = i128::from(d.raw()).abs();

            let v = i128::from(start_voxel.axis(axis));
            let boundary = if step[axis] > 0 {
                i128::from(origin.axis(axis).raw()) + cell * (v + 1)
            } else {
                i128::from(origin.axis(axis).raw()) + cell * v
            };
            dist[axis] = (boundary - i128::from(start.axis(axis).raw())).abs();
        }

        Self {
            origin,
            cell_size,
            start,
            end,
            start_voxel,
            end_voxel,
            current: start_voxel,
            step,
            dist,
            len,
            cell,
            pending: VecDeque::new(),
            steps: 0,
            max_steps: start_voxel
                .manhattan_distance(end_voxel)
                .saturating_add(TRACE_STEP_SLACK),
            started: false,
        }
    }

    /// An axis keeps stepping until it reaches the end voxel's coordinate.
    #[inline]
    fn is_moving(&self, axis: usize) -> bool {
        self.step[axis] != 0 && self.current.axis(axis) != self.end_voxel.axis(axis)
    }

    /// Orders the next crossings of two moving axes.
    #[inline]
    fn compare_crossings(&self, a: usize, b: usize) -> Ordering {
        let lhs = self.dist[a].saturating_mul(self.len[b]);
        let rhs = self.dist[b].saturating_mul(self.len[a]);
        lhs.cmp(&rhs)
    }

    fn sample(&self, voxel: CellCoord) -> Vector3d {
        if voxel == self.end_voxel {
            self.end
        } else if voxel == self.start_voxel {
            self.start
        } else {
            self.origin
                + Vector3d::new(
                    self.cell_size * voxel.x,
                    self.cell_size * voxel.y,
                    self.cell_size * voxel.z,
                )
        }
    }

    /// Advance across the nearest boundary, queueing every voxel entered.
    fn advance(&mut self) -> bool {
        let mut tied = [0usize; 3];
        let mut count = 0;
        for axis in 0..3 {
            if !self.is_moving(axis) {
                continue;
            }
            if count == 0 {
                tied[0] = axis;
                count = 1;
                continue;
            }
            match self.compare_crossings(axis, tied[0]) {
                Ordering::Less => {
                    tied[0] = axis;
                    count = 1;
                }
                Ordering::Equal => {
                    tied[count] = axis;
                    count += 1;
                }
                Ordering::Greater => {}
            }
        }
        if count == 0 {
            return false;
        }
        let tied = &tied[..count];

        if count > 1 {
            // Proper subsets of the tied axes, fewest axes first.
            let full = (1u8 << count) - 1;
            let mut masks: Vec<u8> = (1..full).collect();
            masks.sort_by_key(|m| m.count_ones());
            for mask in masks {
                let mut side = self.current;
                for (bit, &axis) in tied.iter().enumerate() {
                    if mask & (1 << bit) != 0 {
                        side = side.with_axis(axis, side.axis(axis) + self.step[axis]);
                    }
                }
                self.pending.push_back(side);
            }
        }

        for &axis in tied {
            self.current = self
                .current
                .with_axis(axis, self.current.axis(axis) + self.step[axis]);
            self.dist[axis] += self.cell;
        }
        self.pending.push_back(self.current);
        true
    }
}

impl Iterator for VoxelWalk {
    type Item = Vector3d;

    fn next(&mut self) -> Option<Vector3d> {
        if let Some(voxel) = self.pending.pop_front() {
            return Some(self.sample(voxel));
        }
        if !self.started {
            self.started = true;
            return Some(self.start);
        }
        if self.current == self.end_voxel || self.steps >= self.max_steps {
            return None;
        }
        self.steps += 1;
        if !self.advance() {
            return None;
        }
        self.pending.pop_front().map(|voxel| self.sample(voxel))
    }
}

/// Lazy, single-pass trace of a segment through the world.
#[derive(Debug)]
pub struct GridTrace<'w> {
    world: &'w GridWorld,
    walk: Option<VoxelWalk>,
    carry: Option<(PartitionHandle, CellRef)>,
}

impl Iterator for GridTrace<'_> {
    type Item = CoveredCells;

    fn next(&mut self) -> Option<CoveredCells> {
        let walk = self.walk.as_mut()?;
        let mut group: Option<CoveredCells> = self.carry.take().map(|(partition, cell)| {
            CoveredCells {
                partition,
                cells: vec![cell],
            }
        });

        for pos in walk.by_ref() {
            let Ok((handle, cell)) = self.world.resolve(pos) else {
                if group.is_some() {
                    return group;
                }
                continue;
            };
            let cell = cell.cell_ref();
            match group.as_mut() {
                Some(g) if g.partition == handle => {
                    if g.cells.last() != Some(&cell) {
                        g.cells.push(cell);
                    }
                }
                Some(_) => {
                    self.carry = Some((handle, cell));
                    return group;
                }
                None => {
                    group = Some(CoveredCells {
                        partition: handle,
                        cells: vec![cell],
                    });
                }
            }
        }

        self.walk = None;
        group
    }
}

/// Trace the segment `start`-`end`.
///
/// The walk lattice is anchored at the minimum corner of the partition
/// containing `start` (else `end`, else the world origin). An inactive world
/// yields nothing.
pub fn trace_line(world: &GridWorld, start: Vector3d, end: Vector3d) -> GridTrace<'_> {
    let walk = world.cell_size().ok().map(|cell_size| {
        let origin = world
            .partition_at(start)
            .or_else(|| world.partition_at(end))
            .map_or(Vector3d::ZERO, |p| p.bounds().min);
        trace!(%start, %end, %origin, "tracing line");
        VoxelWalk::new(origin, cell_size, start, end)
    });
    GridTrace {
        world,
        walk,
        carry: None,
    }
}

/// Every cell along the segment, flattened across partitions.
pub fn trace_cells(world: &GridWorld, start: Vector3d, end: Vector3d) -> Vec<CellRef> {
    trace_line(world, start, end)
        .flat_map(|covered| covered.cells)
        .collect()
}

/// True if no cell along the segment is blocked. Stretches outside every
/// partition do not obstruct.
pub fn line_of_sight(world: &GridWorld, start: Vector3d, end: Vector3d) -> bool {
    trace_line(world, start, end)
        .flat_map(|covered| covered.cells)
        .all(|cell| world.cell(cell).is_ok_and(|c| !c.is_blocked()))
}

/// Trace many segments in parallel over a shared, unmodified world.
pub fn trace_lines_par(
    world: &GridWorld,
    segments: &[(Vector3d, Vector3d)],
) -> Vec<Vec<CoveredCells>> {
    segments
        .par_iter()
        .map(|&(start, end)| trace_line(world, start, end).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use gridforge_core::BoundingArea;

    fn area(min: (i32, i32, i32), max: (i32, i32, i32)) -> BoundingArea {
        BoundingArea::new(
            Vector3d::from_ints(min.0, min.1, min.2),
            Vector3d::from_ints(max.0, max.1, max.2),
        )
    }

    fn world_with(partitions: &[BoundingArea]) -> GridWorld {
        let mut world = GridWorld::with_config(WorldConfig::default()).unwrap();
        for bounds in partitions {
            world.add_partition(*bounds, 0).unwrap();
        }
        world
    }

    fn coords(world: &GridWorld, cells: &[CellRef]) -> Vec<(i32, i32, i32)> {
        cells
            .iter()
            .map(|&c| {
                let coord = world.cell(c).unwrap().coord();
                (coord.x, coord.y, coord.z)
            })
            .collect()
    }

    #[test]
    fn zero_length_trace() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let p = Vector3d::from_f64(3.5, 0.0, 3.5);
        let groups: Vec<_> = trace_line(&world, p, p).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(coords(&world, &groups[0].cells), vec![(3, 0, 3)]);

        let outside = Vector3d::from_ints(40, 0, 40);
        assert_eq!(trace_line(&world, outside, outside).count(), 0);
    }

    #[test]
    fn straight_line_along_x() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let groups: Vec<_> =
            trace_line(&world, Vector3d::ZERO, Vector3d::from_ints(5, 0, 0)).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].partition, PartitionHandle(0));
        let xs: Vec<i32> = coords(&world, &groups[0].cells)
            .into_iter()
            .map(|(x, _, _)| x)
            .collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn diagonal_through_corners_is_supercover() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let cells = trace_cells(&world, Vector3d::ZERO, Vector3d::from_ints(2, 0, 2));
        assert_eq!(
            coords(&world, &cells),
            vec![
                (0, 0, 0),
                (1, 0, 0),
                (0, 0, 1),
                (1, 0, 1),
                (2, 0, 1),
                (1, 0, 2),
                (2, 0, 2),
            ]
        );
    }

    #[test]
    fn corner_crossing_at_shallow_slope() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let cells = trace_cells(&world, Vector3d::ZERO, Vector3d::from_ints(3, 0, 6));
        assert_eq!(
            coords(&world, &cells),
            vec![
                (0, 0, 0),
                (0, 0, 1),
                (1, 0, 1),
                (0, 0, 2),
                (1, 0, 2),
                (1, 0, 3),
                (2, 0, 3),
                (1, 0, 4),
                (2, 0, 4),
                (2, 0, 5),
                (3, 0, 5),
                (2, 0, 6),
                (3, 0, 6),
            ]
        );
    }

    #[test]
    fn oblique_line_steps_through_faces() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let cells = trace_cells(
            &world,
            Vector3d::from_f64(0.5, 0.0, 0.5),
            Vector3d::from_f64(2.5, 0.0, 1.5),
        );
        assert_eq!(
            coords(&world, &cells),
            vec![(0, 0, 0), (1, 0, 0), (1, 0, 1), (2, 0, 1)]
        );
    }

    #[test]
    fn reverse_direction() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let cells = trace_cells(&world, Vector3d::from_f64(4.5, 0.0, 0.5), Vector3d::from_f64(1.5, 0.0, 0.5));
        let xs: Vec<i32> = coords(&world, &cells).into_iter().map(|(x, _, _)| x).collect();
        assert_eq!(xs, vec![4, 3, 2, 1]);
    }

    #[test]
    fn groups_split_at_partition_border() {
        let world = world_with(&[area((0, 0, 0), (4, 0, 0)), area((5, 0, 0), (9, 0, 0))]);
        let groups: Vec<_> =
            trace_line(&world, Vector3d::ZERO, Vector3d::from_ints(9, 0, 0)).collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].partition, PartitionHandle(0));
        assert_eq!(groups[0].cells.len(), 5);
        assert_eq!(groups[1].partition, PartitionHandle(1));
        assert_eq!(groups[1].cells.len(), 5);
    }

    #[test]
    fn gaps_are_skipped() {
        let world = world_with(&[area((0, 0, 0), (3, 0, 0)), area((6, 0, 0), (9, 0, 0))]);
        let groups: Vec<_> =
            trace_line(&world, Vector3d::ZERO, Vector3d::from_ints(9, 0, 0)).collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(coords(&world, &groups[0].cells).len(), 4);
        assert_eq!(
            coords(&world, &groups[1].cells),
            vec![(0, 0, 0), (1, 0, 0), (2, 0, 0), (3, 0, 0)]
        );
    }

    #[test]
    fn inactive_world_yields_nothing() {
        let world = GridWorld::new();
        assert_eq!(
            trace_line(&world, Vector3d::ZERO, Vector3d::from_ints(3, 0, 0)).count(),
            0
        );
    }

    #[test]
    fn traces_are_deterministic() {
        let world = world_with(&[area((-8, -2, -8), (8, 2, 8))]);
        let a = Vector3d::from_f64(-7.3, -1.1, 6.9);
        let b = Vector3d::from_f64(5.2, 1.7, -4.4);
        let first: Vec<_> = trace_line(&world, a, b).collect();
        let second: Vec<_> = trace_line(&world, a, b).collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn consecutive_cells_are_adjacent() {
        let world = world_with(&[area((-8, -2, -8), (8, 2, 8))]);
        let cells = trace_cells(
            &world,
            Vector3d::from_f64(-7.3, -1.1, 6.9),
            Vector3d::from_f64(5.2, 1.7, -4.4),
        );
        let coords = coords(&world, &cells);
        for pair in coords.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let d = (a.0 - b.0).abs().max((a.1 - b.1).abs()).max((a.2 - b.2).abs());
            assert_eq!(d, 1, "{a:?} -> {b:?}");
        }
        assert_eq!(coords.first(), Some(&(0, 0, 14)));
        assert_eq!(coords.last(), Some(&(13, 3, 3)));
    }

    #[test]
    fn line_of_sight_respects_blocked_cells() {
        let mut world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let wall = world.resolve(Vector3d::from_ints(3, 0, 0)).unwrap().1.cell_ref();
        world.set_blocked(wall, true).unwrap();
        assert!(!line_of_sight(&world, Vector3d::ZERO, Vector3d::from_ints(5, 0, 0)));
        assert!(line_of_sight(
            &world,
            Vector3d::from_ints(0, 0, 2),
            Vector3d::from_ints(5, 0, 2)
        ));
    }

    #[test]
    fn parallel_batch_matches_sequential() {
        let world = world_with(&[area((0, 0, 0), (10, 0, 10))]);
        let segments: Vec<_> = (0..10)
            .map(|i| (Vector3d::from_ints(0, 0, i), Vector3d::from_ints(10, 0, 10 - i)))
            .collect();
        let batch = trace_lines_par(&world, &segments);
        for (result, &(a, b)) in batch.iter().zip(&segments) {
            let sequential: Vec<_> = trace_line(&world, a, b).collect();
            assert_eq!(result, &sequential);
        }
    }
}
