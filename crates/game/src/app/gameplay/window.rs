use engine::{SceneWorld, Vec3};
use tracing::{debug, warn};

use super::layout::{cell_placements, CellGeometry};
use super::maze::{Cell, MazeGrid, RevealState};
use super::pool::StagePools;

/// World-space parcel coordinates: `floor(position / cell_size)` on x and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Parcel {
    pub(crate) x: i64,
    pub(crate) z: i64,
}

pub(crate) fn parcel_of(position: Vec3, cell_size: f32) -> Parcel {
    Parcel {
        x: (position.x / cell_size).floor() as i64,
        z: (position.z / cell_size).floor() as i64,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Reveal,
    Hide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReconcileReport {
    pub(crate) revealed: usize,
    pub(crate) hidden: usize,
    pub(crate) reacquired: usize,
    pub(crate) placed: usize,
    pub(crate) skipped: usize,
    pub(crate) released: usize,
}

/// Square window of `(2 * show_range + 1)^2` cells centred on the player's
/// parcel. Parcel changes mark cells, then one reconcile pass moves pooled
/// entities to match.
#[derive(Debug, Clone)]
pub(crate) struct VisibilityWindow {
    show_range: u32,
    geometry: CellGeometry,
    last_parcel: Option<Parcel>,
}

impl VisibilityWindow {
    pub(crate) fn new(show_range: u32, geometry: CellGeometry) -> Self {
        Self {
            show_range,
            geometry,
            last_parcel: None,
        }
    }

    pub(crate) fn last_parcel(&self) -> Option<Parcel> {
        self.last_parcel
    }

    /// Does nothing while the player stays in the same parcel.
    pub(crate) fn update(
        &mut self,
        player: Vec3,
        grid: &mut MazeGrid,
        pools: &mut StagePools,
        world: &mut SceneWorld,
    ) -> Option<ReconcileReport> {
        let parcel = parcel_of(player, self.geometry.cell_size);
        if self.last_parcel == Some(parcel) {
            return None;
        }
        if let Some(previous) = self.last_parcel {
            self.mark_window(grid, previous, Mark::Hide);
        }
        self.mark_window(grid, parcel, Mark::Reveal);
        self.last_parcel = Some(parcel);

        let report = self.reconcile(grid, pools, world);
        debug!(
            parcel_x = parcel.x,
            parcel_z = parcel.z,
            revealed = report.revealed,
            hidden = report.hidden,
            skipped = report.skipped,
            "visibility_window_moved"
        );
        Some(report)
    }

    fn mark_window(&self, grid: &mut MazeGrid, parcel: Parcel, mark: Mark) -> usize {
        let range = i64::from(self.show_range);
        let center_x = parcel.x + i64::from(grid.cols() / 2);
        let center_y = parcel.z + i64::from(grid.rows() / 2);
        let mut marked = 0;
        for y in center_y - range..=center_y + range {
            for x in center_x - range..=center_x + range {
                let Some(cell) = grid.cell_mut(x, y) else {
                    continue;
                };
                cell.reveal = match (mark, cell.reveal) {
                    (Mark::Hide, _) => RevealState::JustHidden,
                    (Mark::Reveal, RevealState::JustHidden | RevealState::StillRevealed) => {
                        RevealState::StillRevealed
                    }
                    (Mark::Reveal, _) => RevealState::JustRevealed,
                };
                marked += 1;
            }
        }
        marked
    }

    /// Releases hidden cells first so their slots are available to cells
    /// revealed in the same pass, then places revealed ones. Running it
    /// twice without a mark in between changes nothing.
    pub(crate) fn reconcile(
        &self,
        grid: &mut MazeGrid,
        pools: &mut StagePools,
        world: &mut SceneWorld,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for cell in grid.cells_mut() {
            if cell.reveal == RevealState::JustHidden {
                report.released += pools.release_cell(&mut cell.slots);
                cell.reveal = RevealState::NotRevealed;
                report.hidden += 1;
            }
        }

        let cols = grid.cols();
        let rows = grid.rows();
        for cell in grid.cells_mut() {
            match cell.reveal {
                RevealState::JustRevealed => {
                    self.place_cell(cell, cols, rows, pools, world, &mut report);
                    cell.reveal = RevealState::StillRevealed;
                    report.revealed += 1;
                }
                RevealState::StillRevealed if cell.slots.is_empty() => {
                    warn!(x = cell.x, y = cell.y, "revealed_cell_without_entities");
                    self.place_cell(cell, cols, rows, pools, world, &mut report);
                    if !cell.slots.is_empty() {
                        report.reacquired += 1;
                    }
                }
                _ => {}
            }
        }

        report
    }

    fn place_cell(
        &self,
        cell: &mut Cell,
        cols: u32,
        rows: u32,
        pools: &mut StagePools,
        world: &mut SceneWorld,
        report: &mut ReconcileReport,
    ) {
        let origin = self.geometry.cell_origin(cell.x, cell.y, cols, rows);
        for placement in cell_placements(cell, origin, &self.geometry) {
            let pool = pools.get_mut(placement.kind);
            let Some(slot) = pool.checkout() else {
                report.skipped += 1;
                continue;
            };
            let moved = pool
                .entity(slot)
                .and_then(|entity| world.transform_mut(entity).ok())
                .map(|transform| *transform = placement.transform)
                .is_some();
            if moved {
                cell.slots.push(placement.kind, slot);
                report.placed += 1;
            } else {
                pool.release(slot);
                report.skipped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::MazeConfig;
    use crate::app::gameplay::decor::{decorate, DecorRules};
    use crate::app::gameplay::maze::Side;
    use crate::app::gameplay::pool::{PoolKind, PoolSizes, SlotId};
    use crate::app::gameplay::rng::SeededRng;
    use std::collections::HashSet;

    fn fixture(cols: u32, rows: u32, sizes: PoolSizes) -> (MazeGrid, StagePools, SceneWorld) {
        let mut world = SceneWorld::default();
        let pools = StagePools::preallocate(&mut world, &sizes);
        (MazeGrid::new(cols, rows), pools, world)
    }

    fn revealed_cells(grid: &MazeGrid) -> Vec<(u32, u32)> {
        grid.cells()
            .iter()
            .filter(|cell| cell.reveal == RevealState::StillRevealed)
            .map(|cell| (cell.x, cell.y))
            .collect()
    }

    fn assert_pool_accounting(grid: &MazeGrid, pools: &StagePools) {
        for kind in PoolKind::ALL {
            let mut seen: HashSet<SlotId> = HashSet::new();
            for cell in grid.cells() {
                for slot in cell.slots.list(kind) {
                    assert!(seen.insert(*slot), "{kind:?} slot {slot:?} held twice");
                }
            }
            assert_eq!(seen.len(), pools.get(kind).used_count(), "{kind:?}");
        }
    }

    #[test]
    fn parcel_uses_floor_division() {
        assert_eq!(parcel_of(Vec3::new(-0.5, 0.0, -16.0), 16.0), Parcel { x: -1, z: -1 });
        assert_eq!(parcel_of(Vec3::new(15.99, 0.0, 16.0), 16.0), Parcel { x: 0, z: 1 });
        assert_eq!(parcel_of(Vec3::new(-16.01, 3.0, 0.0), 16.0), Parcel { x: -2, z: 0 });
    }

    #[test]
    fn first_update_reveals_three_by_three_around_origin() {
        let (mut grid, mut pools, mut world) = fixture(40, 40, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());

        let report = window
            .update(Vec3::new(1.0, 0.0, 1.0), &mut grid, &mut pools, &mut world)
            .expect("parcel changed");

        assert_eq!(report.revealed, 9);
        assert_eq!(report.skipped, 0);
        let mut expected = Vec::new();
        for y in 19..=21 {
            for x in 19..=21 {
                expected.push((x, y));
            }
        }
        assert_eq!(revealed_cells(&grid), expected);
        assert_pool_accounting(&grid, &pools);
    }

    #[test]
    fn same_parcel_does_not_reconcile() {
        let (mut grid, mut pools, mut world) = fixture(10, 10, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());
        assert!(window.update(Vec3::ZERO, &mut grid, &mut pools, &mut world).is_some());
        assert!(window
            .update(Vec3::new(15.0, 0.0, 15.0), &mut grid, &mut pools, &mut world)
            .is_none());
    }

    #[test]
    fn reconcile_twice_is_a_no_op() {
        let (mut grid, mut pools, mut world) = fixture(10, 10, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());
        window.update(Vec3::ZERO, &mut grid, &mut pools, &mut world);
        let before: Vec<_> = grid.cells().iter().map(|cell| (cell.reveal, cell.slots.clone())).collect();
        let used_before = pools.get(PoolKind::Floor).used_count();

        let report = window.reconcile(&mut grid, &mut pools, &mut world);

        let after: Vec<_> = grid.cells().iter().map(|cell| (cell.reveal, cell.slots.clone())).collect();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(before, after);
        assert_eq!(pools.get(PoolKind::Floor).used_count(), used_before);
    }

    #[test]
    fn overlapping_cells_keep_their_slots_across_a_step() {
        let (mut grid, mut pools, mut world) = fixture(10, 10, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());
        window.update(Vec3::ZERO, &mut grid, &mut pools, &mut world);
        let shared = grid.cell(5, 5).expect("centre").slots.clone();

        let report = window
            .update(Vec3::new(16.5, 0.0, 0.0), &mut grid, &mut pools, &mut world)
            .expect("parcel changed");

        assert_eq!(report.hidden, 3);
        assert_eq!(report.revealed, 3);
        assert_eq!(grid.cell(5, 5).expect("centre").slots, shared);
        assert_eq!(grid.cell(4, 5).expect("left column").reveal, RevealState::NotRevealed);
        assert!(grid.cell(4, 5).expect("left column").slots.is_empty());
        assert_pool_accounting(&grid, &pools);
    }

    #[test]
    fn window_is_clamped_at_the_grid_edge() {
        let (mut grid, mut pools, mut world) = fixture(4, 4, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());
        window.update(Vec3::new(-20.0, 0.0, -20.0), &mut grid, &mut pools, &mut world);
        assert_eq!(revealed_cells(&grid), vec![(0, 0), (1, 0), (0, 1), (1, 1)]);

        window.update(Vec3::new(-200.0, 0.0, -200.0), &mut grid, &mut pools, &mut world);
        assert!(revealed_cells(&grid).is_empty());
        assert_eq!(pools.get(PoolKind::Wall).used_count(), 0);
    }

    #[test]
    fn exhausted_wall_pool_skips_the_overflow() {
        let sizes = PoolSizes {
            walls: 4,
            floors: 8,
            pillars: 0,
            trees: 0,
        };
        let (mut grid, mut pools, mut world) = fixture(2, 1, sizes);
        let left = grid.index_of(0, 0).expect("left");
        let right = grid.index_of(1, 0).expect("right");
        assert!(grid.remove_walls(left, right));
        grid.cell_mut(1, 0).expect("right").walls[Side::Top.index()] = false;
        let mut window = VisibilityWindow::new(1, CellGeometry::default());

        let report = window
            .update(Vec3::ZERO, &mut grid, &mut pools, &mut world)
            .expect("parcel changed");

        assert_eq!(report.placed, 4 + 8);
        assert_eq!(report.skipped, 1);
        assert_eq!(pools.get(PoolKind::Wall).exhaustion_count(), 1);
        assert_pool_accounting(&grid, &pools);
    }

    #[test]
    fn revealed_cell_with_no_entities_is_reacquired() {
        let (mut grid, mut pools, mut world) = fixture(10, 10, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());
        window.update(Vec3::ZERO, &mut grid, &mut pools, &mut world);
        let cell = grid.cell_mut(5, 5).expect("centre");
        pools.release_cell(&mut cell.slots);

        let report = window.reconcile(&mut grid, &mut pools, &mut world);

        assert_eq!(report.reacquired, 1);
        assert!(!grid.cell(5, 5).expect("centre").slots.is_empty());
        assert_pool_accounting(&grid, &pools);
    }

    #[test]
    fn default_pools_cover_every_parcel_of_a_decorated_maze() {
        let maze = MazeConfig::default();
        for (seed, show_range) in [(1, 1), (2, 1), (1, 2), (3, 3)] {
            let mut rng = SeededRng::new(seed);
            let (mut grid, mut pools, mut world) =
                fixture(maze.cols, maze.rows, PoolSizes::for_show_range(show_range));
            grid.generate(&mut rng, maze.iteration_ceiling);
            let rules = DecorRules::centered(grid.cols(), grid.rows());
            decorate(&mut grid, &mut rng, &rules);
            let mut window = VisibilityWindow::new(show_range, CellGeometry::default());

            let half_cols = i64::from(maze.cols / 2);
            let half_rows = i64::from(maze.rows / 2);
            for (row, z) in (-half_rows..i64::from(maze.rows) - half_rows).enumerate() {
                let columns: Vec<i64> = (-half_cols..i64::from(maze.cols) - half_cols).collect();
                let ordered: Vec<i64> = if row % 2 == 0 {
                    columns
                } else {
                    columns.into_iter().rev().collect()
                };
                for x in ordered {
                    let player = Vec3::new(x as f32 * 16.0 + 8.0, 0.0, z as f32 * 16.0 + 8.0);
                    let report = window
                        .update(player, &mut grid, &mut pools, &mut world)
                        .expect("every step changes parcel");
                    assert_eq!(report.skipped, 0, "seed {seed} range {show_range} at ({x}, {z})");
                }
            }

            for kind in PoolKind::ALL {
                assert_eq!(
                    pools.get(kind).exhaustion_count(),
                    0,
                    "{kind:?} seed {seed} range {show_range}"
                );
            }
            assert_pool_accounting(&grid, &pools);
        }
    }

    #[test]
    fn placed_entities_leave_the_park_position() {
        let (mut grid, mut pools, mut world) = fixture(3, 3, PoolSizes::for_show_range(1));
        let mut window = VisibilityWindow::new(1, CellGeometry::default());
        window.update(Vec3::ZERO, &mut grid, &mut pools, &mut world);

        let slot = grid.cell(1, 1).expect("centre").slots.list(PoolKind::Floor)[0];
        let entity = pools.get(PoolKind::Floor).entity(slot).expect("entity");
        let position = world.find_entity(entity).expect("floor").transform.position;
        assert_eq!(position, Vec3::new(4.0, 0.0, 4.0));
    }
}
