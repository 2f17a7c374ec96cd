use super::maze::{MazeGrid, Side};
use super::rng::SeededRng;

/// Decoration code for a cell. Room codes are raw draws in `[0, 10)`; the
/// corridor codes are sentinels outside that range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) struct CellType(pub(crate) u8);

impl CellType {
    pub(crate) const EMPTY: CellType = CellType(0);
    pub(crate) const TREE: CellType = CellType(8);
    pub(crate) const CORRIDOR_EAST_WEST: CellType = CellType(11);
    pub(crate) const CORRIDOR_NORTH_SOUTH: CellType = CellType(12);

    const ROOM_DRAW_RANGE: usize = 10;
    const TREE_REDRAW_RANGE: usize = 7;

    #[cfg(test)]
    pub(crate) fn is_corridor(self) -> bool {
        self == Self::CORRIDOR_EAST_WEST || self == Self::CORRIDOR_NORTH_SOUTH
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DecorRules {
    pub(crate) spawn_min: (u32, u32),
    pub(crate) spawn_max: (u32, u32),
    pub(crate) spawn_center: (f32, f32),
    pub(crate) tree_clear_radius: f32,
}

impl DecorRules {
    pub(crate) const DEFAULT_TREE_CLEAR_RADIUS: f32 = 5.0;

    /// Spawn region is the 2x2 block around the grid centre, which is where
    /// world parcel (0,0) lands.
    pub(crate) fn centered(cols: u32, rows: u32) -> Self {
        let cx = cols / 2;
        let cy = rows / 2;
        let min = (cx.saturating_sub(1), cy.saturating_sub(1));
        Self {
            spawn_min: min,
            spawn_max: (cx, cy),
            spawn_center: (
                (min.0 as f32 + cx as f32) * 0.5,
                (min.1 as f32 + cy as f32) * 0.5,
            ),
            tree_clear_radius: Self::DEFAULT_TREE_CLEAR_RADIUS,
        }
    }

    fn in_spawn_region(&self, x: u32, y: u32) -> bool {
        (self.spawn_min.0..=self.spawn_max.0).contains(&x)
            && (self.spawn_min.1..=self.spawn_max.1).contains(&y)
    }

    fn near_spawn(&self, x: u32, y: u32) -> bool {
        let dx = x as f32 - self.spawn_center.0;
        let dy = y as f32 - self.spawn_center.1;
        (dx * dx + dy * dy).sqrt() < self.tree_clear_radius
    }
}

/// Assigns every cell its decoration code in grid order. Rules apply in
/// order and later ones win: random room draw, cleared spawn region, open
/// corridors, then trees pushed away from the spawn.
pub(crate) fn decorate(grid: &mut MazeGrid, rng: &mut SeededRng, rules: &DecorRules) {
    for cell in grid.cells_mut() {
        let mut kind = CellType(rng.below(CellType::ROOM_DRAW_RANGE) as u8);

        if rules.in_spawn_region(cell.x, cell.y) {
            kind = CellType::EMPTY;
        }
        if !cell.has_wall(Side::Bottom) && !cell.has_wall(Side::Top) {
            kind = CellType::CORRIDOR_NORTH_SOUTH;
        }
        if !cell.has_wall(Side::Right) && !cell.has_wall(Side::Left) {
            kind = CellType::CORRIDOR_EAST_WEST;
        }
        if kind == CellType::TREE && rules.near_spawn(cell.x, cell.y) {
            kind = CellType(rng.below(CellType::TREE_REDRAW_RANGE) as u8 + 1);
        }

        cell.kind = kind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decorated(cols: u32, rows: u32, seed: u64) -> MazeGrid {
        let mut grid = MazeGrid::new(cols, rows);
        let mut rng = SeededRng::new(seed);
        grid.generate(&mut rng, 10_000);
        decorate(&mut grid, &mut rng, &DecorRules::centered(cols, rows));
        grid
    }

    #[test]
    fn decoration_is_deterministic_for_seed() {
        let a = decorated(20, 20, 7);
        let b = decorated(20, 20, 7);
        let kinds_a: Vec<CellType> = a.cells().iter().map(|cell| cell.kind).collect();
        let kinds_b: Vec<CellType> = b.cells().iter().map(|cell| cell.kind).collect();
        assert_eq!(kinds_a, kinds_b);
    }

    #[test]
    fn spawn_region_is_clear_unless_corridor() {
        let grid = decorated(40, 40, 3);
        for y in 19..=20 {
            for x in 19..=20 {
                let cell = grid.cell(x, y).expect("spawn cell");
                assert!(
                    cell.kind == CellType::EMPTY || cell.kind.is_corridor(),
                    "spawn cell ({x}, {y}) got {:?}",
                    cell.kind
                );
            }
        }
    }

    #[test]
    fn open_axes_become_corridors() {
        let grid = decorated(30, 30, 11);
        for cell in grid.cells() {
            let east_west = !cell.has_wall(Side::Right) && !cell.has_wall(Side::Left);
            let north_south = !cell.has_wall(Side::Bottom) && !cell.has_wall(Side::Top);
            if east_west {
                assert_eq!(cell.kind, CellType::CORRIDOR_EAST_WEST);
            } else if north_south {
                assert_eq!(cell.kind, CellType::CORRIDOR_NORTH_SOUTH);
            } else {
                assert!(cell.kind.0 < 10);
            }
        }
    }

    #[test]
    fn no_trees_near_spawn() {
        let rules = DecorRules::centered(40, 40);
        for seed in 1..6 {
            let grid = decorated(40, 40, seed);
            for cell in grid.cells() {
                if rules.near_spawn(cell.x, cell.y) {
                    assert_ne!(cell.kind, CellType::TREE, "seed {seed}");
                }
            }
        }
    }

    #[test]
    fn centered_rules_cover_grid_middle() {
        let rules = DecorRules::centered(40, 40);
        assert_eq!(rules.spawn_min, (19, 19));
        assert_eq!(rules.spawn_max, (20, 20));
        assert_eq!(rules.spawn_center, (19.5, 19.5));
        assert!(rules.in_spawn_region(20, 19));
        assert!(!rules.in_spawn_region(21, 19));
    }
}
