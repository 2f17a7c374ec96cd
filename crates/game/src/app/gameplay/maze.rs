use tracing::{debug, warn};

use super::decor::CellType;
use super::pool::CellSlots;
use super::rng::SeededRng;

/// Wall index convention: 0 faces y-1, 1 faces x+1, 2 faces y+1, 3 faces x-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Bottom,
    Right,
    Top,
    Left,
}

impl Side {
    #[cfg(test)]
    pub(crate) const ALL: [Side; 4] = [Side::Bottom, Side::Right, Side::Top, Side::Left];

    pub(crate) const fn index(self) -> usize {
        match self {
            Side::Bottom => 0,
            Side::Right => 1,
            Side::Top => 2,
            Side::Left => 3,
        }
    }

    pub(crate) const fn opposite(self) -> Side {
        match self {
            Side::Bottom => Side::Top,
            Side::Right => Side::Left,
            Side::Top => Side::Bottom,
            Side::Left => Side::Right,
        }
    }

    const fn offset(self) -> (i64, i64) {
        match self {
            Side::Bottom => (0, -1),
            Side::Right => (1, 0),
            Side::Top => (0, 1),
            Side::Left => (-1, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum RevealState {
    #[default]
    NotRevealed,
    JustRevealed,
    JustHidden,
    StillRevealed,
}

#[derive(Debug, Clone)]
pub(crate) struct Cell {
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) visited: bool,
    pub(crate) walls: [bool; 4],
    pub(crate) kind: CellType,
    pub(crate) reveal: RevealState,
    pub(crate) slots: CellSlots,
}

impl Cell {
    fn new(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            visited: false,
            walls: [true; 4],
            kind: CellType::EMPTY,
            reveal: RevealState::NotRevealed,
            slots: CellSlots::default(),
        }
    }

    pub(crate) fn has_wall(&self, side: Side) -> bool {
        self.walls[side.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MazeStats {
    pub(crate) iterations: u32,
    pub(crate) carved: u32,
    pub(crate) completed: bool,
}

/// Dense row-major grid, `index = x + y * cols`.
#[derive(Debug, Clone)]
pub(crate) struct MazeGrid {
    cols: u32,
    rows: u32,
    cells: Vec<Cell>,
}

impl MazeGrid {
    pub(crate) fn new(cols: u32, rows: u32) -> Self {
        let mut cells = Vec::with_capacity(cols as usize * rows as usize);
        for y in 0..rows {
            for x in 0..cols {
                cells.push(Cell::new(x, y));
            }
        }
        Self { cols, rows, cells }
    }

    pub(crate) fn cols(&self) -> u32 {
        self.cols
    }

    pub(crate) fn rows(&self) -> u32 {
        self.rows
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn index_of(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.cols) || y >= i64::from(self.rows) {
            return None;
        }
        Some(x as usize + y as usize * self.cols as usize)
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, x: i64, y: i64) -> Option<&Cell> {
        self.index_of(x, y).map(|index| &self.cells[index])
    }

    pub(crate) fn cell_mut(&mut self, x: i64, y: i64) -> Option<&mut Cell> {
        self.index_of(x, y).map(|index| &mut self.cells[index])
    }

    #[cfg(test)]
    pub(crate) fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Randomized depth-first backtracker with an explicit stack, starting at
    /// (0,0). Stops when the walk is back at the origin with nothing left to
    /// carve, or after `iteration_ceiling` steps.
    pub(crate) fn generate(&mut self, rng: &mut SeededRng, iteration_ceiling: u32) -> MazeStats {
        let mut stats = MazeStats {
            iterations: 0,
            carved: 0,
            completed: false,
        };
        if self.cells.is_empty() {
            stats.completed = true;
            return stats;
        }

        let mut current = 0usize;
        let mut stack: Vec<usize> = Vec::new();
        while stats.iterations < iteration_ceiling {
            stats.iterations += 1;
            self.cells[current].visited = true;

            match self.random_unvisited_neighbour(current, rng) {
                Some(next) => {
                    self.cells[next].visited = true;
                    stack.push(current);
                    if self.remove_walls(current, next) {
                        stats.carved += 1;
                    }
                    current = next;
                }
                None => match stack.pop() {
                    Some(previous) => current = previous,
                    None => {
                        stats.completed = true;
                        break;
                    }
                },
            }
        }

        if stats.completed {
            debug!(
                cols = self.cols,
                rows = self.rows,
                iterations = stats.iterations,
                carved = stats.carved,
                "maze_generated"
            );
        } else {
            warn!(
                cols = self.cols,
                rows = self.rows,
                iteration_ceiling,
                carved = stats.carved,
                "maze_iteration_ceiling_reached"
            );
        }
        stats
    }

    /// Clears the shared wall on both cells. Returns false when the cells are
    /// not orthogonal neighbours.
    pub(crate) fn remove_walls(&mut self, a: usize, b: usize) -> bool {
        let (Some(cell_a), Some(cell_b)) = (self.cells.get(a), self.cells.get(b)) else {
            return false;
        };
        let dx = i64::from(cell_a.x) - i64::from(cell_b.x);
        let dy = i64::from(cell_a.y) - i64::from(cell_b.y);
        let side_of_a = match (dx, dy) {
            (1, 0) => Side::Left,
            (-1, 0) => Side::Right,
            (0, 1) => Side::Bottom,
            (0, -1) => Side::Top,
            _ => return false,
        };
        self.cells[a].walls[side_of_a.index()] = false;
        self.cells[b].walls[side_of_a.opposite().index()] = false;
        true
    }

    fn random_unvisited_neighbour(&self, index: usize, rng: &mut SeededRng) -> Option<usize> {
        let cell = &self.cells[index];
        let (x, y) = (i64::from(cell.x), i64::from(cell.y));
        // Probe order y-1, x+1, y+1, x-1 keeps draws stable for a given seed.
        let mut candidates: Vec<usize> = Vec::with_capacity(4);
        for side in [Side::Bottom, Side::Right, Side::Top, Side::Left] {
            let (ox, oy) = side.offset();
            if let Some(neighbour) = self.index_of(x + ox, y + oy) {
                if !self.cells[neighbour].visited {
                    candidates.push(neighbour);
                }
            }
        }
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.below(candidates.len())])
    }

    #[cfg(test)]
    pub(crate) fn neighbour_through(&self, index: usize, side: Side) -> Option<usize> {
        let cell = self.cells.get(index)?;
        let (ox, oy) = side.offset();
        self.index_of(i64::from(cell.x) + ox, i64::from(cell.y) + oy)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    const CEILING: u32 = 10_000;

    fn generated(cols: u32, rows: u32, seed: u64) -> (MazeGrid, MazeStats) {
        let mut grid = MazeGrid::new(cols, rows);
        let mut rng = SeededRng::new(seed);
        let stats = grid.generate(&mut rng, CEILING);
        (grid, stats)
    }

    fn reachable_from_origin(grid: &MazeGrid) -> usize {
        let mut seen = vec![false; grid.len()];
        let mut queue = VecDeque::from([0usize]);
        seen[0] = true;
        let mut count = 0;
        while let Some(index) = queue.pop_front() {
            count += 1;
            for side in Side::ALL {
                if grid.cells()[index].has_wall(side) {
                    continue;
                }
                let neighbour = grid
                    .neighbour_through(index, side)
                    .expect("open wall must lead to a cell");
                if !seen[neighbour] {
                    seen[neighbour] = true;
                    queue.push_back(neighbour);
                }
            }
        }
        count
    }

    fn open_wall_pairs(grid: &MazeGrid) -> usize {
        let mut pairs = 0;
        for (index, cell) in grid.cells().iter().enumerate() {
            for side in [Side::Right, Side::Top] {
                if !cell.has_wall(side) && grid.neighbour_through(index, side).is_some() {
                    pairs += 1;
                }
            }
        }
        pairs
    }

    #[test]
    fn seed_one_four_by_four_visits_every_cell() {
        let (grid, stats) = generated(4, 4, 1);
        assert!(stats.completed);
        assert!(stats.iterations < CEILING);
        assert!(grid.cells().iter().all(|cell| cell.visited));
    }

    #[test]
    fn maze_is_a_spanning_tree() {
        for (cols, rows) in [(2, 2), (5, 3), (3, 7), (8, 8), (40, 40)] {
            for seed in [1u64, 2, 3, 77] {
                let (grid, stats) = generated(cols, rows, seed);
                let cells = (cols * rows) as usize;
                assert_eq!(reachable_from_origin(&grid), cells, "{cols}x{rows} seed {seed}");
                assert_eq!(open_wall_pairs(&grid), cells - 1, "{cols}x{rows} seed {seed}");
                assert_eq!(stats.carved as usize, cells - 1);
            }
        }
    }

    #[test]
    fn cleared_walls_are_symmetric() {
        let (grid, _) = generated(9, 6, 12);
        for (index, cell) in grid.cells().iter().enumerate() {
            for side in Side::ALL {
                match grid.neighbour_through(index, side) {
                    Some(neighbour) => assert_eq!(
                        cell.has_wall(side),
                        grid.cells()[neighbour].has_wall(side.opposite()),
                        "cell ({}, {}) side {side:?}",
                        cell.x,
                        cell.y
                    ),
                    None => assert!(cell.has_wall(side), "outer wall must stay solid"),
                }
            }
        }
    }

    #[test]
    fn same_seed_reproduces_layout() {
        let (a, _) = generated(12, 10, 42);
        let (b, _) = generated(12, 10, 42);
        let walls_a: Vec<[bool; 4]> = a.cells().iter().map(|cell| cell.walls).collect();
        let walls_b: Vec<[bool; 4]> = b.cells().iter().map(|cell| cell.walls).collect();
        assert_eq!(walls_a, walls_b);
    }

    #[test]
    fn single_cell_grid_terminates_immediately() {
        let (grid, stats) = generated(1, 1, 3);
        assert!(stats.completed);
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.carved, 0);
        assert!(grid.cells()[0].visited);
        assert_eq!(grid.cells()[0].walls, [true; 4]);
    }

    #[test]
    fn iteration_ceiling_stops_generation() {
        let mut grid = MazeGrid::new(4, 4);
        let mut rng = SeededRng::new(1);
        let stats = grid.generate(&mut rng, 3);
        assert!(!stats.completed);
        assert_eq!(stats.iterations, 3);
    }

    #[test]
    fn out_of_range_lookups_return_none() {
        let grid = MazeGrid::new(4, 3);
        assert!(grid.cell(-1, 0).is_none());
        assert!(grid.cell(0, -1).is_none());
        assert!(grid.cell(4, 0).is_none());
        assert!(grid.cell(0, 3).is_none());
        let cell = grid.cell(3, 2).expect("last cell");
        assert_eq!((cell.x, cell.y), (3, 2));
        assert_eq!(grid.index_of(3, 2), Some(11));
    }

    #[test]
    fn remove_walls_follows_delta_sign_convention() {
        let mut grid = MazeGrid::new(3, 3);
        let center = grid.index_of(1, 1).expect("center");
        let left = grid.index_of(0, 1).expect("left");
        let below = grid.index_of(1, 0).expect("below");
        let diagonal = grid.index_of(2, 2).expect("diagonal");

        assert!(grid.remove_walls(center, left));
        assert!(!grid.cells()[center].walls[3]);
        assert!(!grid.cells()[left].walls[1]);

        assert!(grid.remove_walls(center, below));
        assert!(!grid.cells()[center].walls[0]);
        assert!(!grid.cells()[below].walls[2]);

        assert!(!grid.remove_walls(center, diagonal));
        assert!(grid.cells()[diagonal].walls.iter().all(|wall| *wall));
    }
}
