//! Grid geometry: points, topologies, occupancy and pathfinding

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::marker::PhantomData;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of whatever occupies a cell (unit ids in practice)
pub type OccupantId = u32;

// ============================================================================
// POINT
// ============================================================================

/// Integer cell coordinates, column `x` and row `y`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Point shifted by an offset
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ============================================================================
// TOPOLOGIES
// ============================================================================

/// Distance metric and adjacency rules of a grid layout
pub trait Topology: Copy + Default + fmt::Debug + Send + Sync + 'static {
    /// Short name used in logs and config files
    const NAME: &'static str;

    /// Move reachability follows real paths instead of a metric scan
    const PATH_AWARE: bool;

    /// Odd rows are drawn shifted half a cell to the right
    const STAGGERED: bool;

    /// Metric distance between two cells
    fn distance(a: Point, b: Point) -> u32;

    /// Neighbor offsets for a cell (may depend on its row)
    fn neighbor_offsets(p: Point) -> &'static [(i32, i32)];

    /// Admissible A* estimate of the steps between two cells
    fn estimate(a: Point, b: Point) -> u32 {
        Self::distance(a, b)
    }
}

/// Square cells, 8-connected; diagonals cost 1.5 on average
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Square;

const SQUARE_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Topology for Square {
    const NAME: &'static str = "square";
    const PATH_AWARE: bool = false;
    const STAGGERED: bool = false;

    fn distance(a: Point, b: Point) -> u32 {
        let dx = a.x.abs_diff(b.x);
        let dy = a.y.abs_diff(b.y);
        let diag = dx.min(dy);
        let straight = dx.max(dy) - diag;
        // Every second diagonal step costs 2
        straight + diag + diag / 2
    }

    fn neighbor_offsets(_p: Point) -> &'static [(i32, i32)] {
        &SQUARE_OFFSETS
    }

    fn estimate(a: Point, b: Point) -> u32 {
        // Chebyshev: a diagonal is a single unit-cost step when searching
        a.x.abs_diff(b.x).max(a.y.abs_diff(b.y))
    }
}

/// Pointy hexes in odd-row offset layout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hex;

const HEX_EVEN_ROW_OFFSETS: [(i32, i32); 6] = [(-1, 0), (1, 0), (-1, -1), (0, -1), (-1, 1), (0, 1)];
const HEX_ODD_ROW_OFFSETS: [(i32, i32); 6] = [(-1, 0), (1, 0), (0, -1), (1, -1), (0, 1), (1, 1)];

impl Hex {
    /// Offset coordinates to cube coordinates (q, r, s)
    pub fn to_cube(p: Point) -> (i32, i32, i32) {
        let q = p.x - (p.y - (p.y & 1)) / 2;
        let r = p.y;
        (q, r, -q - r)
    }
}

impl Topology for Hex {
    const NAME: &'static str = "hex";
    const PATH_AWARE: bool = true;
    const STAGGERED: bool = true;

    fn distance(a: Point, b: Point) -> u32 {
        let (q1, r1, s1) = Hex::to_cube(a);
        let (q2, r2, s2) = Hex::to_cube(b);
        (q1.abs_diff(q2) + r1.abs_diff(r2) + s1.abs_diff(s2)) / 2
    }

    fn neighbor_offsets(p: Point) -> &'static [(i32, i32)] {
        if p.y & 1 == 0 {
            &HEX_EVEN_ROW_OFFSETS
        } else {
            &HEX_ODD_ROW_OFFSETS
        }
    }
}

// ============================================================================
// GRID
// ============================================================================

/// Grid bookkeeping failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("position {point} is out of bounds ({width}x{height})")]
    OutOfBounds { point: Point, width: i32, height: i32 },
    #[error("position {0} is empty")]
    Vacant(Point),
    #[error("occupant {0} is not on the grid")]
    NotPlaced(OccupantId),
}

/// Bounded grid with a one-to-one mapping between cells and occupants
#[derive(Clone, Debug)]
pub struct Grid<T: Topology> {
    width: i32,
    height: i32,
    cells: FxHashMap<Point, OccupantId>,
    positions: FxHashMap<OccupantId, Point>,
    topology: PhantomData<T>,
}

impl<T: Topology> Grid<T> {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: i32::try_from(width).unwrap_or(i32::MAX),
            height: i32::try_from(height).unwrap_or(i32::MAX),
            cells: FxHashMap::default(),
            positions: FxHashMap::default(),
            topology: PhantomData,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Check if a point lies inside the grid
    pub fn contains(&self, p: Point) -> bool {
        (0..self.width).contains(&p.x) && (0..self.height).contains(&p.y)
    }

    /// Metric distance under this grid's topology
    pub fn distance(&self, a: Point, b: Point) -> u32 {
        T::distance(a, b)
    }

    /// Two distinct cells one metric step apart
    pub fn is_adjacent(&self, a: Point, b: Point) -> bool {
        T::distance(a, b) == 1
    }

    /// Number of occupied cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    // ========================================================================
    // OCCUPANCY
    // ========================================================================

    /// Put an occupant on a cell.
    ///
    /// The occupant leaves its previous cell, and whoever held the target
    /// cell loses its mapping.
    pub fn place(&mut self, p: Point, id: OccupantId) -> Result<(), GridError> {
        if !self.contains(p) {
            return Err(self.out_of_bounds(p));
        }
        if self.positions.get(&id) == Some(&p) {
            return Ok(());
        }
        if let Some(evicted) = self.cells.remove(&p) {
            self.positions.remove(&evicted);
        }
        if let Some(old) = self.positions.remove(&id) {
            self.cells.remove(&old);
        }
        self.cells.insert(p, id);
        self.positions.insert(id, p);
        Ok(())
    }

    /// Clear a cell, returning its former occupant
    pub fn remove(&mut self, p: Point) -> Result<OccupantId, GridError> {
        let id = self.cells.remove(&p).ok_or(GridError::Vacant(p))?;
        self.positions.remove(&id);
        Ok(id)
    }

    /// Occupant of a cell; `None` for empty or out-of-bounds cells
    pub fn occupant_at(&self, p: Point) -> Option<OccupantId> {
        self.cells.get(&p).copied()
    }

    pub fn is_occupied(&self, p: Point) -> bool {
        self.cells.contains_key(&p)
    }

    /// Cell of an occupant
    pub fn position_of(&self, id: OccupantId) -> Result<Point, GridError> {
        self.positions.get(&id).copied().ok_or(GridError::NotPlaced(id))
    }

    /// All (cell, occupant) pairs in row-major order
    pub fn occupants(&self) -> Vec<(Point, OccupantId)> {
        let mut all: Vec<_> = self.cells.iter().map(|(&p, &id)| (p, id)).collect();
        all.sort_by_key(|&(p, _)| (p.y, p.x));
        all
    }

    // ========================================================================
    // NEIGHBORHOOD
    // ========================================================================

    /// In-bounds neighbors of a cell
    pub fn neighbors(&self, p: Point) -> Vec<Point> {
        T::neighbor_offsets(p)
            .iter()
            .map(|&(dx, dy)| p.offset(dx, dy))
            .filter(|n| self.contains(*n))
            .collect()
    }

    /// Cells reachable through empty cells in at most `budget` steps,
    /// including `start`, in row-major order
    pub fn reachable_within(&self, start: Point, budget: u32) -> Vec<Point> {
        let mut steps: FxHashMap<Point, u32> = FxHashMap::default();
        steps.insert(start, 0);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let taken = steps[&current];
            if taken >= budget {
                continue;
            }
            for n in self.neighbors(current) {
                if self.is_occupied(n) || steps.contains_key(&n) {
                    continue;
                }
                steps.insert(n, taken + 1);
                queue.push_back(n);
            }
        }

        let mut cells: Vec<_> = steps.into_keys().collect();
        cells.sort_by_key(|p| (p.y, p.x));
        cells
    }

    // ========================================================================
    // PATHFINDING
    // ========================================================================

    /// Shortest path from `start` to an empty `goal`, both ends included
    pub fn find_path(&self, start: Point, goal: Point) -> Option<Vec<Point>> {
        if start == goal {
            return Some(vec![start]);
        }
        if !self.contains(goal) || self.is_occupied(goal) {
            return None;
        }
        self.a_star(start, |p| p == goal, |p| T::estimate(p, goal))
    }

    /// Shortest path from `start` to the nearest reachable cell next to `goal`
    pub fn find_path_adjacent(&self, start: Point, goal: Point) -> Option<Vec<Point>> {
        if start == goal || self.is_adjacent(start, goal) {
            return Some(vec![start]);
        }
        self.a_star(
            start,
            |p| T::distance(p, goal) == 1,
            |p| T::estimate(p, goal).saturating_sub(1),
        )
    }

    /// A* over unit-cost steps; occupied cells are walls.
    ///
    /// Equal priorities pop in insertion order.
    fn a_star<A, H>(&self, start: Point, arrived: A, estimate: H) -> Option<Vec<Point>>
    where
        A: Fn(Point) -> bool,
        H: Fn(Point) -> u32,
    {
        let mut open = BinaryHeap::new();
        let mut closed: FxHashSet<Point> = FxHashSet::default();
        let mut came_from: FxHashMap<Point, Point> = FxHashMap::default();
        let mut g_score: FxHashMap<Point, u32> = FxHashMap::default();
        let mut counter: u64 = 0;

        g_score.insert(start, 0);
        open.push(Reverse((estimate(start), counter, start)));

        while let Some(Reverse((_, _, current))) = open.pop() {
            if arrived(current) {
                return Some(reconstruct_path(&came_from, current));
            }
            if !closed.insert(current) {
                continue;
            }

            let tentative = g_score[&current] + 1;
            for n in self.neighbors(current) {
                if self.is_occupied(n) || closed.contains(&n) {
                    continue;
                }
                if tentative < g_score.get(&n).copied().unwrap_or(u32::MAX) {
                    came_from.insert(n, current);
                    g_score.insert(n, tentative);
                    counter += 1;
                    open.push(Reverse((tentative + estimate(n), counter, n)));
                }
            }
        }

        None
    }

    // ========================================================================
    // STEPWISE MOVEMENT
    // ========================================================================

    /// Walk an occupant up to `max_steps` along the path to `goal`.
    ///
    /// Returns `false` when it did not move (already there, or no path).
    pub fn advance_toward(&mut self, id: OccupantId, goal: Point, max_steps: usize) -> Result<bool, GridError> {
        let start = self.position_of(id)?;
        let path = match self.find_path(start, goal) {
            Some(path) => path,
            None => return Ok(false),
        };
        self.walk(id, &path, max_steps)
    }

    /// Walk an occupant up to `max_steps` toward a cell next to `goal`
    pub fn advance_adjacent(&mut self, id: OccupantId, goal: Point, max_steps: usize) -> Result<bool, GridError> {
        let start = self.position_of(id)?;
        let path = match self.find_path_adjacent(start, goal) {
            Some(path) => path,
            None => return Ok(false),
        };
        self.walk(id, &path, max_steps)
    }

    fn walk(&mut self, id: OccupantId, path: &[Point], max_steps: usize) -> Result<bool, GridError> {
        let steps = max_steps.min(path.len().saturating_sub(1));
        if steps == 0 {
            return Ok(false);
        }
        self.place(path[steps], id)?;
        Ok(true)
    }

    fn out_of_bounds(&self, point: Point) -> GridError {
        GridError::OutOfBounds {
            point,
            width: self.width,
            height: self.height,
        }
    }
}

fn reconstruct_path(came_from: &FxHashMap<Point, Point>, mut current: Point) -> Vec<Point> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        current = prev;
        path.push(current);
    }
    path.reverse();
    path
}

// ============================================================================
// TESTS
// ============================================================================
