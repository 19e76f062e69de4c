use derive_more::{Deref, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{project_cell, Cell, GridConfig, GridError, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub cell: Cell,
    pub timestamp: Timestamp,
}

impl Point {
    pub const fn new(cell: Cell, timestamp: Timestamp) -> Self {
        Self { cell, timestamp }
    }

    /// Same timestamp, different place.
    pub const fn moved_to(self, cell: Cell) -> Self {
        Self {
            cell,
            timestamp: self.timestamp,
        }
    }
}

impl From<(i32, i32, Timestamp)> for Point {
    fn from((x, y, timestamp): (i32, i32, Timestamp)) -> Self {
        Self::new(Cell::new(x, y), timestamp)
    }
}

/// Time-ordered sequence of visited cells.
#[derive(Debug, Clone, Default, PartialEq, Deref, From, Into, Serialize, Deserialize)]
pub struct Trajectory(Vec<Point>);

impl FromIterator<Point> for Trajectory {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Trajectory {
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Builds a trajectory from bare cells, stamping them `0, 1, 2, ...`.
    pub fn from_cells<I: IntoIterator<Item = Cell>>(cells: I) -> Self {
        cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| Point::new(cell, i as Timestamp))
            .collect()
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.0.iter().map(|p| p.cell)
    }

    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).copied().collect())
    }

    /// Fails on the first cell outside `grid` or the first timestamp that goes
    /// backwards.
    pub fn validate(&self, grid: &GridConfig) -> Result<(), GridError> {
        for point in &self.0 {
            grid.check(point.cell)?;
        }
        if let Some((index, (prev, curr))) = self
            .0
            .iter()
            .tuple_windows()
            .enumerate()
            .find(|(_, (prev, curr))| curr.timestamp < prev.timestamp)
        {
            return Err(GridError::TimestampOrder {
                index: index + 1,
                previous: prev.timestamp,
                current: curr.timestamp,
            });
        }
        Ok(())
    }

    pub fn project(&self, from_size: u32, to_size: u32) -> Self {
        self.0
            .iter()
            .map(|p| p.moved_to(project_cell(p.cell, from_size, to_size)))
            .collect()
    }

    /// Euclidean length of every step, in cells.
    pub fn step_lengths(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells().tuple_windows().map(|(a, b)| a.euclidean(b))
    }

    /// Sum of squared step lengths. This is the trip measure the utility
    /// statistics compare, not a geometric length.
    pub fn path_length(&self) -> f64 {
        self.cells()
            .tuple_windows()
            .map(|(a, b)| a.sq_euclidean(b) as f64)
            .sum()
    }
}
