use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// A square of the grid. Coordinates are signed so that a jittered cell which
/// left the grid is still representable; [`crate::GridConfig::contains`] decides
/// whether it is valid.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    From,
    Into,
    Display,
    Serialize,
    Deserialize,
)]
#[display("({x}, {y})")]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shifted by `(dx, dy)`, saturating at the `i32` range.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    pub fn sq_euclidean(self, other: Cell) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx * dx + dy * dy
    }

    pub fn euclidean(self, other: Cell) -> f64 {
        (self.sq_euclidean(other) as f64).sqrt()
    }

    /// Cell distance, i.e. the number of king moves between the two cells.
    pub fn chebyshev(self, other: Cell) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

/// Maps a cell of a `from_size` grid onto the coarser (or finer) `to_size` grid
/// covering the same area.
pub fn project_cell(cell: Cell, from_size: u32, to_size: u32) -> Cell {
    let scale = f64::from(to_size) / f64::from(from_size);
    Cell::new(
        (f64::from(cell.x) * scale) as i32,
        (f64::from(cell.y) * scale) as i32,
    )
}
