use geo_types::{coord, Coord, Rect};
use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::{Cell, GridError};

pub const DEFAULT_GRID_SIZE: u32 = 300;
pub const DEFAULT_NEIGHBOR_RANGE: u32 = 1;

/// A fixed-resolution square grid laid over a geographic rectangle.
///
/// Cells are indexed `0..grid_size` on both axes and flattened row-major, so
/// per-cell tables can be plain vectors of length [`GridConfig::cell_count`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridConfigDef", into = "GridConfigDef")]
pub struct GridConfig {
    grid_size: u32,
    neighbor_range: u32,
    bounds: Rect<f64>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct GridConfigDef {
    grid_size: u32,
    #[serde(default = "default_neighbor_range")]
    neighbor_range: u32,
    bounds: Rect<f64>,
}

fn default_neighbor_range() -> u32 {
    DEFAULT_NEIGHBOR_RANGE
}

impl TryFrom<GridConfigDef> for GridConfig {
    type Error = GridError;

    fn try_from(def: GridConfigDef) -> Result<Self, Self::Error> {
        GridConfig::new(def.grid_size, def.neighbor_range, def.bounds)
    }
}

impl From<GridConfig> for GridConfigDef {
    fn from(
        GridConfig {
            grid_size,
            neighbor_range,
            bounds,
        }: GridConfig,
    ) -> Self {
        Self {
            grid_size,
            neighbor_range,
            bounds,
        }
    }
}

impl GridConfig {
    pub fn new(grid_size: u32, neighbor_range: u32, bounds: Rect<f64>) -> Result<Self, GridError> {
        if grid_size < 2 {
            return Err(GridError::InvalidGridSize(grid_size));
        }
        if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
            return Err(GridError::DegenerateBounds);
        }
        Ok(Self {
            grid_size,
            neighbor_range,
            bounds,
        })
    }

    /// A grid whose geographic bounds coincide with its cell indices, for data
    /// that is already discretized.
    pub fn with_size(grid_size: u32) -> Result<Self, GridError> {
        let side = f64::from(grid_size);
        Self::new(
            grid_size,
            DEFAULT_NEIGHBOR_RANGE,
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: side, y: side }),
        )
    }

    pub fn with_neighbor_range(self, neighbor_range: u32) -> Self {
        Self {
            neighbor_range,
            ..self
        }
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn neighbor_range(&self) -> u32 {
        self.neighbor_range
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    pub fn cell_count(&self) -> usize {
        self.grid_size as usize * self.grid_size as usize
    }

    pub fn contains(&self, cell: Cell) -> bool {
        let size = i64::from(self.grid_size);
        (0..size).contains(&i64::from(cell.x)) && (0..size).contains(&i64::from(cell.y))
    }

    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        self.contains(cell)
            .then(|| cell.x as usize * self.grid_size as usize + cell.y as usize)
    }

    pub fn cell_at(&self, index: usize) -> Option<Cell> {
        let size = self.grid_size as usize;
        (index < self.cell_count()).then(|| Cell::new((index / size) as i32, (index % size) as i32))
    }

    pub fn check(&self, cell: Cell) -> Result<Cell, GridError> {
        self.try_index(cell).map(|_| cell)
    }

    pub fn try_index(&self, cell: Cell) -> Result<usize, GridError> {
        self.index_of(cell).ok_or(GridError::CellOutOfGrid {
            cell,
            grid_size: self.grid_size,
        })
    }

    /// In-grid cells within `neighbor_range` (Chebyshev) of `cell`, the cell
    /// itself included, in row-major order.
    pub fn neighborhood(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        let r = self.neighbor_range as i32;
        iproduct!(cell.x - r..=cell.x + r, cell.y - r..=cell.y + r)
            .map(Cell::from)
            .filter(|c| self.contains(*c))
    }

    fn steps(&self) -> (f64, f64) {
        let size = f64::from(self.grid_size);
        (self.bounds.width() / size, self.bounds.height() / size)
    }

    /// The cell containing a geographic coordinate, `None` outside the bounds.
    pub fn cell_of(&self, coord: Coord<f64>) -> Option<Cell> {
        let min = self.bounds.min();
        let max = self.bounds.max();
        if !(min.x <= coord.x && coord.x < max.x && min.y <= coord.y && coord.y < max.y) {
            return None;
        }
        let (x_step, y_step) = self.steps();
        let cell = Cell::new(
            ((coord.x - min.x) / x_step) as i32,
            ((coord.y - min.y) / y_step) as i32,
        );
        // rounding at the upper edge may land one past the last cell
        self.contains(cell).then_some(cell)
    }

    /// Geographic coordinate of a fractional cell position, where `(x, y)` is
    /// the lower corner of cell `(x, y)`.
    pub fn coordinate_at(&self, x: f64, y: f64) -> Coord<f64> {
        let min = self.bounds.min();
        let (x_step, y_step) = self.steps();
        coord! { x: min.x + x_step * x, y: min.y + y_step * y }
    }

    pub fn coordinate_of(&self, cell: Cell) -> Option<Coord<f64>> {
        self.contains(cell)
            .then(|| self.coordinate_at(f64::from(cell.x), f64::from(cell.y)))
    }
}
