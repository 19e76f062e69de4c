use thiserror::Error;

use crate::Cell;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("cell {cell} is outside the {grid_size}x{grid_size} grid")]
    CellOutOfGrid { cell: Cell, grid_size: u32 },

    #[error("timestamp at index {index} goes backwards ({previous} -> {current})")]
    TimestampOrder {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("grid size must be at least 2, got {0}")]
    InvalidGridSize(u32),

    #[error("grid bounds must have a positive width and height")]
    DegenerateBounds,
}
