#![no_std]

extern crate alloc;

use serde::{Deserialize, Serialize};

pub use action::*;
pub use engine::*;
pub use error::*;
pub use next_tile::*;
pub use store::*;
pub use tile::*;
pub use types::*;

mod action;
mod engine;
mod error;
mod next_tile;
mod store;
mod tile;
mod types;

/// Fixed board dimensions, decided once per game session.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
}

impl GridConfig {
    pub const fn new_unchecked(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn new(rows: usize, cols: usize) -> Self {
        let rows = rows.clamp(1, Coord::MAX as usize);
        let cols = cols.clamp(1, Coord::MAX as usize);
        Self::new_unchecked(rows, cols)
    }

    pub const fn total_cells(&self) -> usize {
        self.rows * self.cols
    }
}
