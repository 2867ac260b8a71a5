pub mod grid;

pub use grid::{GridStats, SpatialGrid};
