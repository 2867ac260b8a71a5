//! Uniform-grid index over 2-D positions.

use crate::core::{Position, Result, StoreError};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Spatial index bucketing tracked ids into fixed-size square cells.
///
/// Each id has exactly one current position and therefore lives in exactly
/// one cell; re-inserting moves it. Queries scan only the cells whose
/// bounding box intersects the query region and then filter by exact
/// distance.
///
/// The cell size is a constructor parameter on purpose: small cells cost
/// memory, large cells cost per-query scan work, and the right trade
/// depends on the caller's typical query radius.
pub struct SpatialGrid {
    cell_size: f64,
    width: f64,
    height: f64,
    cells: HashMap<(i64, i64), HashSet<String>>,
    positions: HashMap<String, Position>,
}

impl SpatialGrid {
    pub fn new(cell_size: f64, width: f64, height: f64) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(StoreError::InvalidConfig(
                "cell_size must be finite and > 0".to_string(),
            ));
        }
        if !width.is_finite() || width <= 0.0 || !height.is_finite() || height <= 0.0 {
            return Err(StoreError::InvalidConfig(
                "grid bounds must be finite and > 0".to_string(),
            ));
        }
        Ok(Self {
            cell_size,
            width,
            height,
            cells: HashMap::new(),
            positions: HashMap::new(),
        })
    }

    fn cell_key(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (y / self.cell_size).floor() as i64,
        )
    }

    /// Track `id` at `(x, y)`, removing any prior placement first.
    /// Idempotent for repeated identical calls.
    pub fn insert(&mut self, id: impl Into<String>, x: f64, y: f64) {
        let id = id.into();
        self.remove(&id);
        let key = self.cell_key(x, y);
        self.cells.entry(key).or_default().insert(id.clone());
        self.positions.insert(id, Position::new(x, y));
    }

    /// Stop tracking `id`. Returns false if it was untracked.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(position) = self.positions.remove(id) else {
            return false;
        };
        let key = self.cell_key(position.x, position.y);
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.remove(id);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
        true
    }

    /// Last recorded position of `id`.
    pub fn position_of(&self, id: &str) -> Option<Position> {
        self.positions.get(id).copied()
    }

    /// Every tracked id within Euclidean distance `radius` of `(x, y)`.
    /// Result order is unspecified.
    pub fn query_radius(&self, x: f64, y: f64, radius: f64) -> Vec<String> {
        if radius < 0.0 || self.positions.is_empty() {
            return Vec::new();
        }
        let center = Position::new(x, y);
        let min = self.cell_key(x - radius, y - radius);
        let max = self.cell_key(x + radius, y + radius);

        let mut out = Vec::new();
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                let Some(cell) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for id in cell {
                    if let Some(position) = self.positions.get(id) {
                        if position.distance_to(&center) <= radius {
                            out.push(id.clone());
                        }
                    }
                }
            }
        }
        out
    }

    /// The `k` tracked ids closest to `(x, y)`, distance ascending, ties
    /// broken by id. The search radius starts at one cell and doubles
    /// until at least `2k` candidates are in reach or the radius exceeds
    /// the grid diagonal.
    pub fn query_nearest(&self, x: f64, y: f64, k: usize) -> Vec<String> {
        if k == 0 || self.positions.is_empty() {
            return Vec::new();
        }
        let diagonal = (self.width * self.width + self.height * self.height).sqrt();
        let mut radius = self.cell_size;
        let mut candidates = self.query_radius(x, y, radius);
        while candidates.len() < 2 * k && radius <= diagonal {
            radius *= 2.0;
            candidates = self.query_radius(x, y, radius);
        }

        let center = Position::new(x, y);
        let mut scored: Vec<(f64, String)> = candidates
            .into_iter()
            .filter_map(|id| {
                self.positions
                    .get(&id)
                    .map(|position| (position.distance_to(&center), id))
            })
            .collect();
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.into_iter().take(k).map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }

    pub fn stats(&self) -> GridStats {
        let total_items = self.positions.len();
        let total_cells = self.cells.len();
        GridStats {
            total_items,
            total_cells,
            avg_items_per_cell: if total_cells == 0 {
                0.0
            } else {
                total_items as f64 / total_cells as f64
            },
        }
    }
}

/// Grid occupancy statistics
#[derive(Debug, Clone)]
pub struct GridStats {
    pub total_items: usize,
    pub total_cells: usize,
    pub avg_items_per_cell: f64,
}

impl fmt::Display for GridStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Grid Stats: {} items in {} cells (avg {:.1}/cell)",
            self.total_items, self.total_cells, self.avg_items_per_cell
        )
    }
}
