use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the board, in the same units as the grid bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Key extracted from an entity for a secondary index.
///
/// Extractors are registered per index and return a typed key; the loose
/// "whatever the field happens to hold" lookups of ad hoc stores are not
/// supported on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl IndexKey {
    /// Type-tagged encoding used inside cache signatures, so `Int(1)` and
    /// `Text("1")` never produce the same signature.
    pub fn signature(&self) -> String {
        match self {
            IndexKey::Text(s) => format!("t:{s}"),
            IndexKey::Int(i) => format!("i:{i}"),
            IndexKey::Bool(b) => format!("b:{b}"),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Text(s) => write!(f, "{s}"),
            IndexKey::Int(i) => write!(f, "{i}"),
            IndexKey::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Text(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::Text(value)
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Int(value)
    }
}

impl From<bool> for IndexKey {
    fn from(value: bool) -> Self {
        IndexKey::Bool(value)
    }
}

/// Anything stored in a [`DatasetManager`](crate::DatasetManager).
///
/// Ids must be stable and unique for the lifetime of the entity. Position
/// extraction is deliberately not part of this trait; it is a pluggable
/// function registered when a spatial grid is attached, so entity types are
/// free to keep their position in whatever shape they like.
pub trait Entity: Clone {
    fn id(&self) -> &str;
}
