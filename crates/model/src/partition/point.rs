use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a row in partition space, one coordinate per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    coordinates: Vec<i64>,
}

impl Point {
    pub fn new(coordinates: Vec<i64>) -> Self {
        Self { coordinates }
    }

    pub fn coordinates(&self) -> &[i64] {
        &self.coordinates
    }

    pub fn num_coords(&self) -> usize {
        self.coordinates.len()
    }
}

impl From<Vec<i64>> for Point {
    fn from(coordinates: Vec<i64>) -> Self {
        Self::new(coordinates)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coords = self
            .coordinates
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({coords})")
    }
}
