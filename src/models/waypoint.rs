use serde::{Deserialize, Serialize};

use crate::models::Location;

/// A delivery stop. The first waypoint of a request is the depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub location: Location,
}

impl Waypoint {
    pub fn new(label: impl Into<String>, location: Location) -> Self {
        Self {
            label: label.into(),
            location,
        }
    }

    /// Unlabelled stop, named after its position in the request
    pub fn numbered(index: usize, location: Location) -> Self {
        Self::new(format!("Stop {}", index + 1), location)
    }
}
