use thiserror::Error;

use crate::geometry::Point;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Can't modify a frozen {0}")]
    Frozen(&'static str),

    #[error("Two consecutive non-Manhattan edges around {prev:?}, {coord:?}, {next:?}")]
    NonManhattan { prev: Point, coord: Point, next: Point },
}

impl GeometryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GeometryError::InvalidShape(message.into())
    }
}
