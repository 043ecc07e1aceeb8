use thiserror::Error;

use pdkforge_core::{DesignMask, GeometryError, Net};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Can't modify a frozen {0}")]
    Frozen(&'static str),

    #[error("Overlapping shapes on mask '{mask}' for net '{net}' and net '{other}'")]
    NetOverlap {
        mask: DesignMask,
        net: Net,
        other: Net,
    },

    #[error("Multi-net shapes on mask '{mask}' are inconsistent: {reason}")]
    AbutmentInvariant { mask: DesignMask, reason: String },

    #[error("Net '{net}' is not a net of circuit '{circuit}'")]
    UnknownNet { net: Net, circuit: String },
}

impl LayoutError {
    /// Whether this is a frozen-container error from either crate.
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            LayoutError::Frozen(_) | LayoutError::Geometry(GeometryError::Frozen(_))
        )
    }
}
