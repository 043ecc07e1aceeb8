use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether empty space between shapes on a mask may be filled when
/// connecting a layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillSpace {
    /// Never fill.
    #[default]
    No,
    /// Only fill between shapes of the same net.
    SameNet,
    /// Any space may be filled.
    Yes,
}

/// A fabrication mask layer as defined by the technology.
///
/// Masks are compared by all their fields; the technology guarantees unique
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesignMask {
    pub name: String,
    pub fill_space: FillSpace,
    pub gds_layer: Option<u16>,
    pub gds_datatype: Option<u16>,
}

impl DesignMask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fill_space: FillSpace::No,
            gds_layer: None,
            gds_datatype: None,
        }
    }

    pub fn with_fill_space(mut self, fill_space: FillSpace) -> Self {
        self.fill_space = fill_space;
        self
    }

    pub fn with_gds(mut self, layer: u16, datatype: u16) -> Self {
        self.gds_layer = Some(layer);
        self.gds_datatype = Some(datatype);
        self
    }
}

impl fmt::Display for DesignMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An electrical net; identity is its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
}

impl Net {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
