//! # PDKForge Layout
//!
//! Net-aware layout assembly on top of `pdkforge-core`: sub-layouts per net,
//! netless geometry and multi-net blocks, the aggregation that keeps shapes
//! of different nets apart on every mask, the [`Layout`] container and the
//! [`CircuitLayouter`] used to place primitives and draw wires.

pub mod error;
pub mod layout;
pub mod placer;
pub mod spatial;
pub mod sublayout;
pub mod sublayouts;

pub use error::LayoutError;
pub use layout::Layout;
pub use placer::{CircuitLayouter, Placeable, Wire};
pub use spatial::{SpatialEntry, SpatialIndex};
pub use sublayout::{
    overlaps_with, MultiNetSubLayout, NetSubLayout, NetlessSubLayout, Part, SubLayout,
};
pub use sublayouts::SubLayouts;
