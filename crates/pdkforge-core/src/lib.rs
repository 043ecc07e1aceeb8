//! # PDKForge Core
//!
//! Immutable 2D shape kernel, mask and net identities, the per-mask shape
//! container and the rectilinear clean-up used after growing or connecting
//! shapes. Region operations go through the [`PlanarGeometry`] trait, with a
//! `geo` based implementation in [`GeoPlanar`].

pub mod config;
pub mod error;
pub mod geometry;
pub mod manhattan;
pub mod mask;
pub mod maskshape;
pub mod planar;

pub use config::Tolerances;
pub use error::GeometryError;
pub use geometry::{
    BBox, Line, MultiShape, Point, Polygon, Rect, RepeatedShape, Rotation, Shape, EPSILON, ORIGIN,
};
pub use manhattan::ManhattanPolicy;
pub use mask::{DesignMask, FillSpace, Net};
pub use maskshape::{MaskShape, MaskShapes};
pub use planar::{GeoPlanar, PlanarGeometry};
