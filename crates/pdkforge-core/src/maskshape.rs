use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::geometry::{BBox, Point, Rotation, Shape};
use crate::manhattan;
use crate::mask::DesignMask;
use crate::planar::PlanarGeometry;

/// A shape drawn on one mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskShape {
    pub mask: DesignMask,
    pub shape: Shape,
}

impl MaskShape {
    pub fn new(mask: DesignMask, shape: impl Into<Shape>) -> Self {
        Self {
            mask,
            shape: shape.into(),
        }
    }

    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            mask: self.mask.clone(),
            shape: self.shape.moved(dxy),
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        Self {
            mask: self.mask.clone(),
            shape: self.shape.rotated(rotation),
        }
    }

    pub fn area(&self) -> f64 {
        self.shape.area()
    }

    pub fn bounds(&self) -> BBox {
        self.shape.bounds()
    }

    /// The shape enlarged by `size` on every side, kept rectilinear.
    pub fn grown(
        &self,
        size: f64,
        geom: &dyn PlanarGeometry,
        eps: f64,
    ) -> Result<Self, GeometryError> {
        Ok(Self {
            mask: self.mask.clone(),
            shape: manhattan::grow(&self.shape, size, geom, eps)?,
        })
    }
}

/// Shapes keyed by mask, at most one entry per mask.
///
/// Entries keep insertion order. Adding a shape on a mask that is already
/// present replaces the entry with the union of both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskShapes {
    shapes: Vec<MaskShape>,
    #[serde(default)]
    frozen: bool,
}

impl MaskShapes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shapes(
        shapes: impl IntoIterator<Item = MaskShape>,
        geom: &dyn PlanarGeometry,
    ) -> Result<Self, GeometryError> {
        let mut result = Self::new();
        result.add_all(shapes, geom)?;
        Ok(result)
    }

    fn check_frozen(&self) -> Result<(), GeometryError> {
        if self.frozen {
            Err(GeometryError::Frozen("MaskShapes"))
        } else {
            Ok(())
        }
    }

    fn position(&self, mask: &DesignMask) -> Option<usize> {
        self.shapes.iter().position(|ms| &ms.mask == mask)
    }

    pub fn add(
        &mut self,
        shape: MaskShape,
        geom: &dyn PlanarGeometry,
    ) -> Result<(), GeometryError> {
        self.check_frozen()?;
        match self.position(&shape.mask) {
            Some(idx) => {
                let merged = geom.union(&self.shapes[idx].shape, &shape.shape);
                match merged {
                    Some(merged) => self.shapes[idx].shape = merged,
                    None => {
                        debug!("union on mask '{}' is empty, dropping entry", shape.mask);
                        self.shapes.remove(idx);
                    }
                }
            }
            None => self.shapes.push(shape),
        }
        Ok(())
    }

    pub fn add_all(
        &mut self,
        shapes: impl IntoIterator<Item = MaskShape>,
        geom: &dyn PlanarGeometry,
    ) -> Result<(), GeometryError> {
        self.check_frozen()?;
        for shape in shapes {
            self.add(shape, geom)?;
        }
        Ok(())
    }

    /// Remove the area of `shape` from the entry on the same mask.
    ///
    /// Does nothing if the mask has no entry; an entry left empty is dropped.
    pub fn subtract(
        &mut self,
        shape: &MaskShape,
        geom: &dyn PlanarGeometry,
    ) -> Result<(), GeometryError> {
        self.check_frozen()?;
        if let Some(idx) = self.position(&shape.mask) {
            match geom.difference(&self.shapes[idx].shape, &shape.shape) {
                Some(rest) => self.shapes[idx].shape = rest,
                None => {
                    debug!("subtraction emptied mask '{}'", shape.mask);
                    self.shapes.remove(idx);
                }
            }
        }
        Ok(())
    }

    pub fn subtract_all<'a>(
        &mut self,
        shapes: impl IntoIterator<Item = &'a MaskShape>,
        geom: &dyn PlanarGeometry,
    ) -> Result<(), GeometryError> {
        self.check_frozen()?;
        for shape in shapes {
            self.subtract(shape, geom)?;
        }
        Ok(())
    }

    pub fn get(&self, mask: &DesignMask) -> Option<&MaskShape> {
        self.shapes.iter().find(|ms| &ms.mask == mask)
    }

    pub fn remove(&mut self, mask: &DesignMask) -> Result<Option<MaskShape>, GeometryError> {
        self.check_frozen()?;
        Ok(self.position(mask).map(|idx| self.shapes.remove(idx)))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MaskShape> {
        self.shapes.iter()
    }

    pub fn as_slice(&self) -> &[MaskShape] {
        &self.shapes
    }

    pub fn masks(&self) -> impl Iterator<Item = &DesignMask> {
        self.shapes.iter().map(|ms| &ms.mask)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn move_by(&mut self, dxy: Point) -> Result<(), GeometryError> {
        self.check_frozen()?;
        for ms in &mut self.shapes {
            ms.shape = ms.shape.moved(dxy);
        }
        Ok(())
    }

    pub fn rotate(&mut self, rotation: Rotation) -> Result<(), GeometryError> {
        self.check_frozen()?;
        for ms in &mut self.shapes {
            ms.shape = ms.shape.rotated(rotation);
        }
        Ok(())
    }

    /// A moved, unfrozen copy.
    pub fn moved(&self, dxy: Point) -> Self {
        Self {
            shapes: self.shapes.iter().map(|ms| ms.moved(dxy)).collect(),
            frozen: false,
        }
    }

    /// A rotated, unfrozen copy.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        Self {
            shapes: self.shapes.iter().map(|ms| ms.rotated(rotation)).collect(),
            frozen: false,
        }
    }

    /// Union of the entry bounds, optionally for a single mask.
    pub fn bounds(&self, mask: Option<&DesignMask>) -> Option<BBox> {
        self.shapes
            .iter()
            .filter(|ms| mask.is_none_or(|m| &ms.mask == m))
            .map(MaskShape::bounds)
            .reduce(|acc, b| acc.union(&b))
    }

    pub fn area(&self) -> f64 {
        self.shapes.iter().map(MaskShape::area).sum()
    }
}

impl<'a> IntoIterator for &'a MaskShapes {
    type Item = &'a MaskShape;
    type IntoIter = std::slice::Iter<'a, MaskShape>;

    fn into_iter(self) -> Self::IntoIter {
        self.shapes.iter()
    }
}
