use log::debug;
use serde::{Deserialize, Serialize};

use pdkforge_core::{
    DesignMask, GeoPlanar, MaskShape, MaskShapes, Net, PlanarGeometry, Point, Rotation, Shape,
    Tolerances,
};

use crate::error::LayoutError;

/// Shapes that belong to one net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetSubLayout {
    pub net: Net,
    pub shapes: MaskShapes,
}

/// Shapes without electrical meaning, e.g. implants or wells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetlessSubLayout {
    pub shapes: MaskShapes,
}

/// One constituent of a [`MultiNetSubLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub net: Option<Net>,
    pub shape: Shape,
}

/// Abutting regions of different nets drawn as one block on one mask.
///
/// The canonical example is the active area of a transistor: source, channel
/// and drain touch but never overlap. The union of all parts must be a single
/// polygon whose area is the sum of the part areas.
///
/// Deserializing re-checks the parts with [`GeoPlanar`] and default
/// [`Tolerances`] and rebuilds the combined shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMultiNetSubLayout")]
pub struct MultiNetSubLayout {
    mask: DesignMask,
    parts: Vec<Part>,
    combined: MaskShapes,
}

#[derive(Deserialize)]
struct RawMultiNetSubLayout {
    mask: DesignMask,
    parts: Vec<Part>,
    combined: MaskShapes,
}

impl TryFrom<RawMultiNetSubLayout> for MultiNetSubLayout {
    type Error = LayoutError;

    fn try_from(raw: RawMultiNetSubLayout) -> Result<Self, Self::Error> {
        let mut result = Self::new(
            raw.mask,
            raw.parts,
            &GeoPlanar::default(),
            &Tolerances::default(),
        )?;
        if raw.combined.is_frozen() {
            result.combined.freeze();
        }
        Ok(result)
    }
}

/// A contribution of geometry to a layout, tagged with its ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubLayout {
    Net(NetSubLayout),
    Netless(NetlessSubLayout),
    MultiNet(MultiNetSubLayout),
}

impl NetSubLayout {
    pub fn new(net: Net, shapes: MaskShapes) -> Self {
        Self { net, shapes }
    }
}

impl NetlessSubLayout {
    pub fn new(shapes: MaskShapes) -> Self {
        Self { shapes }
    }
}

impl MultiNetSubLayout {
    pub fn new(
        mask: DesignMask,
        parts: Vec<Part>,
        geom: &dyn PlanarGeometry,
        tol: &Tolerances,
    ) -> Result<Self, LayoutError> {
        let mut result = Self {
            mask,
            parts,
            combined: MaskShapes::new(),
        };
        result.refresh(geom, tol)?;
        Ok(result)
    }

    /// Combine single-mask net and netless sub-layouts.
    pub fn from_sublayouts(
        sublayouts: Vec<SubLayout>,
        geom: &dyn PlanarGeometry,
        tol: &Tolerances,
    ) -> Result<Self, LayoutError> {
        let mut mask: Option<DesignMask> = None;
        let mut parts = Vec::new();
        for sublayout in sublayouts {
            let net = sublayout.net().cloned();
            let shapes = match sublayout {
                SubLayout::Net(sl) => sl.shapes,
                SubLayout::Netless(sl) => sl.shapes,
                SubLayout::MultiNet(_) => {
                    return Err(LayoutError::AbutmentInvariant {
                        mask: mask.unwrap_or_else(|| DesignMask::new("?")),
                        reason: "multi-net shapes can't be nested".to_string(),
                    })
                }
            };
            for ms in shapes.iter() {
                match &mask {
                    Some(m) if m != &ms.mask => {
                        return Err(LayoutError::AbutmentInvariant {
                            mask: m.clone(),
                            reason: format!("all parts have to be on one mask, got '{}'", ms.mask),
                        })
                    }
                    Some(_) => {}
                    None => mask = Some(ms.mask.clone()),
                }
                parts.push(Part {
                    net: net.clone(),
                    shape: ms.shape.clone(),
                });
            }
        }
        let mask = mask.ok_or_else(|| LayoutError::AbutmentInvariant {
            mask: DesignMask::new("?"),
            reason: "no shapes given".to_string(),
        })?;
        Self::new(mask, parts, geom, tol)
    }

    pub fn mask(&self) -> &DesignMask {
        &self.mask
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The union of all parts.
    pub fn shape(&self) -> Option<&Shape> {
        self.combined.get(&self.mask).map(|ms| &ms.shape)
    }

    pub fn net_shapes<'a>(&'a self, net: &'a Net) -> impl Iterator<Item = &'a Shape> + 'a {
        self.parts
            .iter()
            .filter(move |p| p.net.as_ref() == Some(net))
            .map(|p| &p.shape)
    }

    fn invariant_error(&self, reason: impl Into<String>) -> LayoutError {
        LayoutError::AbutmentInvariant {
            mask: self.mask.clone(),
            reason: reason.into(),
        }
    }

    /// Recompute the combined region and check the abutment invariant.
    fn refresh(&mut self, geom: &dyn PlanarGeometry, tol: &Tolerances) -> Result<(), LayoutError> {
        let shapes: Vec<Shape> = self.parts.iter().map(|p| p.shape.clone()).collect();
        let union = geom
            .union_all(&shapes)
            .ok_or_else(|| self.invariant_error("no parts"))?;
        if !matches!(union, Shape::Rect(_) | Shape::Polygon(_)) {
            return Err(self.invariant_error("parts have to form one contiguous region"));
        }
        let sum: f64 = shapes.iter().map(Shape::area).sum();
        let area = union.area();
        if sum <= 0.0 || (sum - area).abs() / sum >= tol.abutment_tolerance {
            return Err(self.invariant_error(format!(
                "parts overlap: sum of areas {sum} differs from combined area {area}"
            )));
        }
        let mut combined = MaskShapes::new();
        combined.add(MaskShape::new(self.mask.clone(), union), geom)?;
        self.combined = combined;
        Ok(())
    }

    /// Fold one piece into the parts, following [`contact`] against
    /// `resident`, the parts as they were before the merge started.
    fn classify(
        &mut self,
        owner: Option<Net>,
        piece: Shape,
        resident: &[Part],
        geom: &dyn PlanarGeometry,
    ) -> Result<(), LayoutError> {
        match contact(resident, owner.as_ref(), &piece, geom) {
            Contact::Same(idx) => {
                let part = &mut self.parts[idx];
                if let Some(merged) = geom.union(&part.shape, &piece) {
                    part.shape = merged;
                }
            }
            Contact::Conflict { net, other } => {
                return Err(LayoutError::NetOverlap {
                    mask: self.mask.clone(),
                    net,
                    other,
                })
            }
            Contact::Free => self.parts.push(Part { net: owner, shape: piece }),
        }
        Ok(())
    }

    /// Whether the combined region touches `other`'s shape on the same mask.
    pub fn overlaps_with(&self, other: &SubLayout, geom: &dyn PlanarGeometry) -> bool {
        match (self.shape(), other.shapes().get(&self.mask)) {
            (Some(own), Some(theirs)) => geom.intersects(own, &theirs.shape),
            _ => false,
        }
    }

    /// Like [`Self::overlaps_with`], but a piece of `other` touching a part of
    /// a different net without touching its own net is a [`LayoutError::NetOverlap`].
    pub fn check_overlap(
        &self,
        other: &SubLayout,
        geom: &dyn PlanarGeometry,
    ) -> Result<bool, LayoutError> {
        if !self.overlaps_with(other, geom) {
            return Ok(false);
        }
        let pieces: Vec<(Option<&Net>, &Shape)> = match other {
            SubLayout::Net(sl) => sl
                .shapes
                .get(&self.mask)
                .map(|ms| (Some(&sl.net), &ms.shape))
                .into_iter()
                .collect(),
            SubLayout::Netless(_) => Vec::new(),
            SubLayout::MultiNet(multi) => multi
                .parts
                .iter()
                .map(|p| (p.net.as_ref(), &p.shape))
                .collect(),
        };
        for (owner, shape) in pieces {
            for piece in shape.pointsshapes() {
                if let Contact::Conflict { net, other } = contact(&self.parts, owner, &piece, geom) {
                    return Err(LayoutError::NetOverlap {
                        mask: self.mask.clone(),
                        net,
                        other,
                    });
                }
            }
        }
        Ok(true)
    }

    /// Take over the part of `other` on this mask that touches this block.
    ///
    /// Returns whether `other` has no shapes left, in which case the caller
    /// should drop it. A multi-net `other` is merged completely. On error
    /// neither `self` nor `other` is changed.
    pub fn merge_from(
        &mut self,
        other: &mut SubLayout,
        geom: &dyn PlanarGeometry,
        tol: &Tolerances,
    ) -> Result<bool, LayoutError> {
        if self.combined.is_frozen() {
            return Err(LayoutError::Frozen("MultiNetSubLayout"));
        }
        if !self.overlaps_with(other, geom) {
            return Ok(false);
        }
        let mut merged = self.clone();
        let (owner, shapes) = match other {
            SubLayout::Net(sl) => (Some(sl.net.clone()), &mut sl.shapes),
            SubLayout::Netless(sl) => (None, &mut sl.shapes),
            SubLayout::MultiNet(multi) => {
                if multi.combined.is_frozen() {
                    return Err(LayoutError::Frozen("MultiNetSubLayout"));
                }
                debug!(
                    "merging {} multi-net parts on mask '{}'",
                    multi.parts.len(),
                    self.mask
                );
                for part in multi.parts.iter().cloned() {
                    merged.classify(part.net, part.shape, &self.parts, geom)?;
                }
                merged.refresh(geom, tol)?;
                *self = merged;
                multi.parts.clear();
                multi.combined = MaskShapes::new();
                return Ok(true);
            }
        };

        let Some(taken) = shapes.get(&self.mask).cloned() else {
            return Ok(shapes.is_empty());
        };
        let mut remaining = shapes.clone();
        remaining.remove(&self.mask)?;
        let own = self.shape();
        let mut rest = Vec::new();
        for piece in taken.shape.pointsshapes() {
            if own.is_some_and(|own| geom.intersects(own, &piece)) {
                merged.classify(owner.clone(), piece, &self.parts, geom)?;
            } else {
                rest.push(MaskShape::new(self.mask.clone(), piece));
            }
        }
        remaining.add_all(rest, geom)?;
        merged.refresh(geom, tol)?;
        *self = merged;
        *shapes = remaining;
        Ok(shapes.is_empty())
    }

    pub fn moved(&self, dxy: Point, rotation: Rotation) -> Self {
        Self {
            mask: self.mask.clone(),
            parts: self
                .parts
                .iter()
                .map(|p| Part {
                    net: p.net.clone(),
                    shape: p.shape.rotated(rotation).moved(dxy),
                })
                .collect(),
            combined: self.combined.rotated(rotation).moved(dxy),
        }
    }
}

impl SubLayout {
    pub fn net(&self) -> Option<&Net> {
        match self {
            SubLayout::Net(sl) => Some(&sl.net),
            SubLayout::Netless(_) | SubLayout::MultiNet(_) => None,
        }
    }

    /// The mask shapes; the combined region for a multi-net sub-layout.
    pub fn shapes(&self) -> &MaskShapes {
        match self {
            SubLayout::Net(sl) => &sl.shapes,
            SubLayout::Netless(sl) => &sl.shapes,
            SubLayout::MultiNet(sl) => &sl.combined,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shapes().is_empty()
    }

    pub fn area(&self) -> f64 {
        self.shapes().area()
    }

    pub fn is_multinet(&self) -> bool {
        matches!(self, SubLayout::MultiNet(_))
    }

    /// Same kind and, for net sub-layouts, the same net.
    pub fn same_owner(&self, other: &SubLayout) -> bool {
        match (self, other) {
            (SubLayout::Net(a), SubLayout::Net(b)) => a.net == b.net,
            (SubLayout::Netless(_), SubLayout::Netless(_)) => true,
            _ => false,
        }
    }

    /// Mutable shapes of a net or netless sub-layout.
    ///
    /// Multi-net shapes are only changed through
    /// [`MultiNetSubLayout::merge_from`].
    pub(crate) fn plain_shapes_mut(&mut self) -> Option<&mut MaskShapes> {
        match self {
            SubLayout::Net(sl) => Some(&mut sl.shapes),
            SubLayout::Netless(sl) => Some(&mut sl.shapes),
            SubLayout::MultiNet(_) => None,
        }
    }

    /// Rotated around the origin, then moved by `dxy`.
    pub fn moved(&self, dxy: Point, rotation: Rotation) -> SubLayout {
        match self {
            SubLayout::Net(sl) => SubLayout::Net(NetSubLayout {
                net: sl.net.clone(),
                shapes: sl.shapes.rotated(rotation).moved(dxy),
            }),
            SubLayout::Netless(sl) => SubLayout::Netless(NetlessSubLayout {
                shapes: sl.shapes.rotated(rotation).moved(dxy),
            }),
            SubLayout::MultiNet(sl) => SubLayout::MultiNet(sl.moved(dxy, rotation)),
        }
    }

    pub fn freeze(&mut self) {
        match self {
            SubLayout::Net(sl) => sl.shapes.freeze(),
            SubLayout::Netless(sl) => sl.shapes.freeze(),
            SubLayout::MultiNet(sl) => sl.combined.freeze(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.shapes().is_frozen()
    }
}

impl From<NetSubLayout> for SubLayout {
    fn from(sl: NetSubLayout) -> Self {
        SubLayout::Net(sl)
    }
}

impl From<NetlessSubLayout> for SubLayout {
    fn from(sl: NetlessSubLayout) -> Self {
        SubLayout::Netless(sl)
    }
}

impl From<MultiNetSubLayout> for SubLayout {
    fn from(sl: MultiNetSubLayout) -> Self {
        SubLayout::MultiNet(sl)
    }
}

/// How a piece relates to the parts of a multi-net block.
enum Contact {
    /// Touches nothing it conflicts with; becomes a new part.
    Free,
    /// Touches the part at this index, which has the same owner.
    Same(usize),
    /// A net piece touches a part of another net and none of its own.
    Conflict { net: Net, other: Net },
}

/// Contact counts touching boundaries. A same-owner part wins over any
/// conflicting part.
fn contact(
    parts: &[Part],
    owner: Option<&Net>,
    piece: &Shape,
    geom: &dyn PlanarGeometry,
) -> Contact {
    let mut conflict = None;
    for (idx, part) in parts.iter().enumerate() {
        if !geom.intersects(&part.shape, piece) {
            continue;
        }
        if part.net.as_ref() == owner {
            return Contact::Same(idx);
        }
        if conflict.is_none() {
            if let (Some(net), Some(other)) = (owner, part.net.as_ref()) {
                conflict = Some(Contact::Conflict {
                    net: net.clone(),
                    other: other.clone(),
                });
            }
        }
    }
    conflict.unwrap_or(Contact::Free)
}

/// Whether `a` and `b` touch on a shared mask and should be merged.
///
/// Touching shapes of two different nets are an error, also when one side
/// is a multi-net block and the other touches one of its parts of another
/// net.
pub fn overlaps_with(
    a: &SubLayout,
    b: &SubLayout,
    geom: &dyn PlanarGeometry,
) -> Result<bool, LayoutError> {
    match (a, b) {
        (SubLayout::MultiNet(multi), other) | (other, SubLayout::MultiNet(multi)) => {
            multi.check_overlap(other, geom)
        }
        _ => {
            for ms in a.shapes() {
                let Some(theirs) = b.shapes().get(&ms.mask) else {
                    continue;
                };
                if !geom.intersects(&ms.shape, &theirs.shape) {
                    continue;
                }
                if let (Some(net), Some(other)) = (a.net(), b.net()) {
                    if net != other {
                        return Err(LayoutError::NetOverlap {
                            mask: ms.mask.clone(),
                            net: net.clone(),
                            other: other.clone(),
                        });
                    }
                }
                return Ok(true);
            }
            Ok(false)
        }
    }
}
