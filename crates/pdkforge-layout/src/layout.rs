use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use pdkforge_core::manhattan;
use pdkforge_core::{
    BBox, DesignMask, FillSpace, GeoPlanar, MaskShape, MaskShapes, Net, PlanarGeometry, Point,
    Rect, Rotation, Shape, Tolerances,
};

use crate::error::LayoutError;
use crate::spatial::{SpatialEntry, SpatialIndex};
use crate::sublayout::{NetSubLayout, NetlessSubLayout, SubLayout};
use crate::sublayouts::SubLayouts;

/// The layout of one cell or placed instance.
///
/// All geometry goes through the sub-layout aggregation, so a layout never
/// holds touching shapes of different nets on the same mask unless they are
/// declared in a multi-net block. Once frozen a layout is read-only.
#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    sublayouts: SubLayouts,
    boundary: Option<Rect>,
    tolerances: Tolerances,
    #[serde(skip)]
    geom: Arc<dyn PlanarGeometry>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

impl Layout {
    pub fn new() -> Self {
        Self::with_geometry(Arc::new(GeoPlanar::default()), Tolerances::default())
    }

    pub fn with_geometry(geom: Arc<dyn PlanarGeometry>, tolerances: Tolerances) -> Self {
        Self {
            sublayouts: SubLayouts::new(),
            boundary: None,
            tolerances,
            geom,
        }
    }

    /// An empty layout sharing the geometry backend and tolerances.
    pub fn new_like(&self) -> Self {
        Self::with_geometry(self.geom.clone(), self.tolerances)
    }

    pub fn sublayouts(&self) -> &SubLayouts {
        &self.sublayouts
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    pub fn geometry(&self) -> &dyn PlanarGeometry {
        self.geom.as_ref()
    }

    pub fn boundary(&self) -> Option<&Rect> {
        self.boundary.as_ref()
    }

    pub fn set_boundary(&mut self, boundary: Option<Rect>) -> Result<(), LayoutError> {
        self.check_frozen()?;
        self.boundary = boundary;
        Ok(())
    }

    fn check_frozen(&self) -> Result<(), LayoutError> {
        if self.sublayouts.is_frozen() {
            Err(LayoutError::Frozen("Layout"))
        } else {
            Ok(())
        }
    }

    // ── Building ─────────────────────────────────────────────────────

    pub fn add_sublayouts(
        &mut self,
        sublayouts: impl IntoIterator<Item = SubLayout>,
    ) -> Result<(), LayoutError> {
        self.check_frozen()?;
        self.sublayouts
            .add(sublayouts, self.geom.as_ref(), &self.tolerances)
    }

    /// Merge all sub-layouts of `other`; its boundary is ignored.
    pub fn add_layout(&mut self, other: &Layout) -> Result<(), LayoutError> {
        self.add_sublayouts(other.sublayouts.iter().cloned())
    }

    /// Draw `shape` on `mask`, owned by `net` or netless.
    pub fn add_shape(
        &mut self,
        net: Option<&Net>,
        mask: &DesignMask,
        shape: impl Into<Shape>,
    ) -> Result<(), LayoutError> {
        self.check_frozen()?;
        let shapes = MaskShapes::from_shapes(
            [MaskShape::new(mask.clone(), shape.into())],
            self.geom.as_ref(),
        )?;
        let sublayout = match net {
            Some(net) => SubLayout::Net(NetSubLayout::new(net.clone(), shapes)),
            None => SubLayout::Netless(NetlessSubLayout::new(shapes)),
        };
        self.add_sublayouts([sublayout])
    }

    pub fn freeze(&mut self) {
        if !self.sublayouts.is_frozen() {
            info!("freezing layout with {} sub-layouts", self.sublayouts.len());
        }
        self.sublayouts.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.sublayouts.is_frozen()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// All mask shapes; multi-net blocks give their combined region.
    pub fn mask_shapes(&self) -> impl Iterator<Item = &MaskShape> {
        self.sublayouts.iter().flat_map(|sl| sl.shapes().iter())
    }

    /// Bounds of all shapes, optionally on one mask.
    pub fn bounds(&self, mask: Option<&DesignMask>) -> Option<BBox> {
        self.sublayouts
            .iter()
            .filter_map(|sl| sl.shapes().bounds(mask))
            .reduce(|acc, b| acc.union(&b))
    }

    /// The shapes of `net`, including its parts of multi-net blocks.
    pub fn net_shapes(&self, net: &Net) -> Vec<MaskShape> {
        let mut result = Vec::new();
        for sl in &self.sublayouts {
            match sl {
                SubLayout::Net(nsl) if &nsl.net == net => {
                    result.extend(nsl.shapes.iter().cloned());
                }
                SubLayout::MultiNet(multi) => {
                    result.extend(
                        multi
                            .net_shapes(net)
                            .map(|shape| MaskShape::new(multi.mask().clone(), shape.clone())),
                    );
                }
                _ => {}
            }
        }
        result
    }

    /// Shapes filtered on net and mask; `split` decomposes every shape into
    /// points, lines, polygons and rectangles.
    pub fn filter_shapes(
        &self,
        net: Option<&Net>,
        mask: Option<&DesignMask>,
        split: bool,
    ) -> Vec<MaskShape> {
        let shapes = match net {
            Some(net) => self.net_shapes(net),
            None => self.mask_shapes().cloned().collect(),
        };
        let selected = shapes
            .into_iter()
            .filter(|ms| mask.is_none_or(|m| &ms.mask == m));
        if !split {
            return selected.collect();
        }
        selected
            .flat_map(|ms| {
                ms.shape
                    .pointsshapes()
                    .map(|piece| MaskShape::new(ms.mask.clone(), piece))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// R-tree over the bounding boxes of all mask shapes.
    pub fn spatial_index(&self) -> SpatialIndex {
        let entries = self
            .sublayouts
            .iter()
            .enumerate()
            .flat_map(|(idx, sl)| {
                sl.shapes().iter().map(move |ms| SpatialEntry {
                    sublayout: idx,
                    mask: ms.mask.clone(),
                    bbox: ms.bounds(),
                })
            })
            .collect();
        SpatialIndex::build(entries)
    }

    /// A copy rotated around the origin, then moved. The copy is not frozen.
    pub fn moved(&self, dxy: Point, rotation: Rotation) -> Layout {
        Layout {
            sublayouts: self.sublayouts.moved(dxy, rotation),
            boundary: self.boundary.map(|b| b.rotated(rotation).moved(dxy)),
            tolerances: self.tolerances,
            geom: self.geom.clone(),
        }
    }

    // ── Post-processing ──────────────────────────────────────────────

    /// Fill the concave gaps of net and netless shapes on fillable masks.
    ///
    /// Each shape is replaced by its union with its rectilinear convex hull.
    /// This is best effort: when the hull can't be made rectilinear, loses
    /// area or touches geometry of another owner, a warning is logged and
    /// the shape is kept.
    pub fn connect(&mut self, masks: Option<&[DesignMask]>) -> Result<(), LayoutError> {
        self.check_frozen()?;
        let geom = self.geom.clone();
        let geom = geom.as_ref();
        let eps = self.tolerances.shape_epsilon;
        let items = self.sublayouts.items_mut()?;

        for idx in 0..items.len() {
            if items[idx].is_multinet() {
                continue;
            }
            let candidates: Vec<MaskShape> = items[idx]
                .shapes()
                .iter()
                .filter(|ms| ms.mask.fill_space != FillSpace::No)
                .filter(|ms| masks.is_none_or(|allowed| allowed.contains(&ms.mask)))
                .cloned()
                .collect();

            for current in candidates {
                let mask = &current.mask;
                let hull = match manhattan::connect(&current.shape, geom, eps) {
                    Ok(hull) => hull,
                    Err(err) => {
                        warn!("connect of shape on mask '{mask}' failed: {err}");
                        continue;
                    }
                };
                let Some(merged) = geom.union(&current.shape, &hull) else {
                    continue;
                };
                if merged.area() + eps < current.area() {
                    warn!("connect of shape on mask '{mask}' would lose area; skipped");
                    continue;
                }
                let Some(added) = geom.difference(&merged, &current.shape) else {
                    continue;
                };

                let owner = items[idx].net().cloned();
                let conflict = items.iter().enumerate().any(|(other_idx, other)| {
                    if other_idx == idx {
                        return false;
                    }
                    match (mask.fill_space, other) {
                        // only parts of another net block the fill
                        (FillSpace::Yes, SubLayout::MultiNet(multi)) => {
                            multi.mask() == mask
                                && multi.parts().iter().any(|part| {
                                    part.net.is_some()
                                        && part.net != owner
                                        && geom.intersects(&part.shape, &added)
                                })
                        }
                        (FillSpace::Yes, _)
                            if !other.net().is_some_and(|n| Some(n) != owner.as_ref()) =>
                        {
                            false
                        }
                        _ => other
                            .shapes()
                            .get(mask)
                            .is_some_and(|theirs| geom.intersects(&theirs.shape, &added)),
                    }
                });
                if conflict {
                    warn!(
                        "connect of shape on mask '{mask}' for {owner:?} touches other geometry; skipped"
                    );
                    continue;
                }

                if let Some(shapes) = items[idx].plain_shapes_mut() {
                    shapes.remove(mask)?;
                    shapes.add(MaskShape::new(mask.clone(), merged), geom)?;
                    debug!("connected shape on mask '{mask}' for {owner:?}");
                }
            }
        }
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
