use log::debug;
use serde::{Deserialize, Serialize};

use pdkforge_core::{PlanarGeometry, Point, Rotation, Tolerances, ORIGIN};

use crate::error::LayoutError;
use crate::sublayout::{overlaps_with, SubLayout};

/// The ordered sub-layouts of one layout.
///
/// Every insertion keeps at most one net or netless entry per owner and
/// rejects touching shapes of different nets on a shared mask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubLayouts {
    items: Vec<SubLayout>,
    #[serde(default)]
    frozen: bool,
}

impl SubLayouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of sub-layouts.
    ///
    /// On error the collection is left as it was before the call.
    pub fn add(
        &mut self,
        incoming: impl IntoIterator<Item = SubLayout>,
        geom: &dyn PlanarGeometry,
        tol: &Tolerances,
    ) -> Result<(), LayoutError> {
        if self.frozen {
            return Err(LayoutError::Frozen("SubLayouts"));
        }
        let mut work = self.items.clone();
        for item in incoming {
            merge_one(&mut work, item, geom, tol)?;
        }
        self.items = work;
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubLayout> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[SubLayout] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Freeze the collection and the shapes of every member.
    pub fn freeze(&mut self) {
        self.frozen = true;
        for item in &mut self.items {
            item.freeze();
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Every member rotated, then moved; the copy is not frozen.
    pub fn moved(&self, dxy: Point, rotation: Rotation) -> Self {
        Self {
            items: self.items.iter().map(|sl| sl.moved(dxy, rotation)).collect(),
            frozen: false,
        }
    }

    /// Replace the shapes of plain entries; used by the connect pass.
    pub(crate) fn items_mut(&mut self) -> Result<&mut [SubLayout], LayoutError> {
        if self.frozen {
            return Err(LayoutError::Frozen("SubLayouts"));
        }
        Ok(&mut self.items)
    }
}

impl<'a> IntoIterator for &'a SubLayouts {
    type Item = &'a SubLayout;
    type IntoIter = std::slice::Iter<'a, SubLayout>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn merge_one(
    items: &mut Vec<SubLayout>,
    mut item: SubLayout,
    geom: &dyn PlanarGeometry,
    tol: &Tolerances,
) -> Result<(), LayoutError> {
    if item.is_empty() {
        debug!("skipping empty sub-layout");
        return Ok(());
    }
    if item.is_frozen() {
        item = item.moved(ORIGIN, Rotation::R0);
    }

    // Resident multi-net blocks take what touches them.
    for resident in items.iter_mut() {
        if let SubLayout::MultiNet(multi) = resident {
            if multi.overlaps_with(&item, geom) && multi.merge_from(&mut item, geom, tol)? {
                debug!("sub-layout fully merged into multi-net block on '{}'", multi.mask());
                return Ok(());
            }
        }
    }

    match item {
        SubLayout::MultiNet(mut multi) => {
            let mut idx = 0;
            while idx < items.len() {
                if multi.overlaps_with(&items[idx], geom)
                    && multi.merge_from(&mut items[idx], geom, tol)?
                {
                    debug!("absorbed resident sub-layout {idx} into new multi-net block");
                    items.remove(idx);
                } else {
                    idx += 1;
                }
            }
            items.push(SubLayout::MultiNet(multi));
        }
        plain => {
            for resident in items.iter().filter(|r| !r.is_multinet()) {
                overlaps_with(resident, &plain, geom)?;
            }
            let target = items
                .iter_mut()
                .find(|r| r.same_owner(&plain))
                .and_then(SubLayout::plain_shapes_mut);
            match target {
                Some(shapes) => {
                    debug!("accumulating into existing sub-layout for {:?}", plain.net());
                    shapes.add_all(plain.shapes().iter().cloned(), geom)?;
                }
                None => items.push(plain),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sublayout::{MultiNetSubLayout, NetSubLayout, NetlessSubLayout, Part};
    use approx::assert_abs_diff_eq;
    use pdkforge_core::{DesignMask, GeoPlanar, MaskShape, MaskShapes, Net, Rect, Shape};

    fn rect(l: f64, b: f64, r: f64, t: f64) -> Shape {
        Shape::Rect(Rect::new(l, b, r, t).unwrap())
    }

    fn shapes(mask: &DesignMask, shape: Shape) -> MaskShapes {
        MaskShapes::from_shapes([MaskShape::new(mask.clone(), shape)], &GeoPlanar::default())
            .unwrap()
    }

    fn net_sl(net: &str, mask: &DesignMask, shape: Shape) -> SubLayout {
        NetSubLayout::new(Net::new(net), shapes(mask, shape)).into()
    }

    fn netless_sl(mask: &DesignMask, shape: Shape) -> SubLayout {
        NetlessSubLayout::new(shapes(mask, shape)).into()
    }

    #[test]
    fn test_netless_rects_merge() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let m = DesignMask::new("M");
        let mut sls = SubLayouts::new();
        sls.add(
            [
                netless_sl(&m, rect(0.0, 0.0, 2.0, 2.0)),
                netless_sl(&m, rect(2.0, 0.0, 4.0, 2.0)),
            ],
            &geom,
            &tol,
        )
        .unwrap();
        assert_eq!(sls.len(), 1);
        let entry = sls.iter().next().unwrap();
        assert_eq!(entry.shapes().len(), 1);
        assert_abs_diff_eq!(entry.area(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_net_overlap_is_rejected_and_rolled_back() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let m = DesignMask::new("M");
        let mut sls = SubLayouts::new();
        sls.add([net_sl("A", &m, rect(0.0, 0.0, 2.0, 2.0))], &geom, &tol)
            .unwrap();
        let before = sls.clone();

        let err = sls
            .add(
                [
                    net_sl("C", &m, rect(10.0, 0.0, 11.0, 1.0)),
                    net_sl("B", &m, rect(1.0, 0.0, 3.0, 2.0)),
                ],
                &geom,
                &tol,
            )
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::NetOverlap {
                mask: m,
                net: Net::new("A"),
                other: Net::new("B"),
            }
        );
        assert_eq!(sls, before);
    }

    #[test]
    fn test_same_net_accumulates() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let m = DesignMask::new("M");
        let mut sls = SubLayouts::new();
        sls.add(
            [
                net_sl("A", &m, rect(0.0, 0.0, 2.0, 2.0)),
                net_sl("A", &m, rect(1.0, 0.0, 3.0, 2.0)),
                net_sl("A", &m, rect(5.0, 0.0, 6.0, 1.0)),
            ],
            &geom,
            &tol,
        )
        .unwrap();
        assert_eq!(sls.len(), 1);
        assert_abs_diff_eq!(sls.as_slice()[0].area(), 6.0 + 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_net_and_netless_stay_separate() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let m = DesignMask::new("M");
        let mut sls = SubLayouts::new();
        sls.add(
            [
                net_sl("A", &m, rect(0.0, 0.0, 2.0, 2.0)),
                netless_sl(&m, rect(1.0, 0.0, 3.0, 2.0)),
                SubLayout::Netless(NetlessSubLayout::new(MaskShapes::new())),
            ],
            &geom,
            &tol,
        )
        .unwrap();
        assert_eq!(sls.len(), 2);
    }

    #[test]
    fn test_resident_multinet_absorbs_plain() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let active = DesignMask::new("active");
        let metal = DesignMask::new("metal1");
        let multi = MultiNetSubLayout::new(
            active.clone(),
            vec![
                Part {
                    net: Some(Net::new("s")),
                    shape: rect(0.0, 0.0, 1.0, 1.0),
                },
                Part {
                    net: Some(Net::new("d")),
                    shape: rect(1.0, 0.0, 2.0, 1.0),
                },
            ],
            &geom,
            &tol,
        )
        .unwrap();
        let mut sls = SubLayouts::new();
        sls.add([multi.into()], &geom, &tol).unwrap();

        let mut contact = MaskShapes::new();
        contact
            .add(MaskShape::new(active.clone(), rect(-1.0, 0.0, 0.0, 1.0)), &geom)
            .unwrap();
        contact
            .add(MaskShape::new(metal.clone(), rect(-1.0, 0.0, 0.5, 1.0)), &geom)
            .unwrap();
        sls.add(
            [NetSubLayout::new(Net::new("s"), contact).into()],
            &geom,
            &tol,
        )
        .unwrap();

        assert_eq!(sls.len(), 2);
        let SubLayout::MultiNet(multi) = &sls.as_slice()[0] else {
            panic!("expected multi-net block first");
        };
        let s = Net::new("s");
        let source: Vec<&Shape> = multi.net_shapes(&s).collect();
        assert_eq!(source, vec![&rect(-1.0, 0.0, 1.0, 1.0)]);
        let rest = &sls.as_slice()[1];
        assert_eq!(rest.net(), Some(&s));
        assert!(rest.shapes().get(&active).is_none());
        assert!(rest.shapes().get(&metal).is_some());
    }

    #[test]
    fn test_incoming_multinet_absorbs_residents() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let active = DesignMask::new("active");
        let mut sls = SubLayouts::new();
        sls.add(
            [
                net_sl("s", &active, rect(-1.0, 0.0, 0.0, 1.0)),
                net_sl("x", &active, rect(10.0, 0.0, 11.0, 1.0)),
            ],
            &geom,
            &tol,
        )
        .unwrap();

        let multi = MultiNetSubLayout::new(
            active.clone(),
            vec![
                Part {
                    net: Some(Net::new("s")),
                    shape: rect(0.0, 0.0, 1.0, 1.0),
                },
                Part {
                    net: Some(Net::new("d")),
                    shape: rect(1.0, 0.0, 2.0, 1.0),
                },
            ],
            &geom,
            &tol,
        )
        .unwrap();
        sls.add([multi.into()], &geom, &tol).unwrap();

        assert_eq!(sls.len(), 2);
        assert_eq!(sls.as_slice()[0].net(), Some(&Net::new("x")));
        assert!(sls.as_slice()[1].is_multinet());
        assert_abs_diff_eq!(sls.as_slice()[1].area(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_failed_multinet_merge_is_rolled_back() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let active = DesignMask::new("active");
        let multi = MultiNetSubLayout::new(
            active.clone(),
            vec![
                Part {
                    net: Some(Net::new("s")),
                    shape: rect(0.0, 0.0, 1.0, 1.0),
                },
                Part {
                    net: Some(Net::new("d")),
                    shape: rect(1.0, 0.0, 2.0, 1.0),
                },
            ],
            &geom,
            &tol,
        )
        .unwrap();
        let mut sls = SubLayouts::new();
        sls.add([multi.into()], &geom, &tol).unwrap();
        let before = sls.clone();

        // net x touches the drain of the block
        let err = sls
            .add(
                [
                    net_sl("c", &active, rect(10.0, 0.0, 11.0, 1.0)),
                    net_sl("x", &active, rect(2.0, 0.0, 3.0, 1.0)),
                ],
                &geom,
                &tol,
            )
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::NetOverlap {
                mask: active.clone(),
                net: Net::new("x"),
                other: Net::new("d"),
            }
        );
        assert_eq!(sls, before);

        // netless geometry hidden inside the block
        let err = sls
            .add([netless_sl(&active, rect(0.5, 0.0, 1.5, 1.0))], &geom, &tol)
            .unwrap_err();
        assert!(matches!(err, LayoutError::AbutmentInvariant { .. }));
        assert_eq!(sls, before);
    }

    #[test]
    fn test_frozen_rejects_add() {
        let geom = GeoPlanar::default();
        let tol = Tolerances::default();
        let m = DesignMask::new("M");
        let mut sls = SubLayouts::new();
        sls.add([net_sl("A", &m, rect(0.0, 0.0, 1.0, 1.0))], &geom, &tol)
            .unwrap();
        sls.freeze();
        assert!(sls.as_slice()[0].is_frozen());
        let err = sls
            .add([net_sl("A", &m, rect(1.0, 0.0, 2.0, 1.0))], &geom, &tol)
            .unwrap_err();
        assert!(err.is_frozen());
        assert_abs_diff_eq!(sls.as_slice()[0].area(), 1.0, epsilon = 1e-9);
    }
}
