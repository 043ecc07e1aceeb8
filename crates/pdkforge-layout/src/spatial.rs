use rstar::{RTree, RTreeObject, AABB};

use pdkforge_core::{BBox, DesignMask, Point};

/// One mask shape of a layout in the R-tree, by bounding box.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    /// Index of the sub-layout in the layout.
    pub sublayout: usize,
    pub mask: DesignMask,
    pub bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// Bounding-box index over the shapes of a layout.
///
/// Entries are candidates only; callers needing exact answers test the
/// shapes themselves.
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Entries whose bounding box contains `point`, optionally on one mask.
    pub fn query_point(&self, point: &Point, mask: Option<&DesignMask>) -> Vec<&SpatialEntry> {
        let envelope = AABB::from_point([point.x, point.y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|e| mask.is_none_or(|m| &e.mask == m))
            .collect()
    }

    /// Entries whose bounding box intersects `region`, optionally on one mask.
    pub fn query_region(&self, region: &BBox, mask: Option<&DesignMask>) -> Vec<&SpatialEntry> {
        let envelope = AABB::from_corners(
            [region.min.x, region.min.y],
            [region.max.x, region.max.y],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|e| mask.is_none_or(|m| &e.mask == m))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spatial_query() {
        let active = DesignMask::new("active");
        let poly = DesignMask::new("poly");
        let entries = vec![
            SpatialEntry {
                sublayout: 0,
                mask: active.clone(),
                bbox: BBox::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0)),
            },
            SpatialEntry {
                sublayout: 1,
                mask: poly.clone(),
                bbox: BBox::new(Point::new(4.0, -2.0), Point::new(6.0, 12.0)),
            },
            SpatialEntry {
                sublayout: 2,
                mask: active.clone(),
                bbox: BBox::new(Point::new(20.0, 20.0), Point::new(30.0, 30.0)),
            },
        ];
        let index = SpatialIndex::build(entries);
        assert_eq!(index.len(), 3);

        let results = index.query_point(&Point::new(5.0, 5.0), None);
        assert_eq!(results.len(), 2);
        let results = index.query_point(&Point::new(5.0, 5.0), Some(&poly));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sublayout, 1);

        let region = BBox::new(Point::new(-5.0, -5.0), Point::new(15.0, 15.0));
        let results = index.query_region(&region, Some(&active));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sublayout, 0);
    }
}
