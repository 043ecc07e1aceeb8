use log::{debug, info};
use serde::{Deserialize, Serialize};

use pdkforge_core::{DesignMask, Net, Point, Rect, Rotation, Shape};

use crate::error::LayoutError;
use crate::layout::Layout;
use crate::sublayout::SubLayout;

/// Anything that can draw itself as a layout fragment around the origin.
pub trait Placeable {
    fn layout(&self) -> Result<Layout, LayoutError>;
}

impl Placeable for Layout {
    fn layout(&self) -> Result<Layout, LayoutError> {
        Ok(self.clone())
    }
}

/// A conductor primitive: its drawing mask and optional pin mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    pub name: String,
    pub mask: DesignMask,
    pub pin: Option<DesignMask>,
}

impl Wire {
    pub fn new(name: &str, mask: DesignMask) -> Self {
        Self {
            name: name.to_string(),
            mask,
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: DesignMask) -> Self {
        self.pin = Some(pin);
        self
    }
}

/// Builds the layout of one circuit from placed fragments and wires.
#[derive(Debug)]
pub struct CircuitLayouter {
    name: String,
    nets: Vec<Net>,
    layout: Layout,
}

impl CircuitLayouter {
    pub fn new(name: &str, nets: impl IntoIterator<Item = Net>) -> Self {
        Self::with_layout(name, nets, Layout::new())
    }

    /// Start from `layout`, e.g. one with a custom geometry backend or a
    /// boundary already set.
    pub fn with_layout(name: &str, nets: impl IntoIterator<Item = Net>, layout: Layout) -> Self {
        Self {
            name: name.to_string(),
            nets: nets.into_iter().collect(),
            layout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn check_net(&self, net: &Net) -> Result<(), LayoutError> {
        if self.nets.contains(net) {
            Ok(())
        } else {
            Err(LayoutError::UnknownNet {
                net: net.clone(),
                circuit: self.name.clone(),
            })
        }
    }

    fn check_fragment(&self, fragment: &Layout) -> Result<(), LayoutError> {
        for sl in fragment.sublayouts() {
            match sl {
                SubLayout::Net(nsl) => self.check_net(&nsl.net)?,
                SubLayout::MultiNet(multi) => {
                    for net in multi.parts().iter().filter_map(|p| p.net.as_ref()) {
                        self.check_net(net)?;
                    }
                }
                SubLayout::Netless(_) => {}
            }
        }
        Ok(())
    }

    pub fn set_boundary(&mut self, boundary: Option<Rect>) -> Result<(), LayoutError> {
        self.layout.set_boundary(boundary)
    }

    /// Draw `object`, rotate it, move it to `position` and merge it.
    ///
    /// Returns the fragment as it was merged.
    pub fn place(
        &mut self,
        object: &dyn Placeable,
        position: Point,
        rotation: Rotation,
    ) -> Result<Layout, LayoutError> {
        let fragment = object.layout()?.moved(position, rotation);
        self.check_fragment(&fragment)?;
        self.layout.add_layout(&fragment)?;
        debug!(
            "placed fragment with {} sub-layouts at {position} ({rotation}) in '{}'",
            fragment.sublayouts().len(),
            self.name
        );
        Ok(fragment)
    }

    /// Draw `shape` moved to `position` for `net` on the wire's mask and, if
    /// it has one, its pin mask.
    pub fn add_wire(
        &mut self,
        net: &Net,
        wire: &Wire,
        shape: impl Into<Shape>,
        position: Point,
    ) -> Result<Layout, LayoutError> {
        self.check_net(net)?;
        let shape = shape.into().moved(position);
        let mut fragment = self.layout.new_like();
        fragment.add_shape(Some(net), &wire.mask, shape.clone())?;
        if let Some(pin) = &wire.pin {
            fragment.add_shape(Some(net), pin, shape)?;
        }
        self.layout.add_layout(&fragment)?;
        Ok(fragment)
    }

    pub fn add_shape(
        &mut self,
        net: Option<&Net>,
        mask: &DesignMask,
        shape: impl Into<Shape>,
    ) -> Result<(), LayoutError> {
        if let Some(net) = net {
            self.check_net(net)?;
        }
        self.layout.add_shape(net, mask, shape)
    }

    pub fn connect(&mut self, masks: Option<&[DesignMask]>) -> Result<(), LayoutError> {
        self.layout.connect(masks)
    }

    /// Freeze and hand out the finished layout.
    pub fn finish(mut self) -> Layout {
        self.layout.freeze();
        info!(
            "finished layout of circuit '{}' with {} sub-layouts",
            self.name,
            self.layout.sublayouts().len()
        );
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sublayout::{MultiNetSubLayout, Part};
    use approx::assert_abs_diff_eq;
    use pdkforge_core::{FillSpace, MaskShape};

    fn rect(l: f64, b: f64, r: f64, t: f64) -> Shape {
        Shape::Rect(Rect::new(l, b, r, t).unwrap())
    }

    /// A two terminal resistor body with contact heads on `metal1`.
    struct Resistor {
        body: DesignMask,
        metal: DesignMask,
        ports: (Net, Net),
    }

    impl Placeable for Resistor {
        fn layout(&self) -> Result<Layout, LayoutError> {
            let mut layout = Layout::new();
            let (p1, p2) = &self.ports;
            let body = MultiNetSubLayout::new(
                self.body.clone(),
                vec![
                    Part {
                        net: Some(p1.clone()),
                        shape: rect(0.0, 0.0, 0.5, 1.0),
                    },
                    Part {
                        net: None,
                        shape: rect(0.5, 0.0, 3.5, 1.0),
                    },
                    Part {
                        net: Some(p2.clone()),
                        shape: rect(3.5, 0.0, 4.0, 1.0),
                    },
                ],
                layout.geometry(),
                layout.tolerances(),
            )?;
            layout.add_sublayouts([body.into()])?;
            layout.add_shape(Some(p1), &self.metal, rect(0.0, 0.0, 0.5, 1.0))?;
            layout.add_shape(Some(p2), &self.metal, rect(3.5, 0.0, 4.0, 1.0))?;
            Ok(layout)
        }
    }

    fn setup() -> (CircuitLayouter, Resistor, DesignMask) {
        let metal = DesignMask::new("metal1").with_fill_space(FillSpace::SameNet);
        let res = Resistor {
            body: DesignMask::new("poly"),
            metal: metal.clone(),
            ports: (Net::new("a"), Net::new("b")),
        };
        let layouter = CircuitLayouter::new("divider", [Net::new("a"), Net::new("b"), Net::new("c")]);
        (layouter, res, metal)
    }

    #[test]
    fn test_place_rotated() {
        let (mut layouter, res, metal) = setup();
        let fragment = layouter
            .place(&res, Point::new(10.0, 0.0), Rotation::R90)
            .unwrap();
        let bounds = fragment.bounds(None).unwrap();
        assert_abs_diff_eq!(bounds.min.x, 9.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.max.y, 4.0, epsilon = 1e-9);

        let a_metal = layouter
            .layout()
            .filter_shapes(Some(&Net::new("a")), Some(&metal), false);
        assert_eq!(a_metal, vec![MaskShape::new(metal, rect(9.0, 0.0, 10.0, 0.5))]);
    }

    #[test]
    fn test_unknown_net_is_rejected() {
        let (mut layouter, _, metal) = setup();
        let res = Resistor {
            body: DesignMask::new("poly"),
            metal: metal.clone(),
            ports: (Net::new("a"), Net::new("zz")),
        };
        let err = layouter
            .place(&res, Point::new(0.0, 0.0), Rotation::R0)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Net 'zz' is not a net of circuit 'divider'"
        );
        assert!(layouter.layout().sublayouts().is_empty());

        let wire = Wire::new("metal1", metal.clone());
        assert!(matches!(
            layouter.add_wire(&Net::new("zz"), &wire, rect(0.0, 0.0, 1.0, 1.0), Point::new(0.0, 0.0)),
            Err(LayoutError::UnknownNet { .. })
        ));
        assert!(layouter
            .add_shape(Some(&Net::new("zz")), &metal, rect(0.0, 0.0, 1.0, 1.0))
            .is_err());
    }

    #[test]
    fn test_wire_with_pin() {
        let (mut layouter, res, metal) = setup();
        layouter.place(&res, Point::new(0.0, 0.0), Rotation::R0).unwrap();

        let pin = DesignMask::new("metal1.pin");
        let wire = Wire::new("metal1", metal.clone()).with_pin(pin.clone());
        let fragment = layouter
            .add_wire(&Net::new("b"), &wire, rect(0.0, 0.0, 2.0, 1.0), Point::new(4.0, 0.0))
            .unwrap();
        assert_eq!(fragment.mask_shapes().count(), 2);

        let b_metal = layouter
            .layout()
            .filter_shapes(Some(&Net::new("b")), Some(&metal), false);
        assert_eq!(b_metal, vec![MaskShape::new(metal.clone(), rect(3.5, 0.0, 6.0, 1.0))]);

        // net c may not touch the metal of net b
        let err = layouter
            .add_wire(&Net::new("c"), &wire, rect(0.0, 0.0, 1.0, 1.0), Point::new(6.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, LayoutError::NetOverlap { .. }));
    }

    #[test]
    fn test_chain_shares_contact() {
        let (mut layouter, res, _) = setup();
        layouter.place(&res, Point::new(0.0, 0.0), Rotation::R0).unwrap();
        let second = Resistor {
            ports: (Net::new("b"), Net::new("c")),
            ..res
        };
        layouter.place(&second, Point::new(4.0, 0.0), Rotation::R0).unwrap();

        let layout = layouter.finish();
        assert!(layout.is_frozen());
        let poly = DesignMask::new("poly");
        let b_poly = layout.filter_shapes(Some(&Net::new("b")), Some(&poly), false);
        assert_eq!(b_poly, vec![MaskShape::new(poly, rect(3.5, 0.0, 4.5, 1.0))]);
    }
}
