use super::{Displayable, Shape};
use crate::{
    feature::{Feature, FeatureError, Slot},
    featurable::Featurable,
    graphic::Graphic,
    provides,
};
use lumen_utils::{ok, AnyResult};

/// Draws the bounds of the sibling [`Shape`].
#[derive(Debug, Clone, Default)]
pub struct RectangleModel {
    shape: Option<Slot>,
}

impl RectangleModel {
    pub const NODE: &'static str = "rectangle";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Displayable for RectangleModel {
    fn render(&self, g: &mut dyn Graphic, owner: &Featurable) -> AnyResult {
        let slot = self.shape.ok_or_else(FeatureError::not_prepared::<Self>)?;
        let shape = owner.get_feature_at::<dyn Shape>(slot)?;
        g.draw_rect(shape.x(), shape.y(), shape.width(), shape.height());
        ok()
    }
}

impl Feature for RectangleModel {
    provides!(dyn Displayable);

    fn prepare(&mut self, owner: &mut Featurable) -> AnyResult {
        let slot = owner
            .features()
            .slot_of::<dyn Shape>()
            .ok_or_else(FeatureError::missing_sibling::<Self, dyn Shape>)?;

        self.shape = Some(slot);
        ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graphic::RecordingGraphic, models::TransformableModel};

    #[test]
    fn draws_sibling_bounds() {
        let mut featurable = Featurable::new();
        featurable.add_feature(TransformableModel::new(8, 4)).unwrap();
        featurable.add_feature(RectangleModel::new()).unwrap();
        featurable.prepare().unwrap();

        let mut graphic = RecordingGraphic::new();
        featurable.render(&mut graphic).unwrap();
        featurable.render(&mut graphic).unwrap();
        assert_eq!(graphic.rects, [(0.0, 0.0, 8, 4), (0.0, 0.0, 8, 4)]);
    }
}
