use super::{Refreshable, Transformable};
use crate::{
    config::Configurer,
    feature::{Feature, FeatureError, Persistable, Slot},
    featurable::Featurable,
    provides,
};
use lumen_utils::{
    ok,
    packed::{PackedReadExt, PackedWriteExt},
    AnyResult,
};
use serde::Deserialize;
use std::io::{Read, Write};

/// The `[mover]` configuration table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MoverConfig {
    pub vx: f64,
    pub vy: f64,
}

/// Moves the sibling [`Transformable`] by a constant velocity every tick.
#[derive(Debug, Clone, Default)]
pub struct MoverModel {
    vx: f64,
    vy: f64,
    transformable: Option<Slot>,
}

impl MoverModel {
    pub const NODE: &'static str = "mover";

    pub fn new(vx: f64, vy: f64) -> Self {
        Self {
            vx,
            vy,
            transformable: None,
        }
    }

    pub fn from_config(configurer: &Configurer) -> AnyResult<Self> {
        let config: MoverConfig = configurer.get_node_default(Self::NODE)?;
        Ok(Self::new(config.vx, config.vy))
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    pub fn set_velocity(&mut self, vx: f64, vy: f64) {
        self.vx = vx;
        self.vy = vy;
    }
}

impl Refreshable for MoverModel {
    fn update(&mut self, extrp: f64, owner: &mut Featurable) -> AnyResult {
        let slot = self
            .transformable
            .ok_or_else(FeatureError::not_prepared::<Self>)?;

        owner
            .get_feature_at_mut::<dyn Transformable>(slot)?
            .move_location(extrp, self.vx, self.vy);
        ok()
    }
}

impl Persistable for MoverModel {
    fn persist_key(&self) -> &'static str {
        Self::NODE
    }

    fn save(&self, w: &mut dyn Write) -> AnyResult {
        w.write_packed(self.vx)?;
        w.write_packed(self.vy)?;
        ok()
    }

    fn load(&mut self, r: &mut dyn Read) -> AnyResult {
        self.vx = r.read_packed()?;
        self.vy = r.read_packed()?;
        ok()
    }
}

impl Feature for MoverModel {
    provides!(dyn Refreshable);

    fn prepare(&mut self, owner: &mut Featurable) -> AnyResult {
        let slot = owner
            .features()
            .slot_of::<dyn Transformable>()
            .ok_or_else(FeatureError::missing_sibling::<Self, dyn Transformable>)?;

        self.transformable = Some(slot);
        ok()
    }

    fn persistable(&self) -> Option<&dyn Persistable> {
        Some(self)
    }

    fn persistable_mut(&mut self) -> Option<&mut dyn Persistable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_a_transformable() {
        let mut featurable = Featurable::new();
        featurable.add_feature(MoverModel::new(1.0, 1.0)).unwrap();

        let error = featurable.prepare().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FeatureError>(),
            Some(FeatureError::MissingSibling { .. })
        ));
    }

    #[test]
    fn moves_with_extrapolation() {
        let mut featurable = Featurable::new();
        featurable
            .add_feature(super::super::TransformableModel::new(1, 1))
            .unwrap();
        featurable.add_feature(MoverModel::new(2.0, -4.0)).unwrap();
        featurable.prepare().unwrap();

        featurable.refresh(0.5).unwrap();
        featurable.refresh(1.0).unwrap();

        let shape = featurable.get_feature::<dyn super::super::Shape>().unwrap();
        assert_eq!((shape.x(), shape.y()), (3.0, -6.0));
    }
}
