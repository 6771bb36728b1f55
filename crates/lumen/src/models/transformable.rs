use crate::{
    config::Configurer,
    feature::{Feature, Persistable},
    provides,
};
use lumen_utils::{
    ok,
    packed::{PackedReadExt, PackedWriteExt},
    AnyResult,
};
use serde::Deserialize;
use std::io::{Read, Write};

/// Read-only position and size.
pub trait Shape {
    fn x(&self) -> f64;
    fn y(&self) -> f64;
    fn width(&self) -> i32;
    fn height(&self) -> i32;
}

pub trait Transformable: Shape {
    fn teleport(&mut self, x: f64, y: f64);
    /// Moves by `(vx, vy)` scaled by the extrapolation factor.
    fn move_location(&mut self, extrp: f64, vx: f64, vy: f64);
    fn set_size(&mut self, width: i32, height: i32);
}

/// The `[transformable]` configuration table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransformableConfig {
    pub x: f64,
    pub y: f64,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformableModel {
    x: f64,
    y: f64,
    width: i32,
    height: i32,
}

impl TransformableModel {
    pub const NODE: &'static str = "transformable";

    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn from_config(configurer: &Configurer) -> AnyResult<Self> {
        let config: TransformableConfig = configurer.get_node_default(Self::NODE)?;
        Ok(Self {
            x: config.x,
            y: config.y,
            width: config.width,
            height: config.height,
        })
    }
}

impl Shape for TransformableModel {
    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }
}

impl Transformable for TransformableModel {
    fn teleport(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    fn move_location(&mut self, extrp: f64, vx: f64, vy: f64) {
        self.x += vx * extrp;
        self.y += vy * extrp;
    }

    fn set_size(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }
}

impl Persistable for TransformableModel {
    fn persist_key(&self) -> &'static str {
        Self::NODE
    }

    fn save(&self, w: &mut dyn Write) -> AnyResult {
        w.write_packed(self.x)?;
        w.write_packed(self.y)?;
        w.write_packed(self.width)?;
        w.write_packed(self.height)?;
        ok()
    }

    fn load(&mut self, r: &mut dyn Read) -> AnyResult {
        self.x = r.read_packed()?;
        self.y = r.read_packed()?;
        self.width = r.read_packed()?;
        self.height = r.read_packed()?;
        ok()
    }
}

impl Feature for TransformableModel {
    provides!(dyn Transformable, dyn Shape);

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
    use crate::config::Media;

    #[test]
    fn configured_from_table() {
        let configurer = Configurer::parse(
            Media::new("entity.toml"),
            "[transformable]\nx = 1.5\nwidth = 16\nheight = 32\n",
        )
        .unwrap();

        let model = TransformableModel::from_config(&configurer).unwrap();
        assert_eq!((model.x(), model.y()), (1.5, 0.0));
        assert_eq!((model.width(), model.height()), (16, 32));
    }

    #[test]
    fn missing_table_means_defaults() {
        let configurer = Configurer::parse(Media::new("entity.toml"), "").unwrap();
        let model = TransformableModel::from_config(&configurer).unwrap();
        assert_eq!(model, TransformableModel::default());
    }

    #[test]
    fn state_survives_persistence() {
        let mut model = TransformableModel::new(16, 32);
        model.teleport(1.0, 2.0);
        model.move_location(0.5, 2.0, -2.0);

        let mut buffer = Vec::new();
        model.save(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 8 + 8 + 4 + 4);

        let mut loaded = TransformableModel::default();
        loaded.load(&mut buffer.as_slice()).unwrap();
        assert_eq!(loaded, model);
        assert_eq!((loaded.x(), loaded.y()), (2.0, 1.0));
    }
}
