use crate::{
    config::Configurer,
    feature::{Feature, Persistable},
    identity::Id,
    provides,
};
use lumen_utils::{
    ok,
    packed::{PackedReadExt, PackedWriteExt},
    AnyResult,
};
use serde::Deserialize;
use std::io::{Read, Write};

/// Layer used for featurables that don't carry a [`Layerable`] feature.
pub const LAYER_DEFAULT: i32 = 0;

/// Refresh and display ordering of a featurable. Lower layers go first.
pub trait Layerable {
    fn set_layer(&mut self, refresh: i32, display: i32);
    fn layer_refresh(&self) -> i32;
    fn layer_display(&self) -> i32;
}

/// A layer assignment change of one featurable.
///
/// The old values are `None` when the featurable is being announced for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerChange {
    pub id: Id,
    pub old_refresh: Option<i32>,
    pub new_refresh: i32,
    pub old_display: Option<i32>,
    pub new_display: i32,
}

impl LayerChange {
    pub fn refresh_changed(&self) -> bool {
        self.old_refresh != Some(self.new_refresh)
    }

    pub fn display_changed(&self) -> bool {
        self.old_display != Some(self.new_display)
    }
}

pub trait LayerableListener {
    fn notify_layer_changed(&mut self, change: &LayerChange) {
        let _ = change;
    }
}

/// The `[layerable]` configuration table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayerableConfig {
    pub refresh: i32,
    pub display: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerableModel {
    refresh: i32,
    display: i32,
}

impl Default for LayerableModel {
    fn default() -> Self {
        Self::new(LAYER_DEFAULT, LAYER_DEFAULT)
    }
}

impl LayerableModel {
    pub const NODE: &'static str = "layerable";

    pub fn new(refresh: i32, display: i32) -> Self {
        Self { refresh, display }
    }

    pub fn from_config(configurer: &Configurer) -> AnyResult<Self> {
        let config: LayerableConfig = configurer.get_node_default(Self::NODE)?;
        Ok(Self::new(config.refresh, config.display))
    }
}

impl Layerable for LayerableModel {
    fn set_layer(&mut self, refresh: i32, display: i32) {
        self.refresh = refresh;
        self.display = display;
    }

    fn layer_refresh(&self) -> i32 {
        self.refresh
    }

    fn layer_display(&self) -> i32 {
        self.display
    }
}

impl Persistable for LayerableModel {
    fn persist_key(&self) -> &'static str {
        Self::NODE
    }

    fn save(&self, w: &mut dyn Write) -> AnyResult {
        w.write_packed(self.refresh)?;
        w.write_packed(self.display)?;
        ok()
    }

    fn load(&mut self, r: &mut dyn Read) -> AnyResult {
        self.refresh = r.read_packed()?;
        self.display = r.read_packed()?;
        ok()
    }
}

impl Feature for LayerableModel {
    provides!(dyn Layerable);

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
    fn first_announcement_changes_everything() {
        let change = LayerChange {
            id: Id(0),
            old_refresh: None,
            new_refresh: 0,
            old_display: Some(3),
            new_display: 3,
        };
        assert!(change.refresh_changed());
        assert!(!change.display_changed());
    }

    #[test]
    fn configured_layers() {
        let configurer =
            Configurer::parse(Media::new("e.toml"), "[layerable]\nrefresh = 2\ndisplay = -1\n")
                .unwrap();
        let model = LayerableModel::from_config(&configurer).unwrap();
        assert_eq!((model.layer_refresh(), model.layer_display()), (2, -1));
    }
}
