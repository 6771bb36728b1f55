//! Layer ordered components

use super::{
    Component, ComponentRenderer, ComponentUpdater, Handlables, HandlerError, HandlerListener,
    HandlerState, Requirements,
};
use crate::{
    featurable::Featurable,
    graphic::Graphic,
    identity::Id,
    models::{LayerChange, LayerableListener},
};
use ahash::AHashMap;
use anyhow::Context;
use lumen_utils::{ok, AnyResult};
use std::collections::BTreeMap;

/// Featurables grouped by layer. Iteration goes through layers in ascending order, and keeps the
/// insertion order within a layer.
#[derive(Debug, Default)]
pub struct LayerBuckets {
    layers: BTreeMap<i32, Vec<Id>>,
    index: AHashMap<Id, i32>,
}

impl LayerBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `id` into `layer`, moving it out of its previous layer if needed.
    pub fn insert(&mut self, id: Id, layer: i32) {
        if self.index.get(&id) == Some(&layer) {
            return;
        }

        self.remove(id);
        self.layers.entry(layer).or_default().push(id);
        self.index.insert(id, layer);
    }

    /// Removes `id`, returning the layer it was in.
    pub fn remove(&mut self, id: Id) -> Option<i32> {
        let layer = self.index.remove(&id)?;

        if let Some(bucket) = self.layers.get_mut(&layer) {
            bucket.retain(|&other| other != id);
            if bucket.is_empty() {
                self.layers.remove(&layer);
            }
        }

        Some(layer)
    }

    pub fn layer_of(&self, id: Id) -> Option<i32> {
        self.index.get(&id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.layers.values().flatten().copied()
    }

    /// Non-empty layers with their members, in ascending order.
    pub fn layers(&self) -> impl Iterator<Item = (i32, &[Id])> {
        self.layers
            .iter()
            .map(|(layer, bucket)| (*layer, bucket.as_slice()))
    }

    /// Copies the iteration order, so the buckets can change while it's being walked.
    pub fn snapshot(&self) -> Vec<Id> {
        self.ids().collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Refreshes live featurables in ascending refresh layer order.
#[derive(Default)]
pub struct ComponentRefreshable {
    buckets: LayerBuckets,
    requirements: Requirements,
}

impl ComponentRefreshable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the component reject featurables without a `C` feature.
    pub fn requiring<C: ?Sized + 'static>(mut self) -> Self {
        self.requirements.add::<C>();
        self
    }

    pub fn buckets(&self) -> &LayerBuckets {
        &self.buckets
    }
}

impl HandlerListener for ComponentRefreshable {
    fn notify_handlable_removed(&mut self, featurable: &Featurable) {
        if let Some(id) = featurable.id() {
            self.buckets.remove(id);
        }
    }
}

impl LayerableListener for ComponentRefreshable {
    fn notify_layer_changed(&mut self, change: &LayerChange) {
        if change.refresh_changed() {
            self.buckets.insert(change.id, change.new_refresh);
        }
    }
}

impl Component for ComponentRefreshable {
    fn label(&self) -> &'static str {
        "refreshable"
    }

    fn validate(&self, featurable: &Featurable) -> Result<(), HandlerError> {
        self.requirements.check(self.label(), featurable)
    }
}

impl ComponentUpdater for ComponentRefreshable {
    fn update(&mut self, extrp: f64, state: &mut HandlerState) -> AnyResult {
        for id in self.buckets.snapshot() {
            if let Some(featurable) = state.handlables.get_mut(id) {
                featurable
                    .refresh(extrp)
                    .with_context(|| format!("couldn't refresh {id}"))?;
            }
        }
        ok()
    }
}

/// Renders live featurables in ascending display layer order.
#[derive(Default)]
pub struct ComponentDisplayable {
    buckets: LayerBuckets,
    requirements: Requirements,
}

impl ComponentDisplayable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the component reject featurables without a `C` feature.
    pub fn requiring<C: ?Sized + 'static>(mut self) -> Self {
        self.requirements.add::<C>();
        self
    }

    pub fn buckets(&self) -> &LayerBuckets {
        &self.buckets
    }
}

impl HandlerListener for ComponentDisplayable {
    fn notify_handlable_removed(&mut self, featurable: &Featurable) {
        if let Some(id) = featurable.id() {
            self.buckets.remove(id);
        }
    }
}

impl LayerableListener for ComponentDisplayable {
    fn notify_layer_changed(&mut self, change: &LayerChange) {
        if change.display_changed() {
            self.buckets.insert(change.id, change.new_display);
        }
    }
}

impl Component for ComponentDisplayable {
    fn label(&self) -> &'static str {
        "displayable"
    }

    fn validate(&self, featurable: &Featurable) -> Result<(), HandlerError> {
        self.requirements.check(self.label(), featurable)
    }
}

impl ComponentRenderer for ComponentDisplayable {
    fn render(&mut self, g: &mut dyn Graphic, handlables: &Handlables) -> AnyResult {
        for id in self.buckets.ids() {
            if let Some(featurable) = handlables.get(id) {
                featurable
                    .render(g)
                    .with_context(|| format!("couldn't render {id}"))?;
            }
        }
        ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_iterate_by_layer() {
        let mut buckets = LayerBuckets::new();
        buckets.insert(Id(0), 5);
        buckets.insert(Id(1), -2);
        buckets.insert(Id(2), 5);
        buckets.insert(Id(3), 0);

        assert_eq!(buckets.snapshot(), [Id(1), Id(3), Id(0), Id(2)]);
        assert_eq!(buckets.layer_of(Id(2)), Some(5));
        assert_eq!(buckets.len(), 4);
    }

    #[test]
    fn moving_between_layers() {
        let mut buckets = LayerBuckets::new();
        buckets.insert(Id(0), 1);
        buckets.insert(Id(1), 1);
        buckets.insert(Id(0), 3);

        let layers: Vec<_> = buckets
            .layers()
            .map(|(layer, ids)| (layer, ids.to_vec()))
            .collect();
        assert_eq!(layers, [(1, vec![Id(1)]), (3, vec![Id(0)])]);

        assert_eq!(buckets.remove(Id(1)), Some(1));
        assert_eq!(buckets.remove(Id(1)), None);
        assert_eq!(buckets.layers().count(), 1);
        assert_eq!(buckets.layer_of(Id(1)), None);
    }

    #[test]
    fn reinserting_into_the_same_layer_keeps_order() {
        let mut buckets = LayerBuckets::new();
        buckets.insert(Id(0), 0);
        buckets.insert(Id(1), 0);
        buckets.insert(Id(0), 0);
        assert_eq!(buckets.snapshot(), [Id(0), Id(1)]);
    }
}
