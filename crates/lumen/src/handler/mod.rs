//! # The featurable scheduler
//! A [`Handler`] owns every live featurable and drives the registered components over them.
//!
//! ## Lifecycle
//! Featurables go through `pending → live → pending removal → removed`:
//!  - [`Handler::add`] gives the featurable an identity and queues it. It stays invisible until
//!    the next [`Handler::update`] promotes it, so nothing joins the live set mid-pass.
//!  - [`Handler::remove`] (or destroying the featurable) only marks it. Removal happens in one
//!    batch at the end of the update, after every component had its pass.
//!  - Removed featurables are dropped and their identity is released. They never come back.
//!
//! ## Layers
//! After every promotion and every component pass, the handler compares each featurable's
//! [`Layerable`] assignment with the last one it announced, and tells the components and layer
//! listeners about every difference. Featurables without a [`Layerable`] sit at
//! [`LAYER_DEFAULT`].

use crate::{
    feature::{Feature, Slot},
    featurable::Featurable,
    graphic::Graphic,
    identity::{Id, IdentityError, IdentityListener, IdentityRegistry},
    models::{LayerChange, Layerable, LayerableListener, LAYER_DEFAULT},
};
use ahash::AHashMap;
use anyhow::Context;
use log::*;
use lumen_utils::{ok, AnyResult};
use std::mem;
use thiserror::Error;

mod component;
mod layer;
mod persister;

pub use component::*;
pub use layer::*;
pub use persister::*;

/// Runs `$body` for every updater and renderer of the handler, bound to `$component`.
macro_rules! for_each_component {
    ($handler:ident, $component:ident => $body:expr) => {
        for $component in $handler.updaters.iter_mut() {
            $body;
        }
        for $component in $handler.renderers.iter_mut() {
            $body;
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("no live featurable with identity {0}")]
    NotFound(Id),
    #[error("featurable {0} is already registered")]
    AlreadyRegistered(Id),
    #[error("component `{component}` requires a feature providing `{feature}`")]
    MissingFeature {
        component: &'static str,
        feature: String,
    },
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// The live set: featurables indexed by identity, iterated in promotion order.
#[derive(Default)]
pub struct Handlables {
    order: Vec<Id>,
    featurables: AHashMap<Id, Featurable>,
}

impl Handlables {
    pub fn get(&self, id: Id) -> Option<&Featurable> {
        self.featurables.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut Featurable> {
        self.featurables.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.featurables.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.order.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Featurable> {
        self.order.iter().map(|id| &self.featurables[id])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, id: Id, featurable: Featurable) -> Result<(), HandlerError> {
        if self.featurables.contains_key(&id) {
            return Err(HandlerError::AlreadyRegistered(id));
        }

        self.order.push(id);
        self.featurables.insert(id, featurable);
        Ok(())
    }

    fn remove(&mut self, id: Id) -> Option<Featurable> {
        let featurable = self.featurables.remove(&id)?;
        self.order.retain(|&other| other != id);
        Some(featurable)
    }
}

/// What a [`ComponentUpdater`] can see and do during its pass.
///
/// Additions and removals are only queued here. Queued featurables get promoted on the next
/// update, queued removals happen at the end of this one.
pub struct HandlerState<'a> {
    pub handlables: &'a mut Handlables,
    identities: &'a mut IdentityRegistry,
    to_add: &'a mut Vec<(Id, Featurable)>,
    to_remove: &'a mut Vec<Id>,
}

impl<'a> HandlerState<'a> {
    pub fn queue_add(&mut self, featurable: Featurable) -> AnyResult<Id> {
        queue(self.identities, self.to_add, featurable)
    }

    pub fn queue_remove(&mut self, id: Id) {
        if !self.to_remove.contains(&id) {
            self.to_remove.push(id);
        }
    }
}

fn queue(
    identities: &mut IdentityRegistry,
    to_add: &mut Vec<(Id, Featurable)>,
    mut featurable: Featurable,
) -> AnyResult<Id> {
    if let Some(id) = featurable.id() {
        return Err(HandlerError::AlreadyRegistered(id).into());
    }

    featurable.prepare()?;
    let id = identities.allocate()?;
    featurable.assign_id(id);
    to_add.push((id, featurable));

    trace!("Queued featurable {id}");
    Ok(id)
}

fn layers_of(featurable: &Featurable) -> (i32, i32) {
    match featurable.get_feature::<dyn Layerable>() {
        Ok(layerable) => (layerable.layer_refresh(), layerable.layer_display()),
        Err(_) => (LAYER_DEFAULT, LAYER_DEFAULT),
    }
}

/// Owner and scheduler of featurables.
#[derive(Default)]
pub struct Handler {
    identities: IdentityRegistry,
    handlables: Handlables,
    to_add: Vec<(Id, Featurable)>,
    to_remove: Vec<Id>,
    /// Last layer assignment announced to components, per live featurable.
    announced: AHashMap<Id, (i32, i32)>,

    updaters: Vec<Box<dyn ComponentUpdater>>,
    renderers: Vec<Box<dyn ComponentRenderer>>,
    listeners: Vec<Box<dyn HandlerListener>>,
    layer_listeners: Vec<Box<dyn LayerableListener>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an update pass. Passes run in registration order.
    ///
    /// The component gets to know the featurables that are already live, and is rejected if any
    /// of them doesn't meet its requirements.
    pub fn add_component_updater(
        &mut self,
        mut component: impl ComponentUpdater + 'static,
    ) -> Result<(), HandlerError> {
        self.introduce(&mut component)?;
        debug!("Registered updater `{}`", component.label());
        self.updaters.push(Box::new(component));
        Ok(())
    }

    /// Registers a render pass. Passes run in registration order. Already live featurables are
    /// handled like in [`Handler::add_component_updater`].
    pub fn add_component_renderer(
        &mut self,
        mut component: impl ComponentRenderer + 'static,
    ) -> Result<(), HandlerError> {
        self.introduce(&mut component)?;
        debug!("Registered renderer `{}`", component.label());
        self.renderers.push(Box::new(component));
        Ok(())
    }

    pub fn add_listener(&mut self, listener: impl HandlerListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn add_layer_listener(&mut self, listener: impl LayerableListener + 'static) {
        self.layer_listeners.push(Box::new(listener));
    }

    /// Checks the featurable against every registered component.
    pub fn validate(&self, featurable: &Featurable) -> Result<(), HandlerError> {
        for updater in &self.updaters {
            updater.validate(featurable)?;
        }
        for renderer in &self.renderers {
            renderer.validate(featurable)?;
        }
        Ok(())
    }

    /// Prepares, validates and queues a featurable. It becomes live on the next update.
    pub fn add(&mut self, mut featurable: Featurable) -> AnyResult<Id> {
        if let Some(id) = featurable.id() {
            return Err(HandlerError::AlreadyRegistered(id).into());
        }

        featurable.prepare()?;
        self.validate(&featurable)?;
        queue(&mut self.identities, &mut self.to_add, featurable)
    }

    /// Marks a live or pending featurable for removal. Unknown identities are ignored.
    pub fn remove(&mut self, id: Id) {
        let known =
            self.handlables.contains(id) || self.to_add.iter().any(|(other, _)| *other == id);
        if known && !self.to_remove.contains(&id) {
            self.to_remove.push(id);
        }
    }

    /// Marks every live and pending featurable for removal.
    pub fn remove_all(&mut self) {
        let ids: Vec<_> = self
            .handlables
            .ids()
            .chain(self.to_add.iter().map(|(id, _)| *id))
            .collect();

        for id in ids {
            self.remove(id);
        }
    }

    /// Runs a tick: promotes pending featurables, runs every updater, then removes everything
    /// that got destroyed or marked for removal.
    pub fn update(&mut self, extrp: f64) -> AnyResult {
        self.promote()?;

        for index in 0..self.updaters.len() {
            let mut state = HandlerState {
                handlables: &mut self.handlables,
                identities: &mut self.identities,
                to_add: &mut self.to_add,
                to_remove: &mut self.to_remove,
            };

            let updater = &mut self.updaters[index];
            let label = updater.label();
            updater
                .update(extrp, &mut state)
                .with_context(|| format!("updater `{label}` failed"))?;

            self.sync_layers();
            self.check_features();
        }

        self.flush_removals()
    }

    /// Runs every renderer over the live featurables.
    pub fn render(&mut self, g: &mut dyn Graphic) -> AnyResult {
        for renderer in self.renderers.iter_mut() {
            let label = renderer.label();
            renderer
                .render(g, &self.handlables)
                .with_context(|| format!("renderer `{label}` failed"))?;
        }
        ok()
    }

    pub fn get(&self, id: Id) -> Result<&Featurable, HandlerError> {
        self.handlables.get(id).ok_or(HandlerError::NotFound(id))
    }

    /// Gives mutable access to a live featurable. Layer changes and new features are announced
    /// once `f` returns.
    pub fn modify<R>(
        &mut self,
        id: Id,
        f: impl FnOnce(&mut Featurable) -> R,
    ) -> Result<R, HandlerError> {
        let featurable = self
            .handlables
            .get_mut(id)
            .ok_or(HandlerError::NotFound(id))?;
        let result = f(featurable);

        self.sync_layers();
        self.check_features();
        Ok(result)
    }

    /// Adds a feature to a live featurable and announces it to the components.
    pub fn add_feature(&mut self, id: Id, feature: impl Feature) -> AnyResult<Slot> {
        self.modify(id, |featurable| featurable.add_feature(feature))?
    }

    /// Changes the layers of a live featurable, which must have a [`Layerable`] feature.
    pub fn set_layer(&mut self, id: Id, refresh: i32, display: i32) -> AnyResult {
        self.modify(id, |featurable| {
            featurable
                .get_feature_mut::<dyn Layerable>()
                .map(|layerable| layerable.set_layer(refresh, display))
        })??;
        ok()
    }

    /// Number of live featurables.
    pub fn size(&self) -> usize {
        self.handlables.len()
    }

    /// Number of featurables waiting for promotion.
    pub fn pending(&self) -> usize {
        self.to_add.len()
    }

    /// Live featurables in promotion order.
    pub fn iter(&self) -> impl Iterator<Item = &Featurable> {
        self.handlables.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.handlables.ids()
    }

    pub fn handlables(&self) -> &Handlables {
        &self.handlables
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// Registers a listener for the release of a live or pending identity.
    pub fn add_identity_listener(
        &mut self,
        id: Id,
        listener: impl IdentityListener + 'static,
    ) -> Result<(), HandlerError> {
        Ok(self.identities.add_listener(id, listener)?)
    }

    /// Replays the live set to a component that's about to be registered.
    fn introduce(&self, component: &mut dyn Component) -> Result<(), HandlerError> {
        for featurable in self.handlables.iter() {
            component.validate(featurable)?;
        }

        for (id, featurable) in self.handlables.ids().zip(self.handlables.iter()) {
            let (refresh, display) = match self.announced.get(&id) {
                Some(&layers) => layers,
                None => layers_of(featurable),
            };

            component.notify_handlable_added(featurable);
            component.notify_layer_changed(&LayerChange {
                id,
                old_refresh: None,
                new_refresh: refresh,
                old_display: None,
                new_display: display,
            });
        }

        Ok(())
    }

    fn promote(&mut self) -> AnyResult {
        if self.to_add.is_empty() {
            return ok();
        }

        let mut pending = mem::take(&mut self.to_add).into_iter();
        while let Some((id, mut featurable)) = pending.next() {
            if featurable.is_destroyed() || self.to_remove.contains(&id) {
                debug!("Featurable {id} was removed before being promoted");
                self.to_remove.retain(|&other| other != id);
                self.identities.release(id)?;
                continue;
            }

            if let Err(error) = self.validate(&featurable) {
                self.to_add.extend(pending);
                self.identities.release(id)?;
                return Err(error).with_context(|| format!("couldn't promote featurable {id}"));
            }

            featurable.set_registered();
            if let Err(error) = self.handlables.insert(id, featurable) {
                self.to_add.extend(pending);
                return Err(error).context("couldn't promote a featurable");
            }
            let featurable = &self.handlables.featurables[&id];

            for listener in self.listeners.iter_mut() {
                listener.notify_handlable_added(featurable);
            }
            for_each_component!(self, component => component.notify_handlable_added(featurable));

            let layers = layers_of(featurable);
            self.announce(id, None, layers);
            trace!("Promoted featurable {id}");
        }

        ok()
    }

    fn flush_removals(&mut self) -> AnyResult {
        let doomed: Vec<Id> = self
            .handlables
            .iter()
            .filter(|featurable| featurable.is_destroyed())
            .filter_map(Featurable::id)
            .chain(
                self.to_remove
                    .iter()
                    .copied()
                    .filter(|&id| self.handlables.contains(id)),
            )
            .collect();

        // Marks of pending featurables stay until their promotion
        let handlables = &self.handlables;
        self.to_remove.retain(|id| !handlables.contains(*id));

        for id in doomed {
            self.drop_live(id)?;
        }

        ok()
    }

    /// Removes live featurables right away, and cancels the promotion of pending ones. Only safe
    /// between updates.
    fn discard(&mut self, ids: impl IntoIterator<Item = Id>) -> AnyResult {
        for id in ids {
            if self.handlables.contains(id) {
                self.to_remove.retain(|&other| other != id);
                self.drop_live(id)?;
            } else {
                self.remove(id);
            }
        }
        ok()
    }

    fn drop_live(&mut self, id: Id) -> AnyResult {
        let Some(featurable) = self.handlables.remove(id) else {
            return ok();
        };

        for_each_component!(self, component => component.notify_handlable_removed(&featurable));
        for listener in self.listeners.iter_mut() {
            listener.notify_handlable_removed(&featurable);
        }

        self.announced.remove(&id);
        self.identities.release(id)?;
        trace!("Removed featurable {id}");
        ok()
    }

    fn sync_layers(&mut self) {
        let mut changes = vec![];
        for id in self.handlables.ids() {
            let layers = layers_of(&self.handlables.featurables[&id]);
            let previous = self.announced.get(&id).copied();
            if previous != Some(layers) {
                changes.push((id, previous, layers));
            }
        }

        for (id, previous, layers) in changes {
            self.announce(id, previous, layers);
        }
    }

    fn announce(&mut self, id: Id, previous: Option<(i32, i32)>, (refresh, display): (i32, i32)) {
        let change = LayerChange {
            id,
            old_refresh: previous.map(|(refresh, _)| refresh),
            new_refresh: refresh,
            old_display: previous.map(|(_, display)| display),
            new_display: display,
        };

        self.announced.insert(id, (refresh, display));
        for_each_component!(self, component => component.notify_layer_changed(&change));
        for listener in self.layer_listeners.iter_mut() {
            listener.notify_layer_changed(&change);
        }
    }

    fn check_features(&mut self) {
        for id in self.handlables.order.iter() {
            let Some(featurable) = self.handlables.featurables.get_mut(id) else {
                continue;
            };

            let slots = featurable.take_unchecked();
            let featurable = &*featurable;
            for slot in slots {
                for_each_component!(self, component => {
                    component.notify_feature_added(featurable, slot)
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlables_reject_occupied_identities() {
        let mut handlables = Handlables::default();
        handlables.insert(Id(0), Featurable::new()).unwrap();

        assert_eq!(
            handlables.insert(Id(0), Featurable::new()),
            Err(HandlerError::AlreadyRegistered(Id(0)))
        );
        assert_eq!(handlables.len(), 1);
        assert_eq!(handlables.ids().collect::<Vec<_>>(), [Id(0)]);
    }

    #[test]
    fn discarding_skips_the_next_update() {
        let mut handler = Handler::new();
        let live = handler.add(Featurable::new()).unwrap();
        handler.update(1.0).unwrap();
        let pending = handler.add(Featurable::new()).unwrap();

        handler.discard([live, pending]).unwrap();
        assert_eq!(handler.size(), 0);
        assert!(!handler.identities().is_allocated(live));

        handler.update(1.0).unwrap();
        assert_eq!(handler.size(), 0);
        assert_eq!(handler.pending(), 0);
        assert_eq!(handler.identities().allocated_count(), 0);
    }
}
