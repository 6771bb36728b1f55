use super::{Handlables, HandlerError, HandlerState};
use crate::{
    feature::Slot, featurable::Featurable, graphic::Graphic, models::LayerableListener,
};
use lumen_utils::{ok, short_type_name, AnyResult};
use std::any;

/// Observer of featurables entering and leaving the live set of a
/// [`Handler`](super::Handler).
pub trait HandlerListener {
    /// Called once the featurable got promoted, before it's seen by any component pass.
    fn notify_handlable_added(&mut self, featurable: &Featurable) {
        let _ = featurable;
    }

    /// Called right before the featurable is dropped and its identity released.
    fn notify_handlable_removed(&mut self, featurable: &Featurable) {
        let _ = featurable;
    }
}

/// A pass over the live featurables, run by the [`Handler`](super::Handler).
///
/// Components are told about every featurable entering or leaving the live set, and about every
/// layer assignment change, so they can keep their own ordering structures.
pub trait Component: HandlerListener + LayerableListener {
    fn label(&self) -> &'static str;

    /// Checks whether the featurable carries everything this component requires. Called on
    /// [`Handler::add`](super::Handler::add) and again on promotion.
    fn validate(&self, featurable: &Featurable) -> Result<(), HandlerError> {
        let _ = featurable;
        Ok(())
    }

    /// Called for features added to an already live featurable.
    fn notify_feature_added(&mut self, featurable: &Featurable, slot: Slot) {
        let _ = (featurable, slot);
    }
}

/// A component run by [`Handler::update`](super::Handler::update).
pub trait ComponentUpdater: Component {
    fn update(&mut self, extrp: f64, state: &mut HandlerState) -> AnyResult;
}

/// A component run by [`Handler::render`](super::Handler::render).
pub trait ComponentRenderer: Component {
    fn render(&mut self, g: &mut dyn Graphic, handlables: &Handlables) -> AnyResult;
}

/// Capability requirements of a component, checked by [`Component::validate`].
#[derive(Default)]
pub struct Requirements {
    required: Vec<(String, fn(&Featurable) -> bool)>,
}

impl Requirements {
    pub fn add<C: ?Sized + 'static>(&mut self) {
        self.required.push((
            short_type_name(any::type_name::<C>()),
            |featurable| featurable.has_feature::<C>(),
        ));
    }

    pub fn check(
        &self,
        component: &'static str,
        featurable: &Featurable,
    ) -> Result<(), HandlerError> {
        for (feature, present) in &self.required {
            if !present(featurable) {
                return Err(HandlerError::MissingFeature {
                    component,
                    feature: feature.clone(),
                });
            }
        }
        ok()
    }
}
