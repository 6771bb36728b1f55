use crate::{
    config::Media,
    feature::{Feature, FeatureError, Features, Slot},
    graphic::Graphic,
    identity::Id,
    models::{Displayable, Identifiable, IdentifiableModel, Refreshable},
};
use anyhow::Context;
use lumen_utils::{ok, short_type_name, AnyResult};
use std::{fmt, mem};

/// An entity: a bag of [`Feature`]s with an identity and a record of where it came from.
///
/// Every featurable starts with an [`IdentifiableModel`], which receives its [`Id`] once the
/// featurable gets added to a [`Handler`](crate::handler::Handler).
pub struct Featurable {
    media: Option<Media>,
    features: Features,
    identifiable: Slot,
    prepared: bool,
    registered: bool,
    /// Features added after registration, waiting for the handler to announce them.
    unchecked: Vec<Slot>,
}

impl fmt::Debug for Featurable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Featurable")
            .field("id", &self.id())
            .field("media", &self.media)
            .field("features", &self.feature_types())
            .finish()
    }
}

impl Default for Featurable {
    fn default() -> Self {
        Self::new()
    }
}

impl Featurable {
    /// Creates a blank featurable without configuration media.
    pub fn new() -> Self {
        let mut features = Features::new();
        let identifiable = features
            .add(Box::new(IdentifiableModel::default()))
            .expect("blank feature set can't have duplicates");

        Self {
            media: None,
            features,
            identifiable,
            prepared: false,
            registered: false,
            unchecked: vec![],
        }
    }

    /// Creates a blank featurable that remembers its configuration media.
    pub fn with_media(media: Media) -> Self {
        Self {
            media: Some(media),
            ..Self::new()
        }
    }

    pub fn media(&self) -> Option<&Media> {
        self.media.as_ref()
    }

    /// Adds a feature. If the featurable has already been prepared, the new feature is prepared
    /// right away.
    pub fn add_feature(&mut self, feature: impl Feature) -> AnyResult<Slot> {
        self.add_boxed_feature(Box::new(feature))
    }

    pub fn add_boxed_feature(&mut self, feature: Box<dyn Feature>) -> AnyResult<Slot> {
        let slot = self.features.add(feature)?;

        if self.prepared {
            self.prepare_slot(slot)?;
        }
        if self.registered {
            self.unchecked.push(slot);
        }

        Ok(slot)
    }

    pub fn get_feature<C: ?Sized + 'static>(&self) -> Result<&C, FeatureError> {
        self.features.get()
    }

    pub fn get_feature_mut<C: ?Sized + 'static>(&mut self) -> Result<&mut C, FeatureError> {
        self.features.get_mut()
    }

    /// Slot-checked access for features that resolved a sibling during [`Feature::prepare`].
    pub fn get_feature_at<C: ?Sized + 'static>(&self, slot: Slot) -> Result<&C, FeatureError> {
        self.features.get_at(slot)
    }

    pub fn get_feature_at_mut<C: ?Sized + 'static>(
        &mut self,
        slot: Slot,
    ) -> Result<&mut C, FeatureError> {
        self.features.get_at_mut(slot)
    }

    #[inline]
    pub fn has_feature<C: ?Sized + 'static>(&self) -> bool {
        self.features.contains::<C>()
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub(crate) fn features_mut(&mut self) -> &mut Features {
        &mut self.features
    }

    /// Readable names of every type the features can be looked up by.
    pub fn feature_types(&self) -> Vec<String> {
        self.features.type_names().collect()
    }

    /// Detaches the feature providing `C`, and calls `f` with it and the rest of the featurable.
    ///
    /// Lookups of the detached feature fail with [`FeatureError::InUse`] until `f` returns.
    pub fn with_feature_mut<C, R>(
        &mut self,
        f: impl FnOnce(&mut C, &mut Featurable) -> R,
    ) -> Result<R, FeatureError>
    where
        C: ?Sized + 'static,
    {
        let slot = self
            .features
            .slot_of::<C>()
            .ok_or_else(FeatureError::not_found::<C>)?;

        let mut feature = self.features.take(slot)?;
        let result = match self.features.cast_detached_mut::<C>(feature.as_mut()) {
            Ok(view) => Ok(f(view, self)),
            Err(error) => Err(error),
        };
        self.features.restore(slot, feature);

        result
    }

    /// Lets every feature resolve its siblings. Only the first call does anything.
    pub fn prepare(&mut self) -> AnyResult {
        if self.prepared {
            return ok();
        }

        for slot in self.features.slots().collect::<Vec<_>>() {
            self.prepare_slot(slot)?;
        }

        self.prepared = true;
        ok()
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn prepare_slot(&mut self, slot: Slot) -> AnyResult {
        let mut feature = self.features.take(slot)?;
        let result = feature.prepare(self);
        let name = feature.name();
        self.features.restore(slot, feature);

        result.with_context(|| format!("could not prepare `{}`", short_type_name(name)))
    }

    fn identifiable(&self) -> &IdentifiableModel {
        self.features
            .get_at(self.identifiable)
            .expect("featurable lost its identifiable")
    }

    /// The identity, available once the featurable has been added to a handler.
    pub fn id(&self) -> Option<Id> {
        self.identifiable().id()
    }

    pub(crate) fn assign_id(&mut self, id: Id) {
        self.features
            .get_at_mut::<IdentifiableModel>(self.identifiable)
            .expect("featurable lost its identifiable")
            .assign(id);
    }

    /// Marks the featurable as destroyed. The handler removes it at the end of the next update.
    pub fn destroy(&mut self) {
        self.features
            .get_at_mut::<IdentifiableModel>(self.identifiable)
            .expect("featurable lost its identifiable")
            .destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.identifiable().is_destroyed()
    }

    pub(crate) fn set_registered(&mut self) {
        self.registered = true;
        self.unchecked.clear();
    }

    pub(crate) fn take_unchecked(&mut self) -> Vec<Slot> {
        mem::take(&mut self.unchecked)
    }

    /// Runs the [`Refreshable`] feature, if there is one.
    pub fn refresh(&mut self, extrp: f64) -> AnyResult {
        if !self.has_feature::<dyn Refreshable>() {
            return ok();
        }
        self.with_feature_mut::<dyn Refreshable, _>(|refreshable, owner| {
            refreshable.update(extrp, owner)
        })?
    }

    /// Runs the [`Displayable`] feature, if there is one.
    pub fn render(&self, g: &mut dyn Graphic) -> AnyResult {
        match self.features.get::<dyn Displayable>() {
            Ok(displayable) => displayable.render(g, self),
            Err(FeatureError::NotFound(_)) => ok(),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{MoverModel, Shape, Transformable, TransformableModel},
        provides,
    };

    struct Tracker {
        shape: Option<Slot>,
    }

    impl Feature for Tracker {
        provides!();

        fn prepare(&mut self, owner: &mut Featurable) -> AnyResult {
            self.shape = owner.features().slot_of::<dyn Shape>();
            ok()
        }
    }

    #[test]
    fn blank_featurables_are_identifiable() {
        let featurable = Featurable::new();
        assert!(featurable.has_feature::<dyn Identifiable>());
        assert_eq!(featurable.id(), None);
        assert!(!featurable.is_destroyed());
        assert_eq!(featurable.feature_types(), ["IdentifiableModel", "dyn Identifiable"]);
    }

    #[test]
    fn debug_output_names_media_and_features() {
        let featurable = Featurable::with_media(Media::new("box.toml"));
        let output = format!("{featurable:?}");
        assert!(output.contains("box.toml"));
        assert!(output.contains("IdentifiableModel"));
        assert!(output.starts_with("Featurable { id: None"));
    }

    #[test]
    fn second_identifiable_is_rejected() {
        let mut featurable = Featurable::new();
        let error = featurable
            .add_feature(IdentifiableModel::default())
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FeatureError>(),
            Some(FeatureError::Duplicate { .. })
        ));
    }

    #[test]
    fn prepare_wires_siblings() {
        let mut featurable = Featurable::new();
        featurable.add_feature(TransformableModel::new(4, 4)).unwrap();
        featurable.add_feature(Tracker { shape: None }).unwrap();
        featurable.prepare().unwrap();

        let tracker = featurable.get_feature::<Tracker>().unwrap();
        assert_eq!(tracker.shape, featurable.features().slot_of::<dyn Transformable>());
    }

    #[test]
    fn refresh_before_prepare_fails_loudly() {
        let mut featurable = Featurable::new();
        featurable.add_feature(TransformableModel::new(4, 4)).unwrap();
        featurable.add_feature(MoverModel::new(1.0, 0.0)).unwrap();

        let error = featurable.refresh(1.0).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FeatureError>(),
            Some(FeatureError::NotPrepared(_))
        ));

        featurable.prepare().unwrap();
        featurable.refresh(1.0).unwrap();
        assert_eq!(featurable.get_feature::<dyn Shape>().unwrap().x(), 1.0);
    }

    #[test]
    fn late_features_get_prepared() {
        let mut featurable = Featurable::new();
        featurable.prepare().unwrap();
        featurable.add_feature(TransformableModel::new(2, 2)).unwrap();
        featurable.add_feature(MoverModel::new(0.0, 2.0)).unwrap();

        featurable.refresh(0.5).unwrap();
        assert_eq!(featurable.get_feature::<dyn Shape>().unwrap().y(), 1.0);
    }

    #[test]
    fn detached_feature_is_busy() {
        let mut featurable = Featurable::new();
        featurable.add_feature(TransformableModel::new(2, 2)).unwrap();

        let busy = featurable
            .with_feature_mut::<dyn Transformable, _>(|transformable, owner| {
                transformable.teleport(3.0, 4.0);
                owner.get_feature::<dyn Shape>().is_err()
            })
            .unwrap();

        assert!(busy);
        assert_eq!(featurable.get_feature::<dyn Shape>().unwrap().x(), 3.0);
    }
}
