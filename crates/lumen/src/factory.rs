//! Building featurables from configuration documents.

use crate::{
    config::{Configurer, Media, MediaSource},
    feature::Feature,
    featurable::Featurable,
    models::{LayerableModel, MoverModel, RectangleModel, TransformableModel},
    services::Services,
};
use ahash::AHashMap;
use anyhow::Context;
use log::*;
use lumen_utils::AnyResult;
use std::{cell::RefCell, rc::Rc};
use thiserror::Error;

/// Root attribute listing the feature tags of an entity.
pub const FEATURES_ATTRIBUTE: &str = "features";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    #[error("unknown media `{0}`")]
    UnknownMedia(Media),
    #[error("`{media}` uses the unknown feature `{tag}`")]
    UnknownFeature { media: Media, tag: String },
}

type FeatureConstructor = Box<dyn Fn(&Configurer, &Services) -> AnyResult<Box<dyn Feature>>>;

/// Creates featurables out of configuration documents.
///
/// Every feature tag used in documents must be registered with [`Factory::with_feature`]. Parsed
/// documents are cached, so creating many featurables of the same kind only parses once.
pub struct Factory {
    source: Box<dyn MediaSource>,
    services: Services,
    constructors: AHashMap<String, FeatureConstructor>,
    cache: RefCell<AHashMap<Media, Rc<Configurer>>>,
}

impl Factory {
    pub fn new(source: impl MediaSource + 'static, services: Services) -> Self {
        Self {
            source: Box::new(source),
            services,
            constructors: AHashMap::new(),
            cache: RefCell::new(AHashMap::new()),
        }
    }

    /// Registers a feature constructor under `tag`, replacing any previous one.
    pub fn with_feature<F: Feature>(
        mut self,
        tag: &str,
        constructor: impl Fn(&Configurer, &Services) -> AnyResult<F> + 'static,
    ) -> Self {
        self.constructors.insert(
            tag.to_owned(),
            Box::new(move |configurer: &Configurer, services: &Services| {
                Ok(Box::new(constructor(configurer, services)?) as Box<dyn Feature>)
            }),
        );
        self
    }

    /// Registers the built-in features under their node names.
    pub fn with_defaults(self) -> Self {
        self.with_feature(TransformableModel::NODE, |configurer, _| {
            TransformableModel::from_config(configurer)
        })
        .with_feature(LayerableModel::NODE, |configurer, _| {
            LayerableModel::from_config(configurer)
        })
        .with_feature(MoverModel::NODE, |configurer, _| {
            MoverModel::from_config(configurer)
        })
        .with_feature(RectangleModel::NODE, |_, _| Ok(RectangleModel::new()))
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn has_feature(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Returns the parsed document of `media`, loading it on first use.
    pub fn configurer(&self, media: &Media) -> AnyResult<Rc<Configurer>> {
        if let Some(configurer) = self.cache.borrow().get(media) {
            return Ok(configurer.clone());
        }

        if !self.source.exists(media) {
            return Err(FactoryError::UnknownMedia(media.clone()).into());
        }

        let configurer = Rc::new(Configurer::load(self.source.as_ref(), media)?);
        trace!("Cached configuration of `{media}`");
        self.cache
            .borrow_mut()
            .insert(media.clone(), configurer.clone());
        Ok(configurer)
    }

    /// Creates and prepares the featurable described by `media`.
    pub fn create(&self, media: &Media) -> AnyResult<Featurable> {
        self.create_with(media, vec![])
    }

    /// Same as [`Factory::create`], but `overrides` are attached first. Configured features that
    /// would provide the same types as an override are skipped.
    pub fn create_with(
        &self,
        media: &Media,
        overrides: Vec<Box<dyn Feature>>,
    ) -> AnyResult<Featurable> {
        let configurer = self.configurer(media)?;
        let tags = configurer.get_strings_default(vec![], "", FEATURES_ATTRIBUTE)?;

        let mut featurable = Featurable::with_media(media.clone());
        for feature in overrides {
            featurable.add_boxed_feature(feature)?;
        }

        for tag in tags {
            let constructor = self.constructors.get(&tag).ok_or_else(|| {
                FactoryError::UnknownFeature {
                    media: media.clone(),
                    tag: tag.clone(),
                }
            })?;

            let feature = constructor(&configurer, &self.services)
                .with_context(|| format!("couldn't construct `{tag}` of `{media}`"))?;

            if featurable.features().collides(feature.as_ref()) {
                debug!("Skipping `{tag}` of `{media}`, it's overridden");
                continue;
            }
            featurable.add_boxed_feature(feature)?;
        }

        featurable
            .prepare()
            .with_context(|| format!("couldn't prepare `{media}`"))?;

        debug!(
            "Created `{media}` with {} feature(s)",
            featurable.features().len()
        );
        Ok(featurable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MemorySource,
        models::{Layerable, Refreshable, Shape},
    };

    fn factory() -> Factory {
        let source = MemorySource::new()
            .with(
                "box.toml",
                r#"
features = ["transformable", "layerable", "mover", "rectangle"]

[transformable]
width = 4
height = 2

[layerable]
refresh = 1
display = 2

[mover]
vx = 1.0
"#,
            )
            .with("blank.toml", "")
            .with("weird.toml", r#"features = ["teleporter"]"#)
            .with("broken.toml", r#"features = ["mover"]"#);

        Factory::new(source, Services::new()).with_defaults()
    }

    #[test]
    fn creates_prepared_featurables() {
        let factory = factory();
        let mut featurable = factory.create(&Media::new("box.toml")).unwrap();

        assert!(featurable.is_prepared());
        assert_eq!(featurable.media(), Some(&Media::new("box.toml")));
        assert_eq!(
            featurable.get_feature::<dyn Layerable>().unwrap().layer_display(),
            2
        );

        featurable.refresh(2.0).unwrap();
        let shape = featurable.get_feature::<dyn Shape>().unwrap();
        assert_eq!((shape.x(), shape.width()), (2.0, 4));
    }

    #[test]
    fn blank_documents_are_fine() {
        let featurable = factory().create(&Media::new("blank.toml")).unwrap();
        assert_eq!(featurable.features().len(), 1);
    }

    #[test]
    fn configurers_are_cached() {
        let factory = factory();
        let first = factory.configurer(&Media::new("box.toml")).unwrap();
        let second = factory.configurer(&Media::new("box.toml")).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn failures_are_descriptive() {
        let factory = factory();

        let error = factory.create(&Media::new("nowhere.toml")).unwrap_err();
        assert_eq!(
            error.downcast_ref::<FactoryError>(),
            Some(&FactoryError::UnknownMedia(Media::new("nowhere.toml")))
        );

        let error = factory.create(&Media::new("weird.toml")).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FactoryError>(),
            Some(FactoryError::UnknownFeature { tag, .. }) if tag == "teleporter"
        ));

        assert!(factory.create(&Media::new("broken.toml")).is_err());
    }

    #[test]
    fn overrides_replace_configured_features() {
        let factory = factory();
        let featurable = factory
            .create_with(
                &Media::new("box.toml"),
                vec![Box::new(MoverModel::new(0.0, 5.0))],
            )
            .unwrap();

        assert!(featurable.has_feature::<dyn Refreshable>());
        let mover = featurable.get_feature::<MoverModel>().unwrap();
        assert_eq!(mover.velocity(), (0.0, 5.0));
    }
}
