//! # Lumen
//! Runtime object model of a 2D engine.
//!
//! Entities are [`Featurable`]s: bags of [`Feature`](feature::Feature)s that can be looked up by
//! any capability interface they declare. A [`Handler`] owns the live featurables, gives them
//! identities and runs the registered components over them, tick by tick and layer by layer.
//! Featurables are usually built from TOML documents by a [`Factory`], and a whole live set can be
//! saved and restored with a [`HandlerPersister`].

pub mod config;
pub mod factory;
pub mod featurable;
pub mod feature;
pub mod graphic;
pub mod handler;
pub mod identity;
pub mod models;
pub mod services;

pub use config::{Configurer, Media};
pub use factory::Factory;
pub use featurable::Featurable;
pub use handler::{Handler, HandlerPersister};
pub use identity::Id;
pub use services::Services;
