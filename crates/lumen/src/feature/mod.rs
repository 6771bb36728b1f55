//! Features, the composable units of entity behavior and state
//!
//! ## Capability interfaces
//! A feature is stored once, but can be looked up by every type it declares in
//! [`Feature::provides`]. Declared types are usually trait objects (`dyn Transformable`), and the
//! concrete type is always declared as well. Since Rust can't cast `dyn Any` into another trait
//! object, each declaration carries a pair of casting functions that are type-erased and stored
//! next to the slot index.
//!
//! Interface "inheritance" is expressed by declaring the super-interface too: a feature
//! implementing `Transformable: Shape` declares both, so it can be found as either.
//!
//! The [`provides!`](crate::provides) macro generates the declaration for the common case.

use crate::featurable::Featurable;
use ahash::AHashMap;
use lumen_utils::{ok, short_type_name, AnyResult};
use std::{
    any::{self, Any, TypeId},
    io::{Read, Write},
};
use thiserror::Error;

mod features;
pub use features::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("`{added}` provides `{interface}`, which is already provided by `{existing}`")]
    Duplicate {
        interface: String,
        existing: String,
        added: String,
    },
    #[error("no feature provides `{0}`")]
    NotFound(String),
    #[error("`{0}` was used before being prepared")]
    NotPrepared(String),
    #[error("`{feature}` requires a sibling feature providing `{requires}`")]
    MissingSibling { feature: String, requires: String },
    #[error("`{0}` is currently in use")]
    InUse(String),
}

impl FeatureError {
    pub(crate) fn not_found<C: ?Sized>() -> Self {
        Self::NotFound(short_type_name(any::type_name::<C>()))
    }

    pub fn missing_sibling<F: ?Sized, C: ?Sized>() -> Self {
        Self::MissingSibling {
            feature: short_type_name(any::type_name::<F>()),
            requires: short_type_name(any::type_name::<C>()),
        }
    }

    pub fn not_prepared<F: ?Sized>() -> Self {
        Self::NotPrepared(short_type_name(any::type_name::<F>()))
    }
}

/// Upcasting helper, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of entity behavior or state, attached to exactly one [`Featurable`].
///
/// Features are constructed first and wired later: once the owner has all of its features,
/// [`Feature::prepare`] is called on each of them, which is the place to look up sibling
/// features and remember their [`Slot`]s.
pub trait Feature: AsAny {
    /// Declares every type this feature can be looked up by. See [`provides!`](crate::provides).
    fn provides(&self, provides: &mut Provides);

    /// Resolves sibling features. While this runs, the feature itself is detached from `owner`.
    fn prepare(&mut self, owner: &mut Featurable) -> AnyResult {
        let _ = owner;
        ok()
    }

    /// Features that want to be saved by the
    /// [`HandlerPersister`](crate::handler::HandlerPersister) return themselves here.
    fn persistable(&self) -> Option<&dyn Persistable> {
        None
    }

    fn persistable_mut(&mut self) -> Option<&mut dyn Persistable> {
        None
    }

    fn name(&self) -> &'static str {
        any::type_name::<Self>()
    }
}

/// Symmetrical binary codec of a feature's state. `load` must read exactly what `save` wrote,
/// in the same order.
pub trait Persistable {
    /// Key identifying the block in a save stream. Must be unique within one entity.
    fn persist_key(&self) -> &'static str;
    fn save(&self, w: &mut dyn Write) -> AnyResult;
    fn load(&mut self, r: &mut dyn Read) -> AnyResult;
}

/// Implements [`Feature::provides`] for the concrete type and every listed capability type.
///
/// ```ignore
/// impl Feature for TransformableModel {
///     provides!(dyn Transformable, dyn Shape);
/// }
/// ```
#[macro_export]
macro_rules! provides {
    ($($capability:ty),* $(,)?) => {
        fn provides(&self, provides: &mut $crate::feature::Provides) {
            provides.add::<Self, Self>(|feature| feature, |feature| feature);
            $(
                provides.add::<Self, $capability>(|feature| feature, |feature| feature);
            )*
        }
    };
}

/// Collects the declarations made by [`Feature::provides`].
#[derive(Default)]
pub struct Provides {
    entries: Vec<Provision>,
}

impl Provides {
    /// Declares that feature `F` can be viewed as `C`, using the given casts.
    pub fn add<F: Feature, C: ?Sized + 'static>(
        &mut self,
        cast: fn(&F) -> &C,
        cast_mut: fn(&mut F) -> &mut C,
    ) -> &mut Self {
        let key = TypeId::of::<C>();
        if self.entries.iter().all(|entry| entry.key != key) {
            let caster: Box<dyn Caster<C>> = Box::new(FnCaster { cast, cast_mut });
            self.entries.push(Provision {
                key,
                name: any::type_name::<C>(),
                caster: Box::new(caster),
            });
        }
        self
    }

    pub(crate) fn of(feature: &dyn Feature) -> Vec<Provision> {
        let mut provides = Provides::default();
        feature.provides(&mut provides);
        provides.entries
    }
}

/// Single type declaration, with a type-erased `Box<dyn Caster<C>>` inside.
pub(crate) struct Provision {
    pub key: TypeId,
    pub name: &'static str,
    pub caster: Box<dyn Any>,
}

pub(crate) trait Caster<C: ?Sized>: 'static {
    fn cast<'a>(&self, feature: &'a (dyn Feature + 'static)) -> Option<&'a C>;
    fn cast_mut<'a>(&self, feature: &'a mut (dyn Feature + 'static)) -> Option<&'a mut C>;
}

struct FnCaster<F, C: ?Sized> {
    cast: fn(&F) -> &C,
    cast_mut: fn(&mut F) -> &mut C,
}

impl<F: Feature, C: ?Sized + 'static> Caster<C> for FnCaster<F, C> {
    fn cast<'a>(&self, feature: &'a (dyn Feature + 'static)) -> Option<&'a C> {
        feature.as_any().downcast_ref::<F>().map(self.cast)
    }

    fn cast_mut<'a>(&self, feature: &'a mut (dyn Feature + 'static)) -> Option<&'a mut C> {
        feature.as_any_mut().downcast_mut::<F>().map(self.cast_mut)
    }
}

/// Maps a declared type to the caster stored in a [`Provision`].
pub(crate) fn caster_of<C: ?Sized + 'static>(caster: &dyn Any) -> &dyn Caster<C> {
    caster
        .downcast_ref::<Box<dyn Caster<C>>>()
        .expect("corrupted feature caster mapping")
        .as_ref()
}

pub(crate) type ProvisionMap = AHashMap<TypeId, (Slot, Provision)>;
