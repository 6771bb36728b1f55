//! A small service locator with constructor injection.

use ahash::AHashMap;
use log::*;
use lumen_utils::{short_type_name, AnyResult};
use std::{
    any::{self, Any, TypeId},
    cell::RefCell,
    cmp::Reverse,
    error::Error,
    rc::Rc,
};
use thiserror::Error;

/// Limits how deep [`Services::create`] looks through injected dependencies, so that cyclic
/// constructor declarations fail instead of recursing forever.
const INJECTION_DEPTH_LIMIT: usize = 16;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service `{0}` not found")]
    NotFound(String),
    #[error("no constructor of `{0}` has all of its dependencies available")]
    NoSuchConstructor(String),
    #[error("couldn't instantiate `{ty}`")]
    InstantiationFailure {
        ty: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

struct Entry {
    name: &'static str,
    /// Always an `Rc<S>`, where `S` is the type the entry is keyed by.
    value: Box<dyn Any>,
}

/// Shared registry of services, keyed by type.
///
/// Cloning produces another handle to the same registry. A service can be registered under its
/// concrete type ([`Services::add`]) or under any unsized interface type like `dyn Clock`
/// ([`Services::add_as`]). The registry itself can always be looked up as `Services`.
#[derive(Clone, Default)]
pub struct Services {
    inner: Rc<RefCell<AHashMap<TypeId, Entry>>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under its concrete type and returns the shared instance.
    pub fn add<T: 'static>(&self, service: T) -> Rc<T> {
        self.add_as(Rc::new(service))
    }

    /// Registers an already shared service under the type `S`.
    ///
    /// ```
    /// use lumen::services::Services;
    /// use std::rc::Rc;
    ///
    /// trait Clock {
    ///     fn now(&self) -> u64;
    /// }
    ///
    /// struct Fixed;
    ///
    /// impl Clock for Fixed {
    ///     fn now(&self) -> u64 {
    ///         42
    ///     }
    /// }
    ///
    /// let services = Services::new();
    /// services.add_as::<dyn Clock>(Rc::new(Fixed));
    /// assert_eq!(services.get::<dyn Clock>().unwrap().now(), 42);
    /// ```
    pub fn add_as<S: ?Sized + 'static>(&self, service: Rc<S>) -> Rc<S> {
        let name = any::type_name::<S>();
        let previous = self.inner.borrow_mut().insert(
            TypeId::of::<S>(),
            Entry {
                name,
                value: Box::new(service.clone()),
            },
        );

        if previous.is_some() {
            debug!("Replacing service `{}`", short_type_name(name));
        } else {
            trace!("Registered service `{}`", short_type_name(name));
        }

        service
    }

    pub fn get<S: ?Sized + 'static>(&self) -> Result<Rc<S>, ServiceError> {
        self.get_optional()
            .ok_or_else(|| ServiceError::NotFound(short_type_name(any::type_name::<S>())))
    }

    pub fn get_optional<S: ?Sized + 'static>(&self) -> Option<Rc<S>> {
        if TypeId::of::<S>() == TypeId::of::<Services>() {
            let this: Box<dyn Any> = Box::new(Rc::new(self.clone()));
            return this.downcast::<Rc<S>>().ok().map(|rc| *rc);
        }

        self.inner.borrow().get(&TypeId::of::<S>()).map(|entry| {
            entry
                .value
                .downcast_ref::<Rc<S>>()
                .expect("corrupted service type mapping")
                .clone()
        })
    }

    pub fn contains<S: ?Sized + 'static>(&self) -> bool {
        TypeId::of::<S>() == TypeId::of::<Services>()
            || self.inner.borrow().contains_key(&TypeId::of::<S>())
    }

    /// Number of registered services, not counting the registry itself.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Readable names of all registered services.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .inner
            .borrow()
            .values()
            .map(|entry| short_type_name(entry.name))
            .collect();
        names.sort();
        names
    }

    /// Instantiates `T` with the most specific constructor whose dependencies are available,
    /// registers it and returns it.
    ///
    /// Constructors are tried from the one with the most dependencies down. Injected dependencies
    /// that aren't registered yet are created first.
    pub fn create<T: Injectable>(&self) -> Result<Rc<T>, ServiceError> {
        self.create_at_depth(0)
    }

    /// Returns the registered `T`, or creates it.
    pub fn get_or_create<T: Injectable>(&self) -> Result<Rc<T>, ServiceError> {
        match self.get_optional::<T>() {
            Some(service) => Ok(service),
            None => self.create(),
        }
    }

    fn create_at_depth<T: Injectable>(&self, depth: usize) -> Result<Rc<T>, ServiceError> {
        let ty = short_type_name(any::type_name::<T>());

        let mut constructors = T::constructors();
        constructors.sort_by_key(|constructor| Reverse(constructor.dependencies.len()));

        let constructor = constructors
            .into_iter()
            .find(|constructor| constructor.is_satisfiable(self, depth))
            .ok_or_else(|| ServiceError::NoSuchConstructor(ty.clone()))?;

        for dependency in &constructor.dependencies {
            if let Some(ensure) = dependency.ensure {
                ensure(self, depth + 1)?;
            }
        }

        debug!(
            "Creating service `{ty}` with {} dependencies",
            constructor.dependencies.len()
        );

        let service = (constructor.build)(self).map_err(|error| {
            ServiceError::InstantiationFailure {
                ty: ty.clone(),
                source: error.into(),
            }
        })?;

        Ok(self.add(service))
    }
}

/// A type [`Services::create`] knows how to build.
pub trait Injectable: Any + Sized {
    fn constructors() -> Vec<Constructor<Self>>;
}

struct Dependency {
    /// Whether the dependency is registered, or could be created within the depth limit.
    available: fn(&Services, usize) -> bool,
    /// Creates the dependency if it's missing. Only injected dependencies have one.
    ensure: Option<fn(&Services, usize) -> Result<(), ServiceError>>,
}

/// One way of building an [`Injectable`], along with the services it needs.
pub struct Constructor<T> {
    dependencies: Vec<Dependency>,
    build: Box<dyn Fn(&Services) -> AnyResult<T>>,
}

impl<T: 'static> Constructor<T> {
    pub fn new(build: impl Fn(&Services) -> AnyResult<T> + 'static) -> Self {
        Self {
            dependencies: vec![],
            build: Box::new(build),
        }
    }

    /// Declares a dependency that must already be registered.
    pub fn requires<S: ?Sized + 'static>(mut self) -> Self {
        self.dependencies.push(Dependency {
            available: |services, _| services.contains::<S>(),
            ensure: None,
        });
        self
    }

    /// Declares a dependency that gets created if it isn't registered yet.
    pub fn injects<D: Injectable>(mut self) -> Self {
        self.dependencies.push(Dependency {
            available: |services, depth| {
                services.contains::<D>()
                    || (depth < INJECTION_DEPTH_LIMIT
                        && D::constructors()
                            .iter()
                            .any(|constructor| constructor.is_satisfiable(services, depth + 1)))
            },
            ensure: Some(|services, depth| {
                if !services.contains::<D>() {
                    services.create_at_depth::<D>(depth)?;
                }
                Ok(())
            }),
        });
        self
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    fn is_satisfiable(&self, services: &Services, depth: usize) -> bool {
        self.dependencies
            .iter()
            .all(|dependency| (dependency.available)(services, depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    trait Clock {
        fn now(&self) -> u64;
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    struct Timer {
        started: u64,
        precise: bool,
    }

    impl Injectable for Timer {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![
                Constructor::new(|_| {
                    Ok(Timer {
                        started: 0,
                        precise: false,
                    })
                }),
                Constructor::new(|services| {
                    Ok(Timer {
                        started: services.get::<dyn Clock>()?.now(),
                        precise: true,
                    })
                })
                .requires::<dyn Clock>(),
            ]
        }
    }

    struct Scheduler {
        timer: Rc<Timer>,
    }

    impl Injectable for Scheduler {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|services| {
                Ok(Scheduler {
                    timer: services.get()?,
                })
            })
            .injects::<Timer>()]
        }
    }

    struct Broken;

    impl Injectable for Broken {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Err(anyhow!("out of coffee")))]
        }
    }

    struct Impossible;

    impl Injectable for Impossible {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Ok(Impossible)).requires::<dyn Clock>()]
        }
    }

    struct Ouroboros;

    impl Injectable for Ouroboros {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Ok(Ouroboros)).injects::<Ouroboros>()]
        }
    }

    #[test]
    fn add_and_get() {
        let services = Services::new();
        let added = services.add(Cell::new(5u32));
        added.set(6);

        assert_eq!(services.get::<Cell<u32>>().unwrap().get(), 6);
        assert!(services.contains::<Cell<u32>>());
        assert!(services.get_optional::<String>().is_none());
        assert!(matches!(
            services.get::<String>(),
            Err(ServiceError::NotFound(name)) if name == "String"
        ));
    }

    #[test]
    fn services_discover_themselves() {
        let services = Services::new();
        assert!(services.contains::<Services>());

        let handle = services.get::<Services>().unwrap();
        handle.add(String::from("shared"));
        assert_eq!(*services.get::<String>().unwrap(), "shared");
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn most_specific_constructor_wins() {
        let services = Services::new();
        let plain = services.create::<Timer>().unwrap();
        assert!(!plain.precise);

        services.add_as::<dyn Clock>(Rc::new(FixedClock(99)));
        let precise = services.create::<Timer>().unwrap();
        assert!(precise.precise);
        assert_eq!(precise.started, 99);
        assert!(Rc::ptr_eq(&precise, &services.get::<Timer>().unwrap()));
    }

    #[test]
    fn injected_dependencies_are_created() {
        let services = Services::new();
        let scheduler = services.create::<Scheduler>().unwrap();

        assert!(services.contains::<Timer>());
        assert!(Rc::ptr_eq(&scheduler.timer, &services.get::<Timer>().unwrap()));
        assert!(Rc::ptr_eq(
            &scheduler,
            &services.get_or_create::<Scheduler>().unwrap()
        ));
    }

    #[test]
    fn construction_failures() {
        let services = Services::new();
        assert!(matches!(
            services.create::<Impossible>(),
            Err(ServiceError::NoSuchConstructor(name)) if name == "Impossible"
        ));
        assert!(matches!(
            services.create::<Ouroboros>(),
            Err(ServiceError::NoSuchConstructor(_))
        ));

        let error = services.create::<Broken>().err().unwrap();
        assert!(matches!(&error, ServiceError::InstantiationFailure { ty, .. } if ty == "Broken"));
        assert_eq!(error.source().unwrap().to_string(), "out of coffee");
        assert!(!services.contains::<Broken>());
    }
}
