//! Issuing and releasing entity identities.

use ahash::{AHashMap, AHashSet};
use log::*;
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// An entity identity. It's unique among all entities that are alive within a single
/// [`IdentityRegistry`], and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub u32);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity {0} was already released")]
    AlreadyReleased(Id),
    #[error("identity {0} was never allocated")]
    NeverAllocated(Id),
    #[error("identity counter overflow")]
    Overflow,
}

/// Callback fired right before an identity is released.
pub trait IdentityListener {
    fn notify_destroyed(&mut self, id: Id);
}

impl<F: FnMut(Id)> IdentityListener for F {
    fn notify_destroyed(&mut self, id: Id) {
        self(id)
    }
}

type Listeners = SmallVec<[Box<dyn IdentityListener>; 2]>;

/// Allocator of [`Id`] values.
///
/// Identities come from a monotonic counter, and a released identity is never issued again
/// (until [`IdentityRegistry::reset`]). Releasing only drops the bookkeeping, so that stale
/// handles held elsewhere can never alias a newer entity.
#[derive(Default)]
pub struct IdentityRegistry {
    next: u32,
    allocated: AHashSet<Id>,
    listeners: AHashMap<Id, Listeners>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next identity.
    pub fn allocate(&mut self) -> Result<Id, IdentityError> {
        let id = Id(self.next);
        self.next = self.next.checked_add(1).ok_or(IdentityError::Overflow)?;
        self.allocated.insert(id);
        Ok(id)
    }

    /// Releases an identity, notifying its destruction listeners in registration order first.
    pub fn release(&mut self, id: Id) -> Result<(), IdentityError> {
        self.check(id)?;

        if let Some(listeners) = self.listeners.remove(&id) {
            trace!("Notifying {} destruction listener(s) of {id}", listeners.len());
            for mut listener in listeners {
                listener.notify_destroyed(id);
            }
        }

        self.allocated.remove(&id);
        Ok(())
    }

    /// Registers a listener fired when `id` gets released.
    pub fn add_listener(
        &mut self,
        id: Id,
        listener: impl IdentityListener + 'static,
    ) -> Result<(), IdentityError> {
        self.check(id)?;
        self.listeners
            .entry(id)
            .or_default()
            .push(Box::new(listener));
        Ok(())
    }

    #[inline]
    pub fn is_allocated(&self, id: Id) -> bool {
        self.allocated.contains(&id)
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    /// Forgets everything, including the counter. Any outstanding [`Id`] becomes meaningless.
    pub fn reset(&mut self) {
        self.next = 0;
        self.allocated.clear();
        self.listeners.clear();
    }

    fn check(&self, id: Id) -> Result<(), IdentityError> {
        if self.allocated.contains(&id) {
            Ok(())
        } else if id.0 < self.next {
            Err(IdentityError::AlreadyReleased(id))
        } else {
            Err(IdentityError::NeverAllocated(id))
        }
    }
}
