use crate::{feature::Feature, identity::Id, provides};

/// Identity and liveness of a featurable.
pub trait Identifiable {
    fn id(&self) -> Option<Id>;
    fn destroy(&mut self);
    fn is_destroyed(&self) -> bool;
}

/// Implicit first feature of every [`Featurable`](crate::Featurable).
#[derive(Debug, Default)]
pub struct IdentifiableModel {
    id: Option<Id>,
    destroyed: bool,
}

impl IdentifiableModel {
    pub(crate) fn assign(&mut self, id: Id) {
        debug_assert!(self.id.is_none(), "identity assigned twice");
        self.id = Some(id);
    }
}

impl Identifiable for IdentifiableModel {
    fn id(&self) -> Option<Id> {
        self.id
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Feature for IdentifiableModel {
    provides!(dyn Identifiable);
}
