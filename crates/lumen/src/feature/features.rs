use super::{caster_of, Feature, FeatureError, ProvisionMap, Provides};
use lumen_utils::short_type_name;
use std::any::TypeId;

/// Stable index of a feature within its owner. Siblings remember each other by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(pub usize);

/// A per-entity bag of features, addressable by any declared type.
///
/// Every declared type maps to exactly one feature. Slots are an arena: a feature can be
/// temporarily detached (see [`Featurable::with_feature_mut`](crate::Featurable::with_feature_mut))
/// so it can mutate itself while looking at its siblings.
#[derive(Default)]
pub struct Features {
    slots: Vec<Option<Box<dyn Feature>>>,
    names: Vec<&'static str>,
    provisions: ProvisionMap,
    /// Declared types in registration order, for deterministic iteration.
    types: Vec<TypeId>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature under every type it declares.
    ///
    /// Fails if any of these types is already provided by another feature, in which case
    /// nothing is modified.
    pub fn add(&mut self, feature: Box<dyn Feature>) -> Result<Slot, FeatureError> {
        let provisions = Provides::of(feature.as_ref());

        for provision in &provisions {
            if let Some((slot, _)) = self.provisions.get(&provision.key) {
                return Err(FeatureError::Duplicate {
                    interface: short_type_name(provision.name),
                    existing: short_type_name(self.names[slot.0]),
                    added: short_type_name(feature.name()),
                });
            }
        }

        let slot = Slot(self.slots.len());
        self.names.push(feature.name());
        self.slots.push(Some(feature));

        for provision in provisions {
            self.types.push(provision.key);
            self.provisions.insert(provision.key, (slot, provision));
        }

        Ok(slot)
    }

    /// Checks whether adding `feature` would fail due to a duplicate declaration.
    pub fn collides(&self, feature: &dyn Feature) -> bool {
        Provides::of(feature)
            .iter()
            .any(|provision| self.provisions.contains_key(&provision.key))
    }

    pub fn get<C: ?Sized + 'static>(&self) -> Result<&C, FeatureError> {
        let (slot, _) = self.lookup::<C>()?;
        self.get_at(slot)
    }

    pub fn get_mut<C: ?Sized + 'static>(&mut self) -> Result<&mut C, FeatureError> {
        let (slot, _) = self.lookup::<C>()?;
        self.get_at_mut(slot)
    }

    /// Like [`Features::get`], but also verifies that `C` is provided by the feature at `slot`.
    pub fn get_at<C: ?Sized + 'static>(&self, slot: Slot) -> Result<&C, FeatureError> {
        let (provided_by, provision) = self.lookup::<C>()?;
        if provided_by != slot {
            return Err(FeatureError::not_found::<C>());
        }

        let feature = self.slots[slot.0]
            .as_deref()
            .ok_or_else(|| FeatureError::InUse(short_type_name(self.names[slot.0])))?;

        Ok(caster_of::<C>(provision.caster.as_ref())
            .cast(feature)
            .expect("feature caster type mismatch"))
    }

    pub fn get_at_mut<C: ?Sized + 'static>(&mut self, slot: Slot) -> Result<&mut C, FeatureError> {
        let (provided_by, _) = self.lookup::<C>()?;
        if provided_by != slot {
            return Err(FeatureError::not_found::<C>());
        }

        let (_, provision) = &self.provisions[&TypeId::of::<C>()];
        let feature = self.slots[slot.0]
            .as_deref_mut()
            .ok_or_else(|| FeatureError::InUse(short_type_name(self.names[slot.0])))?;

        Ok(caster_of::<C>(provision.caster.as_ref())
            .cast_mut(feature)
            .expect("feature caster type mismatch"))
    }

    #[inline]
    pub fn contains<C: ?Sized + 'static>(&self) -> bool {
        self.contains_type(TypeId::of::<C>())
    }

    #[inline]
    pub fn contains_type(&self, key: TypeId) -> bool {
        self.provisions.contains_key(&key)
    }

    /// Returns the slot of the feature providing `C`.
    pub fn slot_of<C: ?Sized + 'static>(&self) -> Option<Slot> {
        self.provisions
            .get(&TypeId::of::<C>())
            .map(|(slot, _)| *slot)
    }

    /// Iterates over all attached features in insertion order. Detached features are skipped.
    pub fn all(&self) -> impl Iterator<Item = &(dyn Feature + 'static)> {
        self.slots.iter().filter_map(|slot| slot.as_deref())
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut (dyn Feature + 'static)> {
        self.slots.iter_mut().filter_map(|slot| slot.as_deref_mut())
    }

    /// Iterates over all declared types in registration order.
    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.types.iter().copied()
    }

    /// Same as [`Features::types`], but yields readable type names.
    pub fn type_names(&self) -> impl Iterator<Item = String> + '_ {
        self.types
            .iter()
            .map(|key| short_type_name(self.provisions[key].1.name))
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        (0..self.slots.len()).map(Slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Detaches the feature at `slot`. It must be returned with [`Features::restore`].
    pub(crate) fn take(&mut self, slot: Slot) -> Result<Box<dyn Feature>, FeatureError> {
        self.slots[slot.0]
            .take()
            .ok_or_else(|| FeatureError::InUse(short_type_name(self.names[slot.0])))
    }

    pub(crate) fn restore(&mut self, slot: Slot, feature: Box<dyn Feature>) {
        debug_assert!(self.slots[slot.0].is_none(), "restoring into an occupied slot");
        self.slots[slot.0] = Some(feature);
    }

    /// Casts a detached feature into `C`. The feature must come from the slot providing `C`.
    pub(crate) fn cast_detached_mut<'a, C: ?Sized + 'static>(
        &self,
        feature: &'a mut (dyn Feature + 'static),
    ) -> Result<&'a mut C, FeatureError> {
        let (_, provision) = self.lookup::<C>()?;
        caster_of::<C>(provision.caster.as_ref())
            .cast_mut(feature)
            .ok_or_else(FeatureError::not_found::<C>)
    }

    fn lookup<C: ?Sized + 'static>(&self) -> Result<(Slot, &super::Provision), FeatureError> {
        self.provisions
            .get(&TypeId::of::<C>())
            .map(|(slot, provision)| (*slot, provision))
            .ok_or_else(FeatureError::not_found::<C>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provides;

    trait Named {
        fn name_of(&self) -> &str;
    }

    trait Greeter: Named {
        fn greet(&self) -> String;
        fn rename(&mut self, name: &str);
    }

    struct Person(String);

    impl Named for Person {
        fn name_of(&self) -> &str {
            &self.0
        }
    }

    impl Greeter for Person {
        fn greet(&self) -> String {
            format!("hello, {}", self.0)
        }

        fn rename(&mut self, name: &str) {
            self.0 = name.to_owned();
        }
    }

    impl Feature for Person {
        provides!(dyn Greeter, dyn Named);
    }

    struct Robot;

    impl Named for Robot {
        fn name_of(&self) -> &str {
            "robot"
        }
    }

    impl Feature for Robot {
        provides!(dyn Named);
    }

    struct Counter(u32);

    impl Feature for Counter {
        provides!();
    }

    #[test]
    fn lookup_through_super_interfaces() {
        let mut features = Features::new();
        features.add(Box::new(Person("ada".into()))).unwrap();

        assert_eq!(features.get::<dyn Greeter>().unwrap().greet(), "hello, ada");
        assert_eq!(features.get::<dyn Named>().unwrap().name_of(), "ada");
        assert_eq!(features.get::<Person>().unwrap().0, "ada");

        features.get_mut::<dyn Greeter>().unwrap().rename("grace");
        assert_eq!(features.get::<dyn Named>().unwrap().name_of(), "grace");
    }

    #[test]
    fn duplicates_are_rejected_without_side_effects() {
        let mut features = Features::new();
        features.add(Box::new(Person("ada".into()))).unwrap();
        assert!(features.collides(&Robot));

        let error = features.add(Box::new(Robot)).unwrap_err();
        assert_eq!(
            error,
            FeatureError::Duplicate {
                interface: "dyn Named".into(),
                existing: "Person".into(),
                added: "Robot".into(),
            }
        );

        assert_eq!(features.len(), 1);
        assert_eq!(features.get::<dyn Named>().unwrap().name_of(), "ada");
        assert!(!features.contains::<Robot>());
    }

    #[test]
    fn missing_types_are_not_found() {
        let mut features = Features::new();
        features.add(Box::new(Counter(3))).unwrap();

        assert!(features.contains::<Counter>());
        assert!(!features.contains::<dyn Named>());
        assert_eq!(
            features.get::<dyn Named>().err(),
            Some(FeatureError::NotFound("dyn Named".into()))
        );
    }

    #[test]
    fn types_follow_registration_order() {
        let mut features = Features::new();
        features.add(Box::new(Counter(0))).unwrap();
        features.add(Box::new(Person("ada".into()))).unwrap();

        let names: Vec<_> = features.type_names().collect();
        assert_eq!(names, ["Counter", "Person", "dyn Greeter", "dyn Named"]);
        assert_eq!(features.all().count(), 2);
        assert_eq!(features.slot_of::<dyn Named>(), Some(Slot(1)));
    }

    #[test]
    fn detached_features_are_in_use() {
        let mut features = Features::new();
        let slot = features.add(Box::new(Person("ada".into()))).unwrap();

        let mut person = features.take(slot).unwrap();
        assert!(matches!(
            features.get::<dyn Named>(),
            Err(FeatureError::InUse(_))
        ));

        features
            .cast_detached_mut::<dyn Greeter>(person.as_mut())
            .unwrap()
            .rename("grace");
        features.restore(slot, person);

        assert_eq!(features.get::<dyn Named>().unwrap().name_of(), "grace");
        assert!(features.get_at::<dyn Named>(Slot(0)).is_ok());
    }
}
