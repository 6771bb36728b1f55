//! Built-in capabilities
//!
//! These cover the contracts the core itself relies on ([`Identifiable`], [`Layerable`]) plus a
//! minimal spatial set used by the factory defaults and the sandbox.

use crate::{featurable::Featurable, graphic::Graphic};
use lumen_utils::AnyResult;

mod identifiable;
mod layerable;
mod mover;
mod rectangle;
mod transformable;

pub use identifiable::*;
pub use layerable::*;
pub use mover::*;
pub use rectangle::*;
pub use transformable::*;

/// A capability updated once per tick by
/// [`ComponentRefreshable`](crate::handler::ComponentRefreshable).
pub trait Refreshable {
    /// `extrp` is the frame time extrapolation factor, `1.0` at the nominal rate.
    fn update(&mut self, extrp: f64, owner: &mut Featurable) -> AnyResult;
}

/// A capability drawn once per frame by
/// [`ComponentDisplayable`](crate::handler::ComponentDisplayable).
pub trait Displayable {
    fn render(&self, g: &mut dyn Graphic, owner: &Featurable) -> AnyResult;
}
