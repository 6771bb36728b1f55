//! The render surface handed to display capabilities.

/// An opaque drawing target. The core never draws by itself, it only passes the surface along to
/// the [`Displayable`](crate::models::Displayable) features in display order.
pub trait Graphic {
    /// Draws an axis aligned rectangle outline, `(x, y)` being its top left corner.
    fn draw_rect(&mut self, x: f64, y: f64, width: i32, height: i32);
}

/// A surface that records every draw call, for tests and headless runs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingGraphic {
    pub rects: Vec<(f64, f64, i32, i32)>,
}

impl RecordingGraphic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

impl Graphic for RecordingGraphic {
    fn draw_rect(&mut self, x: f64, y: f64, width: i32, height: i32) {
        self.rects.push((x, y, width, height));
    }
}
