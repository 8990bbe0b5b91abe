use awin_core::{Point, PointF, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub name: String,
    /// Top-left corner in the virtual desktop.
    pub position: Point,
    pub size: Point,
    pub physical_size_mm: Point,
    pub scale: PointF,
    pub refresh_hz: f32,
    pub primary: bool,
}

impl Default for MonitorInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Point::ZERO,
            size: Point::ZERO,
            physical_size_mm: Point::ZERO,
            scale: PointF::ONE,
            refresh_hz: 0.0,
            primary: false,
        }
    }
}

impl MonitorInfo {
    pub fn rect(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.size.x, self.size.y)
    }

    /// Scale derived from the physical size, 96 dpi being 1.0.
    pub fn scale_from_physical(size: Point, physical_mm: Point) -> PointF {
        if physical_mm.x <= 0 || physical_mm.y <= 0 {
            return PointF::ONE;
        }
        let dpi = size.as_vec2() * 25.4 / physical_mm.as_vec2();
        dpi / 96.0
    }
}
