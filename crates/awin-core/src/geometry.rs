//! Point and rectangle types shared by every backend.

use serde::{Deserialize, Serialize};

/// Integer point or size in window coordinates.
pub type Point = glam::IVec2;

/// Sub-pixel point, used for cursor positions and scale factors.
pub type PointF = glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Point,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Point::new(width, height),
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.y >= self.origin.y
            && point.x < self.origin.x + self.size.x
            && point.y < self.origin.y + self.size.y
    }

    pub fn center(&self) -> Point {
        self.origin + self.size / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_is_half_open() {
        let rect = Rect::new(10, 10, 20, 5);
        assert!(rect.contains(Point::new(10, 10)));
        assert!(rect.contains(Point::new(29, 14)));
        assert!(!rect.contains(Point::new(30, 14)));
        assert!(!rect.contains(Point::new(10, 15)));
        assert_eq!(rect.center(), Point::new(20, 12));
    }
}
