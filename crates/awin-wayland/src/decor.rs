//! Client-side fallback decorations for compositors without
//! `zxdg_decoration_manager_v1` server-side decorations.
//!
//! Four sub-surfaces frame the content: a caption strip on top and thin
//! borders on the other three sides. Pointer positions on a part are mapped
//! into frame coordinates and classified with the shared [`hit_test`].

use awin_core::{hit_test, HitRegion, Point, PointF, BORDER_WIDTH, CAPTION_HEIGHT};
use wayland_protocols::xdg::shell::client::xdg_toplevel::ResizeEdge;

pub const CAPTION_COLOR: [u8; 4] = [0x2d, 0x2d, 0x33, 0xff];
pub const BORDER_COLOR: [u8; 4] = [0x1e, 0x1e, 0x24, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecorPart {
    Caption,
    Left,
    Right,
    Bottom,
}

impl DecorPart {
    pub const ALL: [DecorPart; 4] =
        [DecorPart::Caption, DecorPart::Left, DecorPart::Right, DecorPart::Bottom];

    pub fn color(self) -> [u8; 4] {
        match self {
            DecorPart::Caption => CAPTION_COLOR,
            _ => BORDER_COLOR,
        }
    }
}

/// Placement of one part relative to the content surface origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartGeometry {
    pub offset: Point,
    pub size: Point,
}

pub fn part_geometry(part: DecorPart, content: Point) -> PartGeometry {
    let (b, c) = (BORDER_WIDTH, CAPTION_HEIGHT);
    match part {
        DecorPart::Caption => PartGeometry {
            offset: Point::new(0, -c),
            size: Point::new(content.x, c),
        },
        DecorPart::Left => PartGeometry {
            offset: Point::new(-b, -c),
            size: Point::new(b, content.y + c),
        },
        DecorPart::Right => PartGeometry {
            offset: Point::new(content.x, -c),
            size: Point::new(b, content.y + c),
        },
        DecorPart::Bottom => PartGeometry {
            offset: Point::new(-b, content.y),
            size: Point::new(content.x + 2 * b, b),
        },
    }
}

/// Outer size of content plus decorations.
pub fn frame_size(content: Point) -> Point {
    content + Point::new(2 * BORDER_WIDTH, CAPTION_HEIGHT + BORDER_WIDTH)
}

/// Region under a pointer at `local` (surface coordinates of `part`).
pub fn region_at(part: DecorPart, local: PointF, content: Point) -> HitRegion {
    let geometry = part_geometry(part, content);
    let frame_origin = Point::new(-BORDER_WIDTH, -CAPTION_HEIGHT);
    let pos = geometry.offset - frame_origin + local.floor().as_ivec2();
    hit_test(pos, frame_size(content), BORDER_WIDTH, CAPTION_HEIGHT)
}

pub fn resize_edge(region: HitRegion) -> Option<ResizeEdge> {
    Some(match region {
        HitRegion::Top => ResizeEdge::Top,
        HitRegion::Bottom => ResizeEdge::Bottom,
        HitRegion::Left => ResizeEdge::Left,
        HitRegion::Right => ResizeEdge::Right,
        HitRegion::TopLeft => ResizeEdge::TopLeft,
        HitRegion::TopRight => ResizeEdge::TopRight,
        HitRegion::BottomLeft => ResizeEdge::BottomLeft,
        HitRegion::BottomRight => ResizeEdge::BottomRight,
        HitRegion::None | HitRegion::Caption => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: Point = Point::new(640, 480);

    #[test]
    fn test_parts_tile_the_frame() {
        let area: i32 = DecorPart::ALL
            .iter()
            .map(|part| {
                let size = part_geometry(*part, CONTENT).size;
                size.x * size.y
            })
            .sum();
        let frame = frame_size(CONTENT);
        assert_eq!(area + CONTENT.x * CONTENT.y, frame.x * frame.y);
    }

    #[test]
    fn test_caption_moves() {
        let region = region_at(DecorPart::Caption, PointF::new(300.0, 12.0), CONTENT);
        assert_eq!(region, HitRegion::Caption);
        assert_eq!(resize_edge(region), None);
    }

    #[test]
    fn test_corners_resize_diagonally() {
        assert_eq!(region_at(DecorPart::Left, PointF::new(1.0, 1.0), CONTENT), HitRegion::TopLeft);
        let bottom_right = PointF::new((CONTENT.x + 2 * BORDER_WIDTH - 1) as f32, 2.0);
        assert_eq!(region_at(DecorPart::Bottom, bottom_right, CONTENT), HitRegion::BottomRight);
        assert_eq!(resize_edge(HitRegion::BottomRight), Some(ResizeEdge::BottomRight));
    }

    #[test]
    fn test_side_borders_resize_horizontally() {
        assert_eq!(region_at(DecorPart::Left, PointF::new(2.0, 200.0), CONTENT), HitRegion::Left);
        assert_eq!(region_at(DecorPart::Right, PointF::new(2.0, 200.0), CONTENT), HitRegion::Right);
        let bottom = region_at(DecorPart::Bottom, PointF::new(300.0, 1.0), CONTENT);
        assert_eq!(bottom, HitRegion::Bottom);
    }

    #[test]
    fn test_fractional_positions_round_down() {
        assert_eq!(region_at(DecorPart::Left, PointF::new(3.9, 300.5), CONTENT), HitRegion::Left);
    }
}
