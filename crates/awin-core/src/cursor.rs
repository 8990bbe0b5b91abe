//! Cursor descriptors. Backends resolve these into native handles.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::hit_test::HitRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorShape {
    Arrow,
    IBeam,
    Crosshair,
    Hand,
    ResizeEw,
    ResizeNs,
    ResizeNwse,
    ResizeNesw,
    ResizeAll,
    NotAllowed,
}

impl CursorShape {
    /// freedesktop cursor-spec name.
    pub fn theme_name(self) -> &'static str {
        match self {
            CursorShape::Arrow => "default",
            CursorShape::IBeam => "text",
            CursorShape::Crosshair => "crosshair",
            CursorShape::Hand => "pointer",
            CursorShape::ResizeEw => "ew-resize",
            CursorShape::ResizeNs => "ns-resize",
            CursorShape::ResizeNwse => "nwse-resize",
            CursorShape::ResizeNesw => "nesw-resize",
            CursorShape::ResizeAll => "all-scroll",
            CursorShape::NotAllowed => "not-allowed",
        }
    }

    /// Legacy X cursor-font name, tried when the theme lacks `theme_name`.
    pub fn fallback_name(self) -> &'static str {
        match self {
            CursorShape::Arrow => "left_ptr",
            CursorShape::IBeam => "xterm",
            CursorShape::Crosshair => "crosshair",
            CursorShape::Hand => "hand2",
            CursorShape::ResizeEw => "sb_h_double_arrow",
            CursorShape::ResizeNs => "sb_v_double_arrow",
            CursorShape::ResizeNwse => "bottom_right_corner",
            CursorShape::ResizeNesw => "bottom_left_corner",
            CursorShape::ResizeAll => "fleur",
            CursorShape::NotAllowed => "crossed_circle",
        }
    }

    /// Shape shown while hovering a decoration region.
    pub fn for_region(region: HitRegion) -> CursorShape {
        match region {
            HitRegion::Left | HitRegion::Right => CursorShape::ResizeEw,
            HitRegion::Top | HitRegion::Bottom => CursorShape::ResizeNs,
            HitRegion::TopLeft | HitRegion::BottomRight => CursorShape::ResizeNwse,
            HitRegion::TopRight | HitRegion::BottomLeft => CursorShape::ResizeNesw,
            HitRegion::Caption | HitRegion::None => CursorShape::Arrow,
        }
    }
}

/// Straight-alpha RGBA8 image with a hotspot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub size: Point,
    pub hotspot: Point,
    pub rgba: Vec<u8>,
}

impl CursorImage {
    pub fn new(size: Point, hotspot: Point, rgba: Vec<u8>) -> Option<Self> {
        let expected = (size.x.max(0) as usize) * (size.y.max(0) as usize) * 4;
        (size.x > 0 && size.y > 0 && rgba.len() == expected).then_some(Self { size, hotspot, rgba })
    }

    pub fn transparent(size: Point) -> Self {
        let len = (size.x.max(1) * size.y.max(1) * 4) as usize;
        Self {
            size: size.max(Point::ONE),
            hotspot: Point::ZERO,
            rgba: vec![0; len],
        }
    }

    /// Premultiplied ARGB words, the layout of X Render `ARGB32` and
    /// `wl_shm` `argb8888`.
    pub fn to_argb_premultiplied(&self) -> Vec<u32> {
        self.rgba
            .chunks_exact(4)
            .map(|px| {
                let a = px[3] as u32;
                let premul = |c: u8| (c as u32 * a + 127) / 255;
                (a << 24) | (premul(px[0]) << 16) | (premul(px[1]) << 8) | premul(px[2])
            })
            .collect()
    }

    /// Native-endian byte view of [`Self::to_argb_premultiplied`].
    pub fn argb_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice::<u32, u8>(&self.to_argb_premultiplied()).to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorSource {
    Standard(CursorShape),
    Image(CursorImage),
}

/// A resolved cursor. Named shapes are owned by the backend's theme; custom
/// images own their native handle. Windows only hold weak references.
#[derive(Debug)]
pub struct Cursor {
    source: CursorSource,
    handle: u64,
}

impl Cursor {
    pub fn from_native(source: CursorSource, handle: u64) -> Self {
        Self { source, handle }
    }

    pub fn source(&self) -> &CursorSource {
        &self.source
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn valid(&self) -> bool {
        self.handle != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_shapes_fall_back_to_cursor_font_names() {
        assert_eq!(CursorShape::ResizeEw.theme_name(), "ew-resize");
        assert_eq!(CursorShape::ResizeEw.fallback_name(), "sb_h_double_arrow");
        assert_eq!(CursorShape::for_region(HitRegion::Right), CursorShape::ResizeEw);
        assert_eq!(CursorShape::for_region(HitRegion::TopRight), CursorShape::ResizeNesw);
    }

    #[test]
    fn test_image_requires_matching_buffer() {
        assert!(CursorImage::new(Point::new(2, 2), Point::ZERO, vec![0; 16]).is_some());
        assert!(CursorImage::new(Point::new(2, 2), Point::ZERO, vec![0; 15]).is_none());
        assert!(CursorImage::new(Point::new(0, 2), Point::ZERO, vec![]).is_none());
    }

    #[test]
    fn test_premultiplied_argb() {
        let pixels = vec![255, 0, 0, 255, 255, 255, 255, 0];
        let image = CursorImage::new(Point::new(2, 1), Point::ZERO, pixels).unwrap();
        assert_eq!(image.to_argb_premultiplied(), vec![0xffff_0000, 0x0000_0000]);
        assert_eq!(image.argb_bytes().len(), 8);
    }

    #[test]
    fn test_hidden_cursor_image_is_one_transparent_pixel() {
        let image = CursorImage::transparent(Point::ONE);
        assert_eq!(image.size, Point::ONE);
        assert_eq!(image.to_argb_premultiplied(), vec![0]);
    }

    #[test]
    fn test_zero_handle_is_invalid() {
        let cursor = Cursor::from_native(CursorSource::Standard(CursorShape::Arrow), 0);
        assert!(!cursor.valid());
        assert!(Cursor::from_native(CursorSource::Standard(CursorShape::Hand), 9).valid());
    }
}
