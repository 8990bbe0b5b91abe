use std::ffi::c_void;

use awin_core::{CursorImage, CursorShape};
use awin_platform::{PlatformError, Result};
use windows::core::PCWSTR;
use windows::Win32::Graphics::Gdi::{CreateBitmap, DeleteObject, HGDIOBJ};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateIconIndirect, DestroyIcon, LoadCursorW, HCURSOR, HICON, ICONINFO, IDC_ARROW, IDC_CROSS,
    IDC_HAND, IDC_IBEAM, IDC_NO, IDC_SIZEALL, IDC_SIZENESW, IDC_SIZENS, IDC_SIZENWSE, IDC_SIZEWE,
};

fn shape_id(shape: CursorShape) -> PCWSTR {
    match shape {
        CursorShape::Arrow => IDC_ARROW,
        CursorShape::IBeam => IDC_IBEAM,
        CursorShape::Crosshair => IDC_CROSS,
        CursorShape::Hand => IDC_HAND,
        CursorShape::ResizeEw => IDC_SIZEWE,
        CursorShape::ResizeNs => IDC_SIZENS,
        CursorShape::ResizeNwse => IDC_SIZENWSE,
        CursorShape::ResizeNesw => IDC_SIZENESW,
        CursorShape::ResizeAll => IDC_SIZEALL,
        CursorShape::NotAllowed => IDC_NO,
    }
}

/// Shared system cursor; never destroyed.
pub(crate) fn standard_cursor(shape: CursorShape) -> Result<HCURSOR> {
    unsafe { LoadCursorW(None, shape_id(shape)) }
        .map_err(|err| PlatformError::Connection(format!("LoadCursorW: {err}")))
}

/// Owned cursor built from RGBA pixels. Release with [`destroy_image_cursor`].
pub(crate) fn image_cursor(image: &CursorImage) -> Result<HCURSOR> {
    // 32bpp icon bitmaps take straight-alpha BGRA
    let bgra: Vec<u32> = image
        .rgba
        .chunks_exact(4)
        .map(|px| (px[3] as u32) << 24 | (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32)
        .collect();
    unsafe {
        let bits = bgra.as_ptr() as *const c_void;
        let color = CreateBitmap(image.size.x, image.size.y, 1, 32, Some(bits));
        let mask = CreateBitmap(image.size.x, image.size.y, 1, 1, None);
        let info = ICONINFO {
            fIcon: false.into(),
            xHotspot: image.hotspot.x.max(0) as u32,
            yHotspot: image.hotspot.y.max(0) as u32,
            hbmMask: mask,
            hbmColor: color,
        };
        let icon = CreateIconIndirect(&info);
        let _ = DeleteObject(HGDIOBJ(color.0));
        let _ = DeleteObject(HGDIOBJ(mask.0));
        icon.map(|icon| HCURSOR(icon.0))
            .map_err(|err| PlatformError::Connection(format!("CreateIconIndirect: {err}")))
    }
}

pub(crate) fn destroy_image_cursor(handle: u64) {
    if let Err(err) = unsafe { DestroyIcon(HICON(handle as usize as *mut c_void)) } {
        tracing::warn!("DestroyIcon failed: {err}");
    }
}
