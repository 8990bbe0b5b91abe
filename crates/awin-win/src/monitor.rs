use std::mem::size_of;

use awin_core::{Point, PointF};
use awin_platform::MonitorInfo;
use tracing::warn;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, EnumDisplaySettingsW, GetMonitorInfoW, MonitorFromWindow, DEVMODEW,
    ENUM_CURRENT_SETTINGS, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::UI::HiDpi::{GetDpiForMonitor, MDT_EFFECTIVE_DPI};

const MONITORINFOF_PRIMARY: u32 = 1;

unsafe fn describe_monitor(hmonitor: HMONITOR) -> Option<MonitorInfo> {
    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = size_of::<MONITORINFOEXW>() as u32;
    if !GetMonitorInfoW(hmonitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO).as_bool() {
        return None;
    }
    let rect = info.monitorInfo.rcMonitor;
    let size = Point::new(rect.right - rect.left, rect.bottom - rect.top);

    let mut dpi_x = 96u32;
    let mut dpi_y = 96u32;
    if let Err(err) = GetDpiForMonitor(hmonitor, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y) {
        warn!("GetDpiForMonitor failed for monitor {:?}: {err}", hmonitor.0);
        dpi_x = 96;
        dpi_y = 96;
    }

    let name_len = info.szDevice.iter().position(|c| *c == 0).unwrap_or(info.szDevice.len());
    let name = String::from_utf16_lossy(&info.szDevice[..name_len]);

    let mut mode = DEVMODEW {
        dmSize: size_of::<DEVMODEW>() as u16,
        ..Default::default()
    };
    let device = PCWSTR(info.szDevice.as_ptr());
    let refresh_hz = if EnumDisplaySettingsW(device, ENUM_CURRENT_SETTINGS, &mut mode).as_bool() {
        mode.dmDisplayFrequency as f32
    } else {
        0.0
    };

    let scale = PointF::new(dpi_x as f32, dpi_y as f32) / 96.0;
    Some(MonitorInfo {
        name,
        position: Point::new(rect.left, rect.top),
        size,
        physical_size_mm: (size.as_vec2() * 25.4 / (scale * 96.0)).as_ivec2(),
        scale,
        refresh_hz,
        primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
    })
}

pub(crate) fn enumerate_monitors() -> Vec<MonitorInfo> {
    unsafe extern "system" fn enum_proc(
        hmonitor: HMONITOR,
        _hdc: HDC,
        _lprc: *mut RECT,
        lparam: LPARAM,
    ) -> BOOL {
        let data_ptr = lparam.0 as *mut Vec<MonitorInfo>;
        if data_ptr.is_null() {
            return BOOL(0);
        }
        if let Some(monitor) = describe_monitor(hmonitor) {
            (*data_ptr).push(monitor);
        }
        BOOL(1)
    }

    let mut monitors: Vec<MonitorInfo> = Vec::new();
    let lparam = LPARAM(&mut monitors as *mut _ as isize);
    unsafe {
        if EnumDisplayMonitors(None, None, Some(enum_proc), lparam) == BOOL(0) {
            warn!("EnumDisplayMonitors failed: {}", windows::core::Error::from_win32());
        }
    }
    monitors
}

pub(crate) fn monitor_of(hwnd: HWND) -> Option<MonitorInfo> {
    unsafe { describe_monitor(MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST)) }
}
