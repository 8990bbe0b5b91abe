use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, error};
use windows::Win32::Foundation::{HANDLE, HGLOBAL, HWND};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, GetClipboardData, OpenClipboard, SetClipboardData,
};
use windows::Win32::System::Memory::{
    GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock, GMEM_MOVEABLE,
};

const CF_UNICODETEXT: u32 = 13;
const OPEN_ATTEMPTS: u32 = 3;

/// Another process may hold the clipboard for a moment.
fn open_clipboard(hwnd: HWND) -> bool {
    for attempt in 1..=OPEN_ATTEMPTS {
        match unsafe { OpenClipboard(hwnd) } {
            Ok(()) => return true,
            Err(err) => {
                debug!(attempt, "OpenClipboard busy: {err}");
                sleep(Duration::from_millis(1));
            }
        }
    }
    error!("failed to open the clipboard after {OPEN_ATTEMPTS} attempts");
    false
}

pub(crate) fn set_text(hwnd: HWND, text: &str) {
    let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    let bytes = wide.len() * std::mem::size_of::<u16>();
    unsafe {
        let memory = match GlobalAlloc(GMEM_MOVEABLE, bytes) {
            Ok(memory) => memory,
            Err(err) => {
                error!("failed to allocate clipboard memory: {err}");
                return;
            }
        };
        let target = GlobalLock(memory) as *mut u16;
        if target.is_null() {
            error!("failed to lock clipboard memory");
            let _ = GlobalFree(memory);
            return;
        }
        std::ptr::copy_nonoverlapping(wide.as_ptr(), target, wide.len());
        let _ = GlobalUnlock(memory);

        if !open_clipboard(hwnd) {
            let _ = GlobalFree(memory);
            return;
        }
        let _ = EmptyClipboard();
        if let Err(err) = SetClipboardData(CF_UNICODETEXT, HANDLE(memory.0)) {
            error!("failed to set clipboard data: {err}");
            let _ = GlobalFree(memory);
        }
        let _ = CloseClipboard();
    }
}

pub(crate) fn get_text(hwnd: HWND) -> String {
    if !open_clipboard(hwnd) {
        return String::new();
    }
    let text = unsafe {
        match GetClipboardData(CF_UNICODETEXT) {
            Ok(handle) => {
                let memory = HGLOBAL(handle.0);
                let source = GlobalLock(memory) as *const u16;
                if source.is_null() {
                    error!("failed to lock clipboard data");
                    String::new()
                } else {
                    let mut len = 0;
                    while *source.add(len) != 0 {
                        len += 1;
                    }
                    let text = String::from_utf16_lossy(std::slice::from_raw_parts(source, len));
                    let _ = GlobalUnlock(memory);
                    text
                }
            }
            Err(err) => {
                error!("clipboard has no text: {err}");
                String::new()
            }
        }
    };
    let _ = unsafe { CloseClipboard() };
    text
}
