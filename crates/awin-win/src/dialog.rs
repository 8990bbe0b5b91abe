use std::ffi::c_void;
use std::mem::size_of;
use std::path::{Path, PathBuf};

use awin_platform::dialog::{DialogProvider, FileFilter, MessageButtons, MessageStyle, Selection};
use windows::core::{HSTRING, PCWSTR, PWSTR};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::CoTaskMemFree;
use windows::Win32::UI::Controls::Dialogs::{
    GetOpenFileNameW, GetSaveFileNameW, OFN_ALLOWMULTISELECT, OFN_EXPLORER, OFN_FILEMUSTEXIST,
    OFN_NOCHANGEDIR, OFN_OVERWRITEPROMPT, OPENFILENAMEW,
};
use windows::Win32::UI::Shell::{
    SHBrowseForFolderW, SHGetPathFromIDListW, BIF_NEWDIALOGSTYLE, BIF_RETURNONLYFSDIRS, BROWSEINFOW,
};
use windows::Win32::UI::WindowsAndMessaging::*;

const PATH_BUFFER: usize = 32 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Dialogs;

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// `name\0*.a;*.b\0...\0\0`
fn filter_string(filters: &[FileFilter]) -> Vec<u16> {
    let mut out = Vec::new();
    for filter in filters {
        out.extend(filter.name.encode_utf16());
        out.push(0);
        out.extend(filter.patterns.join(";").encode_utf16());
        out.push(0);
    }
    out.push(0);
    out
}

/// Splits the `dir\0a\0b\0\0` multi-select layout; a lone entry is a full path.
fn split_selection(buffer: &[u16]) -> Vec<PathBuf> {
    let parts: Vec<String> = buffer
        .split(|c| *c == 0)
        .take_while(|part| !part.is_empty())
        .map(String::from_utf16_lossy)
        .collect();
    match parts.as_slice() {
        [] => Vec::new(),
        [single] => vec![PathBuf::from(single)],
        [dir, files @ ..] => files.iter().map(|f| Path::new(dir).join(f)).collect(),
    }
}

impl Win32Dialogs {
    fn file_dialog(
        &self,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
        multi: bool,
        save: bool,
    ) -> Vec<PathBuf> {
        let title = wide(title);
        let filter = filter_string(filters);
        let initial_dir = default_path.map(|p| wide(&p.display().to_string()));
        let mut buffer = vec![0u16; PATH_BUFFER];

        let mut flags = OFN_EXPLORER | OFN_NOCHANGEDIR;
        if save {
            flags |= OFN_OVERWRITEPROMPT;
        } else {
            flags |= OFN_FILEMUSTEXIST;
            if multi {
                flags |= OFN_ALLOWMULTISELECT;
            }
        }
        let mut ofn = OPENFILENAMEW {
            lStructSize: size_of::<OPENFILENAMEW>() as u32,
            hwndOwner: HWND(std::ptr::null_mut()),
            lpstrFilter: if filters.is_empty() { PCWSTR::null() } else { PCWSTR(filter.as_ptr()) },
            lpstrFile: PWSTR(buffer.as_mut_ptr()),
            nMaxFile: buffer.len() as u32,
            lpstrTitle: PCWSTR(title.as_ptr()),
            lpstrInitialDir: initial_dir
                .as_ref()
                .map_or(PCWSTR::null(), |dir| PCWSTR(dir.as_ptr())),
            Flags: flags,
            ..Default::default()
        };
        let accepted = unsafe {
            if save {
                GetSaveFileNameW(&mut ofn).as_bool()
            } else {
                GetOpenFileNameW(&mut ofn).as_bool()
            }
        };
        if accepted {
            split_selection(&buffer)
        } else {
            Vec::new()
        }
    }
}

impl DialogProvider for Win32Dialogs {
    fn show_message(
        &self,
        text: &str,
        title: &str,
        style: MessageStyle,
        buttons: MessageButtons,
    ) -> Selection {
        let icon = match style {
            MessageStyle::Info => MB_ICONINFORMATION,
            MessageStyle::Warning => MB_ICONWARNING,
            MessageStyle::Error => MB_ICONERROR,
            MessageStyle::Question => MB_ICONQUESTION,
        };
        let kind = match buttons {
            MessageButtons::Ok => MB_OK,
            MessageButtons::OkCancel => MB_OKCANCEL,
            MessageButtons::YesNo => MB_YESNO,
            MessageButtons::YesNoCancel => MB_YESNOCANCEL,
        };
        let (text, title) = (HSTRING::from(text), HSTRING::from(title));
        let result = unsafe { MessageBoxW(None, &text, &title, icon | kind) };
        match result {
            IDOK => Selection::Ok,
            IDYES => Selection::Yes,
            IDNO => Selection::No,
            _ => Selection::Cancel,
        }
    }

    fn pick_file(
        &self,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
        multi: bool,
    ) -> Vec<PathBuf> {
        self.file_dialog(title, filters, default_path, multi, false)
    }

    fn pick_folder(&self, title: &str, _default_path: Option<&Path>) -> Option<PathBuf> {
        let title = wide(title);
        let info = BROWSEINFOW {
            lpszTitle: PCWSTR(title.as_ptr()),
            ulFlags: BIF_RETURNONLYFSDIRS | BIF_NEWDIALOGSTYLE,
            ..Default::default()
        };
        unsafe {
            let pidl = SHBrowseForFolderW(&info);
            if pidl.is_null() {
                return None;
            }
            let mut path = [0u16; 260];
            let found = SHGetPathFromIDListW(pidl, &mut path).as_bool();
            CoTaskMemFree(Some(pidl as *const c_void));
            found.then(|| split_selection(&path).into_iter().next()).flatten()
        }
    }

    fn pick_save_path(
        &self,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
    ) -> Option<PathBuf> {
        self.file_dialog(title, filters, default_path, false, true).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(parts: &[&str]) -> Vec<u16> {
        let mut out = Vec::new();
        for part in parts {
            out.extend(part.encode_utf16());
            out.push(0);
        }
        out.push(0);
        out
    }

    #[test]
    fn test_split_multi_selection() {
        let paths = split_selection(&utf16(&["C:\\pics", "a.png", "b.png"]));
        let dir = PathBuf::from("C:\\pics");
        assert_eq!(paths, vec![dir.join("a.png"), dir.join("b.png")]);
    }

    #[test]
    fn test_split_single_selection() {
        assert_eq!(split_selection(&utf16(&["C:\\a.txt"])), vec![PathBuf::from("C:\\a.txt")]);
        assert!(split_selection(&[0, 0]).is_empty());
    }
}
