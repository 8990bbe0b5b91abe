//! Message boxes and file pickers.
//!
//! Linux shells out to `zenity` or `kdialog`; Windows provides its own
//! implementation in `awin-win`. Cancellation and a missing tool both come
//! back as the empty result.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStyle {
    Info,
    Warning,
    Error,
    Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageButtons {
    Ok,
    OkCancel,
    YesNo,
    YesNoCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Ok,
    Yes,
    No,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub name: String,
    /// Glob patterns such as `*.png`.
    pub patterns: Vec<String>,
}

pub trait DialogProvider {
    fn show_message(
        &self,
        text: &str,
        title: &str,
        style: MessageStyle,
        buttons: MessageButtons,
    ) -> Selection;
    fn pick_file(
        &self,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
        multi: bool,
    ) -> Vec<PathBuf>;
    fn pick_folder(&self, title: &str, default_path: Option<&Path>) -> Option<PathBuf>;
    fn pick_save_path(
        &self,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
    ) -> Option<PathBuf>;
}

/// Used when no dialog backend exists. Every dialog is cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDialogs;

impl DialogProvider for NullDialogs {
    fn show_message(
        &self,
        _text: &str,
        _title: &str,
        _style: MessageStyle,
        _buttons: MessageButtons,
    ) -> Selection {
        Selection::Cancel
    }

    fn pick_file(
        &self,
        _title: &str,
        _filters: &[FileFilter],
        _default_path: Option<&Path>,
        _multi: bool,
    ) -> Vec<PathBuf> {
        Vec::new()
    }

    fn pick_folder(&self, _title: &str, _default_path: Option<&Path>) -> Option<PathBuf> {
        None
    }

    fn pick_save_path(
        &self,
        _title: &str,
        _filters: &[FileFilter],
        _default_path: Option<&Path>,
    ) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogTool {
    Zenity,
    KDialog,
}

impl DialogTool {
    fn program(self) -> &'static str {
        match self {
            DialogTool::Zenity => "zenity",
            DialogTool::KDialog => "kdialog",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubprocessDialogs {
    tool: DialogTool,
}

/// Picks the first dialog tool found on `PATH`, KDE sessions preferring kdialog.
pub fn detect_dialogs() -> Box<dyn DialogProvider> {
    let on_path = |program: &str| {
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    };
    let kde = std::env::var("XDG_CURRENT_DESKTOP").is_ok_and(|d| d.contains("KDE"));
    let order = if kde {
        [DialogTool::KDialog, DialogTool::Zenity]
    } else {
        [DialogTool::Zenity, DialogTool::KDialog]
    };
    match order.into_iter().find(|tool| on_path(tool.program())) {
        Some(tool) => {
            debug!(?tool, "dialog provider");
            Box::new(SubprocessDialogs { tool })
        }
        None => {
            warn!("neither zenity nor kdialog found, dialogs disabled");
            Box::new(NullDialogs)
        }
    }
}

impl SubprocessDialogs {
    pub fn new(tool: DialogTool) -> Self {
        Self { tool }
    }

    fn run(&self, args: Vec<String>) -> Option<(i32, String)> {
        match Command::new(self.tool.program()).args(&args).output() {
            Ok(output) => Some((
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stdout).into_owned(),
            )),
            Err(err) => {
                warn!(tool = self.tool.program(), %err, "dialog failed to start");
                None
            }
        }
    }

    fn message_args(
        &self,
        text: &str,
        title: &str,
        style: MessageStyle,
        buttons: MessageButtons,
    ) -> Vec<String> {
        match self.tool {
            DialogTool::Zenity => {
                let kind = match (buttons, style) {
                    (MessageButtons::Ok, MessageStyle::Info | MessageStyle::Question) => "--info",
                    (MessageButtons::Ok, MessageStyle::Warning) => "--warning",
                    (MessageButtons::Ok, MessageStyle::Error) => "--error",
                    _ => "--question",
                };
                let mut args =
                    vec![kind.to_owned(), format!("--title={title}"), format!("--text={text}")];
                match buttons {
                    MessageButtons::OkCancel => {
                        args.extend(["--ok-label=OK", "--cancel-label=Cancel"].map(str::to_owned))
                    }
                    MessageButtons::YesNo => {
                        args.extend(["--ok-label=Yes", "--cancel-label=No"].map(str::to_owned))
                    }
                    MessageButtons::YesNoCancel => args.extend([
                        "--ok-label=Yes".to_owned(),
                        "--cancel-label=No".to_owned(),
                        "--extra-button=Cancel".to_owned(),
                    ]),
                    MessageButtons::Ok => {}
                }
                args
            }
            DialogTool::KDialog => {
                let kind = match (buttons, style) {
                    (MessageButtons::Ok, MessageStyle::Warning) => "--sorry",
                    (MessageButtons::Ok, MessageStyle::Error) => "--error",
                    (MessageButtons::Ok, _) => "--msgbox",
                    (MessageButtons::OkCancel, _) => "--warningcontinuecancel",
                    (MessageButtons::YesNo, _) => "--yesno",
                    (MessageButtons::YesNoCancel, _) => "--yesnocancel",
                };
                vec![kind.to_owned(), text.to_owned(), "--title".to_owned(), title.to_owned()]
            }
        }
    }

    fn filter_args(&self, filters: &[FileFilter]) -> Vec<String> {
        match self.tool {
            DialogTool::Zenity => filters
                .iter()
                .map(|f| format!("--file-filter={} | {}", f.name, f.patterns.join(" ")))
                .collect(),
            DialogTool::KDialog if filters.is_empty() => Vec::new(),
            DialogTool::KDialog => vec![filters
                .iter()
                .map(|f| format!("{} ({})", f.name, f.patterns.join(" ")))
                .collect::<Vec<_>>()
                .join("|")],
        }
    }

    fn file_args(
        &self,
        mode: FileMode,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
        multi: bool,
    ) -> Vec<String> {
        let default = default_path.map(|p| p.display().to_string());
        match self.tool {
            DialogTool::Zenity => {
                let mut args = vec!["--file-selection".to_owned(), format!("--title={title}")];
                match mode {
                    FileMode::Open if multi => {
                        args.extend(["--multiple", "--separator=\n"].map(str::to_owned))
                    }
                    FileMode::Open => {}
                    FileMode::Folder => args.push("--directory".to_owned()),
                    FileMode::Save => {
                        args.extend(["--save", "--confirm-overwrite"].map(str::to_owned))
                    }
                }
                if let Some(default) = default {
                    args.push(format!("--filename={default}"));
                }
                if mode != FileMode::Folder {
                    args.extend(self.filter_args(filters));
                }
                args
            }
            DialogTool::KDialog => {
                let flag = match mode {
                    FileMode::Open => "--getopenfilename",
                    FileMode::Folder => "--getexistingdirectory",
                    FileMode::Save => "--getsavefilename",
                };
                let mut args = vec![flag.to_owned(), default.unwrap_or_else(|| ".".to_owned())];
                if mode != FileMode::Folder {
                    args.extend(self.filter_args(filters));
                }
                if mode == FileMode::Open && multi {
                    args.extend(["--multiple".to_owned(), "--separate-output".to_owned()]);
                }
                args.extend(["--title".to_owned(), title.to_owned()]);
                args
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Open,
    Folder,
    Save,
}

fn parse_paths(stdout: &str) -> Vec<PathBuf> {
    stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(PathBuf::from).collect()
}

impl DialogProvider for SubprocessDialogs {
    fn show_message(
        &self,
        text: &str,
        title: &str,
        style: MessageStyle,
        buttons: MessageButtons,
    ) -> Selection {
        let Some((code, stdout)) = self.run(self.message_args(text, title, style, buttons)) else {
            return Selection::Cancel;
        };
        match (buttons, code) {
            (MessageButtons::Ok, 0) => Selection::Ok,
            (MessageButtons::OkCancel, 0) => Selection::Ok,
            (MessageButtons::YesNo | MessageButtons::YesNoCancel, 0) => Selection::Yes,
            (MessageButtons::YesNoCancel, 1) if stdout.trim() == "Cancel" => Selection::Cancel,
            (MessageButtons::YesNo | MessageButtons::YesNoCancel, 1) => Selection::No,
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
        match self.run(self.file_args(FileMode::Open, title, filters, default_path, multi)) {
            Some((0, stdout)) => parse_paths(&stdout),
            _ => Vec::new(),
        }
    }

    fn pick_folder(&self, title: &str, default_path: Option<&Path>) -> Option<PathBuf> {
        match self.run(self.file_args(FileMode::Folder, title, &[], default_path, false)) {
            Some((0, stdout)) => parse_paths(&stdout).into_iter().next(),
            _ => None,
        }
    }

    fn pick_save_path(
        &self,
        title: &str,
        filters: &[FileFilter],
        default_path: Option<&Path>,
    ) -> Option<PathBuf> {
        match self.run(self.file_args(FileMode::Save, title, filters, default_path, false)) {
            Some((0, stdout)) => parse_paths(&stdout).into_iter().next(),
            _ => None,
        }
    }
}
