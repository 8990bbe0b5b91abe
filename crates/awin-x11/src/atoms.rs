use x11rb::atom_manager;

use crate::selection::SelectionAtoms;
use crate::wm_state::NetWmAtoms;

atom_manager! {
    pub Atoms: AtomsCookie {
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_STATE,
        WM_CHANGE_STATE,
        _NET_WM_PING,
        _NET_WM_PID,
        _NET_WM_NAME,
        _NET_WM_ICON_NAME,
        _NET_WM_STATE,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_STATE_MAXIMIZED_VERT,
        _NET_WM_STATE_MAXIMIZED_HORZ,
        _NET_WM_STATE_HIDDEN,
        _NET_ACTIVE_WINDOW,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _MOTIF_WM_HINTS,
        UTF8_STRING,
        CLIPBOARD,
        CLIPBOARD_MANAGER,
        SAVE_TARGETS,
        TARGETS,
        MULTIPLE,
        INCR,
        ATOM_PAIR,
        NULL,
        AWIN_SELECTION,
    }
}

impl Atoms {
    pub fn selection(&self) -> SelectionAtoms {
        SelectionAtoms {
            targets: self.TARGETS,
            multiple: self.MULTIPLE,
            utf8_string: self.UTF8_STRING,
            string: u32::from(x11rb::protocol::xproto::AtomEnum::STRING),
            save_targets: self.SAVE_TARGETS,
            incr: self.INCR,
            atom: u32::from(x11rb::protocol::xproto::AtomEnum::ATOM),
            atom_pair: self.ATOM_PAIR,
            null: self.NULL,
        }
    }

    pub fn net_wm(&self) -> NetWmAtoms {
        NetWmAtoms {
            fullscreen: self._NET_WM_STATE_FULLSCREEN,
            maximized_vert: self._NET_WM_STATE_MAXIMIZED_VERT,
            maximized_horz: self._NET_WM_STATE_MAXIMIZED_HORZ,
            hidden: self._NET_WM_STATE_HIDDEN,
        }
    }
}
