//! Window manager state as reported through `_NET_WM_STATE` and the ICCCM
//! `WM_STATE` property, reconciled into the canonical flags.

use awin_core::{EventDispatchRegistry, WindowState};

use crate::selection::Atom;

pub const ICONIC_STATE: u32 = 3;
pub const NORMAL_STATE: u32 = 1;

/// `_NET_WM_STATE` client message actions.
pub const NET_WM_STATE_REMOVE: u32 = 0;
pub const NET_WM_STATE_ADD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetWmAtoms {
    pub fullscreen: Atom,
    pub maximized_vert: Atom,
    pub maximized_horz: Atom,
    pub hidden: Atom,
}

/// What the window manager last confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WmSnapshot {
    pub fullscreen: bool,
    pub maximized: bool,
    pub minimized: bool,
}

impl WmSnapshot {
    /// `net_state` is the atom list of `_NET_WM_STATE`; `wm_state` the first
    /// word of `WM_STATE`, if the property exists.
    pub fn from_properties(atoms: &NetWmAtoms, net_state: &[Atom], wm_state: Option<u32>) -> Self {
        let has = |atom: Atom| net_state.contains(&atom);
        Self {
            fullscreen: has(atoms.fullscreen),
            // half-maximized is tiling, not maximized
            maximized: has(atoms.maximized_vert) && has(atoms.maximized_horz),
            minimized: wm_state == Some(ICONIC_STATE) || has(atoms.hidden),
        }
    }
}

/// Applies a confirmed snapshot. Minimize is reported before maximize, and
/// only changes produce events.
pub fn reconcile(state: &mut WindowState, registry: &EventDispatchRegistry, snapshot: WmSnapshot) {
    state.notify_fullscreen(snapshot.fullscreen);
    state.notify_minimize(registry, snapshot.minimized);
    state.notify_maximize(registry, snapshot.maximized);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use awin_core::{Event, WindowConfig, WindowId};

    use super::*;

    const ATOMS: NetWmAtoms = NetWmAtoms {
        fullscreen: 10,
        maximized_vert: 11,
        maximized_horz: 12,
        hidden: 13,
    };

    fn recorder(registry: &EventDispatchRegistry) -> Rc<RefCell<Vec<Event>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
            sink.borrow_mut().push(*event);
        }));
        events
    }

    #[test]
    fn test_snapshot_parsing() {
        let snap = WmSnapshot::from_properties(&ATOMS, &[11, 12], Some(NORMAL_STATE));
        assert_eq!(snap, WmSnapshot { fullscreen: false, maximized: true, minimized: false });

        let snap = WmSnapshot::from_properties(&ATOMS, &[11], None);
        assert!(!snap.maximized);

        let snap = WmSnapshot::from_properties(&ATOMS, &[10], Some(ICONIC_STATE));
        assert!(snap.fullscreen && snap.minimized);

        let snap = WmSnapshot::from_properties(&ATOMS, &[13], Some(NORMAL_STATE));
        assert!(snap.minimized);
    }

    #[test]
    fn test_fullscreen_only_after_confirmation() {
        let registry = EventDispatchRegistry::new();
        let mut state = WindowState::new(WindowId(1), &WindowConfig::default());
        assert!(!state.is_fullscreen());

        reconcile(&mut state, &registry, WmSnapshot { fullscreen: true, ..Default::default() });
        assert!(state.is_fullscreen());
        reconcile(&mut state, &registry, WmSnapshot::default());
        assert!(!state.is_fullscreen());
    }

    #[test]
    fn test_minimize_reported_before_maximize() {
        let registry = EventDispatchRegistry::new();
        let events = recorder(&registry);
        let mut state = WindowState::new(WindowId(1), &WindowConfig::default());

        let snapshot = WmSnapshot {
            fullscreen: false,
            maximized: true,
            minimized: true,
        };
        reconcile(&mut state, &registry, snapshot);
        reconcile(&mut state, &registry, snapshot);

        let events = events.borrow();
        assert_eq!(
            *events,
            vec![Event::Minimize { state: true }, Event::Maximize { state: true }]
        );
    }
}
