//! The two-phase xdg-shell configure sequence.
//!
//! `xdg_toplevel.configure` only proposes a size and a state set; nothing is
//! final until the `xdg_surface.configure` that follows it is acknowledged.
//! [`ConfigureTracker`] holds the proposal and hands out the committed
//! result, [`apply`] then reconciles it with the canonical state.

use awin_core::{EventDispatchRegistry, Point, WindowState};

const STATE_MAXIMIZED: u32 = 1;
const STATE_FULLSCREEN: u32 = 2;
const STATE_RESIZING: u32 = 3;
const STATE_ACTIVATED: u32 = 4;
const STATE_TILED_LEFT: u32 = 5;
const STATE_TILED_BOTTOM: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToplevelStates {
    pub maximized: bool,
    pub fullscreen: bool,
    pub resizing: bool,
    pub activated: bool,
    pub tiled: bool,
}

impl ToplevelStates {
    /// Decodes the `states` array: native-endian `u32` values.
    pub fn from_wire(raw: &[u8]) -> Self {
        raw.chunks_exact(4)
            .filter_map(|chunk| chunk.try_into().ok())
            .map(u32::from_ne_bytes)
            .fold(Self::default(), |mut states, value| {
                match value {
                    STATE_MAXIMIZED => states.maximized = true,
                    STATE_FULLSCREEN => states.fullscreen = true,
                    STATE_RESIZING => states.resizing = true,
                    STATE_ACTIVATED => states.activated = true,
                    STATE_TILED_LEFT..=STATE_TILED_BOTTOM => states.tiled = true,
                    _ => {}
                }
                states
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configure {
    /// `None` when the compositor leaves the size to the client.
    pub size: Option<Point>,
    pub states: ToplevelStates,
    /// First configure after the surface was (re)mapped.
    pub initial: bool,
}

#[derive(Debug, Default)]
pub struct ConfigureTracker {
    pending: Option<(Option<Point>, ToplevelStates)>,
    committed: Option<Configure>,
    awaiting_initial: bool,
}

impl ConfigureTracker {
    pub fn new() -> Self {
        Self {
            awaiting_initial: true,
            ..Self::default()
        }
    }

    /// The next committed configure counts as initial again, after an unmap.
    pub fn reset(&mut self) {
        self.pending = None;
        self.awaiting_initial = true;
    }

    pub fn toplevel(&mut self, width: i32, height: i32, states: ToplevelStates) {
        let size = (width > 0 && height > 0).then(|| Point::new(width, height));
        self.pending = Some((size, states));
    }

    /// `xdg_surface.configure`: the proposal becomes final. A surface
    /// configure without a toplevel one repeats the previous states.
    pub fn commit(&mut self) -> Configure {
        let (size, states) = self
            .pending
            .take()
            .unwrap_or_else(|| (None, self.committed.map(|c| c.states).unwrap_or_default()));
        let configure = Configure {
            size,
            states,
            initial: std::mem::take(&mut self.awaiting_initial),
        };
        self.committed = Some(configure);
        configure
    }

    pub fn last(&self) -> Option<Configure> {
        self.committed
    }
}

/// Reconciles a committed configure with the canonical state and returns
/// the size the client should draw at. Fullscreen first, then maximize, then
/// resize, matching the order the other backends report in.
pub fn apply(
    state: &mut WindowState,
    registry: &EventDispatchRegistry,
    configure: &Configure,
) -> Point {
    let states = configure.states;
    state.notify_fullscreen(states.fullscreen);
    state.notify_activated(states.activated);
    state.notify_snapped(states.tiled);
    state.notify_maximize(registry, states.maximized);

    let resizable = state.flags.contains(awin_core::WindowFlags::RESIZABLE);
    let size = match configure.size {
        // the compositor mandates the size in these states
        Some(size) if states.fullscreen || states.maximized || states.tiled => size,
        Some(size) if resizable => state.clamp_to_limit(size),
        _ => state.dimensions,
    };
    state.notify_resize(registry, size);
    if configure.initial {
        state.notify_visible(true);
    }
    size
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use awin_core::{Event, WindowConfig, WindowFlags, WindowId};

    use super::*;

    fn wire(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    fn recording() -> (EventDispatchRegistry, Rc<RefCell<Vec<Event>>>) {
        let registry = EventDispatchRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
            sink.borrow_mut().push(*event);
        }));
        (registry, log)
    }

    #[test]
    fn test_state_array_decoding() {
        let states = ToplevelStates::from_wire(&wire(&[STATE_ACTIVATED, STATE_MAXIMIZED, 99]));
        assert!(states.maximized && states.activated);
        assert!(!states.fullscreen && !states.tiled);
        assert!(ToplevelStates::from_wire(&wire(&[6])).tiled);
        // trailing partial value is ignored
        assert_eq!(ToplevelStates::from_wire(&[1, 0]), ToplevelStates::default());
    }

    #[test]
    fn test_nothing_is_final_before_the_surface_configure() {
        let mut tracker = ConfigureTracker::new();
        tracker.toplevel(800, 600, ToplevelStates::default());
        assert_eq!(tracker.last(), None);

        let first = tracker.commit();
        assert_eq!(first.size, Some(Point::new(800, 600)));
        assert!(first.initial);

        tracker.toplevel(0, 0, ToplevelStates::default());
        let second = tracker.commit();
        assert_eq!(second.size, None);
        assert!(!second.initial);
    }

    #[test]
    fn test_bare_surface_configure_keeps_states() {
        let mut tracker = ConfigureTracker::new();
        let maximized = ToplevelStates {
            maximized: true,
            ..ToplevelStates::default()
        };
        tracker.toplevel(1000, 700, maximized);
        tracker.commit();
        let repeat = tracker.commit();
        assert!(repeat.states.maximized);
        assert_eq!(repeat.size, None);
    }

    #[test]
    fn test_reset_marks_next_commit_initial() {
        let mut tracker = ConfigureTracker::new();
        tracker.commit();
        tracker.reset();
        assert!(tracker.commit().initial);
    }

    #[test]
    fn test_apply_orders_maximize_before_resize() {
        let (registry, log) = recording();
        let mut state = WindowState::new(WindowId(1), &WindowConfig::new("t", 640, 480));
        let configure = Configure {
            size: Some(Point::new(1920, 1050)),
            states: ToplevelStates {
                maximized: true,
                activated: true,
                ..ToplevelStates::default()
            },
            initial: true,
        };
        let size = apply(&mut state, &registry, &configure);

        assert_eq!(size, Point::new(1920, 1050));
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Maximize { state: true },
                Event::Resize {
                    size: Point::new(1920, 1050)
                },
            ]
        );
        assert!(state.flags.contains(WindowFlags::ACTIVATED));
        assert!(!state.is_hidden());
    }

    #[test]
    fn test_floating_size_respects_the_limit() {
        let (registry, _log) = recording();
        let config = WindowConfig::new("t", 640, 480).with_resize_limit(400, 300);
        let mut state = WindowState::new(WindowId(1), &config);
        let configure = Configure {
            size: Some(Point::new(200, 800)),
            states: ToplevelStates::default(),
            initial: false,
        };
        assert_eq!(apply(&mut state, &registry, &configure), Point::new(400, 800));
    }

    #[test]
    fn test_unsized_configure_keeps_current_size() {
        let (registry, log) = recording();
        let mut state = WindowState::new(WindowId(1), &WindowConfig::new("t", 640, 480));
        let configure = Configure {
            size: None,
            states: ToplevelStates::default(),
            initial: false,
        };
        assert_eq!(apply(&mut state, &registry, &configure), Point::new(640, 480));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_fixed_size_window_ignores_proposals() {
        let (registry, _log) = recording();
        let mut config = WindowConfig::new("t", 320, 200);
        config.resizable = false;
        let mut state = WindowState::new(WindowId(1), &config);
        let configure = Configure {
            size: Some(Point::new(900, 900)),
            states: ToplevelStates::default(),
            initial: false,
        };
        assert_eq!(apply(&mut state, &registry, &configure), Point::new(320, 200));
    }
}
