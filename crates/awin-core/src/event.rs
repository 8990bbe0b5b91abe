//! Canonical, backend-independent events.

use serde::{Deserialize, Serialize};

use crate::flags::Mods;
use crate::geometry::Point;
use crate::key::{Action, Key, MouseButton};

/// Stable identity of a window for the lifetime of its backend resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Focus { focused: bool },
    CharInput { codepoint: u32 },
    KeyInput { key: Key, action: Action, mods: Mods },
    MouseClick { button: MouseButton, action: Action },
    MouseEnter { entered: bool },
    /// Relative motion, raw input only.
    MouseMove { delta: Point },
    MouseMoveAbs { pos: Point },
    Scroll { h: f32, v: f32 },
    Resize { size: Point },
    Move { pos: Point },
    Minimize { state: bool },
    Maximize { state: bool },
    DpiChanged { x: f32, y: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Focus,
    CharInput,
    KeyInput,
    MouseClick,
    MouseEnter,
    MouseMove,
    MouseMoveAbs,
    Scroll,
    Resize,
    Move,
    Minimize,
    Maximize,
    DpiChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::Focus,
        EventKind::CharInput,
        EventKind::KeyInput,
        EventKind::MouseClick,
        EventKind::MouseEnter,
        EventKind::MouseMove,
        EventKind::MouseMoveAbs,
        EventKind::Scroll,
        EventKind::Resize,
        EventKind::Move,
        EventKind::Minimize,
        EventKind::Maximize,
        EventKind::DpiChanged,
    ];
    pub const COUNT: usize = Self::ALL.len();

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Focus { .. } => EventKind::Focus,
            Event::CharInput { .. } => EventKind::CharInput,
            Event::KeyInput { .. } => EventKind::KeyInput,
            Event::MouseClick { .. } => EventKind::MouseClick,
            Event::MouseEnter { .. } => EventKind::MouseEnter,
            Event::MouseMove { .. } => EventKind::MouseMove,
            Event::MouseMoveAbs { .. } => EventKind::MouseMoveAbs,
            Event::Scroll { .. } => EventKind::Scroll,
            Event::Resize { .. } => EventKind::Resize,
            Event::Move { .. } => EventKind::Move,
            Event::Minimize { .. } => EventKind::Minimize,
            Event::Maximize { .. } => EventKind::Maximize,
            Event::DpiChanged { .. } => EventKind::DpiChanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_are_dense() {
        for (index, kind) in EventKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), index);
        }
    }

    #[test]
    fn test_event_reports_its_kind() {
        assert_eq!(Event::Resize { size: Point::new(1, 2) }.kind(), EventKind::Resize);
        assert_eq!(Event::DpiChanged { x: 1.0, y: 1.0 }.kind(), EventKind::DpiChanged);
    }
}
