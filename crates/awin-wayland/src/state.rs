//! State shared by every protocol handler. The handlers in `dispatch` decode
//! wire events and call into the routing helpers here, which resolve the
//! target window and feed the translator.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use awin_core::{
    CursorShape, EventDispatchRegistry, HitRegion, Mods, Point, PointF, WindowFlags, WindowId,
};
use awin_platform::xkb::{ModIndices, XkbCompose, XkbContext, XkbKeymap, XkbState};
use awin_platform::MonitorInfo;
use tracing::{debug, trace};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_data_device::WlDataDevice;
use wayland_client::protocol::wl_data_device_manager::WlDataDeviceManager;
use wayland_client::protocol::wl_data_offer::WlDataOffer;
use wayland_client::protocol::wl_data_source::WlDataSource;
use wayland_client::protocol::wl_keyboard::WlKeyboard;
use wayland_client::protocol::wl_output::WlOutput;
use wayland_client::protocol::wl_pointer::WlPointer;
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_subcompositor::WlSubcompositor;
use wayland_client::QueueHandle;
use wayland_protocols::wp::fractional_scale::v1::client::{
    wp_fractional_scale_manager_v1::WpFractionalScaleManagerV1,
};
use wayland_protocols::wp::relative_pointer::zv1::client::{
    zwp_relative_pointer_manager_v1::ZwpRelativePointerManagerV1,
    zwp_relative_pointer_v1::ZwpRelativePointerV1,
};
use wayland_protocols::wp::viewporter::client::wp_viewporter::WpViewporter;
use wayland_protocols::xdg::activation::v1::client::xdg_activation_v1::XdgActivationV1;
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

use crate::cursor::{CursorChoice, CursorManager};
use crate::decor::{self, DecorPart};
use crate::keymap::{scancode_to_key, XKB_KEYCODE_OFFSET};
use crate::repeat::KeyRepeat;
use crate::translate::{handle_notification, Notification, BTN_LEFT, BTN_RIGHT};
use crate::window::WaylandWindow;

pub struct Globals {
    pub compositor: WlCompositor,
    pub subcompositor: Option<WlSubcompositor>,
    pub shm: WlShm,
    pub wm_base: XdgWmBase,
    pub seat: Option<WlSeat>,
    pub data_device_manager: Option<WlDataDeviceManager>,
    pub decoration_manager: Option<ZxdgDecorationManagerV1>,
    pub fractional_scale: Option<WpFractionalScaleManagerV1>,
    pub viewporter: Option<WpViewporter>,
    pub relative_pointer: Option<ZwpRelativePointerManagerV1>,
    pub activation: Option<XdgActivationV1>,
}

/// User data of every `wl_surface`, naming what the surface is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Content(WindowId),
    Decoration(WindowId, DecorPart),
    Cursor,
}

pub struct Output {
    pub proxy: WlOutput,
    pub info: MonitorInfo,
    pub scale: i32,
}

#[derive(Default)]
pub struct Seat {
    pub pointer: Option<WlPointer>,
    pub keyboard: Option<WlKeyboard>,
    pub data_device: Option<WlDataDevice>,
    pub relative: Option<ZwpRelativePointerV1>,
    /// Latest input serial, quoted by requests that need user interaction.
    pub serial: u32,
}

#[derive(Default)]
pub struct Pointer {
    pub focus: Option<SurfaceRole>,
    pub pos: PointF,
    /// Decoration region under the pointer, while over a decoration.
    pub region: Option<HitRegion>,
}

pub struct Keyboard {
    context: XkbContext,
    keymap: Option<XkbKeymap>,
    state: Option<XkbState>,
    indices: Option<ModIndices>,
    compose: Option<XkbCompose>,
    pub mods: Mods,
    pub focus: Option<WindowId>,
}

impl Keyboard {
    pub fn new(context: XkbContext) -> Self {
        let compose = context.compose_state();
        Self {
            context,
            keymap: None,
            state: None,
            indices: None,
            compose,
            mods: Mods::empty(),
            focus: None,
        }
    }

    pub fn load_keymap(&mut self, text: &str) {
        let Some(keymap) = self.context.keymap_from_string(text) else {
            return;
        };
        self.state = keymap.new_state();
        self.indices = Some(keymap.mod_indices());
        self.keymap = Some(keymap);
        debug!("compositor keymap loaded");
    }

    pub fn update_mods(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        let (Some(state), Some(indices)) = (self.state.as_mut(), self.indices.as_ref()) else {
            return;
        };
        state.update_mask(depressed, latched, locked, group);
        self.mods = state.mods(indices);
    }

    fn repeats(&self, scancode: u32) -> bool {
        self.keymap
            .as_ref()
            .is_some_and(|keymap| keymap.key_repeats(scancode + XKB_KEYCODE_OFFSET))
    }

    /// Text a press of `scancode` produces, after composition.
    fn text(&mut self, scancode: u32) -> Option<u32> {
        let state = self.state.as_ref()?;
        let mut sym = state.key_sym(scancode + XKB_KEYCODE_OFFSET);
        if let Some(compose) = self.compose.as_mut() {
            sym = compose.feed(sym)?;
        }
        let codepoint = self.context.lib().keysym_to_utf32(sym);
        (codepoint != 0).then_some(codepoint)
    }
}

#[derive(Default)]
pub struct Clipboard {
    /// Our own selection while we own it.
    pub source: Option<WlDataSource>,
    pub text: String,
    /// The compositor's current selection offer.
    pub selection: Option<WlDataOffer>,
}

pub struct WaylandState {
    pub globals: Globals,
    pub qh: QueueHandle<WaylandState>,
    pub registry: Rc<EventDispatchRegistry>,
    pub windows: HashMap<WindowId, WaylandWindow>,
    /// Keyed by registry global name.
    pub outputs: HashMap<u32, Output>,
    pub seat: Seat,
    pub pointer: Pointer,
    pub keyboard: Keyboard,
    pub repeat: KeyRepeat,
    pub cursors: CursorManager,
    pub clipboard: Clipboard,
}

impl WaylandState {
    pub fn notify(&mut self, id: WindowId, notification: Notification) -> Option<Point> {
        let Some(window) = self.windows.get_mut(&id) else {
            trace!(window = ?id, "notification for a destroyed window");
            return None;
        };
        handle_notification(&mut window.state, &mut window.input, &self.registry, &notification)
    }

    /// `xdg_surface.configure`: commits the pending toplevel proposal and
    /// redraws at the resulting size.
    pub fn configure(&mut self, id: WindowId) {
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        let mut configure = window.configure.commit();
        let fullscreen = configure.states.fullscreen;
        configure.size = configure.size.map(|size| window.content_size(size, fullscreen));
        window.mapped = true;
        handle_notification(
            &mut window.state,
            &mut window.input,
            &self.registry,
            &Notification::Configure(configure),
        );
        window.sync_decorations(&self.globals, &self.qh);
        window.redraw(&self.globals, &self.qh);
        if configure.initial {
            debug!(window = ?id, size = ?window.state.dimensions, "window mapped");
        }
    }

    pub fn redraw(&mut self, id: WindowId) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.redraw(&self.globals, &self.qh);
        }
    }

    /// Re-evaluates the integer scale after the surface entered or left an
    /// output, or an output changed its scale. Fractional scaling reports on
    /// its own.
    pub fn update_output_scale(&mut self, id: WindowId) {
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        if window.fractional.is_some() {
            return;
        }
        let scale = window
            .outputs
            .iter()
            .filter_map(|entered| self.outputs.values().find(|output| output.proxy == *entered))
            .map(|output| output.scale)
            .max()
            .unwrap_or(1)
            .max(1);
        if scale == window.buffer_scale {
            return;
        }
        window.buffer_scale = scale;
        handle_notification(
            &mut window.state,
            &mut window.input,
            &self.registry,
            &Notification::Scale(scale as f32),
        );
        window.redraw(&self.globals, &self.qh);
    }

    pub fn key(&mut self, scancode: u32, pressed: bool, now: Instant) {
        let Some(id) = self.keyboard.focus else {
            return;
        };
        let codepoint = if pressed { self.keyboard.text(scancode) } else { None };
        if pressed {
            let repeats = self.keyboard.repeats(scancode);
            self.repeat.press(scancode, repeats, now);
        } else {
            self.repeat.release(scancode);
        }
        let notification = Notification::Key {
            key: scancode_to_key(scancode),
            pressed,
            mods: self.keyboard.mods,
            codepoint,
        };
        self.notify(id, notification);
    }

    /// Emits the synthetic presses of a held key whose repeat fell due.
    pub fn fire_repeats(&mut self, now: Instant) {
        let Some((scancode, count)) = self.repeat.due(now) else {
            return;
        };
        let Some(id) = self.keyboard.focus else {
            self.repeat.cancel();
            return;
        };
        trace!(scancode, count, "key repeat");
        for _ in 0..count {
            let notification = Notification::Key {
                key: scancode_to_key(scancode),
                pressed: true,
                mods: self.keyboard.mods,
                codepoint: self.keyboard.text(scancode),
            };
            self.notify(id, notification);
        }
    }

    fn cursor_choice(&self, role: SurfaceRole) -> Option<CursorChoice> {
        match role {
            SurfaceRole::Content(id) => {
                let state = &self.windows.get(&id)?.state;
                Some(if state.cursor_hidden {
                    CursorChoice::Hidden
                } else {
                    match state.cursor.upgrade() {
                        Some(cursor) => CursorChoice::Handle(cursor.handle()),
                        None => CursorChoice::Shape(CursorShape::Arrow),
                    }
                })
            }
            SurfaceRole::Decoration(..) => {
                let region = self.pointer.region.unwrap_or(HitRegion::Caption);
                Some(CursorChoice::Shape(CursorShape::for_region(region)))
            }
            SurfaceRole::Cursor => None,
        }
    }

    /// Re-applies the cursor of whatever the pointer is over.
    pub fn refresh_cursor(&mut self) {
        let Some(choice) = self.pointer.focus.and_then(|role| self.cursor_choice(role)) else {
            return;
        };
        self.cursors.apply(choice, Instant::now());
    }

    /// Tracks the decoration region under the pointer; returns whether it
    /// changed.
    pub fn update_decoration_region(&mut self, id: WindowId, part: DecorPart) -> bool {
        let Some(window) = self.windows.get(&id) else {
            return false;
        };
        let region = decor::region_at(part, self.pointer.pos, window.state.dimensions);
        self.pointer.region.replace(region) != Some(region)
    }

    /// Presses on the fallback decorations start interactive moves and
    /// resizes, or open the window menu.
    pub fn decoration_button(&mut self, id: WindowId, button: u32) {
        let (Some(window), Some(seat)) = (self.windows.get(&id), self.globals.seat.as_ref()) else {
            return;
        };
        let serial = self.seat.serial;
        let region = self.pointer.region.unwrap_or(HitRegion::None);
        match (button, region) {
            (BTN_LEFT, HitRegion::Caption) => window.toplevel._move(seat, serial),
            (BTN_LEFT, region) => {
                if !window.state.flags.contains(WindowFlags::RESIZABLE) {
                    return;
                }
                if let Some(edge) = decor::resize_edge(region) {
                    window.toplevel.resize(seat, serial, edge);
                }
            }
            (BTN_RIGHT, HitRegion::Caption) => {
                let pos = self.pointer.pos.as_ivec2();
                window.toplevel.show_window_menu(seat, serial, pos.x, pos.y);
            }
            _ => {}
        }
    }

    /// Replaces the compositor selection offer, releasing the previous one.
    pub fn replace_selection(&mut self, offer: Option<WlDataOffer>) {
        if let Some(old) = std::mem::replace(&mut self.clipboard.selection, offer) {
            if self.clipboard.selection.as_ref() != Some(&old) {
                old.destroy();
            }
        }
    }

    pub fn forget_output(&mut self, output: &WlOutput) {
        let affected: Vec<WindowId> = self
            .windows
            .values_mut()
            .filter_map(|window| {
                let before = window.outputs.len();
                window.outputs.retain(|entered| entered != output);
                (window.outputs.len() != before).then_some(window.state.id)
            })
            .collect();
        for id in affected {
            self.update_output_scale(id);
        }
    }
}
