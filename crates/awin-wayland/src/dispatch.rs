//! `Dispatch` implementations: decode wire events and hand them to the
//! routing helpers on [`WaylandState`].

use std::fs::File;
use std::io::Read;
use std::sync::Mutex;
use std::time::Instant;

use awin_core::{Point, PointF, WindowId};
use awin_platform::MonitorInfo;
use tracing::{debug, trace, warn};
use wayland_client::globals::GlobalListContents;
use wayland_client::protocol::wl_callback::{self, WlCallback};
use wayland_client::protocol::wl_data_device::{self, WlDataDevice};
use wayland_client::protocol::wl_data_offer::{self, WlDataOffer};
use wayland_client::protocol::wl_data_source::{self, WlDataSource};
use wayland_client::protocol::wl_keyboard::{self, KeymapFormat, WlKeyboard};
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::protocol::wl_pointer::{self, WlPointer};
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::protocol::wl_seat::{self, Capability, WlSeat};
use wayland_client::protocol::wl_surface::{self, WlSurface};
use wayland_client::protocol::{
    wl_buffer::WlBuffer, wl_compositor::WlCompositor, wl_data_device_manager::WlDataDeviceManager,
    wl_shm::WlShm, wl_shm_pool::WlShmPool, wl_subcompositor::WlSubcompositor,
    wl_subsurface::WlSubsurface,
};
use wayland_client::{
    delegate_noop, event_created_child, Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::wp::fractional_scale::v1::client::{
    wp_fractional_scale_manager_v1::WpFractionalScaleManagerV1,
};
use wayland_protocols::wp::fractional_scale::v1::client::wp_fractional_scale_v1::{
    self, WpFractionalScaleV1,
};
use wayland_protocols::wp::relative_pointer::zv1::client::{
    zwp_relative_pointer_manager_v1::ZwpRelativePointerManagerV1,
};
use wayland_protocols::wp::relative_pointer::zv1::client::zwp_relative_pointer_v1::{
    self, ZwpRelativePointerV1,
};
use wayland_protocols::wp::viewporter::client::{
    wp_viewport::WpViewport, wp_viewporter::WpViewporter,
};
use wayland_protocols::xdg::activation::v1::client::xdg_activation_token_v1::{
    self, XdgActivationTokenV1,
};
use wayland_protocols::xdg::activation::v1::client::xdg_activation_v1::XdgActivationV1;
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
};
use wayland_protocols::xdg::decoration::zv1::client::zxdg_toplevel_decoration_v1::{
    self, ZxdgToplevelDecorationV1,
};
use wayland_protocols::xdg::shell::client::xdg_surface::{self, XdgSurface};
use wayland_protocols::xdg::shell::client::xdg_toplevel::{self, XdgToplevel};
use wayland_protocols::xdg::shell::client::xdg_wm_base::{self, XdgWmBase};

use crate::configure::ToplevelStates;
use crate::offer;
use crate::state::{Output, SurfaceRole, WaylandState};
use crate::translate::Notification;

/// Newest `wl_output` version the handlers understand.
pub const OUTPUT_VERSION: u32 = 4;

delegate_noop!(WaylandState: WlCompositor);
delegate_noop!(WaylandState: WlSubcompositor);
delegate_noop!(WaylandState: WlSubsurface);
delegate_noop!(WaylandState: ignore WlShm);
delegate_noop!(WaylandState: WlShmPool);
delegate_noop!(WaylandState: ignore WlBuffer);
delegate_noop!(WaylandState: WlDataDeviceManager);
delegate_noop!(WaylandState: ZxdgDecorationManagerV1);
delegate_noop!(WaylandState: WpFractionalScaleManagerV1);
delegate_noop!(WaylandState: WpViewporter);
delegate_noop!(WaylandState: WpViewport);
delegate_noop!(WaylandState: ZwpRelativePointerManagerV1);
delegate_noop!(WaylandState: XdgActivationV1);

pub fn bind_output(state: &mut WaylandState, registry: &WlRegistry, name: u32, version: u32) {
    let proxy = registry.bind::<WlOutput, _, _>(name, version.min(OUTPUT_VERSION), &state.qh, name);
    let primary = state.outputs.is_empty();
    state.outputs.insert(
        name,
        Output {
            proxy,
            info: MonitorInfo {
                primary,
                ..MonitorInfo::default()
            },
            scale: 1,
        },
    );
    debug!(name, "output bound");
}

impl Dispatch<WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } if interface == WlOutput::interface().name => {
                bind_output(state, registry, name, version)
            }
            wl_registry::Event::GlobalRemove { name } => {
                if let Some(output) = state.outputs.remove(&name) {
                    debug!(name, "output removed");
                    state.forget_output(&output.proxy);
                    if output.proxy.version() >= 3 {
                        output.proxy.release();
                    }
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlOutput, u32> for WaylandState {
    fn event(
        state: &mut Self,
        proxy: &WlOutput,
        event: wl_output::Event,
        name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(output) = state.outputs.get_mut(name) else {
            return;
        };
        let info = &mut output.info;
        match event {
            wl_output::Event::Geometry {
                x,
                y,
                physical_width,
                physical_height,
                make,
                model,
                ..
            } => {
                info.position = Point::new(x, y);
                info.physical_size_mm = Point::new(physical_width, physical_height);
                if info.name.is_empty() {
                    info.name = format!("{make} {model}");
                }
            }
            wl_output::Event::Mode {
                flags: WEnum::Value(flags),
                width,
                height,
                refresh,
            } if flags.contains(wl_output::Mode::Current) => {
                info.size = Point::new(width, height);
                info.refresh_hz = refresh as f32 / 1000.0;
            }
            wl_output::Event::Scale { factor } => {
                output.scale = factor.max(1);
                info.scale = PointF::splat(output.scale as f32);
                // version 1 outputs never send done
                if proxy.version() < 2 {
                    state.output_changed(proxy);
                }
            }
            wl_output::Event::Name { name } => info.name = name,
            wl_output::Event::Done => {
                trace!(name = %info.name, size = ?info.size, "output described");
                state.output_changed(proxy);
            }
            _ => {}
        }
    }
}

impl WaylandState {
    fn output_changed(&mut self, output: &WlOutput) {
        let affected: Vec<WindowId> = self
            .windows
            .values()
            .filter(|window| window.outputs.contains(output))
            .map(|window| window.state.id)
            .collect();
        for id in affected {
            self.update_output_scale(id);
        }
    }
}

impl Dispatch<XdgWmBase, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<WlSeat, ()> for WaylandState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        else {
            return;
        };

        let has_pointer = capabilities.contains(Capability::Pointer);
        if has_pointer && state.seat.pointer.is_none() {
            let pointer = seat.get_pointer(qh, ());
            state.seat.relative = state
                .globals
                .relative_pointer
                .as_ref()
                .map(|manager| manager.get_relative_pointer(&pointer, qh, ()));
            state.seat.pointer = Some(pointer);
            debug!("pointer acquired");
        } else if !has_pointer {
            if let Some(relative) = state.seat.relative.take() {
                relative.destroy();
            }
            if let Some(pointer) = state.seat.pointer.take() {
                if pointer.version() >= 3 {
                    pointer.release();
                }
                state.cursors.set_pointer(None);
                state.pointer.focus = None;
            }
        }

        let has_keyboard = capabilities.contains(Capability::Keyboard);
        if has_keyboard && state.seat.keyboard.is_none() {
            state.seat.keyboard = Some(seat.get_keyboard(qh, ()));
            debug!("keyboard acquired");
        } else if !has_keyboard {
            if let Some(keyboard) = state.seat.keyboard.take() {
                if keyboard.version() >= 3 {
                    keyboard.release();
                }
                state.repeat.cancel();
            }
        }
    }
}

impl Dispatch<WlPointer, ()> for WaylandState {
    fn event(
        state: &mut Self,
        pointer: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial,
                surface,
                surface_x,
                surface_y,
            } => {
                let Some(role) = surface.data::<SurfaceRole>().copied() else {
                    return;
                };
                let pos = PointF::new(surface_x as f32, surface_y as f32);
                state.pointer.focus = Some(role);
                state.pointer.pos = pos;
                state.pointer.region = None;
                state.cursors.set_pointer(Some((pointer.clone(), serial)));
                match role {
                    SurfaceRole::Content(id) => {
                        state.notify(id, Notification::PointerEnter { pos });
                    }
                    SurfaceRole::Decoration(id, part) => {
                        state.update_decoration_region(id, part);
                    }
                    SurfaceRole::Cursor => {}
                }
                state.refresh_cursor();
            }
            wl_pointer::Event::Leave { .. } => {
                if let Some(SurfaceRole::Content(id)) = state.pointer.focus.take() {
                    state.notify(id, Notification::PointerLeave);
                }
                state.pointer.region = None;
                state.cursors.set_pointer(None);
            }
            wl_pointer::Event::Motion {
                surface_x, surface_y, ..
            } => {
                let pos = PointF::new(surface_x as f32, surface_y as f32);
                state.pointer.pos = pos;
                match state.pointer.focus {
                    Some(SurfaceRole::Content(id)) => {
                        state.notify(id, Notification::PointerMotion { pos });
                    }
                    Some(SurfaceRole::Decoration(id, part)) => {
                        if state.update_decoration_region(id, part) {
                            state.refresh_cursor();
                        }
                    }
                    _ => {}
                }
            }
            wl_pointer::Event::Button {
                serial,
                button,
                state: button_state,
                ..
            } => {
                state.seat.serial = serial;
                let pressed =
                    matches!(button_state, WEnum::Value(wl_pointer::ButtonState::Pressed));
                match state.pointer.focus {
                    Some(SurfaceRole::Content(id)) => {
                        state.notify(id, Notification::Button { code: button, pressed });
                    }
                    Some(SurfaceRole::Decoration(id, _)) if pressed => {
                        state.decoration_button(id, button)
                    }
                    _ => {}
                }
            }
            wl_pointer::Event::Axis {
                axis: WEnum::Value(axis),
                value,
                ..
            } => {
                if let Some(SurfaceRole::Content(id)) = state.pointer.focus {
                    let horizontal = axis == wl_pointer::Axis::HorizontalScroll;
                    state.notify(id, Notification::Axis { horizontal, value });
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwpRelativePointerV1, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _proxy: &ZwpRelativePointerV1,
        event: zwp_relative_pointer_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let zwp_relative_pointer_v1::Event::RelativeMotion {
            dx_unaccel, dy_unaccel, ..
        } = event
        {
            let Some(id) = state.keyboard.focus else {
                return;
            };
            let delta = PointF::new(dx_unaccel as f32, dy_unaccel as f32);
            state.notify(id, Notification::RelativeMotion { delta });
        }
    }
}

impl Dispatch<WlKeyboard, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _keyboard: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format != WEnum::Value(KeymapFormat::XkbV1) {
                    warn!(?format, "unsupported keymap format");
                    return;
                }
                let mut raw = Vec::with_capacity(size as usize);
                match File::from(fd).take(u64::from(size)).read_to_end(&mut raw) {
                    Ok(_) => state.keyboard.load_keymap(&String::from_utf8_lossy(&raw)),
                    Err(err) => warn!(%err, "failed to read the compositor keymap"),
                }
            }
            wl_keyboard::Event::Enter { serial, surface, .. } => {
                state.seat.serial = serial;
                if let Some(SurfaceRole::Content(id)) = surface.data::<SurfaceRole>().copied() {
                    state.keyboard.focus = Some(id);
                    let mods = state.keyboard.mods;
                    state.notify(id, Notification::KeyboardEnter { mods });
                }
            }
            wl_keyboard::Event::Leave { serial, .. } => {
                state.seat.serial = serial;
                state.repeat.cancel();
                if let Some(id) = state.keyboard.focus.take() {
                    let mods = state.keyboard.mods;
                    state.notify(id, Notification::KeyboardLeave { mods });
                }
            }
            wl_keyboard::Event::Key {
                serial,
                key,
                state: key_state,
                ..
            } => {
                state.seat.serial = serial;
                let pressed = matches!(key_state, WEnum::Value(wl_keyboard::KeyState::Pressed));
                state.key(key, pressed, Instant::now());
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => state
                .keyboard
                .update_mods(mods_depressed, mods_latched, mods_locked, group),
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                debug!(rate, delay, "key repeat info");
                state.repeat.set_info(rate, delay);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSurface, SurfaceRole> for WaylandState {
    fn event(
        state: &mut Self,
        _surface: &WlSurface,
        event: wl_surface::Event,
        role: &SurfaceRole,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let SurfaceRole::Content(id) = *role else {
            return;
        };
        let Some(window) = state.windows.get_mut(&id) else {
            return;
        };
        match event {
            wl_surface::Event::Enter { output } => window.outputs.push(output),
            wl_surface::Event::Leave { output } => {
                window.outputs.retain(|entered| *entered != output)
            }
            _ => return,
        }
        state.update_output_scale(id);
    }
}

impl Dispatch<XdgSurface, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            state.configure(*id);
        }
    }
}

impl Dispatch<XdgToplevel, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _toplevel: &XdgToplevel,
        event: xdg_toplevel::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure { width, height, states } => {
                if let Some(window) = state.windows.get_mut(id) {
                    window
                        .configure
                        .toplevel(width, height, ToplevelStates::from_wire(&states));
                }
            }
            xdg_toplevel::Event::Close => {
                state.notify(*id, Notification::Close);
            }
            _ => {}
        }
    }
}

impl Dispatch<ZxdgToplevelDecorationV1, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _decoration: &ZxdgToplevelDecorationV1,
        event: zxdg_toplevel_decoration_v1::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let zxdg_toplevel_decoration_v1::Event::Configure { mode } = event {
            let server = mode == WEnum::Value(zxdg_toplevel_decoration_v1::Mode::ServerSide);
            debug!(window = ?id, server, "decoration mode");
            if let Some(window) = state.windows.get_mut(id) {
                // applied with the surface configure that follows
                window.server_decorated = server;
            }
        }
    }
}

impl Dispatch<WpFractionalScaleV1, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _proxy: &WpFractionalScaleV1,
        event: wp_fractional_scale_v1::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wp_fractional_scale_v1::Event::PreferredScale { scale } = event {
            // the wire value is in 1/120ths
            state.notify(*id, Notification::Scale(scale as f32 / 120.0));
            state.redraw(*id);
        }
    }
}

/// `wl_display.sync` after a hide: the compositor has processed the unmap.
impl Dispatch<WlCallback, WindowId> for WaylandState {
    fn event(
        state: &mut Self,
        _callback: &WlCallback,
        event: wl_callback::Event,
        id: &WindowId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            if let Some(window) = state.windows.get_mut(id) {
                if !window.mapped {
                    window.state.notify_visible(false);
                    debug!(window = ?id, "window hidden");
                }
            }
        }
    }
}

impl Dispatch<XdgActivationTokenV1, WlSurface> for WaylandState {
    fn event(
        state: &mut Self,
        token: &XdgActivationTokenV1,
        event: xdg_activation_token_v1::Event,
        surface: &WlSurface,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_activation_token_v1::Event::Done { token: value } = event {
            if let Some(activation) = &state.globals.activation {
                activation.activate(value, surface);
            }
            token.destroy();
        }
    }
}

impl Dispatch<WlDataDevice, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _device: &WlDataDevice,
        event: wl_data_device::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_data_device::Event::Selection { id } => state.replace_selection(id),
            // drag and drop is not offered
            wl_data_device::Event::Enter { id: Some(offer), .. } => offer.destroy(),
            _ => {}
        }
    }

    event_created_child!(WaylandState, WlDataDevice, [
        wl_data_device::EVT_DATA_OFFER_OPCODE => (WlDataOffer, Mutex::new(Vec::new()))
    ]);
}

impl Dispatch<WlDataOffer, Mutex<Vec<String>>> for WaylandState {
    fn event(
        _state: &mut Self,
        _offer: &WlDataOffer,
        event: wl_data_offer::Event,
        mimes: &Mutex<Vec<String>>,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_data_offer::Event::Offer { mime_type } = event {
            if let Ok(mut mimes) = mimes.lock() {
                mimes.push(mime_type);
            }
        }
    }
}

impl Dispatch<WlDataSource, ()> for WaylandState {
    fn event(
        state: &mut Self,
        source: &WlDataSource,
        event: wl_data_source::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_data_source::Event::Send { mime_type, fd } => {
                if !offer::is_text_mime(&mime_type) {
                    debug!(%mime_type, "clipboard request for a type we never offered");
                    return;
                }
                if let Err(err) = offer::write_all(fd, state.clipboard.text.as_bytes()) {
                    warn!(%err, "clipboard transfer failed");
                }
            }
            wl_data_source::Event::Cancelled => {
                if state.clipboard.source.as_ref() == Some(source) {
                    state.clipboard.source = None;
                    state.clipboard.text.clear();
                    debug!("clipboard ownership lost");
                }
                source.destroy();
            }
            _ => {}
        }
    }
}
