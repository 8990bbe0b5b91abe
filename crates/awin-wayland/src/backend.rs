use std::collections::HashMap;
use std::io;
use std::os::fd::AsFd;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use awin_core::{
    Cursor, CursorSource, EventDispatchRegistry, GlobalTimeout, PlatformConfig, Point, PointF,
    WindowConfig, WindowFlags, WindowId, WindowState,
};
use awin_platform::capability::{self, Requirement};
use awin_platform::wake::{wait_readable, WakePipe};
use awin_platform::xkb::{XkbCommon, XkbContext};
use awin_platform::{Backend, BackendKind, MonitorInfo, PlatformError, Result, Waker};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tracing::{debug, error, info, warn};
use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, BindError};
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_data_device_manager::WlDataDeviceManager;
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_shm::WlShm;
use wayland_client::protocol::wl_subcompositor::WlSubcompositor;
use wayland_client::{Connection, EventQueue, Proxy};
use wayland_protocols::wp::fractional_scale::v1::client::{
    wp_fractional_scale_manager_v1::WpFractionalScaleManagerV1,
};
use wayland_protocols::wp::relative_pointer::zv1::client::{
    zwp_relative_pointer_manager_v1::ZwpRelativePointerManagerV1,
};
use wayland_protocols::wp::viewporter::client::wp_viewporter::WpViewporter;
use wayland_protocols::xdg::activation::v1::client::xdg_activation_v1::XdgActivationV1;
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
    zxdg_toplevel_decoration_v1::Mode as DecorationMode,
};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

use crate::cursor::CursorManager;
use crate::dispatch::bind_output;
use crate::offer::{self, TEXT_MIMES};
use crate::repeat::KeyRepeat;
use crate::state::{Clipboard, Globals, Keyboard, Pointer, Seat, SurfaceRole, WaylandState};
use crate::window::WaylandWindow;

fn required<I>(bound: std::result::Result<I, BindError>, name: &'static str) -> Result<I> {
    capability::negotiate(name, bound.is_ok(), Requirement::Required)?;
    bound.map_err(|_| PlatformError::MissingCapability(name))
}

fn optional<I>(bound: std::result::Result<I, BindError>, name: &'static str) -> Option<I> {
    match capability::negotiate(name, bound.is_ok(), Requirement::Optional) {
        Ok(true) => bound.ok(),
        _ => None,
    }
}

fn ignore_wouldblock<T>(
    result: std::result::Result<T, WaylandError>,
) -> std::result::Result<(), WaylandError> {
    match result {
        Ok(_) => Ok(()),
        Err(WaylandError::Io(ref err)) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(other) => Err(other),
    }
}

pub struct WaylandBackend {
    conn: Connection,
    queue: EventQueue<WaylandState>,
    state: WaylandState,
    wake: WakePipe,
    app_id: String,
    next_id: u64,
}

impl WaylandBackend {
    pub fn new(config: &PlatformConfig, registry: Rc<EventDispatchRegistry>) -> Result<Self> {
        let conn =
            Connection::connect_to_env().map_err(|err| PlatformError::NoDisplay(err.to_string()))?;
        let (globals, mut queue) = registry_queue_init::<WaylandState>(&conn)
            .map_err(|err| PlatformError::Connection(err.to_string()))?;
        let qh = queue.handle();

        let xkb = capability::load::<XkbCommon>(Requirement::Required)?
            .ok_or(PlatformError::MissingCapability("libxkbcommon"))?;
        let xkb = XkbContext::new(Rc::new(xkb))
            .ok_or(PlatformError::MissingCapability("xkb context"))?;

        let bound = Globals {
            compositor: required(
                globals.bind::<WlCompositor, _, _>(&qh, 4..=6, ()),
                "wl_compositor",
            )?,
            shm: required(globals.bind::<WlShm, _, _>(&qh, 1..=1, ()), "wl_shm")?,
            wm_base: required(globals.bind::<XdgWmBase, _, _>(&qh, 1..=5, ()), "xdg_wm_base")?,
            subcompositor: optional(
                globals.bind::<WlSubcompositor, _, _>(&qh, 1..=1, ()),
                "wl_subcompositor",
            ),
            seat: optional(globals.bind::<WlSeat, _, _>(&qh, 1..=7, ()), "wl_seat"),
            data_device_manager: optional(
                globals.bind::<WlDataDeviceManager, _, _>(&qh, 1..=3, ()),
                "wl_data_device_manager",
            ),
            decoration_manager: optional(
                globals.bind::<ZxdgDecorationManagerV1, _, _>(&qh, 1..=1, ()),
                "zxdg_decoration_manager_v1",
            ),
            fractional_scale: optional(
                globals.bind::<WpFractionalScaleManagerV1, _, _>(&qh, 1..=1, ()),
                "wp_fractional_scale_manager_v1",
            ),
            viewporter: optional(
                globals.bind::<WpViewporter, _, _>(&qh, 1..=1, ()),
                "wp_viewporter",
            ),
            relative_pointer: optional(
                globals.bind::<ZwpRelativePointerManagerV1, _, _>(&qh, 1..=1, ()),
                "zwp_relative_pointer_manager_v1",
            ),
            activation: optional(
                globals.bind::<XdgActivationV1, _, _>(&qh, 1..=1, ()),
                "xdg_activation_v1",
            ),
        };

        let cursor_surface = bound.compositor.create_surface(&qh, SurfaceRole::Cursor);
        let cursor_size = (config.cursor_size > 0).then_some(config.cursor_size);
        let cursors = CursorManager::new(
            &conn,
            &bound.shm,
            cursor_surface,
            config.cursor_theme.as_deref(),
            cursor_size,
        );

        let mut seat = Seat::default();
        if let (Some(manager), Some(wl_seat)) = (&bound.data_device_manager, &bound.seat) {
            seat.data_device = Some(manager.get_data_device(wl_seat, &qh, ()));
        }

        let mut state = WaylandState {
            globals: bound,
            qh,
            registry,
            windows: HashMap::new(),
            outputs: HashMap::new(),
            seat,
            pointer: Pointer::default(),
            keyboard: Keyboard::new(xkb),
            repeat: KeyRepeat::default(),
            cursors,
            clipboard: Clipboard::default(),
        };
        for global in globals.contents().clone_list() {
            if global.interface == "wl_output" {
                bind_output(&mut state, globals.registry(), global.name, global.version);
            }
        }

        // seat capabilities, keymap and output descriptions
        queue
            .roundtrip(&mut state)
            .map_err(|err| PlatformError::Connection(err.to_string()))?;

        let wake = WakePipe::new()?;
        info!(
            outputs = state.outputs.len(),
            server_decorations = state.globals.decoration_manager.is_some(),
            fractional_scale = state.globals.fractional_scale.is_some(),
            "wayland backend ready"
        );
        Ok(Self {
            conn,
            queue,
            state,
            wake,
            app_id: config.app_id.clone(),
            next_id: 1,
        })
    }

    fn window_mut(&mut self, id: WindowId) -> Option<&mut WaylandWindow> {
        let window = self.state.windows.get_mut(&id);
        if window.is_none() {
            warn!(window = ?id, "request for an unknown window");
        }
        window
    }

    fn flush(&self) {
        if let Err(err) = ignore_wouldblock(self.conn.flush()) {
            warn!(%err, "wayland flush failed");
        }
    }

    fn dispatch_pending(&mut self) {
        if let Err(err) = self.queue.dispatch_pending(&mut self.state) {
            error!(%err, "wayland dispatch failed");
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        self.state.fire_repeats(now);
        self.state.cursors.tick(now);
    }

    /// One round of the event pump: dispatch what is queued, block for the
    /// socket, a wake or the soonest internal deadline, then dispatch again.
    fn pump(&mut self, timeout: Option<Duration>) {
        self.dispatch_pending();
        self.flush();

        if let Some(guard) = self.queue.prepare_read() {
            let mut deadlines = GlobalTimeout::new();
            deadlines.consider(self.state.repeat.deadline());
            deadlines.consider(self.state.cursors.deadline());
            let wait = deadlines.timeout(Instant::now(), timeout);

            let ready = wait_readable(&[guard.connection_fd(), self.wake.read_fd()], wait);
            match ready {
                Ok(ready) => {
                    if ready.get(1).copied().unwrap_or(false) {
                        self.wake.drain();
                    }
                    if ready.first().copied().unwrap_or(false) {
                        if let Err(err) = ignore_wouldblock(guard.read()) {
                            error!(%err, "wayland read failed");
                        }
                    }
                }
                Err(err) => warn!(%err, "event wait failed"),
            }
        }

        self.dispatch_pending();
        self.fire_timers();
        self.flush();
    }

    fn receive_clipboard(&mut self) -> Option<String> {
        let offer = self.state.clipboard.selection.clone()?;
        let mimes = offer
            .data::<Mutex<Vec<String>>>()
            .and_then(|mimes| mimes.lock().ok().map(|mimes| mimes.clone()))
            .unwrap_or_default();
        let Some(mime) = offer::best_text_mime(&mimes) else {
            debug!(?mimes, "clipboard holds no text");
            return None;
        };
        let (reader, writer) = match pipe2(OFlag::O_CLOEXEC) {
            Ok(pipe) => pipe,
            Err(err) => {
                warn!(%err, "clipboard pipe creation failed");
                return None;
            }
        };
        offer.receive(mime.to_owned(), writer.as_fd());
        drop(writer);
        self.flush();
        match offer::read_to_end(reader) {
            Ok(data) => Some(String::from_utf8_lossy(&data).into_owned()),
            Err(err) => {
                warn!(%err, "clipboard read failed");
                None
            }
        }
    }
}

impl Backend for WaylandBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Wayland
    }

    fn create_window(&mut self, config: &WindowConfig) -> Result<WindowId> {
        let id = WindowId(self.next_id);
        self.next_id += 1;
        let state = WindowState::new(id, config);

        let globals = &self.state.globals;
        let qh = &self.state.qh;
        let surface = globals.compositor.create_surface(qh, SurfaceRole::Content(id));
        let xdg_surface = globals.wm_base.get_xdg_surface(&surface, qh, id);
        let toplevel = xdg_surface.get_toplevel(qh, id);
        toplevel.set_title(config.title.clone());
        toplevel.set_app_id(self.app_id.clone());

        let decoration = globals.decoration_manager.as_ref().map(|manager| {
            let decoration = manager.get_toplevel_decoration(&toplevel, qh, id);
            decoration.set_mode(if config.decorated {
                DecorationMode::ServerSide
            } else {
                DecorationMode::ClientSide
            });
            decoration
        });
        let (fractional, viewport) = match (&globals.fractional_scale, &globals.viewporter) {
            (Some(manager), Some(viewporter)) => (
                Some(manager.get_fractional_scale(&surface, qh, id)),
                Some(viewporter.get_viewport(&surface, qh, ())),
            ),
            _ => (None, None),
        };
        if config.maximized {
            toplevel.set_maximized();
        }
        if config.fullscreen {
            toplevel.set_fullscreen(None);
        }

        let mut window = WaylandWindow::new(
            state,
            surface,
            xdg_surface,
            toplevel,
            decoration,
            fractional,
            viewport,
            config.background,
        );
        window.can_decorate = globals.subcompositor.is_some();
        window.write_size_limits();
        self.state.windows.insert(id, window);
        info!(window = ?id, title = %config.title, "window created");

        if !config.hidden {
            self.show(id);
        }
        self.flush();
        Ok(id)
    }

    fn destroy_window(&mut self, id: WindowId) -> Result<()> {
        let window = self
            .state
            .windows
            .remove(&id)
            .ok_or(PlatformError::UnknownWindow(id.0))?;
        if self.state.keyboard.focus == Some(id) {
            self.state.keyboard.focus = None;
            self.state.repeat.cancel();
        }
        let pointer_on_window = matches!(
            self.state.pointer.focus,
            Some(SurfaceRole::Content(focus) | SurfaceRole::Decoration(focus, _)) if focus == id
        );
        if pointer_on_window {
            self.state.pointer.focus = None;
            self.state.cursors.set_pointer(None);
        }
        window.destroy();
        self.flush();
        debug!(window = ?id, "window destroyed");
        Ok(())
    }

    fn window_state(&self, id: WindowId) -> Option<WindowState> {
        self.state.windows.get(&id).map(|window| window.state.clone())
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self, timeout: Option<Duration>) {
        self.pump(timeout);
    }

    fn waker(&self) -> Arc<dyn Waker> {
        self.wake.waker()
    }

    fn set_title(&mut self, id: WindowId, title: &str) {
        let Some(window) = self.window_mut(id) else { return };
        window.state.title = title.to_owned();
        window.toplevel.set_title(title.to_owned());
        self.flush();
    }

    fn set_size(&mut self, id: WindowId, size: Point) {
        let state = &mut self.state;
        let Some(window) = state.windows.get_mut(&id) else { return };
        if window.state.is_fullscreen() || window.state.is_maximized() {
            debug!(window = ?id, "size is compositor-controlled in this state");
            return;
        }
        // the client picks its own floating size
        let size = window.state.clamp_to_limit(size).max(Point::ONE);
        window.state.notify_resize(&state.registry, size);
        if !window.state.flags.contains(WindowFlags::RESIZABLE) {
            window.write_size_limits();
        }
        window.redraw(&state.globals, &state.qh);
        self.flush();
    }

    fn set_position(&mut self, id: WindowId, _pos: Point) {
        debug!(window = ?id, "wayland clients cannot position their windows");
    }

    fn set_resize_limit(&mut self, id: WindowId, limit: Point) {
        let Some(window) = self.window_mut(id) else { return };
        window.state.resize_limit = limit.max(Point::ZERO);
        window.write_size_limits();
        let size = window.state.dimensions;
        if size.cmplt(limit).any() {
            self.set_size(id, size);
        }
        self.flush();
    }

    fn show(&mut self, id: WindowId) {
        let Some(window) = self.window_mut(id) else { return };
        if window.mapped {
            return;
        }
        // a buffer-less commit asks for the initial configure; the buffer
        // follows once it arrives
        window.surface.commit();
        self.flush();
    }

    fn hide(&mut self, id: WindowId) {
        let Some(window) = self.window_mut(id) else { return };
        window.unmap();
        let qh = self.state.qh.clone();
        self.conn.display().sync(&qh, id);
        self.flush();
    }

    fn focus(&mut self, id: WindowId) {
        let state = &self.state;
        let Some(window) = state.windows.get(&id) else { return };
        let (Some(activation), Some(seat)) = (&state.globals.activation, &state.globals.seat) else {
            debug!(window = ?id, "focus requests need xdg-activation");
            return;
        };
        let token = activation.get_activation_token(&state.qh, window.surface.clone());
        token.set_surface(&window.surface);
        token.set_serial(state.seat.serial, seat);
        token.set_app_id(self.app_id.clone());
        token.commit();
        self.flush();
    }

    fn set_fullscreen(&mut self, id: WindowId, enabled: bool) {
        let Some(window) = self.window_mut(id) else { return };
        if enabled {
            window.toplevel.set_fullscreen(None);
        } else {
            window.toplevel.unset_fullscreen();
        }
        self.flush();
    }

    fn minimize(&mut self, id: WindowId) {
        let Some(window) = self.window_mut(id) else { return };
        // never confirmed by the compositor
        window.toplevel.set_minimized();
        self.flush();
    }

    fn maximize(&mut self, id: WindowId) {
        let Some(window) = self.window_mut(id) else { return };
        window.toplevel.set_maximized();
        self.flush();
    }

    fn restore(&mut self, id: WindowId) {
        let Some(window) = self.window_mut(id) else { return };
        if window.state.is_fullscreen() {
            window.toplevel.unset_fullscreen();
        } else if window.state.is_maximized() {
            window.toplevel.unset_maximized();
        }
        self.flush();
    }

    fn set_decorated(&mut self, id: WindowId, decorated: bool) {
        let state = &mut self.state;
        let Some(window) = state.windows.get_mut(&id) else { return };
        window.state.flags.set(WindowFlags::DECORATED, decorated);
        if let Some(decoration) = &window.decoration {
            decoration.set_mode(if decorated {
                DecorationMode::ServerSide
            } else {
                DecorationMode::ClientSide
            });
        }
        window.sync_decorations(&state.globals, &state.qh);
        window.redraw(&state.globals, &state.qh);
        self.flush();
    }

    fn request_close(&mut self, id: WindowId) {
        if let Some(window) = self.state.windows.get_mut(&id) {
            window.state.notify_close_request();
        }
    }

    fn set_cursor_position(&mut self, id: WindowId, _pos: PointF) {
        debug!(window = ?id, "wayland clients cannot warp the pointer");
    }

    fn create_cursor(&mut self, source: CursorSource) -> Result<Cursor> {
        let state = &mut self.state;
        let handle = match &source {
            CursorSource::Standard(shape) => state.cursors.register_shape(*shape),
            CursorSource::Image(image) => {
                state.cursors.register_image(&state.globals.shm, &state.qh, image)
            }
        };
        let handle = handle.ok_or(PlatformError::Unsupported("cursor"))?;
        Ok(Cursor::from_native(source, handle))
    }

    fn destroy_cursor(&mut self, cursor: &Cursor) {
        self.state.cursors.release(cursor.handle());
        self.flush();
    }

    fn set_cursor(&mut self, id: WindowId, cursor: &Rc<Cursor>) {
        let Some(window) = self.window_mut(id) else { return };
        window.state.cursor = Rc::downgrade(cursor);
        if self.state.pointer.focus == Some(SurfaceRole::Content(id)) {
            self.state.refresh_cursor();
            self.flush();
        }
    }

    fn set_cursor_hidden(&mut self, id: WindowId, hidden: bool) {
        let Some(window) = self.window_mut(id) else { return };
        window.state.cursor_hidden = hidden;
        if self.state.pointer.focus == Some(SurfaceRole::Content(id)) {
            self.state.refresh_cursor();
            self.flush();
        }
    }

    fn set_clipboard_string(&mut self, id: WindowId, text: &str) {
        let state = &mut self.state;
        if !state.windows.contains_key(&id) {
            return;
        }
        let (Some(manager), Some(device)) =
            (&state.globals.data_device_manager, &state.seat.data_device)
        else {
            warn!("clipboard needs wl_data_device_manager and a seat");
            return;
        };
        if let Some(old) = state.clipboard.source.take() {
            old.destroy();
        }
        let source = manager.create_data_source(&state.qh, ());
        for mime in TEXT_MIMES {
            source.offer(mime.to_owned());
        }
        device.set_selection(Some(&source), state.seat.serial);
        state.clipboard.source = Some(source);
        state.clipboard.text = text.to_owned();
        self.flush();
    }

    fn clipboard_string(&mut self, id: WindowId) -> String {
        if !self.state.windows.contains_key(&id) {
            return String::new();
        }
        if self.state.clipboard.source.is_some() {
            return self.state.clipboard.text.clone();
        }
        self.receive_clipboard().unwrap_or_default()
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        let mut outputs: Vec<(&u32, &MonitorInfo)> = self
            .state
            .outputs
            .iter()
            .map(|(name, output)| (name, &output.info))
            .collect();
        outputs.sort_by_key(|(name, _)| **name);
        outputs.into_iter().map(|(_, info)| info.clone()).collect()
    }

    fn window_monitor(&self, id: WindowId) -> Option<MonitorInfo> {
        let window = self.state.windows.get(&id)?;
        let entered = window.outputs.first()?;
        self.state
            .outputs
            .values()
            .find(|output| output.proxy == *entered)
            .map(|output| output.info.clone())
    }

    fn shutdown(&mut self) {
        let ids: Vec<WindowId> = self.state.windows.keys().copied().collect();
        for id in ids {
            if let Err(err) = self.destroy_window(id) {
                warn!(window = ?id, "failed to destroy window on shutdown: {err}");
            }
        }
        if let Some(source) = self.state.clipboard.source.take() {
            source.destroy();
        }
        self.state.replace_selection(None);
        if let Some(device) = self.state.seat.data_device.take() {
            if device.version() >= 2 {
                device.release();
            }
        }
        self.state.cursors.destroy();
        self.flush();
        info!("wayland backend shut down");
    }
}
